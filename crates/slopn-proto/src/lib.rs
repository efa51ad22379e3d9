pub mod error;
pub mod exchange;
pub mod types;

pub use error::ProtoError;
pub use exchange::{read_login_request, write_login_response};
pub use types::{CloseCode, LoginRequest, LoginResponse, LoginStatus, MessageType};
