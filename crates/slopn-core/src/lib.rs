pub mod context;
pub mod error;
pub mod packet;

pub use context::AppContext;
pub use error::CoreError;
