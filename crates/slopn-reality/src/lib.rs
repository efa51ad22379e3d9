pub mod codec;
pub mod decoy;
pub mod transport;

pub use codec::{Keys, derive_keys};
pub use decoy::DecoyProxy;
pub use transport::RealityTransport;
