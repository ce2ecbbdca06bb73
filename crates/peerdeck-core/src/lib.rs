pub mod protocol;

#[cfg(feature = "client")]
pub mod client;

pub use protocol::{Envelope, Inbound};
