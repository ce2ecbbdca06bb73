pub mod coordinator;
pub mod store;
pub mod tab;

pub use coordinator::Coordinator;
pub use store::{InMemoryStore, RemoteStore};
pub use tab::{StateSnapshot, Tab};
