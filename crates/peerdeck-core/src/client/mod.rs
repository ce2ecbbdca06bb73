pub mod config;
pub mod connection;
pub mod id;
pub mod transport;
pub mod types;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use config::RemoteConfig;
pub use connection::{PendingConnect, RemoteClient};
pub use id::{LOCAL_TAB_ID, alias_from_tab_id, make_tab_id};
pub use transport::{Connector, Transport, TransportError, TransportEvent, WsConnector};
pub use types::{
    ClientOptions, ConnectError, ConnectionEvent, ConnectionStatus, DEFAULT_AUTH_ERROR,
    HEARTBEAT_INTERVAL,
};
