use peerdeck_core::client::{
    ConnectionStatus, LOCAL_TAB_ID, RemoteConfig, alias_from_tab_id, make_tab_id,
};
use serde::Serialize;

/// One entry in the navigable instance list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Tab {
    /// `"local"` or `"remote:{alias}"`
    pub id: String,
    pub label: String,
    pub is_local: bool,
    pub status: ConnectionStatus,
    /// Remote-only fields, fixed when the tab is created
    pub alias: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    /// Last failure reason; cleared on successful connect
    pub last_error: Option<String>,
}

impl Tab {
    /// The tab for this instance. Always first, always connected.
    pub fn local() -> Self {
        Self {
            id: LOCAL_TAB_ID.to_string(),
            label: "Local".to_string(),
            is_local: true,
            status: ConnectionStatus::Connected,
            alias: None,
            host: None,
            port: None,
            last_error: None,
        }
    }

    pub fn remote(config: &RemoteConfig) -> Self {
        Self {
            id: make_tab_id(&config.alias),
            label: config.alias.clone(),
            is_local: false,
            status: ConnectionStatus::Disconnected,
            alias: Some(config.alias.clone()),
            host: Some(config.host.clone()),
            port: Some(config.port),
            last_error: None,
        }
    }

    pub fn is_remote_for(&self, alias: &str) -> bool {
        alias_from_tab_id(&self.id) == Some(alias)
    }
}

/// Everything the UI needs to render the tab bar, published after every
/// coordinator mutation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StateSnapshot {
    pub tabs: Vec<Tab>,
    pub selected_index: usize,
}
