use crate::store::RemoteStore;
use crate::tab::{StateSnapshot, Tab};

use peerdeck_core::client::{
    ClientOptions, ConnectionEvent, ConnectionStatus, Connector, RemoteClient, RemoteConfig,
};
use peerdeck_core::protocol::Envelope;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Reason recorded when a tab is selected after its configuration vanished.
pub const CONFIG_NOT_FOUND: &str = "Configuration not found";

type StateHandler = Box<dyn Fn(&StateSnapshot) + Send>;
type MessageHandler = Box<dyn Fn(&str, &Envelope) + Send>;

/// Owns the tab list (local + remotes) and one client per remote alias.
///
/// All mutation happens through `&mut self`, on whatever task owns the
/// coordinator. Clients report back over an internal channel; the owner feeds
/// those events in with `handle_event` (or `process_next_event`). Every
/// logical mutation publishes exactly one `StateSnapshot` to the registered
/// state observers.
///
/// Connections are only ever started by selecting a disconnected remote tab.
pub struct Coordinator {
    store: Arc<dyn RemoteStore>,
    connector: Arc<dyn Connector>,
    runtime: tokio::runtime::Handle,
    options: ClientOptions,

    tabs: Vec<Tab>,
    selected_index: usize,
    configs: HashMap<String, RemoteConfig>,
    clients: HashMap<String, RemoteClient>,
    next_instance: u64,

    /// Channel for events coming from client tasks
    event_tx: async_channel::Sender<ConnectionEvent>,
    event_rx: async_channel::Receiver<ConnectionEvent>,

    state_handlers: Vec<StateHandler>,
    message_handlers: Vec<MessageHandler>,
}

impl Coordinator {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        connector: Arc<dyn Connector>,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self::with_options(store, connector, runtime, ClientOptions::default())
    }

    pub fn with_options(
        store: Arc<dyn RemoteStore>,
        connector: Arc<dyn Connector>,
        runtime: tokio::runtime::Handle,
        options: ClientOptions,
    ) -> Self {
        let (event_tx, event_rx) = async_channel::unbounded::<ConnectionEvent>();
        Self {
            store,
            connector,
            runtime,
            options,
            tabs: vec![Tab::local()],
            selected_index: 0,
            configs: HashMap::new(),
            clients: HashMap::new(),
            next_instance: 0,
            event_tx,
            event_rx,
            state_handlers: Vec::new(),
            message_handlers: Vec::new(),
        }
    }

    /// Register a handler called with a full snapshot after every mutation.
    pub fn on_state_change(&mut self, handler: impl Fn(&StateSnapshot) + Send + 'static) {
        self.state_handlers.push(Box::new(handler));
    }

    /// Register a handler for application messages from connected remotes.
    pub fn on_remote_message(&mut self, handler: impl Fn(&str, &Envelope) + Send + 'static) {
        self.message_handlers.push(Box::new(handler));
    }

    pub fn tabs(&self) -> &[Tab] {
        &self.tabs
    }

    pub fn selected_index(&self) -> usize {
        self.selected_index
    }

    pub fn selected_tab(&self) -> Option<&Tab> {
        self.tabs.get(self.selected_index)
    }

    pub fn tab_for_alias(&self, alias: &str) -> Option<&Tab> {
        self.tabs.iter().find(|t| t.is_remote_for(alias))
    }

    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            tabs: self.tabs.clone(),
            selected_index: self.selected_index,
        }
    }

    /// Number of live client objects (connected or not).
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// Receiver for client events, for owners that multiplex it with other
    /// inputs. Pass each event to `handle_event`.
    pub fn events(&self) -> async_channel::Receiver<ConnectionEvent> {
        self.event_rx.clone()
    }

    /// Build the tab list from configuration. Does not connect anything.
    pub fn initialize(&mut self) {
        for (_, client) in self.clients.drain() {
            client.disconnect();
        }

        let remotes = self.store.list_remotes().unwrap_or_else(|e| {
            log::warn!("Failed to load remote configuration: {:#}", e);
            Vec::new()
        });

        self.tabs = vec![Tab::local()];
        self.configs.clear();
        for remote in remotes {
            if self.configs.contains_key(&remote.alias) {
                log::warn!("Duplicate remote alias '{}' ignored", remote.alias);
                continue;
            }
            self.tabs.push(Tab::remote(&remote));
            self.configs.insert(remote.alias.clone(), remote);
        }
        self.selected_index = 0;

        log::info!("Initialized with {} remote instance(s)", self.tabs.len() - 1);
        self.notify();
    }

    /// Select a tab. Out-of-range indices are ignored.
    ///
    /// Selecting a disconnected remote starts a connection attempt; failures
    /// show up later as the tab's status and `last_error`.
    pub fn select_tab(&mut self, index: usize) {
        let Some(tab) = self.tabs.get(index) else {
            log::debug!("select_tab({}) out of range ({} tabs)", index, self.tabs.len());
            return;
        };
        let reconnect = match (&tab.alias, tab.status) {
            (Some(alias), ConnectionStatus::Disconnected) if !tab.is_local => Some(alias.clone()),
            _ => None,
        };

        self.selected_index = index;
        if let Some(alias) = reconnect {
            self.connect_remote(&alias);
        }
        self.notify();
    }

    pub fn select_next_tab(&mut self) {
        if self.tabs.is_empty() {
            return;
        }
        let next = (self.selected_index + 1) % self.tabs.len();
        self.select_tab(next);
    }

    pub fn select_previous_tab(&mut self) {
        if self.tabs.is_empty() {
            return;
        }
        let len = self.tabs.len();
        let previous = (self.selected_index % len + len - 1) % len;
        self.select_tab(previous);
    }

    /// Reconcile tabs with the current configuration.
    ///
    /// Removed aliases lose their tab and client; new aliases are appended.
    /// The local tab and surviving tabs are left alone.
    pub fn refresh(&mut self) {
        let remotes = match self.store.list_remotes() {
            Ok(remotes) => remotes,
            Err(e) => {
                log::warn!("Failed to reload remote configuration: {:#}", e);
                return;
            }
        };

        let mut configs: HashMap<String, RemoteConfig> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        for remote in remotes {
            if configs.contains_key(&remote.alias) {
                continue;
            }
            order.push(remote.alias.clone());
            configs.insert(remote.alias.clone(), remote);
        }

        let removed: Vec<String> = self
            .tabs
            .iter()
            .filter_map(|t| t.alias.as_ref())
            .filter(|alias| !configs.contains_key(*alias))
            .cloned()
            .collect();
        for alias in &removed {
            if let Some(client) = self.clients.remove(alias) {
                client.disconnect();
            }
            log::info!("Remote '{}' removed from configuration", alias);
        }
        let removed: HashSet<String> = removed.into_iter().collect();
        self.tabs.retain(|t| {
            t.is_local || t.alias.as_ref().is_none_or(|alias| !removed.contains(alias))
        });

        for alias in &order {
            if self.tab_for_alias(alias).is_none() {
                if let Some(config) = configs.get(alias) {
                    log::info!("Remote '{}' added to configuration", alias);
                    self.tabs.push(Tab::remote(config));
                }
            }
        }
        self.configs = configs;

        if self.selected_index >= self.tabs.len() {
            self.selected_index = self.tabs.len().saturating_sub(1);
        }
        self.notify();
    }

    /// Disconnect and drop every client. Remote tabs end up disconnected;
    /// the local tab is untouched.
    pub fn disconnect_all(&mut self) {
        for (_, client) in self.clients.drain() {
            log::debug!("Disconnecting '{}'", client.alias());
            client.disconnect();
        }
        for tab in self.tabs.iter_mut().filter(|t| !t.is_local) {
            tab.status = ConnectionStatus::Disconnected;
        }
        self.notify();
    }

    /// Shut down: disconnect everything and drop all observers.
    pub fn close(&mut self) {
        self.disconnect_all();
        self.state_handlers.clear();
        self.message_handlers.clear();
    }

    /// Send an application message to a remote. Dropped unless connected.
    pub fn send_to(&self, alias: &str, kind: &str, payload: Map<String, Value>) {
        match self.clients.get(alias) {
            Some(client) => client.send(kind, payload),
            None => log::debug!("No client for '{}', dropping '{}'", alias, kind),
        }
    }

    /// Apply one client event to the tab list.
    pub fn handle_event(&mut self, event: ConnectionEvent) {
        let current = self
            .clients
            .get(event.alias())
            .is_some_and(|client| client.instance() == event.instance());
        if !current {
            log::debug!("Ignoring event from retired client for '{}'", event.alias());
            return;
        }

        match event {
            ConnectionEvent::Connecting { alias, .. } => {
                self.update_tab(&alias, |tab| tab.status = ConnectionStatus::Connecting);
            }
            ConnectionEvent::Connected { alias, .. } => {
                self.update_tab(&alias, |tab| {
                    tab.status = ConnectionStatus::Connected;
                    tab.last_error = None;
                });
            }
            ConnectionEvent::Disconnected { alias, error, .. } => {
                self.update_tab(&alias, |tab| {
                    tab.status = ConnectionStatus::Disconnected;
                    if error.is_some() {
                        tab.last_error = error;
                    }
                });
            }
            ConnectionEvent::Message { alias, message, .. } => {
                for handler in &self.message_handlers {
                    handler(&alias, &message);
                }
            }
        }
    }

    /// Wait for the next client event and apply it.
    pub async fn process_next_event(&mut self) {
        // The coordinator holds a sender itself, so the channel never closes
        if let Ok(event) = self.event_rx.recv().await {
            self.handle_event(event);
        }
    }

    /// Apply every event already queued. Returns how many were applied.
    pub fn process_pending_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.event_rx.try_recv() {
            self.handle_event(event);
            applied += 1;
        }
        applied
    }

    /// Start (or restart) the connection for `alias`, reusing its client.
    fn connect_remote(&mut self, alias: &str) {
        let Some(config) = self.configs.get(alias).cloned() else {
            log::warn!("No stored configuration for remote '{}'", alias);
            if let Some(tab) = self.tabs.iter_mut().find(|t| t.is_remote_for(alias)) {
                tab.status = ConnectionStatus::Disconnected;
                tab.last_error = Some(CONFIG_NOT_FOUND.to_string());
            }
            return;
        };

        if let Some(client) = self.clients.get(alias) {
            if client.status() != ConnectionStatus::Disconnected {
                log::debug!("Remote '{}' is already {}", alias, client.status());
                return;
            }
            let built = client.config();
            if (&built.host, built.port, &built.token) != (&config.host, config.port, &config.token) {
                log::debug!("Configuration for '{}' changed, replacing client", alias);
                self.clients.remove(alias);
            }
        }
        if !self.clients.contains_key(alias) {
            self.next_instance += 1;
            let client = RemoteClient::new(
                self.next_instance,
                config,
                self.connector.clone(),
                self.options.clone(),
                self.runtime.clone(),
                self.event_tx.clone(),
            );
            self.clients.insert(alias.to_string(), client);
        }

        if let Some(tab) = self.tabs.iter_mut().find(|t| t.is_remote_for(alias)) {
            tab.status = ConnectionStatus::Connecting;
        }

        let Some(client) = self.clients.get(alias) else {
            return;
        };
        let pending = client.connect();
        let store = self.store.clone();
        let alias = alias.to_string();
        self.runtime.spawn(async move {
            if let Err(e) = pending.await {
                log::info!("Connection attempt to '{}' failed: {}", alias, e);
                return;
            }
            // Stores may do blocking file I/O
            let recorded = {
                let alias = alias.clone();
                tokio::task::spawn_blocking(move || store.update_last_connected(&alias)).await
            };
            match recorded {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    log::warn!("Failed to record last connection to '{}': {:#}", alias, e)
                }
                Err(e) => log::warn!("Recording last connection to '{}' panicked: {}", alias, e),
            }
        });
    }

    /// Mutate the tab for `alias` and publish if anything changed.
    fn update_tab(&mut self, alias: &str, update: impl FnOnce(&mut Tab)) {
        let Some(tab) = self.tabs.iter_mut().find(|t| t.is_remote_for(alias)) else {
            return;
        };
        let before = tab.clone();
        update(tab);
        if *tab != before {
            self.notify();
        }
    }

    fn notify(&self) {
        if self.state_handlers.is_empty() {
            return;
        }
        let snapshot = self.snapshot();
        for handler in &self.state_handlers {
            handler(&snapshot);
        }
    }
}
