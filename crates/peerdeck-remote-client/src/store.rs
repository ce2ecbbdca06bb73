use anyhow::Result;
use parking_lot::Mutex;
use peerdeck_core::client::RemoteConfig;
use peerdeck_core::protocol::timestamp_now;

/// Persisted remote configuration, as the coordinator consumes it.
pub trait RemoteStore: Send + Sync + 'static {
    /// All configured remotes, in display order.
    fn list_remotes(&self) -> Result<Vec<RemoteConfig>>;
    /// Record a successful authentication with `alias` at the current time.
    fn update_last_connected(&self, alias: &str) -> Result<()>;
}

/// Store that keeps remotes in memory only.
#[derive(Default)]
pub struct InMemoryStore {
    remotes: Mutex<Vec<RemoteConfig>>,
}

impl InMemoryStore {
    pub fn new(remotes: Vec<RemoteConfig>) -> Self {
        Self {
            remotes: Mutex::new(remotes),
        }
    }

    /// Add a remote, or replace the one with the same alias in place.
    pub fn upsert(&self, config: RemoteConfig) {
        let mut remotes = self.remotes.lock();
        match remotes.iter_mut().find(|r| r.alias == config.alias) {
            Some(existing) => *existing = config,
            None => remotes.push(config),
        }
    }

    /// Returns whether a remote was removed.
    pub fn remove(&self, alias: &str) -> bool {
        let mut remotes = self.remotes.lock();
        let before = remotes.len();
        remotes.retain(|r| r.alias != alias);
        remotes.len() != before
    }

    pub fn get(&self, alias: &str) -> Option<RemoteConfig> {
        self.remotes.lock().iter().find(|r| r.alias == alias).cloned()
    }
}

impl RemoteStore for InMemoryStore {
    fn list_remotes(&self) -> Result<Vec<RemoteConfig>> {
        Ok(self.remotes.lock().clone())
    }

    fn update_last_connected(&self, alias: &str) -> Result<()> {
        let mut remotes = self.remotes.lock();
        let remote = remotes
            .iter_mut()
            .find(|r| r.alias == alias)
            .ok_or_else(|| anyhow::anyhow!("Remote not found: {}", alias))?;
        remote.last_connected = Some(timestamp_now());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_keeps_position_of_existing_alias() {
        let store = InMemoryStore::new(vec![
            RemoteConfig::new("a", "h1", 1, "t"),
            RemoteConfig::new("b", "h2", 2, "t"),
        ]);
        store.upsert(RemoteConfig::new("a", "h3", 3, "t2"));
        store.upsert(RemoteConfig::new("c", "h4", 4, "t"));

        let aliases: Vec<String> = store
            .list_remotes()
            .unwrap()
            .into_iter()
            .map(|r| r.alias)
            .collect();
        assert_eq!(aliases, vec!["a", "b", "c"]);
        assert_eq!(store.get("a").unwrap().host, "h3");
    }

    #[test]
    fn update_last_connected_stamps_known_alias_only() {
        let store = InMemoryStore::new(vec![RemoteConfig::new("a", "h", 1, "t")]);
        store.update_last_connected("a").unwrap();
        assert!(store.get("a").unwrap().last_connected.is_some());
        assert!(store.update_last_connected("missing").is_err());
    }

    #[test]
    fn remove_reports_whether_anything_changed() {
        let store = InMemoryStore::new(vec![RemoteConfig::new("a", "h", 1, "t")]);
        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert!(store.list_remotes().unwrap().is_empty());
    }
}
