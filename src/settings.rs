//! Settings file holding the configured remote instances.

use anyhow::{Context, Result};
use peerdeck_core::client::RemoteConfig;
use peerdeck_core::protocol::timestamp_now;
use peerdeck_remote_client::RemoteStore;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Get the config directory path
pub fn get_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("peerdeck")
}

pub fn get_settings_path() -> PathBuf {
    get_config_dir().join("settings.json")
}

/// On-disk settings. Unknown fields are dropped on rewrite.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub remotes: Vec<RemoteConfig>,
}

/// `RemoteStore` over a JSON settings file.
///
/// Every update is a locked read-modify-write: a process-level mutex guards
/// against concurrent writers in this process, and on Unix `flock` guards
/// against other processes. Reads take a shared `flock` so they never see a
/// file another writer has truncated but not yet rewritten. The file is kept at mode 0600 since it holds
/// tokens.
pub struct SettingsStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Store at the default location in the user's config directory.
    pub fn open_default() -> Self {
        Self::new(get_settings_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Settings> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        if !self.path.exists() {
            log::info!("Settings file not found at {}, using defaults", self.path.display());
            return Ok(Settings::default());
        }
        let content = self
            .read_locked()
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        parse_settings(&content)
            .with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    #[cfg(unix)]
    fn read_locked(&self) -> std::io::Result<String> {
        use std::io::Read;

        let mut file = std::fs::File::open(&self.path)?;
        // Shared lock, released when `file` is dropped
        unsafe { libc::flock(std::os::unix::io::AsRawFd::as_raw_fd(&file), libc::LOCK_SH) };
        let mut content = String::new();
        file.read_to_string(&mut content)?;
        Ok(content)
    }

    #[cfg(not(unix))]
    fn read_locked(&self) -> std::io::Result<String> {
        std::fs::read_to_string(&self.path)
    }

    /// Add a remote, replacing any existing remote with the same alias.
    pub fn upsert_remote(&self, config: RemoteConfig) -> Result<()> {
        self.update(|settings| {
            match settings.remotes.iter_mut().find(|r| r.alias == config.alias) {
                Some(existing) => *existing = config,
                None => settings.remotes.push(config),
            }
            Ok(())
        })
    }

    /// Returns whether a remote was removed.
    pub fn remove_remote(&self, alias: &str) -> Result<bool> {
        let mut removed = false;
        self.update(|settings| {
            let before = settings.remotes.len();
            settings.remotes.retain(|r| r.alias != alias);
            removed = settings.remotes.len() != before;
            Ok(())
        })?;
        Ok(removed)
    }

    /// Atomically load, update, and save the settings file.
    fn update<F>(&self, updater: F) -> Result<()>
    where
        F: FnOnce(&mut Settings) -> Result<()>,
    {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        #[cfg(unix)]
        {
            use std::io::{Read, Seek, Write};
            use std::os::unix::fs::PermissionsExt;

            let mut file = std::fs::OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(&self.path)?;

            // Exclusive lock, released when `file` is dropped
            unsafe { libc::flock(std::os::unix::io::AsRawFd::as_raw_fd(&file), libc::LOCK_EX) };

            let mut content = String::new();
            file.read_to_string(&mut content)?;
            let mut settings = parse_settings(&content)?;

            updater(&mut settings)?;

            let new_content = serde_json::to_string_pretty(&settings)?;
            file.seek(std::io::SeekFrom::Start(0))?;
            file.set_len(0)?;
            file.write_all(new_content.as_bytes())?;

            let _ = std::fs::set_permissions(&self.path, std::fs::Permissions::from_mode(0o600));
            return Ok(());
        }

        #[cfg(not(unix))]
        {
            let mut settings = match std::fs::read_to_string(&self.path) {
                Ok(content) => parse_settings(&content)?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
                Err(e) => return Err(e.into()),
            };
            updater(&mut settings)?;
            std::fs::write(&self.path, serde_json::to_string_pretty(&settings)?)?;
            Ok(())
        }
    }
}

fn parse_settings(content: &str) -> Result<Settings> {
    if content.trim().is_empty() {
        return Ok(Settings::default());
    }
    Ok(serde_json::from_str(content)?)
}

impl RemoteStore for SettingsStore {
    fn list_remotes(&self) -> Result<Vec<RemoteConfig>> {
        Ok(self.load()?.remotes)
    }

    fn update_last_connected(&self, alias: &str) -> Result<()> {
        self.update(|settings| {
            let remote = settings
                .remotes
                .iter_mut()
                .find(|r| r.alias == alias)
                .ok_or_else(|| anyhow::anyhow!("Remote not found: {}", alias))?;
            remote.last_connected = Some(timestamp_now());
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, SettingsStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SettingsStore::new(dir.path().join("nested").join("settings.json"));
        (dir, store)
    }

    #[test]
    fn missing_file_lists_no_remotes() {
        let (_dir, store) = store();
        assert!(store.list_remotes().unwrap().is_empty());
    }

    #[test]
    fn upsert_and_remove_persist_in_order() {
        let (_dir, store) = store();
        store.upsert_remote(RemoteConfig::new("work", "10.0.0.2", 19100, "t1")).unwrap();
        store.upsert_remote(RemoteConfig::new("home", "10.0.0.3", 19100, "t2")).unwrap();
        store.upsert_remote(RemoteConfig::new("work", "10.0.0.9", 19200, "t3")).unwrap();

        let remotes = store.list_remotes().unwrap();
        assert_eq!(remotes.len(), 2);
        assert_eq!(remotes[0].alias, "work");
        assert_eq!(remotes[0].host, "10.0.0.9");
        assert_eq!(remotes[0].port, 19200);

        assert!(store.remove_remote("work").unwrap());
        assert!(!store.remove_remote("work").unwrap());
        let aliases: Vec<String> = store.list_remotes().unwrap().into_iter().map(|r| r.alias).collect();
        assert_eq!(aliases, vec!["home"]);
    }

    #[test]
    fn last_connected_is_stamped_for_known_alias() {
        let (_dir, store) = store();
        store.upsert_remote(RemoteConfig::new("work", "h", 1, "t")).unwrap();
        store.update_last_connected("work").unwrap();

        let remote = &store.list_remotes().unwrap()[0];
        let stamp = remote.last_connected.as_deref().unwrap();
        assert!(time::OffsetDateTime::parse(stamp, &time::format_description::well_known::Rfc3339).is_ok());
        assert!(store.update_last_connected("missing").is_err());
    }

    #[test]
    fn reads_file_written_by_hand() {
        let (dir, _) = store();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"remotes":[{"alias":"lab","host":"lab.local","port":19100,"token":"abc"}],"theme":"dark"}"#,
        )
        .unwrap();
        let store = SettingsStore::new(&path);
        let remotes = store.list_remotes().unwrap();
        assert_eq!(remotes[0].alias, "lab");
        assert!(remotes[0].last_connected.is_none());
    }

    #[test]
    fn corrupt_file_is_an_error_and_left_alone() {
        let (dir, _) = store();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = SettingsStore::new(&path);
        assert!(store.list_remotes().is_err());
        assert!(store.upsert_remote(RemoteConfig::new("a", "h", 1, "t")).is_err());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{ not json");
    }

    #[test]
    fn readers_never_see_a_half_written_file() {
        let (_dir, writer) = store();
        writer.upsert_remote(RemoteConfig::new("work", "h", 1, "t")).unwrap();
        // Separate store, as another process would have
        let reader = SettingsStore::new(writer.path());

        let stop = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));
        let writing = {
            let stop = stop.clone();
            std::thread::spawn(move || {
                while !stop.load(std::sync::atomic::Ordering::SeqCst) {
                    writer.update_last_connected("work").unwrap();
                }
            })
        };

        for _ in 0..2_000 {
            let remotes = reader.list_remotes().unwrap();
            assert_eq!(remotes.len(), 1, "configured remote vanished mid-write");
        }
        stop.store(true, std::sync::atomic::Ordering::SeqCst);
        writing.join().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn settings_file_is_private() {
        use std::os::unix::fs::PermissionsExt;
        let (_dir, store) = store();
        store.upsert_remote(RemoteConfig::new("a", "h", 1, "t")).unwrap();
        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
