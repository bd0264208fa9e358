use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ClientError;
use crate::synchronizer::SyncOptions;

/// Which local storage backs the persister of every store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistenceKind {
    /// One SQLite file per store id (`{data_dir}/{store_id}.db`).
    Sqlite,
    /// One JSON file per store id, like a browser's local storage.
    LocalStorage,
}

impl FromStr for PersistenceKind {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "local-storage" | "local" => Ok(Self::LocalStorage),
            _ => Err(ClientError::InvalidConfig {
                name: "LARDER_PERSISTENCE",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base websocket URL of the sync server, e.g. `ws://localhost:8787`.
    /// `None` keeps every store local-only.
    pub sync_url: Option<String>,
    pub data_dir: PathBuf,
    pub persistence: PersistenceKind,
    /// Quiet period before a list's values are copied into its index row.
    pub snapshot_debounce: Duration,
    pub max_reconnect_delay: Duration,
    pub connection_timeout: Duration,
    pub auto_save_delay: Duration,
}

impl ClientConfig {
    /// Local-only configuration with default tunables.
    pub fn local(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            sync_url: None,
            data_dir: data_dir.into(),
            persistence: PersistenceKind::Sqlite,
            snapshot_debounce: Duration::from_millis(300),
            max_reconnect_delay: Duration::from_millis(1000),
            connection_timeout: Duration::from_millis(1000),
            auto_save_delay: Duration::from_millis(50),
        }
    }

    /// Read `LARDER_SYNC_URL`, `LARDER_DATA_DIR` and `LARDER_PERSISTENCE`.
    pub fn from_env() -> Result<Self, ClientError> {
        let data_dir = std::env::var("LARDER_DATA_DIR").unwrap_or_else(|_| "./larder-data".into());
        let mut config = Self::local(data_dir);

        config.sync_url = std::env::var("LARDER_SYNC_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());
        if let Ok(kind) = std::env::var("LARDER_PERSISTENCE") {
            config.persistence = kind.parse()?;
        }
        Ok(config)
    }

    pub fn with_sync_url(mut self, url: impl Into<String>) -> Self {
        self.sync_url = Some(url.into());
        self
    }

    pub fn with_persistence(mut self, persistence: PersistenceKind) -> Self {
        self.persistence = persistence;
        self
    }

    /// Synchronizer settings, or `None` when running local-only.
    pub fn sync_options(&self) -> Option<SyncOptions> {
        self.sync_url.as_ref().map(|base_url| SyncOptions {
            base_url: base_url.clone(),
            connection_timeout: self.connection_timeout,
            max_reconnect_delay: self.max_reconnect_delay,
        })
    }

    pub fn with_snapshot_debounce(mut self, window: Duration) -> Self {
        self.snapshot_debounce = window;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_persistence_kinds() {
        assert_eq!("sqlite".parse::<PersistenceKind>().unwrap(), PersistenceKind::Sqlite);
        assert_eq!(
            " Local-Storage ".parse::<PersistenceKind>().unwrap(),
            PersistenceKind::LocalStorage
        );
        assert!("indexeddb".parse::<PersistenceKind>().is_err());
    }

    #[test]
    fn local_defaults() {
        let config = ClientConfig::local("/tmp/larder").with_sync_url("ws://localhost:8787");
        assert_eq!(config.sync_url.as_deref(), Some("ws://localhost:8787"));
        assert_eq!(config.snapshot_debounce, Duration::from_millis(300));
        assert_eq!(config.max_reconnect_delay, Duration::from_millis(1000));
        assert_eq!(config.persistence, PersistenceKind::Sqlite);

        let fast = config.with_snapshot_debounce(Duration::from_millis(20));
        let options = fast.sync_options().unwrap();
        assert_eq!(fast.snapshot_debounce, Duration::from_millis(20));
        assert_eq!(options.connection_timeout, Duration::from_millis(1000));
        assert!(ClientConfig::local("/tmp/larder").sync_options().is_none());
    }

    #[test]
    fn reads_environment() {
        // SAFETY: no other test reads or writes the LARDER_* variables.
        unsafe {
            std::env::set_var("LARDER_DATA_DIR", "/var/lib/larder");
            std::env::set_var("LARDER_SYNC_URL", " ");
            std::env::set_var("LARDER_PERSISTENCE", "local");
        }
        let config = ClientConfig::from_env().unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/larder"));
        assert_eq!(config.sync_url, None);
        assert_eq!(config.persistence, PersistenceKind::LocalStorage);

        unsafe { std::env::set_var("LARDER_PERSISTENCE", "indexeddb") };
        assert!(matches!(
            ClientConfig::from_env(),
            Err(ClientError::InvalidConfig { name: "LARDER_PERSISTENCE", .. })
        ));

        unsafe {
            std::env::remove_var("LARDER_DATA_DIR");
            std::env::remove_var("LARDER_SYNC_URL");
            std::env::remove_var("LARDER_PERSISTENCE");
        }
    }
}
