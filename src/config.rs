//! TOML configuration and logging setup.
//!
//! ```toml
//! [store]
//! path = "board.db"
//! busy_timeout_ms = 5000
//!
//! [calendar]
//! utc_offset_minutes = 480      # omit for the host time zone
//! malformed_schedule = "clamp"  # or "reject"
//!
//! [runtime]
//! command_queue_bound = 256
//! event_capacity = 1024
//!
//! [logging]
//! filter = "info,hwboard=debug"
//! ansi = true
//! ```
//!
//! Every key is optional.

use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::{
    core::{
        allocation::{DayBoundary, MalformedSchedule, Planner},
        registry::Registry,
    },
    engine::Engine,
    events::ChangeBus,
    persist::{StoreError, sqlite::SqliteStore},
    runtime::RuntimeConfig,
};

/// Configuration failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("reading {}: {source}", .path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Config text is not valid.
    #[error("parsing config: {0}")]
    Toml(#[from] toml::de::Error),
    /// `utc_offset_minutes` outside +-24h.
    #[error("utc offset of {0} minutes is out of range")]
    InvalidOffset(i32),
    /// Subscriber could not be installed.
    #[error("logging: {0}")]
    Logging(String),
    /// Store could not be opened.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Top-level configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// `[store]`
    pub store: StoreConfig,
    /// `[calendar]`
    pub calendar: CalendarConfig,
    /// `[runtime]`
    pub runtime: RuntimeConfig,
    /// `[logging]`
    pub logging: LoggingConfig,
}

/// SQLite settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file.
    pub path: PathBuf,
    /// How long a connection waits on a locked database.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("hwboard.db"),
            busy_timeout_ms: 5_000,
        }
    }
}

/// Day allocation settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Fixed day boundary east of UTC; host time zone when absent.
    pub utc_offset_minutes: Option<i32>,
    /// Policy for deadlines before creation.
    pub malformed_schedule: MalformedSchedule,
}

impl CalendarConfig {
    /// Planner for these settings.
    pub fn planner(&self) -> Result<Planner, ConfigError> {
        let boundary = match self.utc_offset_minutes {
            None => DayBoundary::Local,
            Some(minutes) => {
                DayBoundary::from_offset_minutes(minutes).ok_or(ConfigError::InvalidOffset(minutes))?
            }
        };
        Ok(Planner::new(boundary, self.malformed_schedule))
    }
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive; `RUST_LOG` takes precedence.
    pub filter: String,
    /// Colored output.
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            ansi: true,
        }
    }
}

impl BoardConfig {
    /// Reads and parses a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Parses TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Opens the configured database and builds an engine over it.
    pub fn open_engine(&self) -> Result<Engine<SqliteStore>, ConfigError> {
        let planner = self.calendar.planner()?;
        let store = SqliteStore::open_with_timeout(
            &self.store.path,
            Duration::from_millis(self.store.busy_timeout_ms),
        )?;
        tracing::info!(path = %self.store.path.display(), "opened board database");
        Ok(Engine::with_parts(
            store,
            Registry::standard(),
            ChangeBus::with_capacity(self.runtime.event_capacity),
            planner,
        ))
    }
}

/// Installs a global fmt subscriber. Fails if one is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|err| ConfigError::Logging(err.to_string()))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .try_init()
        .map_err(|err| ConfigError::Logging(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = BoardConfig::from_toml_str("").unwrap();
        assert_eq!(config, BoardConfig::default());
        assert_eq!(config.store.busy_timeout_ms, 5_000);
        assert_eq!(config.runtime.command_queue_bound, 256);
        assert_eq!(config.calendar.planner().unwrap(), Planner::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = BoardConfig::from_toml_str(
            r#"
            [store]
            path = "/tmp/board.db"

            [calendar]
            utc_offset_minutes = -300
            malformed_schedule = "reject"

            [logging]
            filter = "hwboard=trace"
            ansi = false
            "#,
        )
        .unwrap();
        assert_eq!(config.store.path, PathBuf::from("/tmp/board.db"));
        assert_eq!(config.store.busy_timeout_ms, 5_000);
        let planner = config.calendar.planner().unwrap();
        assert_eq!(planner.boundary, DayBoundary::from_offset_minutes(-300).unwrap());
        assert_eq!(planner.malformed, MalformedSchedule::Reject);
        assert!(!config.logging.ansi);
    }

    #[test]
    fn bad_values_are_reported() {
        assert!(matches!(
            BoardConfig::from_toml_str("[calendar]\nmalformed_schedule = \"explode\""),
            Err(ConfigError::Toml(_))
        ));
        let config = BoardConfig::from_toml_str("[calendar]\nutc_offset_minutes = 100000").unwrap();
        assert!(matches!(config.calendar.planner(), Err(ConfigError::InvalidOffset(100000))));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = BoardConfig::load(dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn open_engine_creates_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BoardConfig::default();
        config.store.path = dir.path().join("nested").join("board.db");
        config.calendar.utc_offset_minutes = Some(0);
        let engine = config.open_engine().unwrap();
        assert!(config.store.path.exists());
        assert_eq!(engine.planner().boundary, DayBoundary::utc());
    }

    #[test]
    fn bad_offset_opens_no_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = BoardConfig::default();
        config.store.path = dir.path().join("board.db");
        config.calendar.utc_offset_minutes = Some(100_000);
        assert!(matches!(config.open_engine(), Err(ConfigError::InvalidOffset(100_000))));
        assert!(!config.store.path.exists());
    }
}
