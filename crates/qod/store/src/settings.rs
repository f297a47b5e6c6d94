//! Connection settings for the document store.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where to connect and how long each class of operation may take.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    /// Database holding the QoD collections
    #[serde(default = "default_db_name")]
    pub db_name: String,

    /// Connection URL; the scheme selects the backend
    #[serde(default = "default_db_url")]
    pub db_url: String,

    #[serde(default)]
    pub timeouts: TimeoutSettings,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            db_name: default_db_name(),
            db_url: default_db_url(),
            timeouts: TimeoutSettings::default(),
        }
    }
}

impl StoreSettings {
    pub fn new(db_name: impl Into<String>, db_url: impl Into<String>) -> Self {
        Self {
            db_name: db_name.into(),
            db_url: db_url.into(),
            timeouts: TimeoutSettings::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutSettings) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Load settings from defaults, an optional file and `QOD_*` environment
    /// variables (`QOD_DB_URL`, `QOD_TIMEOUTS__SCAN_SECS`, ...), later
    /// sources overriding earlier ones.
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();

        builder = builder.add_source(config::Config::try_from(&StoreSettings::default())?);

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("QOD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

/// Per-operation time budgets, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,

    #[serde(default = "default_disconnect_secs")]
    pub disconnect_secs: u64,

    /// Multi-document reads
    #[serde(default = "default_scan_secs")]
    pub scan_secs: u64,

    /// Every other single round trip
    #[serde(default = "default_operation_secs")]
    pub operation_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            disconnect_secs: default_disconnect_secs(),
            scan_secs: default_scan_secs(),
            operation_secs: default_operation_secs(),
        }
    }
}

impl TimeoutSettings {
    pub fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    pub fn disconnect(&self) -> Duration {
        Duration::from_secs(self.disconnect_secs)
    }

    pub fn scan(&self) -> Duration {
        Duration::from_secs(self.scan_secs)
    }

    pub fn operation(&self) -> Duration {
        Duration::from_secs(self.operation_secs)
    }
}

fn default_db_name() -> String {
    "qod".to_string()
}

fn default_db_url() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_connect_secs() -> u64 {
    10
}

fn default_disconnect_secs() -> u64 {
    5
}

fn default_scan_secs() -> u64 {
    30
}

fn default_operation_secs() -> u64 {
    10
}
