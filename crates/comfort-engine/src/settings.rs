//! Engine settings from the environment

use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Runtime settings of the engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    /// Directory holding the JSON resources
    pub data_dir: PathBuf,
    /// Background poller period
    pub poll_interval: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}

impl EngineSettings {
    /// Settings rooted at a data directory, default poll interval
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Read `DATA_DIR` and `COMFORT_POLL_INTERVAL_MS`
    #[must_use]
    pub fn from_env() -> Self {
        let data_dir = std::env::var("DATA_DIR").unwrap_or_else(|_| DEFAULT_DATA_DIR.to_string());
        let poll_interval =
            parse_poll_interval(std::env::var("COMFORT_POLL_INTERVAL_MS").ok().as_deref());
        Self {
            data_dir: PathBuf::from(data_dir),
            poll_interval,
        }
    }
}

fn parse_poll_interval(raw: Option<&str>) -> Duration {
    let millis = match raw.map(str::trim) {
        None | Some("") => DEFAULT_POLL_INTERVAL_MS,
        Some(value) => match value.parse::<u64>() {
            Ok(ms) => ms.max(MIN_POLL_INTERVAL_MS),
            Err(_) => {
                tracing::warn!(
                    "Invalid COMFORT_POLL_INTERVAL_MS {:?}, using {}ms",
                    value,
                    DEFAULT_POLL_INTERVAL_MS
                );
                DEFAULT_POLL_INTERVAL_MS
            }
        },
    };
    Duration::from_millis(millis)
}
