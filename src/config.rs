use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::error::ConfigError;
use crate::mailbox::DEFAULT_TICK;
use crate::resolver::DEFAULT_CONFIRM_SIMILARITY;
use crate::theme::ThemeToml;

pub const DEFAULT_CONFIG_PATH: &str = "activity-timeline.toml";
pub const DEFAULT_HISTORY_CAP: usize = 2000;
pub const DEFAULT_VIEWPORT_ROWS: usize = 20;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    pub timeline: TimelineSection,
    pub viewport: ViewportSection,
    pub ticker: TickerSection,
    pub instructions: InstructionsSection,
    pub theme: ThemeToml,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimelineSection {
    /// Entries kept before the oldest finished ones are evicted. 0 disables eviction.
    pub history_cap: usize,
    /// Evicted correlation ids remembered for duplicate detection.
    pub retired_ids: usize,
}

impl Default for TimelineSection {
    fn default() -> Self {
        Self {
            history_cap: DEFAULT_HISTORY_CAP,
            retired_ids: DEFAULT_HISTORY_CAP,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ViewportSection {
    pub rows: usize,
}

impl Default for ViewportSection {
    fn default() -> Self {
        Self {
            rows: DEFAULT_VIEWPORT_ROWS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TickerSection {
    pub interval_ms: u64,
}

impl Default for TickerSection {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_TICK.as_millis() as u64,
        }
    }
}

impl TickerSection {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InstructionsSection {
    pub confirm_similarity: f64,
    pub author: String,
}

impl Default for InstructionsSection {
    fn default() -> Self {
        Self {
            confirm_similarity: DEFAULT_CONFIRM_SIMILARITY,
            author: "You".to_string(),
        }
    }
}

impl TimelineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Missing files fall back to defaults quietly; unreadable or invalid
    /// files fall back with a warning.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(ConfigError::Read { path, source }) if source.kind() == io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no config file, using defaults");
                Self::default()
            }
            Err(err) => {
                warn!(error = %err, "using default config");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/config_tests.rs"]
mod tests;
