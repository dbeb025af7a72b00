//! Engine configuration, loadable from TOML.
//!
//! ```toml
//! enabled = true
//! inbox_size = 4096
//! budget_per_tick = 8192
//! ```
//!
//! Every field is optional; missing fields take their defaults. The processor
//! factory is not part of the file: it is supplied in code through
//! [`System::with_processor_factory`](crate::system::System::with_processor_factory).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub const DEFAULT_INBOX_SIZE: usize = 4096;
pub const DEFAULT_BUDGET_PER_TICK: usize = 8192;

// ===========================================================================
// Errors
// ===========================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Config
// ===========================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// When false, [`System::new`](crate::system::System::new) builds an inert system.
    pub enabled: bool,
    /// Capacity of each chunk's mailbox before the router starts coalescing.
    pub inbox_size: usize,
    /// Base number of events a chunk may process per tick.
    pub budget_per_tick: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            inbox_size: DEFAULT_INBOX_SIZE,
            budget_per_tick: DEFAULT_BUDGET_PER_TICK,
        }
    }
}

impl Config {
    /// Parse a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Self::parse(text, Path::new("<inline>"))
    }

    /// Read and parse a TOML config file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, path)
    }

    fn parse(text: &str, file: &Path) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text).map_err(|e| ConfigError::Parse {
            file: file.to_path_buf(),
            detail: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.inbox_size == 0 {
            return Err(ConfigError::Invalid("inbox_size must be at least 1".into()));
        }
        if self.budget_per_tick == 0 {
            return Err(ConfigError::Invalid("budget_per_tick must be at least 1".into()));
        }
        Ok(())
    }

    /// Render as TOML.
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = Config::default();
        assert!(c.enabled);
        assert_eq!(c.inbox_size, 4096);
        assert_eq!(c.budget_per_tick, 8192);
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(Config::from_toml_str("").unwrap(), Config::default());
    }

    #[test]
    fn partial_toml_overrides_fields() {
        let c = Config::from_toml_str("inbox_size = 8\nenabled = false\n").unwrap();
        assert!(!c.enabled);
        assert_eq!(c.inbox_size, 8);
        assert_eq!(c.budget_per_tick, DEFAULT_BUDGET_PER_TICK);
    }

    #[test]
    fn unknown_field_is_a_parse_error() {
        let err = Config::from_toml_str("inbox = 8").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn zero_budget_is_invalid() {
        let err = Config::from_toml_str("budget_per_tick = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn toml_text_parses_back() {
        let c = Config {
            enabled: false,
            inbox_size: 3,
            budget_per_tick: 17,
        };
        let text = c.to_toml_string().unwrap();
        assert_eq!(Config::from_toml_str(&text).unwrap(), c);
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = Config::from_toml_file(Path::new("/nonexistent/redstone.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
