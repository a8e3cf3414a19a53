//! Session configuration
//!
//! Configuration can be built in code or loaded from TOML:
//!
//! ```toml
//! max_consecutive_read_errors = 8
//! read_error_backoff_ms = 50
//! ```

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use eyre::Context;
use serde::Deserialize;

const DEFAULT_MAX_CONSECUTIVE_READ_ERRORS: u32 = 16;
const DEFAULT_READ_ERROR_BACKOFF: Duration = Duration::from_millis(10);

/// Tuning for the background read loop
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Number of back-to-back read failures (other than the connection
    /// closing) after which the session shuts itself down. `None` or
    /// `Some(0)` never gives up; in TOML, write `0`.
    pub max_consecutive_read_errors: Option<u32>,

    /// Pause between a failed read and the next attempt
    #[serde(rename = "read_error_backoff_ms", with = "millis")]
    pub read_error_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            max_consecutive_read_errors: Some(DEFAULT_MAX_CONSECUTIVE_READ_ERRORS),
            read_error_backoff: DEFAULT_READ_ERROR_BACKOFF,
        }
    }
}

impl ClientConfig {
    /// The read failure limit, if there is one
    pub fn read_error_limit(&self) -> Option<u32> {
        self.max_consecutive_read_errors.filter(|&max| max > 0)
    }

    pub fn from_toml(contents: &str) -> eyre::Result<Self> {
        toml::from_str(contents).wrap_err("parsing client configuration")
    }

    pub fn load(mut r: impl Read) -> eyre::Result<Self> {
        let mut contents = String::new();
        r.read_to_string(&mut contents)
            .wrap_err("reading configuration contents")?;
        Self::from_toml(&contents)
    }

    pub fn from_path(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        tracing::debug!(config_path = %path.display(), "loading client configuration");
        let f = std::fs::File::open(path)
            .wrap_err_with(|| format!("opening configuration file {}", path.display()))?;
        Self::load(f)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(ms))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = ClientConfig::from_toml("").unwrap();
        assert_eq!(config, ClientConfig::default());
    }

    #[test]
    fn parse_full_config() {
        let config = ClientConfig::from_toml(
            r#"
            max_consecutive_read_errors = 3
            read_error_backoff_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.max_consecutive_read_errors, Some(3));
        assert_eq!(config.read_error_backoff, Duration::from_millis(250));
    }

    #[test]
    fn zero_read_error_limit_never_gives_up() {
        let config = ClientConfig::from_toml("max_consecutive_read_errors = 0").unwrap();
        assert_eq!(config.max_consecutive_read_errors, Some(0));
        assert_eq!(config.read_error_limit(), None);

        let config = ClientConfig {
            max_consecutive_read_errors: None,
            ..ClientConfig::default()
        };
        assert_eq!(config.read_error_limit(), None);

        assert_eq!(ClientConfig::default().read_error_limit(), Some(16));
    }

    #[test]
    fn invalid_config_is_an_error() {
        let err = ClientConfig::from_toml("read_error_backoff_ms = \"soon\"").unwrap_err();
        assert!(err.to_string().contains("parsing client configuration"));
    }

    #[test]
    fn load_from_file() -> eyre::Result<()> {
        let mut f = tempfile::NamedTempFile::new()?;
        writeln!(f, "read_error_backoff_ms = 1")?;

        let config = ClientConfig::from_path(f.path())?;
        assert_eq!(config.read_error_backoff, Duration::from_millis(1));
        assert_eq!(
            config.max_consecutive_read_errors,
            Some(DEFAULT_MAX_CONSECUTIVE_READ_ERRORS)
        );
        Ok(())
    }
}
