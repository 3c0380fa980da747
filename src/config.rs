//! Configuration types.
//!
//! The whole configuration is loaded once from a YAML file, optionally
//! overridden from the environment, validated, and then passed explicitly
//! into the components that need it. Nothing reads configuration globally.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;
use tracing::level_filters::LevelFilter;

use crate::error::ConfigError;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "./transact.yaml";

/// Default bound on a single pattern match.
pub const DEFAULT_MATCH_TIMEOUT_MS: u64 = 5000;

/// Default SQLite busy timeout.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Root configuration.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub templates: Vec<TemplateConfig>,
    pub callback: CallbackConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub log: LogConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}

/// One sender template as written in the configuration file.
///
/// Patterns are kept as text here; they are compiled once when the
/// template registry is built.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateConfig {
    /// Sender address this template applies to.
    pub email: String,
    /// Human-readable template name, copied onto every transaction.
    pub name: String,
    #[serde(default)]
    pub date_pattern: String,
    #[serde(default)]
    pub amount_pattern: String,
    #[serde(default)]
    pub currency_pattern: String,
    #[serde(default)]
    pub account_number_pattern: String,
    #[serde(default)]
    pub vendor_reference_id_pattern: String,
    #[serde(default)]
    pub transaction_reference_id_pattern: String,
}

/// Where transaction notifications are forwarded.
#[derive(Debug, Deserialize)]
pub struct CallbackConfig {
    /// Callback endpoint receiving the POST.
    pub url: String,
    /// Shared token sent in the auth header.
    pub token: SecretString,
}

/// Inbound transport settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    /// Listen address of the ingest endpoint.
    pub address: String,
    /// Accepted mailbox local parts (case-insensitive).
    pub mailboxes: Vec<String>,
    /// Maximum number of messages processed concurrently.
    pub max_in_flight: usize,
    /// How long shutdown waits for in-flight messages.
    pub drain_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "0.0.0.0:2525".to_string(),
            mailboxes: Vec::new(),
            max_in_flight: 64,
            drain_timeout_secs: 20,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    /// Default level filter, used when `RUST_LOG` is not set.
    pub level: String,
    /// Optional log file; rotated daily.
    pub file: Option<PathBuf>,
    /// Emit JSON lines instead of human-readable text.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
            json: false,
        }
    }
}

impl LogConfig {
    /// Parse `level` as a plain level name (`trace` through `error`, or `off`).
    pub fn level_filter(&self) -> Result<LevelFilter, ConfigError> {
        self.level
            .trim()
            .parse::<LevelFilter>()
            .map_err(|_| ConfigError::InvalidValue {
                key: "log.level".into(),
                message: format!("invalid log level '{}'", self.level),
            })
    }
}

/// Storage settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub busy_timeout_ms: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/transactions.db"),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
        }
    }
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

/// Extraction engine settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractionConfig {
    pub match_timeout_ms: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            match_timeout_ms: DEFAULT_MATCH_TIMEOUT_MS,
        }
    }
}

impl ExtractionConfig {
    pub fn match_timeout(&self) -> Duration {
        Duration::from_millis(self.match_timeout_ms)
    }
}

impl AppConfig {
    /// Load, override from the environment, and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document without touching the environment.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// Apply `TRANSACT_*` environment overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("TRANSACT_CALLBACK_URL") {
            self.callback.url = url;
        }
        if let Ok(token) = std::env::var("TRANSACT_CALLBACK_TOKEN") {
            self.callback.token = SecretString::from(token);
        }
        if let Ok(path) = std::env::var("TRANSACT_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(address) = std::env::var("TRANSACT_LISTEN_ADDR") {
            self.server.address = address;
        }
    }

    /// Check values that would otherwise only fail at first use.
    ///
    /// Template patterns are not checked here. A bad pattern only disables
    /// extraction for its own template.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.callback.url.trim().is_empty() {
            return Err(ConfigError::MissingRequired {
                key: "callback.url".into(),
                hint: "Set it in the config file or via TRANSACT_CALLBACK_URL".into(),
            });
        }
        if let Err(e) = reqwest::Url::parse(&self.callback.url) {
            return Err(ConfigError::InvalidValue {
                key: "callback.url".into(),
                message: e.to_string(),
            });
        }
        if self.server.mailboxes.iter().all(|m| m.trim().is_empty()) {
            return Err(ConfigError::MissingRequired {
                key: "server.mailboxes".into(),
                hint: "At least one mailbox local part must be accepted".into(),
            });
        }
        if self.server.max_in_flight == 0 {
            return Err(ConfigError::InvalidValue {
                key: "server.maxInFlight".into(),
                message: "must be greater than zero".into(),
            });
        }
        self.log.level_filter()?;
        if self.extraction.match_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "extraction.matchTimeoutMs".into(),
                message: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    const SAMPLE: &str = r#"
templates:
  - email: alerts@natbank.example
    name: National Bank
    datePattern: "on (?P<date>[0-9]{8})"
    amountPattern: "(?P<amount>[0-9,.]{3,18}) on "
    vendorReferenceIdPattern: 'Description: (?P<vendorReferenceId>[0-9A-Za-z]{1,255})\.$'
callback:
  url: http://localhost:8080/transaction_callback
  token: token12345
server:
  address: 127.0.0.1:2525
  mailboxes: [payments, Alerts]
log:
  level: debug
  json: true
"#;

    #[test]
    fn parses_sample_document() {
        let config = AppConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.templates.len(), 1);
        let template = &config.templates[0];
        assert_eq!(template.email, "alerts@natbank.example");
        assert_eq!(template.name, "National Bank");
        assert_eq!(template.date_pattern, "on (?P<date>[0-9]{8})");
        assert!(template.currency_pattern.is_empty());
        assert_eq!(config.callback.token.expose_secret(), "token12345");
        assert_eq!(config.server.mailboxes, vec!["payments", "Alerts"]);
        assert!(config.log.json);
        config.validate().unwrap();
    }

    #[test]
    fn defaults_fill_missing_sections() {
        let config = AppConfig::from_yaml(
            "callback:\n  url: http://localhost/cb\n  token: t\nserver:\n  mailboxes: [a]\n",
        )
        .unwrap();
        assert!(config.templates.is_empty());
        assert_eq!(config.extraction.match_timeout(), Duration::from_secs(5));
        assert_eq!(config.database.busy_timeout(), Duration::from_secs(5));
        assert_eq!(config.log.level, "warn");
        assert_eq!(config.server.address, "0.0.0.0:2525");
        assert_eq!(config.server.max_in_flight, 64);
    }

    #[test]
    fn rejects_bad_callback_url() {
        let mut config = AppConfig::from_yaml(SAMPLE).unwrap();
        config.callback.url = "not a url".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn rejects_empty_mailboxes() {
        let mut config = AppConfig::from_yaml(SAMPLE).unwrap();
        config.server.mailboxes.clear();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingRequired { .. })
        ));
    }

    #[test]
    fn rejects_misspelled_log_level() {
        let yaml = SAMPLE.replace("level: debug", "level: inf0");
        let config = AppConfig::from_yaml(&yaml).unwrap();
        match config.validate() {
            Err(ConfigError::InvalidValue { key, message }) => {
                assert_eq!(key, "log.level");
                assert!(message.contains("inf0"));
            }
            other => panic!("expected invalid log level, got {:?}", other),
        }
    }

    #[test]
    fn log_level_is_case_insensitive() {
        let mut config = AppConfig::from_yaml(SAMPLE).unwrap();
        config.log.level = "INFO".into();
        assert_eq!(config.log.level_filter().unwrap(), LevelFilter::INFO);
        config.validate().unwrap();
    }

    #[test]
    fn load_reports_missing_file() {
        let tmp = tempfile::tempdir().unwrap();
        let err = AppConfig::load(tmp.path().join("absent.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn load_reads_file_from_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("transact.yaml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.templates[0].name, "National Bank");
    }
}
