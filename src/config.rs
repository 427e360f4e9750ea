//! Configuration for taskboard, read from `taskboard.toml`.
//!
//! Settings are layered file → environment → CLI:
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3141
//! dev = false
//!
//! [database]
//! path = ".taskboard/taskboard.db"
//!
//! [auth]
//! session_ttl_hours = 720
//! allow_dev_sign_in = false
//!
//! [recommender]
//! model = "gemini-1.5-flash-latest"
//! endpoint = "https://generativelanguage.googleapis.com/v1beta"
//! timeout_secs = 15
//! rate_limit_requests = 10
//! rate_limit_window_secs = 60
//!
//! [streak]
//! utc_offset_minutes = 0
//!
//! [logging]
//! level = "taskboard=info"
//! format = "pretty"
//! ```
//!
//! The recommender API key is normally supplied through `GEMINI_API_KEY`
//! rather than written to the file.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::errors::ConfigError;

pub const CONFIG_FILE_NAME: &str = "taskboard.toml";

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for a locally served front-end
    #[serde(default)]
    pub dev: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3141
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(".taskboard/taskboard.db")
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// Session handling. Identity itself comes from the external OAuth provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSection {
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u32,
    /// Enables `POST /api/auth/sign-in`, which issues a session for any email.
    #[serde(default)]
    pub allow_dev_sign_in: bool,
}

fn default_session_ttl_hours() -> u32 {
    720
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            session_ttl_hours: default_session_ttl_hours(),
            allow_dev_sign_in: false,
        }
    }
}

/// Duration recommender (generative-language API) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommenderSection {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Requests allowed per user within one window
    #[serde(default = "default_rate_limit_requests")]
    pub rate_limit_requests: u32,
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,
}

fn default_model() -> String {
    "gemini-1.5-flash-latest".to_string()
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_timeout_secs() -> u64 {
    15
}

fn default_rate_limit_requests() -> u32 {
    10
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

impl Default for RecommenderSection {
    fn default() -> Self {
        Self {
            model: default_model(),
            endpoint: default_endpoint(),
            api_key: None,
            timeout_secs: default_timeout_secs(),
            rate_limit_requests: default_rate_limit_requests(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreakSection {
    /// Offset from UTC used to decide which calendar day "today" is.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl StreakSection {
    pub fn offset(&self) -> Result<chrono::FixedOffset, ConfigError> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(chrono::FixedOffset::east_opt)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "streak.utc_offset_minutes".to_string(),
                message: format!("{} is outside -1439..=1439", self.utc_offset_minutes),
            })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
    /// When set, logs are also written to a daily-rolling file in this directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

fn default_log_level() -> String {
    "taskboard=info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
            dir: None,
        }
    }
}

/// The complete taskboard.toml configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskboardConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub recommender: RecommenderSection,
    #[serde(default)]
    pub streak: StreakSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl TaskboardConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&content)?)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load from an explicit path, or from `taskboard.toml` in the working
    /// directory, or fall back to defaults when neither exists.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let path = Path::new(CONFIG_FILE_NAME);
                if path.exists() {
                    Self::load(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize taskboard.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Recognised: `GEMINI_API_KEY`, `TASKBOARD_PORT`, `TASKBOARD_HOST`,
    /// `TASKBOARD_DB_PATH`.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()) {
            self.recommender.api_key = Some(key);
        }
        if let Some(port) = lookup("TASKBOARD_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "TASKBOARD_PORT".to_string(),
                message: format!("'{}' is not a port number", port),
            })?;
        }
        if let Some(host) = lookup("TASKBOARD_HOST") {
            self.server.host = host;
        }
        if let Some(path) = lookup("TASKBOARD_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        Ok(())
    }

    /// Socket address string the server binds to.
    pub fn bind_addr(&self) -> String {
        let host = if self.server.dev && self.server.host == default_host() {
            "0.0.0.0"
        } else {
            self.server.host.as_str()
        };
        format!("{}:{}", host, self.server.port)
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.server.port == 0 {
            warnings.push("server.port is 0: the OS will pick a random port".to_string());
        }
        if let Err(e) = self.streak.offset() {
            warnings.push(e.to_string());
        }
        if self.recommender.rate_limit_requests == 0 {
            warnings.push(
                "recommender.rate_limit_requests is 0: every recommendation will be rejected"
                    .to_string(),
            );
        }
        if self.recommender.rate_limit_window_secs == 0 {
            warnings.push("recommender.rate_limit_window_secs must be greater than 0".to_string());
        }
        if self.recommender.api_key.is_none() {
            warnings.push(
                "No recommender API key (set GEMINI_API_KEY): suggestions fall back to 30 minutes"
                    .to_string(),
            );
        }
        if self.auth.session_ttl_hours == 0 {
            warnings.push("auth.session_ttl_hours is 0: sessions expire immediately".to_string());
        }
        if self.auth.allow_dev_sign_in && !self.server.dev {
            warnings.push(
                "auth.allow_dev_sign_in is enabled outside dev mode: anyone can sign in by email"
                    .to_string(),
            );
        }

        warnings
    }
}

/// Default location of the database when no config says otherwise and the
/// user wants a per-user data directory instead of the working directory.
pub fn user_data_db_path() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("taskboard").join("taskboard.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_empty() {
        let config = TaskboardConfig::parse("").unwrap();
        assert_eq!(config.server.port, 3141);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.database.path, PathBuf::from(".taskboard/taskboard.db"));
        assert_eq!(config.auth.session_ttl_hours, 720);
        assert!(!config.auth.allow_dev_sign_in);
        assert_eq!(config.recommender.model, "gemini-1.5-flash-latest");
        assert_eq!(config.recommender.rate_limit_requests, 10);
        assert_eq!(config.streak.utc_offset_minutes, 0);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_parse_sections() {
        let config = TaskboardConfig::parse(
            r#"
            [server]
            port = 8080
            dev = true

            [recommender]
            rate_limit_requests = 3
            rate_limit_window_secs = 30

            [streak]
            utc_offset_minutes = -300

            [logging]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.port, 8080);
        assert!(config.server.dev);
        assert_eq!(config.recommender.rate_limit_requests, 3);
        assert_eq!(config.recommender.rate_limit_window_secs, 30);
        assert_eq!(config.streak.utc_offset_minutes, -300);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_parse_rejects_unknown_log_format() {
        let err = TaskboardConfig::parse("[logging]\nformat = \"xml\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("GEMINI_API_KEY", "secret"),
            ("TASKBOARD_PORT", "9000"),
            ("TASKBOARD_DB_PATH", "/tmp/tb.db"),
        ]);
        let mut config = TaskboardConfig::default();
        config
            .apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.recommender.api_key.as_deref(), Some("secret"));
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.database.path, PathBuf::from("/tmp/tb.db"));
    }

    #[test]
    fn test_env_override_invalid_port() {
        let mut config = TaskboardConfig::default();
        let err = config
            .apply_overrides_from(|k| (k == "TASKBOARD_PORT").then(|| "http".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("TASKBOARD_PORT"));
    }

    #[test]
    fn test_blank_api_key_is_ignored() {
        let mut config = TaskboardConfig::default();
        config
            .apply_overrides_from(|k| (k == "GEMINI_API_KEY").then(|| "  ".to_string()))
            .unwrap();
        assert!(config.recommender.api_key.is_none());
    }

    #[test]
    fn test_streak_offset() {
        let mut section = StreakSection::default();
        assert_eq!(section.offset().unwrap().local_minus_utc(), 0);
        section.utc_offset_minutes = 330;
        assert_eq!(section.offset().unwrap().local_minus_utc(), 330 * 60);
        section.utc_offset_minutes = 1440;
        assert!(section.offset().is_err());
    }

    #[test]
    fn test_streak_offset_overflow_is_an_error() {
        for minutes in [50_000_000, i32::MIN] {
            let section = StreakSection {
                utc_offset_minutes: minutes,
            };
            assert!(matches!(
                section.offset(),
                Err(ConfigError::InvalidValue { ref key, .. }) if key == "streak.utc_offset_minutes"
            ));
        }
    }

    #[test]
    fn test_bind_addr_dev_mode_listens_on_all_interfaces() {
        let mut config = TaskboardConfig::default();
        assert_eq!(config.bind_addr(), "127.0.0.1:3141");
        config.server.dev = true;
        assert_eq!(config.bind_addr(), "0.0.0.0:3141");
        config.server.host = "10.0.0.5".to_string();
        assert_eq!(config.bind_addr(), "10.0.0.5:3141");
    }

    #[test]
    fn test_validate_default_warns_only_about_api_key() {
        let config = TaskboardConfig::default();
        let warnings = config.validate();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("GEMINI_API_KEY"));
    }

    #[test]
    fn test_validate_flags_bad_values() {
        let mut config = TaskboardConfig::default();
        config.recommender.api_key = Some("k".into());
        config.streak.utc_offset_minutes = 5000;
        config.recommender.rate_limit_requests = 0;
        config.auth.allow_dev_sign_in = true;
        let warnings = config.validate();
        assert_eq!(warnings.len(), 3);
        assert!(warnings.iter().any(|w| w.contains("utc_offset_minutes")));
        assert!(warnings.iter().any(|w| w.contains("rate_limit_requests")));
        assert!(warnings.iter().any(|w| w.contains("allow_dev_sign_in")));
    }

    #[test]
    fn test_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);

        let mut config = TaskboardConfig::default();
        config.server.port = 4000;
        config.recommender.rate_limit_requests = 2;
        config.save(&path).unwrap();

        let loaded = TaskboardConfig::load(&path).unwrap();
        assert_eq!(loaded.server.port, 4000);
        assert_eq!(loaded.recommender.rate_limit_requests, 2);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = TaskboardConfig::load_or_default(Some(&dir.path().join("nope.toml")))
            .unwrap_err();
        assert!(err.to_string().contains("nope.toml"));
    }
}
