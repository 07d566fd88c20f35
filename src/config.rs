//! Configuration loaded from the environment
//!
//! # Environment Variables
//!
//! - `WEBAGENT_IMAGE_LOG_LEVEL`: trace|debug|info|warn|error - default: "info"
//! - `WEBAGENT_IMAGE_LOG_JSON`: JSON log lines (true|false) - default: "false"
//! - `WEBAGENT_IMAGE_RECIPE`: Recipe file used when `--recipe` is not given
//! - `WEBAGENT_IMAGE_STRICT_INSTALLER`: Require a checksum-pinned installer - default: "false"
//! - `WEBAGENT_IMAGE_KEEP_INTERMEDIATE`: Keep intermediate layer tags - default: "false"
//! - `WEBAGENT_IMAGE_FETCH_TIMEOUT`: Host-side installer fetch timeout in seconds - default: "60"
//! - `WEBAGENT_IMAGE_STOP_TIMEOUT`: Grace period when stopping a launched container - default: "10"
//!
//! The container engine connection honors the standard `DOCKER_HOST`.
//! Command-line flags override all of the above.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 60;
const DEFAULT_STOP_TIMEOUT_SECS: u64 = 10;
const MAX_FETCH_TIMEOUT_SECS: u64 = 600;
const MAX_STOP_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),

    #[error("Failed to parse {field}: {error}")]
    ParseError { field: String, error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageConfig {
    pub log_level: String,
    pub log_json: bool,
    pub recipe_path: Option<PathBuf>,
    pub strict_installer: bool,
    pub keep_intermediate: bool,
    pub fetch_timeout_secs: u64,
    pub stop_timeout_secs: u64,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_json: false,
            recipe_path: None,
            strict_installer: false,
            keep_intermediate: false,
            fetch_timeout_secs: DEFAULT_FETCH_TIMEOUT_SECS,
            stop_timeout_secs: DEFAULT_STOP_TIMEOUT_SECS,
        }
    }
}

fn read_var<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    match env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => {
            raw.trim()
                .to_lowercase()
                .parse::<T>()
                .map_err(|e| ConfigError::ParseError {
                    field: key.to_string(),
                    error: format!("'{}': {}", raw, e),
                })
        }
        _ => Ok(default),
    }
}

impl ImageConfig {
    /// Defaults overridden by any `WEBAGENT_IMAGE_*` variables that are set.
    ///
    /// Malformed values are reported instead of being silently ignored.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        Ok(Self {
            log_level: read_var("WEBAGENT_IMAGE_LOG_LEVEL", defaults.log_level)?,
            log_json: read_var("WEBAGENT_IMAGE_LOG_JSON", defaults.log_json)?,
            recipe_path: env::var("WEBAGENT_IMAGE_RECIPE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(PathBuf::from),
            strict_installer: read_var(
                "WEBAGENT_IMAGE_STRICT_INSTALLER",
                defaults.strict_installer,
            )?,
            keep_intermediate: read_var(
                "WEBAGENT_IMAGE_KEEP_INTERMEDIATE",
                defaults.keep_intermediate,
            )?,
            fetch_timeout_secs: read_var(
                "WEBAGENT_IMAGE_FETCH_TIMEOUT",
                defaults.fetch_timeout_secs,
            )?,
            stop_timeout_secs: read_var("WEBAGENT_IMAGE_STOP_TIMEOUT", defaults.stop_timeout_secs)?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "Fetch timeout must be at least 1 second".to_string(),
            ));
        }
        if self.fetch_timeout_secs > MAX_FETCH_TIMEOUT_SECS {
            return Err(ConfigError::ValidationFailed(
                "Fetch timeout cannot exceed 10 minutes".to_string(),
            ));
        }
        if self.stop_timeout_secs > MAX_STOP_TIMEOUT_SECS {
            return Err(ConfigError::ValidationFailed(
                "Stop timeout cannot exceed 5 minutes".to_string(),
            ));
        }

        match self.log_level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => {
                return Err(ConfigError::ValidationFailed(format!(
                    "Invalid log level: {}. Valid options: trace, debug, info, warn, error",
                    self.log_level
                )))
            }
        }

        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_timeout_secs)
    }
}

impl fmt::Display for ImageConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "webagent-image Configuration:")?;
        writeln!(f, "  Log Level: {}", self.log_level)?;
        writeln!(f, "  JSON Logs: {}", self.log_json)?;
        if let Some(ref path) = self.recipe_path {
            writeln!(f, "  Recipe: {}", path.display())?;
        }
        writeln!(f, "  Strict Installer: {}", self.strict_installer)?;
        writeln!(f, "  Keep Intermediate: {}", self.keep_intermediate)?;
        writeln!(f, "  Fetch Timeout: {}s", self.fetch_timeout_secs)?;
        writeln!(f, "  Stop Timeout: {}s", self.stop_timeout_secs)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 7] = [
        "WEBAGENT_IMAGE_LOG_LEVEL",
        "WEBAGENT_IMAGE_LOG_JSON",
        "WEBAGENT_IMAGE_RECIPE",
        "WEBAGENT_IMAGE_STRICT_INSTALLER",
        "WEBAGENT_IMAGE_KEEP_INTERMEDIATE",
        "WEBAGENT_IMAGE_FETCH_TIMEOUT",
        "WEBAGENT_IMAGE_STOP_TIMEOUT",
    ];

    /// Helper to temporarily set environment variables for testing
    struct EnvGuard {
        key: String,
        old_value: Option<String>,
    }

    impl EnvGuard {
        fn set(key: &str, value: &str) -> Self {
            let old_value = env::var(key).ok();
            env::set_var(key, value);
            Self {
                key: key.to_string(),
                old_value,
            }
        }

        fn unset(key: &str) -> Self {
            let old_value = env::var(key).ok();
            env::remove_var(key);
            Self {
                key: key.to_string(),
                old_value,
            }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            match &self.old_value {
                Some(v) => env::set_var(&self.key, v),
                None => env::remove_var(&self.key),
            }
        }
    }

    fn clear_all() -> Vec<EnvGuard> {
        VARS.iter().map(|key| EnvGuard::unset(key)).collect()
    }

    #[test]
    #[serial]
    fn test_defaults_without_environment() {
        let _guards = clear_all();

        let config = ImageConfig::from_env().unwrap();
        assert_eq!(config, ImageConfig::default());
        assert_eq!(config.fetch_timeout(), Duration::from_secs(60));
        assert_eq!(config.stop_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_environment_variable_parsing() {
        let _cleared = clear_all();
        let _guards = vec![
            EnvGuard::set("WEBAGENT_IMAGE_LOG_LEVEL", "DEBUG"),
            EnvGuard::set("WEBAGENT_IMAGE_LOG_JSON", "true"),
            EnvGuard::set("WEBAGENT_IMAGE_RECIPE", "/etc/webagent/recipe.yaml"),
            EnvGuard::set("WEBAGENT_IMAGE_STRICT_INSTALLER", "TRUE"),
            EnvGuard::set("WEBAGENT_IMAGE_KEEP_INTERMEDIATE", "false"),
            EnvGuard::set("WEBAGENT_IMAGE_FETCH_TIMEOUT", "120"),
            EnvGuard::set("WEBAGENT_IMAGE_STOP_TIMEOUT", "30"),
        ];

        let config = ImageConfig::from_env().unwrap();
        assert_eq!(config.log_level, "debug");
        assert!(config.log_json);
        assert_eq!(
            config.recipe_path,
            Some(PathBuf::from("/etc/webagent/recipe.yaml"))
        );
        assert!(config.strict_installer);
        assert!(!config.keep_intermediate);
        assert_eq!(config.fetch_timeout_secs, 120);
        assert_eq!(config.stop_timeout_secs, 30);
    }

    #[test]
    #[serial]
    fn test_malformed_value_is_reported() {
        let _cleared = clear_all();
        let _guard = EnvGuard::set("WEBAGENT_IMAGE_FETCH_TIMEOUT", "soon");

        match ImageConfig::from_env() {
            Err(ConfigError::ParseError { field, .. }) => {
                assert_eq!(field, "WEBAGENT_IMAGE_FETCH_TIMEOUT")
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_validate_timeout_bounds() {
        let config = ImageConfig {
            fetch_timeout_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ImageConfig {
            fetch_timeout_secs: 601,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ImageConfig {
            fetch_timeout_secs: 600,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_log_level() {
        let config = ImageConfig {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Invalid log level: loud"));
    }

    #[test]
    fn test_display() {
        let config = ImageConfig {
            recipe_path: Some(PathBuf::from("recipe.yaml")),
            ..Default::default()
        };
        let text = config.to_string();
        assert!(text.contains("Log Level: info"));
        assert!(text.contains("Recipe: recipe.yaml"));
        assert!(text.contains("Fetch Timeout: 60s"));
    }
}
