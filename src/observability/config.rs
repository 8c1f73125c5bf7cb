//! Logging configuration
//!
//! All settings are loaded from environment variables:
//! - `ANALYTICS_LOG`: `EnvFilter` directive (default: `info`)
//! - `ANALYTICS_LOG_JSON`: emit JSON lines when `true` or `1`

/// Log output settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Filter directive, e.g. `info` or `redis_analytics=debug`
    pub filter: String,
    /// JSON lines instead of human-readable output
    pub json: bool,
    /// Include the event target (module path) in each line
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            filter: "info".to_string(),
            json: false,
            with_target: false,
        }
    }
}

impl LogConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_vars(
            std::env::var("ANALYTICS_LOG").ok(),
            std::env::var("ANALYTICS_LOG_JSON").ok(),
        )
    }

    fn from_vars(filter: Option<String>, json: Option<String>) -> Self {
        let defaults = LogConfig::default();
        LogConfig {
            filter: filter
                .filter(|f| !f.trim().is_empty())
                .unwrap_or(defaults.filter),
            json: json.map(|v| v == "true" || v == "1").unwrap_or(false),
            with_target: defaults.with_target,
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_unset() {
        let config = LogConfig::from_vars(None, None);
        assert_eq!(config, LogConfig::default());
    }

    #[test]
    fn test_vars_override_defaults() {
        let config = LogConfig::from_vars(
            Some("redis_analytics=debug".to_string()),
            Some("1".to_string()),
        );
        assert_eq!(config.filter, "redis_analytics=debug");
        assert!(config.json);
    }

    #[test]
    fn test_blank_filter_falls_back() {
        let config = LogConfig::from_vars(Some("  ".to_string()), Some("no".to_string()));
        assert_eq!(config.filter, "info");
        assert!(!config.json);
    }
}
