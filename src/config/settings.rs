use crate::error::ConfigError;
use crate::events::WatchTarget;
use crate::matcher::ErrorSignature;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Upper bound for every configured duration (30 days)
pub const MAX_DURATION_SECS: u64 = 30 * 86_400;

/// Application configuration, read once at startup
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// Optional file receiving timestamped status messages
    #[serde(default)]
    pub status_log: Option<PathBuf>,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub process_manager: ProcessManagerConfig,

    #[serde(default)]
    pub signature: ErrorSignature,

    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// Global timing constants, all in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimingConfig {
    /// Steady-state poll interval per file
    pub poll_interval_secs: u64,
    /// Poll interval while a file is missing or erroring
    pub backoff_interval_secs: u64,
    /// Silence after which an opted-in target is restarted
    pub inactivity_timeout_secs: u64,
    /// How often the inactivity watchdog sweeps
    pub watchdog_interval_secs: u64,
    /// Default delay between an error-triggered stop and its restart
    pub restart_delay_secs: u64,
    /// Delay before retrying a failed scheduled restart
    pub retry_delay_secs: u64,
    /// How often the restart scheduler sweeps
    pub scheduler_interval_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 1,
            backoff_interval_secs: 5,
            inactivity_timeout_secs: 300,
            watchdog_interval_secs: 30,
            restart_delay_secs: 300,
            retry_delay_secs: 60,
            scheduler_interval_secs: 10,
        }
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn backoff_interval(&self) -> Duration {
        Duration::from_secs(self.backoff_interval_secs)
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn watchdog_interval(&self) -> Duration {
        Duration::from_secs(self.watchdog_interval_secs)
    }

    pub fn restart_delay(&self) -> Duration {
        Duration::from_secs(self.restart_delay_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn scheduler_interval(&self) -> Duration {
        Duration::from_secs(self.scheduler_interval_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let named = [
            ("poll_interval_secs", self.poll_interval_secs),
            ("backoff_interval_secs", self.backoff_interval_secs),
            ("inactivity_timeout_secs", self.inactivity_timeout_secs),
            ("watchdog_interval_secs", self.watchdog_interval_secs),
            ("restart_delay_secs", self.restart_delay_secs),
            ("retry_delay_secs", self.retry_delay_secs),
            ("scheduler_interval_secs", self.scheduler_interval_secs),
        ];
        for (name, value) in named {
            if value == 0 {
                return Err(ConfigError::ValidationError(format!(
                    "timing.{} must be greater than 0",
                    name
                )));
            }
            if value > MAX_DURATION_SECS {
                return Err(ConfigError::ValidationError(format!(
                    "timing.{} must not exceed {} seconds",
                    name, MAX_DURATION_SECS
                )));
            }
        }

        if self.backoff_interval_secs <= self.poll_interval_secs {
            return Err(ConfigError::ValidationError(format!(
                "timing.backoff_interval_secs ({}) must be greater than timing.poll_interval_secs ({})",
                self.backoff_interval_secs, self.poll_interval_secs
            )));
        }

        Ok(())
    }
}

/// External process manager invocation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessManagerConfig {
    /// Program run as `<program> <action> <process_name>`
    pub program: String,
    /// Seconds to wait for the program before treating it as unavailable
    pub timeout_secs: u64,
}

impl Default for ProcessManagerConfig {
    fn default() -> Self {
        Self {
            program: "pm2".to_string(),
            timeout_secs: 30,
        }
    }
}

impl ProcessManagerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// One `[[targets]]` entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetConfig {
    pub path: PathBuf,
    pub process_name: String,
    /// Defaults to `process_name`
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub restart_after_stop: bool,
    #[serde(default)]
    pub restart_on_inactivity: bool,
    /// Overrides `timing.restart_delay_secs` for this target
    #[serde(default)]
    pub restart_delay_secs: Option<u64>,
}

impl TargetConfig {
    /// Resolve defaults into an immutable [`WatchTarget`]
    pub fn to_watch_target(&self, timing: &TimingConfig) -> WatchTarget {
        WatchTarget {
            process_name: self.process_name.clone(),
            display_name: self
                .display_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| self.process_name.clone()),
            path: self.path.clone(),
            restart_after_stop: self.restart_after_stop,
            restart_on_inactivity: self.restart_on_inactivity,
            restart_delay: self
                .restart_delay_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| timing.restart_delay()),
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ReadError` if the file cannot be read,
    /// `ConfigError::TomlError` if it is not valid TOML for this schema, or
    /// `ConfigError::ValidationError` if a value is out of range.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every value the workers rely on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.targets.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one [[targets]] entry is required".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for (index, target) in self.targets.iter().enumerate() {
            if target.process_name.trim().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "targets[{}].process_name must not be empty",
                    index
                )));
            }
            if target.path.as_os_str().is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "targets[{}].path must not be empty",
                    index
                )));
            }
            if !seen.insert(&target.path) {
                return Err(ConfigError::ValidationError(format!(
                    "targets[{}].path {} is watched more than once",
                    index,
                    target.path.display()
                )));
            }
            match target.restart_delay_secs {
                Some(0) => {
                    return Err(ConfigError::ValidationError(format!(
                        "targets[{}].restart_delay_secs must be greater than 0",
                        index
                    )));
                }
                Some(delay) if delay > MAX_DURATION_SECS => {
                    return Err(ConfigError::ValidationError(format!(
                        "targets[{}].restart_delay_secs must not exceed {} seconds",
                        index, MAX_DURATION_SECS
                    )));
                }
                _ => {}
            }
        }

        self.timing.validate()?;

        if self.process_manager.program.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "process_manager.program must not be empty".to_string(),
            ));
        }
        if self.process_manager.timeout_secs == 0
            || self.process_manager.timeout_secs > MAX_DURATION_SECS
        {
            return Err(ConfigError::ValidationError(format!(
                "process_manager.timeout_secs must be between 1 and {}",
                MAX_DURATION_SECS
            )));
        }

        if self.signature.fields.is_empty() {
            return Err(ConfigError::ValidationError(
                "signature must contain at least one field".to_string(),
            ));
        }
        if self
            .signature
            .fields
            .iter()
            .any(|field| field.name.trim().is_empty())
        {
            return Err(ConfigError::ValidationError(
                "signature field names must not be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Watch targets in configuration order
    pub fn watch_targets(&self) -> Vec<WatchTarget> {
        self.targets
            .iter()
            .map(|target| target.to_watch_target(&self.timing))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::{Comparison, FieldRule};
    use std::io::Write;
    use tempfile::NamedTempFile;

    const FULL: &str = r#"
status_log = "/var/log/log_monitor.log"

[timing]
poll_interval_secs = 2
backoff_interval_secs = 10
inactivity_timeout_secs = 600

[process_manager]
program = "/usr/local/bin/pm2"
timeout_secs = 15

[[signature.fields]]
name = "level"
value = "error"

[[signature.fields]]
name = "message"
value = "Error on update listings:"
comparison = "prefix"

[[targets]]
path = "/root/tf2autobot/logs/mo7tarif313.error.log"
process_name = "Tiny Trading"
restart_after_stop = true

[[targets]]
path = "/root/tf2autobot/logs/mo7tarif701.error.log"
process_name = "kits"
display_name = "Kits and Items"
restart_on_inactivity = true
restart_delay_secs = 900
"#;

    const MINIMAL: &str = r#"
[[targets]]
path = "/logs/app.log"
process_name = "app"
"#;

    #[test]
    fn test_full_config_parses() {
        let config = Config::from_toml_str(FULL).unwrap();

        assert_eq!(
            config.status_log,
            Some(PathBuf::from("/var/log/log_monitor.log"))
        );
        assert_eq!(config.timing.poll_interval_secs, 2);
        assert_eq!(config.timing.backoff_interval_secs, 10);
        assert_eq!(config.timing.inactivity_timeout_secs, 600);
        // Unspecified timing values keep their defaults
        assert_eq!(config.timing.retry_delay_secs, 60);
        assert_eq!(config.process_manager.program, "/usr/local/bin/pm2");
        assert_eq!(config.process_manager.timeout(), Duration::from_secs(15));
        assert_eq!(config.signature.fields[0].comparison, Comparison::Exact);
        assert_eq!(config.signature.fields[1].comparison, Comparison::Prefix);

        let targets = config.watch_targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].display_name, "Tiny Trading");
        assert!(targets[0].restart_after_stop);
        assert_eq!(targets[0].restart_delay, Duration::from_secs(300));
        assert_eq!(targets[1].display_name, "Kits and Items");
        assert!(targets[1].restart_on_inactivity);
        assert_eq!(targets[1].restart_delay, Duration::from_secs(900));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::from_toml_str(MINIMAL).unwrap();

        assert_eq!(config.status_log, None);
        assert_eq!(config.timing, TimingConfig::default());
        assert_eq!(config.process_manager, ProcessManagerConfig::default());
        assert_eq!(config.signature, ErrorSignature::default());

        let target = &config.watch_targets()[0];
        assert_eq!(target.display_name, "app");
        assert!(!target.restart_after_stop);
        assert!(!target.restart_on_inactivity);
    }

    #[test]
    fn test_default_config_has_no_targets() {
        let err = Config::default().validate().unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(err.to_string().contains("targets"));
    }

    #[test]
    fn test_duplicate_paths_rejected() {
        let toml = format!("{}\n{}", MINIMAL, MINIMAL);
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_backoff_must_exceed_poll_interval() {
        let toml = format!(
            "[timing]\npoll_interval_secs = 5\nbackoff_interval_secs = 5\n{}",
            MINIMAL
        );
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("backoff_interval_secs"));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let toml = format!("[timing]\nretry_delay_secs = 0\n{}", MINIMAL);
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("retry_delay_secs"));
    }

    #[test]
    fn test_oversized_durations_rejected() {
        let toml = format!("[timing]\nretry_delay_secs = 10000000000000\n{}", MINIMAL);
        let err = Config::from_toml_str(&toml).unwrap_err();
        assert!(err.to_string().contains("retry_delay_secs must not exceed"));

        let toml = "[[targets]]\npath = \"/logs/a.log\"\nprocess_name = \"a\"\nrestart_delay_secs = 10000000000000\n";
        let err = Config::from_toml_str(toml).unwrap_err();
        assert!(err.to_string().contains("targets[0].restart_delay_secs"));

        let toml = format!("[process_manager]\ntimeout_secs = 10000000000000\n{}", MINIMAL);
        assert!(Config::from_toml_str(&toml).is_err());

        let toml = format!(
            "[timing]\ninactivity_timeout_secs = {}\n{}",
            MAX_DURATION_SECS, MINIMAL
        );
        assert!(Config::from_toml_str(&toml).is_ok());
    }

    #[test]
    fn test_empty_process_name_rejected() {
        let toml = "[[targets]]\npath = \"/logs/a.log\"\nprocess_name = \" \"\n";
        assert!(Config::from_toml_str(toml).is_err());
    }

    #[test]
    fn test_empty_signature_rejected() {
        let mut config = Config::from_toml_str(MINIMAL).unwrap();
        config.signature.fields.clear();
        assert!(config.validate().is_err());

        config.signature.fields.push(FieldRule::exact("", "error"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_a_toml_error() {
        let err = Config::from_toml_str("[[targets]\npath = ").unwrap_err();
        assert!(matches!(err, ConfigError::TomlError(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(FULL.as_bytes()).unwrap();
        file.flush().unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.targets.len(), 2);
    }

    #[test]
    fn test_from_missing_file_is_read_error() {
        let err = Config::from_file(Path::new("/nonexistent/tailguard.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError(_)));
    }
}
