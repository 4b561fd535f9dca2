//! Configuration file parsing for Bosun
//!
//! Parses `bosun.toml` configuration files using serde

use crate::error::{Error, Result};
use crate::sickbay::probe::ProbeConfig;
use crate::sickbay::recovery::RecoveryAction;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Load configuration from a file
pub fn load(path: &Path) -> Result<BosunConfig> {
    let content = fs::read_to_string(path).map_err(|e| Error::ConfigRead {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config: BosunConfig = toml::from_str(&content)?;
    config.validate()?;

    Ok(config)
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct BosunConfig {
    /// Polling and remediation policy
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Health probe (defaults to pinging ipv6.google.com)
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Remediation action to run when the probe reports absence
    pub remediation: RecoveryAction,

    /// Retry/backoff configuration for webhook delivery
    #[serde(default)]
    pub retry: RetryConfig,
}

impl BosunConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.monitor.interval == 0 {
            return Err(Error::ConfigValidation(
                "monitor.interval must be at least 1 second".into(),
            ));
        }

        if self.monitor.history_limit == 0 {
            return Err(Error::ConfigValidation(
                "monitor.history_limit must be at least 1".into(),
            ));
        }

        if self.monitor.probe_timeout == 0 || self.monitor.remedy_timeout == 0 {
            return Err(Error::ConfigValidation(
                "monitor.probe_timeout and monitor.remedy_timeout must be at least 1 second".into(),
            ));
        }

        if self.retry.multiplier < 1.0 {
            return Err(Error::ConfigValidation(format!(
                "retry.multiplier must be >= 1.0, got {}",
                self.retry.multiplier
            )));
        }

        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(Error::ConfigValidation(format!(
                "retry.jitter_factor must be between 0.0 and 1.0, got {}",
                self.retry.jitter_factor
            )));
        }

        self.probe.validate()?;
        self.remediation.validate()?;

        let worst_case = self.remediation.worst_case_duration(&self.retry);
        if worst_case > Duration::from_secs(self.monitor.remedy_timeout) {
            return Err(Error::ConfigValidation(format!(
                "monitor.remedy_timeout ({}s) is shorter than the remediation can run with retries ({}s)",
                self.monitor.remedy_timeout,
                worst_case.as_secs_f64().ceil()
            )));
        }

        Ok(())
    }
}

fn default_interval() -> u64 {
    1800
}

fn default_cooldown() -> u64 {
    300
}

fn default_settle() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    0
}

fn default_exhausted_rest() -> u64 {
    3600
}

fn default_autostart() -> bool {
    true
}

fn default_history_limit() -> usize {
    100
}

fn default_probe_timeout() -> u64 {
    60
}

fn default_remedy_timeout() -> u64 {
    300
}

/// Monitor policy settings
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between scheduled evaluations
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Minimum seconds between remediation attempts
    #[serde(default = "default_cooldown")]
    pub cooldown: u64,

    /// Seconds to wait after a successful remediation before re-probing
    #[serde(default = "default_settle")]
    pub settle: u64,

    /// Consecutive attempts without recovery before remediation pauses (0 = unlimited)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Seconds after the last attempt before an exhausted budget refills
    #[serde(default = "default_exhausted_rest")]
    pub exhausted_rest: u64,

    /// Start polling as soon as the warden starts
    #[serde(default = "default_autostart")]
    pub autostart: bool,

    /// Number of evaluation records to keep
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,

    /// Outer timeout around each probe call in seconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout: u64,

    /// Outer timeout around each remediation call in seconds
    #[serde(default = "default_remedy_timeout")]
    pub remedy_timeout: u64,
}

impl MonitorConfig {
    /// Get the polling interval as Duration
    pub fn interval_duration(&self) -> Duration {
        Duration::from_secs(self.interval)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            cooldown: default_cooldown(),
            settle: default_settle(),
            max_attempts: default_max_attempts(),
            exhausted_rest: default_exhausted_rest(),
            autostart: default_autostart(),
            history_limit: default_history_limit(),
            probe_timeout: default_probe_timeout(),
            remedy_timeout: default_remedy_timeout(),
        }
    }
}

// Retry configuration defaults
fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    30000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_retry_attempts() -> u8 {
    5
}

fn default_jitter_factor() -> f64 {
    0.25
}

/// Retry/backoff configuration for HTTP operations
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// Base delay in milliseconds before first retry
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds between retries
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Multiplier for exponential backoff
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Maximum number of delivery attempts
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u8,

    /// Jitter factor (0.0-1.0) to randomize delays
    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_retry_attempts(),
            jitter_factor: default_jitter_factor(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let toml = r#"
[remediation]
kind = "command"
command = "/usr/local/bin/restart-ipv6"
"#;

        let config: BosunConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.monitor.interval, 1800);
        assert_eq!(config.monitor.cooldown, 300);
        assert_eq!(config.monitor.settle, 30);
        assert_eq!(config.monitor.max_attempts, 0);
        assert_eq!(config.monitor.exhausted_rest, 3600);
        assert!(config.monitor.autostart);
        assert_eq!(config.probe, ProbeConfig::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[monitor]
interval = 600
cooldown = 120
settle = 10
max_attempts = 0
autostart = false
history_limit = 20

[probe]
kind = "http"
url = "https://6.ipw.cn"
timeout = 5

[remediation]
kind = "webhook"
url = "http://192.168.3.1/api/ipv6/restart"
method = "post"
body = '{"module":"ipv6"}'

[retry]
max_attempts = 2
base_delay_ms = 100
"#;

        let config: BosunConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.monitor.interval_duration(), Duration::from_secs(600));
        assert_eq!(config.monitor.max_attempts, 0);
        assert!(!config.monitor.autostart);
        assert_eq!(config.monitor.history_limit, 20);
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.retry.max_delay_ms, 30000);
        assert!(matches!(config.probe, ProbeConfig::Http { timeout: 5, .. }));
        assert!(matches!(config.remediation, RecoveryAction::Webhook { .. }));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_remediation_is_rejected() {
        let toml = r#"
[monitor]
interval = 60
"#;

        assert!(toml::from_str::<BosunConfig>(toml).is_err());
    }

    #[test]
    fn test_zero_interval_error() {
        let toml = r#"
[monitor]
interval = 0

[remediation]
kind = "command"
command = "true"
"#;

        let config: BosunConfig = toml::from_str(toml).unwrap();
        assert!(matches!(config.validate(), Err(Error::ConfigValidation(_))));
    }

    #[test]
    fn test_bad_jitter_error() {
        let toml = r#"
[remediation]
kind = "command"
command = "true"

[retry]
jitter_factor = 1.5
"#;

        let config: BosunConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_remedy_timeout_must_cover_webhook_retries() {
        let toml = r#"
[remediation]
kind = "webhook"
url = "http://192.168.3.1/api/ipv6/restart"
timeout = 60
"#;

        // 5 requests of 60s plus 1+2+4+8s of backoff exceeds the 300s default
        let config: BosunConfig = toml::from_str(toml).unwrap();
        match config.validate() {
            Err(Error::ConfigValidation(message)) => assert!(message.contains("remedy_timeout")),
            other => panic!("unexpected result: {:?}", other),
        }

        let mut config = config;
        config.monitor.remedy_timeout = 320;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_remedy_timeout_must_cover_command_timeout() {
        let toml = r#"
[monitor]
remedy_timeout = 60

[remediation]
kind = "command"
command = "/usr/local/bin/restart-ipv6"
timeout = 120
"#;

        let config: BosunConfig = toml::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = load(Path::new("/nonexistent/bosun.toml"));
        assert!(matches!(result, Err(Error::ConfigRead { .. })));
    }
}
