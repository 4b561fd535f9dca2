//! Recovery actions for a degraded condition
//!
//! Provides configurable remediation actions run when the health probe
//! reports the monitored condition absent.

use crate::error::{Error, Result};
use crate::manifest::RetryConfig;
use crate::sickbay::probe::{first_line, is_http_url, output_with_timeout};
use async_trait::async_trait;
use chrono_machines::{BackoffStrategy, ExponentialBackoff};
use rand::rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// What a remediation action reported back
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemedyReport {
    /// Whether the action believes it succeeded
    pub success: bool,
    /// Human-readable detail (output, status or failure reason)
    pub detail: String,
}

impl RemedyReport {
    /// A successful report
    pub fn success(detail: impl Into<String>) -> Self {
        Self {
            success: true,
            detail: detail.into(),
        }
    }

    /// A failed report
    pub fn failure(detail: impl Into<String>) -> Self {
        Self {
            success: false,
            detail: detail.into(),
        }
    }
}

/// An idempotent, best-effort corrective action
#[async_trait]
pub trait Remedy: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Perform the action once
    async fn apply(&self) -> Result<RemedyReport>;
}

/// HTTP method for webhook remediation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum WebhookMethod {
    Get,
    #[default]
    Post,
}

/// Action to take when the probe reports absence (`[remediation]` table)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RecoveryAction {
    /// Execute a custom command on the host
    Command {
        command: String,
        #[serde(default = "default_command_timeout")]
        timeout: u64,
    },
    /// Call an HTTP endpoint
    Webhook {
        url: String,
        #[serde(default)]
        method: WebhookMethod,
        /// JSON request body (POST only)
        body: Option<String>,
        #[serde(default = "default_webhook_timeout")]
        timeout: u64,
    },
}

fn default_command_timeout() -> u64 {
    120
}

fn default_webhook_timeout() -> u64 {
    30
}

impl RecoveryAction {
    /// Human-readable one-liner
    pub fn describe(&self) -> String {
        match self {
            RecoveryAction::Command { command, .. } => format!("command ({})", command),
            RecoveryAction::Webhook { url, method, .. } => {
                let verb = match method {
                    WebhookMethod::Get => "GET",
                    WebhookMethod::Post => "POST",
                };
                format!("webhook ({} {})", verb, url)
            }
        }
    }

    /// Longest the action can run, including webhook retries
    pub fn worst_case_duration(&self, retry: &RetryConfig) -> Duration {
        match self {
            RecoveryAction::Command { timeout, .. } => Duration::from_secs(*timeout),
            RecoveryAction::Webhook { timeout, .. } => {
                webhook_budget(Duration::from_secs(*timeout), retry)
            }
        }
    }

    /// Validate action settings
    pub fn validate(&self) -> Result<()> {
        match self {
            RecoveryAction::Command { command, timeout } => {
                if command.trim().is_empty() {
                    return Err(Error::ConfigValidation(
                        "remediation.command must not be empty".into(),
                    ));
                }
                if *timeout == 0 {
                    return Err(Error::ConfigValidation(
                        "remediation.timeout must be at least 1 second".into(),
                    ));
                }
            }
            RecoveryAction::Webhook {
                url,
                method,
                body,
                timeout,
            } => {
                if !is_http_url(url) {
                    return Err(Error::ConfigValidation(format!(
                        "remediation.url must start with http:// or https://, got '{}'",
                        url
                    )));
                }
                if *method == WebhookMethod::Get && body.is_some() {
                    return Err(Error::ConfigValidation(
                        "remediation.body is only allowed with method = \"post\"".into(),
                    ));
                }
                if *timeout == 0 {
                    return Err(Error::ConfigValidation(
                        "remediation.timeout must be at least 1 second".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Build the remedy described by the configuration
pub fn build_remedy(action: &RecoveryAction, retry: &RetryConfig) -> Box<dyn Remedy> {
    match action {
        RecoveryAction::Command { command, timeout } => {
            Box::new(CommandRemedy::new(command, Duration::from_secs(*timeout)))
        }
        RecoveryAction::Webhook {
            url,
            method,
            body,
            timeout,
        } => Box::new(WebhookRemedy {
            url: url.clone(),
            method: *method,
            body: body.clone(),
            timeout: Duration::from_secs(*timeout),
            retry: retry.clone(),
        }),
    }
}

/// Run a shell command on the host
pub struct CommandRemedy {
    command: String,
    timeout: Duration,
}

impl CommandRemedy {
    /// Create a new command remedy
    pub fn new(command: &str, timeout: Duration) -> Self {
        Self {
            command: command.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl Remedy for CommandRemedy {
    fn name(&self) -> &str {
        "command"
    }

    async fn apply(&self) -> Result<RemedyReport> {
        debug!(command = %self.command, "executing remediation command");

        let mut command = Command::new("sh");
        command.args(["-c", self.command.as_str()]);

        let output = output_with_timeout(command, self.timeout)
            .await
            .map_err(|e| Error::RemedyFailed {
                action: self.name().to_string(),
                message: e.to_string(),
            })?;

        let Some(output) = output else {
            return Ok(RemedyReport::failure(format!(
                "command timed out after {} seconds",
                self.timeout.as_secs()
            )));
        };

        if output.status.success() {
            let detail = first_line(&String::from_utf8_lossy(&output.stdout))
                .unwrap_or_else(|| "command completed".to_string());
            Ok(RemedyReport::success(detail))
        } else {
            let code = output
                .status
                .code()
                .map(|c| format!("exit {}", c))
                .unwrap_or_else(|| "killed by signal".to_string());
            let detail = match first_line(&String::from_utf8_lossy(&output.stderr)) {
                Some(stderr) => format!("{}: {}", code, stderr),
                None => code,
            };
            Ok(RemedyReport::failure(detail))
        }
    }
}

/// Call an HTTP endpoint, retrying transient failures with backoff
#[derive(Clone)]
pub struct WebhookRemedy {
    url: String,
    method: WebhookMethod,
    body: Option<String>,
    timeout: Duration,
    retry: RetryConfig,
}

/// Create backoff strategy from RetryConfig
fn backoff_from_config(config: &RetryConfig) -> ExponentialBackoff {
    ExponentialBackoff::new()
        .base_delay_ms(config.base_delay_ms)
        .max_delay_ms(config.max_delay_ms)
        .multiplier(config.multiplier)
        .max_attempts(config.max_attempts)
        .jitter_factor(config.jitter_factor)
}

/// Longest a webhook delivery can take: every request timing out plus the
/// largest possible delay between them
fn webhook_budget(request_timeout: Duration, retry: &RetryConfig) -> Duration {
    let requests = u32::from(retry.max_attempts.max(1));
    let delays_ms: f64 = (1..requests)
        .map(|attempt| {
            let exponential =
                retry.base_delay_ms as f64 * retry.multiplier.powi(attempt as i32 - 1);
            exponential.min(retry.max_delay_ms as f64)
        })
        .sum();
    request_timeout * requests + Duration::from_millis(delays_ms.ceil() as u64)
}

impl WebhookRemedy {
    fn agent(&self) -> ureq::Agent {
        ureq::Agent::config_builder()
            .timeout_global(Some(self.timeout))
            .build()
            .into()
    }

    fn send_once(&self, agent: &ureq::Agent) -> std::result::Result<u16, ureq::Error> {
        let response = match self.method {
            WebhookMethod::Get => agent.get(self.url.as_str()).call()?,
            WebhookMethod::Post => agent
                .post(self.url.as_str())
                .header("Content-Type", "application/json")
                .send(self.body.as_deref().unwrap_or("{}"))?,
        };
        Ok(response.status().as_u16())
    }

    /// One request on the blocking pool
    async fn send_blocking(&self, agent: &ureq::Agent) -> Result<std::result::Result<u16, ureq::Error>> {
        let hook = self.clone();
        let agent = agent.clone();

        tokio::task::spawn_blocking(move || hook.send_once(&agent))
            .await
            .map_err(|e| Error::RemedyFailed {
                action: self.name().to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl Remedy for WebhookRemedy {
    fn name(&self) -> &str {
        "webhook"
    }

    /// Deliver with retries; dropping the future stops any further requests
    async fn apply(&self) -> Result<RemedyReport> {
        let agent = self.agent();
        let backoff = backoff_from_config(&self.retry);
        let mut attempt: u8 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            let error = match self.send_blocking(&agent).await? {
                Ok(status) => {
                    return Ok(RemedyReport::success(format!("HTTP {}", status)));
                }
                // Client errors will not fix themselves on retry
                Err(ureq::Error::StatusCode(code)) if (400..500).contains(&code) => {
                    return Ok(RemedyReport::failure(format!("HTTP {}", code)));
                }
                Err(e) => e.to_string(),
            };

            let Some(delay_ms) = backoff.delay(attempt, &mut rng()) else {
                return Ok(RemedyReport::failure(format!(
                    "webhook failed after {} attempts: {}",
                    attempt, error
                )));
            };

            warn!(
                url = %self.url,
                attempt,
                delay_ms,
                error = %error,
                "webhook delivery failed, retrying"
            );
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }
}
