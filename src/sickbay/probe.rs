//! Health probes
//!
//! A probe answers one question: is the monitored condition present right
//! now? `Ok(Some(value))` means healthy, `Ok(None)` is an ordinary negative
//! result, and `Err` is reserved for probes that could not run at all.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::net::Ipv6Addr;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Longest probe value kept from command or HTTP output
const MAX_VALUE_LEN: usize = 256;

/// Something that can report whether the monitored condition holds
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Short name used in logs and errors
    fn name(&self) -> &str;

    /// Run the probe once
    async fn probe(&self) -> Result<Option<String>>;
}

/// Probe configuration (`[probe]` table)
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProbeConfig {
    /// Send a single echo request and report the resolved address
    Ping {
        #[serde(default = "default_ping_host")]
        host: String,
        #[serde(default = "default_ping_binary")]
        binary: String,
        #[serde(default = "default_timeout")]
        timeout: u64,
    },
    /// Run a shell command on the host (exit 0 = healthy)
    Command {
        command: String,
        #[serde(default = "default_timeout")]
        timeout: u64,
    },
    /// GET a URL (2xx = healthy, body is the value)
    Http {
        url: String,
        #[serde(default = "default_timeout")]
        timeout: u64,
    },
}

fn default_ping_host() -> String {
    "ipv6.google.com".into()
}

fn default_ping_binary() -> String {
    "ping6".into()
}

fn default_timeout() -> u64 {
    10
}

impl Default for ProbeConfig {
    fn default() -> Self {
        ProbeConfig::Ping {
            host: default_ping_host(),
            binary: default_ping_binary(),
            timeout: default_timeout(),
        }
    }
}

impl ProbeConfig {
    /// Human-readable one-liner
    pub fn describe(&self) -> String {
        match self {
            ProbeConfig::Ping { host, binary, .. } => format!("ping ({} {})", binary, host),
            ProbeConfig::Command { command, .. } => format!("command ({})", command),
            ProbeConfig::Http { url, .. } => format!("http (GET {})", url),
        }
    }

    /// Validate probe settings
    pub fn validate(&self) -> Result<()> {
        let (timeout, empty_field) = match self {
            ProbeConfig::Ping {
                host,
                binary,
                timeout,
            } => (
                *timeout,
                if host.trim().is_empty() {
                    Some("host")
                } else if binary.trim().is_empty() {
                    Some("binary")
                } else {
                    None
                },
            ),
            ProbeConfig::Command { command, timeout } => {
                (*timeout, command.trim().is_empty().then_some("command"))
            }
            ProbeConfig::Http { url, timeout } => {
                if !is_http_url(url) {
                    return Err(Error::ConfigValidation(format!(
                        "probe.url must start with http:// or https://, got '{}'",
                        url
                    )));
                }
                (*timeout, None)
            }
        };

        if let Some(field) = empty_field {
            return Err(Error::ConfigValidation(format!(
                "probe.{} must not be empty",
                field
            )));
        }
        if timeout == 0 {
            return Err(Error::ConfigValidation(
                "probe.timeout must be at least 1 second".into(),
            ));
        }
        Ok(())
    }
}

pub(crate) fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Build the probe described by the configuration
pub fn build_probe(config: &ProbeConfig) -> Box<dyn HealthProbe> {
    match config {
        ProbeConfig::Ping {
            host,
            binary,
            timeout,
        } => Box::new(PingProbe::new(host, Duration::from_secs(*timeout)).with_binary(binary)),
        ProbeConfig::Command { command, timeout } => {
            Box::new(CommandProbe::new(command, Duration::from_secs(*timeout)))
        }
        ProbeConfig::Http { url, timeout } => {
            Box::new(HttpProbe::new(url, Duration::from_secs(*timeout)))
        }
    }
}

/// Run a command with piped output, killing it if it outlives `timeout`
///
/// Returns `Ok(None)` on timeout and `Err` only when the process could not
/// be spawned or waited on.
pub(crate) async fn output_with_timeout(
    mut command: Command,
    timeout: Duration,
) -> std::io::Result<Option<Output>> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn()?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => output.map(Some),
        // Dropping the future drops the child, which kills it
        Err(_) => Ok(None),
    }
}

/// First non-empty line of some output, trimmed and length-capped
pub(crate) fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .map(|l| l.chars().take(MAX_VALUE_LEN).collect())
}

/// Extract the IPv6 address from the `PING` header line of ping6 output
///
/// Handles both `PING host (addr)` and the nested
/// `PING host(rdns (addr))` form printed by iputils.
pub fn parse_ping_address(output: &str) -> Option<String> {
    let line = output.lines().find(|l| l.trim_start().starts_with("PING"))?;

    line.match_indices('(').find_map(|(start, _)| {
        let rest = &line[start + 1..];
        let end = rest.find(')')?;
        rest[..end]
            .trim()
            .parse::<Ipv6Addr>()
            .ok()
            .map(|addr| addr.to_string())
    })
}

/// ICMPv6 reachability probe
pub struct PingProbe {
    host: String,
    binary: String,
    timeout: Duration,
}

impl PingProbe {
    /// Create a new ping probe using `ping6`
    pub fn new(host: &str, timeout: Duration) -> Self {
        Self {
            host: host.to_string(),
            binary: default_ping_binary(),
            timeout,
        }
    }

    /// Use a different ping binary (e.g. `ping -6`)
    pub fn with_binary(mut self, binary: &str) -> Self {
        self.binary = binary.to_string();
        self
    }
}

#[async_trait]
impl HealthProbe for PingProbe {
    fn name(&self) -> &str {
        "ping"
    }

    async fn probe(&self) -> Result<Option<String>> {
        let mut parts = self.binary.split_whitespace();
        let program = parts.next().unwrap_or("ping6");
        let mut command = Command::new(program);
        command.args(parts).args(["-c", "1", self.host.as_str()]);

        let output = output_with_timeout(command, self.timeout)
            .await
            .map_err(|e| Error::ProbeFailed {
                probe: self.name().to_string(),
                message: format!("Failed to execute {}: {}", program, e),
            })?;

        let Some(output) = output else {
            debug!(host = %self.host, timeout = ?self.timeout, "ping timed out");
            return Ok(None);
        };

        if !output.status.success() {
            debug!(
                host = %self.host,
                stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                "ping failed"
            );
            return Ok(None);
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(Some(
            parse_ping_address(&stdout).unwrap_or_else(|| "connected".to_string()),
        ))
    }
}

/// Shell command probe
pub struct CommandProbe {
    command: String,
    timeout: Duration,
}

impl CommandProbe {
    /// Create a new command probe
    pub fn new(command: &str, timeout: Duration) -> Self {
        Self {
            command: command.to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl HealthProbe for CommandProbe {
    fn name(&self) -> &str {
        "command"
    }

    async fn probe(&self) -> Result<Option<String>> {
        let mut command = Command::new("sh");
        command.args(["-c", self.command.as_str()]);

        let output = output_with_timeout(command, self.timeout)
            .await
            .map_err(|e| Error::ProbeFailed {
                probe: self.name().to_string(),
                message: e.to_string(),
            })?;

        match output {
            Some(output) if output.status.success() => Ok(Some(
                first_line(&String::from_utf8_lossy(&output.stdout))
                    .unwrap_or_else(|| "ok".to_string()),
            )),
            Some(output) => {
                debug!(
                    command = %self.command,
                    code = ?output.status.code(),
                    "probe command reported failure"
                );
                Ok(None)
            }
            None => {
                debug!(command = %self.command, timeout = ?self.timeout, "probe command timed out");
                Ok(None)
            }
        }
    }
}

/// HTTP GET probe
pub struct HttpProbe {
    url: String,
    timeout: Duration,
}

impl HttpProbe {
    /// Create a new HTTP probe
    pub fn new(url: &str, timeout: Duration) -> Self {
        Self {
            url: url.to_string(),
            timeout,
        }
    }
}

fn http_get(url: &str, timeout: Duration) -> Option<String> {
    let agent: ureq::Agent = ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into();

    match agent.get(url).call() {
        Ok(response) => {
            let body = response.into_body().read_to_string().unwrap_or_default();
            Some(first_line(&body).unwrap_or_else(|| "ok".to_string()))
        }
        Err(ureq::Error::StatusCode(code)) => {
            debug!(url, code, "probe endpoint returned error status");
            None
        }
        Err(e) => {
            debug!(url, error = %e, "probe request failed");
            None
        }
    }
}

#[async_trait]
impl HealthProbe for HttpProbe {
    fn name(&self) -> &str {
        "http"
    }

    async fn probe(&self) -> Result<Option<String>> {
        let url = self.url.clone();
        let timeout = self.timeout;

        tokio::task::spawn_blocking(move || http_get(&url, timeout))
            .await
            .map_err(|e| Error::ProbeFailed {
                probe: self.name().to_string(),
                message: e.to_string(),
            })
    }
}
