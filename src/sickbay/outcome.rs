//! Result of a single evaluation

use serde::Serialize;
use std::fmt;

/// Which probe call failed to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// The initial health probe
    Probe,
    /// The re-check after a successful remediation
    Verify,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Probe => write!(f, "probe"),
            Stage::Verify => write!(f, "verify"),
        }
    }
}

/// Outcome of one `evaluate()` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Probe reported the condition present; nothing else was done
    Healthy { value: String },
    /// Degraded, but the last attempt is still inside the cooldown window
    SkippedCooldown { remaining_secs: u64 },
    /// Degraded, and the consecutive attempt budget is spent
    Exhausted { attempts: u32 },
    /// Remediation errored, timed out, or reported failure
    RemediationFailed { reason: String },
    /// Remediation succeeded and the condition came back
    Recovered { value: String },
    /// Remediation succeeded but the condition is still absent
    RemediationIneffective,
    /// A probe could not be executed
    Error { stage: Stage, message: String },
}

impl Outcome {
    /// Whether the monitored condition was present at the end of the call
    pub fn is_healthy(&self) -> bool {
        matches!(self, Outcome::Healthy { .. } | Outcome::Recovered { .. })
    }

    /// Whether a remediation attempt was made during the call
    pub fn attempted_remediation(&self) -> bool {
        matches!(
            self,
            Outcome::RemediationFailed { .. }
                | Outcome::Recovered { .. }
                | Outcome::RemediationIneffective
                | Outcome::Error {
                    stage: Stage::Verify,
                    ..
                }
        )
    }

    /// Stable snake_case label, matching the serialized tag
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Healthy { .. } => "healthy",
            Outcome::SkippedCooldown { .. } => "skipped_cooldown",
            Outcome::Exhausted { .. } => "exhausted",
            Outcome::RemediationFailed { .. } => "remediation_failed",
            Outcome::Recovered { .. } => "recovered",
            Outcome::RemediationIneffective => "remediation_ineffective",
            Outcome::Error { .. } => "error",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Healthy { value } => write!(f, "healthy ({})", value),
            Outcome::SkippedCooldown { remaining_secs } => {
                write!(f, "skipped: cooldown active for another {}s", remaining_secs)
            }
            Outcome::Exhausted { attempts } => write!(
                f,
                "exhausted: {} consecutive attempts without recovery",
                attempts
            ),
            Outcome::RemediationFailed { reason } => write!(f, "remediation failed: {}", reason),
            Outcome::Recovered { value } => write!(f, "recovered ({})", value),
            Outcome::RemediationIneffective => {
                write!(f, "remediation ineffective: condition still absent")
            }
            Outcome::Error { stage, message } => write!(f, "{} error: {}", stage, message),
        }
    }
}
