//! Connectivity monitoring and remediation
//!
//! Provides:
//! - Health probes that report whether the monitored condition is present
//! - Remediation actions (commands, webhooks)
//! - The cooldown-gated remediation loop and its state
//! - A bounded logbook of past evaluations

pub mod checker;
#[cfg(test)]
mod http_stub;
pub mod logbook;
pub mod outcome;
pub mod probe;
pub mod recovery;
pub mod state;
pub mod triage;

pub use checker::{Policy, RemediationLoop};
pub use logbook::{EvaluationRecord, Trigger};
pub use outcome::Outcome;
pub use state::MonitorSnapshot;
