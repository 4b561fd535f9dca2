//! Monitor state
//!
//! `MonitorState` is owned by exactly one `RemediationLoop` and mutated
//! through `&mut self` only. Everyone else sees `MonitorSnapshot` copies.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Process-lifetime monitor state
#[derive(Debug, Default)]
pub struct MonitorState {
    /// Whether periodic polling is active
    running: bool,
    /// Wall-clock time of the latest health evaluation
    last_check_at: Option<DateTime<Utc>>,
    /// Wall-clock time of the latest remediation attempt
    last_remediation_at: Option<DateTime<Utc>>,
    /// Monotonic time of the latest remediation attempt (cooldown arithmetic)
    last_remediation_instant: Option<Instant>,
    /// Value returned by the latest probe
    last_health_value: Option<String>,
    /// Total remediation attempts, never reset
    remediation_count: u64,
    /// Attempts since the condition was last seen healthy
    consecutive_attempts: u32,
}

/// Read-only copy of `MonitorState` for status reporting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct MonitorSnapshot {
    pub is_running: bool,
    pub last_check_at: Option<DateTime<Utc>>,
    pub last_remediation_at: Option<DateTime<Utc>>,
    pub last_health_value: Option<String>,
    pub remediation_count: u64,
    pub consecutive_attempts: u32,
}

impl MonitorState {
    /// Create an empty state
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn remediation_count(&self) -> u64 {
        self.remediation_count
    }

    pub fn consecutive_attempts(&self) -> u32 {
        self.consecutive_attempts
    }

    /// Record that a health evaluation started now
    pub fn mark_checked(&mut self) {
        self.last_check_at = Some(Utc::now());
    }

    /// Store the latest probe value
    pub fn record_health(&mut self, value: Option<String>) {
        self.last_health_value = value;
    }

    /// The condition was observed healthy; the attempt streak starts over
    pub fn mark_healthy(&mut self) {
        self.reset_attempts();
    }

    /// Start a fresh attempt streak without touching the total count
    pub fn reset_attempts(&mut self) {
        self.consecutive_attempts = 0;
    }

    /// Time left in the cooldown window, if one is active at `now`
    pub fn cooldown_remaining(&self, now: Instant, cooldown: Duration) -> Option<Duration> {
        let last = self.last_remediation_instant?;
        let elapsed = now.saturating_duration_since(last);
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    /// Record a remediation attempt about to be made at `now`
    pub fn begin_remediation(&mut self, now: Instant) {
        self.last_remediation_instant = Some(now);
        self.last_remediation_at = Some(Utc::now());
        self.remediation_count += 1;
        self.consecutive_attempts = self.consecutive_attempts.saturating_add(1);
    }

    /// Copy the state for reporting
    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            is_running: self.running,
            last_check_at: self.last_check_at,
            last_remediation_at: self.last_remediation_at,
            last_health_value: self.last_health_value.clone(),
            remediation_count: self.remediation_count,
            consecutive_attempts: self.consecutive_attempts,
        }
    }
}
