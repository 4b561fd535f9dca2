//! The remediation loop
//!
//! Evaluates the health probe and, when the monitored condition is absent,
//! runs the remediation action subject to a cooldown and a consecutive
//! attempt budget, then re-verifies after a settle delay.

use crate::error::{Error, Result};
use crate::manifest::{BosunConfig, MonitorConfig};
use crate::sickbay::logbook::{EvaluationRecord, Logbook, Trigger};
use crate::sickbay::outcome::{Outcome, Stage};
use crate::sickbay::probe::{HealthProbe, build_probe};
use crate::sickbay::recovery::{Remedy, RemedyReport, build_remedy};
use crate::sickbay::state::{MonitorSnapshot, MonitorState};
use crate::sickbay::triage::{Triage, TriageEvent};
use chrono::Utc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Timing and attempt policy for the loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    /// Minimum time between remediation attempts
    pub cooldown: Duration,
    /// Delay after a successful remediation before re-probing
    pub settle: Duration,
    /// Consecutive attempts without recovery before pausing remediation (0 = unlimited)
    pub max_attempts: u32,
    /// How long after the last attempt an exhausted budget refills
    pub exhausted_rest: Duration,
    /// Outer timeout around each probe call
    pub probe_timeout: Duration,
    /// Outer timeout around each remediation call
    pub remedy_timeout: Duration,
}

impl Policy {
    /// Build the policy from the `[monitor]` table
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            cooldown: Duration::from_secs(config.cooldown),
            settle: Duration::from_secs(config.settle),
            max_attempts: config.max_attempts,
            exhausted_rest: Duration::from_secs(config.exhausted_rest),
            probe_timeout: Duration::from_secs(config.probe_timeout),
            remedy_timeout: Duration::from_secs(config.remedy_timeout),
        }
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::from_config(&MonitorConfig::default())
    }
}

/// Round a duration up to whole seconds
fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

/// Cooldown-gated remediation loop
///
/// Owns its `MonitorState`; every method that mutates it takes `&mut self`,
/// so a single owner cannot run two evaluations at once.
pub struct RemediationLoop {
    probe: Box<dyn HealthProbe>,
    remedy: Box<dyn Remedy>,
    policy: Policy,
    state: MonitorState,
    logbook: Logbook,
}

impl RemediationLoop {
    /// Create a loop around a probe and a remedy
    pub fn new(probe: Box<dyn HealthProbe>, remedy: Box<dyn Remedy>, policy: Policy) -> Self {
        Self {
            probe,
            remedy,
            policy,
            state: MonitorState::new(),
            logbook: Logbook::new(MonitorConfig::default().history_limit),
        }
    }

    /// Create a loop from a validated configuration
    pub fn from_config(config: &BosunConfig) -> Self {
        let mut monitor = Self::new(
            build_probe(&config.probe),
            build_remedy(&config.remediation, &config.retry),
            Policy::from_config(&config.monitor),
        )
        .with_history_limit(config.monitor.history_limit);
        monitor.set_running(config.monitor.autostart);
        monitor
    }

    /// Keep at most `limit` evaluation records
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.logbook = Logbook::new(limit);
        self
    }

    pub fn probe_name(&self) -> &str {
        self.probe.name()
    }

    pub fn remedy_name(&self) -> &str {
        self.remedy.name()
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn set_running(&mut self, running: bool) {
        self.state.set_running(running);
    }

    /// Copy of the current monitor state
    pub fn snapshot(&self) -> MonitorSnapshot {
        self.state.snapshot()
    }

    /// The newest `limit` evaluation records, oldest first
    pub fn history(&self, limit: usize) -> Vec<EvaluationRecord> {
        self.logbook.recent(limit)
    }

    /// Run the probe once without touching any state
    pub async fn probe_once(&self) -> Result<Option<String>> {
        self.run_probe().await
    }

    /// Evaluate as a scheduled tick
    pub async fn evaluate(&mut self) -> Outcome {
        self.evaluate_as(Trigger::Scheduled).await
    }

    /// Check health and remediate if needed
    ///
    /// Never fails: every probe or remedy error becomes an `Outcome`.
    pub async fn evaluate_as(&mut self, trigger: Trigger) -> Outcome {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut triage = Triage::begin();

        self.state.mark_checked();

        let outcome = match self.run_probe().await {
            Ok(Some(value)) => {
                self.state.record_health(Some(value.clone()));
                self.state.mark_healthy();
                triage.advance(TriageEvent::Pass);
                Outcome::Healthy { value }
            }
            Ok(None) => {
                self.state.record_health(None);
                triage.advance(TriageEvent::Degrade);
                warn!(probe = self.probe.name(), "monitored condition is absent");
                self.handle_degraded(&mut triage).await
            }
            Err(e) => {
                self.state.record_health(None);
                triage.advance(TriageEvent::Abort);
                Outcome::Error {
                    stage: Stage::Probe,
                    message: e.to_string(),
                }
            }
        };

        self.finish(trigger, started_at, clock, &triage, outcome)
    }

    /// Remediate immediately, bypassing cooldown and the attempt budget
    ///
    /// Still counts as an attempt and still settles and re-verifies.
    pub async fn remediate_now(&mut self) -> Outcome {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut triage = Triage::begin();

        triage.advance(TriageEvent::Force);
        let outcome = self.remediate(&mut triage, clock).await;

        self.finish(Trigger::Forced, started_at, clock, &triage, outcome)
    }

    /// Decide between deferring, exhausting and remediating
    async fn handle_degraded(&mut self, triage: &mut Triage) -> Outcome {
        let now = Instant::now();

        if let Some(remaining) = self.state.cooldown_remaining(now, self.policy.cooldown) {
            triage.advance(TriageEvent::Defer);
            return Outcome::SkippedCooldown {
                remaining_secs: ceil_secs(remaining),
            };
        }

        let attempts = self.state.consecutive_attempts();
        if self.policy.max_attempts > 0 && attempts >= self.policy.max_attempts {
            // The budget refills once the rest window after the last attempt has passed
            if self
                .state
                .cooldown_remaining(now, self.policy.exhausted_rest)
                .is_some()
            {
                triage.advance(TriageEvent::Exhaust);
                return Outcome::Exhausted { attempts };
            }
            info!(attempts, "attempt budget rested, resuming remediation");
            self.state.reset_attempts();
        }

        triage.advance(TriageEvent::Remediate);
        self.remediate(triage, now).await
    }

    /// Attempt remediation, settle, and verify
    async fn remediate(&mut self, triage: &mut Triage, now: Instant) -> Outcome {
        self.state.begin_remediation(now);
        info!(
            action = self.remedy.name(),
            attempt = self.state.consecutive_attempts(),
            total = self.state.remediation_count(),
            "attempting remediation"
        );

        let report = match self.run_remedy().await {
            Ok(report) if report.success => report,
            Ok(report) => {
                triage.advance(TriageEvent::Reject);
                return Outcome::RemediationFailed {
                    reason: report.detail,
                };
            }
            Err(e) => {
                triage.advance(TriageEvent::Reject);
                return Outcome::RemediationFailed {
                    reason: e.to_string(),
                };
            }
        };

        triage.advance(TriageEvent::Verify);
        info!(
            detail = %report.detail,
            settle = ?self.policy.settle,
            "remediation reported success, waiting before re-check"
        );
        tokio::time::sleep(self.policy.settle).await;

        match self.run_probe().await {
            Ok(Some(value)) => {
                self.state.record_health(Some(value.clone()));
                self.state.mark_healthy();
                triage.advance(TriageEvent::Restore);
                Outcome::Recovered { value }
            }
            Ok(None) => {
                self.state.record_health(None);
                triage.advance(TriageEvent::Persist);
                Outcome::RemediationIneffective
            }
            Err(e) => {
                self.state.record_health(None);
                triage.advance(TriageEvent::Abort);
                Outcome::Error {
                    stage: Stage::Verify,
                    message: e.to_string(),
                }
            }
        }
    }

    async fn run_probe(&self) -> Result<Option<String>> {
        let timeout = self.policy.probe_timeout;
        match tokio::time::timeout(timeout, self.probe.probe()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                what: format!("Health probe '{}'", self.probe.name()),
                secs: ceil_secs(timeout),
            }),
        }
    }

    async fn run_remedy(&self) -> Result<RemedyReport> {
        let timeout = self.policy.remedy_timeout;
        match tokio::time::timeout(timeout, self.remedy.apply()).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                what: format!("Remediation '{}'", self.remedy.name()),
                secs: ceil_secs(timeout),
            }),
        }
    }

    /// Log the outcome and append it to the logbook
    fn finish(
        &mut self,
        trigger: Trigger,
        started_at: chrono::DateTime<Utc>,
        clock: Instant,
        triage: &Triage,
        outcome: Outcome,
    ) -> Outcome {
        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);

        let remediated = outcome.attempted_remediation();
        match &outcome {
            Outcome::Healthy { .. } | Outcome::Recovered { .. } | Outcome::SkippedCooldown { .. } => {
                info!(%trigger, phase = triage.phase(), remediated, duration_ms, "{}", outcome)
            }
            _ => warn!(%trigger, phase = triage.phase(), remediated, duration_ms, "{}", outcome),
        }

        self.logbook
            .push(trigger, started_at, duration_ms, triage.phase(), outcome)
            .outcome
            .clone()
    }
}
