//! Per-evaluation state machine
//!
//! Every evaluation walks one path through this machine, starting at
//! `Checking` and ending in a terminal phase. The terminal phase name is
//! kept in the evaluation record.

use state_machines::state_machine;
use tracing::{debug, warn};

state_machine! {
    name: TriageMachine,
    dynamic: true,
    initial: Checking,
    states: [
        Checking,
        Healthy,
        Degraded,
        CooldownSkip,
        Exhausted,
        Remediating,
        RemediationFailed,
        Verifying,
        Recovered,
        Ineffective,
        Errored
    ],
    events {
        pass {
            transition: { from: Checking, to: Healthy }
        }
        degrade {
            transition: { from: Checking, to: Degraded }
        }
        defer {
            transition: { from: Degraded, to: CooldownSkip }
        }
        exhaust {
            transition: { from: Degraded, to: Exhausted }
        }
        remediate {
            transition: { from: Degraded, to: Remediating }
        }
        force {
            transition: { from: Checking, to: Remediating }
        }
        reject {
            transition: { from: Remediating, to: RemediationFailed }
        }
        verify {
            transition: { from: Remediating, to: Verifying }
        }
        restore {
            transition: { from: Verifying, to: Recovered }
        }
        persist {
            transition: { from: Verifying, to: Ineffective }
        }
        abort {
            transition: { from: [Checking, Verifying], to: Errored }
        }
    }
}

pub use TriageMachineEvent as TriageEvent;

/// Tracks the phase of one evaluation
pub struct Triage {
    machine: DynamicTriageMachine<()>,
}

impl Triage {
    /// Start a new evaluation in `Checking`
    pub fn begin() -> Self {
        Self {
            machine: TriageMachine::new(()).into_dynamic(),
        }
    }

    /// Apply an event; an illegal transition is logged and ignored
    pub fn advance(&mut self, event: TriageEvent) {
        let from = self.machine.current_state().to_string();
        match self.machine.handle(event) {
            Ok(()) => debug!(from = %from, to = %self.machine.current_state(), "triage transition"),
            Err(e) => warn!(phase = %from, error = ?e, "illegal triage transition"),
        }
    }

    /// Current phase name
    pub fn phase(&self) -> &str {
        self.machine.current_state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_phase() {
        let triage = Triage::begin();
        assert_eq!(triage.phase(), "Checking");
    }

    #[test]
    fn test_recovery_path() {
        let mut triage = Triage::begin();
        triage.advance(TriageEvent::Degrade);
        triage.advance(TriageEvent::Remediate);
        assert_eq!(triage.phase(), "Remediating");
        triage.advance(TriageEvent::Verify);
        triage.advance(TriageEvent::Restore);
        assert_eq!(triage.phase(), "Recovered");
    }

    #[test]
    fn test_forced_path_skips_degraded() {
        let mut triage = Triage::begin();
        triage.advance(TriageEvent::Force);
        triage.advance(TriageEvent::Reject);
        assert_eq!(triage.phase(), "RemediationFailed");
    }

    #[test]
    fn test_abort_from_verifying() {
        let mut triage = Triage::begin();
        triage.advance(TriageEvent::Degrade);
        triage.advance(TriageEvent::Remediate);
        triage.advance(TriageEvent::Verify);
        triage.advance(TriageEvent::Abort);
        assert_eq!(triage.phase(), "Errored");
    }

    #[test]
    fn test_invalid_transition_is_ignored() {
        let mut machine = TriageMachine::new(()).into_dynamic();
        // Cannot skip straight to Recovered
        assert!(machine.handle(TriageMachineEvent::Restore).is_err());

        let mut triage = Triage::begin();
        triage.advance(TriageEvent::Restore);
        assert_eq!(triage.phase(), "Checking");
    }
}
