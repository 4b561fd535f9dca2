//! Bounded history of evaluations

use crate::sickbay::outcome::Outcome;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

/// What started an evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trigger {
    /// Periodic warden tick
    Scheduled,
    /// Explicit request to evaluate now
    Manual,
    /// Explicit request to remediate, bypassing cooldown
    Forced,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Scheduled => write!(f, "scheduled"),
            Trigger::Manual => write!(f, "manual"),
            Trigger::Forced => write!(f, "forced"),
        }
    }
}

/// One finished evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvaluationRecord {
    /// Sequence number, starting at 1
    pub id: u64,
    pub trigger: Trigger,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Terminal triage phase
    pub phase: String,
    pub outcome: Outcome,
}

impl EvaluationRecord {
    /// One-line summary for tables and logs
    pub fn summary(&self) -> String {
        format!(
            "#{} {} {} [{}] {} ({}ms)",
            self.id,
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.trigger,
            self.phase,
            self.outcome,
            self.duration_ms
        )
    }
}

/// Ring buffer of the most recent evaluations
#[derive(Debug)]
pub struct Logbook {
    records: VecDeque<EvaluationRecord>,
    capacity: usize,
    next_id: u64,
}

impl Logbook {
    /// Create a logbook keeping at most `capacity` records
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 1,
        }
    }

    /// Append a record, evicting the oldest when full; returns the new record
    pub fn push(
        &mut self,
        trigger: Trigger,
        started_at: DateTime<Utc>,
        duration_ms: u64,
        phase: &str,
        outcome: Outcome,
    ) -> &EvaluationRecord {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }

        let record = EvaluationRecord {
            id: self.next_id,
            trigger,
            started_at,
            duration_ms,
            phase: phase.to_string(),
            outcome,
        };
        self.next_id += 1;
        self.records.push_back(record);
        &self.records[self.records.len() - 1]
    }

    /// The newest `limit` records, oldest first
    pub fn recent(&self, limit: usize) -> Vec<EvaluationRecord> {
        let skip = self.records.len().saturating_sub(limit);
        self.records.iter().skip(skip).cloned().collect()
    }
}
