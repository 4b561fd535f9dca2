//! The Warden - monitor scheduler
//!
//! Owns the remediation loop and drives it:
//! - Periodic evaluations on a fixed interval (first one immediately)
//! - Manual evaluate / remediate requests, processed one at a time
//! - Pause and resume of periodic polling
//! - A snapshot published after every change

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::sickbay::{EvaluationRecord, MonitorSnapshot, Outcome, RemediationLoop, Trigger};

/// Requests the Warden receives
#[derive(Debug)]
pub enum WardenEvent {
    /// Evaluate now, regardless of pause state
    Evaluate { reply: oneshot::Sender<Outcome> },
    /// Remediate now, bypassing cooldown
    Remediate { reply: oneshot::Sender<Outcome> },
    /// Stop periodic evaluations
    Pause,
    /// Resume periodic evaluations
    Resume,
    /// Flip between paused and running; replies with the new state
    Toggle { reply: oneshot::Sender<bool> },
    /// Fetch recent evaluation records
    History {
        limit: usize,
        reply: oneshot::Sender<Vec<EvaluationRecord>>,
    },
    /// Shutdown the Warden
    Shutdown,
}

/// The Warden runs the remediation loop on a single task
pub struct Warden {
    /// Channel to receive requests
    rx: mpsc::Receiver<WardenEvent>,
    /// Sender for requests (cloneable)
    tx: mpsc::Sender<WardenEvent>,
    /// The loop; only this task touches its state
    monitor: RemediationLoop,
    /// Time between scheduled evaluations
    interval: Duration,
    /// Latest monitor state for readers
    snapshots: watch::Sender<MonitorSnapshot>,
}

impl Warden {
    /// Create a new Warden around a remediation loop
    pub fn new(monitor: RemediationLoop, interval: Duration) -> Self {
        let (tx, rx) = mpsc::channel(100);
        let (snapshots, _) = watch::channel(monitor.snapshot());
        Self {
            rx,
            tx,
            monitor,
            interval: interval.max(Duration::from_secs(1)),
            snapshots,
        }
    }

    /// Get a handle for sending requests and reading snapshots
    pub fn handle(&self) -> WardenHandle {
        WardenHandle {
            sender: self.tx.clone(),
            snapshots: self.snapshots.subscribe(),
        }
    }

    /// Run the Warden event loop until shutdown
    ///
    /// This should be spawned as a tokio task
    pub async fn run(mut self) {
        info!(
            interval = ?self.interval,
            probe = self.monitor.probe_name(),
            action = self.monitor.remedy_name(),
            running = self.monitor.is_running(),
            "warden started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if self.monitor.is_running() {
                        self.monitor.evaluate_as(Trigger::Scheduled).await;
                        self.publish();
                    } else {
                        debug!("paused, skipping scheduled evaluation");
                    }
                }
                event = self.rx.recv() => match event {
                    Some(WardenEvent::Shutdown) | None => break,
                    Some(event) => self.handle_event(event).await,
                }
            }
        }

        info!(
            remediations = self.monitor.snapshot().remediation_count,
            "warden stopped"
        );
    }

    async fn handle_event(&mut self, event: WardenEvent) {
        match event {
            WardenEvent::Evaluate { reply } => {
                let outcome = self.monitor.evaluate_as(Trigger::Manual).await;
                self.publish();
                // The requester may have gone away; the outcome is already logged
                let _ = reply.send(outcome);
            }
            WardenEvent::Remediate { reply } => {
                info!("manual remediation requested");
                let outcome = self.monitor.remediate_now().await;
                self.publish();
                let _ = reply.send(outcome);
            }
            WardenEvent::Pause => {
                info!("periodic evaluation paused");
                self.monitor.set_running(false);
                self.publish();
            }
            WardenEvent::Resume => {
                info!("periodic evaluation resumed");
                self.monitor.set_running(true);
                self.publish();
            }
            WardenEvent::Toggle { reply } => {
                let running = !self.monitor.is_running();
                info!(running, "periodic evaluation toggled");
                self.monitor.set_running(running);
                self.publish();
                let _ = reply.send(running);
            }
            WardenEvent::History { limit, reply } => {
                let _ = reply.send(self.monitor.history(limit));
            }
            WardenEvent::Shutdown => {}
        }
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.monitor.snapshot());
    }
}

/// Handle for interacting with a running Warden
#[derive(Clone)]
pub struct WardenHandle {
    sender: mpsc::Sender<WardenEvent>,
    snapshots: watch::Receiver<MonitorSnapshot>,
}

impl WardenHandle {
    async fn send(&self, event: WardenEvent) -> Result<()> {
        self.sender
            .send(event)
            .await
            .map_err(|_| Error::WardenClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> WardenEvent) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.send(make(reply)).await?;
        response.await.map_err(|_| Error::WardenClosed)
    }

    /// Evaluate now and wait for the outcome
    pub async fn evaluate(&self) -> Result<Outcome> {
        self.request(|reply| WardenEvent::Evaluate { reply }).await
    }

    /// Remediate now and wait for the outcome
    pub async fn remediate(&self) -> Result<Outcome> {
        self.request(|reply| WardenEvent::Remediate { reply }).await
    }

    pub async fn pause(&self) -> Result<()> {
        self.send(WardenEvent::Pause).await
    }

    pub async fn resume(&self) -> Result<()> {
        self.send(WardenEvent::Resume).await
    }

    /// Flip between paused and running
    pub async fn toggle(&self) -> Result<bool> {
        self.request(|reply| WardenEvent::Toggle { reply }).await
    }

    /// The newest `limit` evaluation records, oldest first
    pub async fn history(&self, limit: usize) -> Result<Vec<EvaluationRecord>> {
        self.request(|reply| WardenEvent::History { limit, reply })
            .await
    }

    /// Request the Warden to shutdown
    pub async fn shutdown(&self) -> Result<()> {
        self.send(WardenEvent::Shutdown).await
    }

    /// Latest published monitor state
    pub fn snapshot(&self) -> MonitorSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every published snapshot
    pub fn subscribe(&self) -> watch::Receiver<MonitorSnapshot> {
        self.snapshots.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sickbay::Policy;
    use crate::sickbay::probe::HealthProbe;
    use crate::sickbay::recovery::{Remedy, RemedyReport};
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProbe(Option<&'static str>);

    #[async_trait]
    impl HealthProbe for FixedProbe {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn probe(&self) -> Result<Option<String>> {
            Ok(self.0.map(str::to_string))
        }
    }

    struct CountingRemedy(Arc<AtomicUsize>);

    #[async_trait]
    impl Remedy for CountingRemedy {
        fn name(&self) -> &str {
            "counting"
        }

        async fn apply(&self) -> Result<RemedyReport> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(RemedyReport::success("done"))
        }
    }

    const INTERVAL: Duration = Duration::from_secs(1800);

    fn warden(value: Option<&'static str>, running: bool) -> (Warden, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut monitor = RemediationLoop::new(
            Box::new(FixedProbe(value)),
            Box::new(CountingRemedy(Arc::clone(&calls))),
            Policy {
                cooldown: Duration::from_secs(300),
                settle: Duration::from_secs(30),
                ..Policy::default()
            },
        );
        monitor.set_running(running);
        (Warden::new(monitor, INTERVAL), calls)
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_evaluates_immediately() {
        let (warden, _) = warden(Some("2001:db8::1"), true);
        let handle = warden.handle();
        let mut updates = handle.subscribe();
        let task = tokio::spawn(warden.run());

        updates.changed().await.unwrap();
        let snapshot = handle.snapshot();
        assert!(snapshot.last_check_at.is_some());
        assert_eq!(snapshot.last_health_value.as_deref(), Some("2001:db8::1"));

        let history = handle.history(10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].trigger, Trigger::Scheduled);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_paused_warden_skips_ticks() {
        let (warden, calls) = warden(None, false);
        let handle = warden.handle();
        let task = tokio::spawn(warden.run());

        tokio::time::sleep(INTERVAL * 3).await;

        assert!(handle.history(10).await.unwrap().is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(handle.snapshot().last_check_at.is_none());

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_evaluate_while_paused() {
        let (warden, _) = warden(Some("ok"), false);
        let handle = warden.handle();
        let task = tokio::spawn(warden.run());

        let outcome = handle.evaluate().await.unwrap();
        assert!(outcome.is_healthy());
        assert_eq!(handle.history(1).await.unwrap()[0].trigger, Trigger::Manual);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_requests_remediate_once() {
        let (warden, calls) = warden(None, false);
        let handle = warden.handle();
        let task = tokio::spawn(warden.run());

        let requests: Vec<_> = (0..5)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.evaluate().await })
            })
            .collect();

        let mut outcomes = Vec::new();
        for request in requests {
            outcomes.push(request.await.unwrap().unwrap());
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| **o == Outcome::RemediationIneffective)
                .count(),
            1
        );
        assert_eq!(
            outcomes
                .iter()
                .filter(|o| matches!(o, Outcome::SkippedCooldown { .. }))
                .count(),
            4
        );
        assert_eq!(handle.snapshot().remediation_count, 1);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_forced_remediation_ignores_cooldown() {
        let (warden, calls) = warden(None, false);
        let handle = warden.handle();
        let task = tokio::spawn(warden.run());

        handle.evaluate().await.unwrap();
        let outcome = handle.remediate().await.unwrap();

        assert_eq!(outcome, Outcome::RemediationIneffective);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(handle.snapshot().remediation_count, 2);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_publishes_running_state() {
        let (warden, _) = warden(Some("ok"), false);
        let handle = warden.handle();
        let mut updates = handle.subscribe();
        let task = tokio::spawn(warden.run());

        assert!(handle.toggle().await.unwrap());
        updates.changed().await.unwrap();
        assert!(updates.borrow_and_update().is_running);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_toggles_cancel_out() {
        let (warden, _) = warden(Some("ok"), false);
        let handle = warden.handle();
        let task = tokio::spawn(warden.run());

        let (first, second) = tokio::join!(handle.toggle(), handle.toggle());
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_ne!(first, second);
        assert!(!handle.snapshot().is_running);

        handle.shutdown().await.unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_requests_after_shutdown_fail() {
        let (warden, _) = warden(Some("ok"), false);
        let handle = warden.handle();
        let task = tokio::spawn(warden.run());

        handle.shutdown().await.unwrap();
        task.await.unwrap();

        assert!(matches!(handle.evaluate().await, Err(Error::WardenClosed)));
        assert!(matches!(handle.pause().await, Err(Error::WardenClosed)));
    }
}
