//! Background flush of idle sessions
//!
//! Periodically checks every registered session and flushes those that have
//! pending work and have been idle long enough. Sessions whose last flush
//! failed are retried with exponential backoff.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use lexis_core::ParticipantId;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::session::{FlushStatus, Session};

/// Sessions watched by the flush task, keyed by participant
pub type SessionMap = Arc<DashMap<ParticipantId, Arc<Session>>>;

/// Retry state for one session
#[derive(Debug)]
struct FlushBackoff {
    consecutive_failures: u32,
    last_attempt: Instant,
}

impl FlushBackoff {
    fn new() -> Self {
        Self {
            consecutive_failures: 0,
            last_attempt: Instant::now(),
        }
    }

    /// 2^failures seconds, capped at 64s
    fn backoff_duration(&self) -> Duration {
        Duration::from_secs(2u64.pow(self.consecutive_failures.min(6)))
    }

    fn should_retry(&self) -> bool {
        if self.consecutive_failures == 0 {
            return true;
        }
        self.last_attempt.elapsed() >= self.backoff_duration()
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.last_attempt = Instant::now();
    }

    fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.last_attempt = Instant::now();
    }
}

/// Background idle flush task
pub struct IdleFlushTask {
    sessions: SessionMap,
    /// How often sessions are checked
    check_interval: Duration,
    /// Idle time before a session is flushed
    idle_after: Duration,
    shutdown_rx: broadcast::Receiver<()>,
    backoff: HashMap<ParticipantId, FlushBackoff>,
    cycle_count: u64,
}

impl IdleFlushTask {
    pub fn new(
        sessions: SessionMap,
        check_interval: Duration,
        idle_after: Duration,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            sessions,
            check_interval,
            idle_after,
            shutdown_rx,
            backoff: HashMap::new(),
            cycle_count: 0,
        }
    }

    /// Spawn the task in the background
    pub fn spawn(
        sessions: SessionMap,
        check_interval: Duration,
        idle_after: Duration,
        shutdown_rx: broadcast::Receiver<()>,
    ) -> JoinHandle<()> {
        let task = Self::new(sessions, check_interval, idle_after, shutdown_rx);
        tokio::spawn(async move {
            task.run().await;
        })
    }

    async fn run(mut self) {
        info!(
            interval_ms = self.check_interval.as_millis() as u64,
            idle_after_secs = self.idle_after.as_secs(),
            "Idle flush task started"
        );

        let mut interval = tokio::time::interval(self.check_interval);

        loop {
            tokio::select! {
                _ = self.shutdown_rx.recv() => {
                    info!("Idle flush task shutting down");
                    break;
                }
                _ = interval.tick() => {
                    self.cycle_count += 1;
                    self.flush_idle_sessions().await;
                }
            }
        }
    }

    async fn flush_idle_sessions(&mut self) {
        // Collect first so no map guard is held across a flush
        let sessions: Vec<(ParticipantId, Arc<Session>)> = self
            .sessions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect();

        for (participant, session) in sessions {
            if !session.has_pending_work() || session.idle_for() < self.idle_after {
                continue;
            }
            let backoff = self
                .backoff
                .entry(participant.clone())
                .or_insert_with(FlushBackoff::new);
            if !backoff.should_retry() {
                debug!(participant = %participant, "Flush backing off");
                continue;
            }

            match session.flush_pending().await {
                FlushStatus::Synced { persisted, skipped } => {
                    backoff.record_success();
                    debug!(participant = %participant, persisted, skipped, "Idle session flushed");
                }
                FlushStatus::Retry { error, remaining, .. } => {
                    backoff.record_failure();
                    warn!(
                        participant = %participant,
                        %error,
                        remaining,
                        retry_in_secs = backoff.backoff_duration().as_secs(),
                        "Idle flush failed"
                    );
                }
                FlushStatus::Busy | FlushStatus::Idle => {}
            }
        }

        // Forget sessions that were closed
        let sessions = &self.sessions;
        self.backoff.retain(|p, _| sessions.contains_key(p));
    }
}
