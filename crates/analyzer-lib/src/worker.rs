//! Background execution of analysis runs
//!
//! `WorkerPool::submit` never waits: it registers the session ID as in
//! flight and pushes the session onto a bounded queue. A dispatcher task
//! pulls from the queue only when one of `max_concurrent_runs` permits is
//! free, so the queue holds at most `queue_capacity` pending runs. A
//! session ID stays registered until its run has been delivered.

use crate::health::components;
use crate::models::Session;
use crate::observability::AnalyzerMetrics;
use crate::pipeline::Analyzer;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    pub max_concurrent_runs: usize,
    pub queue_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 4,
            queue_capacity: 64,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmitError {
    #[error("session {0} is already being analyzed")]
    Duplicate(String),

    #[error("analysis queue is full")]
    QueueFull,

    #[error("worker pool is shut down")]
    Closed,
}

/// Session IDs accepted but not yet delivered, with their acceptance time
type InFlight = Arc<DashMap<String, DateTime<Utc>>>;

#[derive(Clone)]
pub struct WorkerPool {
    queue: mpsc::Sender<Session>,
    in_flight: InFlight,
    metrics: AnalyzerMetrics,
}

impl WorkerPool {
    /// Spawn the dispatcher.
    ///
    /// The dispatcher exits once every `WorkerPool` clone is dropped and all
    /// runs it started have finished.
    pub fn start(
        analyzer: Arc<Analyzer>,
        config: WorkerConfig,
        metrics: AnalyzerMetrics,
    ) -> (Self, JoinHandle<()>) {
        let (queue, rx) = mpsc::channel(config.queue_capacity.max(1));
        let in_flight: InFlight = Arc::new(DashMap::new());

        let dispatcher = Dispatcher {
            analyzer,
            rx,
            permits: Arc::new(Semaphore::new(config.max_concurrent_runs.max(1))),
            max_concurrent_runs: config.max_concurrent_runs.max(1) as u32,
            in_flight: in_flight.clone(),
            metrics: metrics.clone(),
        };
        let handle = tokio::spawn(dispatcher.run());

        info!(
            max_concurrent_runs = config.max_concurrent_runs,
            queue_capacity = config.queue_capacity,
            "Worker pool started"
        );

        (
            Self {
                queue,
                in_flight,
                metrics,
            },
            handle,
        )
    }

    /// Queue a run without waiting for it
    pub fn submit(&self, session: Session) -> Result<(), SubmitError> {
        let session_id = session.session_id.clone();

        match self.in_flight.entry(session_id.clone()) {
            Entry::Occupied(_) => {
                self.metrics.inc_runs_rejected();
                return Err(SubmitError::Duplicate(session_id));
            }
            Entry::Vacant(slot) => {
                slot.insert(Utc::now());
            }
        }

        if let Err(e) = self.queue.try_send(session) {
            self.in_flight.remove(&session_id);
            self.metrics.inc_runs_rejected();
            return Err(match e {
                TrySendError::Full(_) => SubmitError::QueueFull,
                TrySendError::Closed(_) => SubmitError::Closed,
            });
        }

        self.metrics.inc_runs_submitted();
        self.metrics.set_runs_in_flight(self.in_flight.len() as i64);
        debug!(session_id = %session_id, "Run queued");
        Ok(())
    }

    /// Sessions queued or running, oldest first
    pub fn active_sessions(&self) -> Vec<String> {
        let mut sessions: Vec<(String, DateTime<Utc>)> = self
            .in_flight
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect();
        sessions.sort_by_key(|(_, accepted)| *accepted);
        sessions.into_iter().map(|(id, _)| id).collect()
    }
}

/// Releases a session ID when its run task ends, including by panic
struct InFlightSlot {
    session_id: String,
    in_flight: InFlight,
    metrics: AnalyzerMetrics,
}

impl Drop for InFlightSlot {
    fn drop(&mut self) {
        self.in_flight.remove(&self.session_id);
        self.metrics.set_runs_in_flight(self.in_flight.len() as i64);
    }
}

struct Dispatcher {
    analyzer: Arc<Analyzer>,
    rx: mpsc::Receiver<Session>,
    permits: Arc<Semaphore>,
    max_concurrent_runs: u32,
    in_flight: InFlight,
    metrics: AnalyzerMetrics,
}

impl Dispatcher {
    async fn run(mut self) {
        self.analyzer
            .health()
            .register(components::WORKER_POOL)
            .await;

        loop {
            // Only take work off the queue once it can start
            let Ok(permit) = self.permits.clone().acquire_owned().await else {
                break;
            };
            let Some(session) = self.rx.recv().await else {
                break;
            };

            let analyzer = self.analyzer.clone();
            let slot = InFlightSlot {
                session_id: session.session_id.clone(),
                in_flight: self.in_flight.clone(),
                metrics: self.metrics.clone(),
            };
            tokio::spawn(async move {
                // Declared first so the slot is released before the permit
                let _permit = permit;
                let _slot = slot;
                analyzer.run(&session).await;
            });
        }

        // Holding every permit means no run is still executing
        if self
            .permits
            .acquire_many(self.max_concurrent_runs)
            .await
            .is_err()
        {
            warn!("Worker permits closed before runs drained");
        }

        self.analyzer
            .health()
            .set_unhealthy(components::WORKER_POOL, "dispatcher stopped")
            .await;
        info!("Worker pool stopped");
    }
}
