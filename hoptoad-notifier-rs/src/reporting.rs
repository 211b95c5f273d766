//! # Background Notice Dispatch
//!
//! The request path hands rendered notices to a [`NoticeQueue`] and returns
//! at once. [`BackgroundDispatcher`] is the tokio-backed queue: a worker task
//! drains a bounded channel and runs one delivery task per job.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use metrics::counter;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::{JoinHandle, JoinSet};
use tracing::Instrument;
use uuid::Uuid;
use crate::delivery::{DeliveryEngine, DeliveryOutcome};
use crate::notice::NoticePayload;
use crate::types::{NotifierError, Result};

/// One unit of delivery work
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    /// Identifier used to correlate log lines of one delivery
    pub id: Uuid,
    /// Rendered notice
    pub payload: Arc<NoticePayload>,
    /// Network timeout, transport default when `None`
    pub timeout: Option<Duration>,
    /// Start over TLS
    pub use_ssl: bool,
}

impl DeliveryJob {
    /// Creates a job with a fresh id
    pub fn new(payload: NoticePayload, timeout: Option<Duration>, use_ssl: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload: Arc::new(payload),
            timeout,
            use_ssl,
        }
    }
}

/// Accepts delivery work to be run out of band
pub trait NoticeQueue: Send + Sync {
    /// Queues a job without waiting for it to run
    fn enqueue(&self, job: DeliveryJob) -> Result<()>;
}

/// Runs deliveries on the tokio runtime.
///
/// At most `capacity` deliveries run at once and at most `capacity` more wait
/// in the queue; further jobs are rejected.
#[derive(Debug)]
pub struct BackgroundDispatcher {
    sender: Mutex<Option<mpsc::Sender<DeliveryJob>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundDispatcher {
    /// Starts the worker task. Must be called from within a tokio runtime.
    pub fn spawn(engine: Arc<DeliveryEngine>, capacity: usize) -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| NotifierError::queue(format!("No tokio runtime available: {}", e)))?;

        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        let worker = handle.spawn(Self::run_worker(receiver, engine, capacity));

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    async fn run_worker(
        mut receiver: mpsc::Receiver<DeliveryJob>,
        engine: Arc<DeliveryEngine>,
        max_in_flight: usize,
    ) {
        let mut deliveries = JoinSet::new();

        loop {
            tokio::select! {
                // Jobs stay in the channel while the in-flight limit is reached.
                job = receiver.recv(), if deliveries.len() < max_in_flight => match job {
                    Some(job) => {
                        let engine = Arc::clone(&engine);
                        let span = tracing::info_span!(
                            "deliver_notice",
                            job_id = %job.id,
                            format = %job.payload.format(),
                        );
                        deliveries.spawn(async move { run_job(&engine, job).await }.instrument(span));
                    }
                    None => break,
                },
                Some(finished) = deliveries.join_next(), if !deliveries.is_empty() => {
                    if let Err(e) = finished {
                        tracing::error!(error = %e, "Delivery task failed");
                    }
                }
            }
        }

        while let Some(finished) = deliveries.join_next().await {
            if let Err(e) = finished {
                tracing::error!(error = %e, "Delivery task failed");
            }
        }
    }

    /// Stops accepting jobs and waits for queued and running deliveries
    pub async fn shutdown(&self) {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);

        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Notice dispatcher stopped abnormally");
            }
        }
    }
}

impl NoticeQueue for BackgroundDispatcher {
    fn enqueue(&self, job: DeliveryJob) -> Result<()> {
        let guard = self
            .sender
            .lock()
            .map_err(|_| NotifierError::queue("Dispatcher lock poisoned"))?;
        let sender = guard
            .as_ref()
            .ok_or_else(|| NotifierError::queue("Dispatcher is shut down"))?;

        match sender.try_send(job) {
            Ok(()) => {
                counter!("notices.enqueued", 1);
                Ok(())
            }
            Err(TrySendError::Full(job)) => {
                counter!("notices.dropped", 1);
                tracing::warn!(job_id = %job.id, "Notice queue full, dropping notice");
                Err(NotifierError::queue("Notice queue full"))
            }
            Err(TrySendError::Closed(_)) => Err(NotifierError::queue("Notice queue closed")),
        }
    }
}

async fn run_job(engine: &DeliveryEngine, job: DeliveryJob) -> DeliveryOutcome {
    let outcome = engine.deliver(&job.payload, job.timeout, job.use_ssl).await;
    tracing::debug!(?outcome, "Notice delivery finished");
    outcome
}
