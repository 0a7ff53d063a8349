//! Background Feedback Queue
//!
//! Completed sessions are queued here and graded off the request path. A
//! single dispatcher task pulls jobs from a bounded channel and runs at most
//! `workers` pipelines at once. Every job ends in the completion callback,
//! which persists either the report or an error marker, so a session never
//! stays `Running` once its job is over, whether the run succeeded, failed,
//! timed out or panicked.

use anyhow::{Context, Result};
use oralexam_core::feedback::{
    FeedbackErrorMarker, FeedbackInput, FeedbackOrchestrator, FeedbackRecord, PipelineState,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::{
    sync::{Semaphore, mpsc, oneshot},
    task::{JoinHandle, JoinSet},
};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::store::SessionStore;

const DEFAULT_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueSettings {
    pub workers: usize,
    pub timeout: Duration,
    pub capacity: usize,
}

impl QueueSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.feedback_workers,
            timeout: config.feedback_timeout,
            capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("feedback queue is closed")]
    Closed,
}

struct FeedbackJob {
    session_id: Uuid,
    done: oneshot::Sender<PipelineState>,
}

/// Handle on a queued job. Dropping it does not cancel the job.
#[derive(Debug)]
pub struct FeedbackTicket {
    session_id: Uuid,
    done: oneshot::Receiver<PipelineState>,
}

impl FeedbackTicket {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    /// Waits for the job's final pipeline state. `None` if the queue shut
    /// down before the job ran.
    pub async fn wait(self) -> Option<PipelineState> {
        self.done.await.ok()
    }
}

#[derive(Clone)]
pub struct FeedbackQueue {
    tx: mpsc::Sender<FeedbackJob>,
}

impl FeedbackQueue {
    /// Spawns the dispatcher. It runs until every `FeedbackQueue` clone has
    /// been dropped and all in-flight jobs have finished.
    pub fn start(
        store: Arc<dyn SessionStore>,
        orchestrator: FeedbackOrchestrator,
        settings: QueueSettings,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(settings.capacity.max(1));
        let handle = tokio::spawn(dispatch(rx, store, orchestrator, settings));
        (Self { tx }, handle)
    }

    pub async fn enqueue(&self, session_id: Uuid) -> Result<FeedbackTicket, QueueError> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(FeedbackJob {
                session_id,
                done: done_tx,
            })
            .await
            .map_err(|_| QueueError::Closed)?;
        debug!(%session_id, "Feedback job queued");
        Ok(FeedbackTicket {
            session_id,
            done: done_rx,
        })
    }
}

async fn dispatch(
    mut rx: mpsc::Receiver<FeedbackJob>,
    store: Arc<dyn SessionStore>,
    orchestrator: FeedbackOrchestrator,
    settings: QueueSettings,
) {
    let permits = Arc::new(Semaphore::new(settings.workers.max(1)));
    let mut in_flight = JoinSet::new();
    info!(
        workers = settings.workers,
        timeout_secs = settings.timeout.as_secs(),
        "Feedback queue started"
    );

    loop {
        tokio::select! {
            Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = result {
                    error!(error = ?e, "Feedback job task failed");
                }
            }
            job = rx.recv() => {
                let Some(job) = job else { break };
                let Ok(permit) = permits.clone().acquire_owned().await else {
                    break;
                };
                let store = store.clone();
                let orchestrator = orchestrator.clone();
                let span = info_span!("feedback_job", session_id = %job.session_id);
                in_flight.spawn(
                    async move {
                        let state =
                            run_job(job.session_id, store.as_ref(), orchestrator, settings.timeout)
                                .await;
                        let _ = job.done.send(state);
                        drop(permit);
                    }
                    .instrument(span),
                );
            }
        }
    }

    while let Some(result) = in_flight.join_next().await {
        if let Err(e) = result {
            error!(error = ?e, "Feedback job task failed");
        }
    }
    info!("Feedback queue drained");
}

async fn load_input(store: &dyn SessionStore, session_id: Uuid) -> Result<FeedbackInput> {
    let session = store
        .get_session(session_id)
        .await
        .context("Failed to load session")?;
    let transcript = store
        .get_transcript(session_id)
        .await
        .context("Failed to load transcript")?;
    let image = store
        .get_image_context(session_id)
        .await
        .context("Failed to load image context")?;
    Ok(FeedbackInput::from_completed(
        &session.lifecycle,
        transcript,
        image,
    )?)
}

/// Runs the pipeline in its own task under `timeout`, folding every way it
/// can end into a record. A panic surfaces as a `JoinError` instead of
/// unwinding through the caller.
pub async fn run_with_timeout(
    orchestrator: FeedbackOrchestrator,
    input: FeedbackInput,
    timeout: Duration,
) -> FeedbackRecord {
    let pipeline =
        tokio::spawn(async move { tokio::time::timeout(timeout, orchestrator.run(&input)).await });

    match pipeline.await {
        Ok(Ok(result)) => FeedbackRecord::from_result(result),
        Ok(Err(_elapsed)) => FeedbackRecord::Failed(FeedbackErrorMarker::new(format!(
            "feedback generation timed out after {}s",
            timeout.as_secs_f64()
        ))),
        Err(e) if e.is_panic() => {
            FeedbackRecord::Failed(FeedbackErrorMarker::new("feedback generation crashed"))
        }
        Err(e) => FeedbackRecord::Failed(FeedbackErrorMarker::new(format!(
            "feedback generation was cancelled: {e}"
        ))),
    }
}

async fn run_job(
    session_id: Uuid,
    store: &dyn SessionStore,
    orchestrator: FeedbackOrchestrator,
    timeout: Duration,
) -> PipelineState {
    let record = match load_input(store, session_id).await {
        Ok(input) => run_with_timeout(orchestrator, input, timeout).await,
        Err(e) => {
            warn!(error = ?e, "Could not prepare feedback input");
            FeedbackRecord::Failed(FeedbackErrorMarker::new(format!("{e:#}")))
        }
    };
    complete(store, session_id, &record).await
}

/// Completion callback: persists the outcome of a job and returns the
/// resulting pipeline state.
async fn complete(store: &dyn SessionStore, session_id: Uuid, record: &FeedbackRecord) -> PipelineState {
    match record {
        FeedbackRecord::Report(report) => info!(
            total_mark = report.rubric.total_mark,
            "Feedback ready"
        ),
        FeedbackRecord::Failed(marker) => warn!(message = %marker.message, "Feedback failed"),
    }

    match store.save_feedback(session_id, record).await {
        Ok(()) => record.pipeline_state(),
        Err(e) => {
            error!(error = ?e, "Failed to persist feedback");
            if let Err(e) = store
                .set_pipeline_state(session_id, PipelineState::Failed)
                .await
            {
                error!(error = ?e, "Failed to mark feedback as failed");
            }
            PipelineState::Failed
        }
    }
}
