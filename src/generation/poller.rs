//! Cancellable job watcher
//!
//! A generation job runs in its own tokio task. The task polls the backend
//! on a fixed interval; cancellation and the hard deadline are `select!`
//! arms of every iteration, including while a poll request is in flight.
//! Leaving through either one issues exactly one remote cancel.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tokio_stream::Stream;

use super::{GenerationError, GenerationJob, GenerationService, JobStatus};
use crate::core::config::EditorConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSettings {
    pub fn generation(config: &EditorConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            timeout: config.job_timeout(),
        }
    }

    pub fn augmentation(config: &EditorConfig) -> Self {
        Self {
            interval: config.poll_interval(),
            timeout: config.augment_timeout(),
        }
    }
}

/// Progress reported by a running job task
#[derive(Debug)]
pub enum JobUpdate<T> {
    /// Backend accepted the job
    Submitted(String),
    Progress(f32),
    /// Recoverable problem, polling continues
    Warning(String),
    Finished(Result<T, GenerationError>),
}

/// How a polling loop ended
#[derive(Debug, Clone, PartialEq)]
pub enum PollOutcome {
    Completed(GenerationJob),
    Failed(String),
    TimedOut,
    Cancelled,
}

/// Task-side half of a [`JobHandle`]
pub struct JobContext<T> {
    cancel: oneshot::Receiver<()>,
    updates: mpsc::UnboundedSender<JobUpdate<T>>,
}

impl<T> JobContext<T> {
    pub fn report(&self, update: JobUpdate<T>) {
        // Handle dropped means nobody is listening anymore
        let _ = self.updates.send(update);
    }

    pub fn progress(&self, progress: f32) {
        self.report(JobUpdate::Progress(progress.clamp(0.0, 1.0)));
    }

    /// Non-blocking check; a dropped handle counts as cancellation.
    pub fn is_cancelled(&mut self) -> bool {
        !matches!(self.cancel.try_recv(), Err(oneshot::error::TryRecvError::Empty))
    }
}

/// Interactive-side handle on a spawned job task.
///
/// Dropping the handle cancels the job.
pub struct JobHandle<T> {
    cancel: Option<oneshot::Sender<()>>,
    updates: mpsc::UnboundedReceiver<JobUpdate<T>>,
    task: JoinHandle<()>,
}

impl<T: Send + 'static> JobHandle<T> {
    /// Spawn `job` on the current tokio runtime
    pub fn spawn<F, Fut>(job: F) -> Self
    where
        F: FnOnce(JobContext<T>) -> Fut,
        Fut: Future<Output = Result<T, GenerationError>> + Send + 'static,
    {
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let finished = updates_tx.clone();
        let fut = job(JobContext {
            cancel: cancel_rx,
            updates: updates_tx,
        });
        let task = tokio::spawn(async move {
            let result = fut.await;
            let _ = finished.send(JobUpdate::Finished(result));
        });
        Self {
            cancel: Some(cancel_tx),
            updates: updates_rx,
            task,
        }
    }
}

impl<T> JobHandle<T> {
    /// Ask the task to stop. Only the first call has an effect.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }

    /// Next update without waiting
    pub fn try_next(&mut self) -> Option<JobUpdate<T>> {
        self.updates.try_recv().ok()
    }

    /// Wait for the next update; `None` once the task is gone
    pub async fn recv(&mut self) -> Option<JobUpdate<T>> {
        self.updates.recv().await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl<T> Stream for JobHandle<T> {
    type Item = JobUpdate<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().updates.poll_recv(cx)
    }
}

/// Poll `job_id` every `interval` until it finishes, `deadline` passes or
/// the job is cancelled.
pub async fn poll_until_done<S, T>(
    service: &S,
    job_id: &str,
    interval: Duration,
    deadline: Instant,
    ctx: &mut JobContext<T>,
) -> PollOutcome
where
    S: GenerationService,
{
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let outcome = loop {
        let polled = tokio::select! {
            biased;
            _ = &mut ctx.cancel => break PollOutcome::Cancelled,
            _ = sleep_until(deadline) => break PollOutcome::TimedOut,
            result = async {
                ticker.tick().await;
                service.poll(job_id).await
            } => result,
        };

        match polled {
            Ok(job) => {
                ctx.progress(job.progress);
                match job.status {
                    JobStatus::Completed => break PollOutcome::Completed(job),
                    JobStatus::Error => {
                        break PollOutcome::Failed(job.error.unwrap_or_else(|| "Generation job failed".into()))
                    }
                    JobStatus::Pending | JobStatus::Processing => {}
                }
            }
            Err(e) => {
                tracing::warn!("Polling job {} failed: {}", job_id, e);
                ctx.report(JobUpdate::Warning(e.to_string()));
            }
        }
    };

    if matches!(outcome, PollOutcome::TimedOut | PollOutcome::Cancelled) {
        tracing::info!("Cancelling job {} ({:?})", job_id, outcome);
        if let Err(e) = service.cancel(job_id).await {
            tracing::warn!("Remote cancel of job {} failed: {}", job_id, e);
        }
    }
    outcome
}
