//! Background blending pool
//!
//! A fixed set of OS threads runs [`process_request`] off the interactive
//! thread. Requests are handed out round-robin and each caller is woken by
//! the response carrying its own id, whatever order workers finish in.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use crate::blend::{alpha_mask::DEFAULT_SPREAD, process_request, BlendError, BlendRequest, BlendResponse};
use crate::core::config::EditorConfig;

pub const DEFAULT_WORKERS: usize = 3;

#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("Blend pool is shut down")]
    Closed,

    #[error("Request id {0} is already in flight")]
    DuplicateId(String),

    #[error("Worker dropped request {0}")]
    WorkerLost(String),

    #[error(transparent)]
    Blend(#[from] BlendError),
}

impl From<PoolError> for String {
    fn from(e: PoolError) -> Self {
        e.to_string()
    }
}

/// Work executed by a pool thread
pub type BlendHandler = Arc<dyn Fn(BlendRequest) -> Result<BlendResponse, BlendError> + Send + Sync>;

type Reply = oneshot::Sender<Result<BlendResponse, BlendError>>;
type PendingMap = Arc<Mutex<HashMap<String, Reply>>>;

pub struct BlendPool {
    senders: Mutex<Vec<mpsc::UnboundedSender<BlendRequest>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    pending: PendingMap,
    next: AtomicUsize,
    workers: usize,
}

impl BlendPool {
    /// Pool running the standard blending handler
    pub fn new(workers: usize) -> Self {
        Self::with_spread(workers, DEFAULT_SPREAD)
    }

    pub fn from_config(config: &EditorConfig) -> Self {
        Self::with_spread(config.pool_workers, config.alpha_spread)
    }

    pub fn with_spread(workers: usize, spread: u32) -> Self {
        Self::with_handler(workers, Arc::new(move |req| process_request(req, spread)))
    }

    /// Pool running a custom handler
    pub fn with_handler(workers: usize, handler: BlendHandler) -> Self {
        let workers = workers.max(1);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);

        for index in 0..workers {
            let (tx, rx) = mpsc::unbounded_channel();
            let handler = handler.clone();
            let pending = pending.clone();
            let spawned = std::thread::Builder::new()
                .name(format!("blend-worker-{}", index))
                .spawn(move || worker_loop(index, rx, handler, pending));
            match spawned {
                Ok(handle) => {
                    senders.push(tx);
                    handles.push(handle);
                }
                Err(e) => tracing::error!("Failed to spawn blend worker {}: {}", index, e),
            }
        }

        tracing::info!("Blend pool started with {} workers", senders.len());
        Self {
            workers: senders.len(),
            senders: Mutex::new(senders),
            handles: Mutex::new(handles),
            pending,
            next: AtomicUsize::new(0),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Requests dispatched but not yet answered
    pub fn in_flight(&self) -> usize {
        self.pending.lock().len()
    }

    /// Run `request` on the next worker and wait for its response.
    pub async fn process(&self, request: BlendRequest) -> Result<BlendResponse, PoolError> {
        let id = request.id.clone();
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock();
            if pending.contains_key(&id) {
                return Err(PoolError::DuplicateId(id));
            }
            pending.insert(id.clone(), tx);
        }

        let dispatched = {
            let senders = self.senders.lock();
            if senders.is_empty() {
                false
            } else {
                let index = self.next.fetch_add(1, Ordering::Relaxed) % senders.len();
                tracing::debug!("Dispatching blend request {} to worker {}", id, index);
                senders[index].send(request).is_ok()
            }
        };
        if !dispatched {
            self.pending.lock().remove(&id);
            return Err(PoolError::Closed);
        }

        match rx.await {
            Ok(result) => Ok(result?),
            Err(_) => Err(PoolError::WorkerLost(id)),
        }
    }

    /// Stop all workers. Queued requests still run; later calls fail with
    /// [`PoolError::Closed`].
    pub fn shutdown(&self) {
        self.senders.lock().clear();
        let handles: Vec<_> = self.handles.lock().drain(..).collect();
        if handles.is_empty() {
            return;
        }
        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!("Blend worker panicked during shutdown");
            }
        }
        // Anything left can no longer be answered
        self.pending.lock().clear();
        tracing::info!("Blend pool shut down");
    }
}

impl Default for BlendPool {
    fn default() -> Self {
        Self::new(DEFAULT_WORKERS)
    }
}

impl Drop for BlendPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    index: usize,
    mut rx: mpsc::UnboundedReceiver<BlendRequest>,
    handler: BlendHandler,
    pending: PendingMap,
) {
    while let Some(request) = rx.blocking_recv() {
        let request_id = request.id.clone();
        let result = handler(request);
        // Route by the id the response carries
        let reply_id = match &result {
            Ok(response) => response.id.clone(),
            Err(e) => {
                tracing::warn!("Blend worker {} failed request {}: {}", index, request_id, e);
                request_id
            }
        };
        let reply = pending.lock().remove(&reply_id);
        match reply {
            Some(tx) => {
                // Receiver gone means the caller stopped waiting
                let _ = tx.send(result);
            }
            None => tracing::warn!("No caller waiting for blend response {}", reply_id),
        }
    }
    tracing::debug!("Blend worker {} stopped", index);
}
