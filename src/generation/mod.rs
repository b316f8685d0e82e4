//! Remote generation plumbing
//!
//! The generation backend is an external collaborator reached through
//! [`GenerationService`]. This module owns the job/candidate types, the
//! supported output sizes, and the watcher task that polls a job to
//! completion under a hard deadline.

pub mod aspect;
pub mod augment;
pub mod candidates;
pub mod poller;
pub mod types;

use std::future::Future;

pub use aspect::{closest_aspect_ratio, upscale_level, AspectRatio};
pub use augment::{augment_image, AugmentSettings};
pub use candidates::{generate_candidates, prepare_candidates, BlendRecipe};
pub use poller::{poll_until_done, JobContext, JobHandle, JobUpdate, PollOutcome, PollSettings};
pub use types::{
    AugmentationKind, AugmentationRequest, GeneratedImage, GenerationJob, GenerationRequest, ImageStatus, JobStatus,
};

use crate::blend::BlendError;
use crate::pool::PoolError;
use crate::raster::CodecError;

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Generation request failed: {0}")]
    Remote(String),

    #[error("Generation job failed: {0}")]
    JobFailed(String),

    #[error("Generation timed out")]
    TimedOut,

    #[error("Generation cancelled")]
    Cancelled,

    #[error("No images returned")]
    NoImages,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Blend(#[from] BlendError),
}

impl From<GenerationError> for String {
    fn from(e: GenerationError) -> Self {
        e.to_string()
    }
}

/// Remote image generation backend.
///
/// Implementations are shared with spawned watcher tasks, hence the
/// `Send + Sync + 'static` bound.
pub trait GenerationService: Send + Sync + 'static {
    /// Start a generation job, returning its id
    fn submit(&self, request: GenerationRequest) -> impl Future<Output = Result<String, GenerationError>> + Send;

    /// Start an upscale/face-restore job, returning its id
    fn submit_augmentation(
        &self,
        request: AugmentationRequest,
    ) -> impl Future<Output = Result<String, GenerationError>> + Send;

    fn poll(&self, job_id: &str) -> impl Future<Output = Result<GenerationJob, GenerationError>> + Send;

    /// Best-effort remote cancellation
    fn cancel(&self, job_id: &str) -> impl Future<Output = Result<(), GenerationError>> + Send;
}
