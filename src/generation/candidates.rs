//! Turning finished jobs into blended candidate tiles

use std::sync::Arc;

use image::{imageops, imageops::FilterType, RgbaImage};
use tokio::task::JoinSet;
use tokio::time::Instant;

use super::poller::{poll_until_done, JobContext, JobUpdate, PollOutcome, PollSettings};
use super::{GeneratedImage, GenerationError, GenerationRequest, GenerationService, ImageStatus};
use crate::blend::{AlphaMode, BlendRequest};
use crate::core::geometry::Rect;
use crate::pool::BlendPool;
use crate::raster::codec;

/// How candidates are blended before preview
#[derive(Debug, Clone)]
pub struct BlendRecipe {
    pub selection: Rect,
    pub image_width: u32,
    pub image_height: u32,
    pub feather: bool,
    pub feather_width: Option<u32>,
    pub alpha_mode: AlphaMode,
    /// Selection-sized mask read according to `alpha_mode`
    pub mask: Option<RgbaImage>,
}

impl BlendRecipe {
    fn request(&self, id: String, pixels: RgbaImage) -> BlendRequest {
        let mut request = BlendRequest::feather(id, pixels, self.selection, self.image_width, self.image_height);
        request.feather = self.feather;
        request.feather_width = self.feather_width;
        if let (AlphaMode::Alpha | AlphaMode::Mask, Some(mask)) = (self.alpha_mode, &self.mask) {
            request = request.with_mask(self.alpha_mode, mask.clone());
        }
        request
    }
}

/// Completed images in creation order
fn completed_in_order(mut images: Vec<GeneratedImage>) -> Vec<GeneratedImage> {
    images.retain(|img| img.status == ImageStatus::Completed && img.image_data.is_some());
    images.sort_by_key(|img| img.created_at);
    images
}

/// Decode, fit to the selection and blend every completed image through the
/// pool. Undecodable images are skipped; none left is an error.
pub async fn prepare_candidates(
    images: Vec<GeneratedImage>,
    recipe: &BlendRecipe,
    pool: &Arc<BlendPool>,
    id_prefix: &str,
) -> Result<Vec<RgbaImage>, GenerationError> {
    let images = completed_in_order(images);
    let (width, height) = (recipe.selection.width, recipe.selection.height);

    let mut tasks = JoinSet::new();
    for (index, image) in images.into_iter().enumerate() {
        let Some(data) = image.image_data.as_deref() else {
            continue;
        };
        let decoded = match codec::decode_base64(data) {
            Ok(decoded) => decoded,
            Err(e) => {
                tracing::warn!("Skipping candidate {}: {}", image.id, e);
                continue;
            }
        };
        let fitted = if decoded.dimensions() == (width, height) {
            decoded
        } else {
            imageops::resize(&decoded, width, height, FilterType::Lanczos3)
        };
        let request = recipe.request(format!("{}-{}", id_prefix, index), fitted);
        let pool = pool.clone();
        tasks.spawn(async move { (index, pool.process(request).await) });
    }

    let mut blended = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        let Ok((index, result)) = joined else {
            continue;
        };
        let response = result?;
        blended.push((index, response.into_image(width, height)?));
    }
    if blended.is_empty() {
        return Err(GenerationError::NoImages);
    }
    blended.sort_by_key(|(index, _)| *index);
    Ok(blended.into_iter().map(|(_, image)| image).collect())
}

/// Full generation round trip run inside a job task: submit, poll under
/// the deadline, then blend the results.
pub async fn generate_candidates<S: GenerationService>(
    service: Arc<S>,
    pool: Arc<BlendPool>,
    request: GenerationRequest,
    recipe: BlendRecipe,
    settings: PollSettings,
    mut ctx: JobContext<Vec<RgbaImage>>,
) -> Result<Vec<RgbaImage>, GenerationError> {
    let deadline = Instant::now() + settings.timeout;
    let job_id = tokio::time::timeout_at(deadline, service.submit(request))
        .await
        .map_err(|_| GenerationError::TimedOut)??;
    tracing::info!("Generation job {} submitted", job_id);
    ctx.report(JobUpdate::Submitted(job_id.clone()));

    if ctx.is_cancelled() {
        if let Err(e) = service.cancel(&job_id).await {
            tracing::warn!("Remote cancel of job {} failed: {}", job_id, e);
        }
        return Err(GenerationError::Cancelled);
    }

    match poll_until_done(service.as_ref(), &job_id, settings.interval, deadline, &mut ctx).await {
        PollOutcome::Completed(job) => {
            let images = job.images.unwrap_or_default();
            prepare_candidates(images, &recipe, &pool, &job_id).await
        }
        PollOutcome::Failed(message) => Err(GenerationError::JobFailed(message)),
        PollOutcome::TimedOut => Err(GenerationError::TimedOut),
        PollOutcome::Cancelled => Err(GenerationError::Cancelled),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::raster::EncodeFormat;
    use image::Rgba;

    fn encoded(color: Rgba<u8>, size: u32) -> String {
        codec::encode_base64(&RgbaImage::from_pixel(size, size, color), EncodeFormat::Png).unwrap()
    }

    fn image(id: &str, created_at: u64, data: Option<String>, status: ImageStatus) -> GeneratedImage {
        GeneratedImage {
            id: id.into(),
            status,
            image_data: data,
            created_at,
        }
    }

    fn recipe() -> BlendRecipe {
        BlendRecipe {
            selection: Rect::new(0, 0, 32, 32),
            image_width: 32,
            image_height: 32,
            feather: true,
            feather_width: None,
            alpha_mode: AlphaMode::None,
            mask: None,
        }
    }

    #[tokio::test]
    async fn test_candidates_sorted_by_creation_and_resized() {
        let pool = Arc::new(BlendPool::new(3));
        let images = vec![
            image("late", 30, Some(encoded(Rgba([3, 0, 0, 255]), 64)), ImageStatus::Completed),
            image("failed", 5, None, ImageStatus::Error),
            image("early", 10, Some(encoded(Rgba([1, 0, 0, 255]), 64)), ImageStatus::Completed),
            image("mid", 20, Some(encoded(Rgba([2, 0, 0, 255]), 16)), ImageStatus::Completed),
        ];
        let out = prepare_candidates(images, &recipe(), &pool, "job").await.unwrap();
        assert_eq!(out.len(), 3);
        let reds: Vec<u8> = out.iter().map(|img| img.get_pixel(16, 16)[0]).collect();
        assert_eq!(reds, vec![1, 2, 3]);
        assert!(out.iter().all(|img| img.dimensions() == (32, 32)));
    }

    #[tokio::test]
    async fn test_alpha_mask_applied() {
        let pool = Arc::new(BlendPool::new(1));
        let mut mask = RgbaImage::from_pixel(32, 32, Rgba([0, 0, 0, 255]));
        mask.get_pixel_mut(5, 5)[3] = 0;
        let recipe = BlendRecipe {
            feather: false,
            alpha_mode: AlphaMode::Alpha,
            mask: Some(mask),
            ..recipe()
        };
        let images = vec![image("a", 1, Some(encoded(Rgba([9, 9, 9, 255]), 32)), ImageStatus::Completed)];
        let out = prepare_candidates(images, &recipe, &pool, "job").await.unwrap();
        assert_eq!(out[0].get_pixel(5, 5)[3], 255);
        assert_eq!(out[0].get_pixel(30, 30)[3], 0);
    }

    #[tokio::test]
    async fn test_nothing_decodable_is_no_images() {
        let pool = Arc::new(BlendPool::new(1));
        let images = vec![image("bad", 1, Some("not-base64!".into()), ImageStatus::Completed)];
        assert!(matches!(
            prepare_candidates(images, &recipe(), &pool, "job").await,
            Err(GenerationError::NoImages)
        ));
    }
}
