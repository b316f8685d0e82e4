//! Upscale / face-restore pipeline
//!
//! Images are padded to multiples of 64, split into overlapping tiles when
//! they exceed the tile limit, and every tile is augmented by the backend
//! one after another. Augmented tiles are feathered on their interior
//! edges through the blend pool before the grid is merged back.

use std::sync::Arc;

use image::{imageops, imageops::FilterType, RgbaImage};
use tokio::time::Instant;

use super::poller::{poll_until_done, JobContext, JobUpdate, PollOutcome, PollSettings};
use super::{AugmentationKind, AugmentationRequest, GenerationError, GenerationService, ImageStatus};
use crate::blend::{merge_tiles, split_image, BlendRequest, SplitOutcome};
use crate::core::config::EditorConfig;
use crate::core::geometry::{round_up_to, Rect};
use crate::pool::BlendPool;
use crate::raster::{self, codec, EncodeFormat};

const SIZE_STEP: u32 = 64;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AugmentSettings {
    pub kind: AugmentationKind,
    pub tile_size: u32,
    pub overlap: u32,
    pub feather_width: u32,
    /// Applied to each tile separately
    pub poll: PollSettings,
}

impl AugmentSettings {
    pub fn new(kind: AugmentationKind, config: &EditorConfig) -> Self {
        Self {
            kind,
            tile_size: config.tile_size,
            overlap: config.tile_overlap,
            feather_width: config.augment_feather_width,
            poll: PollSettings::augmentation(config),
        }
    }
}

/// Pad with transparency so both sides are multiples of 64
fn pad_to_step(image: &RgbaImage) -> RgbaImage {
    let (width, height) = image.dimensions();
    let (padded_w, padded_h) = (round_up_to(width, SIZE_STEP), round_up_to(height, SIZE_STEP));
    if (padded_w, padded_h) == (width, height) {
        return image.clone();
    }
    let mut padded = raster::blank(padded_w, padded_h);
    raster::put(&mut padded, image, 0, 0);
    padded
}

/// Send one piece through the backend and bring it back at `scale`x size.
async fn augment_piece<S: GenerationService>(
    service: &S,
    piece: &RgbaImage,
    settings: &AugmentSettings,
    ctx: &mut JobContext<RgbaImage>,
) -> Result<RgbaImage, GenerationError> {
    let deadline = Instant::now() + settings.poll.timeout;
    let request = AugmentationRequest {
        kind: settings.kind,
        image_data: codec::encode_base64(piece, EncodeFormat::Png)?,
    };
    let job_id = tokio::time::timeout_at(deadline, service.submit_augmentation(request))
        .await
        .map_err(|_| GenerationError::TimedOut)??;
    ctx.report(JobUpdate::Submitted(job_id.clone()));

    let job = match poll_until_done(service, &job_id, settings.poll.interval, deadline, ctx).await {
        PollOutcome::Completed(job) => job,
        PollOutcome::Failed(message) => return Err(GenerationError::JobFailed(message)),
        PollOutcome::TimedOut => return Err(GenerationError::TimedOut),
        PollOutcome::Cancelled => return Err(GenerationError::Cancelled),
    };
    let data = job
        .images
        .unwrap_or_default()
        .into_iter()
        .filter(|img| img.status == ImageStatus::Completed)
        .find_map(|img| img.image_data)
        .ok_or(GenerationError::NoImages)?;

    let decoded = codec::decode_base64(&data)?;
    let scale = settings.kind.scale();
    let (width, height) = (piece.width() * scale, piece.height() * scale);
    if decoded.dimensions() == (width, height) {
        Ok(decoded)
    } else {
        Ok(imageops::resize(&decoded, width, height, FilterType::Lanczos3))
    }
}

/// Augment `image`, returning it scaled by the augmentation factor.
pub async fn augment_image<S: GenerationService>(
    service: Arc<S>,
    pool: Arc<BlendPool>,
    image: RgbaImage,
    settings: AugmentSettings,
    mut ctx: JobContext<RgbaImage>,
) -> Result<RgbaImage, GenerationError> {
    let scale = settings.kind.scale();
    let (width, height) = image.dimensions();
    let padded = pad_to_step(&image);

    let merged = match split_image(&padded, settings.tile_size, settings.overlap)? {
        SplitOutcome::NotNeeded => {
            tracing::info!("Augmenting {}x{} in one piece", padded.width(), padded.height());
            let result = augment_piece(service.as_ref(), &padded, &settings, &mut ctx).await?;
            ctx.progress(1.0);
            result
        }
        SplitOutcome::Split(mut grid) => {
            let total = (grid.num_tiles_x * grid.num_tiles_y) as f32;
            let (scaled_w, scaled_h) = (grid.image_width * scale, grid.image_height * scale);
            tracing::info!(
                "Augmenting {}x{} as {}x{} tiles",
                grid.image_width,
                grid.image_height,
                grid.num_tiles_x,
                grid.num_tiles_y
            );

            let mut done = 0.0;
            for x in 0..grid.num_tiles_x {
                for y in 0..grid.num_tiles_y {
                    if ctx.is_cancelled() {
                        return Err(GenerationError::Cancelled);
                    }
                    let tile = &grid.tiles[x as usize][y as usize];
                    let augmented = augment_piece(service.as_ref(), tile, &settings, &mut ctx).await?;
                    let (tile_w, tile_h) = augmented.dimensions();

                    let rect = grid.tile_rect(x, y);
                    let region = Rect::new(rect.x * scale as i32, rect.y * scale as i32, tile_w, tile_h);
                    let request = BlendRequest::feather(format!("tile-{}-{}", x, y), augmented, region, scaled_w, scaled_h)
                        .with_feather_width(settings.feather_width)
                        .with_upscale(true);
                    let response = pool.process(request).await?;
                    grid.tiles[x as usize][y as usize] = response.into_image(tile_w, tile_h)?;

                    done += 1.0;
                    ctx.progress(done / total);
                }
            }
            grid.rescale(scale);
            merge_tiles(&grid)?
        }
    };

    let (out_w, out_h) = (width * scale, height * scale);
    if merged.dimensions() == (out_w, out_h) {
        Ok(merged)
    } else {
        Ok(raster::crop(&merged, Rect::from_size(out_w, out_h)))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::generation::poller::tests::{job, ScriptedService};
    use crate::generation::{GeneratedImage, GenerationJob, JobHandle, JobStatus};
    use image::Rgba;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn completed_with(image: &RgbaImage) -> GenerationJob {
        let data = codec::encode_base64(image, EncodeFormat::Png).unwrap();
        job(
            "aug",
            JobStatus::Completed,
            1.0,
            Some(vec![GeneratedImage {
                id: "img".into(),
                status: ImageStatus::Completed,
                image_data: Some(data),
                created_at: 1,
            }]),
        )
    }

    fn settings(kind: AugmentationKind) -> AugmentSettings {
        AugmentSettings::new(kind, &EditorConfig::default())
    }

    async fn run(
        service: Arc<ScriptedService>,
        image: RgbaImage,
        settings: AugmentSettings,
    ) -> Result<RgbaImage, GenerationError> {
        let pool = Arc::new(BlendPool::new(2));
        let mut handle = JobHandle::spawn(move |ctx| augment_image(service, pool, image, settings, ctx));
        while let Some(update) = handle.recv().await {
            if let JobUpdate::Finished(result) = update {
                return result;
            }
        }
        panic!("augment task ended without a result");
    }

    #[test]
    fn test_pad_to_step() {
        let image = RgbaImage::from_pixel(100, 64, Rgba([1, 2, 3, 255]));
        let padded = pad_to_step(&image);
        assert_eq!(padded.dimensions(), (128, 64));
        assert_eq!(padded.get_pixel(99, 0), &Rgba([1, 2, 3, 255]));
        assert_eq!(padded.get_pixel(100, 0)[3], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_small_image_goes_in_one_piece() {
        let result_tile = RgbaImage::from_pixel(256, 256, Rgba([7, 7, 7, 255]));
        let service = Arc::new(ScriptedService::new(vec![Ok(completed_with(&result_tile))]));
        let image = RgbaImage::from_pixel(128, 128, Rgba([1, 1, 1, 255]));
        let out = run(service.clone(), image, settings(AugmentationKind::Upscale)).await.unwrap();
        assert_eq!(out.dimensions(), (256, 256));
        assert_eq!(out.get_pixel(100, 100), &Rgba([7, 7, 7, 255]));
        assert_eq!(service.augmentations.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_padding_is_cropped_from_result() {
        let service = Arc::new(ScriptedService::new(vec![Ok(completed_with(&RgbaImage::from_pixel(
            128,
            64,
            Rgba([5, 5, 5, 255]),
        )))]));
        let image = RgbaImage::from_pixel(100, 50, Rgba([1, 1, 1, 255]));
        let out = run(service, image, settings(AugmentationKind::FaceRestore)).await.unwrap();
        assert_eq!(out.dimensions(), (100, 50));
    }

    #[tokio::test(start_paused = true)]
    async fn test_large_image_is_tiled_and_merged() {
        // backend returns an opaque tile of whatever size; it gets resized
        let service = Arc::new(ScriptedService::new(vec![Ok(completed_with(&RgbaImage::from_pixel(
            64,
            64,
            Rgba([9, 9, 9, 255]),
        )))]));
        let image = RgbaImage::from_pixel(640, 512, Rgba([1, 1, 1, 255]));
        let out = run(service.clone(), image, settings(AugmentationKind::Upscale)).await.unwrap();
        assert_eq!(out.dimensions(), (1280, 1024));
        // 512 tiles with 32 overlap: ceil(640/480) x ceil(512/480)
        assert_eq!(service.augmentations.lock().len(), 4);
        // origin tile is not feathered on the image boundary
        assert_eq!(out.get_pixel(0, 0), &Rgba([9, 9, 9, 255]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_tile_times_out_with_cancel() {
        let service = Arc::new(ScriptedService::never_finishing());
        let image = RgbaImage::from_pixel(64, 64, Rgba([1, 1, 1, 255]));
        let started = Instant::now();
        let result = run(service.clone(), image, settings(AugmentationKind::Upscale)).await;
        assert!(matches!(result, Err(GenerationError::TimedOut)));
        assert!(started.elapsed() >= Duration::from_secs(60));
        assert_eq!(service.cancels.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_job_reports_message() {
        let mut failed = job("aug", JobStatus::Error, 0.0, None);
        failed.error = Some("gpu on fire".into());
        let service = Arc::new(ScriptedService::new(vec![Ok(failed)]));
        let image = RgbaImage::from_pixel(64, 64, Rgba([1, 1, 1, 255]));
        match run(service, image, settings(AugmentationKind::Upscale)).await {
            Err(GenerationError::JobFailed(message)) => assert_eq!(message, "gpu on fire"),
            other => panic!("unexpected {:?}", other.map(|i| i.dimensions())),
        }
    }
}
