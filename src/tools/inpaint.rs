//! Inpainting: erase part of the selection, have the backend regenerate the
//! erased pixels, pick a candidate.
//!
//! ```text
//! select -> erase -> uploading -> processing -> confirm -> select
//!   ^____________________________________|  (error / timeout / cancel)
//! ```
//!
//! Erasure is written straight into base alpha and never snapshotted; submit
//! captures it as the alpha mask and then restores the pre-erase base, so the
//! erased pixels only ever live in the mask sent with the job.

use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::args::{merge_args, InpaintArgs, SelectionArgs};
use super::candidates::CandidateSet;
use super::selection::SelectionTool;
use super::{commit_and_save, PointerButton, SaveHook, SaveListener, SavedImage, Tool, ToolError, ToolPointer};
use crate::blend::AlphaMode;
use crate::compositor::{Compositor, Cursor, CursorShape, Layer};
use crate::core::config::EditorConfig;
use crate::core::geometry::Direction;
use crate::generation::{
    closest_aspect_ratio, generate_candidates, BlendRecipe, GenerationRequest, GenerationService,
    JobHandle, JobUpdate, PollSettings,
};
use crate::pool::BlendPool;
use crate::raster::{codec, EncodeFormat};
use crate::storage::ImageMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InpaintState {
    Select,
    Erase,
    Uploading,
    Processing,
    Confirm,
}

impl InpaintState {
    pub fn name(self) -> &'static str {
        match self {
            InpaintState::Select => "select",
            InpaintState::Erase => "erase",
            InpaintState::Uploading => "uploading",
            InpaintState::Processing => "processing",
            InpaintState::Confirm => "confirm",
        }
    }

    pub fn is_busy(self) -> bool {
        matches!(self, InpaintState::Uploading | InpaintState::Processing)
    }
}

pub struct InpaintTool<S: GenerationService> {
    args: InpaintArgs,
    config: EditorConfig,
    service: Arc<S>,
    pool: Arc<BlendPool>,
    selection: SelectionTool,
    state: InpaintState,
    job: Option<JobHandle<Vec<RgbaImage>>>,
    candidates: CandidateSet,
    /// Prompt pair the current candidates were generated with
    prompt: Option<(String, String)>,
    erasing: bool,
    erased: bool,
    progress: f32,
    last_error: Option<String>,
    save: SaveHook,
}

impl<S: GenerationService> InpaintTool<S> {
    pub fn new(
        args: InpaintArgs,
        config: &EditorConfig,
        service: Arc<S>,
        pool: Arc<BlendPool>,
        compositor: &mut Compositor,
    ) -> Self {
        let selection = SelectionTool::new(
            SelectionArgs {
                outpaint: args.outpaint,
                ..Default::default()
            },
            config.selection_snap,
        );
        let mut tool = Self {
            args,
            config: config.clone(),
            service,
            pool,
            selection,
            state: InpaintState::Select,
            job: None,
            candidates: CandidateSet::default(),
            prompt: None,
            erasing: false,
            erased: false,
            progress: 0.0,
            last_error: None,
            save: SaveHook::default(),
        };
        tool.enter(compositor, InpaintState::Select);
        tool
    }

    pub fn state(&self) -> InpaintState {
        self.state
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    fn enter(&mut self, compositor: &mut Compositor, state: InpaintState) {
        if self.state == InpaintState::Select && state != InpaintState::Select {
            self.selection.clear_preview(compositor);
        }
        if state != InpaintState::Erase {
            self.erasing = false;
        }
        tracing::debug!("inpaint: {} -> {}", self.state.name(), state.name());
        self.state = state;
    }

    fn invalid(&self, action: &'static str) -> ToolError {
        ToolError::InvalidState {
            tool: "inpaint",
            action,
            state: self.state.name(),
        }
    }

    /// Start erasing inside the committed selection
    pub fn erase(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        match self.state {
            InpaintState::Select | InpaintState::Erase => {
                if compositor.selection().is_none() {
                    return Err(crate::compositor::CompositorError::NoSelection.into());
                }
                self.enter(compositor, InpaintState::Erase);
                Ok(())
            }
            _ => Err(self.invalid("erase")),
        }
    }

    /// Go back to placing the selection, dropping any erasure
    pub fn reselect(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        if self.state != InpaintState::Erase {
            return Err(self.invalid("select"));
        }
        if self.erased {
            compositor.restore_previous()?;
            self.erased = false;
        }
        self.enter(compositor, InpaintState::Select);
        Ok(())
    }

    fn apply(&mut self, compositor: &mut Compositor, update: JobUpdate<Vec<RgbaImage>>) {
        match update {
            JobUpdate::Submitted(job_id) => {
                tracing::debug!("inpaint: job {} accepted", job_id);
                self.enter(compositor, InpaintState::Processing);
            }
            JobUpdate::Progress(progress) => self.progress = progress,
            JobUpdate::Warning(message) => tracing::warn!("inpaint: {}", message),
            JobUpdate::Finished(Ok(images)) => {
                self.job = None;
                tracing::info!("inpaint: {} candidates", images.len());
                self.candidates = CandidateSet::new(images);
                compositor.set_edit_image(self.candidates.current());
                self.enter(compositor, InpaintState::Confirm);
            }
            JobUpdate::Finished(Err(e)) => {
                self.job = None;
                tracing::error!("inpaint: {}", e);
                self.last_error = Some(e.to_string());
                self.prompt = None;
                self.progress = 0.0;
                self.enter(compositor, InpaintState::Select);
            }
        }
    }

    /// Wait for the running job, applying every update as it arrives
    pub async fn wait(&mut self, compositor: &mut Compositor) {
        while let Some(job) = self.job.as_mut() {
            match job.recv().await {
                Some(update) => self.apply(compositor, update),
                None => self.job = None,
            }
        }
    }

    /// Stop any job and return to selecting with the pre-erase base
    fn discard(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        if let Some(mut job) = self.job.take() {
            job.cancel();
        }
        self.candidates.clear();
        self.prompt = None;
        self.progress = 0.0;
        compositor.set_edit_image(None);
        if self.erased && compositor.has_image() {
            compositor.restore_previous()?;
        }
        self.erased = false;
        self.enter(compositor, InpaintState::Select);
        Ok(())
    }
}

impl<S: GenerationService> Tool for InpaintTool<S> {
    fn name(&self) -> &'static str {
        "inpaint"
    }

    fn state_name(&self) -> &'static str {
        self.state.name()
    }

    fn on_pointer_down(&mut self, compositor: &mut Compositor, pointer: ToolPointer) -> Result<(), ToolError> {
        match self.state {
            InpaintState::Select => self.selection.on_pointer_down(compositor, pointer),
            InpaintState::Erase if pointer.button == PointerButton::Primary => {
                compositor.erase_point(pointer.position, self.args.brush_size)?;
                self.erasing = true;
                self.erased = true;
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn on_pointer_move(&mut self, compositor: &mut Compositor, pointer: ToolPointer) -> Result<(), ToolError> {
        match self.state {
            InpaintState::Select => self.selection.on_pointer_move(compositor, pointer),
            InpaintState::Erase => {
                compositor.set_cursor(Some(Cursor::new(
                    pointer.position,
                    self.args.brush_size / 2.0,
                    CursorShape::Circle,
                )));
                if self.erasing {
                    compositor.erase_point(pointer.position, self.args.brush_size)?;
                }
                Ok(())
            }
            _ => {
                compositor.set_cursor(Some(Cursor::new(pointer.position, 10.0, CursorShape::Crosshairs)));
                Ok(())
            }
        }
    }

    fn on_pointer_up(&mut self, _compositor: &mut Compositor, _pointer: ToolPointer) -> Result<(), ToolError> {
        self.erasing = false;
        Ok(())
    }

    fn on_pointer_leave(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        self.erasing = false;
        if self.state == InpaintState::Select {
            self.selection.on_pointer_leave(compositor)?;
        }
        compositor.set_cursor(None);
        Ok(())
    }

    fn tick(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        while let Some(update) = self.job.as_mut().and_then(|job| job.try_next()) {
            self.apply(compositor, update);
        }
        Ok(())
    }

    fn select(&mut self, compositor: &mut Compositor, direction: Direction) -> Result<(), ToolError> {
        if self.state == InpaintState::Confirm {
            self.candidates.select(direction);
            compositor.set_edit_image(self.candidates.current());
        }
        Ok(())
    }

    fn submit(&mut self, compositor: &mut Compositor, image: &ImageMeta) -> Result<(), ToolError> {
        if !matches!(self.state, InpaintState::Select | InpaintState::Erase) {
            return Err(self.invalid("submit"));
        }
        if self.selection.outpaint() {
            compositor.expand_to_overlay()?;
        }
        let selection = compositor.selection().ok_or(crate::compositor::CompositorError::NoSelection)?;
        if !self.config.region_fits(selection.width, selection.height) {
            return Err(ToolError::RegionTooLarge {
                width: selection.width,
                height: selection.height,
                max_width: self.config.max_region_width,
                max_height: self.config.max_region_height,
            });
        }

        let mask = compositor.mask_image(Some(selection), Layer::Base)?;
        let alpha = compositor.image_data(Some(selection), Layer::Base)?;
        if self.erased {
            compositor.restore_previous()?;
            self.erased = false;
        }
        let source = compositor.image_data(Some(selection), Layer::Base)?;

        let size = closest_aspect_ratio(selection.width, selection.height);
        let prompt = if self.args.prompt.is_empty() {
            image.prompt.clone()
        } else {
            self.args.prompt.clone()
        };
        let negative_prompt = if self.args.negative_prompt.is_empty() {
            image.negative_prompt.clone()
        } else {
            self.args.negative_prompt.clone()
        };
        let request = GenerationRequest {
            prompt: prompt.clone(),
            negative_prompt: negative_prompt.clone(),
            width: size.width,
            height: size.height,
            model: self.args.model.clone(),
            count: self.args.count,
            denoising_strength: 1.0,
            source_image: Some(codec::encode_base64(&source, EncodeFormat::Webp)?),
            source_mask: Some(codec::encode_base64(&mask, EncodeFormat::Png)?),
            parent: image.id.clone(),
        };
        let recipe = BlendRecipe {
            selection,
            image_width: compositor.width(),
            image_height: compositor.height(),
            feather: false,
            feather_width: None,
            alpha_mode: AlphaMode::Alpha,
            mask: Some(alpha),
        };

        tracing::info!(
            "inpaint: submitting {}x{} region as {} ({}x{})",
            selection.width,
            selection.height,
            size.name,
            size.width,
            size.height
        );
        let service = self.service.clone();
        let pool = self.pool.clone();
        let settings = PollSettings::generation(&self.config);
        self.job = Some(JobHandle::spawn(move |ctx| {
            generate_candidates(service, pool, request, recipe, settings, ctx)
        }));
        self.prompt = Some((prompt, negative_prompt));
        self.last_error = None;
        self.progress = 0.0;
        compositor.set_cursor(None);
        self.enter(compositor, InpaintState::Uploading);
        Ok(())
    }

    fn confirm(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        if self.state != InpaintState::Confirm {
            return Err(self.invalid("confirm"));
        }
        let (prompt, negative_prompt) = self.prompt.take().unzip();
        commit_and_save(compositor, &mut self.save, |image_data| SavedImage {
            prompt,
            negative_prompt,
            ..SavedImage::png(image_data)
        })?;
        self.candidates.clear();
        self.enter(compositor, InpaintState::Select);
        Ok(())
    }

    fn cancel(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        if self.state.is_busy() {
            tracing::info!("inpaint: cancelling running job");
        }
        self.discard(compositor)
    }

    fn destroy(&mut self, compositor: &mut Compositor, confirm_discard: &mut dyn FnMut() -> bool) -> bool {
        if self.is_dirty() && !confirm_discard() {
            return false;
        }
        if let Err(e) = self.discard(compositor) {
            tracing::warn!("inpaint: discard on destroy failed: {}", e);
        }
        self.selection.clear_preview(compositor);
        compositor.set_cursor(None);
        true
    }

    fn on_save_image(&mut self, listener: SaveListener) {
        self.save.set(listener);
    }

    fn args(&self) -> Value {
        serde_json::to_value(&self.args).unwrap_or(Value::Null)
    }

    fn update_args(&mut self, _compositor: &mut Compositor, patch: Value) -> Result<Value, ToolError> {
        self.args = merge_args(&self.args, patch)?;
        self.selection.set_outpaint(self.args.outpaint);
        Ok(self.args())
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn is_dirty(&self) -> bool {
        self.erased || self.job.is_some() || !self.candidates.is_empty()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::generation::poller::tests::{job, ScriptedService};
    use crate::generation::{GeneratedImage, ImageStatus, JobStatus};
    use crate::tools::tests::{compositor_with, recording_listener};
    use image::Rgba;
    use std::time::Duration;
    use tokio::time::Instant;

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

    fn completed_with(color: Rgba<u8>, size: u32) -> ScriptedService {
        let data = codec::encode_base64(&RgbaImage::from_pixel(size, size, color), EncodeFormat::Png).unwrap();
        let images = vec![GeneratedImage {
            id: "img-a".into(),
            status: ImageStatus::Completed,
            image_data: Some(data),
            created_at: 1,
        }];
        ScriptedService::new(vec![
            Ok(job("job-1", JobStatus::Processing, 0.5, None)),
            Ok(job("job-1", JobStatus::Completed, 1.0, Some(images))),
        ])
    }

    fn meta() -> ImageMeta {
        ImageMeta {
            id: Some("parent-1".into()),
            prompt: "a red square".into(),
            ..Default::default()
        }
    }

    fn tool(service: ScriptedService, c: &mut Compositor) -> (InpaintTool<ScriptedService>, Arc<ScriptedService>) {
        let service = Arc::new(service);
        let args = InpaintArgs {
            brush_size: 40.0,
            ..Default::default()
        };
        let t = InpaintTool::new(
            args,
            &EditorConfig::default(),
            service.clone(),
            Arc::new(BlendPool::new(2)),
            c,
        );
        (t, service)
    }

    #[tokio::test]
    async fn test_starts_in_select_at_any_size() {
        let mut square = compositor_with(512, 512, RED);
        let (t, _) = tool(ScriptedService::never_finishing(), &mut square);
        assert_eq!(t.state(), InpaintState::Select);

        let mut wide = compositor_with(1024, 768, RED);
        let (t, _) = tool(ScriptedService::never_finishing(), &mut wide);
        assert_eq!(t.state(), InpaintState::Select);
    }

    #[tokio::test]
    async fn test_outpaint_preview_extends_past_native_square() {
        let mut c = compositor_with(512, 512, RED);
        let (mut t, _) = tool(ScriptedService::never_finishing(), &mut c);
        t.update_args(&mut c, serde_json::json!({"outpaint": true})).unwrap();

        t.on_pointer_move(&mut c, ToolPointer::primary(448.0, 256.0)).unwrap();
        let preview = c.selection_preview().unwrap();
        assert!(preview.right() > 512);
        t.on_pointer_down(&mut c, ToolPointer::primary(448.0, 256.0)).unwrap();
        assert_eq!(c.selection(), Some(preview));

        t.submit(&mut c, &meta()).unwrap();
        assert_eq!((c.width(), c.height()), (704, 512));
        assert_eq!(c.base().get_pixel(600, 256)[3], 0);
        assert_eq!(t.state(), InpaintState::Uploading);
        t.cancel(&mut c).unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_erase_submit_and_confirm() {
        let mut c = compositor_with(512, 512, RED);
        let (mut t, service) = tool(completed_with(BLUE, 512), &mut c);
        let (listener, saved) = recording_listener();
        t.on_save_image(listener);

        t.erase(&mut c).unwrap();
        t.on_pointer_down(&mut c, ToolPointer::primary(256.0, 256.0)).unwrap();
        t.on_pointer_up(&mut c, ToolPointer::primary(256.0, 256.0)).unwrap();
        assert_eq!(c.base().get_pixel(256, 256)[3], 0);
        assert!(t.is_dirty());

        t.submit(&mut c, &meta()).unwrap();
        assert_eq!(t.state(), InpaintState::Uploading);
        // erasure lives only in the mask now
        assert_eq!(c.base().get_pixel(256, 256), &RED);

        t.wait(&mut c).await;
        assert_eq!(t.state(), InpaintState::Confirm);
        assert_eq!(t.candidates().len(), 1);
        assert_eq!(c.edit().get_pixel(256, 256), &BLUE);
        assert_eq!(c.edit().get_pixel(10, 10)[3], 0);
        assert!(!c.can_undo());

        let request = service.submitted.lock()[0].clone();
        assert_eq!(request.denoising_strength, 1.0);
        assert_eq!((request.width, request.height), (512, 512));
        assert_eq!(request.prompt, "a red square");
        assert_eq!(request.parent.as_deref(), Some("parent-1"));
        assert!(request.source_mask.is_some());

        t.confirm(&mut c).unwrap();
        assert_eq!(c.base().get_pixel(256, 256), &BLUE);
        assert_eq!(c.base().get_pixel(10, 10), &RED);
        assert_eq!(t.state(), InpaintState::Select);
        let saved = saved.lock();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].prompt.as_deref(), Some("a red square"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_job_times_out_back_to_select() {
        let mut c = compositor_with(1024, 768, RED);
        let (mut t, service) = tool(ScriptedService::never_finishing(), &mut c);
        t.erase(&mut c).unwrap();
        t.on_pointer_down(&mut c, ToolPointer::primary(512.0, 384.0)).unwrap();
        t.on_pointer_up(&mut c, ToolPointer::primary(512.0, 384.0)).unwrap();
        assert_eq!(t.state(), InpaintState::Erase);
        let started = Instant::now();
        t.submit(&mut c, &meta()).unwrap();

        t.wait(&mut c).await;
        assert!(started.elapsed() >= Duration::from_secs(120));
        assert_eq!(t.state(), InpaintState::Select);
        assert_eq!(t.last_error(), Some("Generation timed out"));
        assert!(t.candidates().is_empty());
        assert_eq!(service.cancels(), 1);
        assert_eq!(c.base().get_pixel(512, 384), &RED);
        assert_eq!(c.edit().get_pixel(512, 384)[3], 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_processing_cancels_remote_once() {
        let mut c = compositor_with(512, 512, RED);
        let (mut t, service) = tool(ScriptedService::never_finishing(), &mut c);
        t.erase(&mut c).unwrap();
        t.on_pointer_down(&mut c, ToolPointer::primary(100.0, 100.0)).unwrap();
        t.submit(&mut c, &meta()).unwrap();

        tokio::time::sleep(Duration::from_secs(5)).await;
        t.tick(&mut c).unwrap();
        assert_eq!(t.state(), InpaintState::Processing);
        assert!(t.progress() > 0.0);

        t.cancel(&mut c).unwrap();
        assert_eq!(t.state(), InpaintState::Select);
        assert!(!t.is_dirty());
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(service.cancels(), 1);
        tokio::time::sleep(Duration::from_secs(200)).await;
        assert_eq!(service.cancels(), 1);
    }

    #[tokio::test]
    async fn test_oversized_region_rejected_before_submit() {
        let mut c = compositor_with(1024, 768, RED);
        let service = Arc::new(ScriptedService::never_finishing());
        let config = EditorConfig {
            max_region_width: 256,
            max_region_height: 256,
            ..Default::default()
        };
        let mut t = InpaintTool::new(
            InpaintArgs::default(),
            &config,
            service.clone(),
            Arc::new(BlendPool::new(1)),
            &mut c,
        );
        let err = t.submit(&mut c, &meta()).unwrap_err();
        assert!(matches!(err, ToolError::RegionTooLarge { width: 512, .. }));
        assert_eq!(t.state(), InpaintState::Select);
        assert!(service.submitted.lock().is_empty());
    }

    #[tokio::test]
    async fn test_submit_failure_is_recorded() {
        let mut c = compositor_with(512, 512, RED);
        let service = ScriptedService::never_finishing();
        *service.fail_submit.lock() = Some("backend unavailable".into());
        let (mut t, _) = tool(service, &mut c);
        t.submit(&mut c, &meta()).unwrap();
        t.wait(&mut c).await;
        assert_eq!(t.state(), InpaintState::Select);
        assert!(t.last_error().unwrap().contains("backend unavailable"));
    }

    #[tokio::test]
    async fn test_destroy_asks_before_dropping_erasure() {
        let mut c = compositor_with(512, 512, RED);
        let (mut t, _) = tool(ScriptedService::never_finishing(), &mut c);
        t.erase(&mut c).unwrap();
        t.on_pointer_down(&mut c, ToolPointer::primary(256.0, 256.0)).unwrap();

        assert!(!t.destroy(&mut c, &mut || false));
        assert_eq!(c.base().get_pixel(256, 256)[3], 0);

        assert!(t.destroy(&mut c, &mut || true));
        assert_eq!(c.base().get_pixel(256, 256), &RED);
    }

    #[tokio::test]
    async fn test_pointer_routing_per_state() {
        let mut c = compositor_with(1024, 768, RED);
        let (mut t, _) = tool(ScriptedService::never_finishing(), &mut c);
        t.on_pointer_move(&mut c, ToolPointer::primary(600.0, 300.0)).unwrap();
        assert!(c.selection_preview().is_some());
        t.on_pointer_down(&mut c, ToolPointer::primary(600.0, 300.0)).unwrap();
        let committed = c.selection().unwrap();

        t.erase(&mut c).unwrap();
        assert_eq!(c.selection_preview(), None);
        let cx = committed.x as f64 + committed.width as f64 / 2.0;
        let cy = committed.y as f64 + committed.height as f64 / 2.0;
        t.on_pointer_move(&mut c, ToolPointer::primary(cx, cy)).unwrap();
        assert_eq!(c.cursor().map(|cur| cur.shape), Some(CursorShape::Circle));

        t.reselect(&mut c).unwrap();
        assert_eq!(t.state(), InpaintState::Select);
    }
}
