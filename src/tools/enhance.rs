//! Enhance / variation: regenerate the selection at a chosen denoising
//! strength, optionally limited by a painted mask.
//!
//! ```text
//! select|default -> uploading -> processing -> confirm <-> erase
//!       \-> mask -/
//! ```
//!
//! Images already at a native generation size have no selection step: the
//! whole image is the region and the tool idles in `default`.

use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::args::{merge_args, EnhanceArgs, PencilArgs, SelectionArgs};
use super::candidates::CandidateSet;
use super::pencil::PencilTool;
use super::selection::SelectionTool;
use super::{commit_and_save, PointerButton, SaveHook, SaveListener, SavedImage, Tool, ToolError, ToolPointer};
use crate::blend::{default_feather_width, soften_circle, AlphaMode};
use crate::compositor::{Compositor, CompositorError, Cursor, CursorShape, Layer};
use crate::core::config::EditorConfig;
use crate::core::geometry::{round_up_to, Direction, Rect};
use crate::generation::{
    generate_candidates, upscale_level, BlendRecipe, GenerationRequest, GenerationService, JobHandle, JobUpdate,
    PollSettings,
};
use crate::pool::BlendPool;
use crate::raster::{codec, EncodeFormat};
use crate::storage::ImageMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnhanceState {
    Select,
    Default,
    Mask,
    Uploading,
    Processing,
    Confirm,
    Erase,
}

impl EnhanceState {
    pub fn name(self) -> &'static str {
        match self {
            EnhanceState::Select => "select",
            EnhanceState::Default => "default",
            EnhanceState::Mask => "mask",
            EnhanceState::Uploading => "uploading",
            EnhanceState::Processing => "processing",
            EnhanceState::Confirm => "confirm",
            EnhanceState::Erase => "erase",
        }
    }
}

pub struct EnhanceTool<S: GenerationService> {
    args: EnhanceArgs,
    config: EditorConfig,
    service: Arc<S>,
    pool: Arc<BlendPool>,
    selection: SelectionTool,
    mask_pencil: PencilTool,
    select_supported: bool,
    state: EnhanceState,
    resume: EnhanceState,
    job: Option<JobHandle<Vec<RgbaImage>>>,
    candidates: CandidateSet,
    /// Candidate being softened, and its untouched copy
    erasing: Option<(RgbaImage, RgbaImage)>,
    erase_down: bool,
    prompt: Option<(String, String)>,
    progress: f32,
    last_error: Option<String>,
    save: SaveHook,
}

impl<S: GenerationService> EnhanceTool<S> {
    pub fn new(
        args: EnhanceArgs,
        config: &EditorConfig,
        service: Arc<S>,
        pool: Arc<BlendPool>,
        compositor: &mut Compositor,
    ) -> Self {
        let mask_pencil = PencilTool::mask_editor(PencilArgs {
            brush_size: args.brush_size,
            ..Default::default()
        });
        let (width, height) = (compositor.width(), compositor.height());
        let select_supported = upscale_level(width, height) != Some(0);
        let mut tool = Self {
            args,
            config: config.clone(),
            service,
            pool,
            selection: SelectionTool::new(SelectionArgs::default(), config.selection_snap),
            mask_pencil,
            select_supported,
            state: EnhanceState::Select,
            resume: EnhanceState::Select,
            job: None,
            candidates: CandidateSet::default(),
            erasing: None,
            erase_down: false,
            prompt: None,
            progress: 0.0,
            last_error: None,
            save: SaveHook::default(),
        };
        tool.go_idle(compositor);
        tool
    }

    pub fn state(&self) -> EnhanceState {
        self.state
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn candidates(&self) -> &CandidateSet {
        &self.candidates
    }

    pub fn select_supported(&self) -> bool {
        self.select_supported
    }

    fn idle_state(&self) -> EnhanceState {
        if self.select_supported {
            EnhanceState::Select
        } else {
            EnhanceState::Default
        }
    }

    fn go_idle(&mut self, compositor: &mut Compositor) {
        if !self.select_supported && compositor.has_image() {
            compositor.set_selection_overlay(Some(compositor.bounds()));
        }
        let idle = self.idle_state();
        self.enter(compositor, idle);
    }

    fn enter(&mut self, compositor: &mut Compositor, state: EnhanceState) {
        if self.state == EnhanceState::Select && state != EnhanceState::Select {
            self.selection.clear_preview(compositor);
        }
        tracing::debug!("enhance: {} -> {}", self.state.name(), state.name());
        self.state = state;
    }

    fn invalid(&self, action: &'static str) -> ToolError {
        ToolError::InvalidState {
            tool: "enhance",
            action,
            state: self.state.name(),
        }
    }

    /// Soft eraser radius for a region: the feather width scaled by the
    /// eraser modifier
    pub fn erase_radius(&self, region: Rect) -> f64 {
        let feather = default_feather_width(region.width, region.height) as f64;
        (feather * self.config.eraser_feather_modifier as f64).floor()
    }

    /// Paint a mask over the region before submitting
    pub fn mask(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        if !matches!(self.state, EnhanceState::Select | EnhanceState::Default) {
            return Err(self.invalid("mask"));
        }
        if !compositor.is_masked() {
            compositor.create_mask();
        }
        self.resume = self.state;
        self.enter(compositor, EnhanceState::Mask);
        Ok(())
    }

    /// Leave mask painting, keeping the mask
    pub fn finish_mask(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        if self.state != EnhanceState::Mask {
            return Err(self.invalid("finish mask"));
        }
        compositor.set_cursor(None);
        let resume = self.resume;
        self.enter(compositor, resume);
        Ok(())
    }

    pub fn invert_mask(&mut self, compositor: &mut Compositor) {
        compositor.invert_mask();
    }

    pub fn delete_mask(&mut self, compositor: &mut Compositor) {
        compositor.delete_mask();
        if self.state == EnhanceState::Mask {
            let resume = self.resume;
            self.enter(compositor, resume);
        }
    }

    /// Start softening the shown candidate
    pub fn erase(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        if self.state != EnhanceState::Confirm {
            return Err(self.invalid("erase"));
        }
        let Some(current) = self.candidates.current() else {
            return Err(self.invalid("erase"));
        };
        self.erasing = Some((current.clone(), current.clone()));
        self.enter(compositor, EnhanceState::Erase);
        Ok(())
    }

    fn soften_at(&mut self, compositor: &mut Compositor, pointer: ToolPointer) -> Result<(), ToolError> {
        let selection = compositor.selection().ok_or(CompositorError::NoSelection)?;
        let radius = self.erase_radius(selection);
        let core = self.config.eraser_feather_modifier as f64;
        if let Some((working, _)) = self.erasing.as_mut() {
            let center = (
                pointer.position.x - selection.x as f64,
                pointer.position.y - selection.y as f64,
            );
            soften_circle(working, center, radius, core);
            compositor.set_edit_image(Some(working));
        }
        Ok(())
    }

    fn apply(&mut self, compositor: &mut Compositor, update: JobUpdate<Vec<RgbaImage>>) {
        match update {
            JobUpdate::Submitted(job_id) => {
                tracing::debug!("enhance: job {} accepted", job_id);
                self.enter(compositor, EnhanceState::Processing);
            }
            JobUpdate::Progress(progress) => self.progress = progress,
            JobUpdate::Warning(message) => tracing::warn!("enhance: {}", message),
            JobUpdate::Finished(Ok(images)) => {
                self.job = None;
                tracing::info!("enhance: {} candidates", images.len());
                self.candidates = CandidateSet::new(images);
                compositor.set_edit_image(self.candidates.current());
                self.enter(compositor, EnhanceState::Confirm);
            }
            JobUpdate::Finished(Err(e)) => {
                self.job = None;
                tracing::error!("enhance: {}", e);
                self.last_error = Some(e.to_string());
                self.prompt = None;
                self.progress = 0.0;
                let resume = self.resume;
                self.enter(compositor, resume);
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

    fn discard(&mut self, compositor: &mut Compositor) {
        if let Some(mut job) = self.job.take() {
            job.cancel();
        }
        self.candidates.clear();
        self.erasing = None;
        self.prompt = None;
        self.progress = 0.0;
        compositor.set_edit_image(None);
        self.go_idle(compositor);
    }
}

impl<S: GenerationService> Tool for EnhanceTool<S> {
    fn name(&self) -> &'static str {
        "enhance"
    }

    fn state_name(&self) -> &'static str {
        self.state.name()
    }

    fn on_pointer_down(&mut self, compositor: &mut Compositor, pointer: ToolPointer) -> Result<(), ToolError> {
        match self.state {
            EnhanceState::Select => self.selection.on_pointer_down(compositor, pointer),
            EnhanceState::Mask => self.mask_pencil.on_pointer_down(compositor, pointer),
            EnhanceState::Erase if pointer.button == PointerButton::Primary => {
                self.erase_down = true;
                self.soften_at(compositor, pointer)
            }
            _ => Ok(()),
        }
    }

    fn on_pointer_move(&mut self, compositor: &mut Compositor, pointer: ToolPointer) -> Result<(), ToolError> {
        match self.state {
            EnhanceState::Select => self.selection.on_pointer_move(compositor, pointer),
            EnhanceState::Mask => self.mask_pencil.on_pointer_move(compositor, pointer),
            EnhanceState::Erase => {
                let radius = compositor.selection().map(|s| self.erase_radius(s)).unwrap_or(0.0);
                compositor.set_cursor(Some(Cursor::new(pointer.position, radius, CursorShape::Circle)));
                if self.erase_down {
                    self.soften_at(compositor, pointer)?;
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn on_pointer_up(&mut self, compositor: &mut Compositor, pointer: ToolPointer) -> Result<(), ToolError> {
        self.erase_down = false;
        if self.state == EnhanceState::Mask {
            self.mask_pencil.on_pointer_up(compositor, pointer)?;
        }
        Ok(())
    }

    fn on_pointer_leave(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        self.erase_down = false;
        match self.state {
            EnhanceState::Select => self.selection.on_pointer_leave(compositor),
            EnhanceState::Mask => self.mask_pencil.on_pointer_leave(compositor),
            _ => {
                compositor.set_cursor(None);
                Ok(())
            }
        }
    }

    fn tick(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        while let Some(update) = self.job.as_mut().and_then(|job| job.try_next()) {
            self.apply(compositor, update);
        }
        Ok(())
    }

    fn select(&mut self, compositor: &mut Compositor, direction: Direction) -> Result<(), ToolError> {
        if self.state == EnhanceState::Confirm {
            self.candidates.select(direction);
            compositor.set_edit_image(self.candidates.current());
        }
        Ok(())
    }

    fn submit(&mut self, compositor: &mut Compositor, image: &ImageMeta) -> Result<(), ToolError> {
        if !matches!(self.state, EnhanceState::Select | EnhanceState::Default | EnhanceState::Mask) {
            return Err(self.invalid("submit"));
        }
        let selection = compositor.selection().ok_or(CompositorError::NoSelection)?;
        if !self.config.region_fits(selection.width, selection.height) {
            return Err(ToolError::RegionTooLarge {
                width: selection.width,
                height: selection.height,
                max_width: self.config.max_region_width,
                max_height: self.config.max_region_height,
            });
        }

        let source = compositor.image_data(Some(selection), Layer::Base)?;
        let (source_mask, mask, alpha_mode) = if compositor.is_masked() {
            (
                Some(compositor.encoded_mask(Some(selection), Layer::Mask)?),
                Some(compositor.mask_image(Some(selection), Layer::Mask)?),
                AlphaMode::Mask,
            )
        } else {
            (None, None, AlphaMode::None)
        };

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
            width: round_up_to(selection.width, 64),
            height: round_up_to(selection.height, 64),
            model: self.args.model.clone(),
            count: self.args.count,
            denoising_strength: self.args.variation_strength,
            source_image: Some(codec::encode_base64(&source, EncodeFormat::Jpeg)?),
            source_mask,
            parent: image.id.clone(),
        };
        let recipe = BlendRecipe {
            selection,
            image_width: compositor.width(),
            image_height: compositor.height(),
            feather: true,
            feather_width: None,
            alpha_mode,
            mask,
        };

        tracing::info!(
            "enhance: submitting {}x{} region at strength {}",
            selection.width,
            selection.height,
            self.args.variation_strength
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
        if self.state != EnhanceState::Mask {
            self.resume = self.state;
        }
        compositor.set_cursor(None);
        self.enter(compositor, EnhanceState::Uploading);
        Ok(())
    }

    fn confirm(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        match self.state {
            EnhanceState::Erase => {
                if let Some((working, _)) = self.erasing.take() {
                    self.candidates.replace_current(working);
                }
                compositor.set_edit_image(self.candidates.current());
                self.enter(compositor, EnhanceState::Confirm);
                Ok(())
            }
            EnhanceState::Confirm => {
                let (prompt, negative_prompt) = self.prompt.take().unzip();
                commit_and_save(compositor, &mut self.save, |image_data| SavedImage {
                    prompt,
                    negative_prompt,
                    ..SavedImage::png(image_data)
                })?;
                self.candidates.clear();
                compositor.delete_mask();
                self.go_idle(compositor);
                Ok(())
            }
            _ => Err(self.invalid("confirm")),
        }
    }

    fn cancel(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        match self.state {
            EnhanceState::Erase => {
                if let Some((_, original)) = self.erasing.take() {
                    compositor.set_edit_image(Some(&original));
                }
                self.enter(compositor, EnhanceState::Confirm);
            }
            EnhanceState::Mask => {
                compositor.reset_mask();
                let resume = self.resume;
                self.enter(compositor, resume);
            }
            _ => self.discard(compositor),
        }
        Ok(())
    }

    fn destroy(&mut self, compositor: &mut Compositor, confirm_discard: &mut dyn FnMut() -> bool) -> bool {
        if self.is_dirty() && !confirm_discard() {
            return false;
        }
        self.discard(compositor);
        compositor.delete_mask();
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

    fn update_args(&mut self, compositor: &mut Compositor, patch: Value) -> Result<Value, ToolError> {
        self.args = merge_args(&self.args, patch)?;
        self.mask_pencil
            .update_args(compositor, serde_json::json!({ "brushSize": self.args.brush_size }))?;
        Ok(self.args())
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn is_dirty(&self) -> bool {
        self.job.is_some() || !self.candidates.is_empty()
    }
}
