//! Whole-image upscale / face restore
//!
//! The result replaces the base image; the previous base is kept encoded so
//! the user can revert until they confirm.

use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::args::{merge_args, AugmentArgs};
use super::{SaveHook, SaveListener, SavedImage, Tool, ToolError, ToolPointer};
use crate::compositor::{Compositor, Layer};
use crate::core::config::EditorConfig;
use crate::generation::{augment_image, AugmentSettings, GenerationService, JobHandle, JobUpdate};
use crate::pool::BlendPool;
use crate::raster::{codec, EncodeFormat};
use crate::storage::ImageMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AugmentState {
    Default,
    Processing,
    Confirm,
}

impl AugmentState {
    pub fn name(self) -> &'static str {
        match self {
            AugmentState::Default => "default",
            AugmentState::Processing => "processing",
            AugmentState::Confirm => "confirm",
        }
    }
}

pub struct AugmentTool<S: GenerationService> {
    args: AugmentArgs,
    config: EditorConfig,
    service: Arc<S>,
    pool: Arc<BlendPool>,
    state: AugmentState,
    job: Option<JobHandle<RgbaImage>>,
    /// PNG base64 of the base before augmentation
    backup: Option<String>,
    progress: f32,
    last_error: Option<String>,
    save: SaveHook,
}

impl<S: GenerationService> AugmentTool<S> {
    pub fn new(args: AugmentArgs, config: &EditorConfig, service: Arc<S>, pool: Arc<BlendPool>) -> Self {
        Self {
            args,
            config: config.clone(),
            service,
            pool,
            state: AugmentState::Default,
            job: None,
            backup: None,
            progress: 0.0,
            last_error: None,
            save: SaveHook::default(),
        }
    }

    pub fn state(&self) -> AugmentState {
        self.state
    }

    pub fn progress(&self) -> f32 {
        self.progress
    }

    fn invalid(&self, action: &'static str) -> ToolError {
        ToolError::InvalidState {
            tool: "augment",
            action,
            state: self.state.name(),
        }
    }

    fn apply(&mut self, compositor: &mut Compositor, update: JobUpdate<RgbaImage>) {
        match update {
            JobUpdate::Submitted(job_id) => tracing::debug!("augment: job {} accepted", job_id),
            JobUpdate::Progress(progress) => self.progress = progress,
            JobUpdate::Warning(message) => tracing::warn!("augment: {}", message),
            JobUpdate::Finished(Ok(image)) => {
                self.job = None;
                tracing::info!("augment: result {}x{}", image.width(), image.height());
                compositor.set_base_image(image, true);
                self.state = AugmentState::Confirm;
            }
            JobUpdate::Finished(Err(e)) => {
                self.job = None;
                tracing::error!("augment: {}", e);
                self.last_error = Some(e.to_string());
                self.backup = None;
                self.progress = 0.0;
                self.state = AugmentState::Default;
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

    /// Put back the image from before the augmentation
    pub fn revert(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        if self.state != AugmentState::Confirm {
            return Err(self.invalid("revert"));
        }
        if let Some(backup) = self.backup.take() {
            let image = codec::decode_base64(&backup)?;
            tracing::info!("augment: reverting to {}x{}", image.width(), image.height());
            compositor.set_base_image(image, true);
        }
        self.progress = 0.0;
        self.state = AugmentState::Default;
        Ok(())
    }
}

impl<S: GenerationService> Tool for AugmentTool<S> {
    fn name(&self) -> &'static str {
        "augment"
    }

    fn state_name(&self) -> &'static str {
        self.state.name()
    }

    fn on_pointer_down(&mut self, _compositor: &mut Compositor, _pointer: ToolPointer) -> Result<(), ToolError> {
        Ok(())
    }

    fn on_pointer_move(&mut self, _compositor: &mut Compositor, _pointer: ToolPointer) -> Result<(), ToolError> {
        Ok(())
    }

    fn on_pointer_up(&mut self, _compositor: &mut Compositor, _pointer: ToolPointer) -> Result<(), ToolError> {
        Ok(())
    }

    fn on_pointer_leave(&mut self, _compositor: &mut Compositor) -> Result<(), ToolError> {
        Ok(())
    }

    fn tick(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        while let Some(update) = self.job.as_mut().and_then(|job| job.try_next()) {
            self.apply(compositor, update);
        }
        Ok(())
    }

    fn submit(&mut self, compositor: &mut Compositor, _image: &ImageMeta) -> Result<(), ToolError> {
        if self.state != AugmentState::Default {
            return Err(self.invalid("submit"));
        }
        let (width, height) = (compositor.width(), compositor.height());
        if !self.config.region_fits(width, height) {
            return Err(ToolError::RegionTooLarge {
                width,
                height,
                max_width: self.config.max_region_width,
                max_height: self.config.max_region_height,
            });
        }

        let image = compositor.image_data(None, Layer::Base)?;
        self.backup = Some(codec::encode_base64(&image, EncodeFormat::Png)?);

        tracing::info!("augment: {:?} of {}x{}", self.args.kind, width, height);
        let service = self.service.clone();
        let pool = self.pool.clone();
        let settings = AugmentSettings::new(self.args.kind, &self.config);
        self.job = Some(JobHandle::spawn(move |ctx| augment_image(service, pool, image, settings, ctx)));
        self.last_error = None;
        self.progress = 0.0;
        self.state = AugmentState::Processing;
        Ok(())
    }

    fn confirm(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        if self.state != AugmentState::Confirm {
            return Err(self.invalid("confirm"));
        }
        let encoded = compositor.encoded_image(None, EncodeFormat::Png)?;
        self.save.emit(SavedImage::png(encoded));
        self.backup = None;
        self.state = AugmentState::Default;
        Ok(())
    }

    fn cancel(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        match self.state {
            AugmentState::Processing => {
                if let Some(mut job) = self.job.take() {
                    job.cancel();
                }
                self.backup = None;
                self.progress = 0.0;
                self.state = AugmentState::Default;
                Ok(())
            }
            AugmentState::Confirm => self.revert(compositor),
            AugmentState::Default => Ok(()),
        }
    }

    fn destroy(&mut self, compositor: &mut Compositor, confirm_discard: &mut dyn FnMut() -> bool) -> bool {
        if self.is_dirty() && !confirm_discard() {
            return false;
        }
        if let Err(e) = self.cancel(compositor) {
            tracing::warn!("augment: discard on destroy failed: {}", e);
        }
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
        Ok(self.args())
    }

    fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    fn is_dirty(&self) -> bool {
        self.state != AugmentState::Default
    }
}
