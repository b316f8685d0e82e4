//! Replace the image from a file and encode it back out.

use image::RgbaImage;
use serde_json::Value;

use super::args::{merge_args, ExportArgs};
use super::{SaveHook, SaveListener, SavedImage, Tool, ToolError, ToolPointer};
use crate::compositor::{Compositor, Layer};
use crate::raster::{codec, EncodeFormat};

pub struct ImportExportTool {
    args: ExportArgs,
    /// PNG base64 of the base before the last import
    backup: Option<String>,
    save: SaveHook,
}

impl ImportExportTool {
    pub fn new(args: ExportArgs) -> Self {
        Self {
            args,
            backup: None,
            save: SaveHook::default(),
        }
    }

    pub fn has_backup(&self) -> bool {
        self.backup.is_some()
    }

    /// Make `image` the new base, remembering the current one for revert.
    /// Only the first import after a confirm is backed up.
    pub fn import(&mut self, compositor: &mut Compositor, image: RgbaImage) -> Result<(), ToolError> {
        if self.backup.is_none() && compositor.has_image() {
            self.backup = Some(compositor.encoded_image(None, EncodeFormat::Png)?);
        }
        tracing::info!("Importing {}x{} image", image.width(), image.height());
        compositor.set_base_image(image, true);
        Ok(())
    }

    /// [`ImportExportTool::import`] from base64 or a data URI
    pub fn import_encoded(&mut self, compositor: &mut Compositor, data: &str) -> Result<(), ToolError> {
        let image = codec::decode_base64(data)?;
        self.import(compositor, image)
    }

    pub fn revert(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        if let Some(backup) = self.backup.take() {
            let image = codec::decode_base64(&backup)?;
            tracing::info!("Reverting import");
            compositor.set_base_image(image, true);
        }
        Ok(())
    }

    /// Whole image as a data URI, in `format` or the configured one
    pub fn export(&self, compositor: &Compositor, format: Option<EncodeFormat>) -> Result<String, ToolError> {
        let format = format.unwrap_or(self.args.format);
        let image = compositor.image_data(None, Layer::Base)?;
        Ok(codec::encode_data_uri(&image, format)?)
    }
}

impl Tool for ImportExportTool {
    fn name(&self) -> &'static str {
        "import-export"
    }

    fn state_name(&self) -> &'static str {
        if self.backup.is_some() {
            "imported"
        } else {
            "default"
        }
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

    fn confirm(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        let image = compositor.image_data(None, Layer::Base)?;
        let saved = SavedImage {
            image_data: codec::encode_base64(&image, self.args.format)?,
            format: self.args.format,
            prompt: None,
            negative_prompt: None,
        };
        self.save.emit(saved);
        self.backup = None;
        Ok(())
    }

    fn cancel(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        self.revert(compositor)
    }

    fn destroy(&mut self, compositor: &mut Compositor, confirm_discard: &mut dyn FnMut() -> bool) -> bool {
        if self.is_dirty() && !confirm_discard() {
            return false;
        }
        if let Err(e) = self.revert(compositor) {
            tracing::warn!("Revert on destroy failed: {}", e);
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

    fn is_dirty(&self) -> bool {
        self.backup.is_some()
    }
}
