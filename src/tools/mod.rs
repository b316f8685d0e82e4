//! Interactive tools
//!
//! A tool is a small state machine driven by pointer events that have
//! already passed through [`gesture::GestureState`] (panning, zooming and
//! touch disambiguation happen there). Tools receive the compositor for the
//! duration of each call and keep no reference to it.
//!
//! Generative tools run their remote work in a spawned job task and pick up
//! its results from [`Tool::tick`], so they must be used inside a tokio
//! runtime.

pub mod args;
pub mod augment;
pub mod candidates;
pub mod enhance;
pub mod gesture;
pub mod import_export;
pub mod inpaint;
pub mod pencil;
pub mod selection;
pub mod smudge;

pub use args::{ArgsError, FileArgsStore, MemoryArgsStore, ToolArgsStore};
pub use augment::{AugmentState, AugmentTool};
pub use candidates::CandidateSet;
pub use enhance::{EnhanceState, EnhanceTool};
pub use gesture::{GestureState, InputEvent, PointerEvent, Routed, TouchEvent};
pub use import_export::ImportExportTool;
pub use inpaint::{InpaintState, InpaintTool};
pub use pencil::PencilTool;
pub use selection::SelectionTool;
pub use smudge::SmudgeTool;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::blend::BlendError;
use crate::compositor::{Compositor, CompositorError};
use crate::core::geometry::{Direction, Point};
use crate::generation::{GenerationError, GenerationService};
use crate::raster::{CodecError, EncodeFormat};
use crate::storage::ImageMeta;

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error(transparent)]
    Compositor(#[from] CompositorError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Blend(#[from] BlendError),

    #[error(transparent)]
    Args(#[from] ArgsError),

    #[error("Region {width}x{height} is larger than {max_width}x{max_height}")]
    RegionTooLarge {
        width: u32,
        height: u32,
        max_width: u32,
        max_height: u32,
    },

    #[error("{tool}: cannot {action} in state {state}")]
    InvalidState {
        tool: &'static str,
        action: &'static str,
        state: &'static str,
    },
}

impl From<ToolError> for String {
    fn from(e: ToolError) -> Self {
        e.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointerButton {
    Primary,
    Middle,
    Secondary,
}

/// Pointer position in image space
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToolPointer {
    pub position: Point,
    pub button: PointerButton,
}

impl ToolPointer {
    pub fn primary(x: f64, y: f64) -> Self {
        Self {
            position: Point::new(x, y),
            button: PointerButton::Primary,
        }
    }
}

/// A full encoded image produced by a confirm
#[derive(Debug, Clone, PartialEq)]
pub struct SavedImage {
    /// Bare base64
    pub image_data: String,
    pub format: EncodeFormat,
    /// Prompt the image was made with, when the tool knows it
    pub prompt: Option<String>,
    pub negative_prompt: Option<String>,
}

impl SavedImage {
    pub fn png(image_data: String) -> Self {
        Self {
            image_data,
            format: EncodeFormat::Png,
            prompt: None,
            negative_prompt: None,
        }
    }
}

pub type SaveListener = Box<dyn FnMut(SavedImage) + Send>;

/// Optional save listener slot shared by all tools
#[derive(Default)]
pub struct SaveHook {
    listener: Option<SaveListener>,
}

impl SaveHook {
    pub fn set(&mut self, listener: SaveListener) {
        self.listener = Some(listener);
    }

    pub fn emit(&mut self, image: SavedImage) {
        match self.listener.as_mut() {
            Some(listener) => listener(image),
            None => tracing::debug!("No save listener, dropping saved image"),
        }
    }
}

/// Merge the edit layer and hand the whole image, built by `make` from
/// its PNG base64, to the save hook.
pub(crate) fn commit_and_save<F>(compositor: &mut Compositor, save: &mut SaveHook, make: F) -> Result<(), ToolError>
where
    F: FnOnce(String) -> SavedImage,
{
    compositor.commit_selection();
    let encoded = compositor.encoded_image(None, EncodeFormat::Png)?;
    save.emit(make(encoded));
    Ok(())
}

pub trait Tool: Send {
    /// Stable name, also the args storage key suffix
    fn name(&self) -> &'static str;

    fn state_name(&self) -> &'static str;

    fn on_pointer_down(&mut self, compositor: &mut Compositor, pointer: ToolPointer) -> Result<(), ToolError>;

    fn on_pointer_move(&mut self, compositor: &mut Compositor, pointer: ToolPointer) -> Result<(), ToolError>;

    fn on_pointer_up(&mut self, compositor: &mut Compositor, pointer: ToolPointer) -> Result<(), ToolError>;

    fn on_pointer_leave(&mut self, compositor: &mut Compositor) -> Result<(), ToolError>;

    /// Called after the viewport zoomed around `position`
    fn on_wheel(&mut self, _compositor: &mut Compositor, _position: Point) -> Result<(), ToolError> {
        Ok(())
    }

    /// Apply progress from background work
    fn tick(&mut self, _compositor: &mut Compositor) -> Result<(), ToolError> {
        Ok(())
    }

    /// Move between candidates
    fn select(&mut self, _compositor: &mut Compositor, _direction: Direction) -> Result<(), ToolError> {
        Ok(())
    }

    /// Start remote work for the current selection
    fn submit(&mut self, _compositor: &mut Compositor, _image: &ImageMeta) -> Result<(), ToolError> {
        Err(ToolError::InvalidState {
            tool: self.name(),
            action: "submit",
            state: self.state_name(),
        })
    }

    fn confirm(&mut self, compositor: &mut Compositor) -> Result<(), ToolError>;

    fn cancel(&mut self, compositor: &mut Compositor) -> Result<(), ToolError>;

    /// Release the compositor before switching tools. Returns false when
    /// the tool holds unsaved work and `confirm_discard` declines.
    fn destroy(&mut self, compositor: &mut Compositor, confirm_discard: &mut dyn FnMut() -> bool) -> bool;

    fn on_save_image(&mut self, listener: SaveListener);

    fn args(&self) -> Value;

    /// Merge `patch` into the args, returning the full new args
    fn update_args(&mut self, compositor: &mut Compositor, patch: Value) -> Result<Value, ToolError>;

    /// Last user-facing error, if any
    fn last_error(&self) -> Option<&str> {
        None
    }

    fn is_dirty(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolKind {
    Select,
    Pencil,
    Smudge,
    Inpaint,
    Enhance,
    Augment,
    ImportExport,
}

impl ToolKind {
    /// Same as [`Tool::name`] of the tool it builds
    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Select => "select",
            ToolKind::Pencil => "pencil",
            ToolKind::Smudge => "smudge",
            ToolKind::Inpaint => "inpaint",
            ToolKind::Enhance => "enhance",
            ToolKind::Augment => "augment",
            ToolKind::ImportExport => "import-export",
        }
    }
}

/// Typed handle on the active tool
pub enum ActiveTool<S: GenerationService> {
    Selection(SelectionTool),
    Pencil(PencilTool),
    Smudge(SmudgeTool),
    Inpaint(InpaintTool<S>),
    Enhance(EnhanceTool<S>),
    Augment(AugmentTool<S>),
    ImportExport(ImportExportTool),
}

impl<S: GenerationService> ActiveTool<S> {
    pub fn kind(&self) -> ToolKind {
        match self {
            ActiveTool::Selection(_) => ToolKind::Select,
            ActiveTool::Pencil(_) => ToolKind::Pencil,
            ActiveTool::Smudge(_) => ToolKind::Smudge,
            ActiveTool::Inpaint(_) => ToolKind::Inpaint,
            ActiveTool::Enhance(_) => ToolKind::Enhance,
            ActiveTool::Augment(_) => ToolKind::Augment,
            ActiveTool::ImportExport(_) => ToolKind::ImportExport,
        }
    }

    pub fn as_tool(&self) -> &dyn Tool {
        match self {
            ActiveTool::Selection(tool) => tool,
            ActiveTool::Pencil(tool) => tool,
            ActiveTool::Smudge(tool) => tool,
            ActiveTool::Inpaint(tool) => tool,
            ActiveTool::Enhance(tool) => tool,
            ActiveTool::Augment(tool) => tool,
            ActiveTool::ImportExport(tool) => tool,
        }
    }

    pub fn as_tool_mut(&mut self) -> &mut dyn Tool {
        match self {
            ActiveTool::Selection(tool) => tool,
            ActiveTool::Pencil(tool) => tool,
            ActiveTool::Smudge(tool) => tool,
            ActiveTool::Inpaint(tool) => tool,
            ActiveTool::Enhance(tool) => tool,
            ActiveTool::Augment(tool) => tool,
            ActiveTool::ImportExport(tool) => tool,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;
    use crate::core::config::EditorConfig;
    use image::{Rgba, RgbaImage};
    use parking_lot::Mutex;
    use std::sync::Arc;

    pub(crate) fn compositor_with(width: u32, height: u32, color: Rgba<u8>) -> Compositor {
        let mut compositor = Compositor::new(200, 200, &EditorConfig::default());
        compositor.set_base_image(RgbaImage::from_pixel(width, height, color), true);
        compositor
    }

    /// Save listener that records what it receives
    pub(crate) fn recording_listener() -> (SaveListener, Arc<Mutex<Vec<SavedImage>>>) {
        let saved = Arc::new(Mutex::new(Vec::new()));
        let sink = saved.clone();
        (Box::new(move |image| sink.lock().push(image)), saved)
    }

    #[test]
    fn test_commit_and_save_emits_full_png() {
        let mut compositor = compositor_with(32, 16, Rgba([10, 20, 30, 255]));
        let mut hook = SaveHook::default();
        let (listener, saved) = recording_listener();
        hook.set(listener);

        commit_and_save(&mut compositor, &mut hook, SavedImage::png).unwrap();
        let saved = saved.lock();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].format, EncodeFormat::Png);
        let decoded = crate::raster::codec::decode_base64(&saved[0].image_data).unwrap();
        assert_eq!(decoded.dimensions(), (32, 16));
    }

    #[test]
    fn test_tool_kind_names_match_serde() {
        for kind in [ToolKind::Select, ToolKind::Inpaint, ToolKind::ImportExport] {
            assert_eq!(serde_json::to_value(kind).unwrap(), serde_json::json!(kind.name()));
        }
    }

    #[test]
    fn test_tool_error_messages() {
        let err = ToolError::RegionTooLarge {
            width: 4096,
            height: 4096,
            max_width: 2048,
            max_height: 2048,
        };
        assert_eq!(String::from(err), "Region 4096x4096 is larger than 2048x2048");
    }
}
