//! Layered compositor
//!
//! Owns the raster layers of one open image, the bounded snapshot history,
//! the selection overlay and the viewport. Every mutating call recomposites
//! the visible surface before returning.
//!
//! Layer stack, bottom to top:
//! - background: checker pattern in screen space
//! - base: the committed image
//! - edit: uncommitted preview, positioned by the selection
//! - mask: optional, black = keep, white = editable, drawn at reduced opacity
//!
//! Tools borrow the compositor mutably per call and never keep it.

pub mod history;
pub mod render;

pub use history::{History, Snapshot};
pub use render::{Cursor, CursorShape};

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::blend::composite::composite_over;
use crate::core::config::EditorConfig;
use crate::core::geometry::{Point, Rect};
use crate::raster::{self, codec, draw, CodecError, EncodeFormat};
use crate::viewport::Viewport;

use render::{Layers, Overlay};

const MASK_KEEP: Rgba<u8> = Rgba([0, 0, 0, 255]);
const MASK_EDIT: Rgba<u8> = Rgba([255, 255, 255, 255]);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Layer {
    Base,
    Edit,
    Mask,
}

#[derive(Debug, thiserror::Error)]
pub enum CompositorError {
    #[error("No image loaded")]
    NoImage,

    #[error("No selection overlay")]
    NoSelection,

    #[error("No mask layer")]
    NoMask,

    #[error("Layer {0:?} cannot be painted directly")]
    ReadOnlyLayer(Layer),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl From<CompositorError> for String {
    fn from(e: CompositorError) -> Self {
        e.to_string()
    }
}

/// Undo/redo availability reported to listeners
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryState {
    pub can_undo: bool,
    pub can_redo: bool,
}

pub type SnapshotListener = Box<dyn FnMut(HistoryState) + Send>;

pub struct Compositor {
    width: u32,
    height: u32,
    background: RgbaImage,
    base: RgbaImage,
    edit: RgbaImage,
    mask: Option<RgbaImage>,
    visible: RgbaImage,
    viewport: Viewport,
    history: History,
    selection: Option<Rect>,
    preview: Option<Rect>,
    has_selection: bool,
    cursor: Option<Cursor>,
    listeners: Vec<SnapshotListener>,
    default_selection_size: u32,
    erase_inset: u32,
    mask_opacity: f32,
    checker_cell: u32,
}

impl Compositor {
    pub fn new(view_width: u32, view_height: u32, config: &EditorConfig) -> Self {
        Self {
            width: 0,
            height: 0,
            background: raster::checkerboard(view_width, view_height, config.checker_cell),
            base: raster::blank(0, 0),
            edit: raster::blank(0, 0),
            mask: None,
            visible: raster::checkerboard(view_width, view_height, config.checker_cell),
            viewport: Viewport::new(view_width, view_height).with_zoom_bounds(config.min_zoom, config.max_zoom),
            history: History::new(config.max_snapshots),
            selection: None,
            preview: None,
            has_selection: false,
            cursor: None,
            listeners: Vec::new(),
            default_selection_size: config.default_selection_size,
            erase_inset: config.erase_inset,
            mask_opacity: config.mask_opacity,
            checker_cell: config.checker_cell,
        }
    }

    // === Accessors ===

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn has_image(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }

    pub fn base(&self) -> &RgbaImage {
        &self.base
    }

    pub fn edit(&self) -> &RgbaImage {
        &self.edit
    }

    pub fn mask(&self) -> Option<&RgbaImage> {
        self.mask.as_ref()
    }

    /// The composited surface the host displays
    pub fn visible(&self) -> &RgbaImage {
        &self.visible
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn selection(&self) -> Option<Rect> {
        self.selection
    }

    pub fn selection_preview(&self) -> Option<Rect> {
        self.preview
    }

    /// True while the edit layer holds a preview
    pub fn has_selection(&self) -> bool {
        self.has_selection
    }

    pub fn cursor(&self) -> Option<&Cursor> {
        self.cursor.as_ref()
    }

    fn require_image(&self) -> Result<(), CompositorError> {
        if self.has_image() {
            Ok(())
        } else {
            Err(CompositorError::NoImage)
        }
    }

    // === Viewport ===

    pub fn screen_to_image(&self, p: Point) -> Point {
        self.viewport.screen_to_image(p)
    }

    pub fn resize_view(&mut self, view_width: u32, view_height: u32) {
        self.viewport.resize(view_width, view_height);
        self.background = raster::checkerboard(view_width, view_height, self.checker_cell);
        self.render();
    }

    pub fn reset_view(&mut self) {
        self.viewport.reset_view(self.width, self.height);
        self.render();
    }

    /// Mutate the viewport, then recomposite
    pub fn update_viewport<F: FnOnce(&mut Viewport)>(&mut self, f: F) {
        f(&mut self.viewport);
        self.render();
    }

    // === Image lifecycle ===

    /// Replace the base image. Clears edit and mask, optionally centres a
    /// default selection, resets the view and records a snapshot.
    pub fn set_base_image(&mut self, image: RgbaImage, reset_selection: bool) {
        let (width, height) = image.dimensions();
        self.width = width;
        self.height = height;
        self.base = image;
        self.edit = raster::blank(width, height);
        self.mask = None;
        self.has_selection = false;
        self.preview = None;

        if reset_selection {
            let size = width.min(height).min(self.default_selection_size);
            self.selection = Some(Rect::new(
                ((width - size) / 2) as i32,
                ((height - size) / 2) as i32,
                size,
                size,
            ));
        }

        tracing::info!("Base image set: {}x{}", width, height);
        self.viewport.reset_view(width, height);
        self.snapshot();
        self.render();
    }

    /// Show `image` in the edit layer at the selection origin, or clear the
    /// edit layer with `None`.
    pub fn set_edit_image(&mut self, image: Option<&RgbaImage>) {
        raster::clear(&mut self.edit);
        match image {
            Some(image) => {
                let origin = self.selection.unwrap_or_default();
                raster::put(&mut self.edit, image, origin.x, origin.y);
                self.has_selection = true;
            }
            None => self.has_selection = false,
        }
        self.render();
        self.notify();
    }

    /// Seed the edit layer with the whole base image
    pub fn copy_edit_from_base(&mut self) {
        self.edit = self.base.clone();
        self.has_selection = true;
        self.render();
        self.notify();
    }

    /// Merge the edit layer into base and record a snapshot
    pub fn commit_selection(&mut self) {
        composite_over(&mut self.base, &self.edit, 0, 0);
        raster::clear(&mut self.edit);
        self.has_selection = false;
        self.snapshot();
        self.render();
    }

    // === History ===

    pub fn on_snapshot(&mut self, listener: SnapshotListener) {
        self.listeners.push(listener);
    }

    pub fn history_state(&self) -> HistoryState {
        HistoryState {
            can_undo: self.can_undo(),
            can_redo: self.can_redo(),
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.has_selection && self.history.undo_len() > 0
    }

    pub fn can_redo(&self) -> bool {
        !self.has_selection && self.history.redo_len() > 0
    }

    fn notify(&mut self) {
        let state = self.history_state();
        for listener in self.listeners.iter_mut() {
            listener(state);
        }
    }

    pub fn snapshot(&mut self) {
        if !self.has_image() {
            return;
        }
        self.history.push(Snapshot::capture(&self.base));
        self.notify();
    }

    /// Swap in base pixels from history, resizing the other layers when the
    /// restored image has different dimensions.
    fn restore(&mut self, image: RgbaImage) {
        let (width, height) = image.dimensions();
        if (width, height) != (self.width, self.height) {
            self.width = width;
            self.height = height;
            self.edit = raster::blank(width, height);
            if self.mask.is_some() {
                self.mask = Some(raster::filled(width, height, MASK_KEEP));
            }
            self.viewport.reset_view(width, height);
        }
        self.base = image;
    }

    /// Returns whether anything was undone
    pub fn undo(&mut self) -> Result<bool, CompositorError> {
        if !self.can_undo() {
            return Ok(false);
        }
        let Some(snapshot) = self.history.undo() else {
            return Ok(false);
        };
        let image = snapshot.restore()?;
        self.restore(image);
        self.render();
        self.notify();
        Ok(true)
    }

    /// Returns whether anything was redone
    pub fn redo(&mut self) -> Result<bool, CompositorError> {
        if !self.can_redo() {
            return Ok(false);
        }
        let Some(snapshot) = self.history.redo() else {
            return Ok(false);
        };
        let image = snapshot.restore()?;
        self.restore(image);
        self.render();
        self.notify();
        Ok(true)
    }

    pub fn clear_redo_stack(&mut self) {
        self.history.clear_redo();
        self.notify();
    }

    /// Put back the base pixels of the last snapshot, discarding unrecorded
    /// base edits such as erasure. History is left as it was.
    pub fn restore_previous(&mut self) -> Result<(), CompositorError> {
        self.require_image()?;
        if let Some(image) = self.history.current().map(Snapshot::restore).transpose()? {
            self.restore(image);
        }
        self.render();
        self.notify();
        Ok(())
    }

    // === Extraction ===

    /// Copy of `rect` (whole image when `None`) from `layer`
    pub fn image_data(&self, rect: Option<Rect>, layer: Layer) -> Result<RgbaImage, CompositorError> {
        self.require_image()?;
        let rect = rect.unwrap_or_else(|| self.bounds());
        let source = match layer {
            Layer::Base => &self.base,
            Layer::Edit => &self.edit,
            Layer::Mask => self.mask.as_ref().ok_or(CompositorError::NoMask)?,
        };
        Ok(raster::crop(source, rect))
    }

    /// Base64 of the base layer (or part of it)
    pub fn encoded_image(&self, rect: Option<Rect>, format: EncodeFormat) -> Result<String, CompositorError> {
        let image = self.image_data(rect, Layer::Base)?;
        Ok(codec::encode_base64(&image, format)?)
    }

    /// White-on-black mask of `rect`. From `Layer::Base` erased pixels
    /// (alpha below 255) become white; `Layer::Mask` returns the mask layer.
    pub fn mask_image(&self, rect: Option<Rect>, layer: Layer) -> Result<RgbaImage, CompositorError> {
        let mut image = self.image_data(rect, layer)?;
        if layer != Layer::Mask {
            for pixel in image.pixels_mut() {
                *pixel = if pixel[3] < 255 { MASK_EDIT } else { MASK_KEEP };
            }
        }
        Ok(image)
    }

    /// PNG base64 of [`Compositor::mask_image`]
    pub fn encoded_mask(&self, rect: Option<Rect>, layer: Layer) -> Result<String, CompositorError> {
        let mask = self.mask_image(rect, layer)?;
        Ok(codec::encode_base64(&mask, EncodeFormat::Png)?)
    }

    /// `#rrggbb` of a base pixel
    pub fn pixel(&self, x: i32, y: i32) -> Option<String> {
        if !self.bounds().contains(x, y) {
            return None;
        }
        Some(raster::to_hex(*self.base.get_pixel(x as u32, y as u32)))
    }

    // === Overlay ===

    pub fn set_selection_overlay(&mut self, selection: Option<Rect>) {
        self.selection = selection;
        self.render();
    }

    pub fn set_selection_overlay_preview(&mut self, preview: Option<Rect>) {
        self.preview = preview;
        self.render();
    }

    pub fn set_cursor(&mut self, cursor: Option<Cursor>) {
        self.cursor = cursor;
        self.render();
    }

    /// Grow the base to cover a selection that reaches outside the image.
    ///
    /// Existing content keeps its place relative to the selection, whose
    /// origin is clamped to the new top-left. Returns false when the
    /// selection already fits.
    pub fn expand_to_overlay(&mut self) -> Result<bool, CompositorError> {
        self.require_image()?;
        let selection = self.selection.ok_or(CompositorError::NoSelection)?;
        if selection.is_within(self.width, self.height) {
            return Ok(false);
        }

        let union = self.bounds().union(&selection);
        let mut grown = raster::blank(union.width, union.height);
        raster::put(&mut grown, &self.base, -union.x, -union.y);
        self.selection = Some(Rect::new(
            selection.x.max(0),
            selection.y.max(0),
            selection.width,
            selection.height,
        ));

        tracing::info!(
            "Expanding {}x{} to {}x{} for outpainting",
            self.width,
            self.height,
            union.width,
            union.height
        );
        self.set_base_image(grown, false);
        Ok(true)
    }

    // === Mask ===

    pub fn create_mask(&mut self) {
        self.mask = Some(raster::filled(self.width, self.height, MASK_KEEP));
        self.render();
    }

    pub fn reset_mask(&mut self) {
        if let Some(mask) = self.mask.as_mut() {
            for pixel in mask.pixels_mut() {
                *pixel = MASK_KEEP;
            }
            self.render();
        }
    }

    pub fn invert_mask(&mut self) {
        if let Some(mask) = self.mask.as_mut() {
            for pixel in mask.pixels_mut() {
                for c in 0..3 {
                    pixel[c] = 255 - pixel[c];
                }
            }
            self.render();
        }
    }

    pub fn delete_mask(&mut self) {
        self.mask = None;
        self.render();
    }

    pub fn is_masked(&self) -> bool {
        self.mask.is_some()
    }

    // === Painting ===

    fn paint_target(&mut self, layer: Layer) -> Result<&mut RgbaImage, CompositorError> {
        match layer {
            Layer::Edit => Ok(&mut self.edit),
            Layer::Mask => self.mask.as_mut().ok_or(CompositorError::NoMask),
            Layer::Base => Err(CompositorError::ReadOnlyLayer(Layer::Base)),
        }
    }

    /// Erase a disc of base alpha, kept `erase_inset` pixels inside every
    /// selection edge that is not on the image boundary.
    pub fn erase_point(&mut self, center: Point, brush_size: f64) -> Result<(), CompositorError> {
        let selection = self.selection.ok_or(CompositorError::NoSelection)?;
        let inset = self.erase_inset as f64;

        let mut left = selection.x as f64;
        if selection.x > 0 {
            left += inset;
        }
        let mut right = selection.right() as f64;
        if selection.right() < self.width as i32 {
            right -= inset;
        }
        let mut top = selection.y as f64;
        if selection.y > 0 {
            top += inset;
        }
        let mut bottom = selection.bottom() as f64;
        if selection.bottom() < self.height as i32 {
            bottom -= inset;
        }

        draw::erase_circle(&mut self.base, center, brush_size / 2.0, |x, y| {
            let (cx, cy) = (x as f64 + 0.5, y as f64 + 0.5);
            cx > left && cx < right && cy > top && cy < bottom
        });
        self.render();
        Ok(())
    }

    pub fn draw_point(&mut self, center: Point, brush_size: f64, color: Rgba<u8>, layer: Layer) -> Result<(), CompositorError> {
        draw::fill_circle(self.paint_target(layer)?, center, brush_size / 2.0, color);
        self.render();
        Ok(())
    }

    pub fn draw_line(
        &mut self,
        from: Point,
        to: Point,
        brush_size: f64,
        color: Rgba<u8>,
        layer: Layer,
    ) -> Result<(), CompositorError> {
        draw::stroke_line(self.paint_target(layer)?, from, to, brush_size, color);
        self.render();
        Ok(())
    }

    /// Smudge the edit layer along a line
    pub fn smudge_line(&mut self, from: Point, to: Point, brush_size: f64, opacity: f32) {
        draw::smudge_line(&mut self.edit, from, to, brush_size, opacity);
        self.render();
    }

    // === Rendering ===

    /// Recomposite the visible surface
    pub fn render(&mut self) {
        let mut visible = self.background.clone();
        let layers = Layers {
            base: &self.base,
            edit: &self.edit,
            mask: self.mask.as_ref(),
            mask_opacity: self.mask_opacity,
        };
        render::render_layers(&mut visible, &layers, &self.viewport);
        let overlay = Overlay {
            selection: self.selection,
            preview: self.preview,
            show_selection: !self.has_selection,
            cursor: self.cursor.as_ref(),
        };
        render::render_overlay(&mut visible, self.width, self.height, &overlay, &self.viewport);
        self.visible = visible;
    }
}
