//! Freehand round-brush painting onto the edit layer, or onto the mask
//! layer when used as the mask editor.

use image::Rgba;
use serde_json::Value;

use super::args::{merge_args, ArgsError, PencilArgs};
use super::{commit_and_save, PointerButton, SaveHook, SavedImage, SaveListener, Tool, ToolError, ToolPointer};
use crate::compositor::{Compositor, Cursor, CursorShape, Layer};
use crate::core::geometry::Point;
use crate::raster;

pub struct PencilTool {
    name: &'static str,
    args: PencilArgs,
    color: Rgba<u8>,
    layer: Layer,
    drawing: bool,
    last: Option<Point>,
    dirty: bool,
    picking: bool,
    save: SaveHook,
}

fn parse_color(color: &str) -> Result<Rgba<u8>, ArgsError> {
    raster::parse_hex(color).ok_or_else(|| ArgsError::Invalid(format!("bad colour {:?}", color)))
}

impl PencilTool {
    pub fn new(args: PencilArgs) -> Self {
        let color = parse_color(&args.brush_color).unwrap_or_else(|e| {
            tracing::warn!("{}, painting white", e);
            Rgba([255, 255, 255, 255])
        });
        Self {
            name: "pencil",
            args,
            color,
            layer: Layer::Edit,
            drawing: false,
            last: None,
            dirty: false,
            picking: false,
            save: SaveHook::default(),
        }
    }

    /// White brush painting the mask layer
    pub fn mask_editor(args: PencilArgs) -> Self {
        let mut tool = Self::new(PencilArgs {
            brush_color: "#FFFFFF".into(),
            ..args
        });
        tool.name = "mask-editor";
        tool.layer = Layer::Mask;
        tool
    }

    pub fn color(&self) -> Rgba<u8> {
        self.color
    }

    pub fn is_picking(&self) -> bool {
        self.picking
    }

    /// Next primary release samples the base colour instead of painting
    pub fn set_color_picker(&mut self, compositor: &mut Compositor, picking: bool) {
        self.picking = picking;
        self.drawing = false;
        compositor.set_cursor(None);
    }

    fn update_cursor(&self, compositor: &mut Compositor, p: Point) {
        let cursor = if self.picking {
            let sampled = compositor
                .pixel(p.x.floor() as i32, p.y.floor() as i32)
                .and_then(|hex| raster::parse_hex(&hex))
                .unwrap_or(self.color);
            let radius = (compositor.width() / 20).max(1) as f64;
            Cursor::new(p, radius, CursorShape::ColorPicker).with_color(sampled)
        } else {
            Cursor::new(p, self.args.brush_size / 2.0, CursorShape::CircleFill).with_color(self.color)
        };
        compositor.set_cursor(Some(cursor));
    }
}

impl Tool for PencilTool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn state_name(&self) -> &'static str {
        if self.picking {
            "colorpicker"
        } else {
            "default"
        }
    }

    fn on_pointer_down(&mut self, compositor: &mut Compositor, pointer: ToolPointer) -> Result<(), ToolError> {
        if pointer.button != PointerButton::Primary || self.picking {
            return Ok(());
        }
        compositor.draw_point(pointer.position, self.args.brush_size, self.color, self.layer)?;
        self.drawing = true;
        self.dirty = true;
        self.last = Some(pointer.position);
        Ok(())
    }

    fn on_pointer_move(&mut self, compositor: &mut Compositor, pointer: ToolPointer) -> Result<(), ToolError> {
        self.update_cursor(compositor, pointer.position);
        if self.drawing {
            let from = self.last.unwrap_or(pointer.position);
            compositor.draw_line(from, pointer.position, self.args.brush_size, self.color, self.layer)?;
            self.last = Some(pointer.position);
        }
        Ok(())
    }

    fn on_pointer_up(&mut self, compositor: &mut Compositor, pointer: ToolPointer) -> Result<(), ToolError> {
        if self.picking && pointer.button == PointerButton::Primary {
            let p = pointer.position;
            if let Some(hex) = compositor.pixel(p.x.floor() as i32, p.y.floor() as i32) {
                tracing::debug!("Picked colour {}", hex);
                self.color = parse_color(&hex)?;
                self.args.brush_color = hex;
            }
            self.picking = false;
            self.update_cursor(compositor, p);
        }
        self.drawing = false;
        self.last = None;
        Ok(())
    }

    fn on_pointer_leave(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        self.drawing = false;
        self.last = None;
        compositor.set_cursor(None);
        Ok(())
    }

    fn confirm(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        if self.layer == Layer::Edit {
            commit_and_save(compositor, &mut self.save, SavedImage::png)?;
        }
        self.dirty = false;
        Ok(())
    }

    fn cancel(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        match self.layer {
            Layer::Mask => compositor.reset_mask(),
            _ => compositor.set_edit_image(None),
        }
        self.dirty = false;
        Ok(())
    }

    fn destroy(&mut self, compositor: &mut Compositor, _confirm_discard: &mut dyn FnMut() -> bool) -> bool {
        if self.dirty && self.layer == Layer::Edit {
            compositor.commit_selection();
        }
        self.dirty = false;
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
        let mut args: PencilArgs = merge_args(&self.args, patch)?;
        if self.layer == Layer::Mask {
            args.brush_color = "#FFFFFF".into();
        }
        self.color = parse_color(&args.brush_color)?;
        self.args = args;
        Ok(self.args())
    }

    fn is_dirty(&self) -> bool {
        self.dirty
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tools::tests::{compositor_with, recording_listener};
    use serde_json::json;

    fn red_pencil(size: f64) -> PencilTool {
        PencilTool::new(PencilArgs {
            brush_size: size,
            brush_color: "#FF0000".into(),
        })
    }

    #[test]
    fn test_stroke_paints_edit_layer_only() {
        let mut c = compositor_with(64, 64, Rgba([0, 0, 255, 255]));
        let mut t = red_pencil(4.0);
        t.on_pointer_down(&mut c, ToolPointer::primary(10.0, 10.0)).unwrap();
        t.on_pointer_move(&mut c, ToolPointer::primary(40.0, 10.0)).unwrap();
        t.on_pointer_up(&mut c, ToolPointer::primary(40.0, 10.0)).unwrap();

        assert!(t.is_dirty());
        assert_eq!(c.edit().get_pixel(25, 10), &Rgba([255, 0, 0, 255]));
        assert_eq!(c.base().get_pixel(25, 10), &Rgba([0, 0, 255, 255]));
        assert_eq!(c.cursor().map(|cur| cur.shape), Some(CursorShape::CircleFill));
    }

    #[test]
    fn test_confirm_commits_and_saves() {
        let mut c = compositor_with(64, 64, Rgba([0, 0, 255, 255]));
        let mut t = red_pencil(4.0);
        let (listener, saved) = recording_listener();
        t.on_save_image(listener);
        t.on_pointer_down(&mut c, ToolPointer::primary(10.0, 10.0)).unwrap();
        t.on_pointer_up(&mut c, ToolPointer::primary(10.0, 10.0)).unwrap();
        t.confirm(&mut c).unwrap();

        assert_eq!(c.base().get_pixel(10, 10), &Rgba([255, 0, 0, 255]));
        assert_eq!(saved.lock().len(), 1);
        assert!(!t.is_dirty());
        assert!(c.can_undo());
    }

    #[test]
    fn test_cancel_discards_strokes() {
        let mut c = compositor_with(64, 64, Rgba([0, 0, 255, 255]));
        let mut t = red_pencil(4.0);
        t.on_pointer_down(&mut c, ToolPointer::primary(10.0, 10.0)).unwrap();
        t.cancel(&mut c).unwrap();
        assert_eq!(c.edit().get_pixel(10, 10)[3], 0);
        assert!(!t.is_dirty());
    }

    #[test]
    fn test_destroy_commits_pending_strokes() {
        let mut c = compositor_with(64, 64, Rgba([0, 0, 255, 255]));
        let mut t = red_pencil(4.0);
        t.on_pointer_down(&mut c, ToolPointer::primary(10.0, 10.0)).unwrap();
        assert!(t.destroy(&mut c, &mut || false));
        assert_eq!(c.base().get_pixel(10, 10), &Rgba([255, 0, 0, 255]));
        assert!(c.cursor().is_none());
    }

    #[test]
    fn test_color_picker_samples_base_on_release() {
        let mut c = compositor_with(64, 64, Rgba([0x12, 0x34, 0x56, 255]));
        let mut t = red_pencil(4.0);
        t.set_color_picker(&mut c, true);
        t.on_pointer_down(&mut c, ToolPointer::primary(5.0, 5.0)).unwrap();
        t.on_pointer_move(&mut c, ToolPointer::primary(6.0, 5.0)).unwrap();
        assert_eq!(c.cursor().map(|cur| cur.shape), Some(CursorShape::ColorPicker));
        // picking never paints
        assert_eq!(c.edit().get_pixel(5, 5)[3], 0);

        t.on_pointer_up(&mut c, ToolPointer::primary(6.0, 5.0)).unwrap();
        assert!(!t.is_picking());
        assert_eq!(t.args()["brushColor"], json!("#123456"));
        assert_eq!(t.color(), Rgba([0x12, 0x34, 0x56, 255]));
    }

    #[test]
    fn test_mask_editor_paints_white_mask() {
        let mut c = compositor_with(64, 64, Rgba([0, 0, 255, 255]));
        c.create_mask();
        let mut t = PencilTool::mask_editor(PencilArgs::default());
        assert_eq!(t.name(), "mask-editor");
        t.update_args(&mut c, json!({"brushColor": "#00FF00"})).unwrap();
        t.on_pointer_down(&mut c, ToolPointer::primary(20.0, 20.0)).unwrap();
        assert_eq!(c.mask().unwrap().get_pixel(20, 20), &Rgba([255, 255, 255, 255]));
        assert_eq!(c.edit().get_pixel(20, 20)[3], 0);
    }

    #[test]
    fn test_bad_colour_rejected() {
        let mut c = compositor_with(8, 8, Rgba([0, 0, 0, 255]));
        let mut t = red_pencil(4.0);
        assert!(t.update_args(&mut c, json!({"brushColor": "red"})).is_err());
        assert_eq!(t.color(), Rgba([255, 0, 0, 255]));
    }
}
