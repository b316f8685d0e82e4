//! Smudge brush. The first stroke seeds the edit layer with the base image;
//! strokes then drag colour along the pointer path.

use serde_json::Value;

use super::args::{merge_args, SmudgeArgs};
use super::{commit_and_save, PointerButton, SaveHook, SavedImage, SaveListener, Tool, ToolError, ToolPointer};
use crate::compositor::{Compositor, Cursor, CursorShape};
use crate::core::geometry::Point;

pub struct SmudgeTool {
    args: SmudgeArgs,
    last: Option<Point>,
    dirty: bool,
    save: SaveHook,
}

impl SmudgeTool {
    pub fn new(args: SmudgeArgs) -> Self {
        Self {
            args,
            last: None,
            dirty: false,
            save: SaveHook::default(),
        }
    }
}

impl Tool for SmudgeTool {
    fn name(&self) -> &'static str {
        "smudge"
    }

    fn state_name(&self) -> &'static str {
        if self.last.is_some() {
            "smudging"
        } else {
            "default"
        }
    }

    fn on_pointer_down(&mut self, compositor: &mut Compositor, pointer: ToolPointer) -> Result<(), ToolError> {
        if pointer.button != PointerButton::Primary || !compositor.has_image() {
            return Ok(());
        }
        if !self.dirty {
            compositor.copy_edit_from_base();
            self.dirty = true;
        }
        self.last = Some(pointer.position);
        Ok(())
    }

    fn on_pointer_move(&mut self, compositor: &mut Compositor, pointer: ToolPointer) -> Result<(), ToolError> {
        compositor.set_cursor(Some(Cursor::new(
            pointer.position,
            self.args.brush_size / 2.0,
            CursorShape::Circle,
        )));
        if let Some(from) = self.last {
            compositor.smudge_line(from, pointer.position, self.args.brush_size, self.args.brush_opacity);
            self.last = Some(pointer.position);
        }
        Ok(())
    }

    fn on_pointer_up(&mut self, _compositor: &mut Compositor, _pointer: ToolPointer) -> Result<(), ToolError> {
        self.last = None;
        Ok(())
    }

    fn on_pointer_leave(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        self.last = None;
        compositor.set_cursor(None);
        Ok(())
    }

    fn confirm(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        if self.dirty {
            commit_and_save(compositor, &mut self.save, SavedImage::png)?;
            self.dirty = false;
        }
        Ok(())
    }

    fn cancel(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        compositor.set_edit_image(None);
        self.dirty = false;
        self.last = None;
        Ok(())
    }

    fn destroy(&mut self, compositor: &mut Compositor, _confirm_discard: &mut dyn FnMut() -> bool) -> bool {
        if self.dirty {
            compositor.commit_selection();
            self.dirty = false;
        }
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
    use image::{Rgba, RgbaImage};

    fn striped() -> crate::compositor::Compositor {
        let mut c = compositor_with(64, 64, Rgba([0, 0, 0, 255]));
        let mut image = RgbaImage::from_pixel(64, 64, Rgba([0, 0, 0, 255]));
        for y in 0..64 {
            for x in 0..32 {
                image.put_pixel(x, y, Rgba([255, 255, 255, 255]));
            }
        }
        c.set_base_image(image, true);
        c
    }

    fn smudge() -> SmudgeTool {
        SmudgeTool::new(SmudgeArgs {
            brush_size: 10.0,
            brush_opacity: 0.5,
        })
    }

    #[test]
    fn test_first_stroke_copies_base_and_blocks_undo() {
        let mut c = striped();
        let mut t = smudge();
        t.on_pointer_down(&mut c, ToolPointer::primary(20.0, 32.0)).unwrap();
        assert_eq!(c.edit().get_pixel(5, 5), &Rgba([255, 255, 255, 255]));
        assert!(!c.can_undo());
        assert_eq!(t.state_name(), "smudging");
    }

    #[test]
    fn test_drag_carries_colour_across_edge() {
        let mut c = striped();
        let mut t = smudge();
        t.on_pointer_down(&mut c, ToolPointer::primary(24.0, 32.0)).unwrap();
        t.on_pointer_move(&mut c, ToolPointer::primary(40.0, 32.0)).unwrap();
        t.on_pointer_up(&mut c, ToolPointer::primary(40.0, 32.0)).unwrap();
        // white dragged into the black half
        assert!(c.edit().get_pixel(34, 32)[0] > 0);
        assert_eq!(c.base().get_pixel(34, 32)[0], 0);
    }

    #[test]
    fn test_confirm_and_cancel() {
        let mut c = striped();
        let mut t = smudge();
        let (listener, saved) = recording_listener();
        t.on_save_image(listener);

        t.on_pointer_down(&mut c, ToolPointer::primary(24.0, 32.0)).unwrap();
        t.on_pointer_move(&mut c, ToolPointer::primary(40.0, 32.0)).unwrap();
        t.cancel(&mut c).unwrap();
        assert_eq!(c.edit().get_pixel(34, 32)[3], 0);
        assert!(c.can_undo());

        t.on_pointer_down(&mut c, ToolPointer::primary(24.0, 32.0)).unwrap();
        t.on_pointer_move(&mut c, ToolPointer::primary(40.0, 32.0)).unwrap();
        t.confirm(&mut c).unwrap();
        assert!(c.base().get_pixel(34, 32)[0] > 0);
        assert_eq!(saved.lock().len(), 1);
    }
}
