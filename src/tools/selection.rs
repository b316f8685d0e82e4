//! Selection rectangle placement
//!
//! Hovering previews a fixed-size rectangle centred on the pointer and
//! snapped to the selection grid; a primary press commits the preview.
//! Generative tools embed this tool for their `select` state.

use serde_json::Value;

use super::args::{merge_args, SelectionArgs};
use super::{SaveHook, SaveListener, Tool, ToolError, ToolPointer};
use crate::compositor::Compositor;
use crate::core::geometry::{Point, Rect};
use crate::tools::PointerButton;

pub struct SelectionTool {
    args: SelectionArgs,
    snap: u32,
    preview: Option<Rect>,
    save: SaveHook,
}

impl SelectionTool {
    pub fn new(args: SelectionArgs, snap: u32) -> Self {
        Self {
            args,
            snap: snap.max(1),
            preview: None,
            save: SaveHook::default(),
        }
    }

    pub fn outpaint(&self) -> bool {
        self.args.outpaint
    }

    pub fn set_outpaint(&mut self, outpaint: bool) {
        self.args.outpaint = outpaint;
    }

    /// Rectangle that a press at `p` would select
    pub fn preview_at(&self, compositor: &Compositor, p: Point) -> Rect {
        let (image_w, image_h) = (compositor.width(), compositor.height());
        let (width, height) = if self.args.outpaint {
            (self.args.selection_width, self.args.selection_height)
        } else {
            (
                self.args.selection_width.min(image_w),
                self.args.selection_height.min(image_h),
            )
        };

        let snap = self.snap as f64;
        let mut x = (p.x / snap).round() as i32 * self.snap as i32 - (width / 2) as i32;
        let mut y = (p.y / snap).round() as i32 * self.snap as i32 - (height / 2) as i32;
        if !self.args.outpaint {
            x = x.clamp(0, (image_w - width) as i32);
            y = y.clamp(0, (image_h - height) as i32);
        }
        Rect::new(x, y, width, height)
    }

    /// Drop the hover preview
    pub fn clear_preview(&mut self, compositor: &mut Compositor) {
        self.preview = None;
        compositor.set_selection_overlay_preview(None);
    }
}

impl Tool for SelectionTool {
    fn name(&self) -> &'static str {
        "select"
    }

    fn state_name(&self) -> &'static str {
        "select"
    }

    fn on_pointer_down(&mut self, compositor: &mut Compositor, pointer: ToolPointer) -> Result<(), ToolError> {
        if pointer.button != PointerButton::Primary {
            return Ok(());
        }
        if let Some(preview) = self.preview.take() {
            tracing::debug!("Selection committed: {:?}", preview);
            compositor.set_selection_overlay(Some(preview));
            compositor.set_selection_overlay_preview(None);
        }
        Ok(())
    }

    fn on_pointer_move(&mut self, compositor: &mut Compositor, pointer: ToolPointer) -> Result<(), ToolError> {
        if !compositor.has_image() {
            return Ok(());
        }
        let preview = self.preview_at(compositor, pointer.position);
        if self.preview != Some(preview) {
            self.preview = Some(preview);
            compositor.set_selection_overlay_preview(Some(preview));
        }
        Ok(())
    }

    fn on_pointer_up(&mut self, _compositor: &mut Compositor, _pointer: ToolPointer) -> Result<(), ToolError> {
        Ok(())
    }

    fn on_pointer_leave(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        self.clear_preview(compositor);
        Ok(())
    }

    fn confirm(&mut self, _compositor: &mut Compositor) -> Result<(), ToolError> {
        Ok(())
    }

    fn cancel(&mut self, compositor: &mut Compositor) -> Result<(), ToolError> {
        self.clear_preview(compositor);
        Ok(())
    }

    fn destroy(&mut self, compositor: &mut Compositor, _confirm_discard: &mut dyn FnMut() -> bool) -> bool {
        self.clear_preview(compositor);
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
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tools::tests::compositor_with;
    use image::Rgba;

    fn tool(outpaint: bool) -> SelectionTool {
        SelectionTool::new(
            SelectionArgs {
                outpaint,
                ..Default::default()
            },
            64,
        )
    }

    #[test]
    fn test_preview_snaps_and_centres() {
        let c = compositor_with(1024, 1024, Rgba([0, 0, 0, 255]));
        let t = tool(false);
        // 600 snaps to 576, minus half of 512
        assert_eq!(t.preview_at(&c, Point::new(600.0, 530.0)), Rect::new(320, 256, 512, 512));
    }

    #[test]
    fn test_preview_clamped_inside_image() {
        let c = compositor_with(1024, 768, Rgba([0, 0, 0, 255]));
        let t = tool(false);
        assert_eq!(t.preview_at(&c, Point::new(10.0, 10.0)), Rect::new(0, 0, 512, 512));
        assert_eq!(t.preview_at(&c, Point::new(1000.0, 760.0)), Rect::new(512, 256, 512, 512));
    }

    #[test]
    fn test_preview_shrinks_to_small_images() {
        let c = compositor_with(300, 200, Rgba([0, 0, 0, 255]));
        let t = tool(false);
        assert_eq!(t.preview_at(&c, Point::new(150.0, 100.0)), Rect::new(0, 0, 300, 200));
    }

    #[test]
    fn test_outpaint_preview_may_leave_image() {
        let c = compositor_with(512, 512, Rgba([0, 0, 0, 255]));
        let t = tool(true);
        assert_eq!(t.preview_at(&c, Point::new(0.0, 500.0)), Rect::new(-256, 256, 512, 512));
    }

    #[test]
    fn test_press_commits_and_leave_clears() {
        let mut c = compositor_with(1024, 1024, Rgba([0, 0, 0, 255]));
        let mut t = tool(false);
        t.on_pointer_move(&mut c, ToolPointer::primary(600.0, 530.0)).unwrap();
        assert_eq!(c.selection_preview(), Some(Rect::new(320, 256, 512, 512)));

        t.on_pointer_down(&mut c, ToolPointer::primary(600.0, 530.0)).unwrap();
        assert_eq!(c.selection(), Some(Rect::new(320, 256, 512, 512)));
        assert_eq!(c.selection_preview(), None);

        t.on_pointer_move(&mut c, ToolPointer::primary(100.0, 100.0)).unwrap();
        t.on_pointer_leave(&mut c).unwrap();
        assert_eq!(c.selection_preview(), None);
        assert_eq!(c.selection(), Some(Rect::new(320, 256, 512, 512)));
    }

    #[test]
    fn test_secondary_press_does_not_commit() {
        let mut c = compositor_with(1024, 1024, Rgba([0, 0, 0, 255]));
        let before = c.selection();
        let mut t = tool(false);
        t.on_pointer_move(&mut c, ToolPointer::primary(600.0, 530.0)).unwrap();
        let pointer = ToolPointer {
            position: Point::new(600.0, 530.0),
            button: PointerButton::Secondary,
        };
        t.on_pointer_down(&mut c, pointer).unwrap();
        assert_eq!(c.selection(), before);
    }
}
