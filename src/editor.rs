//! Editor facade
//!
//! Owns the compositor, the blend pool, the tool args store and the active
//! tool, and is the single entry point a host shell drives: input events,
//! tool switches, undo/redo, and the periodic `tick` that applies
//! background progress and writes confirmed images to storage.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::Value;

use crate::compositor::Compositor;
use crate::core::config::EditorConfig;
use crate::core::errors::CoreError;
use crate::core::geometry::Direction;
use crate::generation::GenerationService;
use crate::pool::BlendPool;
use crate::raster::codec;
use crate::storage::{ImageMeta, Storage, StoredImage};
use crate::tools::args::{load_args, save_args};
use crate::tools::{
    ActiveTool, AugmentTool, EnhanceTool, GestureState, ImportExportTool, InpaintTool, InputEvent, PencilTool, Routed,
    SavedImage, SelectionTool, SmudgeTool, ToolArgsStore, ToolKind,
};

pub struct Editor<S: GenerationService, St: Storage> {
    config: EditorConfig,
    compositor: Compositor,
    args: Box<dyn ToolArgsStore>,
    service: Arc<S>,
    storage: Arc<St>,
    pool: Arc<BlendPool>,
    gestures: GestureState,
    tool: Option<ActiveTool<S>>,
    image: ImageMeta,
    /// Filled by the active tool's save listener, drained into storage
    saved: Arc<Mutex<Vec<SavedImage>>>,
}

impl<S: GenerationService, St: Storage> Editor<S, St> {
    pub fn new(
        config: EditorConfig,
        view_width: u32,
        view_height: u32,
        service: Arc<S>,
        storage: Arc<St>,
        args: Box<dyn ToolArgsStore>,
    ) -> Self {
        tracing::info!("Editor starting with {} blend workers", config.pool_workers);
        Self {
            compositor: Compositor::new(view_width, view_height, &config),
            pool: Arc::new(BlendPool::from_config(&config)),
            gestures: GestureState::new(config.touch_hold()),
            config,
            args,
            service,
            storage,
            tool: None,
            image: ImageMeta::default(),
            saved: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    /// Metadata of the image being edited
    pub fn image(&self) -> &ImageMeta {
        &self.image
    }

    pub fn active_tool(&self) -> Option<&ActiveTool<S>> {
        self.tool.as_ref()
    }

    pub fn active_tool_mut(&mut self) -> Option<&mut ActiveTool<S>> {
        self.tool.as_mut()
    }

    pub fn tool_kind(&self) -> Option<ToolKind> {
        self.tool.as_ref().map(|tool| tool.kind())
    }

    /// Run `f` against the active tool and the compositor
    pub fn with_tool<R>(&mut self, f: impl FnOnce(&mut ActiveTool<S>, &mut Compositor) -> R) -> Option<R> {
        let tool = self.tool.as_mut()?;
        Some(f(tool, &mut self.compositor))
    }

    pub fn resize_view(&mut self, view_width: u32, view_height: u32) {
        self.compositor.resize_view(view_width, view_height);
    }

    // === Images ===

    /// Load image `id` from storage. Returns false when the active tool
    /// holds unsaved work and `confirm_discard` declines.
    pub fn open(&mut self, id: &str, confirm_discard: &mut dyn FnMut() -> bool) -> Result<bool, CoreError> {
        let stored = self.storage.load_image(id)?;
        let image = codec::decode_base64(&stored.image_data)?;
        let meta = ImageMeta {
            id: Some(id.to_string()),
            ..stored.meta
        };
        self.replace_image(image, meta, confirm_discard)
    }

    /// Start editing `image` directly
    pub fn load(
        &mut self,
        image: image::RgbaImage,
        meta: ImageMeta,
        confirm_discard: &mut dyn FnMut() -> bool,
    ) -> Result<bool, CoreError> {
        self.replace_image(image, meta, confirm_discard)
    }

    fn replace_image(
        &mut self,
        image: image::RgbaImage,
        meta: ImageMeta,
        confirm_discard: &mut dyn FnMut() -> bool,
    ) -> Result<bool, CoreError> {
        let kind = self.tool_kind();
        if !self.release_tool(confirm_discard) {
            return Ok(false);
        }
        tracing::info!("Opening image {:?}", meta.id);
        self.compositor.set_base_image(image, true);
        self.image = meta;
        // tools size themselves from the image on construction
        if let Some(kind) = kind {
            self.activate(kind);
        }
        Ok(true)
    }

    // === Tools ===

    fn release_tool(&mut self, confirm_discard: &mut dyn FnMut() -> bool) -> bool {
        if let Some(tool) = self.tool.as_mut() {
            if !tool.as_tool_mut().destroy(&mut self.compositor, confirm_discard) {
                tracing::debug!("{} refused to close", tool.as_tool().name());
                return false;
            }
        }
        self.tool = None;
        true
    }

    fn build(&mut self, kind: ToolKind) -> ActiveTool<S> {
        let store = &*self.args;
        let name = kind.name();
        match kind {
            ToolKind::Select => ActiveTool::Selection(SelectionTool::new(
                load_args(store, name),
                self.config.selection_snap,
            )),
            ToolKind::Pencil => ActiveTool::Pencil(PencilTool::new(load_args(store, name))),
            ToolKind::Smudge => ActiveTool::Smudge(SmudgeTool::new(load_args(store, name))),
            ToolKind::Inpaint => ActiveTool::Inpaint(InpaintTool::new(
                load_args(store, name),
                &self.config,
                self.service.clone(),
                self.pool.clone(),
                &mut self.compositor,
            )),
            ToolKind::Enhance => ActiveTool::Enhance(EnhanceTool::new(
                load_args(store, name),
                &self.config,
                self.service.clone(),
                self.pool.clone(),
                &mut self.compositor,
            )),
            ToolKind::Augment => ActiveTool::Augment(AugmentTool::new(
                load_args(store, name),
                &self.config,
                self.service.clone(),
                self.pool.clone(),
            )),
            ToolKind::ImportExport => ActiveTool::ImportExport(ImportExportTool::new(load_args(store, name))),
        }
    }

    fn activate(&mut self, kind: ToolKind) {
        let mut tool = self.build(kind);
        let saved = self.saved.clone();
        tool.as_tool_mut()
            .on_save_image(Box::new(move |image| saved.lock().push(image)));
        tracing::debug!("Active tool: {}", kind.name());
        self.tool = Some(tool);
    }

    /// Replace the active tool. Returns false, keeping the current tool,
    /// when it refuses to close.
    pub fn switch_tool(&mut self, kind: ToolKind, confirm_discard: &mut dyn FnMut() -> bool) -> bool {
        if !self.release_tool(confirm_discard) {
            return false;
        }
        self.activate(kind);
        true
    }

    /// Merge `patch` into the active tool's args and persist the result
    pub fn update_args(&mut self, patch: Value) -> Result<Value, CoreError> {
        let Some(tool) = self.tool.as_mut() else {
            return Err(CoreError::InvalidInput("no active tool".into()));
        };
        let tool = tool.as_tool_mut();
        let args = tool.update_args(&mut self.compositor, patch)?;
        save_args(&*self.args, tool.name(), &args)?;
        Ok(args)
    }

    // === Input ===

    fn dispatch(&mut self, routed: Vec<Routed>) -> Result<(), CoreError> {
        let Some(tool) = self.tool.as_mut() else {
            return Ok(());
        };
        let tool = tool.as_tool_mut();
        for event in routed {
            match event {
                Routed::Down(pointer) => tool.on_pointer_down(&mut self.compositor, pointer)?,
                Routed::Move(pointer) => tool.on_pointer_move(&mut self.compositor, pointer)?,
                Routed::Up(pointer) => tool.on_pointer_up(&mut self.compositor, pointer)?,
                Routed::Leave => tool.on_pointer_leave(&mut self.compositor)?,
                Routed::Wheel(position) => tool.on_wheel(&mut self.compositor, position)?,
            }
        }
        Ok(())
    }

    pub fn handle(&mut self, event: InputEvent) -> Result<(), CoreError> {
        let routed = self.gestures.handle(&mut self.compositor, event);
        self.dispatch(routed)
    }

    /// Resolve held touches, apply background progress and store confirmed
    /// images. Returns the ids of newly stored images.
    pub fn tick(&mut self, now: Instant) -> Result<Vec<String>, CoreError> {
        let routed = self.gestures.tick(&self.compositor, now);
        self.dispatch(routed)?;
        if let Some(tool) = self.tool.as_mut() {
            tool.as_tool_mut().tick(&mut self.compositor)?;
        }
        self.flush_saved()
    }

    /// Drive the active tool's background job to completion
    pub async fn wait(&mut self) {
        match self.tool.as_mut() {
            Some(ActiveTool::Inpaint(tool)) => tool.wait(&mut self.compositor).await,
            Some(ActiveTool::Enhance(tool)) => tool.wait(&mut self.compositor).await,
            Some(ActiveTool::Augment(tool)) => tool.wait(&mut self.compositor).await,
            _ => {}
        }
    }

    fn flush_saved(&mut self) -> Result<Vec<String>, CoreError> {
        let pending = std::mem::take(&mut *self.saved.lock());
        let mut ids = Vec::with_capacity(pending.len());
        for saved in pending {
            let meta = ImageMeta {
                id: None,
                parent: self.image.id.clone(),
                prompt: saved.prompt.unwrap_or_else(|| self.image.prompt.clone()),
                negative_prompt: saved.negative_prompt.unwrap_or_else(|| self.image.negative_prompt.clone()),
                model: self.image.model.clone(),
            };
            let id = self.storage.save_image(StoredImage {
                meta: meta.clone(),
                image_data: saved.image_data,
                format: saved.format,
            })?;
            tracing::info!("Saved edit as {} (parent {:?})", id, meta.parent);
            self.image = ImageMeta { id: Some(id.clone()), ..meta };
            ids.push(id);
        }
        Ok(ids)
    }

    // === Tool actions ===

    pub fn submit(&mut self) -> Result<(), CoreError> {
        let image = self.image.clone();
        let tool = self
            .tool
            .as_mut()
            .ok_or_else(|| CoreError::InvalidInput("no active tool".into()))?;
        tool.as_tool_mut().submit(&mut self.compositor, &image)?;
        Ok(())
    }

    /// Confirm the active tool's work; returns the ids of stored images
    pub fn confirm(&mut self) -> Result<Vec<String>, CoreError> {
        let tool = self.tool.as_mut().map(|tool| tool.as_tool_mut());
        if let Some(tool) = tool {
            tool.confirm(&mut self.compositor)?;
        }
        self.flush_saved()
    }

    pub fn cancel(&mut self) -> Result<(), CoreError> {
        if let Some(tool) = self.tool.as_mut() {
            tool.as_tool_mut().cancel(&mut self.compositor)?;
        }
        Ok(())
    }

    pub fn select(&mut self, direction: Direction) -> Result<(), CoreError> {
        if let Some(tool) = self.tool.as_mut() {
            tool.as_tool_mut().select(&mut self.compositor, direction)?;
        }
        Ok(())
    }

    /// Last error the active tool reported to the user
    pub fn last_error(&self) -> Option<&str> {
        self.tool.as_ref()?.as_tool().last_error()
    }

    // === History ===

    pub fn undo(&mut self) -> Result<bool, CoreError> {
        Ok(self.compositor.undo()?)
    }

    pub fn redo(&mut self) -> Result<bool, CoreError> {
        Ok(self.compositor.redo()?)
    }

    pub fn render(&mut self) -> &image::RgbaImage {
        self.compositor.render();
        self.compositor.visible()
    }
}
