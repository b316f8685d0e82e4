//! Bounded undo/redo history of base-layer snapshots
//!
//! Snapshots are LZ4 compressed; a full-resolution RGBA base compresses well
//! and the stack holds up to ten of them.

use std::collections::VecDeque;

use image::RgbaImage;
use lz4_flex::{compress_prepend_size, decompress_size_prepended};

use super::CompositorError;

/// Immutable copy of the base surface
#[derive(Debug, Clone)]
pub struct Snapshot {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl Snapshot {
    pub fn capture(image: &RgbaImage) -> Self {
        let data = compress_prepend_size(image.as_raw());
        tracing::debug!(
            "Snapshot {}x{}: {} -> {} bytes",
            image.width(),
            image.height(),
            image.as_raw().len(),
            data.len()
        );
        Self {
            data,
            width: image.width(),
            height: image.height(),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn restore(&self) -> Result<RgbaImage, CompositorError> {
        let raw = decompress_size_prepended(&self.data)
            .map_err(|e| CompositorError::Snapshot(e.to_string()))?;
        RgbaImage::from_raw(self.width, self.height, raw)
            .ok_or_else(|| CompositorError::Snapshot("decompressed size does not match".into()))
    }
}

#[derive(Debug)]
pub struct History {
    undo: VecDeque<Snapshot>,
    redo: Vec<Snapshot>,
    current: Option<Snapshot>,
    limit: usize,
}

impl History {
    pub fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            current: None,
            limit,
        }
    }

    /// True before the first snapshot
    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }

    /// Most recently recorded state
    pub fn current(&self) -> Option<&Snapshot> {
        self.current.as_ref()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Record a new current state. Clears redo; drops the oldest undo entry
    /// past the limit.
    pub fn push(&mut self, snapshot: Snapshot) {
        if let Some(previous) = self.current.replace(snapshot) {
            self.undo.push_back(previous);
            while self.undo.len() > self.limit {
                self.undo.pop_front();
            }
        }
        self.redo.clear();
    }

    /// Step back; returns the state to restore
    pub fn undo(&mut self) -> Option<&Snapshot> {
        let previous = self.undo.pop_back()?;
        if let Some(current) = self.current.replace(previous) {
            self.redo.push(current);
        }
        self.current.as_ref()
    }

    /// Step forward; returns the state to restore
    pub fn redo(&mut self) -> Option<&Snapshot> {
        let next = self.redo.pop()?;
        if let Some(current) = self.current.replace(next) {
            self.undo.push_back(current);
        }
        self.current.as_ref()
    }

    pub fn clear_redo(&mut self) {
        self.redo.clear();
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.current = None;
    }
}
