//! Candidate navigation
//!
//! Index -1 means "no candidate": the edit layer is empty and the original
//! pixels show through. Stepping past either end wraps through -1.

use image::RgbaImage;

use crate::core::geometry::Direction;

#[derive(Debug, Clone, Default)]
pub struct CandidateSet {
    images: Vec<RgbaImage>,
    index: isize,
}

impl CandidateSet {
    /// Starts on the first candidate
    pub fn new(images: Vec<RgbaImage>) -> Self {
        let index = if images.is_empty() { -1 } else { 0 };
        Self { images, index }
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn index(&self) -> Option<usize> {
        usize::try_from(self.index).ok()
    }

    pub fn current(&self) -> Option<&RgbaImage> {
        self.index().and_then(|i| self.images.get(i))
    }

    pub fn select(&mut self, direction: Direction) -> Option<&RgbaImage> {
        let len = self.images.len() as isize;
        self.index = match direction {
            Direction::Left if self.index <= -1 => len - 1,
            Direction::Left => self.index - 1,
            Direction::Right if self.index >= len - 1 => -1,
            Direction::Right => self.index + 1,
        };
        self.current()
    }

    /// Overwrite the current candidate
    pub fn replace_current(&mut self, image: RgbaImage) {
        if let Some(slot) = self.index().and_then(|i| self.images.get_mut(i)) {
            *slot = image;
        }
    }

    pub fn clear(&mut self) {
        self.images.clear();
        self.index = -1;
    }
}
