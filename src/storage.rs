//! Image persistence collaborator
//!
//! The editor loads the image it opens from a [`Storage`] and writes every
//! confirmed edit back as a new image whose parent is the one it came from.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::raster::EncodeFormat;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Image not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl From<StorageError> for String {
    fn from(e: StorageError) -> Self {
        e.to_string()
    }
}

/// Generation parameters that travel with an image
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageMeta {
    /// `None` until the image has been stored
    pub id: Option<String>,
    pub parent: Option<String>,
    pub prompt: String,
    pub negative_prompt: String,
    pub model: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredImage {
    #[serde(flatten)]
    pub meta: ImageMeta,
    /// Base64 payload, optionally a data URI
    pub image_data: String,
    pub format: EncodeFormat,
}

/// Whole-image load/save backend
pub trait Storage: Send + Sync {
    fn load_image(&self, id: &str) -> Result<StoredImage, StorageError>;

    /// Persist `image`, returning its new id
    fn save_image(&self, image: StoredImage) -> Result<String, StorageError>;
}

/// Insertion-ordered in-process storage
#[derive(Debug, Default)]
pub struct MemoryStorage {
    images: Mutex<IndexMap<String, StoredImage>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.images.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.lock().is_empty()
    }

    /// Most recently saved image
    pub fn last(&self) -> Option<StoredImage> {
        self.images.lock().last().map(|(_, image)| image.clone())
    }
}

impl Storage for MemoryStorage {
    fn load_image(&self, id: &str) -> Result<StoredImage, StorageError> {
        self.images
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn save_image(&self, mut image: StoredImage) -> Result<String, StorageError> {
        let mut images = self.images.lock();
        let id = format!("image-{}", images.len() + 1);
        image.meta.id = Some(id.clone());
        images.insert(id.clone(), image);
        tracing::debug!("Stored image {}", id);
        Ok(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_assigns_ids() {
        let storage = MemoryStorage::new();
        let image = StoredImage {
            meta: ImageMeta {
                prompt: "a cat".into(),
                ..Default::default()
            },
            image_data: "AAAA".into(),
            format: EncodeFormat::Png,
        };
        let first = storage.save_image(image.clone()).unwrap();
        let second = storage.save_image(image).unwrap();
        assert_ne!(first, second);
        assert_eq!(storage.len(), 2);

        let loaded = storage.load_image(&first).unwrap();
        assert_eq!(loaded.meta.id.as_deref(), Some(first.as_str()));
        assert_eq!(loaded.meta.prompt, "a cat");
        assert!(matches!(storage.load_image("nope"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn test_stored_image_json_is_flat() {
        let json = r#"{"id":"i1","prompt":"p","imageData":"AAAA","format":"webp"}"#;
        let image: StoredImage = serde_json::from_str(json).unwrap();
        assert_eq!(image.meta.id.as_deref(), Some("i1"));
        assert_eq!(image.meta.negative_prompt, "");
        assert_eq!(image.format, EncodeFormat::Webp);
    }
}
