//! Persisted per-tool settings
//!
//! Each tool owns a closed serde struct. The struct is stored as JSON under
//! `tool_args_<tool name>`, restored when the tool is activated and written
//! back on every change. Missing fields fall back to their defaults.

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;

use crate::generation::AugmentationKind;
use crate::raster::EncodeFormat;

#[derive(Debug, thiserror::Error)]
pub enum ArgsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    Invalid(String),
}

impl From<ArgsError> for String {
    fn from(e: ArgsError) -> Self {
        e.to_string()
    }
}

/// Key-value backend for tool args
pub trait ToolArgsStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, ArgsError>;
    fn set(&self, key: &str, value: String) -> Result<(), ArgsError>;
}

pub fn args_key(tool: &str) -> String {
    format!("tool_args_{}", tool)
}

/// Stored args for `tool`, or defaults when missing or unreadable
pub fn load_args<T: DeserializeOwned + Default>(store: &dyn ToolArgsStore, tool: &str) -> T {
    let key = args_key(tool);
    match store.get(&key) {
        Ok(Some(json)) => serde_json::from_str(&json).unwrap_or_else(|e| {
            tracing::warn!("Discarding unreadable {}: {}", key, e);
            T::default()
        }),
        Ok(None) => T::default(),
        Err(e) => {
            tracing::warn!("Failed to read {}: {}", key, e);
            T::default()
        }
    }
}

pub fn save_args(store: &dyn ToolArgsStore, tool: &str, args: &Value) -> Result<(), ArgsError> {
    store.set(&args_key(tool), serde_json::to_string(args)?)
}

/// Overlay the fields of `patch` onto `current`
pub fn merge_args<T: Serialize + DeserializeOwned>(current: &T, patch: Value) -> Result<T, ArgsError> {
    let mut merged = serde_json::to_value(current)?;
    match (&mut merged, patch) {
        (Value::Object(target), Value::Object(fields)) => {
            for (key, value) in fields {
                target.insert(key, value);
            }
        }
        (_, other) => return Err(ArgsError::Invalid(format!("expected an object, got {}", other))),
    }
    Ok(serde_json::from_value(merged)?)
}

// === Stores ===

/// In-process store, iterates in insertion order
#[derive(Debug, Default)]
pub struct MemoryArgsStore {
    entries: RwLock<IndexMap<String, String>>,
}

impl MemoryArgsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

impl ToolArgsStore for MemoryArgsStore {
    fn get(&self, key: &str) -> Result<Option<String>, ArgsError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), ArgsError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }
}

/// Single JSON document on disk, rewritten on every change
#[derive(Debug)]
pub struct FileArgsStore {
    path: PathBuf,
    entries: RwLock<IndexMap<String, String>>,
}

/// Default location under the platform data directory
pub fn default_args_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("com.retouch")
        .join("tool_args.json")
}

impl FileArgsStore {
    pub fn open(path: PathBuf) -> Self {
        let entries = if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(json) => serde_json::from_str(&json).unwrap_or_default(),
                Err(e) => {
                    tracing::warn!("Failed to load tool args {:?}: {}", path, e);
                    IndexMap::new()
                }
            }
        } else {
            IndexMap::new()
        };
        tracing::debug!("Tool args store {:?}: {} entries", path, entries.len());
        Self {
            path,
            entries: RwLock::new(entries),
        }
    }

    pub fn open_default() -> Self {
        Self::open(default_args_path())
    }

    fn flush(&self, entries: &IndexMap<String, String>) -> Result<(), ArgsError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, json)?;
        Ok(())
    }
}

impl ToolArgsStore for FileArgsStore {
    fn get(&self, key: &str) -> Result<Option<String>, ArgsError> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn set(&self, key: &str, value: String) -> Result<(), ArgsError> {
        let mut entries = self.entries.write();
        entries.insert(key.to_string(), value);
        self.flush(&entries)
    }
}

// === Per-tool args ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SelectionArgs {
    pub selection_width: u32,
    pub selection_height: u32,
    /// Let the selection leave the image bounds
    pub outpaint: bool,
}

impl Default for SelectionArgs {
    fn default() -> Self {
        Self {
            selection_width: 512,
            selection_height: 512,
            outpaint: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PencilArgs {
    pub brush_size: f64,
    /// `#rrggbb`
    pub brush_color: String,
}

impl Default for PencilArgs {
    fn default() -> Self {
        Self {
            brush_size: 10.0,
            brush_color: "#FFFFFF".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SmudgeArgs {
    pub brush_size: f64,
    pub brush_opacity: f32,
}

impl Default for SmudgeArgs {
    fn default() -> Self {
        Self {
            brush_size: 10.0,
            brush_opacity: 0.2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InpaintArgs {
    /// Empty means reuse the image's prompt
    pub prompt: String,
    pub negative_prompt: String,
    pub model: String,
    pub count: u32,
    pub brush_size: f64,
    pub outpaint: bool,
}

impl Default for InpaintArgs {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            model: "stable_diffusion_inpainting".into(),
            count: 4,
            brush_size: 10.0,
            outpaint: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EnhanceArgs {
    pub prompt: String,
    pub negative_prompt: String,
    pub model: String,
    pub count: u32,
    /// Denoising strength sent with the request
    pub variation_strength: f32,
    /// Mask brush
    pub brush_size: f64,
}

impl Default for EnhanceArgs {
    fn default() -> Self {
        Self {
            prompt: String::new(),
            negative_prompt: String::new(),
            model: "Epic Diffusion".into(),
            count: 4,
            variation_strength: 0.75,
            brush_size: 10.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AugmentArgs {
    pub kind: AugmentationKind,
}

impl Default for AugmentArgs {
    fn default() -> Self {
        Self {
            kind: AugmentationKind::Upscale,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExportArgs {
    pub format: EncodeFormat,
}

impl Default for ExportArgs {
    fn default() -> Self {
        Self {
            format: EncodeFormat::Png,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_fields_take_defaults() {
        let store = MemoryArgsStore::new();
        store.set("tool_args_pencil", r##"{"brushColor":"#FF0000"}"##.into()).unwrap();
        let args: PencilArgs = load_args(&store, "pencil");
        assert_eq!(args.brush_color, "#FF0000");
        assert_eq!(args.brush_size, 10.0);

        let smudge: SmudgeArgs = load_args(&store, "smudge");
        assert_eq!(smudge, SmudgeArgs::default());
    }

    #[test]
    fn test_unreadable_args_fall_back() {
        let store = MemoryArgsStore::new();
        store.set("tool_args_enhance", "not json".into()).unwrap();
        let args: EnhanceArgs = load_args(&store, "enhance");
        assert_eq!(args.variation_strength, 0.75);
    }

    #[test]
    fn test_merge_keeps_untouched_fields() {
        let current = InpaintArgs {
            prompt: "a boat".into(),
            ..Default::default()
        };
        let merged = merge_args(&current, json!({"count": 2, "outpaint": true})).unwrap();
        assert_eq!(merged.prompt, "a boat");
        assert_eq!(merged.count, 2);
        assert!(merged.outpaint);

        assert!(merge_args(&current, json!([1, 2])).is_err());
        assert!(merge_args(&current, json!({"count": "many"})).is_err());
    }

    #[test]
    fn test_memory_store_keeps_insertion_order() {
        let store = MemoryArgsStore::new();
        store.set("tool_args_b", "{}".into()).unwrap();
        store.set("tool_args_a", "{}".into()).unwrap();
        store.set("tool_args_b", "{\"x\":1}".into()).unwrap();
        assert_eq!(store.keys(), vec!["tool_args_b", "tool_args_a"]);
    }

    #[test]
    fn test_file_store_round_trips_through_disk() {
        let path = std::env::temp_dir()
            .join(format!("retouch-args-{}", std::process::id()))
            .join("tool_args.json");
        let _ = std::fs::remove_file(&path);
        {
            let store = FileArgsStore::open(path.clone());
            save_args(&store, "augment", &json!({"kind": "face_restore"})).unwrap();
        }
        let store = FileArgsStore::open(path.clone());
        let args: AugmentArgs = load_args(&store, "augment");
        assert_eq!(args.kind, AugmentationKind::FaceRestore);
        let _ = std::fs::remove_file(&path);
    }
}
