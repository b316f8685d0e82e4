//! Wire types exchanged with the generation backend

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub model: String,
    pub count: u32,
    pub denoising_strength: f32,
    /// Base64 source region
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_image: Option<String>,
    /// Base64 white-on-black mask of the region to regenerate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_mask: Option<String>,
    /// Id of the stored image this edit derives from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_finished(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Pending,
    Processing,
    Completed,
    Error,
}

/// One result image of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedImage {
    pub id: String,
    pub status: ImageStatus,
    /// Base64 or data-URI payload once completed
    #[serde(default)]
    pub image_data: Option<String>,
    /// Creation order, milliseconds since epoch
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationJob {
    pub id: String,
    pub status: JobStatus,
    #[serde(default)]
    pub progress: f32,
    #[serde(default)]
    pub images: Option<Vec<GeneratedImage>>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AugmentationKind {
    /// 2x upscale
    Upscale,
    FaceRestore,
}

impl AugmentationKind {
    /// Output size multiplier
    pub fn scale(self) -> u32 {
        match self {
            AugmentationKind::Upscale => 2,
            AugmentationKind::FaceRestore => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AugmentationRequest {
    pub kind: AugmentationKind,
    /// Base64 PNG input
    pub image_data: String,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_job_parses_backend_shape() {
        let job: GenerationJob = serde_json::from_str(
            r#"{"id":"j1","status":"completed","progress":1.0,
                "images":[{"id":"i1","status":"completed","imageData":"abc","createdAt":5}]}"#,
        )
        .unwrap();
        assert!(job.status.is_finished());
        let images = job.images.unwrap();
        assert_eq!(images[0].created_at, 5);
        assert_eq!(images[0].image_data.as_deref(), Some("abc"));
    }

    #[test]
    fn test_augmentation_kind_names() {
        assert_eq!(serde_json::to_string(&AugmentationKind::FaceRestore).unwrap(), "\"face_restore\"");
        assert_eq!(AugmentationKind::Upscale.scale(), 2);
    }
}
