use std::path::Path;

use serde::{Deserialize, Serialize};

/// Provenance metadata attached to every indexed frame.
///
/// `frame_sample` is the absolute frame number in the source video;
/// `frame_idx` is the sample's position within its scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameMetadata {
    pub video_path: String,
    pub video_name: String,
    pub scene_idx: u32,
    pub frame_idx: u32,
    pub frame_sample: u64,
}

impl FrameMetadata {
    pub fn new(video_path: &Path, scene_idx: u32, frame_idx: u32, frame_sample: u64) -> Self {
        let video_name = video_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        FrameMetadata {
            video_path: video_path.to_string_lossy().into_owned(),
            video_name,
            scene_idx,
            frame_idx,
            frame_sample,
        }
    }
}

/// The unit stored in the embedding collection.
#[derive(Debug, Clone)]
pub struct FrameRecord {
    pub id: String,
    pub embedding: Vec<f32>,
    pub metadata: FrameMetadata,
}

impl FrameRecord {
    pub fn new(
        video_path: &Path,
        scene_idx: u32,
        frame_idx: u32,
        frame_sample: u64,
        embedding: Vec<f32>,
    ) -> Self {
        FrameRecord {
            id: build_frame_id(scene_idx, frame_idx, frame_sample),
            embedding,
            metadata: FrameMetadata::new(video_path, scene_idx, frame_idx, frame_sample),
        }
    }
}

/// Builds the stable, human-readable id for a sampled frame.
///
/// Re-processing the same video with the same sampling parameters reproduces
/// identical ids, which is what makes re-indexing idempotent at the store.
pub fn build_frame_id(scene_idx: u32, frame_idx: u32, frame_sample: u64) -> String {
    format!("scene_{}_frame_{}_sample_{}", scene_idx, frame_idx, frame_sample)
}
