use std::path::Path;

use log::{debug, info};

use crate::errors::{PipelineError, PipelineResult};
use crate::video_processor;

/// Thresholds tried in order, strict to loose. The first one that detects at
/// least one scene wins.
pub const DEFAULT_THRESHOLDS: [f32; 4] = [15.0, 10.0, 5.0, 2.0];

// Frames are downscaled to this size before differencing; scene cuts survive
// aggressive downscaling and the decode cost drops by orders of magnitude.
const ANALYSIS_WIDTH: u32 = 96;
const ANALYSIS_HEIGHT: u32 = 54;

/// A contiguous frame range judged visually continuous. `end_frame` is
/// exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneBoundary {
    pub start_frame: u64,
    pub end_frame: u64,
}

impl SceneBoundary {
    pub fn new(start_frame: u64, end_frame: u64) -> Self {
        SceneBoundary {
            start_frame,
            end_frame,
        }
    }

    pub fn len(&self) -> u64 {
        self.end_frame.abs_diff(self.start_frame)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Mean absolute pixel difference between two equally-sized grayscale frames,
/// on the 0-255 scale the thresholds are calibrated against.
pub fn frame_difference(prev: &[u8], next: &[u8]) -> f32 {
    if prev.is_empty() || prev.len() != next.len() {
        return 0.0;
    }

    let total: u64 = prev
        .iter()
        .zip(next.iter())
        .map(|(a, b)| a.abs_diff(*b) as u64)
        .sum();

    total as f32 / prev.len() as f32
}

/// Frame indices whose content score reaches the threshold. Index 0 can never
/// be a cut; a cut at frame `n` means the scene change happens entering `n`.
pub fn cuts_at_threshold(scores: &[f32], threshold: f32) -> Vec<u64> {
    scores
        .iter()
        .enumerate()
        .skip(1)
        .filter(|(_, score)| **score >= threshold)
        .map(|(idx, _)| idx as u64)
        .collect()
}

/// Splits `[0, total_frames)` at the given cut frames.
///
/// An empty cut list yields no scenes: a detected scene requires at least one
/// content cut, which is what drives the threshold fallback ladder.
pub fn scenes_from_cuts(cuts: &[u64], total_frames: u64) -> Vec<SceneBoundary> {
    if cuts.is_empty() || total_frames == 0 {
        return Vec::new();
    }

    let mut scenes = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0u64;
    for &cut in cuts {
        if cut > start && cut < total_frames {
            scenes.push(SceneBoundary::new(start, cut));
            start = cut;
        }
    }
    scenes.push(SceneBoundary::new(start, total_frames));
    scenes
}

/// Content-change scene segmentation with ordered threshold fallback.
pub struct SceneSegmenter {
    thresholds: Vec<f32>,
}

impl SceneSegmenter {
    pub fn new(thresholds: Vec<f32>) -> Self {
        SceneSegmenter { thresholds }
    }

    /// Segments a video into scenes.
    ///
    /// Decodes the video once into per-frame content scores, then tries each
    /// threshold in order. If no threshold finds a cut, the whole video
    /// becomes a single synthetic scene, so every decodable video yields at
    /// least one scene. Unreadable or zero-frame input is an error, not a
    /// panic.
    pub fn segment(&self, video_path: &Path) -> PipelineResult<Vec<SceneBoundary>> {
        let scores =
            video_processor::frame_difference_scores(video_path, ANALYSIS_WIDTH, ANALYSIS_HEIGHT)?;

        if scores.is_empty() {
            return Err(PipelineError::EmptyVideo(video_path.to_path_buf()));
        }

        let total_frames = scores.len() as u64;
        Ok(self.segment_scores(&scores, total_frames, video_path))
    }

    /// The pure fallback ladder over precomputed scores.
    pub fn segment_scores(
        &self,
        scores: &[f32],
        total_frames: u64,
        video_path: &Path,
    ) -> Vec<SceneBoundary> {
        for &threshold in &self.thresholds {
            let cuts = cuts_at_threshold(scores, threshold);
            let scenes = scenes_from_cuts(&cuts, total_frames);
            debug!(
                "Scene detection with threshold {}: found {} scenes in {}",
                threshold,
                scenes.len(),
                video_path.display()
            );
            if !scenes.is_empty() {
                info!(
                    "Detected {} scenes in {} at threshold {}",
                    scenes.len(),
                    video_path.display(),
                    threshold
                );
                return scenes;
            }
        }

        info!(
            "No scenes detected in {} at any threshold - treating entire video as one scene",
            video_path.display()
        );
        vec![SceneBoundary::new(0, total_frames)]
    }
}

impl Default for SceneSegmenter {
    fn default() -> Self {
        SceneSegmenter::new(DEFAULT_THRESHOLDS.to_vec())
    }
}
