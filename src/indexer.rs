//! Batch indexing orchestrator.
//!
//! Drives segmentation, sampling, extraction, embedding, and store insertion
//! across one or many videos. Every video produces a structured outcome; a
//! failure in one never aborts the batch.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{error, info, warn};

use crate::embedder::Embedder;
use crate::errors::{PipelineError, PipelineResult};
use crate::frame_record::FrameRecord;
use crate::frame_sampler;
use crate::scene_detector::SceneSegmenter;
use crate::vector_store::EmbeddingStore;
use crate::video_processor;

const VIDEO_EXTENSIONS: [&str; 7] = ["mp4", "avi", "mov", "mkv", "wmv", "flv", "webm"];

/// Result of processing a single video.
#[derive(Debug, Clone)]
pub struct VideoOutcome {
    pub video_path: PathBuf,
    pub success: bool,
    pub embeddings_count: usize,
    pub error: Option<String>,
    pub collection_total: Option<u64>,
}

impl VideoOutcome {
    fn failure(video_path: PathBuf, error: &PipelineError) -> Self {
        VideoOutcome {
            video_path,
            success: false,
            embeddings_count: 0,
            error: Some(error.to_string()),
            collection_total: None,
        }
    }
}

/// Aggregate over a batch of videos.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub outcomes: Vec<VideoOutcome>,
}

impl BatchSummary {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn total_embeddings(&self) -> usize {
        self.outcomes.iter().map(|o| o.embeddings_count).sum()
    }

    pub fn collection_total(&self) -> Option<u64> {
        self.outcomes.iter().rev().find_map(|o| o.collection_total)
    }
}

pub struct VideoIndexer {
    embedder: Arc<dyn Embedder>,
    store: Arc<EmbeddingStore>,
    segmenter: SceneSegmenter,
    samples_per_scene: usize,
}

impl VideoIndexer {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<EmbeddingStore>,
        segmenter: SceneSegmenter,
        samples_per_scene: usize,
    ) -> Self {
        VideoIndexer {
            embedder,
            store,
            segmenter,
            samples_per_scene,
        }
    }

    /// Processes one video end to end and records the result; never panics
    /// and never propagates pipeline failures past the outcome.
    pub fn index_video(&self, video_path: &Path) -> VideoOutcome {
        info!("Processing video: {}", video_path.display());

        let records = match self.embed_video(video_path) {
            Ok(records) => records,
            Err(e) => {
                error!("Failed to process {}: {}", video_path.display(), e);
                return VideoOutcome::failure(video_path.to_path_buf(), &e);
            }
        };

        let embeddings_count = records.len();

        if let Err(e) = self.store.insert(&records) {
            let e = PipelineError::from(e);
            error!("Failed to save embeddings for {}: {}", video_path.display(), e);
            return VideoOutcome::failure(video_path.to_path_buf(), &e);
        }

        let collection_total = self.store.count().ok();
        info!(
            "Indexed {} embeddings from {} (collection total: {})",
            embeddings_count,
            video_path.display(),
            collection_total.unwrap_or(0)
        );

        VideoOutcome {
            video_path: video_path.to_path_buf(),
            success: true,
            embeddings_count,
            error: None,
            collection_total,
        }
    }

    /// Processes videos sequentially; one video's failure is recorded and the
    /// batch moves on.
    pub fn index_videos(&self, video_paths: &[PathBuf]) -> BatchSummary {
        info!("Processing {} videos", video_paths.len());

        let outcomes = video_paths
            .iter()
            .enumerate()
            .map(|(i, path)| {
                info!("[{}/{}] {}", i + 1, video_paths.len(), path.display());
                self.index_video(path)
            })
            .collect();

        let summary = BatchSummary { outcomes };
        info!(
            "Batch done: {}/{} videos, {} embeddings",
            summary.succeeded(),
            video_paths.len(),
            summary.total_embeddings()
        );
        summary
    }

    /// The write path: segment, sample, extract, embed, build records.
    fn embed_video(&self, video_path: &Path) -> PipelineResult<Vec<FrameRecord>> {
        if !video_path.exists() {
            return Err(PipelineError::InputNotFound(video_path.to_path_buf()));
        }

        let info = video_processor::probe_video(video_path)?;
        info!(
            "Video info: {} frames, {:.2} fps, {:.2} seconds",
            info.frame_count, info.fps, info.duration
        );
        if info.frame_count == 0 {
            return Err(PipelineError::EmptyVideo(video_path.to_path_buf()));
        }

        let scenes = self.segmenter.segment(video_path)?;

        // All sampled frames for the whole video, so extraction is a single
        // ffmpeg pass. Duplicate frame numbers (degenerate scenes) decode
        // once but still produce one record per sample slot.
        let mut samples: Vec<(u32, u32, u64)> = Vec::new();
        for (scene_idx, scene) in scenes.iter().enumerate() {
            let frame_numbers = frame_sampler::sample(scene, self.samples_per_scene);
            info!(
                "Scene {} [{}, {}): sampling frames {:?}",
                scene_idx, scene.start_frame, scene.end_frame, frame_numbers
            );
            for (frame_idx, frame_number) in frame_numbers.into_iter().enumerate() {
                samples.push((scene_idx as u32, frame_idx as u32, frame_number));
            }
        }

        let frame_numbers: Vec<u64> = samples.iter().map(|(_, _, n)| *n).collect();
        let temp_dir = unique_temp_dir();
        let extracted = video_processor::extract_frames_batch(video_path, &frame_numbers, &temp_dir)?;

        // Decode whatever actually extracted; a frame that fails to decode is
        // skipped, not fatal.
        let mut decoded: Vec<((u32, u32, u64), image::DynamicImage)> =
            Vec::with_capacity(samples.len());
        for &(scene_idx, frame_idx, frame_number) in &samples {
            let Some((_, frame_path)) = extracted.iter().find(|(n, _)| *n == frame_number) else {
                warn!(
                    "Failed to read frame {} in scene {} of {}",
                    frame_number,
                    scene_idx,
                    video_path.display()
                );
                continue;
            };

            match image::open(frame_path) {
                Ok(image) => decoded.push(((scene_idx, frame_idx, frame_number), image)),
                Err(e) => warn!(
                    "Failed to decode extracted frame {} of {}: {}",
                    frame_number,
                    video_path.display(),
                    e
                ),
            }
        }

        // An unavailable encoder cannot produce a partial index for this
        // video; the whole batch fails, but the temp files still go away.
        let images: Vec<image::DynamicImage> = decoded.iter().map(|(_, img)| img.clone()).collect();
        let embeddings = self.embedder.embed_images(&images);
        cleanup_temp_dir(&temp_dir, &extracted);
        let embeddings = embeddings.map_err(PipelineError::from)?;

        let records: Vec<FrameRecord> = decoded
            .iter()
            .zip(embeddings)
            .map(|(((scene_idx, frame_idx, frame_number), _), embedding)| {
                FrameRecord::new(video_path, *scene_idx, *frame_idx, *frame_number, embedding)
            })
            .collect();

        if records.is_empty() {
            return Err(PipelineError::EmptyInput(video_path.to_path_buf()));
        }

        Ok(records)
    }
}

fn unique_temp_dir() -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let unique_id = COUNTER.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!("framefind_{}_{}", std::process::id(), unique_id))
}

fn cleanup_temp_dir(temp_dir: &Path, extracted: &[(u64, PathBuf)]) {
    for (_, frame_path) in extracted {
        if let Err(e) = std::fs::remove_file(frame_path) {
            warn!("Failed to cleanup temp frame {}: {}", frame_path.display(), e);
        }
    }
    if temp_dir.exists() {
        if let Err(e) = std::fs::remove_dir(temp_dir) {
            warn!("Failed to cleanup temp directory {}: {}", temp_dir.display(), e);
        }
    }
}

/// Collects video files (by extension) directly inside a directory, sorted.
pub fn videos_from_directory(directory: &Path) -> PipelineResult<Vec<PathBuf>> {
    if !directory.exists() {
        return Err(PipelineError::InputNotFound(directory.to_path_buf()));
    }

    let mut videos: Vec<PathBuf> = std::fs::read_dir(directory)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_video_file(path))
        .collect();

    videos.sort();
    Ok(videos)
}

fn is_video_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_video_file() {
        assert!(is_video_file(Path::new("a/sample.mp4")));
        assert!(is_video_file(Path::new("SAMPLE.MKV")));
        assert!(!is_video_file(Path::new("notes.txt")));
        assert!(!is_video_file(Path::new("no_extension")));
    }

    #[test]
    fn test_videos_from_directory_filters_and_sorts() {
        let temp = tempfile::TempDir::new().unwrap();
        for name in ["b.mp4", "a.mov", "skip.txt", "c.webm"] {
            std::fs::write(temp.path().join(name), b"").unwrap();
        }

        let videos = videos_from_directory(temp.path()).unwrap();
        let names: Vec<_> = videos
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();

        assert_eq!(names, vec!["a.mov", "b.mp4", "c.webm"]);
    }

    #[test]
    fn test_videos_from_missing_directory_is_error() {
        let result = videos_from_directory(Path::new("/does/not/exist"));
        assert!(matches!(result, Err(PipelineError::InputNotFound(_))));
    }
}
