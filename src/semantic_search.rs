//! Text-to-frame semantic search.
//!
//! A query is encoded through the CLIP text branch and matched against the
//! stored frame embeddings by cosine distance. Results come back in the
//! store's native ascending-distance order; the engine never re-sorts them on
//! another key. Optionally each matched frame is re-decoded from its source
//! video and written out as a JPEG artifact named by rank, frame id, and
//! similarity.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{info, warn};

use crate::embedder::Embedder;
use crate::errors::PipelineResult;
use crate::vector_store::{EmbeddingStore, FrameMatch};
use crate::video_processor;

pub struct SearchEngine {
    embedder: Arc<dyn Embedder>,
    store: Arc<EmbeddingStore>,
    matched_images_path: PathBuf,
}

impl SearchEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<EmbeddingStore>,
        matched_images_path: PathBuf,
    ) -> Self {
        SearchEngine {
            embedder,
            store,
            matched_images_path,
        }
    }

    /// Returns the `k` nearest stored frames for a natural-language query.
    pub fn search_by_text(&self, query: &str, k: usize) -> PipelineResult<Vec<FrameMatch>> {
        let start_time = std::time::Instant::now();
        info!("Semantic search for: '{}' (top {})", query, k);

        let text_embedding = self.embedder.embed_text(query)?;
        let results = self.store.query_by_vector(&text_embedding, k)?;

        for (rank, m) in results.iter().enumerate() {
            info!(
                "  {}. {} ({}, scene {}) similarity {:.4}",
                rank + 1,
                m.frame_id,
                m.metadata.video_name,
                m.metadata.scene_idx,
                m.similarity()
            );
        }
        log::debug!("Search took {:?}", start_time.elapsed());

        Ok(results)
    }

    /// Like [`search_by_text`](Self::search_by_text), but also re-extracts
    /// each matched frame from its source video and saves it under
    /// `<matched_images_path>/<sanitized_query>/`.
    ///
    /// A decode failure for one result is reported and skipped; the remaining
    /// results are still written.
    pub fn search_and_save(&self, query: &str, k: usize) -> PipelineResult<Vec<FrameMatch>> {
        let results = self.search_by_text(query, k)?;

        if results.is_empty() {
            info!("No results found to save");
            return Ok(results);
        }

        let output_dir = self.matched_images_path.join(sanitize_query(query));
        std::fs::create_dir_all(&output_dir)?;

        info!("Saving {} frames to: {}", results.len(), output_dir.display());

        for (rank, m) in results.iter().enumerate() {
            let filename = matched_frame_filename(rank + 1, &m.frame_id, m.similarity());
            let output_path = output_dir.join(&filename);

            match video_processor::extract_frame(
                Path::new(&m.metadata.video_path),
                m.metadata.frame_sample,
                &output_path,
            ) {
                Ok(()) => info!("  Saved: {}", filename),
                Err(e) => warn!("  Failed to extract frame {}: {}", m.frame_id, e),
            }
        }

        Ok(results)
    }
}

/// Replaces path-unsafe characters in a query with underscores so it can name
/// an output directory.
pub fn sanitize_query(query: &str) -> String {
    query
        .chars()
        .map(|c| match c {
            ' ' | '/' | '\\' => '_',
            c => c,
        })
        .collect()
}

fn matched_frame_filename(rank: usize, frame_id: &str, similarity: f32) -> String {
    format!("{:02}_{}_similarity_{:.3}.jpg", rank, frame_id, similarity)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_query_spaces_and_slashes() {
        assert_eq!(sanitize_query("person cutting vegetables"), "person_cutting_vegetables");
        assert_eq!(sanitize_query("a/b\\c d"), "a_b_c_d");
    }

    #[test]
    fn test_sanitize_query_keeps_safe_characters() {
        assert_eq!(sanitize_query("kitchen-scene_2"), "kitchen-scene_2");
    }

    #[test]
    fn test_matched_frame_filename_format() {
        let name = matched_frame_filename(1, "scene_0_frame_1_sample_30", 0.31789);
        assert_eq!(name, "01_scene_0_frame_1_sample_30_similarity_0.318.jpg");
    }
}
