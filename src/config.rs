use std::env;

use crate::scene_detector::DEFAULT_THRESHOLDS;

#[derive(Debug, Clone)]
pub struct Config {
    pub data_path: String,
    pub collection_name: String,
    pub model_cache_path: String,
    pub matched_images_path: String,
    pub scene_thresholds: Vec<f32>,
    pub samples_per_scene: usize,
    pub search_results: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Config {
            data_path: env::var("FRAMEFIND_DATA_PATH").unwrap_or_else(|_| "./data".to_string()),
            collection_name: env::var("FRAMEFIND_COLLECTION")
                .unwrap_or_else(|_| "video_frames".to_string()),
            model_cache_path: env::var("FRAMEFIND_MODEL_CACHE")
                .unwrap_or_else(|_| "./data/models".to_string()),
            matched_images_path: env::var("FRAMEFIND_MATCHED_IMAGES")
                .unwrap_or_else(|_| "./matched_imgs".to_string()),
            scene_thresholds: match env::var("FRAMEFIND_SCENE_THRESHOLDS") {
                Ok(raw) => raw
                    .split(',')
                    .map(|s| s.trim().parse())
                    .collect::<Result<Vec<_>, _>>()?,
                Err(_) => DEFAULT_THRESHOLDS.to_vec(),
            },
            samples_per_scene: env::var("FRAMEFIND_SAMPLES_PER_SCENE")
                .unwrap_or_else(|_| "3".to_string())
                .parse()?,
            search_results: env::var("FRAMEFIND_SEARCH_RESULTS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()?,
        })
    }
}
