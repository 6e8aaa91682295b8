use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use log::info;

use framefind::clip_encoder::ClipEncoder;
use framefind::config::Config;
use framefind::indexer::{self, BatchSummary, VideoIndexer};
use framefind::scene_detector::SceneSegmenter;
use framefind::semantic_search::SearchEngine;
use framefind::vector_store::EmbeddingStore;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        return Ok(());
    }

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    match args[0].as_str() {
        "--directory" => {
            let directory = args
                .get(1)
                .context("--directory requires a directory path")?;
            let videos = indexer::videos_from_directory(Path::new(directory))?;
            if videos.is_empty() {
                println!("No video files found in directory: {}", directory);
                return Ok(());
            }
            println!("Found {} video files in {}", videos.len(), directory);
            let summary = build_indexer(&config)?.index_videos(&videos);
            print_summary(&summary);
        }
        "--search" => {
            let query = join_query(&args[1..]).context("--search requires a query")?;
            let results = build_search_engine(&config)?
                .search_and_save(&query, config.search_results)?;
            print_results(&query, &results);
        }
        "--search-no-save" => {
            let query = join_query(&args[1..]).context("--search-no-save requires a query")?;
            let results = build_search_engine(&config)?
                .search_by_text(&query, config.search_results)?;
            print_results(&query, &results);
        }
        "--help" | "-h" => print_usage(),
        _ => {
            let videos: Vec<PathBuf> = args.iter().map(PathBuf::from).collect();
            let summary = build_indexer(&config)?.index_videos(&videos);
            print_summary(&summary);
        }
    }

    Ok(())
}

fn print_usage() {
    println!("Usage:");
    println!("  framefind <video_path>...                Index one or more videos");
    println!("  framefind --directory <directory_path>   Index all videos in a directory");
    println!("  framefind --search <text query>          Search frames and save matched images");
    println!("  framefind --search-no-save <text query>  Search frames without saving images");
    println!();
    println!("Examples:");
    println!("  framefind videos/sample.mp4");
    println!("  framefind --directory videos/");
    println!("  framefind --search person cutting vegetables");
}

fn join_query(args: &[String]) -> Option<String> {
    if args.is_empty() {
        None
    } else {
        Some(args.join(" "))
    }
}

fn open_store(config: &Config) -> anyhow::Result<Arc<EmbeddingStore>> {
    let store = EmbeddingStore::open(Path::new(&config.data_path), &config.collection_name)
        .context("failed to open embedding store")?;
    Ok(Arc::new(store))
}

fn load_encoder(config: &Config) -> anyhow::Result<Arc<ClipEncoder>> {
    let encoder = ClipEncoder::new(Path::new(&config.model_cache_path))
        .context("failed to initialize CLIP encoder")?;
    Ok(Arc::new(encoder))
}

fn build_indexer(config: &Config) -> anyhow::Result<VideoIndexer> {
    let store = open_store(config)?;
    let encoder = load_encoder(config)?;
    info!("Indexing into collection '{}'", store.collection_name());

    Ok(VideoIndexer::new(
        encoder,
        store,
        SceneSegmenter::new(config.scene_thresholds.clone()),
        config.samples_per_scene,
    ))
}

fn build_search_engine(config: &Config) -> anyhow::Result<SearchEngine> {
    let store = open_store(config)?;
    let encoder = load_encoder(config)?;

    Ok(SearchEngine::new(
        encoder,
        store,
        PathBuf::from(&config.matched_images_path),
    ))
}

fn print_summary(summary: &BatchSummary) {
    println!();
    println!("SUMMARY:");
    println!(
        "  Videos processed: {}/{}",
        summary.succeeded(),
        summary.outcomes.len()
    );
    println!("  Total embeddings: {}", summary.total_embeddings());
    if let Some(total) = summary.collection_total() {
        println!("  Collection total: {} embeddings", total);
    }

    for outcome in &summary.outcomes {
        match &outcome.error {
            None => println!(
                "  OK   {} ({} embeddings)",
                outcome.video_path.display(),
                outcome.embeddings_count
            ),
            Some(error) => println!("  FAIL {} ({})", outcome.video_path.display(), error),
        }
    }
}

fn print_results(query: &str, results: &[framefind::vector_store::FrameMatch]) {
    if results.is_empty() {
        println!("No results found for '{}'", query);
        return;
    }

    println!("Found {} results for '{}':", results.len(), query);
    for (rank, m) in results.iter().enumerate() {
        println!("{}. {}", rank + 1, m.frame_id);
        println!("   Video: {}", m.metadata.video_name);
        println!(
            "   Scene: {}, Frame: {}",
            m.metadata.scene_idx, m.metadata.frame_idx
        );
        println!("   Similarity: {:.4}", m.similarity());
    }
}
