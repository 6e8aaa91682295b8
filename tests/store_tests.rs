use std::path::Path;

use framefind::frame_record::FrameRecord;
use framefind::vector_store::{
    EmbeddingStore, InsertOutcome, MetadataFilter, StoreError, EMBEDDING_DIM,
};
use tempfile::TempDir;

/// Unit vector along one axis; cosine distance between distinct axes is 1.
fn unit_vec(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[axis % EMBEDDING_DIM] = 1.0;
    v
}

fn record(scene_idx: u32, frame_idx: u32, frame_sample: u64, axis: usize) -> FrameRecord {
    FrameRecord::new(
        Path::new("videos/kitchen.mp4"),
        scene_idx,
        frame_idx,
        frame_sample,
        unit_vec(axis),
    )
}

fn open_store(temp: &TempDir) -> EmbeddingStore {
    EmbeddingStore::open(temp.path(), "test_frames").unwrap()
}

#[test]
fn test_open_creates_empty_collection() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    assert_eq!(store.count().unwrap(), 0);
    assert!(temp.path().join("test_frames.db").exists());
}

#[test]
fn test_insert_and_count() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    let records = vec![record(0, 0, 0, 0), record(0, 1, 30, 1), record(0, 2, 60, 2)];
    let outcome = store.insert(&records).unwrap();

    assert_eq!(outcome, InsertOutcome::Inserted(3));
    assert_eq!(store.count().unwrap(), 3);
}

#[test]
fn test_empty_insert_is_a_noop_not_an_error() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    let outcome = store.insert(&[]).unwrap();
    assert_eq!(outcome, InsertOutcome::NothingToInsert);
    assert_eq!(store.count().unwrap(), 0);
}

#[test]
fn test_round_trip_query_by_own_vector() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    let r = record(1, 0, 45, 7);
    store.insert(std::slice::from_ref(&r)).unwrap();

    let matches = store.query_by_vector(&r.embedding, 1).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].frame_id, r.id);
    assert!(matches[0].distance.abs() < 1e-5);
    assert!((matches[0].similarity() - 1.0).abs() < 1e-5);
    assert_eq!(matches[0].metadata, r.metadata);
}

#[test]
fn test_query_results_ordered_by_ascending_distance() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    store
        .insert(&[
            record(0, 0, 0, 3),
            record(0, 1, 30, 4),
            record(0, 2, 60, 5),
            record(1, 0, 90, 6),
        ])
        .unwrap();

    let query = unit_vec(4);
    let matches = store.query_by_vector(&query, 4).unwrap();
    assert_eq!(matches.len(), 4);
    assert_eq!(matches[0].frame_id, "scene_0_frame_1_sample_30");

    for pair in matches.windows(2) {
        assert!(pair[0].distance <= pair[1].distance);
    }
    for m in &matches {
        let sim = m.similarity();
        assert!((-1.0..=1.0).contains(&sim), "similarity {} out of range", sim);
    }
}

#[test]
fn test_opposite_vector_similarity_is_negative_one() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    let r = record(0, 0, 0, 9);
    store.insert(std::slice::from_ref(&r)).unwrap();

    let mut opposite = unit_vec(9);
    opposite[9] = -1.0;
    let matches = store.query_by_vector(&opposite, 1).unwrap();

    assert!((matches[0].distance - 2.0).abs() < 1e-5);
    assert!((matches[0].similarity() + 1.0).abs() < 1e-5);
}

#[test]
fn test_duplicate_insert_upserts_and_count_is_unchanged() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    let records = vec![record(0, 0, 0, 0), record(0, 1, 30, 1), record(0, 2, 60, 2)];
    store.insert(&records).unwrap();
    assert_eq!(store.count().unwrap(), 3);

    // Re-indexing the same video reproduces identical ids; the upsert policy
    // must hold the collection count steady across repeated runs.
    for _ in 0..3 {
        let outcome = store.insert(&records).unwrap();
        assert_eq!(outcome, InsertOutcome::Inserted(3));
        assert_eq!(store.count().unwrap(), 3);
    }
}

#[test]
fn test_upsert_replaces_vector_and_metadata() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    store.insert(&[record(0, 0, 0, 1)]).unwrap();

    // Same id (scene 0, frame 0, sample 0) from a different video path with a
    // different embedding.
    let replacement = FrameRecord::new(Path::new("videos/other.mp4"), 0, 0, 0, unit_vec(2));
    store.insert(std::slice::from_ref(&replacement)).unwrap();

    assert_eq!(store.count().unwrap(), 1);

    let matches = store.query_by_vector(&unit_vec(2), 1).unwrap();
    assert!(matches[0].distance.abs() < 1e-5);
    assert_eq!(matches[0].metadata.video_name, "other.mp4");
}

#[test]
fn test_dimension_mismatch_is_rejected() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    let bad = FrameRecord::new(Path::new("clip.mp4"), 0, 0, 0, vec![1.0; 8]);
    let err = store.insert(std::slice::from_ref(&bad)).unwrap_err();
    assert!(matches!(err, StoreError::Dimension { got: 8, .. }));
    assert_eq!(store.count().unwrap(), 0);

    let err = store.query_by_vector(&[1.0; 8], 1).unwrap_err();
    assert!(matches!(err, StoreError::Dimension { .. }));
}

#[test]
fn test_query_by_metadata_equality() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    store
        .insert(&[
            record(0, 0, 0, 0),
            record(0, 1, 30, 1),
            record(1, 0, 60, 2),
        ])
        .unwrap();
    let other = FrameRecord::new(Path::new("videos/beach.mp4"), 0, 0, 10, unit_vec(3));
    store.insert(std::slice::from_ref(&other)).unwrap();

    let kitchen = store
        .query_by_metadata(&MetadataFilter::by_video_name("kitchen.mp4"), 10)
        .unwrap();
    assert_eq!(kitchen.len(), 3);
    assert!(kitchen.iter().all(|f| f.metadata.video_name == "kitchen.mp4"));

    let scene_one = store
        .query_by_metadata(
            &MetadataFilter {
                video_name: Some("kitchen.mp4".to_string()),
                scene_idx: Some(1),
                ..Default::default()
            },
            10,
        )
        .unwrap();
    assert_eq!(scene_one.len(), 1);
    assert_eq!(scene_one[0].frame_id, "scene_1_frame_0_sample_60");

    let none = store
        .query_by_metadata(&MetadataFilter::by_video_name("missing.mp4"), 10)
        .unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_delete_removes_records_and_vectors() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    store
        .insert(&[record(0, 0, 0, 0), record(0, 1, 30, 1)])
        .unwrap();

    let deleted = store.delete(&["scene_0_frame_0_sample_0".to_string()]).unwrap();
    assert_eq!(deleted, 1);
    assert_eq!(store.count().unwrap(), 1);

    // The deleted vector must not come back as a neighbor.
    let matches = store.query_by_vector(&unit_vec(0), 10).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].frame_id, "scene_0_frame_1_sample_30");

    assert_eq!(store.delete(&[]).unwrap(), 0);
}

#[test]
fn test_get_all_and_clear() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);

    store
        .insert(&[record(0, 0, 0, 0), record(0, 1, 30, 1)])
        .unwrap();

    let all = store.get_all().unwrap();
    assert_eq!(all.len(), 2);

    let cleared = store.clear().unwrap();
    assert_eq!(cleared, 2);
    assert_eq!(store.count().unwrap(), 0);
    assert!(store.get_all().unwrap().is_empty());
}

#[test]
fn test_collection_survives_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let store = open_store(&temp);
        store.insert(&[record(0, 0, 0, 5)]).unwrap();
    }

    let reopened = open_store(&temp);
    assert_eq!(reopened.count().unwrap(), 1);

    let matches = reopened.query_by_vector(&unit_vec(5), 1).unwrap();
    assert_eq!(matches[0].frame_id, "scene_0_frame_0_sample_0");
    assert!(matches[0].distance.abs() < 1e-5);
}

#[test]
fn test_collection_info() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    store.insert(&[record(0, 0, 0, 0)]).unwrap();

    let info = store.info().unwrap();
    assert_eq!(info.collection_name, "test_frames");
    assert_eq!(info.total_embeddings, 1);
    assert!(info.db_path.ends_with("test_frames.db"));
}
