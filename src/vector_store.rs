//! Persistent embedding collection backed by SQLite + sqlite-vec.
//!
//! A collection is one database file under the storage root:
//! `frames` holds the id and provenance metadata columns, and
//! `frame_vectors` is a vec0 virtual table holding the embeddings.
//! The vec0 extension only supports vectors and implicit rowids, so the two
//! tables are joined by rowid, with `frames.id` as the bridge.
//!
//! Duplicate-id policy is upsert: re-inserting an existing frame id replaces
//! its metadata row and vector, so re-indexing a video with identical
//! sampling parameters leaves the collection count unchanged.

use std::path::{Path, PathBuf};
use std::sync::Once;

use log::info;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use serde::Serialize;
use zerocopy::IntoBytes;

use crate::frame_record::{FrameMetadata, FrameRecord};

/// Native output dimensionality of the CLIP ViT-B/32 encoder.
pub const EMBEDDING_DIM: usize = 512;

const FRAMES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS frames (
    id INTEGER PRIMARY KEY,
    frame_id TEXT UNIQUE NOT NULL,
    video_path TEXT NOT NULL,
    video_name TEXT NOT NULL,
    scene_idx INTEGER NOT NULL,
    frame_idx INTEGER NOT NULL,
    frame_sample INTEGER NOT NULL
)
"#;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("store write failed for '{id}': {source}")]
    Write {
        id: String,
        #[source]
        source: rusqlite::Error,
    },

    #[error("store query failed: {0}")]
    Query(#[from] rusqlite::Error),

    #[error("embedding for '{id}' has {got} dimensions, expected {expected}")]
    Dimension {
        id: String,
        got: usize,
        expected: usize,
    },
}

impl From<r2d2::Error> for StoreError {
    fn from(err: r2d2::Error) -> Self {
        StoreError::Connection(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a bulk insert. An empty input is a no-op reported distinctly
/// from success so callers can tell "nothing to insert" from "insert failed".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(usize),
    NothingToInsert,
}

/// A nearest-neighbor match, ordered by ascending cosine distance.
#[derive(Debug, Clone)]
pub struct FrameMatch {
    pub frame_id: String,
    pub distance: f32,
    pub metadata: FrameMetadata,
}

impl FrameMatch {
    /// Cosine distance is `1 - cos(a, b)` on normalized vectors, so this is
    /// the raw cosine similarity.
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

/// A stored record returned by metadata queries. Metadata lookups involve no
/// query vector, so there is no distance to report.
#[derive(Debug, Clone)]
pub struct StoredFrame {
    pub frame_id: String,
    pub metadata: FrameMetadata,
}

/// Equality predicates over metadata fields; unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct MetadataFilter {
    pub video_path: Option<String>,
    pub video_name: Option<String>,
    pub scene_idx: Option<u32>,
    pub frame_idx: Option<u32>,
    pub frame_sample: Option<u64>,
}

impl MetadataFilter {
    pub fn by_video_name(video_name: &str) -> Self {
        MetadataFilter {
            video_name: Some(video_name.to_string()),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub collection_name: String,
    pub total_embeddings: u64,
    pub db_path: PathBuf,
}

static VEC_EXTENSION: Once = Once::new();

// sqlite-vec registers vec0 and the vec_distance_* functions on every new
// connection once hooked in as an auto extension.
fn register_vec_extension() {
    VEC_EXTENSION.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute::<
            *const (),
            unsafe extern "C" fn(
                *mut rusqlite::ffi::sqlite3,
                *mut *mut std::os::raw::c_char,
                *const rusqlite::ffi::sqlite3_api_routines,
            ) -> std::os::raw::c_int,
        >(sqlite_vec::sqlite3_vec_init as *const ())));
    });
}

fn initialize_schema(conn: &rusqlite::Connection) -> rusqlite::Result<()> {
    conn.execute(FRAMES_TABLE, [])?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_frames_video_name ON frames(video_name)",
        [],
    )?;
    conn.execute(
        &format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS frame_vectors USING vec0(embedding float[{}])",
            EMBEDDING_DIM
        ),
        [],
    )?;
    Ok(())
}

/// Adapter over the persistent vector collection.
pub struct EmbeddingStore {
    pool: Pool<SqliteConnectionManager>,
    collection_name: String,
    db_path: PathBuf,
}

impl EmbeddingStore {
    /// Opens (or creates) the collection `<data_path>/<collection_name>.db`.
    pub fn open(data_path: &Path, collection_name: &str) -> StoreResult<Self> {
        register_vec_extension();

        std::fs::create_dir_all(data_path)
            .map_err(|e| StoreError::Connection(format!("cannot create {}: {}", data_path.display(), e)))?;

        let db_path = data_path.join(format!("{}.db", collection_name));
        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::new(manager)?;

        {
            let conn = pool.get()?;
            // WAL and a busy timeout so transient locks are waited on instead
            // of failing immediately.
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA temp_store = MEMORY;
                 PRAGMA busy_timeout = 5000;",
            )?;
            initialize_schema(&conn)?;
        }

        let store = EmbeddingStore {
            pool,
            collection_name: collection_name.to_string(),
            db_path,
        };

        info!(
            "Collection '{}' ready with {} embeddings",
            store.collection_name,
            store.count()?
        );

        Ok(store)
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    /// Bulk-inserts frame records, upserting on duplicate ids.
    pub fn insert(&self, records: &[FrameRecord]) -> StoreResult<InsertOutcome> {
        if records.is_empty() {
            info!("No embeddings to insert - skipping store update");
            return Ok(InsertOutcome::NothingToInsert);
        }

        for record in records {
            if record.embedding.len() != EMBEDDING_DIM {
                return Err(StoreError::Dimension {
                    id: record.id.clone(),
                    got: record.embedding.len(),
                    expected: EMBEDDING_DIM,
                });
            }
        }

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        for record in records {
            let row_id: i64 = tx
                .query_row(
                    "INSERT INTO frames (frame_id, video_path, video_name, scene_idx, frame_idx, frame_sample)
                     VALUES (?, ?, ?, ?, ?, ?)
                     ON CONFLICT(frame_id) DO UPDATE SET
                         video_path = excluded.video_path,
                         video_name = excluded.video_name,
                         scene_idx = excluded.scene_idx,
                         frame_idx = excluded.frame_idx,
                         frame_sample = excluded.frame_sample
                     RETURNING id",
                    params![
                        record.id,
                        record.metadata.video_path,
                        record.metadata.video_name,
                        record.metadata.scene_idx,
                        record.metadata.frame_idx,
                        record.metadata.frame_sample as i64,
                    ],
                    |row| row.get(0),
                )
                .map_err(|e| StoreError::Write {
                    id: record.id.clone(),
                    source: e,
                })?;

            tx.execute(
                "INSERT OR REPLACE INTO frame_vectors (rowid, embedding) VALUES (?, ?)",
                params![row_id, record.embedding.as_slice().as_bytes()],
            )
            .map_err(|e| StoreError::Write {
                id: record.id.clone(),
                source: e,
            })?;
        }

        tx.commit()?;

        info!(
            "Inserted {} embeddings into '{}'",
            records.len(),
            self.collection_name
        );

        Ok(InsertOutcome::Inserted(records.len()))
    }

    /// Nearest `k` records by cosine distance, ascending.
    pub fn query_by_vector(&self, vector: &[f32], k: usize) -> StoreResult<Vec<FrameMatch>> {
        if vector.len() != EMBEDDING_DIM {
            return Err(StoreError::Dimension {
                id: "<query>".to_string(),
                got: vector.len(),
                expected: EMBEDDING_DIM,
            });
        }

        let vector_bytes = vector.as_bytes().to_vec();
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT f.frame_id, vec_distance_cosine(v.embedding, ?) AS distance,
                    f.video_path, f.video_name, f.scene_idx, f.frame_idx, f.frame_sample
             FROM frame_vectors v
             JOIN frames f ON f.id = v.rowid
             ORDER BY distance
             LIMIT ?",
        )?;

        let matches = stmt
            .query_map(params![&vector_bytes, k as i64], |row| {
                Ok(FrameMatch {
                    frame_id: row.get(0)?,
                    distance: row.get(1)?,
                    metadata: FrameMetadata {
                        video_path: row.get(2)?,
                        video_name: row.get(3)?,
                        scene_idx: row.get(4)?,
                        frame_idx: row.get(5)?,
                        frame_sample: row.get::<_, i64>(6)? as u64,
                    },
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(matches)
    }

    /// Records matching every set field of the filter.
    pub fn query_by_metadata(
        &self,
        filter: &MetadataFilter,
        limit: usize,
    ) -> StoreResult<Vec<StoredFrame>> {
        let mut where_clause = String::from(" WHERE 1=1");
        let mut bound: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if let Some(ref video_path) = filter.video_path {
            where_clause.push_str(" AND video_path = ?");
            bound.push(Box::new(video_path.clone()));
        }
        if let Some(ref video_name) = filter.video_name {
            where_clause.push_str(" AND video_name = ?");
            bound.push(Box::new(video_name.clone()));
        }
        if let Some(scene_idx) = filter.scene_idx {
            where_clause.push_str(" AND scene_idx = ?");
            bound.push(Box::new(scene_idx));
        }
        if let Some(frame_idx) = filter.frame_idx {
            where_clause.push_str(" AND frame_idx = ?");
            bound.push(Box::new(frame_idx));
        }
        if let Some(frame_sample) = filter.frame_sample {
            where_clause.push_str(" AND frame_sample = ?");
            bound.push(Box::new(frame_sample as i64));
        }
        bound.push(Box::new(limit as i64));

        let sql = format!(
            "SELECT frame_id, video_path, video_name, scene_idx, frame_idx, frame_sample
             FROM frames{} ORDER BY id LIMIT ?",
            where_clause
        );

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = bound.iter().map(|p| p.as_ref()).collect();

        let frames = stmt
            .query_map(param_refs.as_slice(), Self::stored_frame_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(frames)
    }

    /// Deletes records by frame id; returns how many rows were removed.
    pub fn delete(&self, ids: &[String]) -> StoreResult<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let placeholders = ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let param_refs: Vec<&dyn rusqlite::ToSql> =
            ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();

        tx.execute(
            &format!(
                "DELETE FROM frame_vectors WHERE rowid IN
                 (SELECT id FROM frames WHERE frame_id IN ({}))",
                placeholders
            ),
            param_refs.as_slice(),
        )?;
        let deleted = tx.execute(
            &format!("DELETE FROM frames WHERE frame_id IN ({})", placeholders),
            param_refs.as_slice(),
        )?;

        tx.commit()?;

        info!("Deleted {} embeddings from '{}'", deleted, self.collection_name);
        Ok(deleted)
    }

    pub fn count(&self) -> StoreResult<u64> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM frames", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    pub fn get_all(&self) -> StoreResult<Vec<StoredFrame>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT frame_id, video_path, video_name, scene_idx, frame_idx, frame_sample
             FROM frames ORDER BY id",
        )?;
        let frames = stmt
            .query_map([], Self::stored_frame_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(frames)
    }

    /// Removes every record from the collection.
    pub fn clear(&self) -> StoreResult<usize> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM frame_vectors WHERE rowid IN (SELECT id FROM frames)",
            [],
        )?;
        let deleted = tx.execute("DELETE FROM frames", [])?;
        tx.commit()?;

        info!("Cleared {} embeddings from '{}'", deleted, self.collection_name);
        Ok(deleted)
    }

    pub fn info(&self) -> StoreResult<CollectionInfo> {
        Ok(CollectionInfo {
            collection_name: self.collection_name.clone(),
            total_embeddings: self.count()?,
            db_path: self.db_path.clone(),
        })
    }

    fn stored_frame_from_row(row: &rusqlite::Row) -> rusqlite::Result<StoredFrame> {
        Ok(StoredFrame {
            frame_id: row.get(0)?,
            metadata: FrameMetadata {
                video_path: row.get(1)?,
                video_name: row.get(2)?,
                scene_idx: row.get(3)?,
                frame_idx: row.get(4)?,
                frame_sample: row.get::<_, i64>(5)? as u64,
            },
        })
    }
}
