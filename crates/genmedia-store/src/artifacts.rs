use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use futures::future::BoxFuture;
use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tracing::{debug, warn};

use genmedia_core::config::StorageConfig;
use genmedia_core::error::{GenmediaError, Result};
use genmedia_core::traits::ArtifactStore;
use genmedia_core::types::*;

use crate::db::{db_err, format_ts, parse_ts, Database};

/// SQLite bound-parameter ceiling is 999 on older builds.
const MAX_IDS_PER_QUERY: usize = 500;

const RECORD_COLUMNS: &str =
    "id, owner_id, kind, mime_type, blob_path, prompt, source, created_at";

/// Artifact library: metadata rows in SQLite, bytes as files under a blob root.
pub struct SqliteArtifactStore {
    db: Arc<Database>,
    blob_root: PathBuf,
    public_base_url: String,
}

impl SqliteArtifactStore {
    pub fn new(db: Arc<Database>, blob_root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            db,
            blob_root: blob_root.into(),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Blobs under `<data_dir>/blobs`, served at `public_base_url`.
    pub fn from_config(db: Arc<Database>, config: &StorageConfig) -> Self {
        Self::new(db, config.data_dir().join("blobs"), &config.public_base_url)
    }

    pub fn blob_root(&self) -> &Path {
        &self.blob_root
    }

    /// Read an artifact's bytes.
    pub async fn read_blob(&self, record: &ArtifactRecord) -> Result<Vec<u8>> {
        tokio::fs::read(self.blob_root.join(&record.blob_path))
            .await
            .map_err(|e| GenmediaError::Storage(format!("read {}: {}", record.blob_path, e)))
    }

    fn locator(&self, blob_path: &str) -> String {
        format!("{}/{}", self.public_base_url, blob_path)
    }

    fn row_to_record(&self, row: &Row<'_>) -> rusqlite::Result<ArtifactRecord> {
        let kind: String = row.get(2)?;
        let source: String = row.get(6)?;
        let blob_path: String = row.get(4)?;
        let created_at: String = row.get(7)?;
        Ok(ArtifactRecord {
            id: ArtifactId(row.get(0)?),
            owner_id: row.get(1)?,
            kind: ArtifactKind::parse(&kind).unwrap_or(ArtifactKind::Image),
            mime_type: row.get(3)?,
            locator: self.locator(&blob_path),
            blob_path,
            prompt: row.get(5)?,
            source: if source == "generated" {
                ArtifactSource::Generated
            } else {
                ArtifactSource::Upload
            },
            created_at: parse_ts(&created_at),
        })
    }

    fn find_by_job(&self, job_id: &str) -> Result<Option<ArtifactId>> {
        let conn = self.db.lock()?;
        conn.query_row(
            "SELECT id FROM artifacts WHERE source_job = ?1",
            params![job_id],
            |row| row.get::<_, String>(0),
        )
        .optional()
        .map(|id| id.map(ArtifactId))
        .map_err(db_err)
    }

    fn fetch(&self, id: &ArtifactId) -> Result<ArtifactRecord> {
        let conn = self.db.lock()?;
        conn.query_row(
            &format!("SELECT {} FROM artifacts WHERE id = ?1", RECORD_COLUMNS),
            params![id.as_str()],
            |row| self.row_to_record(row),
        )
        .optional()
        .map_err(db_err)?
        .ok_or_else(|| GenmediaError::NotFound(format!("Asset {} not found", id)))
    }

    fn fetch_many(&self, ids: &[ArtifactId]) -> Result<HashMap<ArtifactId, ArtifactRecord>> {
        let conn = self.db.lock()?;
        let mut found = HashMap::with_capacity(ids.len());
        for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM artifacts WHERE id IN ({})",
                    RECORD_COLUMNS, placeholders
                ))
                .map_err(db_err)?;
            let rows = stmt
                .query_map(params_from_iter(chunk.iter().map(ArtifactId::as_str)), |row| {
                    self.row_to_record(row)
                })
                .map_err(db_err)?;
            for row in rows {
                let record = row.map_err(db_err)?;
                found.insert(record.id.clone(), record);
            }
        }
        Ok(found)
    }
}

async fn write_blob(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, bytes).await?;
    Ok(())
}

async fn remove_blob(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove blob"),
    }
}

impl ArtifactStore for SqliteArtifactStore {
    fn put(&self, artifact: NewArtifact) -> BoxFuture<'_, Result<ArtifactId>> {
        Box::pin(async move {
            if let Some(job) = &artifact.source_job {
                if let Some(existing) = self.find_by_job(job)? {
                    debug!(
                        job_id = %job,
                        artifact_id = %existing,
                        "Artifact already stored for job"
                    );
                    return Ok(existing);
                }
            }

            let id = ArtifactId::new();
            let (mime_type, ext) = artifact.kind.mime_and_extension(artifact.mime_type.as_deref());
            let blob_path = format!(
                "users/{}/{}s/{}.{}",
                artifact.owner_id, artifact.kind, id, ext
            );
            let path = self.blob_root.join(&blob_path);
            write_blob(&path, &artifact.bytes)
                .await
                .map_err(|e| GenmediaError::Storage(format!("write {}: {}", blob_path, e)))?;

            let inserted = {
                let conn = self.db.lock()?;
                conn.execute(
                    "INSERT INTO artifacts
                        (id, owner_id, kind, mime_type, blob_path, prompt,
                         source, source_job, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                     ON CONFLICT(source_job) DO NOTHING",
                    params![
                        id.as_str(),
                        artifact.owner_id,
                        artifact.kind.as_str(),
                        mime_type,
                        blob_path,
                        artifact.prompt,
                        artifact.source.as_str(),
                        artifact.source_job,
                        format_ts(&Utc::now()),
                    ],
                )
                .map_err(db_err)?
            };

            if inserted == 0 {
                // Lost a race with another writer for the same job.
                remove_blob(&path).await;
                if let Some(job) = &artifact.source_job {
                    if let Some(existing) = self.find_by_job(job)? {
                        return Ok(existing);
                    }
                }
                return Err(GenmediaError::Storage("artifact row was not written".into()));
            }

            debug!(artifact_id = %id, blob_path = %blob_path, "Artifact stored");
            Ok(id)
        })
    }

    fn get(&self, id: &ArtifactId) -> BoxFuture<'_, Result<ArtifactRecord>> {
        let id = id.clone();
        Box::pin(async move { self.fetch(&id) })
    }

    fn delete(&self, id: &ArtifactId) -> BoxFuture<'_, Result<()>> {
        let id = id.clone();
        Box::pin(async move {
            let record = self.fetch(&id)?;
            {
                let conn = self.db.lock()?;
                conn.execute("DELETE FROM artifacts WHERE id = ?1", params![id.as_str()])
                    .map_err(db_err)?;
            }
            remove_blob(&self.blob_root.join(&record.blob_path)).await;
            Ok(())
        })
    }

    fn list(
        &self,
        owner_id: &str,
        kind: Option<ArtifactKind>,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<ArtifactRecord>>> {
        let owner_id = owner_id.to_string();
        Box::pin(async move {
            let conn = self.db.lock()?;
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM artifacts
                     WHERE owner_id = ?1 AND (?2 IS NULL OR kind = ?2)
                     ORDER BY created_at DESC
                     LIMIT ?3",
                    RECORD_COLUMNS
                ))
                .map_err(db_err)?;
            let rows = stmt
                .query_map(
                    params![owner_id, kind.map(ArtifactKind::as_str), limit as i64],
                    |row| self.row_to_record(row),
                )
                .map_err(db_err)?;

            let mut records = Vec::new();
            for row in rows {
                records.push(row.map_err(db_err)?);
            }
            Ok(records)
        })
    }

    /// One `IN (...)` query instead of a lookup per id.
    fn batch_get<'a>(
        &'a self,
        ids: &'a [ArtifactId],
        _concurrency: usize,
    ) -> BoxFuture<'a, HashMap<ArtifactId, Result<ArtifactRecord>>> {
        Box::pin(async move {
            match self.fetch_many(ids) {
                Ok(mut found) => ids
                    .iter()
                    .map(|id| {
                        let outcome = found.remove(id).ok_or_else(|| {
                            GenmediaError::NotFound(format!("Asset {} not found", id))
                        });
                        (id.clone(), outcome)
                    })
                    .collect(),
                Err(e) => {
                    let message = e.to_string();
                    ids.iter()
                        .map(|id| (id.clone(), Err(GenmediaError::Database(message.clone()))))
                        .collect()
                }
            }
        })
    }
}
