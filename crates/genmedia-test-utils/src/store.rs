use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;

use genmedia_core::error::{GenmediaError, Result};
use genmedia_core::traits::ArtifactStore;
use genmedia_core::types::*;

/// In-memory artifact store with failure injection.
#[derive(Default)]
pub struct MemoryArtifactStore {
    records: Mutex<HashMap<ArtifactId, ArtifactRecord>>,
    blobs: Mutex<HashMap<ArtifactId, Vec<u8>>>,
    by_job: Mutex<HashMap<String, ArtifactId>>,
    broken_ids: Mutex<HashSet<ArtifactId>>,
    fail_puts: AtomicBool,
    get_delay: Mutex<Option<Duration>>,
    put_delay: Mutex<Option<Duration>>,
    put_calls: AtomicU32,
    get_calls: AtomicU32,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MemoryArtifactStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `put` fail with a storage error.
    pub fn failing_puts(self) -> Self {
        self.fail_puts.store(true, Ordering::SeqCst);
        self
    }

    /// Make `get` for `id` fail as if the backend were unreachable.
    pub fn break_id(&self, id: impl Into<String>) {
        self.broken_ids.lock().unwrap().insert(ArtifactId(id.into()));
    }

    /// Hold every `get` for `delay`, so concurrent lookups overlap.
    pub fn with_get_delay(self, delay: Duration) -> Self {
        *self.get_delay.lock().unwrap() = Some(delay);
        self
    }

    /// Hold every `put` for `delay` before it writes anything.
    pub fn with_put_delay(self, delay: Duration) -> Self {
        *self.put_delay.lock().unwrap() = Some(delay);
        self
    }

    /// Seed a record directly.
    pub fn insert(&self, id: &str, kind: ArtifactKind, owner_id: &str) -> ArtifactRecord {
        let (mime_type, ext) = kind.mime_and_extension(None);
        let blob_path = format!("users/{}/{}s/{}.{}", owner_id, kind, id, ext);
        let record = ArtifactRecord {
            id: ArtifactId::from(id),
            owner_id: owner_id.to_string(),
            kind,
            mime_type,
            locator: format!("mem://{}", blob_path),
            blob_path,
            prompt: None,
            source: ArtifactSource::Upload,
            created_at: Utc::now(),
        };
        self.records
            .lock()
            .unwrap()
            .insert(record.id.clone(), record.clone());
        record
    }

    pub fn put_calls(&self) -> u32 {
        self.put_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> u32 {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// Highest number of `get` calls observed in flight at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn blob(&self, id: &ArtifactId) -> Option<Vec<u8>> {
        self.blobs.lock().unwrap().get(id).cloned()
    }
}

impl ArtifactStore for MemoryArtifactStore {
    fn put(&self, artifact: NewArtifact) -> BoxFuture<'_, Result<ArtifactId>> {
        Box::pin(async move {
            self.put_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.put_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            if self.fail_puts.load(Ordering::SeqCst) {
                return Err(GenmediaError::Storage("injected put failure".into()));
            }
            if let Some(job) = &artifact.source_job {
                if let Some(existing) = self.by_job.lock().unwrap().get(job) {
                    return Ok(existing.clone());
                }
            }

            let id = ArtifactId::new();
            let (mime_type, ext) = artifact.kind.mime_and_extension(artifact.mime_type.as_deref());
            let blob_path = format!(
                "users/{}/{}s/{}.{}",
                artifact.owner_id, artifact.kind, id, ext
            );
            let record = ArtifactRecord {
                id: id.clone(),
                owner_id: artifact.owner_id,
                kind: artifact.kind,
                mime_type,
                locator: format!("mem://{}", blob_path),
                blob_path,
                prompt: artifact.prompt,
                source: artifact.source,
                created_at: Utc::now(),
            };
            self.records.lock().unwrap().insert(id.clone(), record);
            self.blobs.lock().unwrap().insert(id.clone(), artifact.bytes);
            if let Some(job) = artifact.source_job {
                self.by_job.lock().unwrap().insert(job, id.clone());
            }
            Ok(id)
        })
    }

    fn get(&self, id: &ArtifactId) -> BoxFuture<'_, Result<ArtifactRecord>> {
        let id = id.clone();
        Box::pin(async move {
            self.get_calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = *self.get_delay.lock().unwrap();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let outcome = if self.broken_ids.lock().unwrap().contains(&id) {
                Err(GenmediaError::Storage(format!("backend unreachable for {}", id)))
            } else {
                self.records
                    .lock()
                    .unwrap()
                    .get(&id)
                    .cloned()
                    .ok_or_else(|| GenmediaError::NotFound(format!("Asset {} not found", id)))
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            outcome
        })
    }

    fn delete(&self, id: &ArtifactId) -> BoxFuture<'_, Result<()>> {
        let id = id.clone();
        Box::pin(async move {
            match self.records.lock().unwrap().remove(&id) {
                Some(_) => {
                    self.blobs.lock().unwrap().remove(&id);
                    Ok(())
                }
                None => Err(GenmediaError::NotFound(format!("Asset {} not found", id))),
            }
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
            let mut records: Vec<ArtifactRecord> = self
                .records
                .lock()
                .unwrap()
                .values()
                .filter(|r| r.owner_id == owner_id && kind.map_or(true, |k| r.kind == k))
                .cloned()
                .collect();
            records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            records.truncate(limit);
            Ok(records)
        })
    }
}
