//! Thumbnail pipeline: composition of the catalog, the artifact store,
//! the work queue, and the batch workers.
//!
//! This is the surface the rest of the application talks to: fan out a
//! generation job, edit a rotation, resolve an artifact, poll or
//! cancel a job.

pub mod batch;
pub mod queue;
pub mod store;
pub mod transform;

use serde_json::Value;
use std::sync::Arc;

use crate::config::ThumbnailConfig;
use crate::db::{Database, JobKind, JobStatus, RotationOutcome};
use crate::error::{Error, Result};

pub use batch::{run_batch, BatchReport};
pub use queue::{JobQueue, MemoryQueue, Task};
pub use queue::{PRIORITY_BATCH, PRIORITY_INTERACTIVE, PRIORITY_ON_DEMAND};
pub use store::{ArtifactRef, ThumbSize, ThumbnailStore};

/// Result of a synchronous single-photo regeneration.
#[derive(Debug, Clone, Copy)]
pub struct RegenOutcome {
    pub photo_id: i64,
    pub rotation_version: i64,
}

pub struct Pipeline {
    db: Arc<Database>,
    store: ThumbnailStore,
    queue: Arc<dyn JobQueue>,
    config: ThumbnailConfig,
}

impl Pipeline {
    pub fn new(db: Arc<Database>, queue: Arc<dyn JobQueue>, config: ThumbnailConfig) -> Self {
        let store = ThumbnailStore::new(&config);
        Self {
            db,
            store,
            queue,
            config,
        }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn store(&self) -> &ThumbnailStore {
        &self.store
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    /// Create a generation job for the given photos and fan it out
    /// into worker-pool batches. Returns the parent job id.
    pub fn enqueue_batch_job(&self, photo_ids: Vec<i64>) -> Result<i64> {
        let job_id = self.db.create_job(
            JobKind::ThumbnailGeneration,
            PRIORITY_BATCH as i32,
            Some(photo_ids.len() as i64),
        )?;

        if photo_ids.is_empty() {
            self.db.complete_empty_job(job_id, "No photos to process")?;
            return Ok(job_id);
        }

        self.db.merge_job_payload(
            job_id,
            &[("workerCount", Value::from(self.config.workers as u64))],
        )?;

        let total_photos = photo_ids.len();
        for (batch_index, chunk) in photo_ids.chunks(self.config.batch_size.max(1)).enumerate() {
            self.queue.enqueue(
                Task::GenerateBatch {
                    job_id,
                    photo_ids: chunk.to_vec(),
                    batch_index,
                    total_photos,
                },
                PRIORITY_BATCH,
            );
        }

        tracing::info!(
            job_id,
            total_photos,
            batches = total_photos.div_ceil(self.config.batch_size.max(1)),
            "enqueued thumbnail generation job"
        );
        Ok(job_id)
    }

    /// Regenerate thumbnails library-wide: every photo when `force`,
    /// otherwise only photos with no thumbnail records yet.
    pub fn regenerate_all(&self, force: bool) -> Result<i64> {
        let photo_ids = if force {
            self.db.all_photo_ids()?
        } else {
            self.db.photo_ids_missing_thumbnails()?
        };
        self.enqueue_batch_job(photo_ids)
    }

    /// Queue a single-photo regeneration. Fire-and-forget: rotation
    /// edits use `PRIORITY_INTERACTIVE`, cache misses
    /// `PRIORITY_ON_DEMAND`.
    pub fn request_single_regeneration(&self, photo_id: i64, priority: u8) {
        self.queue
            .enqueue(Task::RegeneratePhoto { photo_id }, priority);
    }

    /// Apply a user rotation edit.
    ///
    /// Validation happens before any mutation; the write itself is a
    /// single atomic statement bumping `rotation_version` by exactly
    /// one. The bump is visible immediately — the regeneration it
    /// triggers is queued, not awaited.
    pub fn set_rotation(&self, photo_id: i64, rotation: i32) -> Result<RotationOutcome> {
        if !matches!(rotation, 0 | 90 | 180 | 270) {
            return Err(Error::InvalidRotation(rotation));
        }

        let outcome = self.db.set_user_rotation(photo_id, rotation)?;
        self.request_single_regeneration(photo_id, PRIORITY_INTERACTIVE);

        tracing::info!(
            photo_id,
            rotation,
            final_rotation = outcome.final_rotation,
            rotation_version = outcome.rotation_version,
            "rotation updated, regeneration queued"
        );
        Ok(outcome)
    }

    /// Resolve an artifact: versioned file first, then the legacy
    /// un-versioned file, then synchronous on-demand generation, then
    /// NotFound. A stale version is never served as current.
    pub fn get_artifact(
        &self,
        photo_id: i64,
        size: ThumbSize,
        version_hint: Option<i64>,
    ) -> Result<Vec<u8>> {
        let photo = self.db.get_photo(photo_id)?;
        let current = photo.rotation_version;
        let version = version_hint.unwrap_or(current);

        if let Some(bytes) = self.store.read_versioned(photo_id, size, version) {
            return Ok(bytes);
        }

        // A hinted historical version either exists or it doesn't;
        // fallbacks only apply to the current version.
        if version != current {
            return Err(Error::not_found(format!(
                "artifact {photo_id}/{} v{version}",
                size.as_str()
            )));
        }

        if let Some(bytes) = self.store.read_legacy(photo_id, size) {
            return Ok(bytes);
        }

        match self.regenerate_photo(photo_id) {
            Ok(outcome) => self
                .store
                .read_versioned(photo_id, size, outcome.rotation_version)
                .ok_or_else(|| {
                    Error::not_found(format!("artifact {photo_id}/{}", size.as_str()))
                }),
            Err(e) => {
                tracing::warn!(photo_id, error = %e, "on-demand generation failed");
                Err(Error::not_found(format!(
                    "artifact {photo_id}/{}",
                    size.as_str()
                )))
            }
        }
    }

    /// Synchronous single-photo regeneration at the photo's current
    /// rotation version. Safe to race batch generation for the same
    /// photo: records are upserts and content is deterministic per
    /// version.
    pub fn regenerate_photo(&self, photo_id: i64) -> Result<RegenOutcome> {
        let mut rows = self.db.dispatch_rows(&[photo_id])?;
        let row = rows
            .pop()
            .ok_or_else(|| Error::not_found(format!("photo {photo_id}")))?;

        let records = batch::generate_all_sizes(&self.db, &self.store, &row)?;
        self.db.upsert_thumbnails(&records)?;

        Ok(RegenOutcome {
            photo_id,
            rotation_version: row.rotation_version,
        })
    }

    pub fn get_job_status(&self, job_id: i64) -> Result<JobStatus> {
        self.db.get_job_status(job_id)
    }

    pub fn cancel_job(&self, job_id: i64) -> Result<()> {
        self.db.cancel_job(job_id)
    }

    /// Execute one dequeued task. Batch-level infrastructure errors
    /// fail the parent job; single-photo regeneration failures are
    /// logged only (their callers are fire-and-forget).
    pub fn run_task(&self, task: Task) {
        match task {
            Task::GenerateBatch {
                job_id,
                photo_ids,
                batch_index,
                total_photos,
            } => {
                let result = run_batch(
                    &self.db,
                    &self.store,
                    &self.config,
                    job_id,
                    &photo_ids,
                    batch_index,
                    total_photos,
                );
                if let Err(e) = result {
                    tracing::error!(job_id, batch_index, error = %e, "batch failed");
                    if let Err(e) = self.db.fail_job(job_id, &e.to_string()) {
                        tracing::error!(job_id, error = %e, "could not record job failure");
                    }
                }
            }
            Task::RegeneratePhoto { photo_id } => {
                match self.regenerate_photo(photo_id) {
                    Ok(outcome) => tracing::info!(
                        photo_id,
                        rotation_version = outcome.rotation_version,
                        "regenerated thumbnails"
                    ),
                    Err(e) => tracing::error!(photo_id, error = %e, "regeneration failed"),
                }
            }
        }
    }

    /// Process queued tasks until the queue is empty. Returns the
    /// number of tasks executed.
    pub fn drain_queue(&self) -> usize {
        let mut executed = 0;
        while let Some(task) = self.queue.try_dequeue() {
            self.run_task(task);
            executed += 1;
        }
        executed
    }

    /// Consume the queue until it is closed. Intended for dedicated
    /// worker threads.
    pub fn run_until_closed(&self) {
        while let Some(task) = self.queue.dequeue() {
            self.run_task(task);
        }
    }
}
