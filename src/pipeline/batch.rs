//! Batch thumbnail generation over a bounded worker pool.
//!
//! A batch is one slice of a larger job. Photos are processed in
//! commit-sized chunks: each chunk runs in parallel on the pool, its
//! record upserts land in one transaction, and its count is added to
//! the shared parent job with a guarded SQL increment. Job status is
//! re-read between chunks, so a cancellation takes effect at the next
//! chunk boundary without resurrecting the terminal job.

use rayon::prelude::*;
use serde_json::Value;
use std::time::Duration;

use crate::config::ThumbnailConfig;
use crate::db::{Database, DispatchRow, ThumbnailRecord};
use crate::error::{Error, Result};

use super::store::{ThumbSize, ThumbnailStore};
use super::transform;

/// Per-batch outcome summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchReport {
    pub processed: usize,
    pub failed: usize,
    pub total: usize,
}

struct PhotoOutcome {
    photo_id: i64,
    filename: String,
    result: std::result::Result<Vec<ThumbnailRecord>, Error>,
}

/// Run one batch of a generation job.
///
/// Infrastructure failures (pool construction, a failed commit)
/// propagate as errors and fail the whole job at the call site;
/// per-photo failures are counted and logged without disturbing
/// sibling photos.
pub fn run_batch(
    db: &Database,
    store: &ThumbnailStore,
    config: &ThumbnailConfig,
    job_id: i64,
    photo_ids: &[i64],
    batch_index: usize,
    total_photos: usize,
) -> Result<BatchReport> {
    db.mark_job_running(job_id)?;
    db.set_job_total_if_missing(job_id, total_photos as i64)?;

    // Batch work yields to interactive requests: a fixed pause before
    // each batch keeps CPU and disk bandwidth available for them.
    std::thread::sleep(Duration::from_millis(config.batch_delay_ms));

    let rows = db.dispatch_rows(photo_ids)?;
    let missing = photo_ids.len() - rows.len();
    if missing > 0 {
        tracing::warn!(job_id, batch_index, missing, "photos vanished before dispatch");
        db.add_job_progress(job_id, missing as i64)?;
    }
    if rows.is_empty() {
        db.try_complete_job(job_id)?;
        return Ok(BatchReport {
            processed: 0,
            failed: missing,
            total: photo_ids.len(),
        });
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.workers.max(1))
        .build()
        .map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;

    let mut processed = 0usize;
    let mut failed = missing;
    let mut since_payload_refresh = 0usize;

    for chunk in rows.chunks(config.commit_batch_size.max(1)) {
        // A terminal job (cancelled or failed elsewhere) stops the
        // batch at the next chunk boundary.
        let status = db.get_job_status(job_id)?;
        if status.status.is_terminal() {
            tracing::info!(
                job_id,
                batch_index,
                status = status.status.as_str(),
                "job is terminal, abandoning remaining photos"
            );
            break;
        }

        let outcomes: Vec<PhotoOutcome> = pool.install(|| {
            chunk
                .par_iter()
                .map(|row| process_photo(db, store, row))
                .collect()
        });

        let mut records = Vec::new();
        let mut current_file = None;
        for outcome in &outcomes {
            current_file = Some(outcome.filename.clone());
            match &outcome.result {
                Ok(photo_records) => {
                    records.extend(photo_records.iter().cloned());
                    processed += 1;
                }
                Err(e) => {
                    failed += 1;
                    tracing::error!(photo_id = outcome.photo_id, error = %e, "thumbnail generation failed");
                }
            }
        }

        db.upsert_thumbnails(&records)?;
        db.add_job_progress(job_id, outcomes.len() as i64)?;

        since_payload_refresh += outcomes.len();
        if since_payload_refresh >= config.progress_interval.max(1) {
            since_payload_refresh = 0;
            db.merge_job_payload(
                job_id,
                &[
                    ("workerCount", Value::from(config.workers as u64)),
                    ("processedCount", Value::from(processed as u64)),
                    ("failedCount", Value::from(failed as u64)),
                    (
                        "currentFile",
                        current_file.map(Value::String).unwrap_or(Value::Null),
                    ),
                ],
            )?;
        }
    }

    db.merge_job_payload(
        job_id,
        &[
            ("workerCount", Value::from(config.workers as u64)),
            ("processedCount", Value::from(processed as u64)),
            ("failedCount", Value::from(failed as u64)),
        ],
    )?;
    db.try_complete_job(job_id)?;

    tracing::info!(
        job_id,
        batch_index,
        processed,
        failed,
        "thumbnail batch finished"
    );

    Ok(BatchReport {
        processed,
        failed,
        total: photo_ids.len(),
    })
}

/// Transform and persist all sizes for one photo.
///
/// The dispatch row was read at batch start; after generating under
/// that rotation version the current version is re-read, and a write
/// that turned stale mid-flight is discarded — the edit that bumped
/// the version enqueued its own regeneration.
fn process_photo(db: &Database, store: &ThumbnailStore, row: &DispatchRow) -> PhotoOutcome {
    let filename = std::path::Path::new(&row.path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| row.path.clone());

    let result = generate_all_sizes(db, store, row);
    PhotoOutcome {
        photo_id: row.photo_id,
        filename,
        result,
    }
}

/// Shared by batch workers and single-photo regeneration.
pub(crate) fn generate_all_sizes(
    db: &Database,
    store: &ThumbnailStore,
    row: &DispatchRow,
) -> std::result::Result<Vec<ThumbnailRecord>, Error> {
    let rendered = transform::render(
        std::path::Path::new(&row.path),
        row.exif_orientation,
        row.user_rotation,
    )?;

    let mut records = Vec::with_capacity(ThumbSize::ALL.len());
    for size in ThumbSize::ALL {
        let artifact = store.put(row.photo_id, size, row.rotation_version, &rendered)?;
        records.push(ThumbnailRecord {
            photo_id: row.photo_id,
            size: size.as_str().to_string(),
            format: "jpeg".to_string(),
            filepath: artifact.path.to_string_lossy().to_string(),
            file_size: artifact.file_size as i64,
            width: artifact.width,
            height: artifact.height,
            rotation_version: row.rotation_version,
        });
    }

    let current = db.rotation_version(row.photo_id)?;
    if current != row.rotation_version {
        store.discard_version(row.photo_id, row.rotation_version);
        return Err(Error::StaleVersion {
            photo_id: row.photo_id,
            expected: row.rotation_version,
            actual: current,
        });
    }

    Ok(records)
}
