//! Library ingest: walk the source tree, dedup by content hash,
//! create photo records, and hand newly ingested photos to the
//! thumbnail pipeline.

pub mod discovery;
pub mod hashing;
pub mod metadata;

use std::path::{Path, PathBuf};
use std::sync::mpsc;

use crate::config::LibraryConfig;
use crate::db::{exif_orientation_to_degrees, JobKind, NewPhoto};
use crate::error::Result;
use crate::pipeline::Pipeline;

pub use discovery::discover_images;
pub use hashing::HashResult;
pub use metadata::ImageMetadata;

/// Files between scan-job progress flushes.
const PROGRESS_FLUSH: usize = 10;

#[derive(Debug, Clone)]
pub enum ScanProgress {
    Started {
        total_files: usize,
    },
    Scanning {
        current: usize,
        total: usize,
        path: String,
    },
    Completed {
        new: usize,
        known: usize,
        errors: usize,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone)]
pub struct ScanResult {
    pub total_found: usize,
    /// Photos inserted for the first time.
    pub new: usize,
    /// Files whose content hash was already in the catalog.
    pub known: usize,
    pub errors: usize,
    pub scan_job_id: i64,
    /// Parent job of the queued thumbnail batches, when anything new
    /// was ingested.
    pub generation_job_id: Option<i64>,
}

enum IngestOutcome {
    New(i64),
    Known,
}

pub struct Scanner {
    config: LibraryConfig,
}

impl Scanner {
    pub fn new(config: LibraryConfig) -> Self {
        Self { config }
    }

    /// Walk the configured source tree and ingest everything it finds.
    ///
    /// Per-file failures are reported over the progress channel and
    /// counted; they never abort the scan. Newly ingested photos are
    /// fanned out into thumbnail batches on the pipeline's queue.
    pub fn scan(
        &self,
        pipeline: &Pipeline,
        progress_tx: Option<mpsc::Sender<ScanProgress>>,
    ) -> Result<ScanResult> {
        let paths = discover_images(&self.config.source_dir, &self.config.image_extensions)?;
        let total = paths.len();

        let db = pipeline.db();
        let scan_job_id = db.create_job(JobKind::Scan, 0, Some(total as i64))?;
        db.mark_job_running(scan_job_id)?;

        if let Some(ref tx) = progress_tx {
            let _ = tx.send(ScanProgress::Started { total_files: total });
        }

        let mut new_ids = Vec::new();
        let mut known = 0usize;
        let mut errors = 0usize;
        let mut since_flush = 0usize;

        for (index, path) in paths.iter().enumerate() {
            if let Some(ref tx) = progress_tx {
                let _ = tx.send(ScanProgress::Scanning {
                    current: index + 1,
                    total,
                    path: path.to_string_lossy().to_string(),
                });
            }

            match self.ingest_file(pipeline, path) {
                Ok(IngestOutcome::New(id)) => new_ids.push(id),
                Ok(IngestOutcome::Known) => known += 1,
                Err(e) => {
                    errors += 1;
                    tracing::error!(path = %path.display(), error = %e, "scan error");
                    if let Some(ref tx) = progress_tx {
                        let _ = tx.send(ScanProgress::Error {
                            message: format!("Error scanning {}: {}", path.display(), e),
                        });
                    }
                }
            }

            since_flush += 1;
            if since_flush >= PROGRESS_FLUSH {
                db.add_job_progress(scan_job_id, since_flush as i64)?;
                db.merge_job_payload(
                    scan_job_id,
                    &[(
                        "currentFile",
                        serde_json::Value::String(path.to_string_lossy().to_string()),
                    )],
                )?;
                since_flush = 0;
            }
        }

        if since_flush > 0 {
            db.add_job_progress(scan_job_id, since_flush as i64)?;
        }
        db.try_complete_job(scan_job_id)?;

        let generation_job_id = if new_ids.is_empty() {
            None
        } else {
            Some(pipeline.enqueue_batch_job(new_ids.clone())?)
        };

        if let Some(ref tx) = progress_tx {
            let _ = tx.send(ScanProgress::Completed {
                new: new_ids.len(),
                known,
                errors,
            });
        }

        tracing::info!(
            total,
            new = new_ids.len(),
            known,
            errors,
            "scan finished"
        );

        Ok(ScanResult {
            total_found: total,
            new: new_ids.len(),
            known,
            errors,
            scan_job_id,
            generation_job_id,
        })
    }

    fn ingest_file(&self, pipeline: &Pipeline, path: &PathBuf) -> Result<IngestOutcome> {
        let db = pipeline.db();
        let file_meta = std::fs::metadata(path)?;
        let hashes = hashing::calculate_hashes(path)?;

        let filename = file_name(path);
        let directory = parent_dir(path);
        let path_str = path.to_string_lossy().to_string();

        // Dedup by content: a known hash means the photo is already in
        // the catalog, possibly under an old path.
        if let Some(existing) = db.find_photo_by_hash(&hashes.sha256)? {
            db.touch_photo(existing, &path_str, &filename, &directory)?;
            return Ok(IngestOutcome::Known);
        }

        let meta = metadata::extract_metadata(path);
        let orientation = meta.orientation.map(i32::from);
        let photo = NewPhoto {
            path: path_str,
            filename,
            directory,
            size_bytes: file_meta.len() as i64,
            width: meta.width,
            height: meta.height,
            format: meta.format,
            camera_make: meta.camera_make,
            camera_model: meta.camera_model,
            taken_at: meta.taken_at,
            md5_hash: Some(hashes.md5),
            file_hash: hashes.sha256,
            exif_orientation: orientation,
            rotation_applied: exif_orientation_to_degrees(orientation.unwrap_or(1)),
        };

        let id = db.insert_photo(&photo)?;
        Ok(IngestOutcome::New(id))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn parent_dir(path: &Path) -> String {
    path.parent()
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ThumbnailConfig;
    use crate::db::{Database, JobState};
    use crate::pipeline::MemoryQueue;
    use image::{Rgb, RgbImage};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn write_image(path: &Path, seed: u8) {
        let mut img = RgbImage::new(16, 16);
        for pixel in img.pixels_mut() {
            *pixel = Rgb([seed, seed.wrapping_add(10), 50]);
        }
        img.save(path).unwrap();
    }

    fn pipeline(cache: &Path) -> Pipeline {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        let config = ThumbnailConfig {
            path: cache.to_path_buf(),
            workers: 2,
            batch_size: 2,
            batch_delay_ms: 0,
            ..ThumbnailConfig::default()
        };
        Pipeline::new(Arc::new(db), Arc::new(MemoryQueue::new()), config)
    }

    fn scanner(source: &Path) -> Scanner {
        Scanner::new(LibraryConfig {
            source_dir: source.to_path_buf(),
            image_extensions: vec!["jpg".to_string(), "png".to_string()],
        })
    }

    #[test]
    fn scan_ingests_and_enqueues_generation() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("library");
        std::fs::create_dir_all(&source).unwrap();
        write_image(&source.join("a.png"), 1);
        write_image(&source.join("b.png"), 2);
        std::fs::write(source.join("notes.txt"), b"skip me").unwrap();

        let pipeline = pipeline(&dir.path().join("thumbs"));
        let result = scanner(&source).scan(&pipeline, None).unwrap();

        assert_eq!(result.total_found, 2);
        assert_eq!(result.new, 2);
        assert_eq!(result.known, 0);
        assert_eq!(result.errors, 0);

        let scan_status = pipeline.get_job_status(result.scan_job_id).unwrap();
        assert_eq!(scan_status.status, JobState::Completed);

        // Generation was queued for the new photos.
        let generation = result.generation_job_id.unwrap();
        pipeline.drain_queue();
        let status = pipeline.get_job_status(generation).unwrap();
        assert_eq!(status.status, JobState::Completed);
        assert_eq!(status.processed_items, 2);
    }

    #[test]
    fn rescan_dedups_by_content_hash() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("library");
        std::fs::create_dir_all(&source).unwrap();
        write_image(&source.join("a.png"), 1);

        let pipeline = pipeline(&dir.path().join("thumbs"));
        let scanner = scanner(&source);

        let first = scanner.scan(&pipeline, None).unwrap();
        assert_eq!(first.new, 1);

        // Same content under a second name: recognized, not duplicated.
        std::fs::copy(source.join("a.png"), source.join("copy.png")).unwrap();
        let second = scanner.scan(&pipeline, None).unwrap();
        assert_eq!(second.new, 0);
        assert_eq!(second.known, 2);
        assert_eq!(second.generation_job_id, None);
        assert_eq!(pipeline.db().all_photo_ids().unwrap().len(), 1);
    }

    #[test]
    fn progress_channel_reports_the_scan_lifecycle() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("library");
        std::fs::create_dir_all(&source).unwrap();
        write_image(&source.join("a.png"), 3);
        write_image(&source.join("b.png"), 4);

        let pipeline = pipeline(&dir.path().join("thumbs"));
        let (tx, rx) = mpsc::channel();
        scanner(&source).scan(&pipeline, Some(tx)).unwrap();

        let updates: Vec<ScanProgress> = rx.iter().collect();
        assert!(matches!(
            updates.first(),
            Some(ScanProgress::Started { total_files: 2 })
        ));
        let scanning = updates
            .iter()
            .filter(|u| matches!(u, ScanProgress::Scanning { .. }))
            .count();
        assert_eq!(scanning, 2);
        assert!(matches!(
            updates.last(),
            Some(ScanProgress::Completed {
                new: 2,
                known: 0,
                errors: 0
            })
        ));
    }
}
