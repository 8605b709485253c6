//! Job rows and their state machine.
//!
//! Transitions are monotonic: pending -> running -> one of completed /
//! failed / cancelled. Every mutating statement carries a status guard
//! so a terminal job is never resurrected, and progress counters are
//! incremented in SQL rather than read-add-write in the application —
//! concurrent batch workers sharing one parent job cannot lose
//! updates.

use rusqlite::OptionalExtension;
use serde_json::{Map, Value};

use super::Database;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Scan,
    ThumbnailGeneration,
    MetadataExtraction,
    Import,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::Scan => "scan",
            JobKind::ThumbnailGeneration => "thumbnail_generation",
            JobKind::MetadataExtraction => "metadata_extraction",
            JobKind::Import => "import",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "scan" => Some(JobKind::Scan),
            "thumbnail_generation" => Some(JobKind::ThumbnailGeneration),
            "metadata_extraction" => Some(JobKind::MetadataExtraction),
            "import" => Some(JobKind::Import),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobState::Pending),
            "running" => Some(JobState::Running),
            "completed" => Some(JobState::Completed),
            "failed" => Some(JobState::Failed),
            "cancelled" => Some(JobState::Cancelled),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Cancelled
        )
    }
}

/// Status view returned to callers polling a job.
#[derive(Debug, Clone)]
pub struct JobStatus {
    pub id: i64,
    pub kind: JobKind,
    pub status: JobState,
    pub processed_items: i64,
    pub total_items: Option<i64>,
    pub error_message: Option<String>,
    pub payload: Map<String, Value>,
}

impl JobStatus {
    /// Progress percentage, clamped to 0-100.
    pub fn progress(&self) -> f64 {
        match self.total_items {
            Some(total) if total > 0 => {
                ((self.processed_items as f64 / total as f64) * 100.0).min(100.0)
            }
            _ => 0.0,
        }
    }
}

impl Database {
    pub fn create_job(&self, kind: JobKind, priority: i32, total_items: Option<i64>) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO jobs (kind, status, priority, total_items) VALUES (?, 'pending', ?, ?)",
            rusqlite::params![kind.as_str(), priority, total_items],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Transition pending -> running. Idempotent across batches: only
    /// the first pickup sets `started_at`; later calls are no-ops.
    pub fn mark_job_running(&self, job_id: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE jobs SET status = 'running', started_at = ? WHERE id = ? AND status = 'pending'",
            rusqlite::params![Self::now(), job_id],
        )?;
        Ok(())
    }

    /// Set `total_items` only when the creator left it unset.
    pub fn set_job_total_if_missing(&self, job_id: i64, total: i64) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE jobs SET total_items = ? WHERE id = ? AND total_items IS NULL",
            rusqlite::params![total, job_id],
        )?;
        Ok(())
    }

    /// Atomically add `n` to `processed_items`, clamped to
    /// `total_items`. Returns false when the job is terminal (the
    /// update degrades to a no-op) or unknown.
    pub fn add_job_progress(&self, job_id: i64, n: i64) -> Result<bool> {
        let conn = self.lock();
        let updated = conn.execute(
            r#"
            UPDATE jobs
            SET processed_items = CASE
                WHEN total_items IS NOT NULL THEN MIN(processed_items + ?1, total_items)
                ELSE processed_items + ?1
            END
            WHERE id = ?2 AND status = 'running'
            "#,
            rusqlite::params![n, job_id],
        )?;
        Ok(updated > 0)
    }

    /// Merge keys into the job's JSON payload. The read and write run
    /// under one connection lock, so concurrent batches cannot clobber
    /// each other's keys.
    pub fn merge_job_payload(&self, job_id: i64, entries: &[(&str, Value)]) -> Result<()> {
        let conn = self.lock();
        let current: Option<Option<String>> = conn
            .query_row("SELECT payload FROM jobs WHERE id = ?", [job_id], |row| {
                row.get(0)
            })
            .optional()?;
        let Some(current) = current else {
            return Err(Error::not_found(format!("job {job_id}")));
        };

        let mut payload: Map<String, Value> = current
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();
        for (key, value) in entries {
            payload.insert((*key).to_string(), value.clone());
        }

        let serialized = Value::Object(payload).to_string();
        conn.execute(
            "UPDATE jobs SET payload = ? WHERE id = ?",
            rusqlite::params![serialized, job_id],
        )?;
        Ok(())
    }

    /// Transition running -> completed, but only once the accumulated
    /// progress has reached the job total. Returns whether the job
    /// completed in this call.
    pub fn try_complete_job(&self, job_id: i64) -> Result<bool> {
        let conn = self.lock();
        let updated = conn.execute(
            r#"
            UPDATE jobs SET status = 'completed', completed_at = ?
            WHERE id = ? AND status = 'running'
              AND total_items IS NOT NULL
              AND processed_items >= total_items
            "#,
            rusqlite::params![Self::now(), job_id],
        )?;
        Ok(updated > 0)
    }

    /// Force-complete a job that has nothing to process.
    pub fn complete_empty_job(&self, job_id: i64, message: &str) -> Result<()> {
        {
            let conn = self.lock();
            conn.execute(
                r#"
                UPDATE jobs SET status = 'completed', completed_at = ?, total_items = 0
                WHERE id = ? AND status IN ('pending', 'running')
                "#,
                rusqlite::params![Self::now(), job_id],
            )?;
        }
        self.merge_job_payload(job_id, &[("message", Value::String(message.to_string()))])
    }

    /// Transition to failed with a captured error message. Terminal
    /// even while other batches are in flight; their updates become
    /// no-ops.
    pub fn fail_job(&self, job_id: i64, error: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            r#"
            UPDATE jobs SET status = 'failed', error_message = ?, completed_at = ?
            WHERE id = ? AND status IN ('pending', 'running')
            "#,
            rusqlite::params![error, Self::now(), job_id],
        )?;
        Ok(())
    }

    /// User-initiated cancellation, legal only from pending or running.
    pub fn cancel_job(&self, job_id: i64) -> Result<()> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE jobs SET status = 'cancelled', completed_at = ? WHERE id = ? AND status IN ('pending', 'running')",
            rusqlite::params![Self::now(), job_id],
        )?;
        if updated > 0 {
            return Ok(());
        }

        let status: Option<String> = conn
            .query_row("SELECT status FROM jobs WHERE id = ?", [job_id], |row| {
                row.get(0)
            })
            .optional()?;
        match status {
            None => Err(Error::not_found(format!("job {job_id}"))),
            Some(status) => Err(Error::JobState {
                job_id,
                reason: format!("cannot cancel a {status} job"),
            }),
        }
    }

    pub fn get_job_status(&self, job_id: i64) -> Result<JobStatus> {
        let conn = self.lock();
        conn.query_row(
            "SELECT id, kind, status, processed_items, total_items, error_message, payload
             FROM jobs WHERE id = ?",
            [job_id],
            |row| {
                let kind: String = row.get(1)?;
                let status: String = row.get(2)?;
                let payload: Option<String> = row.get(6)?;
                Ok(JobStatus {
                    id: row.get(0)?,
                    kind: JobKind::from_str(&kind).unwrap_or(JobKind::Import),
                    status: JobState::from_str(&status).unwrap_or(JobState::Failed),
                    processed_items: row.get(3)?,
                    total_items: row.get(4)?,
                    error_message: row.get(5)?,
                    payload: payload
                        .as_deref()
                        .and_then(|s| serde_json::from_str(s).ok())
                        .unwrap_or_default(),
                })
            },
        )
        .optional()?
        .ok_or_else(|| Error::not_found(format!("job {job_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn lifecycle_pending_running_completed() {
        let db = db();
        let id = db
            .create_job(JobKind::ThumbnailGeneration, 0, Some(10))
            .unwrap();

        assert_eq!(db.get_job_status(id).unwrap().status, JobState::Pending);

        db.mark_job_running(id).unwrap();
        assert_eq!(db.get_job_status(id).unwrap().status, JobState::Running);

        // Not enough progress yet.
        db.add_job_progress(id, 4).unwrap();
        assert!(!db.try_complete_job(id).unwrap());

        db.add_job_progress(id, 6).unwrap();
        assert!(db.try_complete_job(id).unwrap());
        assert_eq!(db.get_job_status(id).unwrap().status, JobState::Completed);
    }

    #[test]
    fn mark_running_is_idempotent_across_batches() {
        let db = db();
        let id = db
            .create_job(JobKind::ThumbnailGeneration, 0, Some(10))
            .unwrap();

        db.mark_job_running(id).unwrap();
        let started_at: Option<String> = {
            let conn = db.lock();
            conn.query_row("SELECT started_at FROM jobs WHERE id = ?", [id], |row| {
                row.get(0)
            })
            .unwrap()
        };
        assert!(started_at.is_some());

        // A second batch picking up the same job must not reset it.
        db.mark_job_running(id).unwrap();
        let started_again: Option<String> = {
            let conn = db.lock();
            conn.query_row("SELECT started_at FROM jobs WHERE id = ?", [id], |row| {
                row.get(0)
            })
            .unwrap()
        };
        assert_eq!(started_at, started_again);
    }

    #[test]
    fn progress_is_clamped_and_refused_after_terminal() {
        let db = db();
        let id = db
            .create_job(JobKind::ThumbnailGeneration, 0, Some(5))
            .unwrap();
        db.mark_job_running(id).unwrap();

        db.add_job_progress(id, 100).unwrap();
        let status = db.get_job_status(id).unwrap();
        assert_eq!(status.processed_items, 5);
        assert_eq!(status.progress(), 100.0);

        db.cancel_job(id).unwrap();
        assert!(!db.add_job_progress(id, 1).unwrap());
        assert_eq!(db.get_job_status(id).unwrap().status, JobState::Cancelled);
    }

    #[test]
    fn cancel_only_from_pending_or_running() {
        let db = db();
        let id = db.create_job(JobKind::Scan, 0, Some(1)).unwrap();
        db.mark_job_running(id).unwrap();
        db.add_job_progress(id, 1).unwrap();
        db.try_complete_job(id).unwrap();

        match db.cancel_job(id) {
            Err(Error::JobState { job_id, .. }) => assert_eq!(job_id, id),
            other => panic!("expected JobState error, got {other:?}"),
        }
    }

    #[test]
    fn terminal_job_is_never_resurrected() {
        let db = db();
        let id = db
            .create_job(JobKind::ThumbnailGeneration, 0, Some(5))
            .unwrap();
        db.mark_job_running(id).unwrap();
        db.cancel_job(id).unwrap();

        // Late batch completions must not flip the status back.
        db.mark_job_running(id).unwrap();
        db.add_job_progress(id, 5).unwrap();
        assert!(!db.try_complete_job(id).unwrap());
        assert_eq!(db.get_job_status(id).unwrap().status, JobState::Cancelled);
    }

    #[test]
    fn concurrent_batches_accumulate_without_lost_updates() {
        let db = Arc::new(db());
        let total = 80i64;
        let id = db
            .create_job(JobKind::ThumbnailGeneration, 0, Some(total))
            .unwrap();
        db.mark_job_running(id).unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let db = Arc::clone(&db);
            handles.push(std::thread::spawn(move || {
                for _ in 0..5 {
                    db.add_job_progress(id, 2).unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let status = db.get_job_status(id).unwrap();
        assert_eq!(status.processed_items, total);
    }

    #[test]
    fn payload_merge_keeps_existing_keys() {
        let db = db();
        let id = db
            .create_job(JobKind::ThumbnailGeneration, 0, None)
            .unwrap();

        db.merge_job_payload(id, &[("workerCount", Value::from(4))])
            .unwrap();
        db.merge_job_payload(id, &[("processedCount", Value::from(7))])
            .unwrap();

        let payload = db.get_job_status(id).unwrap().payload;
        assert_eq!(payload.get("workerCount"), Some(&Value::from(4)));
        assert_eq!(payload.get("processedCount"), Some(&Value::from(7)));
    }
}
