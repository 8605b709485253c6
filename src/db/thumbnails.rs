//! Thumbnail artifact records.
//!
//! At most one live record exists per (photo, size, format); writes
//! are upserts so batch generation and on-demand generation can race
//! for the same photo without creating duplicates.

use rusqlite::OptionalExtension;

use super::Database;
use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailRecord {
    pub photo_id: i64,
    pub size: String,
    pub format: String,
    pub filepath: String,
    pub file_size: i64,
    pub width: u32,
    pub height: u32,
    pub rotation_version: i64,
}

impl Database {
    pub fn upsert_thumbnail(&self, record: &ThumbnailRecord) -> Result<()> {
        let conn = self.lock();
        Self::upsert_thumbnail_stmt(&conn, record)
    }

    /// Upsert a buffered chunk of records in one transaction, so a
    /// crash loses at most one commit batch of progress.
    pub fn upsert_thumbnails(&self, records: &[ThumbnailRecord]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        for record in records {
            Self::upsert_thumbnail_stmt(&tx, record)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn upsert_thumbnail_stmt(conn: &rusqlite::Connection, record: &ThumbnailRecord) -> Result<()> {
        conn.execute(
            r#"
            INSERT INTO thumbnails (photo_id, size, format, filepath, file_size, width, height, rotation_version)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (photo_id, size, format) DO UPDATE SET
                filepath = excluded.filepath,
                file_size = excluded.file_size,
                width = excluded.width,
                height = excluded.height,
                rotation_version = excluded.rotation_version
            "#,
            rusqlite::params![
                record.photo_id,
                record.size,
                record.format,
                record.filepath,
                record.file_size,
                record.width,
                record.height,
                record.rotation_version,
            ],
        )?;
        Ok(())
    }

    pub fn get_thumbnail_record(
        &self,
        photo_id: i64,
        size: &str,
        format: &str,
    ) -> Result<Option<ThumbnailRecord>> {
        let conn = self.lock();
        let record = conn
            .query_row(
                r#"
                SELECT photo_id, size, format, filepath, file_size, width, height, rotation_version
                FROM thumbnails WHERE photo_id = ? AND size = ? AND format = ?
                "#,
                rusqlite::params![photo_id, size, format],
                |row| {
                    Ok(ThumbnailRecord {
                        photo_id: row.get(0)?,
                        size: row.get(1)?,
                        format: row.get(2)?,
                        filepath: row.get(3)?,
                        file_size: row.get(4)?,
                        width: row.get(5)?,
                        height: row.get(6)?,
                        rotation_version: row.get(7)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    pub fn count_thumbnails(&self, photo_id: i64) -> Result<i64> {
        let conn = self.lock();
        let count = conn.query_row(
            "SELECT COUNT(*) FROM thumbnails WHERE photo_id = ?",
            [photo_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}
