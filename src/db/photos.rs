//! Photo row operations: ingest upserts keyed by content hash and the
//! rotation state machine.

use rusqlite::OptionalExtension;

use super::Database;
use crate::error::{Error, Result};

/// Full photo record as stored in the catalog.
#[derive(Debug, Clone)]
pub struct PhotoRow {
    pub id: i64,
    pub path: String,
    pub filename: String,
    pub directory: String,
    pub size_bytes: i64,
    pub width: Option<i64>,
    pub height: Option<i64>,
    pub format: Option<String>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub taken_at: Option<String>,
    pub file_hash: String,
    pub exif_orientation: Option<i32>,
    pub rotation_applied: i32,
    pub user_rotation: i32,
    pub final_rotation: i32,
    pub rotation_version: i64,
}

/// Data captured during a scan, ready for insertion.
#[derive(Debug, Clone)]
pub struct NewPhoto {
    pub path: String,
    pub filename: String,
    pub directory: String,
    pub size_bytes: i64,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<String>,
    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub taken_at: Option<String>,
    pub md5_hash: Option<String>,
    pub file_hash: String,
    pub exif_orientation: Option<i32>,
    pub rotation_applied: i32,
}

/// The slice of a photo a batch worker needs, read at dispatch time so
/// a rotation edit made after enqueue is still honored.
#[derive(Debug, Clone)]
pub struct DispatchRow {
    pub photo_id: i64,
    pub path: String,
    pub exif_orientation: Option<i32>,
    pub user_rotation: i32,
    pub rotation_version: i64,
}

/// Result of a rotation edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationOutcome {
    pub final_rotation: i32,
    pub rotation_version: i64,
}

impl Database {
    /// Insert a newly scanned photo. The caller has already checked the
    /// content hash for duplicates.
    pub fn insert_photo(&self, photo: &NewPhoto) -> Result<i64> {
        let conn = self.lock();
        conn.execute(
            r#"
            INSERT INTO photos (
                path, filename, directory, size_bytes,
                width, height, format, camera_make, camera_model, taken_at,
                md5_hash, file_hash,
                exif_orientation, rotation_applied, final_rotation
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            rusqlite::params![
                photo.path,
                photo.filename,
                photo.directory,
                photo.size_bytes,
                photo.width,
                photo.height,
                photo.format,
                photo.camera_make,
                photo.camera_model,
                photo.taken_at,
                photo.md5_hash,
                photo.file_hash,
                photo.exif_orientation,
                photo.rotation_applied,
                photo.rotation_applied % 360,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Dedup lookup by content hash.
    pub fn find_photo_by_hash(&self, file_hash: &str) -> Result<Option<i64>> {
        let conn = self.lock();
        let id = conn
            .query_row(
                "SELECT id FROM photos WHERE file_hash = ?",
                [file_hash],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    /// Refresh path and scan timestamp for a photo rediscovered under a
    /// known content hash (e.g. the file moved).
    pub fn touch_photo(&self, photo_id: i64, path: &str, filename: &str, directory: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE photos SET path = ?, filename = ?, directory = ?, scanned_at = ? WHERE id = ?",
            rusqlite::params![path, filename, directory, Self::now(), photo_id],
        )?;
        Ok(())
    }

    pub fn get_photo(&self, photo_id: i64) -> Result<PhotoRow> {
        let conn = self.lock();
        conn.query_row(
            r#"
            SELECT id, path, filename, directory, size_bytes,
                   width, height, format, camera_make, camera_model, taken_at,
                   file_hash, exif_orientation,
                   rotation_applied, user_rotation, final_rotation, rotation_version
            FROM photos WHERE id = ?
            "#,
            [photo_id],
            |row| {
                Ok(PhotoRow {
                    id: row.get(0)?,
                    path: row.get(1)?,
                    filename: row.get(2)?,
                    directory: row.get(3)?,
                    size_bytes: row.get(4)?,
                    width: row.get(5)?,
                    height: row.get(6)?,
                    format: row.get(7)?,
                    camera_make: row.get(8)?,
                    camera_model: row.get(9)?,
                    taken_at: row.get(10)?,
                    file_hash: row.get(11)?,
                    exif_orientation: row.get(12)?,
                    rotation_applied: row.get(13)?,
                    user_rotation: row.get(14)?,
                    final_rotation: row.get(15)?,
                    rotation_version: row.get(16)?,
                })
            },
        )
        .optional()?
        .ok_or_else(|| Error::not_found(format!("photo {photo_id}")))
    }

    /// Read the worker-relevant fields for a set of photos at dispatch
    /// time. Unknown ids are silently absent from the result.
    pub fn dispatch_rows(&self, photo_ids: &[i64]) -> Result<Vec<DispatchRow>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, path, exif_orientation, user_rotation, rotation_version
             FROM photos WHERE id = ?",
        )?;
        let mut rows = Vec::with_capacity(photo_ids.len());
        for &id in photo_ids {
            let row = stmt
                .query_row([id], |row| {
                    Ok(DispatchRow {
                        photo_id: row.get(0)?,
                        path: row.get(1)?,
                        exif_orientation: row.get(2)?,
                        user_rotation: row.get(3)?,
                        rotation_version: row.get(4)?,
                    })
                })
                .optional()?;
            if let Some(row) = row {
                rows.push(row);
            }
        }
        Ok(rows)
    }

    /// Current rotation version for a photo, re-read before finalizing
    /// a generated artifact.
    pub fn rotation_version(&self, photo_id: i64) -> Result<i64> {
        let conn = self.lock();
        conn.query_row(
            "SELECT rotation_version FROM photos WHERE id = ?",
            [photo_id],
            |row| row.get(0),
        )
        .optional()?
        .ok_or_else(|| Error::not_found(format!("photo {photo_id}")))
    }

    /// Apply a user rotation edit in a single statement: write
    /// `user_rotation`, recompute `final_rotation`, and bump
    /// `rotation_version` by exactly one. The caller validates the
    /// rotation domain first.
    pub fn set_user_rotation(&self, photo_id: i64, rotation: i32) -> Result<RotationOutcome> {
        let conn = self.lock();
        let updated = conn.execute(
            r#"
            UPDATE photos
            SET user_rotation = ?1,
                final_rotation = (rotation_applied + ?1) % 360,
                rotation_version = rotation_version + 1
            WHERE id = ?2
            "#,
            rusqlite::params![rotation, photo_id],
        )?;
        if updated == 0 {
            return Err(Error::not_found(format!("photo {photo_id}")));
        }
        conn.query_row(
            "SELECT final_rotation, rotation_version FROM photos WHERE id = ?",
            [photo_id],
            |row| {
                Ok(RotationOutcome {
                    final_rotation: row.get(0)?,
                    rotation_version: row.get(1)?,
                })
            },
        )
        .map_err(Into::into)
    }

    /// Photos that have no thumbnail records yet.
    pub fn photo_ids_missing_thumbnails(&self) -> Result<Vec<i64>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT p.id FROM photos p
             LEFT JOIN thumbnails t ON t.photo_id = p.id
             WHERE t.id IS NULL
             ORDER BY p.id",
        )?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    pub fn all_photo_ids(&self) -> Result<Vec<i64>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT id FROM photos ORDER BY id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }
}

#[cfg(test)]
pub(crate) fn test_photo(path: &str, hash: &str) -> NewPhoto {
    NewPhoto {
        path: path.to_string(),
        filename: path.rsplit('/').next().unwrap_or(path).to_string(),
        directory: "/photos".to_string(),
        size_bytes: 1024,
        width: Some(640),
        height: Some(480),
        format: Some("Jpeg".to_string()),
        camera_make: None,
        camera_model: None,
        taken_at: None,
        md5_hash: None,
        file_hash: hash.to_string(),
        exif_orientation: Some(1),
        rotation_applied: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db
    }

    #[test]
    fn insert_and_dedup_by_hash() {
        let db = db();
        let id = db.insert_photo(&test_photo("/photos/a.jpg", "abc")).unwrap();
        assert_eq!(db.find_photo_by_hash("abc").unwrap(), Some(id));
        assert_eq!(db.find_photo_by_hash("missing").unwrap(), None);

        // A second insert with the same hash violates the unique key.
        assert!(db.insert_photo(&test_photo("/photos/b.jpg", "abc")).is_err());
    }

    #[test]
    fn rotation_edit_bumps_version_exactly_once() {
        let db = db();
        let id = db.insert_photo(&test_photo("/photos/a.jpg", "abc")).unwrap();

        for (i, rotation) in [90, 180, 270, 0].iter().enumerate() {
            let outcome = db.set_user_rotation(id, *rotation).unwrap();
            assert_eq!(outcome.final_rotation, rotation % 360);
            assert_eq!(outcome.rotation_version, i as i64 + 1);
        }

        let photo = db.get_photo(id).unwrap();
        assert_eq!(photo.rotation_version, 4);
        assert_eq!(photo.user_rotation, 0);
        assert_eq!(photo.final_rotation, 0);
    }

    #[test]
    fn final_rotation_wraps_mod_360() {
        let db = db();
        let mut photo = test_photo("/photos/a.jpg", "abc");
        photo.rotation_applied = 270;
        let id = db.insert_photo(&photo).unwrap();

        let outcome = db.set_user_rotation(id, 180).unwrap();
        assert_eq!(outcome.final_rotation, (270 + 180) % 360);
    }

    #[test]
    fn set_rotation_on_missing_photo_is_not_found() {
        let db = db();
        assert!(matches!(
            db.set_user_rotation(99, 90),
            Err(Error::NotFound { .. })
        ));
    }

    #[test]
    fn dispatch_rows_skip_unknown_ids() {
        let db = db();
        let id = db.insert_photo(&test_photo("/photos/a.jpg", "abc")).unwrap();
        let rows = db.dispatch_rows(&[id, 999]).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].photo_id, id);
    }
}
