mod schema;
pub mod jobs;
pub mod photos;
pub mod thumbnails;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::Result;

pub use jobs::{JobKind, JobState, JobStatus};
pub use photos::{DispatchRow, NewPhoto, PhotoRow, RotationOutcome};
pub use schema::{MIGRATIONS, SCHEMA};
pub use thumbnails::ThumbnailRecord;

/// Convert an EXIF orientation value (1-8) to rotation degrees.
///
/// Only the pure-rotation orientations map to degrees; mirrored
/// orientations (2, 4, 5, 7) report the rotation component and the
/// transform step handles the flip.
pub fn exif_orientation_to_degrees(orientation: i32) -> i32 {
    match orientation {
        6 | 5 => 90,  // Rotate 90 CW
        3 | 4 => 180, // Rotate 180
        8 | 7 => 270, // Rotate 90 CCW
        _ => 0,       // Normal (1), mirrored (2), or out of range
    }
}

/// Catalog handle shared across worker threads.
///
/// rusqlite's `Connection` is not `Sync`, so the connection lives
/// behind a mutex and every operation takes the lock for its own
/// statement or transaction. Progress counters are updated with
/// guarded SQL increments, never read-add-write at the application
/// layer.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn initialize(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(SCHEMA)?;
        for migration in MIGRATIONS {
            // Already-applied migrations fail harmlessly.
            let _ = conn.execute(migration, []);
        }
        Ok(())
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().expect("database mutex poisoned")
    }

    pub(crate) fn now() -> String {
        chrono::Utc::now().to_rfc3339()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orientation_degrees_cover_rotation_values() {
        assert_eq!(exif_orientation_to_degrees(1), 0);
        assert_eq!(exif_orientation_to_degrees(3), 180);
        assert_eq!(exif_orientation_to_degrees(6), 90);
        assert_eq!(exif_orientation_to_degrees(8), 270);
        // Mirrored variants report their rotation component.
        assert_eq!(exif_orientation_to_degrees(5), 90);
        assert_eq!(exif_orientation_to_degrees(7), 270);
        // Unknown values fall back to no rotation.
        assert_eq!(exif_orientation_to_degrees(0), 0);
        assert_eq!(exif_orientation_to_degrees(9), 0);
    }

    #[test]
    fn initialize_is_idempotent() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();
        db.initialize().unwrap();
    }
}
