pub const SCHEMA: &str = r#"
-- Photos table: core photo metadata and rotation state
CREATE TABLE IF NOT EXISTS photos (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT NOT NULL UNIQUE,
    filename TEXT NOT NULL,
    directory TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    scanned_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,

    -- Image metadata
    width INTEGER,
    height INTEGER,
    format TEXT,
    camera_make TEXT,
    camera_model TEXT,
    taken_at TEXT,

    -- Hashes for duplicate detection; sha256 is the dedup key
    md5_hash TEXT,
    file_hash TEXT NOT NULL UNIQUE,

    -- Rotation state
    exif_orientation INTEGER,               -- raw EXIF value (1-8)
    rotation_applied INTEGER NOT NULL DEFAULT 0,  -- degrees derived from EXIF
    user_rotation INTEGER NOT NULL DEFAULT 0,     -- explicit user override
    final_rotation INTEGER NOT NULL DEFAULT 0,    -- (rotation_applied + user_rotation) % 360
    rotation_version INTEGER NOT NULL DEFAULT 0   -- bumped once per user rotation edit
);

CREATE INDEX IF NOT EXISTS idx_photos_directory ON photos(directory);
CREATE INDEX IF NOT EXISTS idx_photos_file_hash ON photos(file_hash);
CREATE INDEX IF NOT EXISTS idx_photos_taken_at ON photos(taken_at);

-- Generated thumbnail artifacts; one live record per (photo, size, format)
CREATE TABLE IF NOT EXISTS thumbnails (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    photo_id INTEGER NOT NULL,
    size TEXT NOT NULL,                -- '150', '400', '1200'
    format TEXT NOT NULL,              -- 'jpeg'
    filepath TEXT NOT NULL,
    file_size INTEGER NOT NULL,
    width INTEGER NOT NULL,
    height INTEGER NOT NULL,
    rotation_version INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    UNIQUE (photo_id, size, format),
    FOREIGN KEY (photo_id) REFERENCES photos(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_thumbnails_photo ON thumbnails(photo_id);

-- Background jobs
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,                -- 'scan', 'thumbnail_generation', 'metadata_extraction', 'import'
    status TEXT NOT NULL DEFAULT 'pending',  -- pending/running/completed/failed/cancelled
    priority INTEGER NOT NULL DEFAULT 5,
    payload TEXT,                      -- JSON object: currentFile, workerCount, processedCount, failedCount
    total_items INTEGER,
    processed_items INTEGER NOT NULL DEFAULT 0,
    error_message TEXT,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    started_at TEXT,
    completed_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_jobs_status ON jobs(status);
"#;

/// Best-effort migrations for databases created before a column
/// existed. Each statement is allowed to fail when already applied.
pub const MIGRATIONS: &[&str] = &[
    "ALTER TABLE photos ADD COLUMN user_rotation INTEGER NOT NULL DEFAULT 0",
    "ALTER TABLE photos ADD COLUMN final_rotation INTEGER NOT NULL DEFAULT 0",
    "ALTER TABLE photos ADD COLUMN rotation_version INTEGER NOT NULL DEFAULT 0",
    "ALTER TABLE thumbnails ADD COLUMN rotation_version INTEGER NOT NULL DEFAULT 0",
];
