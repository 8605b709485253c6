//! Versioned thumbnail artifact storage.
//!
//! Artifact keys embed the photo's rotation version
//! (`{photo_id}_{size}_v{version}.jpg`), so a stale reference can
//! never resolve to content generated under a different rotation.
//! Legacy pre-versioning artifacts (`{photo_id}_{size}.jpg`) remain
//! servable but are never written.

use image::DynamicImage;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ThumbnailConfig;
use crate::error::{Error, Result};

use super::transform;

/// Fixed target boxes for generated thumbnails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThumbSize {
    Small,
    Medium,
    Large,
}

impl ThumbSize {
    pub const ALL: [ThumbSize; 3] = [ThumbSize::Small, ThumbSize::Medium, ThumbSize::Large];

    pub fn as_str(&self) -> &'static str {
        match self {
            ThumbSize::Small => "150",
            ThumbSize::Medium => "400",
            ThumbSize::Large => "1200",
        }
    }

    pub fn pixels(&self) -> u32 {
        match self {
            ThumbSize::Small => 150,
            ThumbSize::Medium => 400,
            ThumbSize::Large => 1200,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "150" => Some(ThumbSize::Small),
            "400" => Some(ThumbSize::Medium),
            "1200" => Some(ThumbSize::Large),
            _ => None,
        }
    }
}

/// A persisted artifact.
#[derive(Debug, Clone)]
pub struct ArtifactRef {
    pub path: PathBuf,
    pub file_size: u64,
    pub width: u32,
    pub height: u32,
}

/// Manages the on-disk thumbnail cache.
pub struct ThumbnailStore {
    cache_dir: PathBuf,
    jpeg_quality: u8,
}

impl ThumbnailStore {
    pub fn new(config: &ThumbnailConfig) -> Self {
        Self {
            cache_dir: config.path.clone(),
            jpeg_quality: config.jpeg_quality,
        }
    }

    fn ensure_cache_dir(&self) -> Result<()> {
        if !self.cache_dir.exists() {
            fs::create_dir_all(&self.cache_dir).map_err(|e| Error::StorageWrite {
                path: self.cache_dir.clone(),
                source: e,
            })?;
        }
        Ok(())
    }

    pub fn versioned_path(&self, photo_id: i64, size: ThumbSize, rotation_version: i64) -> PathBuf {
        self.cache_dir
            .join(format!("{photo_id}_{}_v{rotation_version}.jpg", size.as_str()))
    }

    /// Pre-versioning artifact location. Read-only compatibility.
    pub fn legacy_path(&self, photo_id: i64, size: ThumbSize) -> PathBuf {
        self.cache_dir.join(format!("{photo_id}_{}.jpg", size.as_str()))
    }

    /// Resize and persist one raster under its versioned key. Writes
    /// are idempotent: content is deterministic for a given rotation
    /// version, so the last writer wins harmlessly.
    pub fn put(
        &self,
        photo_id: i64,
        size: ThumbSize,
        rotation_version: i64,
        rendered: &DynamicImage,
    ) -> Result<ArtifactRef> {
        self.ensure_cache_dir()?;

        let thumbnail = transform::resize_to_box(rendered, size.pixels());
        let path = self.versioned_path(photo_id, size, rotation_version);
        self.encode_jpeg(&thumbnail, &path)?;

        let file_size = fs::metadata(&path)
            .map_err(|e| Error::StorageWrite {
                path: path.clone(),
                source: e,
            })?
            .len();

        Ok(ArtifactRef {
            path,
            file_size,
            width: thumbnail.width(),
            height: thumbnail.height(),
        })
    }

    fn encode_jpeg(&self, img: &DynamicImage, path: &Path) -> Result<()> {
        use std::io::Write;

        let file = fs::File::create(path).map_err(|e| Error::StorageWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut writer = std::io::BufWriter::new(file);
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut writer, self.jpeg_quality);
        img.write_with_encoder(encoder)
            .map_err(|e| Error::decode(path, format!("jpeg encode failed: {e}")))?;
        writer.flush().map_err(|e| Error::StorageWrite {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(())
    }

    /// Artifact bytes for an exact (photo, size, version) key.
    pub fn read_versioned(
        &self,
        photo_id: i64,
        size: ThumbSize,
        rotation_version: i64,
    ) -> Option<Vec<u8>> {
        fs::read(self.versioned_path(photo_id, size, rotation_version)).ok()
    }

    /// Legacy artifact bytes, if a pre-versioning file exists.
    pub fn read_legacy(&self, photo_id: i64, size: ThumbSize) -> Option<Vec<u8>> {
        fs::read(self.legacy_path(photo_id, size)).ok()
    }

    /// Remove the artifacts written for a version whose write turned
    /// out to be stale.
    pub fn discard_version(&self, photo_id: i64, rotation_version: i64) {
        for size in ThumbSize::ALL {
            let _ = fs::remove_file(self.versioned_path(photo_id, size, rotation_version));
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;
    use tempfile::tempdir;

    fn store(dir: &Path) -> ThumbnailStore {
        ThumbnailStore::new(&ThumbnailConfig {
            path: dir.to_path_buf(),
            ..ThumbnailConfig::default()
        })
    }

    #[test]
    fn naming_convention_embeds_version() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        assert_eq!(
            store.versioned_path(7, ThumbSize::Medium, 3),
            dir.path().join("7_400_v3.jpg")
        );
        assert_eq!(
            store.legacy_path(7, ThumbSize::Medium),
            dir.path().join("7_400.jpg")
        );
    }

    #[test]
    fn put_writes_resized_artifact() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let img = DynamicImage::new_rgb8(800, 400);
        let artifact = store.put(1, ThumbSize::Small, 0, &img).unwrap();

        assert_eq!((artifact.width, artifact.height), (150, 75));
        assert!(artifact.path.ends_with("1_150_v0.jpg"));
        assert!(artifact.file_size > 0);
        assert!(store.read_versioned(1, ThumbSize::Small, 0).is_some());
        assert!(store.read_versioned(1, ThumbSize::Small, 1).is_none());
    }

    #[test]
    fn put_is_idempotent_for_a_version() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let img = DynamicImage::new_rgb8(300, 300);

        let first = store.put(1, ThumbSize::Small, 2, &img).unwrap();
        let second = store.put(1, ThumbSize::Small, 2, &img).unwrap();
        assert_eq!(first.path, second.path);
        assert_eq!(
            store.read_versioned(1, ThumbSize::Small, 2).unwrap().len() as u64,
            second.file_size
        );
    }

    #[test]
    fn discard_version_removes_all_sizes() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        let img = DynamicImage::new_rgb8(300, 300);

        for size in ThumbSize::ALL {
            store.put(5, size, 1, &img).unwrap();
        }
        store.discard_version(5, 1);
        for size in ThumbSize::ALL {
            assert!(store.read_versioned(5, size, 1).is_none());
        }
    }
}
