use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::Result;

/// Walk the source tree and collect files whose extension matches the
/// configured image formats. Symlinks are not followed; unreadable
/// entries are skipped.
pub fn discover_images(directory: &Path, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let mut images: Vec<PathBuf> = WalkDir::new(directory)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| {
            path.extension()
                .map(|ext| {
                    let ext = ext.to_string_lossy().to_lowercase();
                    extensions.iter().any(|e| e.to_lowercase() == ext)
                })
                .unwrap_or(false)
        })
        .collect();

    // Sort for a stable scan order.
    images.sort();

    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use tempfile::tempdir;

    #[test]
    fn finds_images_recursively_and_ignores_others() {
        let dir = tempdir().unwrap();

        File::create(dir.path().join("photo1.jpg")).unwrap();
        File::create(dir.path().join("photo2.PNG")).unwrap();
        File::create(dir.path().join("notes.txt")).unwrap();
        File::create(dir.path().join("noext")).unwrap();

        fs::create_dir(dir.path().join("nested")).unwrap();
        File::create(dir.path().join("nested/photo3.jpeg")).unwrap();

        let extensions = vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()];
        let images = discover_images(dir.path(), &extensions).unwrap();

        assert_eq!(images.len(), 3);
        // Sorted: stable order across scans.
        let mut sorted = images.clone();
        sorted.sort();
        assert_eq!(images, sorted);
    }
}
