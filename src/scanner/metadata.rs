use std::fs::File;
use std::io::BufReader;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct ImageMetadata {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub format: Option<String>,

    pub camera_make: Option<String>,
    pub camera_model: Option<String>,
    pub taken_at: Option<String>,

    /// Raw EXIF orientation (1-8), when present.
    pub orientation: Option<u16>,
}

/// Best-effort metadata extraction. Every field is optional: a photo
/// with unreadable EXIF still ingests.
pub fn extract_metadata(path: &Path) -> ImageMetadata {
    let mut metadata = ImageMetadata::default();

    if let Ok(reader) = image::ImageReader::open(path) {
        if let Some(format) = reader.format() {
            metadata.format = Some(format!("{format:?}"));
        }
    }

    // Open again; into_dimensions consumes the reader.
    if let Ok(reader) = image::ImageReader::open(path) {
        if let Ok((width, height)) = reader.into_dimensions() {
            metadata.width = Some(width);
            metadata.height = Some(height);
        }
    }

    if let Ok(file) = File::open(path) {
        let mut bufreader = BufReader::new(file);
        if let Ok(exif) = exif::Reader::new().read_from_container(&mut bufreader) {
            if let Some(field) = exif.get_field(exif::Tag::Make, exif::In::PRIMARY) {
                metadata.camera_make = Some(display_string(field));
            }
            if let Some(field) = exif.get_field(exif::Tag::Model, exif::In::PRIMARY) {
                metadata.camera_model = Some(display_string(field));
            }
            if let Some(field) = exif.get_field(exif::Tag::DateTimeOriginal, exif::In::PRIMARY) {
                metadata.taken_at = Some(display_string(field));
            }
            if let Some(field) = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY) {
                if let exif::Value::Short(ref v) = field.value {
                    metadata.orientation = v.first().copied();
                }
            }
        }
    }

    metadata
}

fn display_string(field: &exif::Field) -> String {
    field
        .display_value()
        .to_string()
        .trim_matches('"')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn dimensions_come_from_the_decoder() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.png");
        image::RgbImage::new(20, 10).save(&path).unwrap();

        let metadata = extract_metadata(&path);
        assert_eq!(metadata.width, Some(20));
        assert_eq!(metadata.height, Some(10));
        assert_eq!(metadata.format.as_deref(), Some("Png"));
        assert_eq!(metadata.orientation, None);
    }

    #[test]
    fn unreadable_file_yields_empty_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.jpg");
        std::fs::write(&path, b"junk").unwrap();

        let metadata = extract_metadata(&path);
        assert_eq!(metadata.width, None);
        assert_eq!(metadata.camera_make, None);
    }
}
