//! Pure image transform: decode, orient, rotate, normalize, resize.
//!
//! No database access happens here; a transform failure for one photo
//! is reported per item and never propagates to siblings in a batch.
//!
//! Rotation semantics: degrees are the visual/clockwise rotation a
//! viewer expects. `DynamicImage::rotate90` rotates clockwise, so the
//! stored degrees map directly onto quarter turns with no negation.

use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, RgbImage};
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};

/// Camera RAW container extensions decoded via embedded preview with a
/// sensor-data fallback.
const RAW_EXTENSIONS: &[&str] = &["cr2", "nef", "arw", "dng", "raf", "orf", "rw2"];

/// HEIF/HEIC containers: only an embedded JPEG preview is decodable
/// with this stack; HEVC-coded payloads without one fail as
/// unsupported.
const HEIF_EXTENSIONS: &[&str] = &["heic", "heif"];

/// Quick embedded-preview scan window before falling back to reading
/// the whole file.
const PREVIEW_SCAN_BYTES: usize = 512 * 1024;
const PREVIEW_MIN_BYTES: usize = 30_000;

/// Decode a source image of any supported format.
pub fn load_source(path: &Path) -> Result<DynamicImage> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    if RAW_EXTENSIONS.contains(&ext.as_str()) {
        return load_raw(path);
    }
    if HEIF_EXTENSIONS.contains(&ext.as_str()) {
        return load_embedded_preview(path)
            .ok_or_else(|| Error::decode(path, "no decodable preview stream in HEIF container"));
    }

    ImageReader::open(path)
        .map_err(|e| Error::decode(path, e.to_string()))?
        .with_guessed_format()
        .map_err(|e| Error::decode(path, e.to_string()))?
        .decode()
        .map_err(|e| Error::decode(path, e.to_string()))
}

/// RAW decode: prefer the embedded preview stream (fast, and matches
/// what the camera itself would show), fall back to sensor-data
/// demosaic, and finally report the file as undecodable.
fn load_raw(path: &Path) -> Result<DynamicImage> {
    if let Some(img) = load_embedded_preview(path) {
        return Ok(img);
    }
    decode_raw_sensor(path)
}

/// Scan a container for embedded JPEG streams and decode the largest
/// one that parses. A bounded prefix is tried first; the full file is
/// only read when the prefix holds nothing usable.
fn load_embedded_preview(path: &Path) -> Option<DynamicImage> {
    let head = read_prefix(path, PREVIEW_SCAN_BYTES)?;
    if let Some(img) = decode_largest_jpeg(&head, PREVIEW_MIN_BYTES) {
        return Some(img);
    }

    let full = std::fs::read(path).ok()?;
    if full.len() <= head.len() {
        return None;
    }
    decode_largest_jpeg(&full, 0)
}

fn read_prefix(path: &Path, max_bytes: usize) -> Option<Vec<u8>> {
    let mut file = std::fs::File::open(path).ok()?;
    let mut data = vec![0u8; max_bytes];
    let bytes_read = file.read(&mut data).ok()?;
    data.truncate(bytes_read);
    Some(data)
}

/// Find SOI/EOI-delimited JPEG streams and decode candidates from
/// largest to smallest.
fn decode_largest_jpeg(data: &[u8], min_size: usize) -> Option<DynamicImage> {
    const SOI: [u8; 2] = [0xFF, 0xD8];
    const EOI: [u8; 2] = [0xFF, 0xD9];

    let mut candidates: Vec<(usize, usize)> = Vec::new();
    for (start, window) in data.windows(2).enumerate() {
        if window != SOI {
            continue;
        }
        if let Some(end_offset) = data[start..].windows(2).position(|w| w == EOI) {
            let end = start + end_offset + 1;
            if end - start + 1 >= min_size {
                candidates.push((start, end));
            }
        }
        if candidates.len() > 8 {
            break;
        }
    }

    candidates.sort_by_key(|(start, end)| std::cmp::Reverse(end - start));
    for (start, end) in candidates {
        if let Ok(img) =
            image::load_from_memory_with_format(&data[start..=end], image::ImageFormat::Jpeg)
        {
            return Some(img);
        }
    }
    None
}

/// Half-resolution superpixel demosaic: each 2x2 CFA block becomes one
/// RGB pixel, normalized by black/white levels and the camera's
/// as-shot white balance.
fn decode_raw_sensor(path: &Path) -> Result<DynamicImage> {
    let raw = rawloader::decode_file(path)
        .map_err(|e| Error::decode(path, format!("raw decode failed: {e:?}")))?;

    let width = raw.width;
    let height = raw.height;
    if raw.cpp != 1 || width < 2 || height < 2 {
        return Err(Error::decode(path, "unsupported raw sensor layout"));
    }

    let value_at = |row: usize, col: usize| -> f32 {
        match &raw.data {
            rawloader::RawImageData::Integer(values) => values[row * width + col] as f32,
            rawloader::RawImageData::Float(values) => values[row * width + col] * 65535.0,
        }
    };

    // Normalize white balance against green, the reference channel.
    let g_ref = raw.wb_coeffs[1].max(0.001);
    let wb = [
        raw.wb_coeffs[0] / g_ref,
        1.0,
        raw.wb_coeffs[2] / g_ref,
        1.0,
    ];

    let out_w = (width / 2) as u32;
    let out_h = (height / 2) as u32;
    let mut out = RgbImage::new(out_w, out_h);

    for by in 0..out_h as usize {
        for bx in 0..out_w as usize {
            // Accumulate the block per CFA color; both greens share a
            // channel.
            let mut sums = [0.0f32; 3];
            let mut counts = [0u32; 3];
            for (dy, dx) in [(0, 0), (0, 1), (1, 0), (1, 1)] {
                let row = by * 2 + dy;
                let col = bx * 2 + dx;
                let color = raw.cfa.color_at(row, col).min(3);
                // Color index 3 is the second green site.
                let channel = if color == 3 { 1 } else { color };
                let black = raw.blacklevels[color] as f32;
                let white = (raw.whitelevels[color] as f32 - black).max(1.0);
                let v = ((value_at(row, col) - black) / white).clamp(0.0, 1.0) * wb[color];
                sums[channel] += v;
                counts[channel] += 1;
            }
            let pixel = std::array::from_fn(|c| {
                let v = if counts[c] > 0 {
                    sums[c] / counts[c] as f32
                } else {
                    0.0
                };
                (v.clamp(0.0, 1.0) * 255.0) as u8
            });
            out.put_pixel(bx as u32, by as u32, image::Rgb(pixel));
        }
    }

    Ok(DynamicImage::ImageRgb8(out))
}

/// Read the raw EXIF orientation (1-8) from a file. Extraction failure
/// must not abort the pipeline, so this is best effort.
pub fn read_exif_orientation(path: &Path) -> Option<u16> {
    let file = std::fs::File::open(path).ok()?;
    let mut reader = std::io::BufReader::new(file);
    let exif = exif::Reader::new().read_from_container(&mut reader).ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    match field.value {
        exif::Value::Short(ref v) => v.first().copied(),
        _ => None,
    }
}

/// Apply an EXIF orientation transform (values 1-8). Out-of-range
/// values fall back to the untransformed image.
pub fn apply_exif_orientation(img: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.rotate90().fliph(),
        6 => img.rotate90(),
        7 => img.rotate270().fliph(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Rotate by visual/clockwise degrees. Values are normalized into
/// {0, 90, 180, 270}; anything off the quarter grid rounds down to the
/// nearest quarter turn at the database layer before reaching here.
pub fn apply_rotation(img: DynamicImage, degrees: i32) -> DynamicImage {
    match degrees.rem_euclid(360) {
        90 => img.rotate90(),
        180 => img.rotate180(),
        270 => img.rotate270(),
        _ => img,
    }
}

/// Flatten alpha onto a white background and coerce exotic color modes
/// to RGB. Grayscale images stay grayscale.
pub fn normalize_color(img: DynamicImage) -> DynamicImage {
    match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLuma16(_) => img,
        DynamicImage::ImageRgb8(_) => img,
        img if img.color().has_alpha() => {
            let rgba = img.to_rgba8();
            let mut rgb = RgbImage::new(rgba.width(), rgba.height());
            for (x, y, pixel) in rgba.enumerate_pixels() {
                let [r, g, b, a] = pixel.0;
                let a = a as u16;
                let blend = |c: u8| ((c as u16 * a + 255 * (255 - a)) / 255) as u8;
                rgb.put_pixel(x, y, image::Rgb([blend(r), blend(g), blend(b)]));
            }
            DynamicImage::ImageRgb8(rgb)
        }
        img => DynamicImage::ImageRgb8(img.to_rgb8()),
    }
}

/// Fit within a square box, preserving aspect ratio, without a
/// downscale-only restriction.
pub fn resize_to_box(img: &DynamicImage, box_px: u32) -> DynamicImage {
    img.resize(box_px, box_px, FilterType::Lanczos3)
}

/// Full transform for one photo: decode, apply embedded orientation,
/// apply the user rotation, normalize color. The caller resizes per
/// target box.
pub fn render(path: &Path, exif_orientation: Option<i32>, user_rotation: i32) -> Result<DynamicImage> {
    let img = load_source(path)?;

    // Prefer the catalog's captured orientation; re-reading the file
    // covers photos ingested before orientation was recorded. A failed
    // extraction falls back to the untransformed image.
    let orientation = exif_orientation
        .and_then(|o| u16::try_from(o).ok())
        .or_else(|| read_exif_orientation(path))
        .unwrap_or(1);

    let img = apply_exif_orientation(img, orientation);
    let img = apply_rotation(img, user_rotation);
    Ok(normalize_color(img))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, Rgba, RgbaImage};

    /// 2x1 image: red on the left, blue on the right.
    fn red_blue() -> DynamicImage {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 0, 255]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn rotation_is_clockwise_for_the_viewer() {
        // After a 90 CW turn the left-hand red pixel ends up on top,
        // with blue below it.
        let rotated = apply_rotation(red_blue(), 90);
        assert_eq!(rotated.dimensions(), (1, 2));
        assert_eq!(rotated.to_rgb8().get_pixel(0, 0), &Rgb([255, 0, 0]));
        assert_eq!(rotated.to_rgb8().get_pixel(0, 1), &Rgb([0, 0, 255]));

        let back = apply_rotation(apply_rotation(red_blue(), 90), 270);
        assert_eq!(back.to_rgb8().get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn rotation_normalizes_degrees() {
        assert_eq!(apply_rotation(red_blue(), 0).dimensions(), (2, 1));
        assert_eq!(apply_rotation(red_blue(), 360).dimensions(), (2, 1));
        assert_eq!(apply_rotation(red_blue(), 450).dimensions(), (1, 2));
        assert_eq!(apply_rotation(red_blue(), -90).dimensions(), (1, 2));
    }

    #[test]
    fn exif_orientation_6_rotates_clockwise() {
        let oriented = apply_exif_orientation(red_blue(), 6);
        assert_eq!(oriented.dimensions(), (1, 2));
        assert_eq!(oriented.to_rgb8().get_pixel(0, 0), &Rgb([255, 0, 0]));
    }

    #[test]
    fn unknown_orientation_is_identity() {
        let img = apply_exif_orientation(red_blue(), 0);
        assert_eq!(img.to_rgb8().get_pixel(0, 0), &Rgb([255, 0, 0]));
        let img = apply_exif_orientation(red_blue(), 42);
        assert_eq!(img.to_rgb8().get_pixel(1, 0), &Rgb([0, 0, 255]));
    }

    #[test]
    fn alpha_flattens_onto_white() {
        let mut img = RgbaImage::new(1, 1);
        img.put_pixel(0, 0, Rgba([255, 0, 0, 0]));
        let flat = normalize_color(DynamicImage::ImageRgba8(img));
        // Fully transparent red becomes white.
        assert_eq!(flat.to_rgb8().get_pixel(0, 0), &Rgb([255, 255, 255]));

        let mut img = RgbaImage::new(1, 1);
        img.put_pixel(0, 0, Rgba([0, 0, 0, 255]));
        let flat = normalize_color(DynamicImage::ImageRgba8(img));
        assert_eq!(flat.to_rgb8().get_pixel(0, 0), &Rgb([0, 0, 0]));
    }

    #[test]
    fn grayscale_stays_grayscale() {
        let img = DynamicImage::new_luma8(4, 4);
        assert!(matches!(
            normalize_color(img),
            DynamicImage::ImageLuma8(_)
        ));
    }

    #[test]
    fn resize_fits_longest_edge() {
        let img = DynamicImage::new_rgb8(400, 200);
        let resized = resize_to_box(&img, 150);
        assert_eq!(resized.dimensions(), (150, 75));

        let img = DynamicImage::new_rgb8(200, 400);
        let resized = resize_to_box(&img, 150);
        assert_eq!(resized.dimensions(), (75, 150));
    }

    #[test]
    fn decode_failure_reports_per_photo_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.jpg");
        std::fs::write(&path, b"not an image").unwrap();

        match load_source(&path) {
            Err(Error::Decode { .. }) => {}
            other => panic!("expected Decode error, got {other:?}"),
        }
    }

    #[test]
    fn embedded_jpeg_scan_finds_largest_stream() {
        // Build a blob with a real JPEG inside junk bytes.
        let mut jpeg_bytes = Vec::new();
        let img = DynamicImage::new_rgb8(8, 8);
        img.write_to(
            &mut std::io::Cursor::new(&mut jpeg_bytes),
            image::ImageFormat::Jpeg,
        )
        .unwrap();

        let mut blob = vec![0u8; 128];
        blob.extend_from_slice(&jpeg_bytes);
        blob.extend_from_slice(&[0u8; 64]);

        let decoded = decode_largest_jpeg(&blob, 0).expect("embedded stream should decode");
        assert_eq!(decoded.dimensions(), (8, 8));
    }
}
