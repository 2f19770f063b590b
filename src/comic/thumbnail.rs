//! Cover thumbnails and scaled page images.
//!
//! ## Naming
//!
//! A thumbnail is named after the record's identifying fields:
//! `Series-Volume-Number-Title.jpg`, with path separators inside values
//! replaced by `-` so the name always stays a single file in the thumbnail
//! directory. When those fields change the file is renamed rather than
//! re-rendered.
//!
//! ## Rendering
//!
//! | Step | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, TIFF, WebP, GIF, BMP) | `image::ImageReader` |
//! | Scale within a square bound | `DynamicImage::resize` with `Lanczos3` |
//! | Encode | `image::codecs::jpeg::JpegEncoder` at the configured quality |

use crate::metadata::{ComicInfo, Tag};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageError, ImageReader, ImageResult};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Thumbnail file name for a metadata record.
pub fn thumbnail_name(info: &ComicInfo) -> String {
    let name = format!(
        "{}-{}-{}-{}.jpg",
        info.get(Tag::Series),
        info.get(Tag::Volume),
        info.get(Tag::Number),
        info.get(Tag::Title)
    );
    name.replace(['/', '\\'], "-")
}

pub fn thumbnail_path(dir: &Path, info: &ComicInfo) -> PathBuf {
    dir.join(thumbnail_name(info))
}

fn load_image(path: &Path) -> ImageResult<DynamicImage> {
    ImageReader::open(path)
        .map_err(ImageError::IoError)?
        .with_guessed_format()
        .map_err(ImageError::IoError)?
        .decode()
}

/// Decode `source` and, when `bound` is set, fit it inside a
/// `bound`×`bound` square keeping the aspect ratio.
pub fn load_scaled(source: &Path, bound: Option<u32>) -> ImageResult<DynamicImage> {
    let img = load_image(source)?;
    Ok(match bound {
        Some(bound) if bound > 0 => img.resize(bound, bound, FilterType::Lanczos3),
        _ => img,
    })
}

/// Encode as baseline JPEG.
pub fn write_jpeg(img: &DynamicImage, dest: &Path, quality: u8) -> ImageResult<()> {
    let file = File::create(dest).map_err(ImageError::IoError)?;
    let mut writer = BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(&mut writer, quality);
    DynamicImage::ImageRgb8(img.to_rgb8()).write_with_encoder(encoder)
}

/// Save a scaled copy of `source` at `dest`. JPEG destinations honour
/// `quality`; other extensions use the `image` crate's defaults.
pub fn save_scaled(source: &Path, dest: &Path, bound: Option<u32>, quality: u8) -> ImageResult<()> {
    let img = load_scaled(source, bound)?;
    let is_jpeg = dest
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("jpg") || e.eq_ignore_ascii_case("jpeg"));
    if is_jpeg {
        write_jpeg(&img, dest, quality)
    } else {
        img.save(dest)
    }
}
