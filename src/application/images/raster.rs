//! Rasterization of images to PNG with a minimum size, and `data:` URI helpers.

use std::io::Cursor;
use std::sync::{Arc, OnceLock};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::ImageFormat;
use image::imageops::FilterType;
use percent_encoding::percent_decode_str;
use thiserror::Error;

use crate::domain::image::SVG_MIME;

pub const PNG_MIME: &str = "image/png";

/// Largest canvas, in pixels, any rasterization may produce.
pub const MAX_PIXELS: u64 = 50_000_000;

#[derive(Debug, Error)]
pub enum RasterError {
    #[error("failed to parse SVG: {0}")]
    Svg(#[from] usvg::Error),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("failed to allocate a {width}x{height} canvas")]
    Canvas { width: u32, height: u32 },
    #[error("a {width}x{height} canvas exceeds the limit of {} pixels", MAX_PIXELS)]
    TooLarge { width: u32, height: u32 },
    #[error("failed to encode PNG: {0}")]
    Encode(String),
    #[error("malformed data URI")]
    DataUri,
}

static FONTDB: OnceLock<Arc<fontdb::Database>> = OnceLock::new();

fn system_fonts() -> Arc<fontdb::Database> {
    let db = FONTDB.get_or_init(|| {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        Arc::new(db)
    });
    Arc::clone(db)
}

/// Output size for an image of `width`x`height` so that its smaller side reaches `min`.
///
/// Images already at least `min` on both sides keep their natural size; otherwise the
/// aspect ratio is preserved and the larger side is rounded.
pub fn target_dimensions(width: u32, height: u32, min: u32) -> (u32, u32) {
    if width == 0 || height == 0 || (width >= min && height >= min) {
        return (width.max(1), height.max(1));
    }
    let scale = min as f64 / width.min(height) as f64;
    if width <= height {
        (min, (height as f64 * scale).round() as u32)
    } else {
        ((width as f64 * scale).round() as u32, min)
    }
}

/// [`target_dimensions`], rejecting canvases above [`MAX_PIXELS`].
pub fn bounded_dimensions(width: u32, height: u32, min: u32) -> Result<(u32, u32), RasterError> {
    let (width, height) = target_dimensions(width, height, min);
    if u64::from(width) * u64::from(height) > MAX_PIXELS {
        return Err(RasterError::TooLarge { width, height });
    }
    Ok((width, height))
}

/// Whether `bytes` look like SVG markup rather than a raster format.
pub fn looks_like_svg(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(512)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    text.starts_with("<svg") || (text.starts_with("<?xml") && text.contains("<svg"))
}

/// Rasterize `bytes` (SVG or any decodable raster format) to PNG.
pub fn rasterize(bytes: &[u8], min: u32) -> Result<Vec<u8>, RasterError> {
    if looks_like_svg(bytes) {
        rasterize_svg(bytes, min)
    } else {
        rasterize_bitmap(bytes, min)
    }
}

fn rasterize_svg(bytes: &[u8], min: u32) -> Result<Vec<u8>, RasterError> {
    let options = usvg::Options {
        fontdb: system_fonts(),
        ..Default::default()
    };
    let tree = usvg::Tree::from_data(bytes, &options)?;

    let natural = tree.size().to_int_size();
    let (width, height) = bounded_dimensions(natural.width(), natural.height(), min)?;
    let mut pixmap =
        tiny_skia::Pixmap::new(width, height).ok_or(RasterError::Canvas { width, height })?;

    let transform = tiny_skia::Transform::from_scale(
        width as f32 / natural.width() as f32,
        height as f32 / natural.height() as f32,
    );
    resvg::render(&tree, transform, &mut pixmap.as_mut());

    pixmap
        .encode_png()
        .map_err(|err| RasterError::Encode(err.to_string()))
}

fn rasterize_bitmap(bytes: &[u8], min: u32) -> Result<Vec<u8>, RasterError> {
    let decoded = image::load_from_memory(bytes)?;
    let (width, height) = bounded_dimensions(decoded.width(), decoded.height(), min)?;
    let resized = if (width, height) == (decoded.width(), decoded.height()) {
        decoded
    } else {
        decoded.resize_exact(width, height, FilterType::Triangle)
    };

    let mut out = Vec::new();
    resized.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
    Ok(out)
}

/// Base64 `data:` URI for `bytes`.
pub fn data_uri(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

pub fn png_data_uri(bytes: &[u8]) -> String {
    data_uri(PNG_MIME, bytes)
}

pub fn svg_data_uri(markup: &str) -> String {
    data_uri(SVG_MIME, markup.as_bytes())
}

/// Payload of a `data:` URI, decoding base64 or percent-encoding as declared.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, RasterError> {
    let rest = uri.strip_prefix("data:").ok_or(RasterError::DataUri)?;
    let (header, payload) = rest.split_once(',').ok_or(RasterError::DataUri)?;
    if header
        .split(';')
        .any(|part| part.trim().eq_ignore_ascii_case("base64"))
    {
        let compact: String = payload.chars().filter(|c| !c.is_whitespace()).collect();
        return STANDARD.decode(compact).map_err(|_| RasterError::DataUri);
    }
    Ok(percent_decode_str(payload).collect())
}
