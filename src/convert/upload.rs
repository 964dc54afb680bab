//! Upload boundary for the converter
//!
//! Validates what arrives over HTTP before any decoding happens, parses
//! palette overrides, and runs the CPU-bound conversion off the async
//! runtime.

use indexmap::IndexMap;
use thiserror::Error;
use tokio::task;

use crate::color::{hex_to_rgb, Palette};

use super::quantizer::{self, Conversion, ConvertError};

/// Content types accepted by the converter
pub const ALLOWED_IMAGE_TYPES: [&str; 3] = ["image/png", "image/jpeg", "image/webp"];

/// Upload rejections (before decoding)
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UploadError {
    #[error("only image/png, image/jpeg, image/webp are supported, got {0:?}")]
    UnsupportedType(String),

    #[error("file is empty")]
    Empty,

    #[error("file too large (max {max_mb:.1}MB)")]
    TooLarge { max_mb: f64 },
}

/// Check content type and size of an uploaded file
pub fn validate_upload(
    content_type: Option<&str>,
    size: usize,
    max_size: usize,
) -> Result<(), UploadError> {
    // "image/png; charset=..." style parameters are ignored
    let mime = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .unwrap_or_default();

    if !ALLOWED_IMAGE_TYPES.contains(&mime.as_str()) {
        return Err(UploadError::UnsupportedType(mime));
    }

    if size == 0 {
        return Err(UploadError::Empty);
    }

    if size > max_size {
        return Err(UploadError::TooLarge {
            max_mb: max_size as f64 / (1024.0 * 1024.0),
        });
    }

    Ok(())
}

/// Check `cols`/`rows` against the configured bound
pub fn validate_grid(cols: u32, rows: u32, max_dim: u32) -> Result<(), ConvertError> {
    if cols == 0 || rows == 0 || cols > max_dim || rows > max_dim {
        return Err(ConvertError::InvalidDimensions { cols, rows });
    }
    Ok(())
}

/// Parse a palette override
///
/// Two forms are accepted:
/// * a JSON object `{"1": "#ff0000", ...}` which replaces `base` entirely
/// * a comma list `1,3` or JSON array `[1,2,4]` selecting entries of `base`
///
/// Anything else, an unknown index, or an empty result is rejected.
pub fn parse_palette_override(raw: &str, base: &Palette) -> Result<Palette, ConvertError> {
    let raw = raw.trim();
    let invalid = |msg: String| ConvertError::InvalidPaletteOverride(msg);

    if raw.starts_with('{') {
        // IndexMap keeps the document's key order
        let entries: IndexMap<String, serde_json::Value> =
            serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?;

        let mut palette = Palette::with_capacity(entries.len());
        for (key, value) in entries {
            let idx: u32 = key
                .trim()
                .parse()
                .map_err(|_| invalid(format!("palette key {key:?} is not an integer")))?;
            let hex = value
                .as_str()
                .ok_or_else(|| invalid(format!("palette value for {key} must be a string")))?;
            hex_to_rgb(hex).map_err(|e| invalid(e.to_string()))?;
            palette.insert(idx, hex.to_string());
        }

        if palette.is_empty() {
            return Err(invalid("palette is empty".to_string()));
        }
        return Ok(palette);
    }

    let indices: Vec<u32> = if raw.starts_with('[') {
        serde_json::from_str(raw).map_err(|e| invalid(e.to_string()))?
    } else {
        raw.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| invalid(format!("{part:?} is not a palette index")))
            })
            .collect::<Result<_, _>>()?
    };

    let mut palette = Palette::with_capacity(indices.len());
    for idx in indices {
        let hex = base
            .get(&idx)
            .ok_or_else(|| invalid(format!("index {idx} is not in the palette")))?;
        palette.insert(idx, hex.clone());
    }

    if palette.is_empty() {
        return Err(invalid("no palette indices given".to_string()));
    }

    Ok(palette)
}

/// Run [`quantizer::convert`] on the blocking pool
pub async fn convert_upload(
    data: Vec<u8>,
    cols: u32,
    rows: u32,
    palette: Palette,
) -> Result<Conversion, ConvertError> {
    // Spawn blocking because decoding and matching are CPU-intensive
    task::spawn_blocking(move || quantizer::convert(&data, cols, rows, &palette))
        .await
        .map_err(|e| ConvertError::TaskFailed(e.to_string()))?
}
