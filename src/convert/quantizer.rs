//! Image -> indexed pixel matrix conversion
//!
//! A single pass over the upload:
//! 1. Decode the bytes (PNG/JPEG/WebP/...) and drop any alpha channel
//! 2. Resize to exactly `cols × rows` with nearest-neighbor sampling
//! 3. Map every cell to the closest palette index
//!
//! Nearest-neighbor is required here: a smoothing filter would blend
//! neighbouring pixels into colors that are in neither source region and
//! the pixel-art output would lose its hard edges.

use std::collections::HashSet;

use image::imageops::{self, FilterType};
use serde::Serialize;
use thiserror::Error;

use crate::color::{build_palette_rgb, closest_palette_index, ColorError, Palette};

/// Matrix encoding reported in [`ConversionMeta::mode`]
pub const MODE_INDEX: &str = "index";

/// Conversion failures. The conversion is all-or-nothing.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// Corrupt data or a codec the decoder does not support
    #[error("unreadable image: {0}")]
    UnreadableImage(String),

    /// A caller-supplied palette could not be understood
    #[error("invalid palette override: {0}")]
    InvalidPaletteOverride(String),

    /// `cols` or `rows` is zero or above the configured bound
    #[error("invalid grid size {cols}x{rows}")]
    InvalidDimensions { cols: u32, rows: u32 },

    /// The blocking worker panicked or was cancelled
    #[error("conversion task failed: {0}")]
    TaskFailed(String),

    /// Palette decoding or matching failed
    #[error(transparent)]
    Color(#[from] ColorError),
}

/// Conversion metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversionMeta {
    pub cols: u32,
    pub rows: u32,
    /// Only the palette entries that actually appear in `matrix`
    pub palette: Palette,
    pub mode: &'static str,
}

/// Result of a conversion: `matrix[row][col]` holds a palette index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Conversion {
    pub meta: ConversionMeta,
    pub matrix: Vec<Vec<u32>>,
}

/// Convert encoded image bytes into a `rows × cols` matrix of palette indices
///
/// # Arguments
/// * `image_bytes` - Encoded image (any format the `image` crate decodes)
/// * `cols` / `rows` - Target grid size, both must be positive
/// * `palette` - Candidate colors; iteration order decides ties
///
/// # Returns
/// * The index matrix plus the subset of `palette` that was used
pub fn convert(
    image_bytes: &[u8],
    cols: u32,
    rows: u32,
    palette: &Palette,
) -> Result<Conversion, ConvertError> {
    if cols == 0 || rows == 0 {
        return Err(ConvertError::InvalidDimensions { cols, rows });
    }

    let img = image::load_from_memory(image_bytes)
        .map_err(|e| ConvertError::UnreadableImage(e.to_string()))?
        .to_rgb8();

    tracing::debug!(
        width = img.width(),
        height = img.height(),
        cols,
        rows,
        "decoded image for conversion"
    );

    // Decode the palette once up front, not per pixel
    let palette_rgb = build_palette_rgb(palette)?;
    if palette_rgb.is_empty() {
        return Err(ColorError::EmptyPalette.into());
    }

    let resized = imageops::resize(&img, cols, rows, FilterType::Nearest);

    let mut used = HashSet::new();
    let mut matrix = Vec::with_capacity(rows as usize);

    for y in 0..rows {
        let mut row = Vec::with_capacity(cols as usize);
        for x in 0..cols {
            let idx = closest_palette_index(resized.get_pixel(x, y).0, &palette_rgb)?;
            used.insert(idx);
            row.push(idx);
        }
        matrix.push(row);
    }

    // Report used colors in palette order, with the caller's original hex text
    let used_palette: Palette = palette
        .iter()
        .filter(|(idx, _)| used.contains(*idx))
        .map(|(idx, hex)| (*idx, hex.clone()))
        .collect();

    Ok(Conversion {
        meta: ConversionMeta {
            cols,
            rows,
            palette: used_palette,
            mode: MODE_INDEX,
        },
        matrix,
    })
}
