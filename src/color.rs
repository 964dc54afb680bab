//! Palette color utilities
//!
//! This module handles the color side of image quantization:
//! - Hex string <-> RGB conversion
//! - The default 12-color puzzle palette
//! - Nearest palette entry lookup (squared Euclidean distance in RGB)

use indexmap::IndexMap;
use thiserror::Error;

/// An 8-bit RGB triple
pub type Rgb = [u8; 3];

/// Palette index -> hex color string ("#rrggbb" or "rrggbb").
///
/// Insertion order is preserved so that equidistant colors always resolve
/// to the entry that was declared first.
pub type Palette = IndexMap<u32, String>;

/// Palette index -> decoded RGB, same order as the source [`Palette`]
pub type PaletteRgb = IndexMap<u32, Rgb>;

/// Default puzzle palette (index, hex, name)
const DEFAULT_PALETTE: [(u32, &str, &str); 12] = [
    (1, "#ff0000", "red"),
    (2, "#0000ff", "blue"),
    (3, "#00ff00", "green"),
    (4, "#ffff00", "yellow"),
    (5, "#ff9900", "orange"),
    (6, "#9900ff", "purple"),
    (7, "#ff00ff", "pink"),
    (8, "#00ffff", "cyan"),
    (9, "#4a86e8", "light blue"),
    (10, "#876670", "brown"),
    (11, "#b7b7b7", "grey"),
    (12, "#ffffff", "white"),
];

/// Errors produced while decoding or matching palette colors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ColorError {
    /// The string is not `#rrggbb` / `rrggbb`
    #[error("invalid color format: {0:?}")]
    InvalidColorFormat(String),

    /// There is nothing to match against
    #[error("palette is empty")]
    EmptyPalette,
}

/// Build the default palette in declaration order
pub fn default_palette() -> Palette {
    DEFAULT_PALETTE
        .iter()
        .map(|(idx, hex, _)| (*idx, (*hex).to_string()))
        .collect()
}

/// Human-readable color name for a default palette index
pub fn default_color_name(index: u32) -> Option<&'static str> {
    DEFAULT_PALETTE
        .iter()
        .find(|(idx, _, _)| *idx == index)
        .map(|(_, _, name)| *name)
}

/// Convert a hex color string to an RGB triple
///
/// Accepts an optional leading `#` followed by exactly six hex digits,
/// decoded in R, G, B order. Case-insensitive.
pub fn hex_to_rgb(hex: &str) -> Result<Rgb, ColorError> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);

    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(ColorError::InvalidColorFormat(hex.to_string()));
    }

    let mut rgb = [0u8; 3];
    for (i, channel) in rgb.iter_mut().enumerate() {
        *channel = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
            .map_err(|_| ColorError::InvalidColorFormat(hex.to_string()))?;
    }

    Ok(rgb)
}

/// Convert an RGB triple to a lowercase `#rrggbb` string
pub fn rgb_to_hex(rgb: Rgb) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

/// Decode every palette entry to RGB, keeping the palette's order
pub fn build_palette_rgb(palette: &Palette) -> Result<PaletteRgb, ColorError> {
    palette
        .iter()
        .map(|(idx, hex)| Ok((*idx, hex_to_rgb(hex)?)))
        .collect()
}

/// Find the palette index closest to `rgb`
///
/// Uses squared distance `(r-pr)² + (g-pg)² + (b-pb)²`; no square root
/// is needed since only the ordering matters. On a tie the entry that
/// comes first in the palette wins.
pub fn closest_palette_index(rgb: Rgb, palette_rgb: &PaletteRgb) -> Result<u32, ColorError> {
    let mut best: Option<(u32, u32)> = None;

    for (idx, candidate) in palette_rgb {
        let distance = squared_distance(rgb, *candidate);
        match best {
            Some((_, best_distance)) if distance >= best_distance => {}
            _ => best = Some((*idx, distance)),
        }
        if distance == 0 {
            break;
        }
    }

    best.map(|(idx, _)| idx).ok_or(ColorError::EmptyPalette)
}

#[inline]
fn squared_distance(a: Rgb, b: Rgb) -> u32 {
    let dr = i32::from(a[0]) - i32::from(b[0]);
    let dg = i32::from(a[1]) - i32::from(b[1]);
    let db = i32::from(a[2]) - i32::from(b[2]);
    (dr * dr + dg * dg + db * db) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_to_rgb_with_and_without_hash() {
        assert_eq!(hex_to_rgb("#ff0000").unwrap(), [255, 0, 0]);
        assert_eq!(hex_to_rgb("4a86e8").unwrap(), [0x4a, 0x86, 0xe8]);
        assert_eq!(hex_to_rgb("#B7B7B7").unwrap(), [0xb7, 0xb7, 0xb7]);
    }

    #[test]
    fn test_hex_to_rgb_rejects_malformed() {
        for bad in ["#ff00", "zzzzzz", "#ff00000", "", "#", "+f+f+f", "#ff 000"] {
            assert_eq!(
                hex_to_rgb(bad),
                Err(ColorError::InvalidColorFormat(bad.to_string())),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_hex_round_trip_normalizes_case() {
        for (_, hex) in default_palette() {
            assert_eq!(rgb_to_hex(hex_to_rgb(&hex).unwrap()), hex.to_lowercase());
        }
        assert_eq!(rgb_to_hex(hex_to_rgb("ABCDEF").unwrap()), "#abcdef");
    }

    #[test]
    fn test_exact_match_returns_that_index() {
        let palette_rgb = build_palette_rgb(&default_palette()).unwrap();
        for (idx, rgb) in &palette_rgb {
            assert_eq!(closest_palette_index(*rgb, &palette_rgb).unwrap(), *idx);
        }
    }

    #[test]
    fn test_nearest_color() {
        let palette_rgb = build_palette_rgb(&default_palette()).unwrap();
        // Dark red is closest to red
        assert_eq!(closest_palette_index([200, 10, 10], &palette_rgb).unwrap(), 1);
        // Near-white is closest to white
        assert_eq!(closest_palette_index([250, 250, 250], &palette_rgb).unwrap(), 12);
        // Mid grey falls on the grey entry
        assert_eq!(closest_palette_index([180, 180, 180], &palette_rgb).unwrap(), 11);
    }

    #[test]
    fn test_tie_resolves_to_first_entry() {
        let mut palette_rgb = PaletteRgb::new();
        palette_rgb.insert(7, [0, 0, 0]);
        palette_rgb.insert(3, [20, 0, 0]);
        // Equidistant from both entries
        assert_eq!(closest_palette_index([10, 0, 0], &palette_rgb).unwrap(), 7);

        let mut reversed = PaletteRgb::new();
        reversed.insert(3, [20, 0, 0]);
        reversed.insert(7, [0, 0, 0]);
        assert_eq!(closest_palette_index([10, 0, 0], &reversed).unwrap(), 3);
    }

    #[test]
    fn test_empty_palette() {
        assert_eq!(
            closest_palette_index([1, 2, 3], &PaletteRgb::new()),
            Err(ColorError::EmptyPalette)
        );
    }

    #[test]
    fn test_default_palette_order_and_names() {
        let palette = default_palette();
        assert_eq!(palette.len(), 12);
        assert_eq!(palette.keys().copied().collect::<Vec<_>>(), (1..=12).collect::<Vec<_>>());
        assert_eq!(default_color_name(1), Some("red"));
        assert_eq!(default_color_name(12), Some("white"));
        assert_eq!(default_color_name(99), None);
    }
}
