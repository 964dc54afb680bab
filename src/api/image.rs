//! `/image` endpoints: the default palette and image conversion
//!
//! These return bare bodies rather than the record envelope.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Multipart, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::color::{build_palette_rgb, default_color_name, default_palette, rgb_to_hex, Palette, Rgb};
use crate::convert::quantizer::Conversion;
use crate::convert::upload::{convert_upload, parse_palette_override, validate_grid, validate_upload};
use crate::error::{AppError, AppResult};

use super::AppState;

#[derive(Debug, Serialize)]
pub struct PaletteColor {
    pub index: u32,
    /// Normalized `#rrggbb`
    pub hex: String,
    pub rgb: Rgb,
    pub name: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct PaletteResponse {
    pub palette: Palette,
    pub colors: Vec<PaletteColor>,
    pub description: &'static str,
}

pub async fn get_palette() -> AppResult<Json<PaletteResponse>> {
    let palette = default_palette();
    let colors = build_palette_rgb(&palette)
        .map_err(|e| AppError::Internal(e.to_string()))?
        .into_iter()
        .map(|(index, rgb)| PaletteColor {
            index,
            hex: rgb_to_hex(rgb),
            rgb,
            name: default_color_name(index),
        })
        .collect();

    Ok(Json(PaletteResponse {
        palette,
        colors,
        description: "Default palette used for image conversion",
    }))
}

/// `cols`/`rows` may come from the query string as well as the form
#[derive(Debug, Default, Deserialize)]
pub struct ConvertQuery {
    pub cols: Option<u32>,
    pub rows: Option<u32>,
}

/// Fields collected from the multipart form
#[derive(Debug, Default)]
struct ConvertForm {
    file: Option<(Option<String>, Vec<u8>)>,
    cols: Option<u32>,
    rows: Option<u32>,
    palette_override: Option<String>,
}

fn parse_dimension(name: &str, raw: &str) -> AppResult<u32> {
    raw.trim()
        .parse()
        .map_err(|_| AppError::Validation(format!("{name} must be a positive integer, got {raw:?}")))
}

async fn read_form(mut multipart: Multipart) -> AppResult<ConvertForm> {
    let mut form = ConvertForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let content_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                form.file = Some((content_type, bytes.to_vec()));
            }
            "cols" => form.cols = Some(parse_dimension("cols", &field.text().await?)?),
            "rows" => form.rows = Some(parse_dimension("rows", &field.text().await?)?),
            "palette_override" => {
                let text = field.text().await?;
                if !text.trim().is_empty() {
                    form.palette_override = Some(text);
                }
            }
            other => tracing::debug!(field = other, "ignoring unknown form field"),
        }
    }

    Ok(form)
}

/// Convert an uploaded image into an indexed pixel matrix
pub async fn convert_image(
    State(state): State<AppState>,
    query: Result<Query<ConvertQuery>, QueryRejection>,
    multipart: Multipart,
) -> AppResult<Json<Conversion>> {
    let Query(query) = query?;
    let form = read_form(multipart).await?;
    let settings = &state.settings;

    let (content_type, data) = form
        .file
        .ok_or_else(|| AppError::Validation("Field 'file' is required".to_string()))?;

    validate_upload(content_type.as_deref(), data.len(), settings.max_image_size)?;

    let cols = form.cols.or(query.cols).unwrap_or(settings.default_cols);
    let rows = form.rows.or(query.rows).unwrap_or(settings.default_rows);
    validate_grid(cols, rows, settings.max_grid_dim)?;

    let palette = match form.palette_override.as_deref() {
        Some(raw) => parse_palette_override(raw, &default_palette())?,
        None => default_palette(),
    };

    tracing::info!(
        bytes = data.len(),
        cols,
        rows,
        colors = palette.len(),
        "🎨 converting image"
    );

    let conversion = convert_upload(data, cols, rows, palette).await?;
    Ok(Json(conversion))
}
