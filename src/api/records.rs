//! `/api` record endpoints (images, histories, imports)
//!
//! Handlers validate query parameters, hand the work to the record facade on
//! the blocking pool, and wrap the result in the response envelope.

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::task;

use crate::error::{AppError, AppResult};
use crate::state::data::{
    HistoryCreateRequest, HistoryListQuery, HistoryRecord, HistoryRename, HistorySortField,
    HistoryUpdatePayload, ImageCreateRequest, ImageListQuery, ImageRecord, ImageSortField,
    ImageUpdateRequest, ImportCreateRequest, ImportRecord, ImportStatusUpdate, SortOrder,
};
use crate::state::library::Library;
use crate::state::records::{RecordError, Records};

use super::envelope::{pagination, ApiResponse};
use super::AppState;

const MAX_PAGE_SIZE: usize = 100;

type Reply<T> = AppResult<Json<ApiResponse<T>>>;

/// Run a facade call on the blocking pool (SQLite calls block)
async fn with_records<T, F>(state: &AppState, op: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce(&Records<Library>) -> Result<T, RecordError> + Send + 'static,
{
    let records = state.records.clone();
    task::spawn_blocking(move || op(&records))
        .await
        .map_err(|e| AppError::Internal(format!("store task failed: {e}")))?
        .map_err(AppError::from)
}

fn page_bounds(skip: Option<usize>, limit: Option<usize>) -> AppResult<(usize, usize)> {
    let limit = limit.unwrap_or(10);
    if !(1..=MAX_PAGE_SIZE).contains(&limit) {
        return Err(AppError::Validation(format!(
            "limit must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }
    let skip = skip.unwrap_or(0);
    // SQLite offsets are signed 64-bit
    if i64::try_from(skip).is_err() {
        return Err(AppError::Validation(format!("skip must be at most {}", i64::MAX)));
    }
    Ok((skip, limit))
}

// ========== Images ==========

#[derive(Debug, Default, Deserialize)]
pub struct ImageListParams {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub sort_by: Option<String>,
    pub sort_order: Option<i32>,
}

impl ImageListParams {
    fn into_query(self) -> AppResult<ImageListQuery> {
        let (skip, limit) = page_bounds(self.skip, self.limit)?;

        let sort_by = match self.sort_by.as_deref() {
            None => ImageSortField::default(),
            Some(raw) => ImageSortField::parse(raw).ok_or_else(|| {
                AppError::Validation(
                    "sort_by must be one of 'created_at', 'updated_at', 'name', 'cols', 'rows'"
                        .to_string(),
                )
            })?,
        };

        let sort_order = match self.sort_order {
            None => SortOrder::Desc,
            Some(direction) => SortOrder::from_direction(direction).ok_or_else(|| {
                AppError::Validation("sort_order must be 1 (asc) or -1 (desc)".to_string())
            })?,
        };

        Ok(ImageListQuery {
            skip,
            limit,
            sort_by,
            sort_order,
        })
    }
}

pub async fn create_image(
    State(state): State<AppState>,
    payload: Result<Json<ImageCreateRequest>, JsonRejection>,
) -> Reply<ImageRecord> {
    let Json(request) = payload?;
    let record = with_records(&state, move |r| r.create_image(request)).await?;
    tracing::info!(id = %record.id, "🖼️ image saved");
    Ok(Json(ApiResponse::ok("Image created successfully", record)))
}

pub async fn get_image(State(state): State<AppState>, Path(id): Path<String>) -> Reply<ImageRecord> {
    let record = with_records(&state, move |r| r.get_image(&id)).await?;
    Ok(Json(ApiResponse::ok("Image retrieved successfully", record)))
}

pub async fn list_images(
    State(state): State<AppState>,
    params: Result<Query<ImageListParams>, QueryRejection>,
) -> Reply<Value> {
    let Query(params) = params?;
    let query = params.into_query()?;
    let (skip, limit) = (query.skip, query.limit);

    let page = with_records(&state, move |r| r.list_images(&query)).await?;
    let paging = pagination(&page, skip, limit);

    Ok(Json(ApiResponse::ok(
        format!("Retrieved {} images", page.items.len()),
        json!({
            "items": page.items,
            "pagination": paging,
        }),
    )))
}

pub async fn update_image(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<ImageUpdateRequest>, JsonRejection>,
) -> Reply<ImageRecord> {
    let Json(update) = payload?;
    let record = with_records(&state, move |r| r.update_image(&id, update)).await?;
    Ok(Json(ApiResponse::ok("Image updated successfully", record)))
}

pub async fn delete_image(State(state): State<AppState>, Path(id): Path<String>) -> Reply<()> {
    with_records(&state, move |r| r.delete_image(&id)).await?;
    Ok(Json(ApiResponse::message("Image deleted successfully")))
}

// ========== Histories ==========

#[derive(Debug, Default, Deserialize)]
pub struct HistoryListParams {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
    pub search: Option<String>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl HistoryListParams {
    fn into_query(self) -> AppResult<HistoryListQuery> {
        let (skip, limit) = page_bounds(self.skip, self.limit)?;

        let sort_by = match self.sort_by.as_deref() {
            None => HistorySortField::default(),
            Some(raw) => HistorySortField::parse(raw).ok_or_else(|| {
                AppError::Validation("sort_by must be 'name' or 'updatedAt'".to_string())
            })?,
        };

        let sort_order = match self.sort_order.as_deref() {
            None => SortOrder::Desc,
            Some(raw) => SortOrder::parse(raw).ok_or_else(|| {
                AppError::Validation("sort_order must be 'asc' or 'desc'".to_string())
            })?,
        };

        Ok(HistoryListQuery {
            skip,
            limit,
            sort_by,
            sort_order,
            search: self.search,
        })
    }
}

pub async fn create_history(
    State(state): State<AppState>,
    payload: Result<Json<HistoryCreateRequest>, JsonRejection>,
) -> Reply<HistoryRecord> {
    let Json(request) = payload?;
    let record = with_records(&state, move |r| r.create_history(request)).await?;
    tracing::info!(value_id = %record.value.id, "🧩 level saved");
    Ok(Json(ApiResponse::ok("History created successfully", record)))
}

pub async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Reply<HistoryRecord> {
    let record = with_records(&state, move |r| r.get_history(&id)).await?;
    Ok(Json(ApiResponse::ok("History retrieved successfully", record)))
}

pub async fn list_histories(
    State(state): State<AppState>,
    params: Result<Query<HistoryListParams>, QueryRejection>,
) -> Reply<Value> {
    let Query(params) = params?;
    let query = params.into_query()?;
    let echo = query.clone();

    let page = with_records(&state, move |r| r.list_histories(&query)).await?;

    let message = match echo.search.as_deref() {
        Some(search) if !search.is_empty() => {
            format!("Found {} histories matching '{search}'", page.items.len())
        }
        _ => format!("Retrieved {} histories", page.items.len()),
    };
    let paging = pagination(&page, echo.skip, echo.limit);

    Ok(Json(ApiResponse::ok(
        message,
        json!({
            "items": page.items,
            "pagination": paging,
            "sort": {
                "by": echo.sort_by.as_str(),
                "order": echo.sort_order.as_str(),
            },
            "search": echo.search,
        }),
    )))
}

pub async fn update_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<HistoryUpdatePayload>, JsonRejection>,
) -> Reply<HistoryRecord> {
    let Json(payload) = payload?;
    let level = payload.into_level();
    let record = with_records(&state, move |r| r.update_history_level(&id, level)).await?;
    Ok(Json(ApiResponse::ok("History level updated successfully", record)))
}

pub async fn rename_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<HistoryRename>, JsonRejection>,
) -> Reply<HistoryRecord> {
    let Json(rename) = payload?;
    let name = rename
        .name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Field 'name' is required".to_string()))?;

    let record = with_records(&state, move |r| r.rename_history(&id, &name)).await?;
    Ok(Json(ApiResponse::ok("History name updated successfully", record)))
}

pub async fn delete_history(State(state): State<AppState>, Path(id): Path<String>) -> Reply<()> {
    with_records(&state, move |r| r.delete_history(&id)).await?;
    Ok(Json(ApiResponse::message("History deleted successfully")))
}

// ========== Imports ==========

#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub skip: Option<usize>,
    pub limit: Option<usize>,
}

/// Status update fields; accepted from the query string and/or a JSON body
#[derive(Debug, Default, Deserialize)]
pub struct ImportStatusParams {
    pub status: Option<String>,
    pub processed_items: Option<u64>,
    pub failed_items: Option<u64>,
    pub error_message: Option<String>,
}

impl ImportStatusParams {
    /// Query values win; the body fills whatever the query left out
    fn merge(self, body: ImportStatusParams) -> AppResult<ImportStatusUpdate> {
        let status = self
            .status
            .or(body.status)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| AppError::Validation("Field 'status' is required".to_string()))?;

        Ok(ImportStatusUpdate {
            status,
            processed_items: self.processed_items.or(body.processed_items),
            failed_items: self.failed_items.or(body.failed_items),
            error_message: self.error_message.or(body.error_message),
        })
    }
}

pub async fn create_import(
    State(state): State<AppState>,
    payload: Result<Json<ImportCreateRequest>, JsonRejection>,
) -> Reply<ImportRecord> {
    let Json(request) = payload?;
    let record = with_records(&state, move |r| r.create_import(request)).await?;
    tracing::info!(id = %record.id, source = %record.source, "📥 import registered");
    Ok(Json(ApiResponse::ok("Import created successfully", record)))
}

pub async fn get_import(State(state): State<AppState>, Path(id): Path<String>) -> Reply<ImportRecord> {
    let record = with_records(&state, move |r| r.get_import(&id)).await?;
    Ok(Json(ApiResponse::ok("Import retrieved successfully", record)))
}

pub async fn update_import_status(
    State(state): State<AppState>,
    Path(id): Path<String>,
    params: Result<Query<ImportStatusParams>, QueryRejection>,
    body: Bytes,
) -> Reply<ImportRecord> {
    let Query(params) = params?;

    let from_body = if body.iter().all(u8::is_ascii_whitespace) {
        ImportStatusParams::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::Validation(format!("invalid status body: {e}")))?
    };
    let update = params.merge(from_body)?;

    let record = with_records(&state, move |r| r.update_import_status(&id, update)).await?;
    tracing::info!(id = %record.id, status = %record.status, "import status updated");
    Ok(Json(ApiResponse::ok("Import status updated successfully", record)))
}

pub async fn list_imports(
    State(state): State<AppState>,
    params: Result<Query<PageParams>, QueryRejection>,
) -> Reply<Value> {
    let Query(params) = params?;
    let (skip, limit) = page_bounds(params.skip, params.limit)?;

    let page = with_records(&state, move |r| r.list_imports(skip, limit)).await?;
    let paging = pagination(&page, skip, limit);

    Ok(Json(ApiResponse::ok(
        format!("Retrieved {} imports", page.items.len()),
        json!({
            "items": page.items,
            "pagination": paging,
        }),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_params_validation() {
        let query = ImageListParams::default().into_query().unwrap();
        assert_eq!(query, ImageListQuery::default());

        let query = ImageListParams {
            sort_by: Some("name".into()),
            sort_order: Some(1),
            ..Default::default()
        }
        .into_query()
        .unwrap();
        assert_eq!(query.sort_by, ImageSortField::Name);
        assert_eq!(query.sort_order, SortOrder::Asc);

        for bad in [
            ImageListParams { limit: Some(0), ..Default::default() },
            ImageListParams { limit: Some(101), ..Default::default() },
            ImageListParams { sort_by: Some("matrix".into()), ..Default::default() },
            ImageListParams { sort_order: Some(0), ..Default::default() },
            ImageListParams { skip: Some(usize::MAX), ..Default::default() },
        ] {
            assert!(matches!(bad.into_query(), Err(AppError::Validation(_))));
        }
    }

    #[test]
    fn test_history_params_validation() {
        let query = HistoryListParams::default().into_query().unwrap();
        assert_eq!(query, HistoryListQuery::default());

        assert!(HistoryListParams {
            sort_by: Some("created_at".into()),
            ..Default::default()
        }
        .into_query()
        .is_err());
        assert!(HistoryListParams {
            sort_order: Some("DESC".into()),
            ..Default::default()
        }
        .into_query()
        .is_err());
    }

    #[test]
    fn test_import_status_merge() {
        let query = ImportStatusParams {
            status: Some("processing".into()),
            processed_items: Some(3),
            ..Default::default()
        };
        let body = ImportStatusParams {
            status: Some("failed".into()),
            processed_items: Some(9),
            error_message: Some("boom".into()),
            ..Default::default()
        };

        let update = query.merge(body).unwrap();
        assert_eq!(update.status, "processing");
        assert_eq!(update.processed_items, Some(3));
        assert_eq!(update.error_message.as_deref(), Some("boom"));

        assert!(matches!(
            ImportStatusParams::default().merge(ImportStatusParams::default()),
            Err(AppError::Validation(_))
        ));
    }
}
