//! Record store facade
//!
//! Typed CRUD over images, histories and imports on top of any
//! [`DocumentStore`]. The store is injected, so everything here runs against
//! an in-memory SQLite database in tests.

use chrono::{SecondsFormat, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use super::data::{
    HistoryCreateRequest, HistoryListQuery, HistoryRecord, HistorySortField, HistoryValue,
    ImageCreateRequest, ImageListQuery, ImageRecord, ImageSortField, ImageUpdateRequest,
    ImportCreateRequest, ImportRecord, ImportStatus, ImportStatusUpdate, LevelData, Page,
    RecordKind, SortOrder,
};
use super::library::{Collection, DocumentStore, FieldOrder, StoreError};
use super::sort::sort_by_name;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("{0} not found")]
    NotFound(RecordKind),

    #[error("{0}")]
    Invalid(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Current time as ISO-8601 with millisecond precision
pub fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn new_key() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Whether `id` has the shape of a key this store hands out
fn is_record_key(id: &str) -> bool {
    Uuid::try_parse(id)
        .map(|uuid| uuid.simple().to_string() == id)
        .unwrap_or(false)
}

/// `level_<unix millis>_<8 hex>`
fn new_level_id() -> String {
    let suffix = new_key();
    format!("level_{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
}

fn encode<T: Serialize>(record: &T) -> Result<Value, RecordError> {
    serde_json::to_value(record).map_err(|e| StoreError::from(e).into())
}

fn decode<T: DeserializeOwned>(doc: Value) -> Result<T, RecordError> {
    serde_json::from_value(doc).map_err(|e| StoreError::from(e).into())
}

fn decode_all<T: DeserializeOwned>(docs: Vec<Value>) -> Result<Vec<T>, RecordError> {
    docs.into_iter().map(decode).collect()
}

fn paginate<T>(items: Vec<T>, skip: usize, limit: usize) -> Vec<T> {
    items.into_iter().skip(skip).take(limit).collect()
}

fn missing(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, str::is_empty)
}

/// CRUD facade over an injected document store
pub struct Records<S> {
    store: S,
}

impl<S: DocumentStore> Records<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ========== Images ==========

    pub fn create_image(&self, request: ImageCreateRequest) -> Result<ImageRecord, RecordError> {
        let timestamp = now();
        let record = ImageRecord {
            id: new_key(),
            name: request.name,
            url: request.url,
            matrix: request.matrix,
            palette: request.palette,
            cols: request.cols,
            rows: request.rows,
            created_at: timestamp.clone(),
            updated_at: timestamp,
            metadata: request.metadata,
        };

        self.store
            .insert(Collection::Images, &record.id, &encode(&record)?)?;
        tracing::debug!(id = %record.id, name = %record.name, "image created");

        Ok(record)
    }

    pub fn get_image(&self, id: &str) -> Result<ImageRecord, RecordError> {
        if !is_record_key(id) {
            return Err(RecordError::NotFound(RecordKind::Image));
        }

        match self.store.get(Collection::Images, id)? {
            Some(doc) => decode(doc),
            None => Err(RecordError::NotFound(RecordKind::Image)),
        }
    }

    pub fn list_images(&self, query: &ImageListQuery) -> Result<Page<ImageRecord>, RecordError> {
        let items = if query.sort_by == ImageSortField::Name {
            // Numeric-aware ordering happens here, not in the store
            let all: Vec<ImageRecord> = decode_all(self.store.all(Collection::Images)?)?;
            paginate(sort_by_name(all, query.sort_order), query.skip, query.limit)
        } else {
            let order = FieldOrder {
                field: query.sort_by.field(),
                order: query.sort_order,
            };
            decode_all(
                self.store
                    .list(Collection::Images, order, query.skip, query.limit)?,
            )?
        };

        Ok(Page {
            items,
            total: self.store.count(Collection::Images)?,
        })
    }

    /// Apply the supplied fields. An empty update returns the record as is.
    pub fn update_image(
        &self,
        id: &str,
        update: ImageUpdateRequest,
    ) -> Result<ImageRecord, RecordError> {
        let mut record = self.get_image(id)?;
        if update.is_empty() {
            return Ok(record);
        }

        update.apply_to(&mut record);
        record.updated_at = now();

        if !self
            .store
            .replace(Collection::Images, id, &encode(&record)?)?
        {
            return Err(RecordError::NotFound(RecordKind::Image));
        }

        Ok(record)
    }

    pub fn delete_image(&self, id: &str) -> Result<(), RecordError> {
        if is_record_key(id) && self.store.delete(Collection::Images, id)? {
            Ok(())
        } else {
            Err(RecordError::NotFound(RecordKind::Image))
        }
    }

    // ========== Histories ==========

    /// Store a level, generating whatever identity and timestamps are missing.
    ///
    /// `value.id` becomes the externally visible id; the level and its config
    /// inherit it unless they carry their own.
    pub fn create_history(
        &self,
        request: HistoryCreateRequest,
    ) -> Result<HistoryRecord, RecordError> {
        let current = now();
        let input = request.value;

        let value_id = match input.id {
            Some(id) if !id.is_empty() => id,
            _ => new_level_id(),
        };

        let mut level = input.level;
        if missing(&level.id) {
            level.id = Some(value_id.clone());
        }
        if missing(&level.config.id) {
            level.config.id = Some(value_id.clone());
        }
        if missing(&level.timestamp) {
            level.timestamp = Some(Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string());
        }
        if missing(&level.config.created_at) {
            level.config.created_at = Some(current.clone());
        }
        if missing(&level.config.updated_at) {
            level.config.updated_at = Some(current.clone());
        }

        let record = HistoryRecord {
            id: new_key(),
            key: request.key,
            value: HistoryValue {
                id: value_id,
                name: input.name,
                level,
                created_at: input
                    .created_at
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| current.clone()),
                updated_at: input
                    .updated_at
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| current.clone()),
            },
            updated_at: current.clone(),
            timestamp: current,
        };

        self.store
            .insert(Collection::Histories, &record.id, &encode(&record)?)?;
        tracing::debug!(value_id = %record.value.id, name = %record.value.name, "history created");

        Ok(record)
    }

    /// Row key and record for a history's `value.id`
    fn find_history(&self, value_id: &str) -> Result<(String, HistoryRecord), RecordError> {
        match self
            .store
            .find_by_field(Collection::Histories, "value.id", value_id)?
        {
            Some((key, doc)) => Ok((key, decode(doc)?)),
            None => Err(RecordError::NotFound(RecordKind::History)),
        }
    }

    fn save_history(&self, key: &str, record: &HistoryRecord) -> Result<(), RecordError> {
        if self
            .store
            .replace(Collection::Histories, key, &encode(record)?)?
        {
            Ok(())
        } else {
            Err(RecordError::NotFound(RecordKind::History))
        }
    }

    pub fn get_history(&self, value_id: &str) -> Result<HistoryRecord, RecordError> {
        self.find_history(value_id).map(|(_, record)| record)
    }

    /// Page through histories.
    ///
    /// Name sorting and search both need every record in hand, so they
    /// filter, sort and paginate in memory. Plain `updatedAt` ordering is
    /// left to the store.
    pub fn list_histories(
        &self,
        query: &HistoryListQuery,
    ) -> Result<Page<HistoryRecord>, RecordError> {
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        if search.is_none() && query.sort_by == HistorySortField::UpdatedAt {
            let order = FieldOrder {
                field: "updatedAt",
                order: query.sort_order,
            };
            let items = decode_all(self.store.list(
                Collection::Histories,
                order,
                query.skip,
                query.limit,
            )?)?;

            return Ok(Page {
                items,
                total: self.store.count(Collection::Histories)?,
            });
        }

        let mut all: Vec<HistoryRecord> = decode_all(self.store.all(Collection::Histories)?)?;

        if let Some(needle) = &search {
            all.retain(|h| h.value.name.to_lowercase().contains(needle.as_str()));
        }

        let sorted = match query.sort_by {
            HistorySortField::Name => sort_by_name(all, query.sort_order),
            HistorySortField::UpdatedAt => {
                match query.sort_order {
                    SortOrder::Asc => all.sort_by(|a, b| a.updated_at.cmp(&b.updated_at)),
                    SortOrder::Desc => all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at)),
                }
                all
            }
        };

        let total = sorted.len();
        Ok(Page {
            items: paginate(sorted, query.skip, query.limit),
            total,
        })
    }

    /// Replace the stored level of a history
    pub fn update_history_level(
        &self,
        value_id: &str,
        level: LevelData,
    ) -> Result<HistoryRecord, RecordError> {
        let (key, mut record) = self.find_history(value_id)?;

        let current = now();
        record.value.level = level;
        record.value.updated_at = current.clone();
        record.updated_at = current;

        self.save_history(&key, &record)?;
        Ok(record)
    }

    pub fn rename_history(&self, value_id: &str, name: &str) -> Result<HistoryRecord, RecordError> {
        if name.trim().is_empty() {
            return Err(RecordError::Invalid("Name is required".to_string()));
        }

        let (key, mut record) = self.find_history(value_id)?;

        let current = now();
        record.value.name = name.to_string();
        record.value.updated_at = current.clone();
        record.updated_at = current;

        self.save_history(&key, &record)?;
        Ok(record)
    }

    pub fn delete_history(&self, value_id: &str) -> Result<(), RecordError> {
        let (key, _) = self.find_history(value_id)?;
        if self.store.delete(Collection::Histories, &key)? {
            Ok(())
        } else {
            Err(RecordError::NotFound(RecordKind::History))
        }
    }

    // ========== Imports ==========

    pub fn create_import(&self, request: ImportCreateRequest) -> Result<ImportRecord, RecordError> {
        let record = ImportRecord {
            id: new_key(),
            source: request.source,
            status: ImportStatus::Pending.as_str().to_string(),
            total_items: request.total_items,
            processed_items: 0,
            failed_items: 0,
            error_message: None,
            started_at: now(),
            completed_at: None,
            metadata: request.metadata,
        };

        self.store
            .insert(Collection::Imports, &record.id, &encode(&record)?)?;
        tracing::debug!(id = %record.id, source = %record.source, "import started");

        Ok(record)
    }

    pub fn get_import(&self, id: &str) -> Result<ImportRecord, RecordError> {
        if !is_record_key(id) {
            return Err(RecordError::NotFound(RecordKind::Import));
        }

        match self.store.get(Collection::Imports, id)? {
            Some(doc) => decode(doc),
            None => Err(RecordError::NotFound(RecordKind::Import)),
        }
    }

    /// Record caller-reported progress. Any status string is accepted.
    pub fn update_import_status(
        &self,
        id: &str,
        update: ImportStatusUpdate,
    ) -> Result<ImportRecord, RecordError> {
        let mut record = self.get_import(id)?;

        if ImportStatus::parse(&update.status).is_none() {
            tracing::debug!(id, status = %update.status, "non-standard import status");
        }
        if ImportStatus::is_terminal(&update.status) {
            record.completed_at = Some(now());
        }

        record.status = update.status;
        if let Some(processed) = update.processed_items {
            record.processed_items = processed;
        }
        if let Some(failed) = update.failed_items {
            record.failed_items = failed;
        }
        if let Some(message) = update.error_message {
            record.error_message = Some(message);
        }

        if !self
            .store
            .replace(Collection::Imports, id, &encode(&record)?)?
        {
            return Err(RecordError::NotFound(RecordKind::Import));
        }

        Ok(record)
    }

    /// Newest first
    pub fn list_imports(&self, skip: usize, limit: usize) -> Result<Page<ImportRecord>, RecordError> {
        let order = FieldOrder {
            field: "started_at",
            order: SortOrder::Desc,
        };
        let items = decode_all(self.store.list(Collection::Imports, order, skip, limit)?)?;

        Ok(Page {
            items,
            total: self.store.count(Collection::Imports)?,
        })
    }
}
