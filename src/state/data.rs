/// Shared data structures for the record store
///
/// These structs represent the documents that flow between the
/// HTTP layer and the database layer. Field names on the wire match the
/// stored JSON documents exactly.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::color::Palette;

/// Row-major grid of palette indices
pub type Matrix = Vec<Vec<u32>>;

// ========== Images ==========

/// A saved pixel-art image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Store-assigned identifier
    pub id: String,
    pub name: String,
    /// Where the source image came from, if known
    #[serde(default)]
    pub url: Option<String>,
    pub matrix: Matrix,
    /// Palette entries used by `matrix`
    pub palette: Palette,
    pub cols: u32,
    pub rows: u32,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImageCreateRequest {
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    pub matrix: Matrix,
    pub palette: Palette,
    pub cols: u32,
    pub rows: u32,
    #[serde(default)]
    pub metadata: Option<Value>,
}

/// Partial image update; `None` fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImageUpdateRequest {
    pub name: Option<String>,
    pub url: Option<String>,
    pub matrix: Option<Matrix>,
    pub palette: Option<Palette>,
    pub cols: Option<u32>,
    pub rows: Option<u32>,
    pub metadata: Option<Value>,
}

impl ImageUpdateRequest {
    /// True when no field was supplied
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.url.is_none()
            && self.matrix.is_none()
            && self.palette.is_none()
            && self.cols.is_none()
            && self.rows.is_none()
            && self.metadata.is_none()
    }

    /// Copy every supplied field onto `record`
    pub fn apply_to(self, record: &mut ImageRecord) {
        if let Some(name) = self.name {
            record.name = name;
        }
        if let Some(url) = self.url {
            record.url = Some(url);
        }
        if let Some(matrix) = self.matrix {
            record.matrix = matrix;
        }
        if let Some(palette) = self.palette {
            record.palette = palette;
        }
        if let Some(cols) = self.cols {
            record.cols = cols;
        }
        if let Some(rows) = self.rows {
            record.rows = rows;
        }
        if let Some(metadata) = self.metadata {
            record.metadata = Some(metadata);
        }
    }
}

// ========== Puzzle levels ==========

/// One board cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    /// wall / empty / block
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub color: Option<String>,
    /// Pipe / Barrel / Ice / Bomb
    #[serde(default)]
    pub element: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerContent {
    pub color: String,
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    pub slots: u32,
    #[serde(default)]
    pub contents: Vec<ContainerContent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeInfo {
    pub id: String,
    pub contents: Vec<String>,
    /// left / right / up / down
    pub direction: String,
    /// `{x, y}`
    pub position: BTreeMap<String, i64>,
}

fn default_level_status() -> String {
    "pending".to_string()
}

/// Level generation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelConfig {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub block_count: u32,
    pub color_count: u32,
    pub selected_colors: Vec<String>,
    /// Color id -> hex
    pub color_mapping: BTreeMap<String, String>,
    /// symmetric / random
    pub generation_mode: String,
    #[serde(default)]
    pub elements: BTreeMap<String, i64>,
    /// Easy / Medium / Hard
    pub difficulty: String,
    #[serde(default)]
    pub pipe_count: u32,
    #[serde(default)]
    pub pipe_block_counts: Vec<u32>,
    #[serde(default)]
    pub ice_counts: Vec<u32>,
    #[serde(default)]
    pub bomb_counts: Vec<u32>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default = "default_level_status")]
    pub status: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// A puzzle level. Stored and validated for shape only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelData {
    #[serde(default)]
    pub id: Option<String>,
    pub config: LevelConfig,
    pub board: Vec<Vec<Cell>>,
    pub containers: Vec<Container>,
    pub difficulty_score: i64,
    pub solvable: bool,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub pipe_info: Option<Vec<PipeInfo>>,
    #[serde(default)]
    pub lock_info: Option<Value>,
}

// ========== Histories ==========

/// The business payload of a history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryValue {
    /// Externally visible identity, assigned at creation
    pub id: String,
    pub name: String,
    pub level: LevelData,
    pub created_at: String,
    pub updated_at: String,
}

/// A saved puzzle level
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    /// Store-assigned identifier (not used for addressing)
    pub id: String,
    pub key: String,
    pub value: HistoryValue,
    #[serde(rename = "updatedAt")]
    pub updated_at: String,
    pub timestamp: String,
}

/// `value` as submitted by clients; missing ids/timestamps are generated
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryValueInput {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub level: LevelData,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

fn default_history_key() -> String {
    "history".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryCreateRequest {
    #[serde(default = "default_history_key")]
    pub key: String,
    pub value: HistoryValueInput,
}

/// Body of a history level update: either `{level: {...}}` or the level itself
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum HistoryUpdatePayload {
    Wrapped { level: LevelData },
    Direct(LevelData),
}

impl HistoryUpdatePayload {
    pub fn into_level(self) -> LevelData {
        match self {
            Self::Wrapped { level } | Self::Direct(level) => level,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryRename {
    #[serde(default)]
    pub name: Option<String>,
}

// ========== Imports ==========

/// Well-known import states. Other strings are stored as given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ImportStatus {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether moving to `status` should stamp `completed_at`
    pub fn is_terminal(status: &str) -> bool {
        status == Self::Completed.as_str() || status == Self::Failed.as_str()
    }
}

/// Caller-reported progress of a bulk import
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub id: String,
    /// file / url / api ...
    pub source: String,
    pub status: String,
    pub total_items: u64,
    pub processed_items: u64,
    pub failed_items: u64,
    #[serde(default)]
    pub error_message: Option<String>,
    pub started_at: String,
    #[serde(default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ImportCreateRequest {
    pub source: String,
    #[serde(default)]
    pub total_items: u64,
    #[serde(default)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ImportStatusUpdate {
    pub status: String,
    pub processed_items: Option<u64>,
    pub failed_items: Option<u64>,
    pub error_message: Option<String>,
}

// ========== Listing ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "asc" => Some(Self::Asc),
            "desc" => Some(Self::Desc),
            _ => None,
        }
    }

    /// Mongo-style direction: `1` ascending, `-1` descending
    pub fn from_direction(direction: i32) -> Option<Self> {
        match direction {
            1 => Some(Self::Asc),
            -1 => Some(Self::Desc),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageSortField {
    #[default]
    CreatedAt,
    UpdatedAt,
    Name,
    Cols,
    Rows,
}

impl ImageSortField {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "created_at" => Some(Self::CreatedAt),
            "updated_at" => Some(Self::UpdatedAt),
            "name" => Some(Self::Name),
            "cols" => Some(Self::Cols),
            "rows" => Some(Self::Rows),
            _ => None,
        }
    }

    /// Document field used for store-native ordering
    pub const fn field(self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::Name => "name",
            Self::Cols => "cols",
            Self::Rows => "rows",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistorySortField {
    Name,
    #[default]
    UpdatedAt,
}

impl HistorySortField {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "name" => Some(Self::Name),
            "updatedAt" => Some(Self::UpdatedAt),
            _ => None,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::UpdatedAt => "updatedAt",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageListQuery {
    pub skip: usize,
    pub limit: usize,
    pub sort_by: ImageSortField,
    pub sort_order: SortOrder,
}

impl Default for ImageListQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: 10,
            sort_by: ImageSortField::default(),
            sort_order: SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistoryListQuery {
    pub skip: usize,
    pub limit: usize,
    pub sort_by: HistorySortField,
    pub sort_order: SortOrder,
    /// Case-insensitive substring of `value.name`
    pub search: Option<String>,
}

impl Default for HistoryListQuery {
    fn default() -> Self {
        Self {
            skip: 0,
            limit: 10,
            sort_by: HistorySortField::default(),
            sort_order: SortOrder::Desc,
            search: None,
        }
    }
}

/// One page of results plus the size of the full result set
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Which collection a record belongs to (used in error messages)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Image,
    History,
    Import,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Image => "Image",
            Self::History => "History",
            Self::Import => "Import",
        })
    }
}
