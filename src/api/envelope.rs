//! Response envelope shared by the record endpoints and error responses
//!
//! `{success, timestamp, message?, data?, error?}` with absent fields omitted.

use serde::Serialize;
use serde_json::{json, Value};

use crate::state::data::Page;
use crate::state::records::now;

#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            timestamp: now(),
            message: Some(message.into()),
            data: Some(data),
            error: None,
        }
    }
}

impl ApiResponse<()> {
    /// Success without a payload (deletes)
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            timestamp: now(),
            message: Some(message.into()),
            data: None,
            error: None,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            timestamp: now(),
            message: None,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// `{skip, limit, total, has_more}`
pub fn pagination<T>(page: &Page<T>, skip: usize, limit: usize) -> Value {
    json!({
        "skip": skip,
        "limit": limit,
        "total": page.total,
        "has_more": skip.saturating_add(limit) < page.total,
    })
}
