//! Opaque offset cursors for listing endpoints.

use crate::error::{Result, ServiceError};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct CursorPayload {
    offset: i64,
}

pub fn decode_cursor(cursor: &str) -> Result<i64> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor.trim())
        .map_err(|_| ServiceError::InvalidFilter("cursor is not valid base64".into()))?;
    let payload: CursorPayload = serde_json::from_slice(&bytes)
        .map_err(|_| ServiceError::InvalidFilter("cursor payload is malformed".into()))?;
    Ok(payload.offset.max(0))
}

pub fn encode_cursor(offset: i64) -> String {
    let payload = CursorPayload {
        offset: offset.max(0),
    };
    URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    pub next_cursor: Option<String>,
    pub prev_cursor: Option<String>,
    pub limit: i64,
}

impl PaginationMeta {
    /// A full page implies there may be more rows after it.
    pub fn for_page(offset: i64, limit: i64, fetched: usize) -> Self {
        let fetched = i64::try_from(fetched).unwrap_or(i64::MAX);
        Self {
            next_cursor: (fetched >= limit).then(|| encode_cursor(offset.saturating_add(limit))),
            prev_cursor: (offset > 0).then(|| encode_cursor(offset.saturating_sub(limit))),
            limit,
        }
    }
}

/// Clamps a requested page size into `1..=max`, falling back to `default`.
pub fn clamp_limit(requested: Option<i64>, default: i64, max: i64) -> i64 {
    requested.unwrap_or(default).clamp(1, max.max(1))
}
