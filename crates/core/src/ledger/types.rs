//! Ledger data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Longest error message kept in a record.
pub const MAX_ERROR_LEN: usize = 500;

/// Outcome recorded for a batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerStatus {
    Downloaded,
    Error,
    /// Manual override so the item is attempted again.
    Missing,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Downloaded => "downloaded",
            LedgerStatus::Error => "error",
            LedgerStatus::Missing => "missing",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "downloaded" => Some(LedgerStatus::Downloaded),
            "error" => Some(LedgerStatus::Error),
            "missing" => Some(LedgerStatus::Missing),
            _ => None,
        }
    }
}

/// Latest outcome for one `(batch_id, item_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub batch_id: String,
    pub item_id: String,
    pub title: String,
    /// Empty unless downloaded.
    pub output_path: String,
    pub status: LedgerStatus,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Serialized request that produced this record, replayed by retry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl LedgerRecord {
    pub fn downloaded(
        batch_id: impl Into<String>,
        item_id: impl Into<String>,
        title: impl Into<String>,
        output_path: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            batch_id: batch_id.into(),
            item_id: item_id.into(),
            title: title.into(),
            output_path: output_path.into(),
            status: LedgerStatus::Downloaded,
            url: url.into(),
            error: None,
            request: None,
            updated_at: Utc::now(),
        }
    }

    pub fn failed(
        batch_id: impl Into<String>,
        item_id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        error: &str,
    ) -> Self {
        Self {
            batch_id: batch_id.into(),
            item_id: item_id.into(),
            title: title.into(),
            output_path: String::new(),
            status: LedgerStatus::Error,
            url: url.into(),
            error: Some(truncate_error(error)),
            request: None,
            updated_at: Utc::now(),
        }
    }

    pub fn with_request(mut self, request_json: String) -> Self {
        self.request = Some(request_json);
        self
    }
}

/// Cut an error message to [`MAX_ERROR_LEN`] characters.
pub fn truncate_error(message: &str) -> String {
    match message.char_indices().nth(MAX_ERROR_LEN) {
        Some((idx, _)) => format!("{}...", &message[..idx]),
        None => message.to_string(),
    }
}

/// Whether a batch item still needs to be fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchItemState {
    Downloaded,
    Pending,
}

/// A batch item id annotated with its ledger state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemAnnotation {
    pub item_id: String,
    pub state: BatchItemState,
}
