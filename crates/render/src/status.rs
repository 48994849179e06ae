//! Vendor status vocabulary and result locations.
//!
//! Render relays disagree on field names, so every lookup here tries the
//! known spellings in order and takes the first hit.

use serde::Serialize;
use serde_json::Value;
use storyreel_core::failure::UNKNOWN_ERROR;

const SUCCEEDED: &[&str] = &["succeeded", "success", "completed"];
const FAILED: &[&str] = &["failed", "fail", "error"];
const QUEUED: &[&str] = &["queued", "pending", "submitted", "not_start"];

/// Normalized state of a remote render task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl RenderStatus {
    /// Map a vendor status string, case-insensitively. Unknown values count
    /// as still running.
    pub fn normalize(raw: &str) -> Self {
        let raw = raw.trim().to_lowercase();
        if SUCCEEDED.contains(&raw.as_str()) {
            RenderStatus::Succeeded
        } else if FAILED.contains(&raw.as_str()) {
            RenderStatus::Failed
        } else if QUEUED.contains(&raw.as_str()) {
            RenderStatus::Queued
        } else {
            RenderStatus::Running
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, RenderStatus::Succeeded | RenderStatus::Failed)
    }
}

/// Where a finished render can be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultLocator {
    Url(String),
    /// Bytes fetched from the task's content endpoint.
    Content(Vec<u8>),
}

/// A remote render task as last observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRenderTask {
    pub id: String,
    pub status: RenderStatus,
    pub locator: Option<String>,
}

impl RemoteRenderTask {
    pub fn from_snapshot(id: impl Into<String>, snapshot: &Value) -> Self {
        Self {
            id: id.into(),
            status: status_of(snapshot),
            locator: locator_of(snapshot),
        }
    }
}

// ---------------------------------------------------------------------------
// Field lookups
// ---------------------------------------------------------------------------

fn as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Task id from a creation response: `id`, `ID` or `task_id`.
pub fn task_id_of(body: &Value) -> Option<String> {
    ["/id", "/ID", "/task_id"]
        .iter()
        .find_map(|p| body.pointer(p).and_then(as_string))
}

/// Status from `status`, `STATE` or `data.status`.
pub fn status_of(snapshot: &Value) -> RenderStatus {
    let raw = ["/status", "/STATE", "/data/status"]
        .iter()
        .find_map(|p| snapshot.pointer(p).and_then(as_string))
        .unwrap_or_default();
    RenderStatus::normalize(&raw)
}

/// Result URL from `url`, `output`, `video_url`, `data.video_url` or
/// `data[0].url`.
pub fn locator_of(snapshot: &Value) -> Option<String> {
    ["/url", "/output", "/video_url", "/data/video_url", "/data/0/url"]
        .iter()
        .find_map(|p| snapshot.pointer(p).and_then(as_string))
}

/// Human-readable failure detail from `error` or `fail_reason`.
pub fn failure_detail_of(snapshot: &Value) -> String {
    let detail = ["/error", "/fail_reason"]
        .iter()
        .filter_map(|p| snapshot.pointer(p))
        .find(|v| !v.is_null());

    match detail {
        Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(v @ Value::Object(_)) => v
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| v.to_string()),
        Some(Value::String(_)) | None => UNKNOWN_ERROR.to_string(),
        Some(v) => v.to_string(),
    }
}
