//! Canonical error record and normalization for every failure shape.
//!
//! Every failure a call can produce (connection error, timeout, malformed
//! JSON, structured server error body, non-JSON error body) is funneled
//! through [`normalize`] into one [`ErrorData`] record, then raised as the
//! single [`ApiError`] type. Callers distinguish failure kinds by the
//! `code` and `status` fields, never by error subtype.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Code assigned when connectivity to the server could not be established.
pub const CODE_UNREACHABLE: &str = "UNREACHABLE";

/// Code assigned when the failure carried no information at all.
pub const CODE_UNKNOWN: &str = "UNKNOWNERROR";

/// Normalized error data carried by every [`ApiError`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    /// Short error description, e.g. "Authorization required".
    pub description: String,
    /// Machine-readable error code, e.g. "EAuthRequired".
    pub code: String,
    /// Extended human-readable message.
    pub message: String,
    /// HTTP status code; 0 when the failure was not an HTTP error.
    pub status: u16,
    /// HTTP status text.
    pub status_text: String,
    /// Path of the request that produced the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_path: Option<String>,
    /// Per-field validation details, e.g. `{"email": "required"}`.
    /// Populated only when the source payload carries an object here; a
    /// non-object `details` value is preserved in `extra` instead.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
    /// Any additional entries the error payload carried.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ErrorData {
    fn seed(request_path: Option<&str>, reason: Option<&str>) -> Self {
        Self {
            description: String::new(),
            code: reason.unwrap_or_default().to_string(),
            message: String::new(),
            status: 0,
            status_text: String::new(),
            request_path: request_path.map(str::to_string),
            details: None,
            extra: Map::new(),
        }
    }
}

/// A failure value before normalization.
///
/// Covers the shapes a request can fail with: nothing at all, an aborted
/// or timed-out call, a bare message, or a structured object (a parsed
/// JSON error body, or a response-like object carrying an `ok` field).
#[derive(Debug, Clone)]
pub enum RawFailure {
    /// No failure value was available.
    Unknown,
    /// The call was cancelled; `name` identifies the cancellation reason.
    Abort { name: String, message: String },
    /// A plain message with no structure.
    Text(String),
    /// A structured error payload.
    Object(Value),
}

impl RawFailure {
    /// Maps a transport-level `reqwest` failure into a normalizer input.
    ///
    /// Connectivity failures (DNS, TCP, TLS) carry the generic
    /// connectivity message so [`normalize`] tags them [`CODE_UNREACHABLE`];
    /// the underlying cause is kept in the description.
    pub fn from_transport(error: &reqwest::Error) -> Self {
        if error.is_connect() {
            return RawFailure::Object(json!({
                "message": "Failed to fetch",
                "description": error.to_string(),
            }));
        }
        if let Some(status) = error.status() {
            return RawFailure::Object(json!({
                "message": error.to_string(),
                "status": status.as_u16(),
                "statusText": status.canonical_reason().unwrap_or_default(),
            }));
        }
        RawFailure::Text(error.to_string())
    }
}

/// Converts any failure shape into a canonical [`ErrorData`] record.
///
/// `request_path` is attached to the record; `reason` is an optional
/// cancellation reason that seeds the code (an abort with a non-generic
/// name still overrides it).
///
/// After normalization `message` and `description` are both populated: if
/// the source provided only one, the other is back-filled from it, and if
/// it provided neither, both fall back to the status text.
pub fn normalize(failure: RawFailure, request_path: Option<&str>, reason: Option<&str>) -> ErrorData {
    let mut ed = ErrorData::seed(request_path, reason);
    match failure {
        RawFailure::Unknown => {
            ed.code = CODE_UNKNOWN.to_string();
            ed.message = "Unknown error".to_string();
        }
        RawFailure::Abort { name, message } => {
            ed.message = message;
            if name != "AbortError" {
                ed.code = name;
            }
        }
        RawFailure::Text(text) => {
            ed.message = text;
        }
        RawFailure::Object(payload) => {
            if let Some(description) = field_str(&payload, "description") {
                ed.description = description;
            }
            if let Some(code) = field_str(&payload, "code") {
                ed.code = code;
            }
            if let Some(message) = field_str(&payload, "message") {
                ed.message = message;
            }
            if let Some(Value::Object(details)) = payload.get("details") {
                ed.details = Some(details.clone());
            }
            if let Some(status) = payload.get("status").and_then(Value::as_u64) {
                // An out-of-range status degrades to 0, "not an HTTP error".
                ed.status = u16::try_from(status).unwrap_or(0);
            }
            if let Some(status_text) = field_str(&payload, "statusText") {
                ed.status_text = status_text;
            }
            if payload.get("ok").is_some_and(|v| !v.is_null()) {
                // Response-like object: the transport status wins over
                // whatever code/message the payload carried.
                ed.code = ed.status.to_string();
                ed.message = ed.status_text.clone();
            } else if ed.message == "Failed to fetch" {
                ed.code = CODE_UNREACHABLE.to_string();
            }
            if let Value::Object(entries) = payload {
                for (key, value) in entries {
                    match key.as_str() {
                        "description" | "code" | "message" | "status" | "statusText" | "ok" => {}
                        // A non-object details value cannot fill the typed
                        // field; keep it among the extras instead.
                        "details" => {
                            if ed.details.is_none() && !value.is_null() {
                                ed.extra.insert(key, value);
                            }
                        }
                        _ => {
                            ed.extra.insert(key, value);
                        }
                    }
                }
            }
        }
    }

    if ed.message.is_empty() && ed.description.is_empty() {
        ed.message = ed.status_text.clone();
    }
    if ed.message.is_empty() {
        ed.message = ed.description.clone();
    }
    if ed.description.is_empty() {
        ed.description = ed.message.clone();
    }
    ed
}

fn field_str(payload: &Value, key: &str) -> Option<String> {
    payload
        .get(key)?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// The single error type raised on every failed request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    /// The normalized error record.
    pub data: ErrorData,
}

impl ApiError {
    pub fn new(data: ErrorData) -> Self {
        Self { data }
    }

    /// Normalizes a failure and wraps it.
    pub fn from_failure(failure: RawFailure, request_path: Option<&str>, reason: Option<&str>) -> Self {
        Self::new(normalize(failure, request_path, reason))
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.data.message.is_empty() {
            write!(f, "{}", self.data.code)
        } else {
            write!(f, "{}", self.data.message)
        }
    }
}

impl std::error::Error for ApiError {}
