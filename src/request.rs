//! Request descriptor and body payloads.
//!
//! A request is described as plain owned data so the configured
//! pre-processor can rewrite any part of it before dispatch. Multipart
//! parts stay plain data too; the pipeline converts them into a
//! `reqwest::multipart::Form` only at send time, since reqwest forms are
//! consumed on send and cannot round-trip through a rewriting hook.

use reqwest::{Method, Url};
use serde::Serialize;
use serde_json::Value;

use crate::error::{ApiError, RawFailure};

/// One outgoing API call, resolved against the instance configuration.
///
/// Built fresh per call and discarded once the call settles.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Payload>,
    /// Query parameters, appended to the URL in order.
    pub query: Vec<(String, String)>,
    pub base_url: String,
    pub auth_header: String,
    pub include_credentials: bool,
}

impl ApiRequest {
    /// Resolves the full request URL from base, path and query.
    pub fn url(&self) -> Result<Url, ApiError> {
        format_url(&self.base_url, &self.path, &self.query)
    }
}

/// Request body payload.
#[derive(Debug, Clone)]
pub enum Payload {
    /// A structured body, serialized as JSON text on send.
    Json(Value),
    /// Ordered multipart form parts, sent with a transport-assigned
    /// boundary-bearing content type.
    Form(Vec<(String, FormValue)>),
}

impl Payload {
    /// Serializes a structured body into a JSON payload.
    pub fn json<B: Serialize + ?Sized>(body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body)
            .map_err(|e| ApiError::from_failure(RawFailure::Text(e.to_string()), None, None))?;
        Ok(Payload::Json(value))
    }

    pub fn is_form(&self) -> bool {
        matches!(self, Payload::Form(_))
    }
}

/// A single multipart form value.
#[derive(Debug, Clone)]
pub enum FormValue {
    Text(String),
    Bytes {
        data: Vec<u8>,
        file_name: Option<String>,
    },
}

/// Flattens ordered form parts into a reqwest multipart form.
pub(crate) fn into_multipart(parts: Vec<(String, FormValue)>) -> reqwest::multipart::Form {
    let mut form = reqwest::multipart::Form::new();
    for (key, value) in parts {
        form = match value {
            FormValue::Text(text) => form.text(key, text),
            FormValue::Bytes { data, file_name } => {
                let mut part = reqwest::multipart::Part::bytes(data);
                if let Some(name) = file_name {
                    part = part.file_name(name);
                }
                form.part(key, part)
            }
        };
    }
    form
}

/// Builds the request URL: base URL with a trailing slash enforced, path
/// with a leading slash stripped, query pairs encoded and appended in
/// order.
pub fn format_url(base_url: &str, path: &str, query: &[(String, String)]) -> Result<Url, ApiError> {
    let mut base = base_url.to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    let path = path.strip_prefix('/').unwrap_or(path);
    let mut url = Url::parse(&format!("{base}{path}"))
        .map_err(|e| ApiError::from_failure(RawFailure::Text(e.to_string()), Some(path), None))?;
    if !query.is_empty() {
        let mut pairs = url.query_pairs_mut();
        for (key, value) in query {
            pairs.append_pair(key, value);
        }
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_format_url_joins_base_and_path() {
        let url = format_url("https://api.x.com", "users", &[]).unwrap();
        assert_eq!(url.as_str(), "https://api.x.com/users");
    }

    #[test]
    fn test_format_url_enforces_trailing_slash_and_strips_leading() {
        let url = format_url("https://api.x.com/", "/users", &[]).unwrap();
        assert_eq!(url.as_str(), "https://api.x.com/users");
    }

    #[test]
    fn test_format_url_appends_query_in_order() {
        let url = format_url("https://api.x.com/", "users", &q(&[("b", "2"), ("a", "1")])).unwrap();
        assert_eq!(url.as_str(), "https://api.x.com/users?b=2&a=1");
    }

    #[test]
    fn test_format_url_encodes_query_values() {
        let url = format_url("https://api.x.com/", "search", &q(&[("q", "a b&c")])).unwrap();
        assert_eq!(url.as_str(), "https://api.x.com/search?q=a+b%26c");
    }

    #[test]
    fn test_format_url_rejects_invalid_base() {
        let err = format_url("not a url", "users", &[]).unwrap_err();
        assert_eq!(err.data.status, 0);
        assert!(!err.data.message.is_empty());
    }

    #[test]
    fn test_json_payload_round_trips_value() {
        #[derive(Serialize)]
        struct Body {
            name: String,
            count: u32,
        }
        let payload = Payload::json(&Body {
            name: "x".to_string(),
            count: 3,
        })
        .unwrap();
        match payload {
            Payload::Json(value) => {
                assert_eq!(value["name"], "x");
                assert_eq!(value["count"], 3);
            }
            Payload::Form(_) => panic!("expected JSON payload"),
        }
    }

    #[test]
    fn test_is_form() {
        assert!(Payload::Form(Vec::new()).is_form());
        assert!(!Payload::Json(Value::Null).is_form());
    }
}
