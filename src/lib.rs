//! apiwire - configurable JSON API client.
//!
//! Wraps an HTTP transport behind per-instance configuration (base URL,
//! authorization header, extra headers, timeout, credential inclusion)
//! and verb-specific call methods, and funnels every failure - network,
//! timeout, malformed JSON, HTTP error body - into one normalized
//! [`ApiError`] shape. Optional hooks can rewrite outgoing requests and
//! transform successful or failed responses.
//!
//! ```no_run
//! use apiwire::ApiClient;
//! use serde_json::Value;
//!
//! # async fn run() -> Result<(), apiwire::ApiError> {
//! let mut client = ApiClient::new()?;
//! client.set_base_url("https://api.x.com/");
//! client.set_authorization_header(Some("Bearer token"));
//!
//! let user: Option<Value> = client.get("/users", &[("id", "5")]).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod request;

pub use client::{
    ApiClient, ApiOptions, ErrorPostProcessor, RequestPreProcessor, ResponsePostProcessor,
    TIMEOUT_REASON,
};
pub use error::{ApiError, CODE_UNKNOWN, CODE_UNREACHABLE, ErrorData, RawFailure, normalize};
pub use request::{ApiRequest, FormValue, Payload, format_url};
