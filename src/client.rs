//! Configurable API client instance and its request pipeline.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use reqwest::header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{ApiError, ErrorData, RawFailure, normalize};
use crate::request::{ApiRequest, FormValue, Payload, into_multipart};

/// Cancellation reason used when the per-call timeout fires; becomes the
/// normalized error code.
pub const TIMEOUT_REASON: &str = "TimeoutError";

/// Hook that may rewrite an outgoing request before it is sent.
pub type RequestPreProcessor = Arc<dyn Fn(ApiRequest) -> ApiRequest + Send + Sync>;
/// Hook that may transform a successful parsed response body.
pub type ResponsePostProcessor = Arc<dyn Fn(Value) -> Value + Send + Sync>;
/// Hook that may transform a constructed error before it is raised.
pub type ErrorPostProcessor = Arc<dyn Fn(ApiError) -> ApiError + Send + Sync>;

/// Initial configuration for [`ApiClient::with_options`].
#[derive(Default, Clone)]
pub struct ApiOptions {
    pub base_url: Option<String>,
    pub authorization_header: Option<String>,
    pub headers: Option<HashMap<String, String>>,
    pub enable_log: bool,
    /// Per-call timeout in milliseconds; 0 disables it.
    pub timeout_ms: u64,
    pub include_credentials: bool,
    pub request_pre_processor: Option<RequestPreProcessor>,
    pub response_post_processor: Option<ResponsePostProcessor>,
    pub error_post_processor: Option<ErrorPostProcessor>,
}

/// A configured API client.
///
/// Holds the base URL, authorization header, extra headers, timeout and
/// transform hooks, and exposes one method per HTTP verb. Every failure
/// path raises [`ApiError`] carrying a normalized [`ErrorData`] record.
///
/// Configuration is mutated only through setters; calls take `&self`, so
/// concurrent calls on a shared instance read the same settings without
/// serializing against each other.
pub struct ApiClient {
    base_url: String,
    auth_header: String,
    headers: HashMap<String, String>,
    log_enabled: bool,
    include_credentials: bool,
    timeout_ms: u64,
    request_pre_processor: Option<RequestPreProcessor>,
    response_post_processor: Option<ResponsePostProcessor>,
    error_post_processor: Option<ErrorPostProcessor>,
    client: Client,
    /// Cookie-bearing transport, selected when a request resolves its
    /// include-credentials flag to true.
    credentialed_client: Client,
}

impl ApiClient {
    /// Creates a client with default (empty) configuration.
    pub fn new() -> Result<Self, ApiError> {
        Self::with_options(ApiOptions::default())
    }

    /// Creates a client from initial options.
    pub fn with_options(options: ApiOptions) -> Result<Self, ApiError> {
        let client = Client::builder().build().map_err(build_error)?;
        let credentialed_client = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(build_error)?;
        Ok(Self {
            base_url: options.base_url.unwrap_or_default(),
            auth_header: options.authorization_header.unwrap_or_default(),
            headers: options.headers.unwrap_or_default(),
            log_enabled: options.enable_log,
            include_credentials: options.include_credentials,
            timeout_ms: options.timeout_ms,
            request_pre_processor: options.request_pre_processor,
            response_post_processor: options.response_post_processor,
            error_post_processor: options.error_post_processor,
            client,
            credentialed_client,
        })
    }

    // --- configuration surface ---

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn set_base_url(&mut self, url: &str) {
        self.base_url = url.to_string();
    }

    /// Sets the `Authorization` header value; `None` clears it.
    pub fn set_authorization_header(&mut self, value: Option<&str>) {
        self.auth_header = value.unwrap_or_default().to_string();
    }

    /// Sets an extra header sent with every request. Extra headers take
    /// precedence over the JSON content-type and authorization defaults.
    pub fn set_header(&mut self, key: &str, value: &str) {
        self.headers.insert(key.to_string(), value.to_string());
    }

    pub fn rm_header(&mut self, key: &str) {
        self.headers.remove(key);
    }

    pub fn clear_headers(&mut self) {
        self.headers.clear();
    }

    pub fn enable_log(&mut self, on: bool) {
        self.log_enabled = on;
    }

    /// Sets the per-call timeout in milliseconds; 0 disables it.
    pub fn set_timeout_ms(&mut self, msecs: u64) {
        self.timeout_ms = msecs;
    }

    pub fn set_include_credentials(&mut self, on: bool) {
        self.include_credentials = on;
    }

    pub fn set_request_pre_processor(&mut self, processor: Option<RequestPreProcessor>) {
        self.request_pre_processor = processor;
    }

    pub fn set_response_post_processor(&mut self, processor: Option<ResponsePostProcessor>) {
        self.response_post_processor = processor;
    }

    pub fn set_error_post_processor(&mut self, processor: Option<ErrorPostProcessor>) {
        self.error_post_processor = processor;
    }

    // --- call surface ---

    /// Performs a GET request. Returns `None` on a 204/205 response.
    #[tracing::instrument(skip(self, query))]
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, ApiError> {
        self.request(self.descriptor(Method::GET, path, None, query))
            .await
    }

    /// Performs a DELETE request. Returns `None` on a 204/205 response.
    #[tracing::instrument(skip(self, query))]
    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, ApiError> {
        self.request(self.descriptor(Method::DELETE, path, None, query))
            .await
    }

    /// Performs a POST request with an optional JSON body.
    #[tracing::instrument(skip(self, body, query))]
    pub async fn post<B, T>(
        &self,
        path: &str,
        body: Option<&B>,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = self.raise_opt(body.map(Payload::json).transpose())?;
        self.request(self.descriptor(Method::POST, path, payload, query))
            .await
    }

    /// Performs a PUT request with an optional JSON body.
    #[tracing::instrument(skip(self, body, query))]
    pub async fn put<B, T>(
        &self,
        path: &str,
        body: Option<&B>,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = self.raise_opt(body.map(Payload::json).transpose())?;
        self.request(self.descriptor(Method::PUT, path, payload, query))
            .await
    }

    /// Performs a PATCH request with an optional JSON body.
    #[tracing::instrument(skip(self, body, query))]
    pub async fn patch<B, T>(
        &self,
        path: &str,
        body: Option<&B>,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let payload = self.raise_opt(body.map(Payload::json).transpose())?;
        self.request(self.descriptor(Method::PATCH, path, payload, query))
            .await
    }

    /// Performs a POST request with a multipart form body. The parts are
    /// sent in order and the content type is left to the transport so it
    /// carries the form boundary.
    #[tracing::instrument(skip(self, parts, query))]
    pub async fn post_form<T: DeserializeOwned>(
        &self,
        path: &str,
        parts: Vec<(String, FormValue)>,
        query: &[(&str, &str)],
    ) -> Result<Option<T>, ApiError> {
        self.request(self.descriptor(Method::POST, path, Some(Payload::Form(parts)), query))
            .await
    }

    // --- pipeline ---

    fn descriptor(
        &self,
        method: Method,
        path: &str,
        body: Option<Payload>,
        query: &[(&str, &str)],
    ) -> ApiRequest {
        ApiRequest {
            method,
            path: path.to_string(),
            body,
            query: query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            base_url: self.base_url.clone(),
            auth_header: self.auth_header.clone(),
            include_credentials: self.include_credentials,
        }
    }

    async fn request<T: DeserializeOwned>(&self, mut req: ApiRequest) -> Result<Option<T>, ApiError> {
        if let Some(pre) = &self.request_pre_processor {
            req = pre(req);
        }
        self.log_request(&req);

        let url = req.url().map_err(|e| self.raise(e))?;
        let path = req.path.clone();

        let mut headers = HeaderMap::new();
        let is_form = req.body.as_ref().is_some_and(Payload::is_form);
        if !is_form {
            // Form bodies must leave the content type to the transport so
            // it carries the multipart boundary.
            headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        }
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
        if !req.auth_header.is_empty() {
            let value = HeaderValue::from_str(&req.auth_header)
                .map_err(|e| self.bad_request(e.to_string(), &path))?;
            headers.insert(AUTHORIZATION, value);
        }
        for (key, value) in &self.headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| self.bad_request(e.to_string(), &path))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| self.bad_request(e.to_string(), &path))?;
            headers.insert(name, value);
        }

        let transport = if req.include_credentials {
            &self.credentialed_client
        } else {
            &self.client
        };
        let mut builder = transport.request(req.method.clone(), url).headers(headers);
        if req.method != Method::GET && req.method != Method::DELETE {
            match req.body {
                Some(Payload::Json(value)) => {
                    let text = serde_json::to_string(&value)
                        .map_err(|e| self.bad_request(e.to_string(), &path))?;
                    builder = builder.body(text);
                }
                Some(Payload::Form(parts)) => {
                    builder = builder.multipart(into_multipart(parts));
                }
                None => {}
            }
        }

        let send = builder.send();
        let sent = if self.timeout_ms > 0 {
            // The timer is dropped as soon as the send future settles, on
            // success and failure alike.
            match tokio::time::timeout(Duration::from_millis(self.timeout_ms), send).await {
                Ok(result) => result,
                Err(_elapsed) => {
                    let failure = RawFailure::Abort {
                        name: TIMEOUT_REASON.to_string(),
                        message: format!("request exceeded the {}ms timeout", self.timeout_ms),
                    };
                    self.log_failure(&failure);
                    return Err(self.fail(normalize(failure, Some(&path), Some(TIMEOUT_REASON))));
                }
            }
        } else {
            send.await
        };
        let response = match sent {
            Ok(response) => response,
            Err(e) => {
                let failure = RawFailure::from_transport(&e);
                self.log_failure(&failure);
                return Err(self.fail(normalize(failure, Some(&path), None)));
            }
        };

        let status = response.status();
        let status_text = status.canonical_reason().unwrap_or_default().to_string();
        if status.is_success()
            && (status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT)
        {
            self.log_response(status.as_u16(), &status_text, "");
            return Ok(None);
        }

        let body = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                let failure = RawFailure::from_transport(&e);
                self.log_failure(&failure);
                return Err(self.fail(normalize(failure, Some(&path), None)));
            }
        };
        self.log_response(status.as_u16(), &status_text, &body);

        if status.is_success() {
            let value: Value = serde_json::from_str(&body)
                .map_err(|e| self.bad_request(e.to_string(), &path))?;
            let value = match &self.response_post_processor {
                Some(post) => post(value),
                None => value,
            };
            if value.is_null() {
                return Ok(None);
            }
            let parsed = serde_json::from_value(value)
                .map_err(|e| self.bad_request(e.to_string(), &path))?;
            Ok(Some(parsed))
        } else {
            let failure = match serde_json::from_str::<Value>(&body) {
                Ok(Value::String(text)) => RawFailure::Text(text),
                Ok(mut payload) => {
                    if let Value::Object(entries) = &mut payload {
                        // Backfill the transport status when the error
                        // body omits it.
                        let has_status = entries
                            .get("status")
                            .and_then(Value::as_u64)
                            .is_some_and(|s| s != 0);
                        if !has_status {
                            entries.insert("status".to_string(), Value::from(status.as_u16()));
                        }
                        let has_status_text = entries
                            .get("statusText")
                            .and_then(Value::as_str)
                            .is_some_and(|t| !t.is_empty());
                        if !has_status_text {
                            entries.insert(
                                "statusText".to_string(),
                                Value::from(status_text.clone()),
                            );
                        }
                    }
                    RawFailure::Object(payload)
                }
                Err(_) => RawFailure::Object(serde_json::json!({
                    "ok": false,
                    "status": status.as_u16(),
                    "statusText": status_text,
                })),
            };
            Err(self.fail(normalize(failure, Some(&path), None)))
        }
    }

    /// Applies the error post-processor; every raised error goes through
    /// here so the hook sees every failure path.
    fn raise(&self, error: ApiError) -> ApiError {
        match &self.error_post_processor {
            Some(post) => post(error),
            None => error,
        }
    }

    fn raise_opt<V>(&self, result: Result<V, ApiError>) -> Result<V, ApiError> {
        result.map_err(|e| self.raise(e))
    }

    fn fail(&self, data: ErrorData) -> ApiError {
        self.raise(ApiError::new(data))
    }

    fn bad_request(&self, message: String, path: &str) -> ApiError {
        self.fail(normalize(RawFailure::Text(message), Some(path), None))
    }

    // --- logging ---

    fn log_request(&self, req: &ApiRequest) {
        if !self.log_enabled {
            return;
        }
        let body = match &req.body {
            Some(Payload::Form(_)) => "FormData".to_string(),
            Some(Payload::Json(value)) => value.to_string(),
            None => "null".to_string(),
        };
        let url = req
            .url()
            .map(|u| u.to_string())
            .unwrap_or_else(|_| format!("{}{}", req.base_url, req.path));
        debug!("[Request] {} {} {} {}", req.method, url, req.auth_header, body);
    }

    /// Logs the settled response. The body is already buffered by the
    /// pipeline, so this reads the crate's own copy and cannot consume or
    /// delay the result handed to the caller.
    fn log_response(&self, status: u16, status_text: &str, body: &str) {
        if !self.log_enabled {
            return;
        }
        match serde_json::from_str::<Value>(body) {
            Ok(parsed) => debug!("[Response] {} {} {}", status, status_text, parsed),
            Err(_) => debug!("[Response] {} {} {}", status, status_text, body),
        }
    }

    fn log_failure(&self, failure: &RawFailure) {
        if !self.log_enabled {
            return;
        }
        debug!("[Response] {:?}", failure);
    }
}

fn build_error(error: reqwest::Error) -> ApiError {
    ApiError::from_failure(RawFailure::Text(error.to_string()), None, None)
}
