//! Generic HTTP driver -- call arbitrary webhooks and REST endpoints.
//!
//! Supports the common methods (GET, POST, PUT, PATCH, DELETE, HEAD) with
//! configurable headers, body, and timeout.  The step output is the full
//! response: status code, headers, body, and elapsed time.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use autoflow_kernel::{Driver, DriverOutcome, OperationSpec, ParamMap};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::error::{DriverError, Result};

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Maximum response body size in bytes (1 MB).
const MAX_BODY_BYTES: usize = 1_024 * 1_024;

/// HTTP request driver registered as `http`.
pub struct HttpDriver {
    client: reqwest::Client,
}

impl HttpDriver {
    /// Create a new HTTP driver.
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent(concat!("autoflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();
        Self { client }
    }

    async fn request(&self, operation: &str, method_str: &str, params: &ParamMap) -> Result<Value> {
        let invalid = |reason: String| DriverError::InvalidParams {
            operation: operation.to_string(),
            reason,
        };

        let url_str = params
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid("missing required string field `url`".into()))?;

        let timeout_secs = params
            .get("timeout_seconds")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let method = parse_method(method_str).ok_or_else(|| {
            invalid(format!(
                "unsupported HTTP method `{method_str}`. Supported: GET, POST, PUT, PATCH, DELETE, HEAD"
            ))
        })?;

        url::Url::parse(url_str).map_err(|e| invalid(format!("invalid URL `{url_str}`: {e}")))?;

        debug!(method = method_str, url = url_str, timeout_secs, "executing HTTP request");

        let mut builder = self
            .client
            .request(method, url_str)
            .timeout(Duration::from_secs(timeout_secs));

        if let Some(headers) = params.get("headers").and_then(Value::as_object) {
            for (key, value) in headers {
                let Some(val_str) = value.as_str() else {
                    continue;
                };
                let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
                    .map_err(|e| invalid(format!("invalid header name `{key}`: {e}")))?;
                let value = reqwest::header::HeaderValue::from_str(val_str)
                    .map_err(|e| invalid(format!("invalid header value for `{key}`: {e}")))?;
                builder = builder.header(name, value);
            }
        }

        // Object and array bodies are sent as JSON, strings verbatim.
        match params.get("body") {
            Some(Value::String(body)) => builder = builder.body(body.clone()),
            Some(body @ (Value::Object(_) | Value::Array(_))) => builder = builder.json(body),
            _ => {}
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                DriverError::Timeout {
                    seconds: timeout_secs,
                    reason: format!("HTTP request to `{url_str}` timed out"),
                }
            } else {
                DriverError::ExecutionFailed {
                    operation: operation.to_string(),
                    reason: format!("HTTP request failed: {e}"),
                }
            }
        })?;
        let elapsed_ms = start.elapsed().as_millis() as u64;
        let status = response.status().as_u16();

        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (
                    k.as_str().to_string(),
                    v.to_str().unwrap_or("<binary>").to_string(),
                )
            })
            .collect();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DriverError::ExecutionFailed {
                operation: operation.to_string(),
                reason: format!("failed to read response body: {e}"),
            })?;

        let body = if bytes.len() > MAX_BODY_BYTES {
            let truncated = String::from_utf8_lossy(&bytes[..MAX_BODY_BYTES]);
            format!("{truncated}\n... [body truncated at 1 MB]")
        } else {
            String::from_utf8_lossy(&bytes).into_owned()
        };

        debug!(url = url_str, status, elapsed_ms, body_length = bytes.len(), "HTTP request completed");

        if status >= 400 {
            return Err(DriverError::ExecutionFailed {
                operation: operation.to_string(),
                reason: format!("`{url_str}` answered with status {status}"),
            });
        }

        Ok(json!({
            "status": status,
            "headers": headers,
            "body": body,
            "elapsed_ms": elapsed_ms,
        }))
    }
}

impl Default for HttpDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse an HTTP method string into a `reqwest::Method`.
fn parse_method(method: &str) -> Option<reqwest::Method> {
    match method.to_uppercase().as_str() {
        "GET" => Some(reqwest::Method::GET),
        "POST" => Some(reqwest::Method::POST),
        "PUT" => Some(reqwest::Method::PUT),
        "PATCH" => Some(reqwest::Method::PATCH),
        "DELETE" => Some(reqwest::Method::DELETE),
        "HEAD" => Some(reqwest::Method::HEAD),
        _ => None,
    }
}

#[async_trait]
impl Driver for HttpDriver {
    fn name(&self) -> &str {
        "http"
    }

    fn description(&self) -> &str {
        "Arbitrary HTTP requests (webhooks, REST APIs)"
    }

    fn supported_operations(&self) -> Vec<OperationSpec> {
        vec![
            OperationSpec::new("request", "Send an HTTP request with any method")
                .require(["method", "url"])
                .optional(["headers", "body", "timeout_seconds"]),
            OperationSpec::new("get", "Send a GET request")
                .require(["url"])
                .optional(["headers", "timeout_seconds"]),
            OperationSpec::new("post", "Send a POST request")
                .require(["url"])
                .optional(["headers", "body", "timeout_seconds"]),
        ]
    }

    async fn execute(&self, operation: &str, parameters: &ParamMap, _context: &ParamMap)
    -> DriverOutcome {
        let result = match operation {
            "request" => match parameters.get("method").and_then(Value::as_str) {
                Some(method) => self.request(operation, method, parameters).await,
                None => Err(DriverError::InvalidParams {
                    operation: operation.to_string(),
                    reason: "missing required string field `method`".into(),
                }),
            },
            "get" => self.request(operation, "GET", parameters).await,
            "post" => self.request(operation, "POST", parameters).await,
            other => Err(DriverError::OperationNotFound {
                driver: "http".into(),
                operation: other.to_string(),
            }),
        };

        match result {
            Ok(output) => DriverOutcome::ok(output),
            Err(e) => {
                warn!(operation, error = %e, "http driver call failed");
                DriverOutcome::failed(e.to_string())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: Value) -> ParamMap {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn declares_operations() {
        let driver = HttpDriver::new();
        let ops = driver.supported_operations();
        assert_eq!(ops.len(), 3);
        assert_eq!(ops[0].required_params, vec!["method", "url"]);
    }

    #[tokio::test]
    async fn rejects_unknown_operation() {
        let driver = HttpDriver::new();
        let outcome = driver
            .execute("fetch", &params(json!({"url": "https://example.com"})), &ParamMap::new())
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("fetch"));
    }

    #[tokio::test]
    async fn rejects_invalid_method() {
        let driver = HttpDriver::new();
        let outcome = driver
            .execute(
                "request",
                &params(json!({"method": "FOOBAR", "url": "https://example.com"})),
                &ParamMap::new(),
            )
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("unsupported HTTP method"));
    }

    #[tokio::test]
    async fn rejects_invalid_url() {
        let driver = HttpDriver::new();
        let outcome = driver
            .execute("get", &params(json!({"url": "not a url"})), &ParamMap::new())
            .await;
        assert!(!outcome.success);
    }

    #[tokio::test]
    async fn rejects_missing_method() {
        let driver = HttpDriver::new();
        let outcome = driver
            .execute("request", &params(json!({"url": "https://example.com"})), &ParamMap::new())
            .await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("method"));
    }

    #[test]
    fn parse_method_supported_methods() {
        assert_eq!(parse_method("GET"), Some(reqwest::Method::GET));
        assert_eq!(parse_method("post"), Some(reqwest::Method::POST));
        assert_eq!(parse_method("Put"), Some(reqwest::Method::PUT));
        assert_eq!(parse_method("DELETE"), Some(reqwest::Method::DELETE));
        assert_eq!(parse_method("OPTIONS"), None);
        assert_eq!(parse_method(""), None);
    }
}
