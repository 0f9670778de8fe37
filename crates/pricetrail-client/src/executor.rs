//! Single HTTP call with timeout, retry, and failure classification.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode, Url};
use serde_json::Value;

use crate::error::ClientError;
use crate::retry::{retry_with_backoff, RetryPolicy};

/// Characters of an error body kept in [`ClientError::UnexpectedStatus`].
const ERROR_BODY_LIMIT: usize = 300;

#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Bound on a single attempt, including reading the body.
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

/// Issues GET requests and returns parsed JSON bodies.
#[derive(Debug, Clone)]
pub struct HttpExecutor {
    client: Client,
}

impl HttpExecutor {
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the underlying `reqwest::Client`
    /// cannot be constructed.
    pub fn new(user_agent: &str) -> Result<Self, ClientError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .build()?;
        Ok(Self { client })
    }

    /// Fetches `url`, retrying transient failures per `options.retry`.
    ///
    /// A successful status with a body that is not valid JSON yields an empty
    /// object rather than an error.
    ///
    /// # Errors
    ///
    /// - [`ClientError::RateLimited`] / [`ClientError::ServerError`]: 429 or
    ///   5xx on the last allowed attempt.
    /// - [`ClientError::Http`]: network failure or timeout on the last
    ///   allowed attempt.
    /// - [`ClientError::UnexpectedStatus`]: any other non-2xx status (not
    ///   retried).
    pub async fn execute(&self, url: &Url, options: &RequestOptions) -> Result<Value, ClientError> {
        retry_with_backoff(&options.retry, ClientError::disposition, || {
            self.attempt(url, options.timeout)
        })
        .await
    }

    async fn attempt(&self, url: &Url, timeout: Duration) -> Result<Value, ClientError> {
        // The query string carries credentials, so errors only name the endpoint.
        let response = self
            .client
            .get(url.clone())
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ClientError::Http(e.without_url()))?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited {
                endpoint: endpoint_of(url),
                retry_after: retry_after(&response),
            });
        }

        if status.is_server_error() {
            return Err(ClientError::ServerError {
                status: status.as_u16(),
                endpoint: endpoint_of(url),
                retry_after: retry_after(&response),
            });
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::UnexpectedStatus {
                status: status.as_u16(),
                endpoint: endpoint_of(url),
                body: body.chars().take(ERROR_BODY_LIMIT).collect(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| ClientError::Http(e.without_url()))?;
        Ok(parse_body(&body))
    }
}

/// Parses a success body, mapping malformed JSON to `{}`.
pub(crate) fn parse_body(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|e| {
        tracing::debug!(error = %e, len = body.len(), "unparseable success body, treating as empty");
        Value::Object(serde_json::Map::new())
    })
}

/// `Retry-After` as whole seconds. HTTP-date values are ignored.
fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// `url` without its query string.
pub(crate) fn endpoint_of(url: &Url) -> String {
    let mut endpoint = url.clone();
    endpoint.set_query(None);
    endpoint.to_string()
}
