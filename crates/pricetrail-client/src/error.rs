use std::time::Duration;

use thiserror::Error;

use crate::retry::Disposition;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Network-level failure: timeout, connection reset, DNS, or body read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited by {endpoint}")]
    RateLimited {
        endpoint: String,
        retry_after: Option<Duration>,
    },

    #[error("server error HTTP {status} from {endpoint}")]
    ServerError {
        status: u16,
        endpoint: String,
        retry_after: Option<Duration>,
    },

    /// Any other non-2xx status. `body` is truncated.
    #[error("unexpected HTTP status {status} from {endpoint}: {body}")]
    UnexpectedStatus {
        status: u16,
        endpoint: String,
        body: String,
    },

    /// The gateway answered with an `error_response` payload.
    #[error("API error {code}: {msg}")]
    Api {
        code: String,
        msg: String,
        sub_code: Option<String>,
    },

    #[error("empty result for {context}")]
    EmptyResult { context: String },

    #[error("invalid URL \"{url}\": {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("signing failed: {0}")]
    Signing(String),
}

impl ClientError {
    /// Classifies the error for [`crate::retry::retry_with_backoff`].
    ///
    /// Rate limiting, 5xx, and network failures are transient. A server
    /// supplied `Retry-After` overrides the computed backoff. Everything else
    /// is fatal and returned to the caller on the first occurrence.
    #[must_use]
    pub fn disposition(&self) -> Disposition {
        match self {
            ClientError::Http(e) => {
                if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
                    Disposition::Transient
                } else {
                    Disposition::Fatal
                }
            }
            ClientError::RateLimited { retry_after, .. }
            | ClientError::ServerError { retry_after, .. } => match retry_after {
                Some(delay) => Disposition::RetryAfter(*delay),
                None => Disposition::Transient,
            },
            ClientError::UnexpectedStatus { .. }
            | ClientError::Api { .. }
            | ClientError::EmptyResult { .. }
            | ClientError::InvalidUrl { .. }
            | ClientError::Signing(_) => Disposition::Fatal,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_honors_retry_after() {
        let err = ClientError::RateLimited {
            endpoint: "https://gw.example.com/sync".to_owned(),
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(
            err.disposition(),
            Disposition::RetryAfter(Duration::from_secs(3))
        );
    }

    #[test]
    fn server_error_without_header_is_transient() {
        let err = ClientError::ServerError {
            status: 503,
            endpoint: "https://gw.example.com/sync".to_owned(),
            retry_after: None,
        };
        assert_eq!(err.disposition(), Disposition::Transient);
    }

    #[test]
    fn client_side_failures_are_fatal() {
        let unexpected = ClientError::UnexpectedStatus {
            status: 403,
            endpoint: "https://gw.example.com/sync".to_owned(),
            body: "forbidden".to_owned(),
        };
        let api = ClientError::Api {
            code: "IncompleteSignature".to_owned(),
            msg: "The request signature does not conform".to_owned(),
            sub_code: None,
        };
        assert_eq!(unexpected.disposition(), Disposition::Fatal);
        assert_eq!(api.disposition(), Disposition::Fatal);
    }
}
