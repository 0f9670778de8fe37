//! Probing of (endpoint, signing method, timestamp format) combinations.
//!
//! The gateway does not advertise which combination it accepts, and the
//! answer differs between deployments. Each logical call walks an ordered
//! candidate list until one yields items. Nothing is remembered between
//! calls.

use std::future::Future;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ClientError;
use crate::normalize::api_error;
use crate::retry::Disposition;
use crate::sign::SignMethod;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Sync,
    Rest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampFormat {
    /// Milliseconds since the Unix epoch.
    EpochMillis,
    /// `YYYY-MM-DD HH:MM:SS` in UTC.
    Formatted,
}

impl TimestampFormat {
    #[must_use]
    pub fn render(self, at: DateTime<Utc>) -> String {
        match self {
            TimestampFormat::EpochMillis => at.timestamp_millis().to_string(),
            TimestampFormat::Formatted => at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub endpoint: Endpoint,
    pub sign_method: SignMethod,
    pub timestamp: TimestampFormat,
}

impl Candidate {
    #[must_use]
    pub const fn new(endpoint: Endpoint, sign_method: SignMethod, timestamp: TimestampFormat) -> Self {
        Self {
            endpoint,
            sign_method,
            timestamp,
        }
    }
}

/// Probing order used when the caller does not supply one.
pub const DEFAULT_CANDIDATES: &[Candidate] = &[
    Candidate::new(Endpoint::Sync, SignMethod::Sha256, TimestampFormat::EpochMillis),
    Candidate::new(Endpoint::Rest, SignMethod::HmacSha256, TimestampFormat::EpochMillis),
    Candidate::new(Endpoint::Rest, SignMethod::Md5, TimestampFormat::EpochMillis),
    Candidate::new(Endpoint::Rest, SignMethod::HmacSha256, TimestampFormat::Formatted),
    Candidate::new(Endpoint::Rest, SignMethod::Md5, TimestampFormat::Formatted),
    Candidate::new(Endpoint::Sync, SignMethod::Md5, TimestampFormat::Formatted),
];

/// Outcome of one negotiated call.
#[derive(Debug, Clone)]
pub struct Negotiated<T> {
    /// Raw body of the winning candidate, or of the last one tried when none
    /// produced items.
    pub envelope: Value,
    /// Empty when no candidate produced items.
    pub items: Vec<T>,
    /// The candidate that produced `items`.
    pub accepted: Option<Candidate>,
}

impl<T> Negotiated<T> {
    fn empty(envelope: Value) -> Self {
        Self {
            envelope,
            items: Vec::new(),
            accepted: None,
        }
    }
}

/// Tries `candidates` in order and returns the first non-empty result.
///
/// `call` performs one signed request for a candidate; `extract` turns its
/// envelope into items. A candidate that fails or yields no items is logged
/// and skipped. If every candidate yields zero items the result is empty and
/// carries the last envelope for diagnostics.
///
/// # Errors
///
/// When no candidate produced items, returns the last transient error
/// (rate limit, 5xx, network) if any candidate hit one, so the caller can
/// retry the call. Otherwise returns the last candidate's error only when
/// every candidate failed without producing an envelope.
pub async fn negotiate<T, F, Fut, X>(
    candidates: &[Candidate],
    mut call: F,
    extract: X,
) -> Result<Negotiated<T>, ClientError>
where
    F: FnMut(Candidate) -> Fut,
    Fut: Future<Output = Result<Value, ClientError>>,
    X: Fn(&Value) -> Vec<T>,
{
    let mut last_envelope: Option<Value> = None;
    let mut last_error: Option<ClientError> = None;
    let mut last_transient: Option<ClientError> = None;

    for &candidate in candidates {
        match call(candidate).await {
            Ok(envelope) => {
                if let Some(err) = api_error(&envelope) {
                    tracing::warn!(
                        endpoint = ?candidate.endpoint,
                        sign_method = %candidate.sign_method,
                        error = %err,
                        "gateway returned an error payload"
                    );
                }
                let items = extract(&envelope);
                if !items.is_empty() {
                    return Ok(Negotiated {
                        envelope,
                        items,
                        accepted: Some(candidate),
                    });
                }
                tracing::debug!(
                    endpoint = ?candidate.endpoint,
                    sign_method = %candidate.sign_method,
                    timestamp = ?candidate.timestamp,
                    "candidate yielded no items"
                );
                last_envelope = Some(envelope);
            }
            Err(err) => {
                tracing::debug!(
                    endpoint = ?candidate.endpoint,
                    sign_method = %candidate.sign_method,
                    error = %err,
                    "candidate failed"
                );
                if matches!(err.disposition(), Disposition::Fatal) {
                    last_error = Some(err);
                } else {
                    last_transient = Some(err);
                }
            }
        }
    }

    if let Some(err) = last_transient {
        return Err(err);
    }
    match (last_envelope, last_error) {
        (Some(envelope), _) => Ok(Negotiated::empty(envelope)),
        (None, Some(err)) => Err(err),
        (None, None) => Ok(Negotiated::empty(Value::Null)),
    }
}
