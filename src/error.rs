//! Error types for the extraction layer.
//!
//! Orchestration code needs to tell transient upstream failures (worth a
//! retry) from everything else, so extraction returns a typed
//! [`ExtractError`] instead of `anyhow::Error`.

use thiserror::Error;

use crate::retry::RetryError;

#[derive(Error, Debug)]
pub enum ExtractError {
    /// The request never produced a response (DNS, connect, timeout, ...).
    #[error("request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-2xx status.
    #[error("{url} returned HTTP {status}: {body}")]
    Status {
        url: String,
        status: u16,
        body: String,
    },

    /// The response body was not the JSON we expected.
    #[error("invalid JSON from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    /// Every attempt allowed by the retry policy failed.
    #[error("giving up after {attempts} attempts: {last}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        last: Box<ExtractError>,
    },

    /// The HTTP client itself could not be built.
    #[error("HTTP client setup failed: {0}")]
    Client(#[from] reqwest::Error),
}

impl ExtractError {
    /// Network failures and non-2xx responses are retried; malformed
    /// payloads and setup errors are not.
    pub fn is_transient(&self) -> bool {
        matches!(self, ExtractError::Network { .. } | ExtractError::Status { .. })
    }

    /// HTTP status of the underlying failure, if there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            ExtractError::Status { status, .. } => Some(*status),
            ExtractError::RetryExhausted { last, .. } => last.status(),
            _ => None,
        }
    }
}

impl From<RetryError<ExtractError>> for ExtractError {
    fn from(err: RetryError<ExtractError>) -> Self {
        match err {
            RetryError::Exhausted { attempts, last } => ExtractError::RetryExhausted {
                attempts,
                last: Box::new(last),
            },
            RetryError::Fatal(e) => e,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> ExtractError {
        ExtractError::Status {
            url: "http://upstream/x".to_string(),
            status: code,
            body: String::new(),
        }
    }

    #[test]
    fn test_status_errors_are_transient() {
        assert!(status(500).is_transient());
        assert!(status(404).is_transient());
        assert!(status(429).is_transient());
    }

    #[test]
    fn test_decode_errors_are_not_transient() {
        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ExtractError::Decode {
            url: "http://upstream/x".to_string(),
            source,
        };
        assert!(!err.is_transient());
    }

    #[test]
    fn test_exhausted_retry_converts_and_keeps_status() {
        let err: ExtractError = RetryError::Exhausted {
            attempts: 3,
            last: status(503),
        }
        .into();
        assert!(matches!(err, ExtractError::RetryExhausted { attempts: 3, .. }));
        assert_eq!(err.status(), Some(503));
        assert!(!err.is_transient());
    }
}
