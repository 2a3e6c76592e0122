//! Gather facts about data streams
//!
//! A [`Collector`] knows how to enumerate the data streams of a cluster and how
//! to fetch the [`StreamFacts`] of any one of them. Failing to enumerate is
//! fatal for a run, failing to fetch a single stream is not.

use async_trait::async_trait;
use dsaudit_metrics::StreamFacts;
use reqwest::StatusCode;

pub mod elasticsearch;

pub use elasticsearch::{Config, Elasticsearch};

/// Errors produced when the cluster cannot be reached at all.
#[derive(thiserror::Error, Debug)]
pub enum ConnectivityError {
    /// The request never produced a response.
    #[error("Could not reach cluster at {endpoint}: {source}")]
    Http {
        /// Endpoint that was requested
        endpoint: String,
        /// Underlying transport error
        #[source]
        source: reqwest::Error,
    },
    /// The cluster answered but refused the request.
    #[error("Cluster answered {endpoint} with status {status}")]
    Status {
        /// Endpoint that was requested
        endpoint: String,
        /// Status code of the response
        status: StatusCode,
    },
}

/// Errors produced while fetching the facts of a single stream.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    /// The request failed in transport or its body could not be decoded.
    #[error("Request to {endpoint} failed: {source}")]
    Http {
        /// Endpoint that was requested
        endpoint: String,
        /// Underlying transport or decode error
        #[source]
        source: reqwest::Error,
    },
    /// The cluster answered with a non-success status.
    #[error("{endpoint} answered with status {status}")]
    Status {
        /// Endpoint that was requested
        endpoint: String,
        /// Status code of the response
        status: StatusCode,
    },
    /// The cluster does not know the data stream.
    #[error("Data stream {0} does not exist")]
    UnknownStream(String),
    /// An index reported a size that could not be understood.
    #[error("Index {index} reported unparseable size {value:?}")]
    Size {
        /// The index in question
        index: String,
        /// The raw size as reported
        value: String,
    },
}

impl FetchError {
    /// Whether repeating the same request might succeed.
    ///
    /// Transport failures, throttling and server-side errors are retryable.
    /// Client errors and malformed data are not.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Http { .. } => true,
            FetchError::Status { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            FetchError::UnknownStream(_) | FetchError::Size { .. } => false,
        }
    }
}

#[async_trait]
/// A source of [`StreamFacts`].
pub trait Collector: Send + Sync {
    /// Names of every data stream, in the order the cluster lists them.
    ///
    /// # Errors
    ///
    /// Returns an error if the cluster cannot be reached.
    async fn list_streams(&self) -> Result<Vec<String>, ConnectivityError>;

    /// Facts for the data stream `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if any of the underlying requests fail.
    async fn fetch_facts(&self, name: &str) -> Result<StreamFacts, FetchError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_statuses() {
        let status = |status| FetchError::Status {
            endpoint: "/logs/_search".to_string(),
            status,
        };
        assert!(status(StatusCode::BAD_GATEWAY).is_retryable());
        assert!(status(StatusCode::TOO_MANY_REQUESTS).is_retryable());
        assert!(!status(StatusCode::UNAUTHORIZED).is_retryable());
        assert!(!status(StatusCode::NOT_FOUND).is_retryable());
        assert!(!FetchError::UnknownStream("logs".to_string()).is_retryable());
    }
}
