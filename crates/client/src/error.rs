//! Client error types.

use thiserror::Error;

/// Errors produced by the transport and GraphQL layers.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to {url} failed")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("the configured token is not a valid header value")]
    InvalidToken,

    #[error("graphql errors: {}", messages.join("; "))]
    GraphQl { messages: Vec<String> },

    #[error("response was missing {0}")]
    MissingData(&'static str),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Result type for client operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;
