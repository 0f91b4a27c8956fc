//! Error types for the graph REST client

use crate::models::ErrorRecord;
use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the graph database
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request error (connection refused, timeout, TLS...)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// The server answered with a status code other than the one expected
    #[error("Received an unexpected HTTP status when executing the request. {context}\n\nExpected: {expected}\nReceived: {actual}\n\n{body}")]
    UnexpectedStatus {
        /// Status the operation expects
        expected: u16,
        /// Status the server returned
        actual: u16,
        /// Which operation was running
        context: String,
        /// Raw response body
        body: String,
    },

    /// The client has not fetched the service root yet
    #[error("The graph client is not connected to the server. Call connect() first.")]
    NotConnected,

    /// The server cannot honour the requested operation
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// Exactly one statement error reported by the server
    #[error(transparent)]
    Server(#[from] ServerError),

    /// Several statement errors reported in one response
    #[error(transparent)]
    Aggregate(#[from] AggregateServerError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Invalid response format
    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    /// A transaction callback arrived after its client was dropped
    #[error("The graph client owning this transaction has been dropped")]
    ClientClosed,

    /// Illegal transaction state transition
    #[error("Transaction state error: {0}")]
    TransactionState(String),
}

impl ClientError {
    /// True for failures at the HTTP layer rather than statement failures
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            ClientError::Http(_) | ClientError::UnexpectedStatus { .. }
        )
    }

    /// The server errors carried by this failure, in server order
    pub fn server_errors(&self) -> &[ServerError] {
        match self {
            ClientError::Server(e) => std::slice::from_ref(e),
            ClientError::Aggregate(e) => e.errors(),
            _ => &[],
        }
    }
}

/// A single statement failure reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code} {status} {message}")]
pub struct ServerError {
    code: String,
    status: String,
    message: String,
}

impl ServerError {
    pub fn new(
        code: impl Into<String>,
        status: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            status: status.into(),
            message: message.into(),
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<&ErrorRecord> for ServerError {
    fn from(record: &ErrorRecord) -> Self {
        Self::new(&record.code, &record.status, &record.message)
    }
}

/// Several statement failures returned in a single response
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Multiple errors were returned from the server: {}", join_errors(.errors))]
pub struct AggregateServerError {
    errors: Vec<ServerError>,
}

impl AggregateServerError {
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Inner failures, in the order the server reported them
    pub fn errors(&self) -> &[ServerError] {
        &self.errors
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServerError> {
        self.errors.iter()
    }
}

fn join_errors(errors: &[ServerError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Translate the `errors` array of a response into a failure.
///
/// Returns `None` when the server reported nothing, a [`ClientError::Server`]
/// for a single record and a [`ClientError::Aggregate`] otherwise.
pub fn translate(errors: &[ErrorRecord]) -> Option<ClientError> {
    match errors {
        [] => None,
        [single] => Some(ClientError::Server(single.into())),
        many => Some(ClientError::Aggregate(AggregateServerError {
            errors: many.iter().map(ServerError::from).collect(),
        })),
    }
}
