use oxttl::TurtleParseError;
use std::error::Error;

/// An error of a REST federation member.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum RestError {
    /// The service answered with a non-success status.
    #[error("Request failed with HTTP status code {status}: {reason}")]
    Transport { status: u16, reason: String },
    /// The request could not be sent or the response could not be read.
    #[error(transparent)]
    Connection(#[from] reqwest::Error),
    /// The member or its service descriptor is not set up correctly.
    #[error("{0}")]
    Configuration(String),
    /// A write operation was attempted.
    #[error("The REST API {url} is read-only")]
    ReadOnly { url: String },
    /// The response body is not what the descriptor promises.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    /// The descriptor document could not be parsed.
    #[error(transparent)]
    Descriptor(#[from] TurtleParseError),
    /// Any other failure of a transport implementation.
    #[error(transparent)]
    Other(Box<dyn Error + Send + Sync>),
}

impl RestError {
    pub fn configuration<T>(message: impl Into<String>) -> Result<T, Self> {
        Err(Self::Configuration(message.into()))
    }
}

impl From<serde_json::Error> for RestError {
    fn from(error: serde_json::Error) -> Self {
        Self::InvalidResponse(error.to_string())
    }
}
