use thiserror::Error;

/// Transport message browsers report for an unreachable host.
pub const FAILED_TO_FETCH: &str = "Failed to fetch";

pub const UNREACHABLE_MESSAGE: &str =
    "Could not connect to the server. Check that it is running and that the URL is correct.";

/// Failure of a caption request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("{}", UNREACHABLE_MESSAGE)]
    Unreachable,

    /// Non-success status or an explicit `error` field from the service.
    #[error("{0}")]
    Server(String),

    #[error("invalid response from caption service: {0}")]
    InvalidResponse(String),

    #[error("{0}")]
    Transport(String),
}

impl RequestError {
    /// Classifies a transport failure by its message text.
    pub fn from_transport_message(message: &str) -> Self {
        if message.trim() == FAILED_TO_FETCH {
            Self::Unreachable
        } else {
            Self::Transport(message.to_string())
        }
    }

    pub fn from_reqwest(err: &reqwest::Error) -> Self {
        if err.is_connect() {
            return Self::Unreachable;
        }
        if err.is_timeout() {
            return Self::Transport("the caption service took too long to respond".to_string());
        }
        Self::from_transport_message(&err.to_string())
    }
}
