use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error("completion API error HTTP {status}: {body}")]
    Status {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("malformed completion response: {message}")]
    Malformed { message: String },

    #[error("completion response contained no text")]
    EmptyReply,
}

impl Error {
    #[must_use]
    pub fn malformed(message: impl std::fmt::Display) -> Self {
        Self::Malformed {
            message: message.to_string(),
        }
    }

    /// Transient failures are worth another attempt: network errors,
    /// timeouts, rate limiting and server-side errors.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            Self::Status { status, .. } => {
                *status == reqwest::StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            },
            Self::Malformed { .. } | Self::EmptyReply => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
