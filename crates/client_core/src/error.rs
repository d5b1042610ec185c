use shared::error::ErrorCode;
use thiserror::Error;

/// Rejections decided locally, before anything is sent to the backend.
/// `Display` is the message shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{message}")]
    UnsupportedType {
        content_type: String,
        message: &'static str,
    },
    #[error("{subject} can't be bigger than {}MB", .limit / (1024 * 1024))]
    TooLarge {
        subject: &'static str,
        size: usize,
        limit: usize,
    },
    #[error("{subject} is not a readable image")]
    UndecodableImage { subject: &'static str },
    #[error("{0} can't be empty!")]
    EmptyField(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("request failed: {message}")]
    RequestFailure {
        status: Option<u16>,
        code: ErrorCode,
        message: String,
    },
    #[error("authentication required")]
    AuthFailure,
    #[error("operation cancelled")]
    Cancelled,
}

impl ClientError {
    pub fn request(status: Option<u16>, message: impl Into<String>) -> Self {
        let code = status.map_or(ErrorCode::Internal, ErrorCode::from_status);
        Self::RequestFailure {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthFailure)
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailure { status, .. } => *status,
            Self::AuthFailure => Some(401),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.status().map(|s| s.as_u16()) == Some(401) {
            return Self::AuthFailure;
        }
        Self::request(err.status().map(|s| s.as_u16()), err.to_string())
    }
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
