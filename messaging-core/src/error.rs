use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error, Clone)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("user is not a participant in this conversation")]
    NotParticipant,

    #[error("not authorized: {0}")]
    NotAuthorized(&'static str),

    #[error("invalid content: {0}")]
    InvalidContent(String),

    #[error("invalid participants: {0}")]
    InvalidParticipants(String),

    #[error("group size {requested} exceeds maximum {max}")]
    GroupTooLarge { requested: usize, max: usize },

    #[error("rate limited")]
    RateLimited,
}

impl AppError {
    /// Returns whether this error is retryable (e.g., a storage backend timeout)
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Storage(_))
    }

    /// Returns HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::InvalidContent(_) | AppError::InvalidParticipants(_) => 400,
            AppError::GroupTooLarge { .. } => 400,
            AppError::NotParticipant | AppError::NotAuthorized(_) => 403,
            AppError::NotFound(_) => 404,
            AppError::RateLimited => 429,
            AppError::Config(_) | AppError::Storage(_) => 500,
        }
    }
}
