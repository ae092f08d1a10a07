use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid value: {message}")]
    Validation { message: String },
    #[error("unknown media kind `{0}`, expected `movie` or `tv`")]
    UnknownMediaKind(String),
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
