use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("identifier is required")]
    MissingIdentifier,
    #[error("identifier must be at least {min} characters, got {actual}")]
    IdentifierTooShort { min: usize, actual: usize },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
