use thiserror::Error;

#[derive(Error, Debug)]
pub enum FluentError {
    #[error("invalid configuration: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("service error: {0}")]
    Service(String),
    #[error("credential error: {0}")]
    Credential(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FluentError>;

impl FluentError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FluentError::NotFound(_))
    }
}
