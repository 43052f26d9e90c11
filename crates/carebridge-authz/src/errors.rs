use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthzError {
    #[error("invalid action: {0}")]
    InvalidAction(String),
    #[error("empty action set")]
    EmptyActions,
    #[error("invalid rule: {0}")]
    InvalidRule(String),
}

pub type AuthzResult<T> = Result<T, AuthzError>;
