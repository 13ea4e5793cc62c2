//! Shared error types for the SpO2 pipeline

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SharedError {
    #[error("Invalid subject id: '{input}'")]
    InvalidSubjectId { input: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("Missing configuration: {field}")]
    MissingConfig { field: String },

    #[error("Invalid subject selection: {message}")]
    InvalidSelection { message: String },
}

impl SharedError {
    pub fn invalid_config(field: impl Into<String>, value: impl ToString) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            value: value.to_string(),
        }
    }

    pub fn selection(message: impl Into<String>) -> Self {
        Self::InvalidSelection { message: message.into() }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
