// Copyright (c) 2020 White Leaf
//
// This software is released under the MIT License.
// https://opensource.org/licenses/MIT

use anyhow::Error;
use thiserror::Error as DError;

#[derive(Debug, Clone, PartialEq, DError)]
pub enum ErrorKind {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Couldn't found {0} with id({1})")]
    InvalidState(&'static str, String),

    #[error("Storage failure: {0}")]
    Storage(String),

    #[error("Entity already exists: {0}")]
    AlreadyExists(String),

    #[error("Wrong email or password")]
    AuthenticationFailed,

    #[error("Email address has not been confirmed yet")]
    EmailNotConfirmed,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Failed to cast to some value ({0})")]
    ValueConvert(String),

    #[error("Couldn't cast value to {0}")]
    CastingValue(&'static str),

    #[error("Missing configuration for {0}")]
    Config(String),
}

impl ErrorKind {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::InvalidState(entity, id.to_string())
    }

    /// Classify an error coming out of a controller or the engine
    pub fn of(err: &Error) -> Option<&ErrorKind> {
        err.downcast_ref::<ErrorKind>()
    }

    pub fn is_not_found(err: &Error) -> bool {
        matches!(Self::of(err), Some(ErrorKind::InvalidState(..)))
    }
}
