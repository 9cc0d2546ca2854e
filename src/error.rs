use std::collections::HashMap;

use serde::Serialize;
use thiserror::Error;

use crate::store::StoreError;

/// Error kinds surfaced by the service layer.
///
/// Everything here is recoverable at the request boundary; the HTTP layer
/// owns the mapping to status codes. `RateLimited` is produced by the
/// throttling collaborator in front of this crate, never internally.
#[derive(Debug, Error)]
pub enum Error {
    #[error("entity not found")]
    NotFound,

    #[error("{0}")]
    PermissionDenied(String),

    #[error("validation failed")]
    Validation(ValidationError),

    #[error("conflict")]
    Conflict(ValidationError),

    #[error("You cannot follow yourself")]
    SelfFollow,

    #[error("{0}")]
    AuthenticationFailed(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Error {
        match err {
            StoreError::NotFound => Error::NotFound,
            other => Error::Store(other),
        }
    }
}

impl From<ValidationError> for Error {
    fn from(err: ValidationError) -> Error {
        Error::Validation(err)
    }
}

/// Field-level validation failures, keyed by field name.
#[derive(Debug, Default, Serialize)]
pub struct ValidationError(HashMap<String, Vec<String>>);

impl ValidationError {
    pub fn new<K: Into<String>, V: Into<String>>(field: K, message: V) -> Self {
        let mut error = ValidationError::default();
        error.add_error(field, message);
        error
    }

    pub fn add_error<K: Into<String>, V: Into<String>>(&mut self, field: K, message: V) {
        let entry = self.0.entry(field.into()).or_default();
        entry.push(message.into());
    }

    pub fn merge(&mut self, other: ValidationError) {
        for (field, messages) in other.0.into_iter() {
            let entry = self.0.entry(field).or_default();
            entry.extend(messages);
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn messages(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or_default()
    }
}
