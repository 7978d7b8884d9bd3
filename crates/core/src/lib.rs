//! Shared primitives for all Rust crates in rolestore.

#![forbid(unsafe_code)]

/// Record version tokens used for optimistic concurrency.
pub mod version;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use version::{ObjVersion, ObjVersionTracker};

/// Result type used across rolestore crates.
pub type AppResult<T> = Result<T, AppError>;

/// Separator between a tenant and the name it qualifies (`tenant$name`).
///
/// The same character separates the tenant from the rest of every
/// tenant-scoped storage key.
pub const TENANT_SEPARATOR: char = '$';

/// Namespace scoping role names. The empty tenant is the default namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Tenant(String);

impl Tenant {
    /// Creates a validated tenant.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if let Some(invalid) = value
            .chars()
            .find(|character| !(character.is_ascii_alphanumeric() || matches!(character, '_' | '-')))
        {
            return Err(AppError::Validation(format!(
                "tenant '{value}' contains invalid character '{invalid}'"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the default (empty) tenant.
    #[must_use]
    pub fn default_tenant() -> Self {
        Self(String::new())
    }

    /// Returns whether this is the default tenant.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for Tenant {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Tenant> for String {
    fn from(value: Tenant) -> Self {
        value.0
    }
}

impl Display for Tenant {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.0.as_str())
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant. Never sent to the backend.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested record does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Exclusive write collided with an existing record.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Version token mismatch or a write blocked by current state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Opaque storage backend failure.
    #[error("backend failure: {0}")]
    Backend(String),

    /// Stored record could not be decoded.
    #[error("decode failure: {0}")]
    Decode(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}
