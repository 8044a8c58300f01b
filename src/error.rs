use std::{collections::BTreeMap, fmt::Display};

use serde::Serialize;
use thiserror::Error;

/// SQLite extended result code for a failed `UNIQUE` constraint.
pub const SQLITE_CONSTRAINT_UNIQUE: &str = "2067";
/// SQLite extended result code for a failed foreign key.
pub const SQLITE_CONSTRAINT_FOREIGNKEY: &str = "787";

pub type Result<T, E = AppError> = std::result::Result<T, E>;

/// Validation messages keyed by the offending field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errs = Self::new();
        errs.insert(field, message);
        errs
    }

    /// Keeps the first message reported for a field.
    pub fn insert(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `Ok(())` when nothing was reported, otherwise a validation error.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

impl Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, msg) in self.iter() {
            if !first {
                write!(f, "; ")?;
            }
            write!(f, "{field}: {msg}")?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    /// Malformed input. Nothing was written.
    #[error("invalid input: {0}")]
    Validation(FieldErrors),

    /// The day or mesocycle is not in a state that allows the operation.
    #[error("{0}")]
    InvalidState(String),

    /// A referential-integrity conflict reported against one field.
    #[error("{field}: {message}")]
    Conflict { field: String, message: String },

    /// Missing, or owned by someone else. The two are never told apart.
    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

impl AppError {
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(FieldErrors::single(field, message))
    }

    pub fn conflict(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conflict {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Field errors when this is a validation failure.
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            Self::Validation(errs) => Some(errs),
            _ => None,
        }
    }
}

/// True when `err` is the store rejecting a row because of a unique index.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(SQLITE_CONSTRAINT_UNIQUE))
}

/// True when `err` is the store refusing to break a foreign key.
pub fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(SQLITE_CONSTRAINT_FOREIGNKEY))
}
