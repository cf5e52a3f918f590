use std::time::Duration;

use converge_schema::SpecError;
use thiserror::Error;

use crate::ObjectKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to add {object} '{name}' to table '{table}': {message}\n  statement: {statement}")]
    Schema {
        table: String,
        object: ObjectKind,
        name: String,
        statement: String,
        message: String,
    },

    #[error("timed out waiting for advisory lock '{name}'")]
    LockTimeout { name: String },

    #[error("gave up connecting to {target} after {attempts} attempt(s) ({timeout:?} each)")]
    ConnectTimeout {
        target: String,
        attempts: u32,
        timeout: Duration,
    },

    #[error("invalid table spec: {0}")]
    InvalidSpec(#[from] SpecError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// SQLSTATE (if the backend reported one) and message of a database error.
    pub fn database_parts(&self) -> (Option<String>, String) {
        match self {
            Error::Database(sqlx::Error::Database(db)) => (
                db.code().map(|code| code.into_owned()),
                db.message().to_string(),
            ),
            Error::Database(e) => (None, e.to_string()),
            other => (None, other.to_string()),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
