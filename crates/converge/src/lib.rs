//! Idempotent, additive schema reconciliation for SQLite and MySQL.
//!
//! Describe a table once as a [`TableSpec`], then call [`reconcile`] against
//! any database that may or may not have it yet. The reconciler reads the
//! live catalog, computes what is missing, and issues only additive DDL:
//!
//! - the table is created if it is absent;
//! - missing columns are added one `ALTER TABLE .. ADD COLUMN` at a time, in
//!   declared order;
//! - missing indexes are created.
//!
//! Existing columns are never altered or dropped and extra columns are
//! ignored, so a second run is always a no-op and a run over a partially
//! migrated table completes it.
//!
//! ```ignore
//! use converge::{ColumnSpec, IndexSpec, LogicalType, SqliteBackend, TableSpec};
//!
//! let spec = TableSpec::builder("calendar_events")
//!     .column(ColumnSpec::new("id", LogicalType::Integer).primary_key().auto_increment())
//!     .column(ColumnSpec::new("title", LogicalType::Varchar(255)).not_null())
//!     .column(ColumnSpec::new("end_date", LogicalType::Date))
//!     .index(IndexSpec::on("calendar_events", ["title"]))
//!     .build()?;
//!
//! let mut backend = SqliteBackend::in_memory().await?;
//! let result = converge::reconcile(&mut backend, &spec).await?;
//! println!("{result}");
//! ```
//!
//! # Concurrency
//!
//! Each table is reconciled while holding an advisory lock named
//! `converge:<table>` (MySQL `GET_LOCK`; a no-op on SQLite, whose database
//! lock already serialises writers). Two runs racing on the same table still
//! converge: statements that fail because the object already exists count as
//! skipped, not failed.

mod backend;
mod connect;
mod diff;
mod error;
mod mysql;
mod reconcile;
mod sqlite;
mod traced;

pub use backend::{Backend, BoxFuture};
pub use connect::{
    ConnectOptions, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MAX_RETRIES, DEFAULT_MYSQL_PORT,
    DEFAULT_RETRY_DELAY, DEFAULT_SQLITE_PATH, Settings, Target, connect, mask_password,
};
pub use diff::{Change, TableDiff};
pub use error::{Error, Result};
pub use mysql::MySqlBackend;
pub use reconcile::{
    DEFAULT_LOCK_TIMEOUT, Failure, ObjectKind, ReconcileResult, Reconciler, Verification, plan,
    reconcile, reconcile_all, verify,
};
pub use sqlite::SqliteBackend;
pub use traced::{BackendExt, Traced};

// Re-export the data model and dialects so most users need only this crate.
pub use converge_schema::{
    ColumnDefault, ColumnSpec, ForeignKeySpec, IndexColumn, IndexSpec, LogicalType,
    ObservedColumn, ObservedIndex, ObservedSchema, SortOrder, SpecError, TableSpec,
    index_name, unique_index_name,
};
pub use converge_sql::{Dialect, DialectKind, ErrorClass, MySqlDialect, SqliteDialect, lock_name};
