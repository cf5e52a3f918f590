//! The schema reconciler.
//!
//! Brings one table up to its [`TableSpec`] by issuing only additive DDL:
//! `CREATE TABLE` when the table is absent, then one `ADD COLUMN` per missing
//! column and one `CREATE INDEX` per missing index. Nothing is ever dropped,
//! renamed or altered in place, so running it twice is a no-op the second
//! time and running it against a half-migrated table finishes the job.
//!
//! Each statement commits on its own. A statement that fails because its
//! object already exists (a concurrent run, or an earlier partial run) is
//! counted as skipped; any other failure is recorded and the remaining
//! objects are still attempted.

use std::fmt;
use std::time::Duration;

use converge_schema::TableSpec;
use converge_sql::{Dialect, ErrorClass, lock_name};
use tracing::{debug, info, warn};

use crate::backend::Backend;
use crate::diff::{Change, TableDiff};
use crate::traced::{BackendExt, Traced};
use crate::{Error, Result};

/// Default wait for the per-table advisory lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// The kind of schema object a statement creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Table,
    Column,
    Index,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectKind::Table => write!(f, "table"),
            ObjectKind::Column => write!(f, "column"),
            ObjectKind::Index => write!(f, "index"),
        }
    }
}

/// A statement that failed for a reason other than "already exists".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub object: ObjectKind,
    pub name: String,
    pub statement: String,
    pub message: String,
}

/// Outcome of reconciling one table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileResult {
    pub table: String,
    pub table_created: bool,
    pub columns_added: Vec<String>,
    pub indexes_added: Vec<String>,
    /// Columns found present, either up front or via a duplicate-column error.
    pub columns_skipped_existing: Vec<String>,
    /// Indexes found present, either up front or via a duplicate-index error.
    pub indexes_skipped_existing: Vec<String>,
    pub failures: Vec<Failure>,
}

impl ReconcileResult {
    fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            ..Default::default()
        }
    }

    /// True if no statement failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    /// True if nothing was created.
    pub fn is_noop(&self) -> bool {
        !self.table_created && self.columns_added.is_empty() && self.indexes_added.is_empty()
    }

    /// Turn the first failure, if any, into an [`Error::Schema`].
    pub fn into_result(self) -> Result<Self> {
        match self.failures.first() {
            None => Ok(self),
            Some(failure) => Err(Error::Schema {
                table: self.table.clone(),
                object: failure.object,
                name: failure.name.clone(),
                statement: failure.statement.clone(),
                message: failure.message.clone(),
            }),
        }
    }

    fn added_count(&self) -> usize {
        self.columns_added.len() + self.indexes_added.len()
    }

    fn skipped_count(&self) -> usize {
        self.columns_skipped_existing.len() + self.indexes_skipped_existing.len()
    }
}

impl fmt::Display for ReconcileResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.table_created {
            writeln!(f, "{}: created table", self.table)?;
        } else {
            writeln!(f, "{}:", self.table)?;
        }
        for name in &self.columns_added {
            writeln!(f, "  + column {}", name)?;
        }
        for name in &self.columns_skipped_existing {
            writeln!(f, "  = column {} (already exists)", name)?;
        }
        for name in &self.indexes_added {
            writeln!(f, "  + index {}", name)?;
        }
        for name in &self.indexes_skipped_existing {
            writeln!(f, "  = index {} (already exists)", name)?;
        }
        for failure in &self.failures {
            writeln!(f, "  ! {} {}: {}", failure.object, failure.name, failure.message)?;
        }
        write!(
            f,
            "  {} added, {} already present, {} failed",
            self.added_count(),
            self.skipped_count(),
            self.failures.len()
        )
    }
}

/// Tables that still lack spec'd objects after a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub table: String,
    pub table_exists: bool,
    pub missing_columns: Vec<String>,
    pub missing_indexes: Vec<String>,
}

impl Verification {
    /// True if the table has every spec'd column and index.
    pub fn is_converged(&self) -> bool {
        self.table_exists && self.missing_columns.is_empty() && self.missing_indexes.is_empty()
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.table_exists {
            return write!(f, "{}: table is missing", self.table);
        }
        if self.is_converged() {
            return write!(f, "{}: verified", self.table);
        }
        write!(f, "{}: still missing", self.table)?;
        if !self.missing_columns.is_empty() {
            write!(f, " columns [{}]", self.missing_columns.join(", "))?;
        }
        if !self.missing_indexes.is_empty() {
            write!(f, " indexes [{}]", self.missing_indexes.join(", "))?;
        }
        Ok(())
    }
}

/// Reconciles table specs against one backend connection.
pub struct Reconciler<'a, B: Backend + ?Sized> {
    backend: &'a mut B,
    lock_timeout: Duration,
}

impl<'a, B: Backend + ?Sized> Reconciler<'a, B> {
    pub fn new(backend: &'a mut B) -> Self {
        Self {
            backend,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// How long to wait for another run holding the same table's lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Compute the changes `reconcile` would make, without executing anything.
    pub async fn plan(&mut self, spec: &TableSpec) -> Result<TableDiff> {
        spec.validate()?;
        let mut conn = self.backend.traced();
        let dialect = conn.dialect();
        let observed = if conn.table_exists(&spec.name).await? {
            Some(conn.observe(&spec.name).await?)
        } else {
            None
        };
        Ok(TableDiff::compute(spec, observed.as_ref(), dialect))
    }

    /// Bring one table up to its spec.
    ///
    /// Returns `Err` only when nothing could be attempted: the spec is
    /// invalid, the lock could not be taken, the catalog could not be read,
    /// or `CREATE TABLE` failed. Failures of individual columns and indexes
    /// are reported in [`ReconcileResult::failures`].
    pub async fn reconcile(&mut self, spec: &TableSpec) -> Result<ReconcileResult> {
        spec.validate()?;

        let lock = lock_name(&spec.name);
        let mut conn = self.backend.traced();
        if !conn.acquire_lock(&lock, self.lock_timeout).await? {
            return Err(Error::LockTimeout { name: lock });
        }

        let result = reconcile_locked(&mut conn, spec).await;
        let released = conn.release_lock(&lock).await;

        let result = result?;
        released?;

        if result.is_success() {
            info!(
                table = %result.table,
                created = result.table_created,
                added = result.added_count(),
                skipped = result.skipped_count(),
                "table reconciled"
            );
        } else {
            warn!(
                table = %result.table,
                failed = result.failures.len(),
                "table reconciled with failures"
            );
        }
        Ok(result)
    }

    /// Reconcile several tables in order.
    ///
    /// A `CREATE TABLE` failure is recorded as a table failure and the next
    /// table is attempted. Connection, catalog and lock errors abort the run.
    pub async fn reconcile_all(&mut self, specs: &[TableSpec]) -> Result<Vec<ReconcileResult>> {
        let mut results = Vec::with_capacity(specs.len());
        for spec in specs {
            match self.reconcile(spec).await {
                Ok(result) => results.push(result),
                Err(Error::Schema {
                    table,
                    object,
                    name,
                    statement,
                    message,
                }) => {
                    let mut result = ReconcileResult::new(&table);
                    result.failures.push(Failure {
                        object,
                        name,
                        statement,
                        message,
                    });
                    results.push(result);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }

    /// Re-read the table and list spec'd objects that are still missing.
    pub async fn verify(&mut self, spec: &TableSpec) -> Result<Verification> {
        let mut conn = self.backend.traced();
        if !conn.table_exists(&spec.name).await? {
            return Ok(Verification {
                table: spec.name.clone(),
                table_exists: false,
                missing_columns: spec.columns.iter().map(|c| c.name.clone()).collect(),
                missing_indexes: spec.indexes.iter().map(|i| i.name.clone()).collect(),
            });
        }

        let observed = conn.observe(&spec.name).await?;
        Ok(Verification {
            table: spec.name.clone(),
            table_exists: true,
            missing_columns: spec
                .columns
                .iter()
                .filter(|c| !observed.has_column(&c.name))
                .map(|c| c.name.clone())
                .collect(),
            missing_indexes: spec
                .indexes
                .iter()
                .filter(|i| !observed.has_index(&i.name))
                .map(|i| i.name.clone())
                .collect(),
        })
    }
}

async fn reconcile_locked<B: Backend + ?Sized>(
    conn: &mut Traced<'_, B>,
    spec: &TableSpec,
) -> Result<ReconcileResult> {
    let dialect = conn.dialect();
    let mut result = ReconcileResult::new(&spec.name);

    if !conn.table_exists(&spec.name).await? {
        let diff = TableDiff::compute(spec, None, dialect);
        if create_table(conn, dialect, spec, &diff, &mut result).await? {
            return Ok(result);
        }
    }

    let observed = conn.observe(&spec.name).await?;
    let diff = TableDiff::compute(spec, Some(&observed), dialect);
    result
        .columns_skipped_existing
        .extend(diff.present_columns.iter().cloned());
    result
        .indexes_skipped_existing
        .extend(diff.present_indexes.iter().cloned());

    for change in &diff.changes {
        apply(conn, dialect, &spec.name, change, &mut result).await?;
    }

    Ok(result)
}

/// Run the create-table diff. Returns false if another session created the
/// table first, in which case the caller reconciles it as an existing table.
async fn create_table<B: Backend + ?Sized>(
    conn: &mut Traced<'_, B>,
    dialect: &dyn Dialect,
    spec: &TableSpec,
    diff: &TableDiff,
    result: &mut ReconcileResult,
) -> Result<bool> {
    let sql = dialect.create_table_sql(spec);
    if let Err(err) = conn.execute(&sql).await {
        let (code, message) = err.database_parts();
        return match dialect.classify_error(code.as_deref(), &message) {
            ErrorClass::AlreadyExists => {
                debug!(table = %spec.name, "table appeared concurrently, reconciling columns");
                Ok(false)
            }
            ErrorClass::Other => Err(Error::Schema {
                table: spec.name.clone(),
                object: ObjectKind::Table,
                name: spec.name.clone(),
                statement: sql,
                message,
            }),
        };
    }

    info!(table = %spec.name, "created table");
    result.table_created = true;
    result.columns_added = spec.columns.iter().map(|c| c.name.clone()).collect();
    if dialect.inline_indexes() {
        result.indexes_added = spec.indexes.iter().map(|i| i.name.clone()).collect();
    }

    for change in diff.changes.iter().skip(1) {
        apply(conn, dialect, &spec.name, change, result).await?;
    }
    Ok(true)
}

/// What a single statement did to its object.
enum Outcome {
    Added,
    AlreadyExists,
    Failed(String),
}

/// Execute one ADD COLUMN / CREATE INDEX and record its outcome.
///
/// Only catalog reads can fail the whole call; statement errors are recorded
/// in `result`.
async fn apply<B: Backend + ?Sized>(
    conn: &mut Traced<'_, B>,
    dialect: &dyn Dialect,
    table: &str,
    change: &Change,
    result: &mut ReconcileResult,
) -> Result<()> {
    let sql = change.to_sql(dialect, table);
    let (object, name, outcome) = match change {
        Change::CreateTable(spec) => (
            ObjectKind::Table,
            spec.name.as_str(),
            execute_classified(conn, dialect, &sql).await,
        ),
        Change::AddColumn(col) => (
            ObjectKind::Column,
            col.name.as_str(),
            execute_classified(conn, dialect, &sql).await,
        ),
        Change::AddIndex(idx) => (
            ObjectKind::Index,
            idx.name.as_str(),
            create_index(conn, dialect, table, &idx.name, &sql).await?,
        ),
    };

    match (outcome, object) {
        (Outcome::Added, ObjectKind::Index) => {
            info!(table = %table, index = %name, "added index");
            result.indexes_added.push(name.to_string());
        }
        (Outcome::Added, _) => {
            info!(table = %table, column = %name, "added column");
            result.columns_added.push(name.to_string());
        }
        (Outcome::AlreadyExists, ObjectKind::Index) => {
            debug!(table = %table, index = %name, "index already exists, skipping");
            result.indexes_skipped_existing.push(name.to_string());
        }
        (Outcome::AlreadyExists, _) => {
            debug!(table = %table, column = %name, "column already exists, skipping");
            result.columns_skipped_existing.push(name.to_string());
        }
        (Outcome::Failed(message), _) => {
            warn!(table = %table, %object, name = %name, error = %message, "statement failed");
            result.failures.push(Failure {
                object,
                name: name.to_string(),
                statement: sql,
                message,
            });
        }
    }
    Ok(())
}

async fn execute_classified<B: Backend + ?Sized>(
    conn: &mut Traced<'_, B>,
    dialect: &dyn Dialect,
    sql: &str,
) -> Outcome {
    match conn.execute(sql).await {
        Ok(_) => Outcome::Added,
        Err(err) => {
            let (code, message) = err.database_parts();
            match dialect.classify_error(code.as_deref(), &message) {
                ErrorClass::AlreadyExists => Outcome::AlreadyExists,
                ErrorClass::Other => Outcome::Failed(message),
            }
        }
    }
}

/// `CREATE INDEX IF NOT EXISTS` succeeds silently whenever the name is taken,
/// including by an index on another table (SQLite index names are
/// schema-wide). The catalog is read on both sides of the statement so only
/// an index that now exists on `table`, and did not before, counts as added.
async fn create_index<B: Backend + ?Sized>(
    conn: &mut Traced<'_, B>,
    dialect: &dyn Dialect,
    table: &str,
    index: &str,
    sql: &str,
) -> Result<Outcome> {
    if !dialect.supports_create_index_if_not_exists() {
        return Ok(execute_classified(conn, dialect, sql).await);
    }
    if conn.index_exists(table, index).await? {
        return Ok(Outcome::AlreadyExists);
    }
    let outcome = execute_classified(conn, dialect, sql).await;
    if matches!(outcome, Outcome::Added) && !conn.index_exists(table, index).await? {
        return Ok(Outcome::Failed(format!(
            "index name '{}' is already used by another table",
            index
        )));
    }
    Ok(outcome)
}

/// Bring one table up to its spec. See [`Reconciler::reconcile`].
pub async fn reconcile<B: Backend + ?Sized>(
    backend: &mut B,
    spec: &TableSpec,
) -> Result<ReconcileResult> {
    Reconciler::new(backend).reconcile(spec).await
}

/// Reconcile several tables in order. See [`Reconciler::reconcile_all`].
pub async fn reconcile_all<B: Backend + ?Sized>(
    backend: &mut B,
    specs: &[TableSpec],
) -> Result<Vec<ReconcileResult>> {
    Reconciler::new(backend).reconcile_all(specs).await
}

/// Compute the changes `reconcile` would make. See [`Reconciler::plan`].
pub async fn plan<B: Backend + ?Sized>(backend: &mut B, spec: &TableSpec) -> Result<TableDiff> {
    Reconciler::new(backend).plan(spec).await
}

/// List spec'd objects still missing. See [`Reconciler::verify`].
pub async fn verify<B: Backend + ?Sized>(
    backend: &mut B,
    spec: &TableSpec,
) -> Result<Verification> {
    Reconciler::new(backend).verify(spec).await
}
