//! Traced backend wrapper.
//!
//! Wraps a [`Backend`] and logs every catalog read and statement via tracing.

use std::time::Duration;

use converge_schema::ObservedSchema;
use converge_sql::Dialect;
use tracing::Instrument;

use crate::backend::Backend;
use crate::Result;

/// A wrapper around a backend that logs all queries via tracing.
///
/// This is a thin wrapper that delegates to the underlying backend but adds
/// `tracing::debug_span!` around each call.
///
/// # Example
///
/// ```ignore
/// use converge::BackendExt;
///
/// let mut backend = SqliteBackend::in_memory().await?;
/// let mut traced = backend.traced();
///
/// // All statements are now logged at debug level
/// traced.execute("CREATE TABLE t (id INTEGER)").await?;
/// let observed = traced.observe("t").await?;
/// ```
pub struct Traced<'a, B: Backend + ?Sized> {
    backend: &'a mut B,
}

impl<'a, B: Backend + ?Sized> Traced<'a, B> {
    /// Create a new traced wrapper.
    pub fn new(backend: &'a mut B) -> Self {
        Self { backend }
    }

    /// The dialect of the wrapped backend.
    pub fn dialect(&self) -> &'static dyn Dialect {
        self.backend.dialect()
    }

    /// Execute a statement, returning the number of rows affected.
    pub async fn execute(&mut self, sql: &str) -> Result<u64> {
        let span = tracing::debug_span!(
            "db.execute",
            backend = self.backend.dialect().name(),
            sql = %sql,
            affected = tracing::field::Empty,
        );
        let affected = self
            .backend
            .execute(sql)
            .instrument(span.clone())
            .await?;
        span.record("affected", affected);
        Ok(affected)
    }

    /// Whether a table exists.
    pub async fn table_exists(&mut self, table: &str) -> Result<bool> {
        let span = tracing::debug_span!(
            "db.query",
            backend = self.backend.dialect().name(),
            sql = %self.backend.dialect().table_exists_sql(),
            exists = tracing::field::Empty,
        );
        let exists = self
            .backend
            .table_exists(table)
            .instrument(span.clone())
            .await?;
        span.record("exists", exists);
        Ok(exists)
    }

    /// Read the live shape of a table.
    pub async fn observe(&mut self, table: &str) -> Result<ObservedSchema> {
        let span = tracing::debug_span!(
            "db.observe",
            backend = self.backend.dialect().name(),
            table = %table,
            columns = tracing::field::Empty,
            indexes = tracing::field::Empty,
        );
        let observed = self
            .backend
            .observe(table)
            .instrument(span.clone())
            .await?;
        span.record("columns", observed.columns.len());
        span.record("indexes", observed.indexes.len());
        Ok(observed)
    }

    /// Whether a table has the named index.
    pub async fn index_exists(&mut self, table: &str, index: &str) -> Result<bool> {
        let span = tracing::debug_span!(
            "db.query",
            backend = self.backend.dialect().name(),
            sql = %self.backend.dialect().index_exists_sql(),
            exists = tracing::field::Empty,
        );
        let exists = self
            .backend
            .index_exists(table, index)
            .instrument(span.clone())
            .await?;
        span.record("exists", exists);
        Ok(exists)
    }

    /// Names of all user tables.
    pub async fn list_tables(&mut self) -> Result<Vec<String>> {
        let span = tracing::debug_span!(
            "db.query",
            backend = self.backend.dialect().name(),
            sql = %self.backend.dialect().list_tables_sql(),
            rows = tracing::field::Empty,
        );
        let tables = self
            .backend
            .list_tables()
            .instrument(span.clone())
            .await?;
        span.record("rows", tables.len());
        Ok(tables)
    }

    /// Take an advisory lock.
    pub async fn acquire_lock(&mut self, name: &str, timeout: Duration) -> Result<bool> {
        let span = tracing::debug_span!(
            "db.lock",
            name = %name,
            timeout = ?timeout,
            acquired = tracing::field::Empty,
        );
        let acquired = self
            .backend
            .acquire_lock(name, timeout)
            .instrument(span.clone())
            .await?;
        span.record("acquired", acquired);
        Ok(acquired)
    }

    /// Release an advisory lock.
    pub async fn release_lock(&mut self, name: &str) -> Result<()> {
        let span = tracing::debug_span!("db.unlock", name = %name);
        self.backend.release_lock(name).instrument(span).await
    }
}

/// Extension trait to get a traced wrapper from a backend.
pub trait BackendExt: Backend {
    /// Wrap this backend in a [`Traced`] for query logging.
    fn traced(&mut self) -> Traced<'_, Self> {
        Traced::new(self)
    }
}

impl<B: Backend + ?Sized> BackendExt for B {}
