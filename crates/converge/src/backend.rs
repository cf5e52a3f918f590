//! The backend-neutral connection interface.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use converge_schema::ObservedSchema;
use converge_sql::Dialect;

use crate::Result;

/// A boxed, sendable future, as returned by [`Backend`] methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One open connection to a SQLite or MySQL database.
///
/// Everything the reconciler needs from a database goes through this trait:
/// catalog introspection, DDL execution and the advisory lock. Rows are
/// decoded into typed values by each implementation, so callers never see
/// backend row types.
///
/// Implemented by [`SqliteBackend`](crate::SqliteBackend) and
/// [`MySqlBackend`](crate::MySqlBackend).
pub trait Backend: Send {
    /// The dialect used to render statements for this backend.
    fn dialect(&self) -> &'static dyn Dialect;

    /// Whether a table with this name exists.
    fn table_exists<'a>(&'a mut self, table: &'a str) -> BoxFuture<'a, Result<bool>>;

    /// Read the live columns and indexes of a table.
    ///
    /// An absent table yields an empty observation.
    fn observe<'a>(&'a mut self, table: &'a str) -> BoxFuture<'a, Result<ObservedSchema>>;

    /// Whether `table` has an index named `index`, read fresh from the catalog.
    fn index_exists<'a>(
        &'a mut self,
        table: &'a str,
        index: &'a str,
    ) -> BoxFuture<'a, Result<bool>>;

    /// Names of all user tables, sorted.
    fn list_tables(&mut self) -> BoxFuture<'_, Result<Vec<String>>>;

    /// Execute one statement, returning the number of rows affected.
    fn execute<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Result<u64>>;

    /// Try to take the named advisory lock, waiting up to `timeout`.
    ///
    /// Returns false if the lock could not be taken in time.
    fn acquire_lock<'a>(&'a mut self, name: &'a str, timeout: Duration)
    -> BoxFuture<'a, Result<bool>>;

    /// Release a lock taken with [`Backend::acquire_lock`].
    fn release_lock<'a>(&'a mut self, name: &'a str) -> BoxFuture<'a, Result<()>>;

    /// Close the connection cleanly.
    fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>>;
}
