//! SQLite backend.

use std::str::FromStr;
use std::time::Duration;

use converge_schema::{ObservedColumn, ObservedIndex, ObservedSchema};
use converge_sql::{Dialect, SqliteDialect};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection, Row};

use crate::backend::{Backend, BoxFuture};
use crate::Result;

/// A single SQLite connection.
///
/// SQLite serialises writers on the database file, so the advisory lock is a
/// no-op here.
pub struct SqliteBackend {
    conn: SqliteConnection,
}

impl SqliteBackend {
    /// Open a connection with the given options.
    pub async fn connect(options: &SqliteConnectOptions) -> Result<Self> {
        let conn = options.connect().await?;
        Ok(Self { conn })
    }

    /// Open a private in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect(&options).await
    }

    /// Wrap an already-open connection.
    pub fn from_connection(conn: SqliteConnection) -> Self {
        Self { conn }
    }

    /// The underlying connection, for statements outside the reconciler.
    pub fn connection(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }

    async fn table_exists_impl(&mut self, table: &str) -> Result<bool> {
        let row = sqlx::query(SqliteDialect.table_exists_sql())
            .bind(table)
            .fetch_optional(&mut self.conn)
            .await?;
        Ok(row.is_some())
    }

    async fn observe_impl(&mut self, table: &str) -> Result<ObservedSchema> {
        let mut observed = ObservedSchema::new(table);

        let rows = sqlx::query(SqliteDialect.columns_sql())
            .bind(table)
            .fetch_all(&mut self.conn)
            .await?;
        for row in rows {
            let not_null: i64 = row.try_get(2)?;
            let pk: i64 = row.try_get(4)?;
            observed.push_column(ObservedColumn {
                name: row.try_get(0)?,
                declared_type: row.try_get(1)?,
                nullable: not_null == 0,
                default: row.try_get(3)?,
                primary_key: pk > 0,
            });
        }

        let rows = sqlx::query(SqliteDialect.indexes_sql())
            .bind(table)
            .fetch_all(&mut self.conn)
            .await?;
        for row in rows {
            let unique: i64 = row.try_get(1)?;
            observed.push_index(ObservedIndex {
                name: row.try_get(0)?,
                unique: unique != 0,
            });
        }

        Ok(observed)
    }

    async fn list_tables_impl(&mut self) -> Result<Vec<String>> {
        let rows = sqlx::query(SqliteDialect.list_tables_sql())
            .fetch_all(&mut self.conn)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>(0).map_err(Into::into))
            .collect()
    }

    async fn index_exists_impl(&mut self, table: &str, index: &str) -> Result<bool> {
        let row = sqlx::query(SqliteDialect.index_exists_sql())
            .bind(table)
            .bind(index)
            .fetch_optional(&mut self.conn)
            .await?;
        Ok(row.is_some())
    }

    async fn execute_impl(&mut self, sql: &str) -> Result<u64> {
        let result = sqlx::query(sql).execute(&mut self.conn).await?;
        Ok(result.rows_affected())
    }
}

impl Backend for SqliteBackend {
    fn dialect(&self) -> &'static dyn Dialect {
        &SqliteDialect
    }

    fn table_exists<'a>(&'a mut self, table: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.table_exists_impl(table))
    }

    fn observe<'a>(&'a mut self, table: &'a str) -> BoxFuture<'a, Result<ObservedSchema>> {
        Box::pin(self.observe_impl(table))
    }

    fn list_tables(&mut self) -> BoxFuture<'_, Result<Vec<String>>> {
        Box::pin(self.list_tables_impl())
    }

    fn index_exists<'a>(
        &'a mut self,
        table: &'a str,
        index: &'a str,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.index_exists_impl(table, index))
    }

    fn execute<'a>(&'a mut self, sql: &'a str) -> BoxFuture<'a, Result<u64>> {
        Box::pin(self.execute_impl(sql))
    }

    fn acquire_lock<'a>(
        &'a mut self,
        _name: &'a str,
        _timeout: Duration,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async { Ok(true) })
    }

    fn release_lock<'a>(&'a mut self, _name: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        let this = *self;
        Box::pin(async move {
            this.conn.close().await?;
            Ok(())
        })
    }
}
