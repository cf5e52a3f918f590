//! MySQL backend.

use std::time::Duration;

use converge_schema::{ObservedColumn, ObservedIndex, ObservedSchema};
use converge_sql::{Dialect, MySqlDialect};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection, Row};

use crate::backend::{Backend, BoxFuture};
use crate::Result;

/// A single MySQL connection.
///
/// Introspection is scoped to the connection's current database
/// (`DATABASE()`). Advisory locks use `GET_LOCK` / `RELEASE_LOCK`, which
/// belong to the session and are dropped if the connection dies.
pub struct MySqlBackend {
    conn: MySqlConnection,
}

impl MySqlBackend {
    /// Open a connection with the given options.
    pub async fn connect(options: &MySqlConnectOptions) -> Result<Self> {
        let conn = options.connect().await?;
        Ok(Self { conn })
    }

    /// Wrap an already-open connection.
    pub fn from_connection(conn: MySqlConnection) -> Self {
        Self { conn }
    }

    /// The underlying connection, for statements outside the reconciler.
    pub fn connection(&mut self) -> &mut MySqlConnection {
        &mut self.conn
    }

    async fn table_exists_impl(&mut self, table: &str) -> Result<bool> {
        let row = sqlx::query(MySqlDialect.table_exists_sql())
            .bind(table)
            .fetch_optional(&mut self.conn)
            .await?;
        Ok(row.is_some())
    }

    async fn observe_impl(&mut self, table: &str) -> Result<ObservedSchema> {
        let mut observed = ObservedSchema::new(table);

        let rows = sqlx::query(MySqlDialect.columns_sql())
            .bind(table)
            .fetch_all(&mut self.conn)
            .await?;
        for row in rows {
            let is_nullable: String = row.try_get(2)?;
            let column_key: Option<String> = row.try_get(4)?;
            observed.push_column(ObservedColumn {
                name: row.try_get(0)?,
                declared_type: row.try_get(1)?,
                nullable: is_nullable.eq_ignore_ascii_case("YES"),
                default: row.try_get(3)?,
                primary_key: column_key.as_deref() == Some("PRI"),
            });
        }

        let rows = sqlx::query(MySqlDialect.indexes_sql())
            .bind(table)
            .fetch_all(&mut self.conn)
            .await?;
        for row in rows {
            let non_unique: i64 = row.try_get(1)?;
            observed.push_index(ObservedIndex {
                name: row.try_get(0)?,
                unique: non_unique == 0,
            });
        }

        Ok(observed)
    }

    async fn list_tables_impl(&mut self) -> Result<Vec<String>> {
        let rows = sqlx::query(MySqlDialect.list_tables_sql())
            .fetch_all(&mut self.conn)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>(0).map_err(Into::into))
            .collect()
    }

    async fn index_exists_impl(&mut self, table: &str, index: &str) -> Result<bool> {
        let row = sqlx::query(MySqlDialect.index_exists_sql())
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

    async fn acquire_lock_impl(&mut self, name: &str, timeout: Duration) -> Result<bool> {
        // GET_LOCK takes whole seconds; 1 = acquired, 0 = timed out, NULL = error.
        let seconds = timeout.as_secs_f64().ceil() as i64;
        let acquired: Option<i64> = sqlx::query_scalar("SELECT GET_LOCK(?, ?)")
            .bind(name)
            .bind(seconds)
            .fetch_one(&mut self.conn)
            .await?;
        Ok(acquired == Some(1))
    }

    async fn release_lock_impl(&mut self, name: &str) -> Result<()> {
        let _released: Option<i64> = sqlx::query_scalar("SELECT RELEASE_LOCK(?)")
            .bind(name)
            .fetch_one(&mut self.conn)
            .await?;
        Ok(())
    }
}

impl Backend for MySqlBackend {
    fn dialect(&self) -> &'static dyn Dialect {
        &MySqlDialect
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
        name: &'a str,
        timeout: Duration,
    ) -> BoxFuture<'a, Result<bool>> {
        Box::pin(self.acquire_lock_impl(name, timeout))
    }

    fn release_lock<'a>(&'a mut self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.release_lock_impl(name))
    }

    fn close(self: Box<Self>) -> BoxFuture<'static, Result<()>> {
        let this = *self;
        Box::pin(async move {
            this.conn.close().await?;
            Ok(())
        })
    }
}
