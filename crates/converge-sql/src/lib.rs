//! SQL dialects for converge.
//!
//! Everything that differs between SQLite and MySQL lives behind the
//! [`Dialect`] trait: identifier quoting, the mapping from
//! [`LogicalType`](converge_schema::LogicalType) to a concrete column type,
//! the shape of `CREATE TABLE` / `ALTER TABLE` / `CREATE INDEX`, the catalog
//! queries used for introspection, and how backend error messages are
//! classified. A dialect is picked once from the configured backend
//! ([`DialectKind::dialect`]) and never switched by text substitution.
//!
//! Rendered statements carry no trailing `;`.

use std::fmt;
use std::str::FromStr;

use converge_schema::{ColumnDefault, ColumnSpec, IndexSpec, LogicalType, TableSpec};

mod mysql;
pub use mysql::MySqlDialect;

mod sqlite;
pub use sqlite::SqliteDialect;


/// A SQL string literal wrapper.
///
/// Display writes the value escaped and quoted with single quotes.
///
/// # Example
/// ```
/// use converge_sql::Lit;
/// assert_eq!(format!("{}", Lit("foo")), "'foo'");
/// assert_eq!(format!("{}", Lit("it's")), "'it''s'");
/// ```
pub struct Lit<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> fmt::Display for Lit<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'")?;
        for c in self.0.as_ref().chars() {
            if c == '\'' {
                write!(f, "''")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "'")
    }
}

/// An ANSI identifier wrapper (SQLite).
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use converge_sql::Ident;
/// assert_eq!(format!("{}", Ident("date")), "\"date\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// A MySQL identifier wrapper.
///
/// Display writes the value escaped and quoted with backticks.
///
/// # Example
/// ```
/// use converge_sql::BacktickIdent;
/// assert_eq!(format!("{}", BacktickIdent("date")), "`date`");
/// assert_eq!(format!("{}", BacktickIdent("a`b")), "`a``b`");
/// ```
pub struct BacktickIdent<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> fmt::Display for BacktickIdent<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`")?;
        for c in self.0.as_ref().chars() {
            if c == '`' {
                write!(f, "``")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "`")
    }
}

/// Escape a string literal for SQL.
pub fn escape_string(s: &str) -> String {
    format!("{}", Lit(s))
}

/// MySQL rejects `GET_LOCK` names longer than this.
pub const LOCK_NAME_MAX: usize = 64;

/// Advisory lock name guarding reconciliation of `table`.
///
/// Names are `converge:<table>`. Names that would exceed [`LOCK_NAME_MAX`]
/// keep a readable prefix and end with a stable hash of the table name.
pub fn lock_name(table: &str) -> String {
    let name = format!("converge:{}", table);
    if name.len() <= LOCK_NAME_MAX {
        return name;
    }

    let hex = blake3::hash(table.as_bytes()).to_hex().to_string();
    let suffix = &hex[..16];
    let max_table_len = LOCK_NAME_MAX - "converge::".len() - suffix.len();

    // Table names are expected to be ASCII snake_case; still, avoid splitting UTF-8.
    let mut len = max_table_len.min(table.len());
    while len > 0 && !table.is_char_boundary(len) {
        len -= 1;
    }
    format!("converge:{}:{}", &table[..len], suffix)
}

/// How a backend error relates to the object a statement tried to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The column, index or table is already there. Idempotent success.
    AlreadyExists,
    /// Anything else.
    Other,
}

/// Which database backend a dialect targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialectKind {
    Sqlite,
    MySql,
}

impl DialectKind {
    /// The dialect implementation for this backend.
    pub fn dialect(self) -> &'static dyn Dialect {
        match self {
            DialectKind::Sqlite => &SqliteDialect,
            DialectKind::MySql => &MySqlDialect,
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DialectKind::Sqlite => write!(f, "sqlite"),
            DialectKind::MySql => write!(f, "mysql"),
        }
    }
}

/// Error returned when a backend name is not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown database backend '{0}' (expected 'sqlite' or 'mysql')")]
pub struct UnknownBackend(pub String);

impl FromStr for DialectKind {
    type Err = UnknownBackend;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(DialectKind::Sqlite),
            "mysql" | "mariadb" => Ok(DialectKind::MySql),
            _ => Err(UnknownBackend(s.to_string())),
        }
    }
}

/// Backend capability interface.
///
/// Every DDL statement the reconciler issues, and every catalog query it
/// reads, is rendered through one of these methods.
pub trait Dialect: Send + Sync {
    /// Which backend this dialect targets.
    fn kind(&self) -> DialectKind;

    /// Short backend name, for logs.
    fn name(&self) -> &'static str;

    /// Quote an identifier.
    fn quote_ident(&self, name: &str) -> String;

    /// Concrete column type for a logical type.
    fn column_type(&self, ty: &LogicalType) -> String;

    /// SQL expression for the current date and time.
    fn now_expr(&self) -> &'static str;

    /// The `DEFAULT` clause body for a column default.
    fn default_expr(&self, default: &ColumnDefault) -> String;

    /// One column definition as it appears in `CREATE TABLE`.
    ///
    /// `inline_pk` is false when the table has a composite primary key, which
    /// is then declared as a table constraint instead.
    fn column_definition(&self, column: &ColumnSpec, inline_pk: bool) -> String;

    /// `CREATE TABLE` for the whole spec.
    fn create_table_sql(&self, table: &TableSpec) -> String;

    /// `ALTER TABLE .. ADD COLUMN` for one column.
    fn add_column_sql(&self, table: &str, column: &ColumnSpec) -> String;

    /// `CREATE INDEX` for one index.
    fn create_index_sql(&self, table: &str, index: &IndexSpec) -> String;

    /// Whether `create_table_sql` declares the indexes inline.
    fn inline_indexes(&self) -> bool;

    /// Whether `create_index_sql` renders `IF NOT EXISTS`.
    fn supports_create_index_if_not_exists(&self) -> bool;

    /// Classify a backend error by its SQLSTATE (if any) and message.
    fn classify_error(&self, code: Option<&str>, message: &str) -> ErrorClass;

    /// Query returning one row if the table (bound as `?`) exists.
    fn table_exists_sql(&self) -> &'static str;

    /// Query returning the name of every user table, sorted.
    fn list_tables_sql(&self) -> &'static str;

    /// Query returning `(name, type, not_null/is_nullable, default, pk)` rows
    /// for the table bound as `?`.
    fn columns_sql(&self) -> &'static str;

    /// Query returning `(name, unique)` rows for the table bound as `?`.
    fn indexes_sql(&self) -> &'static str;

    /// Query returning one row if the table (first `?`) has an index named
    /// by the second `?`. Reads the catalog directly, never a cached view.
    fn index_exists_sql(&self) -> &'static str;
}

/// Column definitions plus the composite primary key constraint, if any.
///
/// Shared by both dialects' `create_table_sql`; each then appends its own
/// extra table elements and closing.
pub(crate) fn table_elements(dialect: &dyn Dialect, table: &TableSpec) -> Vec<String> {
    let pk_columns: Vec<&str> = table
        .columns
        .iter()
        .filter(|c| c.primary_key)
        .map(|c| c.name.as_str())
        .collect();

    // If there's more than one PK column, we need a table constraint
    let use_table_pk_constraint = pk_columns.len() > 1;

    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|col| {
            format!(
                "    {}",
                dialect.column_definition(col, !use_table_pk_constraint)
            )
        })
        .collect();

    if use_table_pk_constraint {
        let quoted: Vec<String> = pk_columns.iter().map(|c| dialect.quote_ident(c)).collect();
        parts.push(format!("    PRIMARY KEY ({})", quoted.join(", ")));
    }

    parts
}

/// `FOREIGN KEY` table elements.
pub(crate) fn foreign_key_elements(dialect: &dyn Dialect, table: &TableSpec) -> Vec<String> {
    table
        .foreign_keys
        .iter()
        .map(|fk| {
            let cols: Vec<String> = fk.columns.iter().map(|c| dialect.quote_ident(c)).collect();
            let refs: Vec<String> = fk
                .references_columns
                .iter()
                .map(|c| dialect.quote_ident(c))
                .collect();
            format!(
                "    FOREIGN KEY ({}) REFERENCES {} ({})",
                cols.join(", "),
                dialect.quote_ident(&fk.references_table),
                refs.join(", ")
            )
        })
        .collect()
}

/// Quoted, ordered column list of an index: `"a", "b" DESC`.
pub(crate) fn index_columns(dialect: &dyn Dialect, index: &IndexSpec) -> String {
    let cols: Vec<String> = index
        .columns
        .iter()
        .map(|c| c.to_sql(|name| dialect.quote_ident(name)))
        .collect();
    cols.join(", ")
}

/// Case-insensitive substring test against a backend error message.
pub(crate) fn message_contains(message: &str, needle: &str) -> bool {
    message.to_ascii_lowercase().contains(needle)
}
