//! Table specification and observed-schema types for converge.
//!
//! This crate holds the data model shared by the dialect layer
//! (`converge-sql`), the spec-file loader (`converge-config`) and the
//! reconciler itself (`converge`):
//!
//! - [`TableSpec`] describes what a table *should* contain: an ordered list
//!   of [`ColumnSpec`]s, the [`IndexSpec`]s it needs, and the foreign keys to
//!   declare when the table is first created.
//! - [`ObservedSchema`] describes what the live database catalog *does*
//!   contain for one table, as read by a backend at the start of a run.
//!
//! Identifier comparisons between the two are ASCII case-insensitive, since
//! neither SQLite nor MySQL distinguish `end_date` from `END_DATE` for
//! column and index names.

use indexmap::IndexMap;
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;


/// Errors raised while building or validating a [`TableSpec`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecError {
    #[error("table name must not be empty")]
    EmptyTableName,

    #[error("table '{table}' has no columns")]
    NoColumns { table: String },

    #[error("table '{table}' has a column with an empty name")]
    EmptyColumnName { table: String },

    #[error("table '{table}' declares column '{column}' more than once")]
    DuplicateColumn { table: String, column: String },

    #[error("table '{table}' declares index '{index}' more than once")]
    DuplicateIndex { table: String, index: String },

    #[error("index '{index}' on table '{table}' has no columns")]
    EmptyIndex { table: String, index: String },

    #[error("index '{index}' on table '{table}' references unknown column '{column}'")]
    UnknownIndexColumn {
        table: String,
        index: String,
        column: String,
    },

    #[error("foreign key on table '{table}' references unknown column '{column}'")]
    UnknownForeignKeyColumn { table: String, column: String },

    #[error("column '{table}.{column}' is auto-increment but {reason}")]
    InvalidAutoIncrement {
        table: String,
        column: String,
        reason: &'static str,
    },

    /// SQLite cannot add such a column to an existing table: `ADD COLUMN`
    /// rejects non-constant defaults, and NOT NULL without one fails on any
    /// table that already has rows.
    #[error("column '{table}.{column}' is NOT NULL with a 'now' default; make it nullable")]
    NotNullNowDefault { table: String, column: String },

    #[error("invalid column type '{0}'")]
    InvalidType(String),
}

/// Backend-neutral column types.
///
/// Each dialect maps these onto a concrete declaration: SQLite is permissive
/// (`Varchar(150)` becomes `TEXT`), MySQL needs explicit lengths. Anything a
/// dialect cannot express generically goes through [`LogicalType::Raw`],
/// which is emitted verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// 32-bit integer (`INTEGER` / `INT`)
    Integer,
    /// 64-bit integer (`INTEGER` / `BIGINT`)
    BigInt,
    /// Boolean flag (`INTEGER` / `TINYINT(1)`)
    Boolean,
    /// Floating point (`REAL` / `DOUBLE`)
    Real,
    /// Unbounded text
    Text,
    /// Bounded text with a maximum length in characters
    Varchar(u32),
    /// Date and time of day
    Timestamp,
    /// Calendar date
    Date,
    /// Binary data
    Blob,
    /// A caller-encoded type declaration, passed through unchanged
    Raw(String),
}

impl LogicalType {
    /// Whether this type can back an auto-increment primary key.
    pub fn is_integer(&self) -> bool {
        matches!(self, LogicalType::Integer | LogicalType::BigInt)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalType::Integer => write!(f, "integer"),
            LogicalType::BigInt => write!(f, "bigint"),
            LogicalType::Boolean => write!(f, "boolean"),
            LogicalType::Real => write!(f, "real"),
            LogicalType::Text => write!(f, "text"),
            LogicalType::Varchar(len) => write!(f, "varchar({})", len),
            LogicalType::Timestamp => write!(f, "timestamp"),
            LogicalType::Date => write!(f, "date"),
            LogicalType::Blob => write!(f, "blob"),
            LogicalType::Raw(decl) => write!(f, "{}", decl),
        }
    }
}

impl FromStr for LogicalType {
    type Err = SpecError;

    /// Parse a type name as written in spec files.
    ///
    /// Known names are matched case-insensitively (`int`, `INTEGER`,
    /// `varchar(150)`, `datetime`, ...). Anything else is kept as
    /// [`LogicalType::Raw`] so dialect-specific declarations such as
    /// `TINYINT(1) UNSIGNED` still round-trip.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(SpecError::InvalidType(s.to_string()));
        }
        let lower = trimmed.to_ascii_lowercase();

        let ty = match lower.as_str() {
            "int" | "integer" => LogicalType::Integer,
            "bigint" => LogicalType::BigInt,
            "bool" | "boolean" => LogicalType::Boolean,
            "real" | "float" | "double" => LogicalType::Real,
            "text" | "string" => LogicalType::Text,
            "timestamp" | "datetime" => LogicalType::Timestamp,
            "date" => LogicalType::Date,
            "blob" | "bytes" => LogicalType::Blob,
            _ => {
                if let Some(len) = lower
                    .strip_prefix("varchar(")
                    .and_then(|rest| rest.strip_suffix(')'))
                {
                    let len: u32 = len
                        .trim()
                        .parse()
                        .map_err(|_| SpecError::InvalidType(s.to_string()))?;
                    if len == 0 {
                        return Err(SpecError::InvalidType(s.to_string()));
                    }
                    LogicalType::Varchar(len)
                } else {
                    LogicalType::Raw(trimmed.to_string())
                }
            }
        };
        Ok(ty)
    }
}

/// Default value for a column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnDefault {
    /// The current date and time, rendered per dialect.
    Now,
    /// A raw SQL expression such as `0`, `'ios'` or `NULL`.
    Expr(String),
}

impl ColumnDefault {
    /// Parse a default as written in spec files.
    ///
    /// `now`, `now()` and `current_timestamp` (any case) become
    /// [`ColumnDefault::Now`]; everything else is a raw expression.
    pub fn parse(s: &str) -> Self {
        let trimmed = s.trim();
        let lower = trimmed.to_ascii_lowercase();
        match lower.as_str() {
            "now" | "now()" | "current_timestamp" => ColumnDefault::Now,
            _ => ColumnDefault::Expr(trimmed.to_string()),
        }
    }
}

impl fmt::Display for ColumnDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnDefault::Now => write!(f, "now"),
            ColumnDefault::Expr(expr) => write!(f, "{}", expr),
        }
    }
}

/// A column the target table must have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Column name
    pub name: String,
    /// Backend-neutral type
    pub logical_type: LogicalType,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Default value (if any)
    pub default: Option<ColumnDefault>,
    /// Whether this column is (part of) the primary key
    pub primary_key: bool,
    /// Whether the database generates values for this column
    pub auto_increment: bool,
    /// Whether this column carries a single-column unique constraint
    pub unique: bool,
}

impl ColumnSpec {
    /// A nullable column with no default and no constraints.
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
            nullable: true,
            default: None,
            primary_key: false,
            auto_increment: false,
            unique: false,
        }
    }

    /// Mark the column `NOT NULL`.
    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    /// Set a raw default expression.
    pub fn default_expr(mut self, expr: impl Into<String>) -> Self {
        self.default = Some(ColumnDefault::Expr(expr.into()));
        self
    }

    /// Default to the current timestamp.
    pub fn default_now(mut self) -> Self {
        self.default = Some(ColumnDefault::Now);
        self
    }

    /// Mark the column as primary key. Primary key columns are never nullable.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Let the database generate values for this column.
    pub fn auto_increment(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    /// Add a single-column unique constraint.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Sort order for index columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    /// Ascending order (default)
    #[default]
    Asc,
    /// Descending order
    Desc,
}

impl SortOrder {
    /// Returns the SQL keyword for this sort order, or empty string for ASC (default).
    pub fn to_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "",
            SortOrder::Desc => " DESC",
        }
    }
}

/// A column in an index with optional sort order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexColumn {
    /// Column name
    pub name: String,
    /// Sort order (ASC or DESC)
    pub order: SortOrder,
}

impl IndexColumn {
    /// Create a new index column with default (ASC) ordering.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: SortOrder::Asc,
        }
    }

    /// Create a new index column with DESC ordering.
    pub fn desc(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            order: SortOrder::Desc,
        }
    }

    /// Returns the SQL fragment for this column (quoted name + order).
    pub fn to_sql(&self, quote_ident: impl Fn(&str) -> String) -> String {
        format!("{}{}", quote_ident(&self.name), self.order.to_sql())
    }

    /// Parse a column specification like "col_name", "col_name ASC" or "col_name DESC".
    pub fn parse(spec: &str) -> Self {
        let trimmed = spec.trim();
        let upper = trimmed.to_uppercase();

        let (name, order) = if upper.ends_with(" DESC") {
            (trimmed[..trimmed.len() - 5].trim(), SortOrder::Desc)
        } else if upper.ends_with(" ASC") {
            (trimmed[..trimmed.len() - 4].trim(), SortOrder::Asc)
        } else {
            (trimmed, SortOrder::Asc)
        };

        Self {
            name: unquote_ident(name),
            order,
        }
    }
}

/// Strip one layer of `"..."` or `` `...` `` quoting from an identifier.
fn unquote_ident(s: &str) -> String {
    let s = s.trim();
    for quote in ['"', '`'] {
        if s.len() >= 2 && s.starts_with(quote) && s.ends_with(quote) {
            let inner = &s[1..s.len() - 1];
            let doubled: String = [quote, quote].iter().collect();
            return inner.replace(&doubled, &quote.to_string());
        }
    }
    s.to_string()
}

/// An index the target table must have. Indexes are matched by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    /// Index name
    pub name: String,
    /// Column(s) in the index with sort order
    pub columns: Vec<IndexColumn>,
    /// Whether this is a unique index
    pub unique: bool,
}

impl IndexSpec {
    /// A non-unique index over the given column specs (see [`IndexColumn::parse`]).
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            name: name.into(),
            columns: columns
                .into_iter()
                .map(|c| IndexColumn::parse(c.as_ref()))
                .collect(),
            unique: false,
        }
    }

    /// A non-unique index named with the `idx_{table}_{columns}` convention.
    pub fn on<I, S>(table: &str, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let columns: Vec<IndexColumn> = columns
            .into_iter()
            .map(|c| IndexColumn::parse(c.as_ref()))
            .collect();
        let names: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        Self {
            name: index_name(table, &names),
            columns,
            unique: false,
        }
    }

    /// Make this a unique index.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// A foreign key declared when the table is created.
///
/// Foreign keys are never added to an existing table: SQLite cannot
/// `ALTER TABLE ... ADD CONSTRAINT`, and the reconciler only issues
/// statements both backends accept.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKeySpec {
    /// Column(s) in this table
    pub columns: Vec<String>,
    /// Referenced table
    pub references_table: String,
    /// Referenced column(s)
    pub references_columns: Vec<String>,
}

impl ForeignKeySpec {
    pub fn new(
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        Self {
            columns: vec![column.into()],
            references_table: references_table.into(),
            references_columns: vec![references_column.into()],
        }
    }
}

/// The target definition of one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    /// Table name
    pub name: String,
    /// Columns, in declaration order
    pub columns: Vec<ColumnSpec>,
    /// Indexes
    pub indexes: Vec<IndexSpec>,
    /// Foreign keys (only used when creating the table)
    pub foreign_keys: Vec<ForeignKeySpec>,
}

impl TableSpec {
    /// Start building a table spec.
    pub fn builder(name: impl Into<String>) -> TableSpecBuilder {
        TableSpecBuilder {
            spec: TableSpec {
                name: name.into(),
                columns: Vec::new(),
                indexes: Vec::new(),
                foreign_keys: Vec::new(),
            },
        }
    }

    /// Look up a column by name (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Primary key columns, in declaration order.
    pub fn primary_key_columns(&self) -> Vec<&ColumnSpec> {
        self.columns.iter().filter(|c| c.primary_key).collect()
    }

    /// Check the spec for internal consistency.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.name.trim().is_empty() {
            return Err(SpecError::EmptyTableName);
        }
        if self.columns.is_empty() {
            return Err(SpecError::NoColumns {
                table: self.name.clone(),
            });
        }

        let mut seen = HashSet::new();
        for col in &self.columns {
            if col.name.trim().is_empty() {
                return Err(SpecError::EmptyColumnName {
                    table: self.name.clone(),
                });
            }
            if !seen.insert(col.name.to_ascii_lowercase()) {
                return Err(SpecError::DuplicateColumn {
                    table: self.name.clone(),
                    column: col.name.clone(),
                });
            }
            if !col.nullable && col.default == Some(ColumnDefault::Now) {
                return Err(SpecError::NotNullNowDefault {
                    table: self.name.clone(),
                    column: col.name.clone(),
                });
            }
            if col.auto_increment {
                let reason = if !col.primary_key {
                    Some("it is not the primary key")
                } else if !col.logical_type.is_integer() {
                    Some("its type is not an integer")
                } else {
                    None
                };
                if let Some(reason) = reason {
                    return Err(SpecError::InvalidAutoIncrement {
                        table: self.name.clone(),
                        column: col.name.clone(),
                        reason,
                    });
                }
            }
        }

        let auto_columns: Vec<&ColumnSpec> =
            self.columns.iter().filter(|c| c.auto_increment).collect();
        if let Some(col) = auto_columns.first() {
            if auto_columns.len() > 1 || self.primary_key_columns().len() > 1 {
                return Err(SpecError::InvalidAutoIncrement {
                    table: self.name.clone(),
                    column: col.name.clone(),
                    reason: "the primary key spans several columns",
                });
            }
        }

        let mut seen_indexes = HashSet::new();
        for idx in &self.indexes {
            if !seen_indexes.insert(idx.name.to_ascii_lowercase()) {
                return Err(SpecError::DuplicateIndex {
                    table: self.name.clone(),
                    index: idx.name.clone(),
                });
            }
            if idx.columns.is_empty() {
                return Err(SpecError::EmptyIndex {
                    table: self.name.clone(),
                    index: idx.name.clone(),
                });
            }
            for col in &idx.columns {
                if self.column(&col.name).is_none() {
                    return Err(SpecError::UnknownIndexColumn {
                        table: self.name.clone(),
                        index: idx.name.clone(),
                        column: col.name.clone(),
                    });
                }
            }
        }

        for fk in &self.foreign_keys {
            for col in &fk.columns {
                if self.column(col).is_none() {
                    return Err(SpecError::UnknownForeignKeyColumn {
                        table: self.name.clone(),
                        column: col.clone(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Builder for [`TableSpec`]; [`TableSpecBuilder::build`] validates.
#[derive(Debug, Clone)]
pub struct TableSpecBuilder {
    spec: TableSpec,
}

impl TableSpecBuilder {
    pub fn column(mut self, column: ColumnSpec) -> Self {
        self.spec.columns.push(column);
        self
    }

    pub fn index(mut self, index: IndexSpec) -> Self {
        self.spec.indexes.push(index);
        self
    }

    pub fn foreign_key(mut self, fk: ForeignKeySpec) -> Self {
        self.spec.foreign_keys.push(fk);
        self
    }

    pub fn build(self) -> Result<TableSpec, SpecError> {
        self.spec.validate()?;
        Ok(self.spec)
    }
}

/// A column as reported by the database catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedColumn {
    /// Column name, as stored in the catalog
    pub name: String,
    /// Declared type, as the backend reports it (`TEXT`, `varchar(150)`, ...)
    pub declared_type: String,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Default expression, as the backend reports it
    pub default: Option<String>,
    /// Whether the column is part of the primary key
    pub primary_key: bool,
}

/// An index as reported by the database catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedIndex {
    /// Index name
    pub name: String,
    /// Whether the index enforces uniqueness
    pub unique: bool,
}

/// The live shape of one table, read from the catalog at the start of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObservedSchema {
    /// Table name
    pub table: String,
    /// Columns keyed by lowercased name, in catalog order
    pub columns: IndexMap<String, ObservedColumn>,
    /// Indexes keyed by lowercased name
    pub indexes: IndexMap<String, ObservedIndex>,
}

impl ObservedSchema {
    /// An empty observation for `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: IndexMap::new(),
            indexes: IndexMap::new(),
        }
    }

    /// Record a column.
    pub fn push_column(&mut self, column: ObservedColumn) {
        self.columns
            .insert(column.name.to_ascii_lowercase(), column);
    }

    /// Record an index.
    pub fn push_index(&mut self, index: ObservedIndex) {
        self.indexes.insert(index.name.to_ascii_lowercase(), index);
    }

    /// Whether a column with this name exists (case-insensitive).
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(&name.to_ascii_lowercase())
    }

    /// Look up a column by name (case-insensitive).
    pub fn column(&self, name: &str) -> Option<&ObservedColumn> {
        self.columns.get(&name.to_ascii_lowercase())
    }

    /// Whether an index with this name exists (case-insensitive).
    pub fn has_index(&self, name: &str) -> bool {
        self.indexes.contains_key(&name.to_ascii_lowercase())
    }

    /// Column names in catalog order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.values().map(|c| c.name.as_str()).collect()
    }
}

/// Generate a standard index name for a table and columns.
///
/// Uses the convention `idx_{table}_{columns}` where columns are joined by underscore.
///
/// # Examples
///
/// ```
/// assert_eq!(converge_schema::index_name("calendar_events", &["date"]), "idx_calendar_events_date");
/// ```
pub fn index_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    let cols: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
    format!("idx_{}_{}", table, cols.join("_"))
}

/// Generate a standard unique index name for a table and columns.
///
/// Uses the convention `uq_{table}_{columns}` where columns are joined by underscore.
///
/// # Examples
///
/// ```
/// assert_eq!(converge_schema::unique_index_name("push_tokens", &["username", "platform"]), "uq_push_tokens_username_platform");
/// ```
pub fn unique_index_name(table: &str, columns: &[impl AsRef<str>]) -> String {
    let cols: Vec<&str> = columns.iter().map(|c| c.as_ref()).collect();
    format!("uq_{}_{}", table, cols.join("_"))
}
