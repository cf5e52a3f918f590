use converge_schema::{ColumnDefault, ColumnSpec, IndexSpec, LogicalType, TableSpec};

use crate::{
    Dialect, DialectKind, ErrorClass, Ident, foreign_key_elements, index_columns,
    message_contains, table_elements,
};

/// SQLite: permissive type affinity, `IF NOT EXISTS` everywhere, no inline indexes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("{}", Ident(name))
    }

    fn column_type(&self, ty: &LogicalType) -> String {
        match ty {
            LogicalType::Integer | LogicalType::BigInt | LogicalType::Boolean => {
                "INTEGER".to_string()
            }
            LogicalType::Real => "REAL".to_string(),
            LogicalType::Text | LogicalType::Varchar(_) | LogicalType::Date => "TEXT".to_string(),
            LogicalType::Timestamp => "TIMESTAMP".to_string(),
            LogicalType::Blob => "BLOB".to_string(),
            LogicalType::Raw(decl) => decl.clone(),
        }
    }

    fn now_expr(&self) -> &'static str {
        "datetime('now')"
    }

    fn default_expr(&self, default: &ColumnDefault) -> String {
        match default {
            ColumnDefault::Now => format!("({})", self.now_expr()),
            ColumnDefault::Expr(expr) => expr.clone(),
        }
    }

    fn column_definition(&self, col: &ColumnSpec, inline_pk: bool) -> String {
        let mut def = format!(
            "{} {}",
            self.quote_ident(&col.name),
            self.column_type(&col.logical_type)
        );

        if col.primary_key && inline_pk {
            def.push_str(" PRIMARY KEY");
            if col.auto_increment {
                def.push_str(" AUTOINCREMENT");
            }
        }

        // Only the rowid alias is implicitly NOT NULL; other SQLite PK columns accept NULL.
        if !col.nullable && !(col.primary_key && inline_pk && col.auto_increment) {
            def.push_str(" NOT NULL");
        }

        if col.unique && !col.primary_key {
            def.push_str(" UNIQUE");
        }

        if let Some(default) = &col.default {
            def.push_str(&format!(" DEFAULT {}", self.default_expr(default)));
        }

        def
    }

    fn create_table_sql(&self, table: &TableSpec) -> String {
        let mut parts = table_elements(self, table);
        parts.extend(foreign_key_elements(self, table));

        format!(
            "CREATE TABLE {} (\n{}\n)",
            self.quote_ident(&table.name),
            parts.join(",\n")
        )
    }

    /// SQLite refuses non-constant defaults in `ADD COLUMN`, so a
    /// [`ColumnDefault::Now`] default is left out; existing rows read NULL
    /// either way.
    fn add_column_sql(&self, table: &str, col: &ColumnSpec) -> String {
        let col = if col.default == Some(ColumnDefault::Now) {
            let mut col = col.clone();
            col.default = None;
            std::borrow::Cow::Owned(col)
        } else {
            std::borrow::Cow::Borrowed(col)
        };
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_ident(table),
            self.column_definition(&col, true)
        )
    }

    fn create_index_sql(&self, table: &str, index: &IndexSpec) -> String {
        let unique = if index.unique { "UNIQUE " } else { "" };
        format!(
            "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
            unique,
            self.quote_ident(&index.name),
            self.quote_ident(table),
            index_columns(self, index)
        )
    }

    fn inline_indexes(&self) -> bool {
        false
    }

    fn supports_create_index_if_not_exists(&self) -> bool {
        true
    }

    fn classify_error(&self, _code: Option<&str>, message: &str) -> ErrorClass {
        if message_contains(message, "duplicate column name")
            || message_contains(message, "already exists")
        {
            ErrorClass::AlreadyExists
        } else {
            ErrorClass::Other
        }
    }

    fn table_exists_sql(&self) -> &'static str {
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?"
    }

    fn list_tables_sql(&self) -> &'static str {
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
    }

    fn columns_sql(&self) -> &'static str {
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid"
    }

    fn indexes_sql(&self) -> &'static str {
        "SELECT name, \"unique\" FROM pragma_index_list(?)"
    }

    // Index names are schema-wide in SQLite, so the owning table must match too.
    fn index_exists_sql(&self) -> &'static str {
        "SELECT name FROM sqlite_master \
         WHERE type = 'index' AND lower(tbl_name) = lower(?) AND lower(name) = lower(?)"
    }
}
