use converge_schema::{ColumnDefault, ColumnSpec, IndexSpec, LogicalType, TableSpec};

use crate::{
    BacktickIdent, Dialect, DialectKind, ErrorClass, foreign_key_elements, index_columns,
    message_contains, table_elements,
};

/// Table options appended to every `CREATE TABLE`.
const TABLE_OPTIONS: &str = "ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_ci";

/// MySQL / MariaDB: explicit lengths, indexes declared inline at creation.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::MySql
    }

    fn name(&self) -> &'static str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> String {
        format!("{}", BacktickIdent(name))
    }

    fn column_type(&self, ty: &LogicalType) -> String {
        match ty {
            LogicalType::Integer => "INT".to_string(),
            LogicalType::BigInt => "BIGINT".to_string(),
            LogicalType::Boolean => "TINYINT(1)".to_string(),
            LogicalType::Real => "DOUBLE".to_string(),
            LogicalType::Text => "TEXT".to_string(),
            LogicalType::Varchar(len) => format!("VARCHAR({})", len),
            LogicalType::Timestamp => "TIMESTAMP".to_string(),
            LogicalType::Date => "DATE".to_string(),
            LogicalType::Blob => "BLOB".to_string(),
            LogicalType::Raw(decl) => decl.clone(),
        }
    }

    fn now_expr(&self) -> &'static str {
        "CURRENT_TIMESTAMP"
    }

    fn default_expr(&self, default: &ColumnDefault) -> String {
        match default {
            ColumnDefault::Now => self.now_expr().to_string(),
            ColumnDefault::Expr(expr) => expr.clone(),
        }
    }

    fn column_definition(&self, col: &ColumnSpec, inline_pk: bool) -> String {
        let mut def = format!(
            "{} {}",
            self.quote_ident(&col.name),
            self.column_type(&col.logical_type)
        );

        if !col.nullable {
            def.push_str(" NOT NULL");
        } else if col.logical_type == LogicalType::Timestamp {
            // TIMESTAMP columns are NOT NULL unless told otherwise on older servers.
            def.push_str(" NULL");
        }

        if let Some(default) = &col.default {
            def.push_str(&format!(" DEFAULT {}", self.default_expr(default)));
        }

        if col.auto_increment {
            def.push_str(" AUTO_INCREMENT");
        }

        if col.unique && !col.primary_key {
            def.push_str(" UNIQUE");
        }

        if col.primary_key && inline_pk {
            def.push_str(" PRIMARY KEY");
        }

        def
    }

    fn create_table_sql(&self, table: &TableSpec) -> String {
        let mut parts = table_elements(self, table);

        for index in &table.indexes {
            let kind = if index.unique { "UNIQUE INDEX" } else { "INDEX" };
            parts.push(format!(
                "    {} {} ({})",
                kind,
                self.quote_ident(&index.name),
                index_columns(self, index)
            ));
        }

        parts.extend(foreign_key_elements(self, table));

        format!(
            "CREATE TABLE {} (\n{}\n) {}",
            self.quote_ident(&table.name),
            parts.join(",\n"),
            TABLE_OPTIONS
        )
    }

    fn add_column_sql(&self, table: &str, col: &ColumnSpec) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {}",
            self.quote_ident(table),
            self.column_definition(col, true)
        )
    }

    fn create_index_sql(&self, table: &str, index: &IndexSpec) -> String {
        let unique = if index.unique { "UNIQUE " } else { "" };
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            unique,
            self.quote_ident(&index.name),
            self.quote_ident(table),
            index_columns(self, index)
        )
    }

    fn inline_indexes(&self) -> bool {
        true
    }

    fn supports_create_index_if_not_exists(&self) -> bool {
        false
    }

    /// 42S21 is "duplicate column name" (1060) and 42S01 "table already
    /// exists" (1050). "Duplicate key name" (1061) only carries the generic
    /// 42000, so it is matched on the message.
    fn classify_error(&self, code: Option<&str>, message: &str) -> ErrorClass {
        if matches!(code, Some("42S21") | Some("42S01"))
            || message_contains(message, "duplicate column name")
            || message_contains(message, "duplicate key name")
            || message_contains(message, "already exists")
        {
            ErrorClass::AlreadyExists
        } else {
            ErrorClass::Other
        }
    }

    fn table_exists_sql(&self) -> &'static str {
        "SELECT CAST(table_name AS CHAR) FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_name = ?"
    }

    fn list_tables_sql(&self) -> &'static str {
        "SELECT CAST(table_name AS CHAR) AS name FROM information_schema.tables \
         WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE' ORDER BY name"
    }

    fn columns_sql(&self) -> &'static str {
        "SELECT CAST(column_name AS CHAR), CAST(column_type AS CHAR), \
         CAST(is_nullable AS CHAR), CAST(column_default AS CHAR), CAST(column_key AS CHAR) \
         FROM information_schema.columns \
         WHERE table_schema = DATABASE() AND table_name = ? ORDER BY ordinal_position"
    }

    fn indexes_sql(&self) -> &'static str {
        "SELECT DISTINCT CAST(index_name AS CHAR), CAST(non_unique AS SIGNED) \
         FROM information_schema.statistics \
         WHERE table_schema = DATABASE() AND table_name = ?"
    }

    fn index_exists_sql(&self) -> &'static str {
        "SELECT CAST(index_name AS CHAR) FROM information_schema.statistics \
         WHERE table_schema = DATABASE() AND table_name = ? AND index_name = ? LIMIT 1"
    }
}
