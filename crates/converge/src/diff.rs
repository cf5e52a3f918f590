//! Additive diffing between a table spec and the live table.
//!
//! The diff only ever contains additions: a missing table, missing columns
//! (in declared order) and missing indexes. Columns and indexes present in
//! the database but absent from the spec are ignored, and an existing
//! column whose type or nullability differs from the spec is left alone.

use converge_schema::{ColumnSpec, IndexSpec, ObservedSchema, TableSpec};
use converge_sql::Dialect;

/// The additions needed to bring one table up to its spec.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDiff {
    /// Table name.
    pub table: String,
    /// Changes, in the order they must be applied.
    pub changes: Vec<Change>,
    /// Spec'd columns the table already has.
    pub present_columns: Vec<String>,
    /// Spec'd indexes the table already has.
    pub present_indexes: Vec<String>,
}

/// A single additive schema change.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Create the table with every spec'd column (and inline indexes, where the dialect has them).
    CreateTable(TableSpec),
    /// Add a missing column.
    AddColumn(ColumnSpec),
    /// Add a missing index.
    AddIndex(IndexSpec),
}

impl TableDiff {
    /// Compute the changes needed to converge `observed` on `spec`.
    ///
    /// `observed` is `None` when the table does not exist. In that case the
    /// diff is a `CreateTable`, followed by one `AddIndex` per index when the
    /// dialect cannot declare indexes inside `CREATE TABLE`.
    pub fn compute(
        spec: &TableSpec,
        observed: Option<&ObservedSchema>,
        dialect: &dyn Dialect,
    ) -> Self {
        let mut diff = TableDiff {
            table: spec.name.clone(),
            changes: Vec::new(),
            present_columns: Vec::new(),
            present_indexes: Vec::new(),
        };

        let Some(observed) = observed else {
            diff.changes.push(Change::CreateTable(spec.clone()));
            if !dialect.inline_indexes() {
                diff.changes
                    .extend(spec.indexes.iter().cloned().map(Change::AddIndex));
            }
            return diff;
        };

        for col in &spec.columns {
            if observed.has_column(&col.name) {
                diff.present_columns.push(col.name.clone());
            } else {
                diff.changes.push(Change::AddColumn(col.clone()));
            }
        }

        for idx in &spec.indexes {
            if observed.has_index(&idx.name) {
                diff.present_indexes.push(idx.name.clone());
            } else {
                diff.changes.push(Change::AddIndex(idx.clone()));
            }
        }

        diff
    }

    /// True if nothing needs to change.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Whether the diff creates the table.
    pub fn creates_table(&self) -> bool {
        matches!(self.changes.first(), Some(Change::CreateTable(_)))
    }

    /// The statements that apply this diff, one per change.
    pub fn statements(&self, dialect: &dyn Dialect) -> Vec<String> {
        self.changes
            .iter()
            .map(|change| change.to_sql(dialect, &self.table))
            .collect()
    }

    /// Render the diff as a SQL script.
    pub fn to_sql(&self, dialect: &dyn Dialect) -> String {
        let mut sql = format!("-- Table: {}\n", self.table);
        for statement in self.statements(dialect) {
            sql.push_str(&statement);
            sql.push_str(";\n");
        }
        sql
    }
}

impl Change {
    /// Generate the statement for this change.
    pub fn to_sql(&self, dialect: &dyn Dialect, table_name: &str) -> String {
        match self {
            Change::CreateTable(spec) => dialect.create_table_sql(spec),
            Change::AddColumn(col) => dialect.add_column_sql(table_name, col),
            Change::AddIndex(idx) => dialect.create_index_sql(table_name, idx),
        }
    }
}

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Change::CreateTable(t) => write!(f, "+ table {}", t.name),
            Change::AddColumn(col) => {
                let nullable = if col.nullable { " (nullable)" } else { "" };
                write!(f, "+ {}: {}{}", col.name, col.logical_type, nullable)
            }
            Change::AddIndex(idx) => {
                let unique = if idx.unique { "UNIQUE " } else { "" };
                let cols: Vec<String> = idx
                    .columns
                    .iter()
                    .map(|c| format!("{}{}", c.name, c.order.to_sql()))
                    .collect();
                write!(f, "+ {}INDEX {} ({})", unique, idx.name, cols.join(", "))
            }
        }
    }
}

impl std::fmt::Display for TableDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            writeln!(f, "{}: up to date", self.table)?;
        } else {
            writeln!(f, "{}:", self.table)?;
            for change in &self.changes {
                writeln!(f, "    {}", change)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use converge_schema::{LogicalType, ObservedColumn, ObservedIndex};
    use converge_sql::{MySqlDialect, SqliteDialect};

    fn calendar_events() -> TableSpec {
        TableSpec::builder("calendar_events")
            .column(
                ColumnSpec::new("id", LogicalType::Integer)
                    .primary_key()
                    .auto_increment(),
            )
            .column(ColumnSpec::new("title", LogicalType::Varchar(255)).not_null())
            .column(ColumnSpec::new("date", LogicalType::Date).not_null())
            .column(ColumnSpec::new("end_date", LogicalType::Date))
            .index(IndexSpec::on("calendar_events", ["date"]))
            .build()
            .unwrap()
    }

    fn observed(columns: &[&str], indexes: &[&str]) -> ObservedSchema {
        let mut observed = ObservedSchema::new("calendar_events");
        for name in columns {
            observed.push_column(ObservedColumn {
                name: name.to_string(),
                declared_type: "TEXT".to_string(),
                nullable: true,
                default: None,
                primary_key: false,
            });
        }
        for name in indexes {
            observed.push_index(ObservedIndex {
                name: name.to_string(),
                unique: false,
            });
        }
        observed
    }

    #[test]
    fn test_absent_table_sqlite_creates_then_indexes() {
        let diff = TableDiff::compute(&calendar_events(), None, &SqliteDialect);
        assert!(diff.creates_table());
        assert_eq!(diff.changes.len(), 2);
        assert!(matches!(&diff.changes[1], Change::AddIndex(idx) if idx.name == "idx_calendar_events_date"));
    }

    #[test]
    fn test_absent_table_mysql_inlines_indexes() {
        let diff = TableDiff::compute(&calendar_events(), None, &MySqlDialect);
        assert_eq!(diff.changes.len(), 1);
        assert!(diff.creates_table());
    }

    #[test]
    fn test_missing_column_in_declared_order() {
        let spec = calendar_events();
        let obs = observed(&["id", "date"], &["idx_calendar_events_date"]);
        let diff = TableDiff::compute(&spec, Some(&obs), &SqliteDialect);

        let added: Vec<&str> = diff
            .changes
            .iter()
            .filter_map(|c| match c {
                Change::AddColumn(col) => Some(col.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(added, vec!["title", "end_date"]);
        assert_eq!(diff.present_columns, vec!["id", "date"]);
        assert_eq!(diff.present_indexes, vec!["idx_calendar_events_date"]);
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let spec = calendar_events();
        let obs = observed(
            &["ID", "Title", "date", "end_date", "legacy_flag"],
            &["idx_calendar_events_date", "idx_legacy"],
        );
        let diff = TableDiff::compute(&spec, Some(&obs), &MySqlDialect);
        assert!(diff.is_empty());
        assert_eq!(diff.to_string(), "calendar_events: up to date\n");
    }

    #[test]
    fn test_display_and_sql() {
        let spec = calendar_events();
        let obs = observed(&["id", "title", "date"], &[]);
        let diff = TableDiff::compute(&spec, Some(&obs), &SqliteDialect);

        insta::assert_snapshot!(diff.to_string(), @r"
        calendar_events:
            + end_date: date (nullable)
            + INDEX idx_calendar_events_date (date)
        ");
        insta::assert_snapshot!(diff.to_sql(&SqliteDialect), @r#"
        -- Table: calendar_events
        ALTER TABLE "calendar_events" ADD COLUMN "end_date" TEXT;
        CREATE INDEX IF NOT EXISTS "idx_calendar_events_date" ON "calendar_events" ("date");
        "#);
        insta::assert_snapshot!(diff.to_sql(&MySqlDialect), @r"
        -- Table: calendar_events
        ALTER TABLE `calendar_events` ADD COLUMN `end_date` DATE;
        CREATE INDEX `idx_calendar_events_date` ON `calendar_events` (`date`);
        ");
    }
}
