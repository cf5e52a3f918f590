//! Built-in table definitions for the C-Point application.
//!
//! Each of these tables was historically created and extended by hand-run
//! scripts. Naming one of them on the command line (`converge reconcile
//! calendar_events`) converges a database to the current definition.
//!
//! Foreign keys are left out: the referenced tables (`users`, `posts`,
//! `communities`) are owned by the application's own bootstrap and may not
//! exist yet on a fresh MySQL database.

use converge_schema::{ColumnSpec, IndexColumn, IndexSpec, LogicalType, SpecError, TableSpec};

/// Name and one-line description of every built-in table.
pub const TABLES: &[(&str, &str)] = &[
    ("calendar_events", "community calendar entries"),
    ("fcm_tokens", "Firebase Cloud Messaging device tokens"),
    ("push_tokens", "APNs/FCM push tokens, one per user and platform"),
    ("notifications", "in-app notifications"),
    ("user_profiles", "public profile details"),
    ("useful_links", "links shared in a community"),
];

/// Look up a built-in table by name.
pub fn find(name: &str) -> Result<Option<TableSpec>, SpecError> {
    let spec = match name {
        "calendar_events" => calendar_events()?,
        "fcm_tokens" => fcm_tokens()?,
        "push_tokens" => push_tokens()?,
        "notifications" => notifications()?,
        "user_profiles" => user_profiles()?,
        "useful_links" => useful_links()?,
        _ => return Ok(None),
    };
    Ok(Some(spec))
}

/// Every built-in table, in [`TABLES`] order.
pub fn all() -> Result<Vec<TableSpec>, SpecError> {
    TABLES
        .iter()
        .filter_map(|(name, _)| find(name).transpose())
        .collect()
}

fn id() -> ColumnSpec {
    ColumnSpec::new("id", LogicalType::Integer)
        .primary_key()
        .auto_increment()
}

fn username() -> ColumnSpec {
    ColumnSpec::new("username", LogicalType::Varchar(150))
}

pub fn calendar_events() -> Result<TableSpec, SpecError> {
    TableSpec::builder("calendar_events")
        .column(id())
        .column(username().not_null())
        .column(ColumnSpec::new("title", LogicalType::Varchar(255)).not_null())
        .column(ColumnSpec::new("date", LogicalType::Date).not_null())
        .column(ColumnSpec::new("time", LogicalType::Varchar(20)))
        .column(ColumnSpec::new("description", LogicalType::Text))
        .column(ColumnSpec::new("created_at", LogicalType::Timestamp).default_now())
        .column(ColumnSpec::new("end_date", LogicalType::Date))
        .column(ColumnSpec::new("start_time", LogicalType::Varchar(20)))
        .column(ColumnSpec::new("end_time", LogicalType::Varchar(20)))
        .index(IndexSpec::on("calendar_events", ["date"]))
        .build()
}

pub fn fcm_tokens() -> Result<TableSpec, SpecError> {
    TableSpec::builder("fcm_tokens")
        .column(id())
        .column(
            ColumnSpec::new("token", LogicalType::Varchar(255))
                .not_null()
                .unique(),
        )
        .column(ColumnSpec::new("username", LogicalType::Varchar(100)))
        .column(ColumnSpec::new("platform", LogicalType::Varchar(20)).default_expr("'ios'"))
        .column(ColumnSpec::new("device_name", LogicalType::Varchar(255)))
        .column(ColumnSpec::new("created_at", LogicalType::Timestamp).default_now())
        .column(ColumnSpec::new("last_seen", LogicalType::Timestamp).default_now())
        .column(ColumnSpec::new("is_active", LogicalType::Boolean).default_expr("1"))
        .index(IndexSpec::new("idx_fcm_username", ["username"]))
        .index(IndexSpec::new("idx_fcm_active", ["is_active"]))
        .build()
}

pub fn push_tokens() -> Result<TableSpec, SpecError> {
    TableSpec::builder("push_tokens")
        .column(id())
        .column(username().not_null())
        .column(ColumnSpec::new("token", LogicalType::Text).not_null())
        .column(ColumnSpec::new("platform", LogicalType::Varchar(20)).not_null())
        .column(ColumnSpec::new("created_at", LogicalType::Timestamp).default_now())
        .column(ColumnSpec::new("updated_at", LogicalType::Timestamp).default_now())
        .column(ColumnSpec::new("is_active", LogicalType::Boolean).default_expr("1"))
        .index(IndexSpec::on("push_tokens", ["username"]))
        .index(IndexSpec::on("push_tokens", ["platform"]))
        .index(IndexSpec::on("push_tokens", ["is_active"]))
        .index(IndexSpec::new("unique_user_platform", ["username", "platform"]).unique())
        .build()
}

pub fn notifications() -> Result<TableSpec, SpecError> {
    TableSpec::builder("notifications")
        .column(id())
        .column(ColumnSpec::new("user_id", LogicalType::Varchar(150)).not_null())
        .column(ColumnSpec::new("from_user", LogicalType::Varchar(150)).not_null())
        .column(ColumnSpec::new("type", LogicalType::Varchar(50)).not_null())
        .column(ColumnSpec::new("post_id", LogicalType::Integer))
        .column(ColumnSpec::new("community_id", LogicalType::Integer))
        .column(ColumnSpec::new("message", LogicalType::Text))
        .column(ColumnSpec::new("is_read", LogicalType::Boolean).default_expr("0"))
        .column(ColumnSpec::new("created_at", LogicalType::Timestamp).default_now())
        .index(IndexSpec {
            name: "idx_notifications_user".to_string(),
            columns: vec![
                IndexColumn::new("user_id"),
                IndexColumn::new("is_read"),
                IndexColumn::desc("created_at"),
            ],
            unique: false,
        })
        .build()
}

pub fn user_profiles() -> Result<TableSpec, SpecError> {
    let text = |name: &str| ColumnSpec::new(name, LogicalType::Text);

    TableSpec::builder("user_profiles")
        .column(username().primary_key())
        .column(ColumnSpec::new("display_name", LogicalType::Varchar(150)))
        .column(text("bio"))
        .column(ColumnSpec::new("location", LogicalType::Varchar(150)))
        .column(text("website"))
        .column(text("instagram"))
        .column(text("twitter"))
        .column(text("profile_picture"))
        .column(text("cover_photo"))
        .column(ColumnSpec::new("is_public", LogicalType::Boolean).default_expr("1"))
        .column(ColumnSpec::new("created_at", LogicalType::Timestamp).default_now())
        .column(ColumnSpec::new("updated_at", LogicalType::Timestamp).default_now())
        .build()
}

pub fn useful_links() -> Result<TableSpec, SpecError> {
    TableSpec::builder("useful_links")
        .column(id())
        .column(ColumnSpec::new("community_id", LogicalType::Integer))
        .column(username().not_null())
        .column(ColumnSpec::new("url", LogicalType::Text).not_null())
        .column(ColumnSpec::new("description", LogicalType::Text).not_null())
        .column(ColumnSpec::new("created_at", LogicalType::Timestamp).default_now())
        .index(IndexSpec::on("useful_links", ["community_id"]))
        .build()
}

#[cfg(test)]
mod tests {
    use converge::Dialect;

    use super::*;

    #[test]
    fn every_catalog_table_builds() {
        let specs = all().unwrap();
        let names: Vec<&str> = specs.iter().map(|s| s.name.as_str()).collect();
        let expected: Vec<&str> = TABLES.iter().map(|(name, _)| *name).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn unknown_table_is_none() {
        assert!(find("posts").unwrap().is_none());
    }

    #[test]
    fn calendar_events_includes_later_columns() {
        let spec = calendar_events().unwrap();
        for column in ["end_date", "start_time", "end_time"] {
            assert!(spec.column(column).is_some(), "missing {column}");
        }
        assert_eq!(spec.indexes[0].name, "idx_calendar_events_date");
    }

    #[test]
    fn notifications_index_sorts_newest_first() {
        let spec = notifications().unwrap();
        insta::assert_snapshot!(
            converge::SqliteDialect.create_index_sql("notifications", &spec.indexes[0]),
            @r#"CREATE INDEX IF NOT EXISTS "idx_notifications_user" ON "notifications" ("user_id", "is_read", "created_at" DESC)"#
        );
    }
}
