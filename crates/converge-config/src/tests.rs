use super::*;

const CALENDAR: &str = r#"{
  "tables": [
    {
      "name": "calendar_events",
      "columns": [
        {"name": "id", "type": "integer", "primary_key": true, "auto_increment": true},
        {"name": "username", "type": "varchar(150)", "nullable": false},
        {"name": "title", "type": "varchar(255)", "nullable": false},
        {"name": "date", "type": "date", "nullable": false},
        {"name": "end_date", "type": "date"},
        {"name": "created_at", "type": "timestamp", "default": "CURRENT_TIMESTAMP"}
      ],
      "indexes": [
        {"columns": ["date"]},
        {"name": "idx_calendar_events_user_date", "columns": ["username", "date DESC"]}
      ]
    }
  ]
}"#;

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("converge-config-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn test_parse_spec_file() {
    let tables = parse_spec_file(CALENDAR).unwrap();
    assert_eq!(tables.len(), 1);

    let t = &tables[0];
    assert_eq!(t.name, "calendar_events");
    assert_eq!(t.columns.len(), 6);

    let id = t.column("id").unwrap();
    assert!(id.primary_key && id.auto_increment && !id.nullable);
    assert_eq!(id.logical_type, LogicalType::Integer);

    let username = t.column("username").unwrap();
    assert_eq!(username.logical_type, LogicalType::Varchar(150));
    assert!(!username.nullable);

    let end_date = t.column("end_date").unwrap();
    assert!(end_date.nullable);
    assert_eq!(end_date.default, None);

    let created_at = t.column("created_at").unwrap();
    assert_eq!(created_at.default, Some(ColumnDefault::Now));

    assert_eq!(t.indexes[0].name, "idx_calendar_events_date");
    assert_eq!(t.indexes[1].name, "idx_calendar_events_user_date");
    assert_eq!(t.indexes[1].columns[1], IndexColumn::desc("date"));
}

#[test]
fn test_unique_index_gets_uq_name() {
    let json = r#"{"tables": [{"name": "fcm_tokens",
        "columns": [{"name": "token", "type": "varchar(255)"}],
        "indexes": [{"columns": ["token"], "unique": true}]}]}"#;
    let tables = parse_spec_file(json).unwrap();
    assert_eq!(tables[0].indexes[0].name, "uq_fcm_tokens_token");
    assert!(tables[0].indexes[0].unique);
}

#[test]
fn test_foreign_keys() {
    let json = r#"{"tables": [{"name": "user_profiles",
        "columns": [{"name": "username", "type": "varchar(150)", "primary_key": true}],
        "foreign_keys": [{"columns": ["username"], "references_table": "users", "references_columns": ["username"]}]}]}"#;
    let tables = parse_spec_file(json).unwrap();
    assert_eq!(tables[0].foreign_keys[0].references_table, "users");
}

#[test]
fn test_invalid_table_is_reported() {
    let json = r#"{"tables": [{"name": "t",
        "columns": [{"name": "a", "type": "text"}],
        "indexes": [{"columns": ["b"]}]}]}"#;
    let err = parse_spec_file(json).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(SpecError::UnknownIndexColumn { .. })));
    assert_eq!(
        err.to_string(),
        "Invalid table definition: index 'idx_t_b' on table 't' references unknown column 'b'"
    );
}

#[test]
fn test_malformed_json() {
    let err = parse_spec_file("{\"tables\": [").unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_load_from_searches_parents() {
    let root = scratch_dir("parents");
    std::fs::create_dir_all(root.join(".config")).unwrap();
    std::fs::write(
        root.join(CONFIG_FILE),
        r#"{"database": {"backend": "mysql", "host": "db.internal", "port": 3307, "retry_delay": 1.5}}"#,
    )
    .unwrap();
    let nested = root.join("scripts/ops");
    std::fs::create_dir_all(&nested).unwrap();

    let (config, path) = load_from(&nested).unwrap();
    assert_eq!(path, root.join(CONFIG_FILE));
    assert_eq!(config.database.backend.as_deref(), Some("mysql"));
    assert_eq!(config.database.host.as_deref(), Some("db.internal"));
    assert_eq!(config.database.port, Some(3307));
    assert_eq!(config.database.retry_delay, Some(1.5));
    assert_eq!(config.database.password, None);

    std::fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_empty_config_uses_defaults() {
    let root = scratch_dir("empty");
    std::fs::create_dir_all(root.join(".config")).unwrap();
    std::fs::write(root.join(CONFIG_FILE), "{}").unwrap();

    let (config, _) = load_from(&root).unwrap();
    assert_eq!(config.database, DatabaseConfig::default());

    std::fs::remove_dir_all(&root).unwrap();
}

#[test]
fn test_load_spec_file_missing() {
    let err = load_spec_file(Path::new("/nonexistent/converge/spec.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Io(_)));
}

#[test]
fn test_shipped_spec_file_parses() {
    let tables = parse_spec_file(include_str!("../../../specs/community.json")).unwrap();
    let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    assert_eq!(names, ["community_members", "imagine_jobs"]);

    let members = &tables[0];
    assert_eq!(members.primary_key_columns().len(), 2);
    assert_eq!(members.indexes[0].name, "idx_community_members_username");
}
