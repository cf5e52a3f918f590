//! Configuration file handling for the converge CLI.
//!
//! Looks for `.config/converge.json` in the current directory or any parent
//! directory. A missing file is not an error; its settings are simply absent.

use std::str::FromStr;
use std::time::Duration;

use converge::{DialectKind, Settings};
use converge_config::{ConfigError, DatabaseConfig};

/// Connection settings from the configuration file, if there is one.
pub fn file_settings() -> Result<Settings, ConfigError> {
    match converge_config::load() {
        Ok((config, path)) => {
            tracing::debug!(path = %path.display(), "loaded configuration file");
            settings_from(&config.database)
        }
        Err(ConfigError::NotFound) => Ok(Settings::default()),
        Err(e) => Err(e),
    }
}

/// Convert the file's `database` section into [`Settings`].
pub fn settings_from(db: &DatabaseConfig) -> Result<Settings, ConfigError> {
    let backend = db
        .backend
        .as_deref()
        .map(DialectKind::from_str)
        .transpose()
        .map_err(|e| ConfigError::Parse(format!("database.backend: {}", e)))?;

    Ok(Settings {
        url: db.url.clone(),
        backend,
        sqlite_path: db.sqlite_path.clone(),
        host: db.host.clone(),
        port: db.port,
        user: db.user.clone(),
        password: db.password.clone(),
        database: db.name.clone(),
        connect_timeout: seconds("database.connect_timeout", db.connect_timeout)?,
        max_retries: db.max_retries,
        retry_delay: seconds("database.retry_delay", db.retry_delay)?,
        lock_timeout: seconds("database.lock_timeout", db.lock_timeout)?,
    })
}

fn seconds(field: &str, value: Option<f64>) -> Result<Option<Duration>, ConfigError> {
    value
        .map(|secs| {
            Duration::try_from_secs_f64(secs)
                .map_err(|e| ConfigError::Parse(format!("{}: {}", field, e)))
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_section_gives_empty_settings() {
        let settings = settings_from(&DatabaseConfig::default()).unwrap();
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn fields_map_across() {
        let db = DatabaseConfig {
            backend: Some("mysql".to_string()),
            host: Some("db.internal".to_string()),
            name: Some("cpoint".to_string()),
            connect_timeout: Some(2.5),
            lock_timeout: Some(30.0),
            ..Default::default()
        };
        let settings = settings_from(&db).unwrap();
        assert_eq!(settings.backend, Some(DialectKind::MySql));
        assert_eq!(settings.host.as_deref(), Some("db.internal"));
        assert_eq!(settings.database.as_deref(), Some("cpoint"));
        assert_eq!(settings.connect_timeout, Some(Duration::from_millis(2500)));
        assert_eq!(settings.lock_timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let db = DatabaseConfig {
            backend: Some("postgres".to_string()),
            ..Default::default()
        };
        let err = settings_from(&db).unwrap_err();
        assert!(err.to_string().contains("database.backend"), "{err}");
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let db = DatabaseConfig {
            retry_delay: Some(-1.0),
            ..Default::default()
        };
        assert!(settings_from(&db).is_err());
    }
}
