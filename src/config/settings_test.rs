//! Tests for environment settings

use super::*;
use std::collections::HashMap;
use tracing::Level;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

const REQUIRED: &[(&str, &str)] = &[
    ("POSTGRES_USER", "auth"),
    ("POSTGRES_PASSWORD", "s3cret"),
    ("POSTGRES_DB", "auth_db"),
];

#[test]
fn test_defaults_when_only_required_vars_set() {
    let settings = Settings::from_lookup(lookup(REQUIRED)).expect("settings should load");

    assert_eq!(settings.app.mode, Mode::Dev);
    assert!(settings.app.debug, "DEBUG defaults to true");
    assert!(!settings.app.cron_jobs_enable, "cron jobs default to off");
    assert_eq!(settings.app.port, DEFAULT_API_PORT);
    assert_eq!(settings.postgres.host, "localhost");
    assert_eq!(settings.postgres.port, DEFAULT_POSTGRES_PORT);
    assert_eq!(settings.postgres.schema, "public");
    assert_eq!(settings.log.level, LogLevel(Level::DEBUG), "LOG_LEVEL defaults to 10");
    assert!(!settings.log.json);
}

#[test]
fn test_explicit_values_override_defaults() {
    let mut pairs = REQUIRED.to_vec();
    pairs.extend_from_slice(&[
        ("MODE", "prod"),
        ("DEBUG", "false"),
        ("CRON_JOBS_ENABLE", "true"),
        ("POSTGRES_HOST", "db"),
        ("POSTGRES_SCHEMA", "auth"),
        ("LOG_LEVEL", "30"),
        ("PORT", "8080"),
    ]);

    let settings = Settings::from_lookup(lookup(&pairs)).expect("settings should load");

    assert_eq!(settings.app.mode, Mode::Prod);
    assert!(!settings.app.debug);
    assert!(settings.app.cron_jobs_enable);
    assert_eq!(settings.app.port, 8080);
    assert_eq!(settings.postgres.host, "db");
    assert_eq!(settings.postgres.schema, "auth");
    assert_eq!(settings.log.level, LogLevel(Level::WARN));
}

#[test]
fn test_missing_required_variable() {
    let result = Settings::from_lookup(lookup(&[("POSTGRES_USER", "auth")]));
    assert!(matches!(result, Err(ConfigError::Missing("POSTGRES_PASSWORD"))));
}

#[test]
fn test_blank_required_variable_counts_as_missing() {
    let mut pairs = REQUIRED.to_vec();
    pairs.push(("POSTGRES_DB", "  "));
    // later entry wins in the map
    let result = Settings::from_lookup(lookup(&pairs));
    assert!(matches!(result, Err(ConfigError::Missing("POSTGRES_DB"))));
}

#[test]
fn test_invalid_boolean_is_rejected() {
    let mut pairs = REQUIRED.to_vec();
    pairs.push(("DEBUG", "maybe"));
    let result = Settings::from_lookup(lookup(&pairs));
    assert!(matches!(result, Err(ConfigError::Invalid { key: "DEBUG", .. })));
}

#[test]
fn test_unsafe_schema_name_is_rejected() {
    let mut pairs = REQUIRED.to_vec();
    pairs.push(("POSTGRES_SCHEMA", "auth\"; DROP TABLE x; --"));
    let result = Settings::from_lookup(lookup(&pairs));
    assert!(matches!(
        result,
        Err(ConfigError::Invalid {
            key: "POSTGRES_SCHEMA",
            ..
        })
    ));
}

#[test]
fn test_log_level_accepts_numbers_and_names() {
    assert_eq!("10".parse::<LogLevel>().ok(), Some(LogLevel(Level::DEBUG)));
    assert_eq!("20".parse::<LogLevel>().ok(), Some(LogLevel(Level::INFO)));
    assert_eq!("warning".parse::<LogLevel>().ok(), Some(LogLevel(Level::WARN)));
    assert_eq!("50".parse::<LogLevel>().ok(), Some(LogLevel(Level::ERROR)));
    assert!("loud".parse::<LogLevel>().is_err());
}

#[test]
fn test_password_is_redacted_in_debug_output() {
    let settings = Settings::from_lookup(lookup(REQUIRED)).expect("settings should load");
    let rendered = format!("{:?}", settings);
    assert!(!rendered.contains("s3cret"), "password leaked: {}", rendered);
}

#[test]
fn test_bind_addr() {
    let settings = Settings::from_lookup(lookup(REQUIRED)).expect("settings should load");
    let addr = settings.app.bind_addr().expect("default bind address is valid");
    assert_eq!(addr.port(), 8000);
}

#[test]
fn test_log_settings_load_without_database_variables() {
    let log = LogSettings::from_lookup(lookup(&[("LOG_LEVEL", "30"), ("LOG_JSON", "true")]))
        .expect("log settings should load");

    assert_eq!(log.level, LogLevel(Level::WARN));
    assert!(log.json);
}
