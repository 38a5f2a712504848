//! Tests for topology parsing and validation

use super::*;
use crate::lifecycle::RestartPolicy;
use std::io::Write;
use std::time::Duration;

const COMPOSE_LIKE: &str = r#"
[[services]]
name = "api"
command = ["warden"]
depends_on = ["db"]

[services.env]
POSTGRES_HOST = "127.0.0.1"

[services.healthcheck]
test = { http = "http://127.0.0.1:8000/api/health/service_health" }
interval = "10s"
timeout = "5s"
retries = 3
start_period = "40s"

[[services]]
name = "db"
command = ["postgres", "-D", "/var/lib/postgresql/data"]

[services.healthcheck]
test = { exec = ["pg_isready", "-U", "auth"] }
interval = "5s"
timeout = "5s"
retries = 5
"#;

#[test]
fn test_parse_compose_like_topology() {
    let topology = Topology::parse(COMPOSE_LIKE).expect("topology should parse");

    assert_eq!(topology.supervisor.control_port, DEFAULT_CONTROL_PORT);
    assert_eq!(topology.services.len(), 2);

    let api = &topology.services[0];
    assert_eq!(api.restart, RestartPolicy::UnlessStopped, "default policy");
    assert_eq!(api.env.get("POSTGRES_HOST").map(String::as_str), Some("127.0.0.1"));

    let check = api.healthcheck.as_ref().expect("api has a healthcheck");
    assert_eq!(
        check.test,
        ProbeTarget::Http("http://127.0.0.1:8000/api/health/service_health".to_string())
    );
    let policy = check.policy();
    assert_eq!(policy.interval, Duration::from_secs(10));
    assert_eq!(policy.retries, 3);
    assert_eq!(policy.start_period, Duration::from_secs(40));

    let db_check = topology.services[1].healthcheck.as_ref().expect("db check");
    assert_eq!(db_check.start_period, Duration::ZERO);
}

#[test]
fn test_startup_order_puts_dependencies_first() {
    let topology = Topology::parse(COMPOSE_LIKE).expect("topology should parse");
    let order: Vec<&str> = topology
        .startup_order()
        .expect("acyclic")
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(order, vec!["db", "api"]);
}

#[test]
fn test_unknown_dependency_is_rejected() {
    let raw = r#"
[[services]]
name = "api"
command = ["warden"]
depends_on = ["cache"]
"#;
    let err = Topology::parse(raw).expect_err("unknown dependency");
    assert!(err.to_string().contains("unknown service 'cache'"), "{}", err);
}

#[test]
fn test_dependency_cycle_is_rejected() {
    let raw = r#"
[[services]]
name = "a"
command = ["a"]
depends_on = ["b"]

[[services]]
name = "b"
command = ["b"]
depends_on = ["a"]
"#;
    let err = Topology::parse(raw).expect_err("cycle");
    assert!(err.to_string().contains("dependency cycle"), "{}", err);
}

#[test]
fn test_duplicate_names_are_rejected() {
    let raw = r#"
[[services]]
name = "db"
command = ["postgres"]

[[services]]
name = "db"
command = ["postgres"]
"#;
    assert!(matches!(Topology::parse(raw), Err(ConfigError::Topology(_))));
}

#[test]
fn test_zero_retries_is_rejected() {
    let raw = r#"
[[services]]
name = "db"
command = ["postgres"]

[services.healthcheck]
test = { tcp = "127.0.0.1:5432" }
retries = 0
"#;
    let err = Topology::parse(raw).expect_err("zero retries");
    assert!(err.to_string().contains("retries"), "{}", err);
}

#[test]
fn test_zero_timeout_is_rejected() {
    let raw = r#"
[[services]]
name = "db"
command = ["postgres"]

[services.healthcheck]
test = { tcp = "127.0.0.1:5432" }
timeout = "0s"
"#;
    let err = Topology::parse(raw).expect_err("zero timeout");
    assert!(err.to_string().contains("timeout"), "{}", err);
}

#[test]
fn test_bad_duration_is_a_parse_error() {
    let raw = r#"
[[services]]
name = "db"
command = ["postgres"]

[services.healthcheck]
test = { tcp = "127.0.0.1:5432" }
interval = "often"
"#;
    assert!(matches!(Topology::parse(raw), Err(ConfigError::Parse(_))));
}

#[test]
fn test_empty_command_is_rejected() {
    let raw = r#"
[[services]]
name = "db"
command = []
"#;
    assert!(matches!(Topology::parse(raw), Err(ConfigError::Topology(_))));
}

#[test]
fn test_load_from_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(COMPOSE_LIKE.as_bytes()).expect("write topology");

    let topology = Topology::load(file.path()).expect("topology should load");
    assert_eq!(topology.services.len(), 2);
}

#[test]
fn test_load_missing_file() {
    let result = Topology::load(std::path::Path::new("/nonexistent/supervisor.toml"));
    assert!(matches!(result, Err(ConfigError::Io { .. })));
}

#[test]
fn test_shipped_example_topology_is_valid() {
    let topology = Topology::parse(include_str!("../../supervisor.example.toml"))
        .expect("example topology should parse");

    let order: Vec<&str> = topology
        .startup_order()
        .expect("acyclic")
        .iter()
        .map(|s| s.name.as_str())
        .collect();
    assert_eq!(order, vec!["db", "api"]);
}
