//! Sykli CI pipeline for warden
//!
//! Run locally: sykli run
//! Or: cargo run --bin sykli --features sykli -- --emit | sykli run -

use sykli::{Pipeline, Template};

fn main() {
    let mut p = Pipeline::new();

    let src = p.dir(".");
    let cargo_registry = p.cache("cargo-registry");
    let cargo_git = p.cache("cargo-git");
    let target_cache = p.cache("target");

    let rust = Template::new()
        .container("rust:1.85")
        .mount_dir(&src, "/src")
        .mount_cache(&cargo_registry, "/usr/local/cargo/registry")
        .mount_cache(&cargo_git, "/usr/local/cargo/git")
        .mount_cache(&target_cache, "/src/target")
        .workdir("/src");

    let _ = p
        .task("test")
        .from(&rust)
        .run("cargo test")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock", "supervisor.example.toml"]);

    let _ = p
        .task("lint")
        .from(&rust)
        .run("cargo clippy --all-targets -- -D warnings")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"]);

    let _ = p
        .task("fmt")
        .from(&rust)
        .run("cargo fmt -- --check")
        .inputs(&["**/*.rs"]);

    let _ = p
        .task("build")
        .from(&rust)
        .run("cargo build --release --bin warden --bin warden-supervisor")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"])
        .output("api", "target/release/warden")
        .output("supervisor", "target/release/warden-supervisor")
        .after(&["test", "lint", "fmt"]);

    // supervisor against a real postgres: the API must only come up once
    // pg_isready passes
    let _ = p
        .task("lifecycle-test")
        .container("postgres:16")
        .mount(&src, "/src")
        .workdir("/src")
        .run(
            r#"#!/bin/bash
set -e
export WARDEN_SUPERVISOR_CONFIG=/src/supervisor.example.toml
PATH=/src/target/release:$PATH warden-supervisor &
SUPERVISOR_PID=$!

for i in $(seq 1 60); do
  if curl -fs http://127.0.0.1:8000/api/health/service_health; then
    kill $SUPERVISOR_PID
    exit 0
  fi
  sleep 2
done

curl -s http://127.0.0.1:9000/services
kill $SUPERVISOR_PID || true
exit 1
"#,
        )
        .input_from("build", "api", "/src/target/release/warden")
        .input_from("build", "supervisor", "/src/target/release/warden-supervisor")
        .timeout(300);

    p.emit();
}
