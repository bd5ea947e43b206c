//! Integration tests for configuration loading and validation
//!
//! Tests that modify environment variables hold `ENV_MUTEX` so they do not
//! interfere with each other.

use dashclone::config::load_config;
use secrecy::ExposeSecret;
use std::io::Write;
use std::sync::{Mutex, MutexGuard};
use tempfile::{NamedTempFile, TempDir};

// Mutex to serialize tests that modify environment variables
static ENV_MUTEX: Mutex<()> = Mutex::new(());

const OVERRIDE_VARS: &[&str] = &[
    "SOURCE_INSTANCE_URL",
    "SOURCE_INSTANCE_USER",
    "SOURCE_INSTANCE_PASSWORD",
    "DEST_INSTANCE_URL",
    "DEST_INSTANCE_USER",
    "DEST_INSTANCE_PASSWORD",
    "CONFIG_FOLDER",
    "DASHCLONE_APPLICATION_LOG_LEVEL",
    "DASHCLONE_APPLICATION_DRY_RUN",
    "DASHCLONE_CACHE_FOLDER",
    "DASHCLONE_COPY_PARALLEL_ROOTS",
    "DASHCLONE_SOURCE_MAX_RETRIES",
    "TEST_SOURCE_PASSWORD",
];

fn clear_vars() {
    for var in OVERRIDE_VARS {
        std::env::remove_var(var);
    }
}

/// Locks the environment and clears every variable the loader reads
fn clean_env() -> MutexGuard<'static, ()> {
    let guard = ENV_MUTEX.lock().unwrap_or_else(|p| p.into_inner());
    clear_vars();
    guard
}

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const COMPLETE_CONFIG: &str = r#"
[application]
log_level = "debug"
dry_run = true

[source]
base_url = "https://staging.example.com/"
username = "copy@example.com"
password = "source-pass"
timeout_seconds = 30

[source.retry]
max_retries = 5
initial_delay_ms = 200
max_delay_ms = 2000

[destination]
base_url = "https://bi.example.com"
username = "copy@example.com"
password = "destination-pass"
tls_verify = false

[cache]
folder = "/tmp/dashclone-cache"
checkpoint_each_entry = false

[copy]
parallel_roots = 4
warn_on_existing = false

[[copy.databases]]
source_id = 2
destination_id = 5

[[copy.databases]]
source_id = 3
destination_id = 6
match_fields = false

[logging]
local_enabled = false
local_path = "/tmp/dashclone-logs"
local_rotation = "hourly"
"#;

#[test]
fn test_load_complete_config() {
    let _env = clean_env();
    let file = write_config(COMPLETE_CONFIG);

    let config = load_config(file.path()).expect("Failed to load config");

    assert_eq!(config.application.log_level, "debug");
    assert!(config.application.dry_run);

    assert_eq!(config.source.base_url, "https://staging.example.com/");
    assert_eq!(config.source.username, "copy@example.com");
    assert_eq!(
        config.source.password.as_ref().unwrap().expose_secret(),
        "source-pass"
    );
    assert_eq!(config.source.timeout_seconds, 30);
    assert_eq!(config.source.retry.max_retries, 5);
    assert!(config.source.tls_verify);
    assert!(!config.destination.tls_verify);

    assert_eq!(config.cache.folder, "/tmp/dashclone-cache");
    assert!(!config.cache.checkpoint_each_entry);

    assert_eq!(config.copy.parallel_roots, 4);
    assert!(!config.copy.warn_on_existing);
    assert_eq!(config.copy.databases.len(), 2);
    assert!(config.copy.databases[0].match_fields);
    assert!(!config.copy.databases[1].match_fields);

    assert!(!config.logging.local_enabled);
    assert_eq!(config.logging.local_rotation, "hourly");
}

#[test]
fn test_config_from_environment_only() {
    let _env = clean_env();
    let folder = TempDir::new().unwrap();
    let missing = folder.path().join("dashclone.toml");

    std::env::set_var("SOURCE_INSTANCE_URL", "https://staging.example.com");
    std::env::set_var("SOURCE_INSTANCE_USER", "copy@example.com");
    std::env::set_var("SOURCE_INSTANCE_PASSWORD", "source-pass");
    std::env::set_var("DEST_INSTANCE_URL", "https://bi.example.com");
    std::env::set_var("DEST_INSTANCE_USER", "copy@example.com");
    std::env::set_var("DEST_INSTANCE_PASSWORD", "destination-pass");
    std::env::set_var("CONFIG_FOLDER", "/tmp/from-env");

    let config = load_config(&missing);
    clear_vars();

    let config = config.expect("Environment-only config should load");
    assert_eq!(config.destination.base_url, "https://bi.example.com");
    assert_eq!(
        config.destination.password.as_ref().unwrap().expose_secret(),
        "destination-pass"
    );
    assert_eq!(config.cache.folder, "/tmp/from-env");
    assert_eq!(config.copy.parallel_roots, 1);
}

#[test]
fn test_env_overrides_file_values() {
    let _env = clean_env();
    let file = write_config(COMPLETE_CONFIG);

    std::env::set_var("DEST_INSTANCE_URL", "https://prod.example.com");
    std::env::set_var("DASHCLONE_COPY_PARALLEL_ROOTS", "8");
    std::env::set_var("DASHCLONE_APPLICATION_DRY_RUN", "false");
    std::env::set_var("DASHCLONE_CACHE_FOLDER", "/tmp/override");

    let config = load_config(file.path());
    clear_vars();

    let config = config.unwrap();
    assert_eq!(config.destination.base_url, "https://prod.example.com");
    assert_eq!(config.copy.parallel_roots, 8);
    assert!(!config.application.dry_run);
    assert_eq!(config.cache.folder, "/tmp/override");
}

#[test]
fn test_invalid_override_value_is_rejected() {
    let _env = clean_env();
    let file = write_config(COMPLETE_CONFIG);
    std::env::set_var("DASHCLONE_SOURCE_MAX_RETRIES", "lots");

    let result = load_config(file.path());
    clear_vars();

    let err = result.unwrap_err();
    assert!(err.to_string().contains("DASHCLONE_SOURCE_MAX_RETRIES"));
}

#[test]
fn test_password_substitution() {
    let _env = clean_env();
    let contents = COMPLETE_CONFIG.replace("\"source-pass\"", "\"${TEST_SOURCE_PASSWORD}\"");
    let file = write_config(&contents);
    std::env::set_var("TEST_SOURCE_PASSWORD", "from-env");

    let config = load_config(file.path());
    clear_vars();

    assert_eq!(
        config.unwrap().source.password.unwrap().expose_secret(),
        "from-env"
    );
}

#[test]
fn test_missing_substitution_variable() {
    let _env = clean_env();
    let contents = COMPLETE_CONFIG.replace("\"source-pass\"", "\"${TEST_SOURCE_PASSWORD}\"");
    let file = write_config(&contents);

    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("TEST_SOURCE_PASSWORD"));
}

#[test]
fn test_same_instance_on_both_sides_is_rejected() {
    let _env = clean_env();
    let contents = COMPLETE_CONFIG.replace("https://bi.example.com", "https://staging.example.com");
    let file = write_config(&contents);

    assert!(load_config(file.path()).is_err());
}

#[test]
fn test_missing_password_is_rejected() {
    let _env = clean_env();
    let contents = COMPLETE_CONFIG.replace("password = \"destination-pass\"\n", "");
    let file = write_config(&contents);

    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("destination.password"));
}

#[test]
fn test_invalid_parallel_roots() {
    let _env = clean_env();
    let contents = COMPLETE_CONFIG.replace("parallel_roots = 4", "parallel_roots = 0");
    let file = write_config(&contents);

    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("parallel_roots"));
}

#[test]
fn test_duplicate_database_mapping_is_rejected() {
    let _env = clean_env();
    let contents = COMPLETE_CONFIG.replace("source_id = 3", "source_id = 2");
    let file = write_config(&contents);

    assert!(load_config(file.path()).is_err());
}

#[test]
fn test_invalid_toml() {
    let _env = clean_env();
    let file = write_config("[source\nbase_url = ");

    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("TOML"));
}
