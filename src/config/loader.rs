//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{DashcloneConfig, InstanceConfig};
use super::secret::secret_string;
use crate::domain::errors::DashcloneError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file, or starts from defaults when it does not exist
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into DashcloneConfig
/// 4. Applies environment variable overrides
/// 5. Validates the configuration
///
/// The overrides honor `SOURCE_INSTANCE_URL`, `SOURCE_INSTANCE_USER`,
/// `SOURCE_INSTANCE_PASSWORD`, `DEST_INSTANCE_URL`, `DEST_INSTANCE_USER`,
/// `DEST_INSTANCE_PASSWORD` and `CONFIG_FOLDER`, plus `DASHCLONE_<SECTION>_<KEY>`
/// for the remaining settings.
///
/// # Errors
///
/// Returns an error if:
/// - File exists but cannot be read
/// - TOML parsing fails
/// - A referenced environment variable is not set
/// - An override holds a value of the wrong type
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use dashclone::config::loader::load_config;
///
/// let config = load_config("dashclone.toml").expect("Failed to load config");
/// println!("{} -> {}", config.source.base_url, config.destination.base_url);
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<DashcloneConfig> {
    let mut config = read_config_file(path.as_ref())?;

    // Apply environment variable overrides
    apply_env_overrides(&mut config)?;

    // Validate configuration
    config.validate().map_err(|e| {
        DashcloneError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

fn read_config_file(path: &Path) -> Result<DashcloneConfig> {
    if !path.exists() {
        tracing::debug!(
            path = %path.display(),
            "Configuration file not found, using defaults and environment"
        );
        return Ok(DashcloneConfig::default());
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        DashcloneError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    let contents = substitute_env_vars(&contents)?;

    toml::from_str(&contents)
        .map_err(|e| DashcloneError::Configuration(format!("Failed to parse TOML: {e}")))
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are copied unchanged.
///
/// # Errors
///
/// Returns an error naming every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| DashcloneError::Other(format!("Invalid substitution pattern: {e}")))?;
    let mut lines = Vec::new();
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            lines.push(line.to_string());
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    processed_line = processed_line.replace(&format!("${{{var_name}}}"), &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        lines.push(processed_line);
    }

    if !missing_vars.is_empty() {
        return Err(DashcloneError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(lines.join("\n"))
}

fn env_value<T: FromStr>(name: &str) -> Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|_| {
            DashcloneError::Configuration(format!("Invalid value '{raw}' for {name}"))
        }),
        Err(_) => Ok(None),
    }
}

fn apply_instance_overrides(
    instance: &mut InstanceConfig,
    url_var: &str,
    user_var: &str,
    password_var: &str,
    prefix: &str,
) -> Result<()> {
    if let Ok(val) = std::env::var(url_var) {
        instance.base_url = val;
    }
    if let Ok(val) = std::env::var(user_var) {
        instance.username = val;
    }
    if let Ok(val) = std::env::var(password_var) {
        instance.password = Some(secret_string(val));
    }
    if let Some(val) = env_value(&format!("{prefix}_TIMEOUT_SECONDS"))? {
        instance.timeout_seconds = val;
    }
    if let Some(val) = env_value(&format!("{prefix}_TLS_VERIFY"))? {
        instance.tls_verify = val;
    }
    if let Some(val) = env_value(&format!("{prefix}_MAX_RETRIES"))? {
        instance.retry.max_retries = val;
    }
    Ok(())
}

/// Applies environment variable overrides
///
/// # Arguments
///
/// * `config` - Mutable reference to the configuration to update
fn apply_env_overrides(config: &mut DashcloneConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("DASHCLONE_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Some(val) = env_value("DASHCLONE_APPLICATION_DRY_RUN")? {
        config.application.dry_run = val;
    }

    // Instance overrides
    apply_instance_overrides(
        &mut config.source,
        "SOURCE_INSTANCE_URL",
        "SOURCE_INSTANCE_USER",
        "SOURCE_INSTANCE_PASSWORD",
        "DASHCLONE_SOURCE",
    )?;
    apply_instance_overrides(
        &mut config.destination,
        "DEST_INSTANCE_URL",
        "DEST_INSTANCE_USER",
        "DEST_INSTANCE_PASSWORD",
        "DASHCLONE_DESTINATION",
    )?;

    // Cache overrides
    if let Ok(val) = std::env::var("CONFIG_FOLDER") {
        config.cache.folder = val;
    }
    if let Ok(val) = std::env::var("DASHCLONE_CACHE_FOLDER") {
        config.cache.folder = val;
    }
    if let Some(val) = env_value("DASHCLONE_CACHE_CHECKPOINT_EACH_ENTRY")? {
        config.cache.checkpoint_each_entry = val;
    }

    // Copy overrides
    if let Some(val) = env_value("DASHCLONE_COPY_PARALLEL_ROOTS")? {
        config.copy.parallel_roots = val;
    }
    if let Some(val) = env_value("DASHCLONE_COPY_WARN_ON_EXISTING")? {
        config.copy.warn_on_existing = val;
    }

    // Logging overrides
    if let Some(val) = env_value("DASHCLONE_LOGGING_LOCAL_ENABLED")? {
        config.logging.local_enabled = val;
    }
    if let Ok(val) = std::env::var("DASHCLONE_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_substitute_env_vars() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::set_var("DASHCLONE_TEST_SUBST", "test_value");
        let input = "# uses ${NOT_SET_IN_COMMENT}\npassword = \"${DASHCLONE_TEST_SUBST}\"";
        let result = substitute_env_vars(input).unwrap();
        assert_eq!(
            result,
            "# uses ${NOT_SET_IN_COMMENT}\npassword = \"test_value\""
        );
        std::env::remove_var("DASHCLONE_TEST_SUBST");
    }

    #[test]
    fn test_substitute_env_vars_missing() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::remove_var("DASHCLONE_TEST_MISSING");
        let input = "password = \"${DASHCLONE_TEST_MISSING}\"";
        let err = substitute_env_vars(input).unwrap_err();
        assert!(err.to_string().contains("DASHCLONE_TEST_MISSING"));
    }

    #[test]
    fn test_env_value_rejects_wrong_type() {
        let _guard = ENV_MUTEX.lock().unwrap();
        std::env::set_var("DASHCLONE_TEST_NUMBER", "many");
        let result: Result<Option<usize>> = env_value("DASHCLONE_TEST_NUMBER");
        assert!(result.is_err());
        std::env::remove_var("DASHCLONE_TEST_NUMBER");
    }

    #[test]
    fn test_load_config_valid() {
        let _guard = ENV_MUTEX.lock().unwrap();
        let toml_content = r#"
[application]
log_level = "debug"

[source]
base_url = "https://staging.example.com"
username = "copy@example.com"
password = "pass"

[destination]
base_url = "https://bi.example.com"
username = "copy@example.com"
password = "pass"

[cache]
folder = "/tmp/dashclone-cache"
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.application.log_level, "debug");
        assert_eq!(config.source.base_url, "https://staging.example.com");
        assert_eq!(
            config.destination.password.unwrap().expose_secret(),
            "pass"
        );
    }

    #[test]
    fn test_load_config_missing_file_without_env_fails_validation() {
        let _guard = ENV_MUTEX.lock().unwrap();
        for var in ["SOURCE_INSTANCE_URL", "DEST_INSTANCE_URL"] {
            std::env::remove_var(var);
        }
        let err = load_config("definitely-not-here.toml").unwrap_err();
        assert!(err.to_string().contains("source.base_url"));
    }
}
