//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "dashclone.toml")]
    pub output: String,

    /// Include example values and comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing dashclone configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2); // Configuration error exit code
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your instance URLs", self.output);
                println!("  2. Create a .env file with your credentials:");
                println!("     - Set SOURCE_INSTANCE_USER and SOURCE_INSTANCE_PASSWORD");
                println!("     - Set DEST_INSTANCE_USER and DEST_INSTANCE_PASSWORD");
                println!("  3. Validate configuration: dashclone validate-config");
                println!("  4. Rehearse: dashclone copy --dashboard <ID> --dry-run");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {e}");
                Ok(5) // Fatal error exit code
            }
        }
    }

    /// Generate minimal configuration
    fn generate_minimal_config() -> String {
        r#"# dashclone Configuration File

[application]
log_level = "info"
dry_run = false

[source]
base_url = "https://staging-bi.example.com"
username = "${SOURCE_INSTANCE_USER}"
password = "${SOURCE_INSTANCE_PASSWORD}"

[destination]
base_url = "https://bi.example.com"
username = "${DEST_INSTANCE_USER}"
password = "${DEST_INSTANCE_PASSWORD}"

[cache]
folder = ".dashclone"

[copy]
parallel_roots = 1
warn_on_existing = true

[logging]
local_enabled = false
"#
        .to_string()
    }

    /// Generate configuration with examples and comments
    fn generate_config_with_examples() -> String {
        r#"# dashclone Configuration File
# Copies Metabase dashboards, questions and collections between instances.
#
# Every value can reference environment variables as ${VAR}.
# SOURCE_INSTANCE_URL, DEST_INSTANCE_URL and CONFIG_FOLDER override the
# file, as do DASHCLONE_<SECTION>_<KEY> variables.

[application]
# trace | debug | info | warn | error
log_level = "info"
# Resolve and report without creating anything
dry_run = false

[source]
base_url = "https://staging-bi.example.com"
username = "${SOURCE_INSTANCE_USER}"
password = "${SOURCE_INSTANCE_PASSWORD}"
timeout_seconds = 60
tls_verify = true

[source.retry]
max_retries = 3
initial_delay_ms = 1000
max_delay_ms = 30000
backoff_multiplier = 2.0

[destination]
base_url = "https://bi.example.com"
username = "${DEST_INSTANCE_USER}"
password = "${DEST_INSTANCE_PASSWORD}"
timeout_seconds = 60
tls_verify = true

[destination.retry]
# Creations are only retried when the request never reached the server
max_retries = 3
initial_delay_ms = 1000
max_delay_ms = 30000
backoff_multiplier = 2.0

[cache]
# ID mappings live in <folder>/<instance pair>/mappings.json
folder = ".dashclone"
# Save the mapping cache after every created entity
checkpoint_each_entry = true

[copy]
# Roots copied concurrently; shared dependencies are still created once
parallel_roots = 1
# Warn when an equivalent entity already exists at the destination
warn_on_existing = true

# Warehouse databases whose IDs differ between the instances.
# With match_fields, tables and fields are matched by name as well.
# [[copy.databases]]
# source_id = 2
# destination_id = 5
# match_fields = true

[logging]
local_enabled = true
local_path = "/var/log/dashclone"
# daily | hourly | never
local_rotation = "daily"
"#
        .to_string()
    }
}
