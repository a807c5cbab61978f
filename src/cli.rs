//! Command-line interface for routemetrics
//!
//! Provides argument parsing and subcommand handling for the routemetrics binary.

use clap::{Parser, Subcommand};

/// Per-route exchange metrics with a Prometheus management endpoint
#[derive(Parser)]
#[command(name = "routemetrics")]
#[command(version)]
#[command(about = "Per-route exchange metrics with a Prometheus management endpoint")]
#[command(
    long_about = "routemetrics attaches a metrics policy to every configured route, drives a \
    simulated workload through them, and publishes exchange counts, in-flight exchanges, \
    request rates and response latencies on a management HTTP endpoint."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# routemetrics Configuration
# ==========================
#
# This file configures the route context, the management endpoint that
# publishes route metrics, logging, and the simulated routes.

# ─────────────────────────────────────────────────────────────────────────────
# CONTEXT
# ─────────────────────────────────────────────────────────────────────────────

[context]
# Context name
name = "routemetrics"

# Optional name used in metric names instead of `name`
# Metric names have the form <context>:<route>:<total|inflight|requests|responses>
# management_name = "routemetrics-prod"

# ─────────────────────────────────────────────────────────────────────────────
# MANAGEMENT ENDPOINT
# ─────────────────────────────────────────────────────────────────────────────
#
# Serves GET /metrics (Prometheus text), GET /statistics (JSON) and
# GET /health while the context is running.

[management]
# Publish metrics over HTTP (metrics are still recorded when disabled)
enabled = true

# Namespace prefix for exported metric names (dots become underscores)
namespace = "routemetrics.metrics"

# IP address to bind to (0.0.0.0 for all interfaces, 127.0.0.1 for localhost only)
host = "127.0.0.1"

# Port to listen on
port = 9464

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
log_level = "info"

# ─────────────────────────────────────────────────────────────────────────────
# ROUTES
# ─────────────────────────────────────────────────────────────────────────────
#
# Each route gets its own metrics policy and a simulated workload.
#
# Route fields:
#   - id: Route id, unique within the context
#   - workers: Concurrent workers sending exchanges (default 4)
#   - min_latency_ms / max_latency_ms: Simulated processing time range (default 5-50)
#   - failure_rate: Probability an exchange fails, 0.0-1.0 (default 0.0)

[[routes]]
id = "orders"
workers = 4
min_latency_ms = 5
max_latency_ms = 50
failure_rate = 0.02

[[routes]]
id = "invoices"
workers = 2
min_latency_ms = 20
max_latency_ms = 200
failure_rate = 0.0
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        // Clap's built-in verification for the CLI structure
        Cli::command().debug_assert();
    }

    #[test]
    fn default_config_path() {
        let cli = Cli::parse_from(["routemetrics"]);
        assert_eq!(cli.config, "config.toml");
        assert!(cli.command.is_none());
    }

    #[test]
    fn custom_config_path() {
        let cli = Cli::parse_from(["routemetrics", "--config", "custom.toml"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn config_subcommand() {
        let cli = Cli::parse_from(["routemetrics", "config"]);
        assert!(matches!(
            cli.command,
            Some(Command::Config { output: None })
        ));
    }

    #[test]
    fn config_subcommand_with_output() {
        let cli = Cli::parse_from(["routemetrics", "config", "-o", "my-config.toml"]);
        assert!(matches!(
            cli.command,
            Some(Command::Config { output: Some(ref path) }) if path == "my-config.toml"
        ));
    }

    #[test]
    fn template_is_valid_config() {
        let template = generate_config_template();
        let result: Result<crate::config::Config, _> = template.parse();
        assert!(
            result.is_ok(),
            "Template should be a valid configuration: {:?}",
            result.err()
        );
    }

    #[test]
    fn template_has_all_sections() {
        let template = generate_config_template();
        assert!(template.contains("[context]"));
        assert!(template.contains("[management]"));
        assert!(template.contains("[observability]"));
        assert!(template.contains("[[routes]]"));
    }
}
