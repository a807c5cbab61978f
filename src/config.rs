//! Configuration management for routemetrics
//!
//! Parses TOML configuration files and provides typed access to settings.

use crate::error::{AppError, AppResult};
use crate::policy::{DEFAULT_MANAGEMENT_NAMESPACE, MetricsPolicyConfig};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::str::FromStr;

/// Upper bound on simulated workers per route
const MAX_WORKERS: usize = 1024;

/// Upper bound on simulated latency (10 minutes)
const MAX_LATENCY_MS: u64 = 600_000;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub context: ContextConfig,
    #[serde(default)]
    pub management: ManagementConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// Route context identity
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ContextConfig {
    pub name: String,
    /// Name used in metric names instead of `name`, if set
    #[serde(default)]
    pub management_name: Option<String>,
}

/// Management interface configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ManagementConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ManagementConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            namespace: default_namespace(),
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_namespace() -> String {
    DEFAULT_MANAGEMENT_NAMESPACE.to_string()
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9464
}

/// Observability configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Simulated workload for one route
///
/// Fields are private so validated values cannot be changed afterwards.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    id: String,
    #[serde(default = "default_workers")]
    workers: usize,
    #[serde(default = "default_min_latency_ms")]
    min_latency_ms: u64,
    #[serde(default = "default_max_latency_ms")]
    max_latency_ms: u64,
    /// Probability in `[0, 1]` that an exchange fails
    #[serde(default)]
    failure_rate: f64,
}

impl RouteConfig {
    /// Build a validated route workload
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if any value is out of range.
    pub fn new(
        id: impl Into<String>,
        workers: usize,
        latency_ms: (u64, u64),
        failure_rate: f64,
    ) -> AppResult<Self> {
        let route = Self {
            id: id.into(),
            workers,
            min_latency_ms: latency_ms.0,
            max_latency_ms: latency_ms.1,
            failure_rate,
        };
        route.validate()?;
        Ok(route)
    }

    /// Check the workload values the load generator relies on
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` naming the route and the offending value.
    pub fn validate(&self) -> AppResult<()> {
        if self.id.trim().is_empty() {
            return Err(AppError::Config(
                "Route id must not be empty".to_string(),
            ));
        }
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(AppError::Config(format!(
                "Route '{}' has invalid workers {}. Must be between 1 and {}.",
                self.id, self.workers, MAX_WORKERS
            )));
        }
        if self.min_latency_ms > self.max_latency_ms {
            return Err(AppError::Config(format!(
                "Route '{}' has min_latency_ms {} greater than max_latency_ms {}",
                self.id, self.min_latency_ms, self.max_latency_ms
            )));
        }
        if self.max_latency_ms > MAX_LATENCY_MS {
            return Err(AppError::Config(format!(
                "Route '{}' has max_latency_ms {} above the limit of {}",
                self.id, self.max_latency_ms, MAX_LATENCY_MS
            )));
        }
        if !self.failure_rate.is_finite() || !(0.0..=1.0).contains(&self.failure_rate) {
            return Err(AppError::Config(format!(
                "Route '{}' has invalid failure_rate {}. Must be a number between 0.0 and 1.0.",
                self.id, self.failure_rate
            )));
        }
        Ok(())
    }

    /// Get the route id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Number of concurrent workers driving the route
    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn min_latency_ms(&self) -> u64 {
        self.min_latency_ms
    }

    pub fn max_latency_ms(&self) -> u64 {
        self.max_latency_ms
    }

    pub fn failure_rate(&self) -> f64 {
        self.failure_rate
    }
}

fn default_workers() -> usize {
    4
}

fn default_min_latency_ms() -> u64 {
    5
}

fn default_max_latency_ms() -> u64 {
    50
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let path_display = path.as_ref().display().to_string();

        // Phase 1: Read file (preserves io::Error context)
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| AppError::ConfigFileRead {
                path: path_display.clone(),
                source,
            })?;

        // Phase 2: Parse TOML (preserves toml::de::Error context)
        let config: Self = toml::from_str(&content).map_err(|source| AppError::ConfigParseFailed {
            path: path_display.clone(),
            source,
        })?;

        // Phase 3: Validate parsed config (provides contextual reason)
        config
            .validate()
            .map_err(|e| AppError::ConfigValidationFailed {
                path: path_display,
                reason: e.to_string(),
            })?;

        Ok(config)
    }

    /// Socket address of the management interface
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `management.host` is not an IP address.
    pub fn management_address(&self) -> AppResult<SocketAddr> {
        let ip = self.management.host.parse::<IpAddr>().map_err(|e| {
            AppError::Config(format!(
                "management.host '{}' is not a valid IP address: {}",
                self.management.host, e
            ))
        })?;
        Ok(SocketAddr::new(ip, self.management.port))
    }

    /// Settings for the metrics policies attached to every route
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the management address is invalid.
    pub fn policy_config(&self) -> AppResult<MetricsPolicyConfig> {
        Ok(MetricsPolicyConfig::default()
            .with_expose_via_management(self.management.enabled)
            .with_management_namespace(self.management.namespace.clone())
            .with_management_address(self.management_address()?))
    }

    /// Validate configuration after parsing
    ///
    /// This is called automatically by `from_file()`, but can also be called
    /// explicitly when constructing Config via other means (e.g., in tests).
    pub fn validate(&self) -> AppResult<()> {
        if self.context.name.trim().is_empty() {
            return Err(AppError::Config(
                "context.name must not be empty".to_string(),
            ));
        }
        if self
            .context
            .management_name
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(AppError::Config(
                "context.management_name must not be empty when set".to_string(),
            ));
        }

        if self.management.namespace.trim().is_empty() {
            return Err(AppError::Config(
                "management.namespace must not be empty".to_string(),
            ));
        }
        self.management_address()?;

        let mut seen = std::collections::HashSet::new();
        for route in &self.routes {
            route.validate()?;
            if !seen.insert(route.id.as_str()) {
                return Err(AppError::Config(format!(
                    "Route '{}' is defined more than once. Route ids must be unique \
                    within a context.",
                    route.id
                )));
            }
        }

        Ok(())
    }
}

impl FromStr for Config {
    type Err = AppError;

    fn from_str(toml_str: &str) -> Result<Self, Self::Err> {
        let config: Config =
            toml::from_str(toml_str).map_err(|source| AppError::ConfigParseFailed {
                path: "<string>".to_string(),
                source,
            })?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_CONFIG: &str = r#"
[context]
name = "shop"
management_name = "shop-prod"

[management]
enabled = true
namespace = "shop.metrics"
host = "0.0.0.0"
port = 9100

[observability]
log_level = "debug"

[[routes]]
id = "orders"
workers = 8
min_latency_ms = 10
max_latency_ms = 40
failure_rate = 0.05

[[routes]]
id = "invoices"
"#;

    fn minimal(extra: &str) -> String {
        format!("[context]\nname = \"shop\"\n{}", extra)
    }

    #[test]
    fn test_config_from_str_parses_successfully() {
        let config = Config::from_str(TEST_CONFIG).expect("should parse config");
        assert_eq!(config.context.name, "shop");
        assert_eq!(config.context.management_name.as_deref(), Some("shop-prod"));
        assert!(config.management.enabled);
        assert_eq!(config.management.namespace, "shop.metrics");
        assert_eq!(config.management.port, 9100);
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn test_config_parses_routes_with_defaults() {
        let config = Config::from_str(TEST_CONFIG).unwrap();
        assert_eq!(config.routes.len(), 2);

        let orders = &config.routes[0];
        assert_eq!(orders.id(), "orders");
        assert_eq!(orders.workers(), 8);
        assert_eq!(orders.min_latency_ms(), 10);
        assert_eq!(orders.max_latency_ms(), 40);
        assert_eq!(orders.failure_rate(), 0.05);

        let invoices = &config.routes[1];
        assert_eq!(invoices.workers(), 4);
        assert_eq!(invoices.min_latency_ms(), 5);
        assert_eq!(invoices.max_latency_ms(), 50);
        assert_eq!(invoices.failure_rate(), 0.0);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let config = Config::from_str(&minimal("")).unwrap();
        assert!(config.context.management_name.is_none());
        assert!(config.management.enabled);
        assert_eq!(config.management.namespace, "routemetrics.metrics");
        assert_eq!(config.management.host, "127.0.0.1");
        assert_eq!(config.management.port, 9464);
        assert_eq!(config.observability.log_level, "info");
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_missing_context_fails_to_parse() {
        let result = Config::from_str("[management]\nport = 1\n");
        assert!(matches!(result, Err(AppError::ConfigParseFailed { .. })));
    }

    #[test]
    fn test_policy_config_maps_management_section() {
        let config = Config::from_str(TEST_CONFIG).unwrap();
        let policy = config.policy_config().unwrap();
        assert!(policy.expose_via_management);
        assert_eq!(policy.management_namespace, "shop.metrics");
        assert_eq!(policy.management_address, "0.0.0.0:9100".parse().unwrap());
        assert!(policy.registry.is_none());
    }

    #[test]
    fn test_validation_empty_context_name_fails() {
        let result = Config::from_str("[context]\nname = \" \"\n");
        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("context.name")));
    }

    #[test]
    fn test_validation_empty_management_name_fails() {
        let result = Config::from_str("[context]\nname = \"shop\"\nmanagement_name = \"\"\n");
        assert!(
            matches!(result, Err(AppError::Config(msg)) if msg.contains("management_name"))
        );
    }

    #[test]
    fn test_validation_empty_namespace_fails() {
        let result = Config::from_str(&minimal("[management]\nnamespace = \"\"\n"));
        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("namespace")));
    }

    #[test]
    fn test_validation_invalid_host_fails() {
        let result = Config::from_str(&minimal("[management]\nhost = \"localhost\"\n"));
        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("localhost")));
    }

    #[test]
    fn test_validation_duplicate_route_fails() {
        let result = Config::from_str(&minimal(
            "[[routes]]\nid = \"orders\"\n[[routes]]\nid = \"orders\"\n",
        ));
        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("more than once")));
    }

    #[test]
    fn test_validation_zero_workers_fails() {
        let result = Config::from_str(&minimal("[[routes]]\nid = \"orders\"\nworkers = 0\n"));
        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("workers")));
    }

    #[test]
    fn test_validation_inverted_latency_fails() {
        let result = Config::from_str(&minimal(
            "[[routes]]\nid = \"orders\"\nmin_latency_ms = 100\nmax_latency_ms = 10\n",
        ));
        assert!(matches!(result, Err(AppError::Config(msg)) if msg.contains("min_latency_ms")));
    }

    #[test]
    fn test_validation_failure_rate_out_of_range_fails() {
        for rate in ["1.5", "-0.1", "nan"] {
            let result = Config::from_str(&minimal(&format!(
                "[[routes]]\nid = \"orders\"\nfailure_rate = {}\n",
                rate
            )));
            assert!(
                matches!(result, Err(AppError::Config(ref msg)) if msg.contains("failure_rate")),
                "failure_rate {} should be rejected",
                rate
            );
        }
    }

    #[test]
    fn test_route_config_new_accepts_valid_values() {
        let route = RouteConfig::new("orders", 2, (0, 10), 0.25).unwrap();
        assert_eq!(route.id(), "orders");
        assert_eq!(route.workers(), 2);
        assert_eq!(route.max_latency_ms(), 10);
    }

    #[test]
    fn test_route_config_new_rejects_out_of_range_values() {
        let cases = [
            RouteConfig::new("orders", 1, (20, 10), 0.0),
            RouteConfig::new("orders", 1, (0, 10), 1.5),
            RouteConfig::new("orders", 1, (0, 10), f64::NAN),
            RouteConfig::new("orders", 0, (0, 10), 0.0),
            RouteConfig::new(" ", 1, (0, 10), 0.0),
        ];
        for result in cases {
            assert!(matches!(result, Err(AppError::Config(_))), "{:?}", result);
        }
    }
}
