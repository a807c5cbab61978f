//! routemetrics demo server
//!
//! Instruments the configured routes, publishes their metrics on the
//! management endpoint, and drives simulated load until Ctrl-C.

use clap::Parser;
use routemetrics::{
    cli::{Cli, Command, generate_config_template},
    config::Config,
    context::RouteContext,
    load::LoadGenerator,
    policy::MetricsRoutePolicy,
    registry_service::RegistryService,
    route::Route,
    telemetry,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Some(Command::Config { output }) = cli.command {
        let template = generate_config_template();
        match output {
            Some(path) => {
                std::fs::write(&path, template)?;
                println!("Configuration template written to {}", path);
            }
            None => print!("{}", template),
        }
        return Ok(());
    }

    // Load configuration
    let config = Config::from_file(&cli.config)?;

    // Initialize telemetry
    telemetry::init(&config.observability.log_level);

    let mut context = RouteContext::new(config.context.name.clone());
    if let Some(management_name) = &config.context.management_name {
        context = context.with_management_name(management_name.clone());
    }
    let context = Arc::new(context);

    tracing::info!(
        context = %context.display_name(),
        routes = config.routes.len(),
        "Starting routemetrics"
    );

    let policy_config = config.policy_config()?;
    let mut routes = Vec::with_capacity(config.routes.len());
    for route_config in &config.routes {
        let policy = Arc::new(MetricsRoutePolicy::with_config(policy_config.clone()));
        let route = Arc::new(Route::new(route_config.id(), context.clone()).with_policy(policy));
        route.initialize()?;
        routes.push((route, route_config.clone()));
    }

    if routes.is_empty() {
        tracing::warn!("No routes configured, management endpoint will have nothing to report");
    }

    context.start()?;

    let load = LoadGenerator::start(&routes);
    tracing::info!(workers = load.worker_count(), "Simulated load running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    for report in load.stop().await {
        tracing::info!(
            route = %report.route,
            exchanges = report.exchanges,
            failures = report.failures,
            "Route load finished"
        );
    }

    if let Some(service) = context.has_service::<RegistryService>() {
        tracing::debug!(
            statistics = %service.dump_statistics_as_json(false)?,
            "Final route statistics"
        );
    }

    context.stop().await?;
    Ok(())
}
