//! Simulated workload
//!
//! Drives exchanges through routes so their metrics have something to show.
//! Every route gets the number of workers its [`RouteConfig`] asks for; each
//! worker loops begin → simulated processing → done until stopped.

use crate::config::RouteConfig;
use crate::route::{Exchange, Route};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Exchanges completed by one route's workers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteReport {
    pub route: String,
    pub exchanges: u64,
    pub failures: u64,
}

/// Running workload over a set of routes
pub struct LoadGenerator {
    shutdown: watch::Sender<bool>,
    workers: Vec<(String, JoinHandle<RouteReport>)>,
}

impl LoadGenerator {
    /// Spawn workers for every route on the current tokio runtime
    pub fn start(routes: &[(Arc<Route>, RouteConfig)]) -> Self {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let mut workers = Vec::new();

        for (route, config) in routes {
            tracing::info!(
                route = %route.id(),
                workers = config.workers(),
                min_latency_ms = config.min_latency_ms(),
                max_latency_ms = config.max_latency_ms(),
                failure_rate = config.failure_rate(),
                "Starting simulated load"
            );
            for _ in 0..config.workers() {
                let handle = tokio::spawn(run_worker(
                    route.clone(),
                    config.clone(),
                    StdRng::seed_from_u64(rand::random()),
                    shutdown_rx.clone(),
                ));
                workers.push((route.id().to_string(), handle));
            }
        }

        Self { shutdown, workers }
    }

    /// Number of spawned workers across all routes
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Signal every worker to stop and wait for them
    ///
    /// Workers finish the exchange they are processing first, so every
    /// begun exchange is also done. Reports are merged per route and
    /// returned in route order.
    pub async fn stop(self) -> Vec<RouteReport> {
        // Workers hold receivers until they exit, so the send cannot fail
        // while any of them is still running.
        let _ = self.shutdown.send(true);

        let mut reports: Vec<RouteReport> = Vec::new();
        for (route, handle) in self.workers {
            let report = match handle.await {
                Ok(report) => report,
                Err(e) => {
                    tracing::warn!(route = %route, error = %e, "Load worker did not finish cleanly");
                    continue;
                }
            };
            match reports.iter_mut().find(|r| r.route == report.route) {
                Some(existing) => {
                    existing.exchanges += report.exchanges;
                    existing.failures += report.failures;
                }
                None => reports.push(report),
            }
        }
        reports
    }
}

async fn run_worker(
    route: Arc<Route>,
    config: RouteConfig,
    mut rng: StdRng,
    shutdown: watch::Receiver<bool>,
) -> RouteReport {
    let mut report = RouteReport {
        route: route.id().to_string(),
        ..RouteReport::default()
    };

    while !*shutdown.borrow() {
        let latency = rng.random_range(config.min_latency_ms()..=config.max_latency_ms());
        let fail = rng.random_bool(config.failure_rate());

        let mut exchange = Exchange::new();
        route.begin(&mut exchange);
        tokio::time::sleep(Duration::from_millis(latency)).await;
        if fail {
            exchange.set_exception("Simulated processing failure");
            report.failures += 1;
        }
        route.done(&mut exchange);
        report.exchanges += 1;

        tracing::trace!(
            route = %route.id(),
            exchange_id = %exchange.id(),
            latency_ms = latency,
            failed = fail,
            "Simulated exchange done"
        );

        // Zero-latency routes would otherwise never yield to the scheduler
        tokio::task::yield_now().await;
    }

    report
}
