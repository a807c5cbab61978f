//! Concurrent exchange tests
//!
//! Begin and done run on whatever thread processes the exchange. These tests
//! hammer one route from many threads and check that no update is lost.

use routemetrics::context::RouteContext;
use routemetrics::policy::{MetricsPolicyConfig, MetricsRoutePolicy};
use routemetrics::registry_service::RegistryService;
use routemetrics::route::{Exchange, Route};
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;
const EXCHANGES_PER_THREAD: usize = 500;

fn quiet_policy() -> Arc<MetricsRoutePolicy> {
    Arc::new(MetricsRoutePolicy::with_config(
        MetricsPolicyConfig::default().with_expose_via_management(false),
    ))
}

#[test]
fn test_concurrent_exchanges_conserve_counts() {
    let policy = quiet_policy();
    let route = Arc::new(
        Route::new("orders", Arc::new(RouteContext::new("shop"))).with_policy(policy.clone()),
    );
    route.initialize().unwrap();

    let barrier = Arc::new(Barrier::new(THREADS));
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let route = route.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..EXCHANGES_PER_THREAD {
                    let mut exchange = Exchange::new();
                    route.process(&mut exchange, |_| Ok(())).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let expected = (THREADS * EXCHANGES_PER_THREAD) as u64;
    let stats = policy.statistics().unwrap();
    assert_eq!(stats.total().count() as u64, expected);
    assert_eq!(stats.inflight().count(), 0);
    assert_eq!(stats.requests().count(), expected);
    assert_eq!(stats.responses().count(), expected);
    assert_eq!(stats.responses().snapshot().count, expected);
}

#[test]
fn test_inflight_matches_open_exchanges_across_threads() {
    let policy = quiet_policy();
    let route = Arc::new(
        Route::new("orders", Arc::new(RouteContext::new("shop"))).with_policy(policy.clone()),
    );
    route.initialize().unwrap();

    // Begin on worker threads, finish on the main thread
    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let route = route.clone();
            thread::spawn(move || {
                (0..10)
                    .map(|_| {
                        let mut exchange = Exchange::new();
                        route.begin(&mut exchange);
                        exchange
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();
    let mut open: Vec<Exchange> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();

    let stats = policy.statistics().unwrap();
    assert_eq!(stats.inflight().count(), open.len() as i64);

    for exchange in open.iter_mut() {
        route.done(exchange);
    }
    assert_eq!(stats.inflight().count(), 0);
    assert_eq!(stats.responses().count(), open.len() as u64);
}

#[test]
fn test_concurrent_route_initialization_shares_one_service() {
    let ctx = Arc::new(RouteContext::new("shop"));
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let ctx = ctx.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                let policy = quiet_policy();
                let route = Route::new(format!("route-{}", i), ctx).with_policy(policy.clone());
                barrier.wait();
                route.initialize().unwrap();
                policy.registry_service().unwrap()
            })
        })
        .collect();
    let services: Vec<Arc<RegistryService>> =
        handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(services.iter().all(|s| Arc::ptr_eq(s, &services[0])));
    assert_eq!(services[0].registry().len(), THREADS * 4);
}
