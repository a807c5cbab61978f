//! Metrics policy overhead benchmarks
//!
//! Measures the per-exchange cost the metrics policy adds to a route.
//!
//! ## Expected Performance Characteristics
//!
//! - Bare begin/done on statistics: sub-microsecond (atomic updates plus one
//!   histogram record)
//! - Begin/done through a route: adds the exchange property bag insert and
//!   removal on top
//!
//! Run with: `cargo bench`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use routemetrics::{
    context::RouteContext,
    metrics::MetricRegistry,
    policy::{MetricsPolicyConfig, MetricsRoutePolicy, MetricsStatistics},
    route::{Exchange, Route},
};
use std::hint::black_box;
use std::sync::Arc;

fn bench_statistics_begin_done(c: &mut Criterion) {
    let registry = MetricRegistry::new("bench").expect("registry");
    let stats = MetricsStatistics::register(&registry, "ctx", "orders").expect("statistics");

    c.bench_function("statistics_begin_done", |b| {
        b.iter(|| {
            let timer = stats.begin();
            black_box(stats.done(Some(timer)))
        })
    });
}

fn bench_route_exchange(c: &mut Criterion) {
    let mut group = c.benchmark_group("route_exchange");

    for policies in [0usize, 1] {
        let ctx = Arc::new(RouteContext::new("ctx"));
        let mut route = Route::new("orders", ctx);
        if policies == 1 {
            route = route.with_policy(Arc::new(MetricsRoutePolicy::with_config(
                MetricsPolicyConfig::default().with_expose_via_management(false),
            )));
        }
        route.initialize().expect("route initializes");

        group.bench_with_input(
            BenchmarkId::from_parameter(policies),
            &route,
            |b, route| {
                b.iter(|| {
                    let mut exchange = Exchange::new();
                    route.begin(&mut exchange);
                    route.done(&mut exchange);
                    black_box(exchange)
                })
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_statistics_begin_done, bench_route_exchange);
criterion_main!(benches);
