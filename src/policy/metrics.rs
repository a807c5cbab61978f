//! Metrics route policy

use super::PolicyState;
use super::statistics::MetricsStatistics;
use crate::error::{AppError, AppResult};
use crate::metrics::{MetricRegistry, TimerContext};
use crate::registry_service::RegistryService;
use crate::route::{Exchange, Route, RoutePolicy};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, OnceLock};

/// Namespace metrics are published under when none is configured
pub const DEFAULT_MANAGEMENT_NAMESPACE: &str = "routemetrics.metrics";

/// Exchange property holding the in-flight latency measurement
pub const TIMER_PROPERTY: &str = "MetricsRoutePolicy";

/// Default bind address of the management interface
pub fn default_management_address() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9464)
}

/// Settings applied when the policy creates its context's registry service
///
/// They only matter for the first policy to initialize in a context; later
/// policies reuse the existing service as it is.
#[derive(Debug, Clone)]
pub struct MetricsPolicyConfig {
    /// Registry to use instead of creating one
    pub registry: Option<Arc<MetricRegistry>>,
    /// Publish the registry on the management interface when the context starts
    pub expose_via_management: bool,
    /// Namespace for published metric names
    pub management_namespace: String,
    /// Bind address of the management interface
    pub management_address: SocketAddr,
}

impl Default for MetricsPolicyConfig {
    fn default() -> Self {
        Self {
            registry: None,
            expose_via_management: true,
            management_namespace: DEFAULT_MANAGEMENT_NAMESPACE.to_string(),
            management_address: default_management_address(),
        }
    }
}

impl MetricsPolicyConfig {
    pub fn with_registry(mut self, registry: Arc<MetricRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_expose_via_management(mut self, expose: bool) -> Self {
        self.expose_via_management = expose;
        self
    }

    pub fn with_management_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.management_namespace = namespace.into();
        self
    }

    pub fn with_management_address(mut self, address: SocketAddr) -> Self {
        self.management_address = address;
        self
    }
}

/// Route policy recording exchange statistics in a shared registry
///
/// On initialization the policy binds to its route, reuses (or creates) the
/// context's [`RegistryService`], and obtains four aggregates named
/// `<context>:<route>:{total,inflight,requests,responses}`, where the
/// context part is the context's management name if it has one.
///
/// Every exchange then:
/// - on begin: increments `total` and `inflight`, marks `requests`, and
///   stores a latency measurement in the exchange under [`TIMER_PROPERTY`]
/// - on done: decrements `inflight` and, if the measurement is present,
///   commits it to `responses`
///
/// Begin and done never fail and do nothing until initialization completes.
pub struct MetricsRoutePolicy {
    config: MetricsPolicyConfig,
    state: AtomicU8,
    binding: OnceLock<Binding>,
}

struct Binding {
    route: String,
    service: Arc<RegistryService>,
    statistics: Arc<MetricsStatistics>,
}

impl MetricsRoutePolicy {
    /// Create a policy with default settings
    pub fn new() -> Self {
        Self::with_config(MetricsPolicyConfig::default())
    }

    pub fn with_config(config: MetricsPolicyConfig) -> Self {
        Self {
            config,
            state: AtomicU8::new(PolicyState::Uninitialized.as_u8()),
            binding: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &MetricsPolicyConfig {
        &self.config
    }

    pub fn state(&self) -> PolicyState {
        PolicyState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Id of the route this policy is bound to, once ready
    pub fn route_id(&self) -> Option<&str> {
        self.ready().map(|b| b.route.as_str())
    }

    /// Statistics of the bound route, once ready
    pub fn statistics(&self) -> Option<Arc<MetricsStatistics>> {
        self.ready().map(|b| b.statistics.clone())
    }

    /// Registry service shared with the other routes of the context, once ready
    pub fn registry_service(&self) -> Option<Arc<RegistryService>> {
        self.ready().map(|b| b.service.clone())
    }

    fn ready(&self) -> Option<&Binding> {
        if self.state() == PolicyState::Ready {
            self.binding.get()
        } else {
            None
        }
    }

    fn bind(&self, route: &Route) -> AppResult<Binding> {
        let context = route.context();

        let mut created = false;
        let service = context.get_or_create_service(|| {
            created = true;
            RegistryService::new(&self.config)
        })?;
        if !created {
            tracing::debug!(
                route = %route.id(),
                context = %context.name(),
                "Reusing existing metrics registry service, policy registry settings ignored"
            );
        }

        let statistics =
            MetricsStatistics::register(service.registry(), context.display_name(), route.id())?;

        Ok(Binding {
            route: route.id().to_string(),
            service,
            statistics: Arc::new(statistics),
        })
    }
}

impl Default for MetricsRoutePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RoutePolicy for MetricsRoutePolicy {
    fn on_init(&self, route: &Route) -> AppResult<()> {
        if let Err(current) = self.state.compare_exchange(
            PolicyState::Uninitialized.as_u8(),
            PolicyState::Initializing.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            return match PolicyState::from_u8(current) {
                PolicyState::Ready => match self.binding.get() {
                    Some(binding) if binding.route == route.id() => {
                        tracing::debug!(route = %route.id(), "Metrics policy already initialized");
                        Ok(())
                    }
                    Some(binding) => Err(AppError::PolicyAlreadyBound {
                        bound: binding.route.clone(),
                        requested: route.id().to_string(),
                    }),
                    None => Err(AppError::Internal(
                        "metrics policy is ready without a binding".to_string(),
                    )),
                },
                _ => Err(AppError::PolicyInitializing {
                    route: route.id().to_string(),
                }),
            };
        }

        match self.bind(route) {
            Ok(binding) => {
                if self.binding.set(binding).is_err() {
                    self.state
                        .store(PolicyState::Uninitialized.as_u8(), Ordering::Release);
                    return Err(AppError::Internal(
                        "metrics policy binding was set twice".to_string(),
                    ));
                }
                self.state
                    .store(PolicyState::Ready.as_u8(), Ordering::Release);
                tracing::info!(
                    route = %route.id(),
                    context = %route.context().display_name(),
                    "Metrics route policy initialized"
                );
                Ok(())
            }
            Err(e) => {
                self.state
                    .store(PolicyState::Uninitialized.as_u8(), Ordering::Release);
                tracing::warn!(
                    route = %route.id(),
                    error = %e,
                    "Metrics route policy failed to initialize"
                );
                Err(AppError::PolicyInitFailed {
                    route: route.id().to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    fn on_exchange_begin(&self, _route: &Route, exchange: &mut Exchange) {
        if let Some(binding) = self.ready() {
            let timer = binding.statistics.begin();
            exchange.set_property(TIMER_PROPERTY, timer);
        }
    }

    fn on_exchange_done(&self, _route: &Route, exchange: &mut Exchange) {
        if let Some(binding) = self.ready() {
            let timer = exchange.take_property::<TimerContext>(TIMER_PROPERTY);
            binding.statistics.done(timer);
        }
    }
}

impl std::fmt::Debug for MetricsRoutePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRoutePolicy")
            .field("state", &self.state())
            .field("route", &self.route_id())
            .finish()
    }
}
