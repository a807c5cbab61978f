//! Routes, exchanges and the policy hook they call
//!
//! This is the minimal host side of a route policy: a [`Route`] owns its
//! policies and calls them when it is initialized and around every
//! [`Exchange`] it processes.

use crate::context::RouteContext;
use crate::error::AppResult;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Hook invoked by a route at initialization and around each exchange
///
/// `on_exchange_begin` and `on_exchange_done` run on whatever worker is
/// processing the exchange, concurrently for different exchanges. For one
/// exchange, begin always precedes done. They must not fail: errors there
/// would disturb unrelated in-flight work.
pub trait RoutePolicy: Send + Sync {
    /// Called once when the route is initialized
    fn on_init(&self, route: &Route) -> AppResult<()> {
        let _ = route;
        Ok(())
    }

    /// Called when an exchange enters the route
    fn on_exchange_begin(&self, route: &Route, exchange: &mut Exchange) {
        let _ = (route, exchange);
    }

    /// Called when an exchange leaves the route, successfully or not
    fn on_exchange_done(&self, route: &Route, exchange: &mut Exchange) {
        let _ = (route, exchange);
    }
}

/// One unit of work flowing through a route
///
/// Carries a property bag that policies use to keep per-exchange state
/// between begin and done.
pub struct Exchange {
    id: Uuid,
    properties: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
    exception: Option<String>,
}

impl Exchange {
    /// Create an exchange with a random id and no properties
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            properties: HashMap::new(),
            exception: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Store a property, replacing any previous value under `key`
    pub fn set_property<T: Any + Send + Sync>(&mut self, key: &'static str, value: T) {
        self.properties.insert(key, Box::new(value));
    }

    /// Borrow a property if it exists and has type `T`
    pub fn property<T: Any + Send + Sync>(&self, key: &str) -> Option<&T> {
        self.properties.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Remove and return a property if it exists and has type `T`
    ///
    /// A value of another type is left in place.
    pub fn take_property<T: Any + Send + Sync>(&mut self, key: &str) -> Option<T> {
        if !self.properties.get(key).is_some_and(|v| v.is::<T>()) {
            return None;
        }
        self.properties
            .remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Failure message recorded by the processor, if it failed
    pub fn exception(&self) -> Option<&str> {
        self.exception.as_deref()
    }

    pub fn set_exception(&mut self, message: impl Into<String>) {
        self.exception = Some(message.into());
    }

    pub fn is_failed(&self) -> bool {
        self.exception.is_some()
    }
}

impl Default for Exchange {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<_> = self.properties.keys().collect();
        keys.sort();
        f.debug_struct("Exchange")
            .field("id", &self.id)
            .field("properties", &keys)
            .field("exception", &self.exception)
            .finish()
    }
}

/// A named processing path within a [`RouteContext`]
pub struct Route {
    id: String,
    context: Arc<RouteContext>,
    policies: Vec<Arc<dyn RoutePolicy>>,
}

impl Route {
    /// Create a route with no policies
    pub fn new(id: impl Into<String>, context: Arc<RouteContext>) -> Self {
        Self {
            id: id.into(),
            context,
            policies: Vec::new(),
        }
    }

    /// Attach a policy
    pub fn with_policy(mut self, policy: Arc<dyn RoutePolicy>) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn context(&self) -> &Arc<RouteContext> {
        &self.context
    }

    pub fn policies(&self) -> &[Arc<dyn RoutePolicy>] {
        &self.policies
    }

    /// Initialize every attached policy
    ///
    /// # Errors
    ///
    /// Returns the first policy initialization error.
    pub fn initialize(&self) -> AppResult<()> {
        for policy in &self.policies {
            policy.on_init(self)?;
        }
        tracing::debug!(
            route = %self.id,
            context = %self.context.name(),
            policies = self.policies.len(),
            "Route initialized"
        );
        Ok(())
    }

    /// Signal that `exchange` entered the route
    pub fn begin(&self, exchange: &mut Exchange) {
        for policy in &self.policies {
            policy.on_exchange_begin(self, exchange);
        }
    }

    /// Signal that `exchange` left the route
    pub fn done(&self, exchange: &mut Exchange) {
        for policy in &self.policies {
            policy.on_exchange_done(self, exchange);
        }
    }

    /// Run `processor` on `exchange` between begin and done
    ///
    /// Done is signalled whether or not the processor succeeds. A failure is
    /// recorded on the exchange and returned.
    ///
    /// # Errors
    ///
    /// Returns the processor's error.
    pub fn process<F>(&self, exchange: &mut Exchange, processor: F) -> AppResult<()>
    where
        F: FnOnce(&mut Exchange) -> AppResult<()>,
    {
        self.begin(exchange);
        let result = processor(exchange);
        if let Err(e) = &result {
            tracing::debug!(
                route = %self.id,
                exchange_id = %exchange.id(),
                error = %e,
                "Exchange failed"
            );
            exchange.set_exception(e.to_string());
        }
        self.done(exchange);
        result
    }
}

impl fmt::Debug for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("id", &self.id)
            .field("context", &self.context.name())
            .field("policies", &self.policies.len())
            .finish()
    }
}
