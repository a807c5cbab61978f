//! Owning context for routes and their shared services
//!
//! A [`RouteContext`] stands in for the host process: it names the routes it
//! owns and holds the services they share, at most one per service type.

use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::any::{Any, TypeId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// A long-lived service shared by the routes of a context
///
/// Both `start` and `stop` must be idempotent.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    /// Human-readable service name for logs
    fn name(&self) -> &'static str;

    /// Start the service. Called when the context starts, or right away if
    /// the service is added to a context that is already running.
    fn start(&self) -> AppResult<()> {
        Ok(())
    }

    /// Stop the service, releasing whatever `start` acquired before
    /// returning
    async fn stop(&self) -> AppResult<()> {
        Ok(())
    }
}

#[derive(Clone)]
struct ServiceEntry {
    any: Arc<dyn Any + Send + Sync>,
    service: Arc<dyn Service>,
}

/// Process-scoped context owning routes and shared services
pub struct RouteContext {
    name: String,
    management_name: Option<String>,
    services: DashMap<TypeId, ServiceEntry>,
    started: AtomicBool,
}

impl RouteContext {
    /// Create a new context
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            management_name: None,
            services: DashMap::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Set the name the context is published under for management
    pub fn with_management_name(mut self, management_name: impl Into<String>) -> Self {
        self.management_name = Some(management_name.into());
        self
    }

    /// Get the context name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the management name, if one was set
    pub fn management_name(&self) -> Option<&str> {
        self.management_name.as_deref()
    }

    /// Name used to identify this context in metric names
    ///
    /// The management name when set, otherwise the plain name.
    pub fn display_name(&self) -> &str {
        self.management_name.as_deref().unwrap_or(&self.name)
    }

    /// Whether [`RouteContext::start`] has run without a matching stop
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Look up a registered service by type
    pub fn has_service<S: Service>(&self) -> Option<Arc<S>> {
        self.services
            .get(&TypeId::of::<S>())
            .and_then(|entry| entry.any.clone().downcast::<S>().ok())
    }

    /// Return the service of type `S`, creating and registering it if absent
    ///
    /// `factory` runs at most once per successfully registered service type,
    /// even when many callers race: the slot stays locked while the factory
    /// runs. A service created while the context is running is started
    /// before it is published, so no caller ever sees a service whose start
    /// failed and a later call can retry.
    ///
    /// # Errors
    ///
    /// Returns the factory's error, or the service's start error.
    pub fn get_or_create_service<S, F>(&self, factory: F) -> AppResult<Arc<S>>
    where
        S: Service,
        F: FnOnce() -> AppResult<S>,
    {
        match self.services.entry(TypeId::of::<S>()) {
            Entry::Occupied(entry) => entry.get().any.clone().downcast::<S>().map_err(|_| {
                AppError::Internal(format!(
                    "service slot for {} holds a different type",
                    std::any::type_name::<S>()
                ))
            }),
            Entry::Vacant(entry) => {
                let service = Arc::new(factory()?);
                // A concurrent `start` blocks on this slot and starts the
                // service again once it is inserted.
                if self.is_started() {
                    service.start()?;
                }
                entry.insert(ServiceEntry {
                    any: service.clone(),
                    service: service.clone(),
                });

                tracing::debug!(
                    context = %self.name,
                    service = service.name(),
                    "Registered shared service"
                );
                Ok(service)
            }
        }
    }

    /// Start every registered service
    ///
    /// # Errors
    ///
    /// Returns the first service start error and leaves the context
    /// stopped, so a later call starts again. Services started before the
    /// failure keep running until [`RouteContext::stop`] or the next start.
    pub fn start(&self) -> AppResult<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        for service in self.service_handles() {
            tracing::info!(
                context = %self.name,
                service = service.name(),
                "Starting service"
            );
            if let Err(e) = service.start() {
                self.started.store(false, Ordering::Release);
                tracing::warn!(
                    context = %self.name,
                    service = service.name(),
                    error = %e,
                    "Service failed to start"
                );
                return Err(e);
            }
        }
        Ok(())
    }

    /// Stop every registered service
    ///
    /// Every service is asked to stop, even after a failed start or a failed
    /// stop of another service; the first error is returned. Returns once
    /// each service has released its resources.
    pub async fn stop(&self) -> AppResult<()> {
        self.started.store(false, Ordering::Release);

        let mut first_error = None;
        for service in self.service_handles() {
            tracing::info!(
                context = %self.name,
                service = service.name(),
                "Stopping service"
            );
            if let Err(e) = service.stop().await {
                tracing::warn!(
                    context = %self.name,
                    service = service.name(),
                    error = %e,
                    "Service failed to stop"
                );
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn service_handles(&self) -> Vec<Arc<dyn Service>> {
        self.services
            .iter()
            .map(|entry| entry.value().service.clone())
            .collect()
    }
}

impl std::fmt::Debug for RouteContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteContext")
            .field("name", &self.name)
            .field("management_name", &self.management_name)
            .field("services", &self.services.len())
            .field("started", &self.is_started())
            .finish()
    }
}
