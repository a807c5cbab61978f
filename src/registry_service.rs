//! Shared metrics registry service
//!
//! One [`RegistryService`] exists per [`RouteContext`](crate::context::RouteContext).
//! It owns the [`MetricRegistry`] every metrics policy in that context
//! records into and, when exposure is enabled, serves it over HTTP while the
//! context is running.

use crate::context::Service;
use crate::error::{AppError, AppResult};
use crate::handlers::{self, ManagementState};
use crate::metrics::MetricRegistry;
use crate::policy::MetricsPolicyConfig;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// How long open connections may delay a stop before the server is aborted
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Registry lifecycle service shared by the routes of one context
pub struct RegistryService {
    registry: Arc<MetricRegistry>,
    expose: bool,
    address: SocketAddr,
    server: Mutex<Option<ManagementServer>>,
}

struct ManagementServer {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl RegistryService {
    /// Build the service from the settings of the policy that creates it
    ///
    /// Uses the configured registry if one is given, otherwise creates a
    /// registry under the configured namespace.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if a registry must be created and the
    /// namespace is blank.
    pub fn new(config: &MetricsPolicyConfig) -> AppResult<Self> {
        let registry = match &config.registry {
            Some(registry) => registry.clone(),
            None => Arc::new(MetricRegistry::new(&config.management_namespace)?),
        };

        Ok(Self {
            registry,
            expose: config.expose_via_management,
            address: config.management_address,
            server: Mutex::new(None),
        })
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Whether the registry is published on the management interface
    pub fn is_exposed(&self) -> bool {
        self.expose
    }

    /// Namespace the registry exports under
    pub fn namespace(&self) -> &str {
        self.registry.namespace()
    }

    /// Configured bind address of the management interface
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Address the management interface actually listens on, while running
    ///
    /// Differs from [`RegistryService::address`] when port 0 was configured.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.lock().as_ref().map(|s| s.local_addr)
    }

    pub fn is_running(&self) -> bool {
        self.server
            .lock()
            .as_ref()
            .is_some_and(|s| !s.task.is_finished())
    }

    /// Render every aggregate in the registry as JSON
    ///
    /// # Errors
    ///
    /// Returns `AppError::Internal` if serialization fails.
    pub fn dump_statistics_as_json(&self, pretty: bool) -> AppResult<String> {
        let snapshot = self.registry.snapshot();
        let rendered = if pretty {
            serde_json::to_string_pretty(&snapshot)
        } else {
            serde_json::to_string(&snapshot)
        };
        rendered.map_err(|e| AppError::Internal(format!("failed to serialize statistics: {}", e)))
    }

    fn spawn_server(&self) -> AppResult<ManagementServer> {
        let runtime = Handle::try_current().map_err(|e| AppError::ServiceStart {
            service: self.name(),
            reason: format!("management interface needs a tokio runtime: {}", e),
        })?;

        let bind_error = |source: std::io::Error| AppError::ManagementBind {
            address: self.address,
            source,
        };
        let listener = std::net::TcpListener::bind(self.address).map_err(bind_error)?;
        listener.set_nonblocking(true).map_err(bind_error)?;
        let local_addr = listener.local_addr().map_err(bind_error)?;

        let _guard = runtime.enter();
        let listener = tokio::net::TcpListener::from_std(listener).map_err(bind_error)?;

        let app = handlers::router(ManagementState::new(self.registry.clone()));
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();

        let task = runtime.spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                tracing::error!(error = %e, "Management interface stopped with an error");
            }
        });

        Ok(ManagementServer {
            local_addr,
            shutdown,
            task,
        })
    }
}

#[async_trait]
impl Service for RegistryService {
    fn name(&self) -> &'static str {
        "metrics-registry"
    }

    fn start(&self) -> AppResult<()> {
        if !self.expose {
            tracing::debug!(
                namespace = %self.namespace(),
                "Metrics registry not exposed via management"
            );
            return Ok(());
        }

        let mut server = self.server.lock();
        if server.is_some() {
            return Ok(());
        }

        let started = self.spawn_server()?;
        tracing::info!(
            address = %started.local_addr,
            namespace = %self.namespace(),
            "Metrics available at http://{}/metrics",
            started.local_addr
        );
        *server = Some(started);
        Ok(())
    }

    async fn stop(&self) -> AppResult<()> {
        let server = self.server.lock().take();
        let Some(server) = server else {
            return Ok(());
        };

        // The receiver is gone if the server already exited on its own.
        let _ = server.shutdown.send(());
        tracing::info!(address = %server.local_addr, "Management interface stopping");

        // The listener lives in the server task; the port is free once it ends.
        let mut task = server.task;
        let joined = match tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::warn!(
                    address = %server.local_addr,
                    grace_secs = SHUTDOWN_GRACE.as_secs(),
                    "Management interface did not drain in time, aborting"
                );
                task.abort();
                task.await
            }
        };
        if let Some(e) = joined.err().filter(|e| e.is_panic()) {
            tracing::error!(error = %e, "Management interface task panicked");
        }

        tracing::info!(address = %server.local_addr, "Management interface stopped");
        Ok(())
    }
}

impl std::fmt::Debug for RegistryService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryService")
            .field("namespace", &self.namespace())
            .field("expose", &self.expose)
            .field("address", &self.address)
            .field("local_addr", &self.local_addr())
            .finish()
    }
}
