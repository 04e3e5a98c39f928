use crate::config::Settings;
use crate::infrastructure::{AuditStore, DualWriteAuditLog, SqliteAuditStore, TinybirdSink};
use crate::proxy::{GatewayService, ProxyConfig};
use crate::Result;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, instrument, warn};

/// Main application struct that coordinates all components
pub struct Application {
    settings: Settings,
    audit_log: Arc<DualWriteAuditLog>,
    service: GatewayService,
}

impl Application {
    /// Open the audit backends and build the router state
    #[instrument(skip(settings))]
    pub async fn from_settings(settings: Settings) -> Result<Self> {
        let proxy_config = ProxyConfig::from_settings(&settings.upstream)?;

        info!(path = %settings.database.path.display(), "Opening audit database");
        let store = SqliteAuditStore::open(&settings.database).await?;

        let mut audit_log = DualWriteAuditLog::new(Arc::new(store));
        if let Some(token) = settings.telemetry.token() {
            let sink = TinybirdSink::new(&settings.telemetry, token)?;
            info!(base_url = sink.base_url(), "Telemetry sink enabled");
            audit_log = audit_log.with_secondary(Arc::new(sink));
        }
        let audit_log = Arc::new(audit_log);

        let service = GatewayService::new(Arc::clone(&audit_log), &proxy_config)?;
        if let Some(upstream) = &proxy_config.upstream {
            info!(upstream = %upstream, "Forwarding JSON-RPC calls");
        }

        Ok(Self {
            settings,
            audit_log,
            service,
        })
    }

    /// Bind the configured address and serve until SIGINT or SIGTERM
    #[instrument(skip(self))]
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(self.settings.bind_address()).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves
    ///
    /// In-flight calls are allowed to finish; the audit log is closed after
    /// the server stops.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let address = listener.local_addr()?;
        info!(%address, "Starting audit gateway");
        if !self.service.has_upstream() {
            warn!("No upstream configured; every JSON-RPC call will be answered with 503");
        }

        let router = self.service.into_router();
        let served = axum::serve(
            listener,
            router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await;

        self.audit_log.close().await;
        info!("Audit gateway stopped");

        served.map_err(Into::into)
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn audit_log(&self) -> Arc<DualWriteAuditLog> {
        Arc::clone(&self.audit_log)
    }
}

async fn shutdown_signal() {
    let terminate = terminate_signal();
    let interrupt = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = interrupt => info!("Interrupt received, shutting down"),
        () = terminate => info!("Terminate signal received, shutting down"),
    }
}

/// Resolves on SIGTERM; the handler is installed when this is called, not when polled
#[cfg(unix)]
fn terminate_signal() -> impl Future<Output = ()> {
    use tokio::signal::unix::{signal, SignalKind};

    let registered = signal(SignalKind::terminate());
    async move {
        match registered {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
fn terminate_signal() -> impl Future<Output = ()> {
    std::future::pending()
}
