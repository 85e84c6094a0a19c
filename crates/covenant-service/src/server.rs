//! Server setup and lifecycle management

use std::time::Duration;

use crate::api::create_router;
use crate::config::CovenantConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::state::AppState;
use covenant_learning::TuningScheduler;
use tokio::net::TcpListener;
use tokio::sync::watch;

/// How often expired confidence declarations are dropped.
pub const DECLARATION_PURGE_PERIOD: Duration = Duration::from_secs(60);

/// Covenant daemon server
pub struct Server {
    config: CovenantConfig,
    state: AppState,
}

impl Server {
    /// Bootstrap storage and the pipeline from `config`
    pub async fn new(config: CovenantConfig) -> ServiceResult<Self> {
        let state = AppState::bootstrap(&config).await?;
        Ok(Self { config, state })
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Serve until ctrl-c or SIGTERM
    pub async fn run(self) -> ServiceResult<()> {
        let addr = self.config.server.listen_addr;
        let app = create_router(self.state.clone());
        let listener = TcpListener::bind(addr).await?;

        tracing::info!(%addr, "Covenant daemon listening");

        let scheduler = if self.config.tuner.enabled {
            let period = Duration::from_secs(self.config.tuner.interval_secs.max(1));
            let (scheduler, trigger_rx) = TuningScheduler::new(self.state.tuner.clone(), period);
            tokio::spawn(scheduler.clone().start(trigger_rx));
            tracing::info!(interval_secs = period.as_secs(), "Tuning schedule started");
            Some(scheduler)
        } else {
            tracing::info!("Tuning schedule disabled");
            None
        };

        let (purge_stop, purge_rx) = watch::channel(false);
        let purge = tokio::spawn(
            self.state
                .gatekeeper
                .confidence()
                .clone()
                .run_purge(DECLARATION_PURGE_PERIOD, purge_rx),
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| ServiceError::Server(e.to_string()))?;

        tracing::info!("Covenant daemon shutting down");

        if let Some(scheduler) = scheduler {
            scheduler.stop();
        }
        let _ = purge_stop.send(true);
        if let Err(e) = purge.await {
            tracing::warn!(error = %e, "Declaration purge task ended abnormally");
        }

        Ok(())
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal, initiating graceful shutdown");
        }
    }
}
