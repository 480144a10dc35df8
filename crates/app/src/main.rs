//! Service entry point.

use app::{AppError, Config, Services, telemetry};
use tokio::signal;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

async fn run(config: &Config) -> Result<(), AppError> {
    telemetry::install_metrics(config.metrics_addr)?;

    let services = Services::build(config).await?;
    tracing::info!(
        service = %config.service,
        components = ?services.names(),
        "starting service"
    );

    if let Err(err) = services.start().await {
        // Release whatever did start before reporting the failure.
        let _ = services.shutdown().await;
        return Err(err);
    }

    shutdown_signal().await;
    services.shutdown().await?;
    tracing::info!("service shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    telemetry::init_tracing(&config);

    if let Err(err) = run(&config).await {
        tracing::error!(service = %config.service, error = %err, "service failed");
        return Err(err.into());
    }
    Ok(())
}
