use std::sync::Arc;

use log::info;
use wager_server_api::{JwtIdentityResolver, TransportServiceImpl, TransportSettings};
use wager_server_domain::{
    app::{LazyAppState, construct_app},
    config::GameConfig,
    settlement::LogSettlementSink,
};

mod logs;

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to install Ctrl+C handler: {}", e);
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
                log::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received. Preparing graceful exit...");
}

#[tokio::main]
async fn main() {
    // .env is optional; the process environment wins either way.
    let _ = dotenvy::dotenv();

    if let Err(e) = logs::init_logger() {
        eprintln!("{}", e);
        return;
    }

    let config = GameConfig::from_env();
    let settings = TransportSettings::from_env();

    let lazy_app_state = LazyAppState::new();
    let transport_service_impl = TransportServiceImpl::new(
        lazy_app_state.clone(),
        Arc::new(Box::new(JwtIdentityResolver::from_env())),
    );

    let _app = construct_app(
        lazy_app_state,
        Arc::new(Box::new(transport_service_impl.clone())),
        Arc::new(Box::new(LogSettlementSink)),
        config,
    );

    info!("Starting application");

    let transport_app = tokio::spawn(async move {
        transport_service_impl
            .run(settings, shutdown_signal())
            .await;
    });

    if let Err(e) = transport_app.await {
        log::error!("Transport service task failed: {}", e);
    }
}
