use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use service_core::middleware::rate_limit::create_ip_rate_limiter;
use service_core::observability::logging::init_tracing;
use tokio::signal;

use twofactor_service::config::TwoFactorConfig;
use twofactor_service::services::{
    HttpSmsProvider, PostgresStore, SecretCipher, SystemClock, TracingAuditSink, TwoFactorEngine,
    TwoFactorStore,
};
use twofactor_service::{build_router, db, AppState};

#[tokio::main]
async fn main() -> Result<(), service_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = TwoFactorConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting two-factor service"
    );

    let pool = db::create_pool(&config.database).await.map_err(|e| {
        service_core::error::AppError::DatabaseError(anyhow::anyhow!(
            "Failed to connect to PostgreSQL: {}",
            e
        ))
    })?;
    db::run_migrations(&pool).await.map_err(|e| {
        service_core::error::AppError::DatabaseError(anyhow::anyhow!("Migrations failed: {}", e))
    })?;

    let store: Arc<dyn TwoFactorStore> = Arc::new(PostgresStore::new(pool));
    let sms = Arc::new(HttpSmsProvider::new(&config.sms)?);
    let cipher = SecretCipher::new(&config.security.master_key)?;

    let engine = Arc::new(TwoFactorEngine::new(
        store.clone(),
        sms,
        Arc::new(TracingAuditSink),
        Arc::new(SystemClock),
        cipher,
        config.engine_policy(),
    ));
    tracing::info!("Two-factor engine initialized");

    let state = AppState {
        config: config.clone(),
        store,
        engine: engine.clone(),
        verify_rate_limiter: create_ip_rate_limiter(
            config.rate_limit.verify_attempts,
            config.rate_limit.verify_window_seconds,
        ),
        sms_rate_limiter: create_ip_rate_limiter(
            config.rate_limit.sms_send_attempts,
            config.rate_limit.sms_send_window_seconds,
        ),
        ip_rate_limiter: create_ip_rate_limiter(
            config.rate_limit.global_ip_limit,
            config.rate_limit.global_ip_window_seconds,
        ),
    };

    // Periodic housekeeping: expired sessions and stale attempt rows.
    let sweep_engine = engine.clone();
    let sweep_interval = Duration::from_secs(config.policy.cleanup_interval_seconds.max(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if let Err(e) = sweep_engine.cleanup_expired().await {
                tracing::error!(error = %e, "Housekeeping sweep failed");
            }
        }
    });

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
