use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use tokio::signal;
use tracing::{error, info};

use fundraiser_ledger as api;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = api::config::load_config().context("failed to load configuration")?;
    api::config::init_tracing(&cfg.log_level, cfg.log_json);
    api::handlers::health::init_start_time();

    // Init DB
    let db_pool = api::db::establish_connection_from_app_config(&cfg)
        .await
        .context("failed to connect to the database")?;
    if cfg.auto_migrate {
        api::db::run_migrations(&db_pool).await.map_err(|e| {
            error!("Failed running migrations: {}", e);
            e
        })?;
    }
    let db_arc = Arc::new(db_pool);

    // Init events
    let (event_sender, event_rx) = api::events::EventSender::channel(cfg.event_channel_capacity);
    tokio::spawn(api::events::process_events(event_rx));

    let rate_limiter = api::cashout_rate_limiter(&cfg)?;
    let app_state = api::AppState::new(db_arc.clone(), cfg.clone(), event_sender, rate_limiter);

    let configured = app_state.reconciler.configured_processors();
    if configured.is_empty() {
        error!("No processor webhook secrets configured; every webhook will be refused");
    } else {
        info!(processors = ?configured, "Webhook adapters configured");
    }

    if cfg.pending_sweep_interval_secs > 0 {
        tokio::spawn(api::services::ledger::run_pending_sweep(
            app_state.ledger.clone(),
            cfg.pending_max_age(),
            Duration::from_secs(cfg.pending_sweep_interval_secs),
        ));
        info!(
            every_secs = cfg.pending_sweep_interval_secs,
            max_age_secs = cfg.pending_max_age_secs,
            "Stale pending sweep scheduled"
        );
    }

    let app = api::app_router(app_state);

    let ip = cfg
        .host
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("invalid host '{}'", cfg.host))?;
    let addr = SocketAddr::new(ip, cfg.port);
    info!("fundraiser-ledger listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("failed to install Ctrl+C handler: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("failed to install SIGTERM handler: {}", err);
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
}
