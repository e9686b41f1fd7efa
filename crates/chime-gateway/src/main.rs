use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;

mod app;
mod http;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "chime_gateway=info,chime_scheduler=info,tower_http=debug".into()),
        )
        .init();

    // load config: explicit path via CHIME_CONFIG > ./chime.toml > defaults
    let config_path = std::env::var("CHIME_CONFIG").ok();
    let config =
        chime_core::config::ChimeConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
            tracing::warn!("Config load failed ({}), using defaults", e);
            chime_core::config::ChimeConfig::default()
        });

    let db_path = &config.database.path;
    info!(path = %db_path, "opening SQLite database");
    let conn = chime_scheduler::db::open_db(db_path)?;
    chime_scheduler::db::init_db(&conn)?;

    // Separate connections: ingress writes must not contend with the firing
    // transaction for the same handle.
    let store = chime_scheduler::ReminderStore::new(conn);
    let fire_store = chime_scheduler::ReminderStore::new(chime_scheduler::db::open_db(db_path)?);

    let clock: Arc<dyn chime_scheduler::Clock> = Arc::new(chime_scheduler::SystemClock);
    let callback: chime_scheduler::ReminderCallback = Arc::new(|reminder| {
        info!(
            key = %reminder.key(),
            execution_time = reminder.execution_time,
            "reminder executed"
        );
    });

    let reminders = chime_scheduler::ReminderService::new(store, fire_store, clock, callback);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    reminders.start(config.scheduler.clone(), shutdown_rx);

    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState::new(config, reminders));
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("chime gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // signal poller and processor to stop
    let _ = shutdown_tx.send(true);
    info!("shutting down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {e}");
    }
}
