use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use stagegate::config::ServerConfig;
use stagegate::domain::DomainConfig;
use stagegate::engine::Scheduler;
use stagegate::http::{self, AppState};
use stagegate::notify::HttpNotifier;
use stagegate::orchestrator::{HttpOrchestrator, Orchestrator};
use stagegate::planner::NaivePlanner;
use stagegate::reconcile::run_reconciler;
use stagegate::send_home::OccupancyPolicy;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env();
    stagegate::observability::init(config.metrics_port)?;

    let domain = match &config.domain_file {
        Some(path) => DomainConfig::from_json_file(path)?,
        None => DomainConfig::healthcare(),
    };

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let notifier = Arc::new(HttpNotifier::new(config.callback_timeout)?);
    let scheduler = Arc::new(Scheduler::new(
        config.wal_path(),
        domain,
        config.scheduler_settings(),
        notifier,
        Arc::new(OccupancyPolicy::healthcare()),
    )?);

    let orchestrator = match &config.orchestrator_url {
        Some(url) => Some(Arc::new(HttpOrchestrator::new(
            url.clone(),
            config.process_url.clone(),
            config.callback_timeout,
        )?) as Arc<dyn Orchestrator>),
        None => None,
    };

    let state = Arc::new(AppState {
        scheduler: scheduler.clone(),
        planner: Arc::new(NaivePlanner),
        orchestrator,
        horizon: config.horizon,
    });

    let reconciler = tokio::spawn(run_reconciler(scheduler.clone(), config.reconcile_every));

    let addr = config.listen_addr();
    let listener = TcpListener::bind(&addr).await?;
    let status = scheduler.status().await;
    info!("stagegate listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  reconcile every: {:?}", config.reconcile_every);
    info!("  bookings replayed: {}", status.bookings);
    info!(
        "  replan: {}",
        config.orchestrator_url.as_deref().unwrap_or("disabled")
    );
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, http::router(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    reconciler.abort();
    info!("stagegate stopped");
    Ok(())
}

/// Resolve on SIGTERM or ctrl-c.
async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!("failed to register SIGTERM handler: {e}");
                ctrl_c.await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
    }
    info!("shutdown signal received, draining in-flight requests");
}
