//! Entry point: loads the harness config and every station template it
//! names, spawns the worker pool, and runs until a shutdown signal arrives.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info, warn};

use ocpp_station_sim::config::AppConfig;
use ocpp_station_sim::control::broadcast::ControlPlane;
use ocpp_station_sim::pool::worker::StationEvent;
use ocpp_station_sim::pool::{WorkerPool, WorkerPoolConfig};
use ocpp_station_sim::station::template::StationTemplate;
use ocpp_station_sim::support::shutdown::ShutdownCoordinator;

const SHUTDOWN_TIMEOUT_SECS: u64 = 30;

#[tokio::main]
async fn main() {
    let config_path = AppConfig::default_config_path();
    let app_cfg = match AppConfig::load(&config_path) {
        Ok(cfg) => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.log.level)),
                )
                .init();
            info!(path = %config_path.display(), "configuration loaded");
            cfg
        }
        Err(e) => {
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new("info"))
                .init();
            warn!(path = %config_path.display(), error = %e, "failed to load configuration, using defaults");
            AppConfig::default()
        }
    };

    info!("starting OCPP station fleet simulator");

    let templates = load_templates(&app_cfg).await;
    if templates.is_empty() {
        error!("no station templates loaded, exiting");
        return;
    }

    let shutdown = ShutdownCoordinator::new(SHUTDOWN_TIMEOUT_SECS);
    shutdown.start_signal_listener();

    let (plane, mut control_responses) = ControlPlane::new();
    let (events_tx, mut events_rx) = mpsc::unbounded_channel::<StationEvent>();

    tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            log_station_event(event);
        }
    });
    tokio::spawn(async move {
        while let Some(response) = control_responses.recv().await {
            info!(hash_id = response.hash_id, status = ?response.status, "control plane response");
        }
    });

    let pool_config = WorkerPoolConfig {
        process_type: app_cfg.worker.mode(),
        pool_min_size: app_cfg.worker.pool_min_size,
        pool_max_size: app_cfg.worker.pool_max_size,
        element_add_delay: std::time::Duration::from_millis(app_cfg.worker.element_add_delay),
        worker_start_delay: std::time::Duration::from_millis(app_cfg.worker.worker_start_delay),
        auto_reconnect_max_retries: app_cfg.auto_reconnect_max_retries,
        statistics_interval: std::time::Duration::from_secs(app_cfg.log.statistics_interval),
    };

    let station_count = app_cfg.effective_station_count();
    let pool = WorkerPool::spawn(
        &templates,
        station_count,
        app_cfg.charge_point_vendor.clone(),
        app_cfg.charge_point_model.clone(),
        pool_config,
        plane,
        events_tx,
    )
    .await;

    info!(station_count, "fleet running");

    let active_stations: Vec<String> = pool.workers().iter().map(|w| w.hash_id.clone()).collect();
    let completed = shutdown
        .shutdown_with_cleanup(&active_stations, || async {
            pool.stop_all();
            // Gives in-flight sends and connection teardowns a moment to
            // flush before the process exits.
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        })
        .await;

    if !completed {
        warn!("shutdown cleanup did not complete within the timeout");
    }
    info!("fleet simulator exiting");
}

async fn load_templates(app_cfg: &AppConfig) -> Vec<Arc<StationTemplate>> {
    let mut templates = Vec::with_capacity(app_cfg.station_template_urls.len());
    for path in &app_cfg.station_template_urls {
        match std::fs::read_to_string(path) {
            Ok(text) => match StationTemplate::parse(path, &text) {
                Ok(tpl) => templates.push(Arc::new(tpl)),
                Err(e) => error!(path, error = %e, "failed to parse station template"),
            },
            Err(e) => error!(path, error = %e, "failed to read station template"),
        }
    }
    templates
}

fn log_station_event(event: StationEvent) {
    match event {
        StationEvent::Added { hash_id, station_name } => {
            info!(hash_id, station_name, "station added");
        }
        StationEvent::Started { hash_id } => {
            info!(hash_id, "station connected");
        }
        StationEvent::Stopped { hash_id } => {
            info!(hash_id, "station stopped");
        }
        StationEvent::PerformanceStatistics { hash_id, payload } => {
            info!(hash_id, statistics = %payload, "performance statistics");
        }
        StationEvent::ElementError { hash_id, message } => {
            error!(hash_id, message, "station element error");
        }
    }
}
