//! Worker pool harness (spec.md §4.J): turns a station count plus a set of
//! templates into running stations, throttling how many connection
//! attempts are in flight at once per `worker.poolMinSize`/`poolMaxSize`.

pub mod worker;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Semaphore};
use tracing::info;

use crate::control::broadcast::ControlPlane;
use crate::station::template::StationTemplate;
use worker::{StationEvent, StationWorker};

/// `worker.processType` (spec.md §6). Async Rust has no per-worker OS
/// thread/process to size, so both pool modes bound the same thing here:
/// how many stations may be mid-construction (connecting for the first
/// time) concurrently. `StaticPool` always runs at `poolMaxSize`;
/// `DynamicPool` is a documented simplification of the same bound (see
/// DESIGN.md) since this harness has no backpressure signal to scale down
/// against once every station is a long-lived background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerMode {
    None,
    DynamicPool,
    StaticPool,
}

impl WorkerMode {
    pub fn parse(s: &str) -> Self {
        match s {
            "dynamicPool" => Self::DynamicPool,
            "staticPool" => Self::StaticPool,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub process_type: WorkerMode,
    pub pool_min_size: usize,
    pub pool_max_size: usize,
    pub element_add_delay: Duration,
    pub worker_start_delay: Duration,
    pub auto_reconnect_max_retries: i64,
    pub statistics_interval: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            process_type: WorkerMode::None,
            pool_min_size: 1,
            pool_max_size: 1,
            element_add_delay: Duration::ZERO,
            worker_start_delay: Duration::ZERO,
            auto_reconnect_max_retries: worker::DEFAULT_AUTO_RECONNECT_MAX_RETRIES,
            statistics_interval: Duration::ZERO,
        }
    }
}

/// The running fleet: every spawned [`StationWorker`] plus the shared
/// shutdown switch that tears all of them down together.
pub struct WorkerPool {
    shutdown_tx: watch::Sender<bool>,
    workers: Vec<StationWorker>,
}

impl WorkerPool {
    /// Spawns `station_count` stations, assigning `templates` round-robin
    /// (spec.md §4.J). `plane`/`events` are shared across every station so
    /// the control plane and lifecycle reporting are fleet-wide.
    pub async fn spawn(
        templates: &[Arc<StationTemplate>],
        station_count: usize,
        vendor: String,
        model: String,
        config: WorkerPoolConfig,
        plane: ControlPlane,
        events: mpsc::UnboundedSender<StationEvent>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        if config.worker_start_delay > Duration::ZERO {
            tokio::time::sleep(config.worker_start_delay).await;
        }

        if templates.is_empty() {
            return Self {
                shutdown_tx,
                workers: Vec::new(),
            };
        }

        let concurrency = match config.process_type {
            WorkerMode::None => station_count.max(1),
            WorkerMode::StaticPool | WorkerMode::DynamicPool => config.pool_max_size.max(config.pool_min_size).max(1),
        };
        let semaphore = Arc::new(Semaphore::new(concurrency));

        let mut workers = Vec::with_capacity(station_count);
        for i in 0..station_count {
            let template = templates[i % templates.len()].clone();
            let permit = semaphore.clone().acquire_owned().await.expect("pool semaphore never closes");
            let worker = StationWorker::spawn(
                template,
                i as u32,
                vendor.clone(),
                model.clone(),
                config.auto_reconnect_max_retries,
                plane.clone(),
                events.clone(),
                config.statistics_interval,
                shutdown_rx.clone(),
            )
            .await;
            drop(permit);
            workers.push(worker);

            if config.element_add_delay > Duration::ZERO {
                tokio::time::sleep(config.element_add_delay).await;
            }
        }

        info!(count = workers.len(), "worker pool fully spawned");
        Self { shutdown_tx, workers }
    }

    /// Signals every station's connection pump, ATG, and control listener
    /// to stop (graceful shutdown, spec.md §4.C).
    pub fn stop_all(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn workers(&self) -> &[StationWorker] {
        &self.workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_process_type() {
        assert_eq!(WorkerMode::parse("staticPool"), WorkerMode::StaticPool);
        assert_eq!(WorkerMode::parse("dynamicPool"), WorkerMode::DynamicPool);
        assert_eq!(WorkerMode::parse("anything-else"), WorkerMode::None);
    }

    #[tokio::test]
    async fn spawn_with_no_templates_yields_empty_pool() {
        let (plane, _rx) = ControlPlane::new();
        let (events_tx, _events_rx) = mpsc::unbounded_channel();
        let pool = WorkerPool::spawn(&[], 5, "Acme".into(), "X1".into(), WorkerPoolConfig::default(), plane, events_tx).await;
        assert!(pool.workers().is_empty());
    }
}
