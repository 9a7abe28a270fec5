//! Per-station wiring (spec.md §4.J): builds one station's connection,
//! correlator, runtime, ATG tasks, and control-plane listener, then runs
//! them concurrently until the pool's shutdown signal fires.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::info;

use crate::atg::generator::AtgTask;
use crate::auth::strategy::{AuthPipeline, OfflinePolicy, RemoteAuthorizer};
use crate::auth::unified::{AuthDecision, AuthStatus};
use crate::connection::manager::ConnectionManager;
use crate::control::broadcast::{run_listener, ControlPlane, StationControlHandle};
use crate::ocpp16::Binding16;
use crate::ocpp201::Binding201;
use crate::protocol::correlator::{spawn_reaper, Correlator, RequestOptions};
use crate::protocol::dispatch::OcppBinding;
use crate::protocol::version::OcppVersion;
use crate::stats::performance::PerformanceSink;
use crate::station::info::StationInfo;
use crate::station::runtime::{StationRuntime, StationSignal};
use crate::station::template::StationTemplate;
use crate::tags::cache::TagCache;

const REAPER_PERIOD: Duration = Duration::from_secs(5);

/// Default `autoReconnectMaxRetries` (spec.md §6): -1 means unlimited.
pub const DEFAULT_AUTO_RECONNECT_MAX_RETRIES: i64 = -1;

/// Lifecycle events posted back to whatever is driving the fleet (spec.md
/// §4.J): a UI server, a test harness, or simply `main`'s own logging.
#[derive(Debug, Clone)]
pub enum StationEvent {
    Added { hash_id: String, station_name: String },
    Started { hash_id: String },
    Stopped { hash_id: String },
    PerformanceStatistics { hash_id: String, payload: Value },
    ElementError { hash_id: String, message: String },
}

/// Remote-authorization strategy that round-trips through the station's
/// own correlator/binding, used when a template sets `remoteAuthorization`
/// (spec.md §4.G).
struct CorrelatorRemoteAuthorizer {
    binding: Arc<dyn OcppBinding>,
    correlator: Arc<Correlator>,
}

#[async_trait::async_trait]
impl RemoteAuthorizer for CorrelatorRemoteAuthorizer {
    async fn authorize_remote(&self, identifier: &str) -> AuthDecision {
        let (action, payload) = self.binding.authorize(identifier);
        match self.correlator.send_request(action, payload, RequestOptions::default()).await {
            Ok(response) => {
                let status = response
                    .get("idTagInfo")
                    .and_then(|v| v.get("status"))
                    .and_then(Value::as_str)
                    .unwrap_or("Invalid");
                match status {
                    "Accepted" => AuthDecision::accepted(),
                    "Blocked" => AuthDecision {
                        status: AuthStatus::Blocked,
                        is_offline: false,
                        parent_id: None,
                        additional_info: None,
                    },
                    "Expired" => AuthDecision {
                        status: AuthStatus::Expired,
                        is_offline: false,
                        parent_id: None,
                        additional_info: None,
                    },
                    _ => AuthDecision::invalid("remote authorize rejected identifier"),
                }
            }
            Err(err) => AuthDecision::invalid(err.to_string()),
        }
    }
}

/// Everything needed to run one station to completion: spawned as a set of
/// cooperating tasks under a single `tokio::select!`-driven supervisor.
pub struct StationWorker {
    pub hash_id: String,
    pub station_name: String,
    control_handle: StationControlHandle,
}

impl StationWorker {
    /// Builds and starts one station (spec.md §4.J element construction):
    /// connection manager, correlator + reaper, the binding for the
    /// template's `ocppVersion`, the auth pipeline, the message-loop
    /// runtime, a heartbeat ticker, a ping-interval mirror, one ATG task
    /// per enabled connector, and a control-plane listener. Returns once
    /// everything is spawned; the station keeps running on its own tasks.
    pub async fn spawn(
        template: Arc<StationTemplate>,
        instance_index: u32,
        vendor: String,
        model: String,
        auto_reconnect_max_retries: i64,
        plane: ControlPlane,
        events: mpsc::UnboundedSender<StationEvent>,
        statistics_interval: Duration,
        mut pool_shutdown: watch::Receiver<bool>,
    ) -> Self {
        let info = StationInfo::from_template_and_prior(&template, instance_index, vendor, model, None);
        let hash_id = info.hash_id.clone();
        let station_name = info.station_name.clone();
        let _ = events.send(StationEvent::Added {
            hash_id: hash_id.clone(),
            station_name: station_name.clone(),
        });

        let url = template.supervision_url(instance_index).to_string();
        let connection = ConnectionManager::new(auto_reconnect_max_retries, url);
        let correlator = Arc::new(Correlator::new(connection.clone()));
        spawn_reaper(correlator.clone(), REAPER_PERIOD);

        let binding: Arc<dyn OcppBinding> = match template.ocpp_version {
            OcppVersion::V16 => Arc::new(Binding16::new()),
            OcppVersion::V201 => Arc::new(Binding201::new()),
        };

        let tag_cache = Arc::new(TagCache::new());
        let remote: Option<Arc<dyn RemoteAuthorizer>> = if template.remote_authorization {
            Some(Arc::new(CorrelatorRemoteAuthorizer {
                binding: binding.clone(),
                correlator: correlator.clone(),
            }))
        } else {
            None
        };
        let auth = Arc::new(AuthPipeline::new(
            tag_cache.clone(),
            template.id_tags_file.clone(),
            template.id_tags_file.is_some(),
            remote,
            OfflinePolicy::default(),
        ));
        let stats = Arc::new(PerformanceSink::new());

        let mut runtime = StationRuntime::new(
            (*template).clone(),
            info.clone(),
            binding.clone(),
            correlator.clone(),
            tag_cache.clone(),
            auth,
            stats.clone(),
        );
        let signal_tx = runtime.signal_sender();
        let heartbeat_interval = runtime.heartbeat_interval_handle();
        let ping_interval = runtime.ping_interval_handle();

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (connection_enabled_tx, connection_enabled_rx) = watch::channel(true);
        let (atg_enabled_tx, atg_enabled_rx) = watch::channel(template.atg_policy.enable);

        tokio::spawn(async move {
            runtime.run(inbound_rx).await;
        });

        tokio::spawn(connection_pump(
            connection.clone(),
            template.ocpp_version,
            inbound_tx,
            signal_tx.clone(),
            events.clone(),
            hash_id.clone(),
            connection_enabled_rx,
        ));

        tokio::spawn(heartbeat_ticker(binding.clone(), correlator.clone(), stats.clone(), heartbeat_interval));
        tokio::spawn(ping_mirror(connection.clone(), ping_interval));

        if statistics_interval > Duration::ZERO {
            tokio::spawn(performance_ticker(stats.clone(), events.clone(), hash_id.clone(), statistics_interval));
        }

        // ATG tasks are always spawned, parked by the `stop` watch when the
        // template disables ATG, so a later `StartATG` command can still
        // activate them (spec.md §4.K).
        let info_arc = Arc::new(info);
        for connector_id in 1..=template.total_connectors() {
            let (stop_tx, stop_rx) = watch::channel(!*atg_enabled_rx.borrow());
            tokio::spawn(forward_inverted(atg_enabled_rx.clone(), stop_tx));
            let task = AtgTask {
                connector_id,
                policy: template.atg_policy.clone(),
                tag_cache: tag_cache.clone(),
                id_tags_file: template.id_tags_file.clone(),
                id_tag_distribution: template.id_tag_distribution,
                info: info_arc.clone(),
                binding: binding.clone(),
                correlator: correlator.clone(),
                signal_tx: signal_tx.clone(),
            };
            tokio::spawn(task.run(stop_rx));
        }

        let control_handle = StationControlHandle {
            hash_id: hash_id.clone(),
            correlator,
            connection,
            connection_enabled: connection_enabled_tx,
            atg_enabled: atg_enabled_tx,
        };
        tokio::spawn(run_listener(plane, control_handle.clone()));

        tokio::spawn({
            let hash_id = hash_id.clone();
            let events = events.clone();
            async move {
                let _ = pool_shutdown.changed().await;
                let _ = events.send(StationEvent::Stopped { hash_id });
            }
        });

        info!(hash_id, station_name, "station worker spawned");

        Self {
            hash_id,
            station_name,
            control_handle,
        }
    }

    pub fn control_handle(&self) -> &StationControlHandle {
        &self.control_handle
    }
}

/// Translates `connection_enabled` transitions into successive
/// `ConnectionManager::run` calls: parked while disabled, torn down and
/// re-parked when disabled mid-connection (`StopStation`/`CloseConnection`,
/// spec.md §4.K).
async fn connection_pump(
    connection: Arc<ConnectionManager>,
    version: OcppVersion,
    inbound_tx: mpsc::UnboundedSender<String>,
    signal_tx: mpsc::UnboundedSender<StationSignal>,
    events: mpsc::UnboundedSender<StationEvent>,
    hash_id: String,
    mut enabled_rx: watch::Receiver<bool>,
) {
    loop {
        if !*enabled_rx.borrow_and_update() {
            if enabled_rx.changed().await.is_err() {
                return;
            }
            continue;
        }

        let (close_tx, close_rx) = watch::channel(false);
        let on_open_signal_tx = signal_tx.clone();
        let on_open_events = events.clone();
        let on_open_hash_id = hash_id.clone();
        let run_fut = connection.clone().run(
            version,
            inbound_tx.clone(),
            move || {
                let _ = on_open_signal_tx.send(StationSignal::ConnectionOpened);
                let _ = on_open_events.send(StationEvent::Started {
                    hash_id: on_open_hash_id.clone(),
                });
            },
            close_rx,
        );
        tokio::pin!(run_fut);

        tokio::select! {
            _ = &mut run_fut => {}
            result = enabled_rx.changed() => {
                let _ = close_tx.send(true);
                run_fut.await;
                if result.is_err() {
                    return;
                }
            }
        }
    }
}

/// Mirrors `atg_enabled` (true = running) into an [`AtgTask`] `stop`
/// receiver (true = stopped) — the two call sites use opposite polarity
/// for the more natural reading at each one.
async fn forward_inverted(mut enabled_rx: watch::Receiver<bool>, stop_tx: watch::Sender<bool>) {
    loop {
        let stopped = !*enabled_rx.borrow();
        if stop_tx.send(stopped).is_err() {
            return;
        }
        if enabled_rx.changed().await.is_err() {
            return;
        }
    }
}

async fn heartbeat_ticker(
    binding: Arc<dyn OcppBinding>,
    correlator: Arc<Correlator>,
    stats: Arc<PerformanceSink>,
    interval: Arc<AtomicU64>,
) {
    loop {
        let ms = interval.load(Ordering::Relaxed);
        if ms == 0 {
            tokio::time::sleep(Duration::from_secs(1)).await;
            continue;
        }
        tokio::time::sleep(Duration::from_millis(ms)).await;
        if interval.load(Ordering::Relaxed) == 0 {
            continue;
        }
        let (action, payload) = binding.heartbeat();
        let started = std::time::Instant::now();
        let result = correlator.send_request(action, payload, RequestOptions::default()).await;
        stats.record(action, started.elapsed(), result.is_ok());
    }
}

async fn ping_mirror(connection: Arc<ConnectionManager>, interval: Arc<AtomicU64>) {
    let mut last = u64::MAX;
    loop {
        let secs = interval.load(Ordering::Relaxed);
        if secs != last {
            connection.set_ping_interval_secs(secs.min(u8::MAX as u64) as u8);
            last = secs;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

async fn performance_ticker(
    stats: Arc<PerformanceSink>,
    events: mpsc::UnboundedSender<StationEvent>,
    hash_id: String,
    interval: Duration,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let snapshot = stats.snapshot();
        let payload = serde_json::to_value(
            snapshot
                .iter()
                .map(|(action, s)| (action.clone(), serde_json::json!({"count": s.count, "errors": s.errors})))
                .collect::<std::collections::HashMap<_, _>>(),
        )
        .unwrap_or(Value::Null);
        if events
            .send(StationEvent::PerformanceStatistics {
                hash_id: hash_id.clone(),
                payload,
            })
            .is_err()
        {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_retries_is_unlimited() {
        assert_eq!(DEFAULT_AUTO_RECONNECT_MAX_RETRIES, -1);
    }
}
