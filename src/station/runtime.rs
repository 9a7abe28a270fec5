//! Station state machine: boot sequence, heartbeat scheduler, connector
//! status, and the message loop that owns all mutable station state
//! (spec.md §4.D, §5 "all mutations ... happen in one logical thread of
//! control").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::auth::strategy::AuthPipeline;
use crate::ocpp201::variables::registry::VariableRegistry;
use crate::profiles::evaluator;
use crate::protocol::correlator::{Correlator, RequestOptions};
use crate::protocol::dispatch::OcppBinding;
use crate::protocol::frame::OcppFrame;
use crate::stats::performance::PerformanceSink;
use crate::station::config_store::ConfigurationStore;
use crate::station::connector::{Connector, ConnectorStatus, Evse};
use crate::station::info::StationInfo;
use crate::station::meter;
use crate::station::template::StationTemplate;
use crate::tags::cache::TagCache;

/// Internally-scheduled follow-up work, produced by incoming-CALL
/// handlers that must reply synchronously but act later (RemoteStart's
/// plugin delay, Reset's stop/sleep/start sequence — spec.md §4.E).
#[derive(Debug, Clone)]
pub enum StationSignal {
    ScheduledStartTransaction { connector_id: u32, id_tag: String },
    ScheduledStopTransaction { connector_id: u32, reason: String },
    Reset { reason: String, delay_secs: u64 },
    RestartHeartbeat { interval_ms: u64 },
    RestartPing { interval_secs: u64 },
    /// Posted by the connection manager's `on_open` callback after each
    /// successful (re)connect; drives the boot sequence (spec.md §4.D).
    ConnectionOpened,
}

/// Everything an incoming-CALL handler needs besides `&mut StationState`.
pub struct IncomingDeps<'a> {
    pub template: &'a StationTemplate,
    pub info: &'a StationInfo,
    pub tag_cache: Option<&'a Arc<TagCache>>,
    pub auth: &'a AuthPipeline,
    pub signal_tx: mpsc::UnboundedSender<StationSignal>,
}

impl<'a> IncomingDeps<'a> {
    #[cfg(test)]
    pub fn test_fixture(template: &'a StationTemplate) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        std::mem::forget(rx);
        Self {
            template,
            info: Box::leak(Box::new(StationInfo::from_template_and_prior(
                template,
                0,
                "Acme".into(),
                "X1".into(),
                None,
            ))),
            tag_cache: None,
            auth: Box::leak(Box::new(AuthPipeline::new_offline_only())),
            signal_tx: tx,
        }
    }
}

/// All station data mutated by the message loop: connectors, EVSEs,
/// configuration, and (for 2.0.1) the variable registry (spec.md §3, §5).
pub struct StationState {
    pub connectors: HashMap<u32, Connector>,
    pub evses: HashMap<u32, Evse>,
    pub config_store: ConfigurationStore,
    pub variables: Option<VariableRegistry>,
    pub heartbeat_interval_ms: u64,
    pub ping_interval_secs: u64,
    pub registered: bool,
    pub power_divider: u32,
}

impl StationState {
    pub fn new(template: &StationTemplate) -> Self {
        let mut connectors = HashMap::new();
        let total = template.total_connectors().max(1);
        let start_id = if template.use_connector_id0 { 0 } else { 1 };
        let end_id = if template.use_connector_id0 { total } else { total };
        for id in start_id..=end_id {
            connectors.insert(id, Connector::new(id));
        }
        if !connectors.contains_key(&0) {
            connectors.insert(0, Connector::new(0));
        }

        let config_store = ConfigurationStore::new(template.configuration.clone());

        Self {
            connectors,
            evses: HashMap::new(),
            config_store,
            variables: None,
            heartbeat_interval_ms: 0,
            ping_interval_secs: 0,
            registered: false,
            power_divider: template.total_connectors().max(1),
        }
    }

    pub fn connector_mut(&mut self, id: u32) -> Option<&mut Connector> {
        self.connectors.get_mut(&id)
    }

    pub fn connector(&self, id: u32) -> Option<&Connector> {
        self.connectors.get(&id)
    }

    /// Number of connectors currently able to share `maxPower` — excludes
    /// connector 0 unless `power_shared_by_connectors`, in which case it
    /// is the active-transaction count (spec.md §4.D `powerDivider`).
    pub fn recompute_power_divider(&mut self, power_shared_by_connectors: bool) {
        self.power_divider = if power_shared_by_connectors {
            self.connectors
                .values()
                .filter(|c| c.id > 0 && c.has_active_transaction())
                .count()
                .max(1) as u32
        } else {
            self.connectors.values().filter(|c| c.id > 0).count().max(1) as u32
        };
    }

    /// Effective power limit for `connector_id`, consulting the charging
    /// profile evaluator and connector 0's station-wide profiles, clamped
    /// to `stationMaximumPower / powerDivider` (spec.md §4.M).
    pub fn effective_power_limit_watts(&self, connector_id: u32, max_power_watts: f64) -> Option<f64> {
        let mut candidates: Vec<_> = self
            .connectors
            .get(&connector_id)
            .map(|c| c.profiles.clone())
            .unwrap_or_default();
        if connector_id != 0 {
            if let Some(c0) = self.connectors.get(&0) {
                candidates.extend(c0.profiles.clone());
            }
        }
        candidates.sort_by(|a, b| b.stack_level.cmp(&a.stack_level));
        let result = evaluator::evaluate(&candidates, Utc::now())?;
        let station_ceiling = max_power_watts / self.power_divider.max(1) as f64;
        Some(result.limit.min(station_ceiling))
    }
}

/// A single running station: owns its binding, correlator, and all
/// mutable state. `run` is the message loop; everything else is a
/// synchronous helper called from it or from tests.
pub struct StationRuntime {
    pub template: StationTemplate,
    pub info: StationInfo,
    pub state: StationState,
    pub binding: Arc<dyn OcppBinding>,
    pub correlator: Arc<Correlator>,
    pub tag_cache: Arc<TagCache>,
    pub auth: Arc<AuthPipeline>,
    pub stats: Arc<PerformanceSink>,
    signal_tx: mpsc::UnboundedSender<StationSignal>,
    signal_rx: mpsc::UnboundedReceiver<StationSignal>,
    /// Mirrors `state.heartbeat_interval_ms`/`state.ping_interval_secs` so
    /// the standalone heartbeat-sender and ping-interval tasks (spawned by
    /// the worker harness, outside this struct's own task) can read the
    /// current interval without touching `StationState` directly.
    heartbeat_interval: Arc<AtomicU64>,
    ping_interval: Arc<AtomicU64>,
}

impl StationRuntime {
    pub fn new(
        template: StationTemplate,
        info: StationInfo,
        binding: Arc<dyn OcppBinding>,
        correlator: Arc<Correlator>,
        tag_cache: Arc<TagCache>,
        auth: Arc<AuthPipeline>,
        stats: Arc<PerformanceSink>,
    ) -> Self {
        let state = StationState::new(&template);
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        Self {
            template,
            info,
            state,
            binding,
            correlator,
            tag_cache,
            auth,
            stats,
            signal_tx,
            signal_rx,
            heartbeat_interval: Arc::new(AtomicU64::new(0)),
            ping_interval: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn heartbeat_interval_handle(&self) -> Arc<AtomicU64> {
        self.heartbeat_interval.clone()
    }

    pub fn ping_interval_handle(&self) -> Arc<AtomicU64> {
        self.ping_interval.clone()
    }

    fn deps(&self) -> IncomingDeps<'_> {
        IncomingDeps {
            template: &self.template,
            info: &self.info,
            tag_cache: Some(&self.tag_cache),
            auth: &self.auth,
            signal_tx: self.signal_tx.clone(),
        }
    }

    /// Boot sequence step 1-4 (spec.md §4.D). Called once per connection
    /// open by the connection manager after the socket reaches `Open`.
    pub async fn boot(&mut self) {
        let (action, payload) = self.binding.boot_notification(&self.info);
        let started = std::time::Instant::now();
        let result = self
            .correlator
            .send_request(action, payload, RequestOptions::default())
            .await;
        self.stats.record(action, started.elapsed(), result.is_ok());

        match result {
            Ok(response) => {
                let status = response.get("status").and_then(Value::as_str).unwrap_or("Rejected");
                match status {
                    "Accepted" => {
                        let interval = response.get("interval").and_then(Value::as_u64).unwrap_or(0);
                        self.state.heartbeat_interval_ms = interval * 1000;
                        self.heartbeat_interval.store(self.state.heartbeat_interval_ms, Ordering::Relaxed);
                        self.state.config_store.put_heartbeat_interval_seconds(interval);
                        self.state.registered = true;
                        info!(station = self.info.station_name, interval, "boot accepted");
                        self.basic_start_message_sequence().await;
                    }
                    "Pending" => {
                        // Open question (spec.md §9): do not auto-resend;
                        // only an explicit TriggerMessage re-drives this.
                        info!(station = self.info.station_name, "boot pending");
                    }
                    _ => {
                        warn!(station = self.info.station_name, status, "boot rejected");
                    }
                }
            }
            Err(err) => {
                error!(station = self.info.station_name, error = %err, "boot notification failed");
            }
        }
    }

    /// `basicStartMessageSequence` (spec.md §4.D): one StatusNotification
    /// per connector at its boot-derived status, plus heartbeat/ATG/stats
    /// activation. The outbound buffer flush-before-new-message ordering
    /// is enforced by the connection manager's FIFO sink, not here.
    pub async fn basic_start_message_sequence(&mut self) {
        let mut connector_ids: Vec<u32> = self.state.connectors.keys().copied().collect();
        connector_ids.sort();

        for id in connector_ids {
            let status = {
                let connector = self.state.connectors.get(&id).expect("connector exists");
                if connector.has_active_transaction() {
                    ConnectorStatus::Charging
                } else {
                    connector.boot_status
                }
            };
            let (action, payload) = self.binding.status_notification(id, status);
            let _ = self
                .correlator
                .send_request(action, payload, RequestOptions::default())
                .await;
        }
    }

    /// Handles one inbound text frame: parses it, resolves CALLRESULT/
    /// CALLERROR against the correlator, or dispatches a CALL to the
    /// binding and replies with CALLRESULT/CALLERROR (spec.md §4.B). Never
    /// panics on malformed input — logged and dropped (spec.md §7).
    pub async fn handle_incoming_frame(&mut self, text: &str) {
        let frame = match OcppFrame::parse(text) {
            Ok(f) => f,
            Err(err) => {
                error!(error = %err, "malformed inbound frame, dropping");
                return;
            }
        };

        match &frame {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => {
                let deps = IncomingDeps {
                    template: &self.template,
                    info: &self.info,
                    tag_cache: Some(&self.tag_cache),
                    auth: &self.auth,
                    signal_tx: self.signal_tx.clone(),
                };
                let started = std::time::Instant::now();
                let result = self
                    .binding
                    .dispatch_incoming(&mut self.state, &deps, action, payload.clone());
                self.stats.record(action, started.elapsed(), result.is_ok());

                let reply = match result {
                    Ok(response) => OcppFrame::call_result(unique_id.clone(), response),
                    Err(err) => {
                        warn!(action, error = %err, "incoming call handler returned error");
                        OcppFrame::call_error(unique_id.clone(), &err)
                    }
                };
                self.correlator_enqueue(reply);
            }
            OcppFrame::CallResult { .. } | OcppFrame::CallError { .. } => {
                self.correlator.resolve(&frame);
            }
        }
    }

    fn correlator_enqueue(&self, frame: OcppFrame) {
        // The correlator only tracks pending CALLs; replies go straight to
        // the sink it wraps via a pending-free helper request path.
        self.correlator.enqueue_reply(frame.serialize());
    }

    /// Drains and applies one scheduled [`StationSignal`] (RemoteStart's
    /// plugin delay, Reset's deferred sequence, scheduler restarts).
    pub async fn process_signal(&mut self, signal: StationSignal) {
        match signal {
            StationSignal::ScheduledStartTransaction { connector_id, id_tag } => {
                if let Some(c) = self.state.connector(connector_id) {
                    if c.has_active_transaction() {
                        return;
                    }
                }
                let meter_start = self
                    .state
                    .connector(connector_id)
                    .map(|c| c.meter.energy_active_import as i64)
                    .unwrap_or(0);
                let (action, payload) = self.binding.start_transaction(connector_id, &id_tag, meter_start);
                let result = self
                    .correlator
                    .send_request(action, payload, RequestOptions::default())
                    .await;
                if let Ok(response) = &result {
                    let accepted = response
                        .get("idTagInfo")
                        .and_then(|v| v.get("status"))
                        .and_then(Value::as_str)
                        .map(|s| s == "Accepted")
                        .unwrap_or(true);
                    let transaction_id = response
                        .get("transactionId")
                        .and_then(Value::as_i64)
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| "1".to_string());
                    if accepted {
                        if let Some(c) = self.state.connector_mut(connector_id) {
                            c.start_transaction(transaction_id, id_tag, Utc::now(), true);
                        }
                        self.state.recompute_power_divider(self.template.power_shared_by_connectors);
                    }
                }
            }
            StationSignal::ScheduledStopTransaction { connector_id, reason } => {
                let (transaction_id, meter_stop, id_tag) = match self.state.connector(connector_id) {
                    Some(c) if c.has_active_transaction() => (
                        c.transaction.transaction_id.clone().unwrap_or_default(),
                        c.meter.transaction_energy_active_import as i64,
                        c.transaction.id_tag.clone(),
                    ),
                    _ => return,
                };
                let (action, payload) = self.binding.stop_transaction(
                    connector_id,
                    &transaction_id,
                    id_tag.as_deref(),
                    meter_stop,
                    &reason,
                );
                let _ = self
                    .correlator
                    .send_request(action, payload, RequestOptions::default())
                    .await;
                if let Some(c) = self.state.connector_mut(connector_id) {
                    c.stop_transaction();
                }
                self.state.recompute_power_divider(self.template.power_shared_by_connectors);
            }
            StationSignal::Reset { reason, delay_secs } => {
                self.stop_all_transactions(&reason).await;
                for id in self.state.connectors.keys().copied().collect::<Vec<_>>() {
                    let (action, payload) = self.binding.status_notification(id, ConnectorStatus::Unavailable);
                    let _ = self
                        .correlator
                        .send_request(action, payload, RequestOptions::default())
                        .await;
                }
                tokio::time::sleep(std::time::Duration::from_secs(delay_secs)).await;
                self.boot().await;
            }
            StationSignal::RestartHeartbeat { interval_ms } => {
                self.state.heartbeat_interval_ms = interval_ms;
                self.heartbeat_interval.store(interval_ms, Ordering::Relaxed);
            }
            StationSignal::RestartPing { interval_secs } => {
                self.state.ping_interval_secs = interval_secs;
                self.ping_interval.store(interval_secs, Ordering::Relaxed);
            }
            StationSignal::ConnectionOpened => {
                self.boot().await;
            }
        }
    }

    /// Sends `StopTransaction` for every connector with an active
    /// transaction, used by both `stop` (spec.md §4.C) and `Reset`
    /// (spec.md §4.E).
    pub async fn stop_all_transactions(&mut self, reason: &str) {
        let active: Vec<u32> = self
            .state
            .connectors
            .values()
            .filter(|c| c.has_active_transaction())
            .map(|c| c.id)
            .collect();
        for id in active {
            Box::pin(self.process_signal(StationSignal::ScheduledStopTransaction {
                connector_id: id,
                reason: reason.to_string(),
            }))
            .await;
        }
    }

    pub fn signal_sender(&self) -> mpsc::UnboundedSender<StationSignal> {
        self.signal_tx.clone()
    }

    /// The message loop (spec.md §5): processes inbound frames and
    /// scheduled signals one at a time, guaranteeing single-threaded
    /// mutation of station state. `inbound` is fed by the connection
    /// manager; the loop exits when both channels close.
    pub async fn run(&mut self, mut inbound: mpsc::UnboundedReceiver<String>) {
        loop {
            tokio::select! {
                frame = inbound.recv() => {
                    match frame {
                        Some(text) => self.handle_incoming_frame(&text).await,
                        None => {
                            debug!(station = self.info.station_name, "inbound channel closed, stopping loop");
                            break;
                        }
                    }
                }
                signal = self.signal_rx.recv() => {
                    match signal {
                        Some(s) => self.process_signal(s).await,
                        None => break,
                    }
                }
            }
        }
    }
}

/// Per-connector meter-sampling ticker, spawned by the worker harness for
/// every connector with an active transaction (spec.md §4.D).
pub fn sample_tick(
    registers: &mut crate::station::connector::MeterRegisters,
    in_transaction: bool,
    max_power_watts: f64,
    interval_secs: u64,
    power_divider: u32,
) -> Vec<meter::MeterSample> {
    meter::sample(registers, in_transaction, max_power_watts, interval_secs, power_divider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocpp16::Binding16;
    use crate::station::template::StationTemplate;

    fn make_runtime() -> StationRuntime {
        let template = StationTemplate::parse(
            "t.json",
            r#"{"baseName":"CP","supervisionUrls":["ws://h/ocpp"],"numberOfConnectors":2}"#,
        )
        .unwrap();
        let info = StationInfo::from_template_and_prior(&template, 0, "Acme".into(), "X1".into(), None);
        let sink = Arc::new(crate::connection::manager::NullSink::default());
        let correlator = Arc::new(Correlator::new(sink));
        let tag_cache = Arc::new(TagCache::new());
        let auth = Arc::new(AuthPipeline::new_offline_only());
        let stats = Arc::new(PerformanceSink::new());
        StationRuntime::new(template, info, Arc::new(Binding16::new()), correlator, tag_cache, auth, stats)
    }

    #[test]
    fn state_creates_one_connector_per_template_count_plus_connector_zero() {
        let runtime = make_runtime();
        assert!(runtime.state.connectors.contains_key(&0));
        assert!(runtime.state.connectors.contains_key(&1));
        assert!(runtime.state.connectors.contains_key(&2));
    }

    #[tokio::test]
    async fn malformed_frame_does_not_panic() {
        let mut runtime = make_runtime();
        runtime.handle_incoming_frame("not json at all").await;
    }
}
