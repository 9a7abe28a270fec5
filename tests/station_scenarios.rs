//! End-to-end station scenarios, driving a [`StationRuntime`] through a
//! [`TestSink`] the way the connection manager would, without an actual
//! socket.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde_json::{json, Value};

use ocpp_station_sim::auth::strategy::AuthPipeline;
use ocpp_station_sim::ocpp16::Binding16;
use ocpp_station_sim::ocpp201::Binding201;
use ocpp_station_sim::protocol::correlator::{Correlator, FrameSink};
use ocpp_station_sim::protocol::frame::OcppFrame;
use ocpp_station_sim::stats::performance::PerformanceSink;
use ocpp_station_sim::station::connector::{
    ChargingProfile, ChargingProfileKind, ChargingProfilePurpose, ChargingRateUnit, ChargingSchedulePeriod,
};
use ocpp_station_sim::station::info::StationInfo;
use ocpp_station_sim::station::runtime::{StationRuntime, StationSignal, StationState};
use ocpp_station_sim::station::template::StationTemplate;
use ocpp_station_sim::tags::cache::TagCache;

/// A [`FrameSink`] that records every enqueued frame and can be toggled
/// online/offline, standing in for the connection manager in these tests.
struct TestSink {
    sent: Mutex<Vec<String>>,
    connected: AtomicBool,
}

impl TestSink {
    fn new(connected: bool) -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(connected),
        })
    }

    fn set_connected(&self, value: bool) {
        self.connected.store(value, Ordering::Relaxed);
    }

    fn drain(&self) -> Vec<OcppFrame> {
        self.sent
            .lock()
            .unwrap()
            .drain(..)
            .map(|text| OcppFrame::parse(&text).unwrap())
            .collect()
    }
}

impl FrameSink for TestSink {
    fn enqueue(&self, frame: String) {
        self.sent.lock().unwrap().push(frame);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

fn runtime_with_sink(template_json: &str, sink: Arc<TestSink>) -> (StationRuntime, Arc<Correlator>) {
    let template = StationTemplate::parse("t.json", template_json).unwrap();
    let info = StationInfo::from_template_and_prior(&template, 0, "Acme".into(), "X1".into(), None);
    let correlator = Arc::new(Correlator::new(sink));
    let version = template.ocpp_version;
    let binding: Arc<dyn ocpp_station_sim::protocol::dispatch::OcppBinding> = match version {
        ocpp_station_sim::protocol::version::OcppVersion::V16 => Arc::new(Binding16::new()),
        ocpp_station_sim::protocol::version::OcppVersion::V201 => Arc::new(Binding201::new()),
    };
    let tag_cache = Arc::new(TagCache::new());
    let auth = Arc::new(AuthPipeline::new_offline_only());
    let stats = Arc::new(PerformanceSink::new());
    let rt = StationRuntime::new(template, info, binding, correlator.clone(), tag_cache, auth, stats);
    (rt, correlator)
}

/// Resolves the single outstanding request currently sitting in `sink`
/// with `response`, given the correlator that owns it.
async fn respond_to_latest(sink: &TestSink, correlator: &Correlator, response: Value) {
    let frames = sink.drain();
    let call = frames.last().expect("a CALL was sent");
    let OcppFrame::Call { unique_id, .. } = call else {
        panic!("expected a CALL frame");
    };
    correlator.resolve(&OcppFrame::call_result(unique_id.clone(), response));
}

#[tokio::test]
async fn boot_accepted_registers_station_and_runs_basic_start_sequence() {
    let sink = TestSink::new(true);
    let (rt, correlator) = runtime_with_sink(
        r#"{"baseName":"CP001","supervisionUrls":["ws://h/ocpp"],"numberOfConnectors":1}"#,
        sink.clone(),
    );
    let rt = Arc::new(tokio::sync::Mutex::new(rt));

    let boot_rt = rt.clone();
    let handle = tokio::spawn(async move { boot_rt.lock().await.boot().await });
    tokio::task::yield_now().await;

    let sent = sink.drain();
    assert_eq!(sent.len(), 1);
    let OcppFrame::Call { action, payload, .. } = &sent[0] else {
        panic!("expected BootNotification CALL");
    };
    assert_eq!(action, "BootNotification");
    assert_eq!(payload["chargePointVendor"], "Acme");
    assert_eq!(payload["chargePointModel"], "X1");

    respond_to_latest(&sink, &correlator, json!({"status": "Accepted", "interval": 300})).await;
    handle.await.unwrap();

    let rt = rt.lock().await;
    assert!(rt.state.registered);
    assert_eq!(rt.state.heartbeat_interval_ms, 300_000);
    assert_eq!(rt.state.config_store.get_value("HeartBeatInterval"), Some("300"));
    assert_eq!(rt.state.config_store.get_value("HeartbeatInterval"), Some("300"));

    // basicStartMessageSequence sent one StatusNotification per connector.
    let sent = sink.drain();
    assert!(sent.iter().any(|f| matches!(f, OcppFrame::Call { action, .. } if action == "StatusNotification")));
}

#[tokio::test]
async fn remote_start_rejected_when_local_auth_list_does_not_contain_id_tag() {
    let sink = TestSink::new(true);
    let (mut rt, _correlator) = runtime_with_sink(
        r#"{"baseName":"CP001","supervisionUrls":["ws://h/ocpp"],"numberOfConnectors":1}"#,
        sink.clone(),
    );
    rt.state.config_store.put("LocalAuthListEnabled", "true");
    rt.state.config_store.put("AuthorizeRemoteTxRequests", "true");

    rt.handle_incoming_frame(
        &OcppFrame::call("req-1".to_string(), "RemoteStartTransaction", json!({"connectorId": 1, "idTag": "UNKNOWN"})).serialize(),
    )
    .await;

    let replies = sink.drain();
    let OcppFrame::CallResult { payload, .. } = &replies[0] else {
        panic!("expected CALLRESULT");
    };
    assert_eq!(payload["status"], "Rejected");
}

#[tokio::test]
async fn remote_start_accepted_schedules_start_transaction_signal() {
    let sink = TestSink::new(true);
    let (mut rt, _correlator) = runtime_with_sink(
        r#"{"baseName":"CP001","supervisionUrls":["ws://h/ocpp"],"numberOfConnectors":1}"#,
        sink.clone(),
    );
    // No local-list gate configured: RemoteStart accepts unconditionally.
    rt.handle_incoming_frame(
        &OcppFrame::call("req-1".to_string(), "RemoteStartTransaction", json!({"connectorId": 1, "idTag": "TAG-1"})).serialize(),
    )
    .await;

    let replies = sink.drain();
    let OcppFrame::CallResult { payload, .. } = &replies[0] else {
        panic!("expected CALLRESULT");
    };
    assert_eq!(payload["status"], "Accepted");
}

#[tokio::test]
async fn reconnect_buffers_status_notification_until_connection_reopens() {
    let sink = TestSink::new(false);
    let (mut rt, correlator) = runtime_with_sink(
        r#"{"baseName":"CP001","supervisionUrls":["ws://h/ocpp"],"numberOfConnectors":1}"#,
        sink.clone(),
    );

    // Station is offline: the request still enqueues to the FIFO sink
    // rather than failing outright (spec.md §4.B/§4.C).
    let send_correlator = rt.correlator.clone();
    let handle = tokio::spawn(async move {
        send_correlator
            .send_request("Heartbeat", json!({}), Default::default())
            .await
    });
    tokio::task::yield_now().await;

    let buffered = sink.drain();
    assert_eq!(buffered.len(), 1);

    // Connection reopens: re-enqueue the same frame (standing in for the
    // connection manager's buffered replay) and resolve it.
    sink.set_connected(true);
    sink.enqueue(buffered[0].serialize());
    let frames = sink.drain();
    let OcppFrame::Call { unique_id, .. } = &frames[0] else {
        panic!("expected Heartbeat CALL");
    };
    correlator.resolve(&OcppFrame::call_result(unique_id.clone(), json!({"currentTime": "now"})));
    let response = handle.await.unwrap().unwrap();
    assert_eq!(response["currentTime"], "now");
}

#[tokio::test]
async fn heartbeat_interval_set_restarts_scheduler() {
    let sink = TestSink::new(true);
    let (mut rt, _correlator) = runtime_with_sink(
        r#"{"baseName":"CP001","supervisionUrls":["ws://h/ocpp"],"numberOfConnectors":1}"#,
        sink,
    );
    let interval_handle = rt.heartbeat_interval_handle();
    assert_eq!(interval_handle.load(Ordering::Relaxed), 0);

    rt.process_signal(StationSignal::RestartHeartbeat { interval_ms: 60_000 }).await;

    assert_eq!(rt.state.heartbeat_interval_ms, 60_000);
    assert_eq!(interval_handle.load(Ordering::Relaxed), 60_000);
}

#[tokio::test]
async fn set_variables_heartbeat_interval_round_trips_through_binding_201() {
    let sink = TestSink::new(true);
    let (mut rt, _correlator) = runtime_with_sink(
        r#"{"baseName":"CP001","supervisionUrls":["ws://h/ocpp"],"ocppVersion":"2.0.1","numberOfConnectors":1}"#,
        sink.clone(),
    );

    rt.handle_incoming_frame(
        &OcppFrame::call(
            "req-1".to_string(),
            "SetVariables",
            json!({"setVariableData": [{
                "component": {"name": "OCPPCommCtrlr"},
                "variable": {"name": "HeartbeatInterval"},
                "attributeValue": "45",
            }]}),
        )
        .serialize(),
    )
    .await;

    let replies = sink.drain();
    let OcppFrame::CallResult { payload, .. } = &replies[0] else {
        panic!("expected CALLRESULT");
    };
    assert_eq!(payload["setVariableResult"][0]["attributeStatus"], "Accepted");
    assert_eq!(rt.state.config_store.get_value("HeartbeatInterval"), Some("45"));
}

#[tokio::test]
async fn charging_profile_single_period_limits_effective_power() {
    let template = StationTemplate::parse(
        "t.json",
        r#"{"baseName":"CP001","supervisionUrls":["ws://h/ocpp"],"numberOfConnectors":1,"power":22000}"#,
    )
    .unwrap();
    let mut state = StationState::new(&template);

    let profile = ChargingProfile {
        profile_id: 1,
        stack_level: 0,
        purpose: ChargingProfilePurpose::TxDefaultProfile,
        kind: ChargingProfileKind::Absolute,
        charging_rate_unit: ChargingRateUnit::W,
        start_schedule: Some(Utc::now() - chrono::Duration::seconds(10)),
        duration_seconds: Some(3600),
        periods: vec![ChargingSchedulePeriod {
            start_period_seconds: 0,
            limit: 7_400.0,
            number_phases: None,
        }],
    };
    state.connector_mut(1).unwrap().set_profile(profile);

    let limit = state.effective_power_limit_watts(1, 22_000.0).expect("an active profile applies");
    assert_eq!(limit, 7_400.0);
}

#[tokio::test]
async fn unconfigured_connector_has_no_effective_power_limit() {
    let template = StationTemplate::parse(
        "t.json",
        r#"{"baseName":"CP001","supervisionUrls":["ws://h/ocpp"],"numberOfConnectors":1}"#,
    )
    .unwrap();
    let state = StationState::new(&template);
    assert!(state.effective_power_limit_watts(1, 22_000.0).is_none());
}
