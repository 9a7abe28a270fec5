//! OCPP-version-agnostic dispatch (spec.md §9 "OCPP-version polymorphism").
//!
//! A station holds exactly one [`OcppBinding`] implementation, chosen once
//! at construction from the template's `ocppVersion`. Higher-level code
//! (boot sequence, heartbeat scheduler, ATG) calls the binding's request
//! builders and never branches on version directly. The incoming-CALL path
//! always resolves through [`OcppBinding::dispatch_incoming`], the single
//! decision point that emits CALLERROR `NotImplemented` for unknown
//! actions.

use serde_json::Value;

use crate::error::OcppError;
use crate::protocol::version::OcppVersion;
use crate::station::connector::ConnectorStatus;
use crate::station::info::StationInfo;
use crate::station::meter::MeterSample;
use crate::station::runtime::{IncomingDeps, StationState};

/// One `(action, payload)` pair ready to hand to the correlator.
pub type OutboundRequest = (&'static str, Value);

/// Per-version request construction + inbound dispatch. Implemented once
/// for 1.6 ([`crate::ocpp16::Binding16`]) and once for 2.0.1
/// ([`crate::ocpp201::Binding201`]).
pub trait OcppBinding: Send + Sync {
    fn version(&self) -> OcppVersion;

    fn boot_notification(&self, info: &StationInfo) -> OutboundRequest;
    fn heartbeat(&self) -> OutboundRequest;
    fn authorize(&self, id_tag: &str) -> OutboundRequest;
    fn status_notification(&self, connector_id: u32, status: ConnectorStatus) -> OutboundRequest;
    fn start_transaction(&self, connector_id: u32, id_tag: &str, meter_start: i64) -> OutboundRequest;
    fn stop_transaction(
        &self,
        connector_id: u32,
        transaction_id: &str,
        id_tag: Option<&str>,
        meter_stop: i64,
        reason: &str,
    ) -> OutboundRequest;
    fn meter_values(&self, connector_id: u32, transaction_id: Option<&str>, samples: &[MeterSample]) -> OutboundRequest;
    fn data_transfer(&self, vendor_id: &str, message_id: Option<&str>, data: Option<Value>) -> OutboundRequest;

    /// The single CALLERROR `NotImplemented` decision point (spec.md §9).
    /// Implementations match on `action` and delegate to their own
    /// handler table; an unmatched action must return
    /// `Err(OcppError::not_implemented(action))`.
    fn dispatch_incoming(
        &self,
        state: &mut StationState,
        deps: &IncomingDeps<'_>,
        action: &str,
        payload: Value,
    ) -> Result<Value, OcppError>;

    /// Interprets a CALLRESULT/CALLERROR for an outbound request this
    /// binding issued, applying any version-specific side effect (e.g.
    /// BootNotification's `interval` -> heartbeat scheduler). Most
    /// responses need no handling beyond what the caller already does
    /// with the return value of `send_request`, so the default is a no-op.
    fn on_response(&self, _state: &mut StationState, _action: &str, _result: &Result<Value, OcppError>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocpp16::Binding16;
    use crate::station::template::StationTemplate;

    fn template() -> StationTemplate {
        StationTemplate::parse(
            "t.json",
            r#"{"baseName":"CP","supervisionUrls":["ws://h/ocpp"]}"#,
        )
        .unwrap()
    }

    #[test]
    fn unimplemented_action_yields_not_implemented() {
        let tpl = template();
        let mut state = StationState::new(&tpl);
        let binding = Binding16::new();
        let deps = IncomingDeps::test_fixture(&tpl);
        let err = binding
            .dispatch_incoming(&mut state, &deps, "SomeFutureAction", Value::Null)
            .unwrap_err();
        assert_eq!(err.code, crate::error::OcppErrorCode::NotImplemented);
    }
}
