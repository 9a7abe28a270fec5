//! OCPP 1.6J binding (spec.md §4.E).

pub mod handlers;
pub mod requests;

use chrono::Utc;
use serde_json::{json, Value};

use crate::error::OcppError;
use crate::protocol::dispatch::{OcppBinding, OutboundRequest};
use crate::protocol::version::OcppVersion;
use crate::station::connector::ConnectorStatus;
use crate::station::info::StationInfo;
use crate::station::meter::MeterSample;
use crate::station::runtime::{IncomingDeps, StationState};

use requests::{
    AuthorizeRequest, BootNotificationRequest, DataTransferRequest, MeterValue, MeterValuesRequest, SampledValue,
    StartTransactionRequest, StatusNotificationRequest, StopTransactionRequest,
};

#[derive(Default)]
pub struct Binding16;

impl Binding16 {
    pub fn new() -> Self {
        Self
    }
}

fn to_value<T: serde::Serialize>(v: &T) -> Value {
    serde_json::to_value(v).expect("outbound request payload always serializes")
}

impl OcppBinding for Binding16 {
    fn version(&self) -> OcppVersion {
        OcppVersion::V16
    }

    fn boot_notification(&self, info: &StationInfo) -> OutboundRequest {
        let req = BootNotificationRequest {
            charge_point_vendor: info.vendor.clone(),
            charge_point_model: info.model.clone(),
            charge_point_serial_number: Some(info.serials.charge_point_serial_number.clone()),
            charge_box_serial_number: Some(info.serials.charge_box_serial_number.clone()),
            firmware_version: Some(info.serials.firmware_version.clone()),
        };
        ("BootNotification", to_value(&req))
    }

    fn heartbeat(&self) -> OutboundRequest {
        ("Heartbeat", json!({}))
    }

    fn authorize(&self, id_tag: &str) -> OutboundRequest {
        (
            "Authorize",
            to_value(&AuthorizeRequest {
                id_tag: id_tag.to_string(),
            }),
        )
    }

    fn status_notification(&self, connector_id: u32, status: ConnectorStatus) -> OutboundRequest {
        (
            "StatusNotification",
            to_value(&StatusNotificationRequest {
                connector_id,
                error_code: "NoError",
                status: status.as_str(),
            }),
        )
    }

    fn start_transaction(&self, connector_id: u32, id_tag: &str, meter_start: i64) -> OutboundRequest {
        (
            "StartTransaction",
            to_value(&StartTransactionRequest {
                connector_id,
                id_tag: id_tag.to_string(),
                meter_start,
                timestamp: Utc::now().to_rfc3339(),
            }),
        )
    }

    fn stop_transaction(
        &self,
        _connector_id: u32,
        transaction_id: &str,
        id_tag: Option<&str>,
        meter_stop: i64,
        reason: &str,
    ) -> OutboundRequest {
        (
            "StopTransaction",
            to_value(&StopTransactionRequest {
                transaction_id: transaction_id.parse().unwrap_or(0),
                id_tag: id_tag.map(str::to_string),
                meter_stop,
                timestamp: Utc::now().to_rfc3339(),
                reason: Some(reason.to_string()),
            }),
        )
    }

    fn meter_values(&self, connector_id: u32, transaction_id: Option<&str>, samples: &[MeterSample]) -> OutboundRequest {
        let sampled_value = samples
            .iter()
            .map(|s| SampledValue {
                value: s.value.clone(),
                measurand: s.measurand.to_string(),
                unit: s.unit.to_string(),
            })
            .collect();
        (
            "MeterValues",
            to_value(&MeterValuesRequest {
                connector_id,
                transaction_id: transaction_id.and_then(|s| s.parse().ok()),
                meter_value: vec![MeterValue {
                    timestamp: Utc::now().to_rfc3339(),
                    sampled_value,
                }],
            }),
        )
    }

    fn data_transfer(&self, vendor_id: &str, message_id: Option<&str>, data: Option<Value>) -> OutboundRequest {
        (
            "DataTransfer",
            to_value(&DataTransferRequest {
                vendor_id: vendor_id.to_string(),
                message_id: message_id.map(str::to_string),
                data,
            }),
        )
    }

    fn dispatch_incoming(
        &self,
        state: &mut StationState,
        deps: &IncomingDeps<'_>,
        action: &str,
        payload: Value,
    ) -> Result<Value, OcppError> {
        match action {
            "Reset" => handlers::handle_reset(state, deps, &payload),
            "ChangeConfiguration" => handlers::handle_change_configuration(state, deps, &payload),
            "GetConfiguration" => handlers::handle_get_configuration(state, &payload),
            "ChangeAvailability" => handlers::handle_change_availability(state, &payload),
            "RemoteStartTransaction" => handlers::handle_remote_start_transaction(state, deps, &payload),
            "RemoteStopTransaction" => handlers::handle_remote_stop_transaction(state, deps, &payload),
            "UnlockConnector" => handlers::handle_unlock_connector(state, &payload),
            "SetChargingProfile" => handlers::handle_set_charging_profile(state, &payload),
            "ClearChargingProfile" => handlers::handle_clear_charging_profile(state, &payload),
            "TriggerMessage" => Ok(json!({"status": "NotImplemented"})),
            "DataTransfer" => Ok(json!({"status": "UnknownVendorId"})),
            _ => Err(OcppError::not_implemented(action)),
        }
    }

    // BootNotification's interval -> heartbeat persistence is handled
    // directly by `StationRuntime::boot` since it is identical across
    // versions; the default no-op `on_response` applies here.
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcppErrorCode;
    use crate::station::template::StationTemplate;

    #[test]
    fn unknown_action_is_not_implemented() {
        let tpl = StationTemplate::parse("t.json", r#"{"baseName":"CP","supervisionUrls":["ws://h"]}"#).unwrap();
        let mut state = StationState::new(&tpl);
        let deps = IncomingDeps::test_fixture(&tpl);
        let binding = Binding16::new();
        let err = binding.dispatch_incoming(&mut state, &deps, "Nope", Value::Null).unwrap_err();
        assert_eq!(err.code, OcppErrorCode::NotImplemented);
    }

    #[test]
    fn status_notification_includes_no_error_code() {
        let binding = Binding16::new();
        let (_action, payload) = binding.status_notification(1, ConnectorStatus::Available);
        assert_eq!(payload["errorCode"], "NoError");
        assert_eq!(payload["status"], "Available");
    }
}
