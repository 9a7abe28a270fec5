//! OCPP 2.0.1 binding (spec.md §4.E, §4.F): `TransactionEvent`-based
//! transaction reporting plus the Variable Manager.

pub mod handlers;
pub mod requests;
pub mod variables;

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
    AuthorizeRequest, BootNotificationRequest, ChargingStation, DataTransferRequest, EvseRef, IdToken, MeterValue,
    SampledValue, StatusNotificationRequest, TransactionEventRequest, TransactionInfo, UnitOfMeasure,
};

#[derive(Default)]
pub struct Binding201;

impl Binding201 {
    pub fn new() -> Self {
        Self
    }
}

fn to_value<T: serde::Serialize>(v: &T) -> Value {
    serde_json::to_value(v).expect("outbound request payload always serializes")
}

impl OcppBinding for Binding201 {
    fn version(&self) -> OcppVersion {
        OcppVersion::V201
    }

    fn boot_notification(&self, info: &StationInfo) -> OutboundRequest {
        let req = BootNotificationRequest {
            charging_station: ChargingStation {
                model: info.model.clone(),
                vendor_name: info.vendor.clone(),
                serial_number: Some(info.serials.charge_point_serial_number.clone()),
                firmware_version: Some(info.serials.firmware_version.clone()),
            },
            reason: "PowerUp",
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
                id_token: IdToken {
                    id_token: id_tag.to_string(),
                    kind: "Central",
                },
            }),
        )
    }

    fn status_notification(&self, connector_id: u32, status: ConnectorStatus) -> OutboundRequest {
        (
            "StatusNotification",
            to_value(&StatusNotificationRequest {
                timestamp: Utc::now().to_rfc3339(),
                connector_status: status.as_str(),
                evse_id: connector_id,
                connector_id,
            }),
        )
    }

    fn start_transaction(&self, connector_id: u32, id_tag: &str, _meter_start: i64) -> OutboundRequest {
        let req = TransactionEventRequest {
            event_type: "Started",
            timestamp: Utc::now().to_rfc3339(),
            trigger_reason: "Authorized",
            seq_no: 0,
            transaction_info: TransactionInfo {
                transaction_id: format!("tx-{connector_id}-{}", Utc::now().timestamp_millis()),
                stopped_reason: None,
            },
            evse: Some(EvseRef {
                id: connector_id,
                connector_id,
            }),
            id_token: Some(IdToken {
                id_token: id_tag.to_string(),
                kind: "Central",
            }),
            meter_value: None,
        };
        ("TransactionEvent", to_value(&req))
    }

    fn stop_transaction(
        &self,
        connector_id: u32,
        transaction_id: &str,
        id_tag: Option<&str>,
        meter_stop: i64,
        reason: &str,
    ) -> OutboundRequest {
        let req = TransactionEventRequest {
            event_type: "Ended",
            timestamp: Utc::now().to_rfc3339(),
            trigger_reason: "StopAuthorized",
            seq_no: 0,
            transaction_info: TransactionInfo {
                transaction_id: transaction_id.to_string(),
                stopped_reason: Some(stop_reason_to_static(reason)),
            },
            evse: Some(EvseRef {
                id: connector_id,
                connector_id,
            }),
            id_token: id_tag.map(|tag| IdToken {
                id_token: tag.to_string(),
                kind: "Central",
            }),
            meter_value: Some(vec![MeterValue {
                timestamp: Utc::now().to_rfc3339(),
                sampled_value: vec![SampledValue {
                    value: meter_stop as f64,
                    measurand: "Energy.Active.Import.Register".to_string(),
                    unit_of_measure: UnitOfMeasure { unit: "Wh".to_string() },
                }],
            }]),
        };
        ("TransactionEvent", to_value(&req))
    }

    fn meter_values(&self, connector_id: u32, transaction_id: Option<&str>, samples: &[MeterSample]) -> OutboundRequest {
        let sampled_value = samples
            .iter()
            .map(|s| SampledValue {
                value: s.value.parse().unwrap_or(0.0),
                measurand: s.measurand.to_string(),
                unit_of_measure: UnitOfMeasure { unit: s.unit.to_string() },
            })
            .collect();
        let req = TransactionEventRequest {
            event_type: "Updated",
            timestamp: Utc::now().to_rfc3339(),
            trigger_reason: "MeterValuePeriodic",
            seq_no: 0,
            transaction_info: TransactionInfo {
                transaction_id: transaction_id.unwrap_or_default().to_string(),
                stopped_reason: None,
            },
            evse: Some(EvseRef {
                id: connector_id,
                connector_id,
            }),
            id_token: None,
            meter_value: Some(vec![MeterValue {
                timestamp: Utc::now().to_rfc3339(),
                sampled_value,
            }]),
        };
        ("TransactionEvent", to_value(&req))
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
            "GetVariables" => handlers::handle_get_variables(state, &payload),
            "SetVariables" => handlers::handle_set_variables(state, deps, &payload),
            "ChangeAvailability" => handlers::handle_change_availability(state, &payload),
            "RequestStartTransaction" => handlers::handle_request_start_transaction(state, deps, &payload),
            "RequestStopTransaction" => handlers::handle_request_stop_transaction(state, deps, &payload),
            "UnlockConnector" => handlers::handle_unlock_connector(state, &payload),
            "TriggerMessage" => Ok(json!({"status": "NotImplemented"})),
            "DataTransfer" => Ok(json!({"status": "UnknownVendorId"})),
            _ => Err(OcppError::not_implemented(action)),
        }
    }

    // BootNotification's interval -> heartbeat persistence is handled
    // directly by `StationRuntime::boot` since it is identical across
    // versions; the default no-op `on_response` applies here.
}

fn stop_reason_to_static(reason: &str) -> &'static str {
    match reason {
        "EVDisconnected" => "EVDisconnected",
        "Local" => "Local",
        "Remote" => "Remote",
        "HardReset" => "ImmediateReset",
        "SoftReset" => "ImmediateReset",
        _ => "Other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcppErrorCode;
    use crate::station::template::StationTemplate;

    #[test]
    fn unknown_action_is_not_implemented() {
        let tpl = StationTemplate::parse(
            "t.json",
            r#"{"baseName":"CP","supervisionUrls":["ws://h"],"ocppVersion":"2.0.1"}"#,
        )
        .unwrap();
        let mut state = StationState::new(&tpl);
        let deps = IncomingDeps::test_fixture(&tpl);
        let binding = Binding201::new();
        let err = binding.dispatch_incoming(&mut state, &deps, "Nope", Value::Null).unwrap_err();
        assert_eq!(err.code, OcppErrorCode::NotImplemented);
    }

    #[test]
    fn boot_notification_includes_vendor_and_model() {
        let tpl = StationTemplate::parse(
            "t.json",
            r#"{"baseName":"CP","supervisionUrls":["ws://h"],"ocppVersion":"2.0.1"}"#,
        )
        .unwrap();
        let info = StationInfo::from_template_and_prior(&tpl, 0, "Acme".into(), "X1".into(), None);
        let binding = Binding201::new();
        let (_action, payload) = binding.boot_notification(&info);
        assert_eq!(payload["chargingStation"]["vendorName"], "Acme");
        assert_eq!(payload["chargingStation"]["model"], "X1");
    }
}
