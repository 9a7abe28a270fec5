//! Outbound (station -> Central System) request payloads for OCPP 2.0.1
//! (spec.md §4.E). 2.0.1 replaces 1.6's three transaction messages with a
//! single `TransactionEvent` carrying an `eventType`.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionEventType {
    Started,
    Updated,
    Ended,
}

impl TransactionEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "Started",
            Self::Updated => "Updated",
            Self::Ended => "Ended",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BootNotificationRequest {
    #[serde(rename = "chargingStation")]
    pub charging_station: ChargingStation,
    pub reason: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ChargingStation {
    pub model: String,
    #[serde(rename = "vendorName")]
    pub vendor_name: String,
    #[serde(rename = "serialNumber", skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(rename = "firmwareVersion", skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusNotificationRequest {
    pub timestamp: String,
    #[serde(rename = "connectorStatus")]
    pub connector_status: &'static str,
    #[serde(rename = "evseId")]
    pub evse_id: u32,
    #[serde(rename = "connectorId")]
    pub connector_id: u32,
}

#[derive(Debug, Serialize)]
pub struct TransactionEventRequest {
    #[serde(rename = "eventType")]
    pub event_type: &'static str,
    pub timestamp: String,
    #[serde(rename = "triggerReason")]
    pub trigger_reason: &'static str,
    #[serde(rename = "seqNo")]
    pub seq_no: u32,
    #[serde(rename = "transactionInfo")]
    pub transaction_info: TransactionInfo,
    #[serde(rename = "evse", skip_serializing_if = "Option::is_none")]
    pub evse: Option<EvseRef>,
    #[serde(rename = "idToken", skip_serializing_if = "Option::is_none")]
    pub id_token: Option<IdToken>,
    #[serde(rename = "meterValue", skip_serializing_if = "Option::is_none")]
    pub meter_value: Option<Vec<MeterValue>>,
}

#[derive(Debug, Serialize)]
pub struct TransactionInfo {
    #[serde(rename = "transactionId")]
    pub transaction_id: String,
    #[serde(rename = "stoppedReason", skip_serializing_if = "Option::is_none")]
    pub stopped_reason: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct EvseRef {
    pub id: u32,
    #[serde(rename = "connectorId")]
    pub connector_id: u32,
}

#[derive(Debug, Serialize)]
pub struct IdToken {
    #[serde(rename = "idToken")]
    pub id_token: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MeterValue {
    pub timestamp: String,
    #[serde(rename = "sampledValue")]
    pub sampled_value: Vec<SampledValue>,
}

#[derive(Debug, Serialize)]
pub struct SampledValue {
    pub value: f64,
    pub measurand: String,
    #[serde(rename = "unitOfMeasure")]
    pub unit_of_measure: UnitOfMeasure,
}

#[derive(Debug, Serialize)]
pub struct UnitOfMeasure {
    pub unit: String,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeRequest {
    #[serde(rename = "idToken")]
    pub id_token: IdToken,
}

#[derive(Debug, Serialize)]
pub struct DataTransferRequest {
    #[serde(rename = "vendorId")]
    pub vendor_id: String,
    #[serde(rename = "messageId", skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}
