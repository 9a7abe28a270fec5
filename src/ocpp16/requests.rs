//! Outbound (station -> Central System) request payloads for OCPP 1.6J
//! (spec.md §4.E).

use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct BootNotificationRequest {
    #[serde(rename = "chargePointVendor")]
    pub charge_point_vendor: String,
    #[serde(rename = "chargePointModel")]
    pub charge_point_model: String,
    #[serde(rename = "chargePointSerialNumber", skip_serializing_if = "Option::is_none")]
    pub charge_point_serial_number: Option<String>,
    #[serde(rename = "chargeBoxSerialNumber", skip_serializing_if = "Option::is_none")]
    pub charge_box_serial_number: Option<String>,
    #[serde(rename = "firmwareVersion", skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StatusNotificationRequest {
    #[serde(rename = "connectorId")]
    pub connector_id: u32,
    #[serde(rename = "errorCode")]
    pub error_code: &'static str,
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct StartTransactionRequest {
    #[serde(rename = "connectorId")]
    pub connector_id: u32,
    #[serde(rename = "idTag")]
    pub id_tag: String,
    #[serde(rename = "meterStart")]
    pub meter_start: i64,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
pub struct StopTransactionRequest {
    #[serde(rename = "transactionId")]
    pub transaction_id: i64,
    #[serde(rename = "idTag", skip_serializing_if = "Option::is_none")]
    pub id_tag: Option<String>,
    #[serde(rename = "meterStop")]
    pub meter_stop: i64,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MeterValuesRequest {
    #[serde(rename = "connectorId")]
    pub connector_id: u32,
    #[serde(rename = "transactionId", skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<i64>,
    #[serde(rename = "meterValue")]
    pub meter_value: Vec<MeterValue>,
}

#[derive(Debug, Serialize)]
pub struct MeterValue {
    pub timestamp: String,
    #[serde(rename = "sampledValue")]
    pub sampled_value: Vec<SampledValue>,
}

#[derive(Debug, Serialize)]
pub struct SampledValue {
    pub value: String,
    pub measurand: String,
    pub unit: String,
}

#[derive(Debug, Serialize)]
pub struct AuthorizeRequest {
    #[serde(rename = "idTag")]
    pub id_tag: String,
}

#[derive(Debug, Serialize)]
pub struct DataTransferRequest {
    #[serde(rename = "vendorId")]
    pub vendor_id: String,
    #[serde(rename = "messageId", skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}
