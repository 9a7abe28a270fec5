//! Command vocabulary for the broadcast control plane (spec.md §4.K).

use serde_json::Value;

/// A parsed control-plane command name. `OcppAction` covers the direct
/// pass-through OCPP actions (`StartTransaction`, `Authorize`, ...):
/// their payload is forwarded to the correlator verbatim, so no separate
/// variant per action is needed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    StartStation,
    StopStation,
    OpenConnection,
    CloseConnection,
    StartAtg,
    StopAtg,
    SetSupervisionUrl,
    OcppAction(&'static str),
}

const OCPP_ACTIONS: &[&str] = &[
    "StartTransaction",
    "StopTransaction",
    "Authorize",
    "BootNotification",
    "StatusNotification",
    "Heartbeat",
    "MeterValues",
    "DataTransfer",
    "DiagnosticsStatusNotification",
    "FirmwareStatusNotification",
];

impl ControlCommand {
    /// Parses the `command` field of an inbound control-plane request
    /// (spec.md §4.K). Unknown names return `None`, which the listener
    /// turns into a `Failure` response rather than a panic.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "StartStation" => Some(Self::StartStation),
            "StopStation" => Some(Self::StopStation),
            "OpenConnection" => Some(Self::OpenConnection),
            "CloseConnection" => Some(Self::CloseConnection),
            "StartATG" => Some(Self::StartAtg),
            "StopATG" => Some(Self::StopAtg),
            "SetSupervisionUrl" => Some(Self::SetSupervisionUrl),
            _ => OCPP_ACTIONS.iter().find(|&&a| a == name).map(|&a| Self::OcppAction(a)),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::StartStation => "StartStation",
            Self::StopStation => "StopStation",
            Self::OpenConnection => "OpenConnection",
            Self::CloseConnection => "CloseConnection",
            Self::StartAtg => "StartATG",
            Self::StopAtg => "StopATG",
            Self::SetSupervisionUrl => "SetSupervisionUrl",
            Self::OcppAction(a) => a,
        }
    }
}

/// Classifies a CALLRESULT payload into the control-plane's `Success` /
/// `Failure` response status (spec.md §4.K). Direct OCPP actions carry
/// their own status field under different keys depending on the action;
/// anything without a recognizable status field but that did come back
/// as a CALLRESULT at all counts as `Success` (e.g. `Heartbeat`'s bare
/// `currentTime` reply, `StatusNotification`'s empty object reply).
pub fn classify_response(response: &Value) -> bool {
    if let Some(status) = response.get("idTagInfo").and_then(|v| v.get("status")).and_then(Value::as_str) {
        return status == "Accepted";
    }
    if let Some(status) = response.get("status").and_then(Value::as_str) {
        return status == "Accepted";
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_management_commands() {
        assert_eq!(ControlCommand::parse("StartStation"), Some(ControlCommand::StartStation));
        assert_eq!(ControlCommand::parse("StopATG"), Some(ControlCommand::StopAtg));
        assert_eq!(ControlCommand::parse("NotACommand"), None);
    }

    #[test]
    fn parses_direct_ocpp_actions() {
        assert_eq!(ControlCommand::parse("Heartbeat"), Some(ControlCommand::OcppAction("Heartbeat")));
        assert_eq!(
            ControlCommand::parse("FirmwareStatusNotification"),
            Some(ControlCommand::OcppAction("FirmwareStatusNotification"))
        );
    }

    #[test]
    fn classifies_id_tag_info_status() {
        assert!(classify_response(&serde_json::json!({"idTagInfo": {"status": "Accepted"}})));
        assert!(!classify_response(&serde_json::json!({"idTagInfo": {"status": "Blocked"}})));
    }

    #[test]
    fn classifies_bare_status_field() {
        assert!(classify_response(&serde_json::json!({"status": "Accepted"})));
        assert!(!classify_response(&serde_json::json!({"status": "Rejected"})));
    }

    #[test]
    fn defaults_to_success_without_status_field() {
        assert!(classify_response(&serde_json::json!({"currentTime": "2026-08-01T00:00:00Z"})));
    }
}
