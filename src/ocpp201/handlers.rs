//! Incoming (Central System -> station) handlers for OCPP 2.0.1
//! (spec.md §4.E, §4.F).

use serde_json::{json, Value};

use crate::error::{OcppError, OcppErrorCode};
use crate::station::config_store::ConfigurationStore;
use crate::station::runtime::{IncomingDeps, StationSignal, StationState};

use super::variables::get::{get_variable, key_from_payload, GetVariableStatus};
use super::variables::registry::VariableRegistry;
use super::variables::set::{set_variable, SetVariableStatus};

const DEFAULT_RESET_DELAY_SECS: u64 = 5;

fn registry_mut<'a>(
    variables: &'a mut Option<VariableRegistry>,
    config_store: &mut ConfigurationStore,
) -> &'a mut VariableRegistry {
    let is_new = variables.is_none();
    let registry = variables.get_or_insert_with(VariableRegistry::standard);
    if is_new {
        registry.perform_mapping_self_check(config_store);
    }
    registry
}

pub fn handle_reset(state: &mut StationState, deps: &IncomingDeps<'_>, payload: &Value) -> Result<Value, OcppError> {
    let reset_type = payload.get("type").and_then(Value::as_str).unwrap_or("Immediate").to_string();
    let _ = deps.signal_tx.send(StationSignal::Reset {
        reason: format!("{reset_type}Reset"),
        delay_secs: DEFAULT_RESET_DELAY_SECS,
    });
    let _ = state;
    Ok(json!({"status": "Accepted"}))
}

/// `GetVariables` (spec.md §4.F): resolves every requested
/// `(component, variable, attribute)` tuple independently and returns one
/// result per item, never failing the whole batch for one bad entry.
pub fn handle_get_variables(state: &mut StationState, payload: &Value) -> Result<Value, OcppError> {
    let items = payload
        .get("getVariableData")
        .and_then(Value::as_array)
        .ok_or_else(|| OcppError::new(OcppErrorCode::FormationViolation, "missing getVariableData"))?;

    let registry = registry_mut(&mut state.variables, &mut state.config_store);
    let mut results = Vec::with_capacity(items.len());
    for item in items {
        let Some(key) = key_from_payload(item) else {
            results.push(json!({
                "attributeStatus": "UnknownVariable",
                "component": item.get("component").cloned().unwrap_or(Value::Null),
                "variable": item.get("variable").cloned().unwrap_or(Value::Null),
            }));
            continue;
        };
        let attribute = item.get("attributeType").and_then(Value::as_str);
        let outcome = get_variable(registry, &state.config_store, &key, attribute);
        let mut entry = json!({
            "attributeStatus": outcome.status.as_str(),
            "component": {"name": key.component},
            "variable": {"name": key.variable},
        });
        if outcome.status == GetVariableStatus::Accepted {
            entry["attributeValue"] = json!(outcome.attribute_value);
        } else {
            entry["attributeStatusInfo"] = json!({"reasonCode": outcome.reason_code.as_str()});
        }
        results.push(entry);
    }
    Ok(json!({"getVariableResult": results}))
}

/// `SetVariables` (spec.md §4.F): applies every item, collecting a
/// per-item status; `RebootRequired` on any item propagates no special
/// batch-level effect beyond what the item itself reports.
pub fn handle_set_variables(state: &mut StationState, deps: &IncomingDeps<'_>, payload: &Value) -> Result<Value, OcppError> {
    let items = payload
        .get("setVariableData")
        .and_then(Value::as_array)
        .ok_or_else(|| OcppError::new(OcppErrorCode::FormationViolation, "missing setVariableData"))?;

    let registry = registry_mut(&mut state.variables, &mut state.config_store);
    let mut results = Vec::with_capacity(items.len());
    for item in items {
        let Some(key) = key_from_payload(item) else {
            results.push(json!({
                "attributeStatus": "UnknownVariable",
                "component": item.get("component").cloned().unwrap_or(Value::Null),
                "variable": item.get("variable").cloned().unwrap_or(Value::Null),
            }));
            continue;
        };
        let attribute = item.get("attributeType").and_then(Value::as_str);
        let Some(value) = item.get("attributeValue").and_then(Value::as_str) else {
            results.push(json!({
                "attributeStatus": "Rejected",
                "component": {"name": key.component},
                "variable": {"name": key.variable},
            }));
            continue;
        };
        let outcome = set_variable(registry, &mut state.config_store, &deps.signal_tx, &key, attribute, value);
        let mut entry = json!({
            "attributeStatus": outcome.status.as_str(),
            "component": {"name": key.component},
            "variable": {"name": key.variable},
        });
        if outcome.status != SetVariableStatus::Accepted && outcome.status != SetVariableStatus::RebootRequired {
            let mut status_info = json!({"reasonCode": outcome.reason_code.as_str()});
            if let Some(additional_info) = &outcome.additional_info {
                status_info["additionalInfo"] = json!(additional_info);
            }
            entry["attributeStatusInfo"] = status_info;
        }
        results.push(entry);
    }
    Ok(json!({"setVariableResult": results}))
}

pub fn handle_change_availability(state: &mut StationState, payload: &Value) -> Result<Value, OcppError> {
    let connector_id = payload
        .get("evse")
        .and_then(|e| e.get("connectorId"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let operative = payload.get("operationalStatus").and_then(Value::as_str).unwrap_or("Operative");

    let Some(connector) = state.connector_mut(connector_id) else {
        return Ok(json!({"status": "Rejected"}));
    };
    if connector.has_active_transaction() {
        return Ok(json!({"status": "Scheduled"}));
    }
    connector.availability = if operative == "Inoperative" {
        crate::station::connector::Availability::Inoperative
    } else {
        crate::station::connector::Availability::Operative
    };
    Ok(json!({"status": "Accepted"}))
}

/// `RequestStartTransaction` — 2.0.1's RemoteStartTransaction equivalent
/// (spec.md §4.E).
pub fn handle_request_start_transaction(
    state: &StationState,
    deps: &IncomingDeps<'_>,
    payload: &Value,
) -> Result<Value, OcppError> {
    let connector_id = payload
        .get("evseId")
        .and_then(Value::as_u64)
        .unwrap_or(0) as u32;
    let id_tag = payload
        .get("idToken")
        .and_then(|t| t.get("idToken"))
        .and_then(Value::as_str)
        .ok_or_else(|| OcppError::new(OcppErrorCode::FormationViolation, "missing idToken"))?
        .to_string();

    let connector_ok = matches!(state.connector(connector_id), Some(c) if c.id != 0 && !c.has_active_transaction());
    if !connector_ok {
        return Ok(json!({"status": "Rejected"}));
    }

    let authorize_remote_start = state.config_store.get_value("AuthorizeRemoteStart") == Some("true");
    if authorize_remote_start {
        let decision = deps.auth.check_local(&id_tag);
        if decision.status != crate::auth::unified::AuthStatus::Accepted {
            return Ok(json!({"status": "Rejected"}));
        }
    }

    let _ = deps.signal_tx.send(StationSignal::ScheduledStartTransaction { connector_id, id_tag });
    Ok(json!({"status": "Accepted", "transactionId": uuid_like_id()}))
}

pub fn handle_request_stop_transaction(state: &StationState, deps: &IncomingDeps<'_>, payload: &Value) -> Result<Value, OcppError> {
    let transaction_id = payload.get("transactionId").and_then(Value::as_str).unwrap_or("").to_string();
    let connector_id = state
        .connectors
        .values()
        .find(|c| c.transaction.transaction_id.as_deref() == Some(transaction_id.as_str()))
        .map(|c| c.id);

    match connector_id {
        Some(id) => {
            let _ = deps.signal_tx.send(StationSignal::ScheduledStopTransaction {
                connector_id: id,
                reason: "Remote".to_string(),
            });
            Ok(json!({"status": "Accepted"}))
        }
        None => Ok(json!({"status": "Rejected"})),
    }
}

pub fn handle_unlock_connector(state: &StationState, payload: &Value) -> Result<Value, OcppError> {
    let connector_id = payload.get("connectorId").and_then(Value::as_u64).unwrap_or(0) as u32;
    if state.connector(connector_id).is_some() {
        Ok(json!({"status": "Unlocked"}))
    } else {
        Ok(json!({"status": "UnknownConnector"}))
    }
}

/// Generates a short synthetic transaction id; the real identifier is the
/// one the station itself assigned when the deferred start actually runs.
fn uuid_like_id() -> String {
    use rand::Rng;
    let n: u64 = rand::thread_rng().gen_range(100_000_000..999_999_999);
    n.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::template::StationTemplate;

    fn template() -> StationTemplate {
        StationTemplate::parse(
            "t.json",
            r#"{"baseName":"CP","supervisionUrls":["ws://h"],"numberOfConnectors":1,"ocppVersion":"2.0.1"}"#,
        )
        .unwrap()
    }

    #[test]
    fn get_variables_reports_unknown_component() {
        let tpl = template();
        let mut state = StationState::new(&tpl);
        let payload = json!({"getVariableData": [{"component": {"name": "NopeCtrlr"}, "variable": {"name": "X"}}]});
        let result = handle_get_variables(&mut state, &payload).unwrap();
        assert_eq!(result["getVariableResult"][0]["attributeStatus"], "UnknownComponent");
    }

    #[test]
    fn set_variables_round_trips_heartbeat_interval() {
        let tpl = template();
        let mut state = StationState::new(&tpl);
        let deps = IncomingDeps::test_fixture(&tpl);
        let payload = json!({"setVariableData": [{
            "component": {"name": "OCPPCommCtrlr"},
            "variable": {"name": "HeartbeatInterval"},
            "attributeValue": "45",
        }]});
        let result = handle_set_variables(&mut state, &deps, &payload).unwrap();
        assert_eq!(result["setVariableResult"][0]["attributeStatus"], "Accepted");
        assert_eq!(state.config_store.get_value("HeartbeatInterval"), Some("45"));
    }

    #[test]
    fn request_start_transaction_rejects_busy_connector() {
        let tpl = template();
        let mut state = StationState::new(&tpl);
        state.connector_mut(1).unwrap().start_transaction("1".into(), "X".into(), chrono::Utc::now(), false);
        let deps = IncomingDeps::test_fixture(&tpl);
        let payload = json!({"evseId": 1, "idToken": {"idToken": "AAA", "type": "Central"}});
        let result = handle_request_start_transaction(&state, &deps, &payload).unwrap();
        assert_eq!(result["status"], "Rejected");
    }
}
