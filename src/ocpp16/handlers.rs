//! Incoming (Central System -> station) handlers for OCPP 1.6J
//! (spec.md §4.E "Selected handler contracts").

use serde_json::{json, Value};

use crate::error::{OcppError, OcppErrorCode};
use crate::station::config_store::ConfigurationSetOutcome;
use crate::station::connector::{
    ChargingProfile, ChargingProfileKind, ChargingProfilePurpose, ChargingRateUnit, ChargingSchedulePeriod,
};
use crate::station::runtime::{IncomingDeps, StationSignal, StationState};

const REMOTE_START_DELAY_SECS: u64 = 0; // the default 500ms is applied by the scheduler, see `schedule_start`.
const DEFAULT_RESET_TIME_SECS: u64 = 60;

pub fn handle_reset(state: &mut StationState, deps: &IncomingDeps<'_>, payload: &Value) -> Result<Value, OcppError> {
    let reset_type = payload.get("type").and_then(Value::as_str).unwrap_or("Soft").to_string();
    let delay = deps
        .template
        .reset_time_secs
        .max(1)
        .min(DEFAULT_RESET_TIME_SECS.max(deps.template.reset_time_secs));
    let _ = deps.signal_tx.send(StationSignal::Reset {
        reason: format!("{reset_type}Reset"),
        delay_secs: delay,
    });
    let _ = state;
    Ok(json!({"status": "Accepted"}))
}

pub fn handle_change_configuration(state: &mut StationState, deps: &IncomingDeps<'_>, payload: &Value) -> Result<Value, OcppError> {
    let key = payload
        .get("key")
        .and_then(Value::as_str)
        .ok_or_else(|| OcppError::new(OcppErrorCode::FormationViolation, "missing key"))?;
    let value = payload
        .get("value")
        .and_then(Value::as_str)
        .ok_or_else(|| OcppError::new(OcppErrorCode::FormationViolation, "missing value"))?;

    if key == "HeartBeatInterval" || key == "HeartbeatInterval" {
        let outcome = state.config_store.change(key, value);
        if outcome != ConfigurationSetOutcome::NotSupported && outcome != ConfigurationSetOutcome::Rejected {
            if let Ok(seconds) = value.parse::<u64>() {
                state.config_store.put_heartbeat_interval_seconds(seconds);
                let _ = deps.signal_tx.send(StationSignal::RestartHeartbeat {
                    interval_ms: seconds * 1000,
                });
            }
        }
        return Ok(json!({"status": outcome_status(outcome)}));
    }

    let outcome = state.config_store.change(key, value);
    Ok(json!({"status": outcome_status(outcome)}))
}

fn outcome_status(outcome: ConfigurationSetOutcome) -> &'static str {
    match outcome {
        ConfigurationSetOutcome::Accepted => "Accepted",
        ConfigurationSetOutcome::RebootRequired => "RebootRequired",
        ConfigurationSetOutcome::Rejected => "Rejected",
        ConfigurationSetOutcome::NotSupported => "NotSupported",
    }
}

pub fn handle_get_configuration(state: &StationState, payload: &Value) -> Result<Value, OcppError> {
    let requested: Option<Vec<String>> = payload.get("key").and_then(|v| v.as_array()).map(|arr| {
        arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect()
    });

    let mut configuration_key = Vec::new();
    let mut unknown_key = Vec::new();

    match requested {
        Some(keys) => {
            for key in keys {
                match state.config_store.get(&key) {
                    Some(entry) if entry.visible => configuration_key.push(json!({
                        "key": entry.key,
                        "readonly": entry.readonly,
                        "value": entry.value,
                    })),
                    Some(_) => {}
                    None => unknown_key.push(key),
                }
            }
        }
        None => {
            for entry in state.config_store.all().iter().filter(|e| e.visible) {
                configuration_key.push(json!({
                    "key": entry.key,
                    "readonly": entry.readonly,
                    "value": entry.value,
                }));
            }
        }
    }

    Ok(json!({"configurationKey": configuration_key, "unknownKey": unknown_key}))
}

pub fn handle_change_availability(state: &mut StationState, payload: &Value) -> Result<Value, OcppError> {
    let connector_id = payload.get("connectorId").and_then(Value::as_u64).unwrap_or(0) as u32;
    let availability_type = payload.get("type").and_then(Value::as_str).unwrap_or("Operative");

    let Some(connector) = state.connector_mut(connector_id) else {
        return Ok(json!({"status": "Rejected"}));
    };
    if connector.has_active_transaction() {
        return Ok(json!({"status": "Scheduled"}));
    }
    connector.availability = if availability_type == "Inoperative" {
        crate::station::connector::Availability::Inoperative
    } else {
        crate::station::connector::Availability::Operative
    };
    Ok(json!({"status": "Accepted"}))
}

/// RemoteStart (spec.md §4.E): accepted iff the connector exists, has no
/// active transaction, and (when `LocalAuthListEnabled` +
/// `AuthorizeRemoteTxRequests`) the idTag is locally authorized.
pub fn handle_remote_start_transaction(
    state: &StationState,
    deps: &IncomingDeps<'_>,
    payload: &Value,
) -> Result<Value, OcppError> {
    let connector_id = payload.get("connectorId").and_then(Value::as_u64).unwrap_or(0) as u32;
    let id_tag = payload
        .get("idTag")
        .and_then(Value::as_str)
        .ok_or_else(|| OcppError::new(OcppErrorCode::FormationViolation, "missing idTag"))?
        .to_string();

    let connector_ok = matches!(state.connector(connector_id), Some(c) if c.id != 0 && !c.has_active_transaction());
    if !connector_ok {
        return Ok(json!({"status": "Rejected"}));
    }

    let local_auth_list_enabled = state.config_store.get_value("LocalAuthListEnabled") == Some("true");
    let authorize_remote_tx_requests = state.config_store.get_value("AuthorizeRemoteTxRequests") == Some("true");

    if local_auth_list_enabled && authorize_remote_tx_requests {
        let decision = deps.auth.check_local(&id_tag);
        if decision.status != crate::auth::unified::AuthStatus::Accepted {
            return Ok(json!({"status": "Rejected"}));
        }
    }

    let _ = deps.signal_tx.send(StationSignal::ScheduledStartTransaction { connector_id, id_tag });
    let _ = REMOTE_START_DELAY_SECS;
    Ok(json!({"status": "Accepted"}))
}

pub fn handle_remote_stop_transaction(state: &StationState, deps: &IncomingDeps<'_>, payload: &Value) -> Result<Value, OcppError> {
    let transaction_id = payload.get("transactionId").and_then(Value::as_i64).unwrap_or(-1).to_string();
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
        Ok(json!({"status": "NotSupported"}))
    }
}

pub fn handle_set_charging_profile(state: &mut StationState, payload: &Value) -> Result<Value, OcppError> {
    let connector_id = payload.get("connectorId").and_then(Value::as_u64).unwrap_or(0) as u32;
    let profile_payload = payload
        .get("csChargingProfiles")
        .ok_or_else(|| OcppError::new(OcppErrorCode::FormationViolation, "missing csChargingProfiles"))?;

    let profile = parse_charging_profile(profile_payload)
        .ok_or_else(|| OcppError::new(OcppErrorCode::PropertyConstraintViolation, "invalid charging profile"))?;

    let Some(connector) = state.connector_mut(connector_id) else {
        return Ok(json!({"status": "Rejected"}));
    };
    connector.set_profile(profile);
    Ok(json!({"status": "Accepted"}))
}

pub fn handle_clear_charging_profile(state: &mut StationState, payload: &Value) -> Result<Value, OcppError> {
    let id = payload.get("id").and_then(Value::as_i64).map(|n| n as i32);
    let stack_level = payload.get("stackLevel").and_then(Value::as_i64).map(|n| n as i32);
    let purpose = payload
        .get("chargingProfilePurpose")
        .and_then(Value::as_str)
        .and_then(parse_purpose);

    let mut cleared = 0;
    for connector in state.connectors.values_mut() {
        cleared += connector.clear_profiles(id, purpose, stack_level);
    }
    Ok(json!({"status": if cleared > 0 { "Accepted" } else { "Unknown" }}))
}

fn parse_purpose(s: &str) -> Option<ChargingProfilePurpose> {
    match s {
        "ChargePointMaxProfile" => Some(ChargingProfilePurpose::ChargePointMaxProfile),
        "TxDefaultProfile" => Some(ChargingProfilePurpose::TxDefaultProfile),
        "TxProfile" => Some(ChargingProfilePurpose::TxProfile),
        _ => None,
    }
}

fn parse_charging_profile(v: &Value) -> Option<ChargingProfile> {
    let purpose = parse_purpose(v.get("chargingProfilePurpose")?.as_str()?)?;
    let kind = match v.get("chargingProfileKind")?.as_str()? {
        "Absolute" => ChargingProfileKind::Absolute,
        "Recurring" => match v.get("recurrencyKind").and_then(Value::as_str).unwrap_or("Daily") {
            "Weekly" => ChargingProfileKind::RecurringWeekly,
            _ => ChargingProfileKind::RecurringDaily,
        },
        "Relative" => ChargingProfileKind::Relative,
        _ => return None,
    };
    let schedule = v.get("chargingSchedule")?;
    let unit = match schedule.get("chargingRateUnit")?.as_str()? {
        "A" => ChargingRateUnit::A,
        _ => ChargingRateUnit::W,
    };
    let periods = schedule
        .get("chargingSchedulePeriod")?
        .as_array()?
        .iter()
        .filter_map(|p| {
            Some(ChargingSchedulePeriod {
                start_period_seconds: p.get("startPeriod")?.as_i64()?,
                limit: p.get("limit")?.as_f64()?,
                number_phases: p.get("numberPhases").and_then(Value::as_u64).map(|n| n as u32),
            })
        })
        .collect();

    Some(ChargingProfile {
        profile_id: v.get("chargingProfileId")?.as_i64()? as i32,
        stack_level: v.get("stackLevel")?.as_i64()? as i32,
        purpose,
        kind,
        charging_rate_unit: unit,
        start_schedule: schedule
            .get("startSchedule")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok()),
        duration_seconds: schedule.get("duration").and_then(Value::as_i64),
        periods,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::template::StationTemplate;

    fn template() -> StationTemplate {
        StationTemplate::parse(
            "t.json",
            r#"{"baseName":"CP","supervisionUrls":["ws://h"],"numberOfConnectors":1}"#,
        )
        .unwrap()
    }

    #[test]
    fn remote_start_rejects_when_connector_busy() {
        let tpl = template();
        let mut state = StationState::new(&tpl);
        state.connector_mut(1).unwrap().start_transaction("1".into(), "X".into(), chrono::Utc::now(), false);
        let deps = IncomingDeps::test_fixture(&tpl);
        let result = handle_remote_start_transaction(&state, &deps, &json!({"connectorId": 1, "idTag": "AAA"})).unwrap();
        assert_eq!(result["status"], "Rejected");
    }

    #[test]
    fn remote_start_accepts_available_connector_without_local_list() {
        let tpl = template();
        let state = StationState::new(&tpl);
        let deps = IncomingDeps::test_fixture(&tpl);
        let result = handle_remote_start_transaction(&state, &deps, &json!({"connectorId": 1, "idTag": "AAA"})).unwrap();
        assert_eq!(result["status"], "Accepted");
    }

    #[test]
    fn change_configuration_unknown_key_is_not_supported() {
        let tpl = template();
        let mut state = StationState::new(&tpl);
        let deps = IncomingDeps::test_fixture(&tpl);
        let result = handle_change_configuration(&mut state, &deps, &json!({"key": "Nope", "value": "1"})).unwrap();
        assert_eq!(result["status"], "NotSupported");
    }
}
