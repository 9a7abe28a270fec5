//! `SetVariables` (spec.md §4.F): component/variable/attribute validation,
//! type and bounds checking, the `ConfigurationValueSize`/`ValueSize`
//! effective size limit, MinSet/MaxSet gating, persistence mirroring, and
//! the `HeartbeatInterval`/`WebSocketPingInterval` dynamic side effects.

use crate::error::{truncate_additional_info, VariableReasonCode};
use crate::station::config_store::ConfigurationStore;
use crate::station::runtime::StationSignal;

use super::registry::{AttributeType, DataType, Mutability, Persistence, VariableKey, VariableRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetVariableStatus {
    Accepted,
    Rejected,
    InvalidValue,
    UnknownComponent,
    UnknownVariable,
    NotSupportedAttributeType,
    OutOfRange,
    TooLarge,
    RebootRequired,
}

impl SetVariableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "Accepted",
            Self::Rejected => "Rejected",
            Self::InvalidValue => "InvalidValue",
            Self::UnknownComponent => "UnknownComponent",
            Self::UnknownVariable => "UnknownVariable",
            Self::NotSupportedAttributeType => "NotSupportedAttributeType",
            Self::OutOfRange => "OutOfRange",
            Self::TooLarge => "TooLarge",
            Self::RebootRequired => "RebootRequired",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SetVariableOutcome {
    pub status: SetVariableStatus,
    pub reason_code: VariableReasonCode,
    pub additional_info: Option<String>,
}

impl SetVariableOutcome {
    fn plain(status: SetVariableStatus, reason_code: VariableReasonCode) -> Self {
        Self { status, reason_code, additional_info: None }
    }
}

fn parse_attribute(s: Option<&str>) -> AttributeType {
    match s {
        Some("Target") => AttributeType::Target,
        Some("MinSet") => AttributeType::MinSet,
        Some("MaxSet") => AttributeType::MaxSet,
        _ => AttributeType::Actual,
    }
}

/// Effective SetVariables size limit (spec.md §4.F step 3): the smaller of
/// `DeviceDataCtrlr.ConfigurationValueSize` and `DeviceDataCtrlr.ValueSize`
/// when either is a positive override, else the 2500-character default.
fn effective_set_value_size_limit(config_store: &ConfigurationStore) -> usize {
    let configuration_value_size = config_store
        .get_value("ConfigurationValueSize")
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&n| n > 0);
    let value_size = config_store
        .get_value("ValueSize")
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|&n| n > 0);
    [configuration_value_size, value_size, Some(2500)].into_iter().flatten().min().unwrap_or(2500)
}

fn type_checks_out(data_type: DataType, value: &str) -> bool {
    match data_type {
        DataType::Integer => value.parse::<i64>().is_ok(),
        DataType::Decimal => value.parse::<f64>().is_ok(),
        DataType::Boolean => value == "true" || value == "false",
        DataType::String | DataType::DateTime | DataType::OptionList | DataType::SequenceList | DataType::MemberList => true,
    }
}

/// One `SetVariables.req` item. `signal_tx` receives a
/// [`StationSignal::RestartHeartbeat`]/[`StationSignal::RestartPing`] when
/// the written variable has that dynamic effect (spec.md §4.F).
pub fn set_variable(
    registry: &mut VariableRegistry,
    config_store: &mut ConfigurationStore,
    signal_tx: &tokio::sync::mpsc::UnboundedSender<StationSignal>,
    key: &VariableKey,
    attribute: Option<&str>,
    value: &str,
) -> SetVariableOutcome {
    if !registry.component_exists(&key.component) {
        return SetVariableOutcome::plain(SetVariableStatus::UnknownComponent, VariableReasonCode::NotFound);
    }
    let Some(meta) = registry.lookup(key).cloned() else {
        return SetVariableOutcome::plain(SetVariableStatus::UnknownVariable, VariableReasonCode::NotFound);
    };

    let attribute = parse_attribute(attribute);
    if !meta.supported_attributes.contains(&attribute) {
        return SetVariableOutcome::plain(SetVariableStatus::NotSupportedAttributeType, VariableReasonCode::UnsupportedParam);
    }
    if meta.mutability == Mutability::ReadOnly {
        return SetVariableOutcome::plain(SetVariableStatus::Rejected, VariableReasonCode::ReadOnly);
    }

    let limit = effective_set_value_size_limit(config_store);
    if value.chars().count() > limit {
        return SetVariableOutcome {
            status: SetVariableStatus::TooLarge,
            reason_code: VariableReasonCode::TooLargeElement,
            additional_info: Some(truncate_additional_info(&format!(
                "Value length exceeds effective size limit ({limit})"
            ))),
        };
    }

    if !type_checks_out(meta.data_type, value) {
        return SetVariableOutcome::plain(SetVariableStatus::InvalidValue, VariableReasonCode::InvalidValue);
    }

    if matches!(attribute, AttributeType::MinSet | AttributeType::MaxSet) && meta.data_type != DataType::Integer {
        return SetVariableOutcome::plain(SetVariableStatus::InvalidValue, VariableReasonCode::InvalidValue);
    }

    if matches!(attribute, AttributeType::Actual | AttributeType::Target) {
        if let Ok(numeric) = value.parse::<f64>() {
            let min = registry.min_set_override(key).or(meta.min);
            let max = registry.max_set_override(key).or(meta.max);
            if let Some(min) = min {
                if numeric < min {
                    return SetVariableOutcome::plain(SetVariableStatus::OutOfRange, VariableReasonCode::ValueTooLow);
                }
            }
            if let Some(max) = max {
                if numeric > max {
                    return SetVariableOutcome::plain(SetVariableStatus::OutOfRange, VariableReasonCode::ValueTooHigh);
                }
            }
        }
    }

    if let Ok(new_bound) = value.parse::<f64>() {
        match attribute {
            AttributeType::MinSet => {
                if let Some(max) = registry.max_set_override(key).or(meta.max) {
                    if new_bound > max {
                        return SetVariableOutcome::plain(SetVariableStatus::InvalidValue, VariableReasonCode::InvalidValue);
                    }
                }
            }
            AttributeType::MaxSet => {
                if let Some(min) = registry.min_set_override(key).or(meta.min) {
                    if new_bound < min {
                        return SetVariableOutcome::plain(SetVariableStatus::InvalidValue, VariableReasonCode::InvalidValue);
                    }
                }
            }
            AttributeType::Actual | AttributeType::Target => {}
        }
    }

    let previous_value = match attribute {
        AttributeType::Actual | AttributeType::Target => registry
            .volatile_get(key)
            .map(str::to_string)
            .or_else(|| config_store.get_value(&key.store_key()).map(str::to_string))
            .or_else(|| meta.default_value.clone()),
        AttributeType::MinSet | AttributeType::MaxSet => None,
    };

    match attribute {
        AttributeType::MinSet => {
            registry.set_min_max_override(key, value.parse().ok(), None);
        }
        AttributeType::MaxSet => {
            registry.set_min_max_override(key, None, value.parse().ok());
        }
        AttributeType::Actual | AttributeType::Target => {
            let never_persist = key.component == "SecurityCtrlr" && key.variable == "OrganizationName";
            if meta.persistence == Persistence::Persistent && !never_persist {
                config_store.put(key.store_key(), value.to_string());
            } else {
                registry.volatile_put(key.clone(), value.to_string());
            }

            if key.component == "OCPPCommCtrlr" && key.variable == "HeartbeatInterval" {
                if let Ok(seconds) = value.parse::<u64>() {
                    config_store.put_heartbeat_interval_seconds(seconds);
                    let _ = signal_tx.send(StationSignal::RestartHeartbeat { interval_ms: seconds * 1000 });
                }
            }
            if key.component == "OCPPCommCtrlr" && key.variable == "WebSocketPingInterval" {
                if let Ok(seconds) = value.parse::<u64>() {
                    let _ = signal_tx.send(StationSignal::RestartPing { interval_secs: seconds });
                }
            }
        }
    }

    registry.clear_invalid(key);

    // RebootRequired only fires when the write actually moved the value
    // (spec.md §4.F step 9: `rebootRequired ∧ previousValue ≠ newValue`).
    let value_changed = previous_value.as_deref() != Some(value);
    if meta.reboot_required && value_changed {
        SetVariableOutcome::plain(SetVariableStatus::RebootRequired, VariableReasonCode::NoError)
    } else {
        SetVariableOutcome::plain(SetVariableStatus::Accepted, VariableReasonCode::NoError)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sender() -> tokio::sync::mpsc::UnboundedSender<StationSignal> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        std::mem::forget(rx);
        tx
    }

    #[test]
    fn unknown_variable_is_rejected() {
        let mut registry = VariableRegistry::standard();
        let mut store = ConfigurationStore::default();
        let key = VariableKey::new("OCPPCommCtrlr", "Nope");
        let outcome = set_variable(&mut registry, &mut store, &sender(), &key, None, "1");
        assert_eq!(outcome.status, SetVariableStatus::UnknownVariable);
    }

    #[test]
    fn readonly_variable_is_rejected() {
        let mut registry = VariableRegistry::standard();
        let mut store = ConfigurationStore::default();
        let key = VariableKey::new("OCPPCommCtrlr", "ProtocolVersion");
        let outcome = set_variable(&mut registry, &mut store, &sender(), &key, None, "3.0");
        assert_eq!(outcome.status, SetVariableStatus::Rejected);
        assert_eq!(outcome.reason_code, VariableReasonCode::ReadOnly);
    }

    #[test]
    fn value_exceeding_configuration_size_is_too_large() {
        let mut registry = VariableRegistry::standard();
        let mut store = ConfigurationStore::default();
        store.put("ConfigurationValueSize", "4");
        let key = VariableKey::new("SecurityCtrlr", "OrganizationName");
        let outcome = set_variable(&mut registry, &mut store, &sender(), &key, None, "AcmeCorp");
        assert_eq!(outcome.status, SetVariableStatus::TooLarge);
    }

    #[test]
    fn value_size_narrower_than_configuration_value_size_still_applies() {
        // spec.md §8.4: ValueSize=10, ConfigurationValueSize=20, a
        // length-11 value is Rejected(TooLargeElement) even though it sits
        // under ConfigurationValueSize alone.
        let mut registry = VariableRegistry::standard();
        let mut store = ConfigurationStore::default();
        store.put("ValueSize", "10");
        store.put("ConfigurationValueSize", "20");
        let key = VariableKey::new("SecurityCtrlr", "OrganizationName");
        let outcome = set_variable(&mut registry, &mut store, &sender(), &key, None, "AcmeCorpXX");
        assert_eq!(outcome.status, SetVariableStatus::TooLarge);
        assert_eq!(outcome.reason_code, VariableReasonCode::TooLargeElement);
        assert_eq!(
            outcome.additional_info.as_deref(),
            Some("Value length exceeds effective size limit (10)")
        );
    }

    #[test]
    fn min_set_on_non_integer_variable_is_invalid() {
        // spec.md §4.F step 5: MinSet/MaxSet Sets are only valid for
        // integer dataType, even when the variable otherwise accepts them.
        let mut registry = VariableRegistry::standard();
        let mut store = ConfigurationStore::default();
        let key = VariableKey::new("SampledDataCtrlr", "VoltageRipple");
        let outcome = set_variable(&mut registry, &mut store, &sender(), &key, Some("MinSet"), "1.0");
        assert_eq!(outcome.status, SetVariableStatus::InvalidValue);
        assert_eq!(outcome.reason_code, VariableReasonCode::InvalidValue);
    }

    #[test]
    fn min_set_above_current_max_is_invalid() {
        let mut registry = VariableRegistry::standard();
        let mut store = ConfigurationStore::default();
        let key = VariableKey::new("OCPPCommCtrlr", "HeartbeatInterval");
        // HeartbeatInterval's metadata max is 86_400; a MinSet above it
        // violates MinSet <= MaxSet.
        let outcome = set_variable(&mut registry, &mut store, &sender(), &key, Some("MinSet"), "100000");
        assert_eq!(outcome.status, SetVariableStatus::InvalidValue);
        assert_eq!(outcome.reason_code, VariableReasonCode::InvalidValue);
    }

    #[test]
    fn reboot_required_variable_accepted_without_reboot_status_when_value_unchanged() {
        let mut registry = VariableRegistry::standard();
        let mut store = ConfigurationStore::default();
        let key = VariableKey::new("SecurityCtrlr", "BasicAuthPassword");

        let first = set_variable(&mut registry, &mut store, &sender(), &key, None, "secret");
        assert_eq!(first.status, SetVariableStatus::RebootRequired);

        let second = set_variable(&mut registry, &mut store, &sender(), &key, None, "secret");
        assert_eq!(second.status, SetVariableStatus::Accepted);
    }

    #[test]
    fn heartbeat_interval_out_of_bounds_is_rejected() {
        let mut registry = VariableRegistry::standard();
        let mut store = ConfigurationStore::default();
        let key = VariableKey::new("OCPPCommCtrlr", "HeartbeatInterval");
        let outcome = set_variable(&mut registry, &mut store, &sender(), &key, None, "999999");
        assert_eq!(outcome.status, SetVariableStatus::OutOfRange);
        assert_eq!(outcome.reason_code, VariableReasonCode::ValueTooHigh);
    }

    #[test]
    fn heartbeat_interval_write_persists_and_mirrors_legacy_key() {
        let mut registry = VariableRegistry::standard();
        let mut store = ConfigurationStore::default();
        let key = VariableKey::new("OCPPCommCtrlr", "HeartbeatInterval");
        let outcome = set_variable(&mut registry, &mut store, &sender(), &key, None, "30");
        assert_eq!(outcome.status, SetVariableStatus::Accepted);
        assert_eq!(store.get_value("HeartBeatInterval"), Some("30"));
    }

    #[test]
    fn organization_name_is_never_persisted_to_the_config_store() {
        let mut registry = VariableRegistry::standard();
        let mut store = ConfigurationStore::default();
        let key = VariableKey::new("SecurityCtrlr", "OrganizationName");
        let outcome = set_variable(&mut registry, &mut store, &sender(), &key, None, "Acme");
        assert_eq!(outcome.status, SetVariableStatus::Accepted);
        assert!(store.get_value("OrganizationName").is_none());
        assert_eq!(registry.volatile_get(&key), Some("Acme"));
    }
}
