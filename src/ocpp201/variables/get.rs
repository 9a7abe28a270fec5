//! `GetVariables` (spec.md §4.F): validates component/variable/attribute,
//! resolves the value from the volatile override, the persistent store, or
//! the metadata default, then truncates against `DeviceDataCtrlr.ValueSize`
//! and finally `ReportingValueSize`.

use serde_json::Value;

use crate::error::VariableReasonCode;
use crate::station::config_store::ConfigurationStore;

use super::registry::{AttributeType, Mutability, VariableKey, VariableRegistry};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GetVariableStatus {
    Accepted,
    Rejected,
    UnknownComponent,
    UnknownVariable,
    NotSupportedAttributeType,
}

impl GetVariableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "Accepted",
            Self::Rejected => "Rejected",
            Self::UnknownComponent => "UnknownComponent",
            Self::UnknownVariable => "UnknownVariable",
            Self::NotSupportedAttributeType => "NotSupportedAttributeType",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GetVariableOutcome {
    pub status: GetVariableStatus,
    pub attribute_value: Option<String>,
    pub reason_code: VariableReasonCode,
}

fn parse_attribute(s: Option<&str>) -> AttributeType {
    match s {
        Some("Target") => AttributeType::Target,
        Some("MinSet") => AttributeType::MinSet,
        Some("MaxSet") => AttributeType::MaxSet,
        _ => AttributeType::Actual,
    }
}

fn value_size(config_store: &ConfigurationStore) -> usize {
    config_store
        .get_value("ValueSize")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(2500)
}

fn reporting_value_size(config_store: &ConfigurationStore) -> usize {
    config_store
        .get_value("ReportingValueSize")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(2500)
}

/// One `GetVariables.req` item, resolved against the registry and the
/// persistent store.
pub fn get_variable(
    registry: &VariableRegistry,
    config_store: &ConfigurationStore,
    key: &VariableKey,
    attribute: Option<&str>,
) -> GetVariableOutcome {
    if !registry.component_exists(&key.component) {
        return GetVariableOutcome {
            status: GetVariableStatus::UnknownComponent,
            attribute_value: None,
            reason_code: VariableReasonCode::NotFound,
        };
    }
    let Some(meta) = registry.lookup(key) else {
        return GetVariableOutcome {
            status: GetVariableStatus::UnknownVariable,
            attribute_value: None,
            reason_code: VariableReasonCode::NotFound,
        };
    };

    let attribute = parse_attribute(attribute);
    if !meta.supported_attributes.contains(&attribute) {
        return GetVariableOutcome {
            status: GetVariableStatus::NotSupportedAttributeType,
            attribute_value: None,
            reason_code: VariableReasonCode::UnsupportedParam,
        };
    }
    if meta.mutability == Mutability::WriteOnly {
        return GetVariableOutcome {
            status: GetVariableStatus::Rejected,
            attribute_value: None,
            reason_code: VariableReasonCode::WriteOnly,
        };
    }

    let value = match attribute {
        AttributeType::MinSet => registry
            .min_set_override(key)
            .map(|v| v.to_string())
            .or_else(|| meta.min.map(|v| v.to_string())),
        AttributeType::MaxSet => registry
            .max_set_override(key)
            .map(|v| v.to_string())
            .or_else(|| meta.max.map(|v| v.to_string())),
        AttributeType::Actual | AttributeType::Target => registry
            .volatile_get(key)
            .map(str::to_string)
            .or_else(|| config_store.get_value(&key.store_key()).map(str::to_string))
            .or_else(|| meta.default_value.clone()),
    };

    let Some(value) = value else {
        return GetVariableOutcome {
            status: GetVariableStatus::Rejected,
            attribute_value: None,
            reason_code: VariableReasonCode::NotFound,
        };
    };

    // spec.md §4.F step 6: truncate by DeviceDataCtrlr.ValueSize first,
    // then by ReportingValueSize.
    let device_limit = value_size(config_store);
    let value: String = if value.chars().count() > device_limit {
        value.chars().take(device_limit).collect()
    } else {
        value
    };
    let reporting_limit = reporting_value_size(config_store);
    let value = if value.chars().count() > reporting_limit {
        value.chars().take(reporting_limit).collect()
    } else {
        value
    };

    GetVariableOutcome {
        status: GetVariableStatus::Accepted,
        attribute_value: Some(value),
        reason_code: VariableReasonCode::NoError,
    }
}

pub fn key_from_payload(item: &Value) -> Option<VariableKey> {
    let component = item.get("component")?.get("name")?.as_str()?.to_string();
    let component_instance = item
        .get("component")
        .and_then(|c| c.get("instance"))
        .and_then(Value::as_str)
        .map(str::to_string);
    let variable = item.get("variable")?.get("name")?.as_str()?.to_string();
    let variable_instance = item
        .get("variable")
        .and_then(|v| v.get("instance"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Some(VariableKey {
        component,
        component_instance,
        variable,
        variable_instance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_component_is_rejected_with_not_found() {
        let registry = VariableRegistry::standard();
        let store = ConfigurationStore::default();
        let key = VariableKey::new("NopeCtrlr", "Whatever");
        let outcome = get_variable(&registry, &store, &key, None);
        assert_eq!(outcome.status, GetVariableStatus::UnknownComponent);
    }

    #[test]
    fn known_variable_falls_back_to_default_value() {
        let registry = VariableRegistry::standard();
        let store = ConfigurationStore::default();
        let key = VariableKey::new("OCPPCommCtrlr", "HeartbeatInterval");
        let outcome = get_variable(&registry, &store, &key, None);
        assert_eq!(outcome.status, GetVariableStatus::Accepted);
        assert_eq!(outcome.attribute_value.as_deref(), Some("60"));
    }

    #[test]
    fn persistent_store_value_overrides_default() {
        let registry = VariableRegistry::standard();
        let mut store = ConfigurationStore::default();
        store.put("HeartbeatInterval", "45");
        let key = VariableKey::new("OCPPCommCtrlr", "HeartbeatInterval");
        let outcome = get_variable(&registry, &store, &key, None);
        assert_eq!(outcome.attribute_value.as_deref(), Some("45"));
    }

    #[test]
    fn value_longer_than_reporting_size_is_truncated() {
        let registry = VariableRegistry::standard();
        let mut store = ConfigurationStore::default();
        store.put("ReportingValueSize", "4");
        store.put("OrganizationName", "AcmeCorporation");
        let key = VariableKey::new("SecurityCtrlr", "OrganizationName");
        let outcome = get_variable(&registry, &store, &key, None);
        assert_eq!(outcome.attribute_value.as_deref(), Some("Acme"));
    }

    #[test]
    fn value_size_truncates_before_reporting_size_is_applied() {
        // spec.md §4.F step 6: ValueSize applies first, so a ValueSize
        // narrower than ReportingValueSize wins even though
        // ReportingValueSize alone would not have truncated anything.
        let registry = VariableRegistry::standard();
        let mut store = ConfigurationStore::default();
        store.put("ValueSize", "4");
        store.put("ReportingValueSize", "50");
        store.put("OrganizationName", "AcmeCorporation");
        let key = VariableKey::new("SecurityCtrlr", "OrganizationName");
        let outcome = get_variable(&registry, &store, &key, None);
        assert_eq!(outcome.attribute_value.as_deref(), Some("Acme"));
    }
}
