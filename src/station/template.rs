//! On-disk station template parsing and deprecated-key migration
//! (spec.md §3 `StationTemplate`, §6 station template JSON).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::ConfigError;
use crate::protocol::version::OcppVersion;
use crate::tags::cache::IdTagDistribution;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrentOutType {
    Ac,
    Dc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PowerUnit {
    W,
    #[serde(rename = "kW")]
    KW,
}

/// ATG policy embedded in a template (spec.md §4.I).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AtgPolicy {
    #[serde(default)]
    pub enable: bool,
    #[serde(default)]
    pub min_duration_secs: u64,
    #[serde(default = "AtgPolicy::default_max_duration")]
    pub max_duration_secs: u64,
    #[serde(default)]
    pub min_delay_between_two_transactions_secs: u64,
    #[serde(default = "AtgPolicy::default_max_delay")]
    pub max_delay_between_two_transactions_secs: u64,
    #[serde(default)]
    pub require_authorize: bool,
    #[serde(default)]
    pub stop_on_connection_failure: bool,
    #[serde(default)]
    pub stop_absolute_duration_secs: Option<u64>,
    #[serde(default)]
    pub probability_of_non_authorized_tag: f64,
}

impl AtgPolicy {
    fn default_max_duration() -> u64 {
        1800
    }
    fn default_max_delay() -> u64 {
        30
    }
}

impl Default for AtgPolicy {
    fn default() -> Self {
        Self {
            enable: false,
            min_duration_secs: 0,
            max_duration_secs: Self::default_max_duration(),
            min_delay_between_two_transactions_secs: 0,
            max_delay_between_two_transactions_secs: Self::default_max_delay(),
            require_authorize: true,
            stop_on_connection_failure: false,
            stop_absolute_duration_secs: None,
            probability_of_non_authorized_tag: 0.0,
        }
    }
}

/// A single connector entry in the template's `Connectors` map.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConnectorSpec {
    #[serde(default)]
    pub meter_values: Option<Vec<String>>,
    #[serde(default)]
    pub meter_value_sample_interval: Option<u64>,
}

/// An EVSE entry in the template's `Evses` map (2.0.1, spec.md §3 `EVSE`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct EvseSpec {
    #[serde(default)]
    pub connectors: HashMap<String, ConnectorSpec>,
}

/// Raw on-disk template shape, deserialized before deprecated-key
/// migration is applied.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RawStationTemplate {
    pub base_name: String,
    #[serde(default)]
    pub name_suffix: Option<String>,
    #[serde(default)]
    pub fixed_name: bool,
    #[serde(default = "RawStationTemplate::default_connectors")]
    pub number_of_connectors: Value,
    #[serde(default)]
    pub use_connector_id0: bool,
    #[serde(default)]
    pub random_connectors: bool,
    #[serde(default = "RawStationTemplate::default_version")]
    pub ocpp_version: String,
    #[serde(default)]
    pub supervision_urls: Option<Value>,
    #[serde(default)]
    pub supervision_url: Option<Value>,
    #[serde(default)]
    pub supervision_url_ocpp_configuration: bool,
    #[serde(default)]
    pub ocpp_strict_compliance: bool,
    #[serde(default)]
    pub payload_schema_validation: Option<bool>,
    #[serde(default)]
    pub enable_statistics: bool,
    #[serde(default)]
    pub remote_authorization: bool,
    #[serde(default)]
    pub id_tags_file: Option<String>,
    #[serde(default)]
    pub authorization_file: Option<String>,
    #[serde(default = "RawStationTemplate::default_distribution")]
    pub id_tag_distribution: IdTagDistribution,
    #[serde(default = "RawStationTemplate::default_power")]
    pub power: Value,
    #[serde(default)]
    pub power_unit: Option<PowerUnit>,
    #[serde(default = "RawStationTemplate::default_voltage")]
    pub voltage_out: f64,
    #[serde(default = "RawStationTemplate::default_current_type")]
    pub current_out_type: CurrentOutType,
    #[serde(default = "RawStationTemplate::default_phases")]
    pub number_of_phases: u32,
    #[serde(default)]
    pub power_shared_by_connectors: bool,
    #[serde(default = "RawStationTemplate::default_reset_time")]
    pub reset_time_secs: u64,
    #[serde(default)]
    pub connectors: HashMap<String, ConnectorSpec>,
    #[serde(default)]
    pub evses: HashMap<String, EvseSpec>,
    #[serde(default)]
    pub configuration: Vec<crate::station::config_store::ConfigurationKey>,
    #[serde(default)]
    pub automatic_transaction_generator: AtgPolicy,
}

impl RawStationTemplate {
    fn default_connectors() -> Value {
        Value::from(1)
    }
    fn default_version() -> String {
        "1.6".to_string()
    }
    fn default_distribution() -> IdTagDistribution {
        IdTagDistribution::Random
    }
    fn default_power() -> Value {
        Value::from(0)
    }
    fn default_voltage() -> f64 {
        230.0
    }
    fn default_current_type() -> CurrentOutType {
        CurrentOutType::Ac
    }
    fn default_phases() -> u32 {
        3
    }
    fn default_reset_time() -> u64 {
        60
    }
}

/// Parsed, migrated, immutable station template (spec.md §3).
#[derive(Debug, Clone)]
pub struct StationTemplate {
    pub base_name: String,
    pub name_suffix: Option<String>,
    pub fixed_name: bool,
    pub number_of_connectors: Vec<u32>,
    pub use_connector_id0: bool,
    pub random_connectors: bool,
    pub ocpp_version: OcppVersion,
    pub supervision_urls: Vec<String>,
    pub distribute_equally: bool,
    pub ocpp_strict_compliance: bool,
    pub enable_statistics: bool,
    pub remote_authorization: bool,
    pub id_tags_file: Option<String>,
    pub id_tag_distribution: IdTagDistribution,
    pub power_watts: Vec<f64>,
    pub voltage_out: f64,
    pub current_out_type: CurrentOutType,
    pub number_of_phases: u32,
    pub power_shared_by_connectors: bool,
    pub reset_time_secs: u64,
    pub connectors: HashMap<u32, ConnectorSpec>,
    pub evses: HashMap<u32, EvseSpec>,
    pub configuration: Vec<crate::station::config_store::ConfigurationKey>,
    pub atg_policy: AtgPolicy,
}

impl StationTemplate {
    /// Parses a template from its on-disk JSON text, applying the
    /// deprecated-key migrations named in spec.md §6:
    /// `supervisionUrl → supervisionUrls`, `authorizationFile → idTagsFile`,
    /// `payloadSchemaValidation → ocppStrictCompliance`.
    pub fn parse(path: &str, text: &str) -> Result<Self, ConfigError> {
        let mut raw: RawStationTemplate =
            serde_json::from_str(text).map_err(|e| ConfigError::Parse {
                path: path.to_string(),
                source: e,
            })?;

        if raw.supervision_urls.is_none() {
            if let Some(legacy) = raw.supervision_url.take() {
                warn!(path, "migrating deprecated supervisionUrl -> supervisionUrls");
                raw.supervision_urls = Some(legacy);
            }
        }
        if raw.id_tags_file.is_none() {
            if let Some(legacy) = raw.authorization_file.take() {
                warn!(path, "migrating deprecated authorizationFile -> idTagsFile");
                raw.id_tags_file = Some(legacy);
            }
        }
        if let Some(legacy) = raw.payload_schema_validation {
            warn!(path, "migrating deprecated payloadSchemaValidation -> ocppStrictCompliance");
            raw.ocpp_strict_compliance = legacy;
        }

        let ocpp_version = OcppVersion::from_template_value(&raw.ocpp_version)
            .ok_or_else(|| ConfigError::InvalidTemplate(format!("unknown ocppVersion '{}'", raw.ocpp_version)))?;

        let number_of_connectors = Self::parse_int_or_list(&raw.number_of_connectors)
            .ok_or_else(|| ConfigError::InvalidTemplate("numberOfConnectors must be an integer or integer array".into()))?;

        let supervision_urls = match &raw.supervision_urls {
            Some(v) => Self::parse_str_or_list(v)
                .ok_or_else(|| ConfigError::InvalidTemplate("supervisionUrls must be a string or string array".into()))?,
            None => Vec::new(),
        };
        if supervision_urls.is_empty() {
            return Err(ConfigError::InvalidTemplate("at least one supervisionUrl is required".into()));
        }

        let power_watts = Self::parse_power(&raw.power, raw.power_unit.unwrap_or(PowerUnit::W))
            .ok_or_else(|| ConfigError::InvalidTemplate("power must be a number or number array".into()))?;

        let connectors = raw
            .connectors
            .iter()
            .filter_map(|(k, v)| k.parse::<u32>().ok().map(|id| (id, v.clone())))
            .collect();
        let evses = raw
            .evses
            .iter()
            .filter_map(|(k, v)| k.parse::<u32>().ok().map(|id| (id, v.clone())))
            .collect();

        Ok(Self {
            base_name: raw.base_name,
            name_suffix: raw.name_suffix,
            fixed_name: raw.fixed_name,
            number_of_connectors,
            use_connector_id0: raw.use_connector_id0,
            random_connectors: raw.random_connectors,
            ocpp_version,
            supervision_urls,
            distribute_equally: raw.supervision_url_ocpp_configuration,
            ocpp_strict_compliance: raw.ocpp_strict_compliance,
            enable_statistics: raw.enable_statistics,
            remote_authorization: raw.remote_authorization,
            id_tags_file: raw.id_tags_file,
            id_tag_distribution: raw.id_tag_distribution,
            power_watts,
            voltage_out: raw.voltage_out,
            current_out_type: raw.current_out_type,
            number_of_phases: raw.number_of_phases,
            power_shared_by_connectors: raw.power_shared_by_connectors,
            reset_time_secs: raw.reset_time_secs,
            connectors,
            evses,
            configuration: raw.configuration,
            atg_policy: raw.automatic_transaction_generator,
        })
    }

    fn parse_int_or_list(v: &Value) -> Option<Vec<u32>> {
        if let Some(n) = v.as_u64() {
            return Some(vec![n as u32]);
        }
        v.as_array()?
            .iter()
            .map(|e| e.as_u64().map(|n| n as u32))
            .collect()
    }

    fn parse_str_or_list(v: &Value) -> Option<Vec<String>> {
        if let Some(s) = v.as_str() {
            return Some(vec![s.to_string()]);
        }
        v.as_array()?
            .iter()
            .map(|e| e.as_str().map(|s| s.to_string()))
            .collect()
    }

    fn parse_power(v: &Value, unit: PowerUnit) -> Option<Vec<f64>> {
        let factor = match unit {
            PowerUnit::W => 1.0,
            PowerUnit::KW => 1000.0,
        };
        if let Some(n) = v.as_f64() {
            return Some(vec![n * factor]);
        }
        v.as_array()?
            .iter()
            .map(|e| e.as_f64().map(|n| n * factor))
            .collect()
    }

    /// Total connector count, counting connector 0 iff `useConnectorId0`.
    pub fn total_connectors(&self) -> u32 {
        self.number_of_connectors.iter().sum()
    }

    pub fn supervision_url(&self, instance_index: u32) -> &str {
        if self.distribute_equally {
            let idx = (instance_index as usize) % self.supervision_urls.len();
            &self.supervision_urls[idx]
        } else {
            // Uniform random otherwise (spec.md §4.C); callers needing
            // determinism should pass a fixed instance_index and rely on
            // distribute_equally instead.
            use rand::Rng;
            let idx = rand::thread_rng().gen_range(0..self.supervision_urls.len());
            &self.supervision_urls[idx]
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrates_deprecated_keys() {
        let text = r#"{
            "baseName": "CP",
            "supervisionUrl": "ws://h/ocpp",
            "authorizationFile": "tags.json",
            "payloadSchemaValidation": true
        }"#;
        let tpl = StationTemplate::parse("t.json", text).unwrap();
        assert_eq!(tpl.supervision_urls, vec!["ws://h/ocpp".to_string()]);
        assert_eq!(tpl.id_tags_file.as_deref(), Some("tags.json"));
        assert!(tpl.ocpp_strict_compliance);
    }

    #[test]
    fn parses_connector_list_and_power_array() {
        let text = r#"{
            "baseName": "CP",
            "supervisionUrls": ["ws://a", "ws://b"],
            "numberOfConnectors": [1, 1],
            "power": [7400, 22000],
            "powerUnit": "W"
        }"#;
        let tpl = StationTemplate::parse("t.json", text).unwrap();
        assert_eq!(tpl.number_of_connectors, vec![1, 1]);
        assert_eq!(tpl.power_watts, vec![7400.0, 22000.0]);
    }

    #[test]
    fn rejects_missing_supervision_url() {
        let text = r#"{"baseName": "CP"}"#;
        assert!(StationTemplate::parse("t.json", text).is_err());
    }
}
