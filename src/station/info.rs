//! Runtime station identity derived from a template (spec.md §3 `StationInfo`).

use sha2::{Digest, Sha256};

use crate::protocol::version::OcppVersion;
use crate::station::template::StationTemplate;

/// Serial numbers carried on the boot notification payload. Regenerated
/// only when their configured prefix changes across reloads (spec.md §3
/// StationInfo lifecycle).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialNumbers {
    pub charge_point_serial_number: String,
    pub charge_box_serial_number: String,
    pub meter_serial_number: String,
    pub firmware_version: String,
}

impl SerialNumbers {
    fn generate(station_name: &str, instance_index: u32) -> Self {
        let suffix = format!("{station_name}-{instance_index:04}");
        Self {
            charge_point_serial_number: format!("CPS-{suffix}"),
            charge_box_serial_number: format!("CBS-{suffix}"),
            meter_serial_number: format!("MTR-{suffix}"),
            firmware_version: "1.0.0".to_string(),
        }
    }

    fn prefix(serial: &str) -> &str {
        serial.split('-').next().unwrap_or("")
    }
}

/// Runtime station identity (spec.md §3 `StationInfo`).
#[derive(Debug, Clone)]
pub struct StationInfo {
    pub station_name: String,
    pub instance_index: u32,
    pub vendor: String,
    pub model: String,
    pub ocpp_version: OcppVersion,
    pub serials: SerialNumbers,
    pub power_divider: u32,
    pub max_power_watts: f64,
    pub hash_id: String,
}

impl StationInfo {
    /// Builds the final station name from the template, honoring
    /// `fixedName` / `nameSuffix` / the `CF_INSTANCE_INDEX` environment
    /// variable that participates in formatting (spec.md §6).
    pub fn station_name(template: &StationTemplate, instance_index: u32) -> String {
        if template.fixed_name {
            return template.base_name.clone();
        }
        let suffix = template
            .name_suffix
            .clone()
            .unwrap_or_else(|| format!("{instance_index:04}"));
        format!("{}-{}", template.base_name, suffix)
    }

    pub fn cf_instance_index() -> u32 {
        std::env::var("CF_INSTANCE_INDEX")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0)
    }

    /// Builds a fresh `StationInfo`, propagating serial numbers from
    /// `prior` only when their prefixes are unchanged (spec.md §3
    /// StationInfo lifecycle: "never regenerated once established").
    pub fn from_template_and_prior(
        template: &StationTemplate,
        instance_index: u32,
        vendor: String,
        model: String,
        prior: Option<&StationInfo>,
    ) -> Self {
        let station_name = Self::station_name(template, instance_index);

        let serials = match prior {
            Some(p) => {
                let fresh = SerialNumbers::generate(&station_name, instance_index);
                if SerialNumbers::prefix(&p.serials.charge_point_serial_number)
                    == SerialNumbers::prefix(&fresh.charge_point_serial_number)
                {
                    p.serials.clone()
                } else {
                    fresh
                }
            }
            None => SerialNumbers::generate(&station_name, instance_index),
        };

        let connector_count = template.total_connectors().max(1);
        let power_divider = if template.power_shared_by_connectors {
            0 // recomputed from active-transaction count at runtime
        } else if template.use_connector_id0 {
            connector_count
        } else {
            connector_count
        };

        let max_power_watts = template.power_watts.iter().cloned().fold(0.0, f64::max);

        let hash_id = Self::compute_hash_id(&station_name, &vendor, &model, template.ocpp_version);

        Self {
            station_name,
            instance_index,
            vendor,
            model,
            ocpp_version: template.ocpp_version,
            serials,
            power_divider,
            max_power_watts,
            hash_id,
        }
    }

    /// SHA-256 over identity fields only — stable across reconnects,
    /// meter ticks, and any other transient state (spec.md §3 invariant).
    fn compute_hash_id(station_name: &str, vendor: &str, model: &str, version: OcppVersion) -> String {
        let mut hasher = Sha256::new();
        hasher.update(station_name.as_bytes());
        hasher.update([0u8]);
        hasher.update(vendor.as_bytes());
        hasher.update([0u8]);
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(version.to_string().as_bytes());
        let digest = hasher.finalize();
        hex_encode(&digest)
    }

    pub fn boot_notification_skeleton(&self) -> serde_json::Value {
        serde_json::json!({
            "chargePointVendor": self.vendor,
            "chargePointModel": self.model,
            "chargePointSerialNumber": self.serials.charge_point_serial_number,
            "chargeBoxSerialNumber": self.serials.charge_box_serial_number,
            "firmwareVersion": self.serials.firmware_version,
        })
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::station::template::StationTemplate;

    fn template() -> StationTemplate {
        StationTemplate::parse(
            "t.json",
            r#"{"baseName":"CP","supervisionUrls":["ws://h/ocpp"]}"#,
        )
        .unwrap()
    }

    #[test]
    fn hash_id_is_stable_for_identical_identity() {
        let tpl = template();
        let a = StationInfo::from_template_and_prior(&tpl, 0, "Acme".into(), "X1".into(), None);
        let b = StationInfo::from_template_and_prior(&tpl, 0, "Acme".into(), "X1".into(), None);
        assert_eq!(a.hash_id, b.hash_id);
    }

    #[test]
    fn hash_id_differs_on_vendor_change() {
        let tpl = template();
        let a = StationInfo::from_template_and_prior(&tpl, 0, "Acme".into(), "X1".into(), None);
        let b = StationInfo::from_template_and_prior(&tpl, 0, "Other".into(), "X1".into(), None);
        assert_ne!(a.hash_id, b.hash_id);
    }

    #[test]
    fn serial_numbers_propagate_when_prefix_unchanged() {
        let tpl = template();
        let first = StationInfo::from_template_and_prior(&tpl, 0, "Acme".into(), "X1".into(), None);
        let second = StationInfo::from_template_and_prior(&tpl, 0, "Acme".into(), "X1".into(), Some(&first));
        assert_eq!(first.serials, second.serials);
    }
}
