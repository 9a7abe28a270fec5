//! Version adapters converting protocol-specific tokens to/from
//! [`UnifiedIdentifier`] (spec.md §4.G). Length caps: 1.6 idTag <= 20
//! chars, 2.0.1 idToken <= 36 chars.

use serde_json::Value;

use crate::auth::unified::{IdentifierType, UnifiedIdentifier};
use crate::protocol::version::OcppVersion;

pub const V16_ID_TAG_MAX_LEN: usize = 20;
pub const V201_ID_TOKEN_MAX_LEN: usize = 36;

pub struct Ocpp16AuthAdapter;

impl Ocpp16AuthAdapter {
    pub fn to_unified(id_tag: &str) -> UnifiedIdentifier {
        UnifiedIdentifier {
            value: id_tag.chars().take(V16_ID_TAG_MAX_LEN).collect(),
            id_type: IdentifierType::IdTag,
            ocpp_version: OcppVersion::V16,
            parent_id: None,
            additional_info: None,
        }
    }

    pub fn from_unified(identifier: &UnifiedIdentifier) -> String {
        identifier.value.chars().take(V16_ID_TAG_MAX_LEN).collect()
    }
}

pub struct Ocpp20AuthAdapter;

impl Ocpp20AuthAdapter {
    /// `idToken` in 2.0.1 is `{idToken, type}`.
    pub fn to_unified(id_token: &Value) -> Option<UnifiedIdentifier> {
        let value = id_token.get("idToken")?.as_str()?.chars().take(V201_ID_TOKEN_MAX_LEN).collect();
        let id_type = match id_token.get("type").and_then(Value::as_str).unwrap_or("Central") {
            "Central" => IdentifierType::Central,
            "Local" => IdentifierType::Local,
            "eMAID" => IdentifierType::EMaid,
            "ISO14443" => IdentifierType::Iso14443,
            "ISO15693" => IdentifierType::Iso15693,
            "KeyCode" => IdentifierType::KeyCode,
            "MacAddress" => IdentifierType::MacAddress,
            _ => IdentifierType::Central,
        };
        Some(UnifiedIdentifier {
            value,
            id_type,
            ocpp_version: OcppVersion::V201,
            parent_id: None,
            additional_info: None,
        })
    }

    pub fn from_unified(identifier: &UnifiedIdentifier) -> Value {
        let type_str = match identifier.id_type {
            IdentifierType::Central => "Central",
            IdentifierType::Local => "Local",
            IdentifierType::EMaid => "eMAID",
            IdentifierType::Iso14443 => "ISO14443",
            IdentifierType::Iso15693 => "ISO15693",
            IdentifierType::KeyCode => "KeyCode",
            IdentifierType::MacAddress => "MacAddress",
            IdentifierType::IdTag => "Central",
        };
        serde_json::json!({
            "idToken": identifier.value.chars().take(V201_ID_TOKEN_MAX_LEN).collect::<String>(),
            "type": type_str,
        })
    }
}

/// Pluggable seam for Security Profile 3 certificate handling. The crypto
/// internals are explicitly out of scope (spec.md §1); a station built
/// with Security Profile 1/2 uses [`NoCertificateManager`].
pub trait CertificateManager: Send + Sync {
    fn has_certificate(&self, hash: &str) -> bool;
}

pub struct NoCertificateManager;

impl CertificateManager for NoCertificateManager {
    fn has_certificate(&self, _hash: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v16_adapter_truncates_to_twenty_chars() {
        let long = "A".repeat(30);
        let unified = Ocpp16AuthAdapter::to_unified(&long);
        assert_eq!(unified.value.len(), V16_ID_TAG_MAX_LEN);
    }

    #[test]
    fn v201_adapter_roundtrips_type() {
        let token = serde_json::json!({"idToken": "ABC", "type": "ISO14443"});
        let unified = Ocpp20AuthAdapter::to_unified(&token).unwrap();
        assert_eq!(unified.id_type, IdentifierType::Iso14443);
        let back = Ocpp20AuthAdapter::from_unified(&unified);
        assert_eq!(back["type"], "ISO14443");
    }
}
