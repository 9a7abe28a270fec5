//! OCPP protocol version.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Supported OCPP protocol versions (spec.md §1: 1.6J and 2.0.1 only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OcppVersion {
    /// OCPP 1.6 (JSON / OCPP-J)
    V16,
    /// OCPP 2.0.1
    V201,
}

impl OcppVersion {
    /// WebSocket subprotocol identifier used in the `Sec-WebSocket-Protocol`
    /// header during the handshake (spec.md §4.C).
    pub fn subprotocol(&self) -> &'static str {
        match self {
            Self::V16 => "ocpp1.6",
            Self::V201 => "ocpp2.0.1",
        }
    }

    /// Parses a version from a template's `ocppVersion` field. Accepts the
    /// bare "2.0" alias for 2.0.1, per spec.md §6.
    pub fn from_template_value(s: &str) -> Option<Self> {
        match s.trim() {
            "1.6" => Some(Self::V16),
            "2.0" | "2.0.1" => Some(Self::V201),
            _ => None,
        }
    }
}

impl fmt::Display for OcppVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V16 => write!(f, "1.6"),
            Self::V201 => write!(f, "2.0.1"),
        }
    }
}
