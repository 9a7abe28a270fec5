//! Unified identifier/request/decision types shared by every authorization
//! strategy (spec.md §4.G).

use serde_json::Value;

use crate::protocol::version::OcppVersion;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierType {
    IdTag,
    Central,
    Local,
    EMaid,
    Iso14443,
    Iso15693,
    KeyCode,
    MacAddress,
}

/// Protocol-agnostic identifier (spec.md §4.G `UnifiedIdentifier`). Length
/// caps are enforced by the version adapters that produce these, not here.
#[derive(Debug, Clone)]
pub struct UnifiedIdentifier {
    pub value: String,
    pub id_type: IdentifierType,
    pub ocpp_version: OcppVersion,
    pub parent_id: Option<String>,
    pub additional_info: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthContext {
    TransactionStart,
    TransactionStop,
    RemoteStart,
    RemoteStop,
}

#[derive(Debug, Clone)]
pub struct AuthRequest {
    pub identifier: UnifiedIdentifier,
    pub connector_id: u32,
    pub context: AuthContext,
    pub transaction_id: Option<String>,
    pub allow_offline: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Accepted,
    Blocked,
    Expired,
    Invalid,
}

#[derive(Debug, Clone)]
pub struct AuthDecision {
    pub status: AuthStatus,
    pub is_offline: bool,
    pub parent_id: Option<String>,
    pub additional_info: Option<String>,
}

impl AuthDecision {
    pub fn accepted() -> Self {
        Self {
            status: AuthStatus::Accepted,
            is_offline: false,
            parent_id: None,
            additional_info: None,
        }
    }

    pub fn invalid(additional_info: impl Into<String>) -> Self {
        Self {
            status: AuthStatus::Invalid,
            is_offline: false,
            parent_id: None,
            additional_info: Some(crate::error::truncate_additional_info(&additional_info.into())),
        }
    }

    pub fn is_terminal_non_invalid(&self) -> bool {
        self.status != AuthStatus::Invalid
    }
}
