//! Crate-wide error taxonomy.
//!
//! Mirrors the error policy described for this runtime: `OcppError` always
//! surfaces to the wire (CALLRESULT/CALLERROR or a rejected pending
//! request); `ConnectionError` drives the reconnect state machine rather
//! than failing in-flight requests directly; `ConfigError` is fatal at
//! station construction; `VariableError` never escapes `ocpp201::variables`
//! as a `Result::Err` — it is always folded into a typed result with a
//! `reasonCode`.

use thiserror::Error;

/// A wire-level OCPP error, exchanged as a CALLERROR or carried by a
/// rejected pending request.
#[derive(Debug, Clone, Error)]
#[error("{code}: {description}")]
pub struct OcppError {
    pub code: OcppErrorCode,
    pub description: String,
    pub details: serde_json::Value,
}

impl OcppError {
    pub fn new(code: OcppErrorCode, description: impl Into<String>) -> Self {
        Self {
            code,
            description: description.into(),
            details: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn not_implemented(action: &str) -> Self {
        Self::new(
            OcppErrorCode::NotImplemented,
            format!("Action '{action}' is not implemented"),
        )
    }
}

/// Known OCPP-J error codes (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OcppErrorCode {
    #[error("GenericError")]
    GenericError,
    #[error("InternalError")]
    InternalError,
    #[error("NotImplemented")]
    NotImplemented,
    #[error("NotSupported")]
    NotSupported,
    #[error("ProtocolError")]
    ProtocolError,
    #[error("SecurityError")]
    SecurityError,
    #[error("FormationViolation")]
    FormationViolation,
    #[error("PropertyConstraintViolation")]
    PropertyConstraintViolation,
    #[error("OccurrenceConstraintViolation")]
    OccurrenceConstraintViolation,
    #[error("TypeConstraintViolation")]
    TypeConstraintViolation,
}

impl OcppErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GenericError => "GenericError",
            Self::InternalError => "InternalError",
            Self::NotImplemented => "NotImplemented",
            Self::NotSupported => "NotSupported",
            Self::ProtocolError => "ProtocolError",
            Self::SecurityError => "SecurityError",
            Self::FormationViolation => "FormationViolation",
            Self::PropertyConstraintViolation => "PropertyConstraintViolation",
            Self::OccurrenceConstraintViolation => "OccurrenceConstraintViolation",
            Self::TypeConstraintViolation => "TypeConstraintViolation",
        }
    }
}

/// Errors raised while sending a CALL and awaiting its correlated response.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request timed out")]
    Timeout,
    #[error("call error: {0}")]
    Call(#[from] OcppError),
    #[error("not connected")]
    NotConnected,
    #[error("outbound channel closed")]
    ChannelClosed,
}

/// Transport-level failures. These never reject in-flight pending requests
/// directly (they time out on their own deadlines); they only drive the
/// connection's reconnect state machine.
#[derive(Debug, Error)]
pub enum ConnectionError {
    #[error("websocket connect failed: {0}")]
    Connect(String),
    #[error("websocket closed")]
    Closed,
    #[error("send failed: {0}")]
    Send(String),
}

/// Fatal configuration/template problems, surfaced at station construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid template: {0}")]
    InvalidTemplate(String),
}

/// Typed reason codes for GetVariables/SetVariables (spec.md §7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariableReasonCode {
    NotFound,
    InvalidValue,
    UnsupportedParam,
    WriteOnly,
    ReadOnly,
    ValueTooLow,
    ValueTooHigh,
    TooLargeElement,
    NotEnabled,
    InternalError,
    NoError,
}

impl VariableReasonCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NotFound",
            Self::InvalidValue => "InvalidValue",
            Self::UnsupportedParam => "UnsupportedParam",
            Self::WriteOnly => "WriteOnly",
            Self::ReadOnly => "ReadOnly",
            Self::ValueTooLow => "ValueTooLow",
            Self::ValueTooHigh => "ValueTooHigh",
            Self::TooLargeElement => "TooLargeElement",
            Self::NotEnabled => "NotEnabled",
            Self::InternalError => "InternalError",
            Self::NoError => "NoError",
        }
    }
}

/// Truncates `additionalInfo` text to the 50-character cap spec.md §7 sets
/// for `VariableError` detail strings.
pub fn truncate_additional_info(s: &str) -> String {
    if s.chars().count() <= 50 {
        s.to_string()
    } else {
        s.chars().take(50).collect()
    }
}

/// Aggregated error for the few call sites (station construction) that need
/// `?`-propagation across the taxonomy above.
#[derive(Debug, Error)]
pub enum StationError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
