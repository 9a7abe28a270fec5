//! OCPP-J message framing.
//!
//! Frames are JSON arrays, identical in shape across OCPP versions
//! (spec.md §4.B):
//!
//! - **Call**       `[2, "<uniqueId>", "<action>", {<payload>}]`
//! - **CallResult** `[3, "<uniqueId>", {<payload>}]`
//! - **CallError**  `[4, "<uniqueId>", "<errorCode>", "<errorDescription>", {<errorDetails>}]`

use std::fmt;

use serde_json::Value;

use crate::error::{OcppError, OcppErrorCode};

const MSG_TYPE_CALL: u64 = 2;
const MSG_TYPE_CALL_RESULT: u64 = 3;
const MSG_TYPE_CALL_ERROR: u64 = 4;

/// A parsed OCPP-J frame (version-agnostic transport envelope).
#[derive(Debug, Clone)]
pub enum OcppFrame {
    Call {
        unique_id: String,
        action: String,
        payload: Value,
    },
    CallResult {
        unique_id: String,
        payload: Value,
    },
    CallError {
        unique_id: String,
        error_code: String,
        error_description: String,
        error_details: Value,
    },
}

impl OcppFrame {
    pub fn call(unique_id: impl Into<String>, action: impl Into<String>, payload: Value) -> Self {
        Self::Call {
            unique_id: unique_id.into(),
            action: action.into(),
            payload,
        }
    }

    pub fn call_result(unique_id: impl Into<String>, payload: Value) -> Self {
        Self::CallResult {
            unique_id: unique_id.into(),
            payload,
        }
    }

    pub fn call_error(unique_id: impl Into<String>, error: &OcppError) -> Self {
        Self::CallError {
            unique_id: unique_id.into(),
            error_code: error.code.as_str().to_string(),
            error_description: error.description.clone(),
            error_details: error.details.clone(),
        }
    }

    pub fn parse(text: &str) -> Result<Self, OcppFrameError> {
        let arr: Vec<Value> =
            serde_json::from_str(text).map_err(|e| OcppFrameError::InvalidJson(e.to_string()))?;

        if arr.is_empty() {
            return Err(OcppFrameError::EmptyArray);
        }

        let msg_type = arr[0].as_u64().ok_or(OcppFrameError::InvalidMessageType)?;

        match msg_type {
            MSG_TYPE_CALL => Self::parse_call(&arr),
            MSG_TYPE_CALL_RESULT => Self::parse_call_result(&arr),
            MSG_TYPE_CALL_ERROR => Self::parse_call_error(&arr),
            other => Err(OcppFrameError::UnknownMessageType(other)),
        }
    }

    fn parse_call(arr: &[Value]) -> Result<Self, OcppFrameError> {
        if arr.len() < 4 {
            return Err(OcppFrameError::MissingFields {
                expected: 4,
                got: arr.len(),
            });
        }
        let unique_id = arr[1]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("uniqueId must be a string"))?
            .to_string();
        let action = arr[2]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("action must be a string"))?
            .to_string();
        let payload = arr[3].clone();
        Ok(Self::Call {
            unique_id,
            action,
            payload,
        })
    }

    fn parse_call_result(arr: &[Value]) -> Result<Self, OcppFrameError> {
        if arr.len() < 3 {
            return Err(OcppFrameError::MissingFields {
                expected: 3,
                got: arr.len(),
            });
        }
        let unique_id = arr[1]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("uniqueId must be a string"))?
            .to_string();
        let payload = arr.get(2).cloned().unwrap_or(Value::Object(Default::default()));
        Ok(Self::CallResult { unique_id, payload })
    }

    fn parse_call_error(arr: &[Value]) -> Result<Self, OcppFrameError> {
        if arr.len() < 3 {
            return Err(OcppFrameError::MissingFields {
                expected: 3,
                got: arr.len(),
            });
        }
        let unique_id = arr[1]
            .as_str()
            .ok_or(OcppFrameError::FieldTypeMismatch("uniqueId must be a string"))?
            .to_string();
        let error_code = arr
            .get(2)
            .and_then(|v| v.as_str())
            .unwrap_or(OcppErrorCode::InternalError.as_str())
            .to_string();
        let error_description = arr.get(3).and_then(|v| v.as_str()).unwrap_or("").to_string();
        let error_details = arr.get(4).cloned().unwrap_or(Value::Object(Default::default()));
        Ok(Self::CallError {
            unique_id,
            error_code,
            error_description,
            error_details,
        })
    }

    pub fn serialize(&self) -> String {
        let arr: Value = match self {
            Self::Call {
                unique_id,
                action,
                payload,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL.into()),
                Value::String(unique_id.clone()),
                Value::String(action.clone()),
                payload.clone(),
            ]),
            Self::CallResult { unique_id, payload } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_RESULT.into()),
                Value::String(unique_id.clone()),
                payload.clone(),
            ]),
            Self::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => Value::Array(vec![
                Value::Number(MSG_TYPE_CALL_ERROR.into()),
                Value::String(unique_id.clone()),
                Value::String(error_code.clone()),
                Value::String(error_description.clone()),
                error_details.clone(),
            ]),
        };
        serde_json::to_string(&arr).expect("serde_json::Value never fails to serialize")
    }

    pub fn unique_id(&self) -> &str {
        match self {
            Self::Call { unique_id, .. }
            | Self::CallResult { unique_id, .. }
            | Self::CallError { unique_id, .. } => unique_id,
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, Self::Call { .. })
    }
}

#[derive(Debug)]
pub enum OcppFrameError {
    InvalidJson(String),
    EmptyArray,
    InvalidMessageType,
    UnknownMessageType(u64),
    MissingFields { expected: usize, got: usize },
    FieldTypeMismatch(&'static str),
}

impl fmt::Display for OcppFrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidJson(msg) => write!(f, "invalid JSON: {msg}"),
            Self::EmptyArray => write!(f, "empty OCPP message array"),
            Self::InvalidMessageType => write!(f, "message type is not a number"),
            Self::UnknownMessageType(t) => write!(f, "unknown message type: {t}"),
            Self::MissingFields { expected, got } => {
                write!(f, "expected at least {expected} fields, got {got}")
            }
            Self::FieldTypeMismatch(msg) => write!(f, "field type mismatch: {msg}"),
        }
    }
}

impl std::error::Error for OcppFrameError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_call() {
        let text = r#"[2,"abc123","BootNotification",{"chargePointVendor":"Acme"}]"#;
        match OcppFrame::parse(text).unwrap() {
            OcppFrame::Call {
                unique_id,
                action,
                payload,
            } => {
                assert_eq!(unique_id, "abc123");
                assert_eq!(action, "BootNotification");
                assert_eq!(payload["chargePointVendor"], "Acme");
            }
            _ => panic!("expected Call"),
        }
    }

    #[test]
    fn parse_call_result() {
        let text = r#"[3,"abc123",{"status":"Accepted","interval":60}]"#;
        match OcppFrame::parse(text).unwrap() {
            OcppFrame::CallResult { unique_id, payload } => {
                assert_eq!(unique_id, "abc123");
                assert_eq!(payload["interval"], 60);
            }
            _ => panic!("expected CallResult"),
        }
    }

    #[test]
    fn parse_call_error_with_details() {
        let text = r#"[4,"id1","NotImplemented","unsupported",{"extra":true}]"#;
        match OcppFrame::parse(text).unwrap() {
            OcppFrame::CallError {
                error_code,
                error_description,
                error_details,
                ..
            } => {
                assert_eq!(error_code, "NotImplemented");
                assert_eq!(error_description, "unsupported");
                assert_eq!(error_details["extra"], true);
            }
            _ => panic!("expected CallError"),
        }
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let text = r#"[9,"id1"]"#;
        assert!(matches!(
            OcppFrame::parse(text),
            Err(OcppFrameError::UnknownMessageType(9))
        ));
    }

    #[test]
    fn roundtrip_call_and_error() {
        let frame = OcppFrame::call("id1", "Heartbeat", serde_json::json!({}));
        let parsed = OcppFrame::parse(&frame.serialize()).unwrap();
        assert!(parsed.is_call());
        assert_eq!(parsed.unique_id(), "id1");

        let err = OcppError::not_implemented("Foo");
        let frame = OcppFrame::call_error("id2", &err);
        let parsed = OcppFrame::parse(&frame.serialize()).unwrap();
        assert_eq!(parsed.unique_id(), "id2");
    }
}
