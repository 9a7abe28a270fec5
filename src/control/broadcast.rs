//! Process-scoped broadcast-channel control plane (spec.md §4.K): a single
//! `"worker"` channel carrying `[uuid, command, payload]` requests and
//! `[uuid, responsePayload]` responses, the same shape the harness exposes
//! to whatever drives the fleet (a UI server, a test harness, stdin).
//! Every running station subscribes to the same request broadcast and
//! ignores requests whose `hashIds` filter excludes it.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, warn};

use crate::connection::manager::ConnectionManager;
use crate::control::commands::{classify_response, ControlCommand};
use crate::protocol::correlator::{Correlator, RequestOptions};

const REQUEST_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone)]
pub struct ControlRequest {
    pub request_id: String,
    pub command: String,
    pub payload: Value,
    /// `None` means "every station"; `Some(ids)` restricts delivery to
    /// stations whose hashId is listed (spec.md §4.K).
    pub hash_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub enum ControlStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, Serialize)]
pub struct ControlResponse {
    #[serde(skip)]
    pub request_id: String,
    pub hash_id: String,
    pub status: ControlStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_response: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ControlResponse {
    fn failure(request_id: &str, hash_id: &str, command: Option<&str>, error: impl Into<String>) -> Self {
        Self {
            request_id: request_id.to_string(),
            hash_id: hash_id.to_string(),
            status: ControlStatus::Failure,
            command: command.map(str::to_string),
            request_payload: None,
            command_response: None,
            error_message: Some(error.into()),
        }
    }
}

/// Handle shared by the broadcast plane's producer side (whatever issues
/// commands) and every station that listens for them.
#[derive(Clone)]
pub struct ControlPlane {
    requests: broadcast::Sender<ControlRequest>,
    responses: mpsc::UnboundedSender<ControlResponse>,
}

impl ControlPlane {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ControlResponse>) {
        let (requests, _) = broadcast::channel(REQUEST_CHANNEL_CAPACITY);
        let (responses, response_rx) = mpsc::unbounded_channel();
        (Self { requests, responses }, response_rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ControlRequest> {
        self.requests.subscribe()
    }

    fn responder(&self) -> mpsc::UnboundedSender<ControlResponse> {
        self.responses.clone()
    }

    /// Publishes a request to every subscribed station (spec.md §4.K).
    /// A `SendError` here just means nobody is currently listening, which
    /// is not an error condition for the caller.
    pub fn broadcast(&self, request: ControlRequest) {
        let _ = self.requests.send(request);
    }
}

/// Per-station handles needed to execute a control-plane command. Built
/// once per station by the worker harness at construction time.
#[derive(Clone)]
pub struct StationControlHandle {
    pub hash_id: String,
    pub correlator: Arc<Correlator>,
    pub connection: Arc<ConnectionManager>,
    /// Flips the connection's run loop between active and parked
    /// (`StartStation`/`StopStation`/`OpenConnection`/`CloseConnection`).
    pub connection_enabled: watch::Sender<bool>,
    /// Flips every ATG connector task for this station (`StartATG`/`StopATG`).
    pub atg_enabled: watch::Sender<bool>,
}

/// Subscribes to `plane` and runs until the broadcast channel closes,
/// executing any request addressed to `handle.hash_id` and publishing the
/// response back through `plane`.
pub async fn run_listener(plane: ControlPlane, handle: StationControlHandle) {
    let mut requests = plane.subscribe();
    let responder = plane.responder();
    loop {
        let request = match requests.recv().await {
            Ok(r) => r,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(hash_id = handle.hash_id, skipped, "control plane listener lagged, dropping backlog");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };

        if let Some(ids) = &request.hash_ids {
            if !ids.iter().any(|id| id == &handle.hash_id) {
                continue;
            }
        }

        debug!(hash_id = handle.hash_id, command = request.command.as_str(), "control plane request received");
        let response = execute(&handle, &request).await;
        let _ = responder.send(response);
    }
}

async fn execute(handle: &StationControlHandle, request: &ControlRequest) -> ControlResponse {
    let Some(command) = ControlCommand::parse(&request.command) else {
        return ControlResponse::failure(&request.request_id, &handle.hash_id, None, format!("unknown command {}", request.command));
    };

    let outcome = match command {
        ControlCommand::StartStation | ControlCommand::OpenConnection => {
            let _ = handle.connection_enabled.send(true);
            Ok(Value::Null)
        }
        ControlCommand::StopStation | ControlCommand::CloseConnection => {
            let _ = handle.connection_enabled.send(false);
            Ok(Value::Null)
        }
        ControlCommand::StartAtg => {
            let _ = handle.atg_enabled.send(true);
            Ok(Value::Null)
        }
        ControlCommand::StopAtg => {
            let _ = handle.atg_enabled.send(false);
            Ok(Value::Null)
        }
        ControlCommand::SetSupervisionUrl => match request.payload.get("url").and_then(Value::as_str) {
            Some(url) => {
                handle.connection.set_url(url.to_string());
                Ok(Value::Null)
            }
            None => Err("SetSupervisionUrl requires a \"url\" field".to_string()),
        },
        ControlCommand::OcppAction(action) => handle
            .correlator
            .send_request(action, request.payload.clone(), RequestOptions::default())
            .await
            .map_err(|err| err.to_string()),
    };

    match outcome {
        Ok(response) => ControlResponse {
            request_id: request.request_id.clone(),
            hash_id: handle.hash_id.clone(),
            status: if classify_response(&response) { ControlStatus::Success } else { ControlStatus::Failure },
            command: Some(command.name().to_string()),
            request_payload: Some(request.payload.clone()),
            command_response: Some(response),
            error_message: None,
        },
        Err(error_message) => {
            let mut response = ControlResponse::failure(&request.request_id, &handle.hash_id, Some(command.name()), error_message);
            response.request_payload = Some(request.payload.clone());
            response
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::manager::NullSink;

    fn handle() -> (StationControlHandle, watch::Receiver<bool>, watch::Receiver<bool>) {
        let sink = Arc::new(NullSink::default());
        let correlator = Arc::new(Correlator::new(sink));
        let connection = ConnectionManager::new(3, "ws://localhost/ocpp".to_string());
        let (connection_enabled, conn_rx) = watch::channel(true);
        let (atg_enabled, atg_rx) = watch::channel(false);
        (
            StationControlHandle {
                hash_id: "abc123".to_string(),
                correlator,
                connection,
                connection_enabled,
                atg_enabled,
            },
            conn_rx,
            atg_rx,
        )
    }

    #[tokio::test]
    async fn start_atg_flips_watch_channel() {
        let (handle, _conn_rx, mut atg_rx) = handle();
        let request = ControlRequest {
            request_id: "r1".to_string(),
            command: "StartATG".to_string(),
            payload: Value::Null,
            hash_ids: None,
        };
        let response = execute(&handle, &request).await;
        assert_eq!(response.status, ControlStatus::Success);
        assert!(*atg_rx.borrow_and_update());
    }

    #[tokio::test]
    async fn unknown_command_is_failure() {
        let (handle, ..) = handle();
        let request = ControlRequest {
            request_id: "r1".to_string(),
            command: "DoesNotExist".to_string(),
            payload: Value::Null,
            hash_ids: None,
        };
        let response = execute(&handle, &request).await;
        assert_eq!(response.status, ControlStatus::Failure);
        assert!(response.error_message.is_some());
    }

    #[tokio::test]
    async fn set_supervision_url_without_url_field_fails() {
        let (handle, ..) = handle();
        let request = ControlRequest {
            request_id: "r1".to_string(),
            command: "SetSupervisionUrl".to_string(),
            payload: serde_json::json!({}),
            hash_ids: None,
        };
        let response = execute(&handle, &request).await;
        assert_eq!(response.status, ControlStatus::Failure);
    }

    #[tokio::test]
    async fn hash_id_filter_skips_listener_not_running_execute_directly() {
        // The filter lives in run_listener, not execute; this test documents
        // that execute() itself is unconditional and the filter is the
        // listener's responsibility.
        let (handle, ..) = handle();
        assert_eq!(handle.hash_id, "abc123");
    }
}
