//! Request/response correlation (spec.md §4.B).
//!
//! `Correlator::send_request` generates a fresh message id, records a
//! [`PendingRequest`], hands the serialized frame to a [`FrameSink`] (the
//! connection manager owns buffering/ordering), and resolves once a
//! correlated CALLRESULT/CALLERROR arrives or the deadline fires. A reaper
//! task periodically evicts requests past their deadline so the pending map
//! never grows unbounded when a response is lost entirely.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{OcppError, RequestError};
use crate::protocol::frame::OcppFrame;

/// Default per-request deadline (spec.md §4.B): 60s.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Anything that can accept a serialized outbound frame. Implemented by the
/// connection manager, which owns the offline buffer and write ordering.
pub trait FrameSink: Send + Sync {
    fn enqueue(&self, frame: String);
    fn is_connected(&self) -> bool;
}

struct PendingRequest {
    action: String,
    enqueued_at: tokio::time::Instant,
    deadline: tokio::time::Instant,
    resolver: oneshot::Sender<Result<Value, OcppError>>,
}

/// Options for an individual outbound request.
#[derive(Debug, Clone, Copy)]
pub struct RequestOptions {
    pub timeout: Duration,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// Tracks in-flight CALLs for one station and matches incoming
/// CALLRESULT/CALLERROR frames back to their caller.
pub struct Correlator {
    pending: DashMap<String, PendingRequest>,
    counter: AtomicU64,
    sink: Arc<dyn FrameSink>,
}

impl Correlator {
    pub fn new(sink: Arc<dyn FrameSink>) -> Self {
        Self {
            pending: DashMap::new(),
            counter: AtomicU64::new(0),
            sink,
        }
    }

    fn next_message_id(&self) -> String {
        // UUIDs per spec.md §4.B; the counter only disambiguates log lines.
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        debug!(seq = n, "generating message id");
        Uuid::new_v4().to_string()
    }

    /// Sends a CALL and awaits its correlated response, honoring
    /// `options.timeout`. If the connection is currently down the frame is
    /// still enqueued (the sink is responsible for FIFO buffering) and the
    /// request resolves only once a response arrives or the deadline fires.
    pub async fn send_request(
        &self,
        action: &str,
        payload: Value,
        options: RequestOptions,
    ) -> Result<Value, RequestError> {
        let message_id = self.next_message_id();
        let frame = OcppFrame::call(message_id.clone(), action, payload);

        let (tx, rx) = oneshot::channel();
        let now = tokio::time::Instant::now();
        self.pending.insert(
            message_id.clone(),
            PendingRequest {
                action: action.to_string(),
                enqueued_at: now,
                deadline: now + options.timeout,
                resolver: tx,
            },
        );

        self.sink.enqueue(frame.serialize());

        match timeout(options.timeout, rx).await {
            Ok(Ok(result)) => result.map_err(RequestError::from),
            Ok(Err(_)) => {
                self.pending.remove(&message_id);
                Err(RequestError::ChannelClosed)
            }
            Err(_) => {
                self.pending.remove(&message_id);
                warn!(action, message_id, "request timed out");
                Err(RequestError::Timeout)
            }
        }
    }

    /// Feeds an inbound CALLRESULT/CALLERROR to the matching pending
    /// request. Unknown ids are logged and discarded (spec.md §4.B, §9).
    pub fn resolve(&self, frame: &OcppFrame) {
        match frame {
            OcppFrame::CallResult { unique_id, payload } => {
                if let Some((_, pending)) = self.pending.remove(unique_id) {
                    let _ = pending.resolver.send(Ok(payload.clone()));
                } else {
                    warn!(message_id = %unique_id, "CALLRESULT for unknown message id, dropping");
                }
            }
            OcppFrame::CallError {
                unique_id,
                error_code,
                error_description,
                error_details,
            } => {
                if let Some((_, pending)) = self.pending.remove(unique_id) {
                    warn!(
                        message_id = %unique_id,
                        action = pending.action.as_str(),
                        error_code = error_code.as_str(),
                        "CALLERROR received"
                    );
                    let err = crate::error::OcppErrorCode::from_wire(error_code);
                    let _ = pending.resolver.send(Err(OcppError {
                        code: err,
                        description: error_description.clone(),
                        details: error_details.clone(),
                    }));
                } else {
                    warn!(message_id = %unique_id, "CALLERROR for unknown message id, dropping");
                }
            }
            OcppFrame::Call { .. } => {}
        }
    }

    /// Evicts pending requests whose deadline has already passed. Called
    /// periodically by a reaper task; `send_request`'s own `timeout` future
    /// already rejects the caller, so this only guards against requests
    /// whose caller future was itself dropped/cancelled.
    pub fn reap_expired(&self) {
        let now = tokio::time::Instant::now();
        self.pending.retain(|id, req| {
            let expired = req.deadline <= now;
            if expired {
                warn!(message_id = %id, action = req.action.as_str(), "reaping expired pending request");
            }
            !expired
        });
    }

    /// Enqueues a CALLRESULT/CALLERROR reply we are sending in response to
    /// an inbound CALL. These never have a pending entry of their own —
    /// they just need the same FIFO ordering as outbound CALLs.
    pub fn enqueue_reply(&self, frame: String) {
        self.sink.enqueue(frame);
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_connected(&self) -> bool {
        self.sink.is_connected()
    }

    #[cfg(test)]
    pub(crate) fn oldest_enqueued_at(&self) -> Option<tokio::time::Instant> {
        self.pending.iter().map(|r| r.enqueued_at).min()
    }
}

/// Spawns a background task that periodically reaps expired pending
/// requests, satisfying the invariant that the pending map never retains
/// entries past their deadline (spec.md §3 Invariants).
pub fn spawn_reaper(correlator: Arc<Correlator>, period: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            correlator.reap_expired();
        }
    })
}

impl crate::error::OcppErrorCode {
    fn from_wire(code: &str) -> Self {
        match code {
            "InternalError" => Self::InternalError,
            "NotImplemented" => Self::NotImplemented,
            "NotSupported" => Self::NotSupported,
            "ProtocolError" => Self::ProtocolError,
            "SecurityError" => Self::SecurityError,
            "FormationViolation" => Self::FormationViolation,
            "PropertyConstraintViolation" => Self::PropertyConstraintViolation,
            "OccurrenceConstraintViolation" => Self::OccurrenceConstraintViolation,
            "TypeConstraintViolation" => Self::TypeConstraintViolation,
            _ => Self::GenericError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct TestSink {
        sent: Mutex<Vec<String>>,
        connected: std::sync::atomic::AtomicBool,
    }

    impl FrameSink for TestSink {
        fn enqueue(&self, frame: String) {
            self.sent.lock().unwrap().push(frame);
        }
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::Relaxed)
        }
    }

    #[tokio::test]
    async fn resolves_on_matching_call_result() {
        let sink = Arc::new(TestSink {
            sent: Mutex::new(Vec::new()),
            connected: std::sync::atomic::AtomicBool::new(true),
        });
        let correlator = Arc::new(Correlator::new(sink.clone()));

        let c2 = correlator.clone();
        let handle = tokio::spawn(async move {
            c2.send_request("Heartbeat", serde_json::json!({}), RequestOptions::default())
                .await
        });

        // Let the request land in the pending map then reply to it.
        tokio::task::yield_now().await;
        let sent = sink.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        let frame = OcppFrame::parse(&sent[0]).unwrap();
        let id = frame.unique_id().to_string();

        correlator.resolve(&OcppFrame::call_result(id, serde_json::json!({"currentTime": "now"})));

        let result = handle.await.unwrap().unwrap();
        assert_eq!(result["currentTime"], "now");
    }

    #[tokio::test]
    async fn times_out_when_unanswered() {
        let sink = Arc::new(TestSink {
            sent: Mutex::new(Vec::new()),
            connected: std::sync::atomic::AtomicBool::new(true),
        });
        let correlator = Correlator::new(sink);
        let opts = RequestOptions {
            timeout: Duration::from_millis(20),
        };
        let err = correlator
            .send_request("Heartbeat", serde_json::json!({}), opts)
            .await
            .unwrap_err();
        assert!(matches!(err, RequestError::Timeout));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn unknown_id_call_result_is_dropped_not_panicking() {
        let sink = Arc::new(TestSink {
            sent: Mutex::new(Vec::new()),
            connected: std::sync::atomic::AtomicBool::new(true),
        });
        let correlator = Correlator::new(sink);
        correlator.resolve(&OcppFrame::call_result("ghost", serde_json::json!({})));
        assert_eq!(correlator.pending_count(), 0);
    }
}
