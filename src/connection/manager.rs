//! Client-side WebSocket connection lifecycle (spec.md §4.C): connect,
//! auto-reconnect with bounded exponential backoff, ping/pong, and the
//! pre-connect FIFO buffer that implements [`FrameSink`] for the
//! correlator.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rand::Rng;
use tokio::sync::{mpsc, Notify};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::protocol::correlator::FrameSink;
use crate::protocol::version::OcppVersion;

const OUTBOUND_BUFFER_CAPACITY: usize = 1000;
const BASE_BACKOFF: Duration = Duration::from_secs(1);
const BACKOFF_CAP_EXPONENT: u32 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Open = 2,
    Closing = 3,
}

impl From<u8> for ConnectionState {
    fn from(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Open,
            3 => Self::Closing,
            _ => Self::Disconnected,
        }
    }
}

/// Bounded drop-oldest FIFO (spec.md §4.B "bounded; overflow policy =
/// drop-oldest with logged warning").
struct OutboundBuffer {
    queue: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl OutboundBuffer {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    fn push(&self, frame: String) {
        let mut queue = self.queue.lock().expect("outbound buffer mutex poisoned");
        if queue.len() >= OUTBOUND_BUFFER_CAPACITY {
            queue.pop_front();
            warn!("outbound buffer full, dropping oldest frame");
        }
        queue.push_back(frame);
        drop(queue);
        self.notify.notify_one();
    }

    fn pop(&self) -> Option<String> {
        self.queue.lock().expect("outbound buffer mutex poisoned").pop_front()
    }
}

/// A `FrameSink` + reconnect state machine for one station's connection.
/// Outbound frames are always pushed to the same [`OutboundBuffer`]
/// regardless of connection state, which is what gives the "flush FIFO
/// before any post-reconnect message" ordering guarantee for free: the
/// pump task is the only writer and always drains in push order.
pub struct ConnectionManager {
    state: AtomicU8,
    retry_count: AtomicI64,
    max_retries: i64,
    outbound: Arc<OutboundBuffer>,
    ping_interval_secs: AtomicU8,
    current_url: Mutex<String>,
}

impl ConnectionManager {
    pub fn new(max_retries: i64, initial_url: String) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
            retry_count: AtomicI64::new(0),
            max_retries,
            outbound: Arc::new(OutboundBuffer::new()),
            ping_interval_secs: AtomicU8::new(0),
            current_url: Mutex::new(initial_url),
        })
    }

    /// Repoints future (re)connect attempts at a new supervision URL
    /// (spec.md §4.K `SetSupervisionUrl`). Takes effect on the next
    /// connect/reconnect cycle, not the current open socket.
    pub fn set_url(&self, url: String) {
        *self.current_url.lock().expect("connection manager mutex poisoned") = url;
    }

    fn url(&self) -> String {
        self.current_url.lock().expect("connection manager mutex poisoned").clone()
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    /// Computes the exponential backoff delay for `retry`:
    /// `baseTimeout * 2^min(retry, cap)` with jitter (spec.md §4.C).
    pub fn backoff_delay(retry: i64) -> Duration {
        let exponent = (retry.max(0) as u32).min(BACKOFF_CAP_EXPONENT);
        let scaled = BASE_BACKOFF * 2u32.pow(exponent);
        let jitter_ms = rand::thread_rng().gen_range(0..250);
        scaled + Duration::from_millis(jitter_ms)
    }

    /// Whether a retry attempt numbered `retry` (0-based) is still allowed
    /// under `autoReconnectMaxRetries` (-1 unlimited, 0 disabled, N bound;
    /// spec.md §4.C, §8 boundary behaviors).
    fn retry_allowed(&self, retry: i64) -> bool {
        self.max_retries < 0 || retry < self.max_retries
    }

    /// Runs the connect + auto-reconnect loop until `shutdown` fires.
    /// Inbound text frames are forwarded on `inbound_tx`; `on_open` is
    /// invoked after each successful handshake (boot / basicStart
    /// sequence on first open, reconnect sequence afterward).
    pub async fn run(
        self: Arc<Self>,
        version: OcppVersion,
        inbound_tx: mpsc::UnboundedSender<String>,
        mut on_open: impl FnMut() + Send + 'static,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) {
        loop {
            if *shutdown.borrow() {
                return;
            }

            self.set_state(ConnectionState::Connecting);
            let url = self.url();
            let request = tokio_tungstenite::tungstenite::client::IntoClientRequest::into_client_request(url.as_str());
            let request = match request {
                Ok(mut req) => {
                    req.headers_mut().insert(
                        "Sec-WebSocket-Protocol",
                        version.subprotocol().parse().expect("subprotocol is a valid header value"),
                    );
                    req
                }
                Err(err) => {
                    error!(url, error = %err, "invalid websocket url");
                    self.set_state(ConnectionState::Disconnected);
                    return;
                }
            };

            match tokio_tungstenite::connect_async(request).await {
                Ok((stream, _response)) => {
                    info!(url, "websocket connected");
                    self.retry_count.store(0, Ordering::Relaxed);
                    self.set_state(ConnectionState::Open);
                    on_open();

                    let (mut write, mut read) = stream.split();
                    let outbound = self.outbound.clone();
                    let ping_interval = self.ping_interval_secs.load(Ordering::Relaxed);

                    let closed = tokio::select! {
                        result = async {
                            loop {
                                if let Some(frame) = outbound.pop() {
                                    if write.send(Message::Text(frame)).await.is_err() {
                                        return true;
                                    }
                                    continue;
                                }
                                tokio::select! {
                                    _ = outbound.notify.notified() => {}
                                    _ = tokio::time::sleep(ping_duration(ping_interval)), if ping_interval > 0 => {
                                        if write.send(Message::Ping(Vec::new())).await.is_err() {
                                            return true;
                                        }
                                    }
                                }
                            }
                        } => result,
                        result = async {
                            while let Some(msg) = read.next().await {
                                match msg {
                                    Ok(Message::Text(text)) => {
                                        if inbound_tx.send(text).is_err() {
                                            return true;
                                        }
                                    }
                                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                                    Ok(Message::Close(_)) => return true,
                                    Ok(_) => {}
                                    Err(err) => {
                                        debug!(error = %err, "websocket read error");
                                        return true;
                                    }
                                }
                            }
                            true
                        } => result,
                    };
                    let _ = closed;
                }
                Err(err) => {
                    warn!(url, error = %err, "websocket connect failed");
                }
            }

            self.set_state(ConnectionState::Disconnected);
            if *shutdown.borrow() {
                return;
            }

            let retry = self.retry_count.fetch_add(1, Ordering::Relaxed);
            if !self.retry_allowed(retry) {
                error!(url, retry, "exhausted autoReconnectMaxRetries, giving up");
                return;
            }
            let delay = Self::backoff_delay(retry);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.changed() => return,
            }
        }
    }

    pub fn set_ping_interval_secs(&self, secs: u8) {
        self.ping_interval_secs.store(secs, Ordering::Relaxed);
    }
}

fn ping_duration(secs: u8) -> Duration {
    if secs == 0 {
        Duration::from_secs(3600)
    } else {
        Duration::from_secs(secs as u64)
    }
}

impl FrameSink for ConnectionManager {
    fn enqueue(&self, frame: String) {
        self.outbound.push(frame);
    }

    fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Open
    }
}

/// A [`FrameSink`] that accepts and discards frames, used in tests and
/// any context needing a correlator without a live connection.
#[derive(Default)]
pub struct NullSink {
    connected: std::sync::atomic::AtomicBool,
}

impl FrameSink for NullSink {
    fn enqueue(&self, _frame: String) {}

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_and_is_capped() {
        let small = ConnectionManager::backoff_delay(0);
        let large = ConnectionManager::backoff_delay(20);
        assert!(small < large);
        let capped_a = ConnectionManager::backoff_delay(BACKOFF_CAP_EXPONENT as i64);
        let capped_b = ConnectionManager::backoff_delay(BACKOFF_CAP_EXPONENT as i64 + 10);
        // Both should be based on the same capped exponent, modulo jitter.
        assert!(capped_b.as_secs() <= capped_a.as_secs() + 1);
    }

    #[test]
    fn retry_allowed_respects_bounds() {
        let manager = ConnectionManager::new(0, "ws://localhost".to_string());
        assert!(!manager.retry_allowed(0));

        let manager = ConnectionManager::new(-1, "ws://localhost".to_string());
        assert!(manager.retry_allowed(1000));

        let manager = ConnectionManager::new(3, "ws://localhost".to_string());
        assert!(manager.retry_allowed(2));
        assert!(!manager.retry_allowed(3));
    }

    #[test]
    fn outbound_buffer_drops_oldest_when_full() {
        let buffer = OutboundBuffer::new();
        for i in 0..(OUTBOUND_BUFFER_CAPACITY + 5) {
            buffer.push(format!("frame-{i}"));
        }
        let first = buffer.pop().unwrap();
        assert_eq!(first, "frame-5");
    }
}
