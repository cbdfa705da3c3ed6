//! JSON-RPC v2 duplex over a WebSocket.
//!
//! The connection is split into a writer half used by [`RpcConnection::call`]
//! and a reader thread that completes pending calls by id and forwards
//! server-initiated requests to the [`NotificationHandler`]. The transport
//! is a trait so tests can drive the client against a scripted duplex.

use std::collections::HashMap;
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tracing::{debug, warn};
use tungstenite::protocol::Role;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Message, WebSocket};

use crate::{Error, Result};

/// Receives server-initiated JSON-RPC requests (notifications).
pub trait NotificationHandler: Send + Sync {
    /// Called with the request `method` and its `params` object.
    fn handle(&self, method: &str, params: &Value);
}

/// A JSON-RPC v2 connection capable of correlated calls.
pub trait RpcConnection: Send + Sync {
    /// Issues `method` with `params` and blocks for the matching response.
    ///
    /// # Errors
    /// This function returns [`Error::Rpc`] when the server answers with an
    /// error object, [`Error::Timeout`] when no response arrives in time, and
    /// [`Error::ConnectionReset`] when the transport drops mid-call.
    fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value>;

    /// Force-closes the underlying transport. The reader observes the close
    /// and fires the disconnect notification.
    fn close(&self);

    /// Hands out the one-shot disconnect receiver. Returns `None` after the
    /// first take; there is a single reconnect watcher per connection.
    fn take_disconnect_rx(&self) -> Option<Receiver<()>>;
}

/// Builds an [`RpcConnection`] for `addr`, routing notifications to
/// `handler`. Injectable so tests can substitute a mock duplex.
pub type RpcFactory =
    Arc<dyn Fn(&str, Arc<dyn NotificationHandler>) -> Result<Arc<dyn RpcConnection>> + Send + Sync>;

type Pending = Arc<Mutex<HashMap<u64, SyncSender<Result<Value>>>>>;

/// The production connection over a `tungstenite` WebSocket.
///
/// TLS termination is delegated: the dialer speaks `ws://` to the venue
/// gateway or a terminating proxy.
pub struct WsRpcConnection {
    writer: Mutex<WebSocket<TcpStream>>,
    stream: TcpStream,
    pending: Pending,
    next_id: AtomicU64,
    closed: AtomicBool,
    disconnect_rx: Mutex<Option<Receiver<()>>>,
}

impl WsRpcConnection {
    /// Dials `addr` and spawns the reader thread.
    ///
    /// # Errors
    /// This function returns an error if the dial or WebSocket handshake
    /// fails.
    pub fn connect(addr: &str, handler: Arc<dyn NotificationHandler>) -> Result<Arc<Self>> {
        let (socket, _response) = tungstenite::connect(addr)
            .map_err(|e| Error::bad_argument("addr", format!("dialing {addr}: {e}")))?;
        let stream = match socket.get_ref() {
            MaybeTlsStream::Plain(stream) => stream
                .try_clone()
                .map_err(|e| Error::io(e, "cloning websocket stream"))?,
            _ => {
                return Err(Error::bad_argument(
                    "addr",
                    "TLS endpoints are not terminated here; dial ws:// behind a terminating proxy",
                ))
            }
        };
        // reads run on the handshaked socket; writes go through a second
        // frame layer over the same TCP stream
        let writer =
            WebSocket::from_raw_socket(stream.try_clone().map_err(|e| {
                Error::io(e, "cloning websocket stream")
            })?, Role::Client, None);

        let (disconnect_tx, disconnect_rx) = mpsc::channel();
        let conn = Arc::new(Self {
            writer: Mutex::new(writer),
            stream,
            pending: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            disconnect_rx: Mutex::new(Some(disconnect_rx)),
        });

        let reader_conn = Arc::clone(&conn);
        std::thread::spawn(move || {
            reader_conn.read_loop(socket, handler);
            let _ = disconnect_tx.send(());
        });
        Ok(conn)
    }

    fn read_loop(
        &self,
        mut socket: WebSocket<MaybeTlsStream<TcpStream>>,
        handler: Arc<dyn NotificationHandler>,
    ) {
        loop {
            match socket.read() {
                Ok(Message::Text(text)) => self.dispatch(&text, handler.as_ref()),
                Ok(Message::Close(_)) => break,
                Ok(Message::Ping(payload)) => {
                    // pongs go through the writer half; the reader never writes
                    let mut writer = self.writer.lock().expect("writer lock poisoned");
                    let _ = writer.send(Message::Pong(payload));
                }
                Ok(_) => {}
                Err(err) => {
                    if !self.closed.load(Ordering::SeqCst) {
                        debug!(%err, "websocket read failed");
                    }
                    break;
                }
            }
        }
        self.closed.store(true, Ordering::SeqCst);
        let mut pending = self.pending.lock().expect("pending lock poisoned");
        for (_, waiter) in pending.drain() {
            let _ = waiter.try_send(Err(Error::ConnectionReset));
        }
    }

    fn dispatch(&self, text: &str, handler: &dyn NotificationHandler) {
        let message: Value = match serde_json::from_str(text) {
            Ok(message) => message,
            Err(err) => {
                warn!(%err, "discarding malformed frame");
                return;
            }
        };
        if let Some(id) = message.get("id").and_then(Value::as_u64) {
            let outcome = if let Some(error) = message.get("error") {
                Err(Error::Rpc {
                    code: error.get("code").and_then(Value::as_i64).unwrap_or(0),
                    message: error
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown error")
                        .to_owned(),
                })
            } else {
                Ok(message.get("result").cloned().unwrap_or(Value::Null))
            };
            if let Some(waiter) = self
                .pending
                .lock()
                .expect("pending lock poisoned")
                .remove(&id)
            {
                let _ = waiter.try_send(outcome);
            }
            return;
        }
        if let Some(method) = message.get("method").and_then(Value::as_str) {
            let params = message.get("params").cloned().unwrap_or(Value::Null);
            handler.handle(method, &params);
        }
    }
}

impl RpcConnection for WsRpcConnection {
    fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ConnectionReset);
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let (tx, rx) = mpsc::sync_channel(1);
        self.pending
            .lock()
            .expect("pending lock poisoned")
            .insert(id, tx);

        let sent = {
            let mut writer = self.writer.lock().expect("writer lock poisoned");
            writer.send(Message::Text(request.to_string()))
        };
        if let Err(err) = sent {
            self.pending
                .lock()
                .expect("pending lock poisoned")
                .remove(&id);
            return Err(match err {
                tungstenite::Error::Io(io_err) => Error::io(io_err, format!("calling {method}")),
                other => Error::bad_argument("method", format!("send failed: {other}")),
            });
        }

        match rx.recv_timeout(timeout) {
            Ok(outcome) => outcome,
            Err(RecvTimeoutError::Timeout) => {
                self.pending
                    .lock()
                    .expect("pending lock poisoned")
                    .remove(&id);
                Err(Error::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::ConnectionReset),
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }

    fn take_disconnect_rx(&self) -> Option<Receiver<()>> {
        self.disconnect_rx
            .lock()
            .expect("disconnect lock poisoned")
            .take()
    }
}
