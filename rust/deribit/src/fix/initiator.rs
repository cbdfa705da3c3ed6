//! Session initiator: connection lifecycle, logon/logout, heartbeats, and
//! inbound message framing.

use std::fmt;
use std::io::{Read, Write};
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::{Error, Result};

use super::message::{tag, Message, SOH};
use super::settings::{setting, Settings};
use super::{format_sending_time, is_admin_msg_type};

/// Identifies one FIX session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionId {
    /// The FIX version, e.g. `FIX.4.4`.
    pub begin_string: String,
    /// Our comp id.
    pub sender_comp_id: String,
    /// The counterparty comp id.
    pub target_comp_id: String,
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}->{}",
            self.begin_string, self.sender_comp_id, self.target_comp_id
        )
    }
}

/// Callbacks the session invokes on the application, mirroring the usual
/// initiator seams so the client can stamp credentials and receive inbound
/// messages.
pub trait Application: Send + Sync {
    /// The session was created.
    fn on_create(&self, _session_id: &SessionId) {}
    /// Logon completed.
    fn on_logon(&self, _session_id: &SessionId) {}
    /// The session logged out or the transport dropped.
    fn on_logout(&self, _session_id: &SessionId) {}
    /// An admin message is about to be sent; logon credentials go here.
    fn to_admin(&self, _msg: &mut Message, _session_id: &SessionId) {}
    /// An application message is about to be sent.
    ///
    /// # Errors
    /// Returning an error aborts the send.
    fn to_app(&self, _msg: &mut Message, _session_id: &SessionId) -> Result<()> {
        Ok(())
    }
    /// An admin message arrived.
    ///
    /// # Errors
    /// Errors are logged by the session.
    fn from_admin(&self, _msg: &Message, _session_id: &SessionId) -> Result<()> {
        Ok(())
    }
    /// An application message arrived.
    ///
    /// # Errors
    /// Errors are logged by the session.
    fn from_app(&self, _msg: &Message, _session_id: &SessionId) -> Result<()> {
        Ok(())
    }
}

/// A session initiator; injectable so tests can run against a loopback.
pub trait Initiator: Send + Sync {
    /// Connects and logs on.
    ///
    /// # Errors
    /// This function returns an error when the transport cannot be
    /// established.
    fn start(&self) -> Result<()>;
    /// Logs out and closes the transport.
    fn stop(&self);
    /// Stamps the session header onto `msg` and writes it out.
    ///
    /// # Errors
    /// This function returns [`Error::NotConnected`] when no transport is
    /// up, or the write error.
    fn send(&self, msg: Message) -> Result<()>;
}

/// How long a blocked session read waits before re-checking the stop flag.
const READ_POLL: Duration = Duration::from_secs(1);

struct SessionCore {
    app: Arc<dyn Application>,
    session_id: SessionId,
    heart_bt_int: u64,
    reset_on_logon: bool,
    stream: Mutex<Option<TcpStream>>,
    seq_num: AtomicU64,
    stop: AtomicBool,
}

impl SessionCore {
    fn send_message(&self, mut msg: Message) -> Result<()> {
        msg.header.set(tag::BEGIN_STRING, &self.session_id.begin_string);
        msg.header
            .set(tag::SENDER_COMP_ID, &self.session_id.sender_comp_id);
        msg.header
            .set(tag::TARGET_COMP_ID, &self.session_id.target_comp_id);
        msg.header
            .set(tag::MSG_SEQ_NUM, self.seq_num.fetch_add(1, Ordering::SeqCst) + 1);
        msg.header
            .set(tag::SENDING_TIME, format_sending_time(time::OffsetDateTime::now_utc()));

        let msg_type = msg.header.get_required(tag::MSG_TYPE)?.to_owned();
        if is_admin_msg_type(&msg_type) {
            self.app.to_admin(&mut msg, &self.session_id);
        } else {
            self.app.to_app(&mut msg, &self.session_id)?;
        }

        let raw = msg.serialize();
        let mut guard = self.stream.lock().expect("stream lock poisoned");
        let stream = guard.as_mut().ok_or(Error::NotConnected)?;
        stream
            .write_all(raw.as_bytes())
            .map_err(|e| Error::io(e, format!("sending {msg_type}")))
    }

    fn close_stream(&self) {
        if let Some(stream) = self.stream.lock().expect("stream lock poisoned").take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Handles one inbound message; returns `false` when the session should
    /// end.
    fn dispatch(&self, raw: &str) -> bool {
        let msg = match Message::parse(raw) {
            Ok(msg) => msg,
            Err(err) => {
                warn!(%err, "discarding unparseable message");
                return true;
            }
        };
        let Some(msg_type) = msg.msg_type().map(str::to_owned) else {
            warn!("discarding message without MsgType");
            return true;
        };
        if !is_admin_msg_type(&msg_type) {
            if let Err(err) = self.app.from_app(&msg, &self.session_id) {
                warn!(%err, %msg_type, "from_app failed");
            }
            return true;
        }
        match msg_type.as_str() {
            "0" => {}
            "1" => {
                // answer test requests to keep the session alive
                let mut heartbeat = Message::with_msg_type("0");
                if let Some(test_req_id) = msg.body.get(tag::TEST_REQ_ID) {
                    heartbeat.body.set(tag::TEST_REQ_ID, test_req_id);
                }
                if let Err(err) = self.send_message(heartbeat) {
                    warn!(%err, "failed to answer test request");
                }
            }
            "A" => {
                info!(session = %self.session_id, "logged on");
                self.app.on_logon(&self.session_id);
            }
            "5" => {
                info!(session = %self.session_id, "logged out by counterparty");
                self.app.on_logout(&self.session_id);
                return false;
            }
            _ => {
                if let Err(err) = self.app.from_admin(&msg, &self.session_id) {
                    warn!(%err, %msg_type, "from_admin failed");
                }
            }
        }
        true
    }
}

/// Extracts one complete message (through its `CheckSum` field) from the
/// front of `buffer`.
fn extract_message(buffer: &mut Vec<u8>) -> Option<String> {
    let trailer = buffer
        .windows(4)
        .position(|window| window == [SOH as u8, b'1', b'0', b'='])?;
    let end = buffer[trailer + 4..]
        .iter()
        .position(|&b| b == SOH as u8)
        .map(|offset| trailer + 4 + offset)?;
    let raw: Vec<u8> = buffer.drain(..=end).collect();
    Some(String::from_utf8_lossy(&raw).into_owned())
}

/// The TCP initiator used in production.
pub struct SocketInitiator {
    core: Arc<SessionCore>,
    host: String,
    port: u16,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl SocketInitiator {
    /// Creates an initiator from validated `settings`, announcing the
    /// session to `app`.
    ///
    /// # Errors
    /// This function returns an error when a required setting is absent or
    /// malformed.
    pub fn new(app: Arc<dyn Application>, settings: &Settings) -> Result<Arc<Self>> {
        let session_id = SessionId {
            begin_string: settings.get_required(setting::BEGIN_STRING)?.to_owned(),
            sender_comp_id: settings.get_required(setting::SENDER_COMP_ID)?.to_owned(),
            target_comp_id: settings.get_required(setting::TARGET_COMP_ID)?.to_owned(),
        };
        let host = settings
            .get_required(setting::SOCKET_CONNECT_HOST)?
            .to_owned();
        let port: u16 = settings
            .get_required(setting::SOCKET_CONNECT_PORT)?
            .parse()
            .map_err(|_| Error::bad_argument(setting::SOCKET_CONNECT_PORT, "not a port number"))?;
        let heart_bt_int: u64 = settings
            .get_required(setting::HEART_BT_INT)?
            .parse()
            .map_err(|_| Error::bad_argument(setting::HEART_BT_INT, "not a number"))?;
        let reset_on_logon = settings.get(setting::RESET_ON_LOGON) == Some("Y");

        let initiator = Arc::new(Self {
            core: Arc::new(SessionCore {
                app,
                session_id,
                heart_bt_int,
                reset_on_logon,
                stream: Mutex::new(None),
                seq_num: AtomicU64::new(0),
                stop: AtomicBool::new(false),
            }),
            host,
            port,
            threads: Mutex::new(Vec::new()),
        });
        initiator
            .core
            .app
            .on_create(&initiator.core.session_id);
        Ok(initiator)
    }

    fn spawn_reader(&self, stream: TcpStream) {
        let core = Arc::clone(&self.core);
        self.threads
            .lock()
            .expect("threads lock poisoned")
            .push(std::thread::spawn(move || {
                let mut stream = stream;
                let mut buffer = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    if core.stop.load(Ordering::SeqCst) {
                        return;
                    }
                    match stream.read(&mut chunk) {
                        Ok(0) => {
                            debug!("session transport closed");
                            core.app.on_logout(&core.session_id);
                            return;
                        }
                        Ok(read) => {
                            buffer.extend_from_slice(&chunk[..read]);
                            while let Some(raw) = extract_message(&mut buffer) {
                                if !core.dispatch(&raw) {
                                    core.close_stream();
                                    return;
                                }
                            }
                        }
                        Err(err)
                            if matches!(
                                err.kind(),
                                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
                            ) => {}
                        Err(err) => {
                            if !core.stop.load(Ordering::SeqCst) {
                                warn!(%err, "session read failed");
                                core.app.on_logout(&core.session_id);
                            }
                            return;
                        }
                    }
                }
            }));
    }

    fn spawn_heartbeat(&self) {
        let core = Arc::clone(&self.core);
        self.threads
            .lock()
            .expect("threads lock poisoned")
            .push(std::thread::spawn(move || loop {
                let interval = Duration::from_secs(core.heart_bt_int.max(1));
                let mut waited = Duration::ZERO;
                while waited < interval {
                    if core.stop.load(Ordering::SeqCst) {
                        return;
                    }
                    std::thread::sleep(Duration::from_millis(100));
                    waited += Duration::from_millis(100);
                }
                if core.send_message(Message::with_msg_type("0")).is_err() {
                    return;
                }
            }));
    }
}

impl Initiator for SocketInitiator {
    fn start(&self) -> Result<()> {
        self.core.stop.store(false, Ordering::SeqCst);
        if self.core.reset_on_logon {
            self.core.seq_num.store(0, Ordering::SeqCst);
        }

        let stream = TcpStream::connect((self.host.as_str(), self.port))
            .map_err(|e| Error::io(e, format!("connecting to {}:{}", self.host, self.port)))?;
        stream
            .set_read_timeout(Some(READ_POLL))
            .map_err(|e| Error::io(e, "setting session read timeout"))?;
        let reader = stream
            .try_clone()
            .map_err(|e| Error::io(e, "cloning session stream"))?;
        *self.core.stream.lock().expect("stream lock poisoned") = Some(stream);

        let mut logon = Message::with_msg_type("A");
        logon.body.set(tag::ENCRYPT_METHOD, 0);
        logon.body.set(tag::HEART_BT_INT, self.core.heart_bt_int);
        if self.core.reset_on_logon {
            logon.body.set(tag::RESET_SEQ_NUM_FLAG, "Y");
        }
        self.core.send_message(logon)?;

        self.spawn_reader(reader);
        self.spawn_heartbeat();
        Ok(())
    }

    fn stop(&self) {
        let _ = self.core.send_message(Message::with_msg_type("5"));
        self.core.stop.store(true, Ordering::SeqCst);
        self.core.close_stream();
        let mut threads = self.threads.lock().expect("threads lock poisoned");
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
        self.core.app.on_logout(&self.core.session_id);
    }

    fn send(&self, msg: Message) -> Result<()> {
        self.core.send_message(msg)
    }
}
