use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::catalog::InstrumentsGetter;
use crate::emitter::{Emitter, ListenerId};
use crate::events::Instrument;
use crate::{Error, Result};

use super::models::{
    AuthParams, AuthResponse, GetInstrumentsParams, SetHeartbeatParams, SubscribeParams,
    SubscriptionEvent, TestResponse,
};
use super::rpc::{NotificationHandler, RpcConnection, RpcFactory, WsRpcConnection};
use super::subscriptions::process_event;

/// The production WebSocket endpoint.
pub const REAL_BASE_URL: &str = "wss://www.deribit.com/ws/api/v2/";
/// The test-net WebSocket endpoint.
pub const TEST_BASE_URL: &str = "wss://test.deribit.com/ws/api/v2/";

/// Server-side heartbeat interval requested at connect, in seconds.
const HEARTBEAT_INTERVAL: u64 = 30;
/// Cadence of the client-side `public/test` probe.
const TEST_PROBE_INTERVAL: Duration = Duration::from_secs(5);
/// How long a call waits for its response.
const CALL_TIMEOUT: Duration = Duration::from_secs(10);
/// Dial attempts before `start` gives up.
const DIAL_ATTEMPTS: u32 = 3;
/// Pause between dial attempts.
const DIAL_RETRY_PAUSE: Duration = Duration::from_secs(5);
/// Pause after a disconnect before redialing.
const RECONNECT_PAUSE: Duration = Duration::from_secs(1);
/// Pause between failed reconnect rounds.
const RECONNECT_RETRY_PAUSE: Duration = Duration::from_secs(5);

/// Configuration of the WebSocket client.
#[derive(Clone, Default)]
pub struct Configuration {
    /// The endpoint to dial, e.g. [`TEST_BASE_URL`].
    pub addr: String,
    /// API client id; empty skips authentication.
    pub api_key: String,
    /// API secret key.
    pub secret_key: String,
    /// Whether a disconnect triggers indefinite redialing.
    pub auto_reconnect: bool,
    /// Log every dispatched subscription event.
    pub debug_mode: bool,
    /// Transport factory override; `None` dials with `tungstenite`.
    pub connect: Option<RpcFactory>,
}

struct Inner {
    addr: String,
    api_key: String,
    secret_key: String,
    auto_reconnect: bool,
    debug_mode: bool,
    connect: RpcFactory,
    emitter: Arc<Emitter>,
    conn: Mutex<Option<Arc<dyn RpcConnection>>>,
    is_connected: AtomicBool,
    authenticated: AtomicBool,
    subscriptions: Mutex<Vec<String>>,
    heart_cancel: Mutex<Option<Arc<AtomicBool>>>,
    stop: AtomicBool,
}

/// JSON-RPC v2 client over a persistent WebSocket: authenticated calls,
/// channel subscriptions, heartbeats, and auto-reconnect with subscription
/// restoration.
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Creates a client publishing subscription events on `emitter`.
    pub fn new(emitter: Arc<Emitter>, config: Configuration) -> Self {
        let connect = config.connect.unwrap_or_else(|| {
            Arc::new(|addr: &str, handler| {
                WsRpcConnection::connect(addr, handler).map(|conn| conn as Arc<dyn RpcConnection>)
            })
        });
        Self {
            inner: Arc::new(Inner {
                addr: config.addr,
                api_key: config.api_key,
                secret_key: config.secret_key,
                auto_reconnect: config.auto_reconnect,
                debug_mode: config.debug_mode,
                connect,
                emitter,
                conn: Mutex::new(None),
                is_connected: AtomicBool::new(false),
                authenticated: AtomicBool::new(false),
                subscriptions: Mutex::new(Vec::new()),
                heart_cancel: Mutex::new(None),
                stop: AtomicBool::new(false),
            }),
        }
    }

    /// Dials, authenticates, restores subscriptions, and spawns the
    /// heartbeat and reconnect watchers.
    ///
    /// # Errors
    /// This function returns an error when every dial attempt fails or the
    /// post-connect handshake (auth, resubscribe, heartbeat setup) fails.
    pub fn start(&self) -> Result<()> {
        self.inner.stop.store(false, Ordering::SeqCst);
        Inner::start(&self.inner)
    }

    /// Closes the connection and stops every watcher. Subscriptions are
    /// forgotten.
    pub fn stop(&self) {
        self.inner.stop();
    }

    /// Whether the connection is currently up.
    pub fn is_connected(&self) -> bool {
        self.inner.is_connected.load(Ordering::SeqCst)
    }

    /// Issues a JSON-RPC call and decodes the result.
    ///
    /// # Errors
    /// This function fails fast with [`Error::NotConnected`] while the
    /// connection is down; transport-level failures force-close the socket
    /// so the reconnect watcher picks it up.
    pub fn call<P, R>(&self, method: &str, params: Option<P>) -> Result<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let params = match params {
            Some(params) => serde_json::to_value(params)?,
            None => json!({}),
        };
        self.inner.raw_call(method, params)
    }

    /// `public/test`, also used as the heartbeat probe.
    ///
    /// # Errors
    /// See [`Self::call`].
    pub fn test(&self) -> Result<TestResponse> {
        self.call("public/test", None::<()>)
    }

    /// Subscribes `channels`, deduplicating against earlier subscriptions.
    /// Uses `private/subscribe` once authenticated.
    ///
    /// # Errors
    /// See [`Self::call`].
    pub fn subscribe(&self, channels: &[String]) -> Result<()> {
        let fresh: Vec<String> = {
            let subscriptions = self
                .inner
                .subscriptions
                .lock()
                .expect("subscriptions lock poisoned");
            channels
                .iter()
                .filter(|channel| !subscriptions.contains(channel))
                .cloned()
                .collect()
        };
        if fresh.is_empty() {
            return Ok(());
        }
        self.inner.send_subscribe(&fresh)?;
        self.inner
            .subscriptions
            .lock()
            .expect("subscriptions lock poisoned")
            .extend(fresh);
        Ok(())
    }

    /// Unsubscribes `channels` and forgets them.
    ///
    /// # Errors
    /// See [`Self::call`].
    pub fn unsubscribe(&self, channels: &[String]) -> Result<()> {
        let method = if self.inner.authenticated.load(Ordering::SeqCst) {
            "private/unsubscribe"
        } else {
            "public/unsubscribe"
        };
        let _: Value = self.inner.raw_call(
            method,
            serde_json::to_value(SubscribeParams {
                channels: channels.to_vec(),
            })?,
        )?;
        let mut subscriptions = self
            .inner
            .subscriptions
            .lock()
            .expect("subscriptions lock poisoned");
        subscriptions.retain(|channel| !channels.contains(channel));
        Ok(())
    }

    /// Registers `listener` on `channel`. See [`Emitter::on`].
    pub fn on<T, F>(&self, channel: &str, listener: F) -> ListenerId
    where
        T: std::any::Any,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.emitter.on(channel, listener)
    }

    /// Removes a registration. See [`Emitter::off`].
    pub fn off(&self, channel: &str, id: ListenerId) {
        self.inner.emitter.off(channel, id);
    }
}

impl InstrumentsGetter for Client {
    fn get_instruments(&self, currency: &str) -> Result<Vec<Instrument>> {
        self.call(
            "public/get_instruments",
            Some(GetInstrumentsParams {
                currency: currency.to_owned(),
                expired: false,
            }),
        )
    }
}

impl NotificationHandler for Inner {
    fn handle(&self, method: &str, params: &Value) {
        if method != "subscription" {
            return;
        }
        let event: SubscriptionEvent = match serde_json::from_value(params.clone()) {
            Ok(event) => event,
            Err(_) => return,
        };
        if self.debug_mode {
            debug!(channel = %event.channel, "subscription event");
        }
        process_event(&self.emitter, &event.channel, &event.data);
    }
}

impl Inner {
    fn start(inner: &Arc<Inner>) -> Result<()> {
        inner.is_connected.store(false, Ordering::SeqCst);
        inner.authenticated.store(false, Ordering::SeqCst);

        let handler: Arc<dyn NotificationHandler> = Arc::clone(inner) as _;
        let mut dialed = None;
        let mut last_err = Error::NotConnected;
        for attempt in 0..DIAL_ATTEMPTS {
            match (inner.connect)(&inner.addr, Arc::clone(&handler)) {
                Ok(conn) => {
                    dialed = Some(conn);
                    break;
                }
                Err(err) => {
                    warn!(addr = %inner.addr, %err, "dial failed");
                    last_err = err;
                    if attempt + 1 < DIAL_ATTEMPTS {
                        std::thread::sleep(DIAL_RETRY_PAUSE);
                    }
                }
            }
        }
        let conn = dialed.ok_or(last_err)?;
        *inner.conn.lock().expect("conn lock poisoned") = Some(Arc::clone(&conn));
        inner.is_connected.store(true, Ordering::SeqCst);

        if !inner.api_key.is_empty() && !inner.secret_key.is_empty() {
            inner.auth()?;
        }

        let restored: Vec<String> = inner
            .subscriptions
            .lock()
            .expect("subscriptions lock poisoned")
            .clone();
        if !restored.is_empty() {
            inner.send_subscribe(&restored)?;
        }

        let _: Value = inner.raw_call(
            "public/set_heartbeat",
            serde_json::to_value(SetHeartbeatParams {
                interval: HEARTBEAT_INTERVAL,
            })?,
        )?;

        Inner::spawn_heartbeat(inner);
        if inner.auto_reconnect {
            Inner::spawn_reconnect_watcher(inner, &conn);
        }
        Ok(())
    }

    fn stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        self.is_connected.store(false, Ordering::SeqCst);
        self.authenticated.store(false, Ordering::SeqCst);
        self.cancel_heartbeat();
        if let Some(conn) = self.conn.lock().expect("conn lock poisoned").take() {
            conn.close();
        }
        self.subscriptions
            .lock()
            .expect("subscriptions lock poisoned")
            .clear();
    }

    fn auth(&self) -> Result<()> {
        let response: AuthResponse = {
            let params = serde_json::to_value(AuthParams {
                grant_type: "client_credentials".to_owned(),
                client_id: self.api_key.clone(),
                client_secret: self.secret_key.clone(),
            })?;
            self.raw_call("public/auth", params)?
        };
        if response.access_token.is_empty() {
            return Err(Error::AuthenticationRequired);
        }
        self.authenticated.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn send_subscribe(&self, channels: &[String]) -> Result<()> {
        let method = if self.authenticated.load(Ordering::SeqCst) {
            "private/subscribe"
        } else {
            "public/subscribe"
        };
        let response: Value = self.raw_call(
            method,
            serde_json::to_value(SubscribeParams {
                channels: channels.to_vec(),
            })?,
        )?;
        let confirmed: Vec<String> =
            serde_json::from_value(response).unwrap_or_else(|_| channels.to_vec());
        if confirmed.len() != channels.len() {
            warn!(
                requested = channels.len(),
                confirmed = confirmed.len(),
                "venue confirmed fewer channels than requested"
            );
        }
        Ok(())
    }

    fn raw_call<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R> {
        if !self.is_connected.load(Ordering::SeqCst) {
            return Err(Error::NotConnected);
        }
        let conn = self
            .conn
            .lock()
            .expect("conn lock poisoned")
            .clone()
            .ok_or(Error::NotConnected)?;
        match conn.call(method, params, CALL_TIMEOUT) {
            Ok(result) => Ok(serde_json::from_value(result)?),
            Err(err) => {
                if err.is_connection_closed() {
                    warn!(method, %err, "transport failure, force-closing socket");
                    conn.close();
                }
                Err(err)
            }
        }
    }

    fn spawn_heartbeat(inner: &Arc<Inner>) {
        let cancel = Arc::new(AtomicBool::new(false));
        if let Some(previous) = inner
            .heart_cancel
            .lock()
            .expect("heartbeat lock poisoned")
            .replace(Arc::clone(&cancel))
        {
            previous.store(true, Ordering::SeqCst);
        }

        let inner = Arc::clone(inner);
        std::thread::spawn(move || loop {
            let mut waited = Duration::ZERO;
            while waited < TEST_PROBE_INTERVAL {
                if cancel.load(Ordering::SeqCst) || inner.stop.load(Ordering::SeqCst) {
                    debug!("heartbeat cancelled");
                    return;
                }
                std::thread::sleep(Duration::from_millis(100));
                waited += Duration::from_millis(100);
            }
            let probe: Result<TestResponse> = inner.raw_call("public/test", json!({}));
            if let Err(err) = probe {
                warn!(%err, "heartbeat probe failed, closing socket");
                if let Some(conn) = inner.conn.lock().expect("conn lock poisoned").as_ref() {
                    conn.close();
                }
            }
        });
    }

    fn cancel_heartbeat(&self) {
        if let Some(cancel) = self
            .heart_cancel
            .lock()
            .expect("heartbeat lock poisoned")
            .take()
        {
            cancel.store(true, Ordering::SeqCst);
        }
    }

    fn spawn_reconnect_watcher(inner: &Arc<Inner>, conn: &Arc<dyn RpcConnection>) {
        let Some(disconnect_rx) = conn.take_disconnect_rx() else {
            return;
        };
        let inner = Arc::clone(inner);
        std::thread::spawn(move || {
            // both a signal and a dropped sender mean the connection is gone
            let _ = disconnect_rx.recv();
            if inner.stop.load(Ordering::SeqCst) {
                info!("connection stopped");
                return;
            }
            Inner::restart_connection(&inner);
        });
    }

    fn restart_connection(inner: &Arc<Inner>) {
        inner.is_connected.store(false, Ordering::SeqCst);
        inner.cancel_heartbeat();
        info!("disconnected, reconnecting");
        std::thread::sleep(RECONNECT_PAUSE);
        loop {
            if inner.stop.load(Ordering::SeqCst) {
                return;
            }
            match Inner::start(inner) {
                Ok(()) => {
                    info!("reconnected");
                    return;
                }
                Err(err) => {
                    // drop any half-open state before the next round
                    if let Some(conn) = inner.conn.lock().expect("conn lock poisoned").take() {
                        conn.close();
                    }
                    warn!(%err, "reconnect attempt failed");
                    std::thread::sleep(RECONNECT_RETRY_PAUSE);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::mpsc::{self, Receiver, Sender};
    use std::sync::Mutex as StdMutex;
    use std::time::Instant;

    use super::*;
    use crate::events::{
        DeribitPriceIndexNotification, EstimatedExpirationPriceNotification, Order,
        OrderBookGroupNotification, OrderBookNotificationItem, OrderBookRawNotification,
        PortfolioNotification, QuoteNotification, TickerNotification, TradesNotification,
        UserChangesNotification,
    };

    struct MockRpcConnection {
        results: StdMutex<VecDeque<Value>>,
        calls: StdMutex<Vec<(String, Value)>>,
        closed: AtomicBool,
        disconnect_tx: StdMutex<Option<Sender<()>>>,
        disconnect_rx: StdMutex<Option<Receiver<()>>>,
    }

    impl MockRpcConnection {
        fn new(results: Vec<Value>) -> Arc<Self> {
            let (tx, rx) = mpsc::channel();
            Arc::new(Self {
                results: StdMutex::new(results.into()),
                calls: StdMutex::new(Vec::new()),
                closed: AtomicBool::new(false),
                disconnect_tx: StdMutex::new(Some(tx)),
                disconnect_rx: StdMutex::new(Some(rx)),
            })
        }

        fn push_result(&self, result: Value) {
            self.results.lock().unwrap().push_back(result);
        }

        fn calls(&self) -> Vec<(String, Value)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl RpcConnection for MockRpcConnection {
        fn call(&self, method: &str, params: Value, _timeout: Duration) -> Result<Value> {
            if self.closed.load(Ordering::SeqCst) {
                return Err(Error::ConnectionReset);
            }
            self.calls
                .lock()
                .unwrap()
                .push((method.to_owned(), params));
            Ok(self
                .results
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Value::Null))
        }

        fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
            if let Some(tx) = self.disconnect_tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
        }

        fn take_disconnect_rx(&self) -> Option<Receiver<()>> {
            self.disconnect_rx.lock().unwrap().take()
        }
    }

    struct MockTransport {
        conns: StdMutex<Vec<Arc<MockRpcConnection>>>,
    }

    impl MockTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                conns: StdMutex::new(Vec::new()),
            })
        }

        fn factory(transport: &Arc<Self>) -> RpcFactory {
            let transport = Arc::clone(transport);
            Arc::new(move |_addr, _handler| {
                let conn = MockRpcConnection::new(vec![json!({
                    "access_token": "token",
                    "refresh_token": "refresh",
                    "expires_in": 900,
                    "scope": "session",
                })]);
                transport.conns.lock().unwrap().push(Arc::clone(&conn));
                Ok(conn as Arc<dyn RpcConnection>)
            })
        }

        fn conn(&self, index: usize) -> Arc<MockRpcConnection> {
            Arc::clone(&self.conns.lock().unwrap()[index])
        }

        fn len(&self) -> usize {
            self.conns.lock().unwrap().len()
        }
    }

    fn new_client(transport: &Arc<MockTransport>, auto_reconnect: bool) -> Client {
        Client::new(
            Arc::new(Emitter::new()),
            Configuration {
                addr: TEST_BASE_URL.to_owned(),
                api_key: "test_api_key".to_owned(),
                secret_key: "test_secret_key".to_owned(),
                auto_reconnect,
                debug_mode: true,
                connect: Some(MockTransport::factory(transport)),
            },
        )
    }

    #[test]
    fn test_start_stop() {
        let transport = MockTransport::new();
        let client = new_client(&transport, false);
        client.start().unwrap();
        assert!(client.is_connected());
        client.stop();
        assert!(!client.is_connected());
    }

    #[test]
    fn test_call() {
        let transport = MockTransport::new();
        let client = new_client(&transport, false);

        let before: Result<TestResponse> = client.test();
        assert!(matches!(before, Err(Error::NotConnected)));

        client.start().unwrap();
        transport.conn(0).push_result(json!({"version": "1.2.26"}));
        let response = client.test().unwrap();
        assert_eq!(response.version, "1.2.26");
        client.stop();
    }

    #[test]
    fn test_get_instruments() {
        let transport = MockTransport::new();
        let client = new_client(&transport, false);
        client.start().unwrap();
        transport.conn(0).push_result(json!([
            {"instrument_id": 210838, "instrument_name": "BTC-PERPETUAL", "kind": "future"}
        ]));
        let instruments = client.get_instruments("BTC").unwrap();
        assert_eq!(instruments.len(), 1);
        assert_eq!(instruments[0].instrument_name, "BTC-PERPETUAL");
        client.stop();
    }

    #[test]
    fn test_subscribe_deduplicates_and_uses_private_method() {
        let transport = MockTransport::new();
        let client = new_client(&transport, false);
        client.start().unwrap();

        let channels = vec!["book.BTC-PERPETUAL.raw".to_owned()];
        client.subscribe(&channels).unwrap();
        client.subscribe(&channels).unwrap();

        let subscribes: Vec<_> = transport
            .conn(0)
            .calls()
            .into_iter()
            .filter(|(method, _)| method == "private/subscribe")
            .collect();
        assert_eq!(subscribes.len(), 1);
        assert_eq!(
            subscribes[0].1,
            json!({"channels": ["book.BTC-PERPETUAL.raw"]})
        );
        client.stop();
    }

    #[test]
    fn test_reconnect_restores_subscriptions() {
        let transport = MockTransport::new();
        let client = new_client(&transport, true);
        client.start().unwrap();
        client
            .subscribe(&["book.BTC-PERPETUAL.raw".to_owned()])
            .unwrap();

        // sever the transport; the watcher should redial and resubscribe
        transport.conn(0).close();

        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if transport.len() >= 2 && client.is_connected() {
                break;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        assert!(client.is_connected());
        assert_eq!(transport.len(), 2);

        let restored = transport.conn(1).calls();
        assert!(restored
            .iter()
            .any(|(method, params)| method == "private/subscribe"
                && params == &json!({"channels": ["book.BTC-PERPETUAL.raw"]})));
        client.stop();
    }

    fn started_client(transport: &Arc<MockTransport>) -> Client {
        let client = new_client(transport, false);
        client.start().unwrap();
        client
    }

    fn handle(client: &Client, channel: &str, data: Value) {
        client.inner.handle(
            "subscription",
            &json!({"channel": channel, "data": data}),
        );
    }

    #[test]
    fn test_dispatch_book_raw() {
        let transport = MockTransport::new();
        let client = started_client(&transport);
        let received = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        client.on::<OrderBookRawNotification, _>("book.BTC-PERPETUAL.raw", move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        handle(
            &client,
            "book.BTC-PERPETUAL.raw",
            json!({
                "type": "change",
                "timestamp": 1662714568585u64,
                "prev_change_id": 14214947552u64,
                "instrument_name": "BTC-PERPETUAL",
                "change_id": 14214947618u64,
                "bids": [["new", 20338, 20700], ["delete", 20337, 0]],
                "asks": [["change", 20644.5, 2580], ["new", 20684, 3510], ["delete", 20686.5, 0]],
            }),
        );

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        let book = &received[0];
        assert_eq!(
            book.bids,
            vec![
                OrderBookNotificationItem {
                    action: "new".to_owned(),
                    price: 20338.0,
                    amount: 20700.0,
                },
                OrderBookNotificationItem {
                    action: "delete".to_owned(),
                    price: 20337.0,
                    amount: 0.0,
                },
            ]
        );
        assert_eq!(book.asks.len(), 3);
        client.stop();
    }

    #[test]
    fn test_dispatch_book_grouped() {
        let transport = MockTransport::new();
        let client = started_client(&transport);
        let received = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        client.on::<OrderBookGroupNotification, _>(
            "book.BTC-PERPETUAL.none.1.100ms",
            move |event| {
                sink.lock().unwrap().push(event.clone());
            },
        );

        handle(
            &client,
            "book.BTC-PERPETUAL.none.1.100ms",
            json!({
                "timestamp": 1662715579344u64,
                "instrument_name": "BTC-PERPETUAL",
                "change_id": 14214997020u64,
                "bids": [[20659.0, 3970.0]],
                "asks": [[20661.5, 190.0]],
            }),
        );

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].bids, vec![[20659.0, 3970.0]]);
        assert_eq!(received[0].asks, vec![[20661.5, 190.0]]);
        client.stop();
    }

    #[test]
    fn test_dispatch_trades_ticker_quote() {
        let transport = MockTransport::new();
        let client = started_client(&transport);
        let trades = Arc::new(StdMutex::new(Vec::new()));
        let tickers = Arc::new(StdMutex::new(Vec::new()));
        let quotes = Arc::new(StdMutex::new(Vec::new()));

        let sink = Arc::clone(&trades);
        client.on::<TradesNotification, _>("trades.BTC-PERPETUAL.100ms", move |event| {
            sink.lock().unwrap().push(event.clone());
        });
        let sink = Arc::clone(&tickers);
        client.on::<TickerNotification, _>("ticker.BTC-PERPETUAL.100ms", move |event| {
            sink.lock().unwrap().push(event.clone());
        });
        let sink = Arc::clone(&quotes);
        client.on::<QuoteNotification, _>("quote.BTC-PERPETUAL", move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        handle(
            &client,
            "trades.BTC-PERPETUAL.100ms",
            json!([{
                "trade_seq": 81769518u64,
                "trade_id": "119810484",
                "timestamp": 1662957035112u64,
                "tick_direction": 2,
                "price": 21703.0,
                "mark_price": 21705.36,
                "instrument_name": "BTC-PERPETUAL",
                "index_price": 21711.76,
                "direction": "sell",
                "amount": 1000.0,
            }]),
        );
        handle(
            &client,
            "ticker.BTC-PERPETUAL.100ms",
            json!({
                "timestamp": 1662721394017u64,
                "stats": {"volume_usd": 194393720.0, "volume": 9678.2677082,
                          "price_change": 8.5883, "low": 19025.0, "high": 21100.5},
                "state": "open",
                "settlement_price": 20585.66,
                "min_price": 20685.71,
                "max_price": 21315.73,
                "mark_price": 20992.53,
                "last_price": 21007.5,
                "instrument_name": "BTC-PERPETUAL",
                "index_price": 21025.44,
                "funding_8h": -0.00188426,
                "current_funding": -0.00106525,
                "best_bid_price": 20986.0,
                "best_bid_amount": 460.0,
                "best_ask_price": 20987.5,
                "best_ask_amount": 400.0,
            }),
        );
        handle(
            &client,
            "quote.BTC-PERPETUAL",
            json!({
                "timestamp": 1662721273742u64,
                "instrument_name": "BTC-PERPETUAL",
                "best_bid_price": 21070.0,
                "best_bid_amount": 1010.0,
                "best_ask_price": 21075.0,
                "best_ask_amount": 3730.0,
            }),
        );

        let trades = trades.lock().unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0][0].trade_id, "119810484");
        assert_eq!(trades[0][0].direction, "sell");

        let tickers = tickers.lock().unwrap();
        assert_eq!(tickers.len(), 1);
        assert_eq!(tickers[0].best_bid_price, Some(20986.0));
        assert_eq!(tickers[0].stats.low, 19025.0);

        let quotes = quotes.lock().unwrap();
        assert_eq!(quotes.len(), 1);
        assert_eq!(quotes[0].best_ask_amount, 3730.0);
        client.stop();
    }

    #[test]
    fn test_dispatch_user_and_index_channels() {
        let transport = MockTransport::new();
        let client = started_client(&transport);
        let orders = Arc::new(StdMutex::new(Vec::new()));
        let portfolios = Arc::new(StdMutex::new(Vec::new()));
        let changes = Arc::new(StdMutex::new(Vec::new()));
        let indexes = Arc::new(StdMutex::new(Vec::new()));
        let expirations = Arc::new(StdMutex::new(Vec::new()));

        let sink = Arc::clone(&orders);
        client.on::<Order, _>("user.orders.BTC-PERPETUAL.raw", move |event| {
            sink.lock().unwrap().push(event.clone());
        });
        let sink = Arc::clone(&portfolios);
        client.on::<PortfolioNotification, _>("user.portfolio.BTC", move |event| {
            sink.lock().unwrap().push(event.clone());
        });
        let sink = Arc::clone(&changes);
        client.on::<UserChangesNotification, _>(
            "user.changes.BTC-PERPETUAL.100ms",
            move |event| {
                sink.lock().unwrap().push(event.clone());
            },
        );
        let sink = Arc::clone(&indexes);
        client.on::<DeribitPriceIndexNotification, _>("deribit_price_index.btc_usd", move |e| {
            sink.lock().unwrap().push(e.clone());
        });
        let sink = Arc::clone(&expirations);
        client.on::<EstimatedExpirationPriceNotification, _>(
            "estimated_expiration_price.btc_usd",
            move |e| {
                sink.lock().unwrap().push(e.clone());
            },
        );

        handle(
            &client,
            "user.orders.BTC-PERPETUAL.raw",
            json!({
                "time_in_force": "good_til_cancelled",
                "price": 22084.0,
                "order_type": "market",
                "order_state": "filled",
                "order_id": "14228823973",
                "instrument_name": "BTC-PERPETUAL",
                "filled_amount": 100.0,
                "direction": "buy",
                "creation_timestamp": 1662964399064u64,
                "average_price": 21760.5,
                "amount": 100.0,
            }),
        );
        handle(
            &client,
            "user.portfolio.BTC",
            json!({
                "currency": "BTC",
                "equity": 6670.28643738,
                "balance": 6662.3599048,
                "margin_balance": 6663.85236718,
                "available_funds": 6548.71627812,
                "maintenance_margin": 104.88127092,
            }),
        );
        handle(
            &client,
            "user.changes.BTC-PERPETUAL.100ms",
            json!({
                "instrument_name": "BTC-PERPETUAL",
                "trades": [{"trade_seq": 81772419u64, "trade_id": "119813642",
                            "price": 21760.5, "direction": "buy", "amount": 20.0}],
                "positions": [{"instrument_name": "BTC-PERPETUAL", "kind": "future",
                               "size": 100.0, "direction": "buy"}],
                "orders": [{"order_id": "14228823973", "order_state": "filled"}],
            }),
        );
        handle(
            &client,
            "deribit_price_index.btc_usd",
            json!({"timestamp": 1662715972131u64, "price": 20651.5, "index_name": "btc_usd"}),
        );
        handle(
            &client,
            "estimated_expiration_price.btc_usd",
            json!({"seconds": 76228u64, "price": 21094.14, "is_estimated": false}),
        );

        assert_eq!(orders.lock().unwrap().len(), 1);
        assert_eq!(orders.lock().unwrap()[0].order_id, "14228823973");
        assert_eq!(portfolios.lock().unwrap().len(), 1);
        assert_eq!(portfolios.lock().unwrap()[0].currency, "BTC");
        let changes = changes.lock().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].trades.len(), 1);
        assert_eq!(changes[0].positions.len(), 1);
        assert_eq!(changes[0].orders.len(), 1);
        assert_eq!(indexes.lock().unwrap()[0].price, 20651.5);
        assert_eq!(expirations.lock().unwrap()[0].seconds, 76228);
        client.stop();
    }

    #[test]
    fn test_dispatch_unknown_channel_is_ignored() {
        let transport = MockTransport::new();
        let client = started_client(&transport);
        handle(&client, "weather.BTC", json!({"temp": 21}));
        handle(&client, "announcements", Value::Null);
        client.stop();
    }
}
