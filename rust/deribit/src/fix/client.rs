use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, warn};

use crate::emitter::{Emitter, ListenerId};
use crate::events::{
    Instrument, MassCancelReport, Order, OrderBookNotificationItem, OrderBookRawNotification,
    UserTrade,
};
use crate::{Error, Result};

use super::initiator::{Application, Initiator, SessionId, SocketInitiator};
use super::message::{tag, Message};
use super::settings::{setting, Settings};
use super::{
    decode_order_side, decode_order_status, decode_order_type, decode_time_in_force,
    new_request_id, parse_fix_timestamp, req_id_tag,
};

/// How long a call waits for its correlated response.
const CALL_TIMEOUT: Duration = Duration::from_secs(10);

struct Inner {
    emitter: Arc<Emitter>,
    api_key: String,
    secret_key: String,
    pending: Mutex<HashMap<String, SyncSender<Message>>>,
    logged_on: AtomicBool,
}

/// FIX 4.4 initiator-side client: request correlation plus translation of
/// market-data and execution-report messages into bus events.
pub struct Client {
    inner: Arc<Inner>,
    initiator: Arc<dyn Initiator>,
}

impl Client {
    /// Creates a client over the initiator produced by `create_initiator`,
    /// after validating the conditionally required session settings.
    ///
    /// # Errors
    /// This function returns
    /// [`Error::ConditionallyRequiredSettingMissing`] for an
    /// incomplete configuration, or the factory's error.
    pub fn new<F>(
        emitter: Arc<Emitter>,
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
        settings: &Settings,
        create_initiator: F,
    ) -> Result<Self>
    where
        F: FnOnce(Arc<dyn Application>, &Settings) -> Result<Arc<dyn Initiator>>,
    {
        for key in [
            setting::BEGIN_STRING,
            setting::SOCKET_CONNECT_HOST,
            setting::SOCKET_CONNECT_PORT,
            setting::SENDER_COMP_ID,
            setting::TARGET_COMP_ID,
            setting::HEART_BT_INT,
            setting::RESET_ON_LOGON,
        ] {
            settings.get_required(key)?;
        }
        let inner = Arc::new(Inner {
            emitter,
            api_key: api_key.into(),
            secret_key: secret_key.into(),
            pending: Mutex::new(HashMap::new()),
            logged_on: AtomicBool::new(false),
        });
        let app: Arc<dyn Application> = Arc::clone(&inner) as _;
        let initiator = create_initiator(app, settings)?;
        Ok(Self { inner, initiator })
    }

    /// Creates a client over a TCP [`SocketInitiator`].
    ///
    /// # Errors
    /// See [`Self::new`].
    pub fn with_socket_initiator(
        emitter: Arc<Emitter>,
        api_key: impl Into<String>,
        secret_key: impl Into<String>,
        settings: &Settings,
    ) -> Result<Self> {
        Self::new(emitter, api_key, secret_key, settings, |app, settings| {
            SocketInitiator::new(app, settings).map(|initiator| initiator as Arc<dyn Initiator>)
        })
    }

    /// Runs the session logon.
    ///
    /// # Errors
    /// This function returns an error when the transport cannot be
    /// established.
    pub fn start(&self) -> Result<()> {
        self.initiator.start()
    }

    /// Logs out and closes the session.
    pub fn stop(&self) {
        self.initiator.stop();
    }

    /// Whether the session is currently logged on.
    pub fn is_logged_on(&self) -> bool {
        self.inner.logged_on.load(Ordering::SeqCst)
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

    /// Stamps the request-id tag for the message type, registers a waiter
    /// under `id` when `wait` is set, and writes the message out.
    ///
    /// # Errors
    /// This function returns
    /// [`Error::ConditionallyRequiredFieldMissing`] when `MsgType`
    /// is absent (the pending entry is removed), or the initiator's send
    /// error.
    pub(crate) fn send(
        &self,
        id: &str,
        mut msg: Message,
        wait: bool,
    ) -> Result<Option<Receiver<Message>>> {
        let msg_type = msg
            .msg_type()
            .ok_or(Error::ConditionallyRequiredFieldMissing(tag::MSG_TYPE))?
            .to_owned();
        if let Ok(req_tag) = req_id_tag(&msg_type) {
            if !msg.body.contains(req_tag) {
                msg.body.set(req_tag, id);
            }
        }

        let waiter = if wait {
            let (tx, rx) = mpsc::sync_channel(1);
            self.inner
                .pending
                .lock()
                .expect("pending lock poisoned")
                .insert(id.to_owned(), tx);
            Some(rx)
        } else {
            None
        };

        if let Err(err) = self.initiator.send(msg) {
            self.inner
                .pending
                .lock()
                .expect("pending lock poisoned")
                .remove(id);
            return Err(err);
        }
        Ok(waiter)
    }

    /// Sends `msg` and blocks until the response correlated under `id`
    /// arrives.
    ///
    /// # Errors
    /// This function returns the send error, [`Error::Timeout`] when no
    /// response arrives, or [`Error::SessionReject`] when the session
    /// rejects the request or the response carries a `Text (58)` field.
    pub fn call(&self, id: &str, msg: Message) -> Result<Message> {
        self.call_with_timeout(id, msg, CALL_TIMEOUT)
    }

    /// Like [`Self::call`] with an explicit deadline.
    ///
    /// # Errors
    /// See [`Self::call`].
    pub fn call_with_timeout(&self, id: &str, msg: Message, timeout: Duration) -> Result<Message> {
        let waiter = self
            .send(id, msg, true)?
            .expect("send(wait) always registers a waiter");
        match waiter.recv_timeout(timeout) {
            Ok(response) => {
                if response.msg_type() == Some("3") {
                    return Err(Error::SessionReject(
                        response
                            .body
                            .get(tag::TEXT)
                            .unwrap_or("session-level reject")
                            .to_owned(),
                    ));
                }
                if let Some(text) = response.body.get(tag::TEXT) {
                    return Err(Error::SessionReject(text.to_owned()));
                }
                Ok(response)
            }
            Err(RecvTimeoutError::Timeout) => {
                self.inner
                    .pending
                    .lock()
                    .expect("pending lock poisoned")
                    .remove(id);
                Err(Error::Timeout)
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::ConnectionReset),
        }
    }

    /// Issues a `MarketDataRequest (V)` for `instruments`, subscribing when
    /// `subscribe` is set and unsubscribing otherwise. Returns the request
    /// id.
    ///
    /// # Errors
    /// See [`Self::send`].
    pub fn market_data_request(&self, instruments: &[String], subscribe: bool) -> Result<String> {
        let id = new_request_id()?;
        let mut msg = Message::with_msg_type("V");
        msg.body.set(tag::MD_REQ_ID, &id);
        msg.body
            .set(tag::SUBSCRIPTION_REQUEST_TYPE, if subscribe { 1 } else { 2 });
        msg.body.set(tag::MARKET_DEPTH, 0);
        msg.body.set(tag::NO_MD_ENTRY_TYPES, 2);
        msg.body.push(tag::MD_ENTRY_TYPE, 0);
        msg.body.push(tag::MD_ENTRY_TYPE, 1);
        msg.body.set(tag::NO_RELATED_SYM, instruments.len());
        for instrument in instruments {
            msg.body.push(tag::SYMBOL, instrument);
        }
        self.send(&id, msg, false)?;
        Ok(id)
    }

    /// Subscribes the order books of `instruments`; refreshes arrive on
    /// `book.<instrument>` channels.
    ///
    /// # Errors
    /// See [`Self::send`].
    pub fn subscribe_order_books(&self, instruments: &[String]) -> Result<String> {
        self.market_data_request(instruments, true)
    }

    /// Unsubscribes the order books of `instruments`.
    ///
    /// # Errors
    /// See [`Self::send`].
    pub fn unsubscribe_order_books(&self, instruments: &[String]) -> Result<String> {
        self.market_data_request(instruments, false)
    }

    /// Places an order and decodes the resulting execution report.
    ///
    /// # Errors
    /// See [`Self::call`].
    pub fn create_order(
        &self,
        instrument: &str,
        direction: &str,
        amount: f64,
        price: f64,
        order_type: &str,
    ) -> Result<Order> {
        let id = new_request_id()?;
        let mut msg = Message::with_msg_type("D");
        msg.body.set(tag::CL_ORD_ID, &id);
        msg.body.set(tag::SYMBOL, instrument);
        msg.body
            .set(tag::SIDE, if direction == "sell" { 2 } else { 1 });
        msg.body.set(tag::ORDER_QTY, amount);
        msg.body.set(tag::PRICE, price);
        msg.body.set(
            tag::ORD_TYPE,
            match order_type {
                "market" => "1",
                "stop_limit" => "4",
                "stop_market" => "stop_market",
                _ => "2",
            },
        );
        let response = self.call(&id, msg)?;
        Ok(order_from_execution_report(&response))
    }

    /// Cancels all resting orders and decodes the mass-cancel report.
    ///
    /// # Errors
    /// See [`Self::call`].
    pub fn order_mass_cancel(&self) -> Result<MassCancelReport> {
        let id = new_request_id()?;
        let mut msg = Message::with_msg_type("q");
        msg.body.set(tag::CL_ORD_ID, &id);
        msg.body.set(tag::MASS_CANCEL_REQUEST_TYPE, 7);
        let response = self.call(&id, msg)?;
        Ok(MassCancelReport {
            order_id: response.body.get(tag::ORDER_ID).unwrap_or_default().to_owned(),
            mass_cancel_request_type: response
                .body
                .get(tag::MASS_CANCEL_REQUEST_TYPE)
                .unwrap_or_default()
                .to_owned(),
            mass_cancel_response: response
                .body
                .get(tag::MASS_CANCEL_RESPONSE)
                .unwrap_or_default()
                .to_owned(),
            total_affected_orders: response
                .body
                .get(tag::TOTAL_AFFECTED_ORDERS)
                .and_then(|v| v.parse().ok())
                .unwrap_or(0),
        })
    }

    /// Requests the security list and maps it to instrument summaries.
    ///
    /// # Errors
    /// See [`Self::call`].
    pub fn security_list(&self) -> Result<Vec<Instrument>> {
        let id = new_request_id()?;
        let mut msg = Message::with_msg_type("x");
        msg.body.set(tag::SECURITY_REQ_ID, &id);
        msg.body.set(tag::SECURITY_LIST_REQUEST_TYPE, 4);
        let response = self.call(&id, msg)?;
        Ok(response
            .groups(tag::SYMBOL, &[tag::SYMBOL])
            .into_iter()
            .filter_map(|group| group.get(tag::SYMBOL).map(str::to_owned))
            .map(|instrument_name| Instrument {
                instrument_name,
                ..Default::default()
            })
            .collect())
    }
}

impl Inner {
    /// Completes the waiter registered under the message's request id, if
    /// any.
    fn correlate(&self, msg: &Message) -> bool {
        let Some(msg_type) = msg.msg_type() else {
            return false;
        };
        let mut keys: Vec<u32> = req_id_tag(msg_type).into_iter().collect();
        if msg_type == "8" {
            // execution reports for fresh orders carry no OrigClOrdID
            keys.push(tag::CL_ORD_ID);
        }
        for key in keys {
            if let Some(id) = msg.body.get(key) {
                if let Some(waiter) = self
                    .pending
                    .lock()
                    .expect("pending lock poisoned")
                    .remove(id)
                {
                    let _ = waiter.try_send(msg.clone());
                    return true;
                }
            }
        }
        false
    }

    fn handle_subscriptions(&self, msg: &Message) {
        match msg.msg_type() {
            Some("W") => self.market_data_refresh(msg, true),
            Some("X") => self.market_data_refresh(msg, false),
            Some("8") => self.execution_report(msg),
            _ => {}
        }
    }

    fn market_data_refresh(&self, msg: &Message, snapshot: bool) {
        let Some(symbol) = msg.body.get(tag::SYMBOL) else {
            return;
        };
        let entries = msg.groups(
            tag::MD_ENTRY_TYPE,
            &[
                tag::MD_ENTRY_TYPE,
                tag::MD_ENTRY_PX,
                tag::MD_ENTRY_SIZE,
                tag::MD_ENTRY_DATE,
                tag::MD_ENTRY_TIME,
                tag::MD_UPDATE_ACTION,
            ],
        );
        if entries.is_empty() {
            return;
        }

        let mut notification = OrderBookRawNotification {
            instrument_name: symbol.to_owned(),
            ..Default::default()
        };
        for entry in &entries {
            let action = if snapshot {
                "new"
            } else {
                match entry.get(tag::MD_UPDATE_ACTION) {
                    Some("1") => "change",
                    Some("2") => "delete",
                    _ => "new",
                }
            };
            let item = OrderBookNotificationItem {
                action: action.to_owned(),
                price: entry.get_f64(tag::MD_ENTRY_PX),
                amount: entry.get_f64(tag::MD_ENTRY_SIZE),
            };
            match entry.get(tag::MD_ENTRY_TYPE) {
                Some("0") => notification.bids.push(item),
                Some("1") => notification.asks.push(item),
                _ => continue,
            }
            if let Some(date) = entry.get(tag::MD_ENTRY_DATE) {
                match parse_fix_timestamp(date, entry.get(tag::MD_ENTRY_TIME)) {
                    Ok(timestamp) => notification.timestamp = timestamp,
                    Err(err) => debug!(%err, "unparseable MDEntry timestamp"),
                }
            }
        }
        if notification.bids.is_empty() && notification.asks.is_empty() {
            return;
        }
        self.emitter.emit(&format!("book.{symbol}"), &notification);
    }

    fn execution_report(&self, msg: &Message) {
        let Some(symbol) = msg.body.get(tag::SYMBOL) else {
            return;
        };
        let order = order_from_execution_report(msg);
        self.emitter
            .emit(&format!("user.orders.{symbol}.raw"), &order);

        let last_qty = msg.body.get_f64(tag::LAST_QTY);
        if last_qty > 0.0 {
            let trade = UserTrade {
                trade_id: msg.body.get(tag::EXEC_ID).unwrap_or_default().to_owned(),
                price: msg.body.get_f64(tag::LAST_PX),
                amount: last_qty,
                state: order.order_state.clone(),
                order_type: order.order_type.clone(),
                order_id: order.order_id.clone(),
                instrument_name: symbol.to_owned(),
                direction: order.direction.clone(),
                ..Default::default()
            };
            self.emitter
                .emit(&format!("user.trades.{symbol}.raw"), &trade);
        }
    }
}

fn order_from_execution_report(msg: &Message) -> Order {
    Order {
        order_id: msg.body.get(tag::ORDER_ID).unwrap_or_default().to_owned(),
        order_state: decode_order_status(msg.body.get(tag::ORD_STATUS).unwrap_or_default())
            .to_owned(),
        order_type: decode_order_type(msg.body.get(tag::ORD_TYPE).unwrap_or_default()).to_owned(),
        time_in_force: decode_time_in_force(msg.body.get(tag::TIME_IN_FORCE).unwrap_or_default())
            .to_owned(),
        direction: decode_order_side(msg.body.get(tag::SIDE).unwrap_or_default()).to_owned(),
        instrument_name: msg.body.get(tag::SYMBOL).unwrap_or_default().to_owned(),
        price: msg.body.get_f64(tag::PRICE),
        amount: msg.body.get_f64(tag::ORDER_QTY),
        filled_amount: msg.body.get_f64(tag::CUM_QTY),
        average_price: msg.body.get_f64(tag::AVG_PX),
        ..Default::default()
    }
}

impl Application for Inner {
    fn on_logon(&self, session_id: &SessionId) {
        debug!(session = %session_id, "session logged on");
        self.logged_on.store(true, Ordering::SeqCst);
    }

    fn on_logout(&self, session_id: &SessionId) {
        debug!(session = %session_id, "session logged out");
        self.logged_on.store(false, Ordering::SeqCst);
    }

    fn to_admin(&self, msg: &mut Message, _session_id: &SessionId) {
        if msg.msg_type() == Some("A") && !self.api_key.is_empty() {
            msg.body.set(tag::USERNAME, &self.api_key);
            msg.body.set(tag::PASSWORD, &self.secret_key);
        }
    }

    fn from_admin(&self, msg: &Message, session_id: &SessionId) -> Result<()> {
        if msg.msg_type() == Some("3") {
            warn!(
                session = %session_id,
                text = msg.body.get(tag::TEXT).unwrap_or_default(),
                "session-level reject"
            );
        }
        Ok(())
    }

    fn from_app(&self, msg: &Message, _session_id: &SessionId) -> Result<()> {
        self.correlate(msg);
        self.handle_subscriptions(msg);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::super::is_admin_msg_type;
    use super::*;

    struct MockInitiator {
        app: Arc<dyn Application>,
        session_id: SessionId,
        sent: StdMutex<Vec<Message>>,
    }

    impl MockInitiator {
        fn receive(&self, msg: Message) {
            let msg_type = msg.msg_type().unwrap_or_default();
            if is_admin_msg_type(msg_type) {
                let _ = self.app.from_admin(&msg, &self.session_id);
            } else {
                let _ = self.app.from_app(&msg, &self.session_id);
            }
        }
    }

    impl Initiator for MockInitiator {
        fn start(&self) -> Result<()> {
            self.app.on_logon(&self.session_id);
            Ok(())
        }

        fn stop(&self) {
            self.app.on_logout(&self.session_id);
        }

        fn send(&self, msg: Message) -> Result<()> {
            self.sent.lock().unwrap().push(msg);
            Ok(())
        }
    }

    const VALID_CONFIG: &str = "[DEFAULT]\nSocketConnectHost=test.deribit.com\nSocketConnectPort=9881\nHeartBtInt=30\nSenderCompID=FIX_TEST\nTargetCompID=DERIBITSERVER\nResetOnLogon=Y\n\n[SESSION]\nBeginString=FIX.4.4\n";

    fn new_client() -> (Client, Arc<MockInitiator>) {
        let settings = Settings::parse(VALID_CONFIG).unwrap();
        let holder: Arc<StdMutex<Option<Arc<MockInitiator>>>> = Arc::new(StdMutex::new(None));
        let captured = Arc::clone(&holder);
        let client = Client::new(
            Arc::new(Emitter::new()),
            "api_key",
            "secret_key",
            &settings,
            move |app, settings| {
                let initiator = Arc::new(MockInitiator {
                    app,
                    session_id: SessionId {
                        begin_string: settings.get_required(setting::BEGIN_STRING)?.to_owned(),
                        sender_comp_id: settings
                            .get_required(setting::SENDER_COMP_ID)?
                            .to_owned(),
                        target_comp_id: settings
                            .get_required(setting::TARGET_COMP_ID)?
                            .to_owned(),
                    },
                    sent: StdMutex::new(Vec::new()),
                });
                *captured.lock().unwrap() = Some(Arc::clone(&initiator));
                Ok(initiator as Arc<dyn Initiator>)
            },
        )
        .unwrap();
        let initiator = holder.lock().unwrap().clone().unwrap();
        (client, initiator)
    }

    #[test]
    fn test_new_requires_session_settings() {
        let incomplete_configs = [
            // missing SocketConnectHost
            ("[DEFAULT]\nSocketConnectPort=9881\nHeartBtInt=30\nSenderCompID=FIX_TEST\nTargetCompID=DERIBITSERVER\nResetOnLogon=Y\n\n[SESSION]\nBeginString=FIX.4.4\n", "SocketConnectHost"),
            // missing TargetCompID
            ("[DEFAULT]\nSocketConnectHost=test.deribit.com\nSocketConnectPort=9881\nHeartBtInt=30\nSenderCompID=FIX_TEST\nResetOnLogon=Y\n\n[SESSION]\nBeginString=FIX.4.4\n", "TargetCompID"),
            // missing SenderCompID
            ("[DEFAULT]\nSocketConnectHost=test.deribit.com\nSocketConnectPort=9881\nHeartBtInt=30\nTargetCompID=DERIBITSERVER\nResetOnLogon=Y\n\n[SESSION]\nBeginString=FIX.4.4\n", "SenderCompID"),
        ];
        for (config, missing) in incomplete_configs {
            let settings = Settings::parse(config).unwrap();
            let result = Client::new(
                Arc::new(Emitter::new()),
                "api_key",
                "secret_key",
                &settings,
                |_app, _settings| -> Result<Arc<dyn Initiator>> {
                    unreachable!("factory must not run for invalid settings")
                },
            );
            assert!(matches!(
                result,
                Err(Error::ConditionallyRequiredSettingMissing(key)) if key == missing
            ));
        }
    }

    #[test]
    fn test_start_stop_tracks_logon() {
        let (client, _initiator) = new_client();
        client.start().unwrap();
        assert!(client.is_logged_on());
        client.stop();
        assert!(!client.is_logged_on());
    }

    #[test]
    fn test_handle_market_data_snapshot_single_ask() {
        let (client, initiator) = new_client();
        let received = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        client.on::<OrderBookRawNotification, _>("book.BTC-26AUG22-32000-P", move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        let raw = "8=FIX.4.4\x019=293\x0135=W\x0149=DERIBITSERVER\x0156=OPTION_TRADING_BTC_TESTNET\x0134=2\x0152=20220815-10:39:22.035\x0155=BTC-26AUG22-32000-P\x01231=1.0000\x01311=BTC-26AUG22\x01810=24185.9900\x01100087=0.0000\x01100090=0.3238\x01746=0.0000\x01201=0\x01262=8cd489c3-1045-4e53-a9e5-7926ec3579c0\x01268=1\x01269=1\x01270=0.8735\x01271=6.0000\x01272=20220815-10:39:21.568\x0110=116\x01";
        initiator.receive(Message::parse(raw).unwrap());

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(
            received[0],
            OrderBookRawNotification {
                timestamp: 1660559961568,
                instrument_name: "BTC-26AUG22-32000-P".to_owned(),
                prev_change_id: 0,
                change_id: 0,
                bids: vec![],
                asks: vec![OrderBookNotificationItem {
                    action: "new".to_owned(),
                    price: 0.8735,
                    amount: 6.0,
                }],
            }
        );
    }

    #[test]
    fn test_handle_market_data_snapshot_both_sides() {
        let (client, initiator) = new_client();
        let received = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        client.on::<OrderBookRawNotification, _>("book.BTC-28OCT22-32000-P", move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        let raw = "8=FIX.4.4\x019=353\x0135=W\x0149=DERIBITSERVER\x0156=OPTION_TRADING_BTC_TESTNET\x0134=2\x0152=20220804-08:54:42.073\x0155=BTC-28OCT22-32000-P\x01231=1.0000\x01311=SYN.BTC-28OCT22\x01810=22943.2054\x01100087=0.0000\x01100090=0.4305\x01746=1.0000\x01201=0\x01262=7c268500-604f-45df-a4eb-7954d74e89ab\x01268=2\x01269=0\x01270=0.4005\x01271=12.0000\x01272=20220804-08:54:41.698\x01269=1\x01270=0.4545\x01271=12.0000\x01272=20220804-08:54:41.698\x0110=132\x01";
        initiator.receive(Message::parse(raw).unwrap());

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].timestamp, 1659603281698);
        assert_eq!(
            received[0].bids,
            vec![OrderBookNotificationItem {
                action: "new".to_owned(),
                price: 0.4005,
                amount: 12.0,
            }]
        );
        assert_eq!(
            received[0].asks,
            vec![OrderBookNotificationItem {
                action: "new".to_owned(),
                price: 0.4545,
                amount: 12.0,
            }]
        );
    }

    #[test]
    fn test_handle_market_data_without_entries_is_dropped() {
        let (client, initiator) = new_client();
        let received = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        client.on::<OrderBookRawNotification, _>("book.BTC-25AUG22-18000-C", move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        let raw = "8=FIX.4.4\x019=243\x0135=W\x0149=DERIBITSERVER\x0156=OPTION_TRADING_BTC_TESTNET\x0134=2\x0152=20220823-06:41:06.538\x0155=BTC-25AUG22-18000-C\x01231=1.0000\x01311=SYN.BTC-25AUG22\x01810=21026.6783\x01100087=0.0000\x01100090=0.1449\x01746=0.0000\x01201=1\x01262=24f68ad4-147c-4d11-bc30-9d14b35611f9\x01268=0\x0110=126\x01";
        initiator.receive(Message::parse(raw).unwrap());

        assert!(received.lock().unwrap().is_empty());
    }

    #[test]
    fn test_handle_incremental_refresh_actions() {
        let (client, initiator) = new_client();
        let received = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        client.on::<OrderBookRawNotification, _>("book.BTC-PERPETUAL", move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        let raw = "8=FIX.4.4\x019=120\x0135=X\x0155=BTC-PERPETUAL\x01268=2\x01269=0\x01279=1\x01270=19769.5\x01271=60030\x01269=1\x01279=2\x01270=19800\x01271=0\x0110=000\x01";
        initiator.receive(Message::parse(raw).unwrap());

        let received = received.lock().unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].bids[0].action, "change");
        assert_eq!(received[0].asks[0].action, "delete");
    }

    #[test]
    fn test_send_registers_waiter() {
        let (client, initiator) = new_client();

        let correct = Message::with_msg_type("7");
        let waiter = client.send("test_send_func0", correct, true).unwrap();
        assert!(waiter.is_some());
        assert!(client
            .inner
            .pending
            .lock()
            .unwrap()
            .contains_key("test_send_func0"));
        assert_eq!(initiator.sent.lock().unwrap().len(), 1);
        client.inner.pending.lock().unwrap().remove("test_send_func0");

        let wrong = Message::new();
        let err = client.send("test_send_func1", wrong, true).unwrap_err();
        assert!(matches!(
            err,
            Error::ConditionallyRequiredFieldMissing(35)
        ));
        assert!(client.inner.pending.lock().unwrap().is_empty());
    }

    #[test]
    fn test_call_completed_by_matching_response() {
        let (client, initiator) = new_client();

        // missing MsgType fails fast and leaves the pending map empty
        let err = client.call("test_call_func0", Message::new()).unwrap_err();
        assert!(matches!(
            err,
            Error::ConditionallyRequiredFieldMissing(35)
        ));
        assert!(client.inner.pending.lock().unwrap().is_empty());

        let request =
            Message::parse("8=FIX.4.4\x019=24\x0135=8\x0141=test_call_func1\x0110=130\x01").unwrap();
        let response = Message::parse(
            "8=FIX.4.4\x019=42\x0135=8\x0114=123.4560000000\x0141=test_call_func1\x0110=204\x01",
        )
        .unwrap();

        let responder = Arc::clone(&initiator);
        let injected = response.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            responder.receive(injected);
        });

        let received = client.call("test_call_func1", request).unwrap();
        handle.join().unwrap();
        assert!(client.inner.pending.lock().unwrap().is_empty());
        assert_eq!(received, response);
        assert_eq!(received.body.get(tag::CUM_QTY), Some("123.4560000000"));
    }

    #[test]
    fn test_call_response_with_text_is_rejected() {
        let (client, initiator) = new_client();
        let response = Message::parse(
            "8=FIX.4.4\x019=60\x0135=8\x0141=test_call_func2\x0158=order not found\x0110=000\x01",
        )
        .unwrap();

        let responder = Arc::clone(&initiator);
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            responder.receive(response);
        });

        let request =
            Message::parse("8=FIX.4.4\x019=24\x0135=8\x0141=test_call_func2\x0110=130\x01").unwrap();
        let err = client.call("test_call_func2", request).unwrap_err();
        handle.join().unwrap();
        assert!(matches!(err, Error::SessionReject(text) if text == "order not found"));
    }

    #[test]
    fn test_execution_report_emits_order_and_trade() {
        let (client, initiator) = new_client();
        let orders = Arc::new(StdMutex::new(Vec::new()));
        let trades = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&orders);
        client.on::<Order, _>("user.orders.BTC-PERPETUAL.raw", move |event| {
            sink.lock().unwrap().push(event.clone());
        });
        let sink = Arc::clone(&trades);
        client.on::<UserTrade, _>("user.trades.BTC-PERPETUAL.raw", move |event| {
            sink.lock().unwrap().push(event.clone());
        });

        let raw = "8=FIX.4.4\x019=160\x0135=8\x0137=14228823973\x0139=2\x0140=1\x0154=1\x0159=1\x0155=BTC-PERPETUAL\x0138=100\x0114=100\x016=21760.5\x0131=21760.5\x0132=100\x0117=119813642\x0110=000\x01";
        initiator.receive(Message::parse(raw).unwrap());

        let orders = orders.lock().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].order_id, "14228823973");
        assert_eq!(orders[0].order_state, "filled");
        assert_eq!(orders[0].order_type, "market");
        assert_eq!(orders[0].time_in_force, "good_til_cancelled");
        assert_eq!(orders[0].direction, "buy");
        assert_eq!(orders[0].filled_amount, 100.0);
        assert_eq!(orders[0].average_price, 21760.5);

        let trades = trades.lock().unwrap();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].trade_id, "119813642");
        assert_eq!(trades[0].price, 21760.5);
        assert_eq!(trades[0].amount, 100.0);
    }
}
