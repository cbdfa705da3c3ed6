use std::collections::HashMap;
use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, InstrumentsGetter};
use crate::emitter::{Emitter, ListenerId};
use crate::events::{
    Instrument, OrderBookNotificationItem, OrderBookRawNotification, TickerNotification, Trade,
    TradesNotification,
};
use crate::sbe::{
    decode, BookSide, InstrumentMsg, MessageHeader, OrderBookMsg, SnapshotMsg, TickerMsg,
    TradesMsg, TEMPLATE_INSTRUMENT, TEMPLATE_ORDER_BOOK, TEMPLATE_SNAPSHOT, TEMPLATE_TICKER,
    TEMPLATE_TRADES,
};
use crate::{Error, Result};

use super::queue::{EventQueue, MAX_QUEUE_LENGTH};
use super::{
    currency_of_instrument, instrument_channel, order_book_channel, snapshot_channel,
    ticker_channel, trades_channel, KIND_ANY,
};

/// The length of the datagram prelude: `channel_id u16 LE` + `seq u32 LE`.
const PRELUDE_LENGTH: usize = 6;
/// How long a blocked `recv_from` waits before re-checking the stop flag.
const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Configuration of the multicast receiver.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// IPv4 address of the interface to join groups on; empty joins on all
    /// interfaces.
    pub ifaddr: String,
    /// Multicast groups as `ip:port` strings.
    pub addrs: Vec<String>,
    /// Currencies to load instruments for at startup, e.g. `["BTC", "ETH"]`
    /// or `["any"]`.
    pub currencies: Vec<String>,
}

enum Phase {
    /// Startup or detected loss: incremental messages are dropped (order-book
    /// increments buffered per pending instrument) until a snapshot run
    /// terminates with `is_last`.
    WaitingSnapshot,
    /// In sync; `last_seq` is the last datagram sequence published.
    Live { last_seq: u32 },
}

struct PendingSnapshot {
    timestamp_ms: u64,
    change_id: u64,
    bids: Vec<(f64, f64)>,
    asks: Vec<(f64, f64)>,
    deferred: Vec<OrderBookMsg>,
}

struct ChannelState {
    phase: Phase,
    queue: EventQueue<Vec<u8>>,
    pending: HashMap<u32, PendingSnapshot>,
}

impl ChannelState {
    fn new() -> Self {
        Self {
            phase: Phase::WaitingSnapshot,
            queue: EventQueue::new(),
            pending: HashMap::new(),
        }
    }

    fn flush(&mut self) {
        self.phase = Phase::WaitingSnapshot;
        self.queue.reset(0);
        self.pending.clear();
    }
}

struct Inner {
    emitter: Arc<Emitter>,
    catalog: Arc<Catalog>,
    instruments_getter: Arc<dyn InstrumentsGetter>,
    support_currencies: Vec<String>,
    groups: Vec<SocketAddrV4>,
    ifaddr: Ipv4Addr,
    channels: Mutex<HashMap<u16, ChannelState>>,
    stop: AtomicBool,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

/// The multicast receiver. Joins the configured groups, runs one receive
/// loop per socket, and publishes decoded notifications on the event bus.
pub struct Client {
    inner: Arc<Inner>,
}

impl Client {
    /// Creates a receiver for the groups in `config`, publishing on
    /// `emitter` and resolving instrument ids through `catalog` after
    /// loading it from `instruments_getter`.
    ///
    /// # Errors
    /// This function returns [`Error::InvalidIpv4Address`] if the interface
    /// address or any group address fails to parse as IPv4.
    pub fn new(
        config: Config,
        instruments_getter: Arc<dyn InstrumentsGetter>,
        catalog: Arc<Catalog>,
        emitter: Arc<Emitter>,
    ) -> Result<Self> {
        let ifaddr = if config.ifaddr.is_empty() {
            Ipv4Addr::UNSPECIFIED
        } else {
            config
                .ifaddr
                .parse()
                .map_err(|_| Error::InvalidIpv4Address(config.ifaddr.clone()))?
        };
        let mut groups = Vec::with_capacity(config.addrs.len());
        for addr in &config.addrs {
            let group: SocketAddrV4 = addr
                .parse()
                .map_err(|_| Error::InvalidIpv4Address(addr.clone()))?;
            if !group.ip().is_multicast() {
                return Err(Error::InvalidIpv4Address(addr.clone()));
            }
            groups.push(group);
        }
        Ok(Self {
            inner: Arc::new(Inner {
                emitter,
                catalog,
                instruments_getter,
                support_currencies: config.currencies,
                groups,
                ifaddr,
                channels: Mutex::new(HashMap::new()),
                stop: AtomicBool::new(false),
                threads: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Loads the instrument catalog and spawns one receive loop per group.
    ///
    /// # Errors
    /// This function returns an error if the catalog load fails or a socket
    /// cannot be opened or joined.
    pub fn start(&self) -> Result<()> {
        let inner = &self.inner;
        inner
            .catalog
            .load(inner.instruments_getter.as_ref(), &inner.support_currencies)?;
        info!(instruments = inner.catalog.len(), "instrument mapping built");

        inner.stop.store(false, Ordering::SeqCst);
        let mut threads = inner.threads.lock().expect("threads lock poisoned");
        for group in &inner.groups {
            let socket = inner.open_socket(*group)?;
            let receiver = Arc::clone(inner);
            let group = *group;
            threads.push(std::thread::spawn(move || {
                receiver.receive_loop(socket, group);
            }));
        }
        Ok(())
    }

    /// Signals every receive loop to exit and joins the threads.
    pub fn stop(&self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        let mut threads = self.inner.threads.lock().expect("threads lock poisoned");
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
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

    #[cfg(test)]
    pub(crate) fn handle_datagram(&self, datagram: &[u8]) -> Result<()> {
        self.inner.handle_datagram(datagram)
    }
}

impl Inner {
    fn open_socket(&self, group: SocketAddrV4) -> Result<UdpSocket> {
        let ctx = |what: &str| format!("{what} for group {group}");
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| Error::io(e, ctx("opening socket")))?;
        socket
            .set_reuse_address(true)
            .map_err(|e| Error::io(e, ctx("setting SO_REUSEADDR")))?;
        socket
            .bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, group.port()).into())
            .map_err(|e| Error::io(e, ctx("binding")))?;
        socket
            .join_multicast_v4(group.ip(), &self.ifaddr)
            .map_err(|e| Error::io(e, ctx("joining group")))?;
        socket
            .set_read_timeout(Some(POLL_INTERVAL))
            .map_err(|e| Error::io(e, ctx("setting read timeout")))?;
        Ok(socket.into())
    }

    fn receive_loop(&self, socket: UdpSocket, group: SocketAddrV4) {
        let mut buf = vec![0u8; 64 * 1024];
        loop {
            if self.stop.load(Ordering::SeqCst) {
                debug!(%group, "receive loop stopping");
                return;
            }
            let len = match socket.recv_from(&mut buf) {
                Ok((len, _)) => len,
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) =>
                {
                    continue;
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::UnexpectedEof
                            | io::ErrorKind::ConnectionReset
                            | io::ErrorKind::BrokenPipe
                            | io::ErrorKind::NotConnected
                    ) =>
                {
                    debug!(%group, "socket closed, receive loop exiting");
                    return;
                }
                Err(err) => {
                    warn!(%group, %err, "recv_from failed");
                    continue;
                }
            };
            if let Err(err) = self.handle_datagram(&buf[..len]) {
                match err {
                    Error::DuplicatedPackage { channel_id, seq } => {
                        debug!(channel_id, seq, "duplicated package dropped");
                    }
                    Error::OutOfOrder {
                        channel_id,
                        expected,
                        got,
                    } => {
                        warn!(
                            channel_id,
                            expected, got, "package out of order, waiting for snapshot"
                        );
                    }
                    Error::UnsupportedTemplateId(template_id) => {
                        warn!(template_id, "unsupported template id");
                    }
                    err => warn!(%group, %err, "dropping datagram"),
                }
            }
        }
    }

    /// Applies one datagram to the per-channel state machine, publishing any
    /// events that became deliverable.
    ///
    /// # Errors
    /// This function returns [`Error::DuplicatedPackage`] for repeated
    /// sequence numbers, [`Error::OutOfOrder`] when the gap exceeds the
    /// reorder window (the channel is flushed back to waiting-snapshot), and
    /// decode errors for malformed payloads; the caller drops the datagram
    /// either way.
    pub(crate) fn handle_datagram(&self, datagram: &[u8]) -> Result<()> {
        if datagram.len() < PRELUDE_LENGTH {
            return Err(Error::ShortRead("datagram prelude"));
        }
        let channel_id = u16::from_le_bytes([datagram[0], datagram[1]]);
        let seq = u32::from_le_bytes([datagram[2], datagram[3], datagram[4], datagram[5]]);
        let payload = &datagram[PRELUDE_LENGTH..];

        let mut channels = self.channels.lock().expect("channels lock poisoned");
        let state = channels.entry(channel_id).or_insert_with(ChannelState::new);

        match state.phase {
            Phase::WaitingSnapshot => self.process_payload(state, payload),
            Phase::Live { last_seq } => {
                let ahead = seq.wrapping_sub(last_seq);
                if ahead == 0 || ahead > u32::MAX / 2 {
                    return Err(Error::DuplicatedPackage { channel_id, seq });
                }
                if ahead == 1 {
                    // the slot is consumed even when the payload turns out to
                    // be malformed; decode errors drop the datagram only
                    state.phase = Phase::Live { last_seq: seq };
                    state.queue.next();
                    let result = self.process_payload(state, payload);
                    self.drain_ring(state);
                    result
                } else if ahead as usize <= MAX_QUEUE_LENGTH {
                    state
                        .queue
                        .insert(payload.to_vec(), seq as usize % MAX_QUEUE_LENGTH)?;
                    Ok(())
                } else {
                    state.flush();
                    Err(Error::OutOfOrder {
                        channel_id,
                        expected: last_seq.wrapping_add(1),
                        got: seq,
                    })
                }
            }
        }
    }

    fn drain_ring(&self, state: &mut ChannelState) {
        while let Some(payload) = state.queue.take_front() {
            if let Phase::Live { last_seq } = state.phase {
                state.phase = Phase::Live {
                    last_seq: last_seq.wrapping_add(1),
                };
            }
            if let Err(err) = self.process_payload(state, &payload) {
                warn!(%err, "dropping parked datagram");
            }
            state.queue.next();
        }
    }

    fn process_payload(&self, state: &mut ChannelState, payload: &[u8]) -> Result<()> {
        let mut reader = payload;
        while !reader.is_empty() {
            let header = MessageHeader::decode(&mut reader)?;
            header.range_check()?;
            match header.template_id {
                TEMPLATE_INSTRUMENT => {
                    let msg = InstrumentMsg::decode(&mut reader, header.block_length)?;
                    msg.range_check()?;
                    self.publish_instrument(&msg);
                }
                TEMPLATE_ORDER_BOOK => {
                    let msg = OrderBookMsg::decode(&mut reader, header.block_length)?;
                    msg.range_check()?;
                    self.apply_book_increment(state, msg);
                }
                TEMPLATE_TRADES => {
                    let msg = TradesMsg::decode(&mut reader, header.block_length)?;
                    msg.range_check()?;
                    if matches!(state.phase, Phase::Live { .. }) {
                        self.publish_trades(&msg);
                    }
                }
                TEMPLATE_TICKER => {
                    let msg = TickerMsg::decode(&mut reader, header.block_length)?;
                    msg.range_check()?;
                    if matches!(state.phase, Phase::Live { .. }) {
                        self.publish_ticker(&msg);
                    }
                }
                TEMPLATE_SNAPSHOT => {
                    let msg = SnapshotMsg::decode(&mut reader, header.block_length)?;
                    msg.range_check()?;
                    self.apply_snapshot_page(state, msg);
                }
                template_id => {
                    warn!(template_id, "unsupported template id, skipping frame");
                    skip_message(&mut reader, &header)?;
                }
            }
        }
        Ok(())
    }

    fn apply_book_increment(&self, state: &mut ChannelState, msg: OrderBookMsg) {
        if let Some(pending) = state.pending.get_mut(&msg.instrument_id) {
            pending.deferred.push(msg);
            return;
        }
        match state.phase {
            Phase::Live { .. } => self.publish_book(&msg),
            Phase::WaitingSnapshot => {
                debug!(
                    instrument_id = msg.instrument_id,
                    "dropping increment while waiting for snapshot"
                );
            }
        }
    }

    fn apply_snapshot_page(&self, state: &mut ChannelState, msg: SnapshotMsg) {
        let Some(instrument) = self.catalog.resolve(msg.instrument_id) else {
            warn!(
                instrument_id = msg.instrument_id,
                "snapshot page for unknown instrument"
            );
            return;
        };

        // every page is observable on its own channel
        let page = page_notification(&msg, &instrument.instrument_name);
        self.emitter
            .emit(&snapshot_channel(&instrument.instrument_name), &page);

        let pending = state
            .pending
            .entry(msg.instrument_id)
            .or_insert_with(|| PendingSnapshot {
                timestamp_ms: msg.timestamp_ms,
                change_id: msg.change_id,
                bids: Vec::new(),
                asks: Vec::new(),
                deferred: Vec::new(),
            });
        pending.timestamp_ms = msg.timestamp_ms;
        pending.change_id = msg.change_id;
        for level in &msg.levels {
            let side = match level.side {
                BookSide::Bid => &mut pending.bids,
                _ => &mut pending.asks,
            };
            side.push((nan_to_zero(level.price), nan_to_zero(level.amount)));
        }

        if !msg.is_last {
            return;
        }
        let pending = state
            .pending
            .remove(&msg.instrument_id)
            .expect("pending entry was just inserted");

        // reconciled book, then the increments that accrued behind it
        let reconciled = OrderBookRawNotification {
            timestamp: pending.timestamp_ms,
            instrument_name: instrument.instrument_name.clone(),
            prev_change_id: 0,
            change_id: pending.change_id,
            bids: new_items(&pending.bids),
            asks: new_items(&pending.asks),
        };
        self.emitter.emit(
            &order_book_channel(&instrument.instrument_name),
            &reconciled,
        );
        for deferred in pending
            .deferred
            .iter()
            .filter(|m| m.change_id > pending.change_id)
        {
            self.publish_book(deferred);
        }

        if matches!(state.phase, Phase::WaitingSnapshot) {
            state.phase = Phase::Live {
                last_seq: msg.expected_seq.wrapping_sub(1),
            };
            state
                .queue
                .reset(msg.expected_seq as usize % MAX_QUEUE_LENGTH);
            info!(
                instrument = %instrument.instrument_name,
                expected_seq = msg.expected_seq,
                "snapshot complete, channel live"
            );
        }
    }

    fn publish_instrument(&self, msg: &InstrumentMsg) {
        let instrument = instrument_from_msg(msg);
        let currency = decode::fixed_str(&msg.base_currency);
        let kind = msg.kind.as_str();
        self.catalog.upsert(instrument.clone());
        self.emitter
            .emit(&instrument_channel(kind, &currency), &instrument);
        self.emitter
            .emit(&instrument_channel(KIND_ANY, &currency), &instrument);
    }

    fn publish_book(&self, msg: &OrderBookMsg) {
        let Some(instrument) = self.catalog.resolve(msg.instrument_id) else {
            warn!(
                instrument_id = msg.instrument_id,
                "book event for unknown instrument"
            );
            return;
        };
        let mut notification = OrderBookRawNotification {
            timestamp: msg.timestamp_ms,
            instrument_name: instrument.instrument_name.clone(),
            prev_change_id: msg.prev_change_id,
            change_id: msg.change_id,
            bids: Vec::new(),
            asks: Vec::new(),
        };
        for entry in &msg.changes {
            let item = OrderBookNotificationItem {
                action: entry.change.as_str().to_owned(),
                price: nan_to_zero(entry.price),
                amount: nan_to_zero(entry.amount),
            };
            match entry.side {
                BookSide::Bid => notification.bids.push(item),
                _ => notification.asks.push(item),
            }
        }
        self.emitter.emit(
            &order_book_channel(&instrument.instrument_name),
            &notification,
        );
    }

    fn publish_trades(&self, msg: &TradesMsg) {
        let Some(instrument) = self.catalog.resolve(msg.instrument_id) else {
            warn!(
                instrument_id = msg.instrument_id,
                "trades event for unknown instrument"
            );
            return;
        };
        let notification: TradesNotification = msg
            .trades
            .iter()
            .map(|trade| Trade {
                trade_id: trade.trade_id.to_string(),
                trade_seq: trade.trade_seq,
                timestamp: trade.timestamp_ms,
                instrument_name: instrument.instrument_name.clone(),
                instrument_kind: instrument.kind.clone(),
                direction: trade.direction.as_str().to_owned(),
                price: nan_to_zero(trade.price),
                amount: nan_to_zero(trade.amount),
                index_price: nan_to_zero(trade.index_price),
                mark_price: nan_to_zero(trade.mark_price),
                iv: nan_to_zero(trade.iv),
                tick_direction: u8::from(trade.tick_direction),
                liquidation: trade.liquidation.as_str().to_owned(),
                block_trade_id: trade.block_trade_id.to_string(),
            })
            .collect();
        let currency = currency_of_instrument(&instrument.instrument_name);
        self.emitter
            .emit(&trades_channel(&instrument.kind, currency), &notification);
        self.emitter
            .emit(&trades_channel(KIND_ANY, currency), &notification);
    }

    fn publish_ticker(&self, msg: &TickerMsg) {
        let Some(instrument) = self.catalog.resolve(msg.instrument_id) else {
            warn!(
                instrument_id = msg.instrument_id,
                "ticker event for unknown instrument"
            );
            return;
        };
        let notification = TickerNotification {
            timestamp: msg.timestamp_ms,
            instrument_name: instrument.instrument_name.clone(),
            state: msg.state.as_str().to_owned(),
            last_price: nan_to_zero(msg.last_price),
            mark_price: nan_to_zero(msg.mark_price),
            index_price: nan_to_zero(msg.index_price),
            min_price: nan_to_zero(msg.min_sell_price),
            max_price: nan_to_zero(msg.max_buy_price),
            open_interest: nan_to_zero(msg.open_interest),
            settlement_price: nan_to_zero(msg.settlement_price),
            best_bid_price: msg.best_bid(),
            best_bid_amount: nan_to_zero(msg.best_bid_amount),
            best_ask_price: msg.best_ask(),
            best_ask_amount: nan_to_zero(msg.best_ask_amount),
            // nullable: absent funding stays NaN for consumers to detect
            current_funding: msg.current_funding,
            funding_8h: msg.funding_8h,
            estimated_delivery_price: nan_to_zero(msg.estimated_delivery_price),
            stats: Default::default(),
        };
        self.emitter.emit(
            &ticker_channel(&instrument.instrument_name),
            &notification,
        );
    }
}

fn nan_to_zero(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value
    }
}

fn new_items(levels: &[(f64, f64)]) -> Vec<OrderBookNotificationItem> {
    levels
        .iter()
        .map(|&(price, amount)| OrderBookNotificationItem {
            action: "new".to_owned(),
            price,
            amount,
        })
        .collect()
}

fn page_notification(msg: &SnapshotMsg, instrument_name: &str) -> OrderBookRawNotification {
    let mut page = OrderBookRawNotification {
        timestamp: msg.timestamp_ms,
        instrument_name: instrument_name.to_owned(),
        prev_change_id: 0,
        change_id: msg.change_id,
        bids: Vec::new(),
        asks: Vec::new(),
    };
    for level in &msg.levels {
        let item = OrderBookNotificationItem {
            action: "new".to_owned(),
            price: nan_to_zero(level.price),
            amount: nan_to_zero(level.amount),
        };
        match level.side {
            BookSide::Bid => page.bids.push(item),
            _ => page.asks.push(item),
        }
    }
    page
}

/// Steps over a message with an unknown template using only the header and
/// group size encodings.
fn skip_message(reader: &mut impl io::Read, header: &MessageHeader) -> Result<()> {
    decode::skip(reader, u64::from(header.block_length), "unknown root block")?;
    for _ in 0..header.num_groups {
        let group = decode::GroupSize::decode(reader)?;
        decode::skip(
            reader,
            u64::from(group.block_length) * u64::from(group.num_in_group),
            "unknown group",
        )?;
    }
    for _ in 0..header.num_var_data_fields {
        decode::read_var_data(reader, "unknown var data")?;
    }
    Ok(())
}

fn instrument_from_msg(msg: &InstrumentMsg) -> Instrument {
    Instrument {
        instrument_id: msg.instrument_id,
        instrument_name: String::from_utf8_lossy(&msg.instrument_name).into_owned(),
        kind: msg.kind.as_str().to_owned(),
        is_active: msg.state.is_active(),
        option_type: msg.option_type.as_str().to_owned(),
        strike: msg.strike_price,
        base_currency: decode::fixed_str(&msg.base_currency),
        quote_currency: decode::fixed_str(&msg.quote_currency),
        counter_currency: decode::fixed_str(&msg.counter_currency),
        settlement_period: msg.settlement_period.as_str().to_owned(),
        creation_timestamp: msg.creation_timestamp_ms,
        expiration_timestamp: msg.expiration_timestamp_ms,
        tick_size: msg.tick_size,
        contract_size: msg.contract_size,
        min_trade_amount: msg.min_trade_amount,
        maker_commission: msg.maker_commission,
        taker_commission: msg.taker_commission,
        block_trade_commission: msg.block_trade_commission,
        leverage: msg.max_leverage as i32,
    }
}
