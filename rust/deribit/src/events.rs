//! Domain notification records delivered on the event bus.
//!
//! All three transports decode into these types: the multicast receiver from
//! SBE frames, the FIX client from market-data refreshes and execution
//! reports, and the WebSocket client from `subscription` notification
//! payloads.

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// An instrument definition, as returned by `public/get_instruments` and
/// updated by multicast instrument events.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Instrument {
    /// The numeric id, unique within a schema session.
    pub instrument_id: u32,
    /// The instrument name, e.g. `BTC-PERPETUAL`.
    pub instrument_name: String,
    /// `future`, `option`, `future_combo`, `option_combo` or `spot`.
    pub kind: String,
    /// Whether the instrument can currently accept orders.
    pub is_active: bool,
    /// `call`, `put`, or empty when not an option.
    pub option_type: String,
    /// Strike price when the instrument is an option.
    pub strike: f64,
    /// Base currency.
    pub base_currency: String,
    /// Quote currency.
    pub quote_currency: String,
    /// Counter currency.
    pub counter_currency: String,
    /// Settlement period name, e.g. `perpetual` or `month`.
    pub settlement_period: String,
    /// Creation time, milliseconds since the UNIX epoch.
    pub creation_timestamp: u64,
    /// Expiration time, milliseconds since the UNIX epoch.
    pub expiration_timestamp: u64,
    /// Price tick size.
    pub tick_size: f64,
    /// Contract size.
    pub contract_size: f64,
    /// Minimum order amount.
    pub min_trade_amount: f64,
    /// Maker commission rate.
    pub maker_commission: f64,
    /// Taker commission rate.
    pub taker_commission: f64,
    /// Block-trade commission rate.
    pub block_trade_commission: f64,
    /// Maximum allowed leverage.
    pub leverage: i32,
}

/// One changed price level of an order-book notification.
///
/// The WebSocket feed carries these as `[action, price, amount]` triples.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrderBookNotificationItem {
    /// `new`, `change` or `delete`.
    pub action: String,
    /// The level price.
    pub price: f64,
    /// The new amount resting at the level; zero when deleted.
    pub amount: f64,
}

impl<'de> Deserialize<'de> for OrderBookNotificationItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct ItemVisitor;

        impl<'de> Visitor<'de> for ItemVisitor {
            type Value = OrderBookNotificationItem;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("an [action, price, amount] triple")
            }

            fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
            where
                A: SeqAccess<'de>,
            {
                let action: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let price: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let amount: f64 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?;
                Ok(OrderBookNotificationItem {
                    action,
                    price,
                    amount,
                })
            }
        }

        deserializer.deserialize_seq(ItemVisitor)
    }
}

/// An order-book change notification carrying per-level actions.
///
/// Consecutive notifications for the same instrument chain through
/// `prev_change_id == previous.change_id`; a gap in the chain signals loss.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderBookRawNotification {
    /// Event time, milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// The instrument name.
    pub instrument_name: String,
    /// The change id of the previous notification for this instrument.
    pub prev_change_id: u64,
    /// The change id of this notification.
    pub change_id: u64,
    /// Changed bid levels, in exchange order.
    pub bids: Vec<OrderBookNotificationItem>,
    /// Changed ask levels, in exchange order.
    pub asks: Vec<OrderBookNotificationItem>,
}

/// A grouped order-book notification carrying plain `[price, amount]` levels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrderBookGroupNotification {
    /// Event time, milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// The instrument name.
    pub instrument_name: String,
    /// The change id of this notification.
    pub change_id: u64,
    /// Bid levels as `[price, amount]`.
    pub bids: Vec<[f64; 2]>,
    /// Ask levels as `[price, amount]`.
    pub asks: Vec<[f64; 2]>,
}

/// A single public trade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Trade {
    /// The venue-wide trade id.
    pub trade_id: String,
    /// The per-instrument trade sequence number.
    pub trade_seq: u64,
    /// Trade time, milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// The instrument name.
    pub instrument_name: String,
    /// The instrument kind; filled by the multicast receiver, absent on the
    /// WebSocket feed.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub instrument_kind: String,
    /// `buy` or `sell`.
    pub direction: String,
    /// The trade price.
    pub price: f64,
    /// The traded amount.
    pub amount: f64,
    /// The index price at trade time.
    pub index_price: f64,
    /// The mark price at trade time.
    pub mark_price: f64,
    /// Implied volatility at trade time, options only.
    pub iv: f64,
    /// Price movement relative to the previous trade (0..=3).
    pub tick_direction: u8,
    /// `none`, `maker`, `taker` or `both`.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub liquidation: String,
    /// The block-trade id, empty or `"0"` when not a block trade.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub block_trade_id: String,
}

/// An ordered batch of public trades.
pub type TradesNotification = Vec<Trade>;

/// Rolling 24-hour statistics inside a ticker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Stats {
    /// Volume in the counter currency.
    pub volume_usd: f64,
    /// Volume in contracts.
    pub volume: f64,
    /// Price change in percent.
    pub price_change: f64,
    /// 24-hour low.
    pub low: f64,
    /// 24-hour high.
    pub high: f64,
}

/// A snapshot of instrument state published on `ticker.*` channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerNotification {
    /// Event time, milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// The instrument name.
    pub instrument_name: String,
    /// `open` or `closed`.
    pub state: String,
    /// The last trade price.
    pub last_price: f64,
    /// The mark price.
    pub mark_price: f64,
    /// The index price.
    pub index_price: f64,
    /// Minimum sell price accepted by the price engine.
    pub min_price: f64,
    /// Maximum buy price accepted by the price engine.
    pub max_price: f64,
    /// Open interest.
    pub open_interest: f64,
    /// The settlement price.
    pub settlement_price: f64,
    /// The best bid price; `None` when the book side is empty.
    pub best_bid_price: Option<f64>,
    /// The amount resting at the best bid.
    pub best_bid_amount: f64,
    /// The best ask price; `None` when the book side is empty.
    pub best_ask_price: Option<f64>,
    /// The amount resting at the best ask.
    pub best_ask_amount: f64,
    /// The current funding rate; NaN when not a perpetual.
    pub current_funding: f64,
    /// The 8-hour funding rate; NaN when not a perpetual.
    pub funding_8h: f64,
    /// The estimated delivery price.
    pub estimated_delivery_price: f64,
    /// Rolling statistics.
    pub stats: Stats,
}

/// A best-bid/best-ask update published on `quote.*` channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuoteNotification {
    /// Event time, milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// The instrument name.
    pub instrument_name: String,
    /// The best bid price.
    pub best_bid_price: Option<f64>,
    /// The amount resting at the best bid.
    pub best_bid_amount: f64,
    /// The best ask price.
    pub best_ask_price: Option<f64>,
    /// The amount resting at the best ask.
    pub best_ask_amount: f64,
}

/// Perpetual interest update published on `perpetual.*` channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerpetualNotification {
    /// Event time, milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// The current interest.
    pub interest: f64,
    /// The index price.
    pub index_price: f64,
}

/// Index price update published on `deribit_price_index.*` channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeribitPriceIndexNotification {
    /// Event time, milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// The index price.
    pub price: f64,
    /// The index name, e.g. `btc_usd`.
    pub index_name: String,
}

/// The contribution of one constituent exchange to an index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriceRanking {
    /// The weight of the exchange in the index, in percent.
    pub weight: f64,
    /// Last update time, milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// The price used in the index.
    pub price: f64,
    /// The price as published by the exchange.
    pub original_price: f64,
    /// The exchange identifier.
    pub identifier: String,
    /// Whether the exchange currently contributes to the index.
    pub enabled: bool,
}

/// Ranking update published on `deribit_price_ranking.*` channels.
pub type DeribitPriceRankingNotification = Vec<PriceRanking>;

/// Estimated expiration price published on `estimated_expiration_price.*`
/// channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatedExpirationPriceNotification {
    /// Seconds until expiration.
    pub seconds: u64,
    /// The estimated price.
    pub price: f64,
    /// Whether the price is an estimate or already fixed.
    pub is_estimated: bool,
}

/// One option mark price inside a `markprice.options.*` notification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkpriceOption {
    /// Event time, milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// The mark price.
    pub mark_price: f64,
    /// Implied volatility backing the mark price.
    pub iv: f64,
    /// The instrument name.
    pub instrument_name: String,
}

/// Mark price batch published on `markprice.options.*` channels.
pub type MarkpriceOptionsNotification = Vec<MarkpriceOption>;

/// Instrument lifecycle update published on `instrument.state.*` channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentStateNotification {
    /// Event time, milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// The new state, e.g. `created` or `terminated`.
    pub state: String,
    /// The instrument name.
    pub instrument_name: String,
}

/// A platform announcement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnouncementsNotification {
    /// The announcement title.
    pub title: String,
    /// Publication time, milliseconds since the UNIX epoch.
    pub publication_timestamp: u64,
    /// Urgency marker.
    pub important: bool,
    /// The announcement id.
    pub id: u64,
    /// The announcement body.
    pub body: String,
}

/// An order, as carried by `user.orders.*` notifications and FIX execution
/// reports.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Order {
    /// The venue order id.
    pub order_id: String,
    /// `open`, `filled`, `cancelled` or `rejected`.
    pub order_state: String,
    /// `market`, `limit`, `stop_limit` or `stop_market`.
    pub order_type: String,
    /// `good_til_day`, `good_til_cancelled`, `immediate_or_cancel` or
    /// `fill_or_kill`.
    pub time_in_force: String,
    /// `buy` or `sell`.
    pub direction: String,
    /// The instrument name.
    pub instrument_name: String,
    /// The order price.
    pub price: f64,
    /// The order amount.
    pub amount: f64,
    /// The filled amount.
    pub filled_amount: f64,
    /// The average fill price.
    pub average_price: f64,
    /// Commission paid so far.
    pub commission: f64,
    /// The user-supplied label.
    pub label: String,
    /// Creation time, milliseconds since the UNIX epoch.
    pub creation_timestamp: u64,
    /// Last update time, milliseconds since the UNIX epoch.
    pub last_update_timestamp: u64,
    /// Whether the order may only rest.
    pub post_only: bool,
    /// Whether the order may only reduce a position.
    pub reduce_only: bool,
    /// Whether the order was placed through the API.
    pub api: bool,
}

/// A trade of the authenticated account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserTrade {
    /// The per-instrument trade sequence number.
    pub trade_seq: u64,
    /// The venue-wide trade id.
    pub trade_id: String,
    /// Trade time, milliseconds since the UNIX epoch.
    pub timestamp: u64,
    /// Price movement relative to the previous trade (0..=3).
    pub tick_direction: u8,
    /// The order state after this fill.
    pub state: String,
    /// The fill price.
    pub price: f64,
    /// The order type.
    pub order_type: String,
    /// The order id this fill belongs to.
    pub order_id: String,
    /// The mark price at trade time.
    pub mark_price: f64,
    /// `M` when the account made liquidity, `T` when it took.
    pub liquidity: String,
    /// The instrument name.
    pub instrument_name: String,
    /// The index price at trade time.
    pub index_price: f64,
    /// The currency the fee was charged in.
    pub fee_currency: String,
    /// The fee charged.
    pub fee: f64,
    /// `buy` or `sell`.
    pub direction: String,
    /// The filled amount.
    pub amount: f64,
}

/// A position of the authenticated account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Position {
    /// The instrument name.
    pub instrument_name: String,
    /// The instrument kind.
    pub kind: String,
    /// `buy` or `sell`.
    pub direction: String,
    /// The position size in contracts.
    pub size: f64,
    /// The position size in the size currency.
    pub size_currency: f64,
    /// The average entry price.
    pub average_price: f64,
    /// The mark price.
    pub mark_price: f64,
    /// The index price.
    pub index_price: f64,
    /// The settlement price.
    pub settlement_price: f64,
    /// Current leverage.
    pub leverage: f64,
    /// Position delta.
    pub delta: f64,
    /// Profit and loss over the lifetime of the position.
    pub total_profit_loss: f64,
}

/// Account summary published on `user.portfolio.*` channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioNotification {
    /// The account currency.
    pub currency: String,
    /// Account equity.
    pub equity: f64,
    /// Cash balance.
    pub balance: f64,
    /// Margin balance.
    pub margin_balance: f64,
    /// Funds available for trading.
    pub available_funds: f64,
    /// Funds available for withdrawal.
    pub available_withdrawal_funds: f64,
    /// Initial margin requirement.
    pub initial_margin: f64,
    /// Maintenance margin requirement.
    pub maintenance_margin: f64,
    /// Profit and loss across the account.
    pub total_pl: f64,
    /// Unrealized session profit and loss.
    pub session_upl: f64,
    /// Realized session profit and loss.
    pub session_rpl: f64,
}

/// Batched account changes published on `user.changes.*` channels.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserChangesNotification {
    /// The instrument name the changes apply to.
    pub instrument_name: String,
    /// New fills.
    pub trades: Vec<UserTrade>,
    /// Updated positions.
    pub positions: Vec<Position>,
    /// Updated orders.
    pub orders: Vec<Order>,
}

/// The outcome of an order-mass-cancel request, decoded from FIX
/// OrderMassCancelReport messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MassCancelReport {
    /// The id of the report.
    pub order_id: String,
    /// The scope that was requested.
    pub mass_cancel_request_type: String,
    /// The scope the venue applied, empty on rejection.
    pub mass_cancel_response: String,
    /// The number of orders affected.
    pub total_affected_orders: i64,
}
