//! Demultiplexing of `subscription` notifications into typed events.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::emitter::Emitter;
use crate::events::{
    AnnouncementsNotification, DeribitPriceIndexNotification, DeribitPriceRankingNotification,
    EstimatedExpirationPriceNotification, InstrumentStateNotification,
    MarkpriceOptionsNotification, Order, OrderBookGroupNotification, OrderBookRawNotification,
    PerpetualNotification, PortfolioNotification, QuoteNotification, TickerNotification,
    TradesNotification, UserChangesNotification, UserTrade,
};

fn emit_as<T>(emitter: &Emitter, channel: &str, data: &Value)
where
    T: DeserializeOwned + 'static,
{
    match serde_json::from_value::<T>(data.clone()) {
        Ok(event) => emitter.emit(channel, &event),
        Err(err) => debug!(channel, %err, "discarding undecodable subscription payload"),
    }
}

/// Parses `data` by channel prefix and emits the typed event on `channel`.
/// Unknown channels are silently ignored.
pub(crate) fn process_event(emitter: &Emitter, channel: &str, data: &Value) {
    if let Some(rest) = channel.strip_prefix("book.") {
        // `book.<instrument>.<group>.<depth>.<interval>` carries plain
        // levels; the raw and interval forms carry action triples
        if rest.split('.').count() >= 4 {
            emit_as::<OrderBookGroupNotification>(emitter, channel, data);
        } else {
            emit_as::<OrderBookRawNotification>(emitter, channel, data);
        }
    } else if channel.starts_with("trades.") {
        emit_as::<TradesNotification>(emitter, channel, data);
    } else if channel.starts_with("ticker.") {
        emit_as::<TickerNotification>(emitter, channel, data);
    } else if channel.starts_with("quote.") {
        emit_as::<QuoteNotification>(emitter, channel, data);
    } else if channel.starts_with("perpetual.") {
        emit_as::<PerpetualNotification>(emitter, channel, data);
    } else if channel.starts_with("deribit_price_index.") {
        emit_as::<DeribitPriceIndexNotification>(emitter, channel, data);
    } else if channel.starts_with("deribit_price_ranking.") {
        emit_as::<DeribitPriceRankingNotification>(emitter, channel, data);
    } else if channel.starts_with("estimated_expiration_price.") {
        emit_as::<EstimatedExpirationPriceNotification>(emitter, channel, data);
    } else if channel.starts_with("markprice.options.") {
        emit_as::<MarkpriceOptionsNotification>(emitter, channel, data);
    } else if channel.starts_with("instrument.state.") {
        emit_as::<InstrumentStateNotification>(emitter, channel, data);
    } else if channel.starts_with("user.orders.") {
        // the raw form pushes single orders, interval forms push batches
        if data.is_array() {
            emit_as::<Vec<Order>>(emitter, channel, data);
        } else {
            emit_as::<Order>(emitter, channel, data);
        }
    } else if channel.starts_with("user.trades.") {
        emit_as::<Vec<UserTrade>>(emitter, channel, data);
    } else if channel.starts_with("user.portfolio.") {
        emit_as::<PortfolioNotification>(emitter, channel, data);
    } else if channel.starts_with("user.changes.") {
        emit_as::<UserChangesNotification>(emitter, channel, data);
    } else if channel == "announcements" || channel.starts_with("announcements.") {
        emit_as::<AnnouncementsNotification>(emitter, channel, data);
    } else {
        debug!(channel, "ignoring unknown channel");
    }
}
