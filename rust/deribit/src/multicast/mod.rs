//! UDP multicast receiver for the venue's SBE event feed.
//!
//! One receive thread per joined group reads datagrams, reorders them by the
//! per-channel sequence number carried in the datagram prelude, reconciles
//! snapshot and incremental streams, and publishes typed notifications on
//! the event bus under the channel names below.

mod client;
mod queue;

pub use client::{Client, Config};
pub use queue::MAX_QUEUE_LENGTH;

/// The wildcard instrument kind.
pub const KIND_ANY: &str = "any";

pub(crate) fn instrument_channel(kind: &str, currency: &str) -> String {
    format!("instrument.{kind}.{currency}")
}

pub(crate) fn order_book_channel(instrument: &str) -> String {
    format!("book.{instrument}")
}

pub(crate) fn trades_channel(kind: &str, currency: &str) -> String {
    format!("trades.{kind}.{currency}")
}

pub(crate) fn ticker_channel(instrument: &str) -> String {
    format!("ticker.{instrument}")
}

pub(crate) fn snapshot_channel(instrument: &str) -> String {
    format!("snapshot.{instrument}")
}

/// The currency prefix of an instrument name, e.g. `BTC` of `BTC-PERPETUAL`.
pub(crate) fn currency_of_instrument(instrument: &str) -> &str {
    instrument.split('-').next().unwrap_or(instrument)
}
