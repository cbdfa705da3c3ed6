//! Decoding Deribit multicast events in Simple Binary Encoding (SBE).
//!
//! Every message is framed as a 12-byte [`MessageHeader`] followed by a
//! fixed-layout little-endian root block, repeating groups, and u8
//! length-prefixed var-data fields. Decoders read lock-step off any
//! [`std::io::Read`], skip unknown tail bytes for forward compatibility,
//! and support a [range check](MessageHeader::range_check) pass separate
//! from the decode itself.

pub(crate) mod decode;
mod enums;
mod header;
mod records;

pub use decode::{GroupSize, GROUP_SIZE_ENCODED_LENGTH};
pub use enums::{
    BookChange, BookSide, Direction, FutureType, InstrumentKind, InstrumentState, Liquidation,
    OptionType, Period, TickDirection, YesNo,
};
pub use header::MessageHeader;
pub use records::{
    BookChangeEntry, BookLevel, InstrumentMsg, OrderBookMsg, SnapshotMsg, TickerMsg, TradeEntry,
    TradesMsg,
};

/// The id of the multicast events schema.
pub const SCHEMA_ID: u16 = 1;
/// The version of the multicast events schema this codec was generated from.
pub const SCHEMA_VERSION: u16 = 1;

/// Template id of an [`InstrumentMsg`].
pub const TEMPLATE_INSTRUMENT: u16 = 1000;
/// Template id of an [`OrderBookMsg`].
pub const TEMPLATE_ORDER_BOOK: u16 = 1001;
/// Template id of a [`TradesMsg`].
pub const TEMPLATE_TRADES: u16 = 1002;
/// Template id of a [`TickerMsg`].
pub const TEMPLATE_TICKER: u16 = 1003;
/// Template id of a [`SnapshotMsg`], one page of a paginated book snapshot.
pub const TEMPLATE_SNAPSHOT: u16 = 1004;

/// The sentinel bit pattern marking an absent optional price.
pub const NULL_F64_BITS: u64 = u64::MAX;
