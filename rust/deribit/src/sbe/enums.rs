//! Enumerations of the multicast events schema.
//!
//! Every enum is `u8` on the wire. Decoding an out-of-set discriminant fails
//! with a range-check error; set membership is established at compile time
//! through [`TryFromPrimitive`] rather than a runtime table walk.

use std::io;

use num_enum::{IntoPrimitive, TryFromPrimitive};

use crate::{Error, Result};

use super::decode::read_u8;

macro_rules! impl_decode {
    ($name:ident) => {
        impl $name {
            /// Decodes the enum from its wire discriminant.
            ///
            /// # Errors
            /// This function returns [`Error::RangeCheck`] on a discriminant
            /// outside the value set.
            pub fn decode(reader: &mut impl io::Read) -> Result<Self> {
                let raw = read_u8(reader, stringify!($name))?;
                Self::try_from(raw)
                    .map_err(|_| Error::unknown_enum_value(stringify!($name), raw))
            }
        }
    };
}

/// The lifecycle state of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum InstrumentState {
    /// Announced but not yet tradeable.
    Created = 0,
    /// Open for trading.
    Open = 1,
    /// Closed for trading.
    Closed = 2,
    /// Expired and settled.
    Settled = 3,
    /// Null value.
    NullValue = 0xFF,
}
impl_decode!(InstrumentState);

impl InstrumentState {
    /// Whether the instrument can currently accept orders.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Created | Self::Open)
    }

    /// The string the venue uses for this state.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Open => "open",
            Self::Closed => "closed",
            Self::Settled => "settled",
            Self::NullValue => "",
        }
    }
}

/// The class of an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum InstrumentKind {
    /// A future.
    Future = 0,
    /// An option.
    Option = 1,
    /// A combination of futures.
    FutureCombo = 2,
    /// A combination of options.
    OptionCombo = 3,
    /// A spot pair.
    Spot = 4,
    /// Null value.
    NullValue = 0xFF,
}
impl_decode!(InstrumentKind);

impl InstrumentKind {
    /// The string the venue uses for this kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Future => "future",
            Self::Option => "option",
            Self::FutureCombo => "future_combo",
            Self::OptionCombo => "option_combo",
            Self::Spot => "spot",
            Self::NullValue => "",
        }
    }
}

/// The margining style of a future.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum FutureType {
    /// Not a future.
    NotApplicable = 0,
    /// Inverse contract margined in the base currency.
    Reversed = 1,
    /// Linear contract margined in the quote currency.
    Linear = 2,
    /// Null value.
    NullValue = 0xFF,
}
impl_decode!(FutureType);

impl FutureType {
    /// The string the venue uses for this future type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotApplicable | Self::NullValue => "",
            Self::Reversed => "reversed",
            Self::Linear => "linear",
        }
    }
}

/// Whether an option is a call or a put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum OptionType {
    /// Not an option.
    NotApplicable = 0,
    /// A call option.
    Call = 1,
    /// A put option.
    Put = 2,
    /// Null value.
    NullValue = 0xFF,
}
impl_decode!(OptionType);

impl OptionType {
    /// The string the venue uses for this option type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::NotApplicable | Self::NullValue => "",
            Self::Call => "call",
            Self::Put => "put",
        }
    }
}

/// A yes/no flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum YesNo {
    /// No.
    No = 0,
    /// Yes.
    Yes = 1,
    /// Null value.
    NullValue = 0xFF,
}
impl_decode!(YesNo);

/// A settlement period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Period {
    /// No expiry.
    Perpetual = 0,
    /// Settles every minute.
    Minute = 1,
    /// Settles every hour.
    Hour = 2,
    /// Settles every day.
    Day = 3,
    /// Settles every week.
    Week = 4,
    /// Settles every month.
    Month = 5,
    /// Settles every year.
    Year = 6,
    /// Null value.
    NullValue = 0xFF,
}
impl_decode!(Period);

impl Period {
    /// The string the venue uses for this period.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Perpetual => "perpetual",
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
            Self::NullValue => "",
        }
    }
}

/// The taker side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Direction {
    /// The taker bought.
    Buy = 0,
    /// The taker sold.
    Sell = 1,
    /// Null value.
    NullValue = 0xFF,
}
impl_decode!(Direction);

impl Direction {
    /// The string the venue uses for this direction.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "buy",
            Self::Sell => "sell",
            Self::NullValue => "",
        }
    }
}

/// The price movement of a trade relative to the previous trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum TickDirection {
    /// Higher than the previous trade.
    Plus = 0,
    /// Unchanged, previous move was up.
    ZeroPlus = 1,
    /// Lower than the previous trade.
    Minus = 2,
    /// Unchanged, previous move was down.
    ZeroMinus = 3,
    /// Null value.
    NullValue = 0xFF,
}
impl_decode!(TickDirection);

/// Which party of a trade was being liquidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum Liquidation {
    /// Regular trade.
    None = 0,
    /// The maker was being liquidated.
    Maker = 1,
    /// The taker was being liquidated.
    Taker = 2,
    /// Both parties were being liquidated.
    Both = 3,
    /// Null value.
    NullValue = 0xFF,
}
impl_decode!(Liquidation);

impl Liquidation {
    /// The string the venue uses for this liquidation marker.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Maker => "maker",
            Self::Taker => "taker",
            Self::Both => "both",
            Self::NullValue => "",
        }
    }
}

/// A side of the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum BookSide {
    /// The ask side.
    Ask = 0,
    /// The bid side.
    Bid = 1,
    /// Null value.
    NullValue = 0xFF,
}
impl_decode!(BookSide);

/// What happened to a price level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum BookChange {
    /// The level was created.
    Created = 0,
    /// The level's amount changed.
    Changed = 1,
    /// The level was removed.
    Deleted = 2,
    /// Null value.
    NullValue = 0xFF,
}
impl_decode!(BookChange);

impl BookChange {
    /// The string the venue uses for this change, matching the WebSocket feed.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "new",
            Self::Changed => "change",
            Self::Deleted => "delete",
            Self::NullValue => "",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_rejects_unknown_discriminant() {
        let mut reader: &[u8] = &[7];
        let err = Period::decode(&mut reader).unwrap_err();
        assert!(matches!(err, Error::RangeCheck(_)));
        assert!(err.to_string().contains("unknown enumeration value 7"));
    }

    #[test]
    fn test_decode_accepts_null_value() {
        let mut reader: &[u8] = &[0xFF];
        assert_eq!(Period::decode(&mut reader).unwrap(), Period::NullValue);
        assert_eq!(Period::NullValue.as_str(), "");
    }

    #[test]
    fn test_period_strings() {
        assert_eq!(Period::Perpetual.as_str(), "perpetual");
        assert_eq!(Period::Month.as_str(), "month");
    }

    #[test]
    fn test_instrument_state_activity() {
        assert!(InstrumentState::Open.is_active());
        assert!(InstrumentState::Created.is_active());
        assert!(!InstrumentState::Closed.is_active());
        assert!(!InstrumentState::Settled.is_active());
    }

    #[test]
    fn test_book_change_strings_match_websocket_feed() {
        assert_eq!(BookChange::Created.as_str(), "new");
        assert_eq!(BookChange::Changed.as_str(), "change");
        assert_eq!(BookChange::Deleted.as_str(), "delete");
    }
}
