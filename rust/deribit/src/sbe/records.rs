//! Message bodies of the multicast events schema.
//!
//! Each decoder reads its fixed-layout root block, steps over any tail bytes
//! a newer schema may have appended, then reads repeating groups and
//! var-data fields. Range checks are a separate pass over the decoded value.

use std::io;

use crate::{Error, Result};

use super::decode::{
    check_currency, read_bytes, read_f64, read_u16, read_u32, read_u64, read_var_data, skip,
    GroupSize,
};
use super::enums::{
    BookChange, BookSide, Direction, FutureType, InstrumentKind, InstrumentState, Liquidation,
    OptionType, Period, TickDirection, YesNo,
};
use super::NULL_F64_BITS;

fn skip_block_tail(
    reader: &mut impl io::Read,
    block_length: u16,
    compiled: u16,
    what: &'static str,
) -> Result<()> {
    if block_length > compiled {
        skip(reader, u64::from(block_length - compiled), what)?;
    }
    Ok(())
}

/// An instrument definition event, template id 1000.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentMsg {
    /// The numeric id of the instrument, unique within a schema session.
    pub instrument_id: u32,
    /// The lifecycle state.
    pub state: InstrumentState,
    /// The instrument class.
    pub kind: InstrumentKind,
    /// The margining style when the instrument is a future.
    pub future_type: FutureType,
    /// Call or put when the instrument is an option.
    pub option_type: OptionType,
    /// Whether the instrument trades by request-for-quote only.
    pub rfq: YesNo,
    /// The settlement period.
    pub settlement_period: Period,
    /// Multiplier on the settlement period.
    pub settlement_period_count: u16,
    /// Base currency, NUL-padded ASCII.
    pub base_currency: [u8; 8],
    /// Quote currency, NUL-padded ASCII.
    pub quote_currency: [u8; 8],
    /// Counter currency, NUL-padded ASCII.
    pub counter_currency: [u8; 8],
    /// Settlement currency, NUL-padded ASCII.
    pub settlement_currency: [u8; 8],
    /// Currency amounts are denominated in, NUL-padded ASCII.
    pub size_currency: [u8; 8],
    /// Creation time, milliseconds since the UNIX epoch.
    pub creation_timestamp_ms: u64,
    /// Expiration time, milliseconds since the UNIX epoch.
    pub expiration_timestamp_ms: u64,
    /// Strike price when the instrument is an option.
    pub strike_price: f64,
    /// Contract size.
    pub contract_size: f64,
    /// Minimum order amount.
    pub min_trade_amount: f64,
    /// Price tick size.
    pub tick_size: f64,
    /// Maker commission rate.
    pub maker_commission: f64,
    /// Taker commission rate.
    pub taker_commission: f64,
    /// Block-trade commission rate.
    pub block_trade_commission: f64,
    /// Cap on the liquidation commission rate.
    pub max_liquidation_commission: f64,
    /// Maximum allowed leverage.
    pub max_leverage: f64,
    /// The instrument name, e.g. `BTC-PERPETUAL`.
    pub instrument_name: Vec<u8>,
}

impl InstrumentMsg {
    /// The root block length this codec was compiled against.
    pub const BLOCK_LENGTH: u16 = 140;

    /// Decodes an instrument message body from `reader`.
    ///
    /// # Errors
    /// This function returns an error if `reader` runs out of bytes or an
    /// enum field carries an out-of-set discriminant.
    pub fn decode(reader: &mut impl io::Read, block_length: u16) -> Result<Self> {
        let msg = Self {
            instrument_id: read_u32(reader, "Instrument.instrument_id")?,
            state: InstrumentState::decode(reader)?,
            kind: InstrumentKind::decode(reader)?,
            future_type: FutureType::decode(reader)?,
            option_type: OptionType::decode(reader)?,
            rfq: YesNo::decode(reader)?,
            settlement_period: Period::decode(reader)?,
            settlement_period_count: read_u16(reader, "Instrument.settlement_period_count")?,
            base_currency: read_bytes(reader, "Instrument.base_currency")?,
            quote_currency: read_bytes(reader, "Instrument.quote_currency")?,
            counter_currency: read_bytes(reader, "Instrument.counter_currency")?,
            settlement_currency: read_bytes(reader, "Instrument.settlement_currency")?,
            size_currency: read_bytes(reader, "Instrument.size_currency")?,
            creation_timestamp_ms: read_u64(reader, "Instrument.creation_timestamp_ms")?,
            expiration_timestamp_ms: read_u64(reader, "Instrument.expiration_timestamp_ms")?,
            strike_price: read_f64(reader, "Instrument.strike_price")?,
            contract_size: read_f64(reader, "Instrument.contract_size")?,
            min_trade_amount: read_f64(reader, "Instrument.min_trade_amount")?,
            tick_size: read_f64(reader, "Instrument.tick_size")?,
            maker_commission: read_f64(reader, "Instrument.maker_commission")?,
            taker_commission: read_f64(reader, "Instrument.taker_commission")?,
            block_trade_commission: read_f64(reader, "Instrument.block_trade_commission")?,
            max_liquidation_commission: read_f64(
                reader,
                "Instrument.max_liquidation_commission",
            )?,
            max_leverage: read_f64(reader, "Instrument.max_leverage")?,
            instrument_name: Vec::new(),
        };
        skip_block_tail(reader, block_length, Self::BLOCK_LENGTH, "Instrument tail")?;
        Ok(Self {
            instrument_name: read_var_data(reader, "Instrument.instrument_name")?,
            ..msg
        })
    }

    /// Verifies every scalar field lies within its declared bounds.
    ///
    /// # Errors
    /// This function returns [`Error::RangeCheck`] naming the first offending
    /// field.
    pub fn range_check(&self) -> Result<()> {
        if self.instrument_id > u32::MAX - 1 {
            return Err(Error::range_check(
                "Instrument.instrument_id",
                self.instrument_id,
                0,
                u32::MAX - 1,
            ));
        }
        if self.settlement_period_count > u16::MAX - 1 {
            return Err(Error::range_check(
                "Instrument.settlement_period_count",
                self.settlement_period_count,
                0,
                u16::MAX - 1,
            ));
        }
        check_currency("Instrument.base_currency", &self.base_currency)?;
        check_currency("Instrument.quote_currency", &self.quote_currency)?;
        check_currency("Instrument.counter_currency", &self.counter_currency)?;
        check_currency("Instrument.settlement_currency", &self.settlement_currency)?;
        check_currency("Instrument.size_currency", &self.size_currency)?;
        if self.creation_timestamp_ms > u64::MAX - 1 {
            return Err(Error::range_check(
                "Instrument.creation_timestamp_ms",
                self.creation_timestamp_ms,
                0,
                u64::MAX - 1,
            ));
        }
        if self.expiration_timestamp_ms > u64::MAX - 1 {
            return Err(Error::range_check(
                "Instrument.expiration_timestamp_ms",
                self.expiration_timestamp_ms,
                0,
                u64::MAX - 1,
            ));
        }
        Ok(())
    }
}

/// One changed price level inside an [`OrderBookMsg`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookChangeEntry {
    /// The side of the book.
    pub side: BookSide,
    /// What happened to the level.
    pub change: BookChange,
    /// The level price.
    pub price: f64,
    /// The new amount resting at the level; zero when deleted.
    pub amount: f64,
}

impl BookChangeEntry {
    const BLOCK_LENGTH: u16 = 18;

    fn decode(reader: &mut impl io::Read, block_length: u16) -> Result<Self> {
        let entry = Self {
            side: BookSide::decode(reader)?,
            change: BookChange::decode(reader)?,
            price: read_f64(reader, "BookChangeEntry.price")?,
            amount: read_f64(reader, "BookChangeEntry.amount")?,
        };
        skip_block_tail(reader, block_length, Self::BLOCK_LENGTH, "book entry tail")?;
        Ok(entry)
    }
}

/// An incremental order-book event, template id 1001.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderBookMsg {
    /// The numeric id of the instrument.
    pub instrument_id: u32,
    /// Event time, milliseconds since the UNIX epoch.
    pub timestamp_ms: u64,
    /// The change id of the previous event for this instrument; a gap in the
    /// chain signals loss.
    pub prev_change_id: u64,
    /// The change id of this event.
    pub change_id: u64,
    /// Whether this message terminates the current pagination run.
    pub is_last: bool,
    /// The changed levels, in exchange order.
    pub changes: Vec<BookChangeEntry>,
}

impl OrderBookMsg {
    /// The root block length this codec was compiled against.
    pub const BLOCK_LENGTH: u16 = 29;

    /// Decodes an order-book message body, including its `changes` group.
    ///
    /// # Errors
    /// This function returns an error if `reader` runs out of bytes or an
    /// enum field carries an out-of-set discriminant.
    pub fn decode(reader: &mut impl io::Read, block_length: u16) -> Result<Self> {
        let instrument_id = read_u32(reader, "OrderBook.instrument_id")?;
        let timestamp_ms = read_u64(reader, "OrderBook.timestamp_ms")?;
        let prev_change_id = read_u64(reader, "OrderBook.prev_change_id")?;
        let change_id = read_u64(reader, "OrderBook.change_id")?;
        let is_last = read_bytes::<1>(reader, "OrderBook.is_last")?[0] != 0;
        skip_block_tail(reader, block_length, Self::BLOCK_LENGTH, "OrderBook tail")?;

        let group = GroupSize::decode(reader)?;
        let mut changes = Vec::with_capacity(group.num_in_group as usize);
        for _ in 0..group.num_in_group {
            changes.push(BookChangeEntry::decode(reader, group.block_length)?);
        }
        Ok(Self {
            instrument_id,
            timestamp_ms,
            prev_change_id,
            change_id,
            is_last,
            changes,
        })
    }

    /// Verifies every scalar field lies within its declared bounds.
    ///
    /// # Errors
    /// This function returns [`Error::RangeCheck`] naming the first offending
    /// field.
    pub fn range_check(&self) -> Result<()> {
        if self.instrument_id > u32::MAX - 1 {
            return Err(Error::range_check(
                "OrderBook.instrument_id",
                self.instrument_id,
                0,
                u32::MAX - 1,
            ));
        }
        Ok(())
    }
}

/// One trade inside a [`TradesMsg`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TradeEntry {
    /// The taker side.
    pub direction: Direction,
    /// The trade price.
    pub price: f64,
    /// The traded amount.
    pub amount: f64,
    /// Trade time, milliseconds since the UNIX epoch.
    pub timestamp_ms: u64,
    /// The mark price at trade time.
    pub mark_price: f64,
    /// The index price at trade time.
    pub index_price: f64,
    /// The per-instrument trade sequence number.
    pub trade_seq: u64,
    /// The venue-wide trade id.
    pub trade_id: u64,
    /// Price movement relative to the previous trade.
    pub tick_direction: TickDirection,
    /// Which party was being liquidated.
    pub liquidation: Liquidation,
    /// Implied volatility at trade time, options only.
    pub iv: f64,
    /// The block-trade id, zero when not a block trade.
    pub block_trade_id: u64,
    /// The combo-trade id, zero when not a combo leg.
    pub combo_trade_id: u64,
}

impl TradeEntry {
    const BLOCK_LENGTH: u16 = 83;

    fn decode(reader: &mut impl io::Read, block_length: u16) -> Result<Self> {
        let entry = Self {
            direction: Direction::decode(reader)?,
            price: read_f64(reader, "TradeEntry.price")?,
            amount: read_f64(reader, "TradeEntry.amount")?,
            timestamp_ms: read_u64(reader, "TradeEntry.timestamp_ms")?,
            mark_price: read_f64(reader, "TradeEntry.mark_price")?,
            index_price: read_f64(reader, "TradeEntry.index_price")?,
            trade_seq: read_u64(reader, "TradeEntry.trade_seq")?,
            trade_id: read_u64(reader, "TradeEntry.trade_id")?,
            tick_direction: TickDirection::decode(reader)?,
            liquidation: Liquidation::decode(reader)?,
            iv: read_f64(reader, "TradeEntry.iv")?,
            block_trade_id: read_u64(reader, "TradeEntry.block_trade_id")?,
            combo_trade_id: read_u64(reader, "TradeEntry.combo_trade_id")?,
        };
        skip_block_tail(reader, block_length, Self::BLOCK_LENGTH, "trade entry tail")?;
        Ok(entry)
    }
}

/// A trades event, template id 1002.
#[derive(Debug, Clone, PartialEq)]
pub struct TradesMsg {
    /// The numeric id of the instrument.
    pub instrument_id: u32,
    /// The trades, in execution order.
    pub trades: Vec<TradeEntry>,
}

impl TradesMsg {
    /// The root block length this codec was compiled against.
    pub const BLOCK_LENGTH: u16 = 4;

    /// Decodes a trades message body, including its `trades` group.
    ///
    /// # Errors
    /// This function returns an error if `reader` runs out of bytes or an
    /// enum field carries an out-of-set discriminant.
    pub fn decode(reader: &mut impl io::Read, block_length: u16) -> Result<Self> {
        let instrument_id = read_u32(reader, "Trades.instrument_id")?;
        skip_block_tail(reader, block_length, Self::BLOCK_LENGTH, "Trades tail")?;

        let group = GroupSize::decode(reader)?;
        let mut trades = Vec::with_capacity(group.num_in_group as usize);
        for _ in 0..group.num_in_group {
            trades.push(TradeEntry::decode(reader, group.block_length)?);
        }
        Ok(Self {
            instrument_id,
            trades,
        })
    }

    /// Verifies every scalar field lies within its declared bounds.
    ///
    /// # Errors
    /// This function returns [`Error::RangeCheck`] naming the first offending
    /// field.
    pub fn range_check(&self) -> Result<()> {
        if self.instrument_id > u32::MAX - 1 {
            return Err(Error::range_check(
                "Trades.instrument_id",
                self.instrument_id,
                0,
                u32::MAX - 1,
            ));
        }
        for trade in &self.trades {
            if trade.trade_seq > u64::MAX - 1 {
                return Err(Error::range_check(
                    "TradeEntry.trade_seq",
                    trade.trade_seq,
                    0,
                    u64::MAX - 1,
                ));
            }
        }
        Ok(())
    }
}

/// A ticker event, template id 1003.
///
/// Optional prices carry the all-ones sentinel when absent; [`Self::decode`]
/// preserves the raw bit patterns and accessor methods apply the sentinel
/// mapping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TickerMsg {
    /// The numeric id of the instrument.
    pub instrument_id: u32,
    /// The instrument state at event time.
    pub state: InstrumentState,
    /// Event time, milliseconds since the UNIX epoch.
    pub timestamp_ms: u64,
    /// Open interest.
    pub open_interest: f64,
    /// Minimum sell price accepted by the price engine.
    pub min_sell_price: f64,
    /// Maximum buy price accepted by the price engine.
    pub max_buy_price: f64,
    /// The last trade price.
    pub last_price: f64,
    /// The index price.
    pub index_price: f64,
    /// The mark price.
    pub mark_price: f64,
    /// The best bid price; sentinel when the book side is empty.
    pub best_bid_price: f64,
    /// The amount resting at the best bid.
    pub best_bid_amount: f64,
    /// The best ask price; sentinel when the book side is empty.
    pub best_ask_price: f64,
    /// The amount resting at the best ask.
    pub best_ask_amount: f64,
    /// The current funding rate, perpetuals only; sentinel otherwise.
    pub current_funding: f64,
    /// The 8-hour funding rate, perpetuals only; sentinel otherwise.
    pub funding_8h: f64,
    /// The estimated delivery price.
    pub estimated_delivery_price: f64,
    /// The delivery price; sentinel before settlement.
    pub delivery_price: f64,
    /// The settlement price.
    pub settlement_price: f64,
}

impl TickerMsg {
    /// The root block length this codec was compiled against.
    pub const BLOCK_LENGTH: u16 = 133;

    /// Decodes a ticker message body from `reader`.
    ///
    /// # Errors
    /// This function returns an error if `reader` runs out of bytes or the
    /// state field carries an out-of-set discriminant.
    pub fn decode(reader: &mut impl io::Read, block_length: u16) -> Result<Self> {
        let msg = Self {
            instrument_id: read_u32(reader, "Ticker.instrument_id")?,
            state: InstrumentState::decode(reader)?,
            timestamp_ms: read_u64(reader, "Ticker.timestamp_ms")?,
            open_interest: read_f64(reader, "Ticker.open_interest")?,
            min_sell_price: read_f64(reader, "Ticker.min_sell_price")?,
            max_buy_price: read_f64(reader, "Ticker.max_buy_price")?,
            last_price: read_f64(reader, "Ticker.last_price")?,
            index_price: read_f64(reader, "Ticker.index_price")?,
            mark_price: read_f64(reader, "Ticker.mark_price")?,
            best_bid_price: read_f64(reader, "Ticker.best_bid_price")?,
            best_bid_amount: read_f64(reader, "Ticker.best_bid_amount")?,
            best_ask_price: read_f64(reader, "Ticker.best_ask_price")?,
            best_ask_amount: read_f64(reader, "Ticker.best_ask_amount")?,
            current_funding: read_f64(reader, "Ticker.current_funding")?,
            funding_8h: read_f64(reader, "Ticker.funding_8h")?,
            estimated_delivery_price: read_f64(reader, "Ticker.estimated_delivery_price")?,
            delivery_price: read_f64(reader, "Ticker.delivery_price")?,
            settlement_price: read_f64(reader, "Ticker.settlement_price")?,
        };
        skip_block_tail(reader, block_length, Self::BLOCK_LENGTH, "Ticker tail")?;
        Ok(msg)
    }

    /// Verifies every scalar field lies within its declared bounds.
    ///
    /// # Errors
    /// This function returns [`Error::RangeCheck`] naming the first offending
    /// field.
    pub fn range_check(&self) -> Result<()> {
        if self.instrument_id > u32::MAX - 1 {
            return Err(Error::range_check(
                "Ticker.instrument_id",
                self.instrument_id,
                0,
                u32::MAX - 1,
            ));
        }
        Ok(())
    }

    /// The best bid price, `None` when the sentinel marks the side empty.
    pub fn best_bid(&self) -> Option<f64> {
        optional_price(self.best_bid_price)
    }

    /// The best ask price, `None` when the sentinel marks the side empty.
    pub fn best_ask(&self) -> Option<f64> {
        optional_price(self.best_ask_price)
    }
}

fn optional_price(raw: f64) -> Option<f64> {
    (raw.to_bits() != NULL_F64_BITS).then_some(raw)
}

/// One resting level inside a [`SnapshotMsg`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookLevel {
    /// The side of the book.
    pub side: BookSide,
    /// The level price.
    pub price: f64,
    /// The amount resting at the level.
    pub amount: f64,
}

impl BookLevel {
    const BLOCK_LENGTH: u16 = 17;

    fn decode(reader: &mut impl io::Read, block_length: u16) -> Result<Self> {
        let level = Self {
            side: BookSide::decode(reader)?,
            price: read_f64(reader, "BookLevel.price")?,
            amount: read_f64(reader, "BookLevel.amount")?,
        };
        skip_block_tail(reader, block_length, Self::BLOCK_LENGTH, "book level tail")?;
        Ok(level)
    }
}

/// One page of a paginated order-book snapshot, template id 1004.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotMsg {
    /// The numeric id of the instrument.
    pub instrument_id: u32,
    /// Snapshot time, milliseconds since the UNIX epoch.
    pub timestamp_ms: u64,
    /// The change id the snapshot was cut at; live increments resume from it.
    pub change_id: u64,
    /// The datagram sequence number the live stream resumes at.
    pub expected_seq: u32,
    /// Whether this page completes the snapshot.
    pub is_last: bool,
    /// The resting levels carried by this page.
    pub levels: Vec<BookLevel>,
}

impl SnapshotMsg {
    /// The root block length this codec was compiled against.
    pub const BLOCK_LENGTH: u16 = 25;

    /// Decodes a snapshot page body, including its `levels` group.
    ///
    /// # Errors
    /// This function returns an error if `reader` runs out of bytes or an
    /// enum field carries an out-of-set discriminant.
    pub fn decode(reader: &mut impl io::Read, block_length: u16) -> Result<Self> {
        let instrument_id = read_u32(reader, "Snapshot.instrument_id")?;
        let timestamp_ms = read_u64(reader, "Snapshot.timestamp_ms")?;
        let change_id = read_u64(reader, "Snapshot.change_id")?;
        let expected_seq = read_u32(reader, "Snapshot.expected_seq")?;
        let is_last = read_bytes::<1>(reader, "Snapshot.is_last")?[0] != 0;
        skip_block_tail(reader, block_length, Self::BLOCK_LENGTH, "Snapshot tail")?;

        let group = GroupSize::decode(reader)?;
        let mut levels = Vec::with_capacity(group.num_in_group as usize);
        for _ in 0..group.num_in_group {
            levels.push(BookLevel::decode(reader, group.block_length)?);
        }
        Ok(Self {
            instrument_id,
            timestamp_ms,
            change_id,
            expected_seq,
            is_last,
            levels,
        })
    }

    /// Verifies every scalar field lies within its declared bounds.
    ///
    /// # Errors
    /// This function returns [`Error::RangeCheck`] naming the first offending
    /// field.
    pub fn range_check(&self) -> Result<()> {
        if self.instrument_id > u32::MAX - 1 {
            return Err(Error::range_check(
                "Snapshot.instrument_id",
                self.instrument_id,
                0,
                u32::MAX - 1,
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sbe::MessageHeader;
    use crate::test_utils::{INSTRUMENT_EVENT, ORDER_BOOK_EVENT, TICKER_EVENT, TRADES_EVENT};

    #[test]
    fn test_decode_instrument() {
        let mut reader = INSTRUMENT_EVENT;
        let header = MessageHeader::decode(&mut reader).unwrap();
        assert_eq!(
            header,
            MessageHeader {
                block_length: 140,
                template_id: 1000,
                schema_id: 1,
                version: 1,
                num_groups: 0,
                num_var_data_fields: 1,
            }
        );

        let msg = InstrumentMsg::decode(&mut reader, header.block_length).unwrap();
        assert_eq!(msg.instrument_id, 210762);
        assert_eq!(msg.state, InstrumentState::Open);
        assert_eq!(msg.kind, InstrumentKind::Option);
        assert_eq!(msg.future_type, FutureType::NotApplicable);
        assert_eq!(msg.option_type, OptionType::Put);
        assert_eq!(msg.rfq, YesNo::No);
        assert_eq!(msg.settlement_period, Period::Month);
        assert_eq!(msg.settlement_period_count, 3);
        assert_eq!(&msg.base_currency, b"ETH\0\0\0\0\0");
        assert_eq!(&msg.quote_currency, b"ETH\0\0\0\0\0");
        assert_eq!(&msg.counter_currency, b"USD\0\0\0\0\0");
        assert_eq!(&msg.settlement_currency, b"ETH\0\0\0\0\0");
        assert_eq!(&msg.size_currency, b"ETH\0\0\0\0\0");
        assert_eq!(msg.creation_timestamp_ms, 1648108860000);
        assert_eq!(msg.expiration_timestamp_ms, 1680249600000);
        assert_eq!(msg.strike_price, 3500.0);
        assert_eq!(msg.contract_size, 1.0);
        assert_eq!(msg.min_trade_amount, 1.0);
        assert_eq!(msg.tick_size, 0.0005);
        assert_eq!(msg.maker_commission, 0.0003);
        assert_eq!(msg.taker_commission, 0.0003);
        assert_eq!(msg.block_trade_commission, 0.0003);
        assert_eq!(msg.max_liquidation_commission, 0.0);
        assert_eq!(msg.max_leverage, 0.0);
        assert_eq!(msg.instrument_name, b"ETH-31MAR23-3500-P");
        assert!(msg.range_check().is_ok());
    }

    #[test]
    fn test_decode_order_book() {
        let mut reader = ORDER_BOOK_EVENT;
        let header = MessageHeader::decode(&mut reader).unwrap();
        assert_eq!(header.template_id, 1001);
        assert_eq!(header.block_length, 29);
        assert_eq!(header.num_groups, 1);

        let msg = OrderBookMsg::decode(&mut reader, header.block_length).unwrap();
        assert_eq!(msg.instrument_id, 210838);
        assert_eq!(msg.timestamp_ms, 1662371873911);
        assert_eq!(msg.prev_change_id, 49383351612);
        assert_eq!(msg.change_id, 49383351613);
        assert!(msg.is_last);
        assert_eq!(
            msg.changes,
            vec![BookChangeEntry {
                side: BookSide::Bid,
                change: BookChange::Changed,
                price: 19769.5,
                amount: 60030.0,
            }]
        );
        assert!(msg.range_check().is_ok());
    }

    #[test]
    fn test_decode_trades() {
        let mut reader = TRADES_EVENT;
        let header = MessageHeader::decode(&mut reader).unwrap();
        assert_eq!(header.template_id, 1002);
        assert_eq!(header.block_length, 4);

        let msg = TradesMsg::decode(&mut reader, header.block_length).unwrap();
        assert_eq!(msg.instrument_id, 228979);
        assert_eq!(msg.trades.len(), 1);
        let trade = &msg.trades[0];
        assert_eq!(trade.direction, Direction::Sell);
        assert_eq!(trade.price, 0.001);
        assert_eq!(trade.amount, 0.2);
        assert_eq!(trade.timestamp_ms, 1662630736813);
        assert_eq!(trade.mark_price, 0.00127624);
        assert_eq!(trade.index_price, 19164.79);
        assert_eq!(trade.trade_seq, 1498);
        assert_eq!(trade.trade_id, 228534710);
        assert_eq!(trade.tick_direction, TickDirection::ZeroMinus);
        assert_eq!(trade.liquidation, Liquidation::None);
        assert_eq!(trade.iv, 59.16);
        assert_eq!(trade.block_trade_id, 0);
        assert!(msg.range_check().is_ok());
    }

    #[test]
    fn test_decode_ticker() {
        let mut reader = TICKER_EVENT;
        let header = MessageHeader::decode(&mut reader).unwrap();
        assert_eq!(header.template_id, 1003);
        assert_eq!(header.block_length, 133);

        let msg = TickerMsg::decode(&mut reader, header.block_length).unwrap();
        assert_eq!(msg.instrument_id, 211066);
        assert_eq!(msg.state, InstrumentState::Open);
        assert_eq!(msg.timestamp_ms, 1662519695815);
        assert_eq!(msg.open_interest, 31.0);
        assert_eq!(msg.min_sell_price, 25.351);
        assert_eq!(msg.max_buy_price, 26.9805);
        assert_eq!(msg.last_price, 10.8155);
        assert_eq!(msg.index_price, 1497.93);
        assert_eq!(msg.mark_price, 26.1415);
        assert_eq!(msg.best_bid(), Some(0.0));
        assert_eq!(msg.best_bid_amount, 0.0);
        assert_eq!(msg.best_ask(), Some(0.0));
        assert_eq!(msg.best_ask_amount, 0.0);
        // absent funding fields arrive as the all-ones sentinel
        assert!(msg.current_funding.is_nan());
        assert!(msg.funding_8h.is_nan());
        assert_eq!(msg.estimated_delivery_price, 1497.93);
        assert!(msg.delivery_price.is_nan());
        assert_eq!(msg.settlement_price, 23.431957);
        assert!(msg.range_check().is_ok());
    }

    #[test]
    fn test_decode_forward_compat_skips_wider_block() {
        // same trades event with 4 unknown bytes appended to the root block
        let mut widened = Vec::from(TRADES_EVENT);
        widened[0] = 8; // block_length
        widened.splice(16..16, [0xde, 0xad, 0xbe, 0xef]);

        let mut reader = widened.as_slice();
        let header = MessageHeader::decode(&mut reader).unwrap();
        assert_eq!(header.block_length, 8);
        let msg = TradesMsg::decode(&mut reader, header.block_length).unwrap();
        assert_eq!(msg.instrument_id, 228979);
        assert_eq!(msg.trades.len(), 1);
        assert_eq!(msg.trades[0].trade_id, 228534710);
    }

    #[test]
    fn test_decode_truncated_root_block() {
        let mut reader = &ORDER_BOOK_EVENT[..20];
        let header = MessageHeader::decode(&mut reader).unwrap();
        assert!(matches!(
            OrderBookMsg::decode(&mut reader, header.block_length),
            Err(Error::ShortRead(_))
        ));
    }

    #[test]
    fn test_instrument_range_check_rejects_null_id() {
        let mut reader = INSTRUMENT_EVENT;
        let header = MessageHeader::decode(&mut reader).unwrap();
        let mut msg = InstrumentMsg::decode(&mut reader, header.block_length).unwrap();
        msg.instrument_id = u32::MAX;
        assert!(matches!(msg.range_check(), Err(Error::RangeCheck(_))));
    }

    #[test]
    fn test_instrument_range_check_rejects_unprintable_currency() {
        let mut reader = INSTRUMENT_EVENT;
        let header = MessageHeader::decode(&mut reader).unwrap();
        let mut msg = InstrumentMsg::decode(&mut reader, header.block_length).unwrap();
        msg.quote_currency[0] = 0x1f;
        assert!(matches!(msg.range_check(), Err(Error::RangeCheck(_))));
    }
}
