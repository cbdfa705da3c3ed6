//! FIX 4.4 session adapter.
//!
//! An initiator-side client that multiplexes request/response exchanges over
//! one session, correlates responses by the request-id tag of their message
//! type, and translates market-data refreshes and execution reports into the
//! same typed event vocabulary the other transports use.

mod client;
mod initiator;
mod message;
mod settings;

pub use client::Client;
pub use initiator::{Application, Initiator, SessionId, SocketInitiator};
pub use message::{tag, FieldMap, Message, Tag, SOH};
pub use settings::{setting, Settings};

use rand::rngs::OsRng;
use rand::RngCore;

use crate::{Error, Result};

/// Session-level message types that bypass application dispatch.
const ADMIN_MSG_TYPES: &[&str] = &["0", "A", "1", "2", "3", "4", "5"];

/// Whether `msg_type` is a session-level (admin) message.
pub fn is_admin_msg_type(msg_type: &str) -> bool {
    ADMIN_MSG_TYPES.contains(&msg_type)
}

/// The body tag carrying the request id for responses of `msg_type`.
///
/// # Errors
/// This function returns [`Error::InvalidRequestIdTag`] for message types
/// that carry no correlation id (heartbeats, test requests, and anything
/// unknown).
pub fn req_id_tag(msg_type: &str) -> Result<Tag> {
    match msg_type {
        // ExecutionReport
        "8" => Ok(tag::ORIG_CL_ORD_ID),
        // OrderCancelReject
        "9" => Ok(tag::CL_ORD_ID),
        // PositionReport
        "AP" => Ok(tag::POS_REQ_ID),
        // UserResponse
        "BF" => Ok(tag::USER_REQUEST_ID),
        // MarketDataRequest / Refresh / Incremental / Reject
        "V" | "W" | "X" | "Y" => Ok(tag::MD_REQ_ID),
        // SecurityStatus
        "f" => Ok(tag::SECURITY_STATUS_REQ_ID),
        // OrderMassCancelReport
        "r" => Ok(tag::ORDER_ID),
        // SecurityList
        "y" => Ok(tag::SECURITY_REQ_ID),
        _ => Err(Error::InvalidRequestIdTag),
    }
}

/// Maps `OrdStatus (39)` onto the venue's order-state vocabulary.
pub fn decode_order_status(status: &str) -> &'static str {
    match status {
        "0" | "1" => "open",
        "2" => "filled",
        "4" => "cancelled",
        "8" => "rejected",
        _ => "",
    }
}

/// Maps `Side (54)` onto `buy`/`sell`.
pub fn decode_order_side(side: &str) -> &'static str {
    match side {
        "1" => "buy",
        "2" => "sell",
        _ => "",
    }
}

/// Maps `OrdType (40)` onto the venue's order-type vocabulary.
pub fn decode_order_type(ord_type: &str) -> &'static str {
    match ord_type {
        "1" => "market",
        "2" => "limit",
        "4" => "stop_limit",
        "stop_market" => "stop_market",
        _ => "",
    }
}

/// Maps `TimeInForce (59)` onto the venue's vocabulary.
pub fn decode_time_in_force(time_in_force: &str) -> &'static str {
    match time_in_force {
        "0" => "good_til_day",
        "1" => "good_til_cancelled",
        "3" => "immediate_or_cancel",
        "4" => "fill_or_kill",
        _ => "",
    }
}

/// Fills `count` bytes from the OS entropy source.
///
/// # Errors
/// This function returns an error if the entropy source fails.
pub fn generate_random_bytes(count: usize) -> Result<Vec<u8>> {
    let mut bytes = vec![0u8; count];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::bad_argument("count", format!("entropy source failed: {e}")))?;
    Ok(bytes)
}

/// A fresh hex-encoded request id of at least 8 random bytes.
///
/// # Errors
/// See [`generate_random_bytes`].
pub fn new_request_id() -> Result<String> {
    let bytes = generate_random_bytes(8)?;
    Ok(bytes.iter().map(|b| format!("{b:02x}")).collect())
}

/// Parses a FIX UTC timestamp (`YYYYMMDD-HH:MM:SS[.sss]`, or a bare
/// `YYYYMMDD` date combined with a separate `HH:MM:SS[.sss]` time) into
/// milliseconds since the UNIX epoch.
///
/// # Errors
/// This function returns an error when the fields do not form a valid
/// timestamp.
pub fn parse_fix_timestamp(date: &str, time: Option<&str>) -> Result<u64> {
    let combined = match time {
        Some(time) if !date.contains('-') => format!("{date}-{time}"),
        _ => date.to_owned(),
    };
    let with_millis = time::macros::format_description!(
        "[year][month][day]-[hour]:[minute]:[second].[subsecond digits:3]"
    );
    let without_millis =
        time::macros::format_description!("[year][month][day]-[hour]:[minute]:[second]");
    let parsed = time::PrimitiveDateTime::parse(&combined, with_millis)
        .or_else(|_| time::PrimitiveDateTime::parse(&combined, without_millis))
        .map_err(|e| Error::bad_argument("date", format!("bad FIX timestamp '{combined}': {e}")))?;
    let millis = parsed.assume_utc().unix_timestamp_nanos() / 1_000_000;
    u64::try_from(millis)
        .map_err(|_| Error::bad_argument("date", "timestamp before the UNIX epoch"))
}

/// Formats `now` the way `SendingTime (52)` expects.
pub(crate) fn format_sending_time(now: time::OffsetDateTime) -> String {
    let format = time::macros::format_description!(
        "[year][month][day]-[hour]:[minute]:[second].[subsecond digits:3]"
    );
    now.format(&format)
        .unwrap_or_else(|_| "19700101-00:00:00.000".to_owned())
}
