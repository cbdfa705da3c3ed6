//! Types for errors that can occur while decoding feeds or driving a session.
use std::fmt;

/// An error that can occur in this crate.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error while reading from or writing to a transport.
    #[error("I/O error: {source} while {context}")]
    Io {
        /// The original error.
        #[source]
        source: std::io::Error,
        /// The operation being attempted.
        context: String,
    },
    /// The reader ran out of bytes in the middle of a frame.
    #[error("short read while decoding {0}")]
    ShortRead(&'static str),
    /// A decoded value fell outside the bounds declared for its field, including
    /// enumeration values outside their value set.
    #[error("range check failed on {0}")]
    RangeCheck(String),
    /// An SBE template id with no decoder compiled in.
    #[error("unsupported template id {0}")]
    UnsupportedTemplateId(u16),
    /// A datagram repeated an already-processed sequence number.
    #[error("duplicated package on channel {channel_id} (seq {seq})")]
    DuplicatedPackage {
        /// The multicast channel the duplicate arrived on.
        channel_id: u16,
        /// The repeated sequence number.
        seq: u32,
    },
    /// A datagram arrived farther ahead than the reorder window can absorb.
    #[error("package out of order on channel {channel_id}: expected {expected}, got {got}")]
    OutOfOrder {
        /// The multicast channel that lost sync.
        channel_id: u16,
        /// The next sequence number the receiver was waiting for.
        expected: u32,
        /// The sequence number that arrived.
        got: u32,
    },
    /// A multicast group address did not parse as an IPv4 `ip:port` pair.
    #[error("invalid ipv4 address '{0}'")]
    InvalidIpv4Address(String),
    /// A snapshot stream ended without a terminal `is_last` page.
    #[error("snapshot event stream ended without is_last")]
    EventWithoutIsLast,
    /// The operation requires a live connection.
    #[error("not connected")]
    NotConnected,
    /// The peer reset or closed the connection mid-exchange.
    #[error("connection reset")]
    ConnectionReset,
    /// A private method was invoked without credentials configured.
    #[error("authentication is required")]
    AuthenticationRequired,
    /// The FIX message type carries no request-id tag to correlate on.
    #[error("no request-id tag for this message type")]
    InvalidRequestIdTag,
    /// A conditionally required FIX field was absent.
    #[error("conditionally required field missing ({0})")]
    ConditionallyRequiredFieldMissing(u32),
    /// A conditionally required session setting was absent.
    #[error("conditionally required setting missing: {0}")]
    ConditionallyRequiredSettingMissing(&'static str),
    /// An invalid argument was passed to a function.
    #[error("bad argument `{param_name}`: {desc}")]
    BadArgument {
        /// The name of the parameter.
        param_name: String,
        /// The reason it's invalid.
        desc: String,
    },
    /// A call did not complete before its deadline.
    #[error("request timed out")]
    Timeout,
    /// The server answered a JSON-RPC call with an error object.
    #[error("rpc error {code}: {message}")]
    Rpc {
        /// The JSON-RPC error code.
        code: i64,
        /// The server-supplied message.
        message: String,
    },
    /// The FIX session rejected the request, or the response carried an error text.
    #[error("session reject: {0}")]
    SessionReject(String),
    /// JSON (de)serialization failed.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// An alias for a `Result` with [`enum@Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new I/O [`enum@Error`] with the given `context`.
    pub fn io(source: std::io::Error, context: impl ToString) -> Self {
        Self::Io {
            source,
            context: context.to_string(),
        }
    }

    /// Creates a new range-check [`enum@Error`] for a scalar `field` whose `value`
    /// fell outside `[min, max]`.
    pub fn range_check<T: fmt::Display>(field: &str, value: T, min: T, max: T) -> Self {
        Self::RangeCheck(format!("{field} ({min} <= {value} <= {max})"))
    }

    /// Creates a new range-check [`enum@Error`] for an enumeration `field` decoded
    /// from an unknown discriminant.
    pub fn unknown_enum_value(field: &str, value: u8) -> Self {
        Self::RangeCheck(format!("{field}, unknown enumeration value {value}"))
    }

    /// Creates a new bad-argument [`enum@Error`].
    pub fn bad_argument(param_name: impl ToString, desc: impl ToString) -> Self {
        Self::BadArgument {
            param_name: param_name.to_string(),
            desc: desc.to_string(),
        }
    }

    /// Whether the error indicates the underlying socket is gone and the loop
    /// that observed it should exit quietly.
    pub fn is_connection_closed(&self) -> bool {
        match self {
            Self::ConnectionReset => true,
            Self::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
                    | std::io::ErrorKind::NotConnected
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_check_message() {
        let err = Error::range_check("Instrument.instrument_id", 4294967295u32, 0, 4294967294);
        assert_eq!(
            err.to_string(),
            "range check failed on Instrument.instrument_id (0 <= 4294967295 <= 4294967294)"
        );
    }

    #[test]
    fn test_connection_closed_classification() {
        assert!(Error::ConnectionReset.is_connection_closed());
        assert!(Error::io(
            std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe"),
            "reading datagram"
        )
        .is_connection_closed());
        assert!(!Error::NotConnected.is_connection_closed());
        assert!(!Error::Timeout.is_connection_closed());
    }
}
