//! Tag=value (SOH-delimited) FIX message representation.
//!
//! Fields keep their wire order and may repeat, which is what repeating
//! groups rely on. `BodyLength (9)` and `CheckSum (10)` are computed on
//! serialization.

use std::fmt;

use crate::{Error, Result};

/// The field delimiter.
pub const SOH: char = '\x01';

/// A FIX tag number.
pub type Tag = u32;

/// Tag numbers used by this client, named after their FIX fields.
#[allow(missing_docs)]
pub mod tag {
    use super::Tag;

    pub const AVG_PX: Tag = 6;
    pub const BEGIN_STRING: Tag = 8;
    pub const BODY_LENGTH: Tag = 9;
    pub const CHECK_SUM: Tag = 10;
    pub const CL_ORD_ID: Tag = 11;
    pub const CUM_QTY: Tag = 14;
    pub const EXEC_ID: Tag = 17;
    pub const LAST_PX: Tag = 31;
    pub const LAST_QTY: Tag = 32;
    pub const MSG_SEQ_NUM: Tag = 34;
    pub const MSG_TYPE: Tag = 35;
    pub const ORDER_ID: Tag = 37;
    pub const ORDER_QTY: Tag = 38;
    pub const ORD_STATUS: Tag = 39;
    pub const ORD_TYPE: Tag = 40;
    pub const ORIG_CL_ORD_ID: Tag = 41;
    pub const PRICE: Tag = 44;
    pub const SENDER_COMP_ID: Tag = 49;
    pub const SENDING_TIME: Tag = 52;
    pub const SIDE: Tag = 54;
    pub const SYMBOL: Tag = 55;
    pub const TARGET_COMP_ID: Tag = 56;
    pub const TEXT: Tag = 58;
    pub const TIME_IN_FORCE: Tag = 59;
    pub const ENCRYPT_METHOD: Tag = 98;
    pub const HEART_BT_INT: Tag = 108;
    pub const TEST_REQ_ID: Tag = 112;
    pub const RESET_SEQ_NUM_FLAG: Tag = 141;
    pub const NO_RELATED_SYM: Tag = 146;
    pub const MD_REQ_ID: Tag = 262;
    pub const SUBSCRIPTION_REQUEST_TYPE: Tag = 263;
    pub const MARKET_DEPTH: Tag = 264;
    pub const NO_MD_ENTRY_TYPES: Tag = 267;
    pub const NO_MD_ENTRIES: Tag = 268;
    pub const MD_ENTRY_TYPE: Tag = 269;
    pub const MD_ENTRY_PX: Tag = 270;
    pub const MD_ENTRY_SIZE: Tag = 271;
    pub const MD_ENTRY_DATE: Tag = 272;
    pub const MD_ENTRY_TIME: Tag = 273;
    pub const MD_UPDATE_ACTION: Tag = 279;
    pub const SECURITY_REQ_ID: Tag = 320;
    pub const SECURITY_LIST_REQUEST_TYPE: Tag = 559;
    pub const SECURITY_STATUS_REQ_ID: Tag = 324;
    pub const MASS_CANCEL_REQUEST_TYPE: Tag = 530;
    pub const MASS_CANCEL_RESPONSE: Tag = 531;
    pub const TOTAL_AFFECTED_ORDERS: Tag = 533;
    pub const USERNAME: Tag = 553;
    pub const PASSWORD: Tag = 554;
    pub const POS_REQ_ID: Tag = 710;
    pub const USER_REQUEST_ID: Tag = 923;
}

/// Standard header tags routed into [`Message::header`] during parsing.
const HEADER_TAGS: &[Tag] = &[
    tag::BEGIN_STRING,
    tag::BODY_LENGTH,
    tag::MSG_TYPE,
    tag::MSG_SEQ_NUM,
    tag::SENDER_COMP_ID,
    tag::SENDING_TIME,
    tag::TARGET_COMP_ID,
    50,  // SenderSubID
    57,  // TargetSubID
    115, // OnBehalfOfCompID
    128, // DeliverToCompID
];

/// An ordered multimap of FIX fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    fields: Vec<(Tag, String)>,
}

impl FieldMap {
    /// The first value carried by `tag`, if any.
    pub fn get(&self, tag: Tag) -> Option<&str> {
        self.fields
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, v)| v.as_str())
    }

    /// The first value carried by `tag`.
    ///
    /// # Errors
    /// This function returns
    /// [`Error::ConditionallyRequiredFieldMissing`] when the field is absent.
    pub fn get_required(&self, tag: Tag) -> Result<&str> {
        self.get(tag)
            .ok_or(Error::ConditionallyRequiredFieldMissing(tag))
    }

    /// The first value carried by `tag` parsed as `f64`, zero when absent or
    /// malformed.
    pub fn get_f64(&self, tag: Tag) -> f64 {
        self.get(tag)
            .and_then(|value| value.parse().ok())
            .unwrap_or(0.0)
    }

    /// Replaces the first occurrence of `tag` or appends it.
    pub fn set(&mut self, tag: Tag, value: impl ToString) {
        let value = value.to_string();
        match self.fields.iter_mut().find(|(t, _)| *t == tag) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((tag, value)),
        }
    }

    /// Appends `tag`; repeating-group entries always append.
    pub fn push(&mut self, tag: Tag, value: impl ToString) {
        self.fields.push((tag, value.to_string()));
    }

    /// Whether any occurrence of `tag` is present.
    pub fn contains(&self, tag: Tag) -> bool {
        self.get(tag).is_some()
    }

    /// The fields in wire order.
    pub fn iter(&self) -> impl Iterator<Item = &(Tag, String)> {
        self.fields.iter()
    }

    /// Whether the map holds no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A FIX message split into header, body, and trailer field maps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    /// Standard header fields.
    pub header: FieldMap,
    /// Application fields, including repeating groups.
    pub body: FieldMap,
    /// The trailer; `CheckSum` on parsed messages.
    pub trailer: FieldMap,
}

impl Message {
    /// Creates an empty message.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a message with `MsgType` already stamped.
    pub fn with_msg_type(msg_type: &str) -> Self {
        let mut message = Self::default();
        message.header.set(tag::MSG_TYPE, msg_type);
        message
    }

    /// The `MsgType (35)` value, if present.
    pub fn msg_type(&self) -> Option<&str> {
        self.header.get(tag::MSG_TYPE)
    }

    /// Parses a raw SOH-delimited message.
    ///
    /// # Errors
    /// This function returns an error on a field without `=` or with a
    /// non-numeric tag.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut message = Self::default();
        for field in raw.split(SOH).filter(|field| !field.is_empty()) {
            let (tag_str, value) = field
                .split_once('=')
                .ok_or_else(|| Error::bad_argument("raw", format!("field without '=': {field}")))?;
            let tag: Tag = tag_str
                .parse()
                .map_err(|_| Error::bad_argument("raw", format!("non-numeric tag: {tag_str}")))?;
            if tag == tag::CHECK_SUM {
                message.trailer.push(tag, value);
            } else if HEADER_TAGS.contains(&tag) {
                message.header.push(tag, value);
            } else {
                message.body.push(tag, value);
            }
        }
        Ok(message)
    }

    /// Collects repeating-group entries delimited by `delimiter`, keeping
    /// only `members`. Fields before the first delimiter belong to the root.
    pub fn groups(&self, delimiter: Tag, members: &[Tag]) -> Vec<FieldMap> {
        let mut groups = Vec::new();
        let mut current: Option<FieldMap> = None;
        for (tag, value) in self.body.iter() {
            if *tag == delimiter {
                if let Some(group) = current.take() {
                    groups.push(group);
                }
                let mut group = FieldMap::default();
                group.push(*tag, value);
                current = Some(group);
            } else if let Some(group) = current.as_mut() {
                if members.contains(tag) {
                    group.push(*tag, value);
                }
            }
        }
        groups.extend(current);
        groups
    }

    /// Serializes with `BodyLength` and `CheckSum` computed.
    pub fn serialize(&self) -> String {
        let begin_string = self.header.get(tag::BEGIN_STRING).unwrap_or("FIX.4.4");

        let mut middle = String::new();
        if let Some(msg_type) = self.msg_type() {
            push_field(&mut middle, tag::MSG_TYPE, msg_type);
        }
        for (tag, value) in self.header.iter() {
            if matches!(
                *tag,
                tag::BEGIN_STRING | tag::BODY_LENGTH | tag::MSG_TYPE | tag::CHECK_SUM
            ) {
                continue;
            }
            push_field(&mut middle, *tag, value);
        }
        for (tag, value) in self.body.iter() {
            push_field(&mut middle, *tag, value);
        }

        let mut message = format!("8={begin_string}{SOH}9={}{SOH}{middle}", middle.len());
        let checksum: u32 = message.bytes().map(u32::from).sum();
        message.push_str(&format!("10={:03}{SOH}", checksum % 256));
        message
    }
}

fn push_field(out: &mut String, tag: Tag, value: &str) {
    out.push_str(&format!("{tag}={value}{SOH}"));
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}
