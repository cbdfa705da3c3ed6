use std::io;

use crate::{Error, Result};

use super::decode::read_u16;

/// The SBE null value for an unsigned 16-bit field.
const NULL_U16: u16 = 0xFFFF;

/// The 12-byte message header preceding every SBE message body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageHeader {
    /// The length of the root block that follows, in bytes.
    pub block_length: u16,
    /// Selects which message body layout follows the header.
    pub template_id: u16,
    /// The id of the schema the message was encoded with.
    pub schema_id: u16,
    /// The version of the schema the message was encoded with.
    pub version: u16,
    /// The number of repeating groups after the root block.
    pub num_groups: u16,
    /// The number of var-data fields after the groups.
    pub num_var_data_fields: u16,
}

impl MessageHeader {
    /// The number of bytes a header occupies on the wire.
    pub const ENCODED_LENGTH: usize = 12;

    /// Decodes a message header from `reader`.
    ///
    /// # Errors
    /// This function returns [`Error::ShortRead`] if `reader` holds fewer than
    /// [`Self::ENCODED_LENGTH`] bytes.
    pub fn decode(reader: &mut impl io::Read) -> Result<Self> {
        Ok(Self {
            block_length: read_u16(reader, "MessageHeader.block_length")?,
            template_id: read_u16(reader, "MessageHeader.template_id")?,
            schema_id: read_u16(reader, "MessageHeader.schema_id")?,
            version: read_u16(reader, "MessageHeader.version")?,
            num_groups: read_u16(reader, "MessageHeader.num_groups")?,
            num_var_data_fields: read_u16(reader, "MessageHeader.num_var_data_fields")?,
        })
    }

    /// Verifies no field carries the `u16` null value.
    ///
    /// # Errors
    /// This function returns [`Error::RangeCheck`] naming the first offending
    /// field.
    pub fn range_check(&self) -> Result<()> {
        let fields = [
            ("MessageHeader.block_length", self.block_length),
            ("MessageHeader.template_id", self.template_id),
            ("MessageHeader.schema_id", self.schema_id),
            ("MessageHeader.version", self.version),
            ("MessageHeader.num_groups", self.num_groups),
            (
                "MessageHeader.num_var_data_fields",
                self.num_var_data_fields,
            ),
        ];
        for (name, value) in fields {
            if value == NULL_U16 {
                return Err(Error::range_check(name, value, 0, NULL_U16 - 1));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_decode_header() {
        let event: &[u8] = &[
            0x1d, 0x00, 0xe9, 0x03, 0x01, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00, 0xb0, 0x3b,
            0x03, 0x00,
        ];
        let mut reader = event;
        let header = MessageHeader::decode(&mut reader).unwrap();
        assert_eq!(
            header,
            MessageHeader {
                block_length: 29,
                template_id: 1001,
                schema_id: 1,
                version: 1,
                num_groups: 1,
                num_var_data_fields: 0,
            }
        );
        assert!(header.range_check().is_ok());
        // reader advanced exactly past the header
        assert_eq!(reader, &[0xb0, 0x3b, 0x03, 0x00]);
    }

    #[rstest]
    #[case::empty(&[])]
    #[case::one_field(&[0x1d, 0x00])]
    #[case::two_fields(&[0x1d, 0x00, 0xe9, 0x03])]
    #[case::three_fields(&[0x1d, 0x00, 0xe9, 0x03, 0x01, 0x00])]
    #[case::four_fields(&[0x1d, 0x00, 0xe9, 0x03, 0x01, 0x00, 0x01, 0x00])]
    #[case::five_fields(&[0x1d, 0x00, 0xe9, 0x03, 0x01, 0x00, 0x01, 0x00, 0x01, 0x00])]
    fn test_decode_header_truncated(#[case] event: &[u8]) {
        let mut reader = event;
        assert!(matches!(
            MessageHeader::decode(&mut reader),
            Err(Error::ShortRead(_))
        ));
    }

    #[rstest]
    #[case::block_length(&[0xff, 0xff, 0xe9, 0x03, 0x01, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00])]
    #[case::template_id(&[0x1d, 0x00, 0xff, 0xff, 0x01, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00])]
    #[case::schema_id(&[0x1d, 0x00, 0xe9, 0x03, 0xff, 0xff, 0x01, 0x00, 0x01, 0x00, 0x00, 0x00])]
    #[case::version(&[0x1d, 0x00, 0xe9, 0x03, 0x01, 0x00, 0xff, 0xff, 0x01, 0x00, 0x00, 0x00])]
    #[case::num_groups(&[0x1d, 0x00, 0xe9, 0x03, 0x01, 0x00, 0x01, 0x00, 0xff, 0xff, 0x00, 0x00])]
    #[case::num_var_data(&[0x1d, 0x00, 0xe9, 0x03, 0x01, 0x00, 0x01, 0x00, 0x01, 0x00, 0xff, 0xff])]
    fn test_header_range_check(#[case] event: &[u8]) {
        let mut reader = event;
        let header = MessageHeader::decode(&mut reader).unwrap();
        assert!(matches!(header.range_check(), Err(Error::RangeCheck(_))));
    }
}
