//! Little-endian primitive reads shared by all message decoders.

use std::io;

use crate::{Error, Result};

/// The group size encoding preceding every repeating group: `block_length`,
/// `num_in_group`, `num_groups`, `num_var_data_fields`, all little-endian `u16`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupSize {
    /// The encoded length of one group entry in bytes.
    pub block_length: u16,
    /// The number of entries that follow.
    pub num_in_group: u16,
}

/// The number of bytes a [`GroupSize`] occupies on the wire.
pub const GROUP_SIZE_ENCODED_LENGTH: usize = 8;

impl GroupSize {
    /// Decodes a group size encoding from `reader`.
    ///
    /// # Errors
    /// This function returns an error if `reader` runs out of bytes.
    pub fn decode(reader: &mut impl io::Read) -> Result<Self> {
        let block_length = read_u16(reader, "GroupSize.block_length")?;
        let num_in_group = read_u16(reader, "GroupSize.num_in_group")?;
        // nested groups and var-data counts are carried but unused by this schema
        read_u16(reader, "GroupSize.num_groups")?;
        read_u16(reader, "GroupSize.num_var_data_fields")?;
        Ok(Self {
            block_length,
            num_in_group,
        })
    }
}

fn short_read(err: io::Error, what: &'static str) -> Error {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        Error::ShortRead(what)
    } else {
        Error::io(err, format!("reading {what}"))
    }
}

pub(crate) fn read_u8(reader: &mut impl io::Read, what: &'static str) -> Result<u8> {
    let mut buf = [0u8; 1];
    reader.read_exact(&mut buf).map_err(|e| short_read(e, what))?;
    Ok(buf[0])
}

pub(crate) fn read_u16(reader: &mut impl io::Read, what: &'static str) -> Result<u16> {
    let mut buf = [0u8; 2];
    reader.read_exact(&mut buf).map_err(|e| short_read(e, what))?;
    Ok(u16::from_le_bytes(buf))
}

pub(crate) fn read_u32(reader: &mut impl io::Read, what: &'static str) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf).map_err(|e| short_read(e, what))?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64(reader: &mut impl io::Read, what: &'static str) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf).map_err(|e| short_read(e, what))?;
    Ok(u64::from_le_bytes(buf))
}

pub(crate) fn read_f64(reader: &mut impl io::Read, what: &'static str) -> Result<f64> {
    read_u64(reader, what).map(f64::from_bits)
}

pub(crate) fn read_bytes<const N: usize>(
    reader: &mut impl io::Read,
    what: &'static str,
) -> Result<[u8; N]> {
    let mut buf = [0u8; N];
    reader.read_exact(&mut buf).map_err(|e| short_read(e, what))?;
    Ok(buf)
}

/// Reads a u8 length-prefixed var-data field.
pub(crate) fn read_var_data(reader: &mut impl io::Read, what: &'static str) -> Result<Vec<u8>> {
    let length = read_u8(reader, what)? as usize;
    let mut buf = vec![0u8; length];
    reader.read_exact(&mut buf).map_err(|e| short_read(e, what))?;
    Ok(buf)
}

/// Discards `count` bytes, used to step over unknown tail bytes of newer
/// schema versions.
pub(crate) fn skip(reader: &mut impl io::Read, count: u64, what: &'static str) -> Result<()> {
    let mut buf = [0u8; 512];
    let mut remaining = count;
    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        reader
            .read_exact(&mut buf[..chunk])
            .map_err(|e| short_read(e, what))?;
        remaining -= chunk as u64;
    }
    Ok(())
}

/// Takes the prefix of a fixed-size ASCII array up to the first NUL.
pub(crate) fn fixed_str(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Range-checks every byte of a fixed-size currency array: printable ASCII
/// until the first NUL.
pub(crate) fn check_currency(field: &'static str, bytes: &[u8; 8]) -> Result<()> {
    for &b in bytes {
        if b == 0 {
            break;
        }
        if !(32..=126).contains(&b) {
            return Err(Error::range_check(field, b, 32, 126));
        }
    }
    Ok(())
}
