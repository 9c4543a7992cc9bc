//! Record codec
//!
//! Encoding and decoding of a record to and from one fixed-size block.
//!
//! ## Block Format (little-endian, 180 bytes)
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ Reserved header (16)                                          │
//! │   Status (1) | Zero (3) | CRC32 of body (4) | Zero (8)        │
//! ├───────────────────────────────────────────────────────────────┤
//! │ Body (164)                                                    │
//! │   Id: i32 (4)                                                 │
//! │   FirstNameLen: i32 (4) | FirstName: ASCII, zero padded (60)  │
//! │   LastNameLen: i32 (4)  | LastName: ASCII, zero padded (60)   │
//! │   Year: i32 (4) | Month: i32 (4) | Day: i32 (4)               │
//! │   Income: i16 (2)                                             │
//! │   Tax: i128 hundredths (16)                                   │
//! │   Block: UTF-16 code unit (2)                                 │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The status byte sits outside the checksummed body so a record can be
//! tombstoned in place by rewriting a single byte.

use bytes::{Buf, BufMut, BytesMut};
use chrono::{Datelike, NaiveDate};

use crate::error::{CabinetError, Result};
use crate::record::{Record, Tax, MAX_NAME_LEN};

// =============================================================================
// Layout Constants
// =============================================================================

/// Reserved header in front of every block
pub const HEADER_SIZE: usize = 16;

const ID_SIZE: usize = 4;
const NAME_LEN_SIZE: usize = 4;
const DATE_SIZE: usize = 3 * 4;
const INCOME_SIZE: usize = 2;
const TAX_SIZE: usize = 16;
const BLOCK_SIZE: usize = 2;

/// Total size of one encoded record
pub const FIXED_SIZE: usize = HEADER_SIZE
    + ID_SIZE
    + 2 * (NAME_LEN_SIZE + MAX_NAME_LEN)
    + DATE_SIZE
    + INCOME_SIZE
    + TAX_SIZE
    + BLOCK_SIZE;

/// Offset of the status byte inside the header
const STATUS_OFFSET: usize = 0;

/// Offset of the body checksum inside the header
const CRC_OFFSET: usize = 4;

/// Status bit set on logically deleted records
const STATUS_DELETED: u8 = 0x01;

// =============================================================================
// Encoding
// =============================================================================

/// Encode a record into one fixed-size block
///
/// Names that are not ASCII or exceed `MAX_NAME_LEN` bytes are rejected,
/// never truncated.
pub fn encode(record: &Record) -> Result<[u8; FIXED_SIZE]> {
    check_name("firstname", &record.first_name)?;
    check_name("lastname", &record.last_name)?;
    let block = block_unit(record.block)?;

    let mut buf = BytesMut::with_capacity(FIXED_SIZE);

    // Header is filled in once the body checksum is known
    buf.put_bytes(0, HEADER_SIZE);

    buf.put_i32_le(record.id);
    put_name(&mut buf, &record.first_name);
    put_name(&mut buf, &record.last_name);

    buf.put_i32_le(record.date_of_birth.year());
    buf.put_i32_le(record.date_of_birth.month() as i32);
    buf.put_i32_le(record.date_of_birth.day() as i32);

    buf.put_i16_le(record.income);
    buf.put_i128_le(i128::from(record.tax.hundredths()));
    buf.put_u16_le(block);

    debug_assert_eq!(buf.len(), FIXED_SIZE);

    let crc = crc32fast::hash(&buf[HEADER_SIZE..]);
    buf[CRC_OFFSET..CRC_OFFSET + 4].copy_from_slice(&crc.to_le_bytes());

    let mut block = [0u8; FIXED_SIZE];
    block.copy_from_slice(&buf);
    Ok(block)
}

fn check_name(field: &str, name: &str) -> Result<()> {
    if !name.is_ascii() {
        return Err(CabinetError::validation(field, "must contain ASCII characters only"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(CabinetError::validation(
            field,
            format!("must be at most {} bytes, got {}", MAX_NAME_LEN, name.len()),
        ));
    }
    Ok(())
}

fn put_name(buf: &mut BytesMut, name: &str) {
    buf.put_i32_le(name.len() as i32);
    buf.put_slice(name.as_bytes());
    buf.put_bytes(0, MAX_NAME_LEN - name.len());
}

fn block_unit(block: char) -> Result<u16> {
    let mut units = [0u16; 2];
    match block.encode_utf16(&mut units) {
        [unit] => Ok(*unit),
        _ => Err(CabinetError::validation(
            "block",
            "must fit in a single UTF-16 code unit",
        )),
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode one fixed-size block into a record
///
/// The tombstone flag is not interpreted here; see [`is_deleted`].
pub fn decode(bytes: &[u8]) -> Result<Record> {
    if bytes.len() != FIXED_SIZE {
        return Err(CabinetError::CorruptRecord(format!(
            "block size mismatch: expected {} bytes, got {}",
            FIXED_SIZE,
            bytes.len()
        )));
    }

    let stored_crc = u32::from_le_bytes([
        bytes[CRC_OFFSET],
        bytes[CRC_OFFSET + 1],
        bytes[CRC_OFFSET + 2],
        bytes[CRC_OFFSET + 3],
    ]);
    let actual_crc = crc32fast::hash(&bytes[HEADER_SIZE..]);
    if stored_crc != actual_crc {
        return Err(CabinetError::CorruptRecord(format!(
            "checksum mismatch: stored {:08x}, computed {:08x}",
            stored_crc, actual_crc
        )));
    }

    let mut buf = &bytes[HEADER_SIZE..];

    let id = buf.get_i32_le();
    let first_name = get_name(&mut buf, "first name")?;
    let last_name = get_name(&mut buf, "last name")?;

    let year = buf.get_i32_le();
    let month = buf.get_i32_le();
    let day = buf.get_i32_le();
    let date_of_birth = u32::try_from(month)
        .ok()
        .zip(u32::try_from(day).ok())
        .and_then(|(m, d)| NaiveDate::from_ymd_opt(year, m, d))
        .ok_or_else(|| {
            CabinetError::CorruptRecord(format!(
                "record {}: invalid date {}-{}-{}",
                id, year, month, day
            ))
        })?;

    let income = buf.get_i16_le();

    let raw_tax = buf.get_i128_le();
    let tax = i64::try_from(raw_tax)
        .map(Tax::from_hundredths)
        .map_err(|_| CabinetError::CorruptRecord(format!("record {}: tax out of range", id)))?;

    let unit = buf.get_u16_le();
    let block = char::from_u32(u32::from(unit)).ok_or_else(|| {
        CabinetError::CorruptRecord(format!("record {}: invalid block code unit {:#06x}", id, unit))
    })?;

    Ok(Record {
        id,
        first_name,
        last_name,
        date_of_birth,
        income,
        tax,
        block,
    })
}

/// Read a length-prefixed name; only the declared length is interpreted
fn get_name(buf: &mut &[u8], what: &str) -> Result<String> {
    let len = buf.get_i32_le();
    let len = usize::try_from(len)
        .ok()
        .filter(|&l| l <= MAX_NAME_LEN)
        .ok_or_else(|| CabinetError::CorruptRecord(format!("{} length {} out of range", what, len)))?;

    let raw = &buf[..len];
    if !raw.is_ascii() {
        return Err(CabinetError::CorruptRecord(format!("{} is not ASCII", what)));
    }
    let name = String::from_utf8_lossy(raw).into_owned();
    buf.advance(MAX_NAME_LEN);
    Ok(name)
}

// =============================================================================
// Status Byte
// =============================================================================

/// True if the block carries the tombstone flag
pub fn is_deleted(bytes: &[u8]) -> bool {
    bytes
        .get(STATUS_OFFSET)
        .map(|status| status & STATUS_DELETED != 0)
        .unwrap_or(false)
}

/// Set the tombstone flag on an encoded block
pub fn mark_deleted(bytes: &mut [u8]) {
    if let Some(status) = bytes.get_mut(STATUS_OFFSET) {
        *status |= STATUS_DELETED;
    }
}

/// Status byte of a tombstoned block, for writing it in place
pub(crate) fn deleted_status() -> u8 {
    STATUS_DELETED
}

/// Offset of the status byte relative to the block start
pub(crate) fn status_offset() -> u64 {
    STATUS_OFFSET as u64
}
