//! This crate implements the Blueberry wire format, a compact little-endian
//! binary encoding for exchanging structured messages between a host and
//! embedded devices.
//!
//! An encoded record consists of a fixed-layout *head* with one slot per
//! field, followed by 4-byte aligned *data blocks* holding variable-length
//! payloads (strings and sequences). Records are wrapped into messages with
//! an 8-byte routing header, and one or more messages are framed into a
//! packet validated by a CRC-16-CCITT checksum.

pub mod codec;
pub mod deserializer;
pub mod errors;
pub mod header;
pub mod schema;
pub mod serializer;

mod crc;

pub use codec::{
    deserialize, deserialize_message, deserialize_packet, empty_message, serialize,
    serialize_message, serialize_packet,
};
pub use crc::crc16_ccitt;
pub use errors::BlueberryError;
pub use header::{MessageHeader, PacketHeader};
pub use schema::{Field, Schema, Value, WireKind, WireRecord};

use smallstr::SmallString;

/// The four bytes every packet starts with, ASCII "Blue".
pub const PACKET_MAGIC: [u8; 4] = [0x42, 0x6C, 0x75, 0x65];

/// Byte size of the packet header.
pub const PACKET_HEADER_SIZE: usize = 8;

/// Byte size of the message header.
pub const MESSAGE_HEADER_SIZE: usize = 8;

/// Number of ordinals reserved for the message header quantities; body
/// fields are numbered from here on.
pub const HEADER_FIELD_COUNT: usize = 3;

/// Canonical transport port, 0x4242 ("BB").
pub const BLUEBERRY_PORT: u16 = 0x4242;

/// Message and packet lengths are expressed in 4-byte words.
pub(crate) const WORD: usize = 4;

/// Round a byte length up to the next word boundary.
pub(crate) fn pad_to_word(len: usize) -> usize {
    (len + WORD - 1) & !(WORD - 1)
}

/// Convenience type alias for a string with the SSO, used for field names.
pub type FlexString = SmallString<[u8; 8]>;

/// Crate's Result type.
pub(crate) type Result<T> = std::result::Result<T, errors::BlueberryError>;
