//! ## Message and packet headers
//!
//! Both headers are 8 bytes long and little-endian. A message header routes
//! a record body and records its padded length:
//!
//! ```text
//! +---------------------+--------+-------------+-----+
//! | module << 16 | msg  | length | max_ordinal | tbd |
//! +---------------------+--------+-------------+-----+
//! |        u32          |  u16   |     u8      | u8  |
//! +---------------------+--------+-------------+-----+
//! ```
//!
//! `length` is the total message length in 4-byte words, header included.
//! `max_ordinal` is the ordinal of the last body field; ordinals 0..2 are
//! reserved for the three header quantities, so a body of N fields yields
//! `N + 2`. A packet header frames one or more concatenated messages:
//!
//! ```text
//! +----------------------+--------------+-----+
//! | 'B'  'l'  'u'  'e'   | length_words | crc |
//! +----------------------+--------------+-----+
//! |       magic          |     u16      | u16 |
//! +----------------------+--------------+-----+
//! ```
//!
//! The CRC covers the bytes following the header up to `length_words * 4`.

use crate::{
    errors::BlueberryError, Result, MESSAGE_HEADER_SIZE, PACKET_HEADER_SIZE, PACKET_MAGIC, WORD,
};

use serde::Serialize;
use std::convert::TryInto;

/// The 8-byte header in front of every encoded message.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct MessageHeader {
    pub module_key: u16,
    pub message_key: u16,
    /// Total message length in 4-byte words, header included.
    pub length: u16,
    /// Ordinal of the last body field; the header reserves ordinals 0..2.
    pub max_ordinal: u8,
    /// Reserved, zero.
    pub tbd: u8,
}

impl MessageHeader {
    pub fn encode(&self) -> [u8; MESSAGE_HEADER_SIZE] {
        let module_message_key =
            (u32::from(self.module_key) << 16) | u32::from(self.message_key);

        let mut buf = [0u8; MESSAGE_HEADER_SIZE];
        buf[0..4].copy_from_slice(&module_message_key.to_le_bytes());
        buf[4..6].copy_from_slice(&self.length.to_le_bytes());
        buf[6] = self.max_ordinal;
        buf[7] = self.tbd;
        buf
    }

    /// Write the encoded header into the first 8 bytes of `buf`.
    pub fn encode_into(&self, buf: &mut [u8]) {
        buf[..MESSAGE_HEADER_SIZE].copy_from_slice(&self.encode());
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < MESSAGE_HEADER_SIZE {
            return Err(BlueberryError::NotEnoughBytes {
                expected: MESSAGE_HEADER_SIZE,
                found: data.len(),
            });
        }

        let module_message_key = u32::from_le_bytes(data[0..4].try_into().unwrap());
        Ok(Self {
            module_key: (module_message_key >> 16) as u16,
            message_key: module_message_key as u16,
            length: u16::from_le_bytes(data[4..6].try_into().unwrap()),
            max_ordinal: data[6],
            tbd: data[7],
        })
    }

    /// Total message length in bytes, as declared by the header.
    pub fn byte_len(&self) -> usize {
        usize::from(self.length) * WORD
    }
}

/// The 8-byte header in front of every packet.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PacketHeader {
    /// Total packet length in 4-byte words, header included.
    pub length_words: u16,
    /// CRC-16-CCITT over the message bytes, padding included.
    pub crc: u16,
}

impl PacketHeader {
    pub fn encode(&self) -> [u8; PACKET_HEADER_SIZE] {
        let mut buf = [0u8; PACKET_HEADER_SIZE];
        buf[0..4].copy_from_slice(&PACKET_MAGIC);
        buf[4..6].copy_from_slice(&self.length_words.to_le_bytes());
        buf[6..8].copy_from_slice(&self.crc.to_le_bytes());
        buf
    }

    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < PACKET_HEADER_SIZE {
            return Err(BlueberryError::NotEnoughBytes {
                expected: PACKET_HEADER_SIZE,
                found: data.len(),
            });
        }
        if data[0..4] != PACKET_MAGIC {
            return Err(BlueberryError::BadMagic {
                found: data[0..4].try_into().unwrap(),
            });
        }

        Ok(Self {
            length_words: u16::from_le_bytes(data[4..6].try_into().unwrap()),
            crc: u16::from_le_bytes(data[6..8].try_into().unwrap()),
        })
    }

    /// Total packet length in bytes, as declared by the header.
    pub fn byte_len(&self) -> usize {
        usize::from(self.length_words) * WORD
    }
}
