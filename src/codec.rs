//! ## The codec surface
//!
//! Six operations cover the three framing layers: bare records (head plus
//! data blocks, no header), messages (a routing header in front of one
//! record body) and packets (a magic, a word length and a CRC in front of
//! one or more concatenated messages).
//!
//! Encoded buffers are produced in one call and owned by the caller;
//! decoding borrows its input and returns independent copies.

use crate::{
    crc::crc16_ccitt,
    deserializer::Deserializer,
    errors::BlueberryError,
    header::{MessageHeader, PacketHeader},
    pad_to_word,
    schema::WireRecord,
    serializer::Serializer,
    Result, HEADER_FIELD_COUNT, MESSAGE_HEADER_SIZE, PACKET_HEADER_SIZE, WORD,
};

use itertools::Itertools;

/// Serialize a record to raw bytes: the head followed by its data blocks,
/// with no message header in front.
pub fn serialize<R: WireRecord>(record: &R) -> Result<Vec<u8>> {
    let schema = R::schema();
    schema.validate()?;

    let mut ser = Serializer::new();
    ser.serialize_record(schema, &record.to_values())?;
    ser.finalize()
}

/// Deserialize raw record bytes produced by [`serialize`].
pub fn deserialize<R: WireRecord>(data: &[u8]) -> Result<R> {
    let schema = R::schema();
    schema.validate()?;

    let mut de = Deserializer::new(data);
    R::from_values(de.deserialize_record(schema)?)
}

/// Serialize a record with a message header in front. The result is padded
/// to a word multiple, ready for packet framing.
pub fn serialize_message<R: WireRecord>(
    record: &R,
    module_key: u16,
    message_key: u16,
) -> Result<Vec<u8>> {
    let schema = R::schema();
    schema.validate()?;

    let mut ser = Serializer::with_base_offset(MESSAGE_HEADER_SIZE);
    ser.serialize_record(schema, &record.to_values())?;
    let field_count = ser.field_count();
    let body = ser.finalize()?;

    let padded = pad_to_word(MESSAGE_HEADER_SIZE + body.len());
    if padded / WORD > usize::from(u16::MAX) {
        return Err(BlueberryError::MessageTooLong { bytes: padded });
    }
    let max_ordinal = field_count + HEADER_FIELD_COUNT - 1;
    if max_ordinal > usize::from(u8::MAX) {
        return Err(BlueberryError::TooManyFields { count: field_count });
    }

    let header = MessageHeader {
        module_key,
        message_key,
        length: (padded / WORD) as u16,
        max_ordinal: max_ordinal as u8,
        tbd: 0,
    };

    let mut message = vec![0u8; padded];
    header.encode_into(&mut message);
    message[MESSAGE_HEADER_SIZE..MESSAGE_HEADER_SIZE + body.len()].copy_from_slice(&body);
    Ok(message)
}

/// Deserialize one message into its header and record body.
pub fn deserialize_message<R: WireRecord>(data: &[u8]) -> Result<(MessageHeader, R)> {
    let schema = R::schema();
    schema.validate()?;

    let header = MessageHeader::decode(data)?;
    let message_byte_len = header.byte_len();
    if data.len() < message_byte_len {
        return Err(BlueberryError::NotEnoughBytes {
            expected: message_byte_len,
            found: data.len(),
        });
    }

    let mut de = Deserializer::with_message_context(data, MESSAGE_HEADER_SIZE, message_byte_len);
    let record = R::from_values(de.deserialize_record(schema)?)?;
    Ok((header, record))
}

/// A header-only message, used for request/response exchanges that carry
/// no body.
pub fn empty_message(module_key: u16, message_key: u16) -> Vec<u8> {
    let header = MessageHeader {
        module_key,
        message_key,
        length: (MESSAGE_HEADER_SIZE / WORD) as u16,
        max_ordinal: (HEADER_FIELD_COUNT - 1) as u8,
        tbd: 0,
    };
    header.encode().to_vec()
}

/// Frame pre-encoded messages into a packet: magic, word length and CRC in
/// front of the padded concatenation.
///
/// Panics if the combined length exceeds what the header's 16-bit word
/// count can express; individual messages are already bounded well below
/// that by their descriptor offsets.
pub fn serialize_packet<M: AsRef<[u8]>>(messages: &[M]) -> Vec<u8> {
    let mut payload = Vec::new();
    for message in messages {
        payload.extend_from_slice(message.as_ref());
    }

    let padded = pad_to_word(PACKET_HEADER_SIZE + payload.len());
    assert!(
        padded / WORD <= usize::from(u16::MAX),
        "packet of {} bytes exceeds the 16-bit word count",
        padded
    );
    payload.resize(padded - PACKET_HEADER_SIZE, 0);

    let header = PacketHeader {
        length_words: (padded / WORD) as u16,
        crc: crc16_ccitt(&payload),
    };

    let mut packet = Vec::with_capacity(padded);
    packet.extend_from_slice(&header.encode());
    packet.extend_from_slice(&payload);
    packet
}

/// Validate a packet and partition it into message byte strings.
///
/// The walk over the message region is tolerant of the packet's terminal
/// padding: a residue shorter than a message header, or one that decodes
/// to a zero length, ends the walk without error. A message that claims to
/// extend past the packet end is an error.
pub fn deserialize_packet(data: &[u8]) -> Result<(PacketHeader, Vec<Vec<u8>>)> {
    let header = PacketHeader::decode(data)?;
    let total = header.byte_len();
    if data.len() < total {
        return Err(BlueberryError::NotEnoughBytes {
            expected: total,
            found: data.len(),
        });
    }

    let computed = crc16_ccitt(&data[PACKET_HEADER_SIZE..total]);
    if computed != header.crc {
        return Err(BlueberryError::CrcMismatch {
            expected: header.crc,
            computed,
        });
    }

    let mut messages = Vec::new();
    let mut offset = PACKET_HEADER_SIZE;
    while offset + MESSAGE_HEADER_SIZE <= total {
        let msg_header = MessageHeader::decode(&data[offset..])?;
        let msg_len = msg_header.byte_len();
        if msg_len < MESSAGE_HEADER_SIZE {
            // Terminal packet padding decodes as a zero length.
            break;
        }
        if offset + msg_len > total {
            return Err(BlueberryError::MessageOutOfBounds {
                index: messages.len(),
                needed: msg_len,
                available: total - offset,
            });
        }
        messages.push(data[offset..offset + msg_len].to_vec());
        offset += msg_len;
    }

    log::debug!(
        target: "Parsing packet",
        "Partitioned {} bytes into {} messages of [{}] bytes.",
        total,
        messages.len(),
        messages.iter().map(|m| m.len()).format(", ")
    );

    Ok((header, messages))
}
