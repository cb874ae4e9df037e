//! ## Record decoding
//!
//! The reader mirrors the writer: scalars are pulled from aligned head
//! slots, bool runs are unpacked bit by bit, and descriptors are followed
//! into their data blocks. Descriptor offsets are measured from the first
//! byte of the buffer handed in, which is the message header for messages
//! and the record head for bare records.
//!
//! Decoded values are owned copies; the reader only borrows the input.

use crate::{
    errors::BlueberryError,
    schema::{Field, Schema, Value, WireKind},
    Result, WORD,
};

use std::convert::TryInto;
use std::str;

/// Read-side counterpart of the writer's bool run state: the shared byte is
/// remembered by value, since the input is immutable.
#[derive(Debug, Default)]
struct BitUnpacker {
    byte: Option<u8>,
    bit_index: u8,
}

impl BitUnpacker {
    fn flush(&mut self) {
        self.byte = None;
        self.bit_index = 0;
    }
}

/// Reads record values out of a byte buffer.
#[derive(Debug)]
pub struct Deserializer<'a> {
    data: &'a [u8],
    pos: usize,
    bools: BitUnpacker,
    message_byte_len: Option<usize>,
}

impl<'a> Deserializer<'a> {
    /// A reader for a bare record: descriptor offsets are relative to
    /// `data[0]` and there is no message boundary to respect.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            bools: BitUnpacker::default(),
            message_byte_len: None,
        }
    }

    /// A reader for a message body. `data[0]` is the first header byte,
    /// `body_start` the offset of the record head, and `message_byte_len`
    /// the declared message length the reader must not look past.
    pub fn with_message_context(
        data: &'a [u8],
        body_start: usize,
        message_byte_len: usize,
    ) -> Self {
        Self {
            data,
            pos: body_start,
            bools: BitUnpacker::default(),
            message_byte_len: Some(message_byte_len),
        }
    }

    /// Decode all fields of a record in schema order. Afterwards the read
    /// position sits on the message boundary, so several messages can be
    /// decoded back to back from one buffer.
    pub fn deserialize_record(&mut self, schema: &Schema) -> Result<Vec<Value>> {
        let values = self.read_record_fields(schema)?;
        self.skip_to_message_end();
        Ok(values)
    }

    fn read_record_fields(&mut self, schema: &Schema) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            values.push(self.read_field(field)?);
        }
        Ok(values)
    }

    fn read_field(&mut self, field: &Field) -> Result<Value> {
        use WireKind::*;
        Ok(match &field.kind {
            Bool => Value::Bool(self.read_bool()?),
            Str => Value::Str(self.read_string(field)?),
            Seq(elem_kind) => Value::Seq(self.read_sequence(field, elem_kind)?),
            // Nested records were inlined by the writer; read their fields
            // as if they were declared at this level.
            Record(sub_schema) => Value::Record(self.read_record_fields(sub_schema)?),
            kind => {
                // Only fixed-width scalars remain.
                let size = kind.scalar_size().unwrap();
                self.bools.flush();
                self.align_to(size);
                decode_scalar(kind, self.take(size)?)
            }
        })
    }

    fn read_bool(&mut self) -> Result<bool> {
        match self.bools.byte {
            Some(byte) => {
                let v = (byte >> self.bools.bit_index) & 1 != 0;
                self.bools.bit_index += 1;
                if self.bools.bit_index == 8 {
                    self.bools.flush();
                }
                Ok(v)
            }
            None => {
                let byte = self.take(1)?[0];
                self.bools.byte = Some(byte);
                self.bools.bit_index = 1;
                Ok(byte & 1 != 0)
            }
        }
    }

    fn read_string(&mut self, field: &Field) -> Result<String> {
        self.bools.flush();
        self.align_to(2);
        let offset = usize::from(u16::from_le_bytes(self.take(2)?.try_into().unwrap()));

        // The zero offset is the empty sentinel; it falls inside the
        // header, which never hosts data.
        if offset == 0 {
            return Ok(String::new());
        }

        let (count, start) = self.block_header(offset)?;
        let bytes = self.block_bytes(start, count)?;
        str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|source| BlueberryError::InvalidStringBytes {
                name: field.name.to_string(),
                source,
            })
    }

    fn read_sequence(&mut self, field: &Field, elem_kind: &WireKind) -> Result<Vec<Value>> {
        self.bools.flush();
        self.align_to(2);
        let descriptor = self.take(4)?;
        let offset = usize::from(u16::from_le_bytes(descriptor[0..2].try_into().unwrap()));
        // The element byte size at descriptor[2..4] is redundant with the
        // schema and not consulted on the read side.

        if offset == 0 {
            return Ok(Vec::new());
        }

        let (count, block_start) = self.block_header(offset)?;
        let mut elem_pos = block_start;
        let mut items = Vec::with_capacity(count.min(self.limit().saturating_sub(block_start)));
        for _ in 0..count {
            let (value, next) = self.read_element(field, elem_kind, elem_pos)?;
            items.push(value);
            elem_pos = next;
        }
        Ok(items)
    }

    /// Read a packed element at `pos` inside a data block; returns the
    /// value and the position just past it.
    fn read_element(&self, field: &Field, kind: &WireKind, pos: usize) -> Result<(Value, usize)> {
        use WireKind::*;
        match kind {
            Bool => {
                let byte = self.block_bytes(pos, 1)?[0];
                Ok((Value::Bool(byte & 1 != 0), pos + 1))
            }
            Record(sub_schema) => {
                let mut pos = pos;
                let mut sub_values = Vec::with_capacity(sub_schema.fields().len());
                for sub_field in sub_schema.fields() {
                    let (value, next) = self.read_element(sub_field, &sub_field.kind, pos)?;
                    sub_values.push(value);
                    pos = next;
                }
                Ok((Value::Record(sub_values), pos))
            }
            Str | Seq(_) => Err(BlueberryError::UnsupportedElementKind {
                name: field.name.to_string(),
                kind: kind.to_string(),
            }),
            kind => {
                let size = kind.scalar_size().unwrap();
                Ok((decode_scalar(kind, self.block_bytes(pos, size)?), pos + size))
            }
        }
    }

    /// Follow a descriptor offset to its block and read the `u32` element
    /// count. Returns the count and the position of the first element.
    fn block_header(&self, offset: usize) -> Result<(usize, usize)> {
        let count_bytes = self.block_bytes(offset, WORD)?;
        let count = u32::from_le_bytes(count_bytes.try_into().unwrap());
        Ok((count as usize, offset + WORD))
    }

    /// Borrow `len` bytes of block data at `start`, bounds-checked against
    /// the message end.
    fn block_bytes(&self, start: usize, len: usize) -> Result<&'a [u8]> {
        let available = self.limit().saturating_sub(start);
        if available < len {
            return Err(BlueberryError::NotEnoughBytes {
                expected: len,
                found: available,
            });
        }
        Ok(&self.data[start..start + len])
    }

    fn take(&mut self, size: usize) -> Result<&'a [u8]> {
        let available = self.limit().saturating_sub(self.pos);
        if available < size {
            return Err(BlueberryError::NotEnoughBytes {
                expected: size,
                found: available,
            });
        }
        let slice = &self.data[self.pos..self.pos + size];
        self.pos += size;
        Ok(slice)
    }

    fn align_to(&mut self, size: usize) {
        if size <= 1 {
            return;
        }
        let align = size.min(WORD);
        let rem = self.pos % align;
        if rem != 0 {
            self.pos += align - rem;
        }
    }

    /// First byte past the decodable region: the declared message end when
    /// there is one, the whole buffer otherwise.
    fn limit(&self) -> usize {
        match self.message_byte_len {
            Some(len) => len.min(self.data.len()),
            None => self.data.len(),
        }
    }

    fn skip_to_message_end(&mut self) {
        if let Some(len) = self.message_byte_len {
            if self.pos < len {
                self.pos = len;
            }
        }
    }
}

/// Interpret an exactly-sized little-endian byte slice as a scalar value.
fn decode_scalar(kind: &WireKind, bytes: &[u8]) -> Value {
    use WireKind::*;
    match kind {
        U8 => Value::U8(bytes[0]),
        I8 => Value::I8(bytes[0] as i8),
        U16 => Value::U16(u16::from_le_bytes(bytes.try_into().unwrap())),
        I16 => Value::I16(i16::from_le_bytes(bytes.try_into().unwrap())),
        U32 => Value::U32(u32::from_le_bytes(bytes.try_into().unwrap())),
        I32 => Value::I32(i32::from_le_bytes(bytes.try_into().unwrap())),
        U64 => Value::U64(u64::from_le_bytes(bytes.try_into().unwrap())),
        I64 => Value::I64(i64::from_le_bytes(bytes.try_into().unwrap())),
        F32 => Value::F32(f32::from_le_bytes(bytes.try_into().unwrap())),
        F64 => Value::F64(f64::from_le_bytes(bytes.try_into().unwrap())),
        Bool | Str | Seq(_) | Record(_) => unreachable!("not a fixed-width scalar"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, Schema, Value, WireKind};
    use crate::serializer::Serializer;

    fn roundtrip(schema: &Schema, values: &[Value]) -> Vec<Value> {
        let mut ser = Serializer::new();
        ser.serialize_record(schema, values).unwrap();
        let bytes = ser.finalize().unwrap();
        Deserializer::new(&bytes).deserialize_record(schema).unwrap()
    }

    #[test]
    fn mixed_scalars_roundtrip() {
        let schema = Schema::new(vec![
            Field::new("a", WireKind::U8),
            Field::new("b", WireKind::I16),
            Field::new("c", WireKind::U32),
            Field::new("d", WireKind::F64),
            Field::new("e", WireKind::I64),
        ]);
        let values = vec![
            Value::U8(200),
            Value::I16(-12345),
            Value::U32(0xDEADBEEF),
            Value::F64(-2.5),
            Value::I64(i64::MIN),
        ];
        assert_eq!(roundtrip(&schema, &values), values);
    }

    #[test]
    fn bool_runs_roundtrip_across_interruptions() {
        let schema = Schema::new(vec![
            Field::new("a", WireKind::Bool),
            Field::new("b", WireKind::Bool),
            Field::new("x", WireKind::U16),
            Field::new("c", WireKind::Bool),
            Field::new("d", WireKind::Bool),
        ]);
        let values = vec![
            Value::Bool(true),
            Value::Bool(false),
            Value::U16(7),
            Value::Bool(false),
            Value::Bool(true),
        ];
        assert_eq!(roundtrip(&schema, &values), values);
    }

    #[test]
    fn strings_and_sequences_roundtrip() {
        let schema = Schema::new(vec![
            Field::new("name", WireKind::Str),
            Field::new("data", WireKind::Seq(Box::new(WireKind::I32))),
            Field::new("note", WireKind::Str),
        ]);
        let values = vec![
            Value::Str("blueberry".to_string()),
            Value::Seq(vec![Value::I32(-1), Value::I32(2)]),
            Value::Str(String::new()),
        ];
        assert_eq!(roundtrip(&schema, &values), values);
    }

    #[test]
    fn truncated_head_is_reported() {
        let schema = Schema::new(vec![Field::new("id", WireKind::U32)]);
        let err = Deserializer::new(&[0x01, 0x02])
            .deserialize_record(&schema)
            .unwrap_err();
        assert!(matches!(err, BlueberryError::NotEnoughBytes { .. }));
    }

    #[test]
    fn descriptor_past_the_end_is_reported() {
        let schema = Schema::new(vec![Field::new("name", WireKind::Str)]);
        // A descriptor pointing at offset 0x40 of a 4-byte buffer.
        let err = Deserializer::new(&[0x40, 0x00, 0x00, 0x00])
            .deserialize_record(&schema)
            .unwrap_err();
        assert!(matches!(err, BlueberryError::NotEnoughBytes { .. }));
    }

    #[test]
    fn block_with_zero_count_reads_as_empty() {
        let schema = Schema::new(vec![Field::new(
            "items",
            WireKind::Seq(Box::new(WireKind::U8)),
        )]);
        // Descriptor at 0 points to a count-0 block at offset 4.
        let bytes = [0x04, 0x00, 0x01, 0x00, 0x00, 0x00, 0x00, 0x00];
        let values = Deserializer::new(&bytes).deserialize_record(&schema).unwrap();
        assert_eq!(values, vec![Value::Seq(Vec::new())]);
    }

    #[test]
    fn invalid_utf8_is_a_schema_error() {
        let schema = Schema::new(vec![Field::new("name", WireKind::Str)]);
        let mut bytes = vec![0x04, 0x00, 0x00, 0x00]; // descriptor + pad
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&[0xFF, 0, 0, 0]);
        let err = Deserializer::new(&bytes)
            .deserialize_record(&schema)
            .unwrap_err();
        match err {
            BlueberryError::InvalidStringBytes { name, .. } => assert_eq!(name, "name"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn blocks_past_the_message_boundary_are_rejected() {
        let schema = Schema::new(vec![Field::new("name", WireKind::Str)]);
        // Message claims 12 bytes; the block sits at offset 16, past it.
        let mut bytes = vec![0u8; 8];
        bytes.extend_from_slice(&[0x10, 0x00, 0x00, 0x00]);
        bytes.extend_from_slice(&4u32.to_le_bytes());
        bytes.extend_from_slice(b"peek");
        let err = Deserializer::with_message_context(&bytes, 8, 12)
            .deserialize_record(&schema)
            .unwrap_err();
        assert!(matches!(err, BlueberryError::NotEnoughBytes { .. }));
    }
}
