//! ## Record encoding
//!
//! An encoded record occupies two regions. The *head* holds one slot per
//! field in declaration order: scalars in place, aligned to `min(size, 4)`,
//! and a 16-bit descriptor for every string or sequence. The *data blocks*
//! follow the head, one 4-byte aligned block per non-empty variable-length
//! field, in first-encounter order:
//!
//! ```text
//! +--------------------------+--------------+--------------+
//! |           head           |   block 0    |   block 1    |
//! | u32 | off0 | off1 | bool | u32 count .. | u32 count .. |
//! +--------------------------+--------------+--------------+
//!          |      |             ^                  ^
//!          +------|-------------+                  |
//!                 +---------------------------------+
//! ```
//!
//! Descriptor offsets are measured from the start of the enclosing message,
//! so the block positions are only known once the head is complete. The
//! writer emits zero placeholders, queues a fixup per block, and resolves
//! all offsets in a single finalization pass.
//!
//! Consecutive booleans share head bytes at bit granularity, LSB first. Any
//! non-bool write ends the run; the next boolean starts a fresh byte.

use crate::{
    errors::BlueberryError,
    pad_to_word,
    schema::{Field, Schema, Value, WireKind},
    Result, WORD,
};

/// Bool run state. Head writes of consecutive booleans revisit the shared
/// byte until all eight bits are spent or a non-bool field flushes the run.
#[derive(Debug, Default)]
struct BitPacker {
    /// Head offset of the byte the current run lives in, if one is active.
    byte_offset: Option<usize>,
    /// Next bit to fill in the shared byte.
    bit_index: u8,
}

impl BitPacker {
    fn flush(&mut self) {
        self.byte_offset = None;
        self.bit_index = 0;
    }
}

/// A deferred descriptor patch: the `u16` at `head_offset` receives the
/// final absolute offset of block `block_index`.
#[derive(Debug)]
struct Fixup {
    head_offset: usize,
    block_index: usize,
}

/// Writes record values into a head buffer plus side data blocks, then
/// resolves descriptor offsets on [`finalize`](Serializer::finalize).
///
/// A single instance encodes a single record; it is not meant to be reused
/// or shared. The head buffer, bool run state, block list and fixup list
/// form one logical unit.
#[derive(Debug, Default)]
pub struct Serializer {
    head: Vec<u8>,
    blocks: Vec<Vec<u8>>,
    fixups: Vec<Fixup>,
    bools: BitPacker,
    field_count: usize,
    base_offset: usize,
}

impl Serializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// An encoder whose descriptor offsets are measured `base_offset` bytes
    /// before the head, e.g. 8 when the record becomes a message body.
    pub fn with_base_offset(base_offset: usize) -> Self {
        Self {
            base_offset,
            ..Self::default()
        }
    }

    /// Number of top-level fields written so far; feeds the message
    /// header's `max_ordinal`.
    pub fn field_count(&self) -> usize {
        self.field_count
    }

    /// Encode all fields of a record in schema order.
    pub fn serialize_record(&mut self, schema: &Schema, values: &[Value]) -> Result<()> {
        if schema.fields().len() != values.len() {
            return Err(BlueberryError::FieldCountMismatch {
                expected: schema.fields().len(),
                found: values.len(),
            });
        }
        for (field, value) in schema.fields().iter().zip(values) {
            self.field_count += 1;
            self.write_field(field, value)?;
        }
        Ok(())
    }

    /// Pad the head so that blocks land on word boundaries, resolve every
    /// descriptor fixup, and append the blocks. Consumes the encoder.
    ///
    /// A record without variable-length fields keeps its natural head
    /// length; only a head followed by blocks is padded to a word.
    pub fn finalize(mut self) -> Result<Vec<u8>> {
        self.bools.flush();

        if self.blocks.is_empty() {
            return Ok(self.head);
        }

        self.head.resize(pad_to_word(self.head.len()), 0);

        let mut next_offset = self.base_offset + self.head.len();
        let mut offsets = Vec::with_capacity(self.blocks.len());
        for block in &self.blocks {
            offsets.push(next_offset);
            next_offset += block.len();
        }

        for fixup in &self.fixups {
            let resolved = offsets[fixup.block_index];
            if resolved > usize::from(u16::MAX) {
                return Err(BlueberryError::DescriptorOverflow {
                    what: "data block offset",
                    at: fixup.head_offset,
                    value: resolved,
                });
            }
            self.head[fixup.head_offset..fixup.head_offset + 2]
                .copy_from_slice(&(resolved as u16).to_le_bytes());
        }

        for block in &self.blocks {
            self.head.extend_from_slice(block);
        }
        Ok(self.head)
    }

    fn write_field(&mut self, field: &Field, value: &Value) -> Result<()> {
        use WireKind::*;
        match (&field.kind, value) {
            (U8, Value::U8(v)) => self.write_scalar(&v.to_le_bytes()),
            (I8, Value::I8(v)) => self.write_scalar(&v.to_le_bytes()),
            (U16, Value::U16(v)) => self.write_scalar(&v.to_le_bytes()),
            (I16, Value::I16(v)) => self.write_scalar(&v.to_le_bytes()),
            (U32, Value::U32(v)) => self.write_scalar(&v.to_le_bytes()),
            (I32, Value::I32(v)) => self.write_scalar(&v.to_le_bytes()),
            (U64, Value::U64(v)) => self.write_scalar(&v.to_le_bytes()),
            (I64, Value::I64(v)) => self.write_scalar(&v.to_le_bytes()),
            (F32, Value::F32(v)) => self.write_scalar(&v.to_le_bytes()),
            (F64, Value::F64(v)) => self.write_scalar(&v.to_le_bytes()),
            (Bool, Value::Bool(v)) => self.write_bool(*v),
            (Str, Value::Str(s)) => self.write_string(s),
            (Seq(elem_kind), Value::Seq(items)) => self.write_sequence(field, elem_kind, items)?,
            (Record(sub_schema), Value::Record(sub_values)) => {
                // Nested records are inlined: each sub-field lands in the
                // head under the ordinary alignment and bool run rules.
                if sub_schema.fields().len() != sub_values.len() {
                    return Err(BlueberryError::FieldCountMismatch {
                        expected: sub_schema.fields().len(),
                        found: sub_values.len(),
                    });
                }
                for (sub_field, sub_value) in sub_schema.fields().iter().zip(sub_values) {
                    self.write_field(sub_field, sub_value)?;
                }
            }
            (kind, value) => {
                return Err(BlueberryError::ValueKindMismatch {
                    name: field.name.to_string(),
                    expected: kind.to_string(),
                    found: value.kind_name().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Write a little-endian scalar, aligning to `min(size, 4)` first.
    fn write_scalar(&mut self, bytes: &[u8]) {
        self.bools.flush();
        self.align_to(bytes.len());
        self.head.extend_from_slice(bytes);
    }

    fn align_to(&mut self, size: usize) {
        if size <= 1 {
            return;
        }
        let align = size.min(WORD);
        let rem = self.head.len() % align;
        if rem != 0 {
            self.head.resize(self.head.len() + align - rem, 0);
        }
    }

    fn write_bool(&mut self, v: bool) {
        match self.bools.byte_offset {
            Some(offset) => {
                if v {
                    self.head[offset] |= 1 << self.bools.bit_index;
                }
                self.bools.bit_index += 1;
                if self.bools.bit_index == 8 {
                    self.bools.flush();
                }
            }
            None => {
                self.bools.byte_offset = Some(self.head.len());
                self.bools.bit_index = 1;
                self.head.push(v as u8);
            }
        }
    }

    fn write_string(&mut self, s: &str) {
        self.bools.flush();
        self.align_to(2);
        let head_offset = self.head.len();
        self.head.extend_from_slice(&[0, 0]);

        // Empty strings still get a block recording a zero length.
        let mut block = Vec::with_capacity(WORD + s.len());
        block.extend_from_slice(&(s.len() as u32).to_le_bytes());
        block.extend_from_slice(s.as_bytes());
        self.push_block(head_offset, block);
    }

    fn write_sequence(
        &mut self,
        field: &Field,
        elem_kind: &WireKind,
        items: &[Value],
    ) -> Result<()> {
        self.bools.flush();
        self.align_to(2);
        let head_offset = self.head.len();
        self.head.extend_from_slice(&[0; 4]);

        // Empty sequences keep the all-zero descriptor and skip the block.
        if items.is_empty() {
            return Ok(());
        }

        let mut block = Vec::new();
        block.extend_from_slice(&(items.len() as u32).to_le_bytes());
        let mut first_elem_size = 0;
        for (i, item) in items.iter().enumerate() {
            let start = block.len();
            write_element(&mut block, field, elem_kind, item)?;
            if i == 0 {
                first_elem_size = block.len() - start;
            }
        }

        if first_elem_size > usize::from(u16::MAX) {
            return Err(BlueberryError::DescriptorOverflow {
                what: "element byte size",
                at: head_offset + 2,
                value: first_elem_size,
            });
        }
        self.head[head_offset + 2..head_offset + 4]
            .copy_from_slice(&(first_elem_size as u16).to_le_bytes());

        self.push_block(head_offset, block);
        Ok(())
    }

    /// Pad a finished block to a word multiple and queue it together with
    /// the descriptor fixup at `head_offset`.
    fn push_block(&mut self, head_offset: usize, mut block: Vec<u8>) {
        block.resize(pad_to_word(block.len()), 0);
        self.fixups.push(Fixup {
            head_offset,
            block_index: self.blocks.len(),
        });
        self.blocks.push(block);
    }
}

/// Encode a single element into a data block. Elements are tightly packed:
/// no alignment padding, and booleans take a full byte instead of sharing
/// bits. `field` only feeds diagnostics.
fn write_element(block: &mut Vec<u8>, field: &Field, kind: &WireKind, value: &Value) -> Result<()> {
    use WireKind::*;
    match (kind, value) {
        (U8, Value::U8(v)) => block.extend_from_slice(&v.to_le_bytes()),
        (I8, Value::I8(v)) => block.extend_from_slice(&v.to_le_bytes()),
        (U16, Value::U16(v)) => block.extend_from_slice(&v.to_le_bytes()),
        (I16, Value::I16(v)) => block.extend_from_slice(&v.to_le_bytes()),
        (U32, Value::U32(v)) => block.extend_from_slice(&v.to_le_bytes()),
        (I32, Value::I32(v)) => block.extend_from_slice(&v.to_le_bytes()),
        (U64, Value::U64(v)) => block.extend_from_slice(&v.to_le_bytes()),
        (I64, Value::I64(v)) => block.extend_from_slice(&v.to_le_bytes()),
        (F32, Value::F32(v)) => block.extend_from_slice(&v.to_le_bytes()),
        (F64, Value::F64(v)) => block.extend_from_slice(&v.to_le_bytes()),
        (Bool, Value::Bool(v)) => block.push(*v as u8),
        (Record(sub_schema), Value::Record(sub_values)) => {
            if sub_schema.fields().len() != sub_values.len() {
                return Err(BlueberryError::FieldCountMismatch {
                    expected: sub_schema.fields().len(),
                    found: sub_values.len(),
                });
            }
            for (sub_field, sub_value) in sub_schema.fields().iter().zip(sub_values) {
                write_element(block, sub_field, &sub_field.kind, sub_value)?;
            }
        }
        (Str, _) | (Seq(_), _) => {
            return Err(BlueberryError::UnsupportedElementKind {
                name: field.name.to_string(),
                kind: kind.to_string(),
            });
        }
        (kind, value) => {
            return Err(BlueberryError::ValueKindMismatch {
                name: field.name.to_string(),
                expected: kind.to_string(),
                found: value.kind_name().to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Field, Schema, Value, WireKind};

    fn encode(schema: &Schema, values: &[Value]) -> Vec<u8> {
        let mut ser = Serializer::new();
        ser.serialize_record(schema, values).unwrap();
        ser.finalize().unwrap()
    }

    #[test]
    fn scalars_align_to_their_size() {
        let schema = Schema::new(vec![
            Field::new("byte", WireKind::U8),
            Field::new("short", WireKind::U16),
            Field::new("word", WireKind::U32),
        ]);
        let bytes = encode(
            &schema,
            &[Value::U8(0xFF), Value::U16(0x1234), Value::U32(0xDEADBEEF)],
        );
        assert_eq!(
            bytes,
            [0xFF, 0x00, 0x34, 0x12, 0xEF, 0xBE, 0xAD, 0xDE]
        );
    }

    #[test]
    fn wide_scalars_align_to_a_word_only() {
        let schema = Schema::new(vec![
            Field::new("flag", WireKind::U8),
            Field::new("wide", WireKind::U64),
        ]);
        let bytes = encode(&schema, &[Value::U8(1), Value::U64(2)]);
        // u64 aligns to 4, not 8.
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[4..], &2u64.to_le_bytes());
    }

    #[test]
    fn eight_bools_share_one_byte() {
        let schema = Schema::new(
            (0..8)
                .map(|i| Field::new(&format!("b{}", i), WireKind::Bool))
                .collect(),
        );
        let values: Vec<Value> = [true, false, true, false, true, true, false, true]
            .iter()
            .map(|&b| Value::Bool(b))
            .collect();
        assert_eq!(encode(&schema, &values), [0xB5]);
    }

    #[test]
    fn ninth_bool_starts_a_second_byte() {
        let schema = Schema::new(
            (0..9)
                .map(|i| Field::new(&format!("b{}", i), WireKind::Bool))
                .collect(),
        );
        let values = vec![Value::Bool(true); 9];
        assert_eq!(encode(&schema, &values), [0xFF, 0x01]);
    }

    #[test]
    fn non_bool_field_ends_the_run() {
        let schema = Schema::new(vec![
            Field::new("a", WireKind::Bool),
            Field::new("b", WireKind::Bool),
            Field::new("c", WireKind::Bool),
            Field::new("x", WireKind::U16),
            Field::new("d", WireKind::Bool),
        ]);
        let bytes = encode(
            &schema,
            &[
                Value::Bool(true),
                Value::Bool(false),
                Value::Bool(true),
                Value::U16(0x1234),
                Value::Bool(true),
            ],
        );
        // Pack byte, alignment padding, the u16, then a fresh bool byte.
        assert_eq!(bytes, [0x05, 0x00, 0x34, 0x12, 0x01]);
    }

    #[test]
    fn string_block_is_padded_and_referenced() {
        let schema = Schema::new(vec![Field::new("name", WireKind::Str)]);
        let bytes = encode(&schema, &[Value::Str("ab".to_string())]);

        // Head: u16 descriptor padded to a word; block: u32 len + bytes,
        // padded to a word. Offsets are relative to the record start.
        assert_eq!(bytes.len(), 4 + 8);
        assert_eq!(&bytes[..2], &4u16.to_le_bytes());
        assert_eq!(&bytes[4..8], &2u32.to_le_bytes());
        assert_eq!(&bytes[8..10], b"ab");
        assert_eq!(&bytes[10..], &[0, 0]);
    }

    #[test]
    fn empty_string_still_gets_a_block() {
        let schema = Schema::new(vec![Field::new("name", WireKind::Str)]);
        let bytes = encode(&schema, &[Value::Str(String::new())]);
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[..2], &4u16.to_le_bytes());
        assert_eq!(&bytes[4..8], &0u32.to_le_bytes());
    }

    #[test]
    fn empty_sequence_keeps_the_zero_descriptor() {
        let schema = Schema::new(vec![
            Field::new("id", WireKind::U8),
            Field::new("items", WireKind::Seq(Box::new(WireKind::U32))),
        ]);
        let bytes = encode(&schema, &[Value::U8(7), Value::Seq(Vec::new())]);
        // No block follows, so the head is not even word-padded.
        assert_eq!(bytes, [7, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn sequence_descriptor_records_first_element_size() {
        let schema = Schema::new(vec![Field::new(
            "readings",
            WireKind::Seq(Box::new(WireKind::U16)),
        )]);
        let bytes = encode(
            &schema,
            &[Value::Seq(vec![Value::U16(0x3FF), Value::U16(0x7FF)])],
        );

        assert_eq!(&bytes[0..2], &4u16.to_le_bytes()); // offset
        assert_eq!(&bytes[2..4], &2u16.to_le_bytes()); // element size
        assert_eq!(&bytes[4..8], &2u32.to_le_bytes()); // count
        assert_eq!(&bytes[8..12], &[0xFF, 0x03, 0xFF, 0x07]);
    }

    #[test]
    fn block_elements_are_packed_without_alignment() {
        let point = Schema::new(vec![
            Field::new("tag", WireKind::U8),
            Field::new("x", WireKind::U16),
            Field::new("ok", WireKind::Bool),
        ]);
        let schema = Schema::new(vec![Field::new(
            "points",
            WireKind::Seq(Box::new(WireKind::Record(point))),
        )]);

        let elem = |tag, x, ok| Value::Record(vec![Value::U8(tag), Value::U16(x), Value::Bool(ok)]);
        let bytes = encode(&schema, &[Value::Seq(vec![elem(1, 0x0201, true)])]);

        // 4-byte descriptor, u32 count, then a 4-byte packed element: the
        // u16 is not aligned and the bool takes a whole byte.
        assert_eq!(&bytes[2..4], &4u16.to_le_bytes());
        assert_eq!(&bytes[4..8], &1u32.to_le_bytes());
        assert_eq!(&bytes[8..12], &[1, 0x01, 0x02, 1]);
    }

    #[test]
    fn value_of_the_wrong_kind_is_diagnosed() {
        let schema = Schema::new(vec![Field::new("id", WireKind::U32)]);
        let mut ser = Serializer::new();
        let err = ser
            .serialize_record(&schema, &[Value::Bool(true)])
            .unwrap_err();
        match err {
            BlueberryError::ValueKindMismatch { name, .. } => assert_eq!(name, "id"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn nested_strings_in_sequences_are_refused() {
        let schema = Schema::new(vec![Field::new(
            "names",
            WireKind::Seq(Box::new(WireKind::Str)),
        )]);
        let mut ser = Serializer::new();
        let err = ser
            .serialize_record(&schema, &[Value::Seq(vec![Value::Str("x".to_string())])])
            .unwrap_err();
        assert!(matches!(
            err,
            BlueberryError::UnsupportedElementKind { .. }
        ));
    }
}
