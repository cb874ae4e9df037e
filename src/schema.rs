//! ## Wire schemas
//!
//! The codec is strictly schema-driven: it never inspects a Rust type, only
//! an ordered list of [`Field`]s annotated with [`WireKind`]s, together with
//! the [`Value`]s read from or written into a record. The [`WireRecord`]
//! trait is the typed front door tying a concrete struct to its hand-written
//! schema table; schema tables are usually held in `once_cell` statics so a
//! type carries exactly one.
//!
//! Numeric fields always name an explicit width. There is no default `int`
//! or `float` kind, so an under-annotated schema cannot silently change its
//! wire layout.

use crate::{errors::BlueberryError, FlexString, Result};

use serde::Serialize;
use std::convert::TryFrom;
use std::fmt::{self, Display, Formatter};

/// The closed set of wire kinds a field can carry.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum WireKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    Bool,
    Str,
    /// Variable-length sequence of a single element kind.
    Seq(Box<WireKind>),
    /// Nested record, inlined into the enclosing head.
    Record(Schema),
}

impl WireKind {
    /// Encoded byte size of a fixed-width scalar; `None` for kinds that
    /// occupy a descriptor slot or expand into several head slots.
    pub(crate) fn scalar_size(&self) -> Option<usize> {
        use WireKind::*;
        match self {
            U8 | I8 | Bool => Some(1),
            U16 | I16 => Some(2),
            U32 | I32 | F32 => Some(4),
            U64 | I64 | F64 => Some(8),
            Str | Seq(_) | Record(_) => None,
        }
    }

    /// Whether values of this kind can be packed into a data block. Strings
    /// and sequences need a block of their own, and blocks cannot nest.
    fn packable(&self) -> bool {
        use WireKind::*;
        match self {
            Str | Seq(_) => false,
            Record(schema) => schema.fields.iter().all(|f| f.kind.packable()),
            _ => true,
        }
    }
}

impl Display for WireKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        use WireKind::*;
        match self {
            U8 => write!(f, "u8"),
            I8 => write!(f, "i8"),
            U16 => write!(f, "u16"),
            I16 => write!(f, "i16"),
            U32 => write!(f, "u32"),
            I32 => write!(f, "i32"),
            U64 => write!(f, "u64"),
            I64 => write!(f, "i64"),
            F32 => write!(f, "f32"),
            F64 => write!(f, "f64"),
            Bool => write!(f, "bool"),
            Str => write!(f, "string"),
            Seq(elem) => write!(f, "seq<{}>", elem),
            Record(_) => write!(f, "record"),
        }
    }
}

/// A single named field of a record schema. The name only feeds diagnostics;
/// the wire layout depends on declaration order and kind alone.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Field {
    pub name: FlexString,
    pub kind: WireKind,
}

impl Field {
    pub fn new(name: &str, kind: WireKind) -> Self {
        Self {
            name: FlexString::from(name),
            kind,
        }
    }
}

/// An ordered field list describing one record layout.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Reject layouts the format cannot express: sequence elements that
    /// would need data blocks of their own (strings, sequences, records
    /// containing either).
    pub fn validate(&self) -> Result<()> {
        for field in &self.fields {
            match &field.kind {
                WireKind::Seq(elem) => {
                    if !elem.packable() {
                        return Err(BlueberryError::UnsupportedElementKind {
                            name: field.name.to_string(),
                            kind: elem.to_string(),
                        });
                    }
                }
                WireKind::Record(sub) => sub.validate()?,
                _ => {}
            }
        }
        Ok(())
    }
}

/// A runtime value for a single field, mirroring [`WireKind`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Str(String),
    Seq(Vec<Value>),
    Record(Vec<Value>),
}

impl Value {
    /// Short kind name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        use Value::*;
        match self {
            U8(_) => "u8",
            I8(_) => "i8",
            U16(_) => "u16",
            I16(_) => "i16",
            U32(_) => "u32",
            I32(_) => "i32",
            U64(_) => "u64",
            I64(_) => "i64",
            F32(_) => "f32",
            F64(_) => "f64",
            Bool(_) => "bool",
            Str(_) => "string",
            Seq(_) => "seq",
            Record(_) => "record",
        }
    }

    /// Unwrap a sequence value into its elements.
    pub fn into_seq(self) -> Result<Vec<Value>> {
        match self {
            Value::Seq(items) => Ok(items),
            other => Err(BlueberryError::UnexpectedValue {
                expected: "seq",
                found: other.kind_name().to_string(),
            }),
        }
    }

    /// Unwrap a nested record value into its field values.
    pub fn into_record(self) -> Result<Vec<Value>> {
        match self {
            Value::Record(values) => Ok(values),
            other => Err(BlueberryError::UnexpectedValue {
                expected: "record",
                found: other.kind_name().to_string(),
            }),
        }
    }

    /// Convert a sequence value element-wise, so `Vec<u16>` and friends can
    /// be pulled straight out of a decoded [`Value::Seq`].
    pub fn into_scalars<T>(self) -> Result<Vec<T>>
    where
        T: TryFrom<Value, Error = BlueberryError>,
    {
        self.into_seq()?.into_iter().map(T::try_from).collect()
    }
}

macro_rules! impl_try_from_value {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl TryFrom<Value> for $ty {
                type Error = BlueberryError;

                fn try_from(value: Value) -> std::result::Result<Self, Self::Error> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(BlueberryError::UnexpectedValue {
                            expected: stringify!($ty),
                            found: other.kind_name().to_string(),
                        }),
                    }
                }
            }
        )*
    };
}

impl_try_from_value! {
    U8 => u8,
    I8 => i8,
    U16 => u16,
    I16 => i16,
    U32 => u32,
    I32 => i32,
    U64 => u64,
    I64 => i64,
    F32 => f32,
    F64 => f64,
    Bool => bool,
    Str => String,
}

/// Implementors tie a concrete Rust type to a wire schema.
///
/// The codec reads and writes only `Value`s; an implementation supplies the
/// schema table plus the two conversions. `from_values` receives the values
/// in schema order and usually drains them front to back:
///
/// ```ignore
/// fn from_values(values: Vec<Value>) -> Result<Self> {
///     let mut values = values.into_iter();
///     let mut next = move || values.next().ok_or(BlueberryError::MissingFieldValue);
///     Ok(Self {
///         sensor_id: u32::try_from(next()?)?,
///         alert_high: bool::try_from(next()?)?,
///     })
/// }
/// ```
pub trait WireRecord: Sized {
    /// The ordered field list describing the wire layout.
    fn schema() -> &'static Schema;

    /// Field values in schema order.
    fn to_values(&self) -> Vec<Value>;

    /// Rebuild an instance from field values in schema order.
    fn from_values(values: Vec<Value>) -> Result<Self>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_sequences_pass_validation() {
        let schema = Schema::new(vec![
            Field::new("id", WireKind::U32),
            Field::new("readings", WireKind::Seq(Box::new(WireKind::U16))),
        ]);
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn record_sequences_pass_validation_when_packable() {
        let point = Schema::new(vec![
            Field::new("x", WireKind::F32),
            Field::new("y", WireKind::F32),
        ]);
        let schema = Schema::new(vec![Field::new(
            "path",
            WireKind::Seq(Box::new(WireKind::Record(point))),
        )]);
        assert!(schema.validate().is_ok());
    }

    #[test]
    fn nested_block_kinds_are_rejected() {
        let strings = Schema::new(vec![Field::new(
            "names",
            WireKind::Seq(Box::new(WireKind::Str)),
        )]);
        assert!(matches!(
            strings.validate(),
            Err(BlueberryError::UnsupportedElementKind { .. })
        ));

        let nested = Schema::new(vec![Field::new(
            "matrix",
            WireKind::Seq(Box::new(WireKind::Seq(Box::new(WireKind::U8)))),
        )]);
        assert!(nested.validate().is_err());

        // A record element is only packable while all its fields are.
        let labelled = Schema::new(vec![
            Field::new("label", WireKind::Str),
            Field::new("value", WireKind::U32),
        ]);
        let seq_of_labelled = Schema::new(vec![Field::new(
            "entries",
            WireKind::Seq(Box::new(WireKind::Record(labelled))),
        )]);
        assert!(seq_of_labelled.validate().is_err());
    }

    #[test]
    fn try_from_reports_kind_mismatch() {
        let err = u32::try_from(Value::Str("nope".to_string())).unwrap_err();
        match err {
            BlueberryError::UnexpectedValue { expected, found } => {
                assert_eq!(expected, "u32");
                assert_eq!(found, "string");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn scalar_vec_converts_element_wise() {
        let value = Value::Seq(vec![Value::U16(1), Value::U16(2)]);
        let v: Vec<u16> = value.into_scalars().unwrap();
        assert_eq!(v, vec![1, 2]);

        let mixed = Value::Seq(vec![Value::U16(1), Value::Bool(true)]);
        assert!(mixed.into_scalars::<u16>().is_err());
    }
}
