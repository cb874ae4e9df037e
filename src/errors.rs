use thiserror::Error;

/// Crate errors
#[derive(Error, Debug)]
pub enum BlueberryError {
    // FRAMING ERRORS
    #[error("Not enough bytes in the input. Expected {expected:?}, found {found:?}.")]
    NotEnoughBytes { expected: usize, found: usize },

    #[error("Packet does not start with the \"Blue\" magic. Found {found:?}.")]
    BadMagic { found: [u8; 4] },

    #[error("Packet CRC mismatch. Header says {expected:#06X}, computed {computed:#06X}.")]
    CrcMismatch { expected: u16, computed: u16 },

    #[error(
        "Message {index} extends past the packet end. It claims {needed} bytes, {available} remain."
    )]
    MessageOutOfBounds {
        index: usize,
        needed: usize,
        available: usize,
    },

    #[error("Message body of {bytes} bytes exceeds what a 16-bit word count can express.")]
    MessageTooLong { bytes: usize },

    // SCHEMA AND VALUE ERRORS
    #[error("Schema lists {expected} fields, the record value carries {found}.")]
    FieldCountMismatch { expected: usize, found: usize },

    #[error("Field {name:?} is declared as {expected}, its value is {found}.")]
    ValueKindMismatch {
        name: String,
        expected: String,
        found: String,
    },

    #[error("Expected a {expected} value, found {found}.")]
    UnexpectedValue {
        expected: &'static str,
        found: String,
    },

    #[error("Ran out of field values while rebuilding a record.")]
    MissingFieldValue,

    #[error(
        "Field {name:?}: elements of kind {kind} need their own data blocks, \
         which blocks cannot nest."
    )]
    UnsupportedElementKind { name: String, kind: String },

    #[error("Field {name:?}: string bytes are not valid UTF-8.")]
    InvalidStringBytes {
        name: String,
        source: std::str::Utf8Error,
    },

    #[error("Record has {count} fields, more than a message header can number.")]
    TooManyFields { count: usize },

    // LAYOUT ERRORS
    #[error("{what} {value} at head offset {at} does not fit in a 16-bit descriptor slot.")]
    DescriptorOverflow {
        what: &'static str,
        at: usize,
        value: usize,
    },
}
