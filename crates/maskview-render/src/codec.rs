//! Batched variable-length integer codecs for point and index streams.
//!
//! An encoding starts with a format tag byte. Values are then grouped into
//! batches; each batch is a header byte of width selectors followed by the
//! big-endian payload bytes of its values. Selectors are packed from the
//! most significant bit down, so a short final batch leaves the low header
//! bits zero.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Wire format of an [`EncodedBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// Batches of 8, one selector bit per value, 1 or 2 byte values.
    TwoState = 0,
    /// Batches of 4, two selector bits per value, 1 to 4 byte values.
    FourState = 1,
}

impl Format {
    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Format::TwoState),
            1 => Some(Format::FourState),
            _ => None,
        }
    }

    fn selector_bits(self) -> u32 {
        match self {
            Format::TwoState => 1,
            Format::FourState => 2,
        }
    }

    /// Values per header byte.
    pub fn batch_size(self) -> usize {
        (8 / self.selector_bits()) as usize
    }

    fn max_width(self) -> usize {
        match self {
            Format::TwoState => 2,
            Format::FourState => 4,
        }
    }

    /// Smallest payload width, in bytes, that can carry `value`.
    fn width_of(self, value: i64) -> Option<usize> {
        (1..=self.max_width()).find(|&width| fits(value, width))
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::TwoState => write!(f, "2-state"),
            Format::FourState => write!(f, "4-state"),
        }
    }
}

/// Range of a `width`-byte payload.
///
/// The lower bound is two above the two's complement minimum, so neither
/// `i8::MIN` nor `i8::MIN + 1` fit in one byte.
fn fits(value: i64, width: usize) -> bool {
    let limit = 1i64 << (8 * width - 1);
    value < limit && value > -(limit - 1)
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("value {value} is out of range for the {format} codec")]
pub struct EncodingRangeError {
    pub value: i64,
    pub format: Format,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("encoding is empty")]
    Empty,

    #[error("unknown format tag {0}")]
    UnknownFormat(u8),

    #[error("value at byte {offset} needs {width} bytes, {remaining} remain")]
    Truncated {
        offset: usize,
        width: usize,
        remaining: usize,
    },
}

/// Encoded bytes, starting with the format tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBuffer {
    format: Format,
    bytes: Vec<u8>,
}

impl EncodedBuffer {
    pub fn format(&self) -> Format {
        self.format
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Never true: the tag byte is always present.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Standard base64 with padding.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(&self.bytes)
    }
}

/// Encode `values` in `format`.
pub fn encode(values: &[i64], format: Format) -> Result<EncodedBuffer, EncodingRangeError> {
    let bits = format.selector_bits();
    let batch = format.batch_size();

    let mut bytes = Vec::with_capacity(1 + values.len() + values.len() / batch + 1);
    bytes.push(format.tag());

    for chunk in values.chunks(batch) {
        let mut header: u8 = 0;
        let mut payload: Vec<u8> = Vec::with_capacity(chunk.len() * format.max_width());
        for &value in chunk {
            let width = format
                .width_of(value)
                .ok_or(EncodingRangeError { value, format })?;
            header = (header << bits) | (width - 1) as u8;
            payload.extend_from_slice(&value.to_be_bytes()[8 - width..]);
        }
        header <<= bits * (batch - chunk.len()) as u32;
        bytes.push(header);
        bytes.extend_from_slice(&payload);
    }

    Ok(EncodedBuffer { format, bytes })
}

/// Decode a tagged encoding produced by [`encode`].
pub fn decode(bytes: &[u8]) -> Result<Vec<i64>, DecodeError> {
    let (&tag, mut rest) = bytes.split_first().ok_or(DecodeError::Empty)?;
    let format = Format::from_tag(tag).ok_or(DecodeError::UnknownFormat(tag))?;
    let bits = format.selector_bits();
    let mask = (1u8 << bits) - 1;

    let mut values = Vec::new();
    while let Some((&header, tail)) = rest.split_first() {
        rest = tail;
        for slot in 0..format.batch_size() {
            if rest.is_empty() {
                break;
            }
            let shift = 8 - bits * (slot as u32 + 1);
            let width = usize::from((header >> shift) & mask) + 1;
            if rest.len() < width {
                return Err(DecodeError::Truncated {
                    offset: bytes.len() - rest.len(),
                    width,
                    remaining: rest.len(),
                });
            }
            let (field, tail) = rest.split_at(width);
            values.push(read_signed(field));
            rest = tail;
        }
    }
    Ok(values)
}

/// Sign-extend a big-endian field.
fn read_signed(field: &[u8]) -> i64 {
    let mut value = i64::from(field[0] as i8);
    for &b in &field[1..] {
        value = (value << 8) | i64::from(b);
    }
    value
}
