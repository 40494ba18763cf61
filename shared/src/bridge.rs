//! Binary and JSON helpers exposed to transform scripts
//!
//! Device protocols frame numbers as fixed-width unsigned integers:
//! ```text
//! numberToBinary(value, endian = "little", size = 32) -> size/8 bytes
//! binaryToNumber(bytes, endian = "little", size = 32) -> number
//! ```
//! Values that do not fit the width wrap modulo 2^size.
//!
//! Failures come in two flavours. Bad endian/size arguments and short input
//! to `binaryToNumber` are fatal and abort the script; a bad value handed to
//! `numberToBinary` or bad JSON handed to `fromJSON` is soft and is returned
//! to the script as an error pair. See [`BridgeError::is_fatal`].

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("little or big endian allowed, but given: {0}")]
    InvalidEndian(String),

    #[error("16, 32 or 64 size allowed, but given: {0}")]
    InvalidSize(i64),

    #[error("binary should have length at least: {needed}, but have: {actual}")]
    TooShort { needed: usize, actual: usize },

    #[error("number or string required")]
    UnsupportedInput,

    #[error("{0}")]
    InvalidNumber(String),

    #[error("{0}")]
    InvalidJson(String),
}

impl BridgeError {
    /// Whether the error should abort the calling script
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidEndian(_) | BridgeError::InvalidSize(_) | BridgeError::TooShort { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

impl Endian {
    /// Parse a script argument; absent means little endian
    pub fn parse(name: Option<&str>) -> Result<Self, BridgeError> {
        match name {
            None | Some("little") => Ok(Endian::Little),
            Some("big") => Ok(Endian::Big),
            Some(other) => Err(BridgeError::InvalidEndian(other.to_string())),
        }
    }
}

/// Integer width in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Width {
    W16,
    #[default]
    W32,
    W64,
}

impl Width {
    /// Parse a script argument; absent means 32 bits
    pub fn parse(size: Option<i64>) -> Result<Self, BridgeError> {
        match size {
            None | Some(32) => Ok(Width::W32),
            Some(16) => Ok(Width::W16),
            Some(64) => Ok(Width::W64),
            Some(other) => Err(BridgeError::InvalidSize(other)),
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            Width::W16 => 2,
            Width::W32 => 4,
            Width::W64 => 8,
        }
    }
}

/// Value accepted by [`number_to_binary`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NumberArg<'a> {
    Number(f64),
    /// Numeric text, parsed as a float
    Text(&'a str),
    Unsupported,
}

const TWO_POW_64: f64 = 18_446_744_073_709_551_616.0;

/// Truncate toward zero and reduce modulo 2^64
fn wrap_to_u64(num: f64) -> u64 {
    if !num.is_finite() {
        return 0;
    }
    let t = num.trunc();
    if t < 0.0 && t >= i64::MIN as f64 {
        t as i64 as u64
    } else if (0.0..TWO_POW_64).contains(&t) {
        t as u64
    } else {
        t.rem_euclid(TWO_POW_64) as u64
    }
}

/// Encode a number as a fixed-width unsigned integer
pub fn number_to_binary(
    input: NumberArg<'_>,
    endian: Option<&str>,
    size: Option<i64>,
) -> Result<Bytes, BridgeError> {
    let num = match input {
        NumberArg::Number(n) => n,
        NumberArg::Text(s) => s
            .parse::<f64>()
            .map_err(|e| BridgeError::InvalidNumber(format!("parsing {:?}: {}", s, e)))?,
        NumberArg::Unsupported => return Err(BridgeError::UnsupportedInput),
    };

    let endian = Endian::parse(endian)?;
    let width = Width::parse(size)?;
    let wide = wrap_to_u64(num);

    let mut buf = BytesMut::with_capacity(width.bytes());
    match (width, endian) {
        (Width::W16, Endian::Little) => buf.put_u16_le(wide as u16),
        (Width::W16, Endian::Big) => buf.put_u16(wide as u16),
        (Width::W32, Endian::Little) => buf.put_u32_le(wide as u32),
        (Width::W32, Endian::Big) => buf.put_u32(wide as u32),
        (Width::W64, Endian::Little) => buf.put_u64_le(wide),
        (Width::W64, Endian::Big) => buf.put_u64(wide),
    }

    Ok(buf.freeze())
}

/// Decode the leading `size/8` bytes as an unsigned integer
///
/// Trailing bytes beyond the width are ignored.
pub fn binary_to_number(
    data: &[u8],
    endian: Option<&str>,
    size: Option<i64>,
) -> Result<u64, BridgeError> {
    let endian = Endian::parse(endian)?;
    let width = Width::parse(size)?;

    let needed = width.bytes();
    if data.len() < needed {
        return Err(BridgeError::TooShort {
            needed,
            actual: data.len(),
        });
    }

    let mut buf = &data[..needed];
    let num = match (width, endian) {
        (Width::W16, Endian::Little) => buf.get_u16_le() as u64,
        (Width::W16, Endian::Big) => buf.get_u16() as u64,
        (Width::W32, Endian::Little) => buf.get_u32_le() as u64,
        (Width::W32, Endian::Big) => buf.get_u32() as u64,
        (Width::W64, Endian::Little) => buf.get_u64_le(),
        (Width::W64, Endian::Big) => buf.get_u64(),
    };

    Ok(num)
}

/// Parse JSON text into a dynamic value
pub fn from_json(text: &str) -> Result<Value, BridgeError> {
    serde_json::from_str(text).map_err(|e| BridgeError::InvalidJson(e.to_string()))
}
