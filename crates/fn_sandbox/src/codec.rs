//! Fixed-width result encoding.
//!
//! Integers become 32-byte big-endian words: unsigned values left-padded
//! with zeros, signed values in two's complement. Strings pass through as
//! raw UTF-8.

use crate::error::CodecError;
use num_bigint::{BigInt, Sign};
use num_traits::{FromPrimitive, One};

pub const WORD_BYTES: usize = 32;

/// A value handed to one of the encoders. Scripts can pass anything, so
/// non-numeric and non-string inputs are representable and rejected.
#[derive(Debug, Clone, PartialEq)]
pub enum CodecInput {
    Number(f64),
    BigInt(BigInt),
    String(String),
    /// Any other script value, by type name.
    Other(&'static str),
}

impl From<f64> for CodecInput {
    fn from(v: f64) -> Self {
        CodecInput::Number(v)
    }
}

impl From<i64> for CodecInput {
    fn from(v: i64) -> Self {
        CodecInput::BigInt(v.into())
    }
}

impl From<u64> for CodecInput {
    fn from(v: u64) -> Self {
        CodecInput::BigInt(v.into())
    }
}

impl From<BigInt> for CodecInput {
    fn from(v: BigInt) -> Self {
        CodecInput::BigInt(v)
    }
}

impl From<&str> for CodecInput {
    fn from(v: &str) -> Self {
        CodecInput::String(v.to_string())
    }
}

fn two_pow_256() -> BigInt {
    BigInt::one() << 256u32
}

fn max_uint256() -> BigInt {
    two_pow_256() - 1
}

fn max_int256() -> BigInt {
    (BigInt::one() << 255u32) - 1
}

fn min_int256() -> BigInt {
    -(BigInt::one() << 255u32)
}

fn to_integer(input: &CodecInput, function: &'static str) -> Result<BigInt, CodecError> {
    let invalid = CodecError::InvalidInput { function };
    match input {
        CodecInput::Number(n) if n.is_finite() && n.fract() == 0.0 => {
            BigInt::from_f64(*n).ok_or(invalid)
        }
        CodecInput::BigInt(b) => Ok(b.clone()),
        _ => Err(invalid),
    }
}

fn left_pad(magnitude: &[u8]) -> [u8; WORD_BYTES] {
    let mut word = [0u8; WORD_BYTES];
    let tail = &magnitude[magnitude.len().saturating_sub(WORD_BYTES)..];
    word[WORD_BYTES - tail.len()..].copy_from_slice(tail);
    word
}

/// `encodeUint256`: accepts integers in `0..=2^256-1`.
pub fn encode_unsigned_int(input: &CodecInput) -> Result<[u8; WORD_BYTES], CodecError> {
    let v = to_integer(input, "encodeUint256")?;
    if v.sign() == Sign::Minus || v > max_uint256() {
        return Err(CodecError::InvalidInput {
            function: "encodeUint256",
        });
    }
    Ok(left_pad(&v.to_bytes_be().1))
}

/// `encodeInt256`: accepts integers in `-2^255..=2^255-1`.
pub fn encode_signed_int(input: &CodecInput) -> Result<[u8; WORD_BYTES], CodecError> {
    let v = to_integer(input, "encodeInt256")?;
    if v < min_int256() || v > max_int256() {
        return Err(CodecError::InvalidInput {
            function: "encodeInt256",
        });
    }
    if v.sign() == Sign::Minus {
        let wrapped = two_pow_256() + v;
        Ok(left_pad(&wrapped.to_bytes_be().1))
    } else {
        Ok(left_pad(&v.to_bytes_be().1))
    }
}

/// `encodeString`: raw UTF-8, no length prefix or padding.
pub fn encode_string(input: &CodecInput) -> Result<Vec<u8>, CodecError> {
    match input {
        CodecInput::String(s) => Ok(s.as_bytes().to_vec()),
        _ => Err(CodecError::InvalidInput {
            function: "encodeString",
        }),
    }
}

pub fn decode_unsigned_int(word: &[u8]) -> BigInt {
    BigInt::from_bytes_be(Sign::Plus, word)
}

pub fn decode_signed_int(word: &[u8]) -> BigInt {
    let v = decode_unsigned_int(word);
    if word.len() == WORD_BYTES && word[0] & 0x80 != 0 {
        v - two_pow_256()
    } else {
        v
    }
}
