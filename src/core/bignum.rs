//! # BigNumber
//!
//! Immutable arbitrary-precision integer used by the SRP6 engine.
//!
//! Every operation returns a fresh value; there is no in-place mutation and no
//! shared backing storage between copies. Division and modular operations are
//! fallible instead of panicking on a zero or negative modulus.
//!
//! ## Conventions
//! - `modulo` and `mod_exp` always yield a representative in `[0, m)`
//! - Byte import treats the input as an unsigned magnitude
//! - Fixed-width export pads with zeros and refuses to truncate
//! - Hex and decimal output print the unsigned magnitude

use std::fmt;
use std::ops::{Add, Mul, Sub};

use num_bigint::{BigInt, Sign};
use num_integer::Integer;
use num_traits::{One, Signed, Zero};
use thiserror::Error;

/// Byte order for raw import/export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BigNumberError {
    #[error("invalid hex string: {0:?}")]
    InvalidHex(String),

    #[error("invalid decimal string: {0:?}")]
    InvalidDecimal(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("modulus must be positive")]
    InvalidModulus,

    #[error("exponent must not be negative")]
    NegativeExponent,

    #[error("value needs {needed} bytes but export width is {width}")]
    Overflow { needed: usize, width: usize },

    #[error("random source failure: {0}")]
    Entropy(String),

    #[error("empty sampling range")]
    EmptyRange,
}

/// Arbitrary-precision signed integer with value semantics.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BigNumber(BigInt);

impl BigNumber {
    pub fn zero() -> Self {
        Self(BigInt::zero())
    }

    pub fn one() -> Self {
        Self(BigInt::one())
    }

    /// Parse a hex string. Accepts an optional `-` sign and `0x` prefix.
    pub fn from_hex(s: &str) -> Result<Self, BigNumberError> {
        Self::parse_radix(s, 16).ok_or_else(|| BigNumberError::InvalidHex(s.to_string()))
    }

    /// Parse a base-10 string with an optional `-` sign.
    pub fn from_decimal(s: &str) -> Result<Self, BigNumberError> {
        Self::parse_radix(s, 10).ok_or_else(|| BigNumberError::InvalidDecimal(s.to_string()))
    }

    fn parse_radix(s: &str, radix: u32) -> Option<Self> {
        let trimmed = s.trim();
        let (negative, digits) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let digits = if radix == 16 {
            digits
                .strip_prefix("0x")
                .or_else(|| digits.strip_prefix("0X"))
                .unwrap_or(digits)
        } else {
            digits
        };
        if digits.is_empty() || digits.starts_with('+') || digits.starts_with('-') {
            return None;
        }
        let magnitude = BigInt::parse_bytes(digits.as_bytes(), radix)?;
        Some(Self(if negative { -magnitude } else { magnitude }))
    }

    /// Import raw bytes as an unsigned magnitude.
    pub fn from_bytes(bytes: &[u8], endian: Endian) -> Self {
        match endian {
            Endian::Little => Self(BigInt::from_bytes_le(Sign::Plus, bytes)),
            Endian::Big => Self(BigInt::from_bytes_be(Sign::Plus, bytes)),
        }
    }

    /// Uniform sample in `[low, high)` drawn from the OS CSPRNG.
    pub fn random_in_range(low: &Self, high: &Self) -> Result<Self, BigNumberError> {
        if high <= low {
            return Err(BigNumberError::EmptyRange);
        }
        let span = &high.0 - &low.0;
        let bits = span.bits();
        let byte_len = bits.div_ceil(8) as usize;
        let top_mask: u8 = match bits % 8 {
            0 => 0xFF,
            rem => (1u8 << rem) - 1,
        };

        let mut buf = vec![0u8; byte_len];
        loop {
            getrandom::fill(&mut buf).map_err(|e| BigNumberError::Entropy(e.to_string()))?;
            // rejection sampling keeps the distribution uniform
            buf[0] &= top_mask;
            let candidate = BigInt::from_bytes_be(Sign::Plus, &buf);
            if candidate < span {
                return Ok(Self(candidate + &low.0));
            }
        }
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_negative()
    }

    /// Truncating division.
    pub fn div(&self, divisor: &Self) -> Result<Self, BigNumberError> {
        if divisor.is_zero() {
            return Err(BigNumberError::DivisionByZero);
        }
        Ok(Self(&self.0 / &divisor.0))
    }

    /// Non-negative remainder in `[0, modulus)`.
    pub fn modulo(&self, modulus: &Self) -> Result<Self, BigNumberError> {
        if !modulus.0.is_positive() {
            return Err(BigNumberError::InvalidModulus);
        }
        Ok(Self(self.0.mod_floor(&modulus.0)))
    }

    /// `self ^ exponent mod modulus`, always in `[0, modulus)`.
    pub fn mod_exp(&self, exponent: &Self, modulus: &Self) -> Result<Self, BigNumberError> {
        if !modulus.0.is_positive() {
            return Err(BigNumberError::InvalidModulus);
        }
        if exponent.is_negative() {
            return Err(BigNumberError::NegativeExponent);
        }
        let base = self.0.mod_floor(&modulus.0);
        Ok(Self(base.modpow(&exponent.0, &modulus.0)))
    }

    /// Number of significant bits of the magnitude (0 for zero).
    pub fn num_bits(&self) -> usize {
        self.0.bits() as usize
    }

    /// Number of bytes needed to hold the magnitude (0 for zero).
    pub fn num_bytes(&self) -> usize {
        self.num_bits().div_ceil(8)
    }

    /// Export the magnitude into exactly `width` bytes, zero padded.
    pub fn to_bytes(&self, endian: Endian, width: usize) -> Result<Vec<u8>, BigNumberError> {
        let needed = self.num_bytes();
        if needed > width {
            return Err(BigNumberError::Overflow { needed, width });
        }
        let mut out = vec![0u8; width];
        if needed == 0 {
            return Ok(out);
        }
        match endian {
            Endian::Little => {
                let le = self.0.magnitude().to_bytes_le();
                out[..le.len()].copy_from_slice(&le);
            }
            Endian::Big => {
                let be = self.0.magnitude().to_bytes_be();
                out[width - be.len()..].copy_from_slice(&be);
            }
        }
        Ok(out)
    }

    /// Export the magnitude at its natural width (at least one byte).
    pub fn to_bytes_min(&self, endian: Endian) -> Vec<u8> {
        match endian {
            Endian::Little => self.0.magnitude().to_bytes_le(),
            Endian::Big => self.0.magnitude().to_bytes_be(),
        }
    }

    /// Uppercase hex of the magnitude, no prefix.
    pub fn to_hex(&self) -> String {
        self.0.magnitude().to_str_radix(16).to_uppercase()
    }

    /// Decimal of the magnitude.
    pub fn to_decimal(&self) -> String {
        self.0.magnitude().to_str_radix(10)
    }
}

macro_rules! impl_from_native {
    ($($t:ty),*) => {
        $(
            impl From<$t> for BigNumber {
                fn from(value: $t) -> Self {
                    Self(BigInt::from(value))
                }
            }
        )*
    };
}

impl_from_native!(u8, u16, u32, u64, i32, i64);

impl fmt::Display for BigNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_decimal())
    }
}

impl fmt::Debug for BigNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        write!(f, "BigNumber({sign}0x{})", self.to_hex())
    }
}

macro_rules! impl_binop {
    ($trait:ident, $method:ident, $op:tt) => {
        impl $trait<&BigNumber> for &BigNumber {
            type Output = BigNumber;

            fn $method(self, rhs: &BigNumber) -> BigNumber {
                BigNumber(&self.0 $op &rhs.0)
            }
        }

        impl $trait for BigNumber {
            type Output = BigNumber;

            fn $method(self, rhs: BigNumber) -> BigNumber {
                BigNumber(self.0 $op rhs.0)
            }
        }
    };
}

impl_binop!(Add, add, +);
impl_binop!(Sub, sub, -);
impl_binop!(Mul, mul, *);
