//! Quantity conversion between the wire (hex) and domain (decimal) forms.
//!
//! Every numeric field crossing the RPC boundary is a `0x`-prefixed hex string
//! of no fixed width. Everything handed back to callers is base-10.

use alloy::primitives::U256;
use num_bigint::BigUint;

use crate::blockchain::types::{BlockchainError, BlockchainResult};

/// An integer literal split into its radix and digits.
struct Literal<'a> {
    input: &'a str,
    radix: u32,
    digits: &'a str,
}

impl<'a> Literal<'a> {
    /// Split a literal whose base is chosen by its prefix.
    ///
    /// `0x`/`0X` selects hex, `0b` binary, `0o` octal, anything else decimal.
    fn prefixed(input: &'a str) -> BlockchainResult<Self> {
        let trimmed = input.trim();
        let (negative, unsigned) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            _ => (false, trimmed),
        };

        let (radix, digits) = if let Some(rest) = strip_prefix_ci(unsigned, "0x") {
            (16, rest)
        } else if let Some(rest) = strip_prefix_ci(unsigned, "0b") {
            (2, rest)
        } else if let Some(rest) = strip_prefix_ci(unsigned, "0o") {
            (8, rest)
        } else {
            (10, unsigned)
        };

        let literal = Self::checked(input, radix, digits)?;
        // "-0" is still zero.
        if negative && !literal.digits.bytes().all(|b| b == b'0') {
            return Err(BlockchainError::InvalidNumber {
                input: input.to_string(),
                reason: "quantity must not be negative",
            });
        }
        Ok(literal)
    }

    /// Split a hex literal with or without the `0x` prefix.
    fn hex(input: &'a str) -> BlockchainResult<Self> {
        let trimmed = input.trim();
        if trimmed.starts_with('-') {
            return Err(BlockchainError::InvalidNumber {
                input: input.to_string(),
                reason: "quantity must not be negative",
            });
        }
        let digits = strip_prefix_ci(trimmed, "0x").unwrap_or(trimmed);
        Self::checked(input, 16, digits)
    }

    fn checked(input: &'a str, radix: u32, digits: &'a str) -> BlockchainResult<Self> {
        if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
            return Err(BlockchainError::InvalidNumber {
                input: input.to_string(),
                reason: "not a valid integer literal",
            });
        }
        Ok(Self { input, radix, digits })
    }

    /// Unbounded value.
    fn to_big(&self) -> BlockchainResult<BigUint> {
        BigUint::parse_bytes(self.digits.as_bytes(), self.radix).ok_or_else(|| {
            BlockchainError::InvalidNumber {
                input: self.input.to_string(),
                reason: "not a valid integer literal",
            }
        })
    }

    /// Value as an EVM word.
    fn to_u256(&self) -> BlockchainResult<U256> {
        U256::from_str_radix(self.digits, self.radix as u64).map_err(|_| {
            BlockchainError::InvalidNumber {
                input: self.input.to_string(),
                reason: "value does not fit in 256 bits",
            }
        })
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Convert a decimal (or already prefixed) literal into `0x`-prefixed lowercase hex.
///
/// Width is unbounded.
pub fn to_wire_hex(input: &str) -> BlockchainResult<String> {
    let value = Literal::prefixed(input)?.to_big()?;
    Ok(format!("0x{}", value.to_str_radix(16)))
}

/// Convert a `0x`-prefixed or bare hex literal into a base-10 string.
pub fn to_domain_decimal(input: &str) -> BlockchainResult<String> {
    let value = Literal::hex(input)?.to_big()?;
    Ok(value.to_str_radix(10))
}

/// Parse a wire-form quantity (hex, prefixed or bare).
pub fn parse_quantity(input: &str) -> BlockchainResult<U256> {
    Literal::hex(input)?.to_u256()
}

/// Parse a wire-form quantity that must fit in 64 bits.
pub fn quantity_to_u64(input: &str) -> BlockchainResult<u64> {
    let value = parse_quantity(input)?;
    u64::try_from(value).map_err(|_| BlockchainError::InvalidNumber {
        input: input.to_string(),
        reason: "value does not fit in 64 bits",
    })
}

/// Parse a wire-form quantity that must fit in 128 bits.
pub fn quantity_to_u128(input: &str) -> BlockchainResult<u128> {
    let value = parse_quantity(input)?;
    u128::try_from(value).map_err(|_| BlockchainError::InvalidNumber {
        input: input.to_string(),
        reason: "value does not fit in 128 bits",
    })
}

/// Parse a caller-supplied amount. Empty means zero.
pub fn parse_amount(input: &str) -> BlockchainResult<U256> {
    if input.trim().is_empty() {
        return Ok(U256::ZERO);
    }
    Literal::prefixed(input)?.to_u256()
}
