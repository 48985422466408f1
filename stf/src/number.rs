// Copyright 2024 Oxide Computer Company

use num::bigint::BigUint;
use num::{ToPrimitive, Zero};
use std::fmt;

/// The base a numeric literal was written in.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum Radix {
    Binary,
    Octal,
    Decimal,
    Hex,
}

impl Radix {
    pub fn radix(&self) -> u32 {
        match self {
            Radix::Binary => 2,
            Radix::Octal => 8,
            Radix::Decimal => 10,
            Radix::Hex => 16,
        }
    }

    /// Number of bits each digit contributes. Decimal digits do not map onto
    /// a whole number of bits.
    pub fn bits_per_digit(&self) -> Option<usize> {
        match self {
            Radix::Binary => Some(1),
            Radix::Octal => Some(3),
            Radix::Decimal => None,
            Radix::Hex => Some(4),
        }
    }

    pub fn prefix(&self) -> &'static str {
        match self {
            Radix::Binary => "0b",
            Radix::Octal => "0o",
            Radix::Decimal => "",
            Radix::Hex => "0x",
        }
    }

    /// The all-ones digit used when synthesizing masks.
    fn full_digit(&self) -> char {
        match self {
            Radix::Binary => '1',
            Radix::Octal => '7',
            Radix::Decimal => '9',
            Radix::Hex => 'F',
        }
    }

    fn is_digit(&self, c: char) -> bool {
        c.is_digit(self.radix())
    }
}

/// A numeric literal as it appeared in a scenario. The digits are kept
/// verbatim (including any `*` wildcard digits) so that encoders can emit the
/// literal in the same base it was written in.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Number {
    pub radix: Radix,

    /// Digits without the base prefix. May contain `*` for prefixed
    /// literals.
    pub digits: String,
}

impl Number {
    /// Parse a literal such as `42`, `0x1*A3`, `0b10**` or `0o17`. Returns
    /// `None` if the text is not a well formed literal.
    pub fn parse(text: &str) -> Option<Number> {
        let (radix, digits) = if let Some(rest) = text.strip_prefix("0x") {
            (Radix::Hex, rest)
        } else if let Some(rest) = text.strip_prefix("0b") {
            (Radix::Binary, rest)
        } else if let Some(rest) = text.strip_prefix("0o") {
            (Radix::Octal, rest)
        } else {
            (Radix::Decimal, text)
        };

        if digits.is_empty() {
            return None;
        }
        for c in digits.chars() {
            if c == '*' && radix != Radix::Decimal {
                continue;
            }
            if !radix.is_digit(c) {
                return None;
            }
        }

        Some(Number {
            radix,
            digits: digits.into(),
        })
    }

    pub fn from_u64(value: u64) -> Self {
        Number {
            radix: Radix::Decimal,
            digits: value.to_string(),
        }
    }

    pub fn has_wildcards(&self) -> bool {
        self.digits.contains('*')
    }

    /// Numeric value with every wildcard digit taken as zero.
    pub fn value(&self) -> BigUint {
        let digits = self.digits.replace('*', "0");
        BigUint::parse_bytes(digits.as_bytes(), self.radix.radix())
            .unwrap_or_else(BigUint::zero)
    }

    /// Ternary mask: all ones over each concrete digit, zeros over each
    /// wildcard digit. Decimal literals have no digit-aligned mask.
    pub fn mask(&self) -> Option<BigUint> {
        let text = self.mask_text()?;
        let digits = &text[self.radix.prefix().len()..];
        BigUint::parse_bytes(digits.as_bytes(), self.radix.radix())
    }

    /// The literal with wildcard digits replaced by zero, prefix included.
    pub fn zeroed(&self) -> String {
        format!("{}{}", self.radix.prefix(), self.digits.replace('*', "0"))
    }

    /// The synthesized mask in the literal's own base, prefix included.
    pub fn mask_text(&self) -> Option<String> {
        self.radix.bits_per_digit()?;
        let full = self.radix.full_digit();
        let mask: String = self
            .digits
            .chars()
            .map(|c| if c == '*' { '0' } else { full })
            .collect();
        Some(format!("{}{}", self.radix.prefix(), mask))
    }

    /// Total number of bits spanned by the digits as written.
    pub fn width(&self) -> Option<usize> {
        Some(self.digits.len() * self.radix.bits_per_digit()?)
    }

    /// Number of bits covered by concrete (non-wildcard) digits. This is the
    /// prefix length an lpm key written without an explicit length gets.
    pub fn significant_bits(&self) -> Option<usize> {
        let concrete = self.digits.chars().filter(|c| *c != '*').count();
        Some(concrete * self.radix.bits_per_digit()?)
    }

    pub fn to_u32(&self) -> Option<u32> {
        if self.has_wildcards() {
            return None;
        }
        self.value().to_u32()
    }

    pub fn to_u64(&self) -> Option<u64> {
        if self.has_wildcards() {
            return None;
        }
        self.value().to_u64()
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.radix.prefix(), self.digits)
    }
}
