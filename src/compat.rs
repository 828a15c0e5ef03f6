//! Compat/versioning shim: parses an `X.Y` compatibility
//! version and exposes it as the compile-time comparator the emitted
//! module embeds as `STAP_COMPAT_VERSION`.

use std::fmt;
use std::str::FromStr;

use crate::error::TranslateError;

/// `STAP_VERSION(a, b) := (a << 8) + b`.
#[must_use]
pub const fn stap_version(a: u8, b: u8) -> u16 {
    ((a as u16) << 8) + b as u16
}

/// A parsed `X.Y` compatibility version, each component in `[0, 255]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct CompatVersion {
    major: u8,
    minor: u8,
}

impl CompatVersion {
    #[must_use]
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// `STAP_COMPAT_VERSION` as the emitter will write it: `(A<<8)+B`.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        stap_version(self.major, self.minor)
    }

    /// The version before which `%p` must imitate the legacy, double
    /// `0x`-prefixed, right-padded rendering.
    #[must_use]
    pub fn needs_legacy_pointer_format(self) -> bool {
        self < Self::new(1, 3)
    }
}

impl fmt::Display for CompatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for CompatVersion {
    type Err = TranslateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (a, b) = s.split_once('.').ok_or_else(|| bad(s))?;
        let parse_component = |c: &str| -> Result<u8, TranslateError> {
            let n: u32 = c.parse().map_err(|_| bad(s))?;
            u8::try_from(n).map_err(|_| bad(s))
        };
        Ok(Self::new(parse_component(a)?, parse_component(b)?))
    }
}

fn bad(s: &str) -> TranslateError {
    TranslateError::Semantic(crate::error::Diagnostic {
        token: crate::types::ast::Token::synthetic("compatibility version"),
        message: format!(
            "`{s}` is not a valid compatibility version; expected `X.Y` with X, Y in [0, 255]"
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_parse_then_compute() {
        let v: CompatVersion = "2.6".parse().unwrap();
        assert_eq!(v.as_u16(), (2u16 << 8) + 6);
        assert_eq!(v.to_string(), "2.6");
    }

    #[test]
    fn rejects_out_of_range_components() {
        assert!("256.0".parse::<CompatVersion>().is_err());
        assert!("1".parse::<CompatVersion>().is_err());
        assert!("a.b".parse::<CompatVersion>().is_err());
    }

    #[test]
    fn legacy_pointer_format_boundary() {
        assert!("1.2".parse::<CompatVersion>().unwrap().needs_legacy_pointer_format());
        assert!(!"1.3".parse::<CompatVersion>().unwrap().needs_legacy_pointer_format());
    }
}
