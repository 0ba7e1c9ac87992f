//! Sub-classification codes.
//!
//! The archive stores the sub-class of an object as free text (`"STARFORMING"`,
//! `"BROADLINE"`, `""`, ...). Downstream consumers want a number, so the text is read as a
//! base-36 integer once blanks are removed. An empty string means the object was never
//! sub-classified; it maps to [`SubClass::Unclassified`], whose numeric code is the fixed
//! sentinel [`UNCLASSIFIED_CODE`] (`"EC"` in base 36).
//!
//! Stellar sub-classes carry a template id, e.g. `"K5 (83140)"`, which is not base 36.
//! [`SubClass::from_text`] keeps such text as [`SubClass::Other`]; [`SubClass::parse`] rejects it.
//!
//! Encoding [`SubClass::Unclassified`] yields `"EC"` rather than the empty string: the
//! conversion is not a bijection on the text side.
use std::fmt;

use serde::{Serialize, Serializer};

use crate::{
    constants::{UNCLASSIFIED_CODE, UNCLASSIFIED_CODE_STR},
    spectra_errors::SpectraError,
};

const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SubClass {
    Known(u128),
    Unclassified,
    /// Trimmed text that has no base-36 reading
    Other(String),
}

impl SubClass {
    /// Parse the raw sub-class text read from a spectrum file.
    ///
    /// Whitespace is removed first, then the remaining characters are read as a
    /// case-insensitive base-36 number.
    ///
    /// Return
    /// ----------
    /// * [`SubClass::Unclassified`] for blank text.
    /// * [`SpectraError::InvalidSubClass`] if a character is not alphanumeric or the value
    ///   does not fit in 128 bits.
    ///
    /// See also
    /// ------------
    /// * [`SubClass::from_text`] – Never fails, keeps unreadable text.
    pub fn parse(raw: &str) -> Result<Self, SpectraError> {
        let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
        if compact.is_empty() {
            return Ok(SubClass::Unclassified);
        }
        decode_base36(&compact).map(SubClass::Known)
    }

    /// Same as [`SubClass::parse`], but text without a base-36 reading becomes
    /// [`SubClass::Other`].
    pub fn from_text(raw: &str) -> Self {
        Self::parse(raw).unwrap_or_else(|_| SubClass::Other(raw.trim().to_string()))
    }

    /// Numeric code, with the sentinel for unclassified objects; `None` for [`SubClass::Other`].
    pub fn code(&self) -> Option<u128> {
        match self {
            SubClass::Known(code) => Some(*code),
            SubClass::Unclassified => Some(UNCLASSIFIED_CODE),
            SubClass::Other(_) => None,
        }
    }

    /// Base-36 text of the code (`"EC"` for unclassified), or the original text.
    pub fn encode(&self) -> String {
        match self {
            SubClass::Known(code) => encode_base36(*code),
            SubClass::Unclassified => UNCLASSIFIED_CODE_STR.to_string(),
            SubClass::Other(text) => text.clone(),
        }
    }
}

impl fmt::Display for SubClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubClass::Known(code) => write!(f, "{code}"),
            SubClass::Unclassified => write!(f, "{UNCLASSIFIED_CODE}"),
            SubClass::Other(text) => write!(f, "{text}"),
        }
    }
}

// u128 is not supported by every serde data format, the metadata table stores the decimal text.
impl Serialize for SubClass {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Read `text` as a base-36 integer (digits then letters, case-insensitive).
pub fn decode_base36(text: &str) -> Result<u128, SpectraError> {
    let invalid = || SpectraError::InvalidSubClass(text.to_string());
    if text.is_empty() {
        return Err(invalid());
    }

    text.chars().try_fold(0u128, |acc, c| {
        let digit = c.to_digit(36).ok_or_else(invalid)?;
        acc.checked_mul(36)
            .and_then(|v| v.checked_add(u128::from(digit)))
            .ok_or_else(invalid)
    })
}

/// Upper-case base-36 representation of `value`; `0` encodes as `"0"`.
pub fn encode_base36(mut value: u128) -> String {
    if value == 0 {
        return "0".to_string();
    }

    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.iter().rev().map(|&b| b as char).collect()
}

#[cfg(test)]
mod subclass_test {
    use super::*;

    #[test]
    fn test_base36_round_trip() {
        for value in [0u128, 1, 35, 36, 516, 1_295, 46_655, 123_456_789, u64::MAX as u128] {
            assert_eq!(decode_base36(&encode_base36(value)).unwrap(), value);
        }
        assert_eq!(encode_base36(u128::MAX).len(), 25);
        assert_eq!(decode_base36(&encode_base36(u128::MAX)).unwrap(), u128::MAX);
    }

    #[test]
    fn test_known_values() {
        assert_eq!(decode_base36("Z").unwrap(), 35);
        assert_eq!(decode_base36("10").unwrap(), 36);
        assert_eq!(decode_base36("ec").unwrap(), 516);
        assert_eq!(encode_base36(516), "EC");
    }

    #[test]
    fn test_parse_strips_blanks() {
        let a = SubClass::parse("STARBURST BROADLINE").unwrap();
        let b = SubClass::parse("STARBURSTBROADLINE").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.encode(), "STARBURSTBROADLINE");
    }

    #[test]
    fn test_empty_is_unclassified_sentinel() {
        let s = SubClass::parse("").unwrap();
        assert_eq!(s, SubClass::Unclassified);
        assert_eq!(SubClass::parse("   ").unwrap(), SubClass::Unclassified);
        assert_eq!(s.code(), Some(UNCLASSIFIED_CODE));
        assert_eq!(s.code(), decode_base36("EC").ok());

        // Re-encoding the sentinel does not give back the empty string.
        assert_eq!(s.encode(), "EC");
        assert_eq!(
            SubClass::parse(&s.encode()).unwrap(),
            SubClass::Known(UNCLASSIFIED_CODE)
        );
    }

    #[test]
    fn test_invalid_codes() {
        assert!(matches!(
            SubClass::parse("F5 (81937)"),
            Err(SpectraError::InvalidSubClass(_))
        ));
        assert!(SubClass::parse("K5 (83140)").is_err());
        // 26 base-36 digits overflow u128
        assert!(decode_base36("ZZZZZZZZZZZZZZZZZZZZZZZZZZ").is_err());
    }

    #[test]
    fn test_stellar_subclass_is_kept_as_text() {
        let s = SubClass::from_text(" K5 (83140) ");
        assert_eq!(s, SubClass::Other("K5 (83140)".into()));
        assert_eq!(s.code(), None);
        assert_eq!(s.to_string(), "K5 (83140)");
        assert_eq!(s.encode(), "K5 (83140)");

        assert_eq!(SubClass::from_text("ec"), SubClass::Known(UNCLASSIFIED_CODE));
        assert_eq!(SubClass::from_text(""), SubClass::Unclassified);
    }
}
