use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::ffi::TUID;

/// 128-bit class identifier as stored in the factory's class table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ClassId(pub TUID);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed class identifier `{0}`: expected 32 hex digits")]
pub struct ParseClassIdError(pub String);

impl ClassId {
    pub const NIL: Self = Self([0; 16]);

    pub fn is_nil(&self) -> bool {
        self.0 == [0; 16]
    }

    pub fn is_all_ones(&self) -> bool {
        self.0 == [0xFF; 16]
    }

    pub fn as_bytes(&self) -> &TUID {
        &self.0
    }
}

impl From<TUID> for ClassId {
    fn from(value: TUID) -> Self {
        Self(value)
    }
}

impl FromStr for ClassId {
    type Err = ParseClassIdError;

    /// Accepts `0123…`, `01234567-89AB-…` and `{01234567-89AB-…}` spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let inner = match (trimmed.strip_prefix('{'), trimmed.ends_with('}')) {
            (Some(rest), true) => &rest[..rest.len() - 1],
            (None, false) => trimmed,
            _ => return Err(ParseClassIdError(s.to_string())),
        };
        let digits: Vec<u8> = inner.bytes().filter(|&b| b != b'-').collect();
        if digits.len() != 32 {
            return Err(ParseClassIdError(s.to_string()));
        }
        let mut bytes = [0u8; 16];
        for (slot, pair) in bytes.iter_mut().zip(digits.chunks(2)) {
            let text = std::str::from_utf8(pair).map_err(|_| ParseClassIdError(s.to_string()))?;
            *slot = u8::from_str_radix(text, 16).map_err(|_| ParseClassIdError(s.to_string()))?;
        }
        Ok(Self(bytes))
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02X}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClassId({self})")
    }
}

impl Serialize for ClassId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClassId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_all_accepted_spellings() {
        let plain: ClassId = "0123456789ABCDEF0123456789abcdef".parse().unwrap();
        let dashed: ClassId = "01234567-89AB-CDEF-0123-456789ABCDEF".parse().unwrap();
        let braced: ClassId = "{01234567-89AB-CDEF-0123-456789ABCDEF}".parse().unwrap();
        assert_eq!(plain, dashed);
        assert_eq!(plain, braced);
        assert_eq!(plain.to_string(), "0123456789ABCDEF0123456789ABCDEF");
    }

    #[test]
    fn rejects_malformed_identifiers() {
        assert!("0123".parse::<ClassId>().is_err());
        assert!("{0123456789ABCDEF0123456789ABCDEF".parse::<ClassId>().is_err());
        assert!("0123456789ABCDEF0123456789ABCDEG".parse::<ClassId>().is_err());
    }

    #[test]
    fn nil_and_all_ones_are_detected() {
        assert!(ClassId::NIL.is_nil());
        assert!(ClassId([0xFF; 16]).is_all_ones());
        assert!(!ClassId([1; 16]).is_nil());
    }
}
