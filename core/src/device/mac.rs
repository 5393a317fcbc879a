use crate::prelude::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical hardware identifier: six upper-case hex octets joined by colons.
///
/// The only way to build one is through [`MacAddress::parse`], so anything
/// holding a `MacAddress` has already passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress(String);

impl MacAddress {
    pub const LEN: usize = 17;

    pub fn parse(raw: &str) -> EngineResult<Self> {
        let trimmed = raw.trim();
        if trimmed.len() != Self::LEN {
            return Err(EngineError::MalformedRecord(format!(
                "MAC {:?} has length {}",
                trimmed,
                trimmed.len()
            )));
        }
        for (idx, ch) in trimmed.chars().enumerate() {
            let valid = if (idx + 1) % 3 == 0 {
                ch == ':'
            } else {
                ch.is_ascii_hexdigit()
            };
            if !valid {
                return Err(EngineError::MalformedRecord(format!(
                    "MAC {:?} has invalid character {:?} at {}",
                    trimmed, ch, idx
                )));
            }
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last two octets, e.g. `EE:FF`.
    pub fn suffix(&self) -> &str {
        &self.0[12..]
    }
}

impl FromStr for MacAddress {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MacAddress {
    type Error = EngineError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.0
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
