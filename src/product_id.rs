use serde::{Deserialize, Serialize};
use std::fmt;

/// USB product id of a Razer device, always stored in its integer form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProductId(pub u16);

impl ProductId {
    pub const fn value(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04X}", self.0)
    }
}

impl From<u16> for ProductId {
    fn from(pid: u16) -> Self {
        Self(pid)
    }
}

/// Product id as reported by the hardware layer or written in a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawProductId {
    Number(i64),
    Text(String),
}

impl RawProductId {
    /// Parses `199`, `"0x00C7"` and `"199"` into the same product id.
    ///
    /// Returns `None` for negative or out of range values and for strings
    /// that are neither hex (`0x` prefixed) nor decimal.
    pub fn normalize(&self) -> Option<ProductId> {
        match self {
            RawProductId::Number(n) => u16::try_from(*n).ok().map(ProductId),
            RawProductId::Text(text) => {
                let text = text.trim();
                let (digits, radix) = match text
                    .strip_prefix("0x")
                    .or_else(|| text.strip_prefix("0X"))
                {
                    Some(hex) => (hex, 16),
                    None => (text, 10),
                };

                // from_str_radix tolerates a leading sign
                if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
                    return None;
                }
                u16::from_str_radix(digits, radix).ok().map(ProductId)
            }
        }
    }
}

impl fmt::Display for RawProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RawProductId::Number(n) => write!(f, "{}", n),
            RawProductId::Text(text) => write!(f, "{:?}", text),
        }
    }
}

impl From<u16> for RawProductId {
    fn from(pid: u16) -> Self {
        RawProductId::Number(pid.into())
    }
}

impl From<&str> for RawProductId {
    fn from(text: &str) -> Self {
        RawProductId::Text(text.to_owned())
    }
}
