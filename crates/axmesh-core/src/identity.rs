//! Station identifiers
//!
//! AX.25 addresses carry a base callsign of up to six characters and a
//! 4-bit secondary station identifier (SSID). [`Callsign`] is the
//! normalized form used as a map key everywhere in the engine:
//!
//! - The base is uppercased and must be 1..=6 ASCII alphanumerics
//! - The SSID is 0..=15; SSID 0 is the same station as no suffix
//! - A trailing `*` (the "has been repeated" marker monitors print on
//!   via entries) is ignored

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CallsignError;

/// Maximum length of the base callsign in an AX.25 address field
pub const MAX_BASE_LEN: usize = 6;

/// Highest SSID an AX.25 address can carry
pub const MAX_SSID: u8 = 15;

/// A normalized station callsign
///
/// Ordering is by base then SSID, which gives every snapshot the engine
/// produces a stable order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Callsign {
    base: String,
    ssid: u8,
}

impl Callsign {
    /// Parse and normalize a callsign string
    pub fn parse(raw: &str) -> Result<Self, CallsignError> {
        let trimmed = raw.trim();
        let trimmed = trimmed.strip_suffix('*').unwrap_or(trimmed);
        if trimmed.is_empty() {
            return Err(CallsignError::Empty);
        }

        let (base, ssid) = match trimmed.split_once('-') {
            Some((base, ssid)) => (base, Some(ssid)),
            None => (trimmed, None),
        };

        if base.is_empty()
            || base.len() > MAX_BASE_LEN
            || !base.chars().all(|c| c.is_ascii_alphanumeric())
        {
            return Err(CallsignError::InvalidBase(base.to_string()));
        }

        let ssid = match ssid {
            None => 0,
            Some(s) => {
                if s.is_empty() || s.len() > 2 || !s.chars().all(|c| c.is_ascii_digit()) {
                    return Err(CallsignError::InvalidSsid(s.to_string()));
                }
                let value: u8 = s
                    .parse()
                    .map_err(|_| CallsignError::InvalidSsid(s.to_string()))?;
                if value > MAX_SSID {
                    return Err(CallsignError::InvalidSsid(s.to_string()));
                }
                value
            }
        };

        Ok(Self {
            base: base.to_ascii_uppercase(),
            ssid,
        })
    }

    /// The base callsign without SSID
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The SSID (0 when the address had none)
    pub fn ssid(&self) -> u8 {
        self.ssid
    }

    /// The same base callsign with a different SSID
    pub fn with_ssid(&self, ssid: u8) -> Result<Self, CallsignError> {
        if ssid > MAX_SSID {
            return Err(CallsignError::InvalidSsid(ssid.to_string()));
        }
        Ok(Self {
            base: self.base.clone(),
            ssid,
        })
    }
}

impl Display for Callsign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.ssid == 0 {
            write!(f, "{}", self.base)
        } else {
            write!(f, "{}-{}", self.base, self.ssid)
        }
    }
}

impl FromStr for Callsign {
    type Err = CallsignError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Callsign {
    type Error = CallsignError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Callsign> for String {
    fn from(call: Callsign) -> Self {
        call.to_string()
    }
}
