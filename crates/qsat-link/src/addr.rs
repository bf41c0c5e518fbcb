use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 6-byte link-layer (ESP-NOW / Wi-Fi station) address.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(pub [u8; 6]);

#[derive(Debug, thiserror::Error)]
pub enum AddrParseError {
    #[error("expected 6 ':'-separated octets, got {0}")]
    OctetCount(usize),
    #[error("bad octet {0:?}")]
    Octet(String),
}

impl MacAddr {
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl FromStr for MacAddr {
    type Err = AddrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 6 {
            return Err(AddrParseError::OctetCount(parts.len()));
        }
        let mut out = [0u8; 6];
        for (slot, part) in out.iter_mut().zip(parts) {
            let bytes = hex::decode(part).map_err(|_| AddrParseError::Octet(part.to_string()))?;
            let &[b] = bytes.as_slice() else {
                return Err(AddrParseError::Octet(part.to_string()));
            };
            *slot = b;
        }
        Ok(MacAddr(out))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = AddrParseError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddr> for String {
    fn from(a: MacAddr) -> String {
        a.to_string()
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let octets: Vec<String> = self.0.iter().map(|b| hex::encode([*b])).collect();
        f.write_str(&octets.join(":"))
    }
}

impl fmt::Debug for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MacAddr({})", self)
    }
}
