//! Common types used throughout aircoord

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// MAC Address (6 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Create a new MAC address
    pub const fn new(bytes: [u8; 6]) -> Self {
        Self(bytes)
    }

    /// Broadcast MAC address (ff:ff:ff:ff:ff:ff)
    pub const fn broadcast() -> Self {
        Self([0xff, 0xff, 0xff, 0xff, 0xff, 0xff])
    }

    /// Zero MAC address (00:00:00:00:00:00)
    pub const fn zero() -> Self {
        Self([0x00, 0x00, 0x00, 0x00, 0x00, 0x00])
    }

    /// Is this the broadcast address?
    pub fn is_broadcast(&self) -> bool {
        *self == Self::broadcast()
    }

    /// Get bytes as slice
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            self.0[0], self.0[1], self.0[2], self.0[3], self.0[4], self.0[5]
        )
    }
}

impl FromStr for MacAddr {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split([':', '-']).collect();
        if parts.len() != 6 {
            return Err(Error::InvalidMac(s.to_string()));
        }

        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(Error::InvalidMac(s.to_string()));
            }
            bytes[i] =
                u8::from_str_radix(part, 16).map_err(|_| Error::InvalidMac(s.to_string()))?;
        }

        Ok(MacAddr(bytes))
    }
}

impl TryFrom<String> for MacAddr {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MacAddr> for String {
    fn from(mac: MacAddr) -> Self {
        mac.to_string()
    }
}

/// 5 GHz channels accepted in addition to the 2.4 GHz range
const CHANNELS_5GHZ: &[u8] = &[
    36, 40, 44, 48, 52, 56, 60, 64, 100, 104, 108, 112, 116, 120, 124, 128, 132, 136, 140, 144,
    149, 153, 157, 161, 165,
];

/// Radio channel number
///
/// Only values that name a real 802.11 channel can be constructed: 1-14 in
/// the 2.4 GHz band and the standard 5 GHz channel numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u16", into = "u16")]
pub struct Channel(u8);

impl Channel {
    /// Validate and wrap a channel number
    pub fn new(number: u16) -> Result<Self, Error> {
        match u8::try_from(number) {
            Ok(n @ 1..=14) => Ok(Self(n)),
            Ok(n) if CHANNELS_5GHZ.contains(&n) => Ok(Self(n)),
            _ => Err(Error::InvalidChannel(number)),
        }
    }

    /// Channel number
    pub const fn number(&self) -> u8 {
        self.0
    }

    /// Is this a 2.4 GHz channel?
    pub fn is_2ghz(&self) -> bool {
        self.0 <= 14
    }

    /// Default hopping set: channels 1 through 13
    pub fn default_hop_set() -> Vec<Channel> {
        (1..=13).map(Channel).collect()
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Channel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let number: u16 = s
            .trim()
            .parse()
            .map_err(|_| Error::Protocol(format!("Channel is not a number: '{}'", s)))?;
        Channel::new(number)
    }
}

impl TryFrom<u16> for Channel {
    type Error = Error;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        Channel::new(value)
    }
}

impl From<Channel> for u16 {
    fn from(ch: Channel) -> Self {
        ch.0 as u16
    }
}

/// Encryption advertised by an access point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Encryption {
    Open,
    Wep,
    Wpa,
    Wpa2,
    #[serde(rename = "WPA2_WPA")]
    Wpa2Wpa,
}

impl fmt::Display for Encryption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Encryption::Open => "OPEN",
            Encryption::Wep => "WEP",
            Encryption::Wpa => "WPA",
            Encryption::Wpa2 => "WPA2",
            Encryption::Wpa2Wpa => "WPA2_WPA",
        };
        f.write_str(s)
    }
}
