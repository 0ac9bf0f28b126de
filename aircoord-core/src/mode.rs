//! Attack mode, the single global switch that gates which workers run

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{Channel, Error, MacAddr};

/// Process-wide operating mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttackMode {
    /// Broad attacks while hopping across all channels
    #[default]
    Normal,
    /// Focused attacks against one BSSID with the hopper locked
    Targeted,
    /// Beacon flood with the flood sniffer in place of the analyzer
    BeaconFlood,
}

impl AttackMode {
    /// All modes, in declaration order
    pub const ALL: [AttackMode; 3] = [
        AttackMode::Normal,
        AttackMode::Targeted,
        AttackMode::BeaconFlood,
    ];

    /// Wire name stored under `current_attack_mode`
    pub fn as_str(&self) -> &'static str {
        match self {
            AttackMode::Normal => "NORMAL",
            AttackMode::Targeted => "TARGETED",
            AttackMode::BeaconFlood => "BEACON_FLOOD",
        }
    }

    /// Does this mode let the channel hopper roam freely?
    pub fn hops(&self) -> bool {
        !matches!(self, AttackMode::Targeted)
    }
}

impl fmt::Display for AttackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttackMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "NORMAL" => Ok(AttackMode::Normal),
            "TARGETED" => Ok(AttackMode::Targeted),
            "BEACON_FLOOD" => Ok(AttackMode::BeaconFlood),
            _ => Err(Error::InvalidMode(s.to_string())),
        }
    }
}

/// What TARGETED mode aims at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    /// Channel the hopper is locked to while targeting
    pub channel: Channel,
    /// Access point under attack, when known
    pub bssid: Option<MacAddr>,
}

impl Target {
    pub fn new(channel: Channel, bssid: Option<MacAddr>) -> Self {
        Self { channel, bssid }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.bssid {
            Some(bssid) => write!(f, "{} on channel {}", bssid, self.channel),
            None => write!(f, "channel {}", self.channel),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_round_trips_through_wire_name() {
        for mode in AttackMode::ALL {
            assert_eq!(mode.as_str().parse::<AttackMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_mode_parse_is_lenient_on_case() {
        assert_eq!(
            "beacon-flood".parse::<AttackMode>().unwrap(),
            AttackMode::BeaconFlood
        );
        assert_eq!(" targeted ".parse::<AttackMode>().unwrap(), AttackMode::Targeted);
        assert!("PANIC".parse::<AttackMode>().is_err());
    }

    #[test]
    fn test_default_is_normal() {
        assert_eq!(AttackMode::default(), AttackMode::Normal);
        assert!(AttackMode::Normal.hops());
        assert!(!AttackMode::Targeted.hops());
    }
}
