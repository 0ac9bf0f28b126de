//! Records the analyzer publishes about what it has seen on the air

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Channel, Encryption, MacAddr};

/// An access point seen through its beacons or probe responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub bssid: MacAddr,
    pub essid: String,
    pub encryption: Encryption,
    pub channel: Channel,
    pub last_seen: DateTime<Utc>,
}

impl AccessPoint {
    /// Fold a newer sighting into this record.
    ///
    /// Hidden-network beacons carry an empty ESSID; they never erase a name
    /// learned from an earlier probe response.
    pub fn refresh(&mut self, newer: &AccessPoint) {
        if !newer.essid.is_empty() {
            self.essid = newer.essid.clone();
        }
        self.encryption = newer.encryption;
        self.channel = newer.channel;
        if newer.last_seen > self.last_seen {
            self.last_seen = newer.last_seen;
        }
    }
}

/// A station seen transmitting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub mac: MacAddr,
    /// Access point the station talks to, if any frame revealed it
    pub bssid: Option<MacAddr>,
    /// Networks the station probed for
    #[serde(default)]
    pub probes: Vec<String>,
    pub last_seen: DateTime<Utc>,
}

impl Client {
    /// Fold a newer sighting into this record
    pub fn refresh(&mut self, newer: &Client) {
        if newer.bssid.is_some() {
            self.bssid = newer.bssid;
        }
        for essid in &newer.probes {
            if !self.probes.contains(essid) {
                self.probes.push(essid.clone());
            }
        }
        if newer.last_seen > self.last_seen {
            self.last_seen = newer.last_seen;
        }
    }
}
