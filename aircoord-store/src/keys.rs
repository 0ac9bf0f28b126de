//! Key layout of the shared state store
//!
//! Only the orchestrator writes `current_attack_mode`, `current_channel`
//! and the target keys during normal operation; the operator's `set-mode`
//! command is the one external writer.

use aircoord_core::{Channel, MacAddr};

/// Requested attack mode
pub const CURRENT_ATTACK_MODE: &str = "current_attack_mode";

/// Mode whose worker set has actually been started
pub const ENACTED_ATTACK_MODE: &str = "enacted_attack_mode";

/// Channel the hopper is locked to; absent means hop freely
pub const CURRENT_CHANNEL: &str = "current_channel";

/// Target access point for TARGETED mode
pub const TARGET_BSSID: &str = "target_bssid";

/// Target channel for TARGETED mode
pub const TARGET_CHANNEL: &str = "target_channel";

/// Probing clients selected as candidate targets
pub const PROBE_CANDIDATES: &str = "probe_candidates";

pub const LIVENESS_PREFIX: &str = "liveness:channel:";
pub const LIVENESS_TTL_PREFIX: &str = "liveness_ttl:";
pub const RADIO_CHANNEL_PREFIX: &str = "radio_channel:";
pub const AP_PREFIX: &str = "ap:";
pub const CLIENT_PREFIX: &str = "client:";
pub const FLOOD_BEACONS_PREFIX: &str = "flood:beacons:";

/// Per-channel liveness key
pub fn liveness(channel: Channel) -> String {
    format!("{}{}", LIVENESS_PREFIX, channel)
}

/// Channel a liveness key refers to
pub fn liveness_channel(key: &str) -> Option<Channel> {
    key.strip_prefix(LIVENESS_PREFIX)?.parse().ok()
}

/// Published liveness window for a channel, in seconds
pub fn liveness_ttl(channel: Channel) -> String {
    format!("{}{}", LIVENESS_TTL_PREFIX, channel)
}

/// Channel the hopper last tuned an interface to
pub fn radio_channel(interface: &str) -> String {
    format!("{}{}", RADIO_CHANNEL_PREFIX, interface)
}

pub fn access_point(bssid: MacAddr) -> String {
    format!("{}{}", AP_PREFIX, bssid)
}

pub fn client(mac: MacAddr) -> String {
    format!("{}{}", CLIENT_PREFIX, mac)
}

/// Beacon flood activity on a channel
pub fn flood_beacons(channel: Channel) -> String {
    format!("{}{}", FLOOD_BEACONS_PREFIX, channel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_liveness_key_round_trip() {
        let ch = Channel::new(11).unwrap();
        let key = liveness(ch);
        assert_eq!(key, "liveness:channel:11");
        assert_eq!(liveness_channel(&key), Some(ch));
        assert_eq!(liveness_channel("liveness:channel:99"), None);
        assert_eq!(liveness_channel("ap:11"), None);
    }

    #[test]
    fn test_record_keys() {
        let mac = MacAddr([0, 0x11, 0x22, 0x33, 0x44, 0x55]);
        assert_eq!(access_point(mac), "ap:00:11:22:33:44:55");
        assert_eq!(client(mac), "client:00:11:22:33:44:55");
        assert_eq!(radio_channel("wlan0mon"), "radio_channel:wlan0mon");
    }
}
