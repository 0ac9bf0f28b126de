//! Frame metadata handed to the analyzer by the capture collaborator
//!
//! The capture side decodes 802.11 frames; this crate only ever sees the
//! handful of fields needed for coordination.

use serde::{Deserialize, Serialize};

use crate::{Channel, Encryption, MacAddr};

/// 802.11 frame class, as far as coordination cares
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameKind {
    Beacon,
    ProbeResponse,
    ProbeRequest,
    Data,
    Other,
}

impl FrameKind {
    /// Frames sent by an access point that describe it
    pub fn advertises_ap(&self) -> bool {
        matches!(self, FrameKind::Beacon | FrameKind::ProbeResponse)
    }
}

/// Metadata of one captured frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub kind: FrameKind,
    /// Interface the frame was captured on
    pub interface: String,
    #[serde(default)]
    pub bssid: Option<MacAddr>,
    /// Transmitter address
    #[serde(default)]
    pub source: Option<MacAddr>,
    #[serde(default)]
    pub essid: Option<String>,
    #[serde(default)]
    pub encryption: Option<Encryption>,
    /// Channel from the DS parameter set or radiotap header
    #[serde(default)]
    pub channel: Option<Channel>,
}

impl FrameInfo {
    /// Create a frame with only the mandatory fields set
    pub fn new(kind: FrameKind, interface: impl Into<String>) -> Self {
        Self {
            kind,
            interface: interface.into(),
            bssid: None,
            source: None,
            essid: None,
            encryption: None,
            channel: None,
        }
    }

    pub fn with_bssid(mut self, bssid: MacAddr) -> Self {
        self.bssid = Some(bssid);
        self
    }

    pub fn with_source(mut self, source: MacAddr) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_essid(mut self, essid: impl Into<String>) -> Self {
        self.essid = Some(essid.into());
        self
    }

    pub fn with_encryption(mut self, encryption: Encryption) -> Self {
        self.encryption = Some(encryption);
        self
    }

    pub fn with_channel(mut self, channel: Channel) -> Self {
        self.channel = Some(channel);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_from_minimal_json() {
        let frame: FrameInfo =
            serde_json::from_str(r#"{"kind":"probe_request","interface":"wlan0mon"}"#).unwrap();
        assert_eq!(frame.kind, FrameKind::ProbeRequest);
        assert!(frame.bssid.is_none());
        assert!(frame.channel.is_none());
    }

    #[test]
    fn test_frame_from_full_json() {
        let frame: FrameInfo = serde_json::from_str(
            r#"{"kind":"beacon","interface":"wlan0mon","bssid":"00:11:22:33:44:55",
                "essid":"corp","encryption":"WPA2","channel":11}"#,
        )
        .unwrap();
        assert!(frame.kind.advertises_ap());
        assert_eq!(frame.channel, Some(Channel::new(11).unwrap()));
        assert_eq!(frame.encryption, Some(Encryption::Wpa2));
    }
}
