//! Passive analyzer
//!
//! Drains frame metadata from a [`FrameSource`] and publishes what it saw:
//! access point and client records, per-channel liveness keys, and the set
//! of probing clients worth targeting. The flood-sniffer variant replaces
//! the normal analyzer during a beacon flood and only tracks beacon
//! activity per channel.

use aircoord_core::{
    AccessPoint, Channel, Client, Encryption, FrameInfo, FrameKind, MacAddr, Result,
};
use aircoord_store::StateClient;
use chrono::Utc;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::source::FrameSource;
use crate::stats::{ActivityStats, StatsAccumulator};

/// Which analysis the analyzer performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnalyzerVariant {
    /// Access points, clients and probe candidates
    #[default]
    Normal,
    /// Beacon counting during a beacon flood
    FloodSniffer,
}

impl fmt::Display for AnalyzerVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnalyzerVariant::Normal => write!(f, "analyzer"),
            AnalyzerVariant::FloodSniffer => write!(f, "flood sniffer"),
        }
    }
}

/// Analyzer settings
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    /// Every radio interface taking part in probe correlation
    pub interfaces: Vec<String>,
    /// Liveness TTL when no window is published for a channel
    pub default_liveness_ttl: Duration,
    /// TTL of access point, client and candidate records
    pub record_ttl: Duration,
    /// Only analyze this channel
    pub channel_filter: Option<Channel>,
    /// Pause after a failed read from the frame source
    pub retry_delay: Duration,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            interfaces: vec!["wlan0mon".to_string()],
            default_liveness_ttl: Duration::from_secs(10),
            record_ttl: Duration::from_secs(300),
            channel_filter: None,
            retry_delay: Duration::from_millis(500),
        }
    }
}

/// Stops a running analyzer from another task
#[derive(Debug, Clone)]
pub struct AnalyzerHandle {
    running: Arc<AtomicBool>,
}

impl AnalyzerHandle {
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// False once stopped or once the frame source is exhausted
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }
}

/// Frame analyzer publishing into the shared store
pub struct Analyzer<S> {
    variant: AnalyzerVariant,
    config: AnalyzerConfig,
    state: StateClient,
    source: S,
    /// Probing clients per interface, with when each was last heard
    probes: HashMap<String, BTreeMap<MacAddr, Instant>>,
    /// Beaconing BSSIDs per channel with last-seen times, flood sniffer only
    beacons: HashMap<Channel, BTreeMap<MacAddr, Instant>>,
    running: Arc<AtomicBool>,
    stats: StatsAccumulator,
}

impl<S: FrameSource> Analyzer<S> {
    pub fn new(variant: AnalyzerVariant, config: AnalyzerConfig, state: StateClient, source: S) -> Self {
        Self {
            variant,
            config,
            state,
            source,
            probes: HashMap::new(),
            beacons: HashMap::new(),
            running: Arc::new(AtomicBool::new(true)),
            stats: StatsAccumulator::new(),
        }
    }

    pub fn variant(&self) -> AnalyzerVariant {
        self.variant
    }

    pub fn handle(&self) -> AnalyzerHandle {
        AnalyzerHandle {
            running: self.running.clone(),
        }
    }

    /// Request loop termination; a stop before [`run`](Self::run) is kept
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    pub fn stats(&self) -> ActivityStats {
        self.stats.snapshot()
    }

    /// Analyze until stopped or the frame source is exhausted
    pub async fn run(&mut self) {
        info!(
            variant = %self.variant,
            interfaces = ?self.config.interfaces,
            channel_filter = ?self.config.channel_filter,
            "Analyzer started"
        );

        while self.running.load(Ordering::Relaxed) {
            match self.source.next_batch().await {
                Ok(Some(batch)) => {
                    if batch.is_empty() {
                        continue;
                    }
                    if let Err(e) = self.process(&batch).await {
                        warn!(variant = %self.variant, error = %e, "Failed to publish observations");
                        self.stats.record_store_error();
                    }
                }
                Ok(None) => {
                    info!(variant = %self.variant, "Frame source exhausted");
                    break;
                }
                Err(e) => {
                    warn!(variant = %self.variant, error = %e, "Frame source failed");
                    tokio::time::sleep(self.config.retry_delay).await;
                }
            }
        }

        self.running.store(false, Ordering::Relaxed);
        info!(variant = %self.variant, "Analyzer stopped\n{}", self.stats().format());
    }

    /// Publish everything learned from one batch of frames
    pub async fn process(&mut self, batch: &[FrameInfo]) -> Result<()> {
        self.stats.record_frames(batch.len());

        let now = Instant::now();
        let mut probes_changed = self.forget_stale(now);
        let mut radio_channels: HashMap<String, Option<Channel>> = HashMap::new();
        let mut observed: BTreeMap<Channel, String> = BTreeMap::new();
        let mut flooded: BTreeSet<Channel> = BTreeSet::new();

        for frame in batch {
            let Some(channel) = self.attribute(frame, &mut radio_channels).await? else {
                self.stats.record_unattributed();
                continue;
            };
            if self.config.channel_filter.is_some_and(|only| only != channel) {
                continue;
            }
            observed
                .entry(channel)
                .or_insert_with(|| frame.interface.clone());

            match self.variant {
                AnalyzerVariant::Normal => {
                    probes_changed |= self.observe(frame, channel, now).await?;
                }
                AnalyzerVariant::FloodSniffer => {
                    if frame.kind == FrameKind::Beacon {
                        if let Some(bssid) = frame.bssid {
                            self.beacons.entry(channel).or_default().insert(bssid, now);
                            flooded.insert(channel);
                        }
                    }
                }
            }
        }

        for (channel, interface) in &observed {
            let ttl = self.liveness_ttl(*channel).await;
            self.state.mark_channel_live(*channel, interface, ttl).await?;
            debug!(channel = %channel, ttl_secs = ttl.as_secs(), "Channel live");
        }

        for channel in flooded {
            let ttl = self.liveness_ttl(channel).await;
            // Only BSSIDs heard within the liveness window count
            let count = self.beacons.get_mut(&channel).map_or(0, |seen| {
                seen.retain(|_, last| now.duration_since(*last) < ttl);
                seen.len()
            });
            self.state.set_flood_beacons(channel, count, ttl).await?;
        }

        if probes_changed {
            let candidates = self.probe_candidates();
            debug!(count = candidates.len(), "Publishing probe candidates");
            self.state
                .set_probe_candidates(&candidates, self.config.record_ttl)
                .await?;
        }

        Ok(())
    }

    /// Clients worth targeting.
    ///
    /// With one interface every probing client qualifies. With several, a
    /// client must have been heard on all of them.
    pub fn probe_candidates(&self) -> Vec<MacAddr> {
        if self.config.interfaces.len() <= 1 {
            let all: BTreeSet<MacAddr> = self
                .probes
                .values()
                .flat_map(|seen| seen.keys())
                .copied()
                .collect();
            return all.into_iter().collect();
        }

        let mut sets = self
            .config
            .interfaces
            .iter()
            .map(|name| self.probes.get(name));
        let Some(Some(first)) = sets.next() else {
            return Vec::new();
        };
        let mut quorum: BTreeSet<MacAddr> = first.keys().copied().collect();
        for set in sets {
            match set {
                Some(set) => quorum.retain(|mac| set.contains_key(mac)),
                None => return Vec::new(),
            }
        }
        quorum.into_iter().collect()
    }

    /// Record an AP or client from a frame; returns whether the probe
    /// sets changed
    async fn observe(&mut self, frame: &FrameInfo, channel: Channel, heard: Instant) -> Result<bool> {
        let now = Utc::now();
        let ttl = self.config.record_ttl;

        match frame.kind {
            kind if kind.advertises_ap() => {
                if let Some(bssid) = frame.bssid {
                    let ap = AccessPoint {
                        bssid,
                        essid: frame.essid.clone().unwrap_or_default(),
                        encryption: frame.encryption.unwrap_or(Encryption::Open),
                        channel,
                        last_seen: now,
                    };
                    self.state.upsert_access_point(&ap, ttl).await?;
                    self.stats.record_access_point();
                }
                Ok(false)
            }
            FrameKind::ProbeRequest => {
                let Some(mac) = frame.source else {
                    return Ok(false);
                };
                let client = Client {
                    mac,
                    bssid: None,
                    probes: frame.essid.iter().filter(|e| !e.is_empty()).cloned().collect(),
                    last_seen: now,
                };
                self.state.upsert_client(&client, ttl).await?;
                self.stats.record_client();
                Ok(self
                    .probes
                    .entry(frame.interface.clone())
                    .or_default()
                    .insert(mac, heard)
                    .is_none())
            }
            FrameKind::Data => {
                if let (Some(mac), Some(bssid)) = (frame.source, frame.bssid) {
                    if mac != bssid && !mac.is_broadcast() {
                        let client = Client {
                            mac,
                            bssid: Some(bssid),
                            probes: Vec::new(),
                            last_seen: now,
                        };
                        self.state.upsert_client(&client, ttl).await?;
                        self.stats.record_client();
                    }
                }
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    /// Drop probers and beaconing BSSIDs not heard within the record TTL;
    /// returns whether any prober was forgotten
    fn forget_stale(&mut self, now: Instant) -> bool {
        let ttl = self.config.record_ttl;
        let fresh = |last: &mut Instant| now.duration_since(*last) < ttl;

        let before: usize = self.probes.values().map(BTreeMap::len).sum();
        for seen in self.probes.values_mut() {
            seen.retain(|_, last| fresh(last));
        }
        self.probes.retain(|_, seen| !seen.is_empty());
        let after: usize = self.probes.values().map(BTreeMap::len).sum();

        for seen in self.beacons.values_mut() {
            seen.retain(|_, last| fresh(last));
        }
        self.beacons.retain(|_, seen| !seen.is_empty());

        if after < before {
            debug!(forgotten = before - after, "Forgot stale probing clients");
        }
        after < before
    }

    /// Channel a frame was heard on: its own channel field, else whatever
    /// the hopper last tuned its interface to
    async fn attribute(
        &self,
        frame: &FrameInfo,
        radio_channels: &mut HashMap<String, Option<Channel>>,
    ) -> Result<Option<Channel>> {
        if let Some(channel) = frame.channel {
            return Ok(Some(channel));
        }
        if let Some(cached) = radio_channels.get(&frame.interface) {
            return Ok(*cached);
        }
        let tuned = self.state.radio_channel(&frame.interface).await?;
        radio_channels.insert(frame.interface.clone(), tuned);
        Ok(tuned)
    }

    async fn liveness_ttl(&self, channel: Channel) -> Duration {
        match self.state.liveness_window(channel).await {
            Ok(Some(ttl)) if !ttl.is_zero() => ttl,
            Ok(_) => self.config.default_liveness_ttl,
            Err(e) => {
                debug!(channel = %channel, error = %e, "Using default liveness window");
                self.config.default_liveness_ttl
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircoord_core::Error;
    use aircoord_store::MemoryStore;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Frame source replaying scripted batches
    struct ScriptedSource {
        batches: VecDeque<Result<Vec<FrameInfo>>>,
    }

    impl ScriptedSource {
        fn new(batches: Vec<Result<Vec<FrameInfo>>>) -> Self {
            Self {
                batches: batches.into(),
            }
        }
    }

    #[async_trait]
    impl FrameSource for ScriptedSource {
        async fn next_batch(&mut self) -> Result<Option<Vec<FrameInfo>>> {
            match self.batches.pop_front() {
                Some(batch) => batch.map(Some),
                None => Ok(None),
            }
        }
    }

    fn ch(n: u16) -> Channel {
        Channel::new(n).unwrap()
    }

    fn mac(s: &str) -> MacAddr {
        s.parse().unwrap()
    }

    fn beacon(interface: &str, bssid: &str, channel: u16) -> FrameInfo {
        FrameInfo::new(FrameKind::Beacon, interface)
            .with_bssid(mac(bssid))
            .with_essid("corp")
            .with_encryption(Encryption::Wpa2)
            .with_channel(ch(channel))
    }

    fn probe(interface: &str, source: &str, channel: u16) -> FrameInfo {
        FrameInfo::new(FrameKind::ProbeRequest, interface)
            .with_source(mac(source))
            .with_essid("home")
            .with_channel(ch(channel))
    }

    fn analyzer(
        variant: AnalyzerVariant,
        interfaces: &[&str],
        batches: Vec<Result<Vec<FrameInfo>>>,
    ) -> (Analyzer<ScriptedSource>, StateClient) {
        let state = StateClient::new(Arc::new(MemoryStore::new()));
        let config = AnalyzerConfig {
            interfaces: interfaces.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };
        let analyzer = Analyzer::new(variant, config, state.clone(), ScriptedSource::new(batches));
        (analyzer, state)
    }

    #[tokio::test(start_paused = true)]
    async fn test_beacon_marks_channel_live_until_ttl() {
        let (mut analyzer, state) = analyzer(AnalyzerVariant::Normal, &["wlan0mon"], vec![]);

        analyzer
            .process(&[beacon("wlan0mon", "00:11:22:33:44:55", 11)])
            .await
            .unwrap();

        assert!(state.is_channel_live(ch(11)).await.unwrap());
        let ap = state
            .access_point(mac("00:11:22:33:44:55"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ap.channel, ch(11));
        assert_eq!(ap.encryption, Encryption::Wpa2);

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(state.is_channel_live(ch(11)).await.unwrap());
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!state.is_channel_live(ch(11)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_published_liveness_window_wins() {
        let (mut analyzer, state) = analyzer(AnalyzerVariant::Normal, &["wlan0mon"], vec![]);
        state
            .publish_liveness_window(ch(6), Duration::from_secs(30))
            .await
            .unwrap();

        analyzer
            .process(&[beacon("wlan0mon", "00:11:22:33:44:55", 6)])
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(state.is_channel_live(ch(6)).await.unwrap());
    }

    #[tokio::test]
    async fn test_channel_from_hopper_when_frame_has_none() {
        let (mut analyzer, state) = analyzer(AnalyzerVariant::Normal, &["wlan0mon"], vec![]);
        let untagged = FrameInfo::new(FrameKind::Data, "wlan0mon")
            .with_source(mac("aa:bb:cc:dd:ee:ff"))
            .with_bssid(mac("00:11:22:33:44:55"));

        analyzer.process(&[untagged.clone()]).await.unwrap();
        assert!(state.live_channels().await.unwrap().is_empty());
        assert_eq!(analyzer.stats().unattributed, 1);

        state.set_radio_channel("wlan0mon", ch(3)).await.unwrap();
        analyzer.process(&[untagged]).await.unwrap();
        assert_eq!(state.live_channels().await.unwrap(), vec![ch(3)]);

        let client = state.client(mac("aa:bb:cc:dd:ee:ff")).await.unwrap().unwrap();
        assert_eq!(client.bssid, Some(mac("00:11:22:33:44:55")));
    }

    #[tokio::test]
    async fn test_single_interface_takes_all_probers() {
        let (mut analyzer, state) = analyzer(AnalyzerVariant::Normal, &["wlan0mon"], vec![]);

        analyzer
            .process(&[
                probe("wlan0mon", "aa:bb:cc:dd:ee:01", 1),
                probe("wlan0mon", "aa:bb:cc:dd:ee:02", 6),
            ])
            .await
            .unwrap();

        assert_eq!(
            state.probe_candidates().await.unwrap(),
            vec![mac("aa:bb:cc:dd:ee:01"), mac("aa:bb:cc:dd:ee:02")]
        );
        let client = state.client(mac("aa:bb:cc:dd:ee:01")).await.unwrap().unwrap();
        assert_eq!(client.probes, vec!["home".to_string()]);
    }

    #[tokio::test]
    async fn test_multiple_interfaces_need_quorum() {
        let (mut analyzer, state) =
            analyzer(AnalyzerVariant::Normal, &["wlan0mon", "wlan1mon"], vec![]);

        analyzer
            .process(&[
                probe("wlan0mon", "aa:bb:cc:dd:ee:01", 1),
                probe("wlan0mon", "aa:bb:cc:dd:ee:02", 1),
            ])
            .await
            .unwrap();
        assert!(state.probe_candidates().await.unwrap().is_empty());

        analyzer
            .process(&[probe("wlan1mon", "aa:bb:cc:dd:ee:02", 6)])
            .await
            .unwrap();
        assert_eq!(
            state.probe_candidates().await.unwrap(),
            vec![mac("aa:bb:cc:dd:ee:02")]
        );
    }

    #[tokio::test]
    async fn test_channel_filter_narrows() {
        let (mut analyzer, state) = analyzer(AnalyzerVariant::Normal, &["wlan0mon"], vec![]);
        analyzer.config.channel_filter = Some(ch(6));

        analyzer
            .process(&[
                beacon("wlan0mon", "00:11:22:33:44:55", 6),
                beacon("wlan0mon", "00:11:22:33:44:66", 11),
            ])
            .await
            .unwrap();

        assert_eq!(state.live_channels().await.unwrap(), vec![ch(6)]);
        assert_eq!(state.access_points().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_flood_sniffer_counts_beacons_only() {
        let (mut analyzer, state) =
            analyzer(AnalyzerVariant::FloodSniffer, &["wlan0mon"], vec![]);

        analyzer
            .process(&[
                beacon("wlan0mon", "00:11:22:33:44:01", 1),
                beacon("wlan0mon", "00:11:22:33:44:02", 1),
                beacon("wlan0mon", "00:11:22:33:44:02", 1),
                probe("wlan0mon", "aa:bb:cc:dd:ee:01", 1),
            ])
            .await
            .unwrap();

        assert_eq!(state.flood_beacons(ch(1)).await.unwrap(), Some(2));
        assert!(state.is_channel_live(ch(1)).await.unwrap());
        assert!(state.access_points().await.unwrap().is_empty());
        assert!(state.clients().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_run_survives_source_errors_and_ends_on_exhaustion() {
        let (mut analyzer, state) = analyzer(
            AnalyzerVariant::Normal,
            &["wlan0mon"],
            vec![
                Err(Error::FrameSource("capture helper restarted".into())),
                Ok(vec![]),
                Ok(vec![beacon("wlan0mon", "00:11:22:33:44:55", 6)]),
            ],
        );
        analyzer.config.retry_delay = Duration::from_millis(1);

        analyzer.run().await;

        assert!(!analyzer.handle().is_running());
        assert_eq!(analyzer.stats().frames, 1);
        assert!(state.is_channel_live(ch(6)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_long_silent_prober_drops_out_of_candidates() {
        let (mut analyzer, state) = analyzer(AnalyzerVariant::Normal, &["wlan0mon"], vec![]);
        analyzer.config.record_ttl = Duration::from_secs(60);

        analyzer
            .process(&[probe("wlan0mon", "aa:bb:cc:dd:ee:01", 1)])
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(3600)).await;
        analyzer
            .process(&[probe("wlan0mon", "aa:bb:cc:dd:ee:02", 1)])
            .await
            .unwrap();

        assert_eq!(analyzer.probe_candidates(), vec![mac("aa:bb:cc:dd:ee:02")]);
        assert_eq!(
            state.probe_candidates().await.unwrap(),
            vec![mac("aa:bb:cc:dd:ee:02")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_forgotten_prober_republishes_candidates() {
        let (mut analyzer, state) = analyzer(AnalyzerVariant::Normal, &["wlan0mon"], vec![]);
        analyzer.config.record_ttl = Duration::from_secs(60);

        analyzer
            .process(&[probe("wlan0mon", "aa:bb:cc:dd:ee:01", 1)])
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(45)).await;
        analyzer
            .process(&[probe("wlan0mon", "aa:bb:cc:dd:ee:02", 1)])
            .await
            .unwrap();
        assert_eq!(state.probe_candidates().await.unwrap().len(), 2);

        // No probes in this batch, yet :01 has now been silent too long
        tokio::time::advance(Duration::from_secs(25)).await;
        analyzer
            .process(&[beacon("wlan0mon", "00:11:22:33:44:55", 1)])
            .await
            .unwrap();
        assert_eq!(
            state.probe_candidates().await.unwrap(),
            vec![mac("aa:bb:cc:dd:ee:02")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_flood_count_only_covers_liveness_window() {
        let (mut analyzer, state) =
            analyzer(AnalyzerVariant::FloodSniffer, &["wlan0mon"], vec![]);

        analyzer
            .process(&[
                beacon("wlan0mon", "00:11:22:33:44:01", 1),
                beacon("wlan0mon", "00:11:22:33:44:02", 1),
            ])
            .await
            .unwrap();
        assert_eq!(state.flood_beacons(ch(1)).await.unwrap(), Some(2));

        tokio::time::advance(Duration::from_secs(15)).await;
        analyzer
            .process(&[beacon("wlan0mon", "00:11:22:33:44:02", 1)])
            .await
            .unwrap();
        assert_eq!(state.flood_beacons(ch(1)).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_stop_before_run_is_kept() {
        let (mut analyzer, state) = analyzer(
            AnalyzerVariant::Normal,
            &["wlan0mon"],
            vec![Ok(vec![beacon("wlan0mon", "00:11:22:33:44:55", 6)])],
        );
        analyzer.handle().stop();

        analyzer.run().await;

        assert_eq!(analyzer.stats().frames, 0);
        assert!(!state.is_channel_live(ch(6)).await.unwrap());
    }
}
