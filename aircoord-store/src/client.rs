//! Typed access to the shared state
//!
//! `StateClient` turns the raw key/value operations into the handful of
//! facts the processes exchange: the requested and enacted mode, the
//! hopper lock, the target, per-channel liveness and the observation
//! records.

use aircoord_core::{
    AccessPoint, AttackMode, Channel, Client, Error, MacAddr, Result, Target,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::keys;
use crate::store::{KeyTtl, StateStore};

/// Typed view of the shared state store
#[derive(Clone)]
pub struct StateClient {
    store: Arc<dyn StateStore>,
}

impl StateClient {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// The underlying raw store
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    // ------------------------------------------------------------------
    // Mode
    // ------------------------------------------------------------------

    /// Requested mode; `None` when nobody has written one yet
    pub async fn attack_mode(&self) -> Result<Option<AttackMode>> {
        match self.store.get(keys::CURRENT_ATTACK_MODE).await? {
            Some(raw) => raw.parse().map(Some),
            None => Ok(None),
        }
    }

    /// Request a mode. Last writer wins.
    pub async fn set_attack_mode(&self, mode: AttackMode) -> Result<()> {
        self.store
            .set(keys::CURRENT_ATTACK_MODE, mode.as_str())
            .await
    }

    /// Mode whose workers have been started
    pub async fn enacted_mode(&self) -> Result<Option<AttackMode>> {
        match self.store.get(keys::ENACTED_ATTACK_MODE).await? {
            Some(raw) => raw.parse().map(Some),
            None => Ok(None),
        }
    }

    pub async fn set_enacted_mode(&self, mode: AttackMode) -> Result<()> {
        self.store
            .set(keys::ENACTED_ATTACK_MODE, mode.as_str())
            .await
    }

    // ------------------------------------------------------------------
    // Hopper lock and target
    // ------------------------------------------------------------------

    /// Channel the hopper must stay on, if locked
    pub async fn locked_channel(&self) -> Result<Option<Channel>> {
        match self.store.get(keys::CURRENT_CHANNEL).await? {
            Some(raw) => raw.parse().map(Some),
            None => Ok(None),
        }
    }

    pub async fn lock_channel(&self, channel: Channel) -> Result<()> {
        self.store
            .set(keys::CURRENT_CHANNEL, &channel.to_string())
            .await
    }

    pub async fn unlock_channel(&self) -> Result<()> {
        self.store.delete(keys::CURRENT_CHANNEL).await.map(|_| ())
    }

    /// Target for TARGETED mode; `None` unless a target channel is set
    pub async fn target(&self) -> Result<Option<Target>> {
        let channel = match self.store.get(keys::TARGET_CHANNEL).await? {
            Some(raw) => raw.parse::<Channel>()?,
            None => return Ok(None),
        };
        let bssid = match self.store.get(keys::TARGET_BSSID).await? {
            Some(raw) => Some(raw.parse::<MacAddr>()?),
            None => None,
        };
        Ok(Some(Target::new(channel, bssid)))
    }

    pub async fn set_target(&self, target: Target) -> Result<()> {
        self.store
            .set(keys::TARGET_CHANNEL, &target.channel.to_string())
            .await?;
        match target.bssid {
            Some(bssid) => self.store.set(keys::TARGET_BSSID, &bssid.to_string()).await,
            None => self.store.delete(keys::TARGET_BSSID).await.map(|_| ()),
        }
    }

    pub async fn clear_target(&self) -> Result<()> {
        self.store.delete(keys::TARGET_CHANNEL).await?;
        self.store.delete(keys::TARGET_BSSID).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Radio and liveness
    // ------------------------------------------------------------------

    /// Channel the hopper last tuned `interface` to
    pub async fn radio_channel(&self, interface: &str) -> Result<Option<Channel>> {
        match self.store.get(&keys::radio_channel(interface)).await? {
            Some(raw) => raw.parse().map(Some),
            None => Ok(None),
        }
    }

    pub async fn set_radio_channel(&self, interface: &str, channel: Channel) -> Result<()> {
        self.store
            .set(&keys::radio_channel(interface), &channel.to_string())
            .await
    }

    /// Mark `channel` as observed by `observer` for `ttl`
    pub async fn mark_channel_live(
        &self,
        channel: Channel,
        observer: &str,
        ttl: Duration,
    ) -> Result<()> {
        self.store
            .set_with_ttl(&keys::liveness(channel), observer, ttl)
            .await
    }

    /// Was `channel` observed within its TTL window?
    pub async fn is_channel_live(&self, channel: Channel) -> Result<bool> {
        self.store.exists(&keys::liveness(channel)).await
    }

    /// Channels currently observed
    pub async fn live_channels(&self) -> Result<Vec<Channel>> {
        let keys = self.store.keys(keys::LIVENESS_PREFIX).await?;
        let mut channels: Vec<Channel> = keys
            .iter()
            .filter_map(|key| keys::liveness_channel(key))
            .collect();
        channels.sort();
        Ok(channels)
    }

    /// Expiry state of every liveness key
    pub async fn liveness_ttls(&self) -> Result<Vec<(Channel, KeyTtl)>> {
        let mut out = Vec::new();
        for key in self.store.keys(keys::LIVENESS_PREFIX).await? {
            if let Some(channel) = keys::liveness_channel(&key) {
                out.push((channel, self.store.ttl(&key).await?));
            }
        }
        Ok(out)
    }

    /// Re-arm the expiry of a liveness key
    pub async fn rearm_liveness(&self, channel: Channel, ttl: Duration) -> Result<bool> {
        self.store.expire(&keys::liveness(channel), ttl).await
    }

    /// Liveness window the orchestrator published for `channel`
    pub async fn liveness_window(&self, channel: Channel) -> Result<Option<Duration>> {
        match self.store.get(&keys::liveness_ttl(channel)).await? {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .map(|secs| Some(Duration::from_secs(secs)))
                .map_err(|_| Error::store(format!("Bad liveness window for {}: {}", channel, raw))),
            None => Ok(None),
        }
    }

    pub async fn publish_liveness_window(&self, channel: Channel, ttl: Duration) -> Result<()> {
        self.store
            .set(&keys::liveness_ttl(channel), &ttl.as_secs().to_string())
            .await
    }

    // ------------------------------------------------------------------
    // Observations
    // ------------------------------------------------------------------

    /// Insert or refresh an access point record
    pub async fn upsert_access_point(&self, ap: &AccessPoint, ttl: Duration) -> Result<()> {
        let key = keys::access_point(ap.bssid);
        let merged = match self.read_json::<AccessPoint>(&key).await? {
            Some(mut existing) => {
                existing.refresh(ap);
                existing
            }
            None => ap.clone(),
        };
        let json = serde_json::to_string(&merged)?;
        self.store.set_with_ttl(&key, &json, ttl).await
    }

    pub async fn access_point(&self, bssid: MacAddr) -> Result<Option<AccessPoint>> {
        self.read_json(&keys::access_point(bssid)).await
    }

    /// Every access point record still alive
    pub async fn access_points(&self) -> Result<Vec<AccessPoint>> {
        self.read_all(keys::AP_PREFIX).await
    }

    /// Insert or refresh a client record
    pub async fn upsert_client(&self, client: &Client, ttl: Duration) -> Result<()> {
        let key = keys::client(client.mac);
        let merged = match self.read_json::<Client>(&key).await? {
            Some(mut existing) => {
                existing.refresh(client);
                existing
            }
            None => client.clone(),
        };
        let json = serde_json::to_string(&merged)?;
        self.store.set_with_ttl(&key, &json, ttl).await
    }

    pub async fn client(&self, mac: MacAddr) -> Result<Option<Client>> {
        self.read_json(&keys::client(mac)).await
    }

    pub async fn clients(&self) -> Result<Vec<Client>> {
        self.read_all(keys::CLIENT_PREFIX).await
    }

    pub async fn set_probe_candidates(&self, candidates: &[MacAddr], ttl: Duration) -> Result<()> {
        let json = serde_json::to_string(candidates)?;
        self.store
            .set_with_ttl(keys::PROBE_CANDIDATES, &json, ttl)
            .await
    }

    pub async fn probe_candidates(&self) -> Result<Vec<MacAddr>> {
        Ok(self
            .read_json(keys::PROBE_CANDIDATES)
            .await?
            .unwrap_or_default())
    }

    /// Distinct beaconing BSSIDs seen on `channel` during a flood
    pub async fn set_flood_beacons(&self, channel: Channel, count: usize, ttl: Duration) -> Result<()> {
        self.store
            .set_with_ttl(&keys::flood_beacons(channel), &count.to_string(), ttl)
            .await
    }

    pub async fn flood_beacons(&self, channel: Channel) -> Result<Option<usize>> {
        match self.store.get(&keys::flood_beacons(channel)).await? {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| Error::store(format!("Bad beacon count: {}", raw))),
            None => Ok(None),
        }
    }

    async fn read_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.store.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Read every JSON record under `prefix`, skipping ones that vanish or
    /// fail to decode between listing and reading
    async fn read_all<T: serde::de::DeserializeOwned>(&self, prefix: &str) -> Result<Vec<T>> {
        let mut out = Vec::new();
        for key in self.store.keys(prefix).await? {
            match self.read_json(&key).await {
                Ok(Some(record)) => out.push(record),
                Ok(None) => debug!(key = %key, "Record expired while listing"),
                Err(Error::Serialization(e)) => {
                    warn!(key = %key, error = %e, "Skipping undecodable record")
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}
