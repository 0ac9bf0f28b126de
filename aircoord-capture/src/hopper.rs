//! Channel hopper
//!
//! Cycles one radio interface through a channel list in round-robin order.
//! Two things can pin it to a single channel, checked in this order:
//!
//! 1. an in-process force set through [`HopperHandle::force_channel`]
//! 2. the `current_channel` lock key in the shared store
//!
//! A failed channel switch is logged and the hopper moves on to the next
//! channel on the following step.

use aircoord_core::{Channel, Error, RadioInterface, Result};
use aircoord_store::StateClient;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::stats::{ActivityStats, StatsAccumulator};

/// Cloneable control surface of a running hopper
#[derive(Debug, Clone)]
pub struct HopperHandle {
    forced: Arc<RwLock<Option<Channel>>>,
    tuned: Arc<RwLock<Option<Channel>>>,
    running: Arc<AtomicBool>,
}

impl HopperHandle {
    /// Pin the hopper to `channel` until [`unforce_channel`](Self::unforce_channel)
    pub fn force_channel(&self, channel: Channel) {
        info!(channel = %channel, "Forcing hopper channel");
        *self.forced.write() = Some(channel);
    }

    /// Resume round-robin hopping
    pub fn unforce_channel(&self) {
        if self.forced.write().take().is_some() {
            info!("Hopper channel released");
        }
    }

    pub fn forced_channel(&self) -> Option<Channel> {
        *self.forced.read()
    }

    /// Channel the hopper is dwelling on.
    ///
    /// A forced channel is reported as soon as it is set, before the next
    /// step tunes the radio.
    pub fn current_channel(&self) -> Option<Channel> {
        self.forced_channel().or(*self.tuned.read())
    }

    /// False once [`stop`](Self::stop) has been called
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Ask [`ChannelHopper::run`] to return after its current dwell. A stop
    /// issued before `run` makes it return without hopping.
    pub fn stop(&self) {
        self.running.store(false, Ordering::Relaxed);
    }
}

/// Round-robin channel hopper for one interface
pub struct ChannelHopper {
    interface: RadioInterface,
    channels: Vec<Channel>,
    dwell: Duration,
    position: usize,
    /// Store used for the lock key and for publishing the tuned channel
    state: Option<StateClient>,
    /// Last lock value read from the store
    store_lock: Option<Channel>,
    handle: HopperHandle,
    stats: StatsAccumulator,
}

impl ChannelHopper {
    /// Create a hopper over `channels`, which must not be empty
    pub fn new(interface: RadioInterface, channels: Vec<Channel>, dwell: Duration) -> Result<Self> {
        if channels.is_empty() {
            return Err(Error::config("Hopper needs at least one channel"));
        }

        Ok(Self {
            interface,
            channels,
            dwell,
            position: 0,
            state: None,
            store_lock: None,
            handle: HopperHandle {
                forced: Arc::new(RwLock::new(None)),
                tuned: Arc::new(RwLock::new(None)),
                running: Arc::new(AtomicBool::new(true)),
            },
            stats: StatsAccumulator::new(),
        })
    }

    /// Follow the store's lock key and publish every tuned channel
    pub fn with_state(mut self, state: StateClient) -> Self {
        self.state = Some(state);
        self
    }

    pub fn handle(&self) -> HopperHandle {
        self.handle.clone()
    }

    pub fn interface(&self) -> &str {
        &self.interface.name
    }

    pub fn force_channel(&self, channel: Channel) {
        self.handle.force_channel(channel);
    }

    pub fn unforce_channel(&self) {
        self.handle.unforce_channel();
    }

    pub fn current_channel(&self) -> Option<Channel> {
        self.handle.current_channel()
    }

    pub fn stats(&self) -> ActivityStats {
        self.stats.snapshot()
    }

    /// Hop until stopped through the handle
    pub async fn run(&mut self) {
        info!(
            interface = %self.interface.name,
            channels = self.channels.len(),
            dwell_ms = self.dwell.as_millis() as u64,
            "Channel hopper started"
        );

        while self.handle.is_running() {
            self.step().await;
            tokio::time::sleep(self.dwell).await;
        }

        info!(interface = %self.interface.name, "Channel hopper stopped");
    }

    /// One hopper iteration: pick the channel and tune to it.
    ///
    /// Returns the channel the hopper is now dwelling on, which may differ
    /// from the chosen one if the switch failed.
    pub async fn step(&mut self) -> Option<Channel> {
        let lock = match self.handle.forced_channel() {
            Some(forced) => Some(forced),
            None => self.read_store_lock().await,
        };

        let (target, locked) = match lock {
            Some(channel) => (channel, true),
            None => (self.next_channel(), false),
        };

        // Stay put without re-tuning when already on the locked channel
        if locked && *self.handle.tuned.read() == Some(target) {
            return Some(target);
        }

        match self.interface.set_channel(target).await {
            Ok(()) => {
                debug!(interface = %self.interface.name, channel = %target, locked, "Tuned");
                *self.handle.tuned.write() = Some(target);
                self.stats.record_hop();
                self.publish(target).await;
            }
            Err(e) => {
                warn!(
                    interface = %self.interface.name,
                    channel = %target,
                    error = %e,
                    "Channel switch failed"
                );
                self.stats.record_channel_error();
            }
        }

        self.handle.current_channel()
    }

    fn next_channel(&mut self) -> Channel {
        let channel = self.channels[self.position % self.channels.len()];
        self.position = (self.position + 1) % self.channels.len();
        channel
    }

    async fn read_store_lock(&mut self) -> Option<Channel> {
        let Some(state) = &self.state else {
            return None;
        };
        match state.locked_channel().await {
            Ok(lock) => {
                if lock != self.store_lock {
                    info!(interface = %self.interface.name, lock = ?lock, "Store channel lock changed");
                }
                self.store_lock = lock;
            }
            Err(e) => {
                // Keep the last known lock until the store answers again
                warn!(error = %e, "Failed to read channel lock");
                self.stats.record_store_error();
            }
        }
        self.store_lock
    }

    async fn publish(&self, channel: Channel) {
        if let Some(state) = &self.state {
            if let Err(e) = state.set_radio_channel(&self.interface.name, channel).await {
                warn!(error = %e, "Failed to publish radio channel");
                self.stats.record_store_error();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircoord_core::Radio;
    use aircoord_store::MemoryStore;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    struct RecordingRadio {
        tuned: Arc<Mutex<Vec<Channel>>>,
        broken: Option<Channel>,
    }

    #[async_trait]
    impl Radio for RecordingRadio {
        async fn set_channel(&self, _interface: &str, channel: Channel) -> Result<()> {
            if self.broken == Some(channel) {
                return Err(Error::Radio(format!("cannot tune to {}", channel)));
            }
            self.tuned.lock().push(channel);
            Ok(())
        }
    }

    fn ch(n: u16) -> Channel {
        Channel::new(n).unwrap()
    }

    fn hopper(radio: RecordingRadio, channels: &[u16]) -> ChannelHopper {
        ChannelHopper::new(
            RadioInterface::new("wlan0mon", Box::new(radio)),
            channels.iter().map(|&n| ch(n)).collect(),
            Duration::from_millis(250),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_channel_list_rejected() {
        let result = ChannelHopper::new(
            RadioInterface::new("wlan0mon", Box::new(RecordingRadio::default())),
            vec![],
            Duration::from_millis(250),
        );
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_round_robin() {
        let radio = RecordingRadio::default();
        let mut hopper = hopper(radio.clone(), &[1, 6, 11]);

        for _ in 0..4 {
            hopper.step().await;
        }

        assert_eq!(*radio.tuned.lock(), vec![ch(1), ch(6), ch(11), ch(1)]);
        assert_eq!(hopper.current_channel(), Some(ch(1)));
        assert_eq!(hopper.stats().hops, 4);
    }

    #[tokio::test]
    async fn test_forced_channel_holds_until_unforced() {
        let radio = RecordingRadio::default();
        let mut hopper = hopper(radio.clone(), &[1, 6, 11]);
        hopper.step().await;

        hopper.force_channel(ch(6));
        assert_eq!(hopper.current_channel(), Some(ch(6)));
        for _ in 0..10 {
            assert_eq!(hopper.step().await, Some(ch(6)));
            assert_eq!(hopper.current_channel(), Some(ch(6)));
        }
        // Tuned once, then held
        assert_eq!(*radio.tuned.lock(), vec![ch(1), ch(6)]);

        hopper.unforce_channel();
        hopper.step().await;
        assert_eq!(hopper.current_channel(), Some(ch(6)));
        hopper.step().await;
        assert_eq!(hopper.current_channel(), Some(ch(11)));
    }

    #[tokio::test]
    async fn test_failed_switch_moves_on() {
        let radio = RecordingRadio {
            broken: Some(ch(6)),
            ..Default::default()
        };
        let mut hopper = hopper(radio.clone(), &[1, 6, 11]);

        assert_eq!(hopper.step().await, Some(ch(1)));
        // Still on 1 after the failed switch to 6
        assert_eq!(hopper.step().await, Some(ch(1)));
        assert_eq!(hopper.step().await, Some(ch(11)));

        assert_eq!(*radio.tuned.lock(), vec![ch(1), ch(11)]);
        let stats = hopper.stats();
        assert_eq!(stats.hops, 2);
        assert_eq!(stats.channel_errors, 1);
    }

    #[tokio::test]
    async fn test_follows_store_lock_and_publishes() {
        let state = StateClient::new(Arc::new(MemoryStore::new()));
        let radio = RecordingRadio::default();
        let mut hopper = hopper(radio.clone(), &[1, 6, 11]).with_state(state.clone());

        hopper.step().await;
        assert_eq!(state.radio_channel("wlan0mon").await.unwrap(), Some(ch(1)));

        state.lock_channel(ch(11)).await.unwrap();
        hopper.step().await;
        hopper.step().await;
        assert_eq!(hopper.current_channel(), Some(ch(11)));
        assert_eq!(state.radio_channel("wlan0mon").await.unwrap(), Some(ch(11)));

        // An in-process force beats the store lock
        hopper.force_channel(ch(6));
        hopper.step().await;
        assert_eq!(*radio.tuned.lock().last().unwrap(), ch(6));

        hopper.unforce_channel();
        state.unlock_channel().await.unwrap();
        hopper.step().await;
        assert_eq!(*radio.tuned.lock(), vec![ch(1), ch(11), ch(6), ch(6)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_through_handle() {
        let radio = RecordingRadio::default();
        let mut hopper = hopper(radio.clone(), &[1, 6, 11]);
        let handle = hopper.handle();

        let task = tokio::spawn(async move {
            hopper.run().await;
            hopper
        });

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(handle.is_running());
        handle.stop();

        let hopper = task.await.unwrap();
        assert!(!handle.is_running());
        assert!(hopper.stats().hops >= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_run_is_kept() {
        let radio = RecordingRadio::default();
        let mut hopper = hopper(radio.clone(), &[1, 6, 11]);
        hopper.handle().stop();

        tokio::time::timeout(Duration::from_secs(5), hopper.run())
            .await
            .unwrap();

        assert!(radio.tuned.lock().is_empty());
        assert_eq!(hopper.stats().hops, 0);
    }
}
