//! Radio interface control
//!
//! Changing the channel of a monitor interface is the only hardware
//! operation the coordination layer performs, and it goes through the
//! `Radio` trait so the hopper never touches nl80211 directly.

use async_trait::async_trait;
use std::fmt;
use tokio::process::Command;
use tracing::debug;

use crate::{Channel, Error, Result};

/// Something that can tune a named interface to a channel
#[async_trait]
pub trait Radio: Send + Sync {
    /// Tune `interface` to `channel`
    async fn set_channel(&self, interface: &str, channel: Channel) -> Result<()>;
}

/// Radio backed by the `iw` command line tool
#[derive(Debug, Clone)]
pub struct IwRadio {
    /// Path or name of the iw binary
    program: String,
}

impl IwRadio {
    /// Use `iw` from `PATH`
    pub fn new() -> Self {
        Self {
            program: "iw".to_string(),
        }
    }

    /// Use a specific iw binary
    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl Default for IwRadio {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Radio for IwRadio {
    async fn set_channel(&self, interface: &str, channel: Channel) -> Result<()> {
        debug!(interface = %interface, channel = %channel, "Setting channel via iw");

        let output = Command::new(&self.program)
            .args(["dev", interface, "set", "channel", &channel.to_string()])
            .output()
            .await
            .map_err(|e| Error::Radio(format!("Failed to run {}: {}", self.program, e)))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(Error::Radio(format!(
                "{} exited with {} setting {} to channel {}: {}",
                self.program,
                output.status,
                interface,
                channel,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

/// A monitor-mode interface name plus the radio that drives it
pub struct RadioInterface {
    pub name: String,
    pub radio: Box<dyn Radio>,
}

impl RadioInterface {
    pub fn new(name: impl Into<String>, radio: Box<dyn Radio>) -> Self {
        Self {
            name: name.into(),
            radio,
        }
    }

    /// Tune this interface
    pub async fn set_channel(&self, channel: Channel) -> Result<()> {
        self.radio.set_channel(&self.name, channel).await
    }
}

impl fmt::Debug for RadioInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RadioInterface")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_iw_radio_missing_binary_is_error() {
        let radio = IwRadio::with_program("/nonexistent/iw-binary");
        let result = radio
            .set_channel("wlan0mon", Channel::new(6).unwrap())
            .await;
        assert!(matches!(result, Err(Error::Radio(_))));
    }

    #[tokio::test]
    async fn test_iw_radio_nonzero_exit_is_error() {
        // `false` ignores its arguments and exits 1
        let radio = IwRadio::with_program("false");
        let result = radio
            .set_channel("wlan0mon", Channel::new(6).unwrap())
            .await;
        assert!(matches!(result, Err(Error::Radio(_))));
    }

    #[tokio::test]
    async fn test_iw_radio_success() {
        let radio = IwRadio::with_program("true");
        let iface = RadioInterface::new("wlan0mon", Box::new(radio));
        assert!(iface.set_channel(Channel::new(1).unwrap()).await.is_ok());
    }
}
