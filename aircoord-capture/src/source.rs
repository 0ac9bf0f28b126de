//! Frame metadata sources
//!
//! Frame capture itself happens outside aircoord. A capture helper hands the
//! analyzer one JSON object per line describing each frame it decoded.

use aircoord_core::{Error, FrameInfo, Result};
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

/// Supplier of decoded frame metadata
#[async_trait]
pub trait FrameSource: Send {
    /// Frames that arrived since the previous call.
    ///
    /// An empty batch means nothing arrived; `None` means the source is
    /// exhausted and will never yield again.
    async fn next_batch(&mut self) -> Result<Option<Vec<FrameInfo>>>;
}

/// Newline-delimited JSON frame source
pub struct JsonLinesSource<R> {
    reader: R,
    /// Partial line carried over between polls
    pending: Vec<u8>,
    poll_interval: Duration,
    max_batch: usize,
    finished: bool,
    malformed: u64,
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            poll_interval: Duration::from_millis(200),
            max_batch: 256,
            finished: false,
            malformed: 0,
        }
    }

    /// How long one call waits for the next line before returning
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.max(1);
        self
    }

    /// Lines skipped because they did not decode
    pub fn malformed(&self) -> u64 {
        self.malformed
    }

    fn decode_pending(&mut self) -> Option<FrameInfo> {
        let line = std::mem::take(&mut self.pending);
        let text = String::from_utf8_lossy(&line);
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        match serde_json::from_str::<FrameInfo>(text) {
            Ok(frame) => Some(frame),
            Err(e) => {
                self.malformed += 1;
                warn!(error = %e, "Skipping malformed frame record");
                None
            }
        }
    }
}

#[async_trait]
impl<R> FrameSource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_batch(&mut self) -> Result<Option<Vec<FrameInfo>>> {
        if self.finished {
            return Ok(None);
        }

        let mut batch = Vec::new();
        while batch.len() < self.max_batch {
            // read_until is cancel safe: a timed out read leaves its bytes in
            // `pending` for the next call
            let read = tokio::time::timeout(
                self.poll_interval,
                self.reader.read_until(b'\n', &mut self.pending),
            )
            .await;

            match read {
                Err(_) => break,
                Ok(Ok(0)) => {
                    debug!("Frame source reached end of input");
                    self.finished = true;
                    batch.extend(self.decode_pending());
                    break;
                }
                Ok(Ok(_)) => {
                    if self.pending.last() == Some(&b'\n') {
                        batch.extend(self.decode_pending());
                    }
                }
                Ok(Err(e)) => {
                    return Err(Error::FrameSource(format!("Read failed: {}", e)));
                }
            }
        }

        if self.finished && batch.is_empty() {
            return Ok(None);
        }
        Ok(Some(batch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aircoord_core::FrameKind;
    use tokio::io::{AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_reads_lines_until_eof() {
        let input = concat!(
            r#"{"kind":"beacon","interface":"wlan0mon","bssid":"00:11:22:33:44:55","essid":"corp","channel":6}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"kind":"probe_request","interface":"wlan0mon","source":"aa:bb:cc:dd:ee:ff"}"#,
        );
        let mut source = JsonLinesSource::new(BufReader::new(input.as_bytes()));

        let batch = source.next_batch().await.unwrap().unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].kind, FrameKind::Beacon);
        assert_eq!(batch[1].kind, FrameKind::ProbeRequest);
        assert_eq!(source.malformed(), 1);

        assert!(source.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_batches_are_bounded() {
        let line = r#"{"kind":"data","interface":"wlan0mon"}"#;
        let input = format!("{}\n{}\n{}\n", line, line, line);
        let mut source = JsonLinesSource::new(BufReader::new(input.as_bytes())).with_max_batch(2);

        assert_eq!(source.next_batch().await.unwrap().unwrap().len(), 2);
        assert_eq!(source.next_batch().await.unwrap().unwrap().len(), 1);
        assert!(source.next_batch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_idle_source_yields_empty_batch() {
        let (reader, mut writer) = tokio::io::duplex(1024);
        let mut source = JsonLinesSource::new(BufReader::new(reader))
            .with_poll_interval(Duration::from_millis(20));

        writer.write_all(br#"{"kind":"beacon","#).await.unwrap();
        assert!(source.next_batch().await.unwrap().unwrap().is_empty());

        writer
            .write_all(br#""interface":"wlan1mon"}"#)
            .await
            .unwrap();
        writer.write_all(b"\n").await.unwrap();
        let batch = source.next_batch().await.unwrap().unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].interface, "wlan1mon");
    }
}
