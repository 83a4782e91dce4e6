//! Output relay for streamed runs
//!
//! Decodes raw process output into UTF-8 text, replacing invalid bytes, and
//! forwards it to a bounded channel. The relay is consumed by
//! [`OutputRelay::finish`], so the terminal event is sent exactly once and
//! nothing can follow it.

use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::event::StreamEvent;

/// How long a best-effort notice may wait for channel capacity
const NOTICE_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Why a chunk could not be relayed
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("stream consumer disconnected")]
    Disconnected,
}

/// Incremental UTF-8 decoder that carries split multi-byte sequences
///
/// Invalid sequences become U+FFFD, so decoding never fails.
#[derive(Debug, Default)]
pub struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    /// Decode as much of `pending + bytes` as forms complete characters
    pub fn decode(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut text = String::with_capacity(self.pending.len());
        let mut start = 0;
        loop {
            let rest = &self.pending[start..];
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    text.push_str(valid);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid = e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&rest[..valid]));
                    match e.error_len() {
                        Some(len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            start += valid + len;
                        }
                        // incomplete tail, wait for the next read
                        None => {
                            start += valid;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
        text
    }

    /// Flush a partial character left over at end of input
    pub fn finish(&mut self) -> String {
        let tail = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        tail
    }
}

/// Delivers one run's events to its consumer
pub struct OutputRelay {
    tx: mpsc::Sender<StreamEvent>,
    decoder: Utf8Decoder,
    cancel_on_disconnect: bool,
    disconnected: bool,
}

impl OutputRelay {
    pub fn new(tx: mpsc::Sender<StreamEvent>, cancel_on_disconnect: bool) -> Self {
        Self {
            tx,
            decoder: Utf8Decoder::default(),
            cancel_on_disconnect,
            disconnected: false,
        }
    }

    /// Decode and forward raw output
    ///
    /// Returns [`RelayError::Disconnected`] only when the consumer is gone and
    /// disconnects cancel the run; otherwise undeliverable chunks are dropped.
    pub async fn push(&mut self, bytes: &[u8]) -> Result<(), RelayError> {
        let text = self.decoder.decode(bytes);
        self.send_text(text).await
    }

    /// Flush the decoder at end of output
    pub async fn finish_input(&mut self) -> Result<(), RelayError> {
        let tail = self.decoder.finish();
        self.send_text(tail).await
    }

    /// Deliver a chunk that must reach a connected consumer, such as `[error]`
    pub async fn report(&mut self, text: &str) -> Result<(), RelayError> {
        self.deliver(StreamEvent::chunk(text)).await
    }

    /// Best-effort notice chunk such as `[timeout]`; failures are swallowed
    pub async fn notice(&mut self, text: &str) {
        if self.disconnected {
            return;
        }
        if let Err(e) = self
            .tx
            .send_timeout(StreamEvent::chunk(text), NOTICE_SEND_TIMEOUT)
            .await
        {
            debug!("Dropped stream notice {:?}: {}", text.trim_end(), e);
        }
    }

    /// Resolves when the consumer is gone and disconnects cancel the run
    pub async fn closed(&self) {
        if self.cancel_on_disconnect {
            self.tx.closed().await;
        } else {
            std::future::pending::<()>().await;
        }
    }

    /// Send the terminal event, consuming the relay
    pub async fn finish(self, event: StreamEvent) {
        debug_assert!(event.is_terminal());
        if self.tx.send(event).await.is_err() {
            debug!("Stream consumer gone before terminal event");
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), RelayError> {
        if text.is_empty() {
            return Ok(());
        }
        self.deliver(StreamEvent::chunk(text)).await
    }

    async fn deliver(&mut self, event: StreamEvent) -> Result<(), RelayError> {
        if self.disconnected {
            return Ok(());
        }
        if self.tx.send(event).await.is_err() {
            self.disconnected = true;
            if self.cancel_on_disconnect {
                return Err(RelayError::Disconnected);
            }
            warn!("Stream consumer disconnected, letting the run finish");
        }
        Ok(())
    }
}
