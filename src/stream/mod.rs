//! Incremental stream parsers. Each flavor is a passive state machine fed
//! arbitrary byte chunks through `on_data`; frames are decoded and emitted
//! synchronously through the configured callback, in arrival order, with
//! trailing bytes carried over to the next chunk.
//!
//! The frame-complete watchdog is a passive deadline: the host's timer
//! facility is expected to invoke `on_timeout` (or `poll_timeout`) on
//! expiry, serialized with `on_data`. Parsers never spawn threads.

use std::time::{Duration, Instant};

use crate::error::ParseError;
use crate::reading::Reading;

pub mod detector;
pub mod dlms;
pub mod dsmr;
pub mod dsmr_encrypted;

pub use detector::{DetectCallback, DetectedProtocol, ProtocolDetector, ProtocolMode};
pub use dlms::DlmsStreamParser;
pub use dsmr::DsmrStreamParser;
pub use dsmr_encrypted::EncryptedDsmrStreamParser;

/// Default watchdog: a frame must complete within this many milliseconds of
/// its start-of-frame byte.
pub const DEFAULT_FRAME_TIMEOUT_MS: u64 = 5000;

/// Callback invoked once per frame: error, decoded record, raw frame bytes.
pub type ReadingCallback = Box<dyn FnMut(Option<ParseError>, Option<Reading>, Option<&[u8]>)>;

/// Construction options shared by all stream parser flavors.
#[derive(Clone)]
pub struct ParserOptions {
    /// 16-byte AES-128 key; required for the encrypted modes.
    pub decryption_key: Option<Vec<u8>>,
    /// Optional AAD; a 16-byte value is prefixed with 0x30 internally.
    pub additional_authenticated_data: Option<Vec<u8>>,
    /// Line separator for DSMR telegrams: `"\r\n"` (default) or `"\n"`.
    pub new_line_chars: String,
    /// In unencrypted DSMR mode, scan for 0xDB and report that decryption
    /// is required instead of silently discarding the stream.
    pub detect_encryption: bool,
    /// Watchdog between start-of-frame and frame-complete, in ms.
    pub full_frame_required_within_ms: u64,
    /// Bytes to prime the buffer with before data events start (typically
    /// handed over by the protocol detector).
    pub initial_data: Option<Vec<u8>>,
}

impl Default for ParserOptions {
    fn default() -> Self {
        ParserOptions {
            decryption_key: None,
            additional_authenticated_data: None,
            new_line_chars: "\r\n".to_string(),
            detect_encryption: false,
            full_frame_required_within_ms: DEFAULT_FRAME_TIMEOUT_MS,
            initial_data: None,
        }
    }
}

/// Common incremental-parser surface implemented by all four flavors.
pub trait StreamParser {
    fn on_data(&mut self, bytes: &[u8]);

    /// Deliver watchdog expiry. Safe to call at any time; a parser without a
    /// frame in progress treats it as a no-op.
    fn on_timeout(&mut self);

    /// Fire `on_timeout` iff the deadline has actually passed.
    fn poll_timeout(&mut self);

    /// Detach from the producer: cancels the watchdog, drops buffered state
    /// and ignores all subsequent bytes.
    fn destroy(&mut self);

    fn clear(&mut self);

    fn current_buffer_size(&self) -> usize;

    fn start_of_frame_byte(&self) -> u8;
}

/// Passive frame deadline. Armed when a start-of-frame is seen, disarmed
/// when a frame completes; never reset by mid-frame fragments.
pub(crate) struct Watchdog {
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Watchdog {
    pub(crate) fn new(timeout_ms: u64) -> Self {
        Watchdog {
            timeout: Duration::from_millis(timeout_ms),
            deadline: None,
        }
    }

    pub(crate) fn arm(&mut self) {
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.timeout);
        }
    }

    pub(crate) fn disarm(&mut self) {
        self.deadline = None;
    }

    pub(crate) fn armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub(crate) fn expired(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watchdog_arming() {
        let mut watchdog = Watchdog::new(5000);
        assert!(!watchdog.armed());
        assert!(!watchdog.expired());

        watchdog.arm();
        assert!(watchdog.armed());
        assert!(!watchdog.expired());

        /* arming twice keeps the original deadline */
        let first = watchdog.deadline;
        watchdog.arm();
        assert_eq!(watchdog.deadline, first);

        watchdog.disarm();
        assert!(!watchdog.armed());
    }

    #[test]
    fn test_watchdog_zero_timeout_expires_immediately() {
        let mut watchdog = Watchdog::new(0);
        watchdog.arm();
        assert!(watchdog.expired());
    }

    #[test]
    fn test_default_options() {
        let options = ParserOptions::default();
        assert_eq!(options.new_line_chars, "\r\n");
        assert_eq!(options.full_frame_required_within_ms, 5000);
        assert!(options.decryption_key.is_none());
        assert!(!options.detect_encryption);
    }
}
