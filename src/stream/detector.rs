//! Protocol type detection for streams whose wire format is unknown. Bytes
//! are buffered and probed after every append; the first probe that commits
//! decides the mode, and the buffered bytes are handed over so the real
//! parser can be primed with them.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::crypto;
use crate::dlms;
use crate::hdlc;
use crate::stream::StreamParser;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolMode {
    Dsmr,
    Dlms,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectedProtocol {
    pub mode: ProtocolMode,
    pub encrypted: bool,
    /// Everything buffered from the detected start-of-frame onward.
    pub buffered_data: Vec<u8>,
}

pub type DetectCallback = Box<dyn FnMut(DetectedProtocol)>;

/// Outcome of one probe: a committed detection, or whether the probe is
/// certain the current buffer can never satisfy it.
struct Probe {
    found: Option<(ProtocolMode, bool, usize)>,
    can_clear: bool,
}

impl Probe {
    fn found(mode: ProtocolMode, encrypted: bool, sof: usize) -> Self {
        Probe {
            found: Some((mode, encrypted, sof)),
            can_clear: false,
        }
    }

    fn waiting() -> Self {
        Probe {
            found: None,
            can_clear: false,
        }
    }

    fn hopeless() -> Self {
        Probe {
            found: None,
            can_clear: true,
        }
    }
}

/// DSMR: a `/` followed (later) by a CRLF, with only ASCII in between.
fn probe_dsmr(buffer: &[u8]) -> Probe {
    let sof = match buffer.iter().position(|&b| b == b'/') {
        Some(position) => position,
        None => return Probe::hopeless(),
    };
    let candidate = &buffer[sof..];
    if candidate.iter().any(|&b| b > 0x7F) {
        return Probe::hopeless();
    }
    if candidate.windows(2).any(|w| w == b"\r\n") {
        return Probe::found(ProtocolMode::Dsmr, false, sof);
    }
    Probe::waiting()
}

/// DLMS: an HDLC flag with a decodable header and the LLC signature behind
/// it; the byte after the LLC tells plaintext from GCM-wrapped payloads.
fn probe_dlms(buffer: &[u8]) -> Probe {
    let sof = match buffer.iter().position(|&b| b == hdlc::FLAG) {
        Some(position) => position,
        None => return Probe::hopeless(),
    };
    let candidate = &buffer[sof..];
    /* commit only once 14 bytes follow the flag, enough for a worst-case
     * header plus the LLC signature */
    if candidate.len() < 15 {
        return Probe::waiting();
    }
    let header = match hdlc::decode_header(candidate) {
        Ok(header) => header,
        Err(_) => return Probe::hopeless(),
    };
    let llc_end = header.header_length + 3;
    if candidate.len() < llc_end + 1 {
        return Probe::waiting();
    }
    if candidate[header.header_length..llc_end] != dlms::LLC_HEADER {
        return Probe::hopeless();
    }
    let encrypted = candidate[llc_end] == crypto::FRAME_TAG;
    Probe::found(ProtocolMode::Dlms, encrypted, sof)
}

/// Encrypted DSMR: a 0xDB with a decodable GCM envelope header behind it.
fn probe_encrypted_dsmr(buffer: &[u8]) -> Probe {
    let sof = match buffer.iter().position(|&b| b == crypto::FRAME_TAG) {
        Some(position) => position,
        None => return Probe::hopeless(),
    };
    let candidate = &buffer[sof..];
    if candidate.len() < crypto::HEADER_LEN {
        return Probe::waiting();
    }
    match crypto::decode_header(candidate) {
        Ok(_) => Probe::found(ProtocolMode::Dsmr, true, sof),
        Err(_) => Probe::hopeless(),
    }
}

pub struct ProtocolDetector {
    buffer: Vec<u8>,
    callback: DetectCallback,
    decided: bool,
    destroyed: bool,
}

impl ProtocolDetector {
    pub fn new(callback: DetectCallback) -> Self {
        ProtocolDetector {
            buffer: Vec::new(),
            callback,
            decided: false,
            destroyed: false,
        }
    }

    fn probe(&mut self) {
        let probes = [
            probe_dsmr(&self.buffer),
            probe_dlms(&self.buffer),
            probe_encrypted_dsmr(&self.buffer),
        ];
        for probe in &probes {
            if let Some((mode, encrypted, sof)) = probe.found {
                debug!("detected {:?} (encrypted: {})", mode, encrypted);
                self.decided = true;
                let buffered_data = self.buffer.split_off(sof);
                self.buffer.clear();
                (self.callback)(DetectedProtocol {
                    mode,
                    encrypted,
                    buffered_data,
                });
                return;
            }
        }
        if probes.iter().all(|p| p.can_clear) {
            debug!("no probe can match, dropping {} bytes", self.buffer.len());
            self.buffer.clear();
        }
    }
}

impl StreamParser for ProtocolDetector {
    fn on_data(&mut self, bytes: &[u8]) {
        if self.destroyed || self.decided {
            return;
        }
        self.buffer.extend_from_slice(bytes);
        self.probe();
    }

    /// The detector has no frame watchdog; expiry is meaningless here.
    fn on_timeout(&mut self) {}

    fn poll_timeout(&mut self) {}

    fn destroy(&mut self) {
        self.destroyed = true;
        self.buffer.clear();
    }

    fn clear(&mut self) {
        self.buffer.clear();
    }

    fn current_buffer_size(&self) -> usize {
        self.buffer.len()
    }

    /// No single byte: the detector watches for `/`, 0x7E and 0xDB at once.
    fn start_of_frame_byte(&self) -> u8 {
        0x00
    }
}
