//! Incremental parser for GCM-wrapped DSMR telegrams (Luxembourg style).

use log::debug;

use crate::crypto;
use crate::dsmr;
use crate::error::ParseError;
use crate::stream::{ParserOptions, ReadingCallback, StreamParser, Watchdog};

pub struct EncryptedDsmrStreamParser {
    buffer: Vec<u8>,
    options: ParserOptions,
    callback: ReadingCallback,
    watchdog: Watchdog,
    destroyed: bool,
}

impl EncryptedDsmrStreamParser {
    pub fn new(mut options: ParserOptions, callback: ReadingCallback) -> Self {
        let watchdog = Watchdog::new(options.full_frame_required_within_ms);
        let initial = options.initial_data.take();

        let mut parser = EncryptedDsmrStreamParser {
            buffer: Vec::new(),
            options,
            callback,
            watchdog,
            destroyed: false,
        };
        if let Some(data) = initial {
            parser.on_data(&data);
        }
        parser
    }

    fn process(&mut self) {
        loop {
            if self.destroyed || self.buffer.is_empty() {
                return;
            }

            let sof = match self.buffer.iter().position(|&b| b == crypto::FRAME_TAG) {
                Some(position) => position,
                None => {
                    let raw = std::mem::take(&mut self.buffer);
                    (self.callback)(Some(ParseError::StartOfFrameNotFound), None, Some(&raw));
                    return;
                }
            };
            if sof > 0 {
                self.buffer.drain(..sof);
            }
            self.watchdog.arm();

            if self.buffer.len() < crypto::HEADER_LEN {
                return;
            }
            let header = match crypto::decode_header(&self.buffer) {
                Ok(header) => header,
                Err(error) => {
                    /* header decode errors clear the buffer and surface */
                    let raw = std::mem::take(&mut self.buffer);
                    self.watchdog.disarm();
                    (self.callback)(Some(error), None, Some(&raw));
                    return;
                }
            };
            let total = header.frame_length();
            if self.buffer.len() < total {
                return;
            }

            let frame: Vec<u8> = self.buffer.drain(..total).collect();
            self.watchdog.disarm();
            self.emit(&frame);
        }
    }

    fn emit(&mut self, frame: &[u8]) {
        let key = match &self.options.decryption_key {
            Some(key) => key.clone(),
            None => {
                (self.callback)(Some(ParseError::DecryptionRequired), None, Some(frame));
                return;
            }
        };
        let aad = self.options.additional_authenticated_data.clone();

        let decrypted = match crypto::decrypt_frame(frame, &key, aad.as_deref()) {
            Ok(decrypted) => decrypted,
            Err(error) => {
                (self.callback)(Some(error), None, Some(frame));
                return;
            }
        };
        debug!(
            "decrypted {} plaintext bytes (authenticated: {})",
            decrypted.plaintext.len(),
            decrypted.authenticated
        );

        match dsmr::parse_telegram(&decrypted.plaintext, &self.options.new_line_chars) {
            Ok(mut reading) => {
                reading.additional_authenticated_data_valid = Some(decrypted.authenticated);
                (self.callback)(None, Some(reading), Some(frame));
            }
            Err(parse_error) => {
                /* a held tag failure explains the garbage better than the
                 * downstream parse error does */
                let error = decrypted.error.unwrap_or(parse_error);
                (self.callback)(Some(error), None, Some(frame));
            }
        }
    }
}

impl StreamParser for EncryptedDsmrStreamParser {
    fn on_data(&mut self, bytes: &[u8]) {
        if self.destroyed {
            return;
        }
        self.buffer.extend_from_slice(bytes);
        self.process();
    }

    fn on_timeout(&mut self) {
        if self.destroyed || !self.watchdog.armed() {
            return;
        }
        self.watchdog.disarm();
        let raw = std::mem::take(&mut self.buffer);
        (self.callback)(
            Some(ParseError::Timeout(
                self.options.full_frame_required_within_ms,
            )),
            None,
            Some(&raw),
        );
    }

    fn poll_timeout(&mut self) {
        if self.watchdog.expired() {
            self.on_timeout();
        }
    }

    fn destroy(&mut self) {
        self.destroyed = true;
        self.buffer.clear();
        self.watchdog.disarm();
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.watchdog.disarm();
    }

    fn current_buffer_size(&self) -> usize {
        self.buffer.len()
    }

    fn start_of_frame_byte(&self) -> u8 {
        crypto::FRAME_TAG
    }
}
