//! Incremental parser for unencrypted DSMR telegrams.

use log::debug;

use crate::crypto;
use crate::dsmr;
use crate::error::ParseError;
use crate::stream::{ParserOptions, ReadingCallback, StreamParser, Watchdog};

pub struct DsmrStreamParser {
    buffer: Vec<u8>,
    options: ParserOptions,
    callback: ReadingCallback,
    watchdog: Watchdog,
    end_of_frame: regex::bytes::Regex,
    destroyed: bool,
}

impl DsmrStreamParser {
    pub fn new(mut options: ParserOptions, callback: ReadingCallback) -> Self {
        let newline = regex::escape(&options.new_line_chars);
        let end_of_frame = regex::bytes::Regex::new(&format!(
            "(?-u){nl}!([0-9A-Fa-f]{{4}})?{nl}\\x00?",
            nl = newline
        ))
        .expect("end-of-frame pattern");
        let watchdog = Watchdog::new(options.full_frame_required_within_ms);
        let initial = options.initial_data.take();

        let mut parser = DsmrStreamParser {
            buffer: Vec::new(),
            options,
            callback,
            watchdog,
            end_of_frame,
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

            let sof = self.buffer.iter().position(|&b| b == b'/');
            if self.options.detect_encryption {
                let encrypted = self.buffer.iter().position(|&b| b == crypto::FRAME_TAG);
                if let Some(enc) = encrypted {
                    if sof.map(|s| enc < s).unwrap_or(true) {
                        let raw = std::mem::take(&mut self.buffer);
                        self.watchdog.disarm();
                        (self.callback)(Some(ParseError::DecryptionRequired), None, Some(&raw));
                        return;
                    }
                }
            }

            let sof = match sof {
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

            let frame_end = self
                .end_of_frame
                .find(&self.buffer)
                .map(|m| m.end())
                .or_else(|| self.next_frame_cut());
            match frame_end {
                Some(end) => {
                    let frame: Vec<u8> = self.buffer.drain(..end).collect();
                    self.watchdog.disarm();
                    self.emit(&frame);
                    /* loop again: trailing bytes are re-processed as if they
                     * arrived in a fresh data event */
                }
                None => return,
            }
        }
    }

    /// Meters that omit the trailer only reveal a complete frame through the
    /// next frame's `/`, preceded by a newline.
    fn next_frame_cut(&self) -> Option<usize> {
        let newline = self.options.new_line_chars.as_bytes();
        let mut from = 1;
        while from < self.buffer.len() {
            let offset = self.buffer[from..].iter().position(|&b| b == b'/')?;
            let candidate = from + offset;
            if candidate >= newline.len()
                && &self.buffer[candidate - newline.len()..candidate] == newline
            {
                return Some(candidate);
            }
            from = candidate + 1;
        }
        None
    }

    fn emit(&mut self, frame: &[u8]) {
        debug!("emitting DSMR frame of {} bytes", frame.len());
        match dsmr::parse_telegram(frame, &self.options.new_line_chars) {
            Ok(reading) => (self.callback)(None, Some(reading), Some(frame)),
            Err(error) => (self.callback)(Some(error), None, Some(frame)),
        }
    }
}

impl StreamParser for DsmrStreamParser {
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
        /* whatever accumulated may still be a complete telegram from a meter
         * that never sends a trailer */
        if raw.contains(&b'/') {
            if let Ok(reading) = dsmr::parse_telegram(&raw, &self.options.new_line_chars) {
                (self.callback)(None, Some(reading), Some(&raw));
                return;
            }
        }
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
        b'/'
    }
}
