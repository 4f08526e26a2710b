//! Incremental parser for HDLC-framed DLMS push telegrams, with fragment
//! reassembly and optional GCM decryption of the reassembled payload.

use log::debug;

use crate::crypto;
use crate::dlms;
use crate::error::ParseError;
use crate::hdlc;
use crate::reading::{HdlcInfo, Reading};
use crate::stream::{ParserOptions, ReadingCallback, StreamParser, Watchdog};

pub struct DlmsStreamParser {
    buffer: Vec<u8>,
    /// Reassembled payload across segmented frames, LLC already stripped.
    assembly: Vec<u8>,
    headers: Vec<hdlc::HdlcHeader>,
    footers: Vec<hdlc::HdlcFooter>,
    options: ParserOptions,
    callback: ReadingCallback,
    watchdog: Watchdog,
    destroyed: bool,
}

impl DlmsStreamParser {
    pub fn new(mut options: ParserOptions, callback: ReadingCallback) -> Self {
        let watchdog = Watchdog::new(options.full_frame_required_within_ms);
        let initial = options.initial_data.take();

        let mut parser = DlmsStreamParser {
            buffer: Vec::new(),
            assembly: Vec::new(),
            headers: Vec::new(),
            footers: Vec::new(),
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

    fn reset_frame_state(&mut self) {
        self.assembly.clear();
        self.headers.clear();
        self.footers.clear();
        self.watchdog.disarm();
    }

    fn fail(&mut self, error: ParseError) {
        let raw = std::mem::take(&mut self.buffer);
        self.reset_frame_state();
        (self.callback)(Some(error), None, Some(&raw));
    }

    fn process(&mut self) {
        loop {
            if self.destroyed || self.buffer.is_empty() {
                return;
            }

            let sof = match self.buffer.iter().position(|&b| b == hdlc::FLAG) {
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
            /* armed on the first fragment; intentionally not reset while
             * further fragments of the same payload arrive */
            self.watchdog.arm();

            if self.buffer.len() < 3 {
                return;
            }
            let frame_length = (((self.buffer[1] & 0x07) as usize) << 8) | self.buffer[2] as usize;
            let total = frame_length + 2;
            if self.buffer.len() < total {
                return;
            }

            let frame = match hdlc::decode_frame(&self.buffer[..total]) {
                Ok(frame) => frame,
                Err(error) => {
                    self.fail(error);
                    return;
                }
            };
            self.buffer.drain(..total);

            let first_fragment = self.headers.is_empty();
            if first_fragment {
                match dlms::strip_llc(&frame.payload) {
                    Ok(content) => self.assembly.extend_from_slice(content),
                    Err(error) => {
                        self.fail(error);
                        return;
                    }
                }
            } else {
                /* the LLC header is only present on the first fragment */
                self.assembly.extend_from_slice(&frame.payload);
            }
            let segmented = frame.header.segmented;
            self.headers.push(frame.header);
            self.footers.push(frame.footer);

            if segmented {
                debug!("segmented frame, waiting for the next fragment");
                continue;
            }
            self.finalize();
        }
    }

    /// A non-segmented frame completed: the accumulator holds the full DLMS
    /// payload, possibly wrapped in a GCM envelope.
    fn finalize(&mut self) {
        let payload = std::mem::take(&mut self.assembly);
        let headers = std::mem::take(&mut self.headers);
        let footers = std::mem::take(&mut self.footers);
        self.watchdog.disarm();

        let (plaintext, aad_valid, held_error) =
            if payload.first() == Some(&crypto::FRAME_TAG) {
                let key = match &self.options.decryption_key {
                    Some(key) => key.clone(),
                    None => {
                        (self.callback)(
                            Some(ParseError::DecryptionRequired),
                            None,
                            Some(&payload),
                        );
                        return;
                    }
                };
                let aad = self.options.additional_authenticated_data.clone();
                match crypto::decrypt_frame(&payload, &key, aad.as_deref()) {
                    Ok(decrypted) => (
                        decrypted.plaintext,
                        Some(decrypted.authenticated),
                        decrypted.error,
                    ),
                    Err(error) => {
                        (self.callback)(Some(error), None, Some(&payload));
                        return;
                    }
                }
            } else {
                (payload.clone(), None, None)
            };

        let result = dlms::decode_notification(&plaintext).and_then(|notification| {
            let mut reading = Reading::new();
            dlms::parse_notification(&mut reading, &notification)?;
            Ok(reading)
        });

        match result {
            Ok(mut reading) => {
                reading.crc.valid = headers.iter().all(|h| h.checksum_valid)
                    && footers.iter().all(|f| f.checksum_valid);
                reading.hdlc = Some(HdlcInfo { headers, footers });
                reading.additional_authenticated_data_valid = aad_valid;
                (self.callback)(None, Some(reading), Some(&payload));
            }
            Err(parse_error) => {
                let error = held_error.unwrap_or(parse_error);
                (self.callback)(Some(error), None, Some(&payload));
            }
        }
    }
}

impl StreamParser for DlmsStreamParser {
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
        let mut raw = std::mem::take(&mut self.assembly);
        raw.extend(std::mem::take(&mut self.buffer));
        self.reset_frame_state();
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
        self.reset_frame_state();
    }

    fn clear(&mut self) {
        self.buffer.clear();
        self.reset_frame_state();
    }

    fn current_buffer_size(&self) -> usize {
        self.buffer.len()
    }

    fn start_of_frame_byte(&self) -> u8 {
        hdlc::FLAG
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reading::Reading;
    use std::cell::RefCell;
    use std::rc::Rc;

    type Events = Rc<RefCell<Vec<(Option<ParseError>, Option<Reading>)>>>;

    fn collector() -> (Events, ReadingCallback) {
        let events: Events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        let callback: ReadingCallback = Box::new(move |error, reading, _raw| {
            sink.borrow_mut().push((error, reading));
        });
        (events, callback)
    }

    /// Aidon-style basic structure: voltage with a (scalar, unit) pair.
    fn notification() -> Vec<u8> {
        let mut data = vec![0x0F, 0x00, 0x00, 0x00, 0x01, 0x00];
        data.extend_from_slice(&[
            0x02, 0x02, /* structure of 2 */
            0x02, 0x03, /* entry: structure of 3 */
            0x09, 0x06, 0x01, 0x00, 0x20, 0x07, 0x00, 0xFF, /* 1-0:32.7.0.255 */
            0x12, 0x08, 0xFD, /* u16 2301 */
            0x02, 0x02, 0x0F, 0xFF, 0x16, 0x23, /* scalar -1, unit V */
            0x02, 0x03,
            0x09, 0x06, 0x01, 0x00, 0x01, 0x08, 0x00, 0xFF, /* 1-0:1.8.0.255 */
            0x06, 0x00, 0x20, 0xBB, 0x63, /* u32 2145123 */
            0x02, 0x02, 0x0F, 0x00, 0x16, 0x1E, /* scalar 0, unit Wh */
        ]);
        data
    }

    fn wrap(payload: &[u8], fragment_size: Option<usize>) -> Vec<u8> {
        let mut content = dlms::LLC_HEADER.to_vec();
        content.extend_from_slice(payload);
        let chunks: Vec<&[u8]> = match fragment_size {
            Some(size) => content.chunks(size).collect(),
            None => vec![&content],
        };
        let mut stream = Vec::new();
        let last = chunks.len() - 1;
        for (i, chunk) in chunks.iter().enumerate() {
            stream.extend(hdlc::encode_frame(chunk, i != last, 0x10, 0x02));
        }
        stream
    }

    #[test]
    fn test_single_frame() {
        let (events, callback) = collector();
        let mut parser = DlmsStreamParser::new(ParserOptions::default(), callback);
        parser.on_data(&wrap(&notification(), None));

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        let reading = events[0].1.as_ref().unwrap();
        /* scalar -1 applied: 2301 → 230.1 V */
        assert_eq!(reading.electricity.voltage.l1, Some(230.1));
        assert_eq!(reading.electricity.total.received, Some(2145123.0));
        assert!(reading.crc.valid);
        assert_eq!(reading.hdlc.as_ref().unwrap().headers.len(), 1);
        assert_eq!(reading.dlms.as_ref().unwrap().payload_type, "basic-structure");
    }

    #[test]
    fn test_segmented_frames_reassemble() {
        let (events, callback) = collector();
        let mut parser = DlmsStreamParser::new(ParserOptions::default(), callback);
        parser.on_data(&wrap(&notification(), Some(16)));

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        let reading = events[0].1.as_ref().unwrap();
        assert_eq!(reading.electricity.voltage.l1, Some(230.1));
        assert!(reading.hdlc.as_ref().unwrap().headers.len() > 1);
    }

    #[test]
    fn test_single_byte_chunks() {
        let (events, callback) = collector();
        let mut parser = DlmsStreamParser::new(ParserOptions::default(), callback);
        for byte in wrap(&notification(), Some(10)) {
            parser.on_data(&[byte]);
        }
        let events = events.borrow();
        assert_eq!(events.len(), 1);
        assert!(events[0].1.is_some());
    }

    #[test]
    fn test_bad_llc_is_unknown_message_type() {
        let (events, callback) = collector();
        let mut parser = DlmsStreamParser::new(ParserOptions::default(), callback);
        let frame = hdlc::encode_frame(b"\x00\x01\x02\x03\x04\x05\x06\x07", false, 0x10, 0x02);
        parser.on_data(&frame);

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0].0,
            Some(ParseError::UnknownMessageType(0x00))
        ));
    }

    #[test]
    fn test_encrypted_payload() {
        let key = b"0123456789abcdef";
        let envelope = crypto::encrypt_frame(
            &notification(),
            key,
            None,
            b"systitle",
            &[0x11, 0x22, 0x33, 0x44],
        )
        .unwrap();

        let (events, callback) = collector();
        let options = ParserOptions {
            decryption_key: Some(key.to_vec()),
            ..ParserOptions::default()
        };
        let mut parser = DlmsStreamParser::new(options, callback);
        parser.on_data(&wrap(&envelope, Some(32)));

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        let reading = events[0].1.as_ref().unwrap();
        assert_eq!(reading.additional_authenticated_data_valid, Some(true));
        assert_eq!(reading.electricity.voltage.l1, Some(230.1));
    }

    #[test]
    fn test_encrypted_payload_without_key() {
        let key = b"0123456789abcdef";
        let envelope = crypto::encrypt_frame(
            &notification(),
            key,
            None,
            b"systitle",
            &[0x11, 0x22, 0x33, 0x44],
        )
        .unwrap();

        let (events, callback) = collector();
        let mut parser = DlmsStreamParser::new(ParserOptions::default(), callback);
        parser.on_data(&wrap(&envelope, None));

        let events = events.borrow();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].0, Some(ParseError::DecryptionRequired)));
    }

    #[test]
    fn test_timeout_mid_reassembly() {
        let (events, callback) = collector();
        let mut parser = DlmsStreamParser::new(ParserOptions::default(), callback);
        let stream = wrap(&notification(), Some(16));
        /* deliver only the first fragment */
        let first_len = hdlc::decode_header(&stream).unwrap().frame_length + 2;
        parser.on_data(&stream[..first_len]);
        assert!(events.borrow().is_empty());

        parser.on_timeout();
        let events = events.borrow();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0].0, Some(ParseError::Timeout(_))));
        assert_eq!(parser.current_buffer_size(), 0);
    }
}
