//! Decoder for smart meter telemetry on the customer P1 port.
//!
//! Two wire protocols coexist in the field and both are handled here: the
//! Dutch/Belgian DSMR line-oriented ASCII telegrams (optionally wrapped in
//! AES-128-GCM, as in Luxembourg) and the Nordic HDLC-framed DLMS/COSEM
//! binary push (also optionally GCM encrypted). Feed arbitrary byte chunks
//! from a serial port into one of the [`stream`] parsers and receive one
//! structured [`Reading`] per telegram through a callback.
//!
//! The byte producer and everything beyond the callback (transports,
//! formatting, host adapters) are the application's concern.

pub mod cosem;
pub mod crc16;
pub mod crypto;
pub mod dlms;
pub mod dsmr;
pub mod error;
pub mod hdlc;
pub mod obis;
pub mod reading;
pub mod stream;

// Re-export common types for easier access
pub use error::ParseError;
pub use obis::{ObisCode, ObisField};
pub use reading::Reading;
pub use stream::{
    DetectedProtocol, DlmsStreamParser, DsmrStreamParser, EncryptedDsmrStreamParser,
    ParserOptions, ProtocolDetector, ProtocolMode, ReadingCallback, StreamParser,
};
