use thiserror::Error;

/// Error taxonomy shared by every protocol layer.
///
/// Header-level failures clear the stream buffer and reach the caller through
/// the parser callback together with the raw bytes that produced them.
/// Body-level problems (unknown OBIS codes, odd DLMS objects) never fail a
/// frame; they are collected on the record instead.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The buffer contains no candidate start-of-frame byte.
    #[error("start of frame not found")]
    StartOfFrameNotFound,

    /// Malformed header, footer, TLV node, address or length field.
    #[error("decode error: {0}")]
    Decode(String),

    /// DLMS message type other than data-notification, or an LLC mismatch.
    #[error("unknown message type 0x{0:02x}")]
    UnknownMessageType(u8),

    /// An encrypted envelope was detected but no key is configured.
    #[error("telegram is encrypted, a decryption key is required")]
    DecryptionRequired,

    /// GCM tag mismatch or cipher setup failure.
    #[error("decryption failed: {0}")]
    Decryption(String),

    /// The frame-complete watchdog fired.
    #[error("no complete frame received within {0} ms")]
    Timeout(u64),

    /// Telegram-level failure, e.g. a telegram without any COSEM objects.
    #[error("parser error: {0}")]
    Parser(String),
}
