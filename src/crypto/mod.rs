//! AES-128-GCM envelope as used by Luxembourg DSMR meters and encrypted
//! DLMS push. The envelope is a fixed 18-byte header (tag byte 0xDB), the
//! ciphertext, and a 12-byte GCM tag.
//!
//! Decryption is deliberately split in two phases. The keystream phase
//! (plain AES-CTR) always yields the plaintext bytes; the finalize phase
//! checks the GCM tag. Meters in the field routinely send AAD that does not
//! match the configured value, so the caller gets the plaintext back even on
//! a tag mismatch and can still try to parse it.

use aes::Aes128;
use aes_gcm::aead::consts::U12;
use aes_gcm::{AeadInPlace, AesGcm, KeyInit, Nonce, Tag};
use cipher::{KeyIvInit, StreamCipher};
use log::debug;

use crate::error::ParseError;

type Aes128Gcm12 = AesGcm<Aes128, U12, U12>;
type Aes128Ctr = ctr::Ctr32BE<Aes128>;

/// First byte of every encrypted envelope.
pub const FRAME_TAG: u8 = 0xDB;

/// Fixed header size: tag, title length, 8-byte title, 0x82, 16-bit length,
/// security byte, 4-byte frame counter.
pub const HEADER_LEN: usize = 18;

/// GCM authentication tag size used on the wire.
pub const TAG_LEN: usize = 12;

/// Security byte: authenticated encryption.
pub const SECURITY_AUTH_ENCRYPT: u8 = 0x30;
/// Security byte: encryption only.
pub const SECURITY_ENCRYPT_ONLY: u8 = 0x20;

#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeHeader {
    pub system_title: [u8; 8],
    pub frame_counter: [u8; 4],
    pub security: u8,
    /// Ciphertext length in bytes, already corrected for the off-by-one in
    /// the published envelope examples (`length + 1 - 18`).
    pub content_length: usize,
}

impl EnvelopeHeader {
    /// Total frame size on the wire: header, ciphertext, tag.
    pub fn frame_length(&self) -> usize {
        HEADER_LEN + self.content_length + TAG_LEN
    }
}

/// Result of the two-phase decryption. `plaintext` is always populated;
/// `error` carries the held tag-mismatch failure when `authenticated` is
/// false so the caller can surface it if downstream parsing fails too.
#[derive(Debug, Clone)]
pub struct Decrypted {
    pub header: EnvelopeHeader,
    pub plaintext: Vec<u8>,
    pub authenticated: bool,
    pub error: Option<ParseError>,
}

/// Decode the fixed 18-byte envelope header.
pub fn decode_header(buf: &[u8]) -> Result<EnvelopeHeader, ParseError> {
    if buf.len() < HEADER_LEN {
        return Err(ParseError::Decode(format!(
            "encrypted frame header needs {} bytes, got {}",
            HEADER_LEN,
            buf.len()
        )));
    }
    if buf[0] != FRAME_TAG {
        return Err(ParseError::Decode(format!(
            "expected frame tag 0xdb, got 0x{:02x}",
            buf[0]
        )));
    }
    if buf[1] != 0x08 {
        return Err(ParseError::Decode(format!(
            "expected system title length 8, got {}",
            buf[1]
        )));
    }
    let mut system_title = [0u8; 8];
    system_title.copy_from_slice(&buf[2..10]);

    if buf[10] != 0x82 {
        return Err(ParseError::Decode(format!(
            "expected 16-bit length marker 0x82, got 0x{:02x}",
            buf[10]
        )));
    }
    let length = u16::from_be_bytes([buf[11], buf[12]]) as usize;
    let content_length = (length + 1).checked_sub(HEADER_LEN).ok_or_else(|| {
        ParseError::Decode(format!("envelope length field too small: {}", length))
    })?;

    let security = buf[13];
    if security != SECURITY_AUTH_ENCRYPT && security != SECURITY_ENCRYPT_ONLY {
        return Err(ParseError::Decode(format!(
            "unsupported security byte 0x{:02x}",
            security
        )));
    }
    let mut frame_counter = [0u8; 4];
    frame_counter.copy_from_slice(&buf[14..18]);

    Ok(EnvelopeHeader {
        system_title,
        frame_counter,
        security,
        content_length,
    })
}

/// A 16-byte AAD gets the security byte 0x30 prepended before it is fed to
/// GCM; anything else is passed through untouched.
fn gcm_aad(aad: Option<&[u8]>) -> Vec<u8> {
    match aad {
        Some(bytes) if bytes.len() == 16 => {
            let mut prefixed = Vec::with_capacity(17);
            prefixed.push(SECURITY_AUTH_ENCRYPT);
            prefixed.extend_from_slice(bytes);
            prefixed
        }
        Some(bytes) => bytes.to_vec(),
        None => Vec::new(),
    }
}

/// Decrypt one complete envelope. `frame` must start at the 0xDB tag and
/// hold at least `header.frame_length()` bytes.
pub fn decrypt_frame(
    frame: &[u8],
    key: &[u8],
    aad: Option<&[u8]>,
) -> Result<Decrypted, ParseError> {
    let header = decode_header(frame)?;
    let total = header.frame_length();
    if frame.len() < total {
        return Err(ParseError::Decode(format!(
            "encrypted frame truncated: need {} bytes, have {}",
            total,
            frame.len()
        )));
    }
    let ciphertext = &frame[HEADER_LEN..HEADER_LEN + header.content_length];
    let tag_bytes = &frame[HEADER_LEN + header.content_length..total];

    let mut iv = [0u8; 12];
    iv[..8].copy_from_slice(&header.system_title);
    iv[8..].copy_from_slice(&header.frame_counter);

    /* Keystream phase: GCM payload encryption is AES-CTR with the 32-bit
     * counter starting at 2, so the plaintext is recoverable regardless of
     * whether the tag will verify. */
    let mut counter_block = [0u8; 16];
    counter_block[..12].copy_from_slice(&iv);
    counter_block[15] = 2;
    let mut plaintext = ciphertext.to_vec();
    Aes128Ctr::new_from_slices(key, &counter_block)
        .map_err(|_| ParseError::Decryption(format!("invalid key length {}", key.len())))?
        .apply_keystream(&mut plaintext);

    /* Finalize phase: verify the tag against the (possibly prefixed) AAD. */
    let cipher = Aes128Gcm12::new_from_slice(key)
        .map_err(|_| ParseError::Decryption(format!("invalid key length {}", key.len())))?;
    let mut scratch = ciphertext.to_vec();
    let verified = cipher.decrypt_in_place_detached(
        Nonce::from_slice(&iv),
        &gcm_aad(aad),
        &mut scratch,
        Tag::<U12>::from_slice(tag_bytes),
    );

    match verified {
        Ok(()) => Ok(Decrypted {
            header,
            plaintext,
            authenticated: true,
            error: None,
        }),
        Err(_) => {
            debug!("GCM tag verification failed, returning unauthenticated plaintext");
            Ok(Decrypted {
                header,
                plaintext,
                authenticated: false,
                error: Some(ParseError::Decryption(
                    "GCM tag verification failed".to_string(),
                )),
            })
        }
    }
}

/// Build an encrypted envelope around `plaintext`. The inverse of
/// [`decrypt_frame`]; the test suites use it to produce byte-true fixtures.
pub fn encrypt_frame(
    plaintext: &[u8],
    key: &[u8],
    aad: Option<&[u8]>,
    system_title: &[u8; 8],
    frame_counter: &[u8; 4],
) -> Result<Vec<u8>, ParseError> {
    let cipher = Aes128Gcm12::new_from_slice(key)
        .map_err(|_| ParseError::Decryption(format!("invalid key length {}", key.len())))?;

    let mut iv = [0u8; 12];
    iv[..8].copy_from_slice(system_title);
    iv[8..].copy_from_slice(frame_counter);

    let mut content = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&iv), &gcm_aad(aad), &mut content)
        .map_err(|_| ParseError::Decryption("GCM encryption failed".to_string()))?;

    let length = (plaintext.len() + HEADER_LEN - 1) as u16;
    let mut frame = Vec::with_capacity(HEADER_LEN + content.len() + TAG_LEN);
    frame.push(FRAME_TAG);
    frame.push(0x08);
    frame.extend_from_slice(system_title);
    frame.push(0x82);
    frame.extend_from_slice(&length.to_be_bytes());
    frame.push(SECURITY_AUTH_ENCRYPT);
    frame.extend_from_slice(frame_counter);
    frame.extend_from_slice(&content);
    frame.extend_from_slice(tag.as_slice());
    Ok(frame)
}
