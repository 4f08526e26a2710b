//! Shared fixture builders. Telegrams are assembled programmatically and
//! sealed with the crate's own codecs so every CRC and ciphertext is
//! byte-true by construction.

#![allow(dead_code)]

use p1meter::crc16::CRC16_ARC;
use p1meter::{crypto, dlms, hdlc};

pub const KEY: [u8; 16] = *b"0123456789abcdef";
pub const AAD: [u8; 16] = [
    0xFF, 0xEE, 0xDD, 0xCC, 0xBB, 0xAA, 0x99, 0x88, 0x77, 0x66, 0x55, 0x44, 0x33, 0x22, 0x11,
    0x00,
];
pub const SYSTEM_TITLE: [u8; 8] = *b"systitle";
pub const FRAME_COUNTER: [u8; 4] = [0x11, 0x22, 0x33, 0x44];

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Append the trailer CRC exactly the way a meter computes it: CRC-16/ARC
/// over `/` through `!` inclusive, as four hex digits plus CRLF.
pub fn seal(body: &str) -> String {
    let through_bang = format!("{}!", body);
    let crc = CRC16_ARC.checksum(through_bang.as_bytes());
    format!("{}{:04X}\r\n", through_bang, crc)
}

/// Canonical DSMR 5.0 telegram with a channel-1 gas meter.
pub fn dsmr50_telegram() -> Vec<u8> {
    let body = concat!(
        "/ISK5\\2M550T-1012\r\n",
        "\r\n",
        "1-3:0.2.8(50)\r\n",
        "0-0:1.0.0(230102120000W)\r\n",
        "0-0:96.1.1(4530303435303033383833343439363137)\r\n",
        "1-0:1.8.0(003968.579*kWh)\r\n",
        "1-0:1.8.1(002145.123*kWh)\r\n",
        "1-0:1.8.2(001823.456*kWh)\r\n",
        "1-0:2.8.1(000101.011*kWh)\r\n",
        "1-0:2.8.2(000202.022*kWh)\r\n",
        "0-0:96.14.0(0002)\r\n",
        "1-0:1.7.0(01.193*kW)\r\n",
        "1-0:2.7.0(00.000*kW)\r\n",
        "0-0:96.7.21(00004)\r\n",
        "0-0:96.7.9(00002)\r\n",
        "1-0:32.32.0(00002)\r\n",
        "1-0:52.32.0(00001)\r\n",
        "1-0:72.32.0(00000)\r\n",
        "1-0:32.36.0(00000)\r\n",
        "1-0:52.36.0(00001)\r\n",
        "1-0:72.36.0(00000)\r\n",
        "0-0:96.13.0()\r\n",
        "1-0:32.7.0(220.1*V)\r\n",
        "1-0:52.7.0(220.2*V)\r\n",
        "1-0:72.7.0(220.3*V)\r\n",
        "1-0:31.7.0(001*A)\r\n",
        "1-0:51.7.0(002*A)\r\n",
        "1-0:71.7.0(003*A)\r\n",
        "1-0:21.7.0(01.111*kW)\r\n",
        "1-0:41.7.0(02.222*kW)\r\n",
        "1-0:61.7.0(03.333*kW)\r\n",
        "1-0:22.7.0(00.000*kW)\r\n",
        "1-0:42.7.0(00.000*kW)\r\n",
        "1-0:62.7.0(00.000*kW)\r\n",
        "0-1:24.1.0(003)\r\n",
        "0-1:96.1.0(4730303332353631)\r\n",
        "0-1:24.2.1(230102120000W)(12785.123*m3)\r\n",
    );
    seal(body).into_bytes()
}

/// DSMR 3.0 telegram with the two-line gas record and a bare `!` trailer
/// (no trailer CRC before DSMR 4).
pub fn dsmr30_telegram() -> Vec<u8> {
    concat!(
        "/ISk5\\2MT382-1000\r\n",
        "\r\n",
        "0-0:96.1.1(4B384547303034303436333935353037)\r\n",
        "1-0:1.8.1(12345.678*kWh)\r\n",
        "1-0:1.8.2(23456.789*kWh)\r\n",
        "0-0:96.14.0(0002)\r\n",
        "1-0:1.7.0(0001.77*kW)\r\n",
        "0-1:24.1.0(3)\r\n",
        "0-1:96.1.0(3238303131303038333036333931)\r\n",
        "0-1:24.3.0(090212160000)(00)(60)(1)(0-1:24.2.1)(m3)\r\n",
        "(00123.456)\r\n",
        "!\r\n",
    )
    .as_bytes()
    .to_vec()
}

/// Iskra MT-382 style telegram that omits the trailer line entirely; frame
/// completion is only visible through the next SOF or the watchdog.
pub fn mt382_telegram() -> Vec<u8> {
    concat!(
        "/ISk5\\2MT382-1000\r\n",
        "\r\n",
        "0-0:96.1.1(4B384547303034303436333935353037)\r\n",
        "1-0:1.8.1(12345.678*kWh)\r\n",
        "1-0:1.7.0(0001.77*kW)\r\n",
    )
    .as_bytes()
    .to_vec()
}

// ---- DLMS tree builders -------------------------------------------------

pub fn tlv_structure(children: &[Vec<u8>]) -> Vec<u8> {
    let mut out = vec![0x02, children.len() as u8];
    for child in children {
        out.extend_from_slice(child);
    }
    out
}

pub fn tlv_octets(bytes: &[u8]) -> Vec<u8> {
    let mut out = vec![0x09, bytes.len() as u8];
    out.extend_from_slice(bytes);
    out
}

pub fn tlv_text(text: &str) -> Vec<u8> {
    let mut out = vec![0x0A, text.len() as u8];
    out.extend_from_slice(text.as_bytes());
    out
}

pub fn tlv_u16(value: u16) -> Vec<u8> {
    let mut out = vec![0x12];
    out.extend_from_slice(&value.to_be_bytes());
    out
}

pub fn tlv_u32(value: u32) -> Vec<u8> {
    let mut out = vec![0x06];
    out.extend_from_slice(&value.to_be_bytes());
    out
}

pub fn tlv_i8(value: i8) -> Vec<u8> {
    vec![0x0F, value as u8]
}

pub fn tlv_enum(value: u8) -> Vec<u8> {
    vec![0x16, value]
}

/// A basic-structure register entry: OBIS, value, (scalar, unit).
pub fn register(obis: [u8; 6], value: Vec<u8>, scalar: i8, unit: u8) -> Vec<u8> {
    tlv_structure(&[
        tlv_octets(&obis),
        value,
        tlv_structure(&[tlv_i8(scalar), tlv_enum(unit)]),
    ])
}

/// Wrap a body tree into a Data-Notification (invoke id 1, no timestamp).
pub fn data_notification(body: Vec<u8>) -> Vec<u8> {
    let mut out = vec![0x0F, 0x00, 0x00, 0x00, 0x01, 0x00];
    out.extend_from_slice(&body);
    out
}

/// Aidon list-2 style push: energies plus per-phase voltage and current,
/// each with an embedded (scalar, unit) pair.
pub fn aidon_notification() -> Vec<u8> {
    let body = tlv_structure(&[
        register([1, 0, 1, 8, 0, 255], tlv_u32(2145123), 0, 30),
        register([1, 0, 2, 8, 0, 255], tlv_u32(101011), 0, 30),
        register([1, 0, 1, 7, 0, 255], tlv_u32(1193), 0, 27),
        register([1, 0, 2, 7, 0, 255], tlv_u32(0), 0, 27),
        register([1, 0, 32, 7, 0, 255], tlv_u16(2201), -1, 35),
        register([1, 0, 52, 7, 0, 255], tlv_u16(2202), -1, 35),
        register([1, 0, 72, 7, 0, 255], tlv_u16(2203), -1, 35),
        register([1, 0, 31, 7, 0, 255], tlv_u16(150), -2, 33),
        register([1, 0, 51, 7, 0, 255], tlv_u16(250), -2, 33),
        register([1, 0, 71, 7, 0, 255], tlv_u16(350), -2, 33),
    ]);
    data_notification(body)
}

/// Wrap a DLMS payload into HDLC frames: LLC header on the first fragment,
/// segmentation bit on all but the last.
pub fn hdlc_wrap(payload: &[u8], fragment_size: Option<usize>) -> Vec<u8> {
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

/// Seal a plaintext in the GCM envelope with the default test vectors.
pub fn encrypt(plaintext: &[u8], aad: Option<&[u8]>) -> Vec<u8> {
    crypto::encrypt_frame(plaintext, &KEY, aad, &SYSTEM_TITLE, &FRAME_COUNTER).unwrap()
}
