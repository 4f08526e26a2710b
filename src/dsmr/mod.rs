//! DSMR telegram parser: splits a telegram into lines, walks the COSEM
//! lines through the dispatcher and validates the bracketed trailer CRC.

use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

use crate::cosem::{self, DispatchOutcome};
use crate::crc16::CRC16_ARC;
use crate::error::ParseError;
use crate::obis::ObisCode;
use crate::reading::{DsmrCrc, DsmrHeader, DsmrInfo, Reading};

lazy_static! {
    static ref OBIS_PREFIX_RE: Regex =
        Regex::new(r"^(\d{1,3})-(\d{1,3}):(\d{1,3})\.(\d{1,3})\.(\d{1,3})").unwrap();
}

/// Split the `/XXXZ...` identification line the historically accepted way.
/// Some meters ship an empty identifier; every part tolerates short input.
fn parse_header_line(line: &str) -> DsmrHeader {
    DsmrHeader {
        xxx: line.get(1..4).unwrap_or("").to_string(),
        z: line.get(4..5).unwrap_or("").to_string(),
        identifier: line.get(5..).unwrap_or("").to_string(),
    }
}

/// Compute the trailer CRC over the raw telegram: CRC-16/ARC of everything
/// from `/` through `!` inclusive, compared against the declared hex value.
/// Returns `None` when the telegram carries no trailer CRC.
pub fn validate_crc(data: &[u8]) -> Option<DsmrCrc> {
    let start = data.iter().position(|&b| b == b'/')?;
    let bang = data.iter().rposition(|&b| b == b'!')?;
    if bang < start {
        return None;
    }
    let declared = data.get(bang + 1..bang + 5).and_then(|hex| {
        let text = std::str::from_utf8(hex).ok()?;
        u16::from_str_radix(text, 16).ok()
    })?;
    let computed = CRC16_ARC.checksum(&data[start..=bang]);
    Some(DsmrCrc {
        declared,
        computed,
        valid: declared == computed,
    })
}

/// Parse one complete telegram. `newline` is the configured line separator
/// (`"\r\n"` by default, `"\n"` for some meters).
///
/// CRC mismatches are recorded on the result, never raised; a telegram
/// without a single COSEM object is an error so the caller can fall back to
/// a held decryption failure.
pub fn parse_telegram(data: &[u8], newline: &str) -> Result<Reading, ParseError> {
    let text = String::from_utf8_lossy(data);
    let lines: Vec<&str> = text.split(newline).collect();

    let mut reading = Reading::new();
    let mut header: Option<DsmrHeader> = None;
    let mut object_count = 0usize;

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i].trim_matches('\0');
        i += 1;

        if line.is_empty() {
            continue;
        }
        if line.starts_with('/') {
            header = Some(parse_header_line(line));
            continue;
        }
        if line.starts_with('!') {
            debug!("end of telegram");
            break;
        }

        let obis_match = match OBIS_PREFIX_RE.find(line) {
            Some(m) => m,
            None => {
                warn!("line without OBIS code: {}", line);
                reading.cosem.unknown_objects.push(line.to_string());
                continue;
            }
        };
        let obis: ObisCode = match obis_match.as_str().parse() {
            Ok(code) => code,
            Err(_) => {
                reading.cosem.unknown_objects.push(line.to_string());
                continue;
            }
        };
        object_count += 1;

        let rest = &line[obis_match.end()..];
        let next_line = lines.get(i).copied();
        match cosem::dispatch_line(&mut reading, &obis, rest, next_line) {
            DispatchOutcome::Handled { consumed_next_line } => {
                if consumed_next_line {
                    i += 1;
                }
            }
            DispatchOutcome::Unknown => {
                debug!("no handler for {}", obis);
                reading.cosem.unknown_objects.push(line.to_string());
            }
        }
    }

    let header = header.ok_or_else(|| {
        ParseError::Parser("telegram has no identification header".to_string())
    })?;
    if object_count == 0 {
        return Err(ParseError::Parser("no COSEM objects found".to_string()));
    }

    let crc = validate_crc(data);
    reading.crc.valid = crc.as_ref().map(|c| c.valid).unwrap_or(true);
    reading.dsmr = Some(DsmrInfo { header, crc });
    Ok(reading)
}
