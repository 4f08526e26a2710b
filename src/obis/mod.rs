//! OBIS codes identify every data point a meter pushes. DSMR carries them in
//! ASCII (`1-0:1.8.1`), DLMS carries them as 6 raw bytes with the historical
//! sixth field included.

use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

/// One field of an OBIS code. `Any` is the `*` wildcard accepted by the
/// COSEM dispatcher patterns; a code parsed off the wire never contains it
/// except for the history field of ASCII codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObisField {
    Any,
    Value(u8),
}

impl ObisField {
    fn matches(&self, other: &ObisField) -> bool {
        match (self, other) {
            (ObisField::Any, _) | (_, ObisField::Any) => true,
            (ObisField::Value(a), ObisField::Value(b)) => a == b,
        }
    }

    pub fn value(&self) -> Option<u8> {
        match self {
            ObisField::Any => None,
            ObisField::Value(v) => Some(*v),
        }
    }
}

impl fmt::Display for ObisField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObisField::Any => write!(f, "*"),
            ObisField::Value(v) => write!(f, "{}", v),
        }
    }
}

/// 6-field OBIS identifier `medium-channel:indicator.mode.tariff[.previous]`.
///
/// Equality is wildcard-aware: an `Any` field on either side matches. This is
/// what the dispatcher registry relies on, so two codes comparing equal does
/// not imply they are byte-identical.
#[derive(Debug, Clone, Copy)]
pub struct ObisCode {
    pub medium: ObisField,
    pub channel: ObisField,
    pub indicator: ObisField,
    pub mode: ObisField,
    pub tariff: ObisField,
    pub previous: ObisField,
}

impl ObisCode {
    /// Decode the 6-byte DLMS form. The history byte is preserved as sent.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ParseError> {
        if bytes.len() != 6 {
            return Err(ParseError::Decode(format!(
                "OBIS code needs 6 bytes, got {}",
                bytes.len()
            )));
        }
        Ok(ObisCode {
            medium: ObisField::Value(bytes[0]),
            channel: ObisField::Value(bytes[1]),
            indicator: ObisField::Value(bytes[2]),
            mode: ObisField::Value(bytes[3]),
            tariff: ObisField::Value(bytes[4]),
            previous: ObisField::Value(bytes[5]),
        })
    }
}

impl FromStr for ObisCode {
    type Err = ParseError;

    /// Parse the ASCII form `A-B:C.D.E`, with `*` allowed in any field.
    /// The history field of the ASCII form is don't-care.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        fn field(part: &str) -> Result<ObisField, ParseError> {
            if part == "*" {
                return Ok(ObisField::Any);
            }
            part.parse::<u8>()
                .map(ObisField::Value)
                .map_err(|_| ParseError::Decode(format!("invalid OBIS field '{}'", part)))
        }

        let (ab, cde) = s
            .split_once(':')
            .ok_or_else(|| ParseError::Decode(format!("invalid OBIS code '{}'", s)))?;
        let (a, b) = ab
            .split_once('-')
            .ok_or_else(|| ParseError::Decode(format!("invalid OBIS code '{}'", s)))?;
        let mut rest = cde.split('.');
        let (c, d, e) = match (rest.next(), rest.next(), rest.next(), rest.next()) {
            (Some(c), Some(d), Some(e), None) => (c, d, e),
            _ => return Err(ParseError::Decode(format!("invalid OBIS code '{}'", s))),
        };

        Ok(ObisCode {
            medium: field(a)?,
            channel: field(b)?,
            indicator: field(c)?,
            mode: field(d)?,
            tariff: field(e)?,
            previous: ObisField::Any,
        })
    }
}

impl PartialEq for ObisCode {
    fn eq(&self, other: &Self) -> bool {
        self.medium.matches(&other.medium)
            && self.channel.matches(&other.channel)
            && self.indicator.matches(&other.indicator)
            && self.mode.matches(&other.mode)
            && self.tariff.matches(&other.tariff)
            && self.previous.matches(&other.previous)
    }
}

impl fmt::Display for ObisCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}:{}.{}.{}",
            self.medium, self.channel, self.indicator, self.mode, self.tariff
        )?;
        if let ObisField::Value(v) = self.previous {
            write!(f, ".{}", v)?;
        }
        Ok(())
    }
}
