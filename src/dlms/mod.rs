//! DLMS content decoder: strips the LLC header, decodes the unsolicited
//! Data-Notification and turns the payload tree into dispatched COSEM
//! objects via the recognizer chain.

use log::debug;

use crate::cosem;
use crate::error::ParseError;
use crate::reading::{DlmsInfo, Reading};

pub mod parser;
pub mod payloads;

use parser::{DlmsParser, DlmsValue};

/// Fixed LLC header at the start of a reassembled HDLC payload.
pub const LLC_HEADER: [u8; 3] = [0xE6, 0xE7, 0x00];

/// The only DLMS message type handled: unsolicited push.
pub const MSG_DATA_NOTIFICATION: u8 = 0x0F;

#[derive(Debug, Clone, PartialEq)]
pub struct DataNotification {
    pub invoke_id: u32,
    /// Raw notification timestamp bytes; may be empty.
    pub timestamp: Vec<u8>,
    pub body: DlmsValue,
}

/// Strip the LLC header off the first fragment of an HDLC payload.
pub fn strip_llc(payload: &[u8]) -> Result<&[u8], ParseError> {
    if payload.len() < 3 {
        return Err(ParseError::Decode(
            "payload too short for LLC header".to_string(),
        ));
    }
    if payload[..3] != LLC_HEADER {
        return Err(ParseError::UnknownMessageType(payload[0]));
    }
    Ok(&payload[3..])
}

/// Decode a (plaintext) Data-Notification: message type, 4-byte big-endian
/// invoke id, length-prefixed timestamp, one DLMS data tree.
pub fn decode_notification(data: &[u8]) -> Result<DataNotification, ParseError> {
    if data.is_empty() {
        return Err(ParseError::Decode("empty DLMS payload".to_string()));
    }
    if data[0] != MSG_DATA_NOTIFICATION {
        return Err(ParseError::UnknownMessageType(data[0]));
    }
    if data.len() < 6 {
        return Err(ParseError::Decode(
            "data notification header truncated".to_string(),
        ));
    }
    let invoke_id = u32::from_be_bytes([data[1], data[2], data[3], data[4]]);
    let timestamp_length = data[5] as usize;
    if data.len() < 6 + timestamp_length {
        return Err(ParseError::Decode(
            "notification timestamp runs past buffer".to_string(),
        ));
    }
    let timestamp = data[6..6 + timestamp_length].to_vec();

    let mut tlv = DlmsParser::new(&data[6 + timestamp_length..]);
    let body = tlv.parse_value()?;
    debug!(
        "data notification: invoke id {}, {} timestamp bytes, body {}",
        invoke_id,
        timestamp.len(),
        body.kind_name()
    );

    Ok(DataNotification {
        invoke_id,
        timestamp,
        body,
    })
}

/// Run the recognizer chain over a notification body and dispatch every
/// extracted object into the reading. Objects without a handler land in the
/// diagnostic lists; only an unrecognizable payload shape is an error.
pub fn parse_notification(
    reading: &mut Reading,
    notification: &DataNotification,
) -> Result<(), ParseError> {
    let (payload_type, objects) = payloads::recognize(&notification.body).ok_or_else(|| {
        ParseError::Decode("unrecognized DLMS payload shape".to_string())
    })?;

    let mut unknown_objects = Vec::new();
    for object in &objects {
        let handled = cosem::dispatch_dlms(
            reading,
            &object.obis,
            &object.value,
            object.unit.as_deref(),
            object.scalar,
            object.default_scalar,
        );
        if !handled {
            reading.cosem.unknown_objects.push(object.obis.to_string());
            unknown_objects.push(format!("{}({})", object.obis, object.value.kind_name()));
        }
    }

    reading.dlms = Some(DlmsInfo {
        invoke_id: notification.invoke_id,
        timestamp: hex::encode(&notification.timestamp),
        payload_type: payload_type.to_string(),
        unknown_objects,
    });
    Ok(())
}
