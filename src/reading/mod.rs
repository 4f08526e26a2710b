//! The uniform output record. A `Reading` is created empty when a frame
//! starts, populated by the COSEM dispatcher while the decoder walks the
//! telegram, and emitted to the application exactly once.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::hdlc::{HdlcFooter, HdlcHeader};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub metadata: Metadata,
    pub electricity: Electricity,
    /// M-Bus sub-meter data keyed by channel number.
    pub mbus: BTreeMap<u8, MbusReading>,
    pub cosem: CosemDiagnostics,
    /// DSMR provenance, present when the frame was a DSMR telegram.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dsmr: Option<DsmrInfo>,
    /// HDLC provenance, present when the frame arrived over HDLC.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hdlc: Option<HdlcInfo>,
    /// DLMS provenance, present for data-notification payloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dlms: Option<DlmsInfo>,
    pub crc: CrcStatus,
    /// Only present when the frame was decrypted: whether the GCM tag
    /// verified against the configured additional authenticated data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_authenticated_data_valid: Option<bool>,
}

impl Reading {
    pub fn new() -> Self {
        Reading::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub dsmr_version: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub equipment_id: Option<String>,
    pub serial_number: Option<String>,
    pub text_message: Option<String>,
    pub numeric_message: Option<f64>,
    pub events: Events,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Events {
    pub power_failures: Option<u64>,
    pub long_power_failures: Option<u64>,
    pub voltage_sags: PhaseCounters,
    pub voltage_swells: PhaseCounters,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseCounters {
    pub l1: Option<u64>,
    pub l2: Option<u64>,
    pub l3: Option<u64>,
}

/// Instantaneous per-phase quantities, in base units (V, A, W, var).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PhaseValues {
    pub l1: Option<f64>,
    pub l2: Option<f64>,
    pub l3: Option<f64>,
}

/// Cumulative counters in base units (Wh, varh).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyCounters {
    pub received: Option<f64>,
    pub returned: Option<f64>,
    pub reactive_received: Option<f64>,
    pub reactive_returned: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Electricity {
    /// Tariff 0: the grand-total registers.
    pub total: EnergyCounters,
    /// Non-zero tariff registers, keyed by the OBIS tariff field.
    pub tariffs: BTreeMap<u8, EnergyCounters>,
    pub current_tariff: Option<u8>,
    pub voltage: PhaseValues,
    pub current: PhaseValues,
    pub power_received_total: Option<f64>,
    pub power_returned_total: Option<f64>,
    pub power_received: PhaseValues,
    pub power_returned: PhaseValues,
    pub reactive_power_received_total: Option<f64>,
    pub reactive_power_returned_total: Option<f64>,
    pub reactive_power_received: PhaseValues,
    pub reactive_power_returned: PhaseValues,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MbusReading {
    pub device_type: Option<u64>,
    pub equipment_id: Option<String>,
    /// Meter-local timestamp as transmitted, e.g. `230102120000W`.
    pub timestamp: Option<String>,
    pub value: Option<f64>,
    pub unit: Option<String>,
    pub recording_period_minutes: Option<u64>,
}

/// Diagnostic lists of everything the dispatcher saw.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CosemDiagnostics {
    pub id: Option<String>,
    pub known_objects: Vec<String>,
    pub unknown_objects: Vec<String>,
}

/// The `/XXXZ...` identification line, split the historically accepted way.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DsmrHeader {
    pub xxx: String,
    pub z: String,
    pub identifier: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DsmrCrc {
    pub declared: u16,
    pub computed: u16,
    pub valid: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DsmrInfo {
    pub header: DsmrHeader,
    /// `None` for meters that omit the trailer CRC entirely.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crc: Option<DsmrCrc>,
}

/// One entry per HDLC frame that contributed to the reading, so CRC validity
/// of every fragment is reported individually.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HdlcInfo {
    pub headers: Vec<HdlcHeader>,
    pub footers: Vec<HdlcFooter>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DlmsInfo {
    pub invoke_id: u32,
    /// Raw notification timestamp, hex encoded (may be empty).
    pub timestamp: String,
    /// Name of the payload-shape recognizer that claimed the body.
    pub payload_type: String,
    pub unknown_objects: Vec<String>,
}

/// `valid` is true when every CRC present on the wire (HDLC header/footer
/// CRCs, DSMR trailer) validated. A telegram without any CRC stays valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrcStatus {
    pub valid: bool,
}

impl Default for CrcStatus {
    fn default() -> Self {
        CrcStatus { valid: true }
    }
}
