//! COSEM object dispatcher: a registry of (wildcard OBIS pattern, parameter
//! kind, handler) triples that place parsed values into the [`Reading`].
//! Lookup is a linear first-match-wins scan; the registry is built once and
//! shared read-only by every parser instance.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use lazy_static::lazy_static;
use log::{debug, warn};
use regex::Regex;

use crate::obis::ObisCode;
use crate::reading::{PhaseCounters, PhaseValues, Reading};

pub mod units;

use crate::dlms::parser::DlmsValue;

/// How the value for a handler is shaped on the wire.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    Number,
    Text,
    OctetString,
    /// The handler parses the raw line remainder itself (DSMR-3 gas).
    Raw,
}

/// A value as handed to a handler, already unit-normalized for numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum CosemValue {
    Number {
        value: f64,
        unit: Option<String>,
        /// Set for DLMS lists that omit the scalar: voltage is dV, current
        /// is cA and the handler divides accordingly.
        default_scalar: bool,
    },
    Text(String),
    Octets(Vec<u8>),
    Raw {
        line: String,
        next_line: Option<String>,
    },
}

/// Handlers return true when they also consumed the line following their
/// own (the DSMR-3 two-line gas record).
type HandlerFn = fn(&mut Reading, &ObisCode, &CosemValue) -> bool;

pub struct Handler {
    pattern: ObisCode,
    kind: ParamKind,
    apply: HandlerFn,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispatchOutcome {
    Handled { consumed_next_line: bool },
    Unknown,
}

lazy_static! {
    static ref REGISTRY: Vec<Handler> = build_registry();
    static ref GROUP_RE: Regex = Regex::new(r"\(([^)]*)\)").unwrap();
    static ref VALUE_LINE_RE: Regex = Regex::new(r"^\((-?[0-9]+\.?[0-9]*)(?:\*([^)]*))?\)").unwrap();
}

fn pat(pattern: &str) -> ObisCode {
    pattern.parse().expect("static OBIS pattern")
}

fn build_registry() -> Vec<Handler> {
    let mut r: Vec<Handler> = Vec::new();
    let mut add = |pattern: &str, kind: ParamKind, apply: HandlerFn| {
        r.push(Handler {
            pattern: pat(pattern),
            kind,
            apply,
        });
    };

    add("1-3:0.2.8", ParamKind::Number, set_dsmr_version);
    add("0-0:1.0.0", ParamKind::Text, set_timestamp);
    add("0-0:42.0.0", ParamKind::OctetString, set_cosem_id);
    add("0-0:96.1.1", ParamKind::Text, set_equipment_id);
    add("0-0:96.1.2", ParamKind::OctetString, set_serial_number);

    add("1-*:1.8.*", ParamKind::Number, energy_received);
    add("1-*:2.8.*", ParamKind::Number, energy_returned);
    add("1-*:3.8.*", ParamKind::Number, reactive_energy_received);
    add("1-*:4.8.*", ParamKind::Number, reactive_energy_returned);
    add("0-0:96.14.0", ParamKind::Number, set_current_tariff);

    add("1-*:1.7.0", ParamKind::Number, power_received_total);
    add("1-*:2.7.0", ParamKind::Number, power_returned_total);
    add("1-*:3.7.0", ParamKind::Number, reactive_power_received_total);
    add("1-*:4.7.0", ParamKind::Number, reactive_power_returned_total);

    add("0-0:96.7.21", ParamKind::Number, power_failures);
    add("0-0:96.7.9", ParamKind::Number, long_power_failures);
    for p in ["1-*:32.32.0", "1-*:52.32.0", "1-*:72.32.0"] {
        add(p, ParamKind::Number, voltage_sags);
    }
    for p in ["1-*:32.36.0", "1-*:52.36.0", "1-*:72.36.0"] {
        add(p, ParamKind::Number, voltage_swells);
    }

    add("0-0:96.13.0", ParamKind::Text, text_message);
    add("0-0:96.13.1", ParamKind::Number, numeric_message);

    for p in ["1-*:32.7.0", "1-*:52.7.0", "1-*:72.7.0"] {
        add(p, ParamKind::Number, voltage);
    }
    for p in ["1-*:31.7.0", "1-*:51.7.0", "1-*:71.7.0"] {
        add(p, ParamKind::Number, current);
    }
    for p in ["1-*:21.7.0", "1-*:41.7.0", "1-*:61.7.0"] {
        add(p, ParamKind::Number, power_received_phase);
    }
    for p in ["1-*:22.7.0", "1-*:42.7.0", "1-*:62.7.0"] {
        add(p, ParamKind::Number, power_returned_phase);
    }
    for p in ["1-*:23.7.0", "1-*:43.7.0", "1-*:63.7.0"] {
        add(p, ParamKind::Number, reactive_power_received_phase);
    }
    for p in ["1-*:24.7.0", "1-*:44.7.0", "1-*:64.7.0"] {
        add(p, ParamKind::Number, reactive_power_returned_phase);
    }

    add("0-*:24.1.0", ParamKind::Number, mbus_device_type);
    add("0-*:96.1.0", ParamKind::Text, mbus_equipment_id);
    add("0-*:24.2.*", ParamKind::Raw, mbus_reading);
    add("0-*:24.3.0", ParamKind::Raw, mbus_reading_legacy);

    r
}

fn find(obis: &ObisCode) -> Option<&'static Handler> {
    REGISTRY.iter().find(|h| h.pattern == *obis)
}

/// Dispatch one DSMR COSEM line. `rest` is the line after the OBIS code,
/// `next_line` the following line for handlers that need to peek at it.
pub fn dispatch_line(
    reading: &mut Reading,
    obis: &ObisCode,
    rest: &str,
    next_line: Option<&str>,
) -> DispatchOutcome {
    let handler = match find(obis) {
        Some(h) => h,
        None => return DispatchOutcome::Unknown,
    };

    let value = match handler.kind {
        ParamKind::Number => match parse_number_group(rest) {
            Some((value, unit)) => {
                let (value, unit) = units::normalize(value, unit.as_deref());
                Some(CosemValue::Number {
                    value,
                    unit,
                    default_scalar: false,
                })
            }
            None => None,
        },
        ParamKind::Text => first_group(rest).map(|s| CosemValue::Text(s.to_string())),
        ParamKind::OctetString => {
            first_group(rest).map(|s| CosemValue::Octets(s.as_bytes().to_vec()))
        }
        ParamKind::Raw => Some(CosemValue::Raw {
            line: rest.to_string(),
            next_line: next_line.map(|l| l.to_string()),
        }),
    };

    let consumed_next_line = match value {
        Some(value) => (handler.apply)(reading, obis, &value),
        None => {
            warn!("no usable value in COSEM line {}{}", obis, rest);
            false
        }
    };
    reading.cosem.known_objects.push(obis.to_string());
    DispatchOutcome::Handled { consumed_next_line }
}

/// Dispatch one parsed DLMS (OBIS, value, unit) triple. `scalar` multiplies
/// the value by 10^scalar; `default_scalar` marks scalar-less lists.
pub fn dispatch_dlms(
    reading: &mut Reading,
    obis: &ObisCode,
    value: &DlmsValue,
    unit: Option<&str>,
    scalar: Option<i8>,
    default_scalar: bool,
) -> bool {
    let handler = match find(obis) {
        Some(h) => h,
        None => return false,
    };

    let cosem_value = match handler.kind {
        ParamKind::Number | ParamKind::Raw => {
            let mut number = match value.as_f64() {
                Some(n) => n,
                None => return false,
            };
            if let Some(s) = scalar {
                /* divide for negative exponents: the quotient is correctly
                 * rounded, a multiplication by 0.1 is not */
                if s >= 0 {
                    number *= 10f64.powi(s as i32);
                } else {
                    number /= 10f64.powi(-(s as i32));
                }
            }
            let (number, unit) = units::normalize(number, unit);
            CosemValue::Number {
                value: number,
                unit,
                default_scalar,
            }
        }
        ParamKind::Text => match value {
            DlmsValue::Text(s) => CosemValue::Text(s.clone()),
            DlmsValue::OctetString(b) => {
                CosemValue::Text(String::from_utf8_lossy(b).into_owned())
            }
            _ => return false,
        },
        ParamKind::OctetString => match value {
            DlmsValue::OctetString(b) => CosemValue::Octets(b.clone()),
            DlmsValue::Text(s) => CosemValue::Octets(s.as_bytes().to_vec()),
            _ => return false,
        },
    };

    (handler.apply)(reading, obis, &cosem_value);
    reading.cosem.known_objects.push(obis.to_string());
    true
}

fn first_group(rest: &str) -> Option<&str> {
    GROUP_RE
        .captures(rest)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

fn parse_number_group(rest: &str) -> Option<(f64, Option<String>)> {
    let content = first_group(rest)?;
    let (number, unit) = match content.split_once('*') {
        Some((n, u)) => (n, Some(u.to_string())),
        None => (content, None),
    };
    number.parse::<f64>().ok().map(|n| (n, unit))
}

/// `YYMMDDhhmmss` local clock with a DST suffix: `S` is CEST (+02:00), `W`
/// is CET (+01:00), a missing suffix is taken as UTC.
pub fn parse_dsmr_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let (digits, offset_hours) = match s.as_bytes().last()? {
        b'S' => (&s[..s.len() - 1], 2i64),
        b'W' => (&s[..s.len() - 1], 1),
        _ => (s, 0),
    };
    if digits.len() != 12 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let part = |from: usize| digits[from..from + 2].parse::<u32>().ok();
    let naive = NaiveDate::from_ymd_opt(2000 + part(0)? as i32, part(2)?, part(4)?)?
        .and_hms_opt(part(6)?, part(8)?, part(10)?)?;
    Some(Utc.from_utc_datetime(&(naive - chrono::Duration::hours(offset_hours))))
}

// ---- handler implementations -------------------------------------------

fn num(value: &CosemValue) -> Option<f64> {
    match value {
        CosemValue::Number { value, .. } => Some(*value),
        _ => None,
    }
}

fn utf8(value: &CosemValue) -> Option<String> {
    match value {
        CosemValue::Text(s) => Some(s.clone()),
        CosemValue::Octets(b) => Some(String::from_utf8_lossy(b).into_owned()),
        _ => None,
    }
}

fn phase_slot<'a>(
    values: &'a mut PhaseValues,
    obis: &ObisCode,
    base: u8,
) -> Option<&'a mut Option<f64>> {
    match obis.indicator.value()? {
        v if v == base => Some(&mut values.l1),
        v if v == base + 20 => Some(&mut values.l2),
        v if v == base + 40 => Some(&mut values.l3),
        _ => None,
    }
}

fn counter_slot<'a>(
    counters: &'a mut PhaseCounters,
    obis: &ObisCode,
    base: u8,
) -> Option<&'a mut Option<u64>> {
    match obis.indicator.value()? {
        v if v == base => Some(&mut counters.l1),
        v if v == base + 20 => Some(&mut counters.l2),
        v if v == base + 40 => Some(&mut counters.l3),
        _ => None,
    }
}

fn set_dsmr_version(reading: &mut Reading, _obis: &ObisCode, value: &CosemValue) -> bool {
    if let Some(n) = num(value) {
        reading.metadata.dsmr_version = Some(n / 10.0);
    }
    false
}

fn set_timestamp(reading: &mut Reading, _obis: &ObisCode, value: &CosemValue) -> bool {
    if let Some(s) = utf8(value) {
        match parse_dsmr_timestamp(&s) {
            Some(ts) => reading.metadata.timestamp = Some(ts),
            None => debug!("unparseable telegram timestamp '{}'", s),
        }
    }
    false
}

fn set_cosem_id(reading: &mut Reading, _obis: &ObisCode, value: &CosemValue) -> bool {
    reading.cosem.id = utf8(value);
    false
}

fn set_equipment_id(reading: &mut Reading, _obis: &ObisCode, value: &CosemValue) -> bool {
    reading.metadata.equipment_id = utf8(value);
    false
}

fn set_serial_number(reading: &mut Reading, _obis: &ObisCode, value: &CosemValue) -> bool {
    reading.metadata.serial_number = utf8(value);
    false
}

fn tariff_counters<'a>(
    reading: &'a mut Reading,
    obis: &ObisCode,
) -> &'a mut crate::reading::EnergyCounters {
    match obis.tariff.value() {
        Some(0) | None => &mut reading.electricity.total,
        Some(t) => reading.electricity.tariffs.entry(t).or_default(),
    }
}

fn energy_received(reading: &mut Reading, obis: &ObisCode, value: &CosemValue) -> bool {
    if let Some(n) = num(value) {
        tariff_counters(reading, obis).received = Some(n);
    }
    false
}

fn energy_returned(reading: &mut Reading, obis: &ObisCode, value: &CosemValue) -> bool {
    if let Some(n) = num(value) {
        tariff_counters(reading, obis).returned = Some(n);
    }
    false
}

fn reactive_energy_received(reading: &mut Reading, obis: &ObisCode, value: &CosemValue) -> bool {
    if let Some(n) = num(value) {
        tariff_counters(reading, obis).reactive_received = Some(n);
    }
    false
}

fn reactive_energy_returned(reading: &mut Reading, obis: &ObisCode, value: &CosemValue) -> bool {
    if let Some(n) = num(value) {
        tariff_counters(reading, obis).reactive_returned = Some(n);
    }
    false
}

fn set_current_tariff(reading: &mut Reading, _obis: &ObisCode, value: &CosemValue) -> bool {
    if let Some(n) = num(value) {
        reading.electricity.current_tariff = Some(n as u8);
    }
    false
}

fn power_received_total(reading: &mut Reading, _obis: &ObisCode, value: &CosemValue) -> bool {
    reading.electricity.power_received_total = num(value);
    false
}

fn power_returned_total(reading: &mut Reading, _obis: &ObisCode, value: &CosemValue) -> bool {
    reading.electricity.power_returned_total = num(value);
    false
}

fn reactive_power_received_total(
    reading: &mut Reading,
    _obis: &ObisCode,
    value: &CosemValue,
) -> bool {
    reading.electricity.reactive_power_received_total = num(value);
    false
}

fn reactive_power_returned_total(
    reading: &mut Reading,
    _obis: &ObisCode,
    value: &CosemValue,
) -> bool {
    reading.electricity.reactive_power_returned_total = num(value);
    false
}

fn power_failures(reading: &mut Reading, _obis: &ObisCode, value: &CosemValue) -> bool {
    reading.metadata.events.power_failures = num(value).map(|n| n as u64);
    false
}

fn long_power_failures(reading: &mut Reading, _obis: &ObisCode, value: &CosemValue) -> bool {
    reading.metadata.events.long_power_failures = num(value).map(|n| n as u64);
    false
}

fn voltage_sags(reading: &mut Reading, obis: &ObisCode, value: &CosemValue) -> bool {
    if let (Some(n), Some(slot)) = (
        num(value),
        counter_slot(&mut reading.metadata.events.voltage_sags, obis, 32),
    ) {
        *slot = Some(n as u64);
    }
    false
}

fn voltage_swells(reading: &mut Reading, obis: &ObisCode, value: &CosemValue) -> bool {
    if let (Some(n), Some(slot)) = (
        num(value),
        counter_slot(&mut reading.metadata.events.voltage_swells, obis, 32),
    ) {
        *slot = Some(n as u64);
    }
    false
}

fn text_message(reading: &mut Reading, _obis: &ObisCode, value: &CosemValue) -> bool {
    if let Some(s) = utf8(value) {
        if !s.is_empty() {
            reading.metadata.text_message = Some(s);
        }
    }
    false
}

fn numeric_message(reading: &mut Reading, _obis: &ObisCode, value: &CosemValue) -> bool {
    reading.metadata.numeric_message = num(value);
    false
}

fn voltage(reading: &mut Reading, obis: &ObisCode, value: &CosemValue) -> bool {
    if let CosemValue::Number {
        value,
        default_scalar,
        ..
    } = value
    {
        /* scalar-less DLMS lists transmit decivolt */
        let volts = if *default_scalar { value / 10.0 } else { *value };
        if let Some(slot) = phase_slot(&mut reading.electricity.voltage, obis, 32) {
            *slot = Some(volts);
        }
    }
    false
}

fn current(reading: &mut Reading, obis: &ObisCode, value: &CosemValue) -> bool {
    if let CosemValue::Number {
        value,
        default_scalar,
        ..
    } = value
    {
        /* scalar-less DLMS lists transmit centiampere */
        let amps = if *default_scalar { value / 100.0 } else { *value };
        if let Some(slot) = phase_slot(&mut reading.electricity.current, obis, 31) {
            *slot = Some(amps);
        }
    }
    false
}

fn power_received_phase(reading: &mut Reading, obis: &ObisCode, value: &CosemValue) -> bool {
    if let (Some(n), Some(slot)) = (
        num(value),
        phase_slot(&mut reading.electricity.power_received, obis, 21),
    ) {
        *slot = Some(n);
    }
    false
}

fn power_returned_phase(reading: &mut Reading, obis: &ObisCode, value: &CosemValue) -> bool {
    if let (Some(n), Some(slot)) = (
        num(value),
        phase_slot(&mut reading.electricity.power_returned, obis, 22),
    ) {
        *slot = Some(n);
    }
    false
}

fn reactive_power_received_phase(
    reading: &mut Reading,
    obis: &ObisCode,
    value: &CosemValue,
) -> bool {
    if let (Some(n), Some(slot)) = (
        num(value),
        phase_slot(&mut reading.electricity.reactive_power_received, obis, 23),
    ) {
        *slot = Some(n);
    }
    false
}

fn reactive_power_returned_phase(
    reading: &mut Reading,
    obis: &ObisCode,
    value: &CosemValue,
) -> bool {
    if let (Some(n), Some(slot)) = (
        num(value),
        phase_slot(&mut reading.electricity.reactive_power_returned, obis, 24),
    ) {
        *slot = Some(n);
    }
    false
}

fn mbus_channel(obis: &ObisCode) -> Option<u8> {
    obis.channel.value()
}

fn mbus_device_type(reading: &mut Reading, obis: &ObisCode, value: &CosemValue) -> bool {
    if let (Some(channel), Some(n)) = (mbus_channel(obis), num(value)) {
        reading.mbus.entry(channel).or_default().device_type = Some(n as u64);
    }
    false
}

fn mbus_equipment_id(reading: &mut Reading, obis: &ObisCode, value: &CosemValue) -> bool {
    if let (Some(channel), Some(id)) = (mbus_channel(obis), utf8(value)) {
        reading.mbus.entry(channel).or_default().equipment_id = Some(id);
    }
    false
}

/// DSMR-4/5 style M-Bus reading: `(timestamp)(value*unit)`. A DLMS push
/// carrying the same code delivers a plain number instead.
fn mbus_reading(reading: &mut Reading, obis: &ObisCode, value: &CosemValue) -> bool {
    let channel = match mbus_channel(obis) {
        Some(c) => c,
        None => return false,
    };
    match value {
        CosemValue::Raw { line, .. } => {
            let groups: Vec<String> = GROUP_RE
                .captures_iter(line)
                .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
                .collect();
            if groups.len() < 2 {
                warn!("malformed M-Bus reading line: {}", line);
                return false;
            }
            let entry = reading.mbus.entry(channel).or_default();
            entry.timestamp = Some(groups[0].clone());
            let (number, unit) = match groups[1].split_once('*') {
                Some((n, u)) => (n, Some(u)),
                None => (groups[1].as_str(), None),
            };
            if let Ok(n) = number.parse::<f64>() {
                let (n, unit) = units::normalize(n, unit);
                entry.value = Some(n);
                entry.unit = unit;
            }
        }
        CosemValue::Number { value, unit, .. } => {
            let entry = reading.mbus.entry(channel).or_default();
            entry.value = Some(*value);
            entry.unit = unit.clone();
        }
        _ => {}
    }
    false
}

/// DSMR-3 two-line gas record:
/// `0-c:24.3.0(timestamp)(status)(period)(count)(obis)(unit)` with the value
/// alone on the following line.
fn mbus_reading_legacy(reading: &mut Reading, obis: &ObisCode, value: &CosemValue) -> bool {
    let channel = match mbus_channel(obis) {
        Some(c) => c,
        None => return false,
    };
    let (line, next_line) = match value {
        CosemValue::Raw { line, next_line } => (line, next_line),
        _ => return false,
    };

    let groups: Vec<String> = GROUP_RE
        .captures_iter(line)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect();
    let entry = reading.mbus.entry(channel).or_default();
    if let Some(ts) = groups.first() {
        entry.timestamp = Some(ts.clone());
    }
    if let Some(period) = groups.get(2).and_then(|g| g.parse::<u64>().ok()) {
        entry.recording_period_minutes = Some(period);
    }
    if groups.len() >= 2 {
        if let Some(unit) = groups.last() {
            if !unit.is_empty() && unit.parse::<f64>().is_err() {
                entry.unit = Some(unit.clone());
            }
        }
    }

    if let Some(next) = next_line {
        if let Some(caps) = VALUE_LINE_RE.captures(next) {
            if let Some(n) = caps.get(1).and_then(|m| m.as_str().parse::<f64>().ok()) {
                entry.value = Some(n);
                return true;
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(s: &str) -> ObisCode {
        s.parse().unwrap()
    }

    #[test]
    fn test_version_and_tariff_dispatch() {
        let mut reading = Reading::new();
        assert_eq!(
            dispatch_line(&mut reading, &code("1-3:0.2.8"), "(50)", None),
            DispatchOutcome::Handled {
                consumed_next_line: false
            }
        );
        assert_eq!(reading.metadata.dsmr_version, Some(5.0));

        dispatch_line(&mut reading, &code("1-0:1.8.1"), "(002145.123*kWh)", None);
        dispatch_line(&mut reading, &code("1-0:1.8.0"), "(003968.579*kWh)", None);
        assert_eq!(
            reading.electricity.tariffs[&1].received,
            Some(2145.123 * 1000.0)
        );
        /* tariff 0 is the grand total */
        assert_eq!(reading.electricity.total.received, Some(3968.579 * 1000.0));
        assert_eq!(reading.cosem.known_objects.len(), 3);
    }

    #[test]
    fn test_unknown_code() {
        let mut reading = Reading::new();
        assert_eq!(
            dispatch_line(&mut reading, &code("77-7:7.7.7"), "(1)", None),
            DispatchOutcome::Unknown
        );
    }

    #[test]
    fn test_phase_mapping() {
        let mut reading = Reading::new();
        dispatch_line(&mut reading, &code("1-0:32.7.0"), "(220.1*V)", None);
        dispatch_line(&mut reading, &code("1-0:52.7.0"), "(221.2*V)", None);
        dispatch_line(&mut reading, &code("1-0:71.7.0"), "(003*A)", None);
        assert_eq!(reading.electricity.voltage.l1, Some(220.1));
        assert_eq!(reading.electricity.voltage.l2, Some(221.2));
        assert_eq!(reading.electricity.current.l3, Some(3.0));
    }

    #[test]
    fn test_dlms_default_scalar() {
        let mut reading = Reading::new();
        let volts = DlmsValue::U16(2301);
        assert!(dispatch_dlms(
            &mut reading,
            &ObisCode::from_bytes(&[1, 0, 32, 7, 0, 255]).unwrap(),
            &volts,
            None,
            None,
            true
        ));
        assert_eq!(reading.electricity.voltage.l1, Some(230.1));

        let amps = DlmsValue::U16(123);
        assert!(dispatch_dlms(
            &mut reading,
            &ObisCode::from_bytes(&[1, 0, 31, 7, 0, 255]).unwrap(),
            &amps,
            None,
            None,
            true
        ));
        assert_eq!(reading.electricity.current.l1, Some(1.23));
    }

    #[test]
    fn test_dlms_scalar_and_unit() {
        let mut reading = Reading::new();
        let value = DlmsValue::U32(2145123);
        assert!(dispatch_dlms(
            &mut reading,
            &ObisCode::from_bytes(&[1, 0, 1, 8, 0, 255]).unwrap(),
            &value,
            Some("Wh"),
            Some(0),
            false
        ));
        assert_eq!(reading.electricity.total.received, Some(2145123.0));

        /* scalar 1 with kW unit: ×10, then ×1000 */
        let power = DlmsValue::U16(12);
        assert!(dispatch_dlms(
            &mut reading,
            &ObisCode::from_bytes(&[1, 0, 1, 7, 0, 255]).unwrap(),
            &power,
            Some("kW"),
            Some(1),
            false
        ));
        assert_eq!(reading.electricity.power_received_total, Some(120000.0));
    }

    #[test]
    fn test_mbus_reading_line() {
        let mut reading = Reading::new();
        dispatch_line(&mut reading, &code("0-1:24.1.0"), "(003)", None);
        dispatch_line(
            &mut reading,
            &code("0-1:24.2.1"),
            "(230102120000W)(12785.123*m3)",
            None,
        );
        let mbus = &reading.mbus[&1];
        assert_eq!(mbus.device_type, Some(3));
        assert_eq!(mbus.timestamp.as_deref(), Some("230102120000W"));
        assert_eq!(mbus.value, Some(12785.123));
        assert_eq!(mbus.unit.as_deref(), Some("m3"));
    }

    #[test]
    fn test_mbus_legacy_two_line_gas() {
        let mut reading = Reading::new();
        let outcome = dispatch_line(
            &mut reading,
            &code("0-1:24.3.0"),
            "(090212160000)(00)(60)(1)(0-1:24.2.1)(m3)",
            Some("(00123.456)"),
        );
        assert_eq!(
            outcome,
            DispatchOutcome::Handled {
                consumed_next_line: true
            }
        );
        let mbus = &reading.mbus[&1];
        assert_eq!(mbus.value, Some(123.456));
        assert_eq!(mbus.unit.as_deref(), Some("m3"));
        assert_eq!(mbus.recording_period_minutes, Some(60));
        assert_eq!(mbus.timestamp.as_deref(), Some("090212160000"));
    }

    #[test]
    fn test_timestamp_parsing() {
        /* summer time is UTC+2 */
        let ts = parse_dsmr_timestamp("230702120000S").unwrap();
        assert_eq!(ts.to_rfc3339(), "2023-07-02T10:00:00+00:00");
        /* winter time is UTC+1 */
        let ts = parse_dsmr_timestamp("230102120000W").unwrap();
        assert_eq!(ts.to_rfc3339(), "2023-01-02T11:00:00+00:00");
        assert!(parse_dsmr_timestamp("not a clock").is_none());
    }
}
