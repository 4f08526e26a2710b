//! Vendor payload-shape recognizers. Each meter family wraps its push list
//! in a slightly different DLMS tree; the chain below is tried in insertion
//! order and the first recognizer that claims the tree wins. Predicates are
//! pure on the parsed tree.

use log::debug;

use crate::cosem::units;
use crate::dlms::parser::DlmsValue;
use crate::obis::ObisCode;

/// One (OBIS, value, unit) triple extracted from a payload tree.
#[derive(Debug, Clone)]
pub struct CosemObject {
    pub obis: ObisCode,
    pub value: DlmsValue,
    pub unit: Option<String>,
    pub scalar: Option<i8>,
    /// No scalar was transmitted: voltage is dV, current is cA.
    pub default_scalar: bool,
}

impl CosemObject {
    fn plain(obis: ObisCode, value: DlmsValue) -> Self {
        CosemObject {
            obis,
            value,
            unit: None,
            scalar: None,
            default_scalar: true,
        }
    }
}

type RecognizerFn = fn(&DlmsValue) -> Option<Vec<CosemObject>>;

const RECOGNIZERS: [(&str, RecognizerFn); 6] = [
    ("basic-list", basic_list),
    ("basic-structure", basic_structure),
    ("described-list", described_list),
    ("iskra-list", iskra_list),
    ("ece-list-1", ece_list_1),
    ("ece-list-2", ece_list_2),
];

/// Run the recognizer chain; returns the matching recognizer's name and the
/// extracted objects.
pub fn recognize(body: &DlmsValue) -> Option<(&'static str, Vec<CosemObject>)> {
    for (name, recognizer) in RECOGNIZERS {
        if let Some(objects) = recognizer(body) {
            debug!("payload matched {} ({} objects)", name, objects.len());
            return Some((name, objects));
        }
    }
    None
}

/// Structure whose first element is the push list name, followed by
/// alternating OBIS octet-string / value pairs.
fn basic_list(body: &DlmsValue) -> Option<Vec<CosemObject>> {
    let entries = match body {
        DlmsValue::Structure(entries) => entries,
        _ => return None,
    };
    if entries.len() < 3 || entries.len() % 2 == 0 {
        return None;
    }
    if !matches!(entries[0], DlmsValue::Text(_)) {
        return None;
    }

    let mut objects = Vec::new();
    for pair in entries[1..].chunks(2) {
        let obis = ObisCode::from_bytes(pair[0].octets()?).ok()?;
        objects.push(CosemObject::plain(obis, pair[1].clone()));
    }
    Some(objects)
}

/// Structure of 2/3-element structures, each starting with an OBIS
/// octet-string. An optional third element `{scalar, enum unit}` scales the
/// value by 10^scalar.
fn basic_structure(body: &DlmsValue) -> Option<Vec<CosemObject>> {
    let entries = match body {
        DlmsValue::Structure(entries) if !entries.is_empty() => entries,
        _ => return None,
    };

    let mut objects = Vec::new();
    for entry in entries {
        let items = match entry {
            DlmsValue::Structure(items) if items.len() == 2 || items.len() == 3 => items,
            _ => return None,
        };
        let obis = ObisCode::from_bytes(items[0].octets()?).ok()?;

        let object = if items.len() == 3 {
            let scalar_unit = items[2].entries()?;
            if scalar_unit.len() != 2 {
                return None;
            }
            let scalar = scalar_unit[0].as_i64()? as i8;
            let unit = match scalar_unit[1] {
                DlmsValue::Enum(code) => units::unit_name(code).map(|u| u.to_string()),
                _ => return None,
            };
            CosemObject {
                obis,
                value: items[1].clone(),
                unit,
                scalar: Some(scalar),
                default_scalar: false,
            }
        } else {
            CosemObject::plain(obis, items[1].clone())
        };
        objects.push(object);
    }
    Some(objects)
}

/// Structure whose first element is a descriptor structure of the same
/// length as the parent; descriptor entry `n` holds the OBIS code of parent
/// entry `n` at index 1.
fn described_list(body: &DlmsValue) -> Option<Vec<CosemObject>> {
    let entries = match body {
        DlmsValue::Structure(entries) if entries.len() >= 2 => entries,
        _ => return None,
    };
    let descriptor = match &entries[0] {
        DlmsValue::Structure(descriptor) if descriptor.len() == entries.len() => descriptor,
        _ => return None,
    };

    let mut objects = Vec::new();
    for i in 1..entries.len() {
        let described = descriptor[i].entries()?;
        if described.len() < 2 {
            return None;
        }
        let obis = ObisCode::from_bytes(described[1].octets()?).ok()?;
        objects.push(CosemObject::plain(obis, entries[i].clone()));
    }
    Some(objects)
}

/// Iskra AM550-style fixed list: exactly 12 elements headed by the push
/// setup object `0-6:25.9.0.255`. The per-index codes are hardcoded.
const ISKRA_PUSH_OBJECT: [u8; 6] = [0, 6, 25, 9, 0, 255];

const ISKRA_SLOTS: [Option<&str>; 12] = [
    None, // push setup object itself
    Some("0-0:96.1.1"),
    Some("1-0:1.8.0"),
    Some("1-0:2.8.0"),
    Some("1-0:3.8.0"),
    Some("1-0:4.8.0"),
    Some("1-0:1.7.0"),
    Some("1-0:2.7.0"),
    Some("1-0:3.7.0"),
    Some("1-0:4.7.0"),
    Some("0-0:96.14.0"),
    None, // limiter status, not mapped
];

fn iskra_list(body: &DlmsValue) -> Option<Vec<CosemObject>> {
    let entries = match body {
        DlmsValue::Structure(entries) if entries.len() == 12 => entries,
        _ => return None,
    };
    if entries[0].octets()? != ISKRA_PUSH_OBJECT {
        return None;
    }

    let mut objects = Vec::new();
    for (i, slot) in ISKRA_SLOTS.iter().enumerate() {
        if let Some(code) = slot {
            let obis = code.parse().ok()?;
            objects.push(CosemObject::plain(obis, entries[i].clone()));
        }
    }
    Some(objects)
}

/// Positional ECE schemas: a flat structure whose element order and types
/// are fixed per list revision.
#[derive(Clone, Copy)]
enum Expected {
    Octets,
    Number,
}

fn matches_expected(value: &DlmsValue, expected: Expected) -> bool {
    match expected {
        Expected::Octets => matches!(value, DlmsValue::OctetString(_)),
        Expected::Number => value.as_f64().is_some(),
    }
}

const ECE_SCHEMA_1: [(&str, Expected); 7] = [
    ("0-0:96.1.1", Expected::Octets),
    ("1-0:1.8.0", Expected::Number),
    ("1-0:2.8.0", Expected::Number),
    ("1-0:1.7.0", Expected::Number),
    ("1-0:2.7.0", Expected::Number),
    ("0-0:96.14.0", Expected::Number),
    ("0-0:96.7.21", Expected::Number),
];

const ECE_SCHEMA_2: [(&str, Expected); 13] = [
    ("0-0:96.1.1", Expected::Octets),
    ("1-0:1.8.0", Expected::Number),
    ("1-0:2.8.0", Expected::Number),
    ("1-0:1.7.0", Expected::Number),
    ("1-0:2.7.0", Expected::Number),
    ("0-0:96.14.0", Expected::Number),
    ("0-0:96.7.21", Expected::Number),
    ("1-0:32.7.0", Expected::Number),
    ("1-0:52.7.0", Expected::Number),
    ("1-0:72.7.0", Expected::Number),
    ("1-0:31.7.0", Expected::Number),
    ("1-0:51.7.0", Expected::Number),
    ("1-0:71.7.0", Expected::Number),
];

fn ece_list(body: &DlmsValue, schema: &[(&str, Expected)]) -> Option<Vec<CosemObject>> {
    let entries = match body {
        DlmsValue::Structure(entries) if entries.len() == schema.len() => entries,
        _ => return None,
    };
    for (entry, (_, expected)) in entries.iter().zip(schema) {
        if !matches_expected(entry, *expected) {
            return None;
        }
    }

    let mut objects = Vec::new();
    for (entry, (code, _)) in entries.iter().zip(schema) {
        let obis = code.parse().ok()?;
        objects.push(CosemObject::plain(obis, entry.clone()));
    }
    Some(objects)
}

fn ece_list_1(body: &DlmsValue) -> Option<Vec<CosemObject>> {
    ece_list(body, &ECE_SCHEMA_1)
}

fn ece_list_2(body: &DlmsValue) -> Option<Vec<CosemObject>> {
    ece_list(body, &ECE_SCHEMA_2)
}
