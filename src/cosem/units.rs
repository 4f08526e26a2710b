/// DLMS unit enum values seen in (scalar, unit) pairs of push telegrams.
pub fn unit_name(code: u8) -> Option<&'static str> {
    match code {
        27 => Some("W"),    // active power
        28 => Some("VA"),   // apparent power
        29 => Some("var"),  // reactive power
        30 => Some("Wh"),   // active energy
        31 => Some("VAh"),  // apparent energy
        32 => Some("varh"), // reactive energy
        33 => Some("A"),    // current
        34 => Some("°C"),   // temperature
        35 => Some("V"),    // voltage
        _ => None,
    }
}

/// Convert k-prefixed electrical units to their base unit. Everything the
/// record stores is in W, V, A, Wh, VAh and varh.
pub fn normalize(value: f64, unit: Option<&str>) -> (f64, Option<String>) {
    let unit = match unit {
        Some(u) => u.trim(),
        None => return (value, None),
    };
    if unit.is_empty() {
        return (value, None);
    }
    if let Some(rest) = unit.strip_prefix('k').or_else(|| unit.strip_prefix('K')) {
        for base in ["Wh", "W", "varh", "var", "VAh", "VA"] {
            if rest.eq_ignore_ascii_case(base) {
                return (value * 1000.0, Some(base.to_string()));
            }
        }
    }
    (value, Some(unit.to_string()))
}
