//! German-locale number formatting for report output.

/// Format a floating-point number with `.` thousands separators and a `,`
/// decimal separator.
///
/// # Examples
///
/// ```
/// use meter_core::formatting::format_number;
///
/// assert_eq!(format_number(1234.5, 1), "1.234,5");
/// assert_eq!(format_number(1234567.0, 0), "1.234.567");
/// assert_eq!(format_number(0.0, 2), "0,00");
/// assert_eq!(format_number(-9876.5, 1), "-9.876,5");
/// ```
pub fn format_number(value: f64, decimals: u32) -> String {
    let negative = value < 0.0;
    let abs_value = value.abs();

    // Nudge by half an ULP at the target precision so exact midpoints such as
    // 1.005 round up despite their binary representation.
    let factor = 10_f64.powi(decimals as i32);
    let epsilon = f64::EPSILON * abs_value * factor;
    let rounded = ((abs_value * factor) + epsilon).round() / factor;

    let integer_part = rounded.trunc() as u64;
    let grouped = group_thousands(&integer_part.to_string());

    let result = if decimals == 0 {
        grouped
    } else {
        let frac_str = format!("{:.prec$}", rounded - rounded.trunc(), prec = decimals as usize);
        // `frac_str` is "0.50"; keep the digits after the point.
        format!("{},{}", grouped, &frac_str[2..])
    };

    if negative && rounded != 0.0 {
        format!("-{}", result)
    } else {
        result
    }
}

/// Format an amount in euros, e.g. `"1.234,56 €"`.
///
/// # Examples
///
/// ```
/// use meter_core::formatting::format_currency;
///
/// assert_eq!(format_currency(1234.56), "1.234,56 €");
/// assert_eq!(format_currency(0.0), "0,00 €");
/// ```
pub fn format_currency(amount: f64) -> String {
    format!("{} €", format_number(amount, 2))
}

/// Format a percentage with two decimals, e.g. `"33,33 %"`.
pub fn format_percent(percent: f64) -> String {
    format!("{} %", format_number(percent, 2))
}

/// Format an optional quantity with its unit, or `"–"` when unknown.
pub fn format_quantity(value: Option<f64>, unit: &str) -> String {
    match value {
        Some(v) if unit.is_empty() => format_number(v, 2),
        Some(v) => format!("{} {}", format_number(v, 2), unit),
        None => "–".to_string(),
    }
}

// ── Internal helpers ──────────────────────────────────────────────────────────

/// Insert dots every three digits from the right of an integer string.
fn group_thousands(s: &str) -> String {
    if s.len() <= 3 {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    let remainder = chars.len() % 3;
    for (i, &c) in chars.iter().enumerate() {
        if i != 0 && (i % 3 == remainder) {
            result.push('.');
        }
        result.push(c);
    }
    result
}

// ── Tests ──────────────────────────────────────────────────────────────────────
