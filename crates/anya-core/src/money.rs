//! Minor-unit money helpers
//!
//! Every amount in the ledger is an `i64` count of the currency's smallest
//! unit (paise for INR, cents for USD). Floating point only appears when a
//! ratio is computed for display or scoring.

/// Default ledger currency for new users
pub const DEFAULT_CURRENCY: &str = "INR";

/// Number of decimal places in the currency's minor unit (ISO 4217)
pub fn minor_exponent(currency: &str) -> u32 {
    match currency.to_uppercase().as_str() {
        "JPY" | "KRW" | "VND" | "CLP" | "ISK" | "UGX" => 0,
        "BHD" | "KWD" | "OMR" | "JOD" | "TND" | "IQD" | "LYD" => 3,
        _ => 2,
    }
}

/// Minor units in one whole unit (100 for INR)
pub fn minor_per_unit(currency: &str) -> i64 {
    10_i64.pow(minor_exponent(currency))
}

/// Display symbol for a currency code; unknown codes render as the code itself
pub fn symbol(currency: &str) -> String {
    match currency.to_uppercase().as_str() {
        "INR" => "₹".to_string(),
        "USD" => "$".to_string(),
        "EUR" => "€".to_string(),
        "GBP" => "£".to_string(),
        "JPY" => "¥".to_string(),
        other => format!("{} ", other),
    }
}

/// Whether a string looks like an ISO 4217 code
pub fn is_currency_code(currency: &str) -> bool {
    let c = currency.trim();
    c.len() == 3 && c.chars().all(|ch| ch.is_ascii_alphabetic())
}

/// Parse a numeral such as `1,20,000`, `1.234,50` or `450.75` into minor units.
///
/// Either `,` or `.` may be the decimal separator. The last separator is
/// treated as decimal when one or two digits follow it; when exactly three
/// digits follow, every separator is a thousands separator. Fractions finer
/// than the currency's minor unit are rounded half away from zero.
pub fn parse_minor(numeral: &str, currency: &str) -> Option<i64> {
    let numeral = numeral.trim();
    if numeral.is_empty() || !numeral.chars().next()?.is_ascii_digit() {
        return None;
    }

    let last_sep = numeral.rfind(|c: char| c == ',' || c == '.');
    let (whole, frac) = match last_sep {
        Some(idx) => {
            let tail = &numeral[idx + 1..];
            if tail.is_empty() || !tail.chars().all(|c| c.is_ascii_digit()) {
                return None;
            }
            match tail.len() {
                1 | 2 => (&numeral[..idx], tail),
                3 => (numeral, ""),
                _ => return None,
            }
        }
        None => (numeral, ""),
    };

    let digits: String = whole.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() || whole.chars().any(|c| !c.is_ascii_digit() && c != ',' && c != '.') {
        return None;
    }

    let exponent = minor_exponent(currency);
    let units: i64 = digits.parse().ok()?;
    let mut minor = units.checked_mul(10_i64.pow(exponent))?;

    if !frac.is_empty() {
        let frac_len = frac.len() as u32;
        let frac_value: i64 = frac.parse().ok()?;
        if frac_len <= exponent {
            minor = minor.checked_add(frac_value * 10_i64.pow(exponent - frac_len))?;
        } else {
            let divisor = 10_i64.pow(frac_len - exponent);
            let rounded = (frac_value + divisor / 2) / divisor;
            minor = minor.checked_add(rounded)?;
        }
    }

    Some(minor)
}

/// Round a minor-unit amount to the nearest whole currency unit
pub fn round_to_units(minor: i64, currency: &str) -> i64 {
    let per_unit = minor_per_unit(currency);
    let half = per_unit / 2;
    if minor >= 0 {
        (minor + half) / per_unit
    } else {
        -((-minor + half) / per_unit)
    }
}

/// Format an amount for chat output, e.g. `₹1,50,000` or `$12.50`.
///
/// INR uses lakh grouping; everything else groups by thousands. The fraction
/// is omitted when it is zero.
pub fn format_amount(minor: i64, currency: &str) -> String {
    let per_unit = minor_per_unit(currency);
    let exponent = minor_exponent(currency) as usize;
    let sign = if minor < 0 { "-" } else { "" };
    let abs = minor.unsigned_abs();
    let units = abs / per_unit as u64;
    let frac = abs % per_unit as u64;

    let grouped = if currency.eq_ignore_ascii_case("INR") {
        group_indian(units)
    } else {
        group_thousands(units)
    };

    if frac == 0 {
        format!("{}{}{}", sign, symbol(currency), grouped)
    } else {
        format!(
            "{}{}{}.{:0width$}",
            sign,
            symbol(currency),
            grouped,
            frac,
            width = exponent
        )
    }
}

fn group_thousands(units: u64) -> String {
    let digits = units.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

fn group_indian(units: u64) -> String {
    let digits = units.to_string();
    if digits.len() <= 3 {
        return digits;
    }
    let (head, last3) = digits.split_at(digits.len() - 3);
    let mut out = String::new();
    for (i, ch) in head.chars().enumerate() {
        if i > 0 && (head.len() - i) % 2 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out.push(',');
    out.push_str(last3);
    out
}
