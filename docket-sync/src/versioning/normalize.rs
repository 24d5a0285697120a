//! Pure normalization functions applied before hashing
//!
//! Each function maps "the same fact" to the same string regardless of how
//! the source system happened to store it.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;

/// Country calling code stripped from international phone numbers
pub const HOME_COUNTRY_CODE: &str = "972";

/// Fixed format used for every hashed timestamp
pub const DATE_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// NULL, "" and whitespace-only all become ""; other values are trimmed
pub fn text(value: Option<&str>) -> String {
    value.map(str::trim).unwrap_or_default().to_string()
}

/// Canonical local-digit form: `+972-50-123-4567`, `00972501234567`,
/// `972501234567` and `050-1234567` all become `0501234567`.
pub fn phone(value: Option<&str>) -> String {
    let Some(raw) = value else {
        return String::new();
    };
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return String::new();
    }

    let international = raw.trim_start().starts_with('+');
    let national = if let Some(rest) = digits.strip_prefix("00").and_then(|d| d.strip_prefix(HOME_COUNTRY_CODE)) {
        rest
    } else if international {
        digits.strip_prefix(HOME_COUNTRY_CODE).unwrap_or(&digits)
    } else if digits.len() == 12 && digits.starts_with(HOME_COUNTRY_CODE) {
        // Country code exported without its `+`
        &digits[HOME_COUNTRY_CODE.len()..]
    } else {
        digits.as_str()
    };

    if national.starts_with('0') {
        national.to_string()
    } else {
        format!("0{}", national)
    }
}

/// NULL becomes ""; zero becomes "0". Trailing zeros are dropped so `1.50` and `1.5` agree.
pub fn decimal(value: Option<Decimal>) -> String {
    match value {
        Some(d) => d.normalize().to_string(),
        None => String::new(),
    }
}

/// NULL becomes ""; otherwise [`DATE_TIME_FORMAT`]
pub fn date_time(value: Option<NaiveDateTime>) -> String {
    value
        .map(|dt| dt.format(DATE_TIME_FORMAT).to_string())
        .unwrap_or_default()
}
