//! Minor-unit helpers shared by the webhook adapters and the exporters.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Number of decimal places of the currency's minor unit (ISO 4217).
pub fn minor_unit_exponent(currency: &str) -> u32 {
    match currency.to_ascii_uppercase().as_str() {
        "BIF" | "CLP" | "DJF" | "GNF" | "ISK" | "JPY" | "KMF" | "KRW" | "PYG" | "RWF" | "UGX"
        | "VND" | "VUV" | "XAF" | "XOF" | "XPF" => 0,
        "BHD" | "IQD" | "JOD" | "KWD" | "LYD" | "OMR" | "TND" => 3,
        _ => 2,
    }
}

/// Parses a decimal major-unit string such as `"100.00"` into minor units.
/// Values with more precision than the currency allows are rejected rather
/// than rounded.
pub fn parse_major_units(value: &str, currency: &str) -> Option<i64> {
    let amount = Decimal::from_str(value.trim()).ok()?;
    let scale = Decimal::from(10_i64.pow(minor_unit_exponent(currency)));
    let minor = amount.checked_mul(scale)?;
    if minor.fract() != Decimal::ZERO {
        return None;
    }
    minor.to_i64()
}

/// Renders minor units as a major-unit string, e.g. `8761` USD -> `"87.61"`.
pub fn format_minor_units(amount: i64, currency: &str) -> String {
    Decimal::new(amount, minor_unit_exponent(currency)).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_major_unit_strings() {
        assert_eq!(parse_major_units("100.00", "USD"), Some(10_000));
        assert_eq!(parse_major_units("3.4", "usd"), Some(340));
        assert_eq!(parse_major_units("500", "JPY"), Some(500));
        assert_eq!(parse_major_units("1.234", "KWD"), Some(1_234));
        assert_eq!(parse_major_units("1.005", "USD"), None);
        assert_eq!(parse_major_units("abc", "USD"), None);
    }

    #[test]
    fn formats_minor_units() {
        assert_eq!(format_minor_units(8_761, "USD"), "87.61");
        assert_eq!(format_minor_units(5, "USD"), "0.05");
        assert_eq!(format_minor_units(0, "USD"), "0.00");
        assert_eq!(format_minor_units(500, "JPY"), "500");
        assert_eq!(format_minor_units(-340, "USD"), "-3.40");
    }
}
