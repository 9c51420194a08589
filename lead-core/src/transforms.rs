//! The fixed transform registry (§4.4). Every transform is a pure
//! `Value -> Value` function. `null`/missing input always yields `Null`;
//! transforms never panic.

use crate::value::Value;
use chrono::{DateTime, NaiveDate, Utc};

pub type TransformFn = fn(&Value) -> Value;

/// Looks up a transform by id. Unknown ids pass the value through unchanged,
/// per contract.
pub fn apply(transform_id: &str, input: &Value) -> Value {
    if input.is_null() {
        return Value::Null;
    }
    match lookup(transform_id) {
        Some(f) => f(input),
        None => input.clone(),
    }
}

fn lookup(transform_id: &str) -> Option<TransformFn> {
    Some(match transform_id {
        "yesNo" => yes_no,
        "yesNoLower" => yes_no_lower,
        "YN" => yn,
        "oneZero" => one_zero,
        "truefalse" => truefalse,

        "uppercase" => uppercase,
        "lowercase" => lowercase,
        "titlecase" => titlecase,
        "trim" => trim,
        "truncate50" => truncate_50,
        "truncate100" => truncate_100,
        "truncate255" => truncate_255,

        "digitsOnly" => digits_only,
        "e164" => e164,
        "dashed" => phone_dashed,
        "dotted" => phone_dotted,
        "parentheses" => phone_parentheses,

        "isoDate" => iso_date,
        "usDate" => us_date,
        "usDateShort" => us_date_short,
        "timestamp" => timestamp,
        "timestampMs" => timestamp_ms,
        "iso8601" => iso8601,

        "integer" => integer,
        "round" => round,
        "twoDecimals" => two_decimals,
        "currency" => currency,
        "percentage" => percentage,

        "windowTypeCode" => window_type_code,
        "roofTypeCode" => roof_type_code,
        "timeframeCode" => timeframe_code,

        _ => return None,
    })
}

fn as_bool_like(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::Str(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Some(true),
            "false" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        Value::Num(n) => n.as_f64().map(|f| f != 0.0),
        _ => None,
    }
}

fn yes_no(v: &Value) -> Value {
    match as_bool_like(v) {
        Some(true) => Value::from("Yes"),
        Some(false) => Value::from("No"),
        None => Value::Null,
    }
}

fn yes_no_lower(v: &Value) -> Value {
    match as_bool_like(v) {
        Some(true) => Value::from("yes"),
        Some(false) => Value::from("no"),
        None => Value::Null,
    }
}

fn yn(v: &Value) -> Value {
    match as_bool_like(v) {
        Some(true) => Value::from("Y"),
        Some(false) => Value::from("N"),
        None => Value::Null,
    }
}

fn one_zero(v: &Value) -> Value {
    match as_bool_like(v) {
        Some(true) => Value::from(serde_json::Number::from(1)),
        Some(false) => Value::from(serde_json::Number::from(0)),
        None => Value::Null,
    }
}

fn truefalse(v: &Value) -> Value {
    match as_bool_like(v) {
        Some(b) => Value::Bool(b),
        None => Value::Null,
    }
}

fn as_str(v: &Value) -> Option<&str> {
    v.as_str()
}

fn uppercase(v: &Value) -> Value {
    as_str(v).map(|s| Value::from(s.to_uppercase())).unwrap_or(Value::Null)
}

fn lowercase(v: &Value) -> Value {
    as_str(v).map(|s| Value::from(s.to_lowercase())).unwrap_or(Value::Null)
}

fn titlecase(v: &Value) -> Value {
    as_str(v)
        .map(|s| {
            let titled = s
                .split_whitespace()
                .map(|word| {
                    let mut chars = word.chars();
                    match chars.next() {
                        Some(first) => first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase(),
                        None => String::new(),
                    }
                })
                .collect::<Vec<_>>()
                .join(" ");
            Value::from(titled)
        })
        .unwrap_or(Value::Null)
}

fn trim(v: &Value) -> Value {
    as_str(v).map(|s| Value::from(s.trim().to_string())).unwrap_or(Value::Null)
}

fn truncate_to(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

fn truncate_50(v: &Value) -> Value {
    as_str(v).map(|s| Value::from(truncate_to(s, 50))).unwrap_or(Value::Null)
}

fn truncate_100(v: &Value) -> Value {
    as_str(v).map(|s| Value::from(truncate_to(s, 100))).unwrap_or(Value::Null)
}

fn truncate_255(v: &Value) -> Value {
    as_str(v).map(|s| Value::from(truncate_to(s, 255))).unwrap_or(Value::Null)
}

fn digits_only_string(v: &Value) -> Option<String> {
    as_str(v).map(|s| s.chars().filter(|c| c.is_ascii_digit()).collect())
}

fn digits_only(v: &Value) -> Value {
    digits_only_string(v).map(Value::from).unwrap_or(Value::Null)
}

/// Normalizes a 10- or 11-digit North American number into `+1XXXXXXXXXX`.
/// Any other digit count yields `Null` (malformed input never panics).
fn e164(v: &Value) -> Value {
    let digits = match digits_only_string(v) {
        Some(d) => d,
        None => return Value::Null,
    };
    let ten = match digits.len() {
        10 => digits,
        11 if digits.starts_with('1') => digits[1..].to_string(),
        _ => return Value::Null,
    };
    Value::from(format!("+1{ten}"))
}

fn phone_dashed(v: &Value) -> Value {
    format_ten_digit(v, |d| format!("{}-{}-{}", &d[0..3], &d[3..6], &d[6..10]))
}

fn phone_dotted(v: &Value) -> Value {
    format_ten_digit(v, |d| format!("{}.{}.{}", &d[0..3], &d[3..6], &d[6..10]))
}

fn phone_parentheses(v: &Value) -> Value {
    format_ten_digit(v, |d| format!("({}) {}-{}", &d[0..3], &d[3..6], &d[6..10]))
}

fn format_ten_digit(v: &Value, f: impl Fn(&str) -> String) -> Value {
    match digits_only_string(v) {
        Some(d) if d.len() == 10 => Value::from(f(&d)),
        Some(d) if d.len() == 11 && d.starts_with('1') => Value::from(f(&d[1..])),
        _ => Value::Null,
    }
}

fn parse_date(v: &Value) -> Option<DateTime<Utc>> {
    match v {
        Value::Str(s) => {
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
            }
            None
        }
        Value::Num(n) => {
            let secs = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            DateTime::from_timestamp(secs, 0)
        }
        _ => None,
    }
}

fn iso_date(v: &Value) -> Value {
    parse_date(v).map(|d| Value::from(d.format("%Y-%m-%d").to_string())).unwrap_or(Value::Null)
}

fn us_date(v: &Value) -> Value {
    parse_date(v).map(|d| Value::from(d.format("%m/%d/%Y").to_string())).unwrap_or(Value::Null)
}

fn us_date_short(v: &Value) -> Value {
    parse_date(v).map(|d| Value::from(d.format("%m/%d/%y").to_string())).unwrap_or(Value::Null)
}

fn timestamp(v: &Value) -> Value {
    parse_date(v)
        .map(|d| Value::from(serde_json::Number::from(d.timestamp())))
        .unwrap_or(Value::Null)
}

fn timestamp_ms(v: &Value) -> Value {
    parse_date(v)
        .map(|d| Value::from(serde_json::Number::from(d.timestamp_millis())))
        .unwrap_or(Value::Null)
}

fn iso8601(v: &Value) -> Value {
    parse_date(v).map(|d| Value::from(d.to_rfc3339())).unwrap_or(Value::Null)
}

fn as_decimal(v: &Value) -> Option<f64> {
    match v {
        Value::Num(n) => n.as_f64(),
        Value::Str(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn integer(v: &Value) -> Value {
    as_decimal(v)
        .map(|f| Value::from(serde_json::Number::from(f.round() as i64)))
        .unwrap_or(Value::Null)
}

fn round(v: &Value) -> Value {
    integer(v)
}

fn two_decimals(v: &Value) -> Value {
    as_decimal(v)
        .and_then(|f| serde_json::Number::from_f64((f * 100.0).round() / 100.0))
        .map(Value::Num)
        .unwrap_or(Value::Null)
}

fn currency(v: &Value) -> Value {
    as_decimal(v).map(|f| Value::from(format!("${f:.2}"))).unwrap_or(Value::Null)
}

fn percentage(v: &Value) -> Value {
    as_decimal(v).map(|f| Value::from(format!("{f:.0}%"))).unwrap_or(Value::Null)
}

fn window_type_code(v: &Value) -> Value {
    code_table(v, &[("double-hung", "DH"), ("casement", "CS"), ("sliding", "SL"), ("bay", "BY")])
}

fn roof_type_code(v: &Value) -> Value {
    code_table(v, &[("asphalt", "ASP"), ("metal", "MTL"), ("tile", "TIL"), ("flat", "FLT")])
}

fn timeframe_code(v: &Value) -> Value {
    code_table(
        v,
        &[("immediately", "IMM"), ("within_month", "1MO"), ("within_3_months", "3MO"), ("researching", "RES")],
    )
}

fn code_table(v: &Value, table: &[(&str, &str)]) -> Value {
    as_str(v)
        .and_then(|s| table.iter().find(|(k, _)| *k == s).map(|(_, code)| *code))
        .map(Value::from)
        .unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_preservation_holds_for_every_transform() {
        let ids = [
            "yesNo", "yesNoLower", "YN", "oneZero", "truefalse", "uppercase", "lowercase",
            "titlecase", "trim", "truncate50", "truncate100", "truncate255", "digitsOnly", "e164",
            "dashed", "dotted", "parentheses", "isoDate", "usDate", "usDateShort", "timestamp",
            "timestampMs", "iso8601", "integer", "round", "twoDecimals", "currency", "percentage",
            "windowTypeCode", "roofTypeCode", "timeframeCode",
        ];
        for id in ids {
            assert_eq!(apply(id, &Value::Null), Value::Null, "transform {id} must preserve null");
        }
    }

    #[test]
    fn unknown_transform_passes_through() {
        let v = Value::from("hello");
        assert_eq!(apply("does-not-exist", &v), v);
    }

    #[test]
    fn phone_e164_digits_only_round_trip() {
        for input in ["(555) 123-4567", "15551234567", "555-123-4567"] {
            let v = Value::from(input);
            let digits = apply("digitsOnly", &v);
            let first = apply("e164", &v);
            let second = apply("e164", &digits);
            assert_eq!(first, second);
        }
    }

    #[test]
    fn e164_rejects_wrong_digit_count() {
        assert_eq!(apply("e164", &Value::from("12345")), Value::Null);
    }

    #[test]
    fn malformed_input_never_panics() {
        let v = Value::Bool(true);
        assert_eq!(apply("isoDate", &v), Value::Null);
        assert_eq!(apply("digitsOnly", &v), Value::Null);
        assert_eq!(apply("currency", &v), Value::Null);
    }

    #[test]
    fn yes_no_family() {
        assert_eq!(apply("yesNo", &Value::Bool(true)), Value::from("Yes"));
        assert_eq!(apply("yesNoLower", &Value::Bool(false)), Value::from("no"));
        assert_eq!(apply("YN", &Value::Bool(true)), Value::from("Y"));
    }
}
