//! Coercion of raw text tokens into typed column values.

use chrono::NaiveDate;

use crate::error::TokenError;

/// How a staged text column is turned into its canonical type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Text,
    Integer,
    Real,
    /// `"0"` / `"1"`.
    Flag,
    /// `YYYYMMDD`.
    Date,
    /// `H:MM:SS` with an unbounded hour, stored as seconds.
    ClockTime,
}

impl Coercion {
    /// SQLite storage type of the canonical column.
    pub fn sql_type(self) -> &'static str {
        match self {
            Coercion::Text | Coercion::Date => "TEXT",
            Coercion::Integer | Coercion::Flag | Coercion::ClockTime => "INTEGER",
            Coercion::Real => "REAL",
        }
    }

    pub fn apply(self, token: &str) -> Result<Value, TokenError> {
        Ok(match self {
            Coercion::Text => Value::Text(token.to_string()),
            Coercion::Integer => Value::Integer(parse_integer(token)?),
            Coercion::Real => Value::Real(parse_real(token)?),
            Coercion::Flag => Value::Flag(parse_flag(token)?),
            Coercion::Date => Value::Date(parse_date(token)?),
            Coercion::ClockTime => Value::Integer(parse_clock_time(token)?),
        })
    }
}

/// A coerced value ready to be bound into an insert.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Real(f64),
    Flag(bool),
    Date(NaiveDate),
}

fn malformed(expected: &'static str, token: &str) -> TokenError {
    TokenError {
        expected,
        token: token.to_string(),
    }
}

pub fn parse_integer(token: &str) -> Result<i64, TokenError> {
    token
        .trim()
        .parse()
        .map_err(|_| malformed("an integer", token))
}

pub fn parse_real(token: &str) -> Result<f64, TokenError> {
    match token.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(malformed("a number", token)),
    }
}

pub fn parse_flag(token: &str) -> Result<bool, TokenError> {
    match token.trim() {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(malformed("0 or 1", token)),
    }
}

pub fn parse_date(token: &str) -> Result<NaiveDate, TokenError> {
    let trimmed = token.trim();
    if trimmed.len() != 8 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed("a YYYYMMDD date", token));
    }
    NaiveDate::parse_from_str(trimmed, "%Y%m%d").map_err(|_| malformed("a YYYYMMDD date", token))
}

/// Converts `H:MM:SS` into seconds past midnight of the service date.
///
/// The hour is not limited to 0-23: trips that run past midnight are encoded
/// as `25:30:00` and stay attributed to the previous service date.
pub fn parse_clock_time(token: &str) -> Result<i64, TokenError> {
    let trimmed = token.trim();
    let mut parts = trimmed.split(':');
    let (Some(h), Some(m), Some(s), None) = (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(malformed("a H:MM:SS time", token));
    };

    let field = |part: &str, max_len: usize| -> Result<i64, TokenError> {
        if part.is_empty() || part.len() > max_len || !part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed("a H:MM:SS time", token));
        }
        part.parse::<i64>()
            .map_err(|_| malformed("a H:MM:SS time", token))
    };

    let hours = field(h, 9)?;
    let minutes = field(m, 2)?;
    let seconds = field(s, 2)?;
    Ok(hours * 3600 + minutes * 60 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_time_past_midnight() {
        assert_eq!(parse_clock_time("25:30:15"), Ok(91815));
    }

    #[test]
    fn test_clock_time_midnight_and_single_digit_hour() {
        assert_eq!(parse_clock_time("00:00:00"), Ok(0));
        assert_eq!(parse_clock_time("3:05:09"), Ok(11109));
        assert_eq!(parse_clock_time(" 7:00:00"), Ok(25200));
    }

    #[test]
    fn test_clock_time_has_no_upper_bound() {
        assert_eq!(parse_clock_time("48:00:00"), Ok(172800));
    }

    #[test]
    fn test_clock_time_rejects_malformed_tokens() {
        for token in ["", "12:00", "12:00:00:00", "ab:cd:ef", "12:-1:00", "12:000:00"] {
            let err = parse_clock_time(token).unwrap_err();
            assert_eq!(err.token, token);
        }
    }

    #[test]
    fn test_date() {
        assert_eq!(
            parse_date("20240610"),
            Ok(NaiveDate::from_ymd_opt(2024, 6, 10).unwrap())
        );
        assert!(parse_date("2024-06-10").is_err());
        assert!(parse_date("20241310").is_err());
        assert!(parse_date("2024061").is_err());
    }

    #[test]
    fn test_flag() {
        assert_eq!(parse_flag("1"), Ok(true));
        assert_eq!(parse_flag("0"), Ok(false));
        assert!(parse_flag("2").is_err());
        assert!(parse_flag("true").is_err());
    }

    #[test]
    fn test_numbers() {
        assert_eq!(parse_integer("3"), Ok(3));
        assert!(parse_integer("3.5").is_err());
        assert_eq!(parse_real("-27.4659"), Ok(-27.4659));
        assert!(parse_real("NaN").is_err());
        assert!(parse_real("north").is_err());
    }

    #[test]
    fn test_apply_maps_clock_time_to_integer_seconds() {
        assert_eq!(
            Coercion::ClockTime.apply("08:05:30"),
            Ok(Value::Integer(29130))
        );
        assert_eq!(
            Coercion::Text.apply("Roma St"),
            Ok(Value::Text("Roma St".to_string()))
        );
    }
}
