use std::error::Error;
use std::fmt::Write as _;

use tokio_postgres::types::{FromSql, Kind, Type};

type DecodeError = Box<dyn Error + Sync + Send>;

/// Column value rendered the way Postgres prints it: `NUMERIC`, `UUID`, `INTERVAL` and enums.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextForm(pub String);

impl<'a> FromSql<'a> for TextForm {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        let text = match *ty {
            Type::NUMERIC => numeric_text(raw)?,
            Type::UUID => uuid_text(raw)?,
            Type::INTERVAL => interval_text(raw)?,
            _ => std::str::from_utf8(raw)?.to_string(),
        };
        Ok(TextForm(text))
    }

    fn accepts(ty: &Type) -> bool {
        matches!(*ty, Type::NUMERIC | Type::UUID | Type::INTERVAL)
            || matches!(ty.kind(), Kind::Enum(_))
    }
}

/// Undecoded wire bytes of a column whose type has no mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireBytes(pub Vec<u8>);

impl<'a> FromSql<'a> for WireBytes {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, DecodeError> {
        Ok(WireBytes(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn field<const N: usize>(raw: &[u8], at: usize) -> Result<[u8; N], DecodeError> {
    raw.get(at..at + N)
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or_else(|| format!("value truncated at byte {at}").into())
}

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

/// Binary `NUMERIC`: digit count, weight, sign and display scale, then base-10000 digits.
fn numeric_text(raw: &[u8]) -> Result<String, DecodeError> {
    let ndigits = usize::from(u16::from_be_bytes(field(raw, 0)?));
    let weight = i32::from(i16::from_be_bytes(field(raw, 2)?));
    let sign = u16::from_be_bytes(field(raw, 4)?);
    let dscale = u16::from_be_bytes(field(raw, 6)?);

    match sign {
        NUMERIC_NAN => return Ok("NaN".into()),
        NUMERIC_PINF => return Ok("Infinity".into()),
        NUMERIC_NINF => return Ok("-Infinity".into()),
        _ => {}
    }

    let digits = (0..ndigits)
        .map(|i| field(raw, 8 + 2 * i).map(i16::from_be_bytes))
        .collect::<Result<Vec<_>, _>>()?;
    let digit = |pos: i32| {
        usize::try_from(pos)
            .ok()
            .and_then(|pos| digits.get(pos))
            .copied()
            .unwrap_or(0)
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }
    if weight < 0 {
        out.push('0');
    } else {
        write!(out, "{}", digit(0))?;
        for pos in 1..=weight {
            write!(out, "{:04}", digit(pos))?;
        }
    }

    if dscale > 0 {
        let mut fraction = String::new();
        for group in 1..=i32::from(dscale.div_ceil(4)) {
            write!(fraction, "{:04}", digit(weight + group))?;
        }
        fraction.truncate(usize::from(dscale));
        out.push('.');
        out.push_str(&fraction);
    }
    Ok(out)
}

fn uuid_text(raw: &[u8]) -> Result<String, DecodeError> {
    let bytes: [u8; 16] = field(raw, 0)?;
    let mut out = String::with_capacity(36);
    for (i, byte) in bytes.iter().enumerate() {
        if matches!(i, 4 | 6 | 8 | 10) {
            out.push('-');
        }
        write!(out, "{byte:02x}")?;
    }
    Ok(out)
}

/// Binary `INTERVAL` (microseconds, days, months) in Postgres' default output style.
fn interval_text(raw: &[u8]) -> Result<String, DecodeError> {
    let micros = i64::from_be_bytes(field(raw, 0)?);
    let days = i32::from_be_bytes(field(raw, 8)?);
    let months = i32::from_be_bytes(field(raw, 12)?);

    let mut parts = Vec::new();
    let (years, months) = (months / 12, months % 12);
    for (n, unit, plural) in [
        (years, "year", "years"),
        (months, "mon", "mons"),
        (days, "day", "days"),
    ] {
        if n != 0 {
            parts.push(format!("{n} {}", if n.abs() == 1 { unit } else { plural }));
        }
    }

    if micros != 0 || parts.is_empty() {
        let sign = if micros < 0 { "-" } else { "" };
        let total = micros.unsigned_abs();
        let secs = total / 1_000_000;
        let mut clock = format!(
            "{sign}{:02}:{:02}:{:02}",
            secs / 3600,
            secs / 60 % 60,
            secs % 60
        );
        let frac = total % 1_000_000;
        if frac != 0 {
            let digits = format!("{frac:06}");
            clock.push('.');
            clock.push_str(digits.trim_end_matches('0'));
        }
        parts.push(clock);
    }
    Ok(parts.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numeric(weight: i16, sign: u16, dscale: u16, digits: &[i16]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&u16::try_from(digits.len()).unwrap().to_be_bytes());
        raw.extend_from_slice(&weight.to_be_bytes());
        raw.extend_from_slice(&sign.to_be_bytes());
        raw.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        raw
    }

    fn text(ty: &Type, raw: &[u8]) -> String {
        TextForm::from_sql(ty, raw).unwrap().0
    }

    #[test]
    fn numeric_prices_print_with_their_scale() {
        assert_eq!(text(&Type::NUMERIC, &numeric(0, 0, 2, &[123, 4500])), "123.45");
        assert_eq!(text(&Type::NUMERIC, &numeric(0, 0, 2, &[19, 9900])), "19.99");
        assert_eq!(text(&Type::NUMERIC, &numeric(0, NUMERIC_NEG, 2, &[5])), "-5.00");
        assert_eq!(text(&Type::NUMERIC, &numeric(1, 0, 0, &[1])), "10000");
        assert_eq!(text(&Type::NUMERIC, &numeric(1, 0, 0, &[1, 2])), "10002");
        assert_eq!(text(&Type::NUMERIC, &numeric(0, 0, 0, &[])), "0");
    }

    #[test]
    fn numeric_small_fractions_keep_leading_zeros() {
        assert_eq!(text(&Type::NUMERIC, &numeric(-1, 0, 3, &[10])), "0.001");
        assert_eq!(text(&Type::NUMERIC, &numeric(-2, 0, 5, &[1000])), "0.00001");
    }

    #[test]
    fn numeric_special_values() {
        assert_eq!(text(&Type::NUMERIC, &numeric(0, NUMERIC_NAN, 0, &[])), "NaN");
        assert_eq!(text(&Type::NUMERIC, &numeric(0, NUMERIC_PINF, 0, &[])), "Infinity");
        assert_eq!(text(&Type::NUMERIC, &numeric(0, NUMERIC_NINF, 0, &[])), "-Infinity");
    }

    #[test]
    fn truncated_numeric_is_an_error() {
        assert!(TextForm::from_sql(&Type::NUMERIC, &[0, 2, 0, 0]).is_err());
        let mut raw = numeric(0, 0, 0, &[1, 2]);
        raw.truncate(raw.len() - 1);
        assert!(TextForm::from_sql(&Type::NUMERIC, &raw).is_err());
    }

    #[test]
    fn uuid_is_hyphenated_lowercase() {
        let raw: Vec<u8> = (0u8..16).map(|i| i * 17).collect();
        assert_eq!(
            text(&Type::UUID, &raw),
            "00112233-4455-6677-8899-aabbccddeeff"
        );
    }

    #[test]
    fn interval_uses_postgres_style() {
        let interval = |micros: i64, days: i32, months: i32| {
            let mut raw = micros.to_be_bytes().to_vec();
            raw.extend_from_slice(&days.to_be_bytes());
            raw.extend_from_slice(&months.to_be_bytes());
            text(&Type::INTERVAL, &raw)
        };
        assert_eq!(interval(0, 0, 0), "00:00:00");
        assert_eq!(interval(0, 3, 14), "1 year 2 mons 3 days");
        assert_eq!(interval(14_706_500_000, 1, 0), "1 day 04:05:06.5");
        assert_eq!(interval(-90_000_000, 0, 1), "1 mon -00:01:30");
    }

    #[test]
    fn accepts_only_mapped_types() {
        assert!(<TextForm as FromSql>::accepts(&Type::NUMERIC));
        assert!(<TextForm as FromSql>::accepts(&Type::UUID));
        assert!(!<TextForm as FromSql>::accepts(&Type::INT4));
        assert!(<WireBytes as FromSql>::accepts(&Type::TS_VECTOR));
    }
}
