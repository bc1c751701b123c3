//! Built-in scalar codecs.
use time::{Date, Duration, PrimitiveDateTime, Time, UtcDateTime, macros::format_description};

use super::{Codec, EncodeError, PgInterval, PgValue, Registry};
use crate::{
    encode::Encoded,
    postgres::{Oid, PgFormat, oid},
    row::DecodeError,
};

fn utf8(value: &[u8]) -> Result<&str, DecodeError> {
    std::str::from_utf8(value).map_err(DecodeError::Utf8)
}

fn exact<const N: usize>(value: &[u8]) -> Result<[u8; N], DecodeError> {
    value
        .try_into()
        .map_err(|_| DecodeError::malformed("unexpected binary value width"))
}

macro_rules! preferred {
    ($ty:literal) => {
        fn preferred_type(&self, _: Oid, _: PgFormat) -> &'static str {
            $ty
        }
    };
}

// ===== bool =====

pub(super) struct BoolCodec;

impl Codec for BoolCodec {
    fn can_decode(&self, oid: Oid, _: PgFormat) -> bool {
        oid == oid::BOOL
    }

    fn decode(&self, _: &Registry, _: Oid, format: PgFormat, value: &[u8]) -> Result<PgValue, DecodeError> {
        let value = match format {
            PgFormat::Binary => exact::<1>(value)?[0] != 0,
            PgFormat::Text => match utf8(value)? {
                "t" | "true" => true,
                "f" | "false" => false,
                _ => return Err(DecodeError::malformed("unexpected bool literal")),
            },
        };
        Ok(PgValue::Bool(value))
    }

    fn can_encode(&self, value: &PgValue) -> bool {
        matches!(value, PgValue::Bool(_))
    }

    fn encode(&self, _: &Registry, value: &PgValue) -> Result<Encoded<'static>, EncodeError> {
        let PgValue::Bool(b) = value else {
            return Err(EncodeError::Unsupported);
        };
        Ok(Encoded::inline(&[*b as u8], oid::BOOL))
    }

    preferred!("bool");
}

// ===== int2 / int4 / int8 =====

pub(super) struct IntCodec;

impl Codec for IntCodec {
    fn can_decode(&self, oid: Oid, _: PgFormat) -> bool {
        matches!(oid, oid::INT2 | oid::INT4 | oid::INT8)
    }

    fn decode(&self, _: &Registry, oid: Oid, format: PgFormat, value: &[u8]) -> Result<PgValue, DecodeError> {
        macro_rules! int {
            ($variant:ident, $ty:ty) => {
                match format {
                    PgFormat::Binary => PgValue::$variant(<$ty>::from_be_bytes(exact(value)?)),
                    PgFormat::Text => PgValue::$variant(
                        utf8(value)?
                            .parse()
                            .map_err(|_| DecodeError::malformed("unexpected integer literal"))?,
                    ),
                }
            };
        }

        Ok(match oid {
            oid::INT2 => int!(Int2, i16),
            oid::INT4 => int!(Int4, i32),
            oid::INT8 => int!(Int8, i64),
            _ => return Err(DecodeError::NoCodec(oid)),
        })
    }

    fn can_encode(&self, value: &PgValue) -> bool {
        matches!(value, PgValue::Int2(_) | PgValue::Int4(_) | PgValue::Int8(_))
    }

    fn encode(&self, _: &Registry, value: &PgValue) -> Result<Encoded<'static>, EncodeError> {
        Ok(match value {
            PgValue::Int2(v) => Encoded::inline(&v.to_be_bytes(), oid::INT2),
            PgValue::Int4(v) => Encoded::inline(&v.to_be_bytes(), oid::INT4),
            PgValue::Int8(v) => Encoded::inline(&v.to_be_bytes(), oid::INT8),
            _ => return Err(EncodeError::Unsupported),
        })
    }

    fn preferred_type(&self, oid: Oid, _: PgFormat) -> &'static str {
        match oid {
            oid::INT2 => "i16",
            oid::INT4 => "i32",
            _ => "i64",
        }
    }
}

// ===== float4 / float8 =====

pub(super) struct FloatCodec;

impl Codec for FloatCodec {
    fn can_decode(&self, oid: Oid, _: PgFormat) -> bool {
        matches!(oid, oid::FLOAT4 | oid::FLOAT8)
    }

    fn decode(&self, _: &Registry, oid: Oid, format: PgFormat, value: &[u8]) -> Result<PgValue, DecodeError> {
        Ok(match (oid, format) {
            (oid::FLOAT4, PgFormat::Binary) => {
                PgValue::Float4(f32::from_bits(u32::from_be_bytes(exact(value)?)))
            },
            (oid::FLOAT8, PgFormat::Binary) => {
                PgValue::Float8(f64::from_bits(u64::from_be_bytes(exact(value)?)))
            },
            (oid::FLOAT4, PgFormat::Text) => PgValue::Float4(
                utf8(value)?
                    .parse()
                    .map_err(|_| DecodeError::malformed("unexpected float literal"))?,
            ),
            (oid::FLOAT8, PgFormat::Text) => PgValue::Float8(
                utf8(value)?
                    .parse()
                    .map_err(|_| DecodeError::malformed("unexpected float literal"))?,
            ),
            _ => return Err(DecodeError::NoCodec(oid)),
        })
    }

    fn can_encode(&self, value: &PgValue) -> bool {
        matches!(value, PgValue::Float4(_) | PgValue::Float8(_))
    }

    fn encode(&self, _: &Registry, value: &PgValue) -> Result<Encoded<'static>, EncodeError> {
        Ok(match value {
            PgValue::Float4(v) => Encoded::inline(&v.to_bits().to_be_bytes(), oid::FLOAT4),
            PgValue::Float8(v) => Encoded::inline(&v.to_bits().to_be_bytes(), oid::FLOAT8),
            _ => return Err(EncodeError::Unsupported),
        })
    }

    fn preferred_type(&self, oid: Oid, _: PgFormat) -> &'static str {
        match oid {
            oid::FLOAT4 => "f32",
            _ => "f64",
        }
    }
}

// ===== numeric =====

const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;

pub(super) struct NumericCodec;

impl Codec for NumericCodec {
    fn can_decode(&self, oid: Oid, _: PgFormat) -> bool {
        oid == oid::NUMERIC
    }

    fn decode(&self, _: &Registry, _: Oid, format: PgFormat, value: &[u8]) -> Result<PgValue, DecodeError> {
        let value = match format {
            PgFormat::Text => utf8(value)?.to_owned(),
            PgFormat::Binary => numeric_to_string(value)?,
        };
        Ok(PgValue::Numeric(value))
    }

    fn can_encode(&self, value: &PgValue) -> bool {
        matches!(value, PgValue::Numeric(_))
    }

    fn encode(&self, _: &Registry, value: &PgValue) -> Result<Encoded<'static>, EncodeError> {
        let PgValue::Numeric(v) = value else {
            return Err(EncodeError::Unsupported);
        };
        // the decimal text form is always a valid input for numeric
        Ok(Encoded::text(v.clone(), oid::NUMERIC))
    }

    preferred!("String");
}

/// Render the binary numeric form, base-10000 digit groups around a decimal
/// weight, into its decimal text form.
fn numeric_to_string(value: &[u8]) -> Result<String, DecodeError> {
    use std::fmt::Write;

    if value.len() < 8 {
        return Err(DecodeError::malformed("truncated numeric header"));
    }

    let ndigits = u16::from_be_bytes([value[0], value[1]]) as usize;
    let weight = i16::from_be_bytes([value[2], value[3]]) as i32;
    let sign = u16::from_be_bytes([value[4], value[5]]);
    let dscale = u16::from_be_bytes([value[6], value[7]]) as usize;

    if sign == NUMERIC_NAN {
        return Ok("NaN".into());
    }
    if value.len() < 8 + ndigits * 2 {
        return Err(DecodeError::malformed("truncated numeric digits"));
    }

    let digit = |i: i32| -> u16 {
        if i < 0 || i as usize >= ndigits {
            return 0;
        }
        let at = 8 + i as usize * 2;
        u16::from_be_bytes([value[at], value[at + 1]])
    };

    let mut out = String::new();
    if sign == NUMERIC_NEG {
        out.push('-');
    }

    if weight >= 0 {
        for i in 0..=weight {
            match i {
                0 => write!(out, "{}", digit(i)).unwrap(),
                _ => write!(out, "{:04}", digit(i)).unwrap(),
            }
        }
    } else {
        out.push('0');
    }

    if dscale > 0 {
        let mut frac = String::new();
        let mut i = weight + 1;
        while frac.len() < dscale {
            write!(frac, "{:04}", digit(i)).unwrap();
            i += 1;
        }
        frac.truncate(dscale);
        out.push('.');
        out.push_str(&frac);
    }

    Ok(out)
}

// ===== char / name / text / bpchar / varchar =====

pub(super) struct TextCodec;

impl Codec for TextCodec {
    fn can_decode(&self, oid: Oid, _: PgFormat) -> bool {
        matches!(oid, oid::CHAR | oid::NAME | oid::TEXT | oid::BPCHAR | oid::VARCHAR)
    }

    fn decode(&self, _: &Registry, _: Oid, _: PgFormat, value: &[u8]) -> Result<PgValue, DecodeError> {
        // both transmission formats carry the utf-8 bytes
        Ok(PgValue::Text(utf8(value)?.to_owned()))
    }

    fn can_encode(&self, value: &PgValue) -> bool {
        matches!(value, PgValue::Text(_))
    }

    fn encode(&self, _: &Registry, value: &PgValue) -> Result<Encoded<'static>, EncodeError> {
        let PgValue::Text(v) = value else {
            return Err(EncodeError::Unsupported);
        };
        Ok(Encoded::owned(v.clone(), oid::TEXT))
    }

    preferred!("String");
}

// ===== bytea =====

pub(super) struct ByteaCodec;

impl Codec for ByteaCodec {
    fn can_decode(&self, oid: Oid, _: PgFormat) -> bool {
        oid == oid::BYTEA
    }

    fn decode(&self, _: &Registry, _: Oid, format: PgFormat, value: &[u8]) -> Result<PgValue, DecodeError> {
        let value = match format {
            PgFormat::Binary => value.to_vec(),
            PgFormat::Text => match value.strip_prefix(b"\\x") {
                Some(hex) => bytea_from_hex(hex)?,
                None => bytea_from_escape(value)?,
            },
        };
        Ok(PgValue::Bytea(value))
    }

    fn can_encode(&self, value: &PgValue) -> bool {
        matches!(value, PgValue::Bytea(_))
    }

    fn encode(&self, _: &Registry, value: &PgValue) -> Result<Encoded<'static>, EncodeError> {
        let PgValue::Bytea(v) = value else {
            return Err(EncodeError::Unsupported);
        };
        Ok(Encoded::owned(v.clone(), oid::BYTEA))
    }

    preferred!("Vec<u8>");
}

/// `\x` prefixed hex form, the server default since 9.0.
fn bytea_from_hex(hex: &[u8]) -> Result<Vec<u8>, DecodeError> {
    fn nibble(b: u8) -> Result<u8, DecodeError> {
        match b {
            b'0'..=b'9' => Ok(b - b'0'),
            b'a'..=b'f' => Ok(b - b'a' + 10),
            b'A'..=b'F' => Ok(b - b'A' + 10),
            _ => Err(DecodeError::malformed("unexpected bytea hex digit")),
        }
    }

    if hex.len() % 2 != 0 {
        return Err(DecodeError::malformed("odd bytea hex length"));
    }

    hex.chunks_exact(2)
        .map(|pair| Ok(nibble(pair[0])? << 4 | nibble(pair[1])?))
        .collect()
}

/// Historical escape form: printable bytes as-is, `\\` for a backslash and
/// `\nnn` octal escapes for the rest.
fn bytea_from_escape(value: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::with_capacity(value.len());
    let mut i = 0;

    while i < value.len() {
        if value[i] != b'\\' {
            out.push(value[i]);
            i += 1;
            continue;
        }
        match (value.get(i + 1), value.get(i + 2), value.get(i + 3)) {
            (Some(b'\\'), ..) => {
                out.push(b'\\');
                i += 2;
            },
            (Some(a @ b'0'..=b'3'), Some(b @ b'0'..=b'7'), Some(c @ b'0'..=b'7')) => {
                out.push((a - b'0') << 6 | (b - b'0') << 3 | (c - b'0'));
                i += 4;
            },
            _ => return Err(DecodeError::malformed("unexpected bytea escape")),
        }
    }

    Ok(out)
}

// ===== date / time / timestamp / timestamptz =====

/// 2000-01-01, the postgres epoch, as a julian day.
const PG_EPOCH_JULIAN: i32 = 2_451_545;

const PG_EPOCH: PrimitiveDateTime = {
    let date = match Date::from_julian_day(PG_EPOCH_JULIAN) {
        Ok(ok) => ok,
        Err(_) => panic!("postgres epoch is a valid date"),
    };
    PrimitiveDateTime::new(date, Time::MIDNIGHT)
};

const UTC_PG_EPOCH: UtcDateTime = {
    let date = match Date::from_julian_day(PG_EPOCH_JULIAN) {
        Ok(ok) => ok,
        Err(_) => panic!("postgres epoch is a valid date"),
    };
    UtcDateTime::new(date, Time::MIDNIGHT)
};

const DATE_FMT: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day]");

const TIME_FMT: &[time::format_description::BorrowedFormatItem<'static>] =
    format_description!(version = 2, "[hour]:[minute]:[second][optional [.[subsecond]]]");

const TIMESTAMP_FMT: &[time::format_description::BorrowedFormatItem<'static>] = format_description!(
    version = 2,
    "[year]-[month]-[day] [hour]:[minute]:[second][optional [.[subsecond]]]"
);

pub(super) struct DateTimeCodec;

impl Codec for DateTimeCodec {
    fn can_decode(&self, oid: Oid, _: PgFormat) -> bool {
        matches!(oid, oid::DATE | oid::TIME | oid::TIMESTAMP | oid::TIMESTAMPTZ)
    }

    fn decode(&self, _: &Registry, oid: Oid, format: PgFormat, value: &[u8]) -> Result<PgValue, DecodeError> {
        Ok(match (oid, format) {
            (oid::DATE, PgFormat::Binary) => {
                let days = i32::from_be_bytes(exact(value)?);
                let date = Date::from_julian_day(PG_EPOCH_JULIAN + days)
                    .map_err(|_| DecodeError::malformed("date out of range"))?;
                PgValue::Date(date)
            },
            (oid::DATE, PgFormat::Text) => PgValue::Date(
                Date::parse(utf8(value)?, DATE_FMT)
                    .map_err(|_| DecodeError::malformed("unexpected date literal"))?,
            ),

            (oid::TIME, PgFormat::Binary) => {
                let micros = i64::from_be_bytes(exact(value)?);
                PgValue::Time(time_from_micros(micros)?)
            },
            (oid::TIME, PgFormat::Text) => PgValue::Time(
                Time::parse(utf8(value)?, TIME_FMT)
                    .map_err(|_| DecodeError::malformed("unexpected time literal"))?,
            ),

            (oid::TIMESTAMP, PgFormat::Binary) => {
                let micros = i64::from_be_bytes(exact(value)?);
                PgValue::Timestamp(PG_EPOCH.saturating_add(Duration::microseconds(micros)))
            },
            (oid::TIMESTAMP, PgFormat::Text) => PgValue::Timestamp(
                PrimitiveDateTime::parse(utf8(value)?, TIMESTAMP_FMT)
                    .map_err(|_| DecodeError::malformed("unexpected timestamp literal"))?,
            ),

            (oid::TIMESTAMPTZ, PgFormat::Binary) => {
                let micros = i64::from_be_bytes(exact(value)?);
                PgValue::TimestampTz(UTC_PG_EPOCH.saturating_add(Duration::microseconds(micros)))
            },
            (oid::TIMESTAMPTZ, PgFormat::Text) => PgValue::TimestampTz(timestamptz_from_text(utf8(value)?)?),

            _ => return Err(DecodeError::NoCodec(oid)),
        })
    }

    fn can_encode(&self, value: &PgValue) -> bool {
        matches!(
            value,
            PgValue::Date(_) | PgValue::Time(_) | PgValue::Timestamp(_) | PgValue::TimestampTz(_),
        )
    }

    fn encode(&self, _: &Registry, value: &PgValue) -> Result<Encoded<'static>, EncodeError> {
        Ok(match value {
            PgValue::Date(v) => {
                let days = v.to_julian_day() - PG_EPOCH_JULIAN;
                Encoded::inline(&days.to_be_bytes(), oid::DATE)
            },
            PgValue::Time(v) => {
                let (h, m, s, us) = v.as_hms_micro();
                let micros =
                    (h as i64 * 3600 + m as i64 * 60 + s as i64) * 1_000_000 + us as i64;
                Encoded::inline(&micros.to_be_bytes(), oid::TIME)
            },
            PgValue::Timestamp(v) => {
                let micros = (*v - PG_EPOCH).whole_microseconds() as i64;
                Encoded::inline(&micros.to_be_bytes(), oid::TIMESTAMP)
            },
            PgValue::TimestampTz(v) => {
                let micros = (*v - UTC_PG_EPOCH).whole_microseconds() as i64;
                Encoded::inline(&micros.to_be_bytes(), oid::TIMESTAMPTZ)
            },
            _ => return Err(EncodeError::Unsupported),
        })
    }

    fn preferred_type(&self, oid: Oid, _: PgFormat) -> &'static str {
        match oid {
            oid::DATE => "time::Date",
            oid::TIME => "time::Time",
            oid::TIMESTAMP => "time::PrimitiveDateTime",
            _ => "time::UtcDateTime",
        }
    }
}

fn time_from_micros(micros: i64) -> Result<Time, DecodeError> {
    let h = micros / 3_600_000_000;
    let m = micros / 60_000_000 % 60;
    let s = micros / 1_000_000 % 60;
    let us = micros % 1_000_000;
    Time::from_hms_micro(h as u8, m as u8, s as u8, us as u32)
        .map_err(|_| DecodeError::malformed("time out of range"))
}

/// Text timestamptz carries a trailing offset like `+02` or `-05:30`;
/// the value itself normalizes into UTC.
fn timestamptz_from_text(value: &str) -> Result<UtcDateTime, DecodeError> {
    let malformed = || DecodeError::malformed("unexpected timestamptz literal");

    // the offset sign cannot appear before the clock part
    let at = value
        .char_indices()
        .skip(10)
        .find(|(_, c)| matches!(c, '+' | '-'))
        .map(|(i, _)| i)
        .ok_or_else(malformed)?;

    let (naive, offset) = value.split_at(at);
    let naive = PrimitiveDateTime::parse(naive.trim_end(), TIMESTAMP_FMT).map_err(|_| malformed())?;

    let negative = offset.starts_with('-');
    let mut parts = offset[1..].splitn(3, ':');
    let mut seconds = 0i64;
    for scale in [3600, 60, 1] {
        let Some(part) = parts.next() else {
            break;
        };
        let part: i64 = part.parse().map_err(|_| malformed())?;
        seconds += part * scale;
    }
    if negative {
        seconds = -seconds;
    }

    let since_epoch = (naive - PG_EPOCH) - Duration::seconds(seconds);
    Ok(UTC_PG_EPOCH.saturating_add(since_epoch))
}

// ===== interval =====

pub(super) struct IntervalCodec;

impl Codec for IntervalCodec {
    fn can_decode(&self, oid: Oid, _: PgFormat) -> bool {
        oid == oid::INTERVAL
    }

    fn decode(&self, _: &Registry, _: Oid, format: PgFormat, value: &[u8]) -> Result<PgValue, DecodeError> {
        let value = match format {
            PgFormat::Binary => {
                let raw = exact::<16>(value)?;
                PgInterval {
                    microseconds: i64::from_be_bytes(raw[..8].try_into().unwrap()),
                    days: i32::from_be_bytes(raw[8..12].try_into().unwrap()),
                    months: i32::from_be_bytes(raw[12..].try_into().unwrap()),
                }
            },
            PgFormat::Text => interval_from_text(utf8(value)?)?,
        };
        Ok(PgValue::Interval(value))
    }

    fn can_encode(&self, value: &PgValue) -> bool {
        matches!(value, PgValue::Interval(_))
    }

    fn encode(&self, _: &Registry, value: &PgValue) -> Result<Encoded<'static>, EncodeError> {
        let PgValue::Interval(v) = value else {
            return Err(EncodeError::Unsupported);
        };
        let mut raw = [0u8; 16];
        raw[..8].copy_from_slice(&v.microseconds.to_be_bytes());
        raw[8..12].copy_from_slice(&v.days.to_be_bytes());
        raw[12..].copy_from_slice(&v.months.to_be_bytes());
        Ok(Encoded::inline(&raw, oid::INTERVAL))
    }

    preferred!("PgInterval");
}

/// The default interval output style: `[N year[s]] [N mon[s]] [N day[s]]
/// [[-+]HH:MM:SS[.ffffff]]`.
fn interval_from_text(value: &str) -> Result<PgInterval, DecodeError> {
    let malformed = || DecodeError::malformed("unexpected interval literal");

    let mut out = PgInterval::default();
    let mut words = value.split_whitespace().peekable();

    while let Some(word) = words.next() {
        if word.contains(':') {
            // clock part is always last
            if words.next().is_some() {
                return Err(malformed());
            }
            let (negative, clock) = match word.strip_prefix('-') {
                Some(rest) => (true, rest),
                None => (false, word.strip_prefix('+').unwrap_or(word)),
            };

            let mut micros = 0i64;
            let mut parts = clock.splitn(3, ':');
            for scale in [3_600_000_000i64, 60_000_000, 1_000_000] {
                let Some(part) = parts.next() else {
                    break;
                };
                if scale == 1_000_000 {
                    let (s, frac) = part.split_once('.').unwrap_or((part, ""));
                    let s: i64 = s.parse().map_err(|_| malformed())?;
                    micros += s * scale;
                    if !frac.is_empty() {
                        let digits: i64 = frac.parse().map_err(|_| malformed())?;
                        let pad = 6usize.checked_sub(frac.len()).ok_or_else(malformed)?;
                        micros += digits * 10i64.pow(pad as u32);
                    }
                } else {
                    let part: i64 = part.parse().map_err(|_| malformed())?;
                    micros += part * scale;
                }
            }

            out.microseconds = if negative { -micros } else { micros };
            continue;
        }

        let n: i64 = word.parse().map_err(|_| malformed())?;
        match words.next() {
            Some("year" | "years") => out.months += n as i32 * 12,
            Some("mon" | "mons" | "month" | "months") => out.months += n as i32,
            Some("day" | "days") => out.days += n as i32,
            Some("week" | "weeks") => out.days += n as i32 * 7,
            _ => return Err(malformed()),
        }
    }

    Ok(out)
}

// ===== uuid =====

pub(super) struct UuidCodec;

impl Codec for UuidCodec {
    fn can_decode(&self, oid: Oid, _: PgFormat) -> bool {
        oid == oid::UUID
    }

    fn decode(&self, _: &Registry, _: Oid, format: PgFormat, value: &[u8]) -> Result<PgValue, DecodeError> {
        let value = match format {
            PgFormat::Binary => uuid::Uuid::from_bytes(exact(value)?),
            PgFormat::Text => uuid::Uuid::parse_str(utf8(value)?)
                .map_err(|_| DecodeError::malformed("unexpected uuid literal"))?,
        };
        Ok(PgValue::Uuid(value))
    }

    fn can_encode(&self, value: &PgValue) -> bool {
        matches!(value, PgValue::Uuid(_))
    }

    fn encode(&self, _: &Registry, value: &PgValue) -> Result<Encoded<'static>, EncodeError> {
        let PgValue::Uuid(v) = value else {
            return Err(EncodeError::Unsupported);
        };
        Ok(Encoded::inline(v.as_bytes(), oid::UUID))
    }

    preferred!("uuid::Uuid");
}

// ===== json / jsonb =====

pub(super) struct JsonCodec;

impl Codec for JsonCodec {
    fn can_decode(&self, oid: Oid, _: PgFormat) -> bool {
        matches!(oid, oid::JSON | oid::JSONB)
    }

    fn decode(&self, _: &Registry, oid: Oid, format: PgFormat, value: &[u8]) -> Result<PgValue, DecodeError> {
        let value = match (oid, format) {
            // binary jsonb leads with a version byte
            (oid::JSONB, PgFormat::Binary) => match value.split_first() {
                Some((1, rest)) => rest,
                _ => return Err(DecodeError::malformed("unexpected jsonb version")),
            },
            _ => value,
        };
        Ok(PgValue::Json(serde_json::from_slice(value)?))
    }

    fn can_encode(&self, value: &PgValue) -> bool {
        matches!(value, PgValue::Json(_))
    }

    fn encode(&self, _: &Registry, value: &PgValue) -> Result<Encoded<'static>, EncodeError> {
        let PgValue::Json(v) = value else {
            return Err(EncodeError::Unsupported);
        };
        let mut out = vec![1u8];
        serde_json::to_writer(&mut out, v).map_err(|_| EncodeError::Unsupported)?;
        Ok(Encoded::owned(out, oid::JSONB))
    }

    preferred!("serde_json::Value");
}

// ===== inet / cidr =====

/// `PGSQL_AF_INET`; v6 is one above it.
const PG_AF_INET: u8 = 2;
const PG_AF_INET6: u8 = 3;

pub(super) struct InetCodec;

impl Codec for InetCodec {
    fn can_decode(&self, oid: Oid, _: PgFormat) -> bool {
        matches!(oid, oid::INET | oid::CIDR)
    }

    fn decode(&self, _: &Registry, _: Oid, format: PgFormat, value: &[u8]) -> Result<PgValue, DecodeError> {
        let value = match format {
            PgFormat::Binary => {
                // family, bits, is_cidr, addr len, addr bytes
                if value.len() < 4 {
                    return Err(DecodeError::malformed("truncated inet value"));
                }
                match (value[0], &value[4..]) {
                    (PG_AF_INET, addr) => std::net::IpAddr::from(<[u8; 4]>::try_from(addr).map_err(
                        |_| DecodeError::malformed("unexpected inet address width"),
                    )?),
                    (PG_AF_INET6, addr) => std::net::IpAddr::from(<[u8; 16]>::try_from(addr).map_err(
                        |_| DecodeError::malformed("unexpected inet address width"),
                    )?),
                    _ => return Err(DecodeError::malformed("unexpected inet family")),
                }
            },
            PgFormat::Text => {
                let text = utf8(value)?;
                let addr = text.split('/').next().unwrap_or(text);
                addr.parse()
                    .map_err(|_| DecodeError::malformed("unexpected inet literal"))?
            },
        };
        Ok(PgValue::Inet(value))
    }

    fn can_encode(&self, value: &PgValue) -> bool {
        matches!(value, PgValue::Inet(_))
    }

    fn encode(&self, _: &Registry, value: &PgValue) -> Result<Encoded<'static>, EncodeError> {
        let PgValue::Inet(v) = value else {
            return Err(EncodeError::Unsupported);
        };
        let mut out = Vec::with_capacity(20);
        match v {
            std::net::IpAddr::V4(v4) => {
                out.extend_from_slice(&[PG_AF_INET, 32, 0, 4]);
                out.extend_from_slice(&v4.octets());
            },
            std::net::IpAddr::V6(v6) => {
                out.extend_from_slice(&[PG_AF_INET6, 128, 0, 16]);
                out.extend_from_slice(&v6.octets());
            },
        }
        Ok(Encoded::owned(out, oid::INET))
    }

    preferred!("std::net::IpAddr");
}

#[cfg(test)]
mod test {
    use time::macros::{date, datetime, time};

    use super::*;

    fn decode(oid: Oid, format: PgFormat, value: &[u8]) -> PgValue {
        Registry::with_defaults().decode(oid, format, Some(value)).unwrap()
    }

    #[test]
    fn bool_both_formats() {
        assert_eq!(decode(oid::BOOL, PgFormat::Binary, &[1]), PgValue::Bool(true));
        assert_eq!(decode(oid::BOOL, PgFormat::Text, b"t"), PgValue::Bool(true));
        assert_eq!(decode(oid::BOOL, PgFormat::Text, b"f"), PgValue::Bool(false));
    }

    #[test]
    fn integers_both_formats() {
        assert_eq!(decode(oid::INT2, PgFormat::Binary, &42i16.to_be_bytes()), PgValue::Int2(42));
        assert_eq!(decode(oid::INT4, PgFormat::Text, b"-7"), PgValue::Int4(-7));
        assert_eq!(
            decode(oid::INT8, PgFormat::Binary, &i64::MIN.to_be_bytes()),
            PgValue::Int8(i64::MIN),
        );
    }

    #[test]
    fn floats_both_formats() {
        assert_eq!(
            decode(oid::FLOAT8, PgFormat::Binary, &1.5f64.to_bits().to_be_bytes()),
            PgValue::Float8(1.5),
        );
        assert_eq!(decode(oid::FLOAT4, PgFormat::Text, b"-2.25"), PgValue::Float4(-2.25));
    }

    #[test]
    fn numeric_binary_rendering() {
        // 1234567.89 = groups [123, 4567, 8900], weight 1, dscale 2
        let mut raw = Vec::new();
        raw.extend_from_slice(&3u16.to_be_bytes());
        raw.extend_from_slice(&1i16.to_be_bytes());
        raw.extend_from_slice(&0u16.to_be_bytes());
        raw.extend_from_slice(&2u16.to_be_bytes());
        for d in [123u16, 4567, 8900] {
            raw.extend_from_slice(&d.to_be_bytes());
        }
        assert_eq!(
            decode(oid::NUMERIC, PgFormat::Binary, &raw),
            PgValue::Numeric("1234567.89".into()),
        );
    }

    #[test]
    fn numeric_binary_small_fraction() {
        // 0.0001 = groups [1], weight -1, dscale 4
        let mut raw = Vec::new();
        raw.extend_from_slice(&1u16.to_be_bytes());
        raw.extend_from_slice(&(-1i16).to_be_bytes());
        raw.extend_from_slice(&NUMERIC_NEG.to_be_bytes());
        raw.extend_from_slice(&4u16.to_be_bytes());
        raw.extend_from_slice(&1u16.to_be_bytes());
        assert_eq!(
            decode(oid::NUMERIC, PgFormat::Binary, &raw),
            PgValue::Numeric("-0.0001".into()),
        );
    }

    #[test]
    fn bytea_hex_and_escape() {
        assert_eq!(
            decode(oid::BYTEA, PgFormat::Text, b"\\x6162001f"),
            PgValue::Bytea(vec![0x61, 0x62, 0x00, 0x1F]),
        );
        assert_eq!(
            decode(oid::BYTEA, PgFormat::Text, b"ab\\000\\\\z"),
            PgValue::Bytea(vec![b'a', b'b', 0, b'\\', b'z']),
        );
        assert_eq!(
            decode(oid::BYTEA, PgFormat::Binary, &[1, 2, 3]),
            PgValue::Bytea(vec![1, 2, 3]),
        );
    }

    #[test]
    fn date_both_formats() {
        assert_eq!(
            decode(oid::DATE, PgFormat::Binary, &0i32.to_be_bytes()),
            PgValue::Date(date!(2000-01-01)),
        );
        assert_eq!(
            decode(oid::DATE, PgFormat::Binary, &(-1i32).to_be_bytes()),
            PgValue::Date(date!(1999-12-31)),
        );
        assert_eq!(
            decode(oid::DATE, PgFormat::Text, b"2024-02-29"),
            PgValue::Date(date!(2024-02-29)),
        );
    }

    #[test]
    fn time_both_formats() {
        assert_eq!(
            decode(oid::TIME, PgFormat::Binary, &3_723_000_456i64.to_be_bytes()),
            PgValue::Time(time!(1:02:03.000456)),
        );
        assert_eq!(
            decode(oid::TIME, PgFormat::Text, b"23:59:59.25"),
            PgValue::Time(time!(23:59:59.25)),
        );
        assert_eq!(
            decode(oid::TIME, PgFormat::Text, b"12:00:00"),
            PgValue::Time(time!(12:00:00)),
        );
    }

    #[test]
    fn timestamp_both_formats() {
        assert_eq!(
            decode(oid::TIMESTAMP, PgFormat::Binary, &86_400_000_000i64.to_be_bytes()),
            PgValue::Timestamp(datetime!(2000-01-02 00:00:00)),
        );
        assert_eq!(
            decode(oid::TIMESTAMP, PgFormat::Text, b"2004-10-19 10:23:54.021"),
            PgValue::Timestamp(datetime!(2004-10-19 10:23:54.021)),
        );
    }

    #[test]
    fn timestamptz_text_normalizes_to_utc() {
        let PgValue::TimestampTz(v) = decode(oid::TIMESTAMPTZ, PgFormat::Text, b"2004-10-19 10:23:54+02")
        else {
            panic!("expected timestamptz")
        };
        let PgValue::TimestampTz(expect) =
            decode(oid::TIMESTAMPTZ, PgFormat::Text, b"2004-10-19 08:23:54+00")
        else {
            panic!("expected timestamptz")
        };
        assert_eq!(v, expect);

        let PgValue::TimestampTz(with_minutes) =
            decode(oid::TIMESTAMPTZ, PgFormat::Text, b"2004-10-19 13:53:54+05:30")
        else {
            panic!("expected timestamptz")
        };
        assert_eq!(v, with_minutes);
    }

    #[test]
    fn interval_both_formats() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&7_500_000i64.to_be_bytes());
        raw.extend_from_slice(&3i32.to_be_bytes());
        raw.extend_from_slice(&14i32.to_be_bytes());
        assert_eq!(
            decode(oid::INTERVAL, PgFormat::Binary, &raw),
            PgValue::Interval(PgInterval { months: 14, days: 3, microseconds: 7_500_000 }),
        );

        assert_eq!(
            decode(oid::INTERVAL, PgFormat::Text, b"1 year 2 mons 3 days 04:05:06.5"),
            PgValue::Interval(PgInterval {
                months: 14,
                days: 3,
                microseconds: (4 * 3600 + 5 * 60 + 6) * 1_000_000 + 500_000,
            }),
        );

        assert_eq!(
            decode(oid::INTERVAL, PgFormat::Text, b"-00:00:01"),
            PgValue::Interval(PgInterval { months: 0, days: 0, microseconds: -1_000_000 }),
        );
    }

    #[test]
    fn uuid_both_formats() {
        let id = uuid::Uuid::from_u128(0x0102_0304_0506_0708_090A_0B0C_0D0E_0F10);
        assert_eq!(
            decode(oid::UUID, PgFormat::Binary, id.as_bytes()),
            PgValue::Uuid(id),
        );
        assert_eq!(
            decode(oid::UUID, PgFormat::Text, id.to_string().as_bytes()),
            PgValue::Uuid(id),
        );
    }

    #[test]
    fn json_both_oids() {
        let expect = PgValue::Json(serde_json::json!({"a": [1, 2]}));
        assert_eq!(decode(oid::JSON, PgFormat::Text, br#"{"a":[1,2]}"#), expect);
        assert_eq!(decode(oid::JSONB, PgFormat::Binary, b"\x01{\"a\":[1,2]}"), expect);
    }

    #[test]
    fn inet_both_formats() {
        assert_eq!(
            decode(oid::INET, PgFormat::Binary, &[2, 32, 0, 4, 127, 0, 0, 1]),
            PgValue::Inet([127, 0, 0, 1].into()),
        );
        assert_eq!(
            decode(oid::INET, PgFormat::Text, b"192.168.0.1/24"),
            PgValue::Inet([192, 168, 0, 1].into()),
        );
        assert_eq!(
            decode(oid::INET, PgFormat::Text, b"::1"),
            PgValue::Inet(std::net::Ipv6Addr::LOCALHOST.into()),
        );
    }

    #[test]
    fn encode_round_trips_through_binary_decode() {
        let registry = Registry::with_defaults();
        for value in [
            PgValue::Bool(true),
            PgValue::Int8(420),
            PgValue::Float8(2.5),
            PgValue::Text("hello".into()),
            PgValue::Bytea(vec![0, 1, 2]),
            PgValue::Date(date!(1993-05-15)),
            PgValue::Timestamp(datetime!(2024-01-01 12:30:00)),
            PgValue::Uuid(uuid::Uuid::from_u128(7)),
            PgValue::Inet([10, 0, 0, 1].into()),
            PgValue::Interval(PgInterval { months: 1, days: 2, microseconds: 3 }),
        ] {
            let encoded = registry.encode(&value).unwrap();
            let decoded = registry
                .decode(encoded.oid(), encoded.format(), Some(bytes::Buf::chunk(&encoded)))
                .unwrap();
            assert_eq!(decoded, value);
        }
    }
}
