use time::{Date, PrimitiveDateTime, Time, UtcDateTime};

use crate::{
    Decode, DecodeError, Encode, PgValue, Registry,
    encode::Encoded,
    postgres::PgType,
    row::Column,
};

// 2000-01-01, the postgres epoch
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

macro_rules! decode_via_registry {
    ($ty:ty, $variant:ident, $what:literal) => {
        impl Decode for $ty {
            fn decode(column: Column) -> Result<Self, DecodeError> {
                if column.oid() != Self::OID {
                    return Err(DecodeError::OidMissmatch);
                }
                match Registry::shared().decode(column.oid(), column.format(), column.as_slice())? {
                    PgValue::$variant(value) => Ok(value),
                    PgValue::Null => Err(DecodeError::Null),
                    _ => Err(DecodeError::malformed(concat!("unexpected ", $what, " value"))),
                }
            }
        }
    };
}

decode_via_registry!(Date, Date, "date");
decode_via_registry!(Time, Time, "time");
decode_via_registry!(PrimitiveDateTime, Timestamp, "timestamp");
decode_via_registry!(UtcDateTime, TimestampTz, "timestamptz");

impl Encode<'static> for Date {
    fn encode(self) -> Encoded<'static> {
        let days = self.to_julian_day() - PG_EPOCH_JULIAN;
        Encoded::inline(&days.to_be_bytes(), Self::OID)
    }
}

impl Encode<'static> for Time {
    fn encode(self) -> Encoded<'static> {
        let (h, m, s, us) = self.as_hms_micro();
        let micros = (h as i64 * 3600 + m as i64 * 60 + s as i64) * 1_000_000 + us as i64;
        Encoded::inline(&micros.to_be_bytes(), Self::OID)
    }
}

impl Encode<'static> for PrimitiveDateTime {
    fn encode(self) -> Encoded<'static> {
        let micros = (self - PG_EPOCH).whole_microseconds() as i64;
        Encoded::inline(&micros.to_be_bytes(), Self::OID)
    }
}

impl Encode<'static> for UtcDateTime {
    fn encode(self) -> Encoded<'static> {
        let micros = (self - UTC_PG_EPOCH).whole_microseconds() as i64;
        Encoded::inline(&micros.to_be_bytes(), Self::OID)
    }
}

// keep the arithmetic honest against the registry path
#[cfg(test)]
mod test {
    use time::macros::{date, datetime, time};

    use super::*;
    use crate::postgres::PgFormat;

    #[test]
    fn encode_decode_agree() {
        let registry = Registry::shared();

        let ts = datetime!(2024-06-01 12:00:00.5);
        let encoded = ts.encode();
        let decoded = registry
            .decode(encoded.oid(), PgFormat::Binary, Some(bytes::Buf::chunk(&encoded)))
            .unwrap();
        assert_eq!(decoded, PgValue::Timestamp(ts));

        let d = date!(1999-12-31);
        let encoded = d.encode();
        let decoded = registry
            .decode(encoded.oid(), PgFormat::Binary, Some(bytes::Buf::chunk(&encoded)))
            .unwrap();
        assert_eq!(decoded, PgValue::Date(d));

        let t = time!(23:59:59);
        let encoded = t.encode();
        let decoded = registry
            .decode(encoded.oid(), PgFormat::Binary, Some(bytes::Buf::chunk(&encoded)))
            .unwrap();
        assert_eq!(decoded, PgValue::Time(t));
    }
}
