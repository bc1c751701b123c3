/// Postgres object identifier.
///
/// The oid type is implemented as an unsigned four-byte integer.
///
/// <https://www.postgresql.org/docs/current/datatype-oid.html>
pub type Oid = u32;

/// Well known type oids from `pg_type.dat`.
pub mod oid {
    use super::Oid;

    pub const BOOL: Oid = 16;
    /// variable-length string, binary values escaped
    pub const BYTEA: Oid = 17;
    /// single character
    pub const CHAR: Oid = 18;
    /// 63-byte type for storing system identifiers
    pub const NAME: Oid = 19;
    /// ~18 digit integer, 8-byte storage
    pub const INT8: Oid = 20;
    /// -32 thousand to 32 thousand, 2-byte storage
    pub const INT2: Oid = 21;
    /// -2 billion to 2 billion integer, 4-byte storage
    pub const INT4: Oid = 23;
    /// variable-length string, no limit specified
    pub const TEXT: Oid = 25;
    pub const OID: Oid = 26;
    /// JSON stored as text
    pub const JSON: Oid = 114;
    /// single-precision floating point number, 4-byte storage
    pub const FLOAT4: Oid = 700;
    /// double-precision floating point number, 8-byte storage
    pub const FLOAT8: Oid = 701;
    /// network IP address/netmask, network address
    pub const CIDR: Oid = 650;
    /// IP address/netmask, host address, netmask optional
    pub const INET: Oid = 869;
    /// char(length), blank-padded string, fixed storage length
    pub const BPCHAR: Oid = 1042;
    /// varchar(length), non-blank-padded string, variable storage length
    pub const VARCHAR: Oid = 1043;
    pub const DATE: Oid = 1082;
    /// time of day
    pub const TIME: Oid = 1083;
    /// date and time
    pub const TIMESTAMP: Oid = 1114;
    /// date and time with time zone
    pub const TIMESTAMPTZ: Oid = 1184;
    /// @ &lt;number&gt; &lt;units&gt;, time interval
    pub const INTERVAL: Oid = 1186;
    /// numeric(precision, decimal), arbitrary precision number
    pub const NUMERIC: Oid = 1700;
    pub const UUID: Oid = 2950;
    /// Binary JSON
    pub const JSONB: Oid = 3802;

    // array types

    pub const BOOL_ARRAY: Oid = 1000;
    pub const BYTEA_ARRAY: Oid = 1001;
    pub const CHAR_ARRAY: Oid = 1002;
    pub const NAME_ARRAY: Oid = 1003;
    pub const INT2_ARRAY: Oid = 1005;
    pub const INT4_ARRAY: Oid = 1007;
    pub const TEXT_ARRAY: Oid = 1009;
    pub const BPCHAR_ARRAY: Oid = 1014;
    pub const VARCHAR_ARRAY: Oid = 1015;
    pub const INT8_ARRAY: Oid = 1016;
    pub const FLOAT4_ARRAY: Oid = 1021;
    pub const FLOAT8_ARRAY: Oid = 1022;
    pub const INET_ARRAY: Oid = 1041;
    pub const DATE_ARRAY: Oid = 1182;
    pub const TIME_ARRAY: Oid = 1183;
    pub const TIMESTAMP_ARRAY: Oid = 1115;
    pub const TIMESTAMPTZ_ARRAY: Oid = 1185;
    pub const INTERVAL_ARRAY: Oid = 1187;
    pub const NUMERIC_ARRAY: Oid = 1231;
    pub const JSON_ARRAY: Oid = 199;
    pub const JSONB_ARRAY: Oid = 3807;
    pub const UUID_ARRAY: Oid = 2951;
}

/// Returns the element oid of a known array type.
pub fn array_element(array_oid: Oid) -> Option<Oid> {
    let elem = match array_oid {
        oid::BOOL_ARRAY => oid::BOOL,
        oid::BYTEA_ARRAY => oid::BYTEA,
        oid::CHAR_ARRAY => oid::CHAR,
        oid::NAME_ARRAY => oid::NAME,
        oid::INT2_ARRAY => oid::INT2,
        oid::INT4_ARRAY => oid::INT4,
        oid::TEXT_ARRAY => oid::TEXT,
        oid::BPCHAR_ARRAY => oid::BPCHAR,
        oid::VARCHAR_ARRAY => oid::VARCHAR,
        oid::INT8_ARRAY => oid::INT8,
        oid::FLOAT4_ARRAY => oid::FLOAT4,
        oid::FLOAT8_ARRAY => oid::FLOAT8,
        oid::INET_ARRAY => oid::INET,
        oid::DATE_ARRAY => oid::DATE,
        oid::TIME_ARRAY => oid::TIME,
        oid::TIMESTAMP_ARRAY => oid::TIMESTAMP,
        oid::TIMESTAMPTZ_ARRAY => oid::TIMESTAMPTZ,
        oid::INTERVAL_ARRAY => oid::INTERVAL,
        oid::NUMERIC_ARRAY => oid::NUMERIC,
        oid::JSON_ARRAY => oid::JSON,
        oid::JSONB_ARRAY => oid::JSONB,
        oid::UUID_ARRAY => oid::UUID,
        _ => return None,
    };
    Some(elem)
}

/// A type that have corresponding postgres oid.
pub trait PgType {
    const OID: Oid;
}

macro_rules! pg_type {
    ($ty:ty, $oid:expr $(, $doc:literal)? ) => {
        impl PgType for $ty {
            $(#[doc = $doc])?
            const OID: Oid = $oid;
        }
    };
}

pg_type!(bool, oid::BOOL);
pg_type!(i16, oid::INT2, "`int2` -32 thousand to 32 thousand, 2-byte storage");
pg_type!(i32, oid::INT4, "`int4` -2 billion to 2 billion integer, 4-byte storage");
pg_type!(i64, oid::INT8, "`int8` ~18 digit integer, 8-byte storage");
pg_type!(f32, oid::FLOAT4, "`float4` single-precision floating point number, 4-byte storage");
pg_type!(f64, oid::FLOAT8, "`float8` double-precision floating point number, 8-byte storage");
pg_type!(str, oid::TEXT, "`text` variable-length string, no limit specified");
pg_type!(String, oid::TEXT, "`text` variable-length string, no limit specified");
pg_type!([u8], oid::BYTEA);
pg_type!(Vec<u8>, oid::BYTEA);
pg_type!(uuid::Uuid, oid::UUID);
pg_type!(std::net::IpAddr, oid::INET);
pg_type!(time::Date, oid::DATE);
pg_type!(time::Time, oid::TIME);
pg_type!(time::PrimitiveDateTime, oid::TIMESTAMP, "date and time");
pg_type!(time::UtcDateTime, oid::TIMESTAMPTZ, "date and time with timezone");
