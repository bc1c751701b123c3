//! The pluggable type codec registry.
//!
//! A [`Codec`] translates between wire values (`oid` × [`PgFormat`] × bytes)
//! and dynamic [`PgValue`]s. The [`Registry`] holds codecs in registration
//! order; lookups return the first codec that claims the value, so
//! application codecs registered up front shadow the built-in set.
//!
//! The built-ins cover booleans, the integer and float families, `numeric`,
//! the character types, `bytea`, the date/time family, `interval`, `uuid`,
//! `json`/`jsonb`, `inet`/`cidr`, and arrays of all of the above in both the
//! text and the binary transmission format.
use std::{fmt, sync::Arc};

mod builtin;
mod array;

use crate::{
    encode::Encoded,
    postgres::{Oid, PgFormat},
    row::DecodeError,
};

/// A dynamically typed postgres value.
#[derive(Debug, Clone, PartialEq)]
pub enum PgValue {
    Null,
    Bool(bool),
    Int2(i16),
    Int4(i32),
    Int8(i64),
    Float4(f32),
    Float8(f64),
    /// Arbitrary precision number, kept in its decimal text form.
    Numeric(String),
    Text(String),
    Bytea(Vec<u8>),
    Date(time::Date),
    Time(time::Time),
    Timestamp(time::PrimitiveDateTime),
    TimestampTz(time::UtcDateTime),
    Interval(PgInterval),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    Inet(std::net::IpAddr),
    Array(Vec<PgValue>),
}

impl PgValue {
    /// Returns `true` for [`PgValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

/// The three field interval value: months, days and microseconds are not
/// interchangeable, so all three are kept as the server sends them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PgInterval {
    pub months: i32,
    pub days: i32,
    pub microseconds: i64,
}

/// A single type (or type family) translator.
///
/// Codecs are consulted in registration order; the first one to answer
/// `true` from [`can_decode`][Codec::can_decode] or
/// [`can_encode`][Codec::can_encode] wins.
pub trait Codec: Send + Sync + 'static {
    /// Whether this codec can decode a value of `oid` in `format`.
    fn can_decode(&self, oid: Oid, format: PgFormat) -> bool;

    /// Decode a non-NULL wire value.
    ///
    /// `registry` is handed back in so aggregate codecs can decode their
    /// elements through the full registry.
    fn decode(
        &self,
        registry: &Registry,
        oid: Oid,
        format: PgFormat,
        value: &[u8],
    ) -> Result<PgValue, DecodeError>;

    /// Whether this codec can encode the host value.
    fn can_encode(&self, value: &PgValue) -> bool;

    /// Encode a host value into a bind parameter.
    fn encode(&self, registry: &Registry, value: &PgValue) -> Result<Encoded<'static>, EncodeError>;

    /// Encode a typed `NULL` parameter.
    fn encode_null(&self, oid: Oid) -> Encoded<'static> {
        Encoded::null(oid)
    }

    /// Name of the host type this codec prefers for `oid` in `format`.
    fn preferred_type(&self, oid: Oid, format: PgFormat) -> &'static str;
}

/// Registration ordered codec collection.
pub struct Registry {
    codecs: Vec<Box<dyn Codec>>,
}

impl Registry {
    /// An empty registry without even the built-in codecs.
    pub fn empty() -> Registry {
        Registry { codecs: Vec::new() }
    }

    /// A registry with the built-in codec set.
    pub fn with_defaults() -> Registry {
        let mut me = Registry::empty();
        me.register(builtin::BoolCodec);
        me.register(builtin::IntCodec);
        me.register(builtin::FloatCodec);
        me.register(builtin::NumericCodec);
        me.register(builtin::TextCodec);
        me.register(builtin::ByteaCodec);
        me.register(builtin::DateTimeCodec);
        me.register(builtin::IntervalCodec);
        me.register(builtin::UuidCodec);
        me.register(builtin::JsonCodec);
        me.register(builtin::InetCodec);
        me.register(array::ArrayCodec);
        me
    }

    /// The process wide shared default registry.
    pub fn shared() -> Arc<Registry> {
        static SHARED: std::sync::OnceLock<Arc<Registry>> = std::sync::OnceLock::new();
        SHARED.get_or_init(|| Arc::new(Registry::with_defaults())).clone()
    }

    /// Append a codec.
    ///
    /// Codecs registered earlier take precedence.
    pub fn register<C: Codec>(&mut self, codec: C) {
        self.codecs.push(Box::new(codec));
    }

    /// First codec claiming `oid` in `format`.
    pub fn lookup(&self, oid: Oid, format: PgFormat) -> Option<&dyn Codec> {
        self.codecs
            .iter()
            .map(AsRef::as_ref)
            .find(|c| c.can_decode(oid, format))
    }

    /// Decode a wire value, `None` standing for the NULL marker.
    pub fn decode(
        &self,
        oid: Oid,
        format: PgFormat,
        value: Option<&[u8]>,
    ) -> Result<PgValue, DecodeError> {
        let Some(value) = value else {
            return Ok(PgValue::Null);
        };
        let codec = self.lookup(oid, format).ok_or(DecodeError::NoCodec(oid))?;
        codec.decode(self, oid, format, value)
    }

    /// Encode a host value into a bind parameter.
    pub fn encode(&self, value: &PgValue) -> Result<Encoded<'static>, EncodeError> {
        let codec = self
            .codecs
            .iter()
            .find(|c| c.can_encode(value))
            .ok_or(EncodeError::Unsupported)?;
        codec.encode(self, value)
    }

    /// Encode a typed `NULL` parameter.
    pub fn encode_null(&self, oid: Oid) -> Encoded<'static> {
        match self.lookup(oid, PgFormat::Binary) {
            Some(codec) => codec.encode_null(oid),
            None => Encoded::null(oid),
        }
    }

    /// Name of the host type the first claiming codec prefers.
    pub fn preferred_type(&self, oid: Oid, format: PgFormat) -> Option<&'static str> {
        self.lookup(oid, format).map(|c| c.preferred_type(oid, format))
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("codecs", &self.codecs.len())
            .finish()
    }
}

/// An error when encoding a host value.
#[derive(PartialEq, Eq)]
pub enum EncodeError {
    /// No registered codec accepts the value, or an aggregate contains a
    /// value without a usable wire form.
    Unsupported,
}

impl std::error::Error for EncodeError { }

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unsupported => f.write_str("no codec can encode this value"),
        }
    }
}

impl fmt::Debug for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::postgres::oid;

    #[test]
    fn registration_order_wins() {
        struct Shadow;

        impl Codec for Shadow {
            fn can_decode(&self, oid: Oid, _: PgFormat) -> bool {
                oid == oid::BOOL
            }

            fn decode(
                &self,
                _: &Registry,
                _: Oid,
                _: PgFormat,
                _: &[u8],
            ) -> Result<PgValue, DecodeError> {
                Ok(PgValue::Text("shadowed".into()))
            }

            fn can_encode(&self, _: &PgValue) -> bool {
                false
            }

            fn encode(&self, _: &Registry, _: &PgValue) -> Result<Encoded<'static>, EncodeError> {
                Err(EncodeError::Unsupported)
            }

            fn preferred_type(&self, _: Oid, _: PgFormat) -> &'static str {
                "shadow"
            }
        }

        let mut registry = Registry::empty();
        registry.register(Shadow);
        registry.register(builtin::BoolCodec);

        let v = registry.decode(oid::BOOL, PgFormat::Binary, Some(&[1])).unwrap();
        assert_eq!(v, PgValue::Text("shadowed".into()));
        assert_eq!(registry.preferred_type(oid::BOOL, PgFormat::Binary), Some("shadow"));
    }

    #[test]
    fn null_decodes_without_codec() {
        let registry = Registry::empty();
        assert_eq!(registry.decode(oid::BOOL, PgFormat::Binary, None).unwrap(), PgValue::Null);
    }

    #[test]
    fn unknown_oid_reports_no_codec() {
        let registry = Registry::with_defaults();
        let err = registry.decode(999_999, PgFormat::Binary, Some(&[0]));
        assert!(matches!(err, Err(DecodeError::NoCodec(999_999))));
    }
}
