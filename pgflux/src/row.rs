//! Postgres row operation.
//!
//! - [`Row`]
//! - [`Column`]
//! - [`FromRow`]
//! - [`Decode`]
//!
//! - [`Index`]
//! - [`DecodeError`]
use bytes::{Buf, Bytes};
use std::{borrow::Cow, fmt, str::Utf8Error, string::FromUtf8Error, sync::Arc};

use crate::{
    codec::{PgValue, Registry},
    common::{ByteStr, unit_error},
    ext::{BytesExt, FmtExt},
    postgres::{Oid, PgFormat, PgType, oid},
};

// <https://www.postgresql.org/docs/current/protocol-message-formats.html#PROTOCOL-MESSAGE-FORMATS-ROWDESCRIPTION>
// table_oid
// column_number
// oid
// data_type_size
// type_modifier
// format_code
const SUFFIX: usize = size_of::<u32>()
    + size_of::<u16>()
    + size_of::<u32>()
    + size_of::<i16>()
    + size_of::<i32>()
    + size_of::<u16>();

const OID_OFFSET: usize = size_of::<u32>() + size_of::<u16>();

const FORMAT_OFFSET: usize = SUFFIX - size_of::<u16>();

/// Postgres row.
///
/// The column metadata is a borrowed view into the `RowDescription` body and
/// the values are borrowed views into the `DataRow` body; nothing is decoded
/// until asked for.
pub struct Row {
    field_len: u16,
    body: Bytes,
    values: Bytes,
    codecs: Arc<Registry>,
}

impl Row {
    /// `RowDescription` message
    pub(crate) fn new(mut bytes: Bytes, codecs: Arc<Registry>) -> Self {
        Self {
            field_len: bytes.get_u16(),
            body: bytes,
            values: Bytes::new(),
            codecs,
        }
    }

    /// `DataRow` message
    ///
    /// The wire bytes are server controlled; a column count that differs
    /// from the `RowDescription` is an error, never a crash.
    pub(crate) fn inner_clone(&self, mut bytes: Bytes) -> Result<Row, DecodeError> {
        if bytes.remaining() < 2 {
            return Err(DecodeError::malformed("truncated DataRow"));
        }
        if self.field_len != bytes.get_u16() {
            return Err(DecodeError::malformed(
                "DataRow column count differs from RowDescription",
            ));
        }
        Ok(Self {
            field_len: self.field_len,
            body: self.body.clone(),
            values: bytes,
            codecs: Arc::clone(&self.codecs),
        })
    }

    /// Returns `true` if row contains no columns.
    pub const fn is_empty(&self) -> bool {
        self.field_len == 0
    }

    /// Returns the number of fields/column.
    pub const fn len(&self) -> u16 {
        self.field_len
    }

    fn column<I: Index>(&self, idx: I) -> Result<Column, DecodeError> {
        let (offset, nul, nth) = idx.position(&self.body, self.field_len)?;

        let name = ByteStr::from_utf8(self.body.slice(offset..nul)).map_err(DecodeError::Utf8)?;

        let mut i = 0;
        let mut values = self.values.clone();
        let value = loop {
            let len = values.get_i32();
            let value = match len {
                -1 => None,
                _ => Some(values.split_to(len as _)),
            };
            if i == nth {
                break value;
            }
            i += 1;
        };

        Ok(Column::new(name, &self.body[nul + 1..], value))
    }

    /// Try get and decode column with the typed [`Decode`] path.
    pub fn try_get<I: Index, R: Decode>(&self, idx: I) -> Result<R, DecodeError> {
        R::decode(self.column(idx)?)
    }

    /// Decode a column into a dynamic [`PgValue`] through the codec registry.
    pub fn value<I: Index>(&self, idx: I) -> Result<PgValue, DecodeError> {
        let column = self.column(idx)?;
        self.codecs
            .decode(column.oid(), column.format(), column.as_slice())
    }

    /// Try decode type using [`FromRow`] implementation.
    pub fn decode<D: FromRow>(self) -> Result<D, DecodeError> {
        D::from_row(self)
    }
}

impl IntoIterator for Row {
    type Item = Result<Column, DecodeError>;

    type IntoIter = IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        IntoIter {
            field_len: self.field_len,
            body: self.body,
            values: self.values,
            iter_n: 0,
        }
    }
}

/// [`IntoIterator`] implementation from [`Row`].
#[derive(Debug)]
pub struct IntoIter {
    field_len: u16,
    body: Bytes,
    values: Bytes,

    iter_n: u16,
}

impl IntoIter {
    /// Same as [`Iterator::next`] but returns [`Result`] instead.
    pub fn try_next(&mut self) -> Result<Column, DecodeError> {
        match self.next() {
            Some(ok) => ok,
            None => Err(DecodeError::IndexOutOfBounds(self.iter_n as _)),
        }
    }
}

impl Iterator for IntoIter {
    type Item = Result<Column, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.iter_n == self.field_len {
            return None
        }

        let field_name = match self.body.get_nul_bytestr() {
            Ok(ok) => ok,
            Err(err) => {
                self.iter_n = self.field_len;
                return Some(Err(DecodeError::malformed(err.to_string())))
            },
        };
        let column = self.body.split_to(SUFFIX);
        let len = self.values.get_i32();
        let value = match len {
            -1 => None,
            _ => Some(self.values.split_to(len as _)),
        };
        self.iter_n += 1;

        Some(Ok(Column::new(field_name, &column, value)))
    }
}

impl fmt::Debug for Row {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dbg = f.debug_map();
        let mut b = self.body.clone();
        let mut v = self.values.clone();
        for _ in 0..self.field_len {
            let Ok(key) = b.get_nul_bytestr() else { break };
            b.advance(SUFFIX);
            let len = v.get_i32();
            dbg.key(&key);
            match len {
                -1 => dbg.value(&format_args!("NULL")),
                len => dbg.value(&v.split_to(len as _).lossy()),
            };
        }
        dbg.finish()
    }
}

/// Postgres column.
#[derive(Debug, Clone)]
pub struct Column {
    oid: Oid,
    format: PgFormat,
    value: Option<Bytes>,
    name: ByteStr,
}

impl Column {
    /// `body` is start of data **after** field name
    fn new(name: ByteStr, body: &[u8], value: Option<Bytes>) -> Self {
        Self {
            name,
            oid: (&mut &body[OID_OFFSET..]).get_u32(),
            format: PgFormat::from_code((&mut &body[FORMAT_OFFSET..]).get_u16()),
            value,
        }
    }

    /// Returns column [`Oid`].
    pub const fn oid(&self) -> Oid {
        self.oid
    }

    /// Returns the transmission format of the value.
    pub const fn format(&self) -> PgFormat {
        self.format
    }

    /// Returns column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return `true` if value is NULL.
    pub const fn is_null(&self) -> bool {
        self.value.is_none()
    }

    /// Extract the inner bytes as slice.
    ///
    /// Returns [`None`] if value is `NULL`.
    pub fn as_slice(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// Clone the inner [`Bytes`].
    ///
    /// Returns [`None`] if value is `NULL`.
    pub fn value(&self) -> Option<Bytes> {
        self.value.as_ref().cloned()
    }

    /// Consume self into the inner [`Bytes`].
    pub fn into_value(self) -> Option<Bytes> {
        self.value
    }

    /// Try consume self into the inner [`Bytes`].
    ///
    /// Return [`DecodeError::Null`] if value is `NULL`.
    pub fn try_into_value(self) -> Result<Bytes, DecodeError> {
        self.value.ok_or(DecodeError::Null)
    }

    /// Try decode type using [`Decode`] implementation.
    pub fn decode<D: Decode>(self) -> Result<D, DecodeError> {
        D::decode(self)
    }
}

/// Query result with its rows affected.
#[derive(Debug)]
pub struct RowResult {
    pub rows_affected: u64,
}

// ===== Traits =====

/// Type that can be constructed from a row.
pub trait FromRow: Sized {
    /// Construct self from row.
    fn from_row(row: Row) -> Result<Self, DecodeError>;
}

impl FromRow for Row {
    fn from_row(row: Row) -> Result<Self, DecodeError> {
        Ok(row)
    }
}

impl FromRow for () {
    fn from_row(_: Row) -> Result<Self, DecodeError> {
        Ok(())
    }
}

macro_rules! from_row_tuple {
    ($($t:ident $i:literal),*) => {
        impl<$($t),*> FromRow for ($($t),*,)
        where
            $($t: Decode),*
        {
            fn from_row(row: Row) -> Result<Self, DecodeError> {
                Ok((
                    $(row.try_get($i)?),*,
                ))
            }
        }
    };
}

from_row_tuple!(T0 0);
from_row_tuple!(T0 0, T1 1);
from_row_tuple!(T0 0, T1 1, T2 2);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4);
from_row_tuple!(T0 0, T1 1, T2 2, T3 3, T4 4, T5 5);

/// A type that can be constructed from [`Column`].
pub trait Decode: Sized {
    /// Try decode self from column.
    fn decode(column: Column) -> Result<Self, DecodeError>;
}

impl Decode for Column {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        Ok(column)
    }
}

impl<T: Decode> Decode for Option<T> {
    fn decode(column: Column) -> Result<Self, DecodeError> {
        match column.is_null() {
            true => Ok(None),
            false => column.decode().map(Some),
        }
    }
}

impl Decode for () {
    fn decode(_: Column) -> Result<Self, DecodeError> {
        Ok(())
    }
}

macro_rules! decode_number {
    ($ty:ty) => {
        impl Decode for $ty {
            fn decode(col: Column) -> Result<Self, DecodeError> {
                if col.oid() != Self::OID {
                    return Err(DecodeError::OidMissmatch);
                }
                let format = col.format();
                let value = col.try_into_value()?;
                match format {
                    PgFormat::Binary => {
                        let be = <[u8; size_of::<$ty>()]>::try_from(&value[..])
                            .map_err(|_| DecodeError::malformed("unexpected binary value width"))?;
                        Ok(<$ty>::from_be_bytes(be))
                    },
                    PgFormat::Text => std::str::from_utf8(&value)?
                        .parse()
                        .map_err(|_| DecodeError::malformed("unexpected number literal")),
                }
            }
        }
    };
}

decode_number!(i16);
decode_number!(i32);
decode_number!(i64);

macro_rules! decode_float {
    ($ty:ty, $bits:ty) => {
        impl Decode for $ty {
            fn decode(col: Column) -> Result<Self, DecodeError> {
                if col.oid() != Self::OID {
                    return Err(DecodeError::OidMissmatch);
                }
                let format = col.format();
                let value = col.try_into_value()?;
                match format {
                    PgFormat::Binary => {
                        let be = <[u8; size_of::<$ty>()]>::try_from(&value[..])
                            .map_err(|_| DecodeError::malformed("unexpected binary value width"))?;
                        Ok(<$ty>::from_bits(<$bits>::from_be_bytes(be)))
                    },
                    PgFormat::Text => std::str::from_utf8(&value)?
                        .parse()
                        .map_err(|_| DecodeError::malformed("unexpected number literal")),
                }
            }
        }
    };
}

decode_float!(f32, u32);
decode_float!(f64, u64);

impl Decode for bool {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        if col.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let format = col.format();
        let value = col.try_into_value()?;
        match format {
            PgFormat::Binary => Ok(value.first().copied().unwrap_or_default() != 0),
            PgFormat::Text => match &value[..] {
                b"t" | b"true" => Ok(true),
                b"f" | b"false" => Ok(false),
                _ => Err(DecodeError::malformed("unexpected bool literal")),
            },
        }
    }
}

impl Decode for String {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        if !matches!(col.oid(), oid::TEXT | oid::VARCHAR | oid::BPCHAR | oid::NAME | oid::CHAR) {
            return Err(DecodeError::OidMissmatch);
        }
        Ok(String::from_utf8(col.try_into_value().map(Into::into)?)?)
    }
}

impl Decode for Vec<u8> {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        if col.oid() != oid::BYTEA {
            return Err(DecodeError::OidMissmatch);
        }
        match col.format() {
            PgFormat::Binary => Ok(col.try_into_value()?.into()),
            // the registry built-in covers both text forms
            PgFormat::Text => match Registry::shared().decode(
                oid::BYTEA,
                PgFormat::Text,
                col.try_into_value()?.as_ref().into(),
            )? {
                PgValue::Bytea(v) => Ok(v),
                _ => Err(DecodeError::malformed("unexpected bytea value")),
            },
        }
    }
}

impl Decode for uuid::Uuid {
    fn decode(col: Column) -> Result<Self, DecodeError> {
        if col.oid() != Self::OID {
            return Err(DecodeError::OidMissmatch);
        }
        let format = col.format();
        let value = col.try_into_value()?;
        match format {
            PgFormat::Binary => Ok(uuid::Uuid::from_bytes(
                <[u8; 16]>::try_from(&value[..])
                    .map_err(|_| DecodeError::malformed("unexpected binary value width"))?,
            )),
            PgFormat::Text => uuid::Uuid::parse_str(std::str::from_utf8(&value)?)
                .map_err(|_| DecodeError::malformed("unexpected uuid literal")),
        }
    }
}

/// Type that can be used for indexing column.
pub trait Index: Sized + sealed::Sealed {
    /// Returns (bytes start offset, nul string index, nth column).
    fn position(self, body: &[u8], len: u16) -> Result<(usize, usize, u16), DecodeError>;
}

macro_rules! position {
    (
        $self:pat, $body:ident, $len:ident,
        ($offset:ident,$i_nul:ident,$nth:ident) => $test:expr,
        () => $into:expr
    ) => {
        let mut iter = $body.iter().copied().enumerate();
        let mut $offset = 0;

        for $nth in 0..$len {
            let Some(($i_nul, _)) = iter.find(|(_, e)| matches!(e, b'\0')) else {
                break;
            };

            if $test {
                return Ok(($offset,$i_nul,$nth));
            }

            match iter.$nth(SUFFIX) {
                Some((i,_)) => {
                    $offset = i;
                },
                None => break,
            }
        }

        Err(DecodeError::ColumnNotFound($into))
    };
}

impl Index for usize {
    fn position(self, body: &[u8], len: u16) -> Result<(usize, usize, u16), DecodeError> {
        position! {
            self, body, len,
            (off,i_nul,nth) => self == nth as usize,
            () => String::from(itoa::Buffer::new().format(self)).into()
        }
    }
}

impl Index for &str {
    fn position(self, body: &[u8], len: u16) -> Result<(usize, usize, u16), DecodeError> {
        position! {
            self, body, len,
            (off,i_nul,nth) => self.as_bytes() == &body[off..i_nul],
            () => String::from(self).into()
        }
    }
}

mod sealed {
    pub trait Sealed { }
    impl Sealed for usize { }
    impl Sealed for &str { }
}

unit_error! {
    /// An error when try to [`fetch_one`][crate::query::Query::fetch_one] and not returns any row.
    pub struct RowNotFound("row not found");
}

macro_rules! from {
    (<$ty:ty>$pat:pat => $body:expr) => {
        impl From<$ty> for DecodeError {
            fn from($pat: $ty) -> Self {
                $body
            }
        }
    };
}

/// An error when decoding row value.
pub enum DecodeError {
    /// Postgres return non utf8 string.
    Utf8(Utf8Error),
    /// Column requested not found.
    ColumnNotFound(Cow<'static, str>),
    /// Index requested is out of bounds.
    IndexOutOfBounds(usize),
    /// Oid requested missmatch.
    OidMissmatch,
    /// Row is null.
    Null,
    /// No registered codec accepts the value.
    NoCodec(Oid),
    /// Value bytes do not form the expected wire shape.
    Malformed(Cow<'static, str>),
    /// Failed to deserialize using `serde_json`.
    Json(serde_json::error::Error),
}

impl DecodeError {
    pub(crate) fn malformed(reason: impl Into<Cow<'static, str>>) -> DecodeError {
        Self::Malformed(reason.into())
    }
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("failed to decode value, ")?;
        match self {
            Self::Utf8(e) => write!(f, "{e}"),
            Self::ColumnNotFound(name) => write!(f, "column not found: {name:?}"),
            Self::IndexOutOfBounds(u) => write!(f, "index out of bounds: {u:?}"),
            Self::OidMissmatch => write!(f, "data type missmatch"),
            Self::Null => write!(f, "unexpected NULL value"),
            Self::NoCodec(oid) => write!(f, "no codec for oid {oid}"),
            Self::Malformed(reason) => write!(f, "{reason}"),
            Self::Json(e) => write!(f, "{e}"),
        }
    }
}

from!(<Utf8Error>e => Self::Utf8(e));
from!(<FromUtf8Error>e => Self::Utf8(e.utf8_error()));
from!(<serde_json::error::Error>e => Self::Json(e));

impl std::error::Error for DecodeError { }

impl fmt::Debug for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use bytes::{BufMut, BytesMut};

    use super::*;
    use crate::ext::BufMutExt;

    /// Build `RowDescription` + `DataRow` bodies by hand.
    fn row(fields: &[(&str, Oid, PgFormat)], values: &[Option<&[u8]>]) -> Row {
        let mut body = BytesMut::new();
        body.put_u16(fields.len() as u16);
        for (name, oid, format) in fields {
            body.put_nul_string(name);
            body.put_u32(0); // table oid
            body.put_u16(0); // column number
            body.put_u32(*oid);
            body.put_i16(-1); // data type size
            body.put_i32(-1); // type modifier
            body.put_u16(format.format_code());
        }

        let mut data = BytesMut::new();
        data.put_u16(values.len() as u16);
        for value in values {
            match value {
                None => data.put_i32(-1),
                Some(v) => {
                    data.put_i32(v.len() as i32);
                    data.put(*v);
                },
            }
        }

        let template = Row::new(body.freeze(), Registry::shared());
        template.inner_clone(data.freeze()).unwrap()
    }

    #[test]
    fn typed_access_by_index_and_name() {
        let row = row(
            &[
                ("id", oid::INT4, PgFormat::Binary),
                ("name", oid::TEXT, PgFormat::Binary),
                ("score", oid::FLOAT8, PgFormat::Binary),
            ],
            &[
                Some(&7i32.to_be_bytes()),
                Some(b"postgres"),
                Some(&1.25f64.to_bits().to_be_bytes()),
            ],
        );

        assert_eq!(row.try_get::<_, i32>(0).unwrap(), 7);
        assert_eq!(row.try_get::<_, String>("name").unwrap(), "postgres");
        assert_eq!(row.try_get::<_, f64>("score").unwrap(), 1.25);
        assert!(matches!(
            row.try_get::<_, i32>("name"),
            Err(DecodeError::OidMissmatch),
        ));
        assert!(matches!(
            row.try_get::<_, i32>("missing"),
            Err(DecodeError::ColumnNotFound(_)),
        ));
    }

    #[test]
    fn text_format_typed_access() {
        let row = row(
            &[
                ("id", oid::INT8, PgFormat::Text),
                ("ok", oid::BOOL, PgFormat::Text),
            ],
            &[Some(b"42"), Some(b"t")],
        );

        assert_eq!(row.try_get::<_, i64>("id").unwrap(), 42);
        assert!(row.try_get::<_, bool>("ok").unwrap());
    }

    #[test]
    fn null_decodes_to_option() {
        let row = row(
            &[("v", oid::INT4, PgFormat::Binary)],
            &[None],
        );
        assert_eq!(row.try_get::<_, Option<i32>>(0).unwrap(), None);
        assert!(matches!(row.try_get::<_, i32>(0), Err(DecodeError::Null)));
        assert_eq!(row.value(0).unwrap(), PgValue::Null);
    }

    #[test]
    fn dynamic_access_through_registry() {
        let row = row(
            &[
                ("n", oid::NUMERIC, PgFormat::Text),
                ("tags", oid::INT4_ARRAY, PgFormat::Text),
            ],
            &[Some(b"10.5"), Some(b"{1,NULL}")],
        );

        assert_eq!(row.value("n").unwrap(), PgValue::Numeric("10.5".into()));
        assert_eq!(
            row.value("tags").unwrap(),
            PgValue::Array(vec![PgValue::Int4(1), PgValue::Null]),
        );
    }

    // wire bytes are server controlled; a DataRow disagreeing with its
    // RowDescription must surface as an error, not a panic
    #[test]
    fn mismatched_data_row_is_an_error() {
        let mut body = BytesMut::new();
        body.put_u16(2);
        for name in ["a", "b"] {
            body.put_nul_string(name);
            body.put_u32(0);
            body.put_u16(0);
            body.put_u32(oid::INT4);
            body.put_i16(-1);
            body.put_i32(-1);
            body.put_u16(1);
        }
        let template = Row::new(body.freeze(), Registry::shared());

        let mut data = BytesMut::new();
        data.put_u16(1); // one value for two described fields
        data.put_i32(-1);
        assert!(matches!(
            template.inner_clone(data.freeze()),
            Err(DecodeError::Malformed(_)),
        ));

        assert!(matches!(
            template.inner_clone(Bytes::new()),
            Err(DecodeError::Malformed(_)),
        ));
    }

    #[test]
    fn tuple_from_row() {
        let row = row(
            &[
                ("a", oid::INT4, PgFormat::Binary),
                ("b", oid::TEXT, PgFormat::Binary),
            ],
            &[Some(&420i32.to_be_bytes()), Some(b"Foo")],
        );
        let (a, b) = row.decode::<(i32, String)>().unwrap();
        assert_eq!(a, 420);
        assert_eq!(b, "Foo");
    }
}
