//! Query parameter encoding.
use bytes::{Buf, Bytes};

use crate::{
    ext::BindParams,
    postgres::{Oid, PgFormat, PgType},
    value::ValueRef,
};

/// Value that can be encoded to be bound to sql parameter.
pub trait Encode<'q> {
    /// Encode the value.
    fn encode(self) -> Encoded<'q>;
}

/// Postgres encoded parameter.
///
/// A triple of format, type oid and payload. `NULL` is distinguishable from
/// an empty payload.
pub struct Encoded<'q> {
    value: ValueRef<'q>,
    is_null: bool,
    oid: Oid,
    format: PgFormat,
}

impl<'q> Encoded<'q> {
    /// Create binary [`Encoded`] from borrowed slice.
    pub fn from_slice(slice: &'q [u8], oid: Oid) -> Encoded<'q> {
        Encoded {
            value: ValueRef::Slice(slice),
            is_null: false,
            oid,
            format: PgFormat::Binary,
        }
    }

    /// Create heap allocated binary [`Encoded`] by copying given slice.
    pub fn copy_from_slice(slice: &[u8], oid: Oid) -> Encoded<'static> {
        Encoded {
            value: ValueRef::Bytes(Bytes::copy_from_slice(slice)),
            is_null: false,
            oid,
            format: PgFormat::Binary,
        }
    }

    /// Create binary [`Encoded`] from an owned buffer.
    pub fn owned(value: impl Into<Vec<u8>>, oid: Oid) -> Encoded<'static> {
        Encoded {
            value: ValueRef::Bytes(Bytes::from(value.into())),
            is_null: false,
            oid,
            format: PgFormat::Binary,
        }
    }

    /// Create [`Encoded`] in the text transmission format.
    pub fn text(value: impl Into<Vec<u8>>, oid: Oid) -> Encoded<'static> {
        Encoded {
            value: ValueRef::Bytes(Bytes::from(value.into())),
            is_null: false,
            oid,
            format: PgFormat::Text,
        }
    }

    /// Create a typed [`Encoded`] `NULL`.
    pub fn null(oid: Oid) -> Encoded<'static> {
        Encoded {
            value: ValueRef::Slice(&[]),
            is_null: true,
            oid,
            format: PgFormat::Binary,
        }
    }

    pub(crate) fn inline(slice: &[u8], oid: Oid) -> Encoded<'static> {
        Encoded {
            value: ValueRef::inline(slice),
            is_null: false,
            oid,
            format: PgFormat::Binary,
        }
    }

    /// Returns this parameter `oid`.
    pub fn oid(&self) -> Oid {
        self.oid
    }

    /// Returns the transmission format of the payload.
    pub fn format(&self) -> PgFormat {
        self.format
    }

    /// Returns `true` for the `NULL` parameter.
    pub fn is_null(&self) -> bool {
        self.is_null
    }

    pub(crate) fn value(&self) -> &ValueRef<'q> {
        &self.value
    }
}

impl Buf for Encoded<'_> {
    fn remaining(&self) -> usize {
        self.value.remaining()
    }

    fn chunk(&self) -> &[u8] {
        self.value.chunk()
    }

    fn advance(&mut self, cnt: usize) {
        self.value.advance(cnt);
    }
}

impl BindParams for Encoded<'_> {
    fn size(&self) -> i32 {
        match self.is_null {
            true => -1,
            false => self.remaining().try_into().expect("parameter too large for protocol"),
        }
    }
}

macro_rules! encode {
    (<$lf:tt,$ty:ty>$pat:tt => $body:expr) => {
        impl<$lf> Encode<$lf> for &$lf $ty {
            fn encode($pat) -> Encoded<$lf> {
                Encoded {
                    value: $body,
                    oid: <$ty>::OID,
                    is_null: false,
                    format: PgFormat::Binary,
                }
            }
        }
    };
    (<$ty:ty>$pat:tt => $body:expr) => {
        impl Encode<'static> for $ty {
            fn encode($pat) -> Encoded<'static> {
                Encoded {
                    value: $body,
                    oid: <$ty>::OID,
                    is_null: false,
                    format: PgFormat::Binary,
                }
            }
        }
    };
}

encode!(<bool>self => ValueRef::inline(&(self as u8).to_be_bytes()));
encode!(<i16>self => ValueRef::inline(&self.to_be_bytes()));
encode!(<i32>self => ValueRef::inline(&self.to_be_bytes()));
encode!(<i64>self => ValueRef::inline(&self.to_be_bytes()));
encode!(<f32>self => ValueRef::inline(&self.to_bits().to_be_bytes()));
encode!(<f64>self => ValueRef::inline(&self.to_bits().to_be_bytes()));
encode!(<uuid::Uuid>self => ValueRef::inline(self.as_bytes()));
encode!(<'a,str>self => ValueRef::Slice(self.as_bytes()));
encode!(<'a,String>self => ValueRef::Slice(self.as_bytes()));
encode!(<'a,[u8]>self => ValueRef::Slice(self));
encode!(<'a,Vec<u8>>self => ValueRef::Slice(self));

impl Encode<'static> for String {
    fn encode(self) -> Encoded<'static> {
        Encoded::owned(self, String::OID)
    }
}

impl Encode<'static> for Vec<u8> {
    fn encode(self) -> Encoded<'static> {
        Encoded::owned(self, Vec::<u8>::OID)
    }
}

impl<'q, T: Encode<'q> + PgType> Encode<'q> for Option<T> {
    fn encode(self) -> Encoded<'q> {
        match self {
            Some(value) => value.encode(),
            None => Encoded::null(T::OID),
        }
    }
}

impl std::fmt::Debug for Encoded<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_tuple("Encoded")
            .field(if self.is_null { &"NULL" } else { &self.value })
            .field(&self.oid)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ext::BindParams;

    #[test]
    fn null_is_distinguishable_from_empty() {
        let null = Encoded::null(25);
        let empty = "".encode();
        assert_eq!(null.size(), -1);
        assert_eq!(empty.size(), 0);
        assert!(null.is_null());
        assert!(!empty.is_null());
    }

    #[test]
    fn native_encodings() {
        let v = 420i32.encode();
        assert_eq!(v.oid(), 23);
        assert_eq!(v.chunk(), &420i32.to_be_bytes());

        let v = "foo".encode();
        assert_eq!(v.oid(), 25);
        assert_eq!(v.chunk(), b"foo");

        let v = Option::<i64>::None.encode();
        assert_eq!(v.oid(), 20);
        assert_eq!(v.size(), -1);
    }
}
