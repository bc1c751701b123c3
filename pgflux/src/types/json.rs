use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Decode, DecodeError, Encode,
    encode::Encoded,
    postgres::{PgType, oid},
    row::Column,
};

/// Decode and Encode postgres json value.
///
/// # Panics
///
/// Note that when performing [`Encode`], if [`Serialize`] implementation decide
/// to fail, it will panics.
#[derive(Debug)]
pub struct Json<T>(pub T);

impl<T> PgType for Json<T> {
    /// jsonb, Binary JSON
    const OID: u32 = oid::JSONB;
}

impl<T> Decode for Json<T>
where
    T: DeserializeOwned,
{
    fn decode(column: Column) -> Result<Self, DecodeError> {
        if !matches!(column.oid(), oid::JSON | oid::JSONB) {
            return Err(DecodeError::OidMissmatch);
        }
        let is_jsonb = column.oid() == oid::JSONB;
        let is_binary = column.format() == crate::postgres::PgFormat::Binary;
        let value = column.try_into_value()?;
        let raw = match (is_jsonb, is_binary) {
            (true, true) => match value.split_first() {
                Some((1, rest)) => rest,
                _ => return Err(DecodeError::malformed("unexpected jsonb version")),
            },
            _ => &value[..],
        };
        Ok(Json(serde_json::from_slice(raw)?))
    }
}

impl<T: Serialize> Encode<'static> for Json<T> {
    fn encode(self) -> Encoded<'static> {
        let mut out = vec![1u8];
        serde_json::to_writer(&mut out, &self.0).unwrap();
        Encoded::owned(out, Self::OID)
    }
}

impl<T: Serialize> Serialize for Json<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Json<T> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        Ok(Self(T::deserialize(deserializer)?))
    }
}
