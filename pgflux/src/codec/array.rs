//! Array codec, for both wire forms.
//!
//! Text: `{1,2,NULL,"c,d"}` with backslash escapes inside quoted elements
//! and `{{..},{..}}` nesting.
//!
//! Binary: `ndim | hasnull | element oid | (len, lower bound) per dim |
//! (len, bytes) per element`, elements in row-major order.
use super::{Codec, EncodeError, PgValue, Registry};
use crate::{
    encode::Encoded,
    postgres::{Oid, PgFormat, array_element, oid},
    row::DecodeError,
};

/// Arrays beyond six dimensions are rejected, matching the server limit.
const MAX_DIM: i32 = 6;

pub(super) struct ArrayCodec;

impl Codec for ArrayCodec {
    fn can_decode(&self, oid: Oid, _: PgFormat) -> bool {
        array_element(oid).is_some()
    }

    fn decode(
        &self,
        registry: &Registry,
        oid: Oid,
        format: PgFormat,
        value: &[u8],
    ) -> Result<PgValue, DecodeError> {
        let elem = array_element(oid).ok_or(DecodeError::NoCodec(oid))?;
        match format {
            PgFormat::Text => {
                let text = std::str::from_utf8(value).map_err(DecodeError::Utf8)?;
                // `[1:2]={..}` redimension prefix may precede the payload
                let text = &text[text.find('{').ok_or_else(malformed)?..];
                let (values, rest) = parse_text(registry, elem, text, 1)?;
                if !rest.trim_start().is_empty() {
                    return Err(malformed());
                }
                Ok(PgValue::Array(values))
            },
            PgFormat::Binary => parse_binary(registry, elem, value),
        }
    }

    fn can_encode(&self, value: &PgValue) -> bool {
        matches!(value, PgValue::Array(_))
    }

    /// Arrays bind in the binary form, so every element must itself have a
    /// binary wire form, and the element type is taken from the first
    /// non-NULL element.
    fn encode(&self, registry: &Registry, value: &PgValue) -> Result<Encoded<'static>, EncodeError> {
        let PgValue::Array(values) = value else {
            return Err(EncodeError::Unsupported);
        };

        let mut elem_oid = None;
        let mut elems = Vec::with_capacity(values.len());
        for value in values {
            if value.is_null() {
                elems.push(None);
                continue;
            }
            let encoded = registry.encode(value)?;
            if encoded.format() != PgFormat::Binary {
                return Err(EncodeError::Unsupported);
            }
            match elem_oid {
                None => elem_oid = Some(encoded.oid()),
                Some(oid) if oid == encoded.oid() => { },
                Some(_) => return Err(EncodeError::Unsupported),
            }
            elems.push(Some(encoded));
        }

        // an all-NULL array carries no element type to name
        let elem_oid = elem_oid.ok_or(EncodeError::Unsupported)?;
        let array_oid = array_of(elem_oid).ok_or(EncodeError::Unsupported)?;

        let mut out = Vec::new();
        out.extend_from_slice(&1i32.to_be_bytes());
        let hasnull = elems.iter().any(Option::is_none) as i32;
        out.extend_from_slice(&hasnull.to_be_bytes());
        out.extend_from_slice(&elem_oid.to_be_bytes());
        out.extend_from_slice(&(elems.len() as i32).to_be_bytes());
        out.extend_from_slice(&1i32.to_be_bytes()); // lower bound
        for elem in elems {
            match elem {
                None => out.extend_from_slice(&(-1i32).to_be_bytes()),
                Some(elem) => {
                    let chunk = bytes::Buf::chunk(&elem);
                    out.extend_from_slice(&(chunk.len() as i32).to_be_bytes());
                    out.extend_from_slice(chunk);
                },
            }
        }

        Ok(Encoded::owned(out, array_oid))
    }

    fn preferred_type(&self, _: Oid, _: PgFormat) -> &'static str {
        "Vec<PgValue>"
    }
}

fn malformed() -> DecodeError {
    DecodeError::malformed("unexpected array literal")
}

/// Array oid of a known element oid.
fn array_of(elem: Oid) -> Option<Oid> {
    let array = match elem {
        oid::BOOL => oid::BOOL_ARRAY,
        oid::BYTEA => oid::BYTEA_ARRAY,
        oid::CHAR => oid::CHAR_ARRAY,
        oid::NAME => oid::NAME_ARRAY,
        oid::INT2 => oid::INT2_ARRAY,
        oid::INT4 => oid::INT4_ARRAY,
        oid::TEXT => oid::TEXT_ARRAY,
        oid::BPCHAR => oid::BPCHAR_ARRAY,
        oid::VARCHAR => oid::VARCHAR_ARRAY,
        oid::INT8 => oid::INT8_ARRAY,
        oid::FLOAT4 => oid::FLOAT4_ARRAY,
        oid::FLOAT8 => oid::FLOAT8_ARRAY,
        oid::INET => oid::INET_ARRAY,
        oid::DATE => oid::DATE_ARRAY,
        oid::TIME => oid::TIME_ARRAY,
        oid::TIMESTAMP => oid::TIMESTAMP_ARRAY,
        oid::TIMESTAMPTZ => oid::TIMESTAMPTZ_ARRAY,
        oid::INTERVAL => oid::INTERVAL_ARRAY,
        oid::NUMERIC => oid::NUMERIC_ARRAY,
        oid::JSON => oid::JSON_ARRAY,
        oid::JSONB => oid::JSONB_ARRAY,
        oid::UUID => oid::UUID_ARRAY,
        _ => return None,
    };
    Some(array)
}

/// Parse one `{..}` group starting at `text`, returning the values and the
/// remaining input after the closing brace.
fn parse_text<'a>(
    registry: &Registry,
    elem: Oid,
    text: &'a str,
    depth: i32,
) -> Result<(Vec<PgValue>, &'a str), DecodeError> {
    if depth > MAX_DIM {
        return Err(DecodeError::malformed("too many array dimensions"));
    }

    let mut rest = text.strip_prefix('{').ok_or_else(malformed)?;
    let mut values = Vec::new();

    if let Some(after) = rest.strip_prefix('}') {
        return Ok((values, after));
    }

    loop {
        rest = rest.trim_start();

        if rest.starts_with('{') {
            let (nested, after) = parse_text(registry, elem, rest, depth + 1)?;
            values.push(PgValue::Array(nested));
            rest = after;
        } else if let Some(quoted) = rest.strip_prefix('"') {
            let mut out = String::new();
            let mut chars = quoted.char_indices();
            let after = loop {
                let (i, c) = chars.next().ok_or_else(malformed)?;
                match c {
                    '"' => break &quoted[i + 1..],
                    '\\' => out.push(chars.next().ok_or_else(malformed)?.1),
                    c => out.push(c),
                }
            };
            values.push(registry.decode(elem, PgFormat::Text, Some(out.as_bytes()))?);
            rest = after;
        } else {
            let end = rest
                .find(|c| matches!(c, ',' | '}'))
                .ok_or_else(malformed)?;
            let raw = rest[..end].trim();
            if raw.is_empty() {
                return Err(malformed());
            }
            values.push(match raw {
                "NULL" => PgValue::Null,
                raw => registry.decode(elem, PgFormat::Text, Some(raw.as_bytes()))?,
            });
            rest = &rest[end..];
        }

        rest = rest.trim_start();
        if let Some(after) = rest.strip_prefix(',') {
            rest = after;
        } else if let Some(after) = rest.strip_prefix('}') {
            return Ok((values, after));
        } else {
            return Err(malformed());
        }
    }
}

fn read_i32(value: &[u8], at: &mut usize) -> Result<i32, DecodeError> {
    let raw = value
        .get(*at..*at + 4)
        .ok_or_else(|| DecodeError::malformed("truncated binary array"))?;
    *at += 4;
    Ok(i32::from_be_bytes(raw.try_into().unwrap()))
}

fn parse_binary(registry: &Registry, elem: Oid, value: &[u8]) -> Result<PgValue, DecodeError> {
    let mut at = 0usize;

    let ndim = read_i32(value, &mut at)?;
    let _hasnull = read_i32(value, &mut at)?;
    let declared = read_i32(value, &mut at)? as Oid;
    // the declared element oid wins over the catalogue mapping
    let elem = match declared {
        0 => elem,
        declared => declared,
    };

    if !(0..=MAX_DIM).contains(&ndim) {
        return Err(DecodeError::malformed("too many array dimensions"));
    }

    let mut dims = Vec::with_capacity(ndim as usize);
    for _ in 0..ndim {
        let len = read_i32(value, &mut at)?;
        let _lower_bound = read_i32(value, &mut at)?;
        if len < 0 {
            return Err(DecodeError::malformed("negative array dimension"));
        }
        dims.push(len as usize);
    }

    // element count is the product of every dimension
    let total = dims
        .iter()
        .try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
        .filter(|total| *total <= i32::MAX as usize)
        .ok_or_else(|| DecodeError::malformed("array element count overflow"))?;
    let total = match ndim {
        0 => 0,
        _ => total,
    };

    let mut flat = Vec::with_capacity(total);
    for _ in 0..total {
        let len = read_i32(value, &mut at)?;
        if len == -1 {
            flat.push(PgValue::Null);
            continue;
        }
        let len = len as usize;
        let raw = value
            .get(at..at + len)
            .ok_or_else(|| DecodeError::malformed("truncated binary array"))?;
        at += len;
        flat.push(registry.decode(elem, PgFormat::Binary, Some(raw))?);
    }

    if at != value.len() {
        return Err(DecodeError::malformed("trailing bytes after binary array"));
    }

    Ok(reshape(&dims, &mut flat.into_iter()))
}

/// Nest a row-major flat element list into `dims.len()` levels.
fn reshape(dims: &[usize], flat: &mut impl Iterator<Item = PgValue>) -> PgValue {
    match dims.split_first() {
        None => PgValue::Array(flat.collect()),
        Some((len, [])) => PgValue::Array((0..*len).filter_map(|_| flat.next()).collect()),
        Some((len, rest)) => {
            PgValue::Array((0..*len).map(|_| reshape(rest, flat)).collect())
        },
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn registry() -> Registry {
        Registry::with_defaults()
    }

    // INT8_ARRAY, 1 dim of 2 elements: [100, 200]
    const INT8_ARRAY_BIN: &[u8] = &[
        0x00, 0x00, 0x00, 0x01, // ndim
        0x00, 0x00, 0x00, 0x00, // hasnull
        0x00, 0x00, 0x00, 0x14, // element oid 20
        0x00, 0x00, 0x00, 0x02, // dim len
        0x00, 0x00, 0x00, 0x02, // lower bound
        0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x64,
        0x00, 0x00, 0x00, 0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC8,
    ];

    #[test]
    fn binary_int8_array() {
        let v = registry()
            .decode(oid::INT8_ARRAY, PgFormat::Binary, Some(INT8_ARRAY_BIN))
            .unwrap();
        assert_eq!(v, PgValue::Array(vec![PgValue::Int8(100), PgValue::Int8(200)]));
    }

    #[test]
    fn text_form_decodes_identically() {
        let bin = registry()
            .decode(oid::INT8_ARRAY, PgFormat::Binary, Some(INT8_ARRAY_BIN))
            .unwrap();
        let text = registry()
            .decode(oid::INT8_ARRAY, PgFormat::Text, Some(b"{100,200}".as_ref()))
            .unwrap();
        assert_eq!(bin, text);
    }

    #[test]
    fn text_nulls_and_quoting() {
        let v = registry()
            .decode(
                oid::TEXT_ARRAY,
                PgFormat::Text,
                Some(br#"{a,b,NULL,"c,d","e\"f\\g"}"#.as_ref()),
            )
            .unwrap();
        assert_eq!(
            v,
            PgValue::Array(vec![
                PgValue::Text("a".into()),
                PgValue::Text("b".into()),
                PgValue::Null,
                PgValue::Text("c,d".into()),
                PgValue::Text("e\"f\\g".into()),
            ]),
        );
    }

    #[test]
    fn text_empty_and_nested() {
        assert_eq!(
            registry()
                .decode(oid::INT4_ARRAY, PgFormat::Text, Some(b"{}".as_ref()))
                .unwrap(),
            PgValue::Array(vec![]),
        );
        assert_eq!(
            registry()
                .decode(oid::INT4_ARRAY, PgFormat::Text, Some(b"{{1,2},{3,4}}".as_ref()))
                .unwrap(),
            PgValue::Array(vec![
                PgValue::Array(vec![PgValue::Int4(1), PgValue::Int4(2)]),
                PgValue::Array(vec![PgValue::Int4(3), PgValue::Int4(4)]),
            ]),
        );
    }

    #[test]
    fn binary_null_elements() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&1i32.to_be_bytes());
        raw.extend_from_slice(&1i32.to_be_bytes());
        raw.extend_from_slice(&oid::INT4.to_be_bytes());
        raw.extend_from_slice(&3i32.to_be_bytes());
        raw.extend_from_slice(&1i32.to_be_bytes());
        raw.extend_from_slice(&4i32.to_be_bytes());
        raw.extend_from_slice(&7i32.to_be_bytes());
        raw.extend_from_slice(&(-1i32).to_be_bytes());
        raw.extend_from_slice(&4i32.to_be_bytes());
        raw.extend_from_slice(&9i32.to_be_bytes());
        let v = registry()
            .decode(oid::INT4_ARRAY, PgFormat::Binary, Some(&raw[..]))
            .unwrap();
        assert_eq!(
            v,
            PgValue::Array(vec![PgValue::Int4(7), PgValue::Null, PgValue::Int4(9)]),
        );
    }

    #[test]
    fn binary_two_dimensions_reshape() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&2i32.to_be_bytes());
        raw.extend_from_slice(&0i32.to_be_bytes());
        raw.extend_from_slice(&oid::INT4.to_be_bytes());
        for dim in [2i32, 1, 3, 1] {
            raw.extend_from_slice(&dim.to_be_bytes());
        }
        for n in 1..=6i32 {
            raw.extend_from_slice(&4i32.to_be_bytes());
            raw.extend_from_slice(&n.to_be_bytes());
        }
        let v = registry()
            .decode(oid::INT4_ARRAY, PgFormat::Binary, Some(&raw[..]))
            .unwrap();
        assert_eq!(
            v,
            PgValue::Array(vec![
                PgValue::Array(vec![PgValue::Int4(1), PgValue::Int4(2), PgValue::Int4(3)]),
                PgValue::Array(vec![PgValue::Int4(4), PgValue::Int4(5), PgValue::Int4(6)]),
            ]),
        );
    }

    #[test]
    fn binary_zero_dimensions_is_empty() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&0i32.to_be_bytes());
        raw.extend_from_slice(&0i32.to_be_bytes());
        raw.extend_from_slice(&oid::INT4.to_be_bytes());
        let v = registry()
            .decode(oid::INT4_ARRAY, PgFormat::Binary, Some(&raw[..]))
            .unwrap();
        assert_eq!(v, PgValue::Array(vec![]));
    }

    #[test]
    fn binary_rejects_seven_dimensions() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&7i32.to_be_bytes());
        raw.extend_from_slice(&0i32.to_be_bytes());
        raw.extend_from_slice(&oid::INT4.to_be_bytes());
        for _ in 0..7 {
            raw.extend_from_slice(&1i32.to_be_bytes());
            raw.extend_from_slice(&1i32.to_be_bytes());
        }
        raw.extend_from_slice(&4i32.to_be_bytes());
        raw.extend_from_slice(&1i32.to_be_bytes());
        let err = registry().decode(oid::INT4_ARRAY, PgFormat::Binary, Some(&raw[..]));
        assert!(err.is_err());
    }

    #[test]
    fn encode_binds_binary_array() {
        let registry = registry();
        let value = PgValue::Array(vec![PgValue::Int8(100), PgValue::Null, PgValue::Int8(200)]);
        let encoded = registry.encode(&value).unwrap();
        assert_eq!(encoded.oid(), oid::INT8_ARRAY);

        let decoded = registry
            .decode(encoded.oid(), PgFormat::Binary, Some(bytes::Buf::chunk(&encoded)))
            .unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn encode_rejects_mixed_elements() {
        let value = PgValue::Array(vec![PgValue::Int8(1), PgValue::Text("x".into())]);
        assert!(registry().encode(&value).is_err());
    }
}
