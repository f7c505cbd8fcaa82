//! Binary array format.

use crate::conversion::{FromWireValue, IsNull, ToWireValue, write_value};
use crate::error::{Error, Result};
use crate::protocol::codec::{read_bytes, read_i32, read_u32, write_i32, write_u32};
use crate::protocol::types::{FormatCode, Oid, oid};

use super::{Array, ArrayDimension, ArrayStatus, element_count};

fn truncated(_: Error) -> Error {
    Error::Decode("array value truncated".into())
}

pub(super) fn encode<T: ToWireValue>(array: &Array<T>, element_oid: Oid, buf: &mut Vec<u8>) -> Result<()> {
    // The empty array is written with zero dimensions.
    let dimensions: &[ArrayDimension] = if array.elements.is_empty() {
        &[]
    } else {
        &array.dimensions
    };
    let ndim = i32::try_from(dimensions.len())
        .map_err(|_| Error::Encode("too many array dimensions".into()))?;

    let header = buf.len();
    write_i32(buf, ndim);
    write_i32(buf, 0);
    write_u32(buf, element_oid);
    for dim in dimensions {
        write_i32(buf, dim.length);
        write_i32(buf, dim.lower_bound);
    }

    let mut has_null = false;
    for element in &array.elements {
        if write_value(element, element_oid, FormatCode::Binary, buf)? == IsNull::Yes {
            has_null = true;
        }
    }

    if has_null && let Some(flag) = buf.get_mut(header + 4..header + 8) {
        flag.copy_from_slice(&1_i32.to_be_bytes());
    }
    Ok(())
}

pub(super) fn decode<T>(array_oid: Oid, bytes: &[u8]) -> Result<Array<T>>
where
    T: for<'b> FromWireValue<'b>,
{
    let (ndim, rest) = read_i32(bytes).map_err(truncated)?;
    let (_has_null, rest) = read_i32(rest).map_err(truncated)?;
    let (element_oid, mut rest) = read_u32(rest).map_err(truncated)?;

    if ndim < 0 {
        return Err(Error::Decode(format!("negative array dimension count {}", ndim)));
    }
    if let Some(expected) = oid::array_element(array_oid)
        && expected != element_oid
    {
        return Err(Error::type_mismatch(expected, element_oid));
    }

    let mut dimensions = Vec::new();
    for _ in 0..ndim {
        let (length, tail) = read_i32(rest).map_err(truncated)?;
        let (lower_bound, tail) = read_i32(tail).map_err(truncated)?;
        dimensions.push(ArrayDimension { length, lower_bound });
        rest = tail;
    }

    let count = element_count(&dimensions)?;
    // Every element takes at least its 4-byte length.
    if count > rest.len() / 4 {
        return Err(Error::Decode(format!(
            "array declares {} elements but only {} bytes follow",
            count,
            rest.len()
        )));
    }

    let mut elements = Vec::with_capacity(count);
    for _ in 0..count {
        let (len, tail) = read_i32(rest).map_err(truncated)?;
        rest = tail;
        let element = match len {
            -1 => T::from_null()?,
            len if len < -1 => {
                return Err(Error::Decode(format!("invalid array element length {}", len)));
            }
            len => {
                let (value, tail) = read_bytes(rest, len as usize).map_err(truncated)?;
                rest = tail;
                T::from_binary(element_oid, value)?
            }
        };
        elements.push(element);
    }

    if !rest.is_empty() {
        return Err(Error::Decode(format!(
            "{} trailing bytes after array elements",
            rest.len()
        )));
    }

    if count == 0 {
        dimensions.clear();
    }
    Ok(Array {
        elements,
        dimensions,
        status: ArrayStatus::Present,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(ndim: i32, has_null: i32, elem: Oid, dims: &[(i32, i32)]) -> Vec<u8> {
        let mut buf = Vec::new();
        write_i32(&mut buf, ndim);
        write_i32(&mut buf, has_null);
        write_u32(&mut buf, elem);
        for &(len, lb) in dims {
            write_i32(&mut buf, len);
            write_i32(&mut buf, lb);
        }
        buf
    }

    #[test]
    fn encode_with_null_element() {
        let array = Array::from(vec![Some(1_i32), None, Some(3)]);
        let mut buf = Vec::new();
        encode(&array, oid::INT4, &mut buf).unwrap();

        let mut expected = header(1, 1, oid::INT4, &[(3, 1)]);
        expected.extend_from_slice(&[0, 0, 0, 4, 0, 0, 0, 1]);
        expected.extend_from_slice(&[0xff, 0xff, 0xff, 0xff]);
        expected.extend_from_slice(&[0, 0, 0, 4, 0, 0, 0, 3]);
        assert_eq!(buf, expected);
    }

    #[test]
    fn elements_follow_target_element_type() {
        let array = Array::from(vec![7_i64]);
        let mut buf = Vec::new();
        encode(&array, oid::INT2, &mut buf).unwrap();

        let mut expected = header(1, 0, oid::INT2, &[(1, 1)]);
        expected.extend_from_slice(&[0, 0, 0, 2, 0, 7]);
        assert_eq!(buf, expected);
    }

    #[test]
    fn decode_two_dimensions() {
        let mut bytes = header(2, 0, oid::INT8, &[(2, 1), (2, 0)]);
        for v in [1_i64, 2, 3, 4] {
            write_i32(&mut bytes, 8);
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        let array: Array<i64> = decode(oid::INT8_ARRAY, &bytes).unwrap();
        assert_eq!(array.elements, vec![1, 2, 3, 4]);
        assert_eq!(
            array.dimensions,
            vec![
                ArrayDimension::new(2),
                ArrayDimension {
                    length: 2,
                    lower_bound: 0
                }
            ]
        );
    }

    #[test]
    fn decode_empty() {
        let bytes = header(0, 0, oid::TEXT, &[]);
        let array: Array<String> = decode(oid::TEXT_ARRAY, &bytes).unwrap();
        assert_eq!(array.status, ArrayStatus::Present);
        assert!(array.elements.is_empty());
        assert!(array.dimensions.is_empty());
    }

    #[test]
    fn decode_null_into_non_nullable_element_fails() {
        let mut bytes = header(1, 1, oid::INT4, &[(1, 1)]);
        write_i32(&mut bytes, -1);
        assert!(decode::<i32>(oid::INT4_ARRAY, &bytes).is_err());
        assert_eq!(
            decode::<Option<i32>>(oid::INT4_ARRAY, &bytes).unwrap().elements,
            vec![None]
        );
    }

    fn round_trip<T>(array: &Array<T>, element_oid: Oid, array_oid: Oid) -> Array<T>
    where
        T: ToWireValue + for<'b> FromWireValue<'b>,
    {
        let mut buf = Vec::new();
        encode(array, element_oid, &mut buf).unwrap();
        decode(array_oid, &buf).unwrap()
    }

    #[test]
    fn round_trip_keeps_shape_and_nulls() {
        let dims = vec![
            ArrayDimension {
                length: 2,
                lower_bound: 0,
            },
            ArrayDimension::new(3),
        ];
        let matrix = Array::new(vec![Some(1_i32), None, Some(3), None, Some(5), Some(-6)], dims).unwrap();
        assert_eq!(round_trip(&matrix, oid::INT4, oid::INT4_ARRAY), matrix);

        let words = Array::new(
            vec![Some("a".to_string()), None, Some(String::new()), Some("{x}".to_string())],
            vec![ArrayDimension::new(2), ArrayDimension::new(2)],
        )
        .unwrap();
        assert_eq!(round_trip(&words, oid::TEXT, oid::TEXT_ARRAY), words);

        let empty: Array<Option<i32>> = Array::from(vec![]);
        let back = round_trip(&empty, oid::INT4, oid::INT4_ARRAY);
        assert_eq!(back, empty);
        assert_eq!(back.status, ArrayStatus::Present);
    }

    #[test]
    fn decode_rejects_malformed_input() {
        // truncated header
        assert!(decode::<i32>(oid::INT4_ARRAY, &[0, 0, 0, 1]).is_err());

        // negative ndim
        let bytes = header(-1, 0, oid::INT4, &[]);
        assert!(decode::<i32>(oid::INT4_ARRAY, &bytes).is_err());

        // negative dimension length
        let bytes = header(1, 0, oid::INT4, &[(-3, 1)]);
        assert!(decode::<i32>(oid::INT4_ARRAY, &bytes).is_err());

        // more elements declared than bytes available
        let bytes = header(2, 0, oid::INT4, &[(65536, 1), (65536, 1)]);
        assert!(decode::<i32>(oid::INT4_ARRAY, &bytes).is_err());

        // element type mismatch
        let mut bytes = header(1, 0, oid::INT8, &[(1, 1)]);
        write_i32(&mut bytes, 8);
        bytes.extend_from_slice(&1_i64.to_be_bytes());
        assert!(matches!(
            decode::<i64>(oid::INT4_ARRAY, &bytes),
            Err(Error::Decode(_))
        ));

        // trailing garbage
        let mut bytes = header(1, 0, oid::INT4, &[(1, 1)]);
        bytes.extend_from_slice(&[0, 0, 0, 4, 0, 0, 0, 1, 9]);
        assert!(decode::<i32>(oid::INT4_ARRAY, &bytes).is_err());
    }
}
