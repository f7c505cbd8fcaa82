//! PostgreSQL arrays of any element type and any number of dimensions.
//!
//! An [`Array`] stores its elements flattened in row-major order together
//! with the length and lower bound of each dimension. Both wire formats are
//! supported:
//!
//! - binary: `ndim`, `has_null`, element OID, then `(length, lower_bound)`
//!   per dimension, then each element length-prefixed (`-1` for NULL)
//! - text: `{{1,2},{3,4}}`, with an optional `[lb:ub]...=` prefix when any
//!   lower bound differs from 1
//!
//! The element type decides how each element is encoded, so `Array<i64>` can
//! be sent as `int2[]`, `int4[]` or `int8[]` depending on the target OID.

mod binary;
mod text;

use crate::error::{Error, Result};
use crate::protocol::types::{FormatCode, Oid, oid};

use super::{FromWireValue, IsNull, ToWireValue};

/// Length and lower bound of one array dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArrayDimension {
    pub length: i32,
    pub lower_bound: i32,
}

impl ArrayDimension {
    /// A dimension indexed from 1, the PostgreSQL default.
    pub fn new(length: i32) -> Self {
        Self {
            length,
            lower_bound: 1,
        }
    }
}

/// Presence of an array value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayStatus {
    /// No value was ever assigned. Encoding fails.
    #[default]
    Undefined,
    /// SQL NULL.
    Null,
    /// A real array, possibly with zero elements.
    Present,
}

/// A multi-dimensional array value.
#[derive(Debug, Clone, PartialEq)]
pub struct Array<T> {
    /// Elements in row-major order.
    pub elements: Vec<T>,
    pub dimensions: Vec<ArrayDimension>,
    pub status: ArrayStatus,
}

impl<T> Default for Array<T> {
    fn default() -> Self {
        Self {
            elements: Vec::new(),
            dimensions: Vec::new(),
            status: ArrayStatus::Undefined,
        }
    }
}

impl<T> Array<T> {
    /// Create a present array, checking that the dimensions cover exactly
    /// the given elements.
    pub fn new(elements: Vec<T>, dimensions: Vec<ArrayDimension>) -> Result<Self> {
        let array = Self {
            elements,
            dimensions,
            status: ArrayStatus::Present,
        };
        array.check_shape().map_err(|e| match e {
            Error::Encode(msg) => Error::InvalidUsage(msg),
            other => other,
        })?;
        Ok(array)
    }

    /// A SQL NULL array.
    pub fn null() -> Self {
        Self {
            elements: Vec::new(),
            dimensions: Vec::new(),
            status: ArrayStatus::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        self.status == ArrayStatus::Null
    }

    /// Total number of elements across all dimensions.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn into_elements(self) -> Vec<T> {
        self.elements
    }

    /// Check that a present array's dimensions agree with its elements.
    fn check_shape(&self) -> Result<()> {
        let expected = element_count(&self.dimensions)
            .map_err(|_| Error::Encode("array dimensions out of range".into()))?;
        if expected != self.elements.len() {
            return Err(Error::Encode(format!(
                "array dimensions describe {} elements but {} are present",
                expected,
                self.elements.len()
            )));
        }
        Ok(())
    }

    /// Resolve the element OID for an encode targeting `target_oid`.
    fn element_oid(&self, target_oid: Oid) -> Result<Oid>
    where
        T: ArrayElement,
    {
        if target_oid == oid::UNSPECIFIED {
            return Ok(T::ELEMENT_OID);
        }
        oid::array_element(target_oid)
            .ok_or_else(|| Error::Encode(format!("cannot encode array as non-array type {}", target_oid)))
    }

    /// Shared front half of both encoders.
    fn prepare_encode(&self, target_oid: Oid) -> Result<Option<Oid>>
    where
        T: ArrayElement,
    {
        match self.status {
            ArrayStatus::Null => Ok(None),
            ArrayStatus::Undefined => Err(Error::Encode("cannot encode an undefined array".into())),
            ArrayStatus::Present => {
                self.check_shape()?;
                self.element_oid(target_oid).map(Some)
            }
        }
    }
}

impl<T> From<Vec<T>> for Array<T> {
    /// One dimension indexed from 1. An empty vector becomes the empty
    /// array, which has no dimensions.
    fn from(elements: Vec<T>) -> Self {
        let dimensions = if elements.is_empty() {
            Vec::new()
        } else {
            match i32::try_from(elements.len()) {
                Ok(len) => vec![ArrayDimension::new(len)],
                // Rejected by check_shape when encoded.
                Err(_) => vec![ArrayDimension::new(i32::MAX)],
            }
        };
        Self {
            elements,
            dimensions,
            status: ArrayStatus::Present,
        }
    }
}

/// Number of elements described by `dimensions`.
///
/// No dimensions means the empty array. Negative lengths and products that
/// overflow are rejected.
pub(crate) fn element_count(dimensions: &[ArrayDimension]) -> Result<usize> {
    if dimensions.is_empty() {
        return Ok(0);
    }
    let mut count: usize = 1;
    for dim in dimensions {
        let len = usize::try_from(dim.length)
            .map_err(|_| Error::Decode(format!("negative array dimension length {}", dim.length)))?;
        count = count
            .checked_mul(len)
            .ok_or_else(|| Error::Decode("array dimensions overflow".into()))?;
        // The upper bound must be representable as well.
        if i64::from(dim.lower_bound) + i64::from(dim.length) - 1 > i64::from(i32::MAX) {
            return Err(Error::Decode("array upper bound overflows int4".into()));
        }
    }
    Ok(count)
}

/// Element types that can live inside an [`Array`].
pub trait ArrayElement {
    /// OID of the element type, used to pick the natural array OID.
    const ELEMENT_OID: Oid;
}

macro_rules! impl_array_element {
    ($($ty:ty => $oid:expr),+ $(,)?) => {$(
        impl ArrayElement for $ty {
            const ELEMENT_OID: Oid = $oid;
        }
    )+};
}

impl_array_element!(
    bool => oid::BOOL,
    i16 => oid::INT2,
    i32 => oid::INT4,
    i64 => oid::INT8,
    f32 => oid::FLOAT4,
    f64 => oid::FLOAT8,
    String => oid::TEXT,
    &str => oid::TEXT,
    Vec<u8> => oid::BYTEA,
    &[u8] => oid::BYTEA,
);

impl<T: ArrayElement> ArrayElement for Option<T> {
    const ELEMENT_OID: Oid = T::ELEMENT_OID;
}

impl<T: ToWireValue + ArrayElement> ToWireValue for Array<T> {
    fn natural_oid(&self) -> Oid {
        oid::array_of(T::ELEMENT_OID).unwrap_or(oid::UNSPECIFIED)
    }

    fn preferred_format(&self, _target_oid: Oid) -> FormatCode {
        FormatCode::Binary
    }

    fn encode_binary(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        match self.prepare_encode(target_oid)? {
            None => Ok(IsNull::Yes),
            Some(element_oid) => {
                binary::encode(self, element_oid, buf)?;
                Ok(IsNull::No)
            }
        }
    }

    fn encode_text(&self, target_oid: Oid, buf: &mut Vec<u8>) -> Result<IsNull> {
        match self.prepare_encode(target_oid)? {
            None => Ok(IsNull::Yes),
            Some(element_oid) => {
                text::encode(self, element_oid, buf)?;
                Ok(IsNull::No)
            }
        }
    }
}

impl<T> FromWireValue<'_> for Array<T>
where
    T: for<'b> FromWireValue<'b>,
{
    fn from_null() -> Result<Self> {
        Ok(Self::null())
    }

    fn from_text(oid: Oid, bytes: &[u8]) -> Result<Self> {
        text::decode(oid, bytes)
    }

    fn from_binary(oid: Oid, bytes: &[u8]) -> Result<Self> {
        binary::decode(oid, bytes)
    }
}
