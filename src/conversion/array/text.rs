//! Text array format: `{1,2}`, `{{a,"b c"},{NULL,d}}`, `[0:1]={x,y}`.

use std::borrow::Cow;

use crate::conversion::{FromWireValue, IsNull, ToWireValue, utf8};
use crate::error::{Error, Result};
use crate::protocol::types::{Oid, oid};

use super::{Array, ArrayDimension, ArrayStatus, element_count};

/// Most dimensions a server array can have.
const MAX_DIMENSIONS: usize = 6;

fn syntax(msg: impl std::fmt::Display) -> Error {
    Error::Decode(format!("malformed array literal: {}", msg))
}

// === Encoding ===

pub(super) fn encode<T: ToWireValue>(array: &Array<T>, element_oid: Oid, buf: &mut Vec<u8>) -> Result<()> {
    if array.elements.is_empty() {
        buf.extend_from_slice(b"{}");
        return Ok(());
    }

    if array.dimensions.iter().any(|d| d.lower_bound != 1) {
        for dim in &array.dimensions {
            let upper = i64::from(dim.lower_bound) + i64::from(dim.length) - 1;
            buf.extend_from_slice(format!("[{}:{}]", dim.lower_bound, upper).as_bytes());
        }
        buf.push(b'=');
    }

    // group[i] is the number of elements spanned by one sub-array at depth i
    let mut group = Vec::with_capacity(array.dimensions.len());
    let mut span = 1_usize;
    for dim in array.dimensions.iter().rev() {
        span = span.saturating_mul(usize::try_from(dim.length).unwrap_or(0));
        group.push(span);
    }
    group.reverse();

    let mut scratch = Vec::new();
    for (i, element) in array.elements.iter().enumerate() {
        if i > 0 {
            buf.push(b',');
        }
        for &g in &group {
            if i % g == 0 {
                buf.push(b'{');
            }
        }

        scratch.clear();
        match element.encode_text(element_oid, &mut scratch)? {
            IsNull::Yes => buf.extend_from_slice(b"NULL"),
            IsNull::No => write_element(&scratch, buf),
        }

        for &g in &group {
            if (i + 1) % g == 0 {
                buf.push(b'}');
            }
        }
    }
    Ok(())
}

fn needs_quotes(value: &[u8]) -> bool {
    value.is_empty()
        || value.eq_ignore_ascii_case(b"null")
        || value
            .iter()
            .any(|&b| matches!(b, b'{' | b'}' | b',' | b'"' | b'\\') || is_space(b))
}

fn write_element(value: &[u8], buf: &mut Vec<u8>) {
    if !needs_quotes(value) {
        buf.extend_from_slice(value);
        return;
    }
    buf.push(b'"');
    for &b in value {
        if b == b'"' || b == b'\\' {
            buf.push(b'\\');
        }
        buf.push(b);
    }
    buf.push(b'"');
}

fn is_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | 0x0b | 0x0c)
}

// === Decoding ===

struct Token<'s> {
    text: Cow<'s, str>,
    quoted: bool,
}

struct Parser<'s> {
    input: &'s str,
    pos: usize,
    /// Sub-array length seen at each depth
    lengths: Vec<Option<usize>>,
    /// Depth of the innermost sub-arrays, once an element has been seen
    leaf_depth: Option<usize>,
    tokens: Vec<Token<'s>>,
}

impl<'s> Parser<'s> {
    fn new(input: &'s str) -> Self {
        Self {
            input,
            pos: 0,
            lengths: Vec::new(),
            leaf_depth: None,
            tokens: Vec::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_space(&mut self) {
        while self.peek().is_some_and(is_space) {
            self.pos += 1;
        }
    }

    fn expect(&mut self, want: u8) -> Result<()> {
        match self.bump() {
            Some(b) if b == want => Ok(()),
            Some(b) => Err(syntax(format_args!(
                "expected '{}' at byte {}, found '{}'",
                want as char,
                self.pos - 1,
                b as char
            ))),
            None => Err(syntax(format_args!("expected '{}', found end of input", want as char))),
        }
    }

    fn integer(&mut self) -> Result<i32> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        self.input
            .get(start..self.pos)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| syntax(format_args!("invalid bound at byte {}", start)))
    }

    /// `[lb:ub]` repeated, then `=`.
    fn bounds(&mut self) -> Result<Vec<(i32, i32)>> {
        let mut bounds = Vec::new();
        while self.peek() == Some(b'[') {
            self.pos += 1;
            let lower = self.integer()?;
            self.expect(b':')?;
            let upper = self.integer()?;
            self.expect(b']')?;
            bounds.push((lower, upper));
        }
        self.skip_space();
        self.expect(b'=')?;
        self.skip_space();
        Ok(bounds)
    }

    fn record_length(&mut self, depth: usize, len: usize) -> Result<()> {
        if self.lengths.len() <= depth {
            self.lengths.resize(depth + 1, None);
        }
        match self.lengths.get_mut(depth) {
            Some(slot @ None) => {
                *slot = Some(len);
                Ok(())
            }
            Some(Some(seen)) if *seen == len => Ok(()),
            _ => Err(syntax("sub-arrays must have matching dimensions")),
        }
    }

    fn list(&mut self, depth: usize) -> Result<()> {
        if depth >= MAX_DIMENSIONS {
            return Err(syntax(format_args!(
                "number of array dimensions exceeds the maximum allowed ({})",
                MAX_DIMENSIONS
            )));
        }
        self.expect(b'{')?;
        self.skip_space();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return self.record_length(depth, 0);
        }

        let mut len = 0;
        loop {
            self.skip_space();
            if self.peek() == Some(b'{') {
                if self.leaf_depth == Some(depth) {
                    return Err(syntax("cannot mix elements and sub-arrays"));
                }
                self.list(depth + 1)?;
            } else {
                match self.leaf_depth {
                    None => self.leaf_depth = Some(depth),
                    Some(d) if d == depth => {}
                    Some(_) => return Err(syntax("cannot mix elements and sub-arrays")),
                }
                let token = self.token()?;
                self.tokens.push(token);
            }
            len += 1;

            self.skip_space();
            match self.bump() {
                Some(b',') => {}
                Some(b'}') => break,
                Some(b) => {
                    return Err(syntax(format_args!(
                        "unexpected '{}' at byte {}",
                        b as char,
                        self.pos - 1
                    )));
                }
                None => return Err(syntax("unterminated array")),
            }
        }
        self.record_length(depth, len)
    }

    fn token(&mut self) -> Result<Token<'s>> {
        if self.peek() == Some(b'"') {
            self.pos += 1;
            return self.quoted();
        }

        let start = self.pos;
        let mut text = String::new();
        let mut escaped = false;
        // Length of `text` up to its last significant character
        let mut keep = 0;
        loop {
            match self.peek() {
                None => return Err(syntax("unterminated array")),
                Some(b',' | b'}') => break,
                Some(b'{' | b'"') => {
                    return Err(syntax(format_args!("unexpected character at byte {}", self.pos)));
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let ch = self.next_char().ok_or_else(|| syntax("unterminated escape"))?;
                    text.push(ch);
                    keep = text.len();
                    escaped = true;
                }
                Some(b) => {
                    let ch = self.next_char().ok_or_else(|| syntax("unterminated array"))?;
                    text.push(ch);
                    if !is_space(b) {
                        keep = text.len();
                    }
                }
            }
        }

        if keep == 0 {
            return Err(syntax(format_args!("empty element at byte {}", start)));
        }
        text.truncate(keep);
        let text = if escaped {
            Cow::Owned(text)
        } else {
            Cow::Borrowed(self.input.get(start..start + keep).unwrap_or_default())
        };
        Ok(Token { text, quoted: false })
    }

    fn quoted(&mut self) -> Result<Token<'s>> {
        let start = self.pos;
        let mut owned: Option<String> = None;
        loop {
            match self.peek() {
                None => return Err(syntax("unterminated quoted element")),
                Some(b'"') => {
                    let end = self.pos;
                    self.pos += 1;
                    let text = match owned {
                        Some(text) => Cow::Owned(text),
                        None => Cow::Borrowed(self.input.get(start..end).unwrap_or_default()),
                    };
                    return Ok(Token { text, quoted: true });
                }
                Some(b'\\') => {
                    let text = owned.get_or_insert_with(|| self.input.get(start..self.pos).unwrap_or_default().to_string());
                    self.pos += 1;
                    let ch = self.next_char().ok_or_else(|| syntax("unterminated escape"))?;
                    text.push(ch);
                }
                Some(_) => {
                    let ch = self.next_char().ok_or_else(|| syntax("unterminated quoted element"))?;
                    if let Some(text) = owned.as_mut() {
                        text.push(ch);
                    }
                }
            }
        }
    }

    fn next_char(&mut self) -> Option<char> {
        let ch = self.input.get(self.pos..)?.chars().next()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }
}

pub(super) fn decode<T>(array_oid: Oid, bytes: &[u8]) -> Result<Array<T>>
where
    T: for<'b> FromWireValue<'b>,
{
    let element_oid = match oid::array_element(array_oid) {
        Some(element) => element,
        None if array_oid == oid::UNSPECIFIED => oid::UNSPECIFIED,
        None => return Err(Error::Decode(format!("oid {} is not an array type", array_oid))),
    };

    let mut parser = Parser::new(utf8(bytes)?);
    parser.skip_space();
    let bounds = if parser.peek() == Some(b'[') {
        Some(parser.bounds()?)
    } else {
        None
    };
    parser.list(0)?;
    parser.skip_space();
    if parser.pos != parser.input.len() {
        return Err(syntax(format_args!("junk after closing brace at byte {}", parser.pos)));
    }

    let Some(leaf_depth) = parser.leaf_depth else {
        // Only empty braces, e.g. `{}` or `{{},{}}`.
        if bounds.as_ref().is_some_and(|b| !b.is_empty()) {
            return Err(syntax("bounds given for an empty array"));
        }
        return Ok(Array {
            elements: Vec::new(),
            dimensions: Vec::new(),
            status: ArrayStatus::Present,
        });
    };
    if parser.lengths.len() != leaf_depth + 1 {
        return Err(syntax("sub-arrays must have matching dimensions"));
    }

    let mut dimensions = Vec::with_capacity(parser.lengths.len());
    for len in &parser.lengths {
        let len = len.ok_or_else(|| syntax("sub-arrays must have matching dimensions"))?;
        let length = i32::try_from(len).map_err(|_| syntax("array too large"))?;
        dimensions.push(ArrayDimension::new(length));
    }

    if let Some(bounds) = bounds {
        if bounds.len() != dimensions.len() {
            return Err(syntax("bounds do not match the number of dimensions"));
        }
        for (dim, (lower, upper)) in dimensions.iter_mut().zip(bounds) {
            if i64::from(upper) - i64::from(lower) + 1 != i64::from(dim.length) {
                return Err(syntax("bounds do not match the array contents"));
            }
            dim.lower_bound = lower;
        }
    }

    if element_count(&dimensions)? != parser.tokens.len() {
        return Err(syntax("sub-arrays must have matching dimensions"));
    }

    let mut elements = Vec::with_capacity(parser.tokens.len());
    for token in &parser.tokens {
        let element = if !token.quoted && token.text.eq_ignore_ascii_case("NULL") {
            T::from_null()?
        } else {
            T::from_text(element_oid, token.text.as_bytes())?
        };
        elements.push(element);
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

    fn to_text<T: ToWireValue>(array: &Array<T>, element_oid: Oid) -> String {
        let mut buf = Vec::new();
        encode(array, element_oid, &mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn encode_nested() {
        let dims = vec![ArrayDimension::new(2), ArrayDimension::new(2)];
        let array = Array::new(vec![1_i32, 2, 3, 4], dims).unwrap();
        assert_eq!(to_text(&array, oid::INT4), "{{1,2},{3,4}}");

        let dims = vec![ArrayDimension::new(2), ArrayDimension::new(1), ArrayDimension::new(3)];
        let array = Array::new((1..=6).map(i64::from).collect(), dims).unwrap();
        assert_eq!(to_text(&array, oid::INT8), "{{{1,2,3}},{{4,5,6}}}");
    }

    #[test]
    fn encode_bounds_prefix() {
        let dims = vec![ArrayDimension {
            length: 2,
            lower_bound: 0,
        }];
        let array = Array::new(vec![true, false], dims).unwrap();
        assert_eq!(to_text(&array, oid::BOOL), "[0:1]={t,f}");
    }

    #[test]
    fn encode_quotes_and_nulls() {
        let array = Array::from(vec![
            Some("plain"),
            None,
            Some(""),
            Some("null"),
            Some("a b"),
            Some(r#"say "hi""#),
            Some(r"back\slash"),
            Some("{x,y}"),
        ]);
        assert_eq!(
            to_text(&array, oid::TEXT),
            r#"{plain,NULL,"","null","a b","say \"hi\"","back\\slash","{x,y}"}"#
        );
    }

    #[test]
    fn encode_empty() {
        assert_eq!(to_text(&Array::<i32>::from(vec![]), oid::INT4), "{}");
    }

    #[test]
    fn decode_nested_with_nulls() {
        let array: Array<Option<i32>> = decode(oid::INT4_ARRAY, b"{{1,NULL},{null,4}}").unwrap();
        assert_eq!(array.elements, vec![Some(1), None, None, Some(4)]);
        assert_eq!(
            array.dimensions,
            vec![ArrayDimension::new(2), ArrayDimension::new(2)]
        );
    }

    #[test]
    fn decode_quoted_elements() {
        let array: Array<Option<String>> =
            decode(oid::TEXT_ARRAY, br#"{"NULL", "a b" ,"q\"uote",plain\,comma,"",  x y  }"#).unwrap();
        assert_eq!(
            array.elements,
            vec![
                Some("NULL".to_string()),
                Some("a b".to_string()),
                Some("q\"uote".to_string()),
                Some("plain,comma".to_string()),
                Some(String::new()),
                Some("x y".to_string()),
            ]
        );
    }

    #[test]
    fn decode_bounds_prefix() {
        let array: Array<i16> = decode(oid::INT2_ARRAY, b"[-1:0][3:4]={{1,2},{3,4}}").unwrap();
        assert_eq!(array.elements, vec![1, 2, 3, 4]);
        assert_eq!(
            array.dimensions,
            vec![
                ArrayDimension {
                    length: 2,
                    lower_bound: -1
                },
                ArrayDimension {
                    length: 2,
                    lower_bound: 3
                },
            ]
        );

        assert!(decode::<i16>(oid::INT2_ARRAY, b"[1:3]={1,2}").is_err());
        assert!(decode::<i16>(oid::INT2_ARRAY, b"[1:2][1:1]={1,2}").is_err());
    }

    #[test]
    fn decode_empty() {
        for input in [&b"{}"[..], b" { } ", b"{{},{}}"] {
            let array: Array<i32> = decode(oid::INT4_ARRAY, input).unwrap();
            assert_eq!(array.status, ArrayStatus::Present);
            assert!(array.elements.is_empty());
            assert!(array.dimensions.is_empty());
        }
    }

    #[test]
    fn decode_rejects_ragged_and_malformed() {
        for input in [
            &b"{{1,2},{3}}"[..],
            b"{{1,2},3}",
            b"{1,{2,3}}",
            b"{{1},{{2}}}",
            b"{1,2",
            b"{1,,2}",
            b"{1,2}x",
            b"1,2",
            b"{\"1}",
        ] {
            assert!(
                decode::<i32>(oid::INT4_ARRAY, input).is_err(),
                "accepted {:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn decode_limits_nesting_depth() {
        let six = "{{{{{{1}}}}}}";
        let array: Array<i32> = decode(oid::INT4_ARRAY, six.as_bytes()).unwrap();
        assert_eq!(array.dimensions.len(), 6);

        assert!(matches!(
            decode::<i32>(oid::INT4_ARRAY, b"{{{{{{{1}}}}}}}"),
            Err(Error::Decode(_))
        ));

        let deep = format!("{}{}", "{".repeat(200_000), "}".repeat(200_000));
        assert!(matches!(
            decode::<i32>(oid::INT4_ARRAY, deep.as_bytes()),
            Err(Error::Decode(_))
        ));
    }

    #[test]
    fn decode_rejects_non_array_oid() {
        assert!(decode::<i32>(oid::INT4, b"{1}").is_err());
    }

    #[test]
    fn text_round_trip_preserves_shape() {
        let dims = vec![
            ArrayDimension {
                length: 1,
                lower_bound: 5,
            },
            ArrayDimension::new(3),
        ];
        let array = Array::new(
            vec![Some("a,b".to_string()), None, Some(" lead".to_string())],
            dims,
        )
        .unwrap();
        let text = to_text(&array, oid::TEXT);
        assert_eq!(text, r#"[5:5][1:3]={{"a,b",NULL," lead"}}"#);
        let back: Array<Option<String>> = decode(oid::TEXT_ARRAY, text.as_bytes()).unwrap();
        assert_eq!(back, array);
    }
}
