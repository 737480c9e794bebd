//! Bencode decoder sized for torrent metainfo.

use std::collections::BTreeMap;
use std::ops::Range;

use crate::error::MetainfoError;

const MAX_DEPTH: usize = 64;

/// Decoded bencode value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Value {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    Dict(BTreeMap<Vec<u8>, Value>),
}

impl Value {
    pub(crate) const fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub(crate) fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub(crate) fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub(crate) const fn as_dict(&self) -> Option<&BTreeMap<Vec<u8>, Value>> {
        match self {
            Self::Dict(map) => Some(map),
            _ => None,
        }
    }

    pub(crate) fn as_text(&self) -> Option<String> {
        self.as_bytes()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Result of decoding a metainfo document.
#[derive(Debug)]
pub(crate) struct Decoded {
    pub(crate) value: Value,
    /// Byte range of the top-level `info` value, which the content hash covers.
    pub(crate) info_span: Option<Range<usize>>,
}

pub(crate) fn decode(input: &[u8]) -> Result<Decoded, MetainfoError> {
    let mut parser = Parser {
        input,
        pos: 0,
        info_span: None,
    };
    let value = parser.value(0)?;
    if parser.pos != input.len() {
        return Err(MetainfoError::TrailingData { offset: parser.pos });
    }
    Ok(Decoded {
        value,
        info_span: parser.info_span,
    })
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    info_span: Option<Range<usize>>,
}

impl Parser<'_> {
    fn value(&mut self, depth: usize) -> Result<Value, MetainfoError> {
        if depth > MAX_DEPTH {
            return Err(MetainfoError::TooDeep);
        }
        match self.peek()? {
            b'i' => self.int().map(Value::Int),
            b'l' => self.list(depth),
            b'd' => self.dict(depth),
            b'0'..=b'9' => self.bytes().map(Value::Bytes),
            byte => Err(MetainfoError::UnexpectedByte {
                byte,
                offset: self.pos,
            }),
        }
    }

    fn int(&mut self) -> Result<i64, MetainfoError> {
        let start = self.pos + 1;
        let end = self.find(b'e', start)?;
        let digits = &self.input[start..end];
        let unsigned = digits.strip_prefix(b"-").unwrap_or(digits);
        let canonical = !unsigned.is_empty()
            && unsigned.iter().all(u8::is_ascii_digit)
            && (unsigned == b"0" || unsigned[0] != b'0')
            && digits != b"-0";
        if !canonical {
            return Err(MetainfoError::InvalidInteger { offset: start });
        }
        let value = std::str::from_utf8(digits)
            .ok()
            .and_then(|text| text.parse::<i64>().ok())
            .ok_or(MetainfoError::InvalidInteger { offset: start })?;
        self.pos = end + 1;
        Ok(value)
    }

    fn bytes(&mut self) -> Result<Vec<u8>, MetainfoError> {
        let start = self.pos;
        let colon = self.find(b':', start)?;
        let digits = &self.input[start..colon];
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) {
            return Err(MetainfoError::InvalidInteger { offset: start });
        }
        let len = std::str::from_utf8(digits)
            .ok()
            .and_then(|text| text.parse::<usize>().ok())
            .ok_or(MetainfoError::InvalidInteger { offset: start })?;
        let body_start = colon + 1;
        let body_end = body_start
            .checked_add(len)
            .filter(|end| *end <= self.input.len())
            .ok_or(MetainfoError::Truncated {
                offset: self.input.len(),
            })?;
        self.pos = body_end;
        Ok(self.input[body_start..body_end].to_vec())
    }

    fn list(&mut self, depth: usize) -> Result<Value, MetainfoError> {
        self.pos += 1;
        let mut items = Vec::new();
        while self.peek()? != b'e' {
            items.push(self.value(depth + 1)?);
        }
        self.pos += 1;
        Ok(Value::List(items))
    }

    fn dict(&mut self, depth: usize) -> Result<Value, MetainfoError> {
        self.pos += 1;
        let mut map = BTreeMap::new();
        loop {
            let next = self.peek()?;
            if next == b'e' {
                break;
            }
            if !next.is_ascii_digit() {
                return Err(MetainfoError::UnexpectedByte {
                    byte: next,
                    offset: self.pos,
                });
            }
            let key = self.bytes()?;
            let value_start = self.pos;
            let value = self.value(depth + 1)?;
            if depth == 0 && key == b"info" {
                self.info_span = Some(value_start..self.pos);
            }
            map.insert(key, value);
        }
        self.pos += 1;
        Ok(Value::Dict(map))
    }

    fn peek(&self) -> Result<u8, MetainfoError> {
        self.input
            .get(self.pos)
            .copied()
            .ok_or(MetainfoError::Truncated { offset: self.pos })
    }

    fn find(&self, needle: u8, from: usize) -> Result<usize, MetainfoError> {
        self.input
            .get(from..)
            .and_then(|rest| rest.iter().position(|byte| *byte == needle))
            .map(|index| from + index)
            .ok_or(MetainfoError::Truncated {
                offset: self.input.len(),
            })
    }
}
