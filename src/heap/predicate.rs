use std::cmp::Ordering;
use std::str::FromStr;

use super::error::{HeapError, HeapResult};

/// Attribute type a scan predicate decodes its window as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    /// Raw bytes, compared lexicographically
    String,
    /// 4-byte little-endian i32
    Integer,
    /// 4-byte little-endian f32
    Float,
}

impl Datatype {
    /// Required attribute width, if the type has one
    pub fn fixed_width(self) -> Option<usize> {
        match self {
            Datatype::String => None,
            Datatype::Integer | Datatype::Float => Some(4),
        }
    }
}

impl FromStr for Datatype {
    type Err = HeapError;

    fn from_str(s: &str) -> HeapResult<Self> {
        match s.to_ascii_uppercase().as_str() {
            "STRING" => Ok(Datatype::String),
            "INTEGER" => Ok(Datatype::Integer),
            "FLOAT" => Ok(Datatype::Float),
            _ => Err(HeapError::BadScanParam(format!("unknown datatype '{s}'"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Lte,
    Eq,
    Gte,
    Gt,
    Ne,
}

impl Operator {
    /// Apply the operator to `attribute <=> literal`. `None` means the two
    /// are unordered (a NaN float difference), which only `Ne` accepts.
    fn accepts(self, ordering: Option<Ordering>) -> bool {
        match self {
            Operator::Lt => ordering == Some(Ordering::Less),
            Operator::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            Operator::Eq => ordering == Some(Ordering::Equal),
            Operator::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            Operator::Gt => ordering == Some(Ordering::Greater),
            Operator::Ne => ordering != Some(Ordering::Equal),
        }
    }
}

impl FromStr for Operator {
    type Err = HeapError;

    fn from_str(s: &str) -> HeapResult<Self> {
        match s {
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            "=" => Ok(Operator::Eq),
            ">=" => Ok(Operator::Gte),
            ">" => Ok(Operator::Gt),
            "!=" | "<>" => Ok(Operator::Ne),
            _ => Err(HeapError::BadScanParam(format!("unknown operator '{s}'"))),
        }
    }
}

/// Single-attribute filter: the `length` bytes at `offset` of each record,
/// decoded as `datatype`, compared against `literal` with `op`.
#[derive(Debug, Clone, Copy)]
pub struct ScanPredicate<'a> {
    offset: usize,
    length: usize,
    datatype: Datatype,
    literal: &'a [u8],
    op: Operator,
}

impl<'a> ScanPredicate<'a> {
    pub fn new(
        offset: usize,
        length: usize,
        datatype: Datatype,
        literal: &'a [u8],
        op: Operator,
    ) -> HeapResult<Self> {
        if length == 0 {
            return Err(HeapError::BadScanParam(
                "attribute length must be at least 1".to_string(),
            ));
        }
        if let Some(width) = datatype.fixed_width()
            && length != width
        {
            return Err(HeapError::BadScanParam(format!(
                "{datatype:?} attributes are {width} bytes, got length {length}"
            )));
        }
        if literal.len() < length {
            return Err(HeapError::BadScanParam(format!(
                "literal holds {} bytes, attribute length is {length}",
                literal.len()
            )));
        }

        Ok(Self {
            offset,
            length,
            datatype,
            literal,
            op,
        })
    }

    /// Whether a record satisfies the predicate. Records too short to hold
    /// the attribute never match.
    pub fn matches(&self, record: &[u8]) -> bool {
        let Some(end) = self.offset.checked_add(self.length) else {
            return false;
        };
        let Some(attribute) = record.get(self.offset..end) else {
            return false;
        };
        let literal = &self.literal[..self.length];

        let ordering = match self.datatype {
            Datatype::Integer => {
                let diff = i64::from(decode_i32(attribute)) - i64::from(decode_i32(literal));
                Some(diff.cmp(&0))
            }
            Datatype::Float => {
                // exact comparison against zero, no tolerance
                let diff = decode_f32(attribute) - decode_f32(literal);
                diff.partial_cmp(&0.0)
            }
            Datatype::String => Some(attribute.cmp(literal)),
        };

        self.op.accepts(ordering)
    }
}

fn decode_i32(bytes: &[u8]) -> i32 {
    i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn decode_f32(bytes: &[u8]) -> f32 {
    f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}
