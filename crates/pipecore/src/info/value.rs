use super::{Information, Key, KeyKind};
use crate::DataHandle;
use std::fmt;
use std::sync::Arc;

/// Dynamic value stored under a [`Key`]
///
/// `Null` never lives in a store: setting it removes the entry.
#[derive(Debug, Clone)]
pub enum InfoValue {
    Null,
    Integer(i64),
    UnsignedLong(u64),
    Double(f64),
    String(String),
    IntegerVector(Vec<i64>),
    KeyVector(Vec<Key>),
    DataObject(DataHandle),
    Information(Information),
    InformationVector(Vec<Information>),
}

impl InfoValue {
    /// Kind this value can be stored under, `None` for `Null`.
    pub fn kind(&self) -> Option<KeyKind> {
        match self {
            InfoValue::Null => None,
            InfoValue::Integer(_) => Some(KeyKind::Integer),
            InfoValue::UnsignedLong(_) => Some(KeyKind::UnsignedLong),
            InfoValue::Double(_) => Some(KeyKind::Double),
            InfoValue::String(_) => Some(KeyKind::String),
            InfoValue::IntegerVector(_) => Some(KeyKind::IntegerVector),
            InfoValue::KeyVector(_) => Some(KeyKind::KeyVector),
            InfoValue::DataObject(_) => Some(KeyKind::DataObject),
            InfoValue::Information(_) => Some(KeyKind::Information),
            InfoValue::InformationVector(_) => Some(KeyKind::InformationVector),
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            InfoValue::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_unsigned_long(&self) -> Option<u64> {
        match self {
            InfoValue::UnsignedLong(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            InfoValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            InfoValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer_vector(&self) -> Option<&[i64]> {
        match self {
            InfoValue::IntegerVector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_key_vector(&self) -> Option<&[Key]> {
        match self {
            InfoValue::KeyVector(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_data_object(&self) -> Option<&DataHandle> {
        match self {
            InfoValue::DataObject(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_information(&self) -> Option<&Information> {
        match self {
            InfoValue::Information(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_information_vector(&self) -> Option<&[Information]> {
        match self {
            InfoValue::InformationVector(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, InfoValue::Null)
    }

    /// Number of elements for vector values, 1 for scalars, 0 for `Null`.
    pub fn element_count(&self) -> usize {
        match self {
            InfoValue::Null => 0,
            InfoValue::IntegerVector(v) => v.len(),
            InfoValue::KeyVector(v) => v.len(),
            InfoValue::InformationVector(v) => v.len(),
            _ => 1,
        }
    }
}

impl PartialEq for InfoValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (InfoValue::Null, InfoValue::Null) => true,
            (InfoValue::Integer(a), InfoValue::Integer(b)) => a == b,
            (InfoValue::UnsignedLong(a), InfoValue::UnsignedLong(b)) => a == b,
            (InfoValue::Double(a), InfoValue::Double(b)) => a == b,
            (InfoValue::String(a), InfoValue::String(b)) => a == b,
            (InfoValue::IntegerVector(a), InfoValue::IntegerVector(b)) => a == b,
            (InfoValue::KeyVector(a), InfoValue::KeyVector(b)) => a == b,
            // data objects are shared, so equality is identity
            (InfoValue::DataObject(a), InfoValue::DataObject(b)) => Arc::ptr_eq(a, b),
            (InfoValue::Information(a), InfoValue::Information(b)) => a == b,
            (InfoValue::InformationVector(a), InfoValue::InformationVector(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for InfoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InfoValue::Null => write!(f, "null"),
            InfoValue::Integer(v) => write!(f, "{}", v),
            InfoValue::UnsignedLong(v) => write!(f, "{}", v),
            InfoValue::Double(v) => write!(f, "{}", v),
            InfoValue::String(s) => write!(f, "{:?}", s),
            InfoValue::IntegerVector(v) => write!(f, "{:?}", v),
            InfoValue::KeyVector(v) => {
                let names: Vec<String> = v.iter().map(|k| k.to_string()).collect();
                write!(f, "[{}]", names.join(", "))
            }
            InfoValue::DataObject(d) => write!(f, "<{}>", d.data_type_name()),
            InfoValue::Information(i) => write!(f, "{{{} entries}}", i.len()),
            InfoValue::InformationVector(v) => write!(f, "[{} stores]", v.len()),
        }
    }
}

impl From<i64> for InfoValue {
    fn from(v: i64) -> Self {
        InfoValue::Integer(v)
    }
}

impl From<i32> for InfoValue {
    fn from(v: i32) -> Self {
        InfoValue::Integer(v as i64)
    }
}

impl From<usize> for InfoValue {
    fn from(v: usize) -> Self {
        InfoValue::Integer(v as i64)
    }
}

impl From<bool> for InfoValue {
    fn from(v: bool) -> Self {
        InfoValue::Integer(v as i64)
    }
}

impl From<u64> for InfoValue {
    fn from(v: u64) -> Self {
        InfoValue::UnsignedLong(v)
    }
}

impl From<f64> for InfoValue {
    fn from(v: f64) -> Self {
        InfoValue::Double(v)
    }
}

impl From<String> for InfoValue {
    fn from(s: String) -> Self {
        InfoValue::String(s)
    }
}

impl From<&str> for InfoValue {
    fn from(s: &str) -> Self {
        InfoValue::String(s.to_string())
    }
}

impl From<Vec<i64>> for InfoValue {
    fn from(v: Vec<i64>) -> Self {
        InfoValue::IntegerVector(v)
    }
}

impl From<&[i64]> for InfoValue {
    fn from(v: &[i64]) -> Self {
        InfoValue::IntegerVector(v.to_vec())
    }
}

impl From<Vec<Key>> for InfoValue {
    fn from(v: Vec<Key>) -> Self {
        InfoValue::KeyVector(v)
    }
}

impl From<DataHandle> for InfoValue {
    fn from(d: DataHandle) -> Self {
        InfoValue::DataObject(d)
    }
}

impl From<Information> for InfoValue {
    fn from(i: Information) -> Self {
        InfoValue::Information(i)
    }
}

impl From<Vec<Information>> for InfoValue {
    fn from(v: Vec<Information>) -> Self {
        InfoValue::InformationVector(v)
    }
}

impl<T: Into<InfoValue>> From<Option<T>> for InfoValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(InfoValue::Null)
    }
}
