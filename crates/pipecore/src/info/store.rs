use super::{InfoValue, Key, KeyKind};
use crate::DataHandle;
use std::collections::HashMap;
use std::fmt;

/// One store per port or per connection, in port/connection order.
pub type InformationVector = Vec<Information>;

/// Mutable mapping from [`Key`] to [`InfoValue`].
///
/// A key maps to at most one value. Values whose kind does not match the
/// key's declared kind are rejected with a warning rather than stored.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Information {
    entries: HashMap<Key, InfoValue>,
}

impl Information {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key`. A `Null` value removes the entry.
    pub fn set(&mut self, key: Key, value: impl Into<InfoValue>) {
        let value = value.into();
        match value.kind() {
            None => {
                self.entries.remove(&key);
            }
            Some(kind) if kind == key.kind() => {
                self.entries.insert(key, value);
            }
            Some(kind) => {
                tracing::warn!(
                    key = %key,
                    expected = ?key.kind(),
                    actual = ?kind,
                    "Ignoring value of mismatched kind"
                );
            }
        }
    }

    /// Store `value` under `key`, or remove the entry when `None`.
    pub fn set_option<T: Into<InfoValue>>(&mut self, key: Key, value: Option<T>) {
        self.set(key, InfoValue::from(value));
    }

    pub fn get(&self, key: Key) -> Option<&InfoValue> {
        self.entries.get(&key)
    }

    pub fn has(&self, key: Key) -> bool {
        self.entries.contains_key(&key)
    }

    pub fn remove(&mut self, key: Key) -> Option<InfoValue> {
        self.entries.remove(&key)
    }

    pub fn get_integer(&self, key: Key) -> Option<i64> {
        self.get(key).and_then(InfoValue::as_integer)
    }

    /// Integer entries used as flags; absent means `false`.
    pub fn get_flag(&self, key: Key) -> bool {
        self.get_integer(key).map(|v| v != 0).unwrap_or(false)
    }

    pub fn get_unsigned_long(&self, key: Key) -> Option<u64> {
        self.get(key).and_then(InfoValue::as_unsigned_long)
    }

    pub fn get_double(&self, key: Key) -> Option<f64> {
        self.get(key).and_then(InfoValue::as_double)
    }

    pub fn get_string(&self, key: Key) -> Option<&str> {
        self.get(key).and_then(InfoValue::as_str)
    }

    pub fn get_integer_vector(&self, key: Key) -> Option<&[i64]> {
        self.get(key).and_then(InfoValue::as_integer_vector)
    }

    pub fn get_key_vector(&self, key: Key) -> Option<&[Key]> {
        self.get(key).and_then(InfoValue::as_key_vector)
    }

    pub fn get_data_object(&self, key: Key) -> Option<&DataHandle> {
        self.get(key).and_then(InfoValue::as_data_object)
    }

    pub fn get_information(&self, key: Key) -> Option<&Information> {
        self.get(key).and_then(InfoValue::as_information)
    }

    pub fn get_information_vector(&self, key: Key) -> Option<&[Information]> {
        self.get(key).and_then(InfoValue::as_information_vector)
    }

    /// Mutable access to a nested information vector entry, created on demand.
    pub fn information_vector_mut(&mut self, key: Key) -> Option<&mut Vec<Information>> {
        if key.kind() != KeyKind::InformationVector {
            tracing::warn!(key = %key, "Key does not hold an information vector");
            return None;
        }
        let entry = self
            .entries
            .entry(key)
            .or_insert_with(|| InfoValue::InformationVector(Vec::new()));
        match entry {
            InfoValue::InformationVector(v) => Some(v),
            _ => None,
        }
    }

    /// Length of a vector-valued entry; 0 when absent or not a vector.
    pub fn length(&self, key: Key) -> usize {
        if !key.kind().is_vector() {
            return 0;
        }
        self.get(key).map(InfoValue::element_count).unwrap_or(0)
    }

    pub fn append_integer(&mut self, key: Key, value: i64) {
        if key.kind() != KeyKind::IntegerVector {
            tracing::warn!(key = %key, "Cannot append an integer to this key");
            return;
        }
        if let InfoValue::IntegerVector(v) = self
            .entries
            .entry(key)
            .or_insert_with(|| InfoValue::IntegerVector(Vec::new()))
        {
            v.push(value);
        }
    }

    /// Append a key to a key-vector entry, skipping keys already listed.
    pub fn append_key(&mut self, key: Key, value: Key) {
        if key.kind() != KeyKind::KeyVector {
            tracing::warn!(key = %key, "Cannot append a key to this key");
            return;
        }
        if let InfoValue::KeyVector(v) = self
            .entries
            .entry(key)
            .or_insert_with(|| InfoValue::KeyVector(Vec::new()))
        {
            if !v.contains(&value) {
                v.push(value);
            }
        }
    }

    pub fn append_information(&mut self, key: Key, value: Information) {
        if let Some(v) = self.information_vector_mut(key) {
            v.push(value);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Replace every entry with the entries of `from`; `None` clears.
    pub fn copy(&mut self, from: Option<&Information>) {
        match from {
            Some(from) => self.entries = from.entries.clone(),
            None => self.entries.clear(),
        }
    }

    /// Copy one entry from `from`, removing it here if `from` lacks it.
    pub fn copy_entry(&mut self, from: &Information, key: Key) {
        match from.entries.get(&key) {
            Some(value) => {
                self.entries.insert(key, value.clone());
            }
            None => {
                self.entries.remove(&key);
            }
        }
    }

    /// Copy every entry named by the key vector stored in `from` under `keys`.
    pub fn copy_entries(&mut self, from: &Information, keys: Key) {
        let Some(listed) = from.get_key_vector(keys) else {
            return;
        };
        for key in listed.to_vec() {
            self.copy_entry(from, key);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = Key> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Key, &InfoValue)> + '_ {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Display for Information {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut lines: Vec<String> = self
            .entries
            .iter()
            .map(|(key, value)| format!("{}: {}", key, value))
            .collect();
        lines.sort();
        for line in lines {
            writeln!(f, "{}", line)?;
        }
        Ok(())
    }
}
