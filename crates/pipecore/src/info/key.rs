use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, OnceLock};

/// Semantic type of the value stored under a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyKind {
    Integer,
    UnsignedLong,
    Double,
    String,
    IntegerVector,
    KeyVector,
    DataObject,
    Information,
    InformationVector,
}

impl KeyKind {
    pub fn is_vector(&self) -> bool {
        matches!(
            self,
            KeyKind::IntegerVector | KeyKind::KeyVector | KeyKind::InformationVector
        )
    }
}

#[derive(Debug)]
struct KeyDescriptor {
    name: &'static str,
    location: &'static str,
    kind: KeyKind,
}

type KeyTable = HashMap<(String, String), &'static KeyDescriptor>;

fn key_table() -> &'static Mutex<KeyTable> {
    static TABLE: OnceLock<Mutex<KeyTable>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Handle to a process-wide key descriptor.
///
/// Two keys are equal iff they refer to the same descriptor. Interning the
/// same `(location, name)` pair twice yields the same descriptor, so the
/// string identity is stable while comparisons stay pointer-cheap.
#[derive(Clone, Copy)]
pub struct Key(&'static KeyDescriptor);

impl Key {
    /// Intern a key, returning the existing handle if one is registered.
    pub fn intern(name: &str, location: &str, kind: KeyKind) -> Key {
        let mut table = key_table()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(existing) = table.get(&(location.to_string(), name.to_string())) {
            if existing.kind != kind {
                tracing::error!(
                    key = %format!("{}::{}", location, name),
                    registered = ?existing.kind,
                    requested = ?kind,
                    "Key re-interned with a different kind; keeping the registered kind"
                );
            }
            return Key(*existing);
        }

        let descriptor: &'static KeyDescriptor = Box::leak(Box::new(KeyDescriptor {
            name: Box::leak(name.to_owned().into_boxed_str()),
            location: Box::leak(location.to_owned().into_boxed_str()),
            kind,
        }));
        table.insert((location.to_string(), name.to_string()), descriptor);
        Key(descriptor)
    }

    /// Find an already interned key by its string identity.
    pub fn lookup(location: &str, name: &str) -> Option<Key> {
        let table = key_table()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        table
            .get(&(location.to_string(), name.to_string()))
            .map(|descriptor| Key(*descriptor))
    }

    pub fn name(&self) -> &'static str {
        self.0.name
    }

    pub fn location(&self) -> &'static str {
        self.0.location
    }

    pub fn kind(&self) -> KeyKind {
        self.0.kind
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (self.0 as *const KeyDescriptor as usize).hash(state);
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({}::{})", self.0.location, self.0.name)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.0.location, self.0.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_returns_same_identity() {
        let a = Key::intern("SAME", "KeyTests", KeyKind::Integer);
        let b = Key::intern("SAME", "KeyTests", KeyKind::Integer);
        assert_eq!(a, b);
        assert_eq!(Key::lookup("KeyTests", "SAME"), Some(a));
    }

    #[test]
    fn test_distinct_locations_are_distinct_keys() {
        let a = Key::intern("NAME", "KeyTestsA", KeyKind::Integer);
        let b = Key::intern("NAME", "KeyTestsB", KeyKind::Integer);
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "KeyTestsA::NAME");
    }

    #[test]
    fn test_reintern_with_other_kind_keeps_original() {
        let a = Key::intern("KIND", "KeyTests", KeyKind::String);
        let b = Key::intern("KIND", "KeyTests", KeyKind::Double);
        assert_eq!(a, b);
        assert_eq!(b.kind(), KeyKind::String);
    }
}
