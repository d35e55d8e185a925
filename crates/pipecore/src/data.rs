use crate::ConfigurationError;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Root of the data-type hierarchy.
pub const DATA_OBJECT_TYPE: &str = "DataObject";

/// Data produced by an algorithm and exchanged through information stores.
///
/// Concrete containers live outside this crate; the pipeline only needs the
/// type name for port validation and `Any` for consumers to downcast.
pub trait DataObject: Send + Sync + fmt::Debug + Any {
    fn data_type_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;
}

/// Shared, reference-counted handle to a data object.
pub type DataHandle = Arc<dyn DataObject>;

pub fn downcast_data<T: DataObject>(handle: &DataHandle) -> Option<&T> {
    handle.as_any().downcast_ref::<T>()
}

/// Single-inheritance hierarchy of data-type names.
#[derive(Debug, Clone)]
pub struct TypeHierarchy {
    parents: HashMap<String, Option<String>>,
}

impl TypeHierarchy {
    /// Hierarchy with the built-in dataset types registered.
    pub fn new() -> Self {
        let mut hierarchy = Self {
            parents: HashMap::new(),
        };
        hierarchy.parents.insert(DATA_OBJECT_TYPE.to_string(), None);
        for (name, parent) in [
            ("DataSet", DATA_OBJECT_TYPE),
            ("Table", DATA_OBJECT_TYPE),
            ("ImageData", "DataSet"),
            ("RectilinearGrid", "DataSet"),
            ("StructuredGrid", "DataSet"),
            ("PolyData", "DataSet"),
            ("UnstructuredGrid", "DataSet"),
        ] {
            hierarchy
                .parents
                .insert(name.to_string(), Some(parent.to_string()));
        }
        hierarchy
    }

    /// Register `name` as a subtype of `parent`. The parent must be known.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        parent: &str,
    ) -> Result<(), ConfigurationError> {
        if !self.parents.contains_key(parent) {
            return Err(ConfigurationError::Invalid(format!(
                "unknown parent data type '{}'",
                parent
            )));
        }
        self.parents.insert(name.into(), Some(parent.to_string()));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.parents.contains_key(name)
    }

    /// True when `actual` is `required` or one of its descendants.
    pub fn is_type_of(&self, actual: &str, required: &str) -> bool {
        let mut current = Some(actual);
        while let Some(name) = current {
            if name == required {
                return true;
            }
            current = self.parents.get(name).and_then(|p| p.as_deref());
        }
        false
    }
}

impl Default for TypeHierarchy {
    fn default() -> Self {
        Self::new()
    }
}
