use pipecore::{Algorithm, AlgorithmError, ConfigurationError};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Raw per-algorithm configuration as read from a pipeline file.
pub type AlgorithmConfig = HashMap<String, serde_json::Value>;

/// Factory trait for creating algorithm instances
pub trait AlgorithmFactory: Send + Sync {
    /// Create a new instance of the algorithm with given configuration
    fn create(&self, config: &AlgorithmConfig) -> Result<Box<dyn Algorithm>, AlgorithmError>;

    /// Get algorithm type identifier
    fn algorithm_type(&self) -> &str;

    fn metadata(&self) -> AlgorithmMetadata {
        AlgorithmMetadata::default()
    }
}

/// Metadata about an algorithm type
#[derive(Debug, Clone, Serialize)]
pub struct AlgorithmMetadata {
    pub description: String,
    pub category: String,
    pub inputs: Vec<PortDefinition>,
    pub outputs: Vec<PortDefinition>,
}

impl Default for AlgorithmMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PortDefinition {
    pub name: String,
    pub description: String,
    pub data_type: String,
    pub optional: bool,
    pub repeatable: bool,
}

impl PortDefinition {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            data_type: data_type.into(),
            optional: false,
            repeatable: false,
        }
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn repeatable(mut self) -> Self {
        self.repeatable = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Registry of available algorithm types
pub struct AlgorithmRegistry {
    factories: HashMap<String, Arc<dyn AlgorithmFactory>>,
}

impl AlgorithmRegistry {
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register an algorithm factory
    pub fn register(&mut self, factory: Arc<dyn AlgorithmFactory>) {
        let algorithm_type = factory.algorithm_type().to_string();
        tracing::info!("Registering algorithm type: {}", algorithm_type);
        self.factories.insert(algorithm_type, factory);
    }

    /// Create an algorithm instance from a type name and config
    pub fn create_algorithm(
        &self,
        algorithm_type: &str,
        config: &AlgorithmConfig,
    ) -> Result<Box<dyn Algorithm>, ConfigurationError> {
        let factory = self
            .factories
            .get(algorithm_type)
            .ok_or_else(|| ConfigurationError::UnknownAlgorithmType(algorithm_type.to_string()))?;

        factory.create(config).map_err(|e| {
            ConfigurationError::Invalid(format!("Failed to create {}: {}", algorithm_type, e))
        })
    }

    /// Registered algorithm types, sorted
    pub fn list_algorithm_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn get_metadata(&self, algorithm_type: &str) -> Option<AlgorithmMetadata> {
        self.factories.get(algorithm_type).map(|f| f.metadata())
    }

    pub fn contains(&self, algorithm_type: &str) -> bool {
        self.factories.contains_key(algorithm_type)
    }
}

impl Default for AlgorithmRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::test_support::CountingSource;

    struct CountingSourceFactory;

    impl AlgorithmFactory for CountingSourceFactory {
        fn create(&self, config: &AlgorithmConfig) -> Result<Box<dyn Algorithm>, AlgorithmError> {
            if config.contains_key("fail") {
                return Err(AlgorithmError::Configuration("asked to fail".to_string()));
            }
            Ok(Box::new(CountingSource::default()))
        }

        fn algorithm_type(&self) -> &str {
            "test.source"
        }
    }

    #[test]
    fn test_create_registered_algorithm() {
        let mut registry = AlgorithmRegistry::new();
        registry.register(Arc::new(CountingSourceFactory));

        let algorithm = registry
            .create_algorithm("test.source", &AlgorithmConfig::new())
            .unwrap();
        assert_eq!(algorithm.algorithm_type(), "test.source");
        assert_eq!(registry.list_algorithm_types(), vec!["test.source".to_string()]);
        assert_eq!(registry.get_metadata("test.source").unwrap().category, "general");
    }

    #[test]
    fn test_unknown_type_and_factory_failure() {
        let mut registry = AlgorithmRegistry::new();
        registry.register(Arc::new(CountingSourceFactory));

        assert!(matches!(
            registry.create_algorithm("missing", &AlgorithmConfig::new()),
            Err(ConfigurationError::UnknownAlgorithmType(_))
        ));

        let mut config = AlgorithmConfig::new();
        config.insert("fail".to_string(), serde_json::Value::Bool(true));
        assert!(matches!(
            registry.create_algorithm("test.source", &config),
            Err(ConfigurationError::Invalid(_))
        ));
    }
}
