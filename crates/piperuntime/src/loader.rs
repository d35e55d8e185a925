use crate::executive::ExecutiveKind;
use crate::registry::{AlgorithmConfig, AlgorithmRegistry};
use crate::runtime::{Pipeline, RuntimeConfig};
use pipecore::{AlgorithmId, ConfigurationError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Complete pipeline description, as stored in a JSON file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub settings: RuntimeConfig,
    #[serde(default)]
    pub algorithms: Vec<AlgorithmSpec>,
    #[serde(default)]
    pub connections: Vec<ConnectionSpec>,
}

impl PipelineSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            settings: RuntimeConfig::default(),
            algorithms: Vec::new(),
            connections: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn add_algorithm(&mut self, algorithm: AlgorithmSpec) -> &mut Self {
        self.algorithms.push(algorithm);
        self
    }

    /// Connect output port 0 of `from` to input port 0 of `to`.
    pub fn connect(&mut self, from: impl Into<String>, to: impl Into<String>) -> &mut Self {
        self.connections.push(ConnectionSpec {
            from: from.into(),
            from_port: 0,
            to: to.into(),
            to_port: 0,
        });
        self
    }

    pub fn find_algorithm(&self, name: &str) -> Option<&AlgorithmSpec> {
        self.algorithms.iter().find(|a| a.name == name)
    }
}

/// Algorithm entry in a pipeline description
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub algorithm_type: String,
    #[serde(default)]
    pub config: AlgorithmConfig,
    /// Executive kind; the pipeline default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executive: Option<ExecutiveKind>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub release_data: bool,
}

impl AlgorithmSpec {
    pub fn new(name: impl Into<String>, algorithm_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            algorithm_type: algorithm_type.into(),
            config: AlgorithmConfig::new(),
            executive: None,
            release_data: false,
        }
    }

    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn with_executive(mut self, kind: ExecutiveKind) -> Self {
        self.executive = Some(kind);
        self
    }

    pub fn with_release_data(mut self) -> Self {
        self.release_data = true;
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionSpec {
    pub from: String,
    #[serde(default)]
    pub from_port: usize,
    pub to: String,
    #[serde(default)]
    pub to_port: usize,
}

/// A pipeline built from a [`PipelineSpec`], with its name table.
pub struct LoadedPipeline {
    pub pipeline: Pipeline,
    pub names: HashMap<String, AlgorithmId>,
}

impl LoadedPipeline {
    pub fn get(&self, name: &str) -> Option<AlgorithmId> {
        self.names.get(name).copied()
    }

    pub fn require(&self, name: &str) -> Result<AlgorithmId> {
        self.get(name)
            .ok_or_else(|| ConfigurationError::UnknownName(name.to_string()).into())
    }
}

/// Instantiate every algorithm through `registry` and wire the connections.
pub fn load_pipeline(spec: &PipelineSpec, registry: &AlgorithmRegistry) -> Result<LoadedPipeline> {
    let mut pipeline = Pipeline::with_config(spec.settings.clone());
    let mut names = HashMap::new();

    for entry in &spec.algorithms {
        if names.contains_key(&entry.name) {
            let err = ConfigurationError::Invalid(format!("duplicate algorithm name '{}'", entry.name));
            tracing::error!("{}", err);
            return Err(err.into());
        }
        let algorithm = registry.create_algorithm(&entry.algorithm_type, &entry.config)?;
        let id = pipeline.add_named_algorithm(entry.name.clone(), algorithm);
        if let Some(kind) = entry.executive {
            let executive = pipeline.add_executive(kind);
            pipeline.set_executive(id, executive)?;
        }
        names.insert(entry.name.clone(), id);
    }

    let lookup = |name: &str| -> Result<AlgorithmId> {
        names.get(name).copied().ok_or_else(|| {
            let err = ConfigurationError::UnknownName(name.to_string());
            tracing::error!("{}", err);
            err.into()
        })
    };
    for connection in &spec.connections {
        let from = lookup(&connection.from)?;
        let to = lookup(&connection.to)?;
        let port = pipeline.output_port(from, connection.from_port)?;
        pipeline.add_input_connection(to, connection.to_port, &port)?;
    }

    for entry in spec.algorithms.iter().filter(|a| a.release_data) {
        let id = lookup(&entry.name)?;
        for port in 0..pipeline.number_of_output_ports(id)? {
            pipeline.set_release_data_flag(id, port, true)?;
        }
    }

    tracing::info!(
        "Loaded pipeline '{}' with {} algorithms and {} connections",
        spec.name,
        spec.algorithms.len(),
        spec.connections.len()
    );
    Ok(LoadedPipeline { pipeline, names })
}
