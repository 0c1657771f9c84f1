//! Static flow definitions.
//!
//! Flows are defined in YAML and consist of named steps, each declaring the
//! steps it depends on and the property references it reads at run time.
//! Definitions carry no executable behavior: actions are bound by name when a
//! flow manager is constructed.

pub mod dependencies;

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use dependencies::{resolve, ConfigError, Dependent};

/// Addresses a value inside the reference store.
///
/// The resource usually names the step whose output is read, optionally
/// suffixed with a namespace such as `first.response` or `first.header`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyReference {
    /// Resource holding the referenced value
    pub resource: String,

    /// Dot-joined property path inside the resource
    #[serde(default)]
    pub path: String,
}

impl PropertyReference {
    /// Create a new property reference
    pub fn new(resource: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            path: path.into(),
        }
    }

    /// The base resource name with any namespace suffix stripped,
    /// e.g. `first.header` -> `first`
    pub fn resource_base(&self) -> &str {
        self.resource.split('.').next().unwrap_or(&self.resource)
    }
}

/// A single step inside a flow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Step name (unique within the flow)
    pub name: String,

    /// Names of steps that must complete before this one starts
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Property references this step reads at run time
    #[serde(default)]
    pub references: Vec<PropertyReference>,
}

/// A complete flow definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowDefinition {
    /// Flow name (unique within a manifest)
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    /// Names of flows that must be constructed before this one
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Steps executed by this flow
    pub steps: Vec<StepDefinition>,
}

impl FlowDefinition {
    /// Load a flow definition from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|err| ConfigError::Invalid {
            message: format!("failed to read flow file {}: {}", path.display(), err),
        })?;

        Self::from_yaml(&content)
    }

    /// Parse a flow definition from YAML content
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|err| ConfigError::Invalid {
            message: format!("failed to parse flow YAML: {}", err),
        })
    }

    /// Validate the flow definition
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid {
                message: "flow name cannot be empty".to_string(),
            });
        }

        if self.steps.is_empty() {
            return Err(ConfigError::Invalid {
                message: format!("flow '{}' must have at least one step", self.name),
            });
        }

        let mut seen = HashSet::new();

        for step in &self.steps {
            if step.name.is_empty() {
                return Err(ConfigError::Invalid {
                    message: format!("flow '{}' contains a step with an empty name", self.name),
                });
            }

            if !seen.insert(step.name.as_str()) {
                return Err(ConfigError::Invalid {
                    message: format!(
                        "flow '{}' contains duplicate step '{}'",
                        self.name, step.name
                    ),
                });
            }
        }

        Ok(())
    }
}

impl Dependent for FlowDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn depends_on(&self) -> &[String] {
        &self.depends_on
    }
}

impl Dependent for StepDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn depends_on(&self) -> &[String] {
        &self.depends_on
    }
}

/// A collection of flow definitions with flow-to-flow ordering
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Manifest {
    /// Flows declared inside this manifest
    #[serde(default)]
    pub flows: Vec<FlowDefinition>,
}

impl Manifest {
    /// Parse a manifest from YAML content
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|err| ConfigError::Invalid {
            message: format!("failed to parse manifest YAML: {}", err),
        })
    }

    /// Resolve flow-to-flow dependencies and return the flows in an order
    /// that constructs every flow after all of its dependencies.
    ///
    /// Uses the same resolution algorithm applied to steps inside a flow.
    pub fn resolution_order(&self) -> Result<Vec<usize>, ConfigError> {
        let resolved = resolve("manifest", &self.flows)?;

        let mut order = Vec::with_capacity(self.flows.len());
        let mut placed = vec![false; self.flows.len()];

        fn place(
            index: usize,
            resolved: &[Vec<usize>],
            placed: &mut [bool],
            order: &mut Vec<usize>,
        ) {
            if placed[index] {
                return;
            }

            placed[index] = true;
            for &dependency in &resolved[index] {
                place(dependency, resolved, placed, order);
            }

            order.push(index);
        }

        for index in 0..self.flows.len() {
            place(index, &resolved, &mut placed, &mut order);
        }

        Ok(order)
    }
}
