//! Operator graph model consumed and produced by decomposition.
//!
//! Nodes reference values by name, the way ONNX graphs do. A value is produced by at most one
//! node output, a graph input, or an initializer.

mod tensor;
pub mod topology;
mod types;

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use tensor::{DType, DimSymbol, Dimension, Shape, TensorLiteral, TensorType};
pub use types::{TypeInfo, TypeTable};

/// Attribute payload attached to a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Int(i64),
    Float(f32),
    String(String),
    Ints(Vec<i64>),
    Floats(Vec<f32>),
    Strings(Vec<String>),
    Tensor(TensorLiteral),
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<f32> for AttributeValue {
    fn from(value: f32) -> Self {
        AttributeValue::Float(value)
    }
}

impl From<Vec<i64>> for AttributeValue {
    fn from(value: Vec<i64>) -> Self {
        AttributeValue::Ints(value)
    }
}

impl From<TensorLiteral> for AttributeValue {
    fn from(value: TensorLiteral) -> Self {
        AttributeValue::Tensor(value)
    }
}

/// One operator invocation.
///
/// Empty strings in `inputs` or `outputs` mark optional slots the producer left unset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    pub op_type: String,
    pub domain: String,
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl GraphNode {
    pub fn new(
        op_type: impl Into<String>,
        inputs: Vec<String>,
        outputs: Vec<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            op_type: op_type.into(),
            domain: String::new(),
            name: name.into(),
            inputs,
            outputs,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn attr(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }

    pub fn attr_int(&self, name: &str) -> Option<i64> {
        match self.attributes.get(name) {
            Some(AttributeValue::Int(value)) => Some(*value),
            _ => None,
        }
    }

    pub fn attr_float(&self, name: &str) -> Option<f32> {
        match self.attributes.get(name) {
            Some(AttributeValue::Float(value)) => Some(*value),
            Some(AttributeValue::Int(value)) => Some(*value as f32),
            _ => None,
        }
    }

    pub fn attr_ints(&self, name: &str) -> Option<&[i64]> {
        match self.attributes.get(name) {
            Some(AttributeValue::Ints(values)) => Some(values.as_slice()),
            _ => None,
        }
    }

    /// Returns input `index` unless it is missing or left empty.
    pub fn input(&self, index: usize) -> Option<&str> {
        self.inputs
            .get(index)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Returns output `index` unless it is missing or left empty.
    pub fn output(&self, index: usize) -> Option<&str> {
        self.outputs
            .get(index)
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }

    /// Output names that are actually bound, in declaration order.
    pub fn declared_outputs(&self) -> impl Iterator<Item = &str> {
        self.outputs
            .iter()
            .map(String::as_str)
            .filter(|name| !name.is_empty())
    }
}

/// Named, typed graph boundary value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueInfo {
    pub name: String,
    pub ty: TensorType,
}

impl ValueInfo {
    pub fn new(name: impl Into<String>, ty: TensorType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Debug, Error)]
pub enum GraphSerdeError {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("bincode error: {0}")]
    Bincode(#[from] bincode::Error),
}

/// Complete operator graph with boundary values and constant initializers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    pub name: String,
    pub inputs: Vec<ValueInfo>,
    pub outputs: Vec<ValueInfo>,
    pub initializers: BTreeMap<String, TensorLiteral>,
    pub nodes: Vec<GraphNode>,
}

impl Graph {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_input(mut self, name: impl Into<String>, ty: TensorType) -> Self {
        self.inputs.push(ValueInfo::new(name, ty));
        self
    }

    pub fn with_output(mut self, name: impl Into<String>, ty: TensorType) -> Self {
        self.outputs.push(ValueInfo::new(name, ty));
        self
    }

    pub fn with_initializer(mut self, name: impl Into<String>, literal: TensorLiteral) -> Self {
        self.initializers.insert(name.into(), literal);
        self
    }

    pub fn with_node(mut self, node: GraphNode) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn initializer(&self, name: &str) -> Option<&TensorLiteral> {
        self.initializers.get(name)
    }

    /// Returns the literal a value resolves to, either as an initializer or as the output of a
    /// `Constant` node.
    pub fn constant_value(&self, name: &str) -> Option<&TensorLiteral> {
        if let Some(literal) = self.initializers.get(name) {
            return Some(literal);
        }
        self.nodes
            .iter()
            .filter(|node| node.op_type == "Constant")
            .find(|node| node.outputs.iter().any(|output| output == name))
            .and_then(|node| match node.attr("value") {
                Some(AttributeValue::Tensor(literal)) => Some(literal),
                _ => None,
            })
    }

    /// Every value and node name in use anywhere in the graph.
    pub fn value_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        names.extend(self.inputs.iter().map(|value| value.name.clone()));
        names.extend(self.outputs.iter().map(|value| value.name.clone()));
        names.extend(self.initializers.keys().cloned());
        for node in &self.nodes {
            names.insert(node.name.clone());
            names.extend(node.inputs.iter().filter(|n| !n.is_empty()).cloned());
            names.extend(node.outputs.iter().filter(|n| !n.is_empty()).cloned());
        }
        names
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, GraphSerdeError> {
        bincode::serialize(self).map_err(GraphSerdeError::from)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, GraphSerdeError> {
        bincode::deserialize(bytes).map_err(GraphSerdeError::from)
    }

    pub fn to_json_string(&self) -> Result<String, GraphSerdeError> {
        serde_json::to_string_pretty(self).map_err(GraphSerdeError::from)
    }
}
