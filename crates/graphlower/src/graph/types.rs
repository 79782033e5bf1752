use std::collections::HashMap;

use super::{Graph, TensorType};

/// Read-only lookup of per-value static types.
///
/// Produced by whatever graph analysis runs ahead of decomposition. Decomposition only reads
/// it.
pub trait TypeInfo {
    fn lookup(&self, value: &str) -> Option<&TensorType>;
}

impl TypeInfo for HashMap<String, TensorType> {
    fn lookup(&self, value: &str) -> Option<&TensorType> {
        self.get(value)
    }
}

/// Owned type table keyed by value name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypeTable {
    entries: HashMap<String, TensorType>,
}

impl TypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the table with graph inputs, outputs, and initializers.
    pub fn from_graph(graph: &Graph) -> Self {
        let mut table = Self::new();
        for value in graph.inputs.iter().chain(graph.outputs.iter()) {
            table.insert(value.name.clone(), value.ty.clone());
        }
        for (name, literal) in &graph.initializers {
            table.insert(name.clone(), literal.tensor_type());
        }
        table
    }

    pub fn insert(&mut self, name: impl Into<String>, ty: TensorType) -> Option<TensorType> {
        self.entries.insert(name.into(), ty)
    }

    pub fn with(mut self, name: impl Into<String>, ty: TensorType) -> Self {
        self.insert(name, ty);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TensorType> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TypeInfo for TypeTable {
    fn lookup(&self, value: &str) -> Option<&TensorType> {
        self.entries.get(value)
    }
}

impl<T: TypeInfo + ?Sized> TypeInfo for &T {
    fn lookup(&self, value: &str) -> Option<&TensorType> {
        (**self).lookup(value)
    }
}
