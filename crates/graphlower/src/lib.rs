//! Lowering of composite tensor operators into primitive operators.
//!
//! [`decompose::Decomposer`] rewrites one node at a time; [`decompose::decompose_graph`] applies
//! it across a whole graph. [`registry`] publishes which operators the kernel code generator
//! accepts natively.

pub mod decompose;
pub mod env;
pub mod graph;
pub mod hashing;
pub mod profiling;
pub mod registry;

pub use decompose::{CompositeOp, DecomposeError, DecomposeResult, Decomposer};
pub use graph::{
    AttributeValue, DType, Dimension, Graph, GraphNode, Shape, TensorLiteral, TensorType,
    TypeInfo, TypeTable, ValueInfo,
};
