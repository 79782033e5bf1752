//! Rewrites composite operators into sequences of primitive operators.
//!
//! Each rule is a pure function of the node, its attributes, and the static types of its
//! inputs. The replacement list is ordered def-before-use and ends with the node(s) that write
//! the original node's declared outputs, so downstream consumers keep resolving the same names.

mod infer;
mod layer_norm;
mod pass;
mod reduce;
mod softmax;

use std::collections::HashSet;

use thiserror::Error;

use crate::graph::{AttributeValue, DType, Graph, GraphNode, TensorLiteral, TensorType, TypeInfo};

pub use infer::{broadcast_shapes, infer_output_types};
pub use pass::{decompose_graph, DecomposeStats, DecomposedGraph};
pub use reduce::{resolve_reduce_axes, ReduceAxes};

/// Compute dtype used between an upcast and its matching downcast.
pub const WIDE_FLOAT: DType = DType::F32;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum DecomposeError {
    #[error("no decomposition rule for operator type '{op_type}'")]
    UnsupportedOperator { op_type: String },
    #[error("node '{node}' needs a static extent for axis {axis} of '{value}'")]
    ShapeRequired {
        node: String,
        value: String,
        axis: usize,
    },
    #[error("node '{node}' input '{value}' has no type information")]
    MissingTypeInfo { node: String, value: String },
    #[error("node '{node}' is missing required input #{index}")]
    MissingInput { node: String, index: usize },
    #[error("node '{node}' has no declared output")]
    MissingOutput { node: String },
    #[error("node '{node}' axis {axis} is out of range for rank {rank}")]
    InvalidAxis { node: String, axis: i64, rank: usize },
    #[error("node '{node}' reads axes from '{value}', which is not a constant")]
    AxesNotConstant { node: String, value: String },
    #[error("node '{node}' attribute '{name}' is invalid: {reason}")]
    InvalidAttribute {
        node: String,
        name: String,
        reason: String,
    },
}

pub type DecomposeResult<T> = Result<T, DecomposeError>;

/// Operator types with a registered decomposition rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositeOp {
    LayerNormalization,
    Softmax,
    SoftmaxGrad13,
    ReduceMax,
    ReduceMin,
    ReduceSum,
    ReduceMean,
}

impl CompositeOp {
    pub const ALL: [CompositeOp; 7] = [
        CompositeOp::LayerNormalization,
        CompositeOp::Softmax,
        CompositeOp::SoftmaxGrad13,
        CompositeOp::ReduceMax,
        CompositeOp::ReduceMin,
        CompositeOp::ReduceSum,
        CompositeOp::ReduceMean,
    ];

    pub fn from_op_type(op_type: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == op_type)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CompositeOp::LayerNormalization => "LayerNormalization",
            CompositeOp::Softmax => "Softmax",
            CompositeOp::SoftmaxGrad13 => "SoftmaxGrad_13",
            CompositeOp::ReduceMax => "ReduceMax",
            CompositeOp::ReduceMin => "ReduceMin",
            CompositeOp::ReduceSum => "ReduceSum",
            CompositeOp::ReduceMean => "ReduceMean",
        }
    }
}

/// Generates intermediate names that avoid every value name of the graphs seen so far.
#[derive(Debug, Default)]
pub(crate) struct NameGen {
    counter: usize,
    reserved: HashSet<String>,
}

impl NameGen {
    fn reserve_from(&mut self, graph: &Graph) {
        self.reserved.extend(graph.value_names());
    }

    pub(crate) fn fresh(&mut self, prefix: &str) -> String {
        loop {
            self.counter += 1;
            let candidate = format!("{prefix}{}", self.counter);
            if !self.reserved.contains(&candidate) {
                return candidate;
            }
        }
    }
}

/// Accumulates the replacement list for one rewritten node.
pub(crate) struct RuleBuilder<'a> {
    names: &'a mut NameGen,
    source: &'a GraphNode,
    nodes: Vec<GraphNode>,
}

impl<'a> RuleBuilder<'a> {
    fn new(names: &'a mut NameGen, source: &'a GraphNode) -> Self {
        Self {
            names,
            source,
            nodes: Vec::new(),
        }
    }

    /// Appends a node and returns the name of its (first) output.
    ///
    /// `outputs` binds the node to caller-chosen names; `None` allocates one fresh output.
    pub(crate) fn emit(
        &mut self,
        op_type: &str,
        inputs: &[&str],
        suffix: &str,
        outputs: Option<Vec<String>>,
        attrs: Vec<(&'static str, AttributeValue)>,
    ) -> String {
        let name = self.names.fresh(&format!("{}_{suffix}", self.source.name));
        let outputs = match outputs {
            Some(outputs) if !outputs.is_empty() => outputs,
            _ => vec![self.names.fresh(&format!("{op_type}_out"))],
        };
        let first = outputs[0].clone();
        let mut node = GraphNode::new(
            op_type,
            inputs.iter().map(|input| input.to_string()).collect(),
            outputs,
            name,
        );
        node.attributes = attrs
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect();
        self.nodes.push(node);
        first
    }

    pub(crate) fn cast(&mut self, input: &str, suffix: &str, to: DType, output: Option<String>) -> String {
        self.emit(
            "Cast",
            &[input],
            suffix,
            output.map(|name| vec![name]),
            vec![("to", AttributeValue::Int(to.onnx_code()))],
        )
    }

    pub(crate) fn constant(&mut self, suffix: &str, literal: TensorLiteral) -> String {
        self.emit(
            "Constant",
            &[],
            suffix,
            None,
            vec![("value", AttributeValue::Tensor(literal))],
        )
    }

    pub(crate) fn finish(self) -> Vec<GraphNode> {
        self.nodes
    }
}

pub(crate) fn axes_attr(axes: &[i64]) -> (&'static str, AttributeValue) {
    ("axes", AttributeValue::Ints(axes.to_vec()))
}

pub(crate) fn required_input<'n>(node: &'n GraphNode, index: usize) -> DecomposeResult<&'n str> {
    node.input(index).ok_or_else(|| DecomposeError::MissingInput {
        node: node.name.clone(),
        index,
    })
}

pub(crate) fn input_type<'t>(
    node: &GraphNode,
    index: usize,
    types: &'t dyn TypeInfo,
) -> DecomposeResult<&'t TensorType> {
    let value = required_input(node, index)?;
    types
        .lookup(value)
        .ok_or_else(|| DecomposeError::MissingTypeInfo {
            node: node.name.clone(),
            value: value.to_string(),
        })
}

pub(crate) fn primary_output(node: &GraphNode) -> DecomposeResult<String> {
    node.output(0)
        .map(str::to_string)
        .ok_or_else(|| DecomposeError::MissingOutput {
            node: node.name.clone(),
        })
}

/// Normalizes a possibly negative axis against `rank`.
pub(crate) fn normalize_axis(node: &GraphNode, axis: i64, rank: usize) -> DecomposeResult<usize> {
    let signed_rank = rank as i64;
    let resolved = if axis < 0 { axis + signed_rank } else { axis };
    if resolved < 0 || resolved >= signed_rank {
        return Err(DecomposeError::InvalidAxis {
            node: node.name.clone(),
            axis,
            rank,
        });
    }
    Ok(resolved as usize)
}

/// Decomposition engine for a single graph.
///
/// The name counter lives on the instance, so decomposing several nodes with one `Decomposer`
/// never produces clashing intermediate names. Every call reserves the value names of the graph
/// it is given, so an instance may be reused across graphs. Fresh instances number reproducibly.
#[derive(Debug, Default)]
pub struct Decomposer {
    names: NameGen,
}

impl Decomposer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when a rule is registered for `op_type`.
    pub fn contains(&self, op_type: &str) -> bool {
        CompositeOp::from_op_type(op_type).is_some()
    }

    pub fn decompose(
        &mut self,
        node: &GraphNode,
        graph: &Graph,
        types: &dyn TypeInfo,
    ) -> DecomposeResult<Vec<GraphNode>> {
        let Some(op) = CompositeOp::from_op_type(&node.op_type) else {
            return Err(DecomposeError::UnsupportedOperator {
                op_type: node.op_type.clone(),
            });
        };
        self.names.reserve_from(graph);

        let builder = RuleBuilder::new(&mut self.names, node);
        let nodes = match op {
            CompositeOp::LayerNormalization => layer_norm::layer_normalization(builder, node, types)?,
            CompositeOp::Softmax => softmax::softmax(builder, node, types)?,
            CompositeOp::SoftmaxGrad13 => softmax::softmax_grad(builder, node, types)?,
            CompositeOp::ReduceMax | CompositeOp::ReduceMin | CompositeOp::ReduceSum => {
                reduce::split_reduce_axes(builder, node, graph, types)?
            }
            CompositeOp::ReduceMean => reduce::reduce_mean(builder, node, graph, types)?,
        };

        log::trace!(
            "decomposed {} '{}' into {} node(s)",
            node.op_type,
            node.name,
            nodes.len()
        );
        Ok(nodes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_gen_skips_reserved_names() {
        let graph = Graph::new("g").with_node(GraphNode::new(
            "Relu",
            vec!["x".to_string()],
            vec!["Sub_out1".to_string()],
            "relu",
        ));
        let mut names = NameGen::default();
        names.reserve_from(&graph);
        assert_eq!(names.fresh("Sub_out"), "Sub_out2");
        assert_eq!(names.fresh("Sub_out"), "Sub_out3");
    }

    #[test]
    fn name_gen_reserves_every_graph_it_sees() {
        let first = Graph::new("a").with_node(GraphNode::new(
            "Relu",
            vec!["x".to_string()],
            vec!["t1".to_string()],
            "relu",
        ));
        let second = Graph::new("b").with_node(GraphNode::new(
            "Relu",
            vec!["x".to_string()],
            vec!["t2".to_string()],
            "relu",
        ));
        let mut names = NameGen::default();
        names.reserve_from(&first);
        assert_eq!(names.fresh("t"), "t2");
        names.reserve_from(&second);
        assert_eq!(names.fresh("t"), "t3");
        assert!(names.reserved.contains("t1"));
    }

    #[test]
    fn composite_op_names_round_trip() {
        for op in CompositeOp::ALL {
            assert_eq!(CompositeOp::from_op_type(op.as_str()), Some(op));
        }
        assert_eq!(CompositeOp::from_op_type("SoftmaxGrad"), None);
    }

    #[test]
    fn normalize_axis_rejects_out_of_range() {
        let node = GraphNode::new("Softmax", vec![], vec![], "sm");
        assert_eq!(normalize_axis(&node, -1, 3), Ok(2));
        assert_eq!(normalize_axis(&node, 0, 3), Ok(0));
        assert!(normalize_axis(&node, 3, 3).is_err());
        assert!(normalize_axis(&node, -4, 3).is_err());
    }
}
