use crate::graph::{AttributeValue, DType, Dimension, Graph, GraphNode, Shape, TensorType, TypeInfo};

use super::reduce::resolve_reduce_axes;

/// Numpy-style broadcast of two shapes. Returns `None` for incompatible static extents.
pub fn broadcast_shapes(lhs: &Shape, rhs: &Shape) -> Option<Shape> {
    let rank = lhs.rank().max(rhs.rank());
    let mut dims = Vec::with_capacity(rank);
    for offset in (0..rank).rev() {
        let left = offset
            .checked_sub(rank - lhs.rank())
            .and_then(|axis| lhs.dim(axis));
        let right = offset
            .checked_sub(rank - rhs.rank())
            .and_then(|axis| rhs.dim(axis));
        let dim = match (left, right) {
            (Some(l), None) => l.clone(),
            (None, Some(r)) => r.clone(),
            (Some(l), Some(r)) => broadcast_dim(l, r)?,
            (None, None) => return None,
        };
        dims.push(dim);
    }
    dims.reverse();
    Some(Shape::new(dims))
}

fn broadcast_dim(lhs: &Dimension, rhs: &Dimension) -> Option<Dimension> {
    match (lhs, rhs) {
        (Dimension::Static(1), other) | (other, Dimension::Static(1)) => Some(other.clone()),
        (Dimension::Static(l), Dimension::Static(r)) if l == r => Some(lhs.clone()),
        (Dimension::Static(_), Dimension::Static(_)) => None,
        (Dimension::Static(_), Dimension::Dynamic(_)) => Some(lhs.clone()),
        (Dimension::Dynamic(_), _) => Some(lhs.clone()),
    }
}

/// Infers the output types of the primitive operators decomposition emits.
///
/// Returns one type per declared output, or `None` when the operator is unknown here or an input
/// type is missing.
pub fn infer_output_types(
    node: &GraphNode,
    graph: &Graph,
    types: &dyn TypeInfo,
) -> Option<Vec<TensorType>> {
    let input = move |index: usize| node.input(index).and_then(|name| types.lookup(name));

    let ty = match node.op_type.as_str() {
        "Constant" => match node.attr("value") {
            Some(AttributeValue::Tensor(literal)) => literal.tensor_type(),
            _ => return None,
        },
        "Cast" => {
            let dtype = node.attr_int("to").and_then(DType::from_onnx_code)?;
            input(0)?.with_dtype(dtype)
        }
        "Identity" | "Exp" | "Sqrt" | "Rsqrt" | "Neg" | "Abs" | "Reciprocal" | "Relu" | "Tanh"
        | "Dropout" => input(0)?.clone(),
        "Add" | "Sub" | "Mul" | "Div" | "Pow" => {
            let lhs = input(0)?;
            let rhs = input(1)?;
            TensorType::new(lhs.dtype, broadcast_shapes(&lhs.shape, &rhs.shape)?)
        }
        "ReduceMax" | "ReduceMin" | "ReduceSum" | "ReduceMean" => {
            let source = input(0)?;
            let info = resolve_reduce_axes(node, graph, types).ok()?;
            let dims = source
                .shape
                .dims()
                .iter()
                .enumerate()
                .filter_map(|(axis, dim)| {
                    if !info.axes.contains(&axis) {
                        Some(dim.clone())
                    } else if info.keepdims != 0 {
                        Some(Dimension::Static(1))
                    } else {
                        None
                    }
                })
                .collect::<Vec<_>>();
            TensorType::new(source.dtype, Shape::new(dims))
        }
        _ => return None,
    };

    Some(node.declared_outputs().map(|_| ty.clone()).collect())
}
