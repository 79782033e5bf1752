use crate::graph::{AttributeValue, Graph, GraphNode, TensorLiteral, TypeInfo};

use super::{
    axes_attr, input_type, normalize_axis, required_input, DecomposeError, DecomposeResult,
    RuleBuilder, WIDE_FLOAT,
};

/// Reduction axes after resolving attributes, axis inputs, and defaults.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReduceAxes {
    pub keepdims: i64,
    /// Non-negative, ascending, de-duplicated.
    pub axes: Vec<usize>,
}

/// Resolves which axes a `Reduce*` node reduces.
///
/// Axes come from the `axes` attribute, else from a constant second input. An empty list means
/// "all axes" unless `noop_with_empty_axes` is set.
pub fn resolve_reduce_axes(
    node: &GraphNode,
    graph: &Graph,
    types: &dyn TypeInfo,
) -> DecomposeResult<ReduceAxes> {
    let rank = input_type(node, 0, types)?.shape.rank();
    let keepdims = node.attr_int("keepdims").unwrap_or(1);
    let noop_with_empty_axes = node.attr_int("noop_with_empty_axes").unwrap_or(0);

    let declared: Vec<i64> = match node.attr("axes") {
        Some(AttributeValue::Ints(axes)) => axes.clone(),
        Some(AttributeValue::Int(axis)) => vec![*axis],
        Some(_) => {
            return Err(DecomposeError::InvalidAttribute {
                node: node.name.clone(),
                name: "axes".to_string(),
                reason: "expected an integer list".to_string(),
            })
        }
        None => match node.input(1) {
            Some(value) => graph
                .constant_value(value)
                .and_then(TensorLiteral::to_i64_vec)
                .ok_or_else(|| DecomposeError::AxesNotConstant {
                    node: node.name.clone(),
                    value: value.to_string(),
                })?,
            None => Vec::new(),
        },
    };

    let mut axes = if declared.is_empty() {
        if noop_with_empty_axes == 0 {
            (0..rank).collect()
        } else {
            Vec::new()
        }
    } else {
        declared
            .iter()
            .map(|axis| normalize_axis(node, *axis, rank))
            .collect::<DecomposeResult<Vec<_>>>()?
    };
    axes.sort_unstable();
    axes.dedup();

    Ok(ReduceAxes { keepdims, axes })
}

/// Turns an N-axis reduction into N chained single-axis reductions.
///
/// Zero axes become an `Identity`; a single axis leaves the node unchanged. The chain reduces the
/// highest axis first so that with `keepdims=0` no pending axis index shifts.
pub(super) fn split_reduce_axes(
    mut b: RuleBuilder<'_>,
    node: &GraphNode,
    graph: &Graph,
    types: &dyn TypeInfo,
) -> DecomposeResult<Vec<GraphNode>> {
    let info = resolve_reduce_axes(node, graph, types)?;
    let input = required_input(node, 0)?;

    match info.axes.len() {
        0 => {
            b.emit(
                "Identity",
                &[input],
                "identity",
                Some(node.outputs.clone()),
                vec![],
            );
            Ok(b.finish())
        }
        1 => Ok(vec![node.clone()]),
        _ => {
            let mut current = input.to_string();
            for (step, axis) in info.axes.iter().enumerate().rev() {
                let outputs = (step == 0).then(|| node.outputs.clone());
                current = b.emit(
                    &node.op_type,
                    &[&current],
                    &step.to_string(),
                    outputs,
                    vec![
                        axes_attr(&[*axis as i64]),
                        ("keepdims", AttributeValue::Int(info.keepdims)),
                    ],
                );
            }
            Ok(b.finish())
        }
    }
}

/// `ReduceMean` over one axis as `ReduceSum / extent`.
///
/// Multi-axis and empty-axis means go through [`split_reduce_axes`] first and are returned as is.
pub(super) fn reduce_mean(
    mut b: RuleBuilder<'_>,
    node: &GraphNode,
    graph: &Graph,
    types: &dyn TypeInfo,
) -> DecomposeResult<Vec<GraphNode>> {
    let info = resolve_reduce_axes(node, graph, types)?;
    if info.axes.len() != 1 {
        return split_reduce_axes(b, node, graph, types);
    }
    let axis = info.axes[0];

    let input_name = required_input(node, 0)?;
    let input_ty = input_type(node, 0, types)?;
    let is_half = input_ty.dtype.is_half();
    let compute_dtype = if is_half { WIDE_FLOAT } else { input_ty.dtype };
    let extent = input_ty
        .shape
        .dim(axis)
        .and_then(|dim| dim.as_static())
        .ok_or_else(|| DecomposeError::ShapeRequired {
            node: node.name.clone(),
            value: input_name.to_string(),
            axis,
        })?;
    let divisor = TensorLiteral::from_f64(compute_dtype, Vec::new(), extent as f64).ok_or_else(|| {
        DecomposeError::InvalidAttribute {
            node: node.name.clone(),
            name: "dtype".to_string(),
            reason: format!("cannot average values of type {:?}", input_ty.dtype),
        }
    })?;

    let input = if is_half {
        b.cast(input_name, "cast", WIDE_FLOAT, None)
    } else {
        input_name.to_string()
    };
    let sum = b.emit(
        "ReduceSum",
        &[&input],
        "sum",
        None,
        vec![
            axes_attr(&[axis as i64]),
            ("keepdims", AttributeValue::Int(info.keepdims)),
        ],
    );
    let extent_value = b.constant("const1", divisor);
    if is_half {
        let div = b.emit("Div", &[&sum, &extent_value], "div", None, vec![]);
        b.emit(
            "Cast",
            &[&div],
            "cast1",
            Some(node.outputs.clone()),
            vec![("to", AttributeValue::Int(input_ty.dtype.onnx_code()))],
        );
    } else {
        b.emit(
            "Div",
            &[&sum, &extent_value],
            "div",
            Some(node.outputs.clone()),
            vec![],
        );
    }

    Ok(b.finish())
}
