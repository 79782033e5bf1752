use crate::graph::{GraphNode, TensorLiteral, TypeInfo};

use super::{
    axes_attr, input_type, normalize_axis, primary_output, required_input, DecomposeError,
    DecomposeResult, RuleBuilder, WIDE_FLOAT,
};

const DEFAULT_EPSILON: f32 = 1e-5;

/// `LayerNormalization(x, scale, [bias])` normalized over the trailing axes starting at `axis`.
///
/// Half inputs are upcast before the statistics and cast back before the affine step. When the
/// node declares `Mean`/`InvStdDev` outputs, the mean reduction and the rsqrt write them directly.
/// An `axis` before the last one yields multi-axis `ReduceMean` nodes; `decompose_graph` splits
/// those further.
pub(super) fn layer_normalization(
    mut b: RuleBuilder<'_>,
    node: &GraphNode,
    types: &dyn TypeInfo,
) -> DecomposeResult<Vec<GraphNode>> {
    let input_name = required_input(node, 0)?;
    let scale = required_input(node, 1)?;
    let bias = node.input(2);
    let input_ty = input_type(node, 0, types)?;
    let input_dtype = input_ty.dtype;
    let is_half = input_dtype.is_half();
    let compute_dtype = if is_half { WIDE_FLOAT } else { input_dtype };

    let output = primary_output(node)?;
    let mean_output = node.output(1).map(str::to_string);
    let inv_std_dev_output = node.output(2).map(str::to_string);

    let rank = input_ty.shape.rank();
    let axis = normalize_axis(node, node.attr_int("axis").unwrap_or(-1), rank)?;
    let axes: Vec<i64> = (axis..rank).map(|axis| axis as i64).collect();

    let epsilon = node.attr_float("epsilon").unwrap_or(DEFAULT_EPSILON);
    let epsilon_literal = TensorLiteral::from_f64(compute_dtype, vec![1], f64::from(epsilon))
        .ok_or_else(|| DecomposeError::InvalidAttribute {
            node: node.name.clone(),
            name: "epsilon".to_string(),
            reason: format!("cannot normalize values of type {input_dtype:?}"),
        })?;

    let epsilon_value = b.constant("const", epsilon_literal);
    let input = if is_half {
        b.cast(input_name, "cast", WIDE_FLOAT, None)
    } else {
        input_name.to_string()
    };
    let mean = b.emit(
        "ReduceMean",
        &[&input],
        "reducemean",
        mean_output.map(|name| vec![name]),
        vec![axes_attr(&axes)],
    );
    let centered = b.emit("Sub", &[&input, &mean], "sub", None, vec![]);
    let squared = b.emit("Mul", &[&centered, &centered], "mul", None, vec![]);
    let variance = b.emit(
        "ReduceMean",
        &[&squared],
        "reducemean1",
        None,
        vec![axes_attr(&axes)],
    );
    let shifted = b.emit("Add", &[&variance, &epsilon_value], "add", None, vec![]);
    let inv_std_dev = b.emit(
        "Rsqrt",
        &[&shifted],
        "rsqrt",
        inv_std_dev_output.map(|name| vec![name]),
        vec![],
    );
    let mut normalized = b.emit("Mul", &[&centered, &inv_std_dev], "mul1", None, vec![]);
    if is_half {
        normalized = b.cast(&normalized, "cast1", input_dtype, None);
    }
    match bias {
        Some(bias) => {
            let scaled = b.emit("Mul", &[scale, &normalized], "mul2", None, vec![]);
            b.emit("Add", &[bias, &scaled], "add1", Some(vec![output]), vec![]);
        }
        None => {
            b.emit("Mul", &[scale, &normalized], "mul2", Some(vec![output]), vec![]);
        }
    }

    Ok(b.finish())
}
