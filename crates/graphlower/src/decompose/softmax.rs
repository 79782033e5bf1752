use crate::graph::{GraphNode, TypeInfo};

use super::{axes_attr, input_type, primary_output, required_input, DecomposeResult, RuleBuilder, WIDE_FLOAT};

/// `Softmax(x)` as `exp(x - max(x)) / sum(exp(x - max(x)))` over `axis`.
///
/// Half inputs are upcast after the max subtraction; the division runs at wide precision and is
/// cast back once.
pub(super) fn softmax(
    mut b: RuleBuilder<'_>,
    node: &GraphNode,
    types: &dyn TypeInfo,
) -> DecomposeResult<Vec<GraphNode>> {
    let input = required_input(node, 0)?;
    let input_dtype = input_type(node, 0, types)?.dtype;
    let is_half = input_dtype.is_half();
    let axis = node.attr_int("axis").unwrap_or(-1);
    let output = primary_output(node)?;

    let max = b.emit("ReduceMax", &[input], "max", None, vec![axes_attr(&[axis])]);
    let mut shifted = b.emit("Sub", &[input, &max], "sub", None, vec![]);
    if is_half {
        shifted = b.cast(&shifted, "cast", WIDE_FLOAT, None);
    }
    let exp = b.emit("Exp", &[&shifted], "exp", None, vec![]);
    let sum = b.emit("ReduceSum", &[&exp], "sum", None, vec![axes_attr(&[axis])]);
    if is_half {
        let div = b.emit("Div", &[&exp, &sum], "div", None, vec![]);
        b.cast(&div, "cast1", input_dtype, Some(output));
    } else {
        b.emit("Div", &[&exp, &sum], "div", Some(vec![output]), vec![]);
    }

    Ok(b.finish())
}

/// `SoftmaxGrad_13(dy, y)` as `dy * y - y * sum(dy * y)` over `axis`.
pub(super) fn softmax_grad(
    mut b: RuleBuilder<'_>,
    node: &GraphNode,
    types: &dyn TypeInfo,
) -> DecomposeResult<Vec<GraphNode>> {
    let dy_input = required_input(node, 0)?;
    let y_input = required_input(node, 1)?;
    let input_dtype = input_type(node, 0, types)?.dtype;
    let is_half = input_dtype.is_half();
    let axis = node.attr_int("axis").unwrap_or(-1);
    let output = primary_output(node)?;

    let (dy, y) = if is_half {
        let dy = b.cast(dy_input, "cast", WIDE_FLOAT, None);
        let y = b.cast(y_input, "cast1", WIDE_FLOAT, None);
        (dy, y)
    } else {
        (dy_input.to_string(), y_input.to_string())
    };
    let product = b.emit("Mul", &[&dy, &y], "mul", None, vec![]);
    let sum = b.emit("ReduceSum", &[&product], "sum", None, vec![axes_attr(&[axis])]);
    let scaled = b.emit("Mul", &[&y, &sum], "mul1", None, vec![]);
    if is_half {
        let diff = b.emit("Sub", &[&product, &scaled], "sub", None, vec![]);
        b.cast(&diff, "cast2", input_dtype, Some(output));
    } else {
        b.emit("Sub", &[&product, &scaled], "sub", Some(vec![output]), vec![]);
    }

    Ok(b.finish())
}
