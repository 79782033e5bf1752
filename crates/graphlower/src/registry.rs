//! Static table of operator kinds the kernel code generator understands.
//!
//! The table is published to the layer that decides which nodes run natively and which must be
//! decomposed first. Decomposition rules are not derived from it.

use std::collections::BTreeMap;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::decompose::resolve_reduce_axes;
use crate::graph::{Graph, GraphNode, TypeInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpFamily {
    Elementwise,
    Reduction,
}

/// Structural requirement a node must satisfy to run natively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpCondition {
    /// The reduction axes must resolve to exactly one axis.
    SingleAxis,
}

impl OpCondition {
    fn key(self) -> &'static str {
        match self {
            OpCondition::SingleAxis => "axes",
        }
    }

    fn value(self) -> &'static str {
        match self {
            OpCondition::SingleAxis => "single",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpDescriptor {
    pub domain: &'static str,
    pub versions: &'static [u32],
    pub is_no_op: bool,
    #[serde(serialize_with = "serialize_conditions")]
    pub conditions: &'static [OpCondition],
    #[serde(skip)]
    pub family: OpFamily,
}

impl OpDescriptor {
    const fn elementwise(domain: &'static str, versions: &'static [u32], is_no_op: bool) -> Self {
        Self {
            domain,
            versions,
            is_no_op,
            conditions: &[],
            family: OpFamily::Elementwise,
        }
    }

    const fn reduction(
        domain: &'static str,
        versions: &'static [u32],
        conditions: &'static [OpCondition],
    ) -> Self {
        Self {
            domain,
            versions,
            is_no_op: false,
            conditions,
            family: OpFamily::Reduction,
        }
    }

    pub fn supports_version(&self, version: u32) -> bool {
        self.versions.contains(&version)
    }
}

fn serialize_conditions<S>(conditions: &&'static [OpCondition], serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    let mut map = serializer.serialize_map(Some(conditions.len()))?;
    for condition in conditions.iter() {
        map.serialize_entry(condition.key(), condition.value())?;
    }
    map.end()
}

const MS_DOMAIN: &str = "com.microsoft";
const SINGLE_AXIS: &[OpCondition] = &[OpCondition::SingleAxis];

static ELEMENTWISE_OPS: &[(&str, OpDescriptor)] = &[
    ("Add", OpDescriptor::elementwise("", &[7, 13, 14], false)),
    ("Sub", OpDescriptor::elementwise("", &[7, 13, 14], false)),
    ("Mul", OpDescriptor::elementwise("", &[7, 13, 14], false)),
    ("Div", OpDescriptor::elementwise("", &[7, 13, 14], false)),
    ("Pow", OpDescriptor::elementwise("", &[7, 12, 13, 5], false)),
    ("Sqrt", OpDescriptor::elementwise("", &[6, 13], false)),
    ("Exp", OpDescriptor::elementwise("", &[6, 13], false)),
    ("Where", OpDescriptor::elementwise("", &[9, 16], false)),
    ("Cast", OpDescriptor::elementwise("", &[6, 9, 13], false)),
    ("Dropout", OpDescriptor::elementwise("", &[6, 9, 13], false)),
    ("DropoutGrad", OpDescriptor::elementwise(MS_DOMAIN, &[1], false)),
    ("Identity", OpDescriptor::elementwise("", &[6, 9, 13], true)),
];

static REDUCTION_OPS: &[(&str, OpDescriptor)] = &[
    ("ReduceMean", OpDescriptor::reduction("", &[11, 13], SINGLE_AXIS)),
    ("ReduceSum", OpDescriptor::reduction("", &[11, 13], SINGLE_AXIS)),
    ("ReduceMax", OpDescriptor::reduction("", &[11, 12, 13], SINGLE_AXIS)),
    ("ReduceMin", OpDescriptor::reduction("", &[11, 12, 13], SINGLE_AXIS)),
    ("Softmax", OpDescriptor::reduction("", &[11, 13], &[])),
    ("SoftmaxGrad_13", OpDescriptor::reduction(MS_DOMAIN, &[1], &[])),
    ("LayerNormalization", OpDescriptor::reduction("", &[1], &[])),
];

fn find(table: &'static [(&'static str, OpDescriptor)], op_type: &str) -> Option<&'static OpDescriptor> {
    table
        .iter()
        .find(|(name, _)| *name == op_type)
        .map(|(_, descriptor)| descriptor)
}

pub fn is_elementwise(op_type: &str) -> bool {
    find(ELEMENTWISE_OPS, op_type).is_some()
}

pub fn is_reduction(op_type: &str) -> bool {
    find(REDUCTION_OPS, op_type).is_some()
}

pub fn descriptor(op_type: &str) -> Option<&'static OpDescriptor> {
    find(ELEMENTWISE_OPS, op_type).or_else(|| find(REDUCTION_OPS, op_type))
}

pub fn family(op_type: &str) -> Option<OpFamily> {
    descriptor(op_type).map(|descriptor| descriptor.family)
}

/// All supported operators keyed by type name.
pub fn supported_ops() -> BTreeMap<&'static str, &'static OpDescriptor> {
    ELEMENTWISE_OPS
        .iter()
        .chain(REDUCTION_OPS.iter())
        .map(|(name, descriptor)| (*name, descriptor))
        .collect()
}

/// Evaluates the structural conditions of the node's descriptor.
///
/// Returns `false` for unknown operators and whenever a condition cannot be evaluated (for
/// example when the input rank is unknown).
pub fn conditions_hold(node: &GraphNode, graph: &Graph, types: &dyn TypeInfo) -> bool {
    let Some(descriptor) = descriptor(&node.op_type) else {
        return false;
    };
    descriptor.conditions.iter().all(|condition| match condition {
        OpCondition::SingleAxis => resolve_reduce_axes(node, graph, types)
            .map(|info| info.axes.len() == 1)
            .unwrap_or(false),
    })
}
