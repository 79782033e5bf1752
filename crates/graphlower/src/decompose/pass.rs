use crate::graph::{Graph, TensorType, TypeInfo, TypeTable};

use super::{infer_output_types, DecomposeResult, Decomposer};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecomposeStats {
    /// Nodes replaced by a rule (including nodes that were themselves emitted by a rule).
    pub rewritten_nodes: usize,
    /// Nodes emitted across all replacements.
    pub emitted_nodes: usize,
}

#[derive(Debug, Clone)]
pub struct DecomposedGraph {
    pub graph: Graph,
    /// Types inferred for values introduced by decomposition.
    pub inferred_types: TypeTable,
    pub stats: DecomposeStats,
}

struct LayeredTypes<'a> {
    base: &'a dyn TypeInfo,
    inferred: TypeTable,
}

impl TypeInfo for LayeredTypes<'_> {
    fn lookup(&self, value: &str) -> Option<&TensorType> {
        self.inferred.lookup(value).or_else(|| self.base.lookup(value))
    }
}

/// Decomposes every composite node of `graph` until only primitive operators remain.
///
/// Replacements are spliced in place and revisited, so a rule may emit other composite
/// operators (layer normalization emits `ReduceMean`). Types of the new intermediate values are
/// inferred as they appear so later rules can consult them.
pub fn decompose_graph(graph: &Graph, types: &dyn TypeInfo) -> DecomposeResult<DecomposedGraph> {
    let mut decomposer = Decomposer::new();
    let mut layered = LayeredTypes {
        base: types,
        inferred: TypeTable::new(),
    };
    let mut stats = DecomposeStats::default();
    let mut nodes = graph.nodes.clone();

    let mut pos = 0;
    while pos < nodes.len() {
        let node = &nodes[pos];
        if !decomposer.contains(&node.op_type) {
            pos += 1;
            continue;
        }

        let replacement = decomposer.decompose(node, graph, &layered)?;
        if replacement.len() == 1 && replacement[0] == *node {
            pos += 1;
            continue;
        }

        for new_node in &replacement {
            let Some(output_types) = infer_output_types(new_node, graph, &layered) else {
                continue;
            };
            for (name, ty) in new_node.declared_outputs().zip(output_types) {
                if layered.lookup(name).is_none() {
                    layered.inferred.insert(name, ty);
                }
            }
        }

        stats.rewritten_nodes += 1;
        stats.emitted_nodes += replacement.len();
        nodes.splice(pos..pos + 1, replacement);
    }

    log::debug!(
        "decomposed graph '{}': {} rewrite(s), {} -> {} node(s)",
        graph.name,
        stats.rewritten_nodes,
        graph.nodes.len(),
        nodes.len()
    );

    let mut rewritten = graph.clone();
    rewritten.nodes = nodes;
    Ok(DecomposedGraph {
        graph: rewritten,
        inferred_types: layered.inferred,
        stats,
    })
}
