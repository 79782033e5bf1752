use std::collections::HashSet;
use std::fmt;

use super::GraphNode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologyError {
    pub missing_value: String,
    pub node: String,
}

impl fmt::Display for TopologyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "input value '{}' is not defined before node '{}'",
            self.missing_value, self.node
        )
    }
}

impl std::error::Error for TopologyError {}

/// Checks that every node input is either in `available` or produced by an earlier node.
pub fn validate_node_order<I, S>(available: I, nodes: &[GraphNode]) -> Result<(), TopologyError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut defined: HashSet<String> = available
        .into_iter()
        .map(|name| name.as_ref().to_string())
        .collect();

    for node in nodes {
        for input in node.inputs.iter().filter(|name| !name.is_empty()) {
            if !defined.contains(input) {
                return Err(TopologyError {
                    missing_value: input.clone(),
                    node: node.name.clone(),
                });
            }
        }
        defined.extend(node.declared_outputs().map(str::to_string));
    }

    Ok(())
}
