use crate::graph::{Graph, GraphSerdeError};

const FNV1A_OFFSET: u64 = 0xcbf29ce484222325;
const FNV1A_PRIME: u64 = 0x100000001b3;

pub fn fnv1a_init() -> u64 {
    FNV1A_OFFSET
}

pub fn fnv1a_bytes(mut hash: u64, bytes: &[u8]) -> u64 {
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV1A_PRIME);
    }
    hash
}

pub fn fnv1a_hash(bytes: &[u8]) -> u64 {
    fnv1a_bytes(fnv1a_init(), bytes)
}

/// Structural fingerprint of a graph: FNV-1a over its bincode encoding.
pub fn graph_fingerprint(graph: &Graph) -> Result<u64, GraphSerdeError> {
    let bytes = graph.to_bytes()?;
    Ok(fnv1a_hash(&bytes))
}
