//! Side-channel dumps of what each compilation saw and produced.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::toolchain::CanonicalGraph;

pub fn graph_dump_path(dir: &Path, graph_key: u64) -> PathBuf {
    dir.join(format!("{graph_key}.json"))
}

pub fn source_dump_path(dir: &Path, function_name: &str, graph_key: u64) -> PathBuf {
    dir.join(format!("{function_name}_{graph_key}.py"))
}

/// Writes the canonical graph and generated source under `dir`. Failures only warn.
pub fn dump_compilation(
    dir: &Path,
    graph_key: u64,
    function_name: &str,
    canonical: &CanonicalGraph,
    source: &str,
) {
    if let Err(err) = try_dump(dir, graph_key, function_name, canonical, source) {
        log::warn!(
            "failed to write debug dump for graph {graph_key} to {}: {err}",
            dir.display()
        );
    }
}

fn try_dump(
    dir: &Path,
    graph_key: u64,
    function_name: &str,
    canonical: &CanonicalGraph,
    source: &str,
) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    let json = canonical
        .graph
        .to_json_string()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
    fs::write(graph_dump_path(dir, graph_key), json)?;
    fs::write(source_dump_path(dir, function_name, graph_key), source)?;
    log::debug!("dumped graph {graph_key} ({function_name}) to {}", dir.display());
    Ok(())
}
