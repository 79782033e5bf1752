//! Compiled-module cache and dispatcher for decomposed graphs.
//!
//! Graphs arrive as serialized bytes plus a caller-provided key. On the first call for a
//! (key, shapes) pair the graph is canonicalized, turned into kernel source and loaded through the
//! [`toolchain::Toolchain`] collaborators; later calls reuse the loaded module.

pub mod config;
pub mod debug;
pub mod executor;
pub mod module_cache;
pub mod toolchain;

use std::fmt;

use graphlower::graph::GraphSerdeError;
use thiserror::Error;

pub use config::{capability_config, RuntimeConfig};
pub use executor::TritonOpExecutor;
pub use module_cache::{CompiledModule, ModuleCache, ModuleCacheKey};
pub use toolchain::{
    CanonicalGraph, Canonicalizer, KernelCodegen, KernelLoader, KernelModule, TensorInterop,
    Toolchain,
};

/// Step of the miss path that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileStage {
    Canonicalize,
    Generate,
    Load,
}

impl fmt::Display for CompileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CompileStage::Canonicalize => "canonicalize",
            CompileStage::Generate => "generate",
            CompileStage::Load => "load",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to decode graph: {0}")]
    GraphDecode(#[from] GraphSerdeError),
    #[error("compilation failed during {stage}")]
    Compilation {
        stage: CompileStage,
        #[source]
        source: anyhow::Error,
    },
    #[error("execution of '{function}' failed")]
    Execution {
        function: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("tensor conversion failed")]
    Interop {
        #[source]
        source: anyhow::Error,
    },
    #[error("no function registered under '{0}'")]
    UnknownFunction(String),
    #[error("direct dispatch requires a function name")]
    MissingFunctionName,
    #[error("config error: {0}")]
    Config(String),
}

impl RuntimeError {
    pub fn compilation(stage: CompileStage, source: anyhow::Error) -> Self {
        RuntimeError::Compilation { stage, source }
    }

    pub fn execution(function: impl Into<String>, source: anyhow::Error) -> Self {
        RuntimeError::Execution {
            function: function.into(),
            source,
        }
    }

    pub fn interop(source: anyhow::Error) -> Self {
        RuntimeError::Interop { source }
    }
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
