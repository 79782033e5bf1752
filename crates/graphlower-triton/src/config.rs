use std::collections::BTreeMap;
use std::path::PathBuf;

use graphlower::env;
use graphlower::registry::{self, OpDescriptor};
use serde::Serialize;

use crate::{RuntimeError, RuntimeResult};

pub const DEBUG_ENV: &str = "GRAPHLOWER_TRITON_DEBUG";
pub const DEBUG_DIR_ENV: &str = "GRAPHLOWER_TRITON_DEBUG_DIR";
const DEFAULT_DEBUG_DIR: &str = "triton_debug";

#[derive(Serialize)]
struct CapabilityConfig {
    ops: BTreeMap<&'static str, &'static OpDescriptor>,
    initializer: &'static str,
}

/// Capability document announcing which operators run natively.
///
/// Initializers are reported as `"scalar"`: only scalar constants are embedded in kernels.
pub fn capability_config() -> RuntimeResult<String> {
    let config = CapabilityConfig {
        ops: registry::supported_ops(),
        initializer: "scalar",
    };
    serde_json::to_string(&config).map_err(|err| RuntimeError::Config(err.to_string()))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Dump canonical graphs and generated sources on every compilation.
    pub debug: bool,
    pub debug_dir: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            debug: false,
            debug_dir: PathBuf::from(DEFAULT_DEBUG_DIR),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        Self {
            debug: env::flag_enabled(DEBUG_ENV),
            debug_dir: env::non_empty_var(DEBUG_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DEBUG_DIR)),
        }
    }

    pub fn with_debug_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.debug = true;
        self.debug_dir = dir.into();
        self
    }
}
