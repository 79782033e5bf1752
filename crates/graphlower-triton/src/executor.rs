use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use graphlower::hashing::fnv1a_hash;

use crate::config::RuntimeConfig;
use crate::module_cache::ModuleCache;
use crate::toolchain::{KernelModule, TensorInterop, Toolchain};
use crate::{RuntimeError, RuntimeResult};

/// Runtime entry point a calling framework invokes once per graph execution.
pub struct TritonOpExecutor<I: TensorInterop> {
    interop: I,
    cache: ModuleCache<I::Native>,
    functions: RwLock<HashMap<String, Arc<dyn KernelModule<I::Native>>>>,
}

impl<I: TensorInterop> TritonOpExecutor<I> {
    pub fn new(interop: I, toolchain: Toolchain<I::Native>, config: RuntimeConfig) -> Self {
        Self {
            interop,
            cache: ModuleCache::new(toolchain, config),
            functions: RwLock::new(HashMap::new()),
        }
    }

    pub fn from_env(interop: I, toolchain: Toolchain<I::Native>) -> Self {
        Self::new(interop, toolchain, RuntimeConfig::from_env())
    }

    pub fn cache(&self) -> &ModuleCache<I::Native> {
        &self.cache
    }

    /// Makes `module` reachable by name in direct-dispatch mode.
    pub fn register_function(
        &self,
        name: impl Into<String>,
        module: Arc<dyn KernelModule<I::Native>>,
    ) {
        self.functions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), module);
    }

    pub fn reset(&self) {
        self.cache.reset()
    }

    /// Runs a kernel over `tensors`.
    ///
    /// Without graph bytes the call dispatches directly to a function registered under
    /// `func_name` and never consults the cache. With graph bytes the module is fetched from
    /// (or compiled into) the cache for the shapes of `tensors`; a missing `graph_key` falls back
    /// to a hash of the bytes. Errors are logged and returned as is.
    pub fn execute(
        &self,
        func_name: Option<&str>,
        graph_key: Option<u64>,
        graph_bytes: Option<&[u8]>,
        tensors: Vec<I::Foreign>,
    ) -> RuntimeResult<Vec<I::Foreign>> {
        let result = match graph_bytes.filter(|bytes| !bytes.is_empty()) {
            None => self.execute_direct(func_name, tensors),
            Some(bytes) => {
                let graph_key = graph_key.unwrap_or_else(|| fnv1a_hash(bytes));
                self.execute_compiled(graph_key, bytes, tensors)
            }
        };
        if let Err(err) = &result {
            log::error!("triton op execution failed: {err:?}");
        }
        result
    }

    fn execute_direct(
        &self,
        func_name: Option<&str>,
        tensors: Vec<I::Foreign>,
    ) -> RuntimeResult<Vec<I::Foreign>> {
        let name = func_name.ok_or(RuntimeError::MissingFunctionName)?;
        let module = self
            .functions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
            .ok_or_else(|| RuntimeError::UnknownFunction(name.to_string()))?;
        let args = self.to_native(tensors)?;
        let outputs = module
            .invoke(name, &args)
            .map_err(|err| RuntimeError::execution(name, err))?;
        self.to_foreign(outputs)
    }

    fn execute_compiled(
        &self,
        graph_key: u64,
        graph_bytes: &[u8],
        tensors: Vec<I::Foreign>,
    ) -> RuntimeResult<Vec<I::Foreign>> {
        let args = self.to_native(tensors)?;
        let shapes = args
            .iter()
            .map(|tensor| self.interop.shape_of(tensor))
            .collect();
        let compiled = self.cache.get_or_compile(graph_key, graph_bytes, shapes)?;
        let outputs = compiled
            .invoke(&args)
            .map_err(|err| RuntimeError::execution(compiled.function_name.clone(), err))?;
        self.to_foreign(outputs)
    }

    fn to_native(&self, tensors: Vec<I::Foreign>) -> RuntimeResult<Vec<I::Native>> {
        tensors
            .into_iter()
            .map(|tensor| self.interop.from_foreign(tensor).map_err(RuntimeError::interop))
            .collect()
    }

    fn to_foreign(&self, tensors: Vec<I::Native>) -> RuntimeResult<Vec<I::Foreign>> {
        tensors
            .into_iter()
            .map(|tensor| self.interop.to_foreign(tensor).map_err(RuntimeError::interop))
            .collect()
    }
}
