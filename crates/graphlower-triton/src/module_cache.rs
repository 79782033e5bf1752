use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use graphlower::graph::Graph;
use graphlower::hashing::{fnv1a_bytes, fnv1a_init};
use graphlower::profiling;

use crate::config::RuntimeConfig;
use crate::debug;
use crate::toolchain::{KernelModule, Toolchain};
use crate::{CompileStage, RuntimeError, RuntimeResult};

/// Graph identity plus the concrete input shapes the kernel is specialized for.
///
/// Keys compare on both fields exactly; [`ModuleCacheKey::digest`] is only a short label.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleCacheKey {
    pub graph_key: u64,
    pub shapes: Vec<Vec<usize>>,
}

impl ModuleCacheKey {
    pub fn new(graph_key: u64, shapes: Vec<Vec<usize>>) -> Self {
        Self { graph_key, shapes }
    }

    pub fn digest(&self) -> u64 {
        let text = format!("{}|{:?}", self.graph_key, self.shapes);
        fnv1a_bytes(fnv1a_init(), text.as_bytes())
    }
}

pub struct CompiledModule<T> {
    pub function_name: String,
    pub module: Arc<dyn KernelModule<T>>,
}

impl<T> CompiledModule<T> {
    pub fn invoke(&self, args: &[T]) -> anyhow::Result<Vec<T>> {
        self.module.invoke(&self.function_name, args)
    }
}

impl<T> fmt::Debug for CompiledModule<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledModule")
            .field("function_name", &self.function_name)
            .finish_non_exhaustive()
    }
}

pub fn function_name_for(identity: u64) -> String {
    format!("call_{identity:016x}")
}

/// Process-lifetime cache of loaded kernel modules.
///
/// Concurrent misses on the same key are serialized by a per-key gate so the toolchain runs once;
/// hits only take the entry map lock. Failed compilations are never stored.
pub struct ModuleCache<T> {
    toolchain: Toolchain<T>,
    config: RuntimeConfig,
    entries: Mutex<HashMap<ModuleCacheKey, Arc<CompiledModule<T>>>>,
    compile_gates: Mutex<HashMap<ModuleCacheKey, Arc<Mutex<()>>>>,
    // Distinct keys can canonicalize to the same graph; reuse the module loaded for it.
    by_identity: Mutex<HashMap<u64, Arc<CompiledModule<T>>>>,
}

// Maps only see whole-value inserts and gates guard no data, so poisoning is ignored.
fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T> ModuleCache<T> {
    pub fn new(toolchain: Toolchain<T>, config: RuntimeConfig) -> Self {
        Self {
            toolchain,
            config,
            entries: Mutex::new(HashMap::new()),
            compile_gates: Mutex::new(HashMap::new()),
            by_identity: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &ModuleCacheKey) -> bool {
        lock(&self.entries).contains_key(key)
    }

    /// Drops every compiled module; the next call per key compiles again.
    pub fn reset(&self) {
        lock(&self.entries).clear();
        lock(&self.compile_gates).clear();
        lock(&self.by_identity).clear();
        log::debug!("module cache reset");
    }

    pub fn get_or_compile(
        &self,
        graph_key: u64,
        graph_bytes: &[u8],
        shapes: Vec<Vec<usize>>,
    ) -> RuntimeResult<Arc<CompiledModule<T>>> {
        let key = ModuleCacheKey::new(graph_key, shapes);

        if let Some(found) = lock(&self.entries).get(&key).cloned() {
            profiling::cache_event("module_cache.hit");
            return Ok(found);
        }
        profiling::cache_event("module_cache.miss");

        let gate = {
            let mut gates = lock(&self.compile_gates);
            gates
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let _gate_lock = lock(&*gate);

        if let Some(found) = lock(&self.entries).get(&key).cloned() {
            profiling::cache_event("module_cache.hit");
            return Ok(found);
        }

        let compiled = self.compile(&key, graph_bytes)?;
        lock(&self.entries).insert(key, Arc::clone(&compiled));
        Ok(compiled)
    }

    fn compile(
        &self,
        key: &ModuleCacheKey,
        graph_bytes: &[u8],
    ) -> RuntimeResult<Arc<CompiledModule<T>>> {
        let _compile_scope = profiling::compile_scope("module_cache.compile");
        let graph = Graph::from_bytes(graph_bytes)?;
        let canonical = self
            .toolchain
            .canonicalizer
            .canonicalize(&graph, &key.shapes)
            .map_err(|err| RuntimeError::compilation(CompileStage::Canonicalize, err))?;

        if let Some(found) = lock(&self.by_identity).get(&canonical.identity).cloned() {
            profiling::cache_event("module_cache.codegen_hit");
            log::debug!(
                "graph {} ({:016x}) reuses {}",
                key.graph_key,
                key.digest(),
                found.function_name
            );
            return Ok(found);
        }

        let function_name = function_name_for(canonical.identity);
        let source = self
            .toolchain
            .codegen
            .generate(&function_name, &canonical)
            .map_err(|err| RuntimeError::compilation(CompileStage::Generate, err))?;
        if self.config.debug {
            debug::dump_compilation(
                &self.config.debug_dir,
                key.graph_key,
                &function_name,
                &canonical,
                &source,
            );
        }
        let module = self
            .toolchain
            .loader
            .load(&source)
            .map_err(|err| RuntimeError::compilation(CompileStage::Load, err))?;

        log::debug!(
            "compiled graph {} ({:016x}) as {function_name} for shapes {:?}",
            key.graph_key,
            key.digest(),
            key.shapes
        );
        let compiled = Arc::new(CompiledModule {
            function_name,
            module,
        });
        lock(&self.by_identity).insert(canonical.identity, Arc::clone(&compiled));
        Ok(compiled)
    }
}
