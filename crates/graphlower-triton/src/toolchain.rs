//! Seams to the external canonicalizer, code generator, loader and tensor runtime.

use std::sync::Arc;

use graphlower::graph::Graph;

/// Deterministically reordered graph plus a stable fingerprint of that ordering.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalGraph {
    pub graph: Graph,
    pub identity: u64,
}

pub trait Canonicalizer: Send + Sync {
    fn canonicalize(&self, graph: &Graph, shapes: &[Vec<usize>]) -> anyhow::Result<CanonicalGraph>;
}

pub trait KernelCodegen: Send + Sync {
    /// Emits kernel source that defines `function_name`.
    fn generate(&self, function_name: &str, graph: &CanonicalGraph) -> anyhow::Result<String>;
}

/// A loaded kernel module operating on native tensors `T`.
pub trait KernelModule<T>: Send + Sync {
    fn invoke(&self, symbol: &str, args: &[T]) -> anyhow::Result<Vec<T>>;
}

pub trait KernelLoader<T>: Send + Sync {
    fn load(&self, source: &str) -> anyhow::Result<Arc<dyn KernelModule<T>>>;
}

/// Converts between the caller's tensor handles and the kernel runtime's tensors.
pub trait TensorInterop: Send + Sync {
    type Foreign;
    type Native;

    fn from_foreign(&self, tensor: Self::Foreign) -> anyhow::Result<Self::Native>;
    fn to_foreign(&self, tensor: Self::Native) -> anyhow::Result<Self::Foreign>;
    fn shape_of(&self, tensor: &Self::Native) -> Vec<usize>;
}

/// The three collaborators a cache miss goes through.
pub struct Toolchain<T> {
    pub canonicalizer: Arc<dyn Canonicalizer>,
    pub codegen: Arc<dyn KernelCodegen>,
    pub loader: Arc<dyn KernelLoader<T>>,
}

impl<T> Toolchain<T> {
    pub fn new(
        canonicalizer: Arc<dyn Canonicalizer>,
        codegen: Arc<dyn KernelCodegen>,
        loader: Arc<dyn KernelLoader<T>>,
    ) -> Self {
        Self {
            canonicalizer,
            codegen,
            loader,
        }
    }
}

impl<T> Clone for Toolchain<T> {
    fn clone(&self) -> Self {
        Self {
            canonicalizer: Arc::clone(&self.canonicalizer),
            codegen: Arc::clone(&self.codegen),
            loader: Arc::clone(&self.loader),
        }
    }
}
