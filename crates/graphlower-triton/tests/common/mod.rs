#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, bail, ensure};
use graphlower::hashing::fnv1a_hash;
use graphlower::{DType, Graph, GraphNode, Shape, TensorType};
use graphlower_triton::{
    CanonicalGraph, Canonicalizer, KernelCodegen, KernelLoader, KernelModule, RuntimeConfig,
    TensorInterop, Toolchain, TritonOpExecutor,
};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Debug, Clone, PartialEq)]
pub struct HostTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl HostTensor {
    pub fn filled(shape: &[usize], value: f32) -> Self {
        let len = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: vec![value; len],
        }
    }
}

/// Caller-side handle: a flat buffer plus the shape it should be viewed as.
#[derive(Debug, Clone, PartialEq)]
pub struct ForeignTensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl ForeignTensor {
    pub fn filled(shape: &[usize], value: f32) -> Self {
        let HostTensor { shape, data } = HostTensor::filled(shape, value);
        Self { shape, data }
    }
}

#[derive(Default)]
pub struct HostInterop {
    pub conversions: AtomicUsize,
}

impl TensorInterop for HostInterop {
    type Foreign = ForeignTensor;
    type Native = HostTensor;

    fn from_foreign(&self, tensor: ForeignTensor) -> anyhow::Result<HostTensor> {
        self.conversions.fetch_add(1, Ordering::SeqCst);
        let expected: usize = tensor.shape.iter().product();
        ensure!(
            expected == tensor.data.len(),
            "shape {:?} needs {expected} elements, got {}",
            tensor.shape,
            tensor.data.len()
        );
        Ok(HostTensor {
            shape: tensor.shape,
            data: tensor.data,
        })
    }

    fn to_foreign(&self, tensor: HostTensor) -> anyhow::Result<ForeignTensor> {
        self.conversions.fetch_add(1, Ordering::SeqCst);
        Ok(ForeignTensor {
            shape: tensor.shape,
            data: tensor.data,
        })
    }

    fn shape_of(&self, tensor: &HostTensor) -> Vec<usize> {
        tensor.shape.clone()
    }
}

/// Counts calls and fails the next `fail_next` of them.
#[derive(Default)]
pub struct CallCounter {
    calls: AtomicUsize,
    fail_next: AtomicUsize,
}

impl CallCounter {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn fail_next(&self, count: usize) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    fn record(&self, stage: &str) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.fail_next.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_next.store(pending - 1, Ordering::SeqCst);
            bail!("injected {stage} failure");
        }
        Ok(())
    }
}

/// Identity depends on the graph name and shapes, or on the name alone when `ignore_shapes`.
#[derive(Default)]
pub struct NameCanonicalizer {
    pub counter: CallCounter,
    pub ignore_shapes: bool,
}

impl Canonicalizer for NameCanonicalizer {
    fn canonicalize(&self, graph: &Graph, shapes: &[Vec<usize>]) -> anyhow::Result<CanonicalGraph> {
        self.counter.record("canonicalize")?;
        let text = if self.ignore_shapes {
            graph.name.clone()
        } else {
            format!("{}|{shapes:?}", graph.name)
        };
        Ok(CanonicalGraph {
            graph: graph.clone(),
            identity: fnv1a_hash(text.as_bytes()),
        })
    }
}

/// Emits a stub Python function. `panic_once` makes the next call panic instead of failing.
#[derive(Default)]
pub struct PythonCodegen {
    pub counter: CallCounter,
    pub delay: Option<Duration>,
    pub panic_once: AtomicBool,
}

impl KernelCodegen for PythonCodegen {
    fn generate(&self, function_name: &str, graph: &CanonicalGraph) -> anyhow::Result<String> {
        self.counter.record("generate")?;
        if self.panic_once.swap(false, Ordering::SeqCst) {
            panic!("code generator crashed");
        }
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        Ok(format!(
            "def {function_name}(*args):\n    # {} nodes\n    return args\n",
            graph.graph.nodes.len()
        ))
    }
}

/// Loaded module that doubles every element and fails on empty inputs.
pub struct DoublingModule {
    pub source: String,
    pub invocations: AtomicUsize,
}

impl KernelModule<HostTensor> for DoublingModule {
    fn invoke(&self, symbol: &str, args: &[HostTensor]) -> anyhow::Result<Vec<HostTensor>> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        ensure!(
            self.source.contains(symbol),
            "symbol {symbol} not defined by module"
        );
        args.iter()
            .map(|tensor| {
                if tensor.data.is_empty() {
                    return Err(anyhow!("{symbol}: empty input"));
                }
                Ok(HostTensor {
                    shape: tensor.shape.clone(),
                    data: tensor.data.iter().map(|value| value * 2.0).collect(),
                })
            })
            .collect()
    }
}

#[derive(Default)]
pub struct RecordingLoader {
    pub counter: CallCounter,
    pub loaded: Mutex<Vec<String>>,
}

impl KernelLoader<HostTensor> for RecordingLoader {
    fn load(&self, source: &str) -> anyhow::Result<Arc<dyn KernelModule<HostTensor>>> {
        self.counter.record("load")?;
        self.loaded
            .lock()
            .map_err(|_| anyhow!("loader log poisoned"))?
            .push(source.to_string());
        Ok(Arc::new(DoublingModule {
            source: source.to_string(),
            invocations: AtomicUsize::new(0),
        }))
    }
}

pub struct Doubles {
    pub canonicalizer: Arc<NameCanonicalizer>,
    pub codegen: Arc<PythonCodegen>,
    pub loader: Arc<RecordingLoader>,
}

impl Doubles {
    pub fn new() -> Self {
        Self::with(NameCanonicalizer::default(), PythonCodegen::default())
    }

    pub fn with(canonicalizer: NameCanonicalizer, codegen: PythonCodegen) -> Self {
        Self {
            canonicalizer: Arc::new(canonicalizer),
            codegen: Arc::new(codegen),
            loader: Arc::new(RecordingLoader::default()),
        }
    }

    pub fn toolchain(&self) -> Toolchain<HostTensor> {
        Toolchain::new(
            self.canonicalizer.clone(),
            self.codegen.clone(),
            self.loader.clone(),
        )
    }

    pub fn executor(&self, config: RuntimeConfig) -> TritonOpExecutor<HostInterop> {
        TritonOpExecutor::new(HostInterop::default(), self.toolchain(), config)
    }
}

pub fn scaled_exp_graph(name: &str) -> Graph {
    let ty = TensorType::new(DType::F32, Shape::from_static(&[2, 3]));
    Graph::new(name)
        .with_input("x", ty.clone())
        .with_output("y", ty)
        .with_node(GraphNode::new(
            "Exp",
            vec!["x".to_string()],
            vec!["y".to_string()],
            "exp",
        ))
}

pub fn graph_bytes(name: &str) -> Vec<u8> {
    scaled_exp_graph(name)
        .to_bytes()
        .expect("graph serializes")
}
