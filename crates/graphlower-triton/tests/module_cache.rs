mod common;

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use common::{graph_bytes, init_logger, Doubles, HostTensor, NameCanonicalizer, PythonCodegen};
use graphlower_triton::module_cache::function_name_for;
use graphlower_triton::{CompileStage, ModuleCache, ModuleCacheKey, RuntimeConfig, RuntimeError};

fn cache(doubles: &Doubles) -> ModuleCache<HostTensor> {
    ModuleCache::new(doubles.toolchain(), RuntimeConfig::default())
}

#[test]
fn identical_requests_compile_once() -> anyhow::Result<()> {
    init_logger();
    let doubles = Doubles::new();
    let cache = cache(&doubles);
    let bytes = graph_bytes("exp");

    let first = cache.get_or_compile(1, &bytes, vec![vec![2, 3]])?;
    let second = cache.get_or_compile(1, &bytes, vec![vec![2, 3]])?;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(doubles.canonicalizer.counter.calls(), 1);
    assert_eq!(doubles.codegen.counter.calls(), 1);
    assert_eq!(doubles.loader.counter.calls(), 1);
    assert_eq!(cache.len(), 1);
    assert!(cache.contains(&ModuleCacheKey::new(1, vec![vec![2, 3]])));

    let third = cache.get_or_compile(1, &bytes, vec![vec![4, 3]])?;
    assert!(!Arc::ptr_eq(&first, &third));
    assert_eq!(doubles.codegen.counter.calls(), 2);
    assert_eq!(doubles.loader.counter.calls(), 2);
    assert_eq!(cache.len(), 2);
    Ok(())
}

#[test]
fn function_name_comes_from_the_canonical_identity() -> anyhow::Result<()> {
    let doubles = Doubles::new();
    let cache = cache(&doubles);

    let compiled = cache.get_or_compile(9, &graph_bytes("exp"), vec![vec![2, 3]])?;

    assert!(compiled.function_name.starts_with("call_"));
    assert_eq!(compiled.function_name.len(), "call_".len() + 16);
    let loaded = doubles.loader.loaded.lock().expect("loader log");
    assert!(loaded[0].contains(&compiled.function_name));
    Ok(())
}

#[test]
fn reset_forces_recompilation() -> anyhow::Result<()> {
    let doubles = Doubles::new();
    let cache = cache(&doubles);
    let bytes = graph_bytes("exp");

    cache.get_or_compile(1, &bytes, vec![vec![2, 3]])?;
    cache.reset();
    assert!(cache.is_empty());

    cache.get_or_compile(1, &bytes, vec![vec![2, 3]])?;
    assert_eq!(doubles.codegen.counter.calls(), 2);
    assert_eq!(doubles.loader.counter.calls(), 2);
    Ok(())
}

#[test]
fn failed_compilation_is_not_cached() -> anyhow::Result<()> {
    init_logger();
    let doubles = Doubles::new();
    let cache = cache(&doubles);
    let bytes = graph_bytes("exp");

    doubles.loader.counter.fail_next(1);
    let err = cache
        .get_or_compile(1, &bytes, vec![vec![2, 3]])
        .expect_err("loader fails once");
    assert!(matches!(
        err,
        RuntimeError::Compilation {
            stage: CompileStage::Load,
            ..
        }
    ));
    assert!(cache.is_empty());

    cache.get_or_compile(1, &bytes, vec![vec![2, 3]])?;
    assert_eq!(doubles.codegen.counter.calls(), 2);
    assert_eq!(doubles.loader.counter.calls(), 2);
    assert_eq!(cache.len(), 1);
    Ok(())
}

#[test]
fn panicking_collaborator_does_not_block_the_key() -> anyhow::Result<()> {
    init_logger();
    let doubles = Doubles::with(
        NameCanonicalizer::default(),
        PythonCodegen {
            panic_once: AtomicBool::new(true),
            ..PythonCodegen::default()
        },
    );
    let cache = cache(&doubles);
    let bytes = graph_bytes("exp");

    let crashed = panic::catch_unwind(AssertUnwindSafe(|| {
        cache.get_or_compile(1, &bytes, vec![vec![2, 3]])
    }));
    assert!(crashed.is_err());
    assert!(cache.is_empty());

    let compiled = cache.get_or_compile(1, &bytes, vec![vec![2, 3]])?;
    assert!(compiled.function_name.starts_with("call_"));
    assert_eq!(doubles.codegen.counter.calls(), 2);
    assert_eq!(doubles.loader.counter.calls(), 1);
    assert!(cache.contains(&ModuleCacheKey::new(1, vec![vec![2, 3]])));
    Ok(())
}

#[test]
fn compilation_errors_name_the_failing_stage() {
    let doubles = Doubles::new();
    let cache = cache(&doubles);
    let bytes = graph_bytes("exp");

    doubles.canonicalizer.counter.fail_next(1);
    let err = cache
        .get_or_compile(1, &bytes, vec![vec![2, 3]])
        .expect_err("canonicalizer fails");
    assert!(matches!(
        err,
        RuntimeError::Compilation {
            stage: CompileStage::Canonicalize,
            ..
        }
    ));

    doubles.codegen.counter.fail_next(1);
    let err = cache
        .get_or_compile(1, &bytes, vec![vec![2, 3]])
        .expect_err("codegen fails");
    assert!(matches!(
        err,
        RuntimeError::Compilation {
            stage: CompileStage::Generate,
            ..
        }
    ));
    assert_eq!(format!("{:#}", anyhow::Error::new(err)), "compilation failed during generate: injected generate failure");
    assert_eq!(doubles.loader.counter.calls(), 0);
}

#[test]
fn undecodable_graph_bytes_are_reported() {
    let doubles = Doubles::new();
    let cache = cache(&doubles);

    let err = cache
        .get_or_compile(1, &[0xff, 0xff, 0xff], vec![])
        .expect_err("garbage bytes");
    assert!(matches!(err, RuntimeError::GraphDecode(_)));
    assert_eq!(doubles.canonicalizer.counter.calls(), 0);
}

#[test]
fn keys_sharing_a_canonical_graph_share_the_module() -> anyhow::Result<()> {
    let doubles = Doubles::with(
        NameCanonicalizer {
            ignore_shapes: true,
            ..NameCanonicalizer::default()
        },
        PythonCodegen::default(),
    );
    let cache = cache(&doubles);
    let bytes = graph_bytes("exp");

    let first = cache.get_or_compile(1, &bytes, vec![vec![2, 3]])?;
    let second = cache.get_or_compile(2, &bytes, vec![vec![2, 3]])?;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(doubles.canonicalizer.counter.calls(), 2);
    assert_eq!(doubles.codegen.counter.calls(), 1);
    assert_eq!(cache.len(), 2);
    Ok(())
}

#[test]
fn concurrent_misses_on_one_key_compile_once() -> anyhow::Result<()> {
    let doubles = Doubles::with(
        NameCanonicalizer::default(),
        PythonCodegen {
            delay: Some(Duration::from_millis(20)),
            ..PythonCodegen::default()
        },
    );
    let cache = Arc::new(cache(&doubles));
    let bytes = Arc::new(graph_bytes("exp"));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let bytes = Arc::clone(&bytes);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache
                    .get_or_compile(1, &bytes, vec![vec![2, 3]])
                    .map(|compiled| compiled.function_name.clone())
            })
        })
        .collect();

    let mut names = Vec::new();
    for handle in handles {
        names.push(handle.join().expect("worker thread panicked")?);
    }

    assert_eq!(doubles.codegen.counter.calls(), 1);
    assert_eq!(doubles.loader.counter.calls(), 1);
    assert!(names.windows(2).all(|pair| pair[0] == pair[1]));
    Ok(())
}

#[test]
fn function_names_are_fixed_width_hex() {
    assert_eq!(function_name_for(u64::MAX), "call_ffffffffffffffff");
}
