//! Lightweight counters for cache events and compile timings.
//!
//! Everything here compiles to a no-op unless the `profiler` feature is enabled.

#[cfg(feature = "profiler")]
use std::collections::BTreeMap;
#[cfg(feature = "profiler")]
use std::sync::Mutex;
#[cfg(feature = "profiler")]
use std::time::{Duration, Instant};

#[cfg(feature = "profiler")]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileStat {
    pub calls: u64,
    pub total: Duration,
}

#[cfg(feature = "profiler")]
#[derive(Default)]
struct Profiler {
    cache_events: BTreeMap<&'static str, u64>,
    compile: BTreeMap<&'static str, CompileStat>,
}

#[cfg(feature = "profiler")]
static PROFILER: Mutex<Option<Profiler>> = Mutex::new(None);

#[cfg(feature = "profiler")]
fn with_profiler<R>(f: impl FnOnce(&mut Profiler) -> R) -> R {
    let mut guard = PROFILER.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(guard.get_or_insert_with(Profiler::default))
}

/// Times the enclosing compile step until dropped.
pub struct ScopeGuard {
    #[cfg(feature = "profiler")]
    name: &'static str,
    #[cfg(feature = "profiler")]
    start: Instant,
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        #[cfg(feature = "profiler")]
        {
            let elapsed = self.start.elapsed();
            with_profiler(|profiler| {
                let stat = profiler.compile.entry(self.name).or_default();
                stat.calls += 1;
                stat.total += elapsed;
            });
        }
    }
}

#[inline(always)]
pub fn compile_scope(name: &'static str) -> ScopeGuard {
    #[cfg(feature = "profiler")]
    {
        ScopeGuard {
            name,
            start: Instant::now(),
        }
    }
    #[cfg(not(feature = "profiler"))]
    {
        let _ = name;
        ScopeGuard {}
    }
}

#[inline(always)]
pub fn cache_event(name: &'static str) {
    #[cfg(feature = "profiler")]
    {
        with_profiler(|profiler| *profiler.cache_events.entry(name).or_insert(0) += 1);
    }
    #[cfg(not(feature = "profiler"))]
    {
        let _ = name;
    }
}

/// Returns and clears the recorded cache event counts.
#[cfg(feature = "profiler")]
pub fn take_cache_events() -> BTreeMap<&'static str, u64> {
    with_profiler(|profiler| std::mem::take(&mut profiler.cache_events))
}

/// Returns and clears the recorded compile timings.
#[cfg(feature = "profiler")]
pub fn take_compile_stats() -> BTreeMap<&'static str, CompileStat> {
    with_profiler(|profiler| std::mem::take(&mut profiler.compile))
}
