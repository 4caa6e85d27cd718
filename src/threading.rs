use core_affinity::CoreId;
use rayon::prelude::*;

use crate::error::{Result, SimulationError};
use crate::params::{validate_technical_params, TechnicalParams};

/// Fork-join worker pool. Tasks submitted through `join`, `scope` and the
/// parallel-for helpers execute on the pool's workers; the submitting thread
/// participates. Every thread running pool work carries a stable index in
/// `0..=num_threads()` (0 for the submitting thread), usable as a slot into
/// per-thread storage such as the spike store.
pub struct TaskPool {
    pool: rayon::ThreadPool,
    num_threads: usize,
}

impl TaskPool {
    pub fn new(params: &TechnicalParams) -> Result<Self> {
        validate_technical_params(params)?;
        let num_threads = params.num_threads.unwrap_or_else(num_cpus::get);
        let pin = params.pin_threads;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads)
            .thread_name(|i| format!("fascicle-worker-{i}"))
            .start_handler(move |thread_id| {
                if pin {
                    core_affinity::set_for_current(CoreId { id: thread_id });
                }
            })
            .build()
            .map_err(|e| SimulationError::InternalInvariant(format!("thread pool: {e}")))?;

        Ok(Self { pool, num_threads })
    }

    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    /// Number of per-thread storage slots: workers plus the submitting thread.
    pub fn num_slots(&self) -> usize {
        self.num_threads + 1
    }

    /// Stable identity of the calling thread within this pool.
    pub fn thread_index(&self) -> usize {
        match self.pool.current_thread_index() {
            Some(i) => i + 1,
            None => 0,
        }
    }

    /// Run two tasks, overlapping them when a second worker is available,
    /// and wait for both.
    pub fn join<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        self.pool.install(|| rayon::join(a, b))
    }

    /// Fork-join task group: `scope` blocks until every task `run` on the
    /// group has completed; the waiting thread executes pending tasks.
    pub fn scope<'a, F>(&self, f: F)
    where
        F: FnOnce(&TaskGroup<'_, 'a>) + Send + 'a,
    {
        self.pool.in_place_scope(|s| f(&TaskGroup { scope: s }));
    }

    /// Apply `f` to every index in `0..n` across the pool's workers.
    pub fn parallel_for<F>(&self, n: usize, f: F)
    where
        F: Fn(usize) + Sync + Send,
    {
        self.pool.install(|| (0..n).into_par_iter().for_each(f));
    }

    /// Apply `f` to every element of `items` in parallel; elements are
    /// disjoint, so tasks never alias.
    pub fn parallel_for_each<T, F>(&self, items: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync + Send,
    {
        self.pool.install(|| {
            items
                .par_iter_mut()
                .enumerate()
                .for_each(|(i, item)| f(i, item))
        });
    }

    /// Build a vector by evaluating `f` at every index in parallel.
    pub fn parallel_map<R, F>(&self, n: usize, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Sync + Send,
    {
        self.pool.install(|| (0..n).into_par_iter().map(f).collect())
    }
}

pub struct TaskGroup<'s, 'a> {
    scope: &'s rayon::Scope<'a>,
}

impl<'s, 'a> TaskGroup<'s, 'a> {
    pub fn run<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'a,
    {
        self.scope.spawn(|_| f());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn pool(n: usize) -> TaskPool {
        TaskPool::new(&TechnicalParams {
            num_threads: Some(n),
            ..TechnicalParams::default()
        })
        .unwrap()
    }

    #[test]
    fn parallel_for_covers_range() {
        let pool = pool(4);
        let hits = AtomicUsize::new(0);
        pool.parallel_for(100, |_| {
            hits.fetch_add(1, Ordering::Relaxed);
        });
        assert_eq!(hits.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn parallel_for_each_mutates_disjoint() {
        let pool = pool(3);
        let mut values = vec![0usize; 17];
        pool.parallel_for_each(&mut values, |i, v| *v = i * i);
        for (i, v) in values.iter().enumerate() {
            assert_eq!(*v, i * i);
        }
    }

    #[test]
    fn join_runs_both() {
        let pool = pool(2);
        let (a, b) = pool.join(|| 1 + 1, || "done");
        assert_eq!(a, 2);
        assert_eq!(b, "done");
    }

    #[test]
    fn scope_waits_for_tasks() {
        let pool = pool(2);
        let log = Mutex::new(Vec::new());
        pool.scope(|g| {
            g.run(|| log.lock().unwrap().push("a"));
            g.run(|| log.lock().unwrap().push("b"));
        });
        let mut log = log.into_inner().unwrap();
        log.sort();
        assert_eq!(log, ["a", "b"]);
    }

    #[test]
    fn thread_index_within_slots() {
        let pool = pool(4);
        assert_eq!(pool.thread_index(), 0);
        let slots = pool.num_slots();
        let seen = Mutex::new(Vec::new());
        pool.parallel_for(64, |_| {
            let idx = pool.thread_index();
            assert!(idx < slots);
            seen.lock().unwrap().push(idx);
        });
        assert_eq!(seen.into_inner().unwrap().len(), 64);
    }

    #[test]
    fn parallel_map_collects_in_order() {
        let pool = pool(2);
        let out = pool.parallel_map(10, |i| i * 3);
        assert_eq!(out, (0..10).map(|i| i * 3).collect::<Vec<_>>());
    }
}
