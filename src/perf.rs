//! Worker-pool primitive for the embarrassingly parallel loops in the
//! region engine and processor (per-row brick fill during `write_window`,
//! per-brick encode during a `Processor::convert` pass).
//!
//! # Parallel-for
//!
//! [`parallel_for`] dispatches `f(thread_idx, item)` across `N` workers.
//! Safe to call from a single-threaded context: behind the `parallel`
//! feature it spins up a sized Rayon pool; without it, it falls back to a
//! plain sequential loop over the same items with `thread_idx` pinned at 0.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Run `f(thread_idx, item)` over `items`, across `num_workers` workers
/// (`0` means hardware concurrency, clamped to a lower bound of 1). The
/// first error returned by any call is propagated to the caller once every
/// in-flight item has settled; there is no ordering guarantee between
/// items, so `f` must be re-entrant with respect to `thread_idx`.
pub fn parallel_for<T, F, E>(items: &[T], num_workers: usize, f: F) -> Result<(), E>
where
    T: Sync,
    F: Fn(usize, &T) -> Result<(), E> + Sync,
    E: Send,
{
    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;

        let workers = if num_workers == 0 { rayon::current_num_threads() } else { num_workers.max(1) };
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build()
            .expect("failed to build worker pool");
        let next = AtomicUsize::new(0);

        pool.install(|| {
            items.par_iter().try_for_each(|item| {
                let idx = next.fetch_add(1, Ordering::Relaxed) % workers;
                f(idx, item)
            })
        })
    }

    #[cfg(not(feature = "parallel"))]
    {
        let _ = num_workers;
        for item in items {
            f(0, item)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU64;
    use std::sync::atomic::Ordering as AtomicOrdering;

    #[test]
    fn visits_every_item_exactly_once() {
        let items: Vec<u64> = (0..256).collect();
        let sum = AtomicU64::new(0);
        parallel_for::<_, _, std::convert::Infallible>(&items, 0, |_idx, item| {
            sum.fetch_add(*item, AtomicOrdering::Relaxed);
            Ok(())
        })
        .unwrap();
        assert_eq!(sum.load(AtomicOrdering::Relaxed), (0..256).sum());
    }

    #[test]
    fn first_error_is_propagated() {
        let items = vec![1, 2, 3, 4];
        let result: Result<(), &'static str> = parallel_for(&items, 1, |_idx, item| {
            if *item == 3 {
                Err("boom")
            } else {
                Ok(())
            }
        });
        assert_eq!(result, Err("boom"));
    }
}
