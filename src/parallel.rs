//! Fork-join passes over one time-slice.
//!
//! A pass splits the output into as many contiguous chunks as there are
//! workers; rayon's join at the end of the pass is the barrier. Each output
//! element is computed by exactly one worker from read-only inputs, so the
//! result does not depend on the chunking.
use crate::error::{EvolutionError, Result};
use crate::WORKER_THREADS;
use rayon::prelude::*;
use std::sync::atomic::Ordering;

/// A fixed set of worker threads shared by every pass of a batch.
pub struct WorkerPool {
    pool: rayon::ThreadPool,
}

impl WorkerPool {
    /// `threads == 0` means one worker per core.
    pub fn new(threads: usize) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("nrqcd-worker-{}", i))
            .build()
            .map_err(|e| EvolutionError::WorkerPool(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Pool sized by [`WORKER_THREADS`].
    pub fn from_global() -> Result<Self> {
        Self::new(WORKER_THREADS.load(Ordering::Relaxed) as usize)
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Runs `op` with this pool as the target of every nested pass.
    pub fn install<R: Send>(&self, op: impl FnOnce() -> R + Send) -> R {
        self.pool.install(op)
    }
}

#[inline]
fn chunk_len(len: usize) -> usize {
    len.div_ceil(rayon::current_num_threads()).max(1)
}

/// `out[j] = f(j)` for every `j`.
pub(crate) fn par_fill<T, F>(out: &mut [T], f: F)
where
    T: Send,
    F: Fn(usize) -> T + Sync,
{
    let chunk = chunk_len(out.len());
    out.par_chunks_mut(chunk).enumerate().for_each(|(c, part)| {
        let j0 = c * chunk;
        for (k, x) in part.iter_mut().enumerate() {
            *x = f(j0 + k);
        }
    });
}

/// `f(j, &mut out[j])` for every `j`.
pub(crate) fn par_update<T, F>(out: &mut [T], f: F)
where
    T: Send,
    F: Fn(usize, &mut T) + Sync,
{
    let chunk = chunk_len(out.len());
    out.par_chunks_mut(chunk).enumerate().for_each(|(c, part)| {
        let j0 = c * chunk;
        for (k, x) in part.iter_mut().enumerate() {
            f(j0 + k, x);
        }
    });
}

/// Like [`par_update`], but hands each worker its whole chunk with the index
/// of its first element, for passes that carry per-chunk state.
pub(crate) fn par_chunks<T, F>(out: &mut [T], f: F)
where
    T: Send,
    F: Fn(usize, &mut [T]) + Sync,
{
    let chunk = chunk_len(out.len());
    out.par_chunks_mut(chunk)
        .enumerate()
        .for_each(|(c, part)| f(c * chunk, part));
}
