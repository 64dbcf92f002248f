//! The compress/write scheduler: a fixed-capacity ring of job slots
//! cycling `EMPTY -> FULL -> COMPRESSING -> COMPRESSED -> WRITING ->
//! EMPTY`. One producer thread fills slots in order, a pool of worker
//! threads compress whichever slot is `FULL` next, and a single writer
//! thread drains slots strictly in the order they were enqueued, so
//! archive byte order matches input order regardless of which worker
//! finished which job first.
//!
//! Explicit threads and bounded queues rather than an async runtime:
//! `rayon` fits the reader-side parallel extraction in
//! [`crate::archive`] instead, since that fan-out has no ordering
//! requirement and this one does.

use std::sync::{Condvar, Mutex};
use std::thread;

use tracing::{instrument, trace};

/// One unit of work: bytes to compress plus the journal filename they
/// should be written under.
#[derive(Debug, Clone)]
pub struct Job {
    pub filename: String,
    pub input: Vec<u8>,
}

/// The result of compressing one [`Job`].
#[derive(Debug, Clone)]
pub struct CompressedJob {
    pub filename: String,
    pub compressed: Vec<u8>,
}

enum Slot {
    Job(Job),
    Compressing,
    Compressed(CompressedJob),
}

struct State {
    slots: Vec<Option<Slot>>,
    /// Logical index of the next job the producer will place.
    fill_index: usize,
    /// Total job count, known once the producer has enqueued everything.
    total: Option<usize>,
}

struct Ring {
    state: Mutex<State>,
    changed: Condvar,
    capacity: usize,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(State { slots: (0..capacity).map(|_| None).collect(), fill_index: 0, total: None }),
            changed: Condvar::new(),
            capacity,
        }
    }

    fn push_job(&self, job: Job) {
        let mut state = self.state.lock().unwrap();
        loop {
            let pos = state.fill_index % self.capacity;
            if state.slots[pos].is_none() {
                state.slots[pos] = Some(Slot::Job(job));
                state.fill_index += 1;
                self.changed.notify_all();
                return;
            }
            state = self.changed.wait(state).unwrap();
        }
    }

    fn mark_producer_done(&self) {
        let mut state = self.state.lock().unwrap();
        state.total = Some(state.fill_index);
        self.changed.notify_all();
    }

    /// Claim the next `FULL` slot for compression, blocking until one
    /// exists or the scheduler is entirely drained. Returns `None` once
    /// every job has been produced and compressed.
    fn claim_job(&self) -> Option<(usize, Job)> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(pos) = (0..self.capacity).find(|&p| matches!(state.slots[p], Some(Slot::Job(_)))) {
                let job = match state.slots[pos].take() {
                    Some(Slot::Job(job)) => job,
                    _ => unreachable!(),
                };
                state.slots[pos] = Some(Slot::Compressing);
                return Some((pos, job));
            }
            if self.fully_drained(&state) {
                return None;
            }
            state = self.changed.wait(state).unwrap();
        }
    }

    fn deposit_compressed(&self, pos: usize, result: CompressedJob) {
        let mut state = self.state.lock().unwrap();
        state.slots[pos] = Some(Slot::Compressed(result));
        self.changed.notify_all();
    }

    fn fully_drained(&self, state: &State) -> bool {
        state.total == Some(state.fill_index) && state.slots.iter().all(|s| !matches!(s, Some(Slot::Job(_)) | Some(Slot::Compressing)))
    }

    /// Blocks until logical slot `idx` holds a compressed result, then
    /// takes and returns it. Returns `None` once `idx` has reached the
    /// total job count.
    fn take_compressed(&self, idx: usize) -> Option<CompressedJob> {
        let pos = idx % self.capacity;
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(Slot::Compressed(_)) = &state.slots[pos] {
                let result = match state.slots[pos].take() {
                    Some(Slot::Compressed(r)) => r,
                    _ => unreachable!(),
                };
                self.changed.notify_all();
                return Some(result);
            }
            if state.total.map(|n| idx >= n).unwrap_or(false) {
                return None;
            }
            state = self.changed.wait(state).unwrap();
        }
    }
}

/// Runs `compress_fn` over every [`Job`] produced by iterating `jobs`,
/// using `worker_count` compressor threads, and calls `on_compressed`
/// from the current thread in the exact order `jobs` yielded them, so
/// compressed blocks are written in the exact order they were
/// enqueued.
///
/// `capacity` bounds how many jobs may be in flight (filled, being
/// compressed, or compressed-but-unwritten) at once.
#[instrument(skip_all, fields(worker_count, capacity))]
pub fn run<I, C, W>(jobs: I, worker_count: usize, capacity: usize, compress_fn: C, mut on_compressed: W)
where
    I: IntoIterator<Item = Job>,
    C: Fn(Job) -> CompressedJob + Send + Sync + 'static,
    W: FnMut(CompressedJob),
{
    let worker_count = worker_count.max(1);
    let ring = std::sync::Arc::new(Ring::new(capacity));
    let compress_fn = std::sync::Arc::new(compress_fn);

    let producer_ring = std::sync::Arc::clone(&ring);
    let producer = thread::Builder::new()
        .name("zpaq-producer".to_string())
        .spawn(move || {
            for job in jobs {
                producer_ring.push_job(job);
            }
            producer_ring.mark_producer_done();
        })
        .expect("failed to spawn producer thread");

    let workers: Vec<_> = (0..worker_count)
        .map(|id| {
            let ring = std::sync::Arc::clone(&ring);
            let compress_fn = std::sync::Arc::clone(&compress_fn);
            thread::Builder::new()
                .name(format!("zpaq-compress-{id}"))
                .spawn(move || {
                    while let Some((pos, job)) = ring.claim_job() {
                        trace!(filename = %job.filename, "compressing job");
                        let result = compress_fn(job);
                        ring.deposit_compressed(pos, result);
                    }
                })
                .expect("failed to spawn compressor thread")
        })
        .collect();

    let mut idx = 0usize;
    while let Some(result) = ring.take_compressed(idx) {
        on_compressed(result);
        idx += 1;
    }

    producer.join().expect("producer thread panicked");
    for worker in workers {
        worker.join().expect("compressor thread panicked");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    #[test]
    fn writer_order_matches_enqueue_order_regardless_of_worker_count() {
        let jobs: Vec<Job> = (0..40).map(|i| Job { filename: format!("f{i}"), input: vec![i as u8] }).collect();
        let results = Arc::new(StdMutex::new(Vec::new()));
        let results_clone = Arc::clone(&results);
        run(
            jobs,
            6,
            3,
            |job| {
                // vary compression latency to stress out-of-order completion
                if job.input.first() == Some(&7) {
                    thread::yield_now();
                }
                CompressedJob { filename: job.filename.clone(), compressed: job.input }
            },
            move |done| results_clone.lock().unwrap().push(done.filename),
        );
        let names = results.lock().unwrap().clone();
        let expected: Vec<String> = (0..40).map(|i| format!("f{i}")).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn empty_job_stream_terminates_cleanly() {
        let jobs: Vec<Job> = Vec::new();
        let mut seen = 0;
        run(jobs, 3, 4, |job| CompressedJob { filename: job.filename.clone(), compressed: job.input }, |_| seen += 1);
        assert_eq!(seen, 0);
    }

    #[test]
    fn capacity_smaller_than_job_count_still_completes() {
        let jobs: Vec<Job> = (0..10).map(|i| Job { filename: format!("f{i}"), input: vec![] }).collect();
        let mut seen = 0;
        run(jobs, 2, 1, |job| CompressedJob { filename: job.filename.clone(), compressed: job.input }, |_| seen += 1);
        assert_eq!(seen, 10);
    }
}
