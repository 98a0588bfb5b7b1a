//! Background loader pool: a fixed set of worker threads that decode
//! sounds off the audio thread and feed the result into a
//! [`crate::memory::preroll::PrerollCache`].
//!
//! Unlike a predictive prefetcher, this pool never guesses what will be
//! needed next. It is driven entirely by two real signals the scheduler
//! and voice pool already have: an explicit precache request, or a
//! flow's lookahead horizon (a node that will start a sound within the
//! next `N` rendered frames enqueues a load with a deadline so the
//! loader can prioritize the most urgent work first).

use crossbeam_channel::{Receiver, Sender, bounded};
use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::memory::preroll::PrerollCache;

/// Urgency class for a load request. Requests are served in `Immediate`
/// before `Horizon` before `Precache` order; within a class, `Horizon`
/// requests are further ordered by deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LoadPriority {
    Immediate = 0,
    Horizon = 1,
    Precache = 2,
}

#[derive(Debug, Clone)]
pub struct LoadRequest {
    pub name: String,
    pub priority: LoadPriority,
    /// Sample-frame deadline by which the voice pool needs the data;
    /// `None` for precache requests, which have no deadline.
    pub deadline_sample: Option<u64>,
    sequence: u64,
}

impl PartialEq for LoadRequest {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority
            && self.deadline_sample == other.deadline_sample
            && self.sequence == other.sequence
    }
}
impl Eq for LoadRequest {}

impl Ord for LoadRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| match (self.deadline_sample, other.deadline_sample) {
                (Some(a), Some(b)) => a.cmp(&b),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}
impl PartialOrd for LoadRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Decodes and resamples `name` into interleaved `f32` frames at the
/// engine's render sample rate, returning the channel count. Supplied by
/// the engine, which closes over the sound delegate, soundtrack, and
/// resampler so this module stays free of stream/format concerns.
pub type DecodeFn = dyn Fn(&str) -> Option<(Vec<f32>, u16)> + Send + Sync;

pub struct LoaderPool {
    request_tx: Sender<LoadRequest>,
    queue: Arc<Mutex<BinaryHeap<Reverse<LoadRequest>>>>,
    sequence: Arc<AtomicU64>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl LoaderPool {
    pub fn new(cache: Arc<PrerollCache>, decode: Arc<DecodeFn>, worker_count: usize) -> Self {
        let (request_tx, request_rx) = bounded::<LoadRequest>(crate::constants::LOAD_REQUEST_CHANNEL_BOUND);
        let shutdown = Arc::new(AtomicBool::new(false));
        let queue: Arc<Mutex<BinaryHeap<Reverse<LoadRequest>>>> = Arc::new(Mutex::new(BinaryHeap::new()));

        let mut workers = Vec::with_capacity(worker_count);
        for id in 0..worker_count.max(1) {
            let request_rx = request_rx.clone();
            let shutdown = shutdown.clone();
            let queue = queue.clone();
            let cache = cache.clone();
            let decode = decode.clone();

            let handle = thread::Builder::new()
                .name(format!("sms-loader-{id}"))
                .spawn(move || Self::worker_loop(request_rx, shutdown, queue, cache, decode))
                .expect("failed to spawn loader worker thread");
            workers.push(handle);
        }

        Self {
            request_tx,
            queue,
            sequence: Arc::new(AtomicU64::new(0)),
            workers,
            shutdown,
        }
    }

    /// Enqueue a load. Real-time safe: bounded, non-blocking send: a
    /// saturated queue simply drops the request, and the caller is
    /// expected to retry on the next horizon check.
    pub fn request_load(&self, name: &str, priority: LoadPriority, deadline_sample: Option<u64>) -> bool {
        let sequence = self.sequence.fetch_add(1, AtomicOrdering::Relaxed);
        let request = LoadRequest {
            name: name.to_string(),
            priority,
            deadline_sample,
            sequence,
        };
        self.request_tx.try_send(request).is_ok()
    }

    pub fn pending_count(&self) -> usize {
        self.queue.lock().map(|q| q.len()).unwrap_or(0)
    }

    fn worker_loop(
        request_rx: Receiver<LoadRequest>,
        shutdown: Arc<AtomicBool>,
        queue: Arc<Mutex<BinaryHeap<Reverse<LoadRequest>>>>,
        cache: Arc<PrerollCache>,
        decode: Arc<DecodeFn>,
    ) {
        loop {
            if shutdown.load(AtomicOrdering::Relaxed) {
                return;
            }

            while let Ok(request) = request_rx.try_recv() {
                if let Ok(mut q) = queue.lock() {
                    q.push(Reverse(request));
                }
            }

            let next = queue.lock().ok().and_then(|mut q| q.pop());

            match next {
                Some(Reverse(request)) => {
                    if cache.contains(&request.name) {
                        continue;
                    }
                    if let Some((samples, channels)) = decode(&request.name) {
                        cache.insert(&request.name, &samples, channels);
                    } else {
                        tracing::warn!(sound = %request.name, "loader failed to decode sound");
                    }
                }
                None => {
                    thread::sleep(std::time::Duration::from_millis(1));
                }
            }
        }
    }
}

impl Drop for LoaderPool {
    fn drop(&mut self) {
        // A single shared flag every worker polls, rather than one signal
        // per worker down a shared channel: a `bounded(1)` channel only
        // guarantees the *first* `try_send` lands, so with more than one
        // worker the rest would never see a shutdown signal and `join`
        // below would hang forever.
        self.shutdown.store(true, AtomicOrdering::Relaxed);
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ordering_prefers_immediate_then_earlier_deadline() {
        let a = LoadRequest {
            name: "a".into(),
            priority: LoadPriority::Horizon,
            deadline_sample: Some(100),
            sequence: 0,
        };
        let b = LoadRequest {
            name: "b".into(),
            priority: LoadPriority::Immediate,
            deadline_sample: None,
            sequence: 1,
        };
        let c = LoadRequest {
            name: "c".into(),
            priority: LoadPriority::Horizon,
            deadline_sample: Some(50),
            sequence: 2,
        };

        let mut heap = BinaryHeap::new();
        heap.push(Reverse(a.clone()));
        heap.push(Reverse(b.clone()));
        heap.push(Reverse(c.clone()));

        assert_eq!(heap.pop().unwrap().0.name, "b");
        assert_eq!(heap.pop().unwrap().0.name, "c");
        assert_eq!(heap.pop().unwrap().0.name, "a");
    }
}
