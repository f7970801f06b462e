//! The batcher core: a worker thread that drains the priority queues into
//! size-capped batches and paces deliveries with a hold-off.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::BatcherError;

use super::config::{BatcherConfig, HoldOff};
use super::metrics::BatcherMetrics;
use super::priority::Priority;
use super::queue::PriorityQueueSet;
use super::wake::WakeSignal;

/// Sink for delivered batches.
///
/// `process` is called from the batcher's worker thread only. The items in
/// `batch` are guaranteed valid only for the duration of the call; a
/// consumer that needs to keep one beyond that must clone the `Arc`.
///
/// The batcher does not observe the outcome of a delivery. There is no
/// retry policy and no notion of which items in a batch succeeded, so
/// partial failure is the consumer's to handle.
pub trait BatchConsumer<T>: Send + Sync {
    /// Handle one assembled batch. The consumer may inspect, reorder, or
    /// release items through the mutable reference.
    fn process(&self, batch: &mut Vec<Arc<T>>);
}

/// Sleep function used for the hold-off between batches.
///
/// The default is a real `thread::sleep`; tests substitute a recorder.
pub type SleepFn = Box<dyn Fn(f64) + Send + Sync>;

/// Shared state between the batcher handle and its worker thread.
struct Shared<T> {
    queues: PriorityQueueSet<T>,
    params: Mutex<HoldOff>,
    wake: WakeSignal,
    shutdown: AtomicBool,
    consumer: Arc<dyn BatchConsumer<T>>,
    sleep: SleepFn,
    metrics: Arc<BatcherMetrics>,
}

/// A queue + batcher for handling outgoing requests.
///
/// Producers push individually owned requests tagged with a [`Priority`].
/// A dedicated worker thread collects them into batches, honoring the
/// configured per-batch cap and draining the highest priority first, and
/// hands each batch to the consumer. After each delivery the worker waits a
/// hold-off time interpolated linearly between the configured minimum
/// (batch of one) and maximum (full batch).
///
/// Dropping the batcher stops the worker: the shutdown flag is set, the
/// wake signal raised, and the thread joined. Requests still queued at that
/// point are dropped without delivery.
pub struct Batcher<T> {
    shared: Arc<Shared<T>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    name: String,
}

impl<T: Send + Sync + 'static> Batcher<T> {
    /// Create a batcher delivering to `consumer`, with a real sleeper.
    ///
    /// `name` becomes the worker thread name. With `config.auto_start` the
    /// worker is spawned immediately; otherwise call [`Batcher::start`].
    pub fn new(
        name: impl Into<String>,
        consumer: Arc<dyn BatchConsumer<T>>,
        config: BatcherConfig,
    ) -> Result<Self, BatcherError> {
        Self::with_sleep(
            name,
            consumer,
            config,
            Box::new(|secs| thread::sleep(Duration::from_secs_f64(secs))),
        )
    }

    /// Create a batcher with an injected sleep function.
    ///
    /// The sleeper receives the hold-off in seconds. Tests use this to
    /// observe pacing without waiting for it.
    pub fn with_sleep(
        name: impl Into<String>,
        consumer: Arc<dyn BatchConsumer<T>>,
        config: BatcherConfig,
        sleep: SleepFn,
    ) -> Result<Self, BatcherError> {
        let batcher = Self {
            shared: Arc::new(Shared {
                queues: PriorityQueueSet::new(),
                params: Mutex::new(HoldOff::from_params(
                    config.max_batch,
                    config.min_hold_ms,
                    config.max_hold_ms,
                )),
                wake: WakeSignal::default(),
                shutdown: AtomicBool::new(false),
                consumer,
                sleep,
                metrics: Arc::new(BatcherMetrics::new()),
            }),
            worker: Mutex::new(None),
            name: name.into(),
        };
        if config.auto_start {
            batcher.start()?;
        }
        Ok(batcher)
    }

    /// Start the worker thread.
    ///
    /// Only needed after constructing with `auto_start: false`.
    pub fn start(&self) -> Result<(), BatcherError> {
        let mut worker = self.worker.lock();
        if worker.is_some() {
            return Err(BatcherError::AlreadyRunning(self.name.clone()));
        }
        let shared = Arc::clone(&self.shared);
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || run_worker(shared))?;
        *worker = Some(handle);
        debug!(name = %self.name, "batcher worker started");
        Ok(())
    }

    /// Push a request onto the queue for `prio` and wake the worker.
    pub fn push(&self, cargo: Arc<T>, prio: Priority) {
        self.shared.queues.push(cargo, prio);
        self.shared.metrics.record_pushed(1);
        self.shared.wake.raise();
    }

    /// Push a vector of requests onto the queue for `prio` under one lock
    /// acquisition, then wake the worker.
    ///
    /// The wake signal is raised even for an empty vector; the resulting
    /// empty cycle is harmless and costs one minimal hold-off.
    pub fn push_many(&self, cargo: Vec<Arc<T>>, prio: Priority) {
        let count = cargo.len();
        self.shared.queues.push_many(cargo, prio);
        self.shared.metrics.record_pushed(count);
        self.shared.wake.raise();
    }

    /// Whether the queue for `prio` is currently empty. May be stale the
    /// moment it returns.
    pub fn is_empty(&self, prio: Priority) -> bool {
        self.shared.queues.is_empty(prio)
    }

    /// Number of requests queued for `prio`. May be stale the moment it
    /// returns.
    pub fn len(&self, prio: Priority) -> usize {
        self.shared.queues.len(prio)
    }

    /// Drop all queued requests without delivering them.
    ///
    /// Requests the worker has already drained into a batch are in flight
    /// and will still be delivered.
    pub fn clear(&self) {
        let dropped = self.shared.queues.clear();
        self.shared.metrics.record_cleared(dropped);
        debug!(name = %self.name, dropped, "cleared queued requests");
    }

    /// Replace the batching parameters.
    ///
    /// Takes effect from the next worker cycle; a cycle in progress keeps
    /// the snapshot it already took. `max_hold_ms` below `min_hold_ms` is
    /// not clamped (the hold-off then shrinks as batches grow).
    pub fn set_params(&self, max_batch: u32, min_hold_ms: u32, max_hold_ms: u32) {
        *self.shared.params.lock() = HoldOff::from_params(max_batch, min_hold_ms, max_hold_ms);
    }

    /// Current per-batch request cap (0 = unlimited).
    pub fn max_requests(&self) -> u32 {
        self.shared.params.lock().max_batch
    }

    /// Current minimal hold-off in milliseconds.
    pub fn min_hold_off_ms(&self) -> u32 {
        self.shared.params.lock().min_hold_ms()
    }

    /// Current maximal hold-off in milliseconds.
    pub fn max_hold_off_ms(&self) -> u32 {
        self.shared.params.lock().max_hold_ms()
    }

    /// Metrics for this batcher.
    pub fn metrics(&self) -> Arc<BatcherMetrics> {
        Arc::clone(&self.shared.metrics)
    }

    /// The worker thread name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<T> Drop for Batcher<T> {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.wake.raise();
        if let Some(handle) = self.worker.get_mut().take() {
            if handle.join().is_err() {
                debug!(name = %self.name, "batcher worker had panicked");
            }
        }
        debug!(name = %self.name, "batcher stopped");
    }
}

/// Worker thread body: wait, collect, deliver, hold off, repeat.
fn run_worker<T>(shared: Arc<Shared<T>>) {
    loop {
        shared.wake.wait();
        if shared.shutdown.load(Ordering::SeqCst) {
            break;
        }

        let max = shared.params.lock().max_batch;

        let mut batch: Vec<Arc<T>> = Vec::new();
        for prio in Priority::descending() {
            if max == 0 || (batch.len() as u32) < max {
                let remaining = if max == 0 { 0 } else { max as usize - batch.len() };
                shared.queues.drain_into(&mut batch, prio, remaining);
            }
            // Residue at any priority means another cycle is needed even if
            // no producer ever pushes again.
            if !shared.queues.is_empty(prio) {
                shared.wake.raise();
            }
        }

        if !batch.is_empty() {
            trace!(len = batch.len(), "delivering batch");
            shared.metrics.record_delivered(batch.len());
            shared.consumer.process(&mut batch);
        }

        // The batch length after delivery: a consumer that released items
        // shortens the variable hold-off term accordingly.
        let hold_off = shared.params.lock().hold_off_secs(batch.len());
        if hold_off > 0.0 {
            (shared.sleep)(hold_off);
        }
    }
    debug!("batcher worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Instant;

    struct Req {
        id: u32,
    }

    fn req(id: u32) -> Arc<Req> {
        Arc::new(Req { id })
    }

    /// Records every delivered batch as a vector of request ids.
    #[derive(Default)]
    struct Recorder {
        batches: Mutex<Vec<Vec<u32>>>,
    }

    impl Recorder {
        fn batches(&self) -> Vec<Vec<u32>> {
            self.batches.lock().clone()
        }

        fn total(&self) -> usize {
            self.batches.lock().iter().map(|b| b.len()).sum()
        }
    }

    impl BatchConsumer<Req> for Recorder {
        fn process(&self, batch: &mut Vec<Arc<Req>>) {
            self.batches.lock().push(batch.iter().map(|r| r.id).collect());
        }
    }

    /// Consumer that takes the whole batch out of the vector.
    #[derive(Default)]
    struct Draining {
        batches: Mutex<Vec<Vec<u32>>>,
    }

    impl BatchConsumer<Req> for Draining {
        fn process(&self, batch: &mut Vec<Arc<Req>>) {
            let ids = batch.drain(..).map(|r| r.id).collect();
            self.batches.lock().push(ids);
        }
    }

    /// Sleeper that records every hold-off it is asked for.
    fn recording_sleep() -> (SleepFn, Arc<Mutex<Vec<f64>>>) {
        let record = Arc::new(Mutex::new(Vec::new()));
        let sleep: SleepFn = {
            let record = Arc::clone(&record);
            Box::new(move |secs| record.lock().push(secs))
        };
        (sleep, record)
    }

    /// Sleeper that reports each call and blocks until released. Dropping
    /// the release sender unblocks it permanently.
    fn gated_sleep() -> (SleepFn, mpsc::Receiver<f64>, mpsc::Sender<()>) {
        let (call_tx, call_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let call_tx = std::sync::Mutex::new(call_tx);
        let release_rx = std::sync::Mutex::new(release_rx);
        let sleep: SleepFn = Box::new(move |secs| {
            let _ = call_tx.lock().unwrap().send(secs);
            let _ = release_rx.lock().unwrap().recv();
        });
        (sleep, call_rx, release_tx)
    }

    fn wait_until(timeout: Duration, cond: impl Fn() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        cond()
    }

    fn deferred(max_batch: u32, min_hold_ms: u32, max_hold_ms: u32) -> BatcherConfig {
        BatcherConfig {
            max_batch,
            min_hold_ms,
            max_hold_ms,
            auto_start: false,
        }
    }

    #[test]
    fn test_batch_orders_priorities_highest_first() {
        let recorder = Arc::new(Recorder::default());
        let (sleep, _) = recording_sleep();
        let batcher =
            Batcher::with_sleep("order", recorder.clone(), deferred(10, 0, 0), sleep).unwrap();

        batcher.push(req(1), Priority::Low);
        batcher.push(req(2), Priority::Low);
        batcher.push(req(3), Priority::Low);
        batcher.push(req(10), Priority::Mid);
        batcher.push(req(11), Priority::Mid);
        batcher.push(req(20), Priority::High);
        batcher.start().unwrap();

        assert!(wait_until(Duration::from_secs(5), || recorder.total() == 6));
        assert_eq!(recorder.batches(), vec![vec![20, 10, 11, 1, 2, 3]]);
    }

    #[test]
    fn test_cap_splits_into_fifo_batches() {
        let recorder = Arc::new(Recorder::default());
        let (sleep, _) = recording_sleep();
        let batcher =
            Batcher::with_sleep("cap", recorder.clone(), deferred(2, 0, 0), sleep).unwrap();

        for id in 1..=5 {
            batcher.push(req(id), Priority::Low);
        }
        batcher.start().unwrap();

        // All three batches arrive without any further producer activity:
        // the worker re-raises its own wake signal on residue.
        assert!(wait_until(Duration::from_secs(5), || recorder.total() == 5));
        assert_eq!(recorder.batches(), vec![vec![1, 2], vec![3, 4], vec![5]]);
    }

    #[test]
    fn test_hold_off_interpolates_from_batch_size() {
        let recorder = Arc::new(Recorder::default());
        let (sleep, slept) = recording_sleep();
        let batcher =
            Batcher::with_sleep("pace", recorder.clone(), deferred(10, 10, 100), sleep).unwrap();

        for id in 1..=5 {
            batcher.push(req(id), Priority::Mid);
        }
        batcher.start().unwrap();

        assert!(wait_until(Duration::from_secs(5), || !slept.lock().is_empty()));
        assert_eq!(recorder.total(), 5);
        let first = slept.lock()[0];
        assert!((first - 0.055).abs() < 1e-9, "recorded hold-off {first}");
    }

    #[test]
    fn test_consumer_releasing_items_shortens_hold_off() {
        let consumer = Arc::new(Draining::default());
        let (sleep, slept) = recording_sleep();
        let batcher =
            Batcher::with_sleep("drain", consumer.clone(), deferred(10, 10, 100), sleep).unwrap();

        for id in 1..=5 {
            batcher.push(req(id), Priority::Mid);
        }
        batcher.start().unwrap();

        assert!(wait_until(Duration::from_secs(5), || !slept.lock().is_empty()));
        assert_eq!(consumer.batches.lock().clone(), vec![vec![1, 2, 3, 4, 5]]);
        // The consumer emptied the batch, so only the fixed term remains.
        let first = slept.lock()[0];
        assert!((first - 0.010).abs() < 1e-9, "recorded hold-off {first}");
    }

    #[test]
    fn test_high_priority_starves_mid_under_cap() {
        let recorder = Arc::new(Recorder::default());
        let (sleep, calls, release) = gated_sleep();
        let batcher =
            Batcher::with_sleep("starve", recorder.clone(), deferred(1, 1, 1), sleep).unwrap();
        // Rebind so the release sender drops before the batcher and frees a
        // worker blocked in the gated sleeper.
        let release = release;

        batcher.push(req(20), Priority::High);
        batcher.push(req(10), Priority::Mid);
        batcher.start().unwrap();

        // First cycle delivers the high request, then parks in the sleeper.
        calls.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(recorder.batches(), vec![vec![20]]);

        // A high request arriving during the hold-off overtakes the queued
        // mid request.
        batcher.push(req(21), Priority::High);
        release.send(()).unwrap();
        calls.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(recorder.batches(), vec![vec![20], vec![21]]);

        release.send(()).unwrap();
        calls.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(recorder.batches(), vec![vec![20], vec![21], vec![10]]);
    }

    #[test]
    fn test_empty_wake_sleeps_fixed_hold_off() {
        let recorder = Arc::new(Recorder::default());
        let (sleep, slept) = recording_sleep();
        let config = BatcherConfig {
            max_batch: 10,
            min_hold_ms: 50,
            max_hold_ms: 0,
            auto_start: true,
        };
        let batcher: Batcher<Req> =
            Batcher::with_sleep("idle", recorder.clone(), config, sleep).unwrap();

        batcher.push_many(Vec::new(), Priority::Low);

        assert!(wait_until(Duration::from_secs(5), || !slept.lock().is_empty()));
        assert!(recorder.batches().is_empty());
        let first = slept.lock()[0];
        assert!((first - 0.050).abs() < 1e-9, "recorded hold-off {first}");
    }

    #[test]
    fn test_push_many_delivers_in_order() {
        let recorder = Arc::new(Recorder::default());
        let (sleep, _) = recording_sleep();
        let batcher =
            Batcher::with_sleep("many", recorder.clone(), deferred(0, 0, 0), sleep).unwrap();

        batcher.push_many((1..=50).map(req).collect(), Priority::Mid);
        batcher.start().unwrap();

        assert!(wait_until(Duration::from_secs(5), || recorder.total() == 50));
        let flat: Vec<u32> = recorder.batches().concat();
        assert_eq!(flat, (1..=50).collect::<Vec<u32>>());
    }

    #[test]
    fn test_set_params_and_accessors() {
        let recorder = Arc::new(Recorder::default());
        let (sleep, _) = recording_sleep();
        let batcher: Batcher<Req> =
            Batcher::with_sleep("params", recorder, deferred(10, 10, 100), sleep).unwrap();

        assert_eq!(batcher.max_requests(), 10);
        assert_eq!(batcher.min_hold_off_ms(), 10);
        assert_eq!(batcher.max_hold_off_ms(), 100);

        batcher.set_params(0, 20, 100);
        assert_eq!(batcher.max_requests(), 0);
        assert_eq!(batcher.min_hold_off_ms(), 20);
        // Without a cap there is no variable term to report.
        assert_eq!(batcher.max_hold_off_ms(), 20);
    }

    #[test]
    fn test_start_twice_is_an_error() {
        let recorder = Arc::new(Recorder::default());
        let (sleep, _) = recording_sleep();
        let batcher: Batcher<Req> =
            Batcher::with_sleep("twice", recorder, deferred(0, 0, 0), sleep).unwrap();

        batcher.start().unwrap();
        assert!(matches!(
            batcher.start(),
            Err(BatcherError::AlreadyRunning(_))
        ));
    }

    #[test]
    fn test_clear_drops_queued_requests() {
        let recorder = Arc::new(Recorder::default());
        let (sleep, _) = recording_sleep();
        let batcher =
            Batcher::with_sleep("clear", recorder.clone(), deferred(0, 0, 0), sleep).unwrap();

        for id in 1..=10 {
            batcher.push(req(id), Priority::Low);
        }
        assert_eq!(batcher.len(Priority::Low), 10);

        batcher.clear();
        assert!(batcher.is_empty(Priority::Low));
        assert_eq!(batcher.metrics().snapshot().requests_cleared, 10);

        // The worker finds nothing once started.
        batcher.start().unwrap();
        batcher.push(req(99), Priority::High);
        assert!(wait_until(Duration::from_secs(5), || recorder.total() == 1));
        assert_eq!(recorder.batches(), vec![vec![99]]);
    }

    #[test]
    fn test_metrics_track_deliveries() {
        let recorder = Arc::new(Recorder::default());
        let (sleep, _) = recording_sleep();
        let batcher =
            Batcher::with_sleep("metrics", recorder.clone(), deferred(2, 0, 0), sleep).unwrap();

        for id in 1..=5 {
            batcher.push(req(id), Priority::Mid);
        }
        batcher.start().unwrap();
        assert!(wait_until(Duration::from_secs(5), || recorder.total() == 5));

        let snapshot = batcher.metrics().snapshot();
        assert_eq!(snapshot.requests_pushed, 5);
        assert_eq!(snapshot.requests_delivered, 5);
        assert_eq!(snapshot.requests_queued, 0);
        assert_eq!(snapshot.batches_delivered, 3);
        assert_eq!(snapshot.max_queue_depth, 5);
    }
}
