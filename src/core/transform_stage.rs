//! Parallel, order-preserving price conversion.
//!
//! Items are fanned out over a fixed pool of worker tasks. Even ids get their
//! price multiplied by the conversion rate and then wait out an artificial
//! delay; odd ids pass straight through. Results are fanned back in by
//! original position and released only once every position is filled.

use crate::domain::model::{ItemStatus, PricedItem, TransformedProduct};
use crate::domain::ports::{ConfigProvider, DelayMode};
use crate::utils::error::{EtlError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_CONVERSION_RATE: f64 = 16.2;
pub const DEFAULT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq)]
pub struct StageSettings {
    pub parallelism: usize,
    pub conversion_rate: f64,
    pub delay: Duration,
    pub delay_mode: DelayMode,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            parallelism: num_cpus::get(),
            conversion_rate: DEFAULT_CONVERSION_RATE,
            delay: DEFAULT_DELAY,
            delay_mode: DelayMode::Scheduled,
        }
    }
}

impl StageSettings {
    pub fn from_config<C: ConfigProvider>(config: &C) -> Self {
        Self {
            parallelism: config.parallelism(),
            conversion_rate: config.conversion_rate(),
            delay: config.delay(),
            delay_mode: config.delay_mode(),
        }
    }
}

pub fn is_selected(id: i64) -> bool {
    id.rem_euclid(2) == 0
}

type Job<T> = (usize, T);
type Done<T> = (usize, TransformedProduct<T>);

/// What a worker reports back to the fan-in loop.
enum Completion<T> {
    Ready(Done<T>),
    /// Converted, still owes its delay; the fan-in loop owns the timer.
    Delayed { index: usize, item: T, worker: usize },
}

pub struct ParallelTransformStage {
    settings: StageSettings,
    shutdown: CancellationToken,
}

impl ParallelTransformStage {
    pub fn new(settings: StageSettings) -> Self {
        Self {
            settings,
            shutdown: CancellationToken::new(),
        }
    }

    /// Use an externally owned shutdown token, e.g. one tied to Ctrl-C.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn settings(&self) -> &StageSettings {
        &self.settings
    }

    /// Transforms every item exactly once and returns them in input order.
    ///
    /// Fails only if an item never reaches the fan-in barrier (a worker
    /// panicked); a partial batch is never returned. Dropping the returned
    /// future aborts workers and pending delay timers alike.
    pub async fn run<T: PricedItem>(&self, items: Vec<T>) -> Result<Vec<TransformedProduct<T>>> {
        let total = items.len();
        if total == 0 {
            return Ok(Vec::new());
        }
        let worker_count = self.settings.parallelism.clamp(1, total);

        tracing::debug!(
            "Fanning out {} items over {} workers ({:?} delay)",
            total,
            worker_count,
            self.settings.delay_mode
        );

        let (job_tx, job_rx) = mpsc::unbounded_channel::<Job<T>>();
        for job in items.into_iter().enumerate() {
            // receiver is alive in this scope
            let _ = job_tx.send(job);
        }
        drop(job_tx);
        let job_rx = Arc::new(Mutex::new(job_rx));

        let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Completion<T>>();
        let mut workers = JoinSet::new();
        for worker in 0..worker_count {
            let job_rx = Arc::clone(&job_rx);
            let done_tx = done_tx.clone();
            let settings = self.settings.clone();
            let shutdown = self.shutdown.clone();
            workers.spawn(async move {
                run_worker(worker, job_rx, done_tx, settings, shutdown).await;
            });
        }
        drop(done_tx);

        let mut timers: JoinSet<Done<T>> = JoinSet::new();
        let mut slots: Vec<Option<TransformedProduct<T>>> = (0..total).map(|_| None).collect();
        let mut fill = |(index, done): Done<T>| {
            debug_assert!(slots[index].is_none(), "slot {} filled twice", index);
            slots[index] = Some(done);
        };

        // the barrier opens once every worker is gone and no timer is pending
        loop {
            tokio::select! {
                Some(completion) = done_rx.recv() => match completion {
                    Completion::Ready(done) => fill(done),
                    Completion::Delayed { index, item, worker } => {
                        let delay = self.settings.delay;
                        let shutdown = self.shutdown.clone();
                        timers.spawn(async move {
                            let status = wait_out_delay(delay, &shutdown).await;
                            trace_completion(worker, item.id(), status);
                            (index, finished(item, worker, status))
                        });
                    }
                },
                Some(joined) = timers.join_next() => match joined {
                    Ok(done) => fill(done),
                    Err(e) => tracing::error!("Delay timer terminated abnormally: {}", e),
                },
                else => break,
            }
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Transform worker terminated abnormally: {}", e);
            }
        }

        let mut ordered = Vec::with_capacity(total);
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(done) => ordered.push(done),
                None => {
                    return Err(EtlError::ProcessingError {
                        message: format!("item at position {} was never completed", index),
                    })
                }
            }
        }
        Ok(ordered)
    }
}

async fn run_worker<T: PricedItem>(
    worker: usize,
    job_rx: Arc<Mutex<mpsc::UnboundedReceiver<Job<T>>>>,
    done_tx: mpsc::UnboundedSender<Completion<T>>,
    settings: StageSettings,
    shutdown: CancellationToken,
) {
    loop {
        let next = job_rx.lock().await.recv().await;
        let Some((index, mut item)) = next else {
            break;
        };

        if !is_selected(item.id()) {
            let done = finished(item, worker, ItemStatus::Passed);
            let _ = done_tx.send(Completion::Ready((index, done)));
            continue;
        }

        let original = item.price();
        item.set_price(original * settings.conversion_rate);
        tracing::debug!(
            worker,
            item_id = item.id(),
            "Converted price {} -> {}",
            original,
            item.price()
        );

        match settings.delay_mode {
            DelayMode::WorkerBound => {
                let status = wait_out_delay(settings.delay, &shutdown).await;
                trace_completion(worker, item.id(), status);
                let done = finished(item, worker, status);
                let _ = done_tx.send(Completion::Ready((index, done)));
            }
            DelayMode::Scheduled => {
                let _ = done_tx.send(Completion::Delayed {
                    index,
                    item,
                    worker,
                });
            }
        }
    }
}

async fn wait_out_delay(delay: Duration, shutdown: &CancellationToken) -> ItemStatus {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => ItemStatus::Cancelled,
        _ = tokio::time::sleep(delay) => ItemStatus::Converted,
    }
}

fn trace_completion(worker: usize, item_id: i64, status: ItemStatus) {
    match status {
        ItemStatus::Cancelled => {
            tracing::warn!(worker, item_id, "Delay cancelled by shutdown, emitting item")
        }
        _ => tracing::debug!(worker, item_id, "Delayed item completed"),
    }
}

fn finished<T>(item: T, worker: usize, status: ItemStatus) -> TransformedProduct<T> {
    TransformedProduct {
        item,
        worker,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::Product;
    use tokio::time::Instant;

    fn settings(parallelism: usize, delay_mode: DelayMode) -> StageSettings {
        StageSettings {
            parallelism,
            conversion_rate: DEFAULT_CONVERSION_RATE,
            delay: Duration::from_secs(1),
            delay_mode,
        }
    }

    fn products(ids: &[i64]) -> Vec<Product> {
        ids.iter().map(|&id| Product::new(id, 10.0)).collect()
    }

    fn ids<T: PricedItem>(out: &[TransformedProduct<T>]) -> Vec<i64> {
        out.iter().map(|p| p.item.id()).collect()
    }

    #[test]
    fn test_selection_predicate() {
        assert!(is_selected(0));
        assert!(is_selected(2));
        assert!(is_selected(-4));
        assert!(!is_selected(1));
        assert!(!is_selected(-3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reference_batch() {
        let stage = ParallelTransformStage::new(settings(4, DelayMode::Scheduled));
        let input = vec![
            Product::new(1, 10.0),
            Product::new(2, 10.0),
            Product::new(4, 5.0),
        ];

        let out = stage.run(input).await.unwrap();

        assert_eq!(ids(&out), vec![1, 2, 4]);
        assert_eq!(out[0].item.price, 10.0);
        assert!((out[1].item.price - 162.0).abs() < 1e-9);
        assert!((out[2].item.price - 81.0).abs() < 1e-9);
        assert_eq!(out[0].status, ItemStatus::Passed);
        assert_eq!(out[1].status, ItemStatus::Converted);
        assert_eq!(out[2].status, ItemStatus::Converted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_and_single_application() {
        let stage = ParallelTransformStage::new(settings(3, DelayMode::Scheduled));
        let input: Vec<i64> = (1..=25).rev().collect();

        let out = stage.run(products(&input)).await.unwrap();

        assert_eq!(ids(&out), input);
        for entry in &out {
            assert!(entry.worker < 3);
            if is_selected(entry.item.id) {
                // exactly one multiplication, not two
                assert!((entry.item.price - 162.0).abs() < 1e-9);
            } else {
                assert_eq!(entry.item.price, 10.0);
                assert_eq!(entry.status, ItemStatus::Passed);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_rerun_only_changes_selected_items() {
        let stage = ParallelTransformStage::new(settings(2, DelayMode::Scheduled));
        let once: Vec<Product> = stage
            .run(products(&[1, 2, 3]))
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.item)
            .collect();
        let twice = stage.run(once.clone()).await.unwrap();

        assert_eq!(twice[0].item, once[0]);
        assert_eq!(twice[2].item, once[2]);
        assert!((twice[1].item.price - 162.0 * DEFAULT_CONVERSION_RATE).abs() < 1e-6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_batch() {
        let stage = ParallelTransformStage::new(settings(4, DelayMode::Scheduled));
        let out = stage.run(Vec::<Product>::new()).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unselected_items_are_not_delayed() {
        let stage = ParallelTransformStage::new(settings(1, DelayMode::WorkerBound));
        let start = Instant::now();

        let out = stage.run(products(&[1, 3, 5, 7])).await.unwrap();

        assert_eq!(out.len(), 4);
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_delay_frees_single_worker() {
        let stage = ParallelTransformStage::new(settings(1, DelayMode::Scheduled));
        let start = Instant::now();

        let out = stage.run(products(&[2, 4, 6, 8, 10])).await.unwrap();

        let elapsed = start.elapsed();
        assert_eq!(out.len(), 5);
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(2), "took {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_bound_delay_is_serial_per_worker() {
        let stage = ParallelTransformStage::new(settings(1, DelayMode::WorkerBound));
        let start = Instant::now();

        stage.run(products(&[2, 4, 6])).await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_bound_throughput_scales_with_workers() {
        let stage = ParallelTransformStage::new(settings(3, DelayMode::WorkerBound));
        let start = Instant::now();

        stage.run(products(&[2, 4, 6, 8, 10, 12])).await.unwrap();

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_secs(3), "took {:?}", elapsed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_before_run_flags_every_selected_item() {
        let stage = ParallelTransformStage::new(settings(2, DelayMode::Scheduled));
        stage.shutdown_token().cancel();

        let out = stage.run(products(&[1, 2, 3, 4])).await.unwrap();

        assert_eq!(ids(&out), vec![1, 2, 3, 4]);
        assert_eq!(out[0].status, ItemStatus::Passed);
        assert_eq!(out[1].status, ItemStatus::Cancelled);
        assert_eq!(out[3].status, ItemStatus::Cancelled);
        // multiplier was applied before the wait began
        assert!((out[1].item.price - 162.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_mid_batch_keeps_every_item() {
        let shutdown = CancellationToken::new();
        let stage = ParallelTransformStage::new(settings(1, DelayMode::WorkerBound))
            .with_shutdown(shutdown.clone());

        let trigger = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            shutdown.cancel();
        });
        let start = Instant::now();

        let out = stage.run(products(&[2, 3, 4, 6])).await.unwrap();
        trigger.await.unwrap();

        assert_eq!(ids(&out), vec![2, 3, 4, 6]);
        let statuses: Vec<ItemStatus> = out.iter().map(|p| p.status).collect();
        assert_eq!(
            statuses,
            vec![
                ItemStatus::Converted,
                ItemStatus::Passed,
                ItemStatus::Cancelled,
                ItemStatus::Cancelled
            ]
        );
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[derive(Debug)]
    struct Fragile {
        id: i64,
        price: f64,
    }

    impl PricedItem for Fragile {
        fn id(&self) -> i64 {
            self.id
        }

        fn price(&self) -> f64 {
            self.price
        }

        fn set_price(&mut self, price: f64) {
            if self.id == 4 {
                panic!("refusing to reprice item 4");
            }
            self.price = price;
        }
    }

    struct Tracked {
        id: i64,
        price: f64,
        dropped: Arc<std::sync::atomic::AtomicUsize>,
    }

    impl PricedItem for Tracked {
        fn id(&self) -> i64 {
            self.id
        }

        fn price(&self) -> f64 {
            self.price
        }

        fn set_price(&mut self, price: f64) {
            self.price = price;
        }
    }

    impl Drop for Tracked {
        fn drop(&mut self) {
            self.dropped
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_run_aborts_pending_delays() {
        let stage = ParallelTransformStage::new(settings(2, DelayMode::Scheduled));
        let dropped = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let input: Vec<Tracked> = [2, 4, 6, 8]
            .into_iter()
            .map(|id| Tracked {
                id,
                price: 1.0,
                dropped: Arc::clone(&dropped),
            })
            .collect();
        let start = Instant::now();

        let timed_out = tokio::time::timeout(Duration::from_millis(100), stage.run(input)).await;
        assert!(timed_out.is_err());
        // let the aborted timers unwind, well before their 1s delay
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(dropped.load(std::sync::atomic::Ordering::SeqCst), 4);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_lost_item_fails_whole_batch() {
        let stage = ParallelTransformStage::new(settings(2, DelayMode::Scheduled));
        let input = [1, 2, 3, 4, 5]
            .into_iter()
            .map(|id| Fragile { id, price: 1.0 })
            .collect();

        let err = stage.run(input).await.unwrap_err();

        assert!(matches!(err, EtlError::ProcessingError { .. }));
    }
}
