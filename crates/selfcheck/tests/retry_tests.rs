use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use selfcheck::gap::{GapQuery, GapRecord};
use selfcheck::retry::task_fn;
use selfcheck::store::{register_instance_with_retry, save_with_retry};
use selfcheck::{
    BackoffSchedule, CheckError, CheckResult, Instance, Measurement, RetryQueue, RunContext, Store, StoreError,
};
use tokio::time::Instant;

fn failing_counter(calls: Arc<AtomicU32>) -> impl selfcheck::RetryTask {
    task_fn("always_fails", move |_ctx, _attempt| {
        let calls = calls.clone();
        async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow::anyhow!("store unavailable"))
        }
    })
}

#[tokio::test(start_paused = true)]
async fn test_exhausts_schedule_exactly() {
    let queue = RetryQueue::new();
    let calls = Arc::new(AtomicU32::new(0));
    let schedule = BackoffSchedule::new(vec![
        Duration::ZERO,
        Duration::from_millis(10),
        Duration::from_millis(100),
        Duration::from_secs(1),
    ])
    .unwrap();

    queue.submit(&RunContext::background(), &schedule, failing_counter(calls.clone()));
    queue.drain().await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(queue.outstanding(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_during_wait_makes_one_bounded_attempt() {
    let grace = Duration::from_millis(250);
    let queue = RetryQueue::with_dying_breath(grace);
    let attempts = Arc::new(Mutex::new(Vec::new()));
    let record = attempts.clone();
    let schedule =
        BackoffSchedule::new(vec![Duration::ZERO, Duration::from_secs(3600), Duration::from_secs(3600)])
            .unwrap();

    // Later attempts block until their context ends, so only the grace period bounds them.
    let task = task_fn("blocks", move |ctx: RunContext, attempt| {
        let record = record.clone();
        async move {
            record.lock().unwrap().push(attempt);
            if attempt > 1 {
                ctx.done().await;
            }
            Err::<(), _>(anyhow::anyhow!("store unavailable"))
        }
    });
    queue.submit(&RunContext::background(), &schedule, task);

    tokio::time::sleep(Duration::from_millis(100)).await;
    let started = Instant::now();
    queue.shutdown().await;
    let waited = started.elapsed();

    assert_eq!(*attempts.lock().unwrap(), vec![1, 2]);
    assert!(waited >= grace, "waited {waited:?}");
    assert!(waited < Duration::from_secs(1), "waited {waited:?}");
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_twice_is_safe() {
    let queue = RetryQueue::new();
    let calls = Arc::new(AtomicU32::new(0));
    let schedule = BackoffSchedule::new(vec![Duration::ZERO, Duration::from_secs(60)]).unwrap();
    queue.submit(&RunContext::background(), &schedule, failing_counter(calls.clone()));
    tokio::time::sleep(Duration::from_millis(5)).await;

    queue.shutdown().await;
    queue.shutdown().await;

    assert!(queue.is_shutdown());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_submit_after_shutdown_gets_single_attempt() {
    let queue = RetryQueue::new();
    queue.shutdown().await;

    let calls = Arc::new(AtomicU32::new(0));
    queue.submit(&RunContext::background(), &BackoffSchedule::default(), failing_counter(calls.clone()));
    queue.shutdown().await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// Store that rejects the first `failures` saves and records the rest.
struct FlakyStore {
    failures: u32,
    calls: AtomicU32,
    saved: Mutex<Vec<CheckResult>>,
    instances: Mutex<Vec<Instance>>,
}

impl FlakyStore {
    fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
            saved: Mutex::new(Vec::new()),
            instances: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn save_check_result(&self, _ctx: &RunContext, result: &CheckResult) -> Result<(), StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            return Err(StoreError::InvalidData(format!("write {call} rejected")));
        }
        self.saved.lock().unwrap().push(result.clone());
        Ok(())
    }

    async fn update_instance(&self, _ctx: &RunContext, instance: &Instance) -> Result<(), StoreError> {
        self.instances.lock().unwrap().push(instance.clone());
        Ok(())
    }

    async fn analyze_longest_gap_per_app(
        &self,
        _ctx: &RunContext,
        _query: &GapQuery,
        _output: &mut (dyn FnMut(GapRecord) + Send),
    ) -> Result<(), StoreError> {
        Ok(())
    }

    async fn close(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_failed_saves_are_recorded_on_the_persisted_result() {
    let store = Arc::new(FlakyStore::new(3));
    let queue = RetryQueue::new();
    let instance = Instance::new("host", Utc::now()).with_app_id("app");
    let mut result = CheckResult::new(Utc::now(), &instance);
    result.errors.push(CheckError::new("dns", "no addresses found"));
    result.errors.push(CheckError::new("http", "unexpected status code: 503"));
    result.measurements.push(Measurement::new("db_duration", 0.125));
    result.measurements.push(Measurement::new("latency", 3.5));
    let measurements = result.measurements.clone();

    save_with_retry(&queue, &RunContext::background(), store.clone(), result, &BackoffSchedule::default());
    queue.drain().await;

    let saved = store.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    let names: Vec<_> = saved[0].errors.iter().map(|e| e.check.as_str()).collect();
    assert_eq!(
        names,
        ["dns", "http", "result_save_attempt_1", "result_save_attempt_2", "result_save_attempt_3"]
    );
    assert_eq!(saved[0].errors[0].error, "no addresses found");
    assert_eq!(saved[0].errors[2].error, "invalid stored data: write 1 rejected");
    assert_eq!(saved[0].errors[4].error, "invalid stored data: write 3 rejected");
    assert_eq!(saved[0].measurements, measurements);
    assert_eq!(store.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_registration_skips_lookup_when_address_known() {
    let store = Arc::new(FlakyStore::new(0));
    let queue = RetryQueue::new();
    let mut instance = Instance::new("host", Utc::now()).with_app_id("app");
    instance.public_ipv4 = Some("203.0.113.7".into());

    let ctx = RunContext::background();
    register_instance_with_retry(&queue, &ctx, store.clone(), instance.clone(), &BackoffSchedule::default());
    queue.drain().await;

    assert_eq!(*store.instances.lock().unwrap(), vec![instance]);
}
