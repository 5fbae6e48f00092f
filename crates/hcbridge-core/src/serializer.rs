//! Update serialisation: one remote write in flight per target.
//!
//! [`UpdateSerializer`] sits between a protocol-side writer and the remote
//! operation that applies the write. Every [`trigger`](UpdateSerializer::trigger)
//! merges its value into the pending intent and returns a future that
//! resolves once that merged intent has been dispatched. While an operation
//! is running, further triggers accumulate; they are dispatched together
//! after it settles and the scheduler has had one turn, so a synchronous
//! burst becomes a single write.
//!
//! In *level* mode the merged value stays as the baseline for later
//! triggers. In *edge* mode it resets to a fixed default after each
//! dispatch, which suits one-shot actions such as "stop program".

use std::collections::BTreeMap;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;
use serde_json::Value;
use tokio::sync::{Notify, oneshot};
use tokio::task::JoinHandle;

use crate::error::CoreError;

// ── Merge ────────────────────────────────────────────────────────────

/// How a new write intent combines with a pending one.
pub trait Merge: Clone + Send + 'static {
    fn merge(&mut self, incoming: Self);
}

/// Objects union shallowly (incoming fields win); anything else replaces.
impl Merge for Value {
    fn merge(&mut self, incoming: Self) {
        match (self, incoming) {
            (Value::Object(current), Value::Object(incoming)) => current.extend(incoming),
            (current, incoming) => *current = incoming,
        }
    }
}

impl Merge for bool {
    fn merge(&mut self, incoming: Self) {
        *self = incoming;
    }
}

impl<K, V> Merge for BTreeMap<K, V>
where
    K: Ord + Clone + Send + 'static,
    V: Clone + Send + 'static,
{
    fn merge(&mut self, incoming: Self) {
        self.extend(incoming);
    }
}

// ── Mode ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode<V> {
    /// The merged value persists across dispatches.
    Level,
    /// The merged value resets to this default after each dispatch.
    Edge { reset: V },
}

// ── UpdateSerializer ─────────────────────────────────────────────────

type Waiter<R> = oneshot::Sender<Result<R, CoreError>>;

struct State<V, R> {
    value: V,
    waiters: Vec<Waiter<R>>,
    seq: u64,
}

struct Shared<V, R> {
    target: String,
    mode: Mode<V>,
    verbose: bool,
    state: Mutex<State<V, R>>,
    wake: Notify,
}

impl<V, R> Shared<V, R> {
    fn lock(&self) -> MutexGuard<'_, State<V, R>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Serialises writes to one target. Dropping it stops the dispatch task;
/// outstanding triggers then fail with [`CoreError::SerializerClosed`].
pub struct UpdateSerializer<V, R> {
    shared: Arc<Shared<V, R>>,
    task: JoinHandle<()>,
}

impl<V, R> UpdateSerializer<V, R>
where
    V: Merge + std::fmt::Debug + Sync,
    R: Clone + Send + 'static,
{
    /// Create a serializer whose merged value persists between dispatches.
    pub fn level<F, Fut>(target: impl Into<String>, initial: V, verbose: bool, operation: F) -> Self
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, CoreError>> + Send + 'static,
    {
        Self::spawn(target.into(), initial, Mode::Level, verbose, operation)
    }

    /// Create a serializer whose merged value resets to `reset` after each
    /// dispatch.
    pub fn edge<F, Fut>(target: impl Into<String>, reset: V, verbose: bool, operation: F) -> Self
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, CoreError>> + Send + 'static,
    {
        let mode = Mode::Edge {
            reset: reset.clone(),
        };
        Self::spawn(target.into(), reset, mode, verbose, operation)
    }

    fn spawn<F, Fut>(target: String, initial: V, mode: Mode<V>, verbose: bool, operation: F) -> Self
    where
        F: Fn(V) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, CoreError>> + Send + 'static,
    {
        let shared = Arc::new(Shared {
            target,
            mode,
            verbose,
            state: Mutex::new(State {
                value: initial,
                waiters: Vec::new(),
                seq: 0,
            }),
            wake: Notify::new(),
        });
        let task = tokio::spawn(dispatch_loop(Arc::clone(&shared), operation));
        Self { shared, task }
    }

    /// Merge `value` into the pending intent and request a dispatch.
    ///
    /// The merge happens immediately; the returned future only waits for
    /// the outcome. `None` requests a dispatch of the current value.
    pub fn trigger(&self, value: Option<V>) -> impl Future<Output = Result<R, CoreError>> + use<V, R> {
        let (tx, rx) = oneshot::channel();
        if self.task.is_finished() {
            drop(tx);
        } else {
            let mut state = self.shared.lock();
            if let Some(value) = value {
                state.value.merge(value);
            }
            state.waiters.push(tx);
            log_decision(
                self.shared.verbose,
                &self.shared.target,
                state.seq + 1,
                state.waiters.len(),
                &state.value,
            );
        }
        self.shared.wake.notify_one();

        let target = self.shared.target.clone();
        async move {
            rx.await
                .unwrap_or(Err(CoreError::SerializerClosed { target }))
        }
    }

    /// Current merged value (the baseline in level mode).
    pub fn value(&self) -> V {
        self.shared.lock().value.clone()
    }

    /// Number of dispatches started so far.
    pub fn dispatched(&self) -> u64 {
        self.shared.lock().seq
    }

    pub fn target(&self) -> &str {
        &self.shared.target
    }
}

impl<V, R> Drop for UpdateSerializer<V, R> {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn log_decision<V: std::fmt::Debug>(
    verbose: bool,
    target: &str,
    next_seq: u64,
    waiting: usize,
    value: &V,
) {
    if verbose {
        tracing::debug!(serializer = target, next_seq, waiting, value = ?value, "Merged into pending update");
    } else {
        tracing::trace!(serializer = target, next_seq, waiting, "Merged into pending update");
    }
}

// ── Dispatch task ────────────────────────────────────────────────────

async fn dispatch_loop<V, R, F, Fut>(shared: Arc<Shared<V, R>>, operation: F)
where
    V: Merge + std::fmt::Debug,
    R: Clone + Send + 'static,
    F: Fn(V) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<R, CoreError>> + Send + 'static,
{
    loop {
        shared.wake.notified().await;

        loop {
            // Let a synchronous burst of triggers land before taking them.
            tokio::task::yield_now().await;

            let (seq, value, waiters) = {
                let mut state = shared.lock();
                if state.waiters.is_empty() {
                    break;
                }
                state.seq += 1;
                let value = state.value.clone();
                if let Mode::Edge { reset } = &shared.mode {
                    state.value = reset.clone();
                }
                (state.seq, value, std::mem::take(&mut state.waiters))
            };

            if shared.verbose {
                tracing::debug!(serializer = %shared.target, seq, callers = waiters.len(), value = ?value, "Dispatching update");
            } else {
                tracing::trace!(serializer = %shared.target, seq, callers = waiters.len(), "Dispatching update");
            }

            // A panicking write fails its own generation only.
            let result = AssertUnwindSafe(async { operation(value).await })
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| {
                    Err(CoreError::Internal(format!(
                        "update for {} panicked: {}",
                        shared.target,
                        panic_message(panic.as_ref())
                    )))
                });
            match &result {
                Ok(_) => tracing::trace!(serializer = %shared.target, seq, "Update applied"),
                Err(e) => tracing::warn!(serializer = %shared.target, seq, error = %e, "Update failed"),
            }

            for waiter in waiters {
                let _ = waiter.send(result.clone());
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    /// Records every dispatched value; optionally sleeps to simulate a
    /// slow remote write.
    #[derive(Clone, Default)]
    struct Recorder<V> {
        calls: Arc<Mutex<Vec<V>>>,
        in_flight: Arc<AtomicUsize>,
        max_in_flight: Arc<AtomicUsize>,
    }

    impl<V: Clone + Send + 'static> Recorder<V> {
        fn operation(
            &self,
            delay: Duration,
        ) -> impl Fn(V) -> BoxedResult<V> + Send + Sync + 'static {
            let recorder = self.clone();
            move |value: V| -> BoxedResult<V> {
                let recorder = recorder.clone();
                Box::pin(async move {
                    let now = recorder.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    recorder.max_in_flight.fetch_max(now, Ordering::SeqCst);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    recorder.calls.lock().unwrap().push(value.clone());
                    recorder.in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(value)
                })
            }
        }

        fn calls(&self) -> Vec<V> {
            self.calls.lock().unwrap().clone()
        }
    }

    type BoxedResult<V> =
        std::pin::Pin<Box<dyn Future<Output = Result<V, CoreError>> + Send + 'static>>;

    #[tokio::test]
    async fn burst_collapses_into_one_merged_dispatch() {
        let recorder = Recorder::default();
        let serializer =
            UpdateSerializer::level("test", Value::Null, true, recorder.operation(Duration::ZERO));

        let a = serializer.trigger(Some(json!({"a": 1})));
        let b = serializer.trigger(Some(json!({"b": 2})));
        let (a, b) = tokio::join!(a, b);

        assert_eq!(a.unwrap(), json!({"a": 1, "b": 2}));
        assert_eq!(b.unwrap(), json!({"a": 1, "b": 2}));
        assert_eq!(recorder.calls(), vec![json!({"a": 1, "b": 2})]);
        assert_eq!(serializer.dispatched(), 1);
    }

    #[tokio::test]
    async fn scalar_replaces_and_newer_fields_win() {
        let mut v = json!({"a": 1, "b": 1});
        v.merge(json!({"b": 2, "c": 3}));
        assert_eq!(v, json!({"a": 1, "b": 2, "c": 3}));

        v.merge(json!(7));
        assert_eq!(v, json!(7));
    }

    #[tokio::test]
    async fn edge_mode_resets_to_default_after_dispatch() {
        let recorder = Recorder::default();
        let serializer =
            UpdateSerializer::edge("stop", false, false, recorder.operation(Duration::ZERO));

        assert!(serializer.trigger(Some(true)).await.unwrap());
        assert!(!serializer.value());
        assert!(!serializer.trigger(None).await.unwrap());
        assert_eq!(recorder.calls(), vec![true, false]);
    }

    #[tokio::test]
    async fn level_mode_keeps_baseline() {
        let recorder = Recorder::default();
        let serializer =
            UpdateSerializer::level("power", Value::Null, false, recorder.operation(Duration::ZERO));

        serializer.trigger(Some(json!({"a": 1}))).await.unwrap();
        let merged = serializer.trigger(Some(json!({"b": 2}))).await.unwrap();

        assert_eq!(merged, json!({"a": 1, "b": 2}));
        assert_eq!(serializer.trigger(None).await.unwrap(), json!({"a": 1, "b": 2}));
        assert_eq!(serializer.dispatched(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn triggers_during_flight_are_batched_and_never_overlap() {
        let recorder = Recorder::default();
        let serializer = Arc::new(UpdateSerializer::level(
            "slow",
            Value::Null,
            false,
            recorder.operation(Duration::from_millis(100)),
        ));

        let first = serializer.trigger(Some(json!({"a": 1})));
        let first = tokio::spawn(first);
        tokio::time::sleep(Duration::from_millis(10)).await;

        // First dispatch is in flight; these two accumulate.
        let second = serializer.trigger(Some(json!({"b": 2})));
        let third = serializer.trigger(Some(json!({"c": 3})));
        let (second, third) = tokio::join!(second, third);

        assert_eq!(first.await.unwrap().unwrap(), json!({"a": 1}));
        assert_eq!(second.unwrap(), json!({"a": 1, "b": 2, "c": 3}));
        assert_eq!(third.unwrap(), json!({"a": 1, "b": 2, "c": 3}));
        assert_eq!(recorder.calls().len(), 2);
        assert_eq!(recorder.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_rejects_only_its_generation() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let serializer = UpdateSerializer::level("flaky", false, false, move |value: bool| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(CoreError::Rejected {
                        message: "door open".into(),
                        key: None,
                    })
                } else {
                    Ok(value)
                }
            }
        });

        let err = serializer.trigger(Some(true)).await.unwrap_err();
        assert!(matches!(err, CoreError::Rejected { .. }));

        assert!(serializer.trigger(Some(true)).await.unwrap());
    }

    #[tokio::test]
    async fn panicking_write_does_not_stall_later_triggers() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let serializer = UpdateSerializer::level("fragile", false, false, move |value: bool| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                assert!(n > 0, "first write blows up");
                Ok(value)
            }
        });

        let err = serializer.trigger(Some(true)).await.unwrap_err();
        match err {
            CoreError::Internal(message) => assert!(message.contains("first write blows up")),
            other => panic!("expected internal error, got {other:?}"),
        }

        let second = tokio::time::timeout(Duration::from_secs(2), serializer.trigger(Some(false)))
            .await
            .expect("second trigger must resolve");
        assert!(!second.unwrap());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropping_the_serializer_closes_pending_triggers() {
        let serializer = UpdateSerializer::level("gone", false, false, |_: bool| {
            std::future::pending::<Result<(), CoreError>>()
        });
        let pending = serializer.trigger(Some(true));
        tokio::task::yield_now().await;
        drop(serializer);

        let err = pending.await.unwrap_err();
        assert_eq!(
            err,
            CoreError::SerializerClosed {
                target: "gone".into()
            }
        );
    }

    #[test]
    fn map_merge_overrides_keys() {
        let mut a = BTreeMap::from([("x", 1), ("y", 1)]);
        a.merge(BTreeMap::from([("y", 2)]));
        assert_eq!(a, BTreeMap::from([("x", 1), ("y", 2)]));
    }
}
