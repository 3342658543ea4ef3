//! Bounded-concurrency batch fetching
//!
//! [`BatchFetcher`] spreads descriptors over `width` lanes. Each lane pulls the
//! next descriptor from a shared queue, waits the dispatch delay, takes a slot
//! and runs the fetch (with retries) before pulling again, so a lane never has
//! more than one request in flight. Results arrive on a [`FetchStream`] in
//! completion order.
//!
//! The lanes belong to the stream: dropping it aborts them, and an aborted lane
//! that was queued on the rate limiter leaves the queue.

use futures::Stream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

use crate::fetcher::{FetchError, FetcherResult};
use crate::orchestrator::rate_limit::SlotSource;
use crate::orchestrator::retry::{fetch_with_slot, RetryPolicy};
use crate::shutdown::{self, SharedShutdown};

/// A successful fetch
#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<D, T> {
    /// Descriptor the payload was fetched for
    pub descriptor: D,
    /// Decoded payload
    pub payload: T,
}

/// A fetch that failed after its retries
#[derive(Debug)]
pub struct FailedFetch<D> {
    /// Descriptor that failed
    pub descriptor: D,
    /// Last error
    pub error: FetchError,
}

/// Outcome of one descriptor
pub type FetchOutcome<D, T> = Result<Fetched<D, T>, FailedFetch<D>>;

/// Stream of batch results. Dropping it aborts the remaining work.
pub struct FetchStream<Item> {
    inner: ReceiverStream<Item>,
    _lanes: JoinSet<()>,
}

impl<Item> FetchStream<Item> {
    fn new(receiver: mpsc::Receiver<Item>, lanes: JoinSet<()>) -> Self {
        Self {
            inner: ReceiverStream::new(receiver),
            _lanes: lanes,
        }
    }
}

impl<Item> Stream for FetchStream<Item> {
    type Item = Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<Item> fmt::Debug for FetchStream<Item> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchStream")
            .field("lanes", &self._lanes.len())
            .finish()
    }
}

/// Runs many fetches against one slot source with bounded parallelism
#[derive(Clone)]
pub struct BatchFetcher {
    slots: Arc<dyn SlotSource>,
    policy: RetryPolicy,
    width: usize,
    dispatch_delay: Duration,
    shutdown: Option<SharedShutdown>,
}

impl BatchFetcher {
    /// Create a batch fetcher
    ///
    /// # Arguments
    /// * `slots` - Shared slot source; every attempt takes one slot
    /// * `policy` - Retry policy applied per descriptor
    /// * `width` - Number of lanes (at least 1)
    /// * `dispatch_delay` - Delay each lane waits before every dispatch
    pub fn new(
        slots: Arc<dyn SlotSource>,
        policy: RetryPolicy,
        width: usize,
        dispatch_delay: Duration,
    ) -> Self {
        Self {
            slots,
            policy,
            width: width.max(1),
            dispatch_delay,
            shutdown: shutdown::get_global_shutdown(),
        }
    }

    /// Use a specific shutdown coordinator instead of the global one
    pub fn with_shutdown(mut self, shutdown: Option<SharedShutdown>) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Number of lanes
    pub fn width(&self) -> usize {
        self.width
    }

    /// Fetch every descriptor and yield every outcome, failures included.
    pub fn fetch_many_results<D, T, F, Fut>(
        &self,
        descriptors: Vec<D>,
        op: F,
    ) -> FetchStream<FetchOutcome<D, T>>
    where
        D: fmt::Debug + Clone + Send + Sync + 'static,
        T: Send + 'static,
        F: Fn(D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetcherResult<T>> + Send + 'static,
    {
        self.spawn_lanes(descriptors, op, Some)
    }

    /// Fetch every descriptor, yielding successes only. Failures are logged
    /// and dropped.
    pub fn fetch_many<D, T, F, Fut>(&self, descriptors: Vec<D>, op: F) -> FetchStream<Fetched<D, T>>
    where
        D: fmt::Debug + Clone + Send + Sync + 'static,
        T: Send + 'static,
        F: Fn(D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetcherResult<T>> + Send + 'static,
    {
        self.spawn_lanes(descriptors, op, Result::ok)
    }

    /// Fetch every descriptor, substituting `placeholder` for failures so
    /// the output has one item per fetched input.
    ///
    /// Descriptors skipped because shutdown was requested are dropped rather
    /// than replaced, so a placeholder always stands for a fetch that failed.
    pub fn fetch_many_or_else<D, T, F, Fut>(
        &self,
        descriptors: Vec<D>,
        op: F,
        placeholder: T,
    ) -> FetchStream<Fetched<D, T>>
    where
        D: fmt::Debug + Clone + Send + Sync + 'static,
        T: Clone + Send + Sync + 'static,
        F: Fn(D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetcherResult<T>> + Send + 'static,
    {
        self.spawn_lanes(descriptors, op, move |outcome| match outcome {
            Ok(fetched) => Some(fetched),
            Err(FailedFetch {
                error: FetchError::Cancelled,
                ..
            }) => None,
            Err(failed) => Some(Fetched {
                descriptor: failed.descriptor,
                payload: placeholder.clone(),
            }),
        })
    }

    fn spawn_lanes<D, T, Item, F, Fut, M>(
        &self,
        descriptors: Vec<D>,
        op: F,
        finish: M,
    ) -> FetchStream<Item>
    where
        D: fmt::Debug + Clone + Send + Sync + 'static,
        T: Send + 'static,
        Item: Send + 'static,
        F: Fn(D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetcherResult<T>> + Send + 'static,
        M: Fn(FetchOutcome<D, T>) -> Option<Item> + Send + Sync + 'static,
    {
        let total = descriptors.len();
        let lanes = self.width.min(total);
        let (sender, receiver) = mpsc::channel(self.width);
        let mut set = JoinSet::new();

        debug!(items = total, lanes, "Starting batch fetch");

        let queue = Arc::new(Mutex::new(VecDeque::from(descriptors)));
        let op = Arc::new(op);
        let finish = Arc::new(finish);

        for lane in 0..lanes {
            let lane_ctx = Lane {
                id: lane,
                queue: queue.clone(),
                slots: self.slots.clone(),
                policy: self.policy,
                dispatch_delay: self.dispatch_delay,
                shutdown: self.shutdown.clone(),
                op: op.clone(),
                finish: finish.clone(),
                sender: sender.clone(),
            };
            set.spawn(lane_ctx.run());
        }

        FetchStream::new(receiver, set)
    }
}

impl fmt::Debug for BatchFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchFetcher")
            .field("width", &self.width)
            .field("dispatch_delay", &self.dispatch_delay)
            .field("policy", &self.policy)
            .finish()
    }
}

struct Lane<D, F, M, Item> {
    id: usize,
    queue: Arc<Mutex<VecDeque<D>>>,
    slots: Arc<dyn SlotSource>,
    policy: RetryPolicy,
    dispatch_delay: Duration,
    shutdown: Option<SharedShutdown>,
    op: Arc<F>,
    finish: Arc<M>,
    sender: mpsc::Sender<Item>,
}

impl<D, F, M, Item> Lane<D, F, M, Item>
where
    D: fmt::Debug + Clone + Send + Sync + 'static,
    Item: Send + 'static,
{
    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|s| s.is_shutdown_requested())
    }

    async fn run<T, Fut>(self)
    where
        T: Send + 'static,
        F: Fn(D) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FetcherResult<T>> + Send + 'static,
        M: Fn(FetchOutcome<D, T>) -> Option<Item> + Send + Sync + 'static,
    {
        loop {
            let next = self.queue.lock().pop_front();
            let Some(descriptor) = next else {
                break;
            };

            let outcome = if self.shutdown_requested() {
                Err(FailedFetch {
                    descriptor,
                    error: FetchError::Cancelled,
                })
            } else {
                if !self.dispatch_delay.is_zero() {
                    tokio::time::sleep(self.dispatch_delay).await;
                }
                let target = format!("{descriptor:?}");
                let op: &F = &self.op;
                let result = fetch_with_slot(&*self.slots, self.policy, &target, || {
                    op(descriptor.clone())
                })
                .await;
                match result {
                    Ok(payload) => Ok(Fetched {
                        descriptor,
                        payload,
                    }),
                    Err(error) => Err(FailedFetch { descriptor, error }),
                }
            };

            if let Err(failed) = &outcome {
                if matches!(failed.error, FetchError::Cancelled) {
                    debug!(lane = self.id, descriptor = ?failed.descriptor, "Skipped after shutdown request");
                } else {
                    warn!(
                        lane = self.id,
                        descriptor = ?failed.descriptor,
                        error = %failed.error,
                        "Fetch failed, continuing with remaining items"
                    );
                }
            }

            let finish: &M = &self.finish;
            let Some(item) = finish(outcome) else {
                continue;
            };
            if self.sender.send(item).await.is_err() {
                debug!(lane = self.id, "Result stream dropped, stopping lane");
                break;
            }
        }
    }
}
