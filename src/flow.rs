//! Lifecycle-bound stream collection.
//!
//! Items are produced on one dispatcher (the flow pool by default), handed
//! over a bounded channel and consumed on another (the main scheduler by
//! default). Collection is cancelled when the owner stops.

use std::fmt;
use std::sync::Arc;

use futures::stream::{BoxStream, Stream, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

use crate::core::error::{BindError, TaskError};
use crate::core::task::{spawn_lazy_with, TaskHandle};
use crate::lifecycle::bridge::register_auto_unbind;
use crate::lifecycle::{CancelOn, Lifecycle, LifecycleOwner};
use crate::scheduler::{Dispatcher, Schedulers};

const FLOW_BUFFER: usize = 64;

type ItemCallback<T> = Box<dyn FnMut(&T) + Send>;
type CatchCallback = Box<dyn FnOnce(TaskError) + Send>;
type CompletionCallback<T> = Box<dyn FnOnce(Vec<T>) + Send>;

/// Collects a stream for as long as its owner is started.
///
/// ```no_run
/// use futures::stream;
/// use lifecycle_scheduler::flow::FlowObserver;
/// use lifecycle_scheduler::lifecycle::Lifecycle;
///
/// let owner = Lifecycle::new("screen");
/// let items = stream::iter((1..=3).map(Ok::<_, anyhow::Error>));
/// FlowObserver::new(&owner, items)
///     .unwrap()
///     .collect(|item| println!("{item}"))
///     .on_completion(|all| println!("{} items", all.len()))
///     .start();
/// ```
pub struct FlowObserver<T> {
    lifecycle: Arc<Lifecycle>,
    stream: BoxStream<'static, Result<T, TaskError>>,
    flow_on: Arc<dyn Dispatcher>,
    consume_on: Arc<dyn Dispatcher>,
    on_item: Option<ItemCallback<T>>,
    on_catch: Option<CatchCallback>,
    on_completion: Option<CompletionCallback<T>>,
}

impl<T> fmt::Debug for FlowObserver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlowObserver")
            .field("owner", &self.lifecycle.name())
            .field("flow_on", &self.flow_on.name())
            .field("consume_on", &self.consume_on.name())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> FlowObserver<T> {
    /// Observe `stream` on behalf of `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`BindError::NoLifecycle`] if the owner has no lifecycle.
    pub fn new<O, S, E>(owner: &O, stream: S) -> Result<Self, BindError>
    where
        O: LifecycleOwner + ?Sized,
        S: Stream<Item = Result<T, E>> + Send + 'static,
        E: Into<anyhow::Error>,
    {
        let lifecycle = owner.lifecycle().ok_or(BindError::NoLifecycle)?;
        let schedulers = Schedulers::global();
        Ok(Self {
            lifecycle,
            stream: stream.map(|item| item.map_err(TaskError::failed)).boxed(),
            flow_on: schedulers.flow(),
            consume_on: schedulers.main(),
            on_item: None,
            on_catch: None,
            on_completion: None,
        })
    }

    /// Produce items on `dispatcher`.
    #[must_use]
    pub fn flow_on(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.flow_on = dispatcher;
        self
    }

    /// Consume items and run callbacks on `dispatcher`.
    #[must_use]
    pub fn consume_on(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.consume_on = dispatcher;
        self
    }

    /// Called for every item.
    #[must_use]
    pub fn collect(mut self, on_item: impl FnMut(&T) + Send + 'static) -> Self {
        self.on_item = Some(Box::new(on_item));
        self
    }

    /// Called with the first failing item; collection stops there.
    #[must_use]
    pub fn catch(mut self, on_catch: impl FnOnce(TaskError) + Send + 'static) -> Self {
        self.on_catch = Some(Box::new(on_catch));
        self
    }

    /// Called with every collected item once the stream ends or fails.
    #[must_use]
    pub fn on_completion(mut self, on_completion: impl FnOnce(Vec<T>) + Send + 'static) -> Self {
        self.on_completion = Some(Box::new(on_completion));
        self
    }

    /// Start producing and consuming. The returned handle is the consumer;
    /// cancelling it stops the producer too.
    pub fn start(self) -> TaskHandle<()> {
        let Self {
            lifecycle,
            mut stream,
            flow_on,
            consume_on,
            mut on_item,
            on_catch,
            on_completion,
        } = self;
        let (tx, mut rx) = mpsc::channel::<Result<T, TaskError>>(FLOW_BUFFER);

        let producer = spawn_lazy_with(flow_on, "flow-producer", async move {
            while let Some(item) = stream.next().await {
                let failed = item.is_err();
                if tx.send(item).await.is_err() || failed {
                    break;
                }
            }
            Ok(())
        });

        let owner = lifecycle.name().to_owned();
        let consumer = spawn_lazy_with(consume_on, "flow", async move {
            let mut items = Vec::new();
            let outcome = loop {
                match rx.recv().await {
                    Some(Ok(item)) => {
                        if let Some(on_item) = on_item.as_mut() {
                            on_item(&item);
                        }
                        items.push(item);
                    }
                    Some(Err(err)) => break Err(err),
                    None => break Ok(()),
                }
            };
            debug!(owner = %owner, items = items.len(), failed = outcome.is_err(), "flow finished");
            let outcome = match (outcome, on_catch) {
                (Err(err), Some(on_catch)) => {
                    on_catch(err);
                    Ok(())
                }
                (outcome, _) => outcome,
            };
            if let Some(on_completion) = on_completion {
                on_completion(items);
            }
            outcome
        });

        let stop_producer = producer.clone();
        consumer.on_finish(move |_| {
            stop_producer.cancel();
        });
        register_auto_unbind(&lifecycle, &consumer, CancelOn::Stop);
        producer.start();
        consumer.start();
        consumer
    }
}
