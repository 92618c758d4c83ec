//! Backpressure queue between discovery and the audit loop
//!
//! Discovery pushes at its own pace; the consumer pulls one item at a time and
//! only when it is ready for more work. Items accumulate in between.

use futures::stream::{self, Stream};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;

type Observer<T> = Box<dyn Fn(&T) + Send + Sync>;

struct Shared<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

struct State<T> {
    items: VecDeque<T>,
    finished: bool,
}

/// Create a connected producer/consumer pair.
pub fn queue<T>() -> (QueueProducer<T>, QueueConsumer<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            items: VecDeque::new(),
            finished: false,
        }),
        notify: Notify::new(),
    });
    (
        QueueProducer {
            shared: Arc::clone(&shared),
            observers: Vec::new(),
        },
        QueueConsumer { shared },
    )
}

/// Push side. Dropping it finishes the queue.
pub struct QueueProducer<T> {
    shared: Arc<Shared<T>>,
    observers: Vec<Observer<T>>,
}

impl<T> QueueProducer<T> {
    /// Register a callback run synchronously for every pushed item, before
    /// the item becomes visible to the consumer.
    pub fn on_item_added<F>(&mut self, observer: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.observers.push(Box::new(observer));
    }

    /// Append items in order and wake the consumer.
    pub fn push<I: IntoIterator<Item = T>>(&self, items: I) {
        let mut added = false;
        for item in items {
            for observer in &self.observers {
                observer(&item);
            }
            self.shared.state.lock().items.push_back(item);
            added = true;
        }
        if added {
            self.shared.notify.notify_one();
        }
    }

    /// Signal that no more items will be pushed.
    pub fn finish(self) {
        // Drop does the work.
    }
}

impl<T> Drop for QueueProducer<T> {
    fn drop(&mut self) {
        self.shared.state.lock().finished = true;
        self.shared.notify.notify_one();
    }
}

/// Pull side. There is exactly one per queue.
pub struct QueueConsumer<T> {
    shared: Arc<Shared<T>>,
}

impl<T> QueueConsumer<T> {
    /// Next item in push order, waiting while the queue is empty.
    ///
    /// Returns `None` once the producer has finished and every item has been
    /// taken.
    pub async fn next(&mut self) -> Option<T> {
        loop {
            {
                let mut state = self.shared.state.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.finished {
                    return None;
                }
            }
            // A notify_one with no waiter leaves a permit, so a push between
            // the check above and this await is not lost.
            self.shared.notify.notified().await;
        }
    }

    /// Items pushed but not yet taken.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.state.lock().items.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.shared.state.lock().finished
    }

    pub fn into_stream(self) -> impl Stream<Item = T>
    where
        T: Send,
    {
        stream::unfold(self, |mut consumer| async move {
            let item = consumer.next().await?;
            Some((item, consumer))
        })
    }
}
