//! Hot state streams that replay their latest value.
//!
//! An [`Observable`] always holds a current value. Every [`Subscription`]
//! first yields that value and then every value published after it, in
//! publication order.

use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::Stream;
use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};

#[derive(Debug)]
struct Inner<T> {
    value: T,
    subscribers: Vec<UnboundedSender<T>>,
}

/// Holder of a current value with fan-out to subscribers.
#[derive(Debug)]
pub(crate) struct Observable<T> {
    inner: Mutex<Inner<T>>,
}

impl<T: Clone> Observable<T> {
    pub(crate) fn new(value: T) -> Self {
        Observable {
            inner: Mutex::new(Inner {
                value,
                subscribers: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn get(&self) -> T {
        self.lock().value.clone()
    }

    /// Replace the current value and deliver it to every live subscriber.
    pub(crate) fn publish(&self, value: T) {
        let mut inner = self.lock();
        inner
            .subscribers
            .retain(|tx| tx.unbounded_send(value.clone()).is_ok());
        inner.value = value;
    }

    pub(crate) fn subscribe(&self) -> Subscription<T> {
        let (tx, rx) = unbounded();
        let mut inner = self.lock();
        // Fresh unbounded channel: the first send cannot fail.
        let _ = tx.unbounded_send(inner.value.clone());
        inner.subscribers.push(tx);
        Subscription { rx }
    }

    #[cfg(test)]
    pub(crate) fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }
}

/// A stream of state values, starting with the value current at subscription.
///
/// Use it with [`futures::StreamExt`]:
///
/// ```ignore
/// use futures::StreamExt;
///
/// let mut states = controller.connection_state();
/// while let Some(state) = states.next().await {
///     println!("{state}");
/// }
/// ```
#[derive(Debug)]
pub struct Subscription<T> {
    rx: UnboundedReceiver<T>,
}

impl<T> Stream for Subscription<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}
