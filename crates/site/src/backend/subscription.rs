//! Disposable live-update handle.

use std::fmt;

use tokio::sync::mpsc;

type Unsubscribe = Box<dyn FnOnce() + Send>;

/// A live subscription returned by the backend.
///
/// Events arrive in the order the backend emitted them. Dropping the handle
/// (or calling [`Subscription::unsubscribe`]) runs the backend's unsubscribe
/// hook exactly once.
pub struct Subscription<T> {
    events: mpsc::UnboundedReceiver<T>,
    unsubscribe: Option<Unsubscribe>,
}

impl<T> Subscription<T> {
    /// Wrap an event stream and the hook that tears it down.
    pub fn new(
        events: mpsc::UnboundedReceiver<T>,
        unsubscribe: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            events,
            unsubscribe: Some(Box::new(unsubscribe)),
        }
    }

    /// A subscription that delivers `event` once and then ends.
    #[must_use]
    pub fn single(event: T) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, so this cannot fail.
        let _ = tx.send(event);
        Self {
            events: rx,
            unsubscribe: None,
        }
    }

    /// Wait for the next event. `None` once the backend closed the stream.
    pub async fn next(&mut self) -> Option<T> {
        self.events.recv().await
    }

    /// Release the subscription now.
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            self.events.close();
            unsubscribe();
        }
    }
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<T> fmt::Debug for Subscription<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.unsubscribe.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counted() -> (Subscription<u32>, mpsc::UnboundedSender<u32>, Arc<AtomicUsize>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let calls = Arc::new(AtomicUsize::new(0));
        let hook_calls = Arc::clone(&calls);
        let sub = Subscription::new(rx, move || {
            hook_calls.fetch_add(1, Ordering::SeqCst);
        });
        (sub, tx, calls)
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (mut sub, tx, _) = counted();
        tx.send(1).ok();
        tx.send(2).ok();
        assert_eq!(sub.next().await, Some(1));
        assert_eq!(sub.next().await, Some(2));
    }

    #[test]
    fn test_drop_unsubscribes_once() {
        let (sub, _tx, calls) = counted();
        drop(sub);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_unsubscribe_does_not_repeat_on_drop() {
        let (sub, tx, calls) = counted();
        sub.unsubscribe();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(tx.send(3).is_err());
    }

    #[tokio::test]
    async fn test_single_delivers_then_ends() {
        let mut sub = Subscription::single("only");
        assert_eq!(sub.next().await, Some("only"));
        assert_eq!(sub.next().await, None);
    }
}
