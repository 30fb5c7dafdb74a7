//! Fan-out of decoded events to any number of observers.
//!
//! Each subscription owns its own unbounded FIFO queue. A dispatch pushes
//! the event onto every queue registered at that moment; nothing is
//! buffered for subscriptions created later.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use companion_protocol::Event;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::trace;

use crate::clock::Clock;

struct Subscriber {
    id: u64,
    queue: mpsc::UnboundedSender<Arc<Event>>,
}

/// Publish/subscribe hub for [`Event`]s.
#[derive(Default)]
pub struct EventBroadcaster {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new observer. It sees only events dispatched from now on.
    pub fn subscribe(&self) -> EventSubscription {
        let (queue, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.lock().push(Subscriber { id, queue });
        trace!(subscriber = id, "subscribed");
        EventSubscription { id, rx }
    }

    /// Deliver `event` to every current observer. Returns how many received it.
    pub fn dispatch(&self, event: Arc<Event>) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|subscriber| {
            let delivered = subscriber.queue.send(Arc::clone(&event)).is_ok();
            if !delivered {
                trace!(subscriber = subscriber.id, "dropping closed subscription");
            }
            delivered
        });
        subscribers.len()
    }

    /// Number of live observers.
    pub fn subscriber_count(&self) -> usize {
        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|subscriber| !subscriber.queue.is_closed());
        subscribers.len()
    }
}

impl std::fmt::Debug for EventBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBroadcaster")
            .field("subscribers", &self.subscribers.lock().len())
            .finish()
    }
}

/// One observer's ordered view of the event stream. Dropping it
/// unsubscribes.
#[derive(Debug)]
pub struct EventSubscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<Arc<Event>>,
}

impl EventSubscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next event, or `None` once the broadcaster is gone.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.rx.recv().await
    }

    /// Next already-queued event, if any.
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.rx.try_recv().ok()
    }

    /// Wait for the first event matching `predicate`, discarding others.
    pub async fn wait_for<F>(
        &mut self,
        clock: &dyn Clock,
        timeout: Duration,
        mut predicate: F,
    ) -> Option<Arc<Event>>
    where
        F: FnMut(&Event) -> bool + Send,
    {
        let matched = async {
            while let Some(event) = self.rx.recv().await {
                if predicate(&event) {
                    return Some(event);
                }
            }
            None
        };
        tokio::select! {
            event = matched => event,
            _ = clock.sleep(timeout) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use companion_protocol::FirmwareErrorCode;

    fn ok(value: u32) -> Arc<Event> {
        Arc::new(Event::Ok { value: Some(value) })
    }

    #[tokio::test]
    async fn test_late_subscriber_misses_earlier_events() {
        let hub = EventBroadcaster::new();
        hub.dispatch(ok(1));
        hub.dispatch(ok(2));

        let mut late = hub.subscribe();
        hub.dispatch(ok(3));

        assert_eq!(*late.recv().await.unwrap(), Event::Ok { value: Some(3) });
        assert!(late.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_every_subscriber_sees_same_order() {
        let hub = EventBroadcaster::new();
        let mut subs: Vec<_> = (0..3).map(|_| hub.subscribe()).collect();

        let sequence = [
            Event::Ok { value: None },
            Event::Error {
                code: FirmwareErrorCode::IllegalArg,
            },
            Event::NoMoreMessages,
        ];
        for event in &sequence {
            assert_eq!(hub.dispatch(Arc::new(event.clone())), 3);
        }

        for sub in subs.iter_mut() {
            for expected in &sequence {
                assert_eq!(&*sub.recv().await.unwrap(), expected);
            }
        }
    }

    #[tokio::test]
    async fn test_dropped_subscription_is_pruned() {
        let hub = EventBroadcaster::new();
        let keep = hub.subscribe();
        let gone = hub.subscribe();
        assert_eq!(hub.subscriber_count(), 2);

        drop(gone);
        assert_eq!(hub.dispatch(ok(1)), 1);
        assert_eq!(hub.subscriber_count(), 1);
        drop(keep);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_wait_for_skips_non_matching() {
        let hub = EventBroadcaster::new();
        let clock = ManualClock::new();
        let mut sub = hub.subscribe();
        hub.dispatch(ok(1));
        hub.dispatch(Arc::new(Event::MessagesWaiting));

        let found = sub
            .wait_for(&clock, Duration::from_secs(1), |e| {
                matches!(e, Event::MessagesWaiting)
            })
            .await;
        assert_eq!(found.as_deref(), Some(&Event::MessagesWaiting));
    }

    #[tokio::test]
    async fn test_wait_for_times_out() {
        let hub = EventBroadcaster::new();
        let clock = ManualClock::new();
        let mut sub = hub.subscribe();

        let waiter = {
            let clock = clock.clone();
            tokio::spawn(async move {
                sub.wait_for(&clock, Duration::from_secs(2), |_| true).await
            })
        };
        while clock.sleeper_count() == 0 {
            tokio::task::yield_now().await;
        }
        clock.advance(Duration::from_secs(2));
        assert!(waiter.await.unwrap().is_none());
    }
}
