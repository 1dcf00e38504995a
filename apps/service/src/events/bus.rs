use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::{debug, error};

use super::sink::{ChannelSink, EventSink};
use super::types::{EventFrame, ServerEvent};
use crate::monitoring::state::CycleState;

/// Identifies one registered subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionHandle(u64);

/// Event bus - fans events out to every live subscriber
///
/// Delivery is at-most-once with no buffering or replay. A sink whose write
/// fails is unregistered on the spot; the others still get the event.
pub struct EventBus {
    subscribers: Mutex<BTreeMap<SubscriptionHandle, Box<dyn EventSink>>>,
    next_id: AtomicU64,
    state: Arc<CycleState>,
}

impl EventBus {
    pub fn new(state: Arc<CycleState>) -> Self {
        Self { subscribers: Mutex::new(BTreeMap::new()), next_id: AtomicU64::new(1), state }
    }

    fn registry(&self) -> MutexGuard<'_, BTreeMap<SubscriptionHandle, Box<dyn EventSink>>> {
        self.subscribers.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Broadcast an event; returns how many subscribers received it
    pub fn publish(&self, event: &ServerEvent) -> usize {
        let frame = match event.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!(event = event.name(), "Failed to serialize event: {}", e);
                return 0;
            }
        };

        let mut subscribers = self.registry();
        subscribers.retain(|handle, sink| match sink.send(&frame) {
            Ok(()) => true,
            Err(e) => {
                debug!(subscriber = handle.0, "Dropping subscriber: {}", e);
                false
            }
        });
        subscribers.len()
    }

    /// Register a sink
    ///
    /// The sink first receives a `connected` event and the current
    /// `interval_status`, before anything published afterwards. A sink that
    /// already fails on those is never registered.
    pub fn subscribe<S: EventSink + 'static>(&self, sink: S) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_id.fetch_add(1, Ordering::Relaxed));
        let welcome = [ServerEvent::connected(), ServerEvent::interval_status(self.state.snapshot())];

        // Holding the lock while greeting keeps concurrent publishes from slipping in first
        let mut subscribers = self.registry();
        for event in &welcome {
            let frame = match event.to_frame() {
                Ok(frame) => frame,
                Err(e) => {
                    error!(event = event.name(), "Failed to serialize event: {}", e);
                    return handle;
                }
            };
            if let Err(e) = sink.send(&frame) {
                debug!(subscriber = handle.0, "Subscriber failed during greeting: {}", e);
                return handle;
            }
        }
        subscribers.insert(handle, Box::new(sink));
        debug!(subscriber = handle.0, total = subscribers.len(), "Subscriber attached");

        handle
    }

    /// Remove a subscriber. Safe to call more than once.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let mut subscribers = self.registry();
        let removed = subscribers.remove(&handle).is_some();
        if removed {
            debug!(subscriber = handle.0, total = subscribers.len(), "Subscriber detached");
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry().len()
    }

    /// Subscribe through a channel
    ///
    /// The returned guard unsubscribes when dropped, so tying it to the
    /// lifetime of the connection handles disconnects.
    pub fn subscribe_channel(
        self: &Arc<Self>,
    ) -> (Subscription, mpsc::UnboundedReceiver<EventFrame>) {
        let (sink, rx) = ChannelSink::channel();
        let handle = self.subscribe(sink);
        (Subscription { bus: Arc::clone(self), handle }, rx)
    }
}

/// Unsubscribes on drop
pub struct Subscription {
    bus: Arc<EventBus>,
    handle: SubscriptionHandle,
}

impl Subscription {
    pub fn handle(&self) -> SubscriptionHandle {
        self.handle
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bus.unsubscribe(self.handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::Target;
    use crate::events::sink::SinkError;
    use crate::monitoring::types::ProbeOutcome;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    /// Records every frame it is given
    #[derive(Clone, Default)]
    struct RecordingSink {
        frames: Arc<Mutex<Vec<EventFrame>>>,
    }

    impl RecordingSink {
        fn names(&self) -> Vec<&'static str> {
            self.frames.lock().unwrap().iter().map(|f| f.name).collect()
        }
    }

    impl EventSink for RecordingSink {
        fn send(&self, frame: &EventFrame) -> Result<(), SinkError> {
            self.frames.lock().unwrap().push(frame.clone());
            Ok(())
        }
    }

    /// Accepts a fixed number of writes, then behaves like a closed connection
    struct FlakySink {
        remaining: AtomicUsize,
        attempts: Arc<AtomicUsize>,
    }

    impl FlakySink {
        fn new(accepted: usize) -> (Self, Arc<AtomicUsize>) {
            let attempts = Arc::new(AtomicUsize::new(0));
            (Self { remaining: AtomicUsize::new(accepted), attempts: attempts.clone() }, attempts)
        }
    }

    impl EventSink for FlakySink {
        fn send(&self, _frame: &EventFrame) -> Result<(), SinkError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let left = self.remaining.load(Ordering::SeqCst);
            if left == 0 {
                return Err(SinkError::Closed);
            }
            self.remaining.store(left - 1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn bus() -> EventBus {
        EventBus::new(Arc::new(CycleState::new(Duration::from_millis(1000))))
    }

    fn pinged() -> ServerEvent {
        let target = Target::new("https://example.com".into());
        let outcome = ProbeOutcome::success(target.id, 200, 10);
        ServerEvent::url_pinged(target, outcome)
    }

    #[test]
    fn test_new_subscriber_is_greeted_first() {
        let bus = bus();
        bus.publish(&pinged());

        let sink = RecordingSink::default();
        bus.subscribe(sink.clone());
        bus.publish(&pinged());

        // Nothing from before attach, greeting before anything new
        assert_eq!(sink.names(), vec!["connected", "interval_status", "url_pinged"]);
    }

    #[test]
    fn test_failing_sink_is_pruned_without_blocking_others() {
        let bus = bus();

        // Survives the greeting, fails on the first real event
        let (flaky, attempts) = FlakySink::new(2);
        bus.subscribe(flaky);
        let healthy = RecordingSink::default();
        bus.subscribe(healthy.clone());
        assert_eq!(bus.subscriber_count(), 2);

        let delivered = bus.publish(&pinged());

        assert_eq!(delivered, 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(healthy.names().last(), Some(&"url_pinged"));

        // Pruned sinks are never written to again
        bus.publish(&pinged());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_sink_failing_greeting_is_not_registered() {
        let bus = bus();
        let (dead, _) = FlakySink::new(0);
        bus.subscribe(dead);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_unsubscribe_is_idempotent() {
        let bus = bus();
        let handle = bus.subscribe(RecordingSink::default());

        assert!(bus.unsubscribe(handle));
        assert!(!bus.unsubscribe(handle));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = bus();
        assert_eq!(bus.publish(&ServerEvent::connected()), 0);
    }

    #[tokio::test]
    async fn test_channel_subscription_drops_on_guard_drop() {
        let bus = Arc::new(bus());
        let (subscription, mut rx) = bus.subscribe_channel();
        assert_eq!(bus.subscriber_count(), 1);

        assert_eq!(rx.recv().await.map(|f| f.name), Some("connected"));
        assert_eq!(rx.recv().await.map(|f| f.name), Some("interval_status"));

        drop(subscription);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_receiver_is_pruned_on_publish() {
        let bus = Arc::new(bus());
        let (_subscription, rx) = bus.subscribe_channel();
        drop(rx);

        assert_eq!(bus.publish(&pinged()), 0);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_concurrent_subscribe_and_publish() {
        let bus = Arc::new(bus());
        let mut threads = Vec::new();

        for _ in 0..4 {
            let bus = bus.clone();
            threads.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    let handle = bus.subscribe(RecordingSink::default());
                    bus.publish(&ServerEvent::connected());
                    bus.unsubscribe(handle);
                }
            }));
        }
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(bus.subscriber_count(), 0);
    }
}
