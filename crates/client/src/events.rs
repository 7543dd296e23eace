use std::sync::mpsc::{self, Receiver, Sender};

/// Multi-subscriber publish/subscribe over channels. Every subscriber gets its
/// own copy of each event; subscribers whose receiver was dropped are pruned
/// on the next publish.
#[derive(Debug)]
pub struct EventBus<E> {
    subscribers: Vec<Sender<E>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            subscribers: Vec::new(),
        }
    }
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<E> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    pub fn publish(&mut self, event: E) {
        self.subscribers
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_subscriber_receives() {
        let mut bus = EventBus::new();
        let a = bus.subscribe();
        let b = bus.subscribe();

        bus.publish(7u32);

        assert_eq!(a.try_recv(), Ok(7));
        assert_eq!(b.try_recv(), Ok(7));
    }

    #[test]
    fn test_dropped_subscriber_pruned() {
        let mut bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        bus.publish("hello");
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv(), Ok("hello"));
    }
}
