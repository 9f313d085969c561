//! The publish/subscribe hub.

use super::types::{OperatorEvent, Topic};
use crate::entities::Deal;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

type Handler = Arc<dyn Fn(&OperatorEvent) + Send + Sync>;

/// In-process typed publish/subscribe registry: topic → ordered handler
/// list.
///
/// `emit` delivers synchronously, in subscription order. Handlers run
/// outside the registry lock, so a handler may subscribe further handlers;
/// those only see later events.
#[derive(Default)]
pub struct EventHub {
    handlers: RwLock<HashMap<Topic, Vec<Handler>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for one topic. Handlers are retained for the
    /// life of the hub.
    pub fn subscribe(&self, topic: Topic, handler: impl Fn(&OperatorEvent) + Send + Sync + 'static) {
        let mut handlers = match self.handlers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.entry(topic).or_default().push(Arc::new(handler));
    }

    /// Deliver an event to every handler of its topic, in subscription
    /// order.
    pub fn emit(&self, event: OperatorEvent) {
        let topic = event.topic();
        let subscribers: Vec<Handler> = {
            let handlers = match self.handlers.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            handlers.get(&topic).cloned().unwrap_or_default()
        };
        debug!(?topic, subscribers = subscribers.len(), "Emitting event");
        for handler in subscribers {
            handler(&event);
        }
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        let handlers = match self.handlers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.get(&topic).map(Vec::len).unwrap_or(0)
    }

    // -- Typed subscriptions -------------------------------------------------

    /// Call `f` with each created deal.
    pub fn on_deal_created(&self, f: impl Fn(&Deal) + Send + Sync + 'static) {
        self.subscribe(Topic::DealCreated, move |event| {
            if let OperatorEvent::DealCreated { deal } = event {
                f(deal);
            }
        });
    }

    /// Call `f` with each executed deal.
    pub fn on_deal_executed(&self, f: impl Fn(&Deal) + Send + Sync + 'static) {
        self.subscribe(Topic::DealExecuted, move |event| {
            if let OperatorEvent::DealExecuted { deal } = event {
                f(deal);
            }
        });
    }

    /// Call `f` with each quorum value.
    pub fn on_quorum_changed(&self, f: impl Fn(usize) + Send + Sync + 'static) {
        self.subscribe(Topic::QuorumChanged, move |event| {
            if let OperatorEvent::QuorumChanged { quorum } = event {
                f(*quorum);
            }
        });
    }

    /// Call `f` with each countdown refresh.
    pub fn on_countdown_tick(&self, f: impl Fn(u64) + Send + Sync + 'static) {
        self.subscribe(Topic::CountdownTick, move |event| {
            if let OperatorEvent::CountdownTick { blocks_remaining } = event {
                f(*blocks_remaining);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use std::sync::Mutex;

    #[test]
    fn delivery_follows_subscription_order() {
        let hub = EventHub::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            hub.subscribe(Topic::QuorumChanged, move |_| {
                seen.lock().unwrap().push(tag);
            });
        }

        hub.emit(OperatorEvent::QuorumChanged { quorum: 1 });
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn topics_are_isolated() {
        let hub = EventHub::new();
        let quorums = Arc::new(Mutex::new(Vec::new()));

        {
            let quorums = quorums.clone();
            hub.on_quorum_changed(move |q| quorums.lock().unwrap().push(q));
        }

        hub.emit(OperatorEvent::QuorumNotReached);
        hub.emit(OperatorEvent::QuorumChanged { quorum: 2 });
        hub.emit(OperatorEvent::CountdownTick {
            blocks_remaining: 5,
        });

        assert_eq!(*quorums.lock().unwrap(), vec![2]);
        assert_eq!(hub.subscriber_count(Topic::QuorumChanged), 1);
        assert_eq!(hub.subscriber_count(Topic::DealCreated), 0);
    }

    #[test]
    fn handler_may_subscribe_from_within_a_handler() {
        let hub = Arc::new(EventHub::new());
        let count = Arc::new(Mutex::new(0usize));

        {
            let hub2 = hub.clone();
            let count = count.clone();
            hub.subscribe(Topic::QuorumNotReached, move |_| {
                let count = count.clone();
                hub2.subscribe(Topic::QuorumChanged, move |_| {
                    *count.lock().unwrap() += 1;
                });
            });
        }

        hub.emit(OperatorEvent::QuorumNotReached);
        hub.emit(OperatorEvent::QuorumChanged { quorum: 0 });
        assert_eq!(*count.lock().unwrap(), 1);
    }
}
