//! The event-stream boundary (spec.md §6, "Stream service boundary").
//! `create-subscription` hands a compiled [`Filter`] to
//! [`StreamService::establish_subscription`] and registers a receiver
//! that turns published events into `<notification>` frames.
//!
//! The reference implementation is an in-process broadcast: good enough
//! to exercise the subscription lifecycle in tests, not a durable event
//! bus.

use crate::filter::Filter;
use crate::message::XmlElement;
use anyhow::Result;
use std::sync::Mutex;
use time::OffsetDateTime;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverOutcome {
    Active,
    Suspended,
}

pub type ReceiverFn = Box<dyn FnMut(OffsetDateTime, &XmlElement) -> ReceiverOutcome + Send>;

pub trait StreamService: Send + Sync {
    fn establish_subscription(
        &self,
        stream: Option<&str>,
        filter: Option<Filter>,
    ) -> Result<Box<dyn SubscriptionHandle>>;
}

#[async_trait::async_trait]
pub trait SubscriptionHandle: Send {
    fn add_receiver(&mut self, name: &str, callback: ReceiverFn);

    /// Drives this subscription until its source closes. `session.rs`
    /// spawns this as a cooperative per-session task (spec.md §5).
    async fn run(self: Box<Self>);
}

#[derive(Debug, Clone)]
pub struct Event {
    pub event_time: OffsetDateTime,
    pub payload: XmlElement,
}

pub struct BroadcastStreamService {
    sender: broadcast::Sender<Event>,
}

impl BroadcastStreamService {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(256);
        BroadcastStreamService { sender }
    }

    /// Publishes an event to every active subscription (test/demo use
    /// only; a real device would call this from wherever state changes).
    pub fn publish(&self, event: Event) {
        let _ = self.sender.send(event);
    }
}

impl Default for BroadcastStreamService {
    fn default() -> Self {
        BroadcastStreamService::new()
    }
}

impl StreamService for BroadcastStreamService {
    fn establish_subscription(
        &self,
        _stream: Option<&str>,
        filter: Option<Filter>,
    ) -> Result<Box<dyn SubscriptionHandle>> {
        Ok(Box::new(BroadcastSubscription {
            receiver: self.sender.subscribe(),
            filter: filter.unwrap_or_default(),
            receivers: Mutex::new(Vec::new()),
        }))
    }
}

struct BroadcastSubscription {
    receiver: broadcast::Receiver<Event>,
    filter: Filter,
    receivers: Mutex<Vec<(String, ReceiverFn)>>,
}

#[async_trait::async_trait]
impl SubscriptionHandle for BroadcastSubscription {
    fn add_receiver(&mut self, name: &str, callback: ReceiverFn) {
        self.receivers
            .lock()
            .expect("subscription mutex poisoned")
            .push((name.to_string(), callback));
    }

    async fn run(mut self: Box<Self>) {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    let (included, _) = self.filter.selected(&event.payload.name);
                    if !included {
                        continue;
                    }
                    let mut receivers = self.receivers.lock().expect("subscription mutex poisoned");
                    receivers.retain_mut(|(_, callback)| {
                        callback(event.event_time, &event.payload) == ReceiverOutcome::Active
                    });
                    if receivers.is_empty() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Closed) => return,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::QName;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn subscription_delivers_published_events() {
        let service = BroadcastStreamService::new();
        let mut handle = service.establish_subscription(None, None).unwrap();
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = received.clone();

        handle.add_receiver(
            "watcher",
            Box::new(move |_time, _payload| {
                received_clone.fetch_add(1, Ordering::SeqCst);
                ReceiverOutcome::Active
            }),
        );

        service.publish(Event {
            event_time: OffsetDateTime::UNIX_EPOCH,
            payload: XmlElement::new(QName::local("interface-up")),
        });

        tokio::time::timeout(std::time::Duration::from_millis(200), handle.run())
            .await
            .ok();
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }
}
