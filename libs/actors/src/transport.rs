//! Transport abstraction
//!
//! The event loop never talks to a broker directly; it drains `Outbound`
//! operations from the [`Context`](crate::context::Context) and awaits the
//! corresponding [`Transport`] calls. Inbound traffic flows the other way
//! through a [`TransportInbox`]: transport callbacks run on whatever thread
//! the broker client owns, so ingress events must be `Send` and carry only
//! plain data. Messages are built on the loop thread after parsing.
//!
//! [`LoopbackTransport`] is an in-process broker used by the integration
//! tests. It honors retained delivery and last-will recording but never
//! leaves the process.

use crate::error::{ActorError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Event from a transport thread into the event loop
///
/// Deliberately `Send` and handler-free; the loop resolves topics to
/// handlers itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ingress {
    /// A message arrived on a subscribed topic
    Inbound { topic: String, payload: String },
    /// The transport session came up
    Connected,
    /// The transport session dropped
    Disconnected,
    /// Force a loop iteration without carrying data
    Wake,
}

/// Sending half handed to a transport implementation
#[derive(Clone)]
pub struct TransportInbox {
    tx: UnboundedSender<Ingress>,
}

impl TransportInbox {
    pub(crate) fn new(tx: UnboundedSender<Ingress>) -> Self {
        Self { tx }
    }

    /// Deliver an inbound message to the event loop
    pub fn deliver(&self, topic: impl Into<String>, payload: impl Into<String>) {
        let ingress = Ingress::Inbound {
            topic: topic.into(),
            payload: payload.into(),
        };
        if self.tx.send(ingress).is_err() {
            warn!("Event loop gone; dropping inbound message");
        }
    }

    /// Report that the transport session is up
    pub fn connected(&self) {
        let _ = self.tx.send(Ingress::Connected);
    }

    /// Report that the transport session dropped
    pub fn disconnected(&self) {
        let _ = self.tx.send(Ingress::Disconnected);
    }
}

/// Broker-shaped message transport
///
/// Implementations own their client threads and report inbound traffic
/// through the attached [`TransportInbox`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Hand over the ingress channel; called once before `connect`
    fn attach(&self, inbox: TransportInbox);

    /// Register the payload published on our behalf if the session dies
    fn set_last_will(&self, topic: &str, payload: &str);

    /// Establish the session; `Ingress::Connected` follows on success
    async fn connect(&self) -> Result<()>;

    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()>;

    async fn subscribe(&self, topic: &str) -> Result<()>;

    async fn unsubscribe(&self, topic: &str) -> Result<()>;

    /// Tear the session down without firing the last will
    async fn disconnect(&self) -> Result<()>;
}

#[derive(Default)]
struct LoopbackState {
    subscriptions: Vec<String>,
    retained: HashMap<String, String>,
    published: Vec<(String, String, bool)>,
    last_will: Option<(String, String)>,
    connected: bool,
}

/// In-process transport for tests
///
/// Publishing delivers straight back into the inbox when a subscription
/// matches, so a service observes its own topics the way it would against
/// a real broker. Retained payloads replay on later subscribes.
#[derive(Default)]
pub struct LoopbackTransport {
    state: Mutex<LoopbackState>,
    inbox: Mutex<Option<TransportInbox>>,
}

impl LoopbackTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a remote peer publishing to the broker
    pub fn inject(&self, topic: &str, payload: &str) {
        self.inject_retain(topic, payload, false);
    }

    /// Simulate a remote peer publishing a retained payload
    pub fn inject_retain(&self, topic: &str, payload: &str, retain: bool) {
        let subscribed = {
            let mut state = self.state.lock();
            if retain {
                state
                    .retained
                    .insert(topic.to_string(), payload.to_string());
            }
            state
                .subscriptions
                .iter()
                .any(|pattern| crate::router::topic_matches(pattern, topic))
        };
        if subscribed {
            if let Some(inbox) = self.inbox.lock().as_ref() {
                inbox.deliver(topic, payload);
            }
        }
    }

    /// Everything published through this transport, oldest first
    pub fn published(&self) -> Vec<(String, String, bool)> {
        self.state.lock().published.clone()
    }

    /// Payloads published to one topic, oldest first
    pub fn published_to(&self, topic: &str) -> Vec<String> {
        self.state
            .lock()
            .published
            .iter()
            .filter(|(t, _, _)| t == topic)
            .map(|(_, payload, _)| payload.clone())
            .collect()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        self.state.lock().subscriptions.clone()
    }

    pub fn last_will(&self) -> Option<(String, String)> {
        self.state.lock().last_will.clone()
    }

    fn require_connected(&self) -> Result<()> {
        if self.state.lock().connected {
            Ok(())
        } else {
            Err(ActorError::transport("Loopback transport not connected"))
        }
    }
}

#[async_trait]
impl Transport for LoopbackTransport {
    fn attach(&self, inbox: TransportInbox) {
        *self.inbox.lock() = Some(inbox);
    }

    fn set_last_will(&self, topic: &str, payload: &str) {
        self.state.lock().last_will = Some((topic.to_string(), payload.to_string()));
    }

    async fn connect(&self) -> Result<()> {
        self.state.lock().connected = true;
        debug!("Loopback transport connected");
        if let Some(inbox) = self.inbox.lock().as_ref() {
            inbox.connected();
        }
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &str, retain: bool) -> Result<()> {
        self.require_connected()?;
        {
            let mut state = self.state.lock();
            state
                .published
                .push((topic.to_string(), payload.to_string(), retain));
            if retain {
                state
                    .retained
                    .insert(topic.to_string(), payload.to_string());
            }
        }
        self.inject_retain(topic, payload, false);
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> Result<()> {
        let replay: Vec<(String, String)> = {
            let mut state = self.state.lock();
            if !state.subscriptions.iter().any(|pattern| pattern == topic) {
                state.subscriptions.push(topic.to_string());
            }
            state
                .retained
                .iter()
                .filter(|(retained_topic, _)| {
                    crate::router::topic_matches(topic, retained_topic)
                })
                .map(|(t, p)| (t.clone(), p.clone()))
                .collect()
        };
        if let Some(inbox) = self.inbox.lock().as_ref() {
            for (retained_topic, payload) in replay {
                inbox.deliver(retained_topic, payload);
            }
        }
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<()> {
        self.state
            .lock()
            .subscriptions
            .retain(|pattern| pattern != topic);
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        self.state.lock().connected = false;
        if let Some(inbox) = self.inbox.lock().as_ref() {
            inbox.disconnected();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn publish_loops_back_to_matching_subscription() {
        let transport = LoopbackTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.attach(TransportInbox::new(tx));

        transport.connect().await.unwrap();
        assert_eq!(rx.recv().await, Some(Ingress::Connected));

        transport.subscribe("hive/+/1/in").await.unwrap();
        transport.publish("hive/h/1/in", "(a b)", false).await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(Ingress::Inbound {
                topic: "hive/h/1/in".to_string(),
                payload: "(a b)".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn retained_payload_replays_on_subscribe() {
        let transport = LoopbackTransport::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        transport.attach(TransportInbox::new(tx));
        transport.connect().await.unwrap();
        rx.recv().await;

        transport.inject_retain("hive/service/registrar", "(primary started r/1 100.0)", true);
        transport.subscribe("hive/service/registrar").await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(Ingress::Inbound {
                topic: "hive/service/registrar".to_string(),
                payload: "(primary started r/1 100.0)".to_string(),
            })
        );
    }

    #[tokio::test]
    async fn publish_before_connect_fails() {
        let transport = LoopbackTransport::new();
        assert!(transport.publish("t", "(x)", false).await.is_err());
    }
}
