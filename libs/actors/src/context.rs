//! Process context
//!
//! One explicit context object per process, created at startup and passed
//! to every component at construction. It replaces any ambient global
//! state: the transport connection view, protocol identity, tags,
//! registrar bookkeeping, the outbound transport queue and the pending
//! local mail queue all live here.
//!
//! The context is single-thread owned (the event loop's thread); interior
//! mutability is `Cell`/`RefCell`, never locks, because the loop never
//! enters it concurrently. The only cross-thread surface is the ingress
//! sender used to wake the loop.

use crate::connection::Connection;
use crate::logging::LogControl;
use crate::message::Message;
use crate::registrar::{RegistrarFn, RegistrarRecord};
use crate::transport::Ingress;
use config::{identity, RuntimeConfig};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

/// Framework channel names hanging off a topic path
pub mod channel {
    pub const CONTROL: &str = "control";
    pub const STATE: &str = "state";
    pub const IN: &str = "in";
    pub const OUT: &str = "out";
    pub const LOG: &str = "log";
}

/// Queued side effect toward the transport
///
/// Handlers never touch the transport directly; they enqueue operations
/// here and the event loop flushes them between invocations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Publish {
        topic: String,
        payload: String,
        retain: bool,
    },
    Subscribe {
        topic: String,
    },
    Unsubscribe {
        topic: String,
    },
}

/// Shared runtime services for one process
pub struct Context {
    namespace: String,
    transport_name: RefCell<String>,
    owner: String,
    topic_path: String,

    protocol: RefCell<Option<String>>,
    tags: RefCell<Vec<String>>,

    connection: Connection,
    registrar: RefCell<Option<RegistrarRecord>>,
    registrar_handler: RefCell<Option<Rc<RegistrarFn>>>,
    terminate_registrar_not_found: Cell<bool>,

    exit_status: Cell<Option<i32>>,
    outbound: RefCell<VecDeque<Outbound>>,
    pending_mail: RefCell<VecDeque<(String, Message)>>,
    log_control: RefCell<Option<LogControl>>,

    ingress_tx: UnboundedSender<Ingress>,
}

impl Context {
    pub(crate) fn new(config: &RuntimeConfig, ingress_tx: UnboundedSender<Ingress>) -> Self {
        let topic_path = format!(
            "{}/{}/{}",
            config.namespace,
            identity::hostname(),
            identity::pid()
        );
        Self {
            namespace: config.namespace.clone(),
            transport_name: RefCell::new(config.transport.clone()),
            owner: identity::username().to_string(),
            topic_path,
            protocol: RefCell::new(None),
            tags: RefCell::new(Vec::new()),
            connection: Connection::new(),
            registrar: RefCell::new(None),
            registrar_handler: RefCell::new(None),
            terminate_registrar_not_found: Cell::new(false),
            exit_status: Cell::new(None),
            outbound: RefCell::new(VecDeque::new()),
            pending_mail: RefCell::new(VecDeque::new()),
            log_control: RefCell::new(None),
            ingress_tx,
        }
    }

    // --- identity ---------------------------------------------------------

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Transport name advertised in registrar announcements
    pub fn transport_name(&self) -> String {
        self.transport_name.borrow().clone()
    }

    pub fn set_transport(&self, name: impl Into<String>) {
        *self.transport_name.borrow_mut() = name.into();
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Process topic path: `{namespace}/{host}/{pid}`
    pub fn topic_path(&self) -> &str {
        &self.topic_path
    }

    pub fn topic_control(&self) -> String {
        format!("{}/{}", self.topic_path, channel::CONTROL)
    }

    pub fn topic_state(&self) -> String {
        format!("{}/{}", self.topic_path, channel::STATE)
    }

    pub fn topic_in(&self) -> String {
        format!("{}/{}", self.topic_path, channel::IN)
    }

    pub fn topic_out(&self) -> String {
        format!("{}/{}", self.topic_path, channel::OUT)
    }

    pub fn topic_log(&self) -> String {
        format!("{}/{}", self.topic_path, channel::LOG)
    }

    // --- protocol and tags ------------------------------------------------

    pub fn set_protocol(&self, protocol: impl Into<String>) {
        *self.protocol.borrow_mut() = Some(protocol.into());
    }

    pub fn protocol(&self) -> Option<String> {
        self.protocol.borrow().clone()
    }

    pub fn add_tags(&self, tags: &[String]) {
        self.tags.borrow_mut().extend_from_slice(tags);
    }

    pub fn add_tags_string(&self, tags: &str) {
        if tags.is_empty() {
            return;
        }
        let parsed: Vec<String> = tags.split(',').map(str::to_string).collect();
        self.add_tags(&parsed);
    }

    pub fn tags(&self) -> Vec<String> {
        self.tags.borrow().clone()
    }

    // --- connection and registrar -----------------------------------------

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn registrar_record(&self) -> Option<RegistrarRecord> {
        self.registrar.borrow().clone()
    }

    pub(crate) fn set_registrar_record(&self, record: Option<RegistrarRecord>) {
        *self.registrar.borrow_mut() = record;
    }

    pub fn set_registrar_handler(&self, handler: Rc<RegistrarFn>) {
        *self.registrar_handler.borrow_mut() = Some(handler);
    }

    pub(crate) fn registrar_handler(&self) -> Option<Rc<RegistrarFn>> {
        self.registrar_handler.borrow().clone()
    }

    pub fn set_terminate_registrar_not_found(&self, terminate: bool) {
        self.terminate_registrar_not_found.set(terminate);
    }

    pub fn terminate_registrar_not_found(&self) -> bool {
        self.terminate_registrar_not_found.get()
    }

    // --- transport side effects -------------------------------------------

    /// Queue a payload for publication
    pub fn publish(&self, topic: impl Into<String>, payload: impl Into<String>) {
        self.publish_retain(topic, payload, false);
    }

    pub fn publish_retain(
        &self,
        topic: impl Into<String>,
        payload: impl Into<String>,
        retain: bool,
    ) {
        self.outbound.borrow_mut().push_back(Outbound::Publish {
            topic: topic.into(),
            payload: payload.into(),
            retain,
        });
    }

    pub fn subscribe(&self, topic: impl Into<String>) {
        self.outbound.borrow_mut().push_back(Outbound::Subscribe {
            topic: topic.into(),
        });
    }

    pub fn unsubscribe(&self, topic: impl Into<String>) {
        self.outbound.borrow_mut().push_back(Outbound::Unsubscribe {
            topic: topic.into(),
        });
    }

    pub(crate) fn next_outbound(&self) -> Option<Outbound> {
        self.outbound.borrow_mut().pop_front()
    }

    // --- mail and lifecycle -----------------------------------------------

    /// Queue a message for a named mailbox
    ///
    /// The event loop absorbs pending mail before selecting the next
    /// runnable message, so a post made by an in-flight handler is visible
    /// to the very next dispatch decision.
    pub fn post_mail(&self, mailbox: impl Into<String>, message: Message) {
        self.pending_mail
            .borrow_mut()
            .push_back((mailbox.into(), message));
    }

    pub(crate) fn next_pending_mail(&self) -> Option<(String, Message)> {
        self.pending_mail.borrow_mut().pop_front()
    }

    /// Request process termination with an exit status
    ///
    /// Non-preemptive: the in-flight handler completes, then the loop
    /// stops. The first requested status wins.
    pub fn terminate(&self, status: i32) {
        if self.exit_status.get().is_none() {
            self.exit_status.set(Some(status));
        }
        // Wake the loop if it is parked on the ingress channel.
        let _ = self.ingress_tx.send(Ingress::Wake);
    }

    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status.get()
    }

    // --- logging ----------------------------------------------------------

    pub(crate) fn set_log_control(&self, control: LogControl) {
        *self.log_control.borrow_mut() = Some(control);
    }

    /// Retarget the process log filter; invalid levels are ignored
    pub fn set_log_level(&self, level: &str) {
        if let Some(control) = self.log_control.borrow().as_ref() {
            if let Err(e) = control.set_level(level) {
                warn!(level = %level, error = %e, "Ignoring invalid log level");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn test_context() -> Context {
        let (tx, _rx) = mpsc::unbounded_channel();
        Context::new(&RuntimeConfig::default(), tx)
    }

    #[test]
    fn channel_topics_hang_off_topic_path() {
        let ctx = test_context();
        let base = ctx.topic_path().to_string();
        assert!(base.starts_with("hive/"));
        assert_eq!(ctx.topic_in(), format!("{}/in", base));
        assert_eq!(ctx.topic_state(), format!("{}/state", base));
        assert_eq!(ctx.topic_log(), format!("{}/log", base));
    }

    #[test]
    fn first_terminate_status_wins() {
        let ctx = test_context();
        assert_eq!(ctx.exit_status(), None);
        ctx.terminate(1);
        ctx.terminate(0);
        assert_eq!(ctx.exit_status(), Some(1));
    }

    #[test]
    fn outbound_operations_queue_in_order() {
        let ctx = test_context();
        ctx.subscribe("a/b");
        ctx.publish("a/b", "(x)");
        assert_eq!(
            ctx.next_outbound(),
            Some(Outbound::Subscribe {
                topic: "a/b".to_string()
            })
        );
        assert_eq!(
            ctx.next_outbound(),
            Some(Outbound::Publish {
                topic: "a/b".to_string(),
                payload: "(x)".to_string(),
                retain: false,
            })
        );
        assert_eq!(ctx.next_outbound(), None);
    }

    #[test]
    fn tags_accumulate_from_string_form() {
        let ctx = test_context();
        ctx.add_tags_string("a=1,b=2");
        ctx.add_tags_string("");
        assert_eq!(ctx.tags(), vec!["a=1".to_string(), "b=2".to_string()]);
    }
}
