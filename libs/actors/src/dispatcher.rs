//! Cooperative event loop
//!
//! One `Dispatcher` drives a whole process: it drains transport ingress,
//! absorbs locally posted mail into the registered mailboxes, flushes the
//! context's outbound queue through the transport, and then processes one
//! message at a time. Handlers run to completion on the loop thread, so
//! actor state needs no locking; a handler that blocks starves every
//! mailbox in the process.
//!
//! Scheduling is structural: priority mailboxes are fully drained, in
//! registration order, before any standard mailbox is offered a turn.
//! Within one mailbox, delivery is strictly first-in first-out.

use crate::context::Context;
use crate::error::Result;
use crate::mailbox::{Mailbox, MailboxFn};
use crate::router::{self, TopicRouter};
use crate::transport::{Ingress, Transport};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, error, info, trace, warn};

pub struct Dispatcher {
    ctx: Rc<Context>,
    router: Rc<RefCell<TopicRouter>>,
    transport: Arc<dyn Transport>,
    mailboxes: Vec<Mailbox>,
    index: HashMap<String, usize>,
    ingress_rx: UnboundedReceiver<Ingress>,
    log_lines: Option<UnboundedReceiver<String>>,
}

impl Dispatcher {
    pub(crate) fn new(
        ctx: Rc<Context>,
        router: Rc<RefCell<TopicRouter>>,
        transport: Arc<dyn Transport>,
        ingress_rx: UnboundedReceiver<Ingress>,
        log_lines: Option<UnboundedReceiver<String>>,
    ) -> Self {
        Self {
            ctx,
            router,
            transport,
            mailboxes: Vec::new(),
            index: HashMap::new(),
            ingress_rx,
            log_lines,
        }
    }

    /// Register a named mailbox
    ///
    /// Priority mailboxes preempt standard ones; among mailboxes of the
    /// same class, registration order decides who is polled first.
    pub fn add_mailbox_handler(
        &mut self,
        handler: Rc<MailboxFn>,
        name: impl Into<String>,
        is_priority: bool,
    ) {
        let name = name.into();
        if self.index.contains_key(&name) {
            warn!(mailbox = %name, "Mailbox already registered; keeping the first");
            return;
        }
        debug!(mailbox = %name, is_priority, "Registering mailbox");
        self.index.insert(name.clone(), self.mailboxes.len());
        self.mailboxes
            .push(Mailbox::new(name, is_priority, handler));
    }

    /// Drive the loop until something calls `Context::terminate`
    ///
    /// Returns the exit status for the process to report.
    pub async fn run(&mut self) -> Result<i32> {
        info!("Event loop started");
        loop {
            while let Ok(event) = self.ingress_rx.try_recv() {
                self.handle_ingress(event);
            }
            self.absorb_pending_mail();
            self.forward_log_lines();
            self.flush_outbound().await;

            if let Some(status) = self.ctx.exit_status() {
                info!(status, "Event loop stopping");
                return Ok(status);
            }

            if self.process_one() {
                continue;
            }

            // Idle: park until the transport or a terminate call wakes us.
            let woke = if let Some(log_rx) = self.log_lines.as_mut() {
                tokio::select! {
                    event = self.ingress_rx.recv() => event,
                    line = log_rx.recv() => {
                        if let Some(line) = line {
                            self.ctx.publish(self.ctx.topic_log(), line);
                        }
                        Some(Ingress::Wake)
                    }
                }
            } else {
                self.ingress_rx.recv().await
            };
            match woke {
                Some(event) => self.handle_ingress(event),
                None => {
                    warn!("Ingress channel closed; stopping event loop");
                    return Ok(self.ctx.exit_status().unwrap_or(0));
                }
            }
        }
    }

    fn handle_ingress(&mut self, event: Ingress) {
        match event {
            Ingress::Inbound { topic, payload } => {
                trace!(topic = %topic, payload = %payload, "Inbound message");
                // Clone the matched handlers out first: a handler may
                // re-borrow the router to add or remove routes.
                let handlers = self.router.borrow().matched_handlers(&topic);
                if handlers.is_empty() {
                    debug!(topic = %topic, "No route for inbound message");
                } else {
                    router::dispatch(&handlers, &self.ctx, &topic, &payload);
                }
            }
            Ingress::Connected => {
                info!("Transport connected");
                self.ctx.connection().on_transport_connected();
            }
            Ingress::Disconnected => {
                warn!("Transport disconnected");
                self.ctx.connection().on_transport_disconnected();
            }
            Ingress::Wake => {}
        }
    }

    fn absorb_pending_mail(&mut self) {
        while let Some((mailbox_name, message)) = self.ctx.next_pending_mail() {
            match self.index.get(&mailbox_name) {
                Some(&slot) => self.mailboxes[slot].push(message),
                None => {
                    error!(mailbox = %mailbox_name, %message, "Mail for unknown mailbox dropped");
                }
            }
        }
    }

    fn forward_log_lines(&mut self) {
        let Some(log_rx) = self.log_lines.as_mut() else {
            return;
        };
        let topic = self.ctx.topic_log();
        while let Ok(line) = log_rx.try_recv() {
            trace!("Forwarding log line to transport");
            self.ctx.publish(topic.clone(), line);
        }
    }

    pub(crate) async fn flush_outbound(&mut self) {
        use crate::context::Outbound;

        while let Some(op) = self.ctx.next_outbound() {
            let result = match &op {
                Outbound::Publish {
                    topic,
                    payload,
                    retain,
                } => self.transport.publish(topic, payload, *retain).await,
                Outbound::Subscribe { topic } => self.transport.subscribe(topic).await,
                Outbound::Unsubscribe { topic } => self.transport.unsubscribe(topic).await,
            };
            if let Err(e) = result {
                error!(error = %e, ?op, "Transport operation failed");
            }
        }
    }

    /// Pop and run one message; true when a message was processed
    fn process_one(&mut self) -> bool {
        let slot = self.next_ready();
        let Some(slot) = slot else {
            return false;
        };
        let mailbox = &mut self.mailboxes[slot];
        let name = mailbox.name().to_string();
        let handler = mailbox.handler();
        let (message, posted_at) = match mailbox.pop() {
            Some(entry) => entry,
            None => return false,
        };
        trace!(mailbox = %name, %message, "Processing message");
        if let Err(e) = handler(&name, message, posted_at) {
            error!(mailbox = %name, error = %e, "Mailbox handler failed");
        }
        true
    }

    fn next_ready(&self) -> Option<usize> {
        self.mailboxes
            .iter()
            .position(|m| m.is_priority() && !m.is_empty())
            .or_else(|| self.mailboxes.iter().position(|m| !m.is_empty()))
    }
}
