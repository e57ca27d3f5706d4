//! Process-level runtime assembly
//!
//! `ActorSystem` wires the pieces together: one context, one router, one
//! dispatcher, one transport, and any number of registered actors. It
//! installs the registrar watcher, advertises a `(stopped)` last will on
//! the `/state` topic once a protocol is configured, and `run()` drives
//! the event loop to its exit status so `main` can report it.

use crate::actor::{Actor, Lifecycle};
use crate::context::{channel, Context};
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::logging::{self, LogControl};
use crate::message::CommandTable;
use crate::registrar::{self, RegistrarFn};
use crate::router::{RouteFn, TopicRouter};
use crate::transport::{Transport, TransportInbox};
use config::{RuntimeConfig, ServiceIdentity};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use tracing::{error, info};
use uuid::Uuid;

pub struct ActorSystem {
    config: RuntimeConfig,
    system_id: String,
    ctx: Rc<Context>,
    router: Rc<RefCell<TopicRouter>>,
    dispatcher: Dispatcher,
    transport: Arc<dyn Transport>,
    actors: Vec<Rc<Actor>>,
    next_service_id: u32,
}

impl ActorSystem {
    /// Assemble a system without touching the global tracing subscriber
    ///
    /// Tests and embedders that install their own subscriber use this.
    pub fn new(config: RuntimeConfig, transport: Arc<dyn Transport>) -> Self {
        Self::build(config, transport, None, None)
    }

    /// Assemble a system and install console (and, when configured,
    /// transport) logging
    pub fn with_logging(config: RuntimeConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let (control, line_rx) = logging::init(&config)?;
        Ok(Self::build(config, transport, Some(control), line_rx))
    }

    fn build(
        config: RuntimeConfig,
        transport: Arc<dyn Transport>,
        log_control: Option<LogControl>,
        log_lines: Option<UnboundedReceiver<String>>,
    ) -> Self {
        let (ingress_tx, ingress_rx) = mpsc::unbounded_channel();
        transport.attach(TransportInbox::new(ingress_tx.clone()));

        let ctx = Rc::new(Context::new(&config, ingress_tx));
        if let Some(control) = log_control {
            ctx.set_log_control(control);
        }

        let router = Rc::new(RefCell::new(TopicRouter::new()));
        registrar::install(&mut router.borrow_mut(), &ctx);

        let dispatcher = Dispatcher::new(
            ctx.clone(),
            router.clone(),
            transport.clone(),
            ingress_rx,
            log_lines,
        );

        let system_id = Uuid::new_v4().to_string();
        info!(
            system_id = %system_id,
            topic_path = %ctx.topic_path(),
            namespace = %config.namespace,
            "Actor system assembled"
        );

        Self {
            config,
            system_id,
            ctx,
            router,
            dispatcher,
            transport,
            actors: Vec::new(),
            next_service_id: 1,
        }
    }

    pub fn context(&self) -> &Rc<Context> {
        &self.ctx
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn system_id(&self) -> &str {
        &self.system_id
    }

    /// Register an actor under `name`, wiring mailboxes and topic routes
    ///
    /// The control mailbox registers first and with priority, so runtime
    /// management always preempts queued application traffic.
    pub fn register_actor(&mut self, name: impl Into<String>, commands: CommandTable) -> Rc<Actor> {
        let service_id = self.next_service_id;
        self.next_service_id += 1;
        let identity = ServiceIdentity::new(&self.config.namespace, name, service_id);
        info!(
            actor = %identity.name(),
            service_id,
            topic_path = %identity.topic_path(),
            "Registering actor"
        );

        let actor = Actor::new(
            self.ctx.clone(),
            identity,
            commands,
            &self.config.log_level,
        );
        self.dispatcher.add_mailbox_handler(
            actor.mailbox_handler(),
            actor.identity().mailbox_name(channel::CONTROL),
            true,
        );
        self.dispatcher.add_mailbox_handler(
            actor.mailbox_handler(),
            actor.identity().mailbox_name(channel::IN),
            false,
        );

        let mut router = self.router.borrow_mut();
        router.add(
            &self.ctx,
            actor.route_handler(channel::CONTROL),
            actor.identity().topic(channel::CONTROL),
        );
        router.add(
            &self.ctx,
            actor.route_handler(channel::IN),
            actor.identity().topic(channel::IN),
        );
        drop(router);

        self.actors.push(actor.clone());
        actor
    }

    /// Advertise a protocol identity in registrar announcements
    pub fn set_protocol(&self, protocol: impl Into<String>) {
        self.ctx.set_protocol(protocol);
    }

    /// Override the transport name advertised in announcements
    pub fn set_transport(&self, name: impl Into<String>) {
        self.ctx.set_transport(name);
    }

    pub fn add_tags(&self, tags: &[String]) {
        self.ctx.add_tags(tags);
    }

    pub fn set_registrar_handler(&self, handler: Rc<RegistrarFn>) {
        self.ctx.set_registrar_handler(handler);
    }

    /// Exit with status 1 when the primary registrar goes away
    pub fn set_terminate_registrar_not_found(&self, terminate: bool) {
        self.ctx.set_terminate_registrar_not_found(terminate);
    }

    /// Route an arbitrary topic pattern to a handler
    pub fn add_message_handler(&self, handler: Rc<RouteFn>, pattern: impl Into<String>) {
        self.router.borrow_mut().add(&self.ctx, handler, pattern);
    }

    pub fn remove_message_handler(&self, handler: &Rc<RouteFn>, pattern: &str) {
        self.router.borrow_mut().remove(&self.ctx, handler, pattern);
    }

    /// Connect the transport and drive the event loop to completion
    ///
    /// Returns the exit status set by `Context::terminate`; the caller
    /// decides whether to turn that into `std::process::exit`.
    pub async fn run(&mut self) -> Result<i32> {
        if self.ctx.protocol().is_some() {
            let last_will = codec::generate("stopped", &[]);
            self.transport
                .set_last_will(&self.ctx.topic_state(), &last_will);
        }
        self.transport.connect().await?;

        for actor in &self.actors {
            actor.set_lifecycle(Lifecycle::Running);
        }

        let status = self.dispatcher.run().await?;

        for actor in &self.actors {
            actor.set_lifecycle(Lifecycle::Stopped);
        }
        if let Some(record) = self.ctx.registrar_record() {
            let (topic, payload) = registrar::withdrawal(&self.ctx, &record);
            self.ctx.publish(topic, payload);
        }
        self.dispatcher.flush_outbound().await;

        if let Err(e) = self.transport.disconnect().await {
            error!(error = %e, "Transport disconnect failed");
        }
        info!(status, "Actor system stopped");
        Ok(status)
    }
}
