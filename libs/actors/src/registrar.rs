//! Registrar discovery protocol
//!
//! Every service watches the well-known topic `{namespace}/service/registrar`
//! for primary-registrar lifecycle broadcasts. When a primary announces
//! itself the service replies with an `(add ...)` record describing its own
//! topic path, protocol, transport, owner and tags, and upgrades its
//! connection state to Registrar. When the primary stops the service drops
//! back to Transport and, when configured to, terminates so a supervisor
//! can restart it against the next primary.
//!
//! Payloads that do not parse as one of the two recognized shapes are
//! ignored without touching any state.

use crate::connection::ConnectionState;
use crate::context::Context;
use crate::error::Result;
use crate::router::{RouteFn, TopicRouter};
use codec::{generate, parse, Term};
use std::rc::Rc;
use tracing::{debug, info, warn};

/// What the registrar watcher observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrarAction {
    /// A primary registrar announced itself
    Found,
    /// The primary registrar went away
    Lost,
}

/// The primary registrar currently in charge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrarRecord {
    /// Topic path of the primary registrar service
    pub topic_path: String,
    /// Startup timestamp as published, kept verbatim
    pub timestamp: String,
}

/// User hook observing registrar transitions
///
/// Runs after the built-in state transition. The return value is logged
/// for diagnostics and does not alter the built-in behavior.
pub type RegistrarFn = dyn Fn(&Context, RegistrarAction, Option<&RegistrarRecord>) -> bool;

/// Well-known registrar broadcast topic for a namespace
pub fn service_topic(namespace: &str) -> String {
    format!("{namespace}/service/registrar")
}

/// Subscribe the registrar watcher on the shared router
pub(crate) fn install(router: &mut TopicRouter, ctx: &Context) {
    let handler: Rc<RouteFn> = Rc::new(|ctx, _topic, payload| {
        handle_payload(ctx, payload);
        Ok(true)
    });
    router.add(ctx, handler, service_topic(ctx.namespace()));
}

fn handle_payload(ctx: &Context, payload: &str) {
    let (command, arguments) = match parse(payload) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(error = %e, "Ignoring unparseable registrar payload");
            return;
        }
    };
    if command != "primary" {
        return;
    }

    match arguments.as_slice() {
        [Term::Symbol(verb), Term::Symbol(topic_path), Term::Symbol(timestamp)]
            if verb == "started" =>
        {
            primary_started(
                ctx,
                RegistrarRecord {
                    topic_path: topic_path.clone(),
                    timestamp: timestamp.clone(),
                },
            );
        }
        [Term::Symbol(verb)] if verb == "stopped" => primary_stopped(ctx),
        _ => {
            debug!(payload = %payload, "Ignoring unrecognized registrar payload shape");
        }
    }
}

fn primary_started(ctx: &Context, record: RegistrarRecord) {
    info!(registrar = %record.topic_path, "Primary registrar started");

    if ctx.protocol().is_some() {
        let (topic, payload) = announcement(ctx, &record);
        ctx.publish(topic, payload);
    } else {
        debug!("No protocol configured; skipping registrar announcement");
    }

    ctx.set_registrar_record(Some(record.clone()));
    ctx.connection()
        .update_state(ConnectionState::Registrar);
    run_user_handler(ctx, RegistrarAction::Found, Some(&record));
}

fn primary_stopped(ctx: &Context) {
    info!("Primary registrar stopped");
    ctx.set_registrar_record(None);
    ctx.connection().update_state(ConnectionState::Transport);
    run_user_handler(ctx, RegistrarAction::Lost, None);

    if ctx.terminate_registrar_not_found() {
        warn!("Terminating: registrar lost and terminate_registrar_not_found is set");
        ctx.terminate(1);
    }
}

fn run_user_handler(ctx: &Context, action: RegistrarAction, record: Option<&RegistrarRecord>) {
    if let Some(handler) = ctx.registrar_handler() {
        let handled = handler(ctx, action, record);
        debug!(?action, handled, "User registrar handler ran");
    }
}

/// The `(add ...)` record registering this service with a primary
pub(crate) fn announcement(ctx: &Context, record: &RegistrarRecord) -> (String, String) {
    let protocol = ctx.protocol().unwrap_or_default();
    let tags = ctx.tags().into_iter().map(Term::symbol).collect();
    let payload = generate(
        "add",
        &[
            Term::symbol(ctx.topic_path()),
            Term::symbol(protocol),
            Term::symbol(ctx.transport_name()),
            Term::symbol(ctx.owner()),
            Term::List(tags),
        ],
    );
    (format!("{}/in", record.topic_path), payload)
}

/// The `(remove ...)` record sent to the primary on graceful shutdown
pub(crate) fn withdrawal(ctx: &Context, record: &RegistrarRecord) -> (String, String) {
    let payload = generate("remove", &[Term::symbol(ctx.topic_path())]);
    (format!("{}/in", record.topic_path), payload)
}
