//! Actor composition
//!
//! An actor is a named unit of state plus a command table, fed by two
//! mailboxes: `control` (priority) for runtime management and `in`
//! (standard) for application traffic. Remote peers reach the actor by
//! publishing s-expressions on its `/in` topic; the route handler parses
//! them into [`Message`]s and posts them onto the input mailbox, so all
//! command execution happens on the event loop in mailbox order.
//!
//! Every actor carries an [`EcProducer`] share seeded with `lifecycle`,
//! `running` and `log_level`, and honors the built-in commands `add`,
//! `update`, `remove` (share mutations) and `stop`.

use crate::context::{channel, Context};
use crate::message::{CommandTable, Message};
use crate::router::RouteFn;
use crate::share::{EcProducer, ShareKey};
use codec::parse;
use config::ServiceIdentity;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use tracing::{debug, info};

/// Actor lifecycle stage; `running` in the share map is the derived view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Ready,
    Running,
    Stopped,
}

impl Lifecycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lifecycle::Ready => "ready",
            Lifecycle::Running => "running",
            Lifecycle::Stopped => "stopped",
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, Lifecycle::Running)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct Actor {
    identity: ServiceIdentity,
    ctx: Rc<Context>,
    commands: Rc<CommandTable>,
    share: Rc<EcProducer>,
    lifecycle: Cell<Lifecycle>,
}

impl Actor {
    /// Assemble an actor around a user command table
    ///
    /// Built-in commands are registered over the user's table, so `add`,
    /// `update`, `remove` and `stop` always mean the runtime's versions.
    pub(crate) fn new(
        ctx: Rc<Context>,
        identity: ServiceIdentity,
        mut commands: CommandTable,
        initial_log_level: &str,
    ) -> Rc<Self> {
        let share = Rc::new(EcProducer::new(
            ctx.clone(),
            identity.topic(channel::STATE),
            [
                (ShareKey::Lifecycle, Lifecycle::Ready.as_str().to_string()),
                (ShareKey::Running, "false".to_string()),
                (ShareKey::LogLevel, initial_log_level.to_string()),
            ],
        ));

        for builtin in ["add", "update", "remove"] {
            let share = share.clone();
            commands.register(builtin, move |arguments| {
                share.remote_command(builtin, arguments);
                Ok(())
            });
        }
        {
            let ctx = ctx.clone();
            commands.register("stop", move |_arguments| {
                info!("Stop command received");
                ctx.terminate(0);
                Ok(())
            });
        }

        {
            let ctx = ctx.clone();
            share.add_handler(Rc::new(move |command, key, value| {
                if key == ShareKey::LogLevel.as_str() && command != "remove" {
                    ctx.set_log_level(value);
                }
            }));
        }

        Rc::new(Self {
            identity,
            ctx,
            commands: Rc::new(commands),
            share,
            lifecycle: Cell::new(Lifecycle::Ready),
        })
    }

    pub fn name(&self) -> &str {
        self.identity.name()
    }

    pub fn identity(&self) -> &ServiceIdentity {
        &self.identity
    }

    pub fn share(&self) -> &Rc<EcProducer> {
        &self.share
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.get()
    }

    /// Advance the lifecycle, reflecting it into the share map
    pub fn set_lifecycle(&self, stage: Lifecycle) {
        debug!(actor = %self.name(), %stage, "Lifecycle transition");
        self.lifecycle.set(stage);
        self.share.update(&ShareKey::Lifecycle, stage.as_str());
        self.share
            .update(&ShareKey::Running, stage.is_running().to_string());
    }

    /// Mailbox handler executing messages against this actor's commands
    pub(crate) fn mailbox_handler(self: &Rc<Self>) -> Rc<crate::mailbox::MailboxFn> {
        let commands = self.commands.clone();
        Rc::new(move |_mailbox, message: Message, _posted_at| message.invoke(&commands))
    }

    /// Route handler parsing one inbound channel into one mailbox
    pub(crate) fn route_handler(self: &Rc<Self>, channel_name: &'static str) -> Rc<RouteFn> {
        let mailbox = self.identity.mailbox_name(channel_name);
        let target = self.identity.topic_path().to_string();
        Rc::new(move |ctx, topic, payload| {
            match parse(payload) {
                Ok((command, arguments)) => {
                    ctx.post_mail(mailbox.clone(), Message::new(target.clone(), command, arguments));
                }
                Err(e) => {
                    debug!(topic = %topic, error = %e, "Ignoring unparseable payload");
                }
            }
            Ok(true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Outbound;
    use codec::Term;
    use config::RuntimeConfig;
    use std::cell::RefCell;
    use tokio::sync::mpsc;

    fn actor() -> (Rc<Actor>, Rc<Context>) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let ctx = Rc::new(Context::new(&RuntimeConfig::default(), tx));
        let identity = ServiceIdentity::with_topic_path("echo", 1, "hive/host/100");
        let actor = Actor::new(ctx.clone(), identity, CommandTable::new(), "info");
        (actor, ctx)
    }

    #[test]
    fn share_is_seeded_with_runtime_keys() {
        let (actor, _ctx) = actor();
        assert_eq!(
            actor.share().get(&ShareKey::Lifecycle).as_deref(),
            Some("ready")
        );
        assert_eq!(
            actor.share().get(&ShareKey::Running).as_deref(),
            Some("false")
        );
        assert_eq!(
            actor.share().get(&ShareKey::LogLevel).as_deref(),
            Some("info")
        );
    }

    #[test]
    fn lifecycle_transition_updates_derived_running() {
        let (actor, _ctx) = actor();
        actor.set_lifecycle(Lifecycle::Running);
        assert_eq!(actor.lifecycle(), Lifecycle::Running);
        assert_eq!(
            actor.share().get(&ShareKey::Running).as_deref(),
            Some("true")
        );

        actor.set_lifecycle(Lifecycle::Stopped);
        assert_eq!(
            actor.share().get(&ShareKey::Lifecycle).as_deref(),
            Some("stopped")
        );
        assert_eq!(
            actor.share().get(&ShareKey::Running).as_deref(),
            Some("false")
        );
    }

    #[test]
    fn builtin_update_command_mutates_the_share() {
        let (actor, _ctx) = actor();
        let message = Message::new(
            "hive/host/100",
            "update",
            vec![Term::symbol("speed"), Term::symbol("fast")],
        );
        message.invoke(&actor.commands).unwrap();
        assert_eq!(
            actor
                .share()
                .get(&ShareKey::Custom("speed".to_string()))
                .as_deref(),
            Some("fast")
        );
    }

    #[test]
    fn builtin_stop_terminates_with_status_zero() {
        let (actor, ctx) = actor();
        let message = Message::new("hive/host/100", "stop", vec![]);
        message.invoke(&actor.commands).unwrap();
        assert_eq!(ctx.exit_status(), Some(0));
    }

    #[test]
    fn log_level_share_updates_reach_the_context() {
        // Without a LogControl installed the update is a warn-only no-op;
        // the handler wiring is what this asserts.
        let (actor, _ctx) = actor();
        actor.share().update(&ShareKey::LogLevel, "debug");
        assert_eq!(
            actor.share().get(&ShareKey::LogLevel).as_deref(),
            Some("debug")
        );
    }

    #[test]
    fn route_handler_posts_parsed_mail() {
        let (actor, ctx) = actor();
        let handler = actor.route_handler(channel::IN);
        handler(&ctx, "hive/host/100/in", "(update speed fast)").unwrap();

        let (mailbox, message) = ctx.next_pending_mail().unwrap();
        assert_eq!(mailbox, "echo/1/in");
        assert_eq!(message.command(), "update");
        assert_eq!(message.arguments().len(), 2);
    }

    #[test]
    fn route_handler_drops_unparseable_payloads() {
        let (actor, ctx) = actor();
        let handler = actor.route_handler(channel::IN);
        handler(&ctx, "hive/host/100/in", "not a sexp").unwrap();
        assert!(ctx.next_pending_mail().is_none());
    }

    #[test]
    fn user_commands_survive_builtin_registration() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let ctx = Rc::new(Context::new(&RuntimeConfig::default(), tx));
        let identity = ServiceIdentity::with_topic_path("echo", 1, "hive/host/100");

        let echoed = Rc::new(RefCell::new(Vec::new()));
        let seen = echoed.clone();
        let mut commands = CommandTable::new();
        commands.register("echo", move |arguments| {
            seen.borrow_mut()
                .push(arguments.iter().map(|t| t.to_string()).collect::<Vec<_>>());
            Ok(())
        });

        let actor = Actor::new(ctx, identity, commands, "info");
        Message::new("hive/host/100", "echo", vec![Term::symbol("hi")])
            .invoke(&actor.commands)
            .unwrap();
        assert_eq!(*echoed.borrow(), vec![vec!["hi".to_string()]]);
    }

    #[test]
    fn share_mutations_publish_to_the_state_topic() {
        let (actor, ctx) = actor();
        actor.set_lifecycle(Lifecycle::Running);
        let mut topics = Vec::new();
        while let Some(Outbound::Publish { topic, .. }) = ctx.next_outbound() {
            topics.push(topic);
        }
        assert!(topics.iter().all(|t| t == "hive/host/100/state"));
        assert_eq!(topics.len(), 2);
    }
}
