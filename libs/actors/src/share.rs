//! Eventually-consistent shared state
//!
//! Each service owns a small key/value map published as a stream of
//! `(add|update|remove key value)` deltas on its `/state` topic. Local
//! mutations are visible to the owning service immediately and reach
//! remote observers whenever the transport delivers them; concurrent
//! writers resolve last-write-wins with no further coordination.
//!
//! Remote peers drive the same three operations through the service's
//! `/in` topic; [`EcProducer::remote_command`] is deliberately permissive
//! and drops anything it does not recognize.

use crate::context::Context;
use codec::Term;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;
use tracing::debug;

/// Well-known share map keys
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShareKey {
    /// Service lifecycle stage
    Lifecycle,
    /// Derived boolean view of the lifecycle
    Running,
    /// Current tracing verbosity
    LogLevel,
    /// Application-defined key
    Custom(String),
}

impl ShareKey {
    pub fn as_str(&self) -> &str {
        match self {
            ShareKey::Lifecycle => "lifecycle",
            ShareKey::Running => "running",
            ShareKey::LogLevel => "log_level",
            ShareKey::Custom(key) => key,
        }
    }
}

impl fmt::Display for ShareKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Change observer: `(command, key, value)`; value is empty for removes
pub type ShareFn = dyn Fn(&str, &str, &str);

/// Producer side of one service's shared state
pub struct EcProducer {
    ctx: Rc<Context>,
    state_topic: String,
    state: RefCell<BTreeMap<String, String>>,
    handlers: RefCell<Vec<Rc<ShareFn>>>,
}

impl EcProducer {
    /// Seed a producer publishing deltas on `state_topic`
    ///
    /// Seed values populate the local map without publishing; the initial
    /// state reaches observers through the deltas that follow.
    pub fn new(
        ctx: Rc<Context>,
        state_topic: impl Into<String>,
        seed: impl IntoIterator<Item = (ShareKey, String)>,
    ) -> Self {
        let state = seed
            .into_iter()
            .map(|(key, value)| (key.as_str().to_string(), value))
            .collect();
        Self {
            ctx,
            state_topic: state_topic.into(),
            state: RefCell::new(state),
            handlers: RefCell::new(Vec::new()),
        }
    }

    /// Observe every local and remote mutation, synchronously
    pub fn add_handler(&self, handler: Rc<ShareFn>) {
        self.handlers.borrow_mut().push(handler);
    }

    pub fn get(&self, key: &ShareKey) -> Option<String> {
        self.state.borrow().get(key.as_str()).cloned()
    }

    /// Copy of the whole map, for state snapshots
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.state.borrow().clone()
    }

    /// Insert a key, publishing an `add` delta
    ///
    /// Adding over an existing key still wins; the distinction between
    /// `add` and `update` is advisory for observers.
    pub fn add(&self, key: &ShareKey, value: impl Into<String>) {
        self.mutate("add", key.as_str(), &value.into());
    }

    /// Overwrite a key, publishing an `update` delta
    pub fn update(&self, key: &ShareKey, value: impl Into<String>) {
        self.mutate("update", key.as_str(), &value.into());
    }

    /// Drop a key, publishing a `remove` delta
    ///
    /// Removing an absent key still publishes; observers converge on the
    /// same end state either way.
    pub fn remove(&self, key: &ShareKey) {
        let key = key.as_str();
        self.state.borrow_mut().remove(key);
        let payload = codec::generate("remove", &[Term::symbol(key)]);
        self.ctx.publish(self.state_topic.clone(), payload);
        self.run_handlers("remove", key, "");
    }

    fn mutate(&self, command: &str, key: &str, value: &str) {
        self.state
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
        let payload = codec::generate(command, &[Term::symbol(key), Term::symbol(value)]);
        self.ctx.publish(self.state_topic.clone(), payload);
        self.run_handlers(command, key, value);
    }

    fn run_handlers(&self, command: &str, key: &str, value: &str) {
        let handlers: Vec<Rc<ShareFn>> = self.handlers.borrow().clone();
        for handler in handlers {
            handler(command, key, value);
        }
    }

    /// Apply a remotely requested mutation
    ///
    /// Accepts `add`/`update` with `(key value)` and `remove` with `(key)`.
    /// Anything else is dropped with a debug log and no state change.
    pub fn remote_command(&self, command: &str, arguments: &[Term]) {
        match (command, arguments) {
            ("add" | "update", [Term::Symbol(key), value]) => {
                let value = match value {
                    Term::Symbol(symbol) => symbol.clone(),
                    list @ Term::List(_) => list.to_string(),
                };
                self.mutate(command, key, &value);
            }
            ("remove", [Term::Symbol(key)]) => {
                self.remove(&ShareKey::Custom(key.clone()));
            }
            _ => {
                debug!(command, "Ignoring malformed share command");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Outbound;
    use config::RuntimeConfig;
    use tokio::sync::mpsc;

    fn producer() -> EcProducer {
        let (tx, _rx) = mpsc::unbounded_channel();
        let ctx = Rc::new(Context::new(&RuntimeConfig::default(), tx));
        EcProducer::new(
            ctx,
            "hive/h/1/state",
            [(ShareKey::Lifecycle, "ready".to_string())],
        )
    }

    fn drain_deltas(producer: &EcProducer) -> Vec<String> {
        let mut deltas = Vec::new();
        while let Some(op) = producer.ctx.next_outbound() {
            if let Outbound::Publish { topic, payload, .. } = op {
                assert_eq!(topic, "hive/h/1/state");
                deltas.push(payload);
            }
        }
        deltas
    }

    #[test]
    fn seed_populates_without_publishing() {
        let producer = producer();
        assert_eq!(
            producer.get(&ShareKey::Lifecycle).as_deref(),
            Some("ready")
        );
        assert!(drain_deltas(&producer).is_empty());
    }

    #[test]
    fn mutations_are_locally_visible_and_published() {
        let producer = producer();
        let key = ShareKey::Custom("speed".to_string());

        producer.add(&key, "fast");
        assert_eq!(producer.get(&key).as_deref(), Some("fast"));

        producer.update(&key, "slow");
        assert_eq!(producer.get(&key).as_deref(), Some("slow"));

        producer.remove(&key);
        assert_eq!(producer.get(&key), None);

        assert_eq!(
            drain_deltas(&producer),
            vec!["(add speed fast)", "(update speed slow)", "(remove speed)"]
        );
    }

    #[test]
    fn handlers_see_every_mutation_synchronously() {
        let producer = producer();
        let observed = Rc::new(RefCell::new(Vec::new()));
        let seen = observed.clone();
        producer.add_handler(Rc::new(move |command, key, value| {
            seen.borrow_mut()
                .push(format!("{command} {key} {value}"));
        }));

        producer.update(&ShareKey::LogLevel, "debug");
        producer.remove(&ShareKey::LogLevel);
        assert_eq!(
            *observed.borrow(),
            vec!["update log_level debug", "remove log_level "]
        );
    }

    #[test]
    fn remote_commands_apply_last_write_wins() {
        let producer = producer();
        let key = ShareKey::Custom("mode".to_string());

        producer.remote_command("add", &[Term::symbol("mode"), Term::symbol("a")]);
        producer.remote_command("update", &[Term::symbol("mode"), Term::symbol("b")]);
        assert_eq!(producer.get(&key).as_deref(), Some("b"));

        producer.remote_command("remove", &[Term::symbol("mode")]);
        assert_eq!(producer.get(&key), None);
    }

    #[test]
    fn malformed_remote_commands_are_dropped() {
        let producer = producer();
        producer.remote_command("update", &[Term::symbol("only-key")]);
        producer.remote_command("merge", &[Term::symbol("k"), Term::symbol("v")]);
        producer.remote_command("remove", &[]);
        assert_eq!(producer.snapshot().len(), 1);
        assert!(drain_deltas(&producer).is_empty());
    }

    #[test]
    fn removing_absent_key_still_publishes() {
        let producer = producer();
        producer.remove(&ShareKey::Custom("ghost".to_string()));
        assert_eq!(drain_deltas(&producer), vec!["(remove ghost)"]);
    }
}
