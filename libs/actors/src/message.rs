//! Message invocation
//!
//! A [`Message`] is an immutable command invocation descriptor: the target
//! actor's name, a command, positional arguments and an optional direct
//! handler reference. It is consumed exactly once by the event loop, which
//! makes delivery at-most-once and fire-and-forget: no retry, no result.
//!
//! Command resolution is an explicit table lookup. Every actor declares its
//! command set once at construction in a [`CommandTable`]; an unknown
//! command is a lookup miss, logged as a diagnostic and dropped. There is
//! no "resolved but not callable" case - a table entry is always callable.

use crate::error::{ActorError, Result};
use codec::Term;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, error};

/// Command handler signature: positional wire arguments in, unit out
pub type CommandFn = dyn Fn(&[Term]) -> std::result::Result<(), CommandError>;

/// Failures a command handler can report
///
/// `Arity` and `BadArgument` are resolution-level diagnostics: the message
/// is dropped and the actor continues. `Failed` is a genuine runtime
/// failure and propagates to the event loop for isolation there.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Wrong number of positional arguments
    #[error("expected {expected} argument(s), got {got}")]
    Arity { expected: usize, got: usize },

    /// An argument had the wrong shape or value
    #[error("bad argument {index}: {reason}")]
    BadArgument { index: usize, reason: String },

    /// The handler itself failed
    #[error(transparent)]
    Failed(#[from] anyhow::Error),
}

impl CommandError {
    pub fn bad_argument(index: usize, reason: impl Into<String>) -> Self {
        Self::BadArgument {
            index,
            reason: reason.into(),
        }
    }

    /// True for diagnostics that drop the message without propagating
    fn is_resolution_failure(&self) -> bool {
        matches!(self, Self::Arity { .. } | Self::BadArgument { .. })
    }
}

/// Require an exact argument count
pub fn expect_arity(arguments: &[Term], expected: usize) -> std::result::Result<(), CommandError> {
    if arguments.len() == expected {
        Ok(())
    } else {
        Err(CommandError::Arity {
            expected,
            got: arguments.len(),
        })
    }
}

/// Fetch argument `index` as a bare symbol
pub fn symbol_arg(arguments: &[Term], index: usize) -> std::result::Result<&str, CommandError> {
    let term = arguments.get(index).ok_or(CommandError::Arity {
        expected: index + 1,
        got: arguments.len(),
    })?;
    term.as_symbol()
        .ok_or_else(|| CommandError::bad_argument(index, "expected a symbol, got a list"))
}

/// Explicit command-name to handler mapping, built once per actor
#[derive(Clone, Default)]
pub struct CommandTable {
    commands: HashMap<String, Rc<CommandFn>>,
}

impl CommandTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a command name
    ///
    /// Re-registering a name replaces the previous handler.
    pub fn register<F>(&mut self, command: impl Into<String>, handler: F)
    where
        F: Fn(&[Term]) -> std::result::Result<(), CommandError> + 'static,
    {
        let command = command.into();
        if self
            .commands
            .insert(command.clone(), Rc::new(handler))
            .is_some()
        {
            debug!(command = %command, "Replaced existing command handler");
        }
    }

    pub fn get(&self, command: &str) -> Option<Rc<CommandFn>> {
        self.commands.get(command).cloned()
    }

    pub fn contains(&self, command: &str) -> bool {
        self.commands.contains_key(command)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.commands.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("CommandTable")
            .field("commands", &names)
            .finish()
    }
}

/// Immutable command invocation descriptor
pub struct Message {
    target: String,
    command: String,
    arguments: Vec<Term>,
    handler: Option<Rc<CommandFn>>,
}

impl Message {
    pub fn new(target: impl Into<String>, command: impl Into<String>, arguments: Vec<Term>) -> Self {
        Self {
            target: target.into(),
            command: command.into(),
            arguments,
            handler: None,
        }
    }

    /// Construct with a direct handler reference, bypassing table lookup
    pub fn with_handler(
        target: impl Into<String>,
        command: impl Into<String>,
        arguments: Vec<Term>,
        handler: Rc<CommandFn>,
    ) -> Self {
        Self {
            target: target.into(),
            command: command.into(),
            arguments,
            handler: Some(handler),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn arguments(&self) -> &[Term] {
        &self.arguments
    }

    /// Resolve and invoke the command, exactly one attempt
    ///
    /// Resolution failures (unknown command, argument mismatch) are logged
    /// as diagnostics and the message is dropped. Any other handler failure
    /// propagates to the event loop, which isolates it per message.
    pub fn invoke(&self, commands: &CommandTable) -> Result<()> {
        debug!(message = %self, "Message.invoke");
        let handler = match self.handler.clone().or_else(|| commands.get(&self.command)) {
            Some(handler) => handler,
            None => {
                error!("{}: function not found in: {}", self, self.target);
                return Ok(());
            }
        };

        match handler(&self.arguments) {
            Ok(()) => Ok(()),
            Err(e) if e.is_resolution_failure() => {
                error!("{}: {}", self, e);
                Ok(())
            }
            Err(CommandError::Failed(source)) => {
                Err(ActorError::handler(self.command.clone(), source))
            }
            Err(_) => unreachable!("non-resolution CommandError is always Failed"),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Message: {}(", self.command)?;
        for (i, argument) in self.arguments.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{}", argument)?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("target", &self.target)
            .field("command", &self.command)
            .field("arguments", &self.arguments)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}
