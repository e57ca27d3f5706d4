//! Mailboxes
//!
//! A mailbox is a named, strictly ordered queue of pending messages for one
//! channel of one actor. Entries keep their enqueue timestamp and are
//! handed to the registered handler in FIFO order. The `is_priority` flag
//! is fixed when the mailbox is registered - a structural convention, never
//! a per-message property - and the dispatcher fully drains priority
//! mailboxes before servicing any standard one.

use crate::error::Result;
use crate::message::Message;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::Instant;

/// Mailbox handler signature: `(mailbox name, message, enqueue timestamp)`
pub type MailboxFn = dyn Fn(&str, Message, Instant) -> Result<()>;

/// One actor channel's ordered message queue
pub struct Mailbox {
    name: String,
    entries: VecDeque<(Message, Instant)>,
    is_priority: bool,
    handler: Rc<MailboxFn>,
}

impl Mailbox {
    pub fn new(name: impl Into<String>, is_priority: bool, handler: Rc<MailboxFn>) -> Self {
        Self {
            name: name.into(),
            entries: VecDeque::new(),
            is_priority,
            handler,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_priority(&self) -> bool {
        self.is_priority
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Enqueue a message, stamping it with the current instant
    pub fn push(&mut self, message: Message) {
        self.entries.push_back((message, Instant::now()));
    }

    /// Dequeue the oldest entry
    pub fn pop(&mut self) -> Option<(Message, Instant)> {
        self.entries.pop_front()
    }

    /// The handler registered for this mailbox
    pub fn handler(&self) -> Rc<MailboxFn> {
        self.handler.clone()
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("name", &self.name)
            .field("is_priority", &self.is_priority)
            .field("pending", &self.entries.len())
            .finish()
    }
}
