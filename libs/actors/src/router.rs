//! Topic routing
//!
//! Maps inbound `(topic, payload)` pairs from the transport onto registered
//! handlers. Registered patterns are partitioned into exact topics (hash
//! lookup) and wildcard patterns (scanned segment-by-segment): `+` matches
//! exactly one segment in any position; a trailing `#` matches zero or more
//! trailing segments, so `ns/#` matches `ns/a/b/state` and bare `ns`.
//!
//! All handlers across all matched patterns are candidates, tried in
//! registration order. A handler returning `Ok(true)` consumes the message
//! and stops dispatch; a handler error is logged and dispatch continues to
//! the remaining handlers - fault isolation is per handler, not per
//! message. Registering the same `(handler, pattern)` pair twice runs the
//! handler twice per matching message; there is no dedup.

use crate::context::Context;
use crate::error::Result;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, error, warn};

/// Route handler signature: `(context, topic, payload) -> consumed`
pub type RouteFn = dyn Fn(&Context, &str, &str) -> Result<bool>;

/// True when a pattern contains a wildcard segment
pub fn is_wildcard(pattern: &str) -> bool {
    pattern.split('/').any(|segment| segment == "+" || segment == "#")
}

/// Segment-wise wildcard match of a concrete topic against a pattern
///
/// `#` is only recognized as the final pattern segment; `+` is recognized
/// in any position. Both match whole segments, never partial text.
pub fn topic_matches(pattern: &str, topic: &str) -> bool {
    if pattern == topic {
        return true;
    }
    let pattern_segments: Vec<&str> = pattern.split('/').collect();
    let topic_segments: Vec<&str> = topic.split('/').collect();

    if let Some((last, prefix)) = pattern_segments.split_last() {
        if *last == "#" {
            return topic_segments.len() >= prefix.len()
                && prefix
                    .iter()
                    .zip(topic_segments.iter())
                    .all(|(p, t)| *p == "+" || p == t);
        }
    }

    pattern_segments.len() == topic_segments.len()
        && pattern_segments
            .iter()
            .zip(topic_segments.iter())
            .all(|(p, t)| *p == "+" || p == t)
}

struct RouteEntry {
    seq: u64,
    handler: Rc<RouteFn>,
}

/// Process-wide topic-pattern to handler registry
#[derive(Default)]
pub struct TopicRouter {
    exact: HashMap<String, Vec<RouteEntry>>,
    wildcard: Vec<(String, Vec<RouteEntry>)>,
    next_seq: u64,
}

impl TopicRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a pattern
    ///
    /// A newly seen pattern triggers a transport subscription. Duplicate
    /// `(handler, pattern)` registrations are permitted and each runs.
    pub fn add(&mut self, ctx: &Context, handler: Rc<RouteFn>, pattern: impl Into<String>) {
        let pattern = pattern.into();
        let entry = RouteEntry {
            seq: self.next_seq,
            handler,
        };
        self.next_seq += 1;

        let newly_added = if is_wildcard(&pattern) {
            if let Some(segment) = pattern
                .split('/')
                .rev()
                .skip(1)
                .find(|segment| *segment == "#")
            {
                warn!(pattern = %pattern, segment, "'#' before the final segment never matches");
            }
            match self.wildcard.iter_mut().find(|(p, _)| *p == pattern) {
                Some((_, entries)) => {
                    entries.push(entry);
                    false
                }
                None => {
                    self.wildcard.push((pattern.clone(), vec![entry]));
                    true
                }
            }
        } else {
            let entries = self.exact.entry(pattern.clone()).or_default();
            entries.push(entry);
            entries.len() == 1
        };

        if newly_added {
            debug!(pattern = %pattern, "Subscribing to new topic pattern");
            ctx.subscribe(pattern);
        }
    }

    /// Remove one registration of `handler` for `pattern`
    ///
    /// Removing the last handler for a pattern unsubscribes from the
    /// transport and, for wildcard patterns, drops the pattern from the
    /// wildcard set.
    pub fn remove(&mut self, ctx: &Context, handler: &Rc<RouteFn>, pattern: &str) {
        let emptied = if is_wildcard(pattern) {
            match self.wildcard.iter_mut().position(|(p, _)| p == pattern) {
                Some(index) => {
                    let entries = &mut self.wildcard[index].1;
                    remove_one(entries, handler);
                    if entries.is_empty() {
                        self.wildcard.remove(index);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        } else if let Some(entries) = self.exact.get_mut(pattern) {
            remove_one(entries, handler);
            if entries.is_empty() {
                self.exact.remove(pattern);
                true
            } else {
                false
            }
        } else {
            false
        };

        if emptied {
            debug!(pattern = %pattern, "Unsubscribing from emptied topic pattern");
            ctx.unsubscribe(pattern);
        }
    }

    /// All registered patterns, for transport resubscription
    pub fn patterns(&self) -> Vec<String> {
        self.exact
            .keys()
            .cloned()
            .chain(self.wildcard.iter().map(|(p, _)| p.clone()))
            .collect()
    }

    /// Collect the handlers matching a concrete topic, registration order
    pub(crate) fn matched_handlers(&self, topic: &str) -> Vec<Rc<RouteFn>> {
        let mut matched: Vec<(u64, Rc<RouteFn>)> = Vec::new();
        if let Some(entries) = self.exact.get(topic) {
            matched.extend(entries.iter().map(|e| (e.seq, e.handler.clone())));
        }
        for (pattern, entries) in &self.wildcard {
            if topic_matches(pattern, topic) {
                matched.extend(entries.iter().map(|e| (e.seq, e.handler.clone())));
            }
        }
        matched.sort_by_key(|(seq, _)| *seq);
        matched.into_iter().map(|(_, handler)| handler).collect()
    }
}

fn remove_one(entries: &mut Vec<RouteEntry>, handler: &Rc<RouteFn>) {
    if let Some(index) = entries
        .iter()
        .position(|entry| Rc::ptr_eq(&entry.handler, handler))
    {
        entries.remove(index);
    }
}

/// Dispatch an inbound message to every matching handler
///
/// Returns true when some handler consumed the message. Handler errors
/// are logged with their full chain and never block the remaining
/// handlers for this topic.
pub fn dispatch(handlers: &[Rc<RouteFn>], ctx: &Context, topic: &str, payload: &str) -> bool {
    for handler in handlers {
        match handler(ctx, topic, payload) {
            Ok(true) => return true,
            Ok(false) => {}
            Err(e) => {
                error!(topic = %topic, error = ?e, "Route handler failed; continuing dispatch");
            }
        }
    }
    false
}
