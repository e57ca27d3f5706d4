//! Hive Wire Codec
//!
//! Encoding and decoding rules for the ASCII s-expression payload grammar
//! used on every Hive topic:
//!
//! ```text
//! (command arg1 arg2 … (nested list …))
//! ```
//!
//! The producer side serializes outbound announcements with [`generate`];
//! the consumer side parses inbound payloads into a `(command, arguments)`
//! pair with [`parse`]. Arguments are [`Term`]s: bare symbols or nested
//! lists, so a registrar announcement like
//! `(add ns/host/1234 hive/test:0 mqtt alice (a=1 b=2))` round-trips
//! without loss.
//!
//! Tag lists (`key=value` symbols) get their own helpers in [`tags`].

pub mod error;
pub mod parser;
pub mod tags;

pub use error::{CodecError, CodecResult};
pub use parser::{generate, parse, Term};
pub use tags::{get_tag, match_tags, parse_tags};
