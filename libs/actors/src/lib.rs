//! Actor Runtime Over a Topic Transport
//!
//! Named actors with ordered mailboxes, driven by one cooperative event
//! loop per process. Remote peers reach an actor by publishing
//! s-expression payloads on its topic tree; discovery runs over the
//! registrar broadcast topic.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────┐     ┌────────────────────┐
//! │         Actor System         │     │     Transport      │
//! │                              │     │                    │
//! │ ┌────────┐  ┌─────────────┐  │ out │ ┌────────────────┐ │
//! │ │ Actor  │  │  Dispatcher │──┼─────┼─│ publish /      │ │
//! │ │ control│◄─│  (one loop, │  │     │ │ subscribe      │ │
//! │ │ in     │  │  one thread)│◄─┼─────┼─│ ingress channel│ │
//! │ └────────┘  └─────────────┘  │ in  │ └────────────────┘ │
//! │      ▲            │          │     └────────────────────┘
//! │      │       ┌────▼─────┐    │
//! │  mailboxes   │  Router  │    │       topics:
//! │  (FIFO,      │  + / #   │    │       {ns}/{host}/{pid}/in
//! │  priority)   │ wildcards│    │       {ns}/{host}/{pid}/state
//! │              └──────────┘    │       {ns}/service/registrar
//! └──────────────────────────────┘
//! ```
//!
//! # Ordering
//!
//! - Within one mailbox, messages deliver strictly first-in first-out.
//! - Priority mailboxes (actor `control` channels) fully drain before
//!   any standard mailbox is polled.
//! - Handlers run to completion on the loop thread; actor state is
//!   single-threaded by construction and needs no locks.
//!
//! # Example
//!
//! ```no_run
//! use actors::{ActorSystem, CommandTable, LoopbackTransport};
//! use config::RuntimeConfig;
//! use std::sync::Arc;
//!
//! # async fn demo() -> actors::Result<()> {
//! let mut system = ActorSystem::new(RuntimeConfig::default(), Arc::new(LoopbackTransport::new()));
//! system.set_protocol("hive/protocol/echo:0");
//!
//! let mut commands = CommandTable::new();
//! commands.register("echo", |arguments| {
//!     for argument in arguments {
//!         println!("{argument}");
//!     }
//!     Ok(())
//! });
//! system.register_actor("echo", commands);
//!
//! let status = system.run().await?;
//! std::process::exit(status)
//! # }
//! ```

pub mod actor;
pub mod connection;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod mailbox;
pub mod message;
pub mod registrar;
pub mod router;
pub mod share;
pub mod system;
pub mod transport;

pub use actor::{Actor, Lifecycle};
pub use connection::{Connection, ConnectionState};
pub use context::{channel, Context, Outbound};
pub use error::{ActorError, Result};
pub use logging::LogControl;
pub use mailbox::{Mailbox, MailboxFn};
pub use message::{
    expect_arity, symbol_arg, CommandError, CommandFn, CommandTable, Message,
};
pub use registrar::{RegistrarAction, RegistrarFn, RegistrarRecord};
pub use router::{topic_matches, RouteFn, TopicRouter};
pub use share::{EcProducer, ShareFn, ShareKey};
pub use system::ActorSystem;
pub use transport::{Ingress, LoopbackTransport, Transport, TransportInbox};
