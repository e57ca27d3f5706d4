//! Runtime error types
//!
//! Error handling for mailbox dispatch, topic routing and transport
//! publication failures. Failures local to one message or one route
//! handler are recovered at the dispatch site; only errors escaping the
//! event loop itself are fatal to the process.

use thiserror::Error;

/// Main actor runtime error type
#[derive(Debug, Error)]
pub enum ActorError {
    /// Mailbox registration or lookup errors
    #[error("Mailbox error: {message}")]
    Mailbox { message: String },

    /// A command handler reported a failure during invocation
    #[error("Handler failure in '{command}': {source}")]
    Handler {
        command: String,
        #[source]
        source: anyhow::Error,
    },

    /// A topic route handler reported a failure
    #[error("Route handler failure on '{topic}': {source}")]
    Route {
        topic: String,
        #[source]
        source: anyhow::Error,
    },

    /// Payload could not be parsed
    #[error("Codec error: {0}")]
    Codec(#[from] codec::CodecError),

    /// Transport-level publish/subscribe failures
    #[error("Transport error: {message}")]
    Transport { message: String },

    /// Logging subsystem configuration failures
    #[error("Logging error: {message}")]
    Logging { message: String },
}

impl ActorError {
    /// Create a mailbox error
    pub fn mailbox(message: impl Into<String>) -> Self {
        Self::Mailbox {
            message: message.into(),
        }
    }

    /// Create a handler failure for a named command
    pub fn handler(command: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Handler {
            command: command.into(),
            source,
        }
    }

    /// Create a route handler failure for a topic
    pub fn route(topic: impl Into<String>, source: anyhow::Error) -> Self {
        Self::Route {
            topic: topic.into(),
            source,
        }
    }

    /// Create a transport error
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Create a logging error
    pub fn logging(message: impl Into<String>) -> Self {
        Self::Logging {
            message: message.into(),
        }
    }
}

/// Result type alias for runtime operations
pub type Result<T> = std::result::Result<T, ActorError>;
