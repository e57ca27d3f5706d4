//! Connection state machine
//!
//! A process's view of transport and registrar availability. Created
//! `Disconnected`, upgraded to `Transport` when the transport reports a
//! connection, and to `Registrar` once a `primary started` announcement
//! arrives. `Registrar -> Transport` is a valid downgrade on registrar
//! loss; nothing else moves the state.

use std::cell::Cell;
use std::fmt;
use tracing::info;

/// Transport/registrar availability
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport connection
    Disconnected,
    /// Transport connected, registrar not discovered
    Transport,
    /// Registrar discovered and announced to
    Registrar,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Transport => "TRANSPORT",
            ConnectionState::Registrar => "REGISTRAR",
        };
        f.write_str(name)
    }
}

/// Process-wide connection tracker, mutated only by the state machine
#[derive(Debug)]
pub struct Connection {
    state: Cell<ConnectionState>,
}

impl Connection {
    pub fn new() -> Self {
        Self {
            state: Cell::new(ConnectionState::Disconnected),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// True once the transport is reachable, with or without a registrar
    pub fn is_connected(&self) -> bool {
        self.state.get() != ConnectionState::Disconnected
    }

    pub fn update_state(&self, new_state: ConnectionState) {
        let old_state = self.state.replace(new_state);
        if old_state != new_state {
            info!(from = %old_state, to = %new_state, "Connection state changed");
        }
    }

    /// Transport connected: only upgrades from `Disconnected`
    pub fn on_transport_connected(&self) {
        if self.state.get() == ConnectionState::Disconnected {
            self.update_state(ConnectionState::Transport);
        }
    }

    /// Transport lost: drops straight to `Disconnected`
    pub fn on_transport_disconnected(&self) {
        self.update_state(ConnectionState::Disconnected);
    }
}

impl Default for Connection {
    fn default() -> Self {
        Self::new()
    }
}
