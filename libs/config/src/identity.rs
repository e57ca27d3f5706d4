//! Service identity
//!
//! Stable naming for every service in a process. A service's topic path is
//! `{namespace}/{host}/{pid}`; additional services in the same process get
//! `{namespace}/{host}/{pid}.{service_id}` so their channels never collide.
//! Channel topics hang off the topic path (`…/control`, `…/state`, `…/in`,
//! `…/out`, `…/log`) and mailbox names are `{name}/{service_id}/{channel}`.

use nix::unistd::{gethostname, getuid, User};
use once_cell::sync::Lazy;

static HOSTNAME: Lazy<String> = Lazy::new(|| {
    gethostname()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
});

static USERNAME: Lazy<String> = Lazy::new(|| {
    User::from_uid(getuid())
        .ok()
        .flatten()
        .map(|user| user.name)
        .unwrap_or_else(|| "unknown".to_string())
});

/// Hostname of this process, cached on first use
pub fn hostname() -> &'static str {
    &HOSTNAME
}

/// Process id as a string segment
pub fn pid() -> String {
    std::process::id().to_string()
}

/// Login name of the process owner, cached on first use
pub fn username() -> &'static str {
    &USERNAME
}

/// Identity of one service: name, per-process ordinal and topic path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceIdentity {
    name: String,
    service_id: u32,
    topic_path: String,
}

impl ServiceIdentity {
    /// Derive an identity from the process environment
    ///
    /// The first service in a process (`service_id == 1`) owns the bare
    /// `{namespace}/{host}/{pid}` path; later services append their id.
    pub fn new(namespace: &str, name: impl Into<String>, service_id: u32) -> Self {
        let base = format!("{}/{}/{}", namespace, hostname(), pid());
        let topic_path = if service_id <= 1 {
            base
        } else {
            format!("{}.{}", base, service_id)
        };
        Self {
            name: name.into(),
            service_id,
            topic_path,
        }
    }

    /// Build an identity with an explicit topic path
    ///
    /// Used by tests and by tools that address a service whose path is
    /// already known.
    pub fn with_topic_path(
        name: impl Into<String>,
        service_id: u32,
        topic_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            service_id,
            topic_path: topic_path.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service_id(&self) -> u32 {
        self.service_id
    }

    pub fn topic_path(&self) -> &str {
        &self.topic_path
    }

    /// Channel topic: `{topic_path}/{channel}`
    pub fn topic(&self, channel: &str) -> String {
        format!("{}/{}", self.topic_path, channel)
    }

    /// Mailbox name: `{name}/{service_id}/{channel}`
    pub fn mailbox_name(&self, channel: &str) -> String {
        format!("{}/{}/{}", self.name, self.service_id, channel)
    }
}
