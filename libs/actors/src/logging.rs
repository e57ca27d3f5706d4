//! Tracing setup
//!
//! Console logging with an `EnvFilter` behind a reload handle, so the
//! `log_level` share key can retarget verbosity while the service runs.
//! When `HIVE_LOG_TRANSPORT` is set an extra layer forwards formatted
//! events over a channel; the event loop publishes them on the service's
//! `/log` topic so remote operators can watch without shell access.

use crate::error::{ActorError, Result};
use config::RuntimeConfig;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::layer::{Context as LayerContext, Layer, SubscriberExt};
use tracing_subscriber::registry::Registry;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;

/// Handle for retargeting the active log filter
#[derive(Clone)]
pub struct LogControl {
    handle: reload::Handle<EnvFilter, Registry>,
}

impl LogControl {
    /// Swap the filter for a new directive string, e.g. `debug` or
    /// `info,actors=trace`
    pub fn set_level(&self, directives: &str) -> Result<()> {
        let filter = EnvFilter::try_new(directives)
            .map_err(|e| ActorError::logging(format!("Bad log directive {directives:?}: {e}")))?;
        self.handle
            .reload(filter)
            .map_err(|e| ActorError::logging(format!("Failed to reload log filter: {e}")))
    }
}

/// Install the global subscriber per the runtime configuration
///
/// Returns the reload handle and, when transport logging is enabled, the
/// receiving end of the formatted-line channel for the event loop to
/// drain. Fails if a global subscriber is already installed.
pub fn init(config: &RuntimeConfig) -> Result<(LogControl, Option<UnboundedReceiver<String>>)> {
    let filter = EnvFilter::try_new(config.log_directives())
        .map_err(|e| ActorError::logging(format!("Bad HIVE_LOG_LEVEL: {e}")))?;
    let (filter_layer, handle) = reload::Layer::new(filter);

    let (transport_layer, line_rx) = if config.log_transport {
        let (tx, rx) = mpsc::unbounded_channel();
        (Some(TransportLogLayer { tx }), Some(rx))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .with(transport_layer)
        .try_init()
        .map_err(|e| ActorError::logging(format!("Failed to install subscriber: {e}")))?;

    Ok((LogControl { handle }, line_rx))
}

/// Forwards formatted events over a channel for transport publication
struct TransportLogLayer {
    tx: UnboundedSender<String>,
}

impl<S: Subscriber> Layer<S> for TransportLogLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: LayerContext<'_, S>) {
        // The /log publication itself logs at trace level inside the
        // event loop; forwarding those would feed back forever.
        if *event.metadata().level() == Level::TRACE {
            return;
        }
        let mut visitor = MessageVisitor::default();
        event.record(&mut visitor);
        let line = format!(
            "{} {} {}",
            event.metadata().level(),
            event.metadata().target(),
            visitor.message.unwrap_or_default()
        );
        let _ = self.tx.send(line);
    }
}

#[derive(Default)]
struct MessageVisitor {
    message: Option<String>,
}

impl Visit for MessageVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The layer must outlive the handle: reload::Handle holds a weak
    // reference, so dropping the layer makes every reload fail.
    fn standalone_control() -> (LogControl, reload::Layer<EnvFilter, Registry>) {
        let (layer, handle) = reload::Layer::new(EnvFilter::new("info"));
        (LogControl { handle }, layer)
    }

    #[test]
    fn set_level_accepts_directive_strings() {
        let (control, _layer) = standalone_control();
        control.set_level("debug").unwrap();
        control.set_level("info,actors=trace").unwrap();
    }

    #[test]
    fn set_level_rejects_garbage() {
        let (control, _layer) = standalone_control();
        assert!(control.set_level("not==a==directive").is_err());
    }

    #[test]
    fn transport_layer_forwards_formatted_lines() {
        use tracing::subscriber::with_default;

        let (tx, mut rx) = mpsc::unbounded_channel();
        let subscriber = tracing_subscriber::registry().with(TransportLogLayer { tx });
        with_default(subscriber, || {
            tracing::info!("mailbox drained");
            tracing::trace!("suppressed feedback line");
        });

        let line = rx.try_recv().unwrap();
        assert!(line.starts_with("INFO "));
        assert!(line.ends_with("mailbox drained"));
        assert!(rx.try_recv().is_err());
    }
}
