//! Human-facing log lines.
//!
//! A handful of events are meant for the person running the receiver rather
//! than for developers: the discovered STUN address, relay home selection,
//! and incoming connection requests. They go through [`HumanLog`] so a
//! front-end can route them to a terminal.

/// Sink for log lines meant for the operator.
pub trait HumanLog: Send + Sync {
    /// Informational line.
    fn info(&self, line: &str);

    /// Something the operator should notice.
    fn warn(&self, line: &str);
}

/// Default sink: `tracing` events on the `overlay::human` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHumanLog;

impl HumanLog for TracingHumanLog {
    fn info(&self, line: &str) {
        tracing::info!(target: "overlay::human", "{line}");
    }

    fn warn(&self, line: &str) {
        tracing::warn!(target: "overlay::human", "{line}");
    }
}
