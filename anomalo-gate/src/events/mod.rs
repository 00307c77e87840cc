//! Event sink system for observability.
//!
//! Pipeline lifecycle events (`pipeline.started`, `stage.completed`, ...)
//! are emitted through an [`EventSink`]. A context discards them unless a
//! sink is attached; the binary attaches a [`LoggingEventSink`] that
//! forwards to `tracing`.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
