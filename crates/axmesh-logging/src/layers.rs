//! Tracing layers for axmesh hosts
//!
//! [`StationContextLayer`] pins the active station onto every new span so
//! downstream layers can tell engines apart. [`station_span`] opens a span
//! carrying the same fields, which the JSONL formatter then prints on
//! every line emitted inside it.

use tracing::{Span, Subscriber, span};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::config::JsonlConfig;
use crate::context::{StationContextData, StationContextGuard};

/// Layer that attaches the current station context to new spans
pub struct StationContextLayer;

impl StationContextLayer {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StationContextLayer {
    fn default() -> Self {
        Self::new()
    }
}

/// Extension data stored on spans
#[derive(Debug, Clone)]
pub struct StationContextExtension {
    pub data: StationContextData,
}

impl<S> Layer<S> for StationContextLayer
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup>,
{
    fn on_new_span(&self, _attrs: &span::Attributes<'_>, id: &span::Id, ctx: Context<'_, S>) {
        if let Some(span) = ctx.span(id) {
            if let Some(station) = StationContextGuard::current() {
                span.extensions_mut()
                    .insert(StationContextExtension { data: station });
            }
        }
    }
}

/// Open a span stamped with the current station context
///
/// Returns a disabled span when no [`StationContextGuard`] is active.
pub fn station_span() -> Span {
    match StationContextGuard::current() {
        Some(ctx) => tracing::info_span!(
            "station",
            station = %ctx.station,
            role = %ctx.role,
            instance_id = %ctx.instance_id,
        ),
        None => Span::none(),
    }
}

/// JSONL formatting layer writing to `writer`
pub fn jsonl_layer<S, W>(writer: W, config: &JsonlConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup> + 'static,
    W: for<'writer> MakeWriter<'writer> + Send + Sync + 'static,
{
    tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(config.include_spans)
        .flatten_event(config.flatten_events)
        .with_file(config.include_location)
        .with_line_number(config.include_location)
        .with_thread_ids(config.include_thread_info)
        .with_thread_names(config.include_thread_info)
        .with_writer(writer)
        .boxed()
}

/// Human-readable console layer
pub fn pretty_layer<S>(ansi: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'lookup> LookupSpan<'lookup> + 'static,
{
    tracing_subscriber::fmt::layer()
        .with_ansi(ansi)
        .with_target(true)
        .boxed()
}
