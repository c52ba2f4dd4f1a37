//! Span records.

use std::collections::BTreeMap;

/// A timestamped event attached to a span.
#[derive(Debug, Clone, PartialEq)]
pub struct SpanEvent {
    /// Event name.
    pub name: String,
    /// Clock position of the event, in milliseconds.
    pub timestamp_millis: u64,
    /// Event attributes.
    pub attributes: BTreeMap<String, String>,
}

/// One span of a trace.
#[derive(Debug, Clone)]
pub struct Span {
    /// 128-bit trace id shared by the whole trace.
    pub trace_id: u128,
    /// This span's 64-bit id.
    pub span_id: u64,
    /// Parent span id, absent for a trace root.
    pub parent_id: Option<u64>,
    /// Operation name.
    pub name: String,
    /// Clock position when the span started, in milliseconds.
    pub start_millis: u64,
    /// Clock position when the span ended; `None` while live.
    pub end_millis: Option<u64>,
    /// Span attributes, merged across start, `set_attributes`, and end.
    pub attributes: BTreeMap<String, String>,
    /// Events recorded during the span.
    pub events: Vec<SpanEvent>,
    /// Whether this span will be exported.
    pub sampled: bool,
    /// Opaque `tracestate` inherited from the parent context.
    pub tracestate: Option<String>,
}

impl Span {
    /// Wall duration of the span, once ended.
    pub fn duration_millis(&self) -> Option<u64> {
        self.end_millis
            .map(|end| end.saturating_sub(self.start_millis))
    }
}
