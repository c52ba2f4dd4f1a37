use crate::context::{TraceContext, FLAG_SAMPLED};
use crate::sampler::Sampler;
use crate::span::{Span, SpanEvent};
use dashmap::DashMap;
use edge_utils_core::{Clock, MonotonicClock, RandomSource, ThreadRngSource};
use http::HeaderMap;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Receives every sampled span at end time.
///
/// Implemented for closures taking `&Span`, so a collector is one line:
///
/// ```rust
/// use edge_utils_trace::{Span, Tracer};
///
/// let tracer = Tracer::builder()
///     .exporter(|span: &Span| println!("{} took {:?}", span.name, span.duration_millis()))
///     .build();
/// ```
pub trait SpanExporter: Send + Sync {
    /// Called once per sampled span, after it ends.
    fn export(&self, span: &Span);
}

impl<F> SpanExporter for F
where
    F: Fn(&Span) + Send + Sync,
{
    fn export(&self, span: &Span) {
        self(span)
    }
}

/// Span factory and registry implementing W3C Trace Context.
///
/// Live spans are held in an internal table keyed by span id; `end_span`
/// removes the record and forwards it to the exporter when sampled.
/// Unsampled spans are discarded at end time.
pub struct Tracer {
    service_name: String,
    sampler: Sampler,
    active: DashMap<u64, Span>,
    exporter: Option<Arc<dyn SpanExporter>>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl Tracer {
    /// Returns a new builder with default settings.
    pub fn builder() -> TracerBuilder {
        TracerBuilder::new()
    }

    /// Starts a span, inheriting trace id, sampled decision, and tracestate
    /// from `parent` when given; otherwise opens a fresh trace and consults
    /// the sampler.
    ///
    /// Returns the new span's id, used for all later operations.
    pub fn start_span(
        &self,
        name: &str,
        parent: Option<&TraceContext>,
        attrs: &[(&str, &str)],
    ) -> u64 {
        let (trace_id, parent_id, sampled, tracestate) = match parent {
            Some(parent) => (
                parent.trace_id,
                Some(parent.span_id),
                parent.is_sampled(),
                parent.tracestate.clone(),
            ),
            None => (
                self.next_trace_id(),
                None,
                self.sampler.should_sample(self.random.as_ref()),
                None,
            ),
        };

        let span_id = self.next_span_id();
        let mut attributes: BTreeMap<String, String> = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        attributes.insert("service.name".to_string(), self.service_name.clone());

        self.active.insert(
            span_id,
            Span {
                trace_id,
                span_id,
                parent_id,
                name: name.to_string(),
                start_millis: self.clock.now_millis(),
                end_millis: None,
                attributes,
                events: Vec::new(),
                sampled,
                tracestate,
            },
        );
        span_id
    }

    /// Ends the span: stamps the end time, merges `attrs`, and hands the
    /// record to the exporter if sampled. Unknown ids are ignored.
    pub fn end_span(&self, span_id: u64, attrs: &[(&str, &str)]) {
        let Some((_, mut span)) = self.active.remove(&span_id) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(span_id, "end_span on an unknown span id");
            return;
        };
        span.end_millis = Some(self.clock.now_millis());
        for (k, v) in attrs {
            span.attributes.insert(k.to_string(), v.to_string());
        }

        if span.sampled {
            if let Some(exporter) = &self.exporter {
                exporter.export(&span);
            }
        }
    }

    /// Records an event on a live span. Unknown ids are ignored.
    pub fn add_event(&self, span_id: u64, name: &str, attrs: &[(&str, &str)]) {
        if let Some(mut span) = self.active.get_mut(&span_id) {
            let timestamp_millis = self.clock.now_millis();
            span.events.push(SpanEvent {
                name: name.to_string(),
                timestamp_millis,
                attributes: attrs
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            });
        }
    }

    /// Merges attributes into a live span. Unknown ids are ignored.
    pub fn set_attributes(&self, span_id: u64, attrs: &[(&str, &str)]) {
        if let Some(mut span) = self.active.get_mut(&span_id) {
            for (k, v) in attrs {
                span.attributes.insert(k.to_string(), v.to_string());
            }
        }
    }

    /// The trace context of a live span, as it would be propagated.
    pub fn context_of(&self, span_id: u64) -> Option<TraceContext> {
        self.active.get(&span_id).map(|span| TraceContext {
            version: 0,
            trace_id: span.trace_id,
            span_id: span.span_id,
            flags: if span.sampled { FLAG_SAMPLED } else { 0 },
            tracestate: span.tracestate.clone(),
        })
    }

    /// Parses inbound trace headers. Malformed input yields `None`.
    pub fn extract(&self, headers: &HeaderMap) -> Option<TraceContext> {
        TraceContext::extract(headers)
    }

    /// Writes the live span's context into outbound headers.
    pub fn inject(&self, span_id: u64, headers: &mut HeaderMap) {
        if let Some(context) = self.context_of(span_id) {
            context.inject(headers);
        }
    }

    /// Number of spans currently live.
    pub fn active_span_count(&self) -> usize {
        self.active.len()
    }

    fn next_trace_id(&self) -> u128 {
        loop {
            let id = (self.random.next_u64() as u128) << 64 | self.random.next_u64() as u128;
            if id != 0 {
                return id;
            }
        }
    }

    fn next_span_id(&self) -> u64 {
        loop {
            let id = self.random.next_u64();
            if id != 0 && !self.active.contains_key(&id) {
                return id;
            }
        }
    }
}

/// Builder for [`Tracer`].
pub struct TracerBuilder {
    service_name: String,
    sampler: Sampler,
    exporter: Option<Arc<dyn SpanExporter>>,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
}

impl TracerBuilder {
    /// Creates a new builder with default values.
    pub fn new() -> Self {
        Self {
            service_name: String::from("edge-utils"),
            sampler: Sampler::default(),
            exporter: None,
            clock: Arc::new(MonotonicClock::default()),
            random: Arc::new(ThreadRngSource),
        }
    }

    /// Sets the service name stamped on every span.
    ///
    /// Default: `edge-utils`
    pub fn service_name<N: Into<String>>(mut self, name: N) -> Self {
        self.service_name = name.into();
        self
    }

    /// Sets the sampling strategy for parentless traces.
    ///
    /// Default: 10% ratio sampling
    pub fn sampler(mut self, sampler: Sampler) -> Self {
        self.sampler = sampler;
        self
    }

    /// Sets the exporter receiving sampled spans.
    pub fn exporter<E>(mut self, exporter: E) -> Self
    where
        E: SpanExporter + 'static,
    {
        self.exporter = Some(Arc::new(exporter));
        self
    }

    /// Override the clock (useful for deterministic tests).
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override the random source (useful for deterministic tests).
    pub fn random(mut self, random: Arc<dyn RandomSource>) -> Self {
        self.random = random;
        self
    }

    /// Builds the tracer.
    pub fn build(self) -> Tracer {
        Tracer {
            service_name: self.service_name,
            sampler: self.sampler,
            active: DashMap::new(),
            exporter: self.exporter,
            clock: self.clock,
            random: self.random,
        }
    }
}

impl Default for TracerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
