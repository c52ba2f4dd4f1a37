//! Distributed-tracing surface for the edge-utils toolkit.
//!
//! Implements W3C Trace Context propagation (`traceparent` / `tracestate`
//! headers) and a minimal span lifecycle: start, end, events, attributes.
//! Only sampled spans reach the exporter; unsampled spans are discarded at
//! end time.
//!
//! ## Example
//!
//! ```rust
//! use edge_utils_trace::{Sampler, TraceContext, Tracer};
//! use http::HeaderMap;
//!
//! let tracer = Tracer::builder()
//!     .service_name("edge-gateway")
//!     .sampler(Sampler::Always)
//!     .build();
//!
//! let mut inbound = HeaderMap::new();
//! inbound.insert(
//!     "traceparent",
//!     "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01".parse().unwrap(),
//! );
//!
//! let parent = TraceContext::extract(&inbound);
//! let span = tracer.start_span("proxy_request", parent.as_ref(), &[]);
//!
//! let mut outbound = HeaderMap::new();
//! tracer.inject(span, &mut outbound);
//! assert!(outbound.contains_key("traceparent"));
//!
//! tracer.end_span(span, &[("http.status_code", "200")]);
//! ```

pub use context::TraceContext;
pub use sampler::Sampler;
pub use span::{Span, SpanEvent};
pub use tracer::{SpanExporter, Tracer, TracerBuilder};

mod context;
mod sampler;
mod span;
mod tracer;
