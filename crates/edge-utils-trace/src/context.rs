//! W3C Trace Context header parsing and rendering.

use http::header::{HeaderMap, HeaderName, HeaderValue};

/// `traceparent` request/response header.
pub const TRACEPARENT: HeaderName = HeaderName::from_static("traceparent");
/// `tracestate` request/response header, carried opaquely.
pub const TRACESTATE: HeaderName = HeaderName::from_static("tracestate");

/// Sampled flag bit within the `traceparent` flags byte.
pub const FLAG_SAMPLED: u8 = 0x01;

/// A parsed W3C trace context.
///
/// `trace_id` and `span_id` are non-zero by construction; the all-zero ids
/// are invalid per the header grammar and rejected at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    /// Header version byte (`00` today).
    pub version: u8,
    /// 128-bit trace id shared by every span of the trace.
    pub trace_id: u128,
    /// 64-bit id of the parent span.
    pub span_id: u64,
    /// Flags byte; bit 0 is the sampled decision.
    pub flags: u8,
    /// Opaque `tracestate` header value, if one accompanied the parent.
    pub tracestate: Option<String>,
}

impl TraceContext {
    /// Parses the `traceparent` (and `tracestate`) headers.
    ///
    /// Returns `None` on any malformed input: wrong field count or width,
    /// non-hex characters, the invalid `ff` version, or all-zero ids.
    pub fn extract(headers: &HeaderMap) -> Option<Self> {
        let raw = headers.get(TRACEPARENT)?.to_str().ok()?;
        let mut context = Self::parse(raw)?;
        context.tracestate = headers
            .get(TRACESTATE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Some(context)
    }

    /// Parses a raw `traceparent` value.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;

        // Version 00 defines exactly four fields; future versions may append.
        let version = parse_hex_u8(version)?;
        if version == 0xff || (version == 0 && parts.next().is_some()) {
            return None;
        }

        if trace_id.len() != 32 || span_id.len() != 16 || flags.len() != 2 {
            return None;
        }

        let trace_id = u128::from_str_radix(trace_id, 16).ok()?;
        let span_id = u64::from_str_radix(span_id, 16).ok()?;
        let flags = parse_hex_u8(flags)?;

        if trace_id == 0 || span_id == 0 {
            return None;
        }

        Some(Self {
            version,
            trace_id,
            span_id,
            flags,
            tracestate: None,
        })
    }

    /// Renders the `traceparent` value for this context.
    pub fn to_traceparent(&self) -> String {
        format!(
            "{:02x}-{:032x}-{:016x}-{:02x}",
            self.version, self.trace_id, self.span_id, self.flags
        )
    }

    /// Writes `traceparent` (and `tracestate`, when present) into `headers`.
    pub fn inject(&self, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.to_traceparent()) {
            headers.insert(TRACEPARENT, value);
        }
        if let Some(state) = &self.tracestate {
            if let Ok(value) = HeaderValue::from_str(state) {
                headers.insert(TRACESTATE, value);
            }
        }
    }

    /// Whether the sampled bit is set.
    pub fn is_sampled(&self) -> bool {
        self.flags & FLAG_SAMPLED != 0
    }
}

fn parse_hex_u8(s: &str) -> Option<u8> {
    if s.len() != 2 {
        return None;
    }
    u8::from_str_radix(s, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    const WELL_FORMED: &str = "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01";

    #[test]
    fn parses_a_well_formed_traceparent() {
        let context = TraceContext::parse(WELL_FORMED).unwrap();
        assert_eq!(context.version, 0);
        assert_eq!(context.trace_id, 0x0af7651916cd43dd8448eb211c80319c);
        assert_eq!(context.span_id, 0xb7ad6b7169203331);
        assert_eq!(context.flags, 1);
        assert!(context.is_sampled());
    }

    #[test]
    fn malformed_input_returns_none() {
        for raw in [
            "",
            "00",
            "00-abc-def-01",
            // Wrong trace-id width
            "00-0af7651916cd43dd8448eb211c8031-b7ad6b7169203331-01",
            // Non-hex characters
            "00-zzf7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
            // All-zero ids are invalid
            "00-00000000000000000000000000000000-b7ad6b7169203331-01",
            "00-0af7651916cd43dd8448eb211c80319c-0000000000000000-01",
            // The ff version is reserved-invalid
            "ff-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01",
            // Version 00 forbids trailing fields
            "00-0af7651916cd43dd8448eb211c80319c-b7ad6b7169203331-01-extra",
        ] {
            assert!(TraceContext::parse(raw).is_none(), "accepted: {raw}");
        }
    }

    #[test]
    fn inject_extract_roundtrip_preserves_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(TRACEPARENT, WELL_FORMED.parse().unwrap());
        headers.insert(TRACESTATE, "vendor=opaque,other=x".parse().unwrap());

        let context = TraceContext::extract(&headers).unwrap();
        let mut rewritten = HeaderMap::new();
        context.inject(&mut rewritten);

        assert_eq!(rewritten.get(TRACEPARENT).unwrap(), WELL_FORMED);
        assert_eq!(
            rewritten.get(TRACESTATE).unwrap(),
            "vendor=opaque,other=x"
        );
    }

    #[test]
    fn extract_without_traceparent_is_none() {
        assert!(TraceContext::extract(&HeaderMap::new()).is_none());
    }
}
