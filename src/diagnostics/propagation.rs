//! Trace-context propagation across the payload boundary.
//!
//! The relay carries trace context inside the wire payload itself: the
//! outgoing JSON object gains `traceparent` (and `baggage`) fields that
//! downstream consumers extract to continue the trace. The carriers here
//! adapt a `serde_json` object to the OpenTelemetry
//! [`Injector`]/[`Extractor`] interfaces; the default propagator composes
//! W3C trace-context propagation with baggage propagation, in that order.

use opentelemetry::propagation::{Extractor, Injector, TextMapCompositePropagator};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use serde_json::Value;

/// The default composition: trace-context fields first, then baggage.
pub fn default_propagator() -> TextMapCompositePropagator {
    TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ])
}

/// Injector writing propagation fields into a JSON object.
///
/// Overwrites prior values for the fields it sets and leaves every other
/// member of the object untouched.
pub struct JsonFieldCarrier<'a>(pub &'a mut serde_json::Map<String, Value>);

impl Injector for JsonFieldCarrier<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_owned(), Value::String(value));
    }
}

/// Extractor reading propagation fields from a JSON object.
///
/// Only string-valued members are visible; propagation headers are
/// strings by definition, so anything else is simply not a header.
pub struct JsonFieldExtractor<'a>(pub &'a serde_json::Map<String, Value>);

impl Extractor for JsonFieldExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use opentelemetry::propagation::TextMapPropagator;
    use opentelemetry::trace::TraceContextExt;
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> serde_json::Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("test fixture must be an object"),
        }
    }

    #[test]
    fn carrier_sets_and_overwrites_fields() {
        let mut fields = object(json!({"traceparent": "old", "type": "bar"}));
        let mut carrier = JsonFieldCarrier(&mut fields);

        carrier.set("traceparent", "new".to_owned());
        carrier.set("baggage", "team=alpha".to_owned());

        assert_eq!(fields["traceparent"], "new");
        assert_eq!(fields["baggage"], "team=alpha");
        assert_eq!(fields["type"], "bar");
    }

    #[test]
    fn extractor_reads_only_string_fields() {
        let fields = object(json!({"traceparent": "00-aa-bb-01", "data": {"id": 1}}));
        let extractor = JsonFieldExtractor(&fields);

        assert_eq!(extractor.get("traceparent"), Some("00-aa-bb-01"));
        assert_eq!(extractor.get("data"), None);
        assert_eq!(extractor.get("missing"), None);
        assert_eq!(extractor.keys().len(), 2);
    }

    #[test]
    fn extract_then_inject_round_trips_trace_and_baggage() {
        let propagator = default_propagator();
        let inbound = object(json!({
            "traceparent": "00-1f2c12212e50621b49c80175a064d193-35a6133087d5e877-01",
            "baggage": "team=alpha",
        }));

        let cx = propagator.extract(&JsonFieldExtractor(&inbound));
        assert!(cx.span().span_context().is_valid());
        assert_eq!(
            cx.span().span_context().trace_id().to_string(),
            "1f2c12212e50621b49c80175a064d193"
        );

        let mut outbound = object(json!({}));
        propagator.inject_context(&cx, &mut JsonFieldCarrier(&mut outbound));

        assert_eq!(
            outbound["traceparent"],
            "00-1f2c12212e50621b49c80175a064d193-35a6133087d5e877-01"
        );
        assert_eq!(outbound["baggage"], "team=alpha");
    }

    #[test]
    fn absent_trace_header_extracts_an_invalid_span_context() {
        let propagator = default_propagator();
        let fields = object(json!({"type": "bar"}));

        let cx = propagator.extract(&JsonFieldExtractor(&fields));

        assert!(!cx.span().span_context().is_valid());
    }

    #[test]
    fn malformed_trace_header_extracts_an_invalid_span_context() {
        let propagator = default_propagator();
        let fields = object(json!({"traceparent": "definitely-not-w3c"}));

        let cx = propagator.extract(&JsonFieldExtractor(&fields));

        assert!(!cx.span().span_context().is_valid());
    }
}
