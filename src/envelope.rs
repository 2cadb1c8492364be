//! Best-effort metadata probe over raw outbox payloads.
//!
//! Outbox payloads are recorded by the writing side as opaque JSON text.
//! The relay does not own their schema; it only needs a handful of
//! well-known top-level fields to enrich the publish span. [`Envelope`]
//! recovers those fields tolerantly: a malformed or foreign payload is a
//! normal input, never an error that could block publishing.

use std::collections::BTreeMap;

use serde_json::Value;

/// Well-known top-level payload field names.
pub mod keys {
    pub const MESSAGE_ID: &str = "messageId";
    pub const MESSAGE_TYPE: &str = "type";
    pub const TRACEPARENT: &str = "traceparent";
    pub const CAUSATION_ID: &str = "causationId";
    pub const CORRELATION_ID: &str = "correlationId";
    pub const DATA: &str = "data";
}

/// Flat string view of a payload's top-level fields.
///
/// Primitive JSON values keep their natural string form; structured
/// values (objects, arrays) are stored as their compact re-serialized
/// JSON text, so nested `data` stays opaque to the relay. `null` fields
/// are omitted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Envelope {
    fields: BTreeMap<String, String>,
}

impl Envelope {
    /// Probe a raw payload for metadata.
    ///
    /// Returns `Some` only when the payload is a JSON object. Invalid
    /// JSON, or JSON whose top level is not an object, yields `None`;
    /// callers proceed with an empty field set.
    pub fn try_parse(payload: &str) -> Option<Envelope> {
        match serde_json::from_str::<Value>(payload) {
            Ok(Value::Object(fields)) => Some(Envelope::from_object(&fields)),
            _ => None,
        }
    }

    /// Build an envelope from an already-parsed JSON object.
    ///
    /// Lets callers that need the object for other purposes (e.g. trace
    /// field injection) parse the payload once.
    pub fn from_object(object: &serde_json::Map<String, Value>) -> Envelope {
        let fields = object
            .iter()
            .filter_map(|(key, value)| stringify(value).map(|v| (key.clone(), v)))
            .collect();
        Envelope { fields }
    }

    /// Look up any top-level field by name.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// The `messageId` field, if present.
    pub fn message_id(&self) -> Option<&str> {
        self.get(keys::MESSAGE_ID)
    }

    /// The `type` field, if present.
    pub fn message_type(&self) -> Option<&str> {
        self.get(keys::MESSAGE_TYPE)
    }

    /// The `traceparent` field, if the writing side attached one.
    pub fn traceparent(&self) -> Option<&str> {
        self.get(keys::TRACEPARENT)
    }

    /// The `causationId` field, if present.
    pub fn causation_id(&self) -> Option<&str> {
        self.get(keys::CAUSATION_ID)
    }

    /// The `correlationId` field, if present.
    pub fn correlation_id(&self) -> Option<&str> {
        self.get(keys::CORRELATION_ID)
    }

    /// The `data` field as compact JSON text, if present.
    pub fn data(&self) -> Option<&str> {
        self.get(keys::DATA)
    }

    /// Whether no fields were recovered.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(_) | Value::Array(_) => Some(value.to_string()),
        Value::Null => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_known_fields_from_json_object() {
        let payload = r#"{"messageId":"1b13a5e1-742e-45fb-ab7a-76d547e4e327","type":"userdisabled","traceparent":"00-1f2c12212e50621b49c80175a064d193-35a6133087d5e877-01","causationId":"1b13a5e1-742e-45fb-ab7a-76d547e4e327","correlationId":"1b13a5e1-742e-45fb-ab7a-76d547e4e327","data":{"userId":"8cfb2d2d-9113-48c8-8c8d-41ade8d7998a"}}"#;

        let envelope = Envelope::try_parse(payload).unwrap();

        assert_eq!(
            envelope.message_id(),
            Some("1b13a5e1-742e-45fb-ab7a-76d547e4e327")
        );
        assert_eq!(envelope.message_type(), Some("userdisabled"));
        assert_eq!(
            envelope.traceparent(),
            Some("00-1f2c12212e50621b49c80175a064d193-35a6133087d5e877-01")
        );
        assert_eq!(
            envelope.causation_id(),
            Some("1b13a5e1-742e-45fb-ab7a-76d547e4e327")
        );
        assert_eq!(
            envelope.correlation_id(),
            Some("1b13a5e1-742e-45fb-ab7a-76d547e4e327")
        );
        assert_eq!(
            envelope.data(),
            Some(r#"{"userId":"8cfb2d2d-9113-48c8-8c8d-41ade8d7998a"}"#)
        );
    }

    #[test]
    fn nested_data_is_reserialized_compactly() {
        let payload = "{\n  \"data\": {\n    \"id\": \"dummyId\",\n    \"count\": 3\n  }\n}";

        let envelope = Envelope::try_parse(payload).unwrap();

        assert_eq!(envelope.data(), Some(r#"{"id":"dummyId","count":3}"#));
    }

    #[test]
    fn primitives_take_their_natural_string_form() {
        let payload = r#"{"type":"bar","retries":2,"sampled":true,"tags":["a","b"]}"#;

        let envelope = Envelope::try_parse(payload).unwrap();

        assert_eq!(envelope.message_type(), Some("bar"));
        assert_eq!(envelope.get("retries"), Some("2"));
        assert_eq!(envelope.get("sampled"), Some("true"));
        assert_eq!(envelope.get("tags"), Some(r#"["a","b"]"#));
    }

    #[test]
    fn missing_keys_are_absent_not_errors() {
        let envelope = Envelope::try_parse(r#"{"type":"bar"}"#).unwrap();

        assert_eq!(envelope.traceparent(), None);
        assert_eq!(envelope.message_id(), None);
        assert!(!envelope.is_empty());
    }

    #[test]
    fn null_fields_are_omitted() {
        let envelope = Envelope::try_parse(r#"{"type":"bar","causationId":null}"#).unwrap();

        assert_eq!(envelope.causation_id(), None);
    }

    #[test]
    fn invalid_json_yields_none() {
        assert_eq!(Envelope::try_parse("not json at all"), None);
        assert_eq!(Envelope::try_parse(r#"{"unterminated": "#), None);
    }

    #[test]
    fn non_object_top_level_yields_none() {
        assert_eq!(Envelope::try_parse("[1, 2, 3]"), None);
        assert_eq!(Envelope::try_parse(r#""just a string""#), None);
        assert_eq!(Envelope::try_parse("42"), None);
    }
}
