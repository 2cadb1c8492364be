//! Span display-name resolution.
//!
//! Span names are deployment policy: operators may want their own naming
//! scheme per message flow without touching the publishing pipeline. The
//! [`ActivityNameRegistry`] maps a [`FlowKind`] to a naming function and
//! falls back to the built-in pattern
//! `"{prefix}.Outbox.{topic}.{type}.{operation}"` for unregistered kinds.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Message-flow kinds a naming function can be registered for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowKind {
    /// Relaying a stored outbox entry to the broker.
    OutboxPublishing,
    /// Receiving a message from the broker.
    Consuming,
}

/// Operation label rendered into span display names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessagingOperation {
    Publish,
    Receive,
}

impl MessagingOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessagingOperation::Publish => "Publish",
            MessagingOperation::Receive => "Receive",
        }
    }
}

impl std::fmt::Display for MessagingOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pure naming function: `(prefix, topic, message_type, operation)` to a
/// display name.
pub type ActivityNameFn = Arc<dyn Fn(&str, &str, &str, &str) -> String + Send + Sync>;

/// Per-flow-kind table of naming overrides.
///
/// Written rarely (startup or test setup), read on every publish. Readers
/// clone the function `Arc` under the read lock and release it before
/// calling, so a registration or reset never swaps a function out from
/// under an in-flight resolution.
#[derive(Default)]
pub struct ActivityNameRegistry {
    overrides: RwLock<HashMap<FlowKind, ActivityNameFn>>,
}

impl ActivityNameRegistry {
    /// Register a naming function for a flow kind, replacing any existing
    /// one. Last write wins.
    pub fn register<F>(&self, flow: FlowKind, f: F)
    where
        F: Fn(&str, &str, &str, &str) -> String + Send + Sync + 'static,
    {
        let mut overrides = match self.overrides.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        overrides.insert(flow, Arc::new(f));
    }

    /// Resolve a display name for a flow kind.
    ///
    /// Flow kinds with no registration silently use the built-in default.
    pub fn resolve(
        &self,
        flow: FlowKind,
        prefix: &str,
        topic: &str,
        message_type: &str,
        operation: &str,
    ) -> String {
        let custom = {
            let overrides = match self.overrides.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            overrides.get(&flow).cloned()
        };

        match custom {
            Some(f) => f(prefix, topic, message_type, operation),
            None => default_activity_name(prefix, topic, message_type, operation),
        }
    }

    /// Remove all registrations, restoring default naming everywhere.
    pub fn reset(&self) {
        let mut overrides = match self.overrides.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        overrides.clear();
    }
}

/// Built-in naming pattern used when no override is registered.
pub fn default_activity_name(
    prefix: &str,
    topic: &str,
    message_type: &str,
    operation: &str,
) -> String {
    format!("{prefix}.Outbox.{topic}.{message_type}.{operation}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unregistered_flow_kinds_use_the_default_pattern() {
        let registry = ActivityNameRegistry::default();

        let name = registry.resolve(FlowKind::OutboxPublishing, "Courier", "foo", "bar", "Publish");

        assert_eq!(name, "Courier.Outbox.foo.bar.Publish");
    }

    #[test]
    fn registered_function_overrides_the_default() {
        let registry = ActivityNameRegistry::default();
        registry.register(FlowKind::OutboxPublishing, |prefix, topic, ty, op| {
            format!("{prefix}.Custom.{topic}.{ty}.{op}")
        });

        let name = registry.resolve(FlowKind::OutboxPublishing, "Courier", "foo", "bar", "Publish");

        assert_eq!(name, "Courier.Custom.foo.bar.Publish");
    }

    #[test]
    fn registration_scopes_to_its_flow_kind() {
        let registry = ActivityNameRegistry::default();
        registry.register(FlowKind::Consuming, |_, _, _, _| "consumer".to_owned());

        let name = registry.resolve(FlowKind::OutboxPublishing, "Courier", "foo", "bar", "Publish");

        assert_eq!(name, "Courier.Outbox.foo.bar.Publish");
    }

    #[test]
    fn last_registration_wins() {
        let registry = ActivityNameRegistry::default();
        registry.register(FlowKind::OutboxPublishing, |_, _, _, _| "first".to_owned());
        registry.register(FlowKind::OutboxPublishing, |_, _, _, _| "second".to_owned());

        let name = registry.resolve(FlowKind::OutboxPublishing, "Courier", "foo", "bar", "Publish");

        assert_eq!(name, "second");
    }

    #[test]
    fn reset_restores_defaults_and_is_idempotent() {
        let registry = ActivityNameRegistry::default();
        registry.register(FlowKind::OutboxPublishing, |_, _, _, _| "custom".to_owned());

        registry.reset();
        registry.reset();

        let name = registry.resolve(FlowKind::OutboxPublishing, "Courier", "foo", "bar", "Publish");
        assert_eq!(name, "Courier.Outbox.foo.bar.Publish");
    }

    #[test]
    fn operation_labels_render_into_names() {
        assert_eq!(MessagingOperation::Publish.to_string(), "Publish");
        assert_eq!(MessagingOperation::Receive.to_string(), "Receive");
    }
}
