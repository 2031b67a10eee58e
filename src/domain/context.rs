//! Operation Context
//!
//! Contains metadata about the current operation for audit and tracing.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Actor id used for automation-initiated status changes.
pub const SYSTEM_ACTOR: &str = "system";

/// Context for an operation, used for auditing and tracing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationContext {
    /// Who is performing the operation (user id or `system`).
    pub actor_id: String,

    /// Caller-supplied token for exactly-once creation across retries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    /// Correlation ID for request tracing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl OperationContext {
    /// Create a context for the given actor.
    pub fn new(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            idempotency_key: None,
            correlation_id: None,
        }
    }

    /// Create a context for automation-initiated operations.
    pub fn system() -> Self {
        Self::new(SYSTEM_ACTOR)
    }

    /// Attach an idempotency key. Empty keys are treated as absent.
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        if !key.is_empty() {
            self.idempotency_key = Some(key);
        }
        self
    }

    /// Attach a correlation ID (the request id at the HTTP boundary).
    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_builder() {
        let correlation_id = Uuid::new_v4();
        let context = OperationContext::new("user-7")
            .with_idempotency_key("req-1")
            .with_correlation_id(correlation_id);

        assert_eq!(context.actor_id, "user-7");
        assert_eq!(context.idempotency_key.as_deref(), Some("req-1"));
        assert_eq!(context.correlation_id, Some(correlation_id));
    }

    #[test]
    fn test_empty_idempotency_key_is_absent() {
        let context = OperationContext::new("user-7").with_idempotency_key("");
        assert!(context.idempotency_key.is_none());
    }

    #[test]
    fn test_system_context() {
        assert_eq!(OperationContext::system().actor_id, SYSTEM_ACTOR);
    }
}
