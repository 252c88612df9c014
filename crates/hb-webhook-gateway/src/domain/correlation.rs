//! Correlation ID attached to every inbound request.
//!
//! Uses UUID v7 so ids sort by arrival time in the logs.

use std::fmt;
use uuid::Uuid;

/// Header carrying the correlation id in both directions
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation ID for tracking one callback through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId(Uuid);

impl CorrelationId {
    /// Generate a new correlation ID (UUID v7)
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Reuse an upstream id when it is a valid UUID, otherwise mint one.
    pub fn from_header(value: Option<&str>) -> Self {
        value
            .and_then(|v| Uuid::parse_str(v.trim()).ok())
            .map(Self)
            .unwrap_or_default()
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_correlation_id() {
        let id1 = CorrelationId::new();
        let id2 = CorrelationId::new();
        assert_ne!(id1, id2);
        assert_eq!(id1.as_uuid().get_version_num(), 7);
    }

    #[test]
    fn test_from_header_reuses_valid_uuid() {
        let upstream = "0192f1c8-7a4e-7cc0-9d2a-5b1f3e8a6c11";
        let id = CorrelationId::from_header(Some(upstream));
        assert_eq!(id.to_string(), upstream);
    }

    #[test]
    fn test_from_header_replaces_garbage() {
        let id = CorrelationId::from_header(Some("not-a-uuid"));
        assert_eq!(id.to_string().len(), 36); // UUID format: 8-4-4-4-12
        assert_ne!(id.to_string(), "not-a-uuid");

        let missing = CorrelationId::from_header(None);
        assert_eq!(missing.as_uuid().get_version_num(), 7);
    }
}
