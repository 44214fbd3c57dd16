//! Hub client trait — the abstraction over the home-automation platform.
//!
//! The runtime only ever sees this trait: snapshot reads of entity states and
//! service catalogs, one write operation, and a state-change event stream.
//! The REST/WebSocket transport lives in its own crate; tests and the eval
//! harness substitute canned fixtures.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::broadcast;

use crate::error::HubError;

/// A snapshot of one entity's state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
    #[serde(default)]
    pub attributes: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_changed: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl EntityState {
    /// The domain prefix of the entity id (`light.kitchen` → `light`).
    pub fn domain(&self) -> &str {
        entity_domain(&self.entity_id)
    }

    /// The `friendly_name` attribute, when present.
    pub fn friendly_name(&self) -> Option<&str> {
        self.attributes.get("friendly_name").and_then(|v| v.as_str())
    }
}

/// The domain prefix of an entity id.
pub fn entity_domain(entity_id: &str) -> &str {
    entity_id.split('.').next().unwrap_or(entity_id)
}

/// Metadata for one service within a domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub fields: serde_json::Value,
}

/// `domain → service → metadata`, as returned by the hub.
pub type ServiceCatalog = HashMap<String, HashMap<String, ServiceMeta>>;

/// Target of a service call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceTarget {
    #[serde(default)]
    pub entity_id: Vec<String>,
}

/// A request to invoke a hub service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub target: ServiceTarget,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// A `state_changed` event from the hub.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateChange {
    pub entity_id: String,
    pub new_state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_state: Option<String>,
    pub changed_at: DateTime<Utc>,
}

/// The hub contract the runtime consumes.
#[async_trait]
pub trait HubClient: Send + Sync {
    /// Snapshot of all entity states.
    async fn fetch_states(&self) -> Result<Vec<EntityState>, HubError>;

    /// Snapshot of the service catalog.
    async fn fetch_services(&self) -> Result<ServiceCatalog, HubError>;

    /// Invoke a service. Returns the hub's response body, when it sends one.
    async fn call_service(
        &self,
        call: &ServiceCall,
    ) -> Result<Option<serde_json::Value>, HubError>;

    /// Subscribe to the `state_changed` event stream.
    fn subscribe(&self) -> broadcast::Receiver<StateChange>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entity_domain_prefix() {
        assert_eq!(entity_domain("light.kitchen"), "light");
        assert_eq!(entity_domain("climate.bedroom_thermostat"), "climate");
        assert_eq!(entity_domain("no_dot"), "no_dot");
    }

    #[test]
    fn friendly_name_lookup() {
        let entity = EntityState {
            entity_id: "light.bookshelf".into(),
            state: "on".into(),
            attributes: json!({"friendly_name": "Bookshelf Light"}),
            last_changed: None,
            last_updated: None,
        };
        assert_eq!(entity.friendly_name(), Some("Bookshelf Light"));
        assert_eq!(entity.domain(), "light");
    }

    #[test]
    fn service_call_roundtrip() {
        let call = ServiceCall {
            domain: "light".into(),
            service: "turn_off".into(),
            target: ServiceTarget {
                entity_id: vec!["light.kitchen_dining_room_chandelier".into()],
            },
            data: Some(json!({"transition": 2})),
        };
        let json = serde_json::to_string(&call).unwrap();
        let back: ServiceCall = serde_json::from_str(&json).unwrap();
        assert_eq!(back, call);
    }
}
