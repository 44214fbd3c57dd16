//! The mocked hub fixture.
//!
//! Canned states and services loaded from `mocks/*.json`; service calls are
//! recorded instead of executed so graders can assert on them.

use async_trait::async_trait;
use hearth_core::error::HubError;
use hearth_core::hub::{
    EntityState, HubClient, ServiceCall, ServiceCatalog, ServiceMeta, StateChange,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

const STATES_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../mocks/states.json"));
const SERVICES_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/../../mocks/services.json"));

#[derive(Deserialize)]
struct DomainServices {
    domain: String,
    services: HashMap<String, ServiceMeta>,
}

/// A hub whose world is the canned fixture. Writes are recorded, never
/// executed; the event stream can be driven by tests.
pub struct MockHub {
    states: Vec<EntityState>,
    services: ServiceCatalog,
    calls: Mutex<Vec<ServiceCall>>,
    events: broadcast::Sender<StateChange>,
}

impl MockHub {
    /// The standard fixture.
    pub fn standard() -> Self {
        let states: Vec<EntityState> =
            serde_json::from_str(STATES_JSON).expect("mocks/states.json is well-formed");
        let domains: Vec<DomainServices> =
            serde_json::from_str(SERVICES_JSON).expect("mocks/services.json is well-formed");
        let services = domains.into_iter().map(|d| (d.domain, d.services)).collect();
        let (events, _) = broadcast::channel(64);

        Self {
            states,
            services,
            calls: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Service calls recorded so far.
    pub fn recorded_calls(&self) -> Vec<ServiceCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Push a state change onto the event stream.
    pub fn emit(&self, change: StateChange) {
        let _ = self.events.send(change);
    }
}

impl Default for MockHub {
    fn default() -> Self {
        Self::standard()
    }
}

#[async_trait]
impl HubClient for MockHub {
    async fn fetch_states(&self) -> Result<Vec<EntityState>, HubError> {
        Ok(self.states.clone())
    }

    async fn fetch_services(&self) -> Result<ServiceCatalog, HubError> {
        Ok(self.services.clone())
    }

    async fn call_service(
        &self,
        call: &ServiceCall,
    ) -> Result<Option<serde_json::Value>, HubError> {
        self.calls.lock().unwrap().push(call.clone());
        Ok(None)
    }

    fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }
}
