//! The concrete tool suites.
//!
//! Two suites share the [`hearth_core::Tool`] trait: the scheduling suite the
//! scheduler model uses to persist triggers, and the execution suite the
//! executor model uses to drive the hub. Each suite is a set of tools
//! carrying scoped context (which automation, which log row).

mod call_service;
mod entities;
mod memory;
mod scheduling;
mod services;

pub use call_service::CallService;
pub use entities::{GetAllEntities, GetEntitiesByPrefix};
pub use memory::{ReadMemory, Scratchpad, WriteMemory};
pub use scheduling::{scheduling_suite, SchedulingContext};
pub use services::{GetServicesForDomain, ListServiceDomains};

use hearth_core::hub::{HubClient, ServiceCatalog};
use hearth_core::tool::Tool;
use hearth_store::SignalStore;
use std::sync::Arc;

/// Shared context for one execution run.
pub struct ExecutionContext {
    pub hub: Arc<dyn HubClient>,
    pub store: Arc<SignalStore>,
    /// The log row service calls are recorded against.
    pub automation_log_id: i64,
    /// In test mode `call-service` validates and never contacts the hub.
    pub test_mode: bool,
    pub scratchpad: Arc<Scratchpad>,
    /// Service catalog, fetched once per run.
    services: tokio::sync::OnceCell<ServiceCatalog>,
}

impl ExecutionContext {
    pub fn new(
        hub: Arc<dyn HubClient>,
        store: Arc<SignalStore>,
        automation_log_id: i64,
        test_mode: bool,
        scratchpad: Arc<Scratchpad>,
    ) -> Self {
        Self {
            hub,
            store,
            automation_log_id,
            test_mode,
            scratchpad,
            services: tokio::sync::OnceCell::new(),
        }
    }

    /// The service catalog, cached for the lifetime of this run.
    pub async fn services(&self) -> Result<&ServiceCatalog, hearth_core::HubError> {
        self.services
            .get_or_try_init(|| self.hub.fetch_services())
            .await
    }
}

/// Build the execution tool suite for one run.
pub fn execution_suite(ctx: Arc<ExecutionContext>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(GetAllEntities { ctx: ctx.clone() }),
        Arc::new(GetEntitiesByPrefix { ctx: ctx.clone() }),
        Arc::new(ListServiceDomains { ctx: ctx.clone() }),
        Arc::new(GetServicesForDomain { ctx: ctx.clone() }),
        Arc::new(CallService { ctx: ctx.clone() }),
        Arc::new(ReadMemory {
            scratchpad: ctx.scratchpad.clone(),
        }),
        Arc::new(WriteMemory {
            scratchpad: ctx.scratchpad.clone(),
        }),
    ]
}
