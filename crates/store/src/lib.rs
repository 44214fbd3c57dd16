//! Durable signal store on SQLite.
//!
//! A single database file holds five tables:
//! - `signals` — derived triggers, keyed by automation content hash
//! - `automation_logs` — one row per scheduling/execution/manual run
//! - `call_service_logs` — every hub write, keyed to its log row
//! - `images` — blobs referenced by log rows
//! - `logs` — application log tail for bug reports
//!
//! The store is the only mutator of persisted state; sqlite serializes the
//! writes. The one cross-table guarantee is that a one-shot signal dies in
//! the same transaction that inserts the log row for its firing.

mod store;

pub use store::{
    AutomationLogRow, CallServiceLogRow, LogType, NewAutomationLog, SignalStore,
};
