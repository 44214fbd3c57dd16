//! The automation runtime.
//!
//! Top-level coordinator: watches the notebook, schedules unscheduled
//! automations through the scheduling tool-loop, reacts to trigger-engine
//! events with the execution tool-loop, and writes everything to the store.

mod notebook;
mod runtime;

pub use notebook::{scan_notebook, Notebook, NotebookWatcher};
pub use runtime::{AutomationRuntime, RuntimeDeps, RuntimeEvent};
