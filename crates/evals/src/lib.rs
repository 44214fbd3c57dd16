//! The evaluation harness.
//!
//! Replays a catalog of canned prompts against the real tool-loop with a
//! mocked hub fixture, then applies graders to each final transcript. The
//! same registry/loop code paths run here as in production; only the hub and
//! (optionally) the model are substituted.

mod fixtures;
mod graders;
mod harness;
mod scenarios;

pub use fixtures::MockHub;
pub use graders::{GradeResult, Grader};
pub use harness::{EvalHarness, ScenarioResult};
pub use scenarios::{scenario_catalog, Scenario, ToolSuiteKind};
