//! The trigger engine.
//!
//! Fans the persisted signal set out into a single event stream: cron ticks,
//! wall-clock timers, state-regex matches, and state-range residency all land
//! on one channel as `(automation, signal, fired_at)` events. The engine
//! holds only a read handle to the store and an output channel; the runtime
//! owns it and reacts to what it emits.

pub mod cron;
mod engine;

pub use cron::CronExpr;
pub use engine::{TriggerEngine, TriggerEvent};
