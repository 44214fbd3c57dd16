//! The scheduling tool suite.
//!
//! These are the only tools the scheduler model sees: list and cancel the
//! current automation's triggers, and create one of the five trigger kinds.
//! Create tools validate their input and answer `{error, detail}` without
//! inserting when it is bad — the model is expected to correct itself on the
//! next turn.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hearth_core::clock::Clock;
use hearth_core::error::ToolError;
use hearth_core::signal::SignalData;
use hearth_core::tool::Tool;
use hearth_engine::CronExpr;
use hearth_store::SignalStore;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::info;

/// Context shared by the scheduling suite: which automation is being
/// scheduled, and what the hub knows about.
pub struct SchedulingContext {
    pub store: Arc<SignalStore>,
    pub automation_hash: String,
    /// Entity ids known to the hub at job start; unknown ids in a state
    /// trigger produce a warning, not a rejection.
    pub known_entities: Vec<String>,
    pub clock: Arc<dyn Clock>,
}

/// Build the scheduling tool suite for one automation.
pub fn scheduling_suite(ctx: Arc<SchedulingContext>) -> Vec<Arc<dyn Tool>> {
    vec![
        Arc::new(ListScheduledTriggers { ctx: ctx.clone() }),
        Arc::new(CancelAllScheduledTriggers { ctx: ctx.clone() }),
        Arc::new(CreateCronTrigger { ctx: ctx.clone() }),
        Arc::new(CreateStateRegexTrigger { ctx: ctx.clone() }),
        Arc::new(CreateStateRangeTrigger { ctx: ctx.clone() }),
        Arc::new(CreateRelativeTimeTrigger { ctx: ctx.clone() }),
        Arc::new(CreateAbsoluteTimeTrigger { ctx }),
    ]
}

fn validation_error(detail: impl Into<String>) -> Value {
    json!({"error": "validation failed", "detail": detail.into()})
}

async fn insert(ctx: &SchedulingContext, data: SignalData) -> Result<Value, ToolError> {
    let id = ctx
        .store
        .insert_signal(&ctx.automation_hash, &data)
        .await
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: "create-trigger".into(),
            reason: e.to_string(),
        })?;
    info!(signal_id = id, automation = %ctx.automation_hash, kind = data.kind(), "trigger created");
    Ok(json!({"created": id, "trigger": data.describe()}))
}

pub struct ListScheduledTriggers {
    pub ctx: Arc<SchedulingContext>,
}

#[async_trait]
impl Tool for ListScheduledTriggers {
    fn name(&self) -> &str {
        "list-scheduled-triggers"
    }
    fn description(&self) -> &str {
        "List every trigger currently registered for this automation."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        let alive = self
            .ctx
            .store
            .alive_signals_for_hash(&self.ctx.automation_hash)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        if alive.is_empty() {
            return Ok(json!("no triggers registered"));
        }
        let lines: Vec<String> = alive
            .iter()
            .map(|s| format!("#{}: {}", s.id, s.data.describe()))
            .collect();
        Ok(json!(lines.join("\n")))
    }
}

pub struct CancelAllScheduledTriggers {
    pub ctx: Arc<SchedulingContext>,
}

#[async_trait]
impl Tool for CancelAllScheduledTriggers {
    fn name(&self) -> &str {
        "cancel-all-scheduled-triggers"
    }
    fn description(&self) -> &str {
        "Cancel every trigger registered for this automation."
    }
    fn input_schema(&self) -> Value {
        json!({"type": "object", "properties": {}})
    }
    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        let killed = self
            .ctx
            .store
            .kill_all_for_hash(&self.ctx.automation_hash)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;
        Ok(json!({"cancelled": killed}))
    }
}

pub struct CreateCronTrigger {
    pub ctx: Arc<SchedulingContext>,
}

#[async_trait]
impl Tool for CreateCronTrigger {
    fn name(&self) -> &str {
        "create-cron-trigger"
    }
    fn description(&self) -> &str {
        "Register a recurring trigger from a standard 5-field cron expression \
         (minute hour day-of-month month day-of-week), evaluated in the \
         engine's configured timezone."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "expr": {"type": "string", "description": "5-field cron expression, e.g. \"0 7 * * *\""}
            },
            "required": ["expr"]
        })
    }
    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let Some(expr) = input["expr"].as_str() else {
            return Ok(validation_error("expr is required"));
        };
        if let Err(e) = CronExpr::parse(expr) {
            return Ok(validation_error(e.to_string()));
        }
        insert(&self.ctx, SignalData::Cron { expr: expr.into() }).await
    }
}

pub struct CreateStateRegexTrigger {
    pub ctx: Arc<SchedulingContext>,
}

#[async_trait]
impl Tool for CreateStateRegexTrigger {
    fn name(&self) -> &str {
        "create-state-regex-trigger"
    }
    fn description(&self) -> &str {
        "Register a trigger that fires whenever one of the listed entities \
         changes to a state matching the regex (unanchored match)."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_ids": {"type": "array", "items": {"type": "string"}},
                "regex": {"type": "string"}
            },
            "required": ["entity_ids", "regex"]
        })
    }
    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let entity_ids: Vec<String> = input["entity_ids"]
            .as_array()
            .map(|a| {
                a.iter()
                    .filter_map(|v| v.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default();
        if entity_ids.is_empty() {
            return Ok(validation_error("entity_ids must be a non-empty list"));
        }
        let Some(regex) = input["regex"].as_str() else {
            return Ok(validation_error("regex is required"));
        };
        if let Err(e) = regex::Regex::new(regex) {
            return Ok(validation_error(format!("bad regex: {e}")));
        }

        let unknown: Vec<&String> = entity_ids
            .iter()
            .filter(|id| !self.ctx.known_entities.contains(id))
            .collect();

        let mut result = insert(
            &self.ctx,
            SignalData::State {
                entity_ids: entity_ids.clone(),
                regex: regex.into(),
            },
        )
        .await?;

        // soft warning: the trigger is registered, but the model may want to
        // double-check these ids against the entity list
        if !unknown.is_empty() {
            result["warning"] = json!(format!(
                "unknown entity ids: {}",
                unknown
                    .iter()
                    .map(|s| s.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ));
        }
        Ok(result)
    }
}

pub struct CreateStateRangeTrigger {
    pub ctx: Arc<SchedulingContext>,
}

#[async_trait]
impl Tool for CreateStateRangeTrigger {
    fn name(&self) -> &str {
        "create-state-range-trigger"
    }
    fn description(&self) -> &str {
        "Register a trigger that fires once the entity's numeric state has \
         stayed within [min, max] continuously for the given number of \
         seconds. At least one bound is required."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "entity_id": {"type": "string"},
                "min": {"type": "number"},
                "max": {"type": "number"},
                "for_seconds": {"type": "integer", "minimum": 0}
            },
            "required": ["entity_id", "for_seconds"]
        })
    }
    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let Some(entity_id) = input["entity_id"].as_str() else {
            return Ok(validation_error("entity_id is required"));
        };
        let min = input["min"].as_f64();
        let max = input["max"].as_f64();
        if min.is_none() && max.is_none() {
            return Ok(validation_error("at least one of min/max is required"));
        }
        if let (Some(lo), Some(hi)) = (min, max) {
            if lo > hi {
                return Ok(validation_error(format!("min {lo} exceeds max {hi}")));
            }
        }
        let Some(for_seconds) = input["for_seconds"].as_i64() else {
            return Ok(validation_error("for_seconds is required"));
        };
        if for_seconds < 0 {
            return Ok(validation_error("for_seconds must not be negative"));
        }

        insert(
            &self.ctx,
            SignalData::StateRange {
                entity_id: entity_id.into(),
                min,
                max,
                for_seconds,
            },
        )
        .await
    }
}

pub struct CreateRelativeTimeTrigger {
    pub ctx: Arc<SchedulingContext>,
}

#[async_trait]
impl Tool for CreateRelativeTimeTrigger {
    fn name(&self) -> &str {
        "create-relative-time-trigger"
    }
    fn description(&self) -> &str {
        "Register a trigger that fires offset_seconds from now, and then \
         every offset_seconds again when repeat_forever is true."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "offset_seconds": {"type": "integer", "minimum": 1},
                "repeat_forever": {"type": "boolean"}
            },
            "required": ["offset_seconds"]
        })
    }
    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let Some(offset_seconds) = input["offset_seconds"].as_i64() else {
            return Ok(validation_error("offset_seconds is required"));
        };
        if offset_seconds <= 0 {
            return Ok(validation_error("offset_seconds must be positive"));
        }
        let repeat_forever = input["repeat_forever"].as_bool().unwrap_or(false);

        insert(
            &self.ctx,
            SignalData::Offset {
                offset_seconds,
                repeat_forever,
                anchor: self.ctx.clock.now(),
            },
        )
        .await
    }
}

pub struct CreateAbsoluteTimeTrigger {
    pub ctx: Arc<SchedulingContext>,
}

#[async_trait]
impl Tool for CreateAbsoluteTimeTrigger {
    fn name(&self) -> &str {
        "create-absolute-time-trigger"
    }
    fn description(&self) -> &str {
        "Register a one-shot trigger at an absolute ISO-8601 instant. \
         Instants in the past are rejected."
    }
    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "iso8601": {"type": "string", "description": "e.g. \"2026-08-02T07:00:00-07:00\""}
            },
            "required": ["iso8601"]
        })
    }
    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let Some(raw) = input["iso8601"].as_str() else {
            return Ok(validation_error("iso8601 is required"));
        };
        let at = match DateTime::parse_from_rfc3339(raw) {
            Ok(at) => at.with_timezone(&Utc),
            Err(e) => return Ok(validation_error(format!("unparseable instant: {e}"))),
        };
        if at <= self.ctx.clock.now() {
            return Ok(validation_error(format!("{raw} is in the past")));
        }

        insert(&self.ctx, SignalData::Time { at }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use hearth_core::clock::ManualClock;

    async fn ctx() -> (Arc<SchedulingContext>, ManualClock) {
        let store = Arc::new(SignalStore::in_memory().await.unwrap());
        let clock = ManualClock::new(Utc::now());
        let ctx = Arc::new(SchedulingContext {
            store,
            automation_hash: "hash_a".into(),
            known_entities: vec![
                "binary_sensor.front_door".into(),
                "light.porch".into(),
            ],
            clock: Arc::new(clock.clone()),
        });
        (ctx, clock)
    }

    #[tokio::test]
    async fn suite_has_all_seven_tools() {
        let (ctx, _) = ctx().await;
        let suite = scheduling_suite(ctx);
        let names: Vec<&str> = suite.iter().map(|t| t.name()).collect();
        assert_eq!(
            names,
            vec![
                "list-scheduled-triggers",
                "cancel-all-scheduled-triggers",
                "create-cron-trigger",
                "create-state-regex-trigger",
                "create-state-range-trigger",
                "create-relative-time-trigger",
                "create-absolute-time-trigger",
            ]
        );
    }

    #[tokio::test]
    async fn cron_create_validates_expression() {
        let (ctx, _) = ctx().await;
        let tool = CreateCronTrigger { ctx: ctx.clone() };

        let bad = tool.execute(json!({"expr": "not a cron"})).await.unwrap();
        assert_eq!(bad["error"], "validation failed");
        assert!(ctx
            .store
            .alive_signals_for_hash("hash_a")
            .await
            .unwrap()
            .is_empty());

        let good = tool.execute(json!({"expr": "0 7 * * *"})).await.unwrap();
        assert!(good["created"].as_i64().is_some());
        let alive = ctx.store.alive_signals_for_hash("hash_a").await.unwrap();
        assert_eq!(alive.len(), 1);
        assert_eq!(alive[0].data, SignalData::Cron { expr: "0 7 * * *".into() });
    }

    #[tokio::test]
    async fn state_regex_rejects_bad_pattern_and_warns_on_unknown_entity() {
        let (ctx, _) = ctx().await;
        let tool = CreateStateRegexTrigger { ctx: ctx.clone() };

        let bad = tool
            .execute(json!({"entity_ids": ["light.porch"], "regex": "("}))
            .await
            .unwrap();
        assert_eq!(bad["error"], "validation failed");

        let warned = tool
            .execute(json!({"entity_ids": ["sensor.imaginary"], "regex": "open"}))
            .await
            .unwrap();
        assert!(warned["created"].as_i64().is_some());
        assert!(warned["warning"]
            .as_str()
            .unwrap()
            .contains("sensor.imaginary"));

        let clean = tool
            .execute(json!({"entity_ids": ["binary_sensor.front_door"], "regex": "open"}))
            .await
            .unwrap();
        assert!(clean.get("warning").is_none());
    }

    #[tokio::test]
    async fn state_range_needs_a_bound() {
        let (ctx, _) = ctx().await;
        let tool = CreateStateRangeTrigger { ctx };

        let bad = tool
            .execute(json!({"entity_id": "sensor.humidity", "for_seconds": 60}))
            .await
            .unwrap();
        assert_eq!(bad["error"], "validation failed");

        let inverted = tool
            .execute(json!({"entity_id": "sensor.humidity", "min": 60, "max": 40, "for_seconds": 60}))
            .await
            .unwrap();
        assert_eq!(inverted["error"], "validation failed");

        let good = tool
            .execute(json!({"entity_id": "sensor.humidity", "min": 40, "for_seconds": 60}))
            .await
            .unwrap();
        assert!(good["created"].as_i64().is_some());
    }

    #[tokio::test]
    async fn relative_trigger_anchors_at_now() {
        let (ctx, clock) = ctx().await;
        let tool = CreateRelativeTimeTrigger { ctx: ctx.clone() };

        let rejected = tool.execute(json!({"offset_seconds": 0})).await.unwrap();
        assert_eq!(rejected["error"], "validation failed");

        tool.execute(json!({"offset_seconds": 900, "repeat_forever": true}))
            .await
            .unwrap();
        let alive = ctx.store.alive_signals_for_hash("hash_a").await.unwrap();
        match &alive[0].data {
            SignalData::Offset {
                offset_seconds,
                repeat_forever,
                anchor,
            } => {
                assert_eq!(*offset_seconds, 900);
                assert!(repeat_forever);
                assert_eq!(*anchor, clock.now());
            }
            other => panic!("expected offset signal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn absolute_trigger_rejects_the_past() {
        let (ctx, clock) = ctx().await;
        let tool = CreateAbsoluteTimeTrigger { ctx: ctx.clone() };

        let past = (clock.now() - Duration::hours(1)).to_rfc3339();
        let rejected = tool.execute(json!({"iso8601": past})).await.unwrap();
        assert_eq!(rejected["error"], "validation failed");
        assert!(rejected["detail"].as_str().unwrap().contains("past"));

        let garbled = tool.execute(json!({"iso8601": "tomorrowish"})).await.unwrap();
        assert_eq!(garbled["error"], "validation failed");

        let future = (clock.now() + Duration::hours(1)).to_rfc3339();
        let created = tool.execute(json!({"iso8601": future})).await.unwrap();
        assert!(created["created"].as_i64().is_some());
    }

    #[tokio::test]
    async fn list_and_cancel_round_trip() {
        let (ctx, _) = ctx().await;
        let list = ListScheduledTriggers { ctx: ctx.clone() };
        let cancel = CancelAllScheduledTriggers { ctx: ctx.clone() };
        let create = CreateCronTrigger { ctx: ctx.clone() };

        assert_eq!(
            list.execute(json!({})).await.unwrap(),
            json!("no triggers registered")
        );

        create.execute(json!({"expr": "0 7 * * *"})).await.unwrap();
        create.execute(json!({"expr": "30 22 * * *"})).await.unwrap();

        let listing = list.execute(json!({})).await.unwrap();
        let text = listing.as_str().unwrap();
        assert!(text.contains("0 7 * * *"));
        assert!(text.contains("30 22 * * *"));

        let cancelled = cancel.execute(json!({})).await.unwrap();
        assert_eq!(cancelled["cancelled"], 2);
        assert_eq!(
            list.execute(json!({})).await.unwrap(),
            json!("no triggers registered")
        );
    }
}
