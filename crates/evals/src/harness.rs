//! Runs scenarios through the tool-loop against the mock hub and applies
//! graders plus the mechanical call/signal expectations.

use hearth_agent::{LoopConfig, LoopRequest, ToolLoop};
use hearth_core::automation::ModelSpec;
use hearth_core::clock::SystemClock;
use hearth_core::hub::HubClient;
use hearth_core::message::MessageParam;
use hearth_core::provider::LlmFactory;
use hearth_core::tool::ToolRegistry;
use hearth_core::Result;
use hearth_store::{LogType, NewAutomationLog, SignalStore};
use hearth_tools::{execution_suite, scheduling_suite, ExecutionContext, SchedulingContext, Scratchpad};
use std::sync::Arc;
use tracing::info;

use crate::fixtures::MockHub;
use crate::graders::GradeResult;
use crate::scenarios::{scenario_catalog, Scenario, ToolSuiteKind};

/// The outcome of one scenario run.
#[derive(Debug)]
pub struct ScenarioResult {
    pub name: String,
    pub prompt: String,
    pub tools_description: String,
    pub messages: Vec<MessageParam>,
    pub grade_results: Vec<GradeResult>,
    pub final_score: f64,
    pub final_score_possible: f64,
}

/// Builds an isolated runtime per scenario: fresh in-memory store, fresh
/// mock hub, the same registries and loop as production.
pub struct EvalHarness {
    factory: Arc<dyn LlmFactory>,
    spec: ModelSpec,
    judge_model: String,
    loop_config: LoopConfig,
}

impl EvalHarness {
    pub fn new(factory: Arc<dyn LlmFactory>, spec: ModelSpec, judge_model: String) -> Self {
        Self {
            factory,
            spec,
            judge_model,
            loop_config: LoopConfig::default(),
        }
    }

    pub fn with_loop_config(mut self, config: LoopConfig) -> Self {
        self.loop_config = config;
        self
    }

    /// Run the catalog. `quick` keeps only the mechanical scenarios; `num`
    /// caps how many scenarios run.
    pub async fn run_all(&self, num: Option<usize>, quick: bool) -> Result<Vec<ScenarioResult>> {
        let mut catalog = scenario_catalog();
        if quick {
            // mechanical checks only: no judge model calls
            for scenario in &mut catalog {
                scenario
                    .graders
                    .retain(|g| !matches!(g, crate::Grader::LlmJudge { .. }));
            }
            catalog.retain(|s| {
                !s.graders.is_empty()
                    || s.call_expectation.is_some()
                    || s.signal_expectation.is_some()
            });
        }
        if let Some(num) = num {
            catalog.truncate(num);
        }

        let mut results = Vec::with_capacity(catalog.len());
        for scenario in &catalog {
            info!(scenario = %scenario.name, "running eval scenario");
            results.push(self.run_scenario(scenario).await?);
        }
        Ok(results)
    }

    /// Run one scenario and grade it.
    pub async fn run_scenario(&self, scenario: &Scenario) -> Result<ScenarioResult> {
        let store = Arc::new(SignalStore::in_memory().await?);
        let hub = Arc::new(MockHub::standard());
        let scratchpad = Arc::new(Scratchpad::new(
            std::env::temp_dir().join(format!("hearth-eval-{}.md", uuid::Uuid::new_v4())),
        ));

        let (provider, model) = self.factory.build(&self.spec)?;

        let mut registry = ToolRegistry::new();
        match scenario.suite {
            ToolSuiteKind::Execution => {
                let log_id = store
                    .append_automation_log(&NewAutomationLog {
                        automation_hash: None,
                        log_type: LogType::Manual,
                        messages: vec![],
                        signaled_by: None,
                    })
                    .await?;
                let ctx = Arc::new(ExecutionContext::new(
                    hub.clone(),
                    store.clone(),
                    log_id,
                    false,
                    scratchpad,
                ));
                registry.register_all(execution_suite(ctx));
            }
            ToolSuiteKind::Scheduling => {
                let known_entities = hub
                    .fetch_states()
                    .await?
                    .into_iter()
                    .map(|s| s.entity_id)
                    .collect();
                let ctx = Arc::new(SchedulingContext {
                    store: store.clone(),
                    automation_hash: "eval".into(),
                    known_entities,
                    clock: Arc::new(SystemClock),
                });
                registry.register_all(scheduling_suite(ctx));
            }
        }
        let tools_description = registry.describe();

        let messages = ToolLoop::new(provider, model, Arc::new(registry))
            .with_config(self.loop_config.clone())
            .run_to_end(LoopRequest {
                system: None,
                prompt: scenario.prompt.clone(),
                previous: Vec::new(),
            })
            .await;

        let mut grade_results = Vec::new();

        // model-side graders
        let judge = match self.factory.build(&ModelSpec {
            driver: self.spec.driver.clone(),
            model: Some(self.judge_model.clone()),
        }) {
            Ok((provider, _)) => Some(provider),
            Err(_) => None,
        };
        for grader in &scenario.graders {
            let judge_ref = judge.as_ref().map(|p| (p, self.judge_model.as_str()));
            grade_results.push(grader.grade(&messages, judge_ref).await);
        }

        // mechanical expectations
        if let Some(expected) = &scenario.call_expectation {
            grade_results.push(grade_calls(&hub, expected));
        }
        if let Some(expected) = &scenario.signal_expectation {
            grade_results.push(grade_signals(&store, "eval", expected).await);
        }

        let final_score = grade_results.iter().map(|g| g.score).sum();
        let final_score_possible = grade_results.iter().map(|g| g.possible).sum();

        Ok(ScenarioResult {
            name: scenario.name.clone(),
            prompt: scenario.prompt.clone(),
            tools_description,
            messages,
            grade_results,
            final_score,
            final_score_possible,
        })
    }
}

fn grade_calls(hub: &MockHub, expected: &crate::scenarios::CallExpectation) -> GradeResult {
    let calls = hub.recorded_calls();
    let mut checks: f64 = 0.0;
    let mut passed: f64 = 0.0;
    let mut notes = Vec::new();

    if let Some(service) = &expected.service {
        checks += 1.0;
        let hit = calls
            .iter()
            .any(|c| format!("{}.{}", c.domain, c.service) == *service);
        if hit {
            passed += 1.0;
        } else {
            notes.push(format!("no call to {service}"));
        }
    }
    if let Some(target) = &expected.target_contains {
        checks += 1.0;
        let hit = calls
            .iter()
            .any(|c| c.target.entity_id.iter().any(|e| e.contains(target.as_str())));
        if hit {
            passed += 1.0;
        } else {
            notes.push(format!("no target containing {target}"));
        }
    }
    if let Some(fragment) = &expected.data_contains {
        checks += 1.0;
        let hit = calls.iter().any(|c| {
            c.data
                .as_ref()
                .map(|d| d.to_string().contains(fragment.as_str()))
                .unwrap_or(false)
        });
        if hit {
            passed += 1.0;
        } else {
            notes.push(format!("no data containing {fragment}"));
        }
    }
    if let Some(fragment) = &expected.targets_all_contain {
        checks += 1.0;
        let all = !calls.is_empty()
            && calls
                .iter()
                .flat_map(|c| c.target.entity_id.iter())
                .all(|e| e.contains(fragment.as_str()));
        if all {
            passed += 1.0;
        } else {
            notes.push(format!("a target without {fragment}"));
        }
    }

    GradeResult {
        grader: "service-calls".into(),
        score: passed,
        possible: checks.max(1.0),
        reasoning: if notes.is_empty() {
            "all service-call expectations met".into()
        } else {
            notes.join("; ")
        },
    }
}

async fn grade_signals(
    store: &SignalStore,
    hash: &str,
    expected: &crate::scenarios::SignalExpectation,
) -> GradeResult {
    let alive = match store.alive_signals_for_hash(hash).await {
        Ok(alive) => alive,
        Err(e) => {
            return GradeResult {
                grader: "signals".into(),
                score: 0.0,
                possible: 1.0,
                reasoning: format!("store read failed: {e}"),
            }
        }
    };

    let mut notes = Vec::new();
    if alive.len() != expected.count {
        notes.push(format!("{} alive signals, wanted {}", alive.len(), expected.count));
    }
    let kind_hit = alive.iter().any(|s| s.data.kind() == expected.kind);
    if !kind_hit {
        notes.push(format!("no signal of kind {}", expected.kind));
    }
    let payloads: Vec<String> = alive
        .iter()
        .map(|s| serde_json::to_string(&s.data).unwrap_or_default())
        .collect();
    for fragment in &expected.payload_contains {
        if !payloads.iter().any(|p| p.contains(fragment.as_str())) {
            notes.push(format!("payload missing `{fragment}`"));
        }
    }

    GradeResult {
        grader: "signals".into(),
        score: if notes.is_empty() { 1.0 } else { 0.0 },
        possible: 1.0,
        reasoning: if notes.is_empty() {
            "signal expectations met".into()
        } else {
            notes.join("; ")
        },
    }
}
