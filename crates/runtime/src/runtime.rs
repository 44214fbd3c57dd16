use chrono_tz::Tz;
use hearth_agent::prompts;
use hearth_agent::{LoopConfig, LoopRequest, ToolLoop};
use hearth_config::AppConfig;
use hearth_core::automation::Automation;
use hearth_core::clock::Clock;
use hearth_core::error::Error;
use hearth_core::hub::HubClient;
use hearth_core::message::MessageParam;
use hearth_core::provider::LlmFactory;
use hearth_core::signal::Signal;
use hearth_core::tool::ToolRegistry;
use hearth_core::Result;
use hearth_engine::{TriggerEngine, TriggerEvent};
use hearth_store::{LogType, NewAutomationLog, SignalStore};
use hearth_tools::{execution_suite, scheduling_suite, ExecutionContext, SchedulingContext, Scratchpad};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{broadcast, mpsc, watch, Mutex, RwLock, Semaphore};
use tracing::{debug, error, info, warn};

use crate::notebook::{memory_path, scan_notebook, Notebook, NotebookWatcher};

/// Everything the runtime is wired up with at boot.
pub struct RuntimeDeps {
    pub config: Arc<AppConfig>,
    pub store: Arc<SignalStore>,
    pub hub: Arc<dyn HubClient>,
    pub factory: Arc<dyn LlmFactory>,
    pub clock: Arc<dyn Clock>,
}

/// Observable runtime happenings, broadcast to whoever subscribed.
/// The status endpoint surfaces the most recent of these.
#[derive(Debug, Clone)]
pub enum RuntimeEvent {
    /// The notebook was rescanned (boot or change) and re-reconciled.
    NotebookReloaded { automations: usize, cues: usize },
    /// A scheduling or execution job ended in an error.
    JobFailed {
        automation_hash: String,
        error: String,
    },
}

/// One unit of work for an automation hash.
enum Job {
    Schedule(Automation),
    Execute {
        automation: Automation,
        signal: Signal,
    },
}

/// Per-hash lane: a bounded queue plus a latest-event slot that absorbs
/// overflow. One lane task drains both, so two jobs for the same hash can
/// never interleave.
struct Lane {
    tx: mpsc::Sender<Job>,
    coalesced: Arc<Mutex<Option<Job>>>,
}

struct RuntimeInner {
    config: Arc<AppConfig>,
    store: Arc<SignalStore>,
    hub: Arc<dyn HubClient>,
    factory: Arc<dyn LlmFactory>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    scratchpad: Arc<Scratchpad>,
    notebook: RwLock<Notebook>,
    lanes: Mutex<HashMap<String, Lane>>,
    workers: Arc<Semaphore>,
    in_flight: AtomicUsize,
    events: broadcast::Sender<RuntimeEvent>,
}

/// The top-level coordinator. Cheap to clone; lane tasks hold a clone.
#[derive(Clone)]
pub struct AutomationRuntime {
    inner: Arc<RuntimeInner>,
}

impl AutomationRuntime {
    pub fn new(deps: RuntimeDeps) -> Result<Self> {
        let tz = deps.config.tz().map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        let scratchpad = Arc::new(Scratchpad::new(memory_path(&deps.config.notebook_dir)));
        let workers = deps.config.runtime.effective_workers();
        let (events, _) = broadcast::channel(64);

        Ok(Self {
            inner: Arc::new(RuntimeInner {
                tz,
                scratchpad,
                notebook: RwLock::new(Notebook::default()),
                lanes: Mutex::new(HashMap::new()),
                workers: Arc::new(Semaphore::new(workers)),
                in_flight: AtomicUsize::new(0),
                events,
                config: deps.config,
                store: deps.store,
                hub: deps.hub,
                factory: deps.factory,
                clock: deps.clock,
            }),
        })
    }

    pub fn store(&self) -> &Arc<SignalStore> {
        &self.inner.store
    }

    /// Subscribe to runtime events (notebook reloads, job failures).
    pub fn subscribe_events(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.inner.events.subscribe()
    }

    /// Run until `shutdown` flips: scan, reconcile, then react to trigger
    /// events and notebook changes. Performs the graceful drain and store
    /// checkpoint on the way out.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        self.rescan().await?;

        let inner = &self.inner;
        let engine = Arc::new(TriggerEngine::new(
            inner.store.clone(),
            inner.clock.clone(),
            inner.tz,
        ));
        match inner.hub.fetch_states().await {
            Ok(states) => {
                let pairs: Vec<(String, String)> = states
                    .into_iter()
                    .map(|s| (s.entity_id, s.state))
                    .collect();
                engine.seed_states(&pairs).await;
            }
            Err(e) => warn!(error = %e, "could not seed entity states from hub"),
        }
        let (mut events, engine_handle) = engine.run(inner.hub.subscribe(), shutdown.clone());

        let (notebook_tx, mut notebook_rx) = mpsc::channel(4);
        let _watcher = match NotebookWatcher::start(&inner.config.notebook_dir, notebook_tx) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                warn!(error = %e, dir = %inner.config.notebook_dir.display(), "notebook watch unavailable");
                None
            }
        };

        self.reconcile().await;
        info!("automation runtime up");

        loop {
            tokio::select! {
                Some(event) = events.recv() => {
                    self.handle_trigger_event(event).await;
                }
                Some(()) = notebook_rx.recv() => {
                    // let the burst settle, then collapse it into one rescan
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    while notebook_rx.try_recv().is_ok() {}
                    info!("notebook changed, reloading");
                    if let Err(e) = self.rescan().await {
                        error!(error = %e, "notebook rescan failed");
                        continue;
                    }
                    self.reconcile().await;
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("shutting down: draining in-flight jobs");
        let deadline =
            Instant::now() + Duration::from_secs(inner.config.runtime.shutdown_grace_secs);
        while inner.in_flight.load(Ordering::SeqCst) > 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        engine_handle.abort();
        inner.store.checkpoint().await?;
        Ok(())
    }

    /// Rescan the notebook; kill signals of hashes that disappeared.
    pub async fn rescan(&self) -> Result<()> {
        let inner = &self.inner;
        let scanned = scan_notebook(&inner.config.notebook_dir)
            .map_err(|e| Error::Internal(format!("notebook scan: {e}")))?;

        let removed: Vec<String> = {
            let current = inner.notebook.read().await;
            current
                .automations
                .iter()
                .filter(|a| scanned.automation_by_hash(&a.hash).is_none())
                .map(|a| a.hash.clone())
                .collect()
        };
        for hash in removed {
            let killed = inner.store.kill_all_for_hash(&hash).await?;
            if killed > 0 {
                info!(automation = %hash, killed, "automation gone, signals killed");
            }
        }

        let reloaded = RuntimeEvent::NotebookReloaded {
            automations: scanned.automations.len(),
            cues: scanned.cues.len(),
        };
        let mut current = inner.notebook.write().await;
        *current = scanned;
        drop(current);

        // no subscribers is fine
        let _ = inner.events.send(reloaded);
        Ok(())
    }

    /// Enqueue a scheduling job for every automation with no alive signals.
    /// Idempotent: an automation that is already scheduled is left alone.
    pub async fn reconcile(&self) {
        let automations = self.inner.notebook.read().await.automations.clone();
        for automation in automations {
            match self.inner.store.alive_signals_for_hash(&automation.hash).await {
                Ok(alive) if alive.is_empty() => {
                    debug!(automation = %automation.hash, file = %automation.file_name, "queueing scheduling job");
                    self.dispatch(automation.hash.clone(), Job::Schedule(automation))
                        .await;
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, automation = %automation.hash, "reconcile read failed"),
            }
        }
    }

    /// React to one trigger-engine event.
    pub async fn handle_trigger_event(&self, event: TriggerEvent) {
        let automation = {
            let notebook = self.inner.notebook.read().await;
            notebook.automation_by_hash(&event.automation_hash).cloned()
        };
        match automation {
            Some(automation) => {
                self.dispatch(
                    event.automation_hash,
                    Job::Execute {
                        automation,
                        signal: event.signal,
                    },
                )
                .await;
            }
            None => {
                // signals for an automation the notebook no longer carries
                warn!(automation = %event.automation_hash, "event for unknown automation, killing its signals");
                if let Err(e) = self.inner.store.kill_all_for_hash(&event.automation_hash).await {
                    error!(error = %e, "failed to kill stale signals");
                }
            }
        }
    }

    /// Run a manual prompt through the execution suite (interactive chat and
    /// cues). The log row is created up front and updated in place as the
    /// transcript grows.
    pub async fn run_manual(&self, prompt: &str) -> Result<(i64, Vec<MessageParam>)> {
        let inner = &self.inner;
        let log_id = inner
            .store
            .append_automation_log(&NewAutomationLog {
                automation_hash: None,
                log_type: LogType::Manual,
                messages: vec![],
                signaled_by: None,
            })
            .await?;

        let spec = inner.factory.default_spec();
        let (provider, model) = inner.factory.build(&spec)?;
        let registry = self.execution_registry(log_id);

        let tool_loop = ToolLoop::new(provider, model, registry).with_config(self.loop_config());
        let mut rx = tool_loop.run(LoopRequest {
            system: Some(prompts::executor_system_prompt()),
            prompt: prompt.to_string(),
            previous: Vec::new(),
        });

        let mut transcript = Vec::new();
        while let Some(msg) = rx.recv().await {
            transcript.push(msg);
            // grow the row while the request is live
            inner.store.update_automation_log(log_id, &transcript).await?;
        }
        Ok((log_id, transcript))
    }

    /// Fire a cue by file name.
    pub async fn run_cue(&self, file_name: &str) -> Result<(i64, Vec<MessageParam>)> {
        let cue = {
            let notebook = self.inner.notebook.read().await;
            notebook.cue_by_name(file_name).cloned()
        };
        let Some(cue) = cue else {
            return Err(Error::Internal(format!("no cue named `{file_name}`")));
        };
        let (_, body) = cue.model_directive();
        let body = body.to_string();
        self.run_manual(&body).await
    }

    /// Wait until every queued and running job has finished.
    pub async fn quiesce(&self) {
        while self.inner.in_flight.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    // ── job plumbing ────────────────────────────────────────────────────

    async fn dispatch(&self, hash: String, job: Job) {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);

        let mut lanes = self.inner.lanes.lock().await;
        let lane = lanes
            .entry(hash.clone())
            .or_insert_with(|| self.spawn_lane(hash.clone()));

        if let Err(mpsc::error::TrySendError::Full(job)) = lane.tx.try_send(job) {
            // saturated: keep only the latest event
            let mut slot = lane.coalesced.lock().await;
            if slot.replace(job).is_some() {
                self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
                debug!(automation = %hash, "coalesced pending event");
            }
        }
    }

    fn spawn_lane(&self, hash: String) -> Lane {
        let (tx, mut rx) = mpsc::channel::<Job>(self.inner.config.runtime.queue_depth.max(1));
        let coalesced: Arc<Mutex<Option<Job>>> = Arc::new(Mutex::new(None));

        let runtime = self.clone();
        let slot = coalesced.clone();
        tokio::spawn(async move {
            loop {
                // queued jobs first; the coalesced slot holds the newest
                // overflow event and runs once the queue is empty
                let job = match rx.try_recv() {
                    Ok(job) => Some(job),
                    Err(TryRecvError::Empty) => match slot.lock().await.take() {
                        Some(job) => Some(job),
                        None => rx.recv().await,
                    },
                    Err(TryRecvError::Disconnected) => slot.lock().await.take(),
                };
                let Some(job) = job else { break };

                let Ok(permit) = runtime.inner.workers.clone().acquire_owned().await else {
                    break;
                };
                runtime.run_job(job).await;
                drop(permit);
                runtime.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            debug!(automation = %hash, "lane drained");
        });

        Lane { tx, coalesced }
    }

    async fn run_job(&self, job: Job) {
        let outcome = match &job {
            Job::Schedule(automation) => self.schedule_job(automation).await,
            Job::Execute { automation, signal } => self.execute_job(automation, signal).await,
        };
        if let Err(e) = outcome {
            let hash = match &job {
                Job::Schedule(a) => &a.hash,
                Job::Execute { automation, .. } => &automation.hash,
            };
            error!(automation = %hash, error = %e, "job failed");
            let line = format!("job for {hash} failed: {e}");
            if let Err(log_err) = self.inner.store.record_log("error", &line).await {
                error!(error = %log_err, "could not record job failure");
            }
            let _ = self.inner.events.send(RuntimeEvent::JobFailed {
                automation_hash: hash.clone(),
                error: e.to_string(),
            });
        }
    }

    /// The scheduling pass: derive and persist this automation's signals.
    async fn schedule_job(&self, automation: &Automation) -> Result<()> {
        let inner = &self.inner;

        // serialized with execution on the lane; re-check idempotence here
        // in case a previous lane job already scheduled this hash
        if !inner
            .store
            .alive_signals_for_hash(&automation.hash)
            .await?
            .is_empty()
        {
            debug!(automation = %automation.hash, "already scheduled, skipping");
            return Ok(());
        }

        let (provider, model) = self.provider_for(automation)?;
        let known_entities = match inner.hub.fetch_states().await {
            Ok(states) => states.into_iter().map(|s| s.entity_id).collect(),
            Err(e) => {
                warn!(error = %e, "entity list unavailable for scheduling");
                Vec::new()
            }
        };

        let ctx = Arc::new(SchedulingContext {
            store: inner.store.clone(),
            automation_hash: automation.hash.clone(),
            known_entities,
            clock: inner.clock.clone(),
        });
        let mut registry = ToolRegistry::new()
            .with_timeout(Duration::from_secs(inner.config.runtime.tool_timeout_secs));
        registry.register_all(scheduling_suite(ctx));

        let memory = inner.scratchpad.read().await.unwrap_or_default();
        let transcript = ToolLoop::new(provider, model, Arc::new(registry))
            .with_config(self.loop_config())
            .run_to_end(LoopRequest {
                system: Some(prompts::scheduler_system_prompt()),
                prompt: prompts::scheduler_prompt(automation, &memory),
                previous: Vec::new(),
            })
            .await;

        inner
            .store
            .append_automation_log(&NewAutomationLog {
                automation_hash: Some(automation.hash.clone()),
                log_type: LogType::DetermineSignal,
                messages: transcript,
                signaled_by: None,
            })
            .await?;

        let registered = inner.store.alive_signals_for_hash(&automation.hash).await?;
        info!(automation = %automation.hash, file = %automation.file_name,
              signals = registered.len(), "scheduling pass complete");
        Ok(())
    }

    /// The execution pass for one firing.
    async fn execute_job(&self, automation: &Automation, signal: &Signal) -> Result<()> {
        let inner = &self.inner;

        // log row + one-shot kill, atomically
        let log_id = inner.store.begin_firing(signal).await?;

        let (provider, model) = self.provider_for(automation)?;
        let registry = self.execution_registry(log_id);
        let memory = inner.scratchpad.read().await.unwrap_or_default();

        let transcript = ToolLoop::new(provider, model, registry)
            .with_config(self.loop_config())
            .run_to_end(LoopRequest {
                system: Some(prompts::executor_system_prompt()),
                prompt: prompts::execute_prompt(automation, &memory, &signal.data),
                previous: Vec::new(),
            })
            .await;

        inner.store.update_automation_log(log_id, &transcript).await?;
        info!(automation = %automation.hash, signal_id = signal.id, log_id, "execution pass complete");
        Ok(())
    }

    fn execution_registry(&self, log_id: i64) -> Arc<ToolRegistry> {
        let inner = &self.inner;
        let ctx = Arc::new(ExecutionContext::new(
            inner.hub.clone(),
            inner.store.clone(),
            log_id,
            inner.config.runtime.test_mode,
            inner.scratchpad.clone(),
        ));
        let mut registry = ToolRegistry::new()
            .with_timeout(Duration::from_secs(inner.config.runtime.tool_timeout_secs));
        registry.register_all(execution_suite(ctx));
        Arc::new(registry)
    }

    fn provider_for(
        &self,
        automation: &Automation,
    ) -> Result<(Arc<dyn hearth_core::Provider>, String)> {
        let (directive, _) = automation.model_directive();
        let spec = directive.unwrap_or_else(|| self.inner.factory.default_spec());
        Ok(self.inner.factory.build(&spec)?)
    }

    fn loop_config(&self) -> LoopConfig {
        let runtime = &self.inner.config.runtime;
        LoopConfig {
            max_iterations: runtime.max_iterations,
            provider_timeout: Duration::from_secs(runtime.provider_timeout_secs),
            max_tokens: runtime.max_tokens,
            temperature: runtime.temperature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use hearth_core::automation::ModelSpec;
    use hearth_core::clock::ManualClock;
    use hearth_core::error::{HubError, ProviderError};
    use hearth_core::hub::{EntityState, ServiceCatalog, StateChange};
    use hearth_core::message::transcript_is_paired;
    use hearth_core::signal::SignalData;
    use hearth_providers::{ScriptedProvider, ScriptedTurn};
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tempfile::tempdir;
    use tokio::sync::broadcast;

    struct FixtureHub {
        states: Vec<EntityState>,
        events: broadcast::Sender<StateChange>,
    }

    impl FixtureHub {
        fn new(states: Vec<EntityState>) -> Self {
            let (events, _) = broadcast::channel(16);
            Self { states, events }
        }
    }

    #[async_trait]
    impl hearth_core::HubClient for FixtureHub {
        async fn fetch_states(&self) -> std::result::Result<Vec<EntityState>, HubError> {
            Ok(self.states.clone())
        }
        async fn fetch_services(&self) -> std::result::Result<ServiceCatalog, HubError> {
            Ok(ServiceCatalog::new())
        }
        async fn call_service(
            &self,
            _call: &hearth_core::ServiceCall,
        ) -> std::result::Result<Option<serde_json::Value>, HubError> {
            Ok(None)
        }
        fn subscribe(&self) -> broadcast::Receiver<StateChange> {
            self.events.subscribe()
        }
    }

    /// Hands out scripted providers, one script per build call.
    struct ScriptedFactory {
        scripts: StdMutex<Vec<Vec<ScriptedTurn>>>,
        builds: AtomicUsize,
    }

    impl ScriptedFactory {
        fn new(scripts: Vec<Vec<ScriptedTurn>>) -> Arc<Self> {
            Arc::new(Self {
                scripts: StdMutex::new(scripts),
                builds: AtomicUsize::new(0),
            })
        }
    }

    impl LlmFactory for ScriptedFactory {
        fn default_spec(&self) -> ModelSpec {
            ModelSpec {
                driver: "scripted".into(),
                model: Some("scripted".into()),
            }
        }
        fn build(
            &self,
            _spec: &ModelSpec,
        ) -> std::result::Result<(Arc<dyn hearth_core::Provider>, String), ProviderError> {
            self.builds.fetch_add(1, Ordering::SeqCst);
            let mut scripts = self.scripts.lock().unwrap();
            let turns = if scripts.is_empty() {
                Vec::new()
            } else {
                scripts.remove(0)
            };
            Ok((Arc::new(ScriptedProvider::new(turns)), "scripted".into()))
        }
    }

    struct Fixture {
        runtime: AutomationRuntime,
        store: Arc<SignalStore>,
        factory: Arc<ScriptedFactory>,
        clock: ManualClock,
        _dir: tempfile::TempDir,
    }

    async fn fixture(files: &[(&str, &str)], scripts: Vec<Vec<ScriptedTurn>>) -> Fixture {
        let dir = tempdir().unwrap();
        for (name, contents) in files {
            let path = dir.path().join("automations").join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, contents).unwrap();
        }

        let mut config = AppConfig::default();
        config.notebook_dir = dir.path().to_path_buf();
        config.runtime.test_mode = true;

        let store = Arc::new(SignalStore::in_memory().await.unwrap());
        let factory = ScriptedFactory::new(scripts);
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap());
        let hub = Arc::new(FixtureHub::new(vec![EntityState {
            entity_id: "binary_sensor.front_door".into(),
            state: "closed".into(),
            attributes: json!({}),
            last_changed: None,
            last_updated: None,
        }]));

        let runtime = AutomationRuntime::new(RuntimeDeps {
            config: Arc::new(config),
            store: store.clone(),
            hub,
            factory: factory.clone(),
            clock: Arc::new(clock.clone()),
        })
        .unwrap();
        runtime.rescan().await.unwrap();

        Fixture {
            runtime,
            store,
            factory,
            clock,
            _dir: dir,
        }
    }

    #[tokio::test]
    async fn scheduler_happy_path_registers_one_cron_signal() {
        let fx = fixture(
            &[("coffee.md", "Every morning at 7am turn on the coffee maker")],
            vec![vec![
                ScriptedTurn::tool_call("create-cron-trigger", json!({"expr": "0 7 * * *"})),
                ScriptedTurn::text("scheduled for 7am daily"),
            ]],
        )
        .await;

        fx.runtime.reconcile().await;
        fx.runtime.quiesce().await;

        let automation = Automation::new(
            "coffee.md",
            "Every morning at 7am turn on the coffee maker",
        );
        let alive = fx.store.alive_signals_for_hash(&automation.hash).await.unwrap();
        assert_eq!(alive.len(), 1);
        assert_eq!(
            alive[0].data,
            SignalData::Cron {
                expr: "0 7 * * *".into()
            }
        );

        let logs = fx.store.automation_logs(Some(&automation.hash), 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].log_type, LogType::DetermineSignal);
        assert!(transcript_is_paired(&logs[0].messages));
    }

    #[tokio::test]
    async fn reconcile_is_idempotent_for_scheduled_automations() {
        let fx = fixture(
            &[("door.md", "When the front door opens, flash the porch light")],
            vec![],
        )
        .await;
        let automation =
            Automation::new("door.md", "When the front door opens, flash the porch light");
        fx.store
            .insert_signal(
                &automation.hash,
                &SignalData::State {
                    entity_ids: vec!["binary_sensor.front_door".into()],
                    regex: "open".into(),
                },
            )
            .await
            .unwrap();

        fx.runtime.reconcile().await;
        fx.runtime.quiesce().await;
        fx.runtime.reconcile().await;
        fx.runtime.quiesce().await;

        // no scheduling pass ran: no provider was ever built, no log written
        assert_eq!(fx.factory.builds.load(Ordering::SeqCst), 0);
        let logs = fx.store.automation_logs(Some(&automation.hash), 10).await.unwrap();
        assert!(logs.is_empty());
    }

    #[tokio::test]
    async fn state_trigger_scheduling_records_door_sensor() {
        let fx = fixture(
            &[("door.md", "When the front door opens, flash the porch light")],
            vec![vec![
                ScriptedTurn::tool_call(
                    "create-state-regex-trigger",
                    json!({"entity_ids": ["binary_sensor.front_door"], "regex": "open"}),
                ),
                ScriptedTurn::text("watching the door"),
            ]],
        )
        .await;

        fx.runtime.reconcile().await;
        fx.runtime.quiesce().await;

        let automation =
            Automation::new("door.md", "When the front door opens, flash the porch light");
        let alive = fx.store.alive_signals_for_hash(&automation.hash).await.unwrap();
        assert_eq!(alive.len(), 1);
        match &alive[0].data {
            SignalData::State { entity_ids, regex } => {
                assert!(entity_ids.contains(&"binary_sensor.front_door".to_string()));
                assert!(regex.contains("open"));
            }
            other => panic!("expected state signal, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn absolute_one_shot_executes_once_and_dies() {
        let contents = "Turn on the porch light at the scheduled moment";
        let fx = fixture(
            &[("porch.md", contents)],
            // scheduling is pre-seeded; the one script is the execution pass
            vec![vec![ScriptedTurn::text("porch light handled")]],
        )
        .await;
        let automation = Automation::new("porch.md", contents);

        let fire_at = fx.clock.now() + ChronoDuration::milliseconds(50);
        let id = fx
            .store
            .insert_signal(&automation.hash, &SignalData::Time { at: fire_at })
            .await
            .unwrap();

        let engine = TriggerEngine::new(
            fx.store.clone(),
            Arc::new(fx.clock.clone()),
            chrono_tz::UTC,
        );
        assert!(engine.sweep().await.is_empty());

        fx.clock.advance(ChronoDuration::milliseconds(60));
        let events = engine.sweep().await;
        assert_eq!(events.len(), 1);

        for event in events {
            fx.runtime.handle_trigger_event(event).await;
        }
        fx.runtime.quiesce().await;

        // exactly one execute-signal log; the signal is dead
        let logs = fx.store.automation_logs(Some(&automation.hash), 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].log_type, LogType::ExecuteSignal);
        assert!(!logs[0].messages.is_empty());
        assert_eq!(
            logs[0].signaled_by,
            Some(SignalData::Time { at: fire_at })
        );
        assert!(fx.store.signal(id).await.unwrap().unwrap().is_dead);

        // the engine has nothing left to fire
        fx.clock.advance(ChronoDuration::seconds(5));
        assert!(engine.sweep().await.is_empty());
    }

    #[tokio::test]
    async fn event_for_removed_automation_kills_its_signals() {
        let fx = fixture(&[], vec![]).await;
        let id = fx
            .store
            .insert_signal(
                "gone_hash",
                &SignalData::Cron {
                    expr: "* * * * *".into(),
                },
            )
            .await
            .unwrap();
        let signal = fx.store.signal(id).await.unwrap().unwrap();

        fx.runtime
            .handle_trigger_event(TriggerEvent {
                automation_hash: "gone_hash".into(),
                signal,
                fired_at: fx.clock.now(),
            })
            .await;
        fx.runtime.quiesce().await;

        assert!(fx.store.alive_signals_for_hash("gone_hash").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rescan_kills_signals_of_deleted_files() {
        let fx = fixture(&[("a.md", "automation text")], vec![]).await;
        let automation = Automation::new("a.md", "automation text");
        fx.store
            .insert_signal(&automation.hash, &SignalData::Cron { expr: "0 7 * * *".into() })
            .await
            .unwrap();

        std::fs::remove_file(fx._dir.path().join("automations/a.md")).unwrap();
        fx.runtime.rescan().await.unwrap();

        assert!(fx
            .store
            .alive_signals_for_hash(&automation.hash)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn manual_run_writes_a_manual_log_row() {
        let fx = fixture(
            &[],
            vec![vec![
                ScriptedTurn::tool_call("read-memory", json!({})),
                ScriptedTurn::text("the lights are listed"),
            ]],
        )
        .await;

        let (log_id, transcript) = fx.runtime.run_manual("List all the lights").await.unwrap();
        assert!(transcript_is_paired(&transcript));

        let row = fx.store.automation_log(log_id).await.unwrap().unwrap();
        assert_eq!(row.log_type, LogType::Manual);
        assert_eq!(row.messages, transcript);
        assert_eq!(row.messages.last().unwrap().text(), "the lights are listed");
    }

    #[tokio::test]
    async fn rescan_broadcasts_notebook_reloaded() {
        let fx = fixture(&[("a.md", "some automation")], vec![]).await;
        let mut events = fx.runtime.subscribe_events();

        fx.runtime.rescan().await.unwrap();

        match events.recv().await.unwrap() {
            RuntimeEvent::NotebookReloaded { automations, cues } => {
                assert_eq!(automations, 1);
                assert_eq!(cues, 0);
            }
            other => panic!("expected NotebookReloaded, got {other:?}"),
        }
    }

    /// A factory with nothing configured, to force job failures.
    struct FailingFactory;

    impl LlmFactory for FailingFactory {
        fn default_spec(&self) -> ModelSpec {
            ModelSpec {
                driver: "broken".into(),
                model: None,
            }
        }
        fn build(
            &self,
            _spec: &ModelSpec,
        ) -> std::result::Result<(Arc<dyn hearth_core::Provider>, String), ProviderError> {
            Err(ProviderError::NotConfigured("no api key".into()))
        }
    }

    #[tokio::test]
    async fn failed_job_broadcasts_job_failed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("automations/a.md");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "Water the plants every evening").unwrap();

        let mut config = AppConfig::default();
        config.notebook_dir = dir.path().to_path_buf();

        let store = Arc::new(SignalStore::in_memory().await.unwrap());
        let runtime = AutomationRuntime::new(RuntimeDeps {
            config: Arc::new(config),
            store: store.clone(),
            hub: Arc::new(FixtureHub::new(vec![])),
            factory: Arc::new(FailingFactory),
            clock: Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 4, 12, 0, 0).unwrap())),
        })
        .unwrap();
        runtime.rescan().await.unwrap();

        let mut events = runtime.subscribe_events();
        runtime.reconcile().await;
        runtime.quiesce().await;

        match events.recv().await.unwrap() {
            RuntimeEvent::JobFailed {
                automation_hash,
                error,
            } => {
                let expected = Automation::new("a.md", "Water the plants every evening");
                assert_eq!(automation_hash, expected.hash);
                assert!(error.contains("no api key"));
            }
            other => panic!("expected JobFailed, got {other:?}"),
        }

        // the failure also lands in the app log tail
        let tail = store.recent_logs(10).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert!(tail[0].1.contains("no api key"));
    }

    #[tokio::test]
    async fn provider_failure_is_logged_and_job_completes() {
        let fx = fixture(
            &[("a.md", "Do something at 9am")],
            vec![vec![ScriptedTurn::error(ProviderError::ApiError {
                status_code: 500,
                message: "overloaded".into(),
            })]],
        )
        .await;

        fx.runtime.reconcile().await;
        fx.runtime.quiesce().await;

        let automation = Automation::new("a.md", "Do something at 9am");
        // the partial transcript with the synthetic trailing message is persisted
        let logs = fx.store.automation_logs(Some(&automation.hash), 10).await.unwrap();
        assert_eq!(logs.len(), 1);
        assert!(logs[0]
            .messages
            .last()
            .unwrap()
            .text()
            .contains("model call failed"));
    }
}
