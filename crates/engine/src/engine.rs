use chrono::{DateTime, Duration as ChronoDuration, Utc};
use chrono_tz::Tz;
use hearth_core::clock::Clock;
use hearth_core::hub::StateChange;
use hearth_core::signal::{Signal, SignalData};
use hearth_store::SignalStore;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex};
use tracing::{debug, info, warn};

/// One firing, as emitted on the unified event stream.
#[derive(Debug, Clone)]
pub struct TriggerEvent {
    pub automation_hash: String,
    pub signal: Signal,
    pub fired_at: DateTime<Utc>,
}

/// Per-range-signal residency tracking.
#[derive(Debug, Default, Clone)]
struct RangeState {
    entered_at: Option<DateTime<Utc>>,
    fired: bool,
}

/// Mutable engine bookkeeping, latched by signal id so a reload of the
/// alive set never replays a firing.
#[derive(Default)]
struct EngineState {
    last_sweep: Option<DateTime<Utc>>,
    /// signal id → last fired minute index (unix minutes)
    cron_latch: HashMap<i64, i64>,
    /// one-shots already emitted; the runtime kills them shortly after
    fired_one_shots: HashSet<i64>,
    /// repeating offset signal id → next due instant
    offset_next: HashMap<i64, DateTime<Utc>>,
    /// last observed numeric state per entity
    entity_values: HashMap<String, f64>,
    range: HashMap<i64, RangeState>,
}

/// The trigger engine. Holds a read handle to the store and an injectable
/// clock; the runtime wires its output channel into the job queues.
pub struct TriggerEngine {
    store: Arc<SignalStore>,
    clock: Arc<dyn Clock>,
    tz: Tz,
    tick_period: Duration,
    state: Mutex<EngineState>,
}

/// Wall-clock discontinuity beyond which timers are recomputed.
const TIME_JUMP_THRESHOLD: ChronoDuration = ChronoDuration::seconds(30);

impl TriggerEngine {
    pub fn new(store: Arc<SignalStore>, clock: Arc<dyn Clock>, tz: Tz) -> Self {
        Self {
            store,
            clock,
            tz,
            tick_period: Duration::from_secs(1),
            state: Mutex::new(EngineState::default()),
        }
    }

    /// Override the sweep cadence (tests use a short period).
    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    /// Seed the last-observed entity values from a hub snapshot so range
    /// signals have a baseline before the first state change arrives.
    pub async fn seed_states(&self, states: &[(String, String)]) {
        let mut engine = self.state.lock().await;
        for (entity_id, value) in states {
            if let Ok(number) = value.parse::<f64>() {
                engine.entity_values.insert(entity_id.clone(), number);
            }
        }
    }

    /// Start the engine loop: sweeps the clock-driven sources at the tick
    /// cadence and folds hub state changes in as they arrive. Runs until
    /// `shutdown` resolves or the event receiver is dropped.
    pub fn run(
        self: Arc<Self>,
        mut hub_events: broadcast::Receiver<StateChange>,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> (mpsc::Receiver<TriggerEvent>, tokio::task::JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.tick_period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                let events = tokio::select! {
                    _ = interval.tick() => self.sweep().await,
                    change = hub_events.recv() => match change {
                        Ok(change) => self.handle_state_change(&change).await,
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            warn!(missed, "hub event stream lagged, state changes dropped");
                            Vec::new()
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("hub event stream closed, stopping trigger engine");
                            return;
                        }
                    },
                    _ = shutdown.changed() => {
                        info!("trigger engine shutting down");
                        return;
                    }
                };

                for event in events {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        });

        (rx, handle)
    }

    /// One pass over the clock-driven sources. Public so tests can drive the
    /// engine with a manual clock instead of waiting out real ticks.
    pub async fn sweep(&self) -> Vec<TriggerEvent> {
        let now = self.clock.now();
        let alive = match self.store.alive_signals().await {
            Ok(alive) => alive,
            Err(e) => {
                warn!(error = %e, "failed to load alive signals");
                return Vec::new();
            }
        };

        let mut engine = self.state.lock().await;

        // Recompute repeating-offset deadlines after a wall-clock jump.
        if let Some(last) = engine.last_sweep {
            let delta = now - last;
            if delta > TIME_JUMP_THRESHOLD || delta < ChronoDuration::zero() {
                warn!(jump_secs = delta.num_seconds(), "wall-clock jump detected, recomputing timers");
                engine.offset_next.clear();
            }
        }
        engine.last_sweep = Some(now);

        let mut fired = Vec::new();
        for signal in alive {
            match &signal.data {
                SignalData::Cron { expr } => {
                    let parsed = match CronCache::parse(expr) {
                        Some(parsed) => parsed,
                        None => continue,
                    };
                    let minute_index = now.timestamp().div_euclid(60);
                    let local = now.with_timezone(&self.tz);
                    if parsed.matches(&local)
                        && engine.cron_latch.get(&signal.id) != Some(&minute_index)
                    {
                        engine.cron_latch.insert(signal.id, minute_index);
                        fired.push(self.event(&signal, now));
                    }
                }
                SignalData::Time { at } => {
                    if now >= *at && engine.fired_one_shots.insert(signal.id) {
                        fired.push(self.event(&signal, now));
                    }
                }
                SignalData::Offset {
                    offset_seconds,
                    repeat_forever,
                    anchor,
                } => {
                    let step = ChronoDuration::seconds(*offset_seconds);
                    if !repeat_forever {
                        let due = *anchor + step;
                        if now >= due && engine.fired_one_shots.insert(signal.id) {
                            fired.push(self.event(&signal, now));
                        }
                    } else {
                        let next = *engine
                            .offset_next
                            .entry(signal.id)
                            .or_insert_with(|| *anchor + step);
                        if now >= next {
                            fired.push(self.event(&signal, now));
                            // advance past now — missed repeats are not backfilled
                            let mut upcoming = next;
                            while upcoming <= now {
                                upcoming += step;
                            }
                            engine.offset_next.insert(signal.id, upcoming);
                        }
                    }
                }
                SignalData::StateRange {
                    entity_id,
                    min,
                    max,
                    for_seconds,
                } => {
                    let Some(value) = engine.entity_values.get(entity_id).copied() else {
                        continue;
                    };
                    let in_range = within(value, *min, *max);
                    let residency = engine.range.entry(signal.id).or_default();
                    if !in_range {
                        residency.entered_at = None;
                        residency.fired = false;
                        continue;
                    }
                    let entered = *residency.entered_at.get_or_insert(now);
                    if !residency.fired
                        && now - entered >= ChronoDuration::seconds(*for_seconds)
                    {
                        residency.fired = true;
                        fired.push(self.event(&signal, now));
                    }
                }
                // state-regex signals only react to hub events
                SignalData::State { .. } => {}
            }
        }

        if !fired.is_empty() {
            debug!(count = fired.len(), "sweep fired events");
        }
        fired
    }

    /// React to one hub state change: regex matches fire immediately, range
    /// residency clocks restart or begin.
    pub async fn handle_state_change(&self, change: &StateChange) -> Vec<TriggerEvent> {
        let now = self.clock.now();
        let alive = match self.store.alive_signals().await {
            Ok(alive) => alive,
            Err(e) => {
                warn!(error = %e, "failed to load alive signals");
                return Vec::new();
            }
        };

        let mut engine = self.state.lock().await;

        let numeric = change.new_state.parse::<f64>().ok();
        if let Some(value) = numeric {
            engine.entity_values.insert(change.entity_id.clone(), value);
        } else {
            engine.entity_values.remove(&change.entity_id);
        }

        let mut fired = Vec::new();
        for signal in alive {
            match &signal.data {
                SignalData::State { entity_ids, regex } => {
                    if !entity_ids.iter().any(|id| id == &change.entity_id) {
                        continue;
                    }
                    // unanchored: any substring of the new state may match
                    let Ok(pattern) = Regex::new(regex) else {
                        warn!(signal_id = signal.id, regex = %regex, "unparseable state regex");
                        continue;
                    };
                    if pattern.is_match(&change.new_state) {
                        fired.push(self.event(&signal, now));
                    }
                }
                SignalData::StateRange {
                    entity_id,
                    min,
                    max,
                    for_seconds,
                } => {
                    if entity_id != &change.entity_id {
                        continue;
                    }
                    let residency = engine.range.entry(signal.id).or_default();
                    match numeric {
                        Some(value) if within(value, *min, *max) => {
                            let entered = *residency.entered_at.get_or_insert(now);
                            if !residency.fired
                                && now - entered >= ChronoDuration::seconds(*for_seconds)
                            {
                                residency.fired = true;
                                fired.push(self.event(&signal, now));
                            }
                        }
                        _ => {
                            residency.entered_at = None;
                            residency.fired = false;
                        }
                    }
                }
                _ => {}
            }
        }

        fired
    }

    fn event(&self, signal: &Signal, fired_at: DateTime<Utc>) -> TriggerEvent {
        debug!(signal_id = signal.id, automation = %signal.automation_hash, kind = signal.data.kind(), "trigger fired");
        TriggerEvent {
            automation_hash: signal.automation_hash.clone(),
            signal: signal.clone(),
            fired_at,
        }
    }
}

fn within(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.map_or(true, |lo| value >= lo) && max.map_or(true, |hi| value <= hi)
}

/// Process-wide parse cache so the 1 Hz sweep doesn't reparse every
/// expression every second.
struct CronCache;

impl CronCache {
    fn parse(expr: &str) -> Option<crate::cron::CronExpr> {
        use std::sync::OnceLock;
        static CACHE: OnceLock<std::sync::Mutex<HashMap<String, Option<crate::cron::CronExpr>>>> =
            OnceLock::new();
        let cache = CACHE.get_or_init(|| std::sync::Mutex::new(HashMap::new()));
        let mut cache = cache.lock().unwrap();
        cache
            .entry(expr.to_string())
            .or_insert_with(|| match crate::cron::CronExpr::parse(expr) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    warn!(expr = %expr, error = %e, "invalid cron expression in store");
                    None
                }
            })
            .clone()
    }
}
