//! The scenario catalog.

use crate::graders::Grader;

/// Which tool suite a scenario runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolSuiteKind {
    Execution,
    Scheduling,
}

/// A check against the service calls the mock hub recorded.
#[derive(Debug, Clone, Default)]
pub struct CallExpectation {
    /// `domain.service` that must appear at least once.
    pub service: Option<String>,
    /// An entity id that must appear in some call's target.
    pub target_contains: Option<String>,
    /// A string that must appear in some call's data payload.
    pub data_contains: Option<String>,
    /// Every targeted entity id must contain this fragment.
    pub targets_all_contain: Option<String>,
}

/// A check against the signals a scheduling scenario persisted.
#[derive(Debug, Clone)]
pub struct SignalExpectation {
    /// Exact alive-signal count.
    pub count: usize,
    /// Required signal kind ("cron", "state", ...).
    pub kind: String,
    /// A string that must appear in the signal payload.
    pub payload_contains: Vec<String>,
}

/// One eval scenario.
#[derive(Debug, Clone)]
pub struct Scenario {
    pub name: String,
    pub prompt: String,
    pub suite: ToolSuiteKind,
    pub graders: Vec<Grader>,
    pub call_expectation: Option<CallExpectation>,
    pub signal_expectation: Option<SignalExpectation>,
}

impl Scenario {
    fn execution(name: &str, prompt: &str, graders: Vec<Grader>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            suite: ToolSuiteKind::Execution,
            graders,
            call_expectation: None,
            signal_expectation: None,
        }
    }

    fn scheduling(name: &str, prompt: &str, expectation: SignalExpectation) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
            suite: ToolSuiteKind::Scheduling,
            graders: Vec::new(),
            call_expectation: None,
            signal_expectation: Some(expectation),
        }
    }

    fn with_calls(mut self, expectation: CallExpectation) -> Self {
        self.call_expectation = Some(expectation);
        self
    }
}

/// The built-in catalog, seeded with the standing regression scenarios.
pub fn scenario_catalog() -> Vec<Scenario> {
    vec![
        Scenario::execution(
            "list-lights",
            "List all the light entities in the living room. Give me their friendly names only.",
            vec![Grader::contains_without(
                &["Bookshelf Light", "Overhead Light", "TV Lightstrip"],
                &["light.bookshelf_light", "light.overhead_light", "light.tv_lightstrip"],
            )],
        ),
        Scenario::execution(
            "bulk-off",
            "Turn off all the lights in the kitchen.",
            vec![Grader::judge(
                "The assistant must turn off every kitchen light and only kitchen lights, \
                 then confirm what it did.",
            )],
        )
        .with_calls(CallExpectation {
            service: Some("light.turn_off".into()),
            target_contains: Some("light.kitchen_dining_room_chandelier".into()),
            targets_all_contain: Some("kitchen".into()),
            ..CallExpectation::default()
        }),
        Scenario::execution(
            "thermostat",
            "Set the thermostat in the bedroom to 72 degrees",
            vec![Grader::judge(
                "The assistant must set the bedroom thermostat target temperature to 72 \
                 and nothing else.",
            )],
        )
        .with_calls(CallExpectation {
            service: Some("climate.set_temperature".into()),
            target_contains: Some("bedroom".into()),
            data_contains: Some("72".into()),
            ..CallExpectation::default()
        }),
        Scenario::scheduling(
            "scheduler-happy-path",
            "Every morning at 7am turn on the coffee maker",
            SignalExpectation {
                count: 1,
                kind: "cron".into(),
                payload_contains: vec!["7".into()],
            },
        ),
        Scenario::scheduling(
            "state-trigger",
            "When the front door opens, flash the porch light",
            SignalExpectation {
                count: 1,
                kind: "state".into(),
                payload_contains: vec!["door".into(), "open".into()],
            },
        ),
        Scenario::execution(
            "memory-round-trip",
            "Remember that the guest wifi password is hunter2, then confirm what you stored.",
            vec![Grader::contains(&["hunter2"])],
        ),
    ]
}
