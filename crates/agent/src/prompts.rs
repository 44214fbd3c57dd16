//! System and user prompt builders for the scheduling and execution passes.

use hearth_core::automation::Automation;
use hearth_core::signal::SignalData;

/// System prompt for the scheduling pass: turn prose into triggers.
pub fn scheduler_system_prompt() -> String {
    "You are the scheduler of a home-automation engine. You are given one \
     automation written in natural language. Your only job is to decide WHEN \
     it should run and register that decision with the trigger tools.\n\
     \n\
     Rules:\n\
     - First call list-scheduled-triggers to see what is already registered.\n\
     - Translate the automation's timing into the narrowest matching trigger \
       kind: cron for recurring wall-clock times, an absolute time for a \
       one-off instant, a relative offset for \"in N minutes/hours\", a state \
       regex for entity-state conditions, and a state range for \"when X stays \
       between A and B for T\".\n\
     - If the automation text gives no timing at all, register a state or cron \
       trigger that best matches its intent and say why.\n\
     - Do not call any service. Scheduling only."
        .to_string()
}

/// User prompt for the scheduling pass.
pub fn scheduler_prompt(automation: &Automation, memory: &str) -> String {
    let (_, body) = automation.model_directive();
    let mut prompt = format!(
        "Register the triggers for this automation (file `{}`):\n\n{}\n",
        automation.file_name, body
    );
    if !memory.trim().is_empty() {
        prompt.push_str(&format!("\nShared memory:\n{memory}\n"));
    }
    prompt
}

/// System prompt for the execution pass: act on the hub.
pub fn executor_system_prompt() -> String {
    "You are the executor of a home-automation engine. An automation's trigger \
     has fired and you must carry out its instructions against the hub.\n\
     \n\
     Rules:\n\
     - Look up entities before acting: use get-entities-by-prefix or \
       get-all-entities to find exact entity ids. Never guess an id.\n\
     - Check get-services-for-domain when unsure which service or fields to \
       use.\n\
     - Use call-service for every action; batch entities of one domain into \
       one call where the service allows a list target.\n\
     - Use read-memory/write-memory for state you need across runs.\n\
     - When you are done, summarize what you did in one short paragraph."
        .to_string()
}

/// User prompt for the execution pass.
pub fn execute_prompt(automation: &Automation, memory: &str, signaled_by: &SignalData) -> String {
    let (_, body) = automation.model_directive();
    let mut prompt = format!(
        "The trigger [{}] fired for this automation (file `{}`). Execute it now:\n\n{}\n",
        signaled_by.describe(),
        automation.file_name,
        body
    );
    if !memory.trim().is_empty() {
        prompt.push_str(&format!("\nShared memory:\n{memory}\n"));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_prompt_strips_model_directive() {
        let automation = Automation::new(
            "coffee.md",
            "@model ollama/qwen3:8b\nEvery morning at 7am turn on the coffee maker",
        );
        let prompt = scheduler_prompt(&automation, "");
        assert!(prompt.contains("coffee maker"));
        assert!(!prompt.contains("@model"));
        assert!(prompt.contains("coffee.md"));
    }

    #[test]
    fn execute_prompt_names_the_signal() {
        let automation = Automation::new("door.md", "Flash the porch light");
        let prompt = execute_prompt(
            &automation,
            "porch light is light.porch",
            &SignalData::State {
                entity_ids: vec!["binary_sensor.front_door".into()],
                regex: "open".into(),
            },
        );
        assert!(prompt.contains("binary_sensor.front_door"));
        assert!(prompt.contains("Flash the porch light"));
        assert!(prompt.contains("Shared memory"));
    }
}
