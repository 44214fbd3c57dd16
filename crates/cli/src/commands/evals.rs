//! `hearth evals` — run the scenario catalog and print the scores.

use hearth_config::AppConfig;
use hearth_core::automation::ModelSpec;
use hearth_evals::EvalHarness;
use hearth_providers::ProviderFactory;
use std::sync::Arc;

pub async fn run(
    model: Option<String>,
    driver: Option<String>,
    num: Option<usize>,
    quick: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(AppConfig::load()?);
    let factory = Arc::new(ProviderFactory::new(config.clone()));

    let spec = ModelSpec {
        driver: driver.unwrap_or_else(|| config.default_driver.clone()),
        model: Some(model.unwrap_or_else(|| config.default_model.clone())),
    };
    println!(
        "running evals with {}/{}{}",
        spec.driver,
        spec.model.as_deref().unwrap_or("-"),
        if quick { " (quick)" } else { "" }
    );

    let harness = EvalHarness::new(factory, spec, config.judge_model.clone());
    let results = harness.run_all(num, quick).await?;

    let mut total = 0.0;
    let mut possible = 0.0;
    for result in &results {
        total += result.final_score;
        possible += result.final_score_possible;
        println!(
            "  {:<24} {:>5.1} / {:<5.1}  ({} messages)",
            result.name,
            result.final_score,
            result.final_score_possible,
            result.messages.len()
        );
        for grade in &result.grade_results {
            println!("      [{}] {}", grade.grader, grade.reasoning);
        }
    }
    println!("total: {total:.1} / {possible:.1}");
    Ok(())
}
