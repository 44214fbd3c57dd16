//! `hearth dump-bug-report` — write a diagnostic bundle: hub snapshots,
//! notebook contents, recent runs, and the app log tail.

use chrono::Utc;
use hearth_config::AppConfig;
use hearth_core::hub::HubClient;
use hearth_hub::RestHub;
use hearth_runtime::scan_notebook;
use hearth_store::SignalStore;
use std::path::PathBuf;
use tracing::warn;

pub async fn run(db_path: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load()?;
    if let Some(db_path) = db_path {
        config.db_path = db_path;
    }

    let dir = PathBuf::from(format!(
        "bug-report-{}",
        Utc::now().format("%Y%m%dT%H%M%SZ")
    ));
    std::fs::create_dir_all(&dir)?;

    // hub snapshots, best-effort
    let hub = RestHub::new(
        &config.hub.url,
        config.hub.token.clone().unwrap_or_default(),
    )?;
    match hub.fetch_states().await {
        Ok(states) => {
            std::fs::write(dir.join("states.json"), serde_json::to_string_pretty(&states)?)?;
        }
        Err(e) => warn!(error = %e, "states snapshot unavailable"),
    }
    match hub.fetch_services().await {
        Ok(services) => {
            std::fs::write(
                dir.join("services.json"),
                serde_json::to_string_pretty(&services)?,
            )?;
        }
        Err(e) => warn!(error = %e, "services snapshot unavailable"),
    }

    // notebook contents
    match scan_notebook(&config.notebook_dir) {
        Ok(notebook) => {
            let automations_dir = dir.join("automations");
            std::fs::create_dir_all(&automations_dir)?;
            for automation in &notebook.automations {
                std::fs::write(automations_dir.join(&automation.file_name), &automation.contents)?;
            }
            let cues_dir = dir.join("cues");
            std::fs::create_dir_all(&cues_dir)?;
            for cue in &notebook.cues {
                std::fs::write(cues_dir.join(&cue.file_name), &cue.contents)?;
            }
        }
        Err(e) => warn!(error = %e, "notebook scan failed"),
    }

    // store contents
    let db_path_str = config.db_path.to_string_lossy().into_owned();
    match SignalStore::open(&db_path_str).await {
        Ok(store) => {
            let signals = store.alive_signals().await?;
            std::fs::write(dir.join("signals.json"), serde_json::to_string_pretty(&signals)?)?;

            let runs = store.automation_logs(None, 50).await?;
            std::fs::write(dir.join("runs.json"), serde_json::to_string_pretty(&runs)?)?;

            let tail = store.recent_logs(200).await?;
            let rendered: String = tail
                .iter()
                .map(|(level, message)| format!("[{level}] {message}\n"))
                .collect();
            std::fs::write(dir.join("logs.txt"), rendered)?;
        }
        Err(e) => warn!(error = %e, "store unavailable"),
    }

    println!("bug report written to {}", dir.display());
    Ok(())
}
