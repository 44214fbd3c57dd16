//! `hearth mcp` — expose the tool suites over stdio JSON-RPC so external
//! tool-hosts can schedule and execute against the hub.

use hearth_config::AppConfig;
use hearth_core::clock::SystemClock;
use hearth_core::hub::HubClient;
use hearth_core::tool::ToolRegistry;
use hearth_hub::RestHub;
use hearth_store::{LogType, NewAutomationLog, SignalStore};
use hearth_tools::{execution_suite, scheduling_suite, ExecutionContext, SchedulingContext, Scratchpad};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

pub async fn run(
    test_mode: bool,
    notebook: Option<PathBuf>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load()?;
    if let Some(notebook) = notebook {
        config.notebook_dir = notebook;
    }

    let db_path = config.db_path.to_string_lossy().into_owned();
    let store = Arc::new(SignalStore::open(&db_path).await?);
    let hub: Arc<dyn HubClient> = {
        let token = config.hub.token.clone().unwrap_or_default();
        let rest = RestHub::new(&config.hub.url, token)?;
        Arc::new(rest)
    };
    let scratchpad = Arc::new(Scratchpad::new(config.notebook_dir.join("memory.md")));

    // one log row collects every service call of this stdio session
    let log_id = store
        .append_automation_log(&NewAutomationLog {
            automation_hash: None,
            log_type: LogType::Manual,
            messages: vec![],
            signaled_by: None,
        })
        .await?;

    let known_entities = match hub.fetch_states().await {
        Ok(states) => states.into_iter().map(|s| s.entity_id).collect(),
        Err(e) => {
            warn!(error = %e, "hub unreachable, scheduling without an entity list");
            Vec::new()
        }
    };

    let mut registry = ToolRegistry::new();
    registry.register_all(scheduling_suite(Arc::new(SchedulingContext {
        store: store.clone(),
        automation_hash: "mcp-session".into(),
        known_entities,
        clock: Arc::new(SystemClock),
    })));
    registry.register_all(execution_suite(Arc::new(ExecutionContext::new(
        hub,
        store.clone(),
        log_id,
        test_mode || config.runtime.test_mode,
        scratchpad,
    ))));

    serve_stdio(registry).await
}

async fn serve_stdio(registry: ToolRegistry) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.is_empty() {
            continue;
        }
        let request: Value = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "ignoring unparseable request line");
                continue;
            }
        };

        let id = request.get("id").cloned();
        let method = request["method"].as_str().unwrap_or("");

        // notifications carry no id and get no response
        let Some(id) = id else {
            continue;
        };

        let response = match method {
            "initialize" => json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "protocolVersion": "2024-11-05",
                    "serverInfo": {"name": "hearth", "version": env!("CARGO_PKG_VERSION")},
                    "capabilities": {"tools": {}},
                }
            }),
            "tools/list" => {
                let tools: Vec<Value> = registry
                    .definitions()
                    .into_iter()
                    .map(|d| {
                        json!({
                            "name": d.name,
                            "description": d.description,
                            "inputSchema": d.input_schema,
                        })
                    })
                    .collect();
                json!({"jsonrpc": "2.0", "id": id, "result": {"tools": tools}})
            }
            "tools/call" => {
                let name = request["params"]["name"].as_str().unwrap_or("");
                let arguments = request["params"]["arguments"].clone();
                let output = registry.dispatch(name, arguments).await;
                json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "result": {
                        "content": [{"type": "text", "text": output.content}],
                        "isError": output.is_error,
                    }
                })
            }
            "ping" => json!({"jsonrpc": "2.0", "id": id, "result": {}}),
            other => json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": format!("unknown method: {other}")}
            }),
        };

        stdout
            .write_all(format!("{response}\n").as_bytes())
            .await?;
        stdout.flush().await?;
    }

    Ok(())
}
