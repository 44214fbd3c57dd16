//! `hearth serve` — run the automation runtime with a small status endpoint.

use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use hearth_config::AppConfig;
use hearth_core::clock::SystemClock;
use hearth_core::hub::HubClient;
use hearth_evals::MockHub;
use hearth_hub::RestHub;
use hearth_providers::ProviderFactory;
use hearth_runtime::{AutomationRuntime, RuntimeDeps};
use hearth_store::SignalStore;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tracing::{info, warn};

/// How many runtime events the status endpoint remembers.
const EVENT_TAIL: usize = 32;

pub async fn run(
    port: Option<u16>,
    notebook: Option<PathBuf>,
    test_mode: bool,
    eval_mode: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load()?;
    if let Some(port) = port {
        config.gateway.port = port;
    }
    if let Some(notebook) = notebook {
        config.notebook_dir = notebook;
    }
    if test_mode {
        config.runtime.test_mode = true;
    }
    let config = Arc::new(config);

    let db_path = config.db_path.to_string_lossy().into_owned();
    let store = Arc::new(SignalStore::open(&db_path).await?);

    let hub: Arc<dyn HubClient> = if eval_mode {
        info!("eval mode: using the canned hub fixture");
        Arc::new(MockHub::standard())
    } else {
        let token = config.hub.token.clone().unwrap_or_else(|| {
            warn!("no hub token configured");
            String::new()
        });
        let rest = RestHub::new(&config.hub.url, token)?;
        rest.start_events();
        Arc::new(rest)
    };

    let factory = Arc::new(ProviderFactory::new(config.clone()));
    let runtime = AutomationRuntime::new(RuntimeDeps {
        config: config.clone(),
        store: store.clone(),
        hub,
        factory,
        clock: Arc::new(SystemClock),
    })?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    // keep a short tail of runtime events for the status endpoint
    let recent_events = Arc::new(Mutex::new(VecDeque::with_capacity(EVENT_TAIL)));
    let mut runtime_events = runtime.subscribe_events();
    let event_tail = recent_events.clone();
    tokio::spawn(async move {
        while let Ok(event) = runtime_events.recv().await {
            let mut tail = event_tail.lock().unwrap();
            if tail.len() == EVENT_TAIL {
                tail.pop_front();
            }
            tail.push_back(format!("{event:?}"));
        }
    });

    // status endpoint
    let app_state = Arc::new(AppState {
        runtime: runtime.clone(),
        store: store.clone(),
        recent_events,
    });
    let router = Router::new()
        .route("/healthz", get(healthz))
        .route("/api/status", get(status))
        .route("/api/chat", post(chat))
        .with_state(app_state);
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, "status endpoint listening");
    let mut gateway_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let server = axum::serve(listener, router).with_graceful_shutdown(async move {
            let _ = gateway_shutdown.changed().await;
        });
        if let Err(e) = server.await {
            warn!(error = %e, "status endpoint stopped");
        }
    });

    runtime.run(shutdown_rx).await?;
    info!("clean shutdown");
    Ok(())
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

struct AppState {
    runtime: AutomationRuntime,
    store: Arc<SignalStore>,
    recent_events: Arc<Mutex<VecDeque<String>>>,
}

async fn healthz() -> &'static str {
    "ok"
}

async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<serde_json::Value>, axum::http::StatusCode> {
    let alive = state
        .store
        .alive_signals()
        .await
        .map_err(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR)?;
    let logs = state
        .store
        .automation_logs(None, 20)
        .await
        .map_err(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR)?;

    let events: Vec<String> = state.recent_events.lock().unwrap().iter().cloned().collect();
    Ok(Json(serde_json::json!({
        "alive_signals": alive.len(),
        "recent_runs": logs
            .iter()
            .map(|l| serde_json::json!({
                "id": l.id,
                "type": l.log_type,
                "automation": l.automation_hash,
                "at": l.created_at.to_rfc3339(),
            }))
            .collect::<Vec<_>>(),
        "recent_events": events,
    })))
}

#[derive(Deserialize)]
struct ChatRequest {
    prompt: String,
}

async fn chat(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<serde_json::Value>, axum::http::StatusCode> {
    let (log_id, transcript) = state
        .runtime
        .run_manual(&request.prompt)
        .await
        .map_err(|_| axum::http::StatusCode::INTERNAL_SERVER_ERROR)?;

    let reply = transcript
        .iter()
        .rev()
        .find(|m| m.role == hearth_core::Role::Assistant && !m.text().is_empty())
        .map(|m| m.text())
        .unwrap_or_default();

    Ok(Json(serde_json::json!({
        "log_id": log_id,
        "reply": reply,
    })))
}
