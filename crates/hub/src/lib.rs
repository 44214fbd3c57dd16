//! REST + WebSocket client for the home-automation hub.
//!
//! Implements [`hearth_core::HubClient`]: snapshot reads over REST, the one
//! write operation, and a `state_changed` event stream over the hub's
//! WebSocket API with auth handshake and automatic resubscribe.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use hearth_core::error::HubError;
use hearth_core::hub::{
    EntityState, HubClient, ServiceCall, ServiceCatalog, ServiceMeta, StateChange,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info, warn};

/// REST/WebSocket hub client.
pub struct RestHub {
    base_url: String,
    token: String,
    client: reqwest::Client,
    events_tx: broadcast::Sender<StateChange>,
}

impl RestHub {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, HubError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| HubError::Unreachable(e.to_string()))?;
        let (events_tx, _) = broadcast::channel(256);

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client,
            events_tx,
        })
    }

    /// Spawn the WebSocket event pump. Reconnects with backoff until the
    /// returned handle is aborted.
    pub fn start_events(&self) -> tokio::task::JoinHandle<()> {
        let ws_url = format!(
            "{}/api/websocket",
            self.base_url
                .replacen("http://", "ws://", 1)
                .replacen("https://", "wss://", 1)
        );
        let token = self.token.clone();
        let tx = self.events_tx.clone();

        tokio::spawn(async move {
            let mut backoff = Duration::from_secs(1);
            loop {
                match Self::pump_events(&ws_url, &token, &tx).await {
                    Ok(()) => backoff = Duration::from_secs(1),
                    Err(e) => {
                        warn!(error = %e, "hub event stream dropped, reconnecting");
                    }
                }
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(Duration::from_secs(60));
            }
        })
    }

    async fn pump_events(
        ws_url: &str,
        token: &str,
        tx: &broadcast::Sender<StateChange>,
    ) -> Result<(), HubError> {
        let (mut socket, _) = tokio_tungstenite::connect_async(ws_url)
            .await
            .map_err(|e| HubError::Unreachable(e.to_string()))?;

        // auth handshake: auth_required → auth → auth_ok
        let mut authed = false;
        let mut subscribed = false;
        let mut next_id = 1u64;

        while let Some(frame) = socket.next().await {
            let frame = frame.map_err(|e| HubError::EventStreamClosed(e.to_string()))?;
            let WsMessage::Text(text) = frame else {
                continue;
            };
            let Ok(msg) = serde_json::from_str::<serde_json::Value>(&text) else {
                continue;
            };

            match msg["type"].as_str().unwrap_or("") {
                "auth_required" => {
                    let auth = serde_json::json!({"type": "auth", "access_token": token});
                    socket
                        .send(WsMessage::Text(auth.to_string()))
                        .await
                        .map_err(|e| HubError::EventStreamClosed(e.to_string()))?;
                }
                "auth_invalid" => {
                    return Err(HubError::AuthenticationFailed(
                        msg["message"].as_str().unwrap_or("auth rejected").to_string(),
                    ));
                }
                "auth_ok" if !authed => {
                    authed = true;
                    let subscribe = serde_json::json!({
                        "id": next_id,
                        "type": "subscribe_events",
                        "event_type": "state_changed",
                    });
                    next_id += 1;
                    socket
                        .send(WsMessage::Text(subscribe.to_string()))
                        .await
                        .map_err(|e| HubError::EventStreamClosed(e.to_string()))?;
                }
                "result" if authed && !subscribed => {
                    subscribed = msg["success"].as_bool().unwrap_or(false);
                    if subscribed {
                        info!("subscribed to hub state_changed events");
                    }
                }
                "event" => {
                    if let Some(change) = Self::parse_state_change(&msg) {
                        // no subscribers is fine, the engine may not be up yet
                        let _ = tx.send(change);
                    }
                }
                _ => {}
            }
        }

        Err(HubError::EventStreamClosed("socket closed".into()))
    }

    fn parse_state_change(msg: &serde_json::Value) -> Option<StateChange> {
        let event = &msg["event"];
        if event["event_type"].as_str() != Some("state_changed") {
            return None;
        }
        let data = &event["data"];
        let entity_id = data["entity_id"].as_str()?.to_string();
        let new_state = data["new_state"]["state"].as_str()?.to_string();
        let old_state = data["old_state"]["state"].as_str().map(String::from);
        Some(StateChange {
            entity_id,
            new_state,
            old_state,
            changed_at: chrono::Utc::now(),
        })
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, HubError> {
        let response = self
            .client
            .get(format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| HubError::Unreachable(e.to_string()))?;
        Self::check_status(response).await
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, HubError> {
        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(HubError::AuthenticationFailed("invalid hub token".into()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HubError::ApiError {
                status_code: status.as_u16(),
                message: body,
            });
        }
        Ok(response)
    }
}

/// The `/api/services` endpoint returns a list of per-domain objects.
#[derive(Deserialize)]
struct DomainServices {
    domain: String,
    services: HashMap<String, ServiceMeta>,
}

#[async_trait]
impl HubClient for RestHub {
    async fn fetch_states(&self) -> Result<Vec<EntityState>, HubError> {
        let response = self.get("/api/states").await?;
        let states: Vec<EntityState> = response
            .json()
            .await
            .map_err(|e| HubError::ApiError {
                status_code: 200,
                message: format!("unparseable states payload: {e}"),
            })?;
        debug!(count = states.len(), "fetched entity states");
        Ok(states)
    }

    async fn fetch_services(&self) -> Result<ServiceCatalog, HubError> {
        let response = self.get("/api/services").await?;
        let domains: Vec<DomainServices> =
            response.json().await.map_err(|e| HubError::ApiError {
                status_code: 200,
                message: format!("unparseable services payload: {e}"),
            })?;
        Ok(domains
            .into_iter()
            .map(|d| (d.domain, d.services))
            .collect())
    }

    async fn call_service(
        &self,
        call: &ServiceCall,
    ) -> Result<Option<serde_json::Value>, HubError> {
        let url = format!(
            "{}/api/services/{}/{}",
            self.base_url, call.domain, call.service
        );

        let mut body = match &call.data {
            Some(serde_json::Value::Object(map)) => map.clone(),
            _ => serde_json::Map::new(),
        };
        body.insert(
            "entity_id".into(),
            serde_json::json!(call.target.entity_id),
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .json(&serde_json::Value::Object(body))
            .send()
            .await
            .map_err(|e| HubError::Unreachable(e.to_string()))?;
        let response = Self::check_status(response).await?;

        let payload: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
        debug!(domain = %call.domain, service = %call.service, "service call dispatched");
        Ok(if payload.is_null() { None } else { Some(payload) })
    }

    fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_state_changed_event() {
        let msg = serde_json::json!({
            "type": "event",
            "event": {
                "event_type": "state_changed",
                "data": {
                    "entity_id": "binary_sensor.front_door",
                    "old_state": {"state": "closed"},
                    "new_state": {"state": "open"}
                }
            }
        });
        let change = RestHub::parse_state_change(&msg).unwrap();
        assert_eq!(change.entity_id, "binary_sensor.front_door");
        assert_eq!(change.new_state, "open");
        assert_eq!(change.old_state.as_deref(), Some("closed"));
    }

    #[test]
    fn ignores_other_event_types() {
        let msg = serde_json::json!({
            "type": "event",
            "event": {"event_type": "call_service", "data": {}}
        });
        assert!(RestHub::parse_state_change(&msg).is_none());
    }

    #[test]
    fn ignores_events_without_new_state() {
        let msg = serde_json::json!({
            "type": "event",
            "event": {
                "event_type": "state_changed",
                "data": {"entity_id": "light.gone", "new_state": null}
            }
        });
        assert!(RestHub::parse_state_change(&msg).is_none());
    }

    #[test]
    fn base_url_slash_trimmed() {
        let hub = RestHub::new("http://hub.local:8123/", "token").unwrap();
        assert_eq!(hub.base_url, "http://hub.local:8123");
    }
}
