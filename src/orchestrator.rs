use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::engine::EngineError;
use crate::model::*;

/// Starts a fresh workflow instance for an entity; the instance will announce
/// itself again at the entry stage at `arrival`.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    async fn spawn_instance(
        &self,
        entity: EntityId,
        arrival: Minutes,
        metadata: &Metadata,
    ) -> Result<String, EngineError>;
}

/// Orchestration engine reached over its HTTP "start instance" endpoint.
pub struct HttpOrchestrator {
    client: reqwest::Client,
    start_url: String,
    process_url: String,
}

#[derive(Debug, Deserialize)]
struct StartResponse {
    #[serde(rename = "CPEE-INSTANCE")]
    instance: serde_json::Value,
}

impl HttpOrchestrator {
    pub fn new(
        start_url: impl Into<String>,
        process_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, EngineError> {
        let start_url = start_url.into();
        if start_url.trim().is_empty() {
            return Err(EngineError::Orchestrator("start url must not be empty".into()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EngineError::Orchestrator(format!("http client build failed: {e}")))?;
        Ok(Self {
            client,
            start_url,
            process_url: process_url.into(),
        })
    }
}

/// The `init` document handed to the new instance.
pub fn init_document(entity: EntityId, arrival: Minutes, metadata: &Metadata) -> serde_json::Value {
    let mut init = serde_json::json!({
        "arrival_time": arrival.to_string(),
        "patient_type": metadata.patient_type,
        "patient_id": entity.to_string(),
        "log": "Replanned_",
    });
    if let Some(obj) = init.as_object_mut() {
        for (k, v) in &metadata.extra {
            obj.entry(k.clone())
                .or_insert_with(|| serde_json::Value::String(v.clone()));
        }
    }
    init
}

#[async_trait]
impl Orchestrator for HttpOrchestrator {
    async fn spawn_instance(
        &self,
        entity: EntityId,
        arrival: Minutes,
        metadata: &Metadata,
    ) -> Result<String, EngineError> {
        let init = init_document(entity, arrival, metadata).to_string();
        let form = [
            ("behavior", "fork_running"),
            ("url", self.process_url.as_str()),
            ("init", init.as_str()),
        ];
        let response = self
            .client
            .post(&self.start_url)
            .form(&form)
            .send()
            .await
            .map_err(|e| EngineError::Orchestrator(format!("start request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(EngineError::Orchestrator(format!(
                "start request returned status {}",
                response.status()
            )));
        }
        let body: StartResponse = response
            .json()
            .await
            .map_err(|e| EngineError::Orchestrator(format!("start response decode failed: {e}")))?;
        Ok(match body.instance {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })
    }
}
