//! Persistence collaborator
//!
//! Stage transitions and final decisions are written out keyed by document
//! id. Writes are fire-and-forget: the engine spawns them and never waits
//! on or depends on read-back — a persistence outage slows nothing and
//! fails nothing, it only logs.

use crate::error::PipelineError;
use crate::fusion::FusionDecision;
use crate::organize::OrganizationResult;
use crate::workflow::state::Stage;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One stage-transition record for a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageUpdate {
    pub document_id: Uuid,
    pub file_name: String,
    pub stage: Stage,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PipelineError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<FusionDecision>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<OrganizationResult>,
}

impl StageUpdate {
    pub fn transition(document_id: Uuid, file_name: &str, stage: Stage) -> Self {
        Self {
            document_id,
            file_name: file_name.to_string(),
            stage,
            at: Utc::now(),
            error: None,
            decision: None,
            organization: None,
        }
    }

    pub fn with_error(mut self, error: PipelineError) -> Self {
        self.error = Some(error);
        self
    }

    pub fn with_decision(mut self, decision: FusionDecision) -> Self {
        self.decision = Some(decision);
        self
    }

    pub fn with_organization(mut self, organization: OrganizationResult) -> Self {
        self.organization = Some(organization);
        self
    }
}

/// Write acceptance is all the core cares about; implementations log their
/// own failures and never propagate them.
#[async_trait]
pub trait StateSink: Send + Sync {
    async fn record(&self, update: StageUpdate);
}

/// Sink used when persistence is not configured.
pub struct NullSink;

#[async_trait]
impl StateSink for NullSink {
    async fn record(&self, _update: StageUpdate) {}
}

/// HTTP sink posting transitions to the persistence collaborator.
pub struct HttpStateSink {
    client: reqwest::Client,
    base_url: String,
}

impl HttpStateSink {
    pub fn new(settings: crate::config::PersistSettings) -> Option<Self> {
        if settings.base_url.trim().is_empty() {
            return None;
        }

        let client = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .ok()?;

        Some(Self {
            client,
            base_url: settings.base_url,
        })
    }
}

#[async_trait]
impl StateSink for HttpStateSink {
    async fn record(&self, update: StageUpdate) {
        let url = format!(
            "{}/documents/{}/transitions",
            self.base_url, update.document_id
        );

        match self.client.post(&url).json(&update).send().await {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                tracing::warn!(
                    "[Persist] Write for {} rejected: {}",
                    update.document_id,
                    response.status()
                );
            }
            Err(e) => {
                tracing::warn!("[Persist] Write for {} failed: {}", update.document_id, e);
            }
        }
    }
}

/// Collecting sink for tests.
#[cfg(test)]
pub struct MemorySink {
    pub updates: std::sync::Mutex<Vec<StageUpdate>>,
}

#[cfg(test)]
impl MemorySink {
    pub fn new() -> Self {
        Self {
            updates: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.updates.lock().unwrap().iter().map(|u| u.stage).collect()
    }
}

#[cfg(test)]
#[async_trait]
impl StateSink for MemorySink {
    async fn record(&self, update: StageUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}
