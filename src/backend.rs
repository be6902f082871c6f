use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AgentError;

/// An active quest as reported by the backend, fed to the quest-analysis
/// model as context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveQuest {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Payload for quest creation, with the requesting user merged in.
#[derive(Debug, Clone, Serialize)]
pub struct NewQuest {
    pub user_id: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xp_reward: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,
}

/// Client for the CRUD backend that owns all durable game state.
///
/// Connection failures and non-2xx responses both fold into
/// `BackendCallFailed`; callers decide whether that is surfaced or
/// suppressed.
#[derive(Clone)]
pub struct BackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { base_url, client }
    }

    pub async fn update_character_xp(
        &self,
        user_id: &str,
        xp_amount: i64,
    ) -> Result<(), AgentError> {
        let url = format!("{}/users/{}/character/xp", self.base_url, user_id);
        let response = self
            .client
            .post(&url)
            .json(&json!({ "xp_amount": xp_amount }))
            .send()
            .await
            .map_err(|err| connection_failed(&url, err))?;
        check_status(&url, response).await?;
        Ok(())
    }

    pub async fn active_quests(&self, user_id: &str) -> Result<Vec<ActiveQuest>, AgentError> {
        let url = format!("{}/quests/user/{}", self.base_url, user_id);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|err| connection_failed(&url, err))?;
        let response = check_status(&url, response).await?;
        response.json().await.map_err(|err| {
            AgentError::BackendCallFailed(format!("invalid quest list from {}: {}", url, err))
        })
    }

    pub async fn create_quest(&self, quest: &NewQuest) -> Result<(), AgentError> {
        let url = format!("{}/quests", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(quest)
            .send()
            .await
            .map_err(|err| connection_failed(&url, err))?;
        check_status(&url, response).await?;
        Ok(())
    }

    pub async fn update_quest(
        &self,
        quest_id: &str,
        description: Option<&str>,
    ) -> Result<(), AgentError> {
        let url = format!("{}/quests/{}", self.base_url, quest_id);
        let response = self
            .client
            .put(&url)
            .json(&json!({ "description": description }))
            .send()
            .await
            .map_err(|err| connection_failed(&url, err))?;
        check_status(&url, response).await?;
        Ok(())
    }

    pub async fn complete_quest(&self, quest_id: &str) -> Result<(), AgentError> {
        let url = format!("{}/quests/{}/complete", self.base_url, quest_id);
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|err| connection_failed(&url, err))?;
        check_status(&url, response).await?;
        Ok(())
    }
}

fn connection_failed(url: &str, err: reqwest::Error) -> AgentError {
    AgentError::BackendCallFailed(format!("request to {} failed: {}", url, err))
}

async fn check_status(
    url: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, AgentError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "unable to read body".to_string());
    Err(AgentError::BackendCallFailed(format!(
        "{} returned {}: {}",
        url, status, body
    )))
}
