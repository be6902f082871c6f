use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::agent::{AgentService, QuestAnalysis, XpAnalysis};
use crate::config::AgentConfig;
use crate::error::AgentError;

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Deserialize)]
struct UpdateCharacterRequest {
    paragraph: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct UpdateQuestsRequest {
    entry_text: String,
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct QuestDetailsRequest {
    title: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct GenerateAvatarRequest {
    prompt: String,
}

#[derive(Debug, Serialize)]
struct AvatarResponse {
    image_data: String,
}

pub async fn serve(config: &AgentConfig, agent: AgentService) -> Result<()> {
    let bind_addr = config
        .bind_addr
        .parse::<SocketAddr>()
        .with_context(|| format!("Invalid bind address '{}'", config.bind_addr))?;

    let app = router(Arc::new(agent));

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("Failed to bind agent service to {}", bind_addr))?;
    tracing::info!("Gamify agent service listening on http://{}", bind_addr);
    axum::serve(listener, app)
        .await
        .context("Agent service failed")?;
    Ok(())
}

fn router(state: Arc<AgentService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/agent/update-character", post(update_character))
        .route("/agent/update-quests", post(update_quests))
        .route("/agent/quest-details", post(quest_details))
        .route("/agent/generate-avatar", post(generate_avatar))
        .with_state(state)
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

async fn update_character(
    State(state): State<Arc<AgentService>>,
    Json(request): Json<UpdateCharacterRequest>,
) -> Result<Json<XpAnalysis>, (StatusCode, String)> {
    require_non_empty(&request.paragraph, "paragraph")?;
    state
        .analyze_text_for_xp(&request.user_id, &request.paragraph)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn update_quests(
    State(state): State<Arc<AgentService>>,
    Json(request): Json<UpdateQuestsRequest>,
) -> Result<Json<QuestAnalysis>, (StatusCode, String)> {
    require_non_empty(&request.entry_text, "entry_text")?;
    state
        .analyze_text_for_quests(&request.user_id, &request.entry_text)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn quest_details(
    State(state): State<Arc<AgentService>>,
    Json(request): Json<QuestDetailsRequest>,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    require_non_empty(&request.title, "title")?;
    state
        .generate_quest_details(&request.title, &request.description)
        .await
        .map(Json)
        .map_err(error_response)
}

async fn generate_avatar(
    State(state): State<Arc<AgentService>>,
    Json(request): Json<GenerateAvatarRequest>,
) -> Result<Json<AvatarResponse>, (StatusCode, String)> {
    require_non_empty(&request.prompt, "prompt")?;
    state
        .generate_avatar(&request.prompt)
        .await
        .map(|image_data| Json(AvatarResponse { image_data }))
        .map_err(error_response)
}

fn require_non_empty(value: &str, field: &str) -> Result<(), (StatusCode, String)> {
    if value.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("{} cannot be empty", field),
        ));
    }
    Ok(())
}

/// Map pipeline failures to differentiated responses instead of one
/// catch-all 500. Retryable configuration gaps are 503; a violated agent
/// contract is 500; a failed pre-prompt backend fetch is 502.
fn error_response(error: AgentError) -> (StatusCode, String) {
    let status = match &error {
        AgentError::TemplateNotFound(_) | AgentError::ModelUnavailable(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AgentError::BackendCallFailed(_) => StatusCode::BAD_GATEWAY,
        AgentError::UpstreamError(_) | AgentError::Unresolved(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    tracing::error!(%error, "agent request failed");
    (status, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseErrorKind;
    use crate::invoker::AgentPurpose;

    #[test]
    fn error_statuses_are_differentiated() {
        let (status, _) = error_response(AgentError::ModelUnavailable(AgentPurpose::XpAnalysis));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) =
            error_response(AgentError::TemplateNotFound(AgentPurpose::QuestAnalysis));
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        let (status, _) = error_response(AgentError::BackendCallFailed("boom".to_string()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, message) =
            error_response(AgentError::Unresolved(ParseErrorKind::MalformedJson));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(message.contains("not valid JSON"));
    }

    #[test]
    fn blank_input_is_rejected() {
        assert!(require_non_empty("  ", "paragraph").is_err());
        assert!(require_non_empty("went for a run", "paragraph").is_ok());
    }
}
