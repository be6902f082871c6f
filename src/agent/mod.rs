use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::backend::BackendClient;
use crate::config::AgentConfig;
use crate::dispatch::ActionDispatcher;
use crate::error::{AgentError, ParseErrorKind};
use crate::http_client::build_http_client;
use crate::image_client::ImageClient;
use crate::invoker::{
    AgentPurpose, InvokeModel, LlmInvoker, ModelInvocationConfig, RawModelOutput,
};
use crate::prompts::PromptTemplateStore;
use crate::resolver::{self, ResolvedAction};

/// Boundary result of an XP analysis request.
#[derive(Debug, Serialize)]
pub struct XpAnalysis {
    pub status: &'static str,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xp_awarded: Option<i64>,
}

/// Boundary result of a quest analysis request.
#[derive(Debug, Serialize)]
pub struct QuestAnalysis {
    pub status: &'static str,
    pub action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quest_id: Option<String>,
}

/// Orchestrates the pipeline for every purpose: render prompt, invoke the
/// model, resolve the output, dispatch the action. Read-only after
/// construction; safe to share across any number of in-flight requests.
pub struct AgentService {
    templates: PromptTemplateStore,
    invokers: HashMap<AgentPurpose, Arc<dyn InvokeModel>>,
    dispatcher: ActionDispatcher,
    image: ImageClient,
}

impl AgentService {
    pub fn new(config: &AgentConfig) -> Self {
        let client = build_http_client(config.request_timeout_secs.map(Duration::from_secs));

        let mut invokers: HashMap<AgentPurpose, Arc<dyn InvokeModel>> = HashMap::new();
        for purpose in AgentPurpose::ALL {
            let model = match purpose {
                AgentPurpose::XpAnalysis => config.xp_model.clone(),
                AgentPurpose::QuestAnalysis => config.quest_model.clone(),
                AgentPurpose::QuestDetailGeneration => config.detail_model.clone(),
                AgentPurpose::AvatarGeneration => config.avatar_model.clone(),
            };
            let invoker = LlmInvoker::new(
                ModelInvocationConfig::for_purpose(purpose, model),
                config.llm_api_url.clone(),
                config.llm_api_key.clone(),
                client.clone(),
            );
            if !invoker.is_initialized() {
                tracing::error!(
                    "model invoker for {} has no credential; its requests will fail",
                    purpose
                );
            }
            invokers.insert(purpose, Arc::new(invoker));
        }

        Self {
            templates: PromptTemplateStore::new(&config.prompts_dir),
            invokers,
            dispatcher: ActionDispatcher::new(BackendClient::new(
                config.backend_api_url.clone(),
                client.clone(),
            )),
            image: ImageClient::new(config.image_api_url(), config.image_model.clone(), client),
        }
    }

    #[cfg(test)]
    pub fn with_parts(
        templates: PromptTemplateStore,
        invokers: HashMap<AgentPurpose, Arc<dyn InvokeModel>>,
        dispatcher: ActionDispatcher,
        image: ImageClient,
    ) -> Self {
        Self {
            templates,
            invokers,
            dispatcher,
            image,
        }
    }

    fn invoker(&self, purpose: AgentPurpose) -> Result<&Arc<dyn InvokeModel>, AgentError> {
        self.invokers
            .get(&purpose)
            .ok_or(AgentError::ModelUnavailable(purpose))
    }

    /// Analyze a journal paragraph for XP, dispatching any award.
    pub async fn analyze_text_for_xp(
        &self,
        user_id: &str,
        text: &str,
    ) -> Result<XpAnalysis, AgentError> {
        let request_id = Uuid::new_v4();
        let prompt = self
            .templates
            .render(AgentPurpose::XpAnalysis, &json!({ "paragraph": text }))?;

        let invoker = self.invoker(AgentPurpose::XpAnalysis)?;
        let raw = invoker.invoke(&prompt).await?;
        let action = resolver::resolve(invoker.output_mode(), &raw);

        match action {
            ResolvedAction::Unresolved { reason } => Err(AgentError::Unresolved(reason)),
            ResolvedAction::AwardXp { xp_amount } => {
                let outcome = self
                    .dispatcher
                    .dispatch(&ResolvedAction::AwardXp { xp_amount }, user_id)
                    .await;
                tracing::info!(%request_id, %user_id, xp_amount, ?outcome, "xp analysis dispatched");
                Ok(XpAnalysis {
                    status: "success",
                    action: "AWARD_XP",
                    xp_awarded: Some(xp_amount),
                })
            }
            _ => {
                tracing::info!(%request_id, %user_id, "xp analysis recognized no action");
                Ok(XpAnalysis {
                    status: "no_op",
                    action: "NO_ACTION_RECOGNIZED",
                    xp_awarded: None,
                })
            }
        }
    }

    /// Analyze a journal entry for quest mutations. The user's active
    /// quests are fetched first so the model sees current state; unlike
    /// dispatch failures, a failure here is surfaced to the caller.
    pub async fn analyze_text_for_quests(
        &self,
        user_id: &str,
        text: &str,
    ) -> Result<QuestAnalysis, AgentError> {
        let request_id = Uuid::new_v4();
        let active_quests = self.dispatcher.backend().active_quests(user_id).await?;
        let context = json!({
            "entry_text": text,
            "active_quests": active_quests,
        });
        let prompt = self.templates.render(AgentPurpose::QuestAnalysis, &context)?;

        let invoker = self.invoker(AgentPurpose::QuestAnalysis)?;
        let raw = invoker.invoke(&prompt).await?;
        let action = resolver::resolve(invoker.output_mode(), &raw);

        if let ResolvedAction::Unresolved { reason } = action {
            return Err(AgentError::Unresolved(reason));
        }

        let outcome = self.dispatcher.dispatch(&action, user_id).await;
        tracing::info!(%request_id, %user_id, ?outcome, "quest analysis dispatched");

        let (status, name, quest_id) = match &action {
            ResolvedAction::CreateQuest { .. } => ("success", "CREATE", None),
            ResolvedAction::UpdateQuest { quest_id, .. } => {
                ("success", "UPDATE", Some(quest_id.clone()))
            }
            ResolvedAction::CompleteQuest { quest_id } => {
                ("success", "COMPLETE", Some(quest_id.clone()))
            }
            ResolvedAction::AwardXp { .. } => ("success", "AWARD_XP", None),
            _ => ("no_op", "NO_ACTION", None),
        };

        Ok(QuestAnalysis {
            status,
            action: name,
            quest_id,
        })
    }

    /// Generate rich lore and rewards for a quest. Generative only: no
    /// action resolution, no dispatch.
    pub async fn generate_quest_details(
        &self,
        title: &str,
        description: &str,
    ) -> Result<Value, AgentError> {
        let prompt = self.templates.render(
            AgentPurpose::QuestDetailGeneration,
            &json!({ "title": title, "description": description }),
        )?;

        let invoker = self.invoker(AgentPurpose::QuestDetailGeneration)?;
        let raw = invoker.invoke(&prompt).await?;
        let text = match raw {
            RawModelOutput::Text(text) => text,
            RawModelOutput::ToolCall { name, .. } => {
                tracing::warn!(tool = %name, "detail generation returned a tool call");
                return Err(AgentError::Unresolved(ParseErrorKind::MalformedJson));
            }
        };

        serde_json::from_str(resolver::strip_code_fence(&text)).map_err(|err| {
            tracing::warn!(error = %err, raw = %text, "quest details were not valid JSON");
            AgentError::Unresolved(ParseErrorKind::MalformedJson)
        })
    }

    /// Generate an avatar image: the model refines the user's prompt, then
    /// the image API renders it. Generative only; no dispatch.
    pub async fn generate_avatar(&self, prompt: &str) -> Result<String, AgentError> {
        let rendered = self
            .templates
            .render(AgentPurpose::AvatarGeneration, &json!({ "prompt": prompt }))?;

        let invoker = self.invoker(AgentPurpose::AvatarGeneration)?;
        let refined = match invoker.invoke(&rendered).await? {
            RawModelOutput::Text(text) if !text.trim().is_empty() => text.trim().to_string(),
            _ => {
                tracing::warn!("avatar prompt refinement returned nothing usable; using raw prompt");
                prompt.to_string()
            }
        };

        self.image.generate(&refined).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::invoker::OutputMode;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    struct FakeInvoker {
        mode: OutputMode,
        output: RawModelOutput,
    }

    #[async_trait]
    impl InvokeModel for FakeInvoker {
        fn output_mode(&self) -> OutputMode {
            self.mode
        }

        async fn invoke(&self, _prompt: &str) -> Result<RawModelOutput, AgentError> {
            Ok(self.output.clone())
        }
    }

    fn templates() -> PromptTemplateStore {
        let dir = tempfile::tempdir().unwrap();
        for purpose in AgentPurpose::ALL {
            std::fs::write(dir.path().join(purpose.template_name()), "prompt body").unwrap();
        }
        PromptTemplateStore::new(dir.path())
    }

    fn service(backend_url: &str, purpose: AgentPurpose, mode: OutputMode, output: RawModelOutput) -> AgentService {
        let client = reqwest::Client::new();
        let mut invokers: HashMap<AgentPurpose, Arc<dyn InvokeModel>> = HashMap::new();
        invokers.insert(purpose, Arc::new(FakeInvoker { mode, output }));
        AgentService::with_parts(
            templates(),
            invokers,
            ActionDispatcher::new(BackendClient::new(backend_url, client.clone())),
            ImageClient::new(backend_url, "sd-turbo", client),
        )
    }

    fn tool_call(xp: serde_json::Value) -> RawModelOutput {
        let mut args = serde_json::Map::new();
        args.insert("xp_amount".to_string(), xp);
        RawModelOutput::ToolCall {
            name: "update_xp".to_string(),
            args,
        }
    }

    #[tokio::test]
    async fn xp_award_reports_success_and_calls_backend_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/u1/character/xp"))
            .and(body_json(serde_json::json!({ "xp_amount": 75 })))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let svc = service(
            &server.uri(),
            AgentPurpose::XpAnalysis,
            OutputMode::ToolCall,
            tool_call(serde_json::json!(75)),
        );
        let result = svc.analyze_text_for_xp("u1", "finished my thesis draft").await.unwrap();
        assert_eq!(result.status, "success");
        assert_eq!(result.action, "AWARD_XP");
        assert_eq!(result.xp_awarded, Some(75));
    }

    #[tokio::test]
    async fn backend_failure_is_invisible_to_the_caller() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/users/u1/character/xp"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let svc = service(
            &server.uri(),
            AgentPurpose::XpAnalysis,
            OutputMode::ToolCall,
            tool_call(serde_json::json!(50)),
        );
        let result = svc.analyze_text_for_xp("u1", "wrote a lot today").await.unwrap();
        assert_eq!(result.status, "success");
        assert_eq!(result.action, "AWARD_XP");
        assert_eq!(result.xp_awarded, Some(50));
    }

    #[tokio::test]
    async fn invalid_tool_args_surface_as_unresolved() {
        let server = MockServer::start().await;
        let svc = service(
            &server.uri(),
            AgentPurpose::XpAnalysis,
            OutputMode::ToolCall,
            tool_call(serde_json::json!("50")),
        );
        let err = svc.analyze_text_for_xp("u1", "text").await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Unresolved(ParseErrorKind::InvalidToolArgs)
        ));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn quest_analysis_fetches_active_quests_then_dispatches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quests/user/u2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                { "id": "q-1", "title": "Run", "description": "Run 5k" }
            ])))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/quests/q-1/complete"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let output = RawModelOutput::Text(
            serde_json::json!({ "action": "COMPLETE", "data": { "questId": "q-1" } }).to_string(),
        );
        let svc = service(
            &server.uri(),
            AgentPurpose::QuestAnalysis,
            OutputMode::JsonMode,
            output,
        );
        let result = svc.analyze_text_for_quests("u2", "I ran 5k today!").await.unwrap();
        assert_eq!(result.status, "success");
        assert_eq!(result.action, "COMPLETE");
        assert_eq!(result.quest_id.as_deref(), Some("q-1"));
    }

    #[tokio::test]
    async fn quest_analysis_surfaces_active_quest_fetch_failure() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quests/user/u2"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let svc = service(
            &server.uri(),
            AgentPurpose::QuestAnalysis,
            OutputMode::JsonMode,
            RawModelOutput::Text("{}".to_string()),
        );
        let err = svc.analyze_text_for_quests("u2", "entry").await.unwrap_err();
        assert!(matches!(err, AgentError::BackendCallFailed(_)));
    }

    #[tokio::test]
    async fn prose_from_quest_model_is_an_error_not_a_no_op() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quests/user/u2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let svc = service(
            &server.uri(),
            AgentPurpose::QuestAnalysis,
            OutputMode::JsonMode,
            RawModelOutput::Text("I think you did great!".to_string()),
        );
        let err = svc.analyze_text_for_quests("u2", "entry").await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::Unresolved(ParseErrorKind::MalformedJson)
        ));
    }

    #[tokio::test]
    async fn update_without_quest_id_is_a_no_op_with_no_mutation() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/quests/user/u2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let output = RawModelOutput::Text(
            serde_json::json!({ "action": "UPDATE", "data": { "description": "x" } }).to_string(),
        );
        let svc = service(
            &server.uri(),
            AgentPurpose::QuestAnalysis,
            OutputMode::JsonMode,
            output,
        );
        let result = svc.analyze_text_for_quests("u2", "entry").await.unwrap();
        assert_eq!(result.status, "no_op");
        assert_eq!(result.action, "NO_ACTION");
        // Only the active-quests fetch hit the backend.
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn quest_details_strip_fences_and_parse() {
        let server = MockServer::start().await;
        let output = RawModelOutput::Text(
            "```json\n{\"lore\":\"An ancient vow\",\"rewards\":[\"title\"]}\n```".to_string(),
        );
        let svc = service(
            &server.uri(),
            AgentPurpose::QuestDetailGeneration,
            OutputMode::JsonMode,
            output,
        );
        let details = svc.generate_quest_details("Run", "Run 5k").await.unwrap();
        assert_eq!(details["lore"], "An ancient vow");
    }

    #[tokio::test]
    async fn missing_invoker_is_model_unavailable() {
        let server = MockServer::start().await;
        let svc = service(
            &server.uri(),
            AgentPurpose::QuestAnalysis,
            OutputMode::JsonMode,
            RawModelOutput::Text("{}".to_string()),
        );
        // No XP invoker was registered in this service instance.
        let err = svc.analyze_text_for_xp("u1", "text").await.unwrap_err();
        assert!(matches!(
            err,
            AgentError::ModelUnavailable(AgentPurpose::XpAnalysis)
        ));
    }
}
