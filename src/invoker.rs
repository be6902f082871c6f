use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::error::AgentError;

/// The name of the single callable declared to the XP analysis model.
pub const UPDATE_XP_TOOL: &str = "update_xp";

/// Which prompt template and output contract an invocation uses.
/// Fixed at service startup; one invoker per purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentPurpose {
    XpAnalysis,
    QuestAnalysis,
    QuestDetailGeneration,
    AvatarGeneration,
}

impl AgentPurpose {
    pub const ALL: [AgentPurpose; 4] = [
        AgentPurpose::XpAnalysis,
        AgentPurpose::QuestAnalysis,
        AgentPurpose::QuestDetailGeneration,
        AgentPurpose::AvatarGeneration,
    ];

    /// Logical name of the prompt template file for this purpose.
    pub fn template_name(&self) -> &'static str {
        match self {
            AgentPurpose::XpAnalysis => "update_character_xp",
            AgentPurpose::QuestAnalysis => "update_quests",
            AgentPurpose::QuestDetailGeneration => "generate_quest_details",
            AgentPurpose::AvatarGeneration => "generate_avatar",
        }
    }
}

impl fmt::Display for AgentPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AgentPurpose::XpAnalysis => "xp_analysis",
            AgentPurpose::QuestAnalysis => "quest_analysis",
            AgentPurpose::QuestDetailGeneration => "quest_detail_generation",
            AgentPurpose::AvatarGeneration => "avatar_generation",
        };
        write!(f, "{}", name)
    }
}

/// Output contract declared to the model for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    FreeText,
    JsonMode,
    ToolCall,
}

/// Declaration of the one callable exposed in `ToolCall` mode.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: &'static str,
    pub description: &'static str,
    pub parameters: Value,
}

impl ToolSchema {
    pub fn update_xp() -> Self {
        Self {
            name: UPDATE_XP_TOOL,
            description:
                "Updates the character's experience points (XP) based on completed tasks.",
            parameters: json!({
                "type": "object",
                "properties": {
                    "xp_amount": { "type": "integer" }
                },
                "required": ["xp_amount"]
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}

/// Immutable per-purpose invocation configuration, created once at startup.
#[derive(Debug, Clone)]
pub struct ModelInvocationConfig {
    pub purpose: AgentPurpose,
    pub model: String,
    pub sampling: SamplingParams,
    pub output_mode: OutputMode,
    pub tool_schema: Option<ToolSchema>,
}

impl ModelInvocationConfig {
    pub fn for_purpose(purpose: AgentPurpose, model: String) -> Self {
        match purpose {
            AgentPurpose::XpAnalysis => Self {
                purpose,
                model,
                sampling: SamplingParams {
                    temperature: 1.0,
                    top_p: 0.95,
                    top_k: 64,
                    max_output_tokens: 8192,
                },
                output_mode: OutputMode::ToolCall,
                tool_schema: Some(ToolSchema::update_xp()),
            },
            AgentPurpose::QuestAnalysis | AgentPurpose::QuestDetailGeneration => Self {
                purpose,
                model,
                sampling: SamplingParams {
                    temperature: 0.9,
                    top_p: 1.0,
                    top_k: 1,
                    max_output_tokens: 2048,
                },
                output_mode: OutputMode::JsonMode,
                tool_schema: None,
            },
            AgentPurpose::AvatarGeneration => Self {
                purpose,
                model,
                sampling: SamplingParams {
                    temperature: 0.9,
                    top_p: 1.0,
                    top_k: 40,
                    max_output_tokens: 1024,
                },
                output_mode: OutputMode::FreeText,
                tool_schema: None,
            },
        }
    }
}

/// Raw output of one model invocation, before resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum RawModelOutput {
    Text(String),
    ToolCall {
        name: String,
        args: Map<String, Value>,
    },
}

/// The seam between the pipeline and the remote model, so tests can
/// substitute a scripted invoker.
#[async_trait]
pub trait InvokeModel: Send + Sync {
    fn output_mode(&self) -> OutputMode;
    async fn invoke(&self, prompt: &str) -> Result<RawModelOutput, AgentError>;
}

/// Invoker backed by an OpenAI-compatible chat-completions API.
///
/// Constructed without a credential it stays in an explicit uninitialized
/// state: the process keeps serving and each invocation fails with
/// `ModelUnavailable` instead of refusing to start.
pub struct LlmInvoker {
    config: ModelInvocationConfig,
    api_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Message {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing)]
    tool_calls: Vec<ToolCallPayload>,
}

#[derive(Debug, Serialize)]
struct ToolDefinition {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionDefinition,
}

#[derive(Debug, Serialize)]
struct FunctionDefinition {
    name: &'static str,
    description: &'static str,
    parameters: Value,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct ToolCallPayload {
    function: FunctionCallPayload,
}

#[derive(Debug, Clone, Deserialize)]
struct FunctionCallPayload {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

impl LlmInvoker {
    pub fn new(
        config: ModelInvocationConfig,
        api_url: String,
        api_key: Option<String>,
        client: reqwest::Client,
    ) -> Self {
        let api_key = api_key.filter(|key| !key.trim().is_empty());
        Self {
            config,
            api_url,
            api_key,
            client,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.api_key.is_some()
    }

    fn build_request(&self, prompt: &str) -> ChatCompletionRequest {
        let tools = self.config.tool_schema.as_ref().map(|schema| {
            vec![ToolDefinition {
                kind: "function",
                function: FunctionDefinition {
                    name: schema.name,
                    description: schema.description,
                    parameters: schema.parameters.clone(),
                },
            }]
        });
        let response_format = match self.config.output_mode {
            OutputMode::JsonMode => Some(ResponseFormat {
                kind: "json_object",
            }),
            _ => None,
        };

        ChatCompletionRequest {
            model: self.config.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: Some(prompt.to_string()),
                tool_calls: Vec::new(),
            }],
            temperature: self.config.sampling.temperature,
            top_p: self.config.sampling.top_p,
            top_k: self.config.sampling.top_k,
            max_tokens: self.config.sampling.max_output_tokens,
            tools,
            response_format,
        }
    }
}

#[async_trait]
impl InvokeModel for LlmInvoker {
    fn output_mode(&self) -> OutputMode {
        self.config.output_mode
    }

    async fn invoke(&self, prompt: &str) -> Result<RawModelOutput, AgentError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(AgentError::ModelUnavailable(self.config.purpose));
        };

        let url = format!("{}/chat/completions", self.api_url.trim_end_matches('/'));
        let request = self.build_request(prompt);

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&request)
            .send()
            .await
            .map_err(|err| AgentError::UpstreamError(format!("request to {} failed: {}", url, err)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read body".to_string());
            return Err(AgentError::UpstreamError(format!(
                "model API returned {}: {}",
                status, body
            )));
        }

        let completion: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|err| AgentError::UpstreamError(format!("invalid completion body: {}", err)))?;

        let message = completion
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message)
            .ok_or_else(|| AgentError::UpstreamError("completion had no choices".to_string()))?;

        if let Some(call) = message.tool_calls.into_iter().next() {
            // Arguments arrive as a JSON-encoded string; anything unparseable
            // becomes an empty arg map and fails type checks downstream.
            let args = serde_json::from_str::<Map<String, Value>>(&call.function.arguments)
                .unwrap_or_default();
            return Ok(RawModelOutput::ToolCall {
                name: call.function.name,
                args,
            });
        }

        Ok(RawModelOutput::Text(message.content.unwrap_or_default()))
    }
}
