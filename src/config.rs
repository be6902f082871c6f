use std::env;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Service configuration: loaded from `agent_config.toml` next to the
/// executable, falling back to environment variables with local-development
/// defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Address the HTTP service binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Base URL of the CRUD backend that owns users, characters and quests.
    #[serde(default = "default_backend_url")]
    pub backend_api_url: String,

    /// OpenAI-compatible model API (Ollama, LM Studio, vLLM, hosted, etc.)
    #[serde(default = "default_llm_url")]
    pub llm_api_url: String,
    /// Model credential. When unset the service still starts; analysis
    /// requests fail lazily with a service-unavailable error.
    #[serde(default)]
    pub llm_api_key: Option<String>,

    // Per-purpose model identifiers
    #[serde(default = "default_analysis_model")]
    pub xp_model: String,
    #[serde(default = "default_analysis_model")]
    pub quest_model: String,
    #[serde(default = "default_analysis_model")]
    pub detail_model: String,
    #[serde(default = "default_avatar_model")]
    pub avatar_model: String,

    /// Image generation API for avatars; defaults to the model API host.
    #[serde(default)]
    pub image_api_url: Option<String>,
    #[serde(default = "default_image_model")]
    pub image_model: String,

    /// Directory holding one prompt template file per purpose.
    #[serde(default = "default_prompts_dir")]
    pub prompts_dir: String,

    /// Optional outbound request timeout in seconds. Absent by default:
    /// the original service ran with unbounded upstream latency.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8001".to_string()
}

fn default_backend_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_llm_url() -> String {
    "http://localhost:11434/v1".to_string()
}

fn default_analysis_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_avatar_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_image_model() -> String {
    "sd-turbo".to_string()
}

fn default_prompts_dir() -> String {
    "prompts".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            backend_api_url: default_backend_url(),
            llm_api_url: default_llm_url(),
            llm_api_key: None,
            xp_model: default_analysis_model(),
            quest_model: default_analysis_model(),
            detail_model: default_analysis_model(),
            avatar_model: default_avatar_model(),
            image_api_url: None,
            image_model: default_image_model(),
            prompts_dir: default_prompts_dir(),
            request_timeout_secs: None,
        }
    }
}

impl AgentConfig {
    fn get_base_dir() -> PathBuf {
        match env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    pub fn config_path() -> PathBuf {
        Self::get_base_dir().join("agent_config.toml")
    }

    /// Load config from agent_config.toml (next to executable), falling
    /// back to environment variables.
    pub fn load() -> Self {
        let path = Self::config_path();

        if let Ok(contents) = fs::read_to_string(&path) {
            match toml::from_str::<AgentConfig>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    return config;
                }
                Err(e) => {
                    tracing::error!("Failed to parse {:?}: {}", path, e);
                }
            }
        }

        tracing::warn!("No config file found, using defaults + env vars");
        Self::from_env()
    }

    /// Build configuration from environment variables over defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = env::var("AGENT_BIND_ADDR") {
            config.bind_addr = addr;
        }

        if let Ok(url) = env::var("BACKEND_API_URL") {
            config.backend_api_url = url;
        }

        if let Ok(url) = env::var("LLM_API_URL") {
            config.llm_api_url = url;
        }

        // GEMINI_API_KEY is the name the rest of the deployment uses;
        // LLM_API_KEY works for other providers.
        if let Ok(key) = env::var("GEMINI_API_KEY").or_else(|_| env::var("LLM_API_KEY")) {
            if !key.trim().is_empty() {
                config.llm_api_key = Some(key);
            }
        }

        if let Ok(model) = env::var("AGENT_XP_MODEL") {
            config.xp_model = model;
        }
        if let Ok(model) = env::var("AGENT_QUEST_MODEL") {
            config.quest_model = model;
        }
        if let Ok(model) = env::var("AGENT_DETAIL_MODEL") {
            config.detail_model = model;
        }
        if let Ok(model) = env::var("AGENT_AVATAR_MODEL") {
            config.avatar_model = model;
        }

        if let Ok(url) = env::var("IMAGE_API_URL") {
            if !url.trim().is_empty() {
                config.image_api_url = Some(url);
            }
        }
        if let Ok(model) = env::var("IMAGE_MODEL") {
            config.image_model = model;
        }

        if let Ok(dir) = env::var("AGENT_PROMPTS_DIR") {
            if !dir.trim().is_empty() {
                config.prompts_dir = dir;
            }
        }

        if let Ok(timeout) = env::var("AGENT_REQUEST_TIMEOUT_SECS") {
            if let Ok(seconds) = timeout.parse() {
                config.request_timeout_secs = Some(seconds);
            }
        }

        config
    }

    /// The image API host, defaulting to the model API host.
    pub fn image_api_url(&self) -> &str {
        self.image_api_url.as_deref().unwrap_or(&self.llm_api_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_yields_defaults() {
        let config: AgentConfig = toml::from_str("").unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8001");
        assert_eq!(config.backend_api_url, "http://localhost:8080");
        assert!(config.llm_api_key.is_none());
        assert!(config.request_timeout_secs.is_none());
        assert_eq!(config.image_api_url(), config.llm_api_url);
    }

    #[test]
    fn partial_toml_overrides_only_named_fields() {
        let config: AgentConfig = toml::from_str(
            r#"
            backend_api_url = "http://backend:9000"
            llm_api_key = "secret"
            quest_model = "llama3.2"
            "#,
        )
        .unwrap();
        assert_eq!(config.backend_api_url, "http://backend:9000");
        assert_eq!(config.llm_api_key.as_deref(), Some("secret"));
        assert_eq!(config.quest_model, "llama3.2");
        assert_eq!(config.xp_model, "gemini-1.5-flash");
    }
}
