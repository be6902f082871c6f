use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::AgentError;
use crate::invoker::AgentPurpose;

/// Read-only store of prompt templates, one file per purpose.
///
/// Templates are read once at construction. A missing file is not fatal to
/// the process; requests for that purpose fail with `TemplateNotFound`.
pub struct PromptTemplateStore {
    templates: HashMap<AgentPurpose, String>,
}

impl PromptTemplateStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir: PathBuf = dir.as_ref().to_path_buf();
        let mut templates = HashMap::new();
        for purpose in AgentPurpose::ALL {
            let path = dir.join(purpose.template_name());
            match fs::read_to_string(&path) {
                Ok(body) => {
                    templates.insert(purpose, body);
                }
                Err(err) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %err,
                        "prompt template for {} not loaded; requests will fail",
                        purpose
                    );
                }
            }
        }
        Self { templates }
    }

    /// Render the final prompt: template body, then the context payload
    /// serialized with stable key ordering.
    pub fn render(&self, purpose: AgentPurpose, context: &Value) -> Result<String, AgentError> {
        let body = self
            .templates
            .get(&purpose)
            .ok_or(AgentError::TemplateNotFound(purpose))?;
        let serialized =
            serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string());
        Ok(format!("{}\n\nInput:\n{}", body.trim_end(), serialized))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store_with(files: &[(&str, &str)]) -> PromptTemplateStore {
        let dir = tempfile::tempdir().unwrap();
        for (name, body) in files {
            fs::write(dir.path().join(name), body).unwrap();
        }
        PromptTemplateStore::new(dir.path())
    }

    #[test]
    fn renders_template_with_stable_context_ordering() {
        let store = store_with(&[("update_quests", "Decide on quest actions.")]);
        // serde_json maps are sorted, so key order in the input literal
        // must not affect the rendered prompt.
        let a = store
            .render(
                AgentPurpose::QuestAnalysis,
                &json!({ "entry_text": "ran 5k", "active_quests": [] }),
            )
            .unwrap();
        let b = store
            .render(
                AgentPurpose::QuestAnalysis,
                &json!({ "active_quests": [], "entry_text": "ran 5k" }),
            )
            .unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("Decide on quest actions.\n\nInput:\n"));
        assert!(a.contains("\"entry_text\": \"ran 5k\""));
    }

    #[test]
    fn missing_template_fails_the_request_not_the_store() {
        let store = store_with(&[("update_quests", "body")]);
        let err = store
            .render(AgentPurpose::XpAnalysis, &json!({ "paragraph": "hi" }))
            .unwrap_err();
        assert!(matches!(
            err,
            AgentError::TemplateNotFound(AgentPurpose::XpAnalysis)
        ));
        // Other purposes keep working.
        assert!(store
            .render(AgentPurpose::QuestAnalysis, &json!({}))
            .is_ok());
    }
}
