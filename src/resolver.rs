use serde_json::{Map, Value};

use crate::error::ParseErrorKind;
use crate::invoker::{OutputMode, RawModelOutput, UPDATE_XP_TOOL};

/// A model response coerced into exactly one dispatchable shape.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedAction {
    AwardXp {
        xp_amount: i64,
    },
    CreateQuest {
        title: String,
        description: String,
        xp_reward: Option<i64>,
        requirements: Option<String>,
    },
    UpdateQuest {
        quest_id: String,
        description: Option<String>,
    },
    CompleteQuest {
        quest_id: String,
    },
    NoAction {
        original_text: Option<String>,
    },
    /// Terminal failure state; never dispatched.
    Unresolved {
        reason: ParseErrorKind,
    },
}

/// Turn raw model output into a typed action under the declared contract.
///
/// Stateless and total: malformed output resolves to `NoAction` or
/// `Unresolved`, never an error to the caller.
pub fn resolve(mode: OutputMode, raw: &RawModelOutput) -> ResolvedAction {
    match (mode, raw) {
        (OutputMode::ToolCall, RawModelOutput::ToolCall { name, args }) => {
            resolve_tool_call(name, args)
        }
        (OutputMode::ToolCall, RawModelOutput::Text(text)) => ResolvedAction::NoAction {
            original_text: Some(text.clone()),
        },
        (OutputMode::JsonMode, RawModelOutput::Text(text)) => resolve_json(text),
        (OutputMode::JsonMode, RawModelOutput::ToolCall { name, .. }) => {
            tracing::warn!(tool = %name, "unexpected tool call under JSON mode; ignoring");
            ResolvedAction::NoAction {
                original_text: None,
            }
        }
        // Free-text purposes carry the output through verbatim; there is
        // nothing to extract here.
        (OutputMode::FreeText, RawModelOutput::Text(text)) => ResolvedAction::NoAction {
            original_text: Some(text.clone()),
        },
        (OutputMode::FreeText, RawModelOutput::ToolCall { .. }) => ResolvedAction::NoAction {
            original_text: None,
        },
    }
}

fn resolve_tool_call(name: &str, args: &Map<String, Value>) -> ResolvedAction {
    if name != UPDATE_XP_TOOL {
        tracing::debug!(tool = %name, "model called an undeclared tool; treating as no action");
        return ResolvedAction::NoAction {
            original_text: None,
        };
    }
    match integer_arg(args.get("xp_amount")) {
        Some(xp_amount) => ResolvedAction::AwardXp { xp_amount },
        None => ResolvedAction::Unresolved {
            reason: ParseErrorKind::InvalidToolArgs,
        },
    }
}

/// Accept only values that are true JSON integers; floats and numeric strings
/// from a misbehaving model are rejected rather than silently coerced.
fn integer_arg(value: Option<&Value>) -> Option<i64> {
    match value {
        Some(Value::Number(n)) => n.as_i64(),
        _ => None,
    }
}

fn resolve_json(text: &str) -> ResolvedAction {
    let cleaned = strip_code_fence(text);
    let value: Value = match serde_json::from_str(cleaned) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, raw = %text, "model output was not valid JSON");
            return ResolvedAction::Unresolved {
                reason: ParseErrorKind::MalformedJson,
            };
        }
    };

    // The `action` field is authoritative even if the payload also carries
    // conflicting tool-call data.
    let action = value.get("action").and_then(Value::as_str).unwrap_or("");
    let data = value.get("data");

    match action {
        "AWARD_XP" => resolve_award_xp(&value),
        "CREATE" => resolve_create(data),
        "UPDATE" => resolve_update(data),
        "COMPLETE" => resolve_complete(data),
        "NO_ACTION_RECOGNIZED" => ResolvedAction::NoAction {
            original_text: None,
        },
        other => {
            if !other.is_empty() {
                tracing::debug!(action = %other, "unrecognized action from model");
            }
            ResolvedAction::NoAction {
                original_text: None,
            }
        }
    }
}

fn resolve_award_xp(value: &Value) -> ResolvedAction {
    let amount = value
        .get("tool_calls")
        .and_then(Value::as_array)
        .and_then(|calls| {
            calls.iter().find(|call| {
                call.get("name").and_then(Value::as_str) == Some(UPDATE_XP_TOOL)
            })
        })
        .and_then(|call| call.get("args"))
        .and_then(|args| integer_arg(args.get("xp_amount")));

    match amount {
        Some(xp_amount) => ResolvedAction::AwardXp { xp_amount },
        None => ResolvedAction::Unresolved {
            reason: ParseErrorKind::InvalidToolArgs,
        },
    }
}

fn resolve_create(data: Option<&Value>) -> ResolvedAction {
    let Some(data) = data else {
        tracing::warn!("CREATE action without a data object; demoting to no action");
        return ResolvedAction::NoAction {
            original_text: None,
        };
    };
    let Some(title) = data
        .get("title")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
    else {
        tracing::warn!("CREATE action without a title; demoting to no action");
        return ResolvedAction::NoAction {
            original_text: None,
        };
    };

    ResolvedAction::CreateQuest {
        title: title.to_string(),
        description: data
            .get("description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        xp_reward: integer_arg(data.get("xpReward")),
        requirements: data
            .get("requirements")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

fn resolve_update(data: Option<&Value>) -> ResolvedAction {
    match quest_id(data) {
        Some(quest_id) => ResolvedAction::UpdateQuest {
            quest_id,
            description: data
                .and_then(|d| d.get("description"))
                .and_then(Value::as_str)
                .map(str::to_string),
        },
        None => {
            tracing::warn!("UPDATE action without questId; demoting to no action");
            ResolvedAction::NoAction {
                original_text: None,
            }
        }
    }
}

fn resolve_complete(data: Option<&Value>) -> ResolvedAction {
    match quest_id(data) {
        Some(quest_id) => ResolvedAction::CompleteQuest { quest_id },
        None => {
            tracing::warn!("COMPLETE action without questId; demoting to no action");
            ResolvedAction::NoAction {
                original_text: None,
            }
        }
    }
}

fn quest_id(data: Option<&Value>) -> Option<String> {
    data.and_then(|d| d.get("questId"))
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
}

/// Strip one surrounding markdown code fence, if present.
///
/// Models in JSON mode still occasionally wrap the payload in
/// ```` ```json ... ``` ```` markers.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}
