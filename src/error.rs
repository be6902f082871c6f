use thiserror::Error;

use crate::invoker::AgentPurpose;

/// Classified failure for a single stage of the agent pipeline.
///
/// Each request passes through render -> invoke -> resolve -> dispatch; a
/// failure in one stage terminates the request and never propagates backward.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("no prompt template loaded for {0}")]
    TemplateNotFound(AgentPurpose),

    #[error("model invoker for {0} is not initialized (missing credential)")]
    ModelUnavailable(AgentPurpose),

    #[error("model call failed: {0}")]
    UpstreamError(String),

    #[error("backend call failed: {0}")]
    BackendCallFailed(String),

    #[error("model output could not be resolved: {0}")]
    Unresolved(ParseErrorKind),
}

/// Why raw model output failed to resolve into an action.
///
/// Distinguishes "the model said something unparseable" from "the model
/// returned arguments that violate the tool contract".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParseErrorKind {
    #[error("output was not valid JSON")]
    MalformedJson,
    #[error("tool arguments had the wrong shape or type")]
    InvalidToolArgs,
}
