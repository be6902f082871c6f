use crate::backend::{BackendClient, NewQuest};
use crate::error::{AgentError, ParseErrorKind};
use crate::resolver::ResolvedAction;

/// What happened when a resolved action met the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The backend call succeeded.
    Applied,
    /// Nothing to do; no backend call was made.
    NoOp,
    /// The backend call failed and the failure was logged, not surfaced.
    Suppressed,
    /// The action was `Unresolved`; never dispatched.
    Rejected(ParseErrorKind),
}

/// Maps a resolved action to at most one backend side effect.
///
/// Backend failures here are fire-and-forget: the analysis already
/// succeeded, so the caller still sees success while the failure is logged.
/// There is no compensating transaction if state diverges.
#[derive(Clone)]
pub struct ActionDispatcher {
    backend: BackendClient,
}

impl ActionDispatcher {
    pub fn new(backend: BackendClient) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &BackendClient {
        &self.backend
    }

    pub async fn dispatch(&self, action: &ResolvedAction, user_id: &str) -> DispatchOutcome {
        match action {
            ResolvedAction::AwardXp { xp_amount } if *xp_amount > 0 => {
                self.suppress(
                    self.backend.update_character_xp(user_id, *xp_amount).await,
                    user_id,
                    "xp update",
                )
            }
            ResolvedAction::AwardXp { xp_amount } => {
                tracing::warn!(%user_id, xp_amount, "non-positive XP amount; skipping backend call");
                DispatchOutcome::NoOp
            }
            ResolvedAction::CreateQuest {
                title,
                description,
                xp_reward,
                requirements,
            } => {
                let quest = NewQuest {
                    user_id: user_id.to_string(),
                    title: title.clone(),
                    description: description.clone(),
                    xp_reward: *xp_reward,
                    requirements: requirements.clone(),
                };
                self.suppress(
                    self.backend.create_quest(&quest).await,
                    user_id,
                    "quest creation",
                )
            }
            ResolvedAction::UpdateQuest {
                quest_id,
                description,
            } => self.suppress(
                self.backend
                    .update_quest(quest_id, description.as_deref())
                    .await,
                user_id,
                "quest update",
            ),
            ResolvedAction::CompleteQuest { quest_id } => self.suppress(
                self.backend.complete_quest(quest_id).await,
                user_id,
                "quest completion",
            ),
            ResolvedAction::NoAction { .. } => DispatchOutcome::NoOp,
            ResolvedAction::Unresolved { reason } => DispatchOutcome::Rejected(*reason),
        }
    }

    fn suppress(
        &self,
        result: Result<(), AgentError>,
        user_id: &str,
        what: &str,
    ) -> DispatchOutcome {
        match result {
            Ok(()) => DispatchOutcome::Applied,
            Err(err) => {
                tracing::error!(%user_id, error = %err, "{} failed; suppressing", what);
                DispatchOutcome::Suppressed
            }
        }
    }
}
