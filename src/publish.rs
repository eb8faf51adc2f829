use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::{ApiError, ResultsApi};
use crate::selection::SelectionSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum PublishPhase {
    Idle,
    ConfirmPending,
    Publishing,
    Succeeded,
    Failed,
}

impl PublishPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            PublishPhase::Idle => "idle",
            PublishPhase::ConfirmPending => "confirmPending",
            PublishPhase::Publishing => "publishing",
            PublishPhase::Succeeded => "succeeded",
            PublishPhase::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PublishError {
    #[error("select at least one result to publish")]
    EmptySelection,
    #[error("cannot {action} while {}", .from.as_str())]
    InvalidTransition {
        from: PublishPhase,
        action: &'static str,
    },
    #[error("a publish request is already in flight")]
    AlreadyPublishing,
    #[error(
        "publishing failed: {0}. Some results may have been published; check their status before retrying"
    )]
    Backend(ApiError),
}

impl PublishError {
    pub fn code(&self) -> &'static str {
        match self {
            PublishError::EmptySelection => "empty_selection",
            PublishError::InvalidTransition { .. } => "invalid_transition",
            PublishError::AlreadyPublishing => "already_publishing",
            PublishError::Backend(e) => e.code(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishAttempt {
    pub attempt_id: Uuid,
    pub result_ids: Vec<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Returned by a successful confirm. The server owns record state, so the only
/// follow-up is to refetch the list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishReceipt {
    pub attempt_id: Uuid,
    pub published: usize,
    pub refetch: bool,
}

/// Idle -> ConfirmPending -> Publishing -> {Succeeded, Failed}
#[derive(Debug, Clone)]
pub struct PublicationWorkflow {
    phase: PublishPhase,
    last: Option<PublishAttempt>,
}

impl Default for PublicationWorkflow {
    fn default() -> Self {
        Self::new()
    }
}

impl PublicationWorkflow {
    pub fn new() -> Self {
        Self {
            phase: PublishPhase::Idle,
            last: None,
        }
    }

    pub fn phase(&self) -> PublishPhase {
        self.phase
    }

    pub fn last_attempt(&self) -> Option<&PublishAttempt> {
        self.last.as_ref()
    }

    /// Terminal phases count as idle so a failed batch can be retried.
    pub fn request_publish(&mut self, selection: &SelectionSet) -> Result<(), PublishError> {
        match self.phase {
            PublishPhase::Idle | PublishPhase::Succeeded | PublishPhase::Failed => {}
            from => {
                return Err(PublishError::InvalidTransition {
                    from,
                    action: "request publish",
                })
            }
        }
        if selection.is_empty() {
            self.phase = PublishPhase::Idle;
            warn!("publish requested with empty selection");
            return Err(PublishError::EmptySelection);
        }
        self.phase = PublishPhase::ConfirmPending;
        info!(selected = selection.len(), "publish awaiting confirmation");
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), PublishError> {
        if self.phase != PublishPhase::ConfirmPending {
            return Err(PublishError::InvalidTransition {
                from: self.phase,
                action: "cancel",
            });
        }
        self.phase = PublishPhase::Idle;
        info!("publish cancelled");
        Ok(())
    }

    /// Acknowledges a finished attempt and returns to Idle.
    pub fn reset(&mut self) -> Result<(), PublishError> {
        match self.phase {
            PublishPhase::Succeeded | PublishPhase::Failed | PublishPhase::Idle => {
                self.phase = PublishPhase::Idle;
                Ok(())
            }
            PublishPhase::Publishing => Err(PublishError::AlreadyPublishing),
            from => Err(PublishError::InvalidTransition {
                from,
                action: "reset",
            }),
        }
    }

    /// Sends the selected ids exactly once. The selection is cleared only on
    /// success; after a failure it is kept for a retry.
    pub fn confirm(
        &mut self,
        selection: &mut SelectionSet,
        api: &dyn ResultsApi,
    ) -> Result<PublishReceipt, PublishError> {
        match self.phase {
            PublishPhase::ConfirmPending => {}
            PublishPhase::Publishing => return Err(PublishError::AlreadyPublishing),
            from => {
                return Err(PublishError::InvalidTransition {
                    from,
                    action: "confirm",
                })
            }
        }
        if selection.is_empty() {
            self.phase = PublishPhase::Idle;
            return Err(PublishError::EmptySelection);
        }

        let ids = selection.ids();
        let attempt_id = Uuid::new_v4();
        self.phase = PublishPhase::Publishing;
        info!(%attempt_id, count = ids.len(), "publishing results");

        let outcome = api.publish_results(&ids);
        let completed_at = Some(Utc::now());

        match outcome {
            Ok(()) => {
                let published = ids.len();
                self.phase = PublishPhase::Succeeded;
                self.last = Some(PublishAttempt {
                    attempt_id,
                    result_ids: ids,
                    completed_at,
                    error: None,
                });
                selection.clear();
                info!(%attempt_id, published, "publish succeeded");
                Ok(PublishReceipt {
                    attempt_id,
                    published,
                    refetch: true,
                })
            }
            Err(e) => {
                let err = PublishError::Backend(e);
                self.phase = PublishPhase::Failed;
                self.last = Some(PublishAttempt {
                    attempt_id,
                    result_ids: ids,
                    completed_at,
                    error: Some(err.to_string()),
                });
                warn!(%attempt_id, error = %err, "publish failed");
                Err(err)
            }
        }
    }
}
