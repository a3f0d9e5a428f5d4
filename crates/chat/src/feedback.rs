use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use helpdesk_core::domain::feedback::{FeedbackDraft, FeedbackRecord};
use helpdesk_core::errors::{ApplicationError, DomainError};
use helpdesk_core::flows::{
    FeedbackAction, FeedbackContext, FeedbackEvent, FeedbackFlow, FeedbackState,
    FlowTransitionError,
};
use helpdesk_db::{AllowanceRepository, FeedbackRepository, RepositoryError};

use crate::components::{
    self, InteractionResponse, FEEDBACK_COMMENT_FIELD, FEEDBACK_RATING_FIELD,
};
use crate::events::{Actor, ModalSubmission};
use crate::gateway::ChatGateway;
use crate::settings::BotSettings;

/// Drives the panel → modal → store → log channel sequence.
pub struct FeedbackService {
    gateway: Arc<dyn ChatGateway>,
    feedback: Arc<dyn FeedbackRepository>,
    allowances: Arc<dyn AllowanceRepository>,
    settings: Arc<BotSettings>,
    flow: FeedbackFlow,
}

impl FeedbackService {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        feedback: Arc<dyn FeedbackRepository>,
        allowances: Arc<dyn AllowanceRepository>,
        settings: Arc<BotSettings>,
    ) -> Self {
        Self { gateway, feedback, allowances, settings, flow: FeedbackFlow }
    }

    /// Answers a press of the panel button with the modal, or a refusal when
    /// the actor has no allowance left.
    pub async fn open_form(&self, actor: &Actor) -> Result<InteractionResponse, ApplicationError> {
        let remaining = self.allowances.remaining(&actor.user_id).await?;
        let context = FeedbackContext {
            actor_is_staff: self.settings.is_staff(&actor.role_ids),
            remaining_allowance: remaining,
            form_valid: false,
        };

        match self.flow.apply(FeedbackState::PanelShown, FeedbackEvent::FormRequested, &context) {
            Ok(_) => Ok(InteractionResponse::Modal { modal: components::feedback_modal() }),
            Err(FlowTransitionError::AllowanceExhausted) => {
                info!(
                    event_name = "feedback.form.refused",
                    user_id = %actor.user_id,
                    "feedback form refused; no allowance remaining"
                );
                Ok(InteractionResponse::ephemeral(components::feedback_not_allowed()))
            }
            Err(other) => Err(DomainError::from(other).into()),
        }
    }

    pub async fn submit(
        &self,
        submission: &ModalSubmission,
        correlation_id: &str,
    ) -> Result<InteractionResponse, ApplicationError> {
        let actor = &submission.actor;
        let rating = submission.field(FEEDBACK_RATING_FIELD).unwrap_or_default();
        let draft = FeedbackDraft::from_form(rating, submission.field(FEEDBACK_COMMENT_FIELD));

        let context = FeedbackContext {
            actor_is_staff: self.settings.is_staff(&actor.role_ids),
            remaining_allowance: 0,
            form_valid: draft.is_ok(),
        };
        if let Err(error) =
            self.flow.apply(FeedbackState::ModalOpen, FeedbackEvent::FormSubmitted, &context)
        {
            return match draft {
                Err(DomainError::InvalidRating(raw)) => {
                    info!(
                        event_name = "feedback.submit.invalid_rating",
                        correlation_id,
                        user_id = %actor.user_id,
                        rating = %raw,
                        "rejected feedback with invalid rating"
                    );
                    Ok(InteractionResponse::ephemeral(components::invalid_rating_notice()))
                }
                Err(other) => Err(other.into()),
                Ok(_) => Err(DomainError::from(error).into()),
            };
        }
        let draft = draft?;

        let record =
            FeedbackRecord::new(&actor.user_id, &actor.username, draft, actor.platform, Utc::now());
        let receipt = match self.feedback.record_submission(record.clone()).await {
            Ok(receipt) => receipt,
            Err(RepositoryError::Domain(DomainError::NoAllowance)) => {
                info!(
                    event_name = "feedback.submit.refused",
                    correlation_id,
                    user_id = %actor.user_id,
                    "feedback submission refused; allowance spent"
                );
                return Ok(InteractionResponse::ephemeral(components::feedback_not_allowed()));
            }
            Err(error) => return Err(error.into()),
        };

        info!(
            event_name = "feedback.submit.stored",
            correlation_id,
            user_id = %actor.user_id,
            record_id = %receipt.record_id,
            remaining = receipt.remaining,
            "stored feedback submission"
        );

        // the quota held before this submission gates the transition
        let context = FeedbackContext {
            remaining_allowance: receipt.remaining.saturating_add(1),
            ..context
        };
        let transition = self
            .flow
            .apply(FeedbackState::Validated, FeedbackEvent::SubmissionStored, &context)
            .map_err(DomainError::from)?;

        let mut response = InteractionResponse::Acknowledge;
        for action in transition.actions {
            match action {
                FeedbackAction::PostLogMessage => self.post_log(&record, correlation_id).await,
                FeedbackAction::ConfirmRemaining => {
                    response = InteractionResponse::ephemeral(components::feedback_confirmation(
                        receipt.remaining,
                    ));
                }
                FeedbackAction::RenderPanel
                | FeedbackAction::OpenModal
                | FeedbackAction::ConsumeAllowance => {}
            }
        }
        Ok(response)
    }

    /// Removes the record linked to a deleted log message, if any.
    pub async fn log_message_deleted(
        &self,
        message_id: &str,
    ) -> Result<Option<FeedbackRecord>, ApplicationError> {
        let removed = self.feedback.remove_by_message_id(message_id).await?;
        if let Some(record) = &removed {
            info!(
                event_name = "feedback.record.removed",
                record_id = %record.id,
                message_id,
                "removed feedback linked to deleted log message"
            );
        }
        Ok(removed)
    }

    async fn post_log(&self, record: &FeedbackRecord, correlation_id: &str) {
        let message = components::feedback_log_embed(&self.settings.branding, record);
        let posted = match self.gateway.send_message(&self.settings.log_channel_id, &message).await
        {
            Ok(posted) => posted,
            Err(error) => {
                warn!(
                    event_name = "feedback.log_post.failed",
                    correlation_id,
                    record_id = %record.id,
                    channel_id = %self.settings.log_channel_id,
                    error = %error,
                    "could not post feedback to log channel; record kept without reference"
                );
                return;
            }
        };

        if let Err(error) = self
            .feedback
            .attach_log_message(&record.id, &posted.channel_id, &posted.message_id)
            .await
        {
            warn!(
                event_name = "feedback.log_link.failed",
                correlation_id,
                record_id = %record.id,
                error = %error,
                "could not link feedback record to its log message"
            );
        }
    }
}
