use serde::{Deserialize, Serialize};

use crate::flows::{invalid, FlowTransitionError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackState {
    Idle,
    PanelShown,
    ModalOpen,
    Validated,
    Persisted,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackEvent {
    PanelRequested,
    FormRequested,
    FormSubmitted,
    SubmissionStored,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FeedbackContext {
    pub actor_is_staff: bool,
    pub remaining_allowance: u32,
    pub form_valid: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeedbackAction {
    RenderPanel,
    OpenModal,
    ConsumeAllowance,
    PostLogMessage,
    ConfirmRemaining,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackTransition {
    pub from: FeedbackState,
    pub to: FeedbackState,
    pub event: FeedbackEvent,
    pub actions: Vec<FeedbackAction>,
}

/// Guards for the panel → modal → persisted feedback flow.
///
/// Allowance is checked twice: once when the form is requested and again at
/// submission, since the quota may have been spent in between.
#[derive(Clone, Debug, Default)]
pub struct FeedbackFlow;

impl FeedbackFlow {
    pub fn apply(
        &self,
        current: FeedbackState,
        event: FeedbackEvent,
        context: &FeedbackContext,
    ) -> Result<FeedbackTransition, FlowTransitionError> {
        use FeedbackAction::*;
        use FeedbackEvent::*;
        use FeedbackState::*;

        let (to, actions) = match (current, event) {
            (Idle, PanelRequested) | (PanelShown, PanelRequested) => {
                if !context.actor_is_staff {
                    return Err(FlowTransitionError::StaffOnly);
                }
                (PanelShown, vec![RenderPanel])
            }
            (PanelShown, FormRequested) => {
                if context.remaining_allowance == 0 {
                    return Err(FlowTransitionError::AllowanceExhausted);
                }
                (ModalOpen, vec![OpenModal])
            }
            (ModalOpen, FormSubmitted) => {
                if !context.form_valid {
                    return Err(FlowTransitionError::InvalidFormInput);
                }
                (Validated, vec![ConsumeAllowance])
            }
            (Validated, SubmissionStored) => {
                if context.remaining_allowance == 0 {
                    return Err(FlowTransitionError::AllowanceExhausted);
                }
                (Persisted, vec![PostLogMessage, ConfirmRemaining])
            }
            _ => return Err(invalid("feedback", &current, &event)),
        };

        Ok(FeedbackTransition { from: current, to, event, actions })
    }
}
