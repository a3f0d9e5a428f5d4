pub mod feedback;
pub mod ticket;

use thiserror::Error;

pub use feedback::{
    FeedbackAction, FeedbackContext, FeedbackEvent, FeedbackFlow, FeedbackState,
    FeedbackTransition,
};
pub use ticket::{
    TicketAction, TicketContext, TicketEvent, TicketFlow, TicketState, TicketTransition,
};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("invalid {flow} transition from {state} using event {event}")]
    InvalidTransition { flow: &'static str, state: String, event: String },
    #[error("no feedback allowance remaining")]
    AllowanceExhausted,
    #[error("feedback form input failed validation")]
    InvalidFormInput,
    #[error("an open ticket already exists for this user")]
    DuplicateTicket,
    #[error("staff role required")]
    StaffOnly,
}

pub(crate) fn invalid<S, E>(flow: &'static str, state: &S, event: &E) -> FlowTransitionError
where
    S: std::fmt::Debug,
    E: std::fmt::Debug,
{
    FlowTransitionError::InvalidTransition {
        flow,
        state: format!("{state:?}"),
        event: format!("{event:?}"),
    }
}
