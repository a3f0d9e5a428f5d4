use serde::{Deserialize, Serialize};

use crate::domain::ticket::TicketStatus;
use crate::flows::{invalid, FlowTransitionError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketState {
    NoTicket,
    Created,
    Open,
    Closing,
    Deleted,
}

impl From<TicketStatus> for TicketState {
    fn from(status: TicketStatus) -> Self {
        match status {
            TicketStatus::Creating => Self::Created,
            TicketStatus::Open => Self::Open,
            TicketStatus::Closing => Self::Closing,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketEvent {
    CategorySelected,
    IntroPosted,
    NotifyRequested,
    CloseRequested,
    DeletionElapsed,
    ChannelRemoved,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TicketContext {
    pub actor_is_staff: bool,
    pub has_existing_ticket: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TicketAction {
    CreateChannel,
    PostIntro,
    NotifyOwner,
    AnnounceClosing,
    ScheduleDeletion,
    DeleteChannel,
    ForgetTicket,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketTransition {
    pub from: TicketState,
    pub to: TicketState,
    pub event: TicketEvent,
    pub actions: Vec<TicketAction>,
}

#[derive(Clone, Debug, Default)]
pub struct TicketFlow;

impl TicketFlow {
    pub fn apply(
        &self,
        current: TicketState,
        event: TicketEvent,
        context: &TicketContext,
    ) -> Result<TicketTransition, FlowTransitionError> {
        use TicketAction::*;
        use TicketEvent::*;
        use TicketState::*;

        let (to, actions) = match (current, event) {
            (NoTicket, CategorySelected) => {
                if context.has_existing_ticket {
                    return Err(FlowTransitionError::DuplicateTicket);
                }
                (Created, vec![CreateChannel, PostIntro])
            }
            (Created, IntroPosted) => (Open, Vec::new()),
            (Open, NotifyRequested) => {
                if !context.actor_is_staff {
                    return Err(FlowTransitionError::StaffOnly);
                }
                (Open, vec![NotifyOwner])
            }
            (Open, CloseRequested) => {
                if !context.actor_is_staff {
                    return Err(FlowTransitionError::StaffOnly);
                }
                (Closing, vec![NotifyOwner, AnnounceClosing, ScheduleDeletion])
            }
            (Closing, DeletionElapsed) => (Deleted, vec![DeleteChannel, ForgetTicket]),
            (Created, ChannelRemoved) | (Open, ChannelRemoved) | (Closing, ChannelRemoved) => {
                (Deleted, vec![ForgetTicket])
            }
            _ => return Err(invalid("ticket", &current, &event)),
        };

        Ok(TicketTransition { from: current, to, event, actions })
    }
}

#[cfg(test)]
mod tests {
    use super::{TicketAction, TicketContext, TicketEvent, TicketFlow, TicketState};
    use crate::domain::ticket::TicketStatus;
    use crate::flows::FlowTransitionError;

    fn staff() -> TicketContext {
        TicketContext { actor_is_staff: true, has_existing_ticket: false }
    }

    #[test]
    fn lifecycle_runs_from_selection_to_deletion() {
        let flow = TicketFlow;
        let created = flow
            .apply(TicketState::NoTicket, TicketEvent::CategorySelected, &TicketContext::default())
            .expect("selection creates ticket");
        assert_eq!(created.actions, vec![TicketAction::CreateChannel, TicketAction::PostIntro]);

        let open = flow.apply(created.to, TicketEvent::IntroPosted, &staff()).expect("open");
        let closing = flow.apply(open.to, TicketEvent::CloseRequested, &staff()).expect("close");
        assert!(closing.actions.contains(&TicketAction::ScheduleDeletion));

        let deleted =
            flow.apply(closing.to, TicketEvent::DeletionElapsed, &staff()).expect("deleted");
        assert_eq!(deleted.to, TicketState::Deleted);
        assert_eq!(deleted.actions, vec![TicketAction::DeleteChannel, TicketAction::ForgetTicket]);
    }

    #[test]
    fn duplicate_selection_is_rejected() {
        let error = TicketFlow
            .apply(
                TicketState::NoTicket,
                TicketEvent::CategorySelected,
                &TicketContext { has_existing_ticket: true, ..TicketContext::default() },
            )
            .expect_err("duplicate");
        assert_eq!(error, FlowTransitionError::DuplicateTicket);
    }

    #[test]
    fn notify_keeps_ticket_open() {
        let outcome = TicketFlow
            .apply(TicketState::Open, TicketEvent::NotifyRequested, &staff())
            .expect("notify");
        assert_eq!(outcome.to, TicketState::Open);
        assert_eq!(outcome.actions, vec![TicketAction::NotifyOwner]);
    }

    #[test]
    fn staff_controls_reject_members() {
        for event in [TicketEvent::NotifyRequested, TicketEvent::CloseRequested] {
            let error = TicketFlow
                .apply(TicketState::Open, event, &TicketContext::default())
                .expect_err("member cannot use staff controls");
            assert_eq!(error, FlowTransitionError::StaffOnly);
        }
    }

    #[test]
    fn closing_twice_is_invalid() {
        let error = TicketFlow
            .apply(TicketState::Closing, TicketEvent::CloseRequested, &staff())
            .expect_err("already closing");
        assert!(matches!(error, FlowTransitionError::InvalidTransition { flow: "ticket", .. }));
    }

    #[test]
    fn removed_channel_forgets_ticket_in_any_live_state() {
        for state in [TicketState::Created, TicketState::Open, TicketState::Closing] {
            let outcome = TicketFlow
                .apply(state, TicketEvent::ChannelRemoved, &TicketContext::default())
                .expect("removal");
            assert_eq!(outcome.actions, vec![TicketAction::ForgetTicket]);
        }
    }

    #[test]
    fn stored_status_maps_to_flow_state() {
        assert_eq!(TicketState::from(TicketStatus::Creating), TicketState::Created);
        assert_eq!(TicketState::from(TicketStatus::Closing), TicketState::Closing);
    }
}
