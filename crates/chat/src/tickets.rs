use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use helpdesk_core::domain::ticket::{
    owner_from_topic, ticket_channel_name, ticket_topic, TicketCategory, TicketRecord,
};
use helpdesk_core::errors::{ApplicationError, DomainError};
use helpdesk_core::flows::{
    FlowTransitionError, TicketAction, TicketContext, TicketEvent, TicketFlow, TicketState,
};
use helpdesk_db::{CloseMark, Reservation, TicketRepository};

use crate::components::{self, InteractionResponse};
use crate::deferred::{DeferredKey, DeferredTasks};
use crate::events::{Actor, ButtonPress, MenuSelection};
use crate::gateway::{
    ChannelSpec, ChatGateway, GatewayError, OverwriteTarget, Permission, PermissionOverwrite,
};
use crate::settings::BotSettings;

/// A ticket the requesting user already holds.
#[derive(Clone, Debug, PartialEq, Eq)]
enum ExistingTicket {
    Channel(String),
    Pending,
}

pub struct TicketService {
    gateway: Arc<dyn ChatGateway>,
    tickets: Arc<dyn TicketRepository>,
    settings: Arc<BotSettings>,
    deferred: DeferredTasks,
    flow: TicketFlow,
}

impl TicketService {
    pub fn new(
        gateway: Arc<dyn ChatGateway>,
        tickets: Arc<dyn TicketRepository>,
        settings: Arc<BotSettings>,
        deferred: DeferredTasks,
    ) -> Self {
        Self { gateway, tickets, settings, deferred, flow: TicketFlow }
    }

    /// Opens a private ticket channel for the selecting user unless one exists.
    pub async fn open(
        &self,
        selection: &MenuSelection,
        correlation_id: &str,
    ) -> Result<InteractionResponse, ApplicationError> {
        let owner = &selection.actor;
        let selected = selection.values.first().map(String::as_str).unwrap_or_default();
        let category = TicketCategory::from_key(selected).ok_or_else(|| {
            DomainError::InvariantViolation(format!("unknown ticket category `{selected}`"))
        })?;

        let existing = self.find_existing(&owner.user_id, correlation_id).await?;
        let context = TicketContext {
            actor_is_staff: self.settings.is_staff(&owner.role_ids),
            has_existing_ticket: existing.is_some(),
        };
        let transition =
            match self.flow.apply(TicketState::NoTicket, TicketEvent::CategorySelected, &context) {
                Ok(transition) => transition,
                Err(FlowTransitionError::DuplicateTicket) => {
                    return Ok(existing_response(existing));
                }
                Err(other) => return Err(DomainError::from(other).into()),
            };

        let reservation =
            TicketRecord::reserve(&owner.user_id, &owner.username, category, Utc::now());
        if let Reservation::Existing(record) = self.tickets.reserve(reservation).await? {
            return Ok(existing_response(Some(match record.channel_id {
                Some(channel_id) => ExistingTicket::Channel(channel_id),
                None => ExistingTicket::Pending,
            })));
        }

        let mut channel_id = None;
        for action in transition.actions {
            match action {
                TicketAction::CreateChannel => {
                    channel_id = Some(self.create_channel(owner, category, correlation_id).await?);
                }
                TicketAction::PostIntro => {
                    if let Some(channel_id) = &channel_id {
                        self.post_intro(owner, category, channel_id, correlation_id).await?;
                    }
                }
                _ => {}
            }
        }

        let channel_id = channel_id.ok_or_else(|| {
            DomainError::InvariantViolation("ticket channel was not created".to_owned())
        })?;
        Ok(InteractionResponse::ephemeral(components::ticket_created(&channel_id)))
    }

    /// Sends the ticket owner a direct reminder pointing at the channel.
    pub async fn notify(
        &self,
        press: &ButtonPress,
        correlation_id: &str,
    ) -> Result<InteractionResponse, ApplicationError> {
        let record = self.tickets.find_by_channel(&press.channel_id).await?;
        let context = TicketContext {
            actor_is_staff: self.settings.is_staff(&press.actor.role_ids),
            has_existing_ticket: true,
        };
        let state = record.as_ref().map_or(TicketState::Open, |record| record.status.into());
        let transition = match self.flow.apply(state, TicketEvent::NotifyRequested, &context) {
            Ok(transition) => transition,
            Err(FlowTransitionError::StaffOnly) => {
                return Ok(InteractionResponse::ephemeral(components::staff_only_notice()));
            }
            Err(_) if state == TicketState::Closing => {
                return Ok(InteractionResponse::ephemeral(components::ticket_already_closing()));
            }
            Err(other) => return Err(DomainError::from(other).into()),
        };

        let Some(owner_id) = self.resolve_owner(record.as_ref(), &press.channel_id).await else {
            return Ok(InteractionResponse::ephemeral(components::ticket_untracked()));
        };

        let mut response = InteractionResponse::Acknowledge;
        for action in transition.actions {
            if action != TicketAction::NotifyOwner {
                continue;
            }
            let reminder = components::ticket_notify_dm(&press.channel_id);
            response = match self.gateway.send_direct_message(&owner_id, &reminder).await {
                Ok(_) => {
                    info!(
                        event_name = "ticket.owner.notified",
                        correlation_id,
                        channel_id = %press.channel_id,
                        user_id = %owner_id,
                        "notified ticket owner"
                    );
                    InteractionResponse::ephemeral(components::ticket_notified(&owner_id))
                }
                Err(error) => {
                    warn!(
                        event_name = "ticket.owner.notify_failed",
                        correlation_id,
                        channel_id = %press.channel_id,
                        user_id = %owner_id,
                        error = %error,
                        "could not notify ticket owner"
                    );
                    InteractionResponse::ephemeral(components::ticket_notify_failed())
                }
            };
        }
        Ok(response)
    }

    /// Marks the ticket closing, tells the owner and schedules the channel's
    /// deletion after the configured delay.
    pub async fn close(
        &self,
        press: &ButtonPress,
        correlation_id: &str,
    ) -> Result<InteractionResponse, ApplicationError> {
        let record = self.tickets.find_by_channel(&press.channel_id).await?;
        let context = TicketContext {
            actor_is_staff: self.settings.is_staff(&press.actor.role_ids),
            has_existing_ticket: true,
        };
        let state = record.as_ref().map_or(TicketState::Open, |record| record.status.into());
        let transition = match self.flow.apply(state, TicketEvent::CloseRequested, &context) {
            Ok(transition) => transition,
            Err(FlowTransitionError::StaffOnly) => {
                return Ok(InteractionResponse::ephemeral(components::staff_only_notice()));
            }
            Err(_) if state == TicketState::Closing => {
                return Ok(InteractionResponse::ephemeral(components::ticket_already_closing()));
            }
            Err(other) => return Err(DomainError::from(other).into()),
        };

        let marked = match self.tickets.mark_closing(&press.channel_id).await? {
            CloseMark::AlreadyClosing(_) => {
                return Ok(InteractionResponse::ephemeral(components::ticket_already_closing()));
            }
            CloseMark::Marked(record) => Some(record),
            CloseMark::Untracked => None,
        };
        let owner_id = self.resolve_owner(marked.as_ref(), &press.channel_id).await;

        info!(
            event_name = "ticket.closing",
            correlation_id,
            channel_id = %press.channel_id,
            user_id = %press.actor.user_id,
            tracked = marked.is_some(),
            "ticket close requested"
        );

        let mut response = InteractionResponse::Acknowledge;
        for action in transition.actions {
            match action {
                TicketAction::NotifyOwner => {
                    let Some(owner_id) = owner_id.as_deref() else { continue };
                    let farewell = components::ticket_closed_dm(
                        marked.as_ref().map(|record| record.category),
                    );
                    if let Err(error) = self.gateway.send_direct_message(owner_id, &farewell).await
                    {
                        warn!(
                            event_name = "ticket.owner.close_dm_failed",
                            correlation_id,
                            channel_id = %press.channel_id,
                            user_id = %owner_id,
                            error = %error,
                            "could not tell ticket owner about closure"
                        );
                    }
                }
                TicketAction::AnnounceClosing => {
                    response = InteractionResponse::public(components::ticket_closing_notice(
                        self.settings.ticket_close_delay.as_secs(),
                    ));
                }
                TicketAction::ScheduleDeletion => self.schedule_deletion(&press.channel_id),
                _ => {}
            }
        }
        Ok(response)
    }

    /// Reacts to a ticket channel disappearing from the platform.
    pub async fn channel_removed(
        &self,
        channel_id: &str,
    ) -> Result<Option<TicketRecord>, ApplicationError> {
        self.deferred.cancel(&DeferredKey::Channel(channel_id.to_owned()));

        let Some(record) = self.tickets.find_by_channel(channel_id).await? else {
            return Ok(None);
        };
        let transition = self
            .flow
            .apply(record.status.into(), TicketEvent::ChannelRemoved, &TicketContext::default())
            .map_err(DomainError::from)?;

        let mut removed = None;
        if transition.actions.contains(&TicketAction::ForgetTicket) {
            removed = self.tickets.remove_by_channel(channel_id).await?;
            info!(
                event_name = "ticket.forgotten",
                channel_id,
                "forgot ticket whose channel was removed"
            );
        }
        Ok(removed)
    }

    async fn find_existing(
        &self,
        owner_id: &str,
        correlation_id: &str,
    ) -> Result<Option<ExistingTicket>, ApplicationError> {
        if let Some(record) = self.tickets.find_by_owner(owner_id).await? {
            match record.channel_id {
                None if record.is_stale_reservation(Utc::now()) => {}
                None => return Ok(Some(ExistingTicket::Pending)),
                Some(channel_id) => match self.gateway.fetch_channel(&channel_id).await {
                    Err(GatewayError::NotFound(_)) => {
                        self.tickets.remove_by_channel(&channel_id).await?;
                        info!(
                            event_name = "ticket.stale_record.removed",
                            correlation_id,
                            channel_id = %channel_id,
                            user_id = owner_id,
                            "dropped ticket record whose channel no longer exists"
                        );
                    }
                    _ => return Ok(Some(ExistingTicket::Channel(channel_id))),
                },
            }
        }

        match self.gateway.list_channels(&self.settings.ticket_category_id).await {
            Ok(channels) => Ok(channels
                .into_iter()
                .find(|channel| {
                    channel.topic.as_deref().and_then(owner_from_topic) == Some(owner_id)
                })
                .map(|channel| ExistingTicket::Channel(channel.id))),
            Err(error) => {
                warn!(
                    event_name = "ticket.topic_scan.failed",
                    correlation_id,
                    user_id = owner_id,
                    error = %error,
                    "could not scan ticket channels; relying on stored tickets"
                );
                Ok(None)
            }
        }
    }

    async fn create_channel(
        &self,
        owner: &Actor,
        category: TicketCategory,
        correlation_id: &str,
    ) -> Result<String, ApplicationError> {
        let spec = ChannelSpec {
            name: ticket_channel_name(&owner.username),
            parent_id: self.settings.ticket_category_id.clone(),
            topic: ticket_topic(&owner.user_id, category),
            overwrites: vec![
                PermissionOverwrite {
                    target: OverwriteTarget::Everyone,
                    allow: Vec::new(),
                    deny: vec![Permission::ViewChannel],
                },
                PermissionOverwrite {
                    target: OverwriteTarget::Member(owner.user_id.clone()),
                    allow: Permission::TICKET_MEMBER.to_vec(),
                    deny: Vec::new(),
                },
                PermissionOverwrite {
                    target: OverwriteTarget::Role(self.settings.staff_role_id.clone()),
                    allow: Permission::TICKET_MEMBER.to_vec(),
                    deny: Vec::new(),
                },
            ],
        };

        let channel = match self.gateway.create_channel(&spec).await {
            Ok(channel) => channel,
            Err(error) => {
                warn!(
                    event_name = "ticket.channel.create_failed",
                    correlation_id,
                    user_id = %owner.user_id,
                    error = %error,
                    "could not create ticket channel; releasing reservation"
                );
                if let Err(release_error) = self.tickets.release(&owner.user_id).await {
                    warn!(
                        event_name = "ticket.reservation.release_failed",
                        correlation_id,
                        user_id = %owner.user_id,
                        error = %release_error,
                        "could not release ticket reservation"
                    );
                }
                return Err(error.into());
            }
        };

        self.tickets.activate(&owner.user_id, &channel.id).await?;
        info!(
            event_name = "ticket.channel.created",
            correlation_id,
            channel_id = %channel.id,
            user_id = %owner.user_id,
            category = category.key(),
            "created ticket channel"
        );
        Ok(channel.id)
    }

    async fn post_intro(
        &self,
        owner: &Actor,
        category: TicketCategory,
        channel_id: &str,
        correlation_id: &str,
    ) -> Result<(), ApplicationError> {
        let intro = components::ticket_intro(
            &self.settings.branding,
            &owner.user_id,
            &self.settings.staff_role_id,
            category,
        );
        if let Err(error) = self.gateway.send_message(channel_id, &intro).await {
            warn!(
                event_name = "ticket.intro.failed",
                correlation_id,
                channel_id,
                error = %error,
                "could not post ticket intro"
            );
        }

        self.flow
            .apply(TicketState::Created, TicketEvent::IntroPosted, &TicketContext::default())
            .map_err(DomainError::from)?;
        self.tickets.mark_open(channel_id).await?;
        Ok(())
    }

    async fn resolve_owner(
        &self,
        record: Option<&TicketRecord>,
        channel_id: &str,
    ) -> Option<String> {
        if let Some(record) = record {
            return Some(record.owner_id.clone());
        }
        match self.gateway.fetch_channel(channel_id).await {
            Ok(channel) => channel.topic.as_deref().and_then(owner_from_topic).map(str::to_owned),
            Err(error) => {
                debug!(
                    event_name = "ticket.owner.lookup_failed",
                    channel_id,
                    error = %error,
                    "could not read channel topic for owner"
                );
                None
            }
        }
    }

    fn schedule_deletion(&self, channel_id: &str) {
        let gateway = Arc::clone(&self.gateway);
        let tickets = Arc::clone(&self.tickets);
        let channel_id = channel_id.to_owned();
        let key = DeferredKey::Channel(channel_id.clone());

        self.deferred.schedule(key, self.settings.ticket_close_delay, async move {
            let Ok(transition) = TicketFlow.apply(
                TicketState::Closing,
                TicketEvent::DeletionElapsed,
                &TicketContext::default(),
            ) else {
                return;
            };
            for action in transition.actions {
                match action {
                    TicketAction::DeleteChannel => {
                        if let Err(error) = gateway.delete_channel(&channel_id).await {
                            warn!(
                                event_name = "ticket.channel.delete_failed",
                                channel_id = %channel_id,
                                error = %error,
                                "could not delete closed ticket channel"
                            );
                        }
                    }
                    TicketAction::ForgetTicket => {
                        if let Err(error) = tickets.remove_by_channel(&channel_id).await {
                            warn!(
                                event_name = "ticket.forget_failed",
                                channel_id = %channel_id,
                                error = %error,
                                "could not remove closed ticket record"
                            );
                        }
                    }
                    _ => {}
                }
            }
        });
    }
}

fn existing_response(existing: Option<ExistingTicket>) -> InteractionResponse {
    match existing {
        Some(ExistingTicket::Channel(channel_id)) => {
            InteractionResponse::ephemeral(components::ticket_existing(&channel_id))
        }
        Some(ExistingTicket::Pending) | None => {
            InteractionResponse::ephemeral(components::ticket_pending())
        }
    }
}
