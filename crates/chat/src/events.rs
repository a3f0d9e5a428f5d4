use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use helpdesk_core::domain::feedback::ClientPlatform;
use helpdesk_core::errors::ApplicationError;
use helpdesk_db::{AllowanceRepository, FeedbackRepository, TicketRepository};

use crate::commands::{
    CommandReply, CommandRouteError, CommandRouter, StoreCommandService, TextCommandService,
};
use crate::components::{
    self, InteractionResponse, FEEDBACK_CREATE_BUTTON, FEEDBACK_MODAL, TICKET_CATEGORY_MENU,
    TICKET_CLOSE_BUTTON, TICKET_NOTIFY_BUTTON,
};
use crate::deferred::{DeferredKey, DeferredTasks};
use crate::feedback::FeedbackService;
use crate::gateway::ChatGateway;
use crate::settings::BotSettings;
use crate::tickets::TicketService;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEnvelope {
    pub envelope_id: String,
    pub event: ChatEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    MessageCreated(TextMessage),
    ButtonPressed(ButtonPress),
    MenuSelected(MenuSelection),
    ModalSubmitted(ModalSubmission),
    MessageDeleted { channel_id: String, message_id: String },
    ChannelDeleted { channel_id: String },
    Unsupported { event_type: String },
}

impl ChatEvent {
    pub fn event_type(&self) -> ChatEventType {
        match self {
            Self::MessageCreated(_) => ChatEventType::MessageCreated,
            Self::ButtonPressed(_) => ChatEventType::ButtonPressed,
            Self::MenuSelected(_) => ChatEventType::MenuSelected,
            Self::ModalSubmitted(_) => ChatEventType::ModalSubmitted,
            Self::MessageDeleted { .. } => ChatEventType::MessageDeleted,
            Self::ChannelDeleted { .. } => ChatEventType::ChannelDeleted,
            Self::Unsupported { .. } => ChatEventType::Unsupported,
        }
    }

    /// Interactive events expect exactly one response from the bot.
    pub fn is_interaction(&self) -> bool {
        matches!(self, Self::ButtonPressed(_) | Self::MenuSelected(_) | Self::ModalSubmitted(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChatEventType {
    MessageCreated,
    ButtonPressed,
    MenuSelected,
    ModalSubmitted,
    MessageDeleted,
    ChannelDeleted,
    Unsupported,
}

/// The user behind an event, with the roles they hold in the guild.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Actor {
    pub user_id: String,
    pub username: String,
    pub is_bot: bool,
    pub role_ids: Vec<String>,
    pub platform: Option<ClientPlatform>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessage {
    pub channel_id: String,
    pub message_id: String,
    pub author: Actor,
    pub content: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ButtonPress {
    pub channel_id: String,
    pub message_id: String,
    pub actor: Actor,
    pub custom_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MenuSelection {
    pub channel_id: String,
    pub message_id: String,
    pub actor: Actor,
    pub custom_id: String,
    pub values: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ModalSubmission {
    pub channel_id: String,
    pub actor: Actor,
    pub custom_id: String,
    pub fields: BTreeMap<String, String>,
}

impl ModalSubmission {
    pub fn field(&self, custom_id: &str) -> Option<&str> {
        self.fields.get(custom_id).map(String::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Responded(InteractionResponse),
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Route(#[from] CommandRouteError),
    #[error("reply could not be posted: {0}")]
    Reply(String),
    #[error("resource cleanup failed: {0}")]
    Cleanup(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> ChatEventType;
    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<ChatEventType, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    pub async fn dispatch(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let event_type = envelope.event.event_type();
        let Some(handler) = self.handlers.get(&event_type) else {
            debug!(
                event_name = "dispatch.unhandled",
                correlation_id = %ctx.correlation_id,
                event_type = ?event_type,
                "no handler registered for event type"
            );
            return Ok(HandlerResult::Ignored);
        };
        Ok(handler.handle(envelope, ctx).await?)
    }
}

/// Runs text commands and posts their replies; notices delete themselves.
pub struct TextCommandHandler<S> {
    router: CommandRouter<S>,
    gateway: Arc<dyn ChatGateway>,
    deferred: DeferredTasks,
    settings: Arc<BotSettings>,
}

impl<S> TextCommandHandler<S>
where
    S: TextCommandService,
{
    pub fn new(
        router: CommandRouter<S>,
        gateway: Arc<dyn ChatGateway>,
        deferred: DeferredTasks,
        settings: Arc<BotSettings>,
    ) -> Self {
        Self { router, gateway, deferred, settings }
    }
}

#[async_trait]
impl<S> EventHandler for TextCommandHandler<S>
where
    S: TextCommandService + 'static,
{
    fn event_type(&self) -> ChatEventType {
        ChatEventType::MessageCreated
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::MessageCreated(message) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let reply = match self.router.route(message).await {
            Ok(reply) => reply,
            Err(CommandRouteError::Service(reason)) => {
                warn!(
                    event_name = "command.service.failed",
                    correlation_id = %ctx.correlation_id,
                    channel_id = %message.channel_id,
                    user_id = %message.author.user_id,
                    error = %reason,
                    "text command could not be completed"
                );
                let interface_error = ApplicationError::Persistence(reason)
                    .into_interface(ctx.correlation_id.clone());
                CommandReply::Notice(components::error_notice(&interface_error))
            }
            Err(other) => return Err(other.into()),
        };
        let (template, self_deleting) = match reply {
            CommandReply::Silent => return Ok(HandlerResult::Ignored),
            CommandReply::Reply(template) => (template, false),
            CommandReply::Notice(template) => (template, true),
        };

        let posted = self
            .gateway
            .send_message(&message.channel_id, &template)
            .await
            .map_err(|error| EventHandlerError::Reply(error.to_string()))?;

        if self_deleting {
            let gateway = Arc::clone(&self.gateway);
            let correlation_id = ctx.correlation_id.clone();
            let key = DeferredKey::Message {
                channel_id: posted.channel_id.clone(),
                message_id: posted.message_id.clone(),
            };
            self.deferred.schedule(key, self.settings.notice_ttl, async move {
                if let Err(error) =
                    gateway.delete_message(&posted.channel_id, &posted.message_id).await
                {
                    debug!(
                        event_name = "notice.cleanup.failed",
                        correlation_id = %correlation_id,
                        channel_id = %posted.channel_id,
                        error = %error,
                        "self-deleting notice was already gone"
                    );
                }
            });
        }
        Ok(HandlerResult::Processed)
    }
}

/// Button presses: feedback form opening plus ticket notify and close.
pub struct ButtonPressHandler {
    feedback: Arc<FeedbackService>,
    tickets: Arc<TicketService>,
}

impl ButtonPressHandler {
    pub fn new(feedback: Arc<FeedbackService>, tickets: Arc<TicketService>) -> Self {
        Self { feedback, tickets }
    }
}

#[async_trait]
impl EventHandler for ButtonPressHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::ButtonPressed
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::ButtonPressed(press) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        let outcome = match press.custom_id.as_str() {
            FEEDBACK_CREATE_BUTTON => self.feedback.open_form(&press.actor).await,
            TICKET_NOTIFY_BUTTON => self.tickets.notify(press, &ctx.correlation_id).await,
            TICKET_CLOSE_BUTTON => self.tickets.close(press, &ctx.correlation_id).await,
            _ => return Ok(HandlerResult::Ignored),
        };
        Ok(respond(outcome, &press.custom_id, &press.actor.user_id, ctx))
    }
}

pub struct MenuSelectHandler {
    tickets: Arc<TicketService>,
}

impl MenuSelectHandler {
    pub fn new(tickets: Arc<TicketService>) -> Self {
        Self { tickets }
    }
}

#[async_trait]
impl EventHandler for MenuSelectHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::MenuSelected
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::MenuSelected(selection) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if selection.custom_id != TICKET_CATEGORY_MENU {
            return Ok(HandlerResult::Ignored);
        }

        let outcome = self.tickets.open(selection, &ctx.correlation_id).await;
        Ok(respond(outcome, &selection.custom_id, &selection.actor.user_id, ctx))
    }
}

pub struct ModalSubmitHandler {
    feedback: Arc<FeedbackService>,
}

impl ModalSubmitHandler {
    pub fn new(feedback: Arc<FeedbackService>) -> Self {
        Self { feedback }
    }
}

#[async_trait]
impl EventHandler for ModalSubmitHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::ModalSubmitted
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::ModalSubmitted(submission) = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };
        if submission.custom_id != FEEDBACK_MODAL {
            return Ok(HandlerResult::Ignored);
        }

        let outcome = self.feedback.submit(submission, &ctx.correlation_id).await;
        Ok(respond(outcome, &submission.custom_id, &submission.actor.user_id, ctx))
    }
}

/// Deleted messages cancel pending notice cleanup and unlink feedback.
pub struct MessageDeletedHandler {
    feedback: Arc<FeedbackService>,
    deferred: DeferredTasks,
}

impl MessageDeletedHandler {
    pub fn new(feedback: Arc<FeedbackService>, deferred: DeferredTasks) -> Self {
        Self { feedback, deferred }
    }
}

#[async_trait]
impl EventHandler for MessageDeletedHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::MessageDeleted
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::MessageDeleted { channel_id, message_id } = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        self.deferred.cancel(&DeferredKey::Message {
            channel_id: channel_id.clone(),
            message_id: message_id.clone(),
        });
        match self.feedback.log_message_deleted(message_id).await {
            Ok(Some(_)) => Ok(HandlerResult::Processed),
            Ok(None) => Ok(HandlerResult::Ignored),
            Err(error) => Err(EventHandlerError::Cleanup(error.to_string())),
        }
    }
}

pub struct ChannelDeletedHandler {
    tickets: Arc<TicketService>,
}

impl ChannelDeletedHandler {
    pub fn new(tickets: Arc<TicketService>) -> Self {
        Self { tickets }
    }
}

#[async_trait]
impl EventHandler for ChannelDeletedHandler {
    fn event_type(&self) -> ChatEventType {
        ChatEventType::ChannelDeleted
    }

    async fn handle(
        &self,
        envelope: &ChatEnvelope,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let ChatEvent::ChannelDeleted { channel_id } = &envelope.event else {
            return Ok(HandlerResult::Ignored);
        };

        match self.tickets.channel_removed(channel_id).await {
            Ok(Some(_)) => Ok(HandlerResult::Processed),
            Ok(None) => Ok(HandlerResult::Ignored),
            Err(error) => Err(EventHandlerError::Cleanup(error.to_string())),
        }
    }
}

/// Turns a service outcome into the interaction reply, mapping failures onto
/// the user-facing error taxonomy.
fn respond(
    outcome: Result<InteractionResponse, ApplicationError>,
    custom_id: &str,
    user_id: &str,
    ctx: &EventContext,
) -> HandlerResult {
    match outcome {
        Ok(response) => HandlerResult::Responded(response),
        Err(error) => {
            warn!(
                event_name = "interaction.failed",
                correlation_id = %ctx.correlation_id,
                custom_id,
                user_id,
                error = %error,
                "interaction handler failed"
            );
            let interface_error = error.into_interface(ctx.correlation_id.clone());
            HandlerResult::Responded(InteractionResponse::ephemeral(components::error_notice(
                &interface_error,
            )))
        }
    }
}

/// Repositories the community handlers share.
pub struct CommunityRepositories {
    pub feedback: Arc<dyn FeedbackRepository>,
    pub allowances: Arc<dyn AllowanceRepository>,
    pub tickets: Arc<dyn TicketRepository>,
}

/// Wires every handler the bot needs onto one dispatcher.
pub fn community_dispatcher(
    gateway: Arc<dyn ChatGateway>,
    repositories: CommunityRepositories,
    settings: Arc<BotSettings>,
    deferred: DeferredTasks,
) -> EventDispatcher {
    let feedback = Arc::new(FeedbackService::new(
        gateway.clone(),
        repositories.feedback,
        repositories.allowances.clone(),
        settings.clone(),
    ));
    let tickets = Arc::new(TicketService::new(
        gateway.clone(),
        repositories.tickets,
        settings.clone(),
        deferred.clone(),
    ));
    let router = CommandRouter::new(
        StoreCommandService::new(repositories.allowances, settings.clone()),
        settings.staff_role_id.clone(),
    );

    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(TextCommandHandler::new(router, gateway, deferred.clone(), settings));
    dispatcher.register(ButtonPressHandler::new(feedback.clone(), tickets.clone()));
    dispatcher.register(MenuSelectHandler::new(tickets.clone()));
    dispatcher.register(ModalSubmitHandler::new(feedback.clone()));
    dispatcher.register(MessageDeletedHandler::new(feedback, deferred));
    dispatcher.register(ChannelDeletedHandler::new(tickets));
    dispatcher
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tempfile::TempDir;

    use helpdesk_core::errors::ApplicationError;
    use helpdesk_db::{
        AllowanceRepository, JsonAllowanceRepository, JsonFeedbackRepository, JsonStore,
        JsonTicketRepository,
    };

    use super::{
        community_dispatcher, Actor, ButtonPress, ChatEnvelope, ChatEvent, CommunityRepositories,
        EventContext, EventDispatcher, HandlerResult, MenuSelection, TextMessage,
    };
    use crate::components::{self, InteractionResponse, FEEDBACK_CREATE_BUTTON};
    use crate::deferred::{DeferredKey, DeferredTasks};
    use crate::gateway::InMemoryGateway;
    use crate::settings::test_settings;

    struct Fixture {
        _dir: TempDir,
        store: Arc<JsonStore>,
        gateway: Arc<InMemoryGateway>,
        deferred: DeferredTasks,
        dispatcher: EventDispatcher,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().expect("tempdir");
        let store = Arc::new(JsonStore::new(dir.path().join("store.json")));
        let gateway = Arc::new(InMemoryGateway::new());
        let deferred = DeferredTasks::new();
        let dispatcher = community_dispatcher(
            gateway.clone(),
            CommunityRepositories {
                feedback: Arc::new(JsonFeedbackRepository::new(store.clone())),
                allowances: Arc::new(JsonAllowanceRepository::new(store.clone())),
                tickets: Arc::new(JsonTicketRepository::new(store.clone())),
            },
            Arc::new(test_settings()),
            deferred.clone(),
        );
        Fixture { _dir: dir, store, gateway, deferred, dispatcher }
    }

    fn actor(roles: &[&str]) -> Actor {
        Actor {
            user_id: "42".to_owned(),
            username: "alice".to_owned(),
            is_bot: false,
            role_ids: roles.iter().map(|role| role.to_string()).collect(),
            platform: None,
        }
    }

    fn envelope(event: ChatEvent) -> ChatEnvelope {
        ChatEnvelope { envelope_id: "env-1".to_owned(), event }
    }

    fn ctx() -> EventContext {
        EventContext { correlation_id: "env-1".to_owned() }
    }

    #[tokio::test]
    async fn community_dispatcher_registers_every_event_type() {
        let fixture = fixture();
        assert_eq!(fixture.dispatcher.handler_count(), 6);

        let result = fixture
            .dispatcher
            .dispatch(&envelope(ChatEvent::Unsupported { event_type: "typing".to_owned() }), &ctx())
            .await
            .expect("dispatch");
        assert_eq!(result, HandlerResult::Ignored);
    }

    #[tokio::test(start_paused = true)]
    async fn staff_notice_is_posted_then_deleted_after_ttl() {
        let fixture = fixture();
        let message = TextMessage {
            channel_id: "C1".to_owned(),
            message_id: "M1".to_owned(),
            author: actor(&[]),
            content: "!feedback".to_owned(),
        };

        let result = fixture
            .dispatcher
            .dispatch(&envelope(ChatEvent::MessageCreated(message)), &ctx())
            .await
            .expect("dispatch");
        assert_eq!(result, HandlerResult::Processed);

        let posted = fixture.gateway.messages_in("C1");
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].message, components::staff_only_notice());
        let key = DeferredKey::Message {
            channel_id: "C1".to_owned(),
            message_id: posted[0].message_id.clone(),
        };
        assert!(fixture.deferred.is_scheduled(&key));

        tokio::time::sleep(Duration::from_secs(6)).await;
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert!(fixture.gateway.messages_in("C1").is_empty());
        assert_eq!(fixture.gateway.deleted_messages().len(), 1);
    }

    #[tokio::test]
    async fn failed_grant_posts_short_lived_warning_to_staff() {
        let fixture = fixture();
        // a directory where the store file should be makes every write fail
        std::fs::create_dir_all(fixture.store.path()).expect("block store path");
        let message = TextMessage {
            channel_id: "C1".to_owned(),
            message_id: "M1".to_owned(),
            author: actor(&["500"]),
            content: "!allow <@77> 2".to_owned(),
        };

        let result = fixture
            .dispatcher
            .dispatch(&envelope(ChatEvent::MessageCreated(message)), &ctx())
            .await
            .expect("dispatch");
        assert_eq!(result, HandlerResult::Processed);

        let posted = fixture.gateway.messages_in("C1");
        assert_eq!(posted.len(), 1);
        let warning = ApplicationError::Persistence(String::new()).into_interface("env-1");
        assert_eq!(posted[0].message, components::error_notice(&warning));
        assert!(fixture.deferred.is_scheduled(&DeferredKey::Message {
            channel_id: "C1".to_owned(),
            message_id: posted[0].message_id.clone(),
        }));
    }

    #[tokio::test]
    async fn staff_panel_reply_is_not_scheduled_for_deletion() {
        let fixture = fixture();
        let message = TextMessage {
            channel_id: "C1".to_owned(),
            message_id: "M1".to_owned(),
            author: actor(&["500"]),
            content: "!ticketpanel".to_owned(),
        };

        fixture
            .dispatcher
            .dispatch(&envelope(ChatEvent::MessageCreated(message)), &ctx())
            .await
            .expect("dispatch");
        assert_eq!(fixture.gateway.messages_in("C1").len(), 1);
        assert_eq!(fixture.deferred.pending(), 0);
    }

    #[tokio::test]
    async fn feedback_button_opens_modal_only_with_allowance() {
        let fixture = fixture();
        let press = ChatEvent::ButtonPressed(ButtonPress {
            channel_id: "C1".to_owned(),
            message_id: "panel".to_owned(),
            actor: actor(&[]),
            custom_id: FEEDBACK_CREATE_BUTTON.to_owned(),
        });

        let refused = fixture.dispatcher.dispatch(&envelope(press.clone()), &ctx()).await;
        assert_eq!(
            refused.expect("dispatch"),
            HandlerResult::Responded(InteractionResponse::ephemeral(
                components::feedback_not_allowed()
            ))
        );

        JsonAllowanceRepository::new(fixture.store.clone()).grant("42", 1).await.expect("grant");
        let opened = fixture.dispatcher.dispatch(&envelope(press), &ctx()).await.expect("dispatch");
        assert!(matches!(opened, HandlerResult::Responded(InteractionResponse::Modal { .. })));
    }

    #[tokio::test]
    async fn service_failures_become_ephemeral_error_notices() {
        let fixture = fixture();
        fixture.gateway.reject_channel_creation();
        let selection = ChatEvent::MenuSelected(MenuSelection {
            channel_id: "panel".to_owned(),
            message_id: "panel-msg".to_owned(),
            actor: actor(&[]),
            custom_id: "ticket.category".to_owned(),
            values: vec!["general_support".to_owned()],
        });

        let result =
            fixture.dispatcher.dispatch(&envelope(selection), &ctx()).await.expect("dispatch");
        let HandlerResult::Responded(InteractionResponse::Message { ephemeral, message }) = result
        else {
            panic!("expected an ephemeral message response");
        };
        assert!(ephemeral);
        let content = message.content.expect("notice text");
        assert!(content.contains("Please try again shortly"));
        assert!(content.contains("env-1"));
    }

    #[tokio::test]
    async fn unknown_controls_are_ignored() {
        let fixture = fixture();
        let press = ChatEvent::ButtonPressed(ButtonPress {
            channel_id: "C1".to_owned(),
            message_id: "m".to_owned(),
            actor: actor(&[]),
            custom_id: "poll.vote".to_owned(),
        });
        let result = fixture.dispatcher.dispatch(&envelope(press), &ctx()).await.expect("dispatch");
        assert_eq!(result, HandlerResult::Ignored);
    }
}
