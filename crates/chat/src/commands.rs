use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use helpdesk_core::domain::allowance::parse_grant_amount;
use helpdesk_core::flows::{
    FeedbackContext, FeedbackEvent, FeedbackFlow, FeedbackState, FlowTransitionError,
};
use helpdesk_db::AllowanceRepository;

use crate::components::{self, MessageTemplate};
use crate::events::TextMessage;
use crate::settings::BotSettings;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TextCommand {
    Ping,
    Allow { user_id: String, amount: u32 },
    FeedbackPanel,
    TicketPanel,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("malformed allow command; expected `!allow <@user|id> <amount>`")]
    AllowUsage,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommandRouteError {
    #[error("command service failed: {0}")]
    Service(String),
    #[error(transparent)]
    Flow(#[from] FlowTransitionError),
}

/// What the router wants posted back into the command's channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommandReply {
    /// A lasting message such as a panel.
    Reply(MessageTemplate),
    /// A short-lived message removed after the notice TTL.
    Notice(MessageTemplate),
    Silent,
}

/// Parses a chat message into a command. `Ok(None)` means the text is not a
/// command at all.
pub fn parse_text_command(text: &str) -> Result<Option<TextCommand>, CommandParseError> {
    let trimmed = text.trim();
    let mut parts = trimmed.split_whitespace();
    let verb = parts.next().unwrap_or_default().to_ascii_lowercase();
    let args: Vec<&str> = parts.collect();

    let command = match verb.as_str() {
        "ping" if args.is_empty() => TextCommand::Ping,
        "!feedback" => TextCommand::FeedbackPanel,
        "!ticketpanel" => TextCommand::TicketPanel,
        "!allow" => {
            let [target, amount] = args.as_slice() else {
                return Err(CommandParseError::AllowUsage);
            };
            let user_id = parse_user_reference(target).ok_or(CommandParseError::AllowUsage)?;
            let amount = parse_grant_amount(amount).map_err(|_| CommandParseError::AllowUsage)?;
            TextCommand::Allow { user_id, amount }
        }
        _ => return Ok(None),
    };
    Ok(Some(command))
}

/// Accepts `<@id>`, `<@!id>` or a bare numeric id.
pub fn parse_user_reference(raw: &str) -> Option<String> {
    let id = match raw.strip_prefix("<@").and_then(|rest| rest.strip_suffix('>')) {
        Some(inner) => inner.strip_prefix('!').unwrap_or(inner),
        None => raw,
    };
    (!id.is_empty() && id.chars().all(|ch| ch.is_ascii_digit())).then(|| id.to_owned())
}

#[async_trait]
pub trait TextCommandService: Send + Sync {
    async fn grant_allowance(&self, user_id: &str, amount: u32) -> Result<u32, CommandRouteError>;
    fn feedback_panel(&self) -> MessageTemplate;
    fn ticket_panel(&self) -> MessageTemplate;
}

pub struct CommandRouter<S> {
    service: S,
    staff_role_id: String,
    feedback_flow: FeedbackFlow,
}

impl<S> CommandRouter<S>
where
    S: TextCommandService,
{
    pub fn new(service: S, staff_role_id: impl Into<String>) -> Self {
        Self { service, staff_role_id: staff_role_id.into(), feedback_flow: FeedbackFlow }
    }

    pub async fn route(&self, message: &TextMessage) -> Result<CommandReply, CommandRouteError> {
        if message.author.is_bot {
            return Ok(CommandReply::Silent);
        }
        let is_staff = message.author.role_ids.iter().any(|role| role == &self.staff_role_id);

        let command = match parse_text_command(&message.content) {
            Ok(Some(command)) => command,
            Ok(None) => return Ok(CommandReply::Silent),
            Err(CommandParseError::AllowUsage) if is_staff => {
                return Ok(CommandReply::Notice(components::allow_usage()));
            }
            Err(CommandParseError::AllowUsage) => {
                return Ok(CommandReply::Notice(components::staff_only_notice()));
            }
        };

        match command {
            TextCommand::Ping => Ok(CommandReply::Reply(components::pong())),
            TextCommand::FeedbackPanel => {
                let context = FeedbackContext { actor_is_staff: is_staff, ..Default::default() };
                match self.feedback_flow.apply(
                    FeedbackState::Idle,
                    FeedbackEvent::PanelRequested,
                    &context,
                ) {
                    Ok(_) => Ok(CommandReply::Reply(self.service.feedback_panel())),
                    Err(FlowTransitionError::StaffOnly) => {
                        Ok(CommandReply::Notice(components::staff_only_notice()))
                    }
                    Err(other) => Err(other.into()),
                }
            }
            TextCommand::TicketPanel if is_staff => {
                Ok(CommandReply::Reply(self.service.ticket_panel()))
            }
            TextCommand::Allow { user_id, amount } if is_staff => {
                let granted = self.service.grant_allowance(&user_id, amount).await?;
                Ok(CommandReply::Notice(components::allowance_granted(&user_id, granted)))
            }
            TextCommand::TicketPanel | TextCommand::Allow { .. } => {
                Ok(CommandReply::Notice(components::staff_only_notice()))
            }
        }
    }
}

/// Command service backed by the allowance store.
pub struct StoreCommandService {
    allowances: Arc<dyn AllowanceRepository>,
    settings: Arc<BotSettings>,
}

impl StoreCommandService {
    pub fn new(allowances: Arc<dyn AllowanceRepository>, settings: Arc<BotSettings>) -> Self {
        Self { allowances, settings }
    }
}

#[async_trait]
impl TextCommandService for StoreCommandService {
    async fn grant_allowance(&self, user_id: &str, amount: u32) -> Result<u32, CommandRouteError> {
        self.allowances
            .grant(user_id, amount)
            .await
            .map_err(|error| CommandRouteError::Service(error.to_string()))
    }

    fn feedback_panel(&self) -> MessageTemplate {
        components::feedback_panel(&self.settings.branding)
    }

    fn ticket_panel(&self) -> MessageTemplate {
        components::ticket_panel(&self.settings.branding)
    }
}
