use chrono::{DateTime, Utc};
use serde::Serialize;

use helpdesk_core::domain::feedback::{FeedbackRecord, MAX_COMMENT_CHARS, MAX_RATING};
use helpdesk_core::domain::ticket::TicketCategory;
use helpdesk_core::errors::InterfaceError;

pub const FEEDBACK_CREATE_BUTTON: &str = "feedback.create";
pub const FEEDBACK_MODAL: &str = "feedback.submit";
pub const FEEDBACK_RATING_FIELD: &str = "rating";
pub const FEEDBACK_COMMENT_FIELD: &str = "comment";
pub const TICKET_CATEGORY_MENU: &str = "ticket.category";
pub const TICKET_NOTIFY_BUTTON: &str = "ticket.notify";
pub const TICKET_CLOSE_BUTTON: &str = "ticket.close";

/// Colour and thumbnail shared by every embed the bot posts.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Branding {
    pub color: u32,
    pub thumbnail_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    pub inline: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub color: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonStyle {
    Primary,
    Secondary,
    Success,
    Danger,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Button {
    pub custom_id: String,
    pub label: String,
    pub style: ButtonStyle,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

impl Button {
    pub fn new(custom_id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            custom_id: custom_id.into(),
            label: label.into(),
            style: ButtonStyle::Secondary,
            emoji: None,
        }
    }

    pub fn style(mut self, style: ButtonStyle) -> Self {
        self.style = style;
        self
    }

    pub fn emoji(mut self, emoji: impl Into<String>) -> Self {
        self.emoji = Some(emoji.into());
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emoji: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SelectMenu {
    pub custom_id: String,
    pub placeholder: String,
    pub options: Vec<SelectOption>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionRow {
    Buttons { buttons: Vec<Button> },
    Select { menu: SelectMenu },
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct MessageTemplate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Embed>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<ActionRow>,
}

impl MessageTemplate {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: Some(content.into()), ..Self::default() }
    }

    /// Every custom id reachable from this message's controls.
    pub fn custom_ids(&self) -> Vec<&str> {
        self.rows
            .iter()
            .flat_map(|row| match row {
                ActionRow::Buttons { buttons } => {
                    buttons.iter().map(|button| button.custom_id.as_str()).collect::<Vec<_>>()
                }
                ActionRow::Select { menu } => vec![menu.custom_id.as_str()],
            })
            .collect()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TextInputStyle {
    Short,
    Paragraph,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TextInput {
    pub custom_id: String,
    pub label: String,
    pub style: TextInputStyle,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub placeholder: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ModalTemplate {
    pub custom_id: String,
    pub title: String,
    pub inputs: Vec<TextInput>,
}

/// What the transport sends back for an interactive event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractionResponse {
    Message { ephemeral: bool, message: MessageTemplate },
    Modal { modal: ModalTemplate },
    Acknowledge,
}

impl InteractionResponse {
    pub fn ephemeral(message: MessageTemplate) -> Self {
        Self::Message { ephemeral: true, message }
    }

    pub fn public(message: MessageTemplate) -> Self {
        Self::Message { ephemeral: false, message }
    }
}

pub struct MessageBuilder {
    content: Option<String>,
    embeds: Vec<Embed>,
    rows: Vec<ActionRow>,
}

impl MessageBuilder {
    pub fn new() -> Self {
        Self { content: None, embeds: Vec::new(), rows: Vec::new() }
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn embed<F>(mut self, branding: &Branding, build: F) -> Self
    where
        F: FnOnce(&mut EmbedBuilder),
    {
        let mut builder = EmbedBuilder {
            embed: Embed {
                color: branding.color,
                thumbnail_url: branding.thumbnail_url.clone(),
                ..Embed::default()
            },
        };
        build(&mut builder);
        self.embeds.push(builder.embed);
        self
    }

    pub fn buttons<F>(mut self, build: F) -> Self
    where
        F: FnOnce(&mut ButtonRowBuilder),
    {
        let mut builder = ButtonRowBuilder::default();
        build(&mut builder);
        if !builder.buttons.is_empty() {
            self.rows.push(ActionRow::Buttons { buttons: builder.buttons });
        }
        self
    }

    pub fn select(mut self, menu: SelectMenu) -> Self {
        self.rows.push(ActionRow::Select { menu });
        self
    }

    pub fn build(self) -> MessageTemplate {
        MessageTemplate { content: self.content, embeds: self.embeds, rows: self.rows }
    }
}

impl Default for MessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub struct EmbedBuilder {
    embed: Embed,
}

impl EmbedBuilder {
    pub fn title(&mut self, title: impl Into<String>) -> &mut Self {
        self.embed.title = Some(title.into());
        self
    }

    pub fn description(&mut self, description: impl Into<String>) -> &mut Self {
        self.embed.description = Some(description.into());
        self
    }

    pub fn field(
        &mut self,
        name: impl Into<String>,
        value: impl Into<String>,
        inline: bool,
    ) -> &mut Self {
        self.embed.fields.push(EmbedField { name: name.into(), value: value.into(), inline });
        self
    }

    pub fn footer(&mut self, footer: impl Into<String>) -> &mut Self {
        self.embed.footer = Some(footer.into());
        self
    }

    pub fn timestamp(&mut self, timestamp: DateTime<Utc>) -> &mut Self {
        self.embed.timestamp = Some(timestamp);
        self
    }
}

#[derive(Default)]
pub struct ButtonRowBuilder {
    buttons: Vec<Button>,
}

impl ButtonRowBuilder {
    pub fn button(&mut self, button: Button) -> &mut Self {
        self.buttons.push(button);
        self
    }
}

pub fn user_mention(user_id: &str) -> String {
    format!("<@{user_id}>")
}

pub fn role_mention(role_id: &str) -> String {
    format!("<@&{role_id}>")
}

pub fn channel_mention(channel_id: &str) -> String {
    format!("<#{channel_id}>")
}

pub fn pong() -> MessageTemplate {
    MessageTemplate::text("Pong!")
}

pub fn staff_only_notice() -> MessageTemplate {
    MessageTemplate::text("⛔ Only staff members can use this.")
}

pub fn allow_usage() -> MessageTemplate {
    MessageTemplate::text("Usage: `!allow @user <amount>` where amount is at least 1.")
}

pub fn allowance_granted(user_id: &str, amount: u32) -> MessageTemplate {
    let noun = if amount == 1 { "submission" } else { "submissions" };
    MessageTemplate::text(format!(
        "✅ {} may now send {amount} feedback {noun}.",
        user_mention(user_id)
    ))
}

pub fn feedback_panel(branding: &Branding) -> MessageTemplate {
    MessageBuilder::new()
        .embed(branding, |embed| {
            embed.title("📝 Share your feedback").description(
                "Tell us how we are doing! Press the button below to rate your experience \
                 and leave an optional comment.",
            );
        })
        .buttons(|row| {
            row.button(
                Button::new(FEEDBACK_CREATE_BUTTON, "Create feedback")
                    .style(ButtonStyle::Primary)
                    .emoji("📝"),
            );
        })
        .build()
}

pub fn feedback_modal() -> ModalTemplate {
    ModalTemplate {
        custom_id: FEEDBACK_MODAL.to_owned(),
        title: "Leave feedback".to_owned(),
        inputs: vec![
            TextInput {
                custom_id: FEEDBACK_RATING_FIELD.to_owned(),
                label: format!("Rating (1-{MAX_RATING})"),
                style: TextInputStyle::Short,
                required: true,
                min_length: Some(1),
                max_length: Some(1),
                placeholder: Some("5".to_owned()),
            },
            TextInput {
                custom_id: FEEDBACK_COMMENT_FIELD.to_owned(),
                label: "Comment".to_owned(),
                style: TextInputStyle::Paragraph,
                required: false,
                min_length: None,
                max_length: Some(MAX_COMMENT_CHARS as u16),
                placeholder: Some("What went well? What could be better?".to_owned()),
            },
        ],
    }
}

pub fn feedback_log_embed(branding: &Branding, record: &FeedbackRecord) -> MessageTemplate {
    MessageBuilder::new()
        .embed(branding, |embed| {
            embed
                .title("New feedback")
                .field(
                    "User",
                    format!("{} ({})", user_mention(&record.user_id), record.username),
                    true,
                )
                .field(
                    "Rating",
                    format!("{} ({}/{MAX_RATING})", record.rating.stars(), record.rating.value()),
                    true,
                )
                .field(
                    "Platform",
                    record.platform.map(|platform| platform.label()).unwrap_or("Unknown"),
                    true,
                )
                .field("Comment", record.comment.as_deref().unwrap_or("No comment"), false)
                .footer(format!("Feedback ID: {}", record.id))
                .timestamp(record.created_at);
        })
        .build()
}

pub fn feedback_confirmation(remaining: u32) -> MessageTemplate {
    MessageTemplate::text(format!(
        "🙏 Thanks for your feedback! Remaining submissions: {remaining}."
    ))
}

pub fn feedback_not_allowed() -> MessageTemplate {
    MessageTemplate::text(
        "You are not allowed to leave feedback right now. Ask a staff member for access.",
    )
}

pub fn invalid_rating_notice() -> MessageTemplate {
    MessageTemplate::text(format!(
        "⚠️ The rating must be a whole number from 1 to {MAX_RATING}. Please resubmit the form."
    ))
}

pub fn ticket_panel(branding: &Branding) -> MessageTemplate {
    let options = TicketCategory::ALL
        .into_iter()
        .map(|category| SelectOption {
            value: category.key().to_owned(),
            label: category.label().to_owned(),
            description: Some(category.description().to_owned()),
            emoji: Some(category.emoji().to_owned()),
        })
        .collect();

    MessageBuilder::new()
        .embed(branding, |embed| {
            embed.title("🎫 Support tickets").description(
                "Need help? Pick the category that fits your request and a private channel \
                 will be opened for you and the staff team.",
            );
        })
        .select(SelectMenu {
            custom_id: TICKET_CATEGORY_MENU.to_owned(),
            placeholder: "Choose a ticket category".to_owned(),
            options,
        })
        .build()
}

pub fn ticket_intro(
    branding: &Branding,
    owner_id: &str,
    staff_role_id: &str,
    category: TicketCategory,
) -> MessageTemplate {
    MessageBuilder::new()
        .content(format!("{} {}", user_mention(owner_id), role_mention(staff_role_id)))
        .embed(branding, |embed| {
            embed
                .title(format!("{} {}", category.emoji(), category.label()))
                .description(
                    "Thanks for reaching out! Describe your issue in as much detail as you can \
                     and a staff member will be with you shortly.",
                )
                .field("Opened by", user_mention(owner_id), true);
        })
        .buttons(|row| {
            row.button(Button::new(TICKET_NOTIFY_BUTTON, "Notify user").emoji("🔔")).button(
                Button::new(TICKET_CLOSE_BUTTON, "Close ticket")
                    .style(ButtonStyle::Danger)
                    .emoji("🔒"),
            );
        })
        .build()
}

pub fn ticket_existing(channel_id: &str) -> MessageTemplate {
    MessageTemplate::text(format!(
        "You already have an open ticket: {}",
        channel_mention(channel_id)
    ))
}

pub fn ticket_pending() -> MessageTemplate {
    MessageTemplate::text("Your ticket is still being created. Please wait a moment.")
}

pub fn ticket_created(channel_id: &str) -> MessageTemplate {
    MessageTemplate::text(format!(
        "✅ Your ticket has been created: {}",
        channel_mention(channel_id)
    ))
}

pub fn ticket_notify_dm(channel_id: &str) -> MessageTemplate {
    MessageTemplate::text(format!(
        "🔔 A staff member is waiting for your reply in {}.",
        channel_mention(channel_id)
    ))
}

pub fn ticket_notified(owner_id: &str) -> MessageTemplate {
    MessageTemplate::text(format!("🔔 {} has been notified.", user_mention(owner_id)))
}

pub fn ticket_notify_failed() -> MessageTemplate {
    MessageTemplate::text(
        "⚠️ Could not notify the ticket owner. They may have direct messages disabled.",
    )
}

pub fn ticket_untracked() -> MessageTemplate {
    MessageTemplate::text("⚠️ This channel is not a ticket or its owner could not be found.")
}

pub fn ticket_closing_notice(delay_secs: u64) -> MessageTemplate {
    MessageTemplate::text(format!("🔒 This ticket will be deleted in {delay_secs} seconds."))
}

pub fn ticket_closed_dm(category: Option<TicketCategory>) -> MessageTemplate {
    let what = category.map(|category| format!(" ({})", category.label())).unwrap_or_default();
    MessageTemplate::text(format!(
        "Your support ticket{what} has been closed by staff. Thanks for reaching out!"
    ))
}

pub fn ticket_already_closing() -> MessageTemplate {
    MessageTemplate::text("This ticket is already closing.")
}

pub fn error_notice(error: &InterfaceError) -> MessageTemplate {
    MessageTemplate::text(format!(
        "{} (ref: `{}`)",
        error.user_message(),
        error.correlation_id()
    ))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use helpdesk_core::domain::feedback::{ClientPlatform, FeedbackDraft, FeedbackRecord};
    use helpdesk_core::domain::ticket::TicketCategory;
    use helpdesk_core::errors::{ApplicationError, InterfaceError};

    use super::{
        error_notice, feedback_log_embed, feedback_modal, feedback_panel, ticket_intro,
        ticket_panel, ActionRow, Branding, Button, ButtonStyle, MessageBuilder, TextInputStyle,
        FEEDBACK_CREATE_BUTTON, TICKET_CATEGORY_MENU, TICKET_CLOSE_BUTTON, TICKET_NOTIFY_BUTTON,
    };

    fn branding() -> Branding {
        Branding { color: 0x5865F2, thumbnail_url: Some("https://cdn.example/logo.png".to_owned()) }
    }

    #[test]
    fn message_builder_applies_branding_to_every_embed() {
        let message = MessageBuilder::new()
            .content("hello")
            .embed(&branding(), |embed| {
                embed.title("first");
            })
            .embed(&branding(), |embed| {
                embed.title("second").field("a", "b", true);
            })
            .buttons(|row| {
                row.button(Button::new("x", "X").style(ButtonStyle::Success));
            })
            .buttons(|_| {})
            .build();

        assert_eq!(message.content.as_deref(), Some("hello"));
        assert_eq!(message.embeds.len(), 2);
        assert!(message.embeds.iter().all(|embed| embed.color == 0x5865F2));
        assert!(message
            .embeds
            .iter()
            .all(|embed| embed.thumbnail_url.as_deref() == Some("https://cdn.example/logo.png")));
        assert_eq!(message.rows.len(), 1, "empty button rows are dropped");
        assert_eq!(message.custom_ids(), vec!["x"]);
    }

    #[test]
    fn feedback_panel_exposes_create_button() {
        let panel = feedback_panel(&branding());
        assert_eq!(panel.custom_ids(), vec![FEEDBACK_CREATE_BUTTON]);
    }

    #[test]
    fn feedback_modal_limits_rating_to_one_character() {
        let modal = feedback_modal();
        let rating = &modal.inputs[0];
        assert_eq!(rating.style, TextInputStyle::Short);
        assert!(rating.required);
        assert_eq!((rating.min_length, rating.max_length), (Some(1), Some(1)));

        let comment = &modal.inputs[1];
        assert_eq!(comment.style, TextInputStyle::Paragraph);
        assert!(!comment.required);
        assert_eq!(comment.max_length, Some(1000));
    }

    #[test]
    fn log_embed_carries_stars_comment_and_platform() {
        let draft = FeedbackDraft::from_form("4", Some("great")).expect("draft");
        let record =
            FeedbackRecord::new("42", "alice", draft, Some(ClientPlatform::Mobile), Utc::now());
        let message = feedback_log_embed(&branding(), &record);

        let fields = &message.embeds[0].fields;
        assert_eq!(fields[0].value, "<@42> (alice)");
        assert_eq!(fields[1].value, "★★★★☆ (4/5)");
        assert_eq!(fields[2].value, "Mobile");
        assert_eq!(fields[3].value, "great");
        assert_eq!(message.embeds[0].footer, Some(format!("Feedback ID: {}", record.id)));
    }

    #[test]
    fn ticket_panel_lists_every_category() {
        let panel = ticket_panel(&branding());
        let menu = panel
            .rows
            .iter()
            .find_map(|row| match row {
                ActionRow::Select { menu } => Some(menu),
                ActionRow::Buttons { .. } => None,
            })
            .expect("select row");

        assert_eq!(menu.custom_id, TICKET_CATEGORY_MENU);
        let values: Vec<_> = menu.options.iter().map(|option| option.value.as_str()).collect();
        assert_eq!(
            values,
            vec!["general_support", "purchase_issue", "bug_report", "other_question"]
        );
    }

    #[test]
    fn ticket_intro_mentions_owner_and_staff_with_controls() {
        let intro = ticket_intro(&branding(), "7", "99", TicketCategory::BugReport);
        assert_eq!(intro.content.as_deref(), Some("<@7> <@&99>"));
        assert_eq!(intro.custom_ids(), vec![TICKET_NOTIFY_BUTTON, TICKET_CLOSE_BUTTON]);
    }

    #[test]
    fn error_notice_includes_correlation_id() {
        let error: InterfaceError =
            ApplicationError::Persistence("disk full".to_owned()).into_interface("evt-1");
        let notice = error_notice(&error);
        let content = notice.content.expect("text notice");
        assert!(content.starts_with(error.user_message()));
        assert!(content.contains("evt-1"));
        assert!(!content.contains("disk full"), "internal details stay out of user replies");
    }
}
