use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use helpdesk_core::errors::ApplicationError;

use crate::components::MessageTemplate;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("user {0} does not accept direct messages")]
    DirectMessagesDisabled(String),
    #[error("missing platform permission: {0}")]
    Forbidden(String),
    #[error("platform request failed: {0}")]
    Request(String),
}

impl From<GatewayError> for ApplicationError {
    fn from(error: GatewayError) -> Self {
        Self::Integration(error.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PostedMessage {
    pub channel_id: String,
    pub message_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
    pub parent_id: Option<String>,
    pub topic: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ViewChannel,
    SendMessages,
    ReadMessageHistory,
    AttachFiles,
}

impl Permission {
    pub const TICKET_MEMBER: [Self; 4] =
        [Self::ViewChannel, Self::SendMessages, Self::ReadMessageHistory, Self::AttachFiles];
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum OverwriteTarget {
    Everyone,
    Role(String),
    Member(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct PermissionOverwrite {
    pub target: OverwriteTarget,
    pub allow: Vec<Permission>,
    pub deny: Vec<Permission>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ChannelSpec {
    pub name: String,
    pub parent_id: String,
    pub topic: String,
    pub overwrites: Vec<PermissionOverwrite>,
}

/// Outbound calls the bot makes against the chat platform.
#[async_trait]
pub trait ChatGateway: Send + Sync {
    async fn send_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<PostedMessage, GatewayError>;

    async fn send_direct_message(
        &self,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<PostedMessage, GatewayError>;

    async fn delete_message(&self, channel_id: &str, message_id: &str)
        -> Result<(), GatewayError>;

    async fn list_channels(&self, parent_id: &str) -> Result<Vec<ChannelInfo>, GatewayError>;

    async fn fetch_channel(&self, channel_id: &str) -> Result<ChannelInfo, GatewayError>;

    async fn create_channel(&self, spec: &ChannelSpec) -> Result<ChannelInfo, GatewayError>;

    async fn delete_channel(&self, channel_id: &str) -> Result<(), GatewayError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub channel_id: String,
    pub message_id: String,
    pub message: MessageTemplate,
}

#[derive(Default)]
struct GatewayState {
    next_id: u64,
    channels: Vec<ChannelInfo>,
    created: Vec<ChannelSpec>,
    messages: Vec<SentMessage>,
    direct_messages: Vec<(String, MessageTemplate)>,
    deleted_messages: Vec<PostedMessage>,
    deleted_channels: Vec<String>,
    channel_deletion_attempts: Vec<String>,
    blocked_dms: HashSet<String>,
    failing_channels: HashSet<String>,
    reject_channel_creation: bool,
}

impl GatewayState {
    fn allocate_id(&mut self) -> String {
        self.next_id += 1;
        (900_000 + self.next_id).to_string()
    }
}

/// Gateway used when no platform connection is configured; every call fails.
#[derive(Default)]
pub struct OfflineGateway;

impl OfflineGateway {
    fn unavailable(operation: &str) -> GatewayError {
        GatewayError::Request(format!("{operation}: chat gateway is not connected"))
    }
}

#[async_trait]
impl ChatGateway for OfflineGateway {
    async fn send_message(
        &self,
        _channel_id: &str,
        _message: &MessageTemplate,
    ) -> Result<PostedMessage, GatewayError> {
        Err(Self::unavailable("send_message"))
    }

    async fn send_direct_message(
        &self,
        _user_id: &str,
        _message: &MessageTemplate,
    ) -> Result<PostedMessage, GatewayError> {
        Err(Self::unavailable("send_direct_message"))
    }

    async fn delete_message(
        &self,
        _channel_id: &str,
        _message_id: &str,
    ) -> Result<(), GatewayError> {
        Err(Self::unavailable("delete_message"))
    }

    async fn list_channels(&self, _parent_id: &str) -> Result<Vec<ChannelInfo>, GatewayError> {
        Err(Self::unavailable("list_channels"))
    }

    async fn fetch_channel(&self, _channel_id: &str) -> Result<ChannelInfo, GatewayError> {
        Err(Self::unavailable("fetch_channel"))
    }

    async fn create_channel(&self, _spec: &ChannelSpec) -> Result<ChannelInfo, GatewayError> {
        Err(Self::unavailable("create_channel"))
    }

    async fn delete_channel(&self, _channel_id: &str) -> Result<(), GatewayError> {
        Err(Self::unavailable("delete_channel"))
    }
}

/// Chat platform double that records every call in memory.
#[derive(Default)]
pub struct InMemoryGateway {
    state: Mutex<GatewayState>,
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(self, channel: ChannelInfo) -> Self {
        self.lock().channels.push(channel);
        self
    }

    pub fn block_direct_messages(&self, user_id: &str) {
        self.lock().blocked_dms.insert(user_id.to_owned());
    }

    pub fn fail_channel(&self, channel_id: &str) {
        self.lock().failing_channels.insert(channel_id.to_owned());
    }

    pub fn reject_channel_creation(&self) {
        self.lock().reject_channel_creation = true;
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.lock().messages.clone()
    }

    pub fn messages_in(&self, channel_id: &str) -> Vec<SentMessage> {
        self.lock().messages.iter().filter(|sent| sent.channel_id == channel_id).cloned().collect()
    }

    pub fn direct_messages(&self) -> Vec<(String, MessageTemplate)> {
        self.lock().direct_messages.clone()
    }

    pub fn deleted_messages(&self) -> Vec<PostedMessage> {
        self.lock().deleted_messages.clone()
    }

    pub fn deleted_channels(&self) -> Vec<String> {
        self.lock().deleted_channels.clone()
    }

    pub fn channel_deletion_attempts(&self) -> Vec<String> {
        self.lock().channel_deletion_attempts.clone()
    }

    pub fn channels(&self) -> Vec<ChannelInfo> {
        self.lock().channels.clone()
    }

    pub fn created_channels(&self) -> Vec<ChannelSpec> {
        self.lock().created.clone()
    }

    fn lock(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl ChatGateway for InMemoryGateway {
    async fn send_message(
        &self,
        channel_id: &str,
        message: &MessageTemplate,
    ) -> Result<PostedMessage, GatewayError> {
        let mut state = self.lock();
        if state.failing_channels.contains(channel_id) {
            return Err(GatewayError::Request(format!("send to channel {channel_id} failed")));
        }
        if state.deleted_channels.iter().any(|deleted| deleted == channel_id) {
            return Err(GatewayError::NotFound(format!("channel {channel_id}")));
        }

        let message_id = state.allocate_id();
        state.messages.push(SentMessage {
            channel_id: channel_id.to_owned(),
            message_id: message_id.clone(),
            message: message.clone(),
        });
        Ok(PostedMessage { channel_id: channel_id.to_owned(), message_id })
    }

    async fn send_direct_message(
        &self,
        user_id: &str,
        message: &MessageTemplate,
    ) -> Result<PostedMessage, GatewayError> {
        let mut state = self.lock();
        if state.blocked_dms.contains(user_id) {
            return Err(GatewayError::DirectMessagesDisabled(user_id.to_owned()));
        }

        let message_id = state.allocate_id();
        state.direct_messages.push((user_id.to_owned(), message.clone()));
        Ok(PostedMessage { channel_id: format!("dm-{user_id}"), message_id })
    }

    async fn delete_message(
        &self,
        channel_id: &str,
        message_id: &str,
    ) -> Result<(), GatewayError> {
        let mut state = self.lock();
        let Some(index) = state
            .messages
            .iter()
            .position(|sent| sent.channel_id == channel_id && sent.message_id == message_id)
        else {
            return Err(GatewayError::NotFound(format!("message {message_id}")));
        };
        state.messages.remove(index);
        state.deleted_messages.push(PostedMessage {
            channel_id: channel_id.to_owned(),
            message_id: message_id.to_owned(),
        });
        Ok(())
    }

    async fn list_channels(&self, parent_id: &str) -> Result<Vec<ChannelInfo>, GatewayError> {
        Ok(self
            .lock()
            .channels
            .iter()
            .filter(|channel| channel.parent_id.as_deref() == Some(parent_id))
            .cloned()
            .collect())
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<ChannelInfo, GatewayError> {
        self.lock()
            .channels
            .iter()
            .find(|channel| channel.id == channel_id)
            .cloned()
            .ok_or_else(|| GatewayError::NotFound(format!("channel {channel_id}")))
    }

    async fn create_channel(&self, spec: &ChannelSpec) -> Result<ChannelInfo, GatewayError> {
        let mut state = self.lock();
        if state.reject_channel_creation {
            return Err(GatewayError::Forbidden("manage channels".to_owned()));
        }

        let channel = ChannelInfo {
            id: state.allocate_id(),
            name: spec.name.clone(),
            parent_id: Some(spec.parent_id.clone()),
            topic: Some(spec.topic.clone()),
        };
        state.channels.push(channel.clone());
        state.created.push(spec.clone());
        Ok(channel)
    }

    async fn delete_channel(&self, channel_id: &str) -> Result<(), GatewayError> {
        let mut state = self.lock();
        state.channel_deletion_attempts.push(channel_id.to_owned());
        if state.failing_channels.contains(channel_id) {
            return Err(GatewayError::Request(format!("delete channel {channel_id} failed")));
        }
        let Some(index) = state.channels.iter().position(|channel| channel.id == channel_id) else {
            return Err(GatewayError::NotFound(format!("channel {channel_id}")));
        };
        state.channels.remove(index);
        state.deleted_channels.push(channel_id.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ChannelInfo, ChannelSpec, ChatGateway, GatewayError, InMemoryGateway, OfflineGateway,
    };
    use crate::components::MessageTemplate;

    #[tokio::test]
    async fn in_memory_gateway_tracks_channel_lifecycle() {
        let gateway = InMemoryGateway::new().with_channel(ChannelInfo {
            id: "1".to_owned(),
            name: "general".to_owned(),
            parent_id: None,
            topic: None,
        });

        let created = gateway
            .create_channel(&ChannelSpec {
                name: "ticket-alice".to_owned(),
                parent_id: "cat".to_owned(),
                topic: "UserID:7 | Type: Other Question".to_owned(),
                overwrites: Vec::new(),
            })
            .await
            .expect("create");

        let listed = gateway.list_channels("cat").await.expect("list");
        assert_eq!(listed, vec![created.clone()]);

        gateway.delete_channel(&created.id).await.expect("delete");
        assert!(matches!(
            gateway.fetch_channel(&created.id).await,
            Err(GatewayError::NotFound(_))
        ));
        assert!(matches!(
            gateway.send_message(&created.id, &MessageTemplate::text("late")).await,
            Err(GatewayError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn blocked_direct_messages_are_reported() {
        let gateway = InMemoryGateway::new();
        gateway.block_direct_messages("7");

        let error = gateway
            .send_direct_message("7", &MessageTemplate::text("hi"))
            .await
            .expect_err("blocked");
        assert_eq!(error, GatewayError::DirectMessagesDisabled("7".to_owned()));
        assert!(gateway.direct_messages().is_empty());
    }

    #[tokio::test]
    async fn offline_gateway_refuses_every_call() {
        let gateway = OfflineGateway;
        assert!(matches!(
            gateway.send_message("1", &MessageTemplate::text("hi")).await,
            Err(GatewayError::Request(_))
        ));
        assert!(matches!(gateway.list_channels("cat").await, Err(GatewayError::Request(_))));
    }
}
