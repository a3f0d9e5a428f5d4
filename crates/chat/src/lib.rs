//! Chat surface for the helpdesk bot
//!
//! This crate turns chat-platform events into feedback and ticket actions:
//! - **Components** (`components`) - message, button, select and modal templates
//! - **Commands** (`commands`) - `ping`, `!allow`, `!feedback`, `!ticketpanel`
//! - **Events** (`events`) - envelope types, the dispatcher and its handlers
//! - **Runner** (`runner`) - pumps envelopes from a `GatewayTransport`
//! - **Gateway** (`gateway`) - outbound calls to the platform behind `ChatGateway`
//!
//! # Architecture
//!
//! ```text
//! GatewayTransport → GatewayRunner → EventDispatcher → Handlers
//!                                                         ↓
//!                    InteractionResponse ←  FeedbackService / TicketService
//!                                                         ↓
//!                                          ChatGateway + helpdesk-db repositories
//! ```
//!
//! # Key Types
//!
//! - `GatewayRunner` - event loop that responds to each interaction once
//! - `EventDispatcher` - routes envelopes to handlers by event type
//! - `DeferredTasks` - cancellable delayed deletes keyed by message or channel
//! - `BotSettings` - the chat-facing slice of `AppConfig`

pub mod commands;
pub mod components;
pub mod deferred;
pub mod events;
pub mod feedback;
pub mod gateway;
pub mod runner;
pub mod settings;
pub mod tickets;

pub use events::{community_dispatcher, CommunityRepositories, EventDispatcher};
pub use gateway::{ChatGateway, GatewayError, InMemoryGateway, OfflineGateway};
pub use runner::{GatewayRunner, GatewayTransport, NoopGatewayTransport, TransportError};
pub use settings::BotSettings;
