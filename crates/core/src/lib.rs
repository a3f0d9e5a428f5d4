pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;

pub use config::{AppConfig, ConfigError, LoadOptions, LogFormat};
pub use domain::allowance::AllowanceLedger;
pub use domain::feedback::{ClientPlatform, FeedbackDraft, FeedbackRecord, Rating};
pub use domain::ticket::{TicketCategory, TicketRecord, TicketStatus};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use flows::FlowTransitionError;
