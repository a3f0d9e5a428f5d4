use async_trait::async_trait;
use thiserror::Error;

use helpdesk_core::domain::feedback::FeedbackRecord;
use helpdesk_core::domain::ticket::TicketRecord;
use helpdesk_core::errors::{ApplicationError, DomainError};

use crate::store::StoreError;

pub mod allowance;
pub mod feedback;
pub mod ticket;

pub use allowance::JsonAllowanceRepository;
pub use feedback::JsonFeedbackRepository;
pub use ticket::JsonTicketRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl From<RepositoryError> for ApplicationError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::Store(store) => Self::Persistence(store.to_string()),
            RepositoryError::Domain(domain) => Self::Domain(domain),
        }
    }
}

/// Result of an accepted feedback submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmissionReceipt {
    pub record_id: String,
    pub remaining: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Reservation {
    Reserved,
    Existing(TicketRecord),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseMark {
    Marked(TicketRecord),
    AlreadyClosing(TicketRecord),
    Untracked,
}

#[async_trait]
pub trait FeedbackRepository: Send + Sync {
    /// Checks the submitter's allowance, appends the record and consumes one
    /// unit in a single store critical section. Fails with
    /// [`DomainError::NoAllowance`] and writes nothing when the quota is spent.
    async fn record_submission(
        &self,
        record: FeedbackRecord,
    ) -> Result<SubmissionReceipt, RepositoryError>;

    async fn attach_log_message(
        &self,
        record_id: &str,
        channel_id: &str,
        message_id: &str,
    ) -> Result<bool, RepositoryError>;

    async fn remove_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<FeedbackRecord>, RepositoryError>;

    async fn list_newest_first(
        &self,
        limit: Option<usize>,
    ) -> Result<Vec<FeedbackRecord>, RepositoryError>;
}

#[async_trait]
pub trait AllowanceRepository: Send + Sync {
    async fn grant(&self, user_id: &str, amount: u32) -> Result<u32, RepositoryError>;
    async fn remaining(&self, user_id: &str) -> Result<u32, RepositoryError>;
    async fn decrement(&self, user_id: &str) -> Result<u32, RepositoryError>;
}

#[async_trait]
pub trait TicketRepository: Send + Sync {
    /// Reserves the owner's single ticket slot unless a live one exists.
    async fn reserve(&self, record: TicketRecord) -> Result<Reservation, RepositoryError>;

    async fn activate(
        &self,
        owner_id: &str,
        channel_id: &str,
    ) -> Result<Option<TicketRecord>, RepositoryError>;

    async fn mark_open(&self, channel_id: &str) -> Result<Option<TicketRecord>, RepositoryError>;

    async fn release(&self, owner_id: &str) -> Result<bool, RepositoryError>;

    async fn find_by_owner(&self, owner_id: &str)
        -> Result<Option<TicketRecord>, RepositoryError>;

    async fn find_by_channel(
        &self,
        channel_id: &str,
    ) -> Result<Option<TicketRecord>, RepositoryError>;

    async fn mark_closing(&self, channel_id: &str) -> Result<CloseMark, RepositoryError>;

    async fn remove_by_channel(
        &self,
        channel_id: &str,
    ) -> Result<Option<TicketRecord>, RepositoryError>;
}
