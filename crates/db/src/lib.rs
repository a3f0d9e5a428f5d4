pub mod repositories;
pub mod store;

pub use repositories::{
    AllowanceRepository, CloseMark, FeedbackRepository, JsonAllowanceRepository,
    JsonFeedbackRepository, JsonTicketRepository, RepositoryError, Reservation,
    SubmissionReceipt, TicketRepository,
};
pub use store::{JsonStore, StoreDocument, StoreError};
