use std::sync::Arc;

use chrono::Utc;

use helpdesk_core::domain::ticket::{TicketRecord, TicketStatus};

use super::{CloseMark, RepositoryError, Reservation, TicketRepository};
use crate::store::JsonStore;

pub struct JsonTicketRepository {
    store: Arc<JsonStore>,
}

impl JsonTicketRepository {
    pub fn new(store: Arc<JsonStore>) -> Self {
        Self { store }
    }
}

#[async_trait::async_trait]
impl TicketRepository for JsonTicketRepository {
    async fn reserve(&self, record: TicketRecord) -> Result<Reservation, RepositoryError> {
        let now = Utc::now();
        let reservation = self
            .store
            .mutate(|document| {
                document.tickets.retain(|ticket| {
                    ticket.owner_id != record.owner_id || !ticket.is_stale_reservation(now)
                });
                if let Some(existing) =
                    document.tickets.iter().find(|ticket| ticket.owner_id == record.owner_id)
                {
                    return Reservation::Existing(existing.clone());
                }
                document.tickets.push(record);
                Reservation::Reserved
            })
            .await?;
        Ok(reservation)
    }

    async fn activate(
        &self,
        owner_id: &str,
        channel_id: &str,
    ) -> Result<Option<TicketRecord>, RepositoryError> {
        let activated = self
            .store
            .mutate(|document| {
                let ticket =
                    document.tickets.iter_mut().find(|ticket| ticket.owner_id == owner_id)?;
                ticket.channel_id = Some(channel_id.to_owned());
                Some(ticket.clone())
            })
            .await?;
        Ok(activated)
    }

    async fn mark_open(&self, channel_id: &str) -> Result<Option<TicketRecord>, RepositoryError> {
        let opened = self
            .store
            .mutate(|document| {
                let ticket = document
                    .tickets
                    .iter_mut()
                    .find(|ticket| ticket.channel_id.as_deref() == Some(channel_id))?;
                if ticket.status == TicketStatus::Creating {
                    ticket.status = TicketStatus::Open;
                }
                Some(ticket.clone())
            })
            .await?;
        Ok(opened)
    }

    async fn release(&self, owner_id: &str) -> Result<bool, RepositoryError> {
        let released = self
            .store
            .mutate(|document| {
                let before = document.tickets.len();
                document.tickets.retain(|ticket| {
                    ticket.owner_id != owner_id || ticket.status != TicketStatus::Creating
                });
                document.tickets.len() != before
            })
            .await?;
        Ok(released)
    }

    async fn find_by_owner(
        &self,
        owner_id: &str,
    ) -> Result<Option<TicketRecord>, RepositoryError> {
        Ok(self
            .store
            .read(|document| {
                document.tickets.iter().find(|ticket| ticket.owner_id == owner_id).cloned()
            })
            .await)
    }

    async fn find_by_channel(
        &self,
        channel_id: &str,
    ) -> Result<Option<TicketRecord>, RepositoryError> {
        Ok(self
            .store
            .read(|document| {
                document
                    .tickets
                    .iter()
                    .find(|ticket| ticket.channel_id.as_deref() == Some(channel_id))
                    .cloned()
            })
            .await)
    }

    async fn mark_closing(&self, channel_id: &str) -> Result<CloseMark, RepositoryError> {
        let mark = self
            .store
            .mutate(|document| {
                let Some(ticket) = document
                    .tickets
                    .iter_mut()
                    .find(|ticket| ticket.channel_id.as_deref() == Some(channel_id))
                else {
                    return CloseMark::Untracked;
                };
                if ticket.status == TicketStatus::Closing {
                    return CloseMark::AlreadyClosing(ticket.clone());
                }
                ticket.status = TicketStatus::Closing;
                CloseMark::Marked(ticket.clone())
            })
            .await?;
        Ok(mark)
    }

    async fn remove_by_channel(
        &self,
        channel_id: &str,
    ) -> Result<Option<TicketRecord>, RepositoryError> {
        let removed = self
            .store
            .mutate(|document| {
                let index = document
                    .tickets
                    .iter()
                    .position(|ticket| ticket.channel_id.as_deref() == Some(channel_id))?;
                Some(document.tickets.remove(index))
            })
            .await?;
        Ok(removed)
    }
}
