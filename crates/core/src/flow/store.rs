use async_trait::async_trait;
use thiserror::Error;

use crate::domain::ticket::{CustomerId, Ticket, TicketId};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("ticket store failure: {0}")]
    Backend(String),
}

/// Durable ticket persistence. Ticket values are constructed in the domain
/// layer; a brand-new ticket reaches the store through its first
/// end-of-turn `save`, so one turn produces exactly one write.
#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn find_open_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<Ticket>, StoreError>;

    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError>;

    /// Upsert; must be atomic per ticket id.
    async fn save(&self, ticket: &Ticket) -> Result<(), StoreError>;
}
