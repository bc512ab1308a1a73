use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use maildesk_core::{CustomerId, StoreError, Ticket, TicketId, TicketStore};

/// Map-backed ticket store for tests and the offline simulator. Same
/// contract as the SQLite store, no durability.
#[derive(Default)]
pub struct InMemoryTicketStore {
    tickets: RwLock<HashMap<String, Ticket>>,
}

#[async_trait]
impl TicketStore for InMemoryTicketStore {
    async fn find_open_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<Ticket>, StoreError> {
        let tickets = self.tickets.read().await;
        let mut open: Vec<&Ticket> = tickets
            .values()
            .filter(|ticket| ticket.customer_id == *customer_id && ticket.is_open())
            .collect();
        open.sort_by_key(|ticket| ticket.created_at);
        Ok(open.last().map(|ticket| (*ticket).clone()))
    }

    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError> {
        let tickets = self.tickets.read().await;
        Ok(tickets.get(&id.0).cloned())
    }

    async fn save(&self, ticket: &Ticket) -> Result<(), StoreError> {
        let mut tickets = self.tickets.write().await;
        tickets.insert(ticket.id.0.clone(), ticket.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use maildesk_core::{CustomerId, Ticket, TicketStatus, TicketStore};

    use super::InMemoryTicketStore;

    #[tokio::test]
    async fn open_lookup_skips_resolved_tickets() {
        let store = InMemoryTicketStore::default();
        let customer = CustomerId("alice@example.com".to_string());

        let mut resolved = Ticket::open(customer.clone());
        resolved.status = TicketStatus::Resolved;
        store.save(&resolved).await.expect("save resolved");

        assert!(store
            .find_open_for_customer(&customer)
            .await
            .expect("query")
            .is_none());

        let open = Ticket::open(customer.clone());
        store.save(&open).await.expect("save open");

        let found = store
            .find_open_for_customer(&customer)
            .await
            .expect("query")
            .expect("open ticket visible");
        assert_eq!(found.id, open.id);
    }

    #[tokio::test]
    async fn save_overwrites_by_ticket_id() {
        let store = InMemoryTicketStore::default();
        let mut ticket = Ticket::open(CustomerId("bob@example.com".to_string()));
        store.save(&ticket).await.expect("first save");

        ticket.turn_count = 2;
        store.save(&ticket).await.expect("second save");

        let loaded = store.find_by_id(&ticket.id).await.expect("load").expect("exists");
        assert_eq!(loaded.turn_count, 2);
    }
}
