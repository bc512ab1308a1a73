use thiserror::Error;

use maildesk_core::StoreError;

pub mod memory;
pub mod ticket;

pub use memory::InMemoryTicketStore;
pub use ticket::SqlTicketStore;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<RepositoryError> for StoreError {
    fn from(error: RepositoryError) -> Self {
        StoreError::Backend(error.to_string())
    }
}
