use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use maildesk_core::{
    CustomerId, EscalationFlag, FieldName, Mood, Severity, StoreError, Ticket, TicketId,
    TicketMessage, TicketStatus, TicketStore,
};

use super::RepositoryError;
use crate::DbPool;

/// SQLite-backed ticket store. `save` is a single upsert statement, so it is
/// atomic per ticket id; structured columns (known fields, history) are
/// stored as JSON text.
pub struct SqlTicketStore {
    pool: DbPool,
}

impl SqlTicketStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn fetch_open_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<Ticket>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, customer_id, intent, known_fields, mood, severity, status,
                    escalation, retained_draft, turn_count, history, created_at, updated_at
             FROM ticket
             WHERE customer_id = ?1 AND status != 'RESOLVED'
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(&customer_id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(decode_ticket).transpose()
    }

    async fn fetch_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, customer_id, intent, known_fields, mood, severity, status,
                    escalation, retained_draft, turn_count, history, created_at, updated_at
             FROM ticket
             WHERE id = ?1",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.map(decode_ticket).transpose()
    }

    async fn upsert(&self, ticket: &Ticket) -> Result<(), RepositoryError> {
        let known_fields = serde_json::to_string(&ticket.known_fields)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;
        let history = serde_json::to_string(&ticket.history)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO ticket (id, customer_id, intent, known_fields, mood, severity, status,
                                 escalation, retained_draft, turn_count, history, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
             ON CONFLICT(id) DO UPDATE SET
                 customer_id = excluded.customer_id,
                 intent = excluded.intent,
                 known_fields = excluded.known_fields,
                 mood = excluded.mood,
                 severity = excluded.severity,
                 status = excluded.status,
                 escalation = excluded.escalation,
                 retained_draft = excluded.retained_draft,
                 turn_count = excluded.turn_count,
                 history = excluded.history,
                 created_at = excluded.created_at,
                 updated_at = excluded.updated_at",
        )
        .bind(&ticket.id.0)
        .bind(&ticket.customer_id.0)
        .bind(ticket.intent.as_deref())
        .bind(known_fields)
        .bind(ticket.mood.as_str())
        .bind(ticket.severity.as_str())
        .bind(ticket.status.as_str())
        .bind(ticket.escalation.map(|flag| flag.as_str()))
        .bind(ticket.retained_draft.as_deref())
        .bind(i64::from(ticket.turn_count))
        .bind(history)
        .bind(ticket.created_at.to_rfc3339())
        .bind(ticket.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl TicketStore for SqlTicketStore {
    async fn find_open_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> Result<Option<Ticket>, StoreError> {
        self.fetch_open_for_customer(customer_id).await.map_err(StoreError::from)
    }

    async fn find_by_id(&self, id: &TicketId) -> Result<Option<Ticket>, StoreError> {
        self.fetch_by_id(id).await.map_err(StoreError::from)
    }

    async fn save(&self, ticket: &Ticket) -> Result<(), StoreError> {
        self.upsert(ticket).await.map_err(StoreError::from)
    }
}

fn decode_ticket(row: SqliteRow) -> Result<Ticket, RepositoryError> {
    let known_fields: BTreeMap<FieldName, String> =
        serde_json::from_str(&row.get::<String, _>("known_fields"))
            .map_err(|error| RepositoryError::Decode(format!("known_fields: {error}")))?;
    let history: Vec<TicketMessage> = serde_json::from_str(&row.get::<String, _>("history"))
        .map_err(|error| RepositoryError::Decode(format!("history: {error}")))?;

    let mood_label = row.get::<String, _>("mood");
    let severity_label = row.get::<String, _>("severity");
    let severity = Severity::from_label(&severity_label)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown severity `{severity_label}`")))?;
    let status_label = row.get::<String, _>("status");
    let status = TicketStatus::from_label(&status_label)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown status `{status_label}`")))?;
    let escalation = row
        .get::<Option<String>, _>("escalation")
        .map(|label| {
            EscalationFlag::from_label(&label)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown escalation `{label}`")))
        })
        .transpose()?;

    let turn_count = row.get::<i64, _>("turn_count");
    let turn_count = u32::try_from(turn_count)
        .map_err(|_| RepositoryError::Decode(format!("turn_count out of range: {turn_count}")))?;

    Ok(Ticket {
        id: TicketId(row.get::<String, _>("id")),
        customer_id: CustomerId(row.get::<String, _>("customer_id")),
        intent: row.get::<Option<String>, _>("intent"),
        known_fields,
        mood: Mood::from_label(&mood_label),
        severity,
        status,
        escalation,
        retained_draft: row.get::<Option<String>, _>("retained_draft"),
        turn_count,
        history,
        created_at: decode_timestamp(&row, "created_at")?,
        updated_at: decode_timestamp(&row, "updated_at")?,
    })
}

fn decode_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>, RepositoryError> {
    let raw = row.get::<String, _>(column);
    DateTime::parse_from_rfc3339(&raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}
