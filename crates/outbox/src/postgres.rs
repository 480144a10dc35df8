use async_trait::async_trait;
use common::MessageId;
use sqlx::{PgConnection, PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{OutboxError, OutboxMessage, OutboxRepository, Result};

/// Inserts a message on an open connection or transaction.
///
/// Aggregate stores call this inside their own transaction so the message
/// commits or rolls back together with the aggregate row.
pub async fn insert_message(conn: &mut PgConnection, message: &OutboxMessage) -> Result<()> {
    let attempts = i32::try_from(message.attempts).unwrap_or(i32::MAX);

    sqlx::query(
        r#"
        INSERT INTO outbox_messages (id, message_type, payload, created_at, attempts)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(message.id.as_uuid())
    .bind(&message.message_type)
    .bind(&message.payload)
    .bind(message.created_at)
    .bind(attempts)
    .execute(conn)
    .await
    .map_err(|e| {
        if let sqlx::Error::Database(db_err) = &e
            && db_err.is_unique_violation()
        {
            return OutboxError::Duplicate(message.id);
        }
        OutboxError::Database(e)
    })?;

    Ok(())
}

/// PostgreSQL-backed outbox.
#[derive(Clone)]
pub struct PostgresOutboxRepository {
    pool: PgPool,
}

impl PostgresOutboxRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_message(row: PgRow) -> Result<OutboxMessage> {
        let attempts: i32 = row.try_get("attempts")?;

        Ok(OutboxMessage {
            id: MessageId::from_uuid(row.try_get::<Uuid, _>("id")?),
            message_type: row.try_get("message_type")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
            attempts: u32::try_from(attempts).unwrap_or_default(),
        })
    }
}

#[async_trait]
impl OutboxRepository for PostgresOutboxRepository {
    async fn create(&self, message: OutboxMessage) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        insert_message(&mut conn, &message).await
    }

    async fn get_all(&self) -> Result<Vec<OutboxMessage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, message_type, payload, created_at, attempts
            FROM outbox_messages
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_message).collect()
    }

    async fn get_by_id(&self, id: MessageId) -> Result<OutboxMessage> {
        let row = sqlx::query(
            r#"
            SELECT id, message_type, payload, created_at, attempts
            FROM outbox_messages
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_message(row),
            None => Err(OutboxError::NotFound(id)),
        }
    }

    async fn delete(&self, id: MessageId) -> Result<()> {
        let result = sqlx::query("DELETE FROM outbox_messages WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(OutboxError::NotFound(id));
        }
        Ok(())
    }

    async fn record_failure(&self, id: MessageId) -> Result<u32> {
        let attempts: Option<i32> = sqlx::query_scalar(
            "UPDATE outbox_messages SET attempts = attempts + 1 WHERE id = $1 RETURNING attempts",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        attempts
            .map(|a| u32::try_from(a).unwrap_or_default())
            .ok_or(OutboxError::NotFound(id))
    }
}
