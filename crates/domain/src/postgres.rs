use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CourierId, CustomerId, OrderId, ProductId, Version};
use outbox::OutboxMessage;
use sqlx::{PgConnection, PgPool, Postgres, Row, postgres::PgRow};
use uuid::Uuid;

use crate::order::{Delivery, Money, Order, OrderItem, OrderStatus};
use crate::repository::{RepositoryError, Result, Transaction, UnitOfWork};

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PostgresStore {
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction> {
        Ok(PostgresTransaction {
            tx: self.pool.begin().await?,
        })
    }
}

/// Transaction over a [`PostgresStore`]; rolled back when dropped.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

fn row_to_item(order_id: OrderId, row: PgRow) -> Result<OrderItem> {
    let count: i64 = row.try_get("count")?;
    let product_id: String = row.try_get("product_id")?;
    let count = u32::try_from(count).map_err(|_| RepositoryError::Corrupt {
        order_id,
        reason: format!("item count {count} of {product_id} is out of range"),
    })?;

    Ok(OrderItem {
        product_id: ProductId::new(product_id),
        price: Money::from_cents(row.try_get("price_cents")?),
        count,
    })
}

async fn load_items(conn: &mut PgConnection, id: OrderId) -> Result<Vec<OrderItem>> {
    let rows = sqlx::query(
        r#"
        SELECT product_id, price_cents, count
        FROM order_items
        WHERE order_id = $1
        ORDER BY position ASC
        "#,
    )
    .bind(id.as_uuid())
    .fetch_all(conn)
    .await?;

    rows.into_iter().map(|row| row_to_item(id, row)).collect()
}

fn row_to_order(row: &PgRow, items: Vec<OrderItem>) -> Result<Order> {
    let id = OrderId::from_uuid(row.try_get::<Uuid, _>("id")?);
    let status: String = row.try_get("status")?;
    let status = OrderStatus::parse(&status).ok_or_else(|| RepositoryError::Corrupt {
        order_id: id,
        reason: format!("unknown status {status}"),
    })?;
    let courier_id: Option<Uuid> = row.try_get("courier_id")?;
    let arrived: Option<DateTime<Utc>> = row.try_get("arrived_at")?;

    Ok(Order::restore(
        id,
        CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
        status,
        row.try_get("created_at")?,
        Version::new(row.try_get("version")?),
        Delivery {
            courier_id: courier_id.map(CourierId::from_uuid),
            address: row.try_get("delivery_address")?,
            arrived,
        },
        items,
    ))
}

#[async_trait]
impl Transaction for PostgresTransaction {
    async fn get_order(&mut self, id: OrderId) -> Result<Order> {
        let row = sqlx::query(
            r#"
            SELECT id, customer_id, status, created_at, version,
                   delivery_address, courier_id, arrived_at
            FROM orders
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&mut *self.tx)
        .await?
        .ok_or(RepositoryError::NotFound(id))?;

        let items = load_items(&mut self.tx, id).await?;
        row_to_order(&row, items)
    }

    async fn create_order(&mut self, order: &mut Order) -> Result<()> {
        let id = order.id();
        let version = Version::first();

        sqlx::query(
            r#"
            INSERT INTO orders (id, customer_id, status, created_at, version,
                                delivery_address, courier_id, arrived_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(id.as_uuid())
        .bind(order.customer_id().as_uuid())
        .bind(order.status().as_str())
        .bind(order.created())
        .bind(version.as_i64())
        .bind(&order.delivery().address)
        .bind(order.delivery().courier_id.map(|c| c.as_uuid()))
        .bind(order.delivery().arrived)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(db_err) = &e
                && db_err.is_unique_violation()
            {
                return RepositoryError::AlreadyExists(id);
            }
            RepositoryError::Database(e)
        })?;

        for (position, item) in order.items().iter().enumerate() {
            let position = i32::try_from(position).map_err(|_| RepositoryError::Corrupt {
                order_id: id,
                reason: format!("too many items ({})", order.items().len()),
            })?;
            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, position, product_id, price_cents, count)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(id.as_uuid())
            .bind(position)
            .bind(item.product_id.as_str())
            .bind(item.price.cents())
            .bind(i64::from(item.count))
            .execute(&mut *self.tx)
            .await?;
        }

        order.set_version(version);
        Ok(())
    }

    async fn update_order(&mut self, order: &mut Order) -> Result<()> {
        let id = order.id();
        let expected = order.version();
        let next = expected.next();

        // Items never change after creation.
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $1, courier_id = $2, arrived_at = $3, version = $4
            WHERE id = $5 AND version = $6
            "#,
        )
        .bind(order.status().as_str())
        .bind(order.delivery().courier_id.map(|c| c.as_uuid()))
        .bind(order.delivery().arrived)
        .bind(next.as_i64())
        .bind(id.as_uuid())
        .bind(expected.as_i64())
        .execute(&mut *self.tx)
        .await?;

        if result.rows_affected() == 0 {
            let exists: Option<i64> = sqlx::query_scalar("SELECT version FROM orders WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&mut *self.tx)
                .await?;

            return Err(match exists {
                Some(_) => RepositoryError::Conflict {
                    order_id: id,
                    expected,
                },
                None => RepositoryError::NotFound(id),
            });
        }

        order.set_version(next);
        Ok(())
    }

    async fn add_outbox_message(&mut self, message: OutboxMessage) -> Result<()> {
        outbox::insert_message(&mut self.tx, &message).await?;
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
