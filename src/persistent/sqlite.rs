use std::{str::FromStr, sync::Arc};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{migrate::Migrator, SqlitePool, ConnectOptions, sqlite::SqliteConnectOptions};

use crate::shop::{NewOrder, Order, OrderDetails, OrderId, OrderStatus, PaymentMethod};
use super::{NewUser, SavedSession};


static MIGRATOR: Migrator = sqlx::migrate!();

const ORDER_COLUMNS: &str = "id, user_id, recipient, details, amount_rub, payment_method, status, invoice_id, created_at";

pub struct Storage(SqlitePool);

#[derive(Debug, Clone, PartialEq)]
pub struct Statistics {
    pub users: i64,
    pub completed_orders: i64,
    pub revenue: Decimal,
    pub awaiting_review: i64,
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    user_id: i64,
    recipient: Option<String>,
    details: String,
    amount_rub: String,
    payment_method: String,
    status: String,
    invoice_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = anyhow::Error;

    fn try_from(r: OrderRow) -> Result<Self, Self::Error> {
        Ok(Order {
            id: r.id,
            user_id: r.user_id,
            recipient: r.recipient,
            details: serde_json::from_str(&r.details)?,
            amount_rub: Decimal::from_str(&r.amount_rub)?,
            payment_method: PaymentMethod::from_str(&r.payment_method)?,
            status: OrderStatus::from_str(&r.status)?,
            invoice_id: r.invoice_id,
            created_at: r.created_at,
        })
    }
}

async fn make_pool(db_url: &str) -> anyhow::Result<SqlitePool> {
    let mut options = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
    options.disable_statement_logging();
    let pool = SqlitePool::connect_with(options).await?;
    MIGRATOR.run(&pool).await?;
    Ok(pool)
}

impl Storage {
    pub async fn new(db_url: &str) -> anyhow::Result<Arc<Self>> {
        Ok(Arc::new(Self(make_pool(db_url).await?)))
    }
    pub async fn close(&self) {
        log::info!("closing database connections...");
        self.0.close().await;
        log::info!("database connections closed!");
    }

    /// Returns `false` when the user was already known.
    pub async fn add_user(&self, user: &NewUser) -> anyhow::Result<bool> {
        let inserted = sqlx::query("insert or ignore into users (user_id, username, full_name, created_at) values (?1, ?2, ?3, ?4)")
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.full_name)
            .bind(Utc::now())
            .execute(&self.0).await?
            .rows_affected();
        Ok(inserted > 0)
    }
    pub async fn count_users(&self) -> anyhow::Result<i64> {
        let count = sqlx::query_scalar("select count(*) from users")
            .fetch_one(&self.0).await?;
        Ok(count)
    }

    pub async fn add_order(&self, order: &NewOrder) -> anyhow::Result<Order> {
        let created_at = Utc::now();
        let details = serde_json::to_string(&order.details)?;
        let id = sqlx::query(
            "insert into orders (user_id, order_type, recipient, details, amount_rub, payment_method, status, created_at) \
             values (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)")
            .bind(order.user_id)
            .bind(order.details.product.product_type().as_ref())
            .bind(&order.recipient)
            .bind(details)
            .bind(order.amount_rub.to_string())
            .bind(order.payment_method.as_ref())
            .bind(OrderStatus::Pending.as_ref())
            .bind(created_at)
            .execute(&self.0).await?
            .last_insert_rowid();
        Ok(Order {
            id,
            user_id: order.user_id,
            recipient: order.recipient.clone(),
            details: order.details.clone(),
            amount_rub: order.amount_rub,
            payment_method: order.payment_method,
            status: OrderStatus::Pending,
            invoice_id: None,
            created_at,
        })
    }
    pub async fn get_order(&self, id: OrderId) -> anyhow::Result<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("select {ORDER_COLUMNS} from orders where id = ?1"))
            .bind(id)
            .fetch_optional(&self.0).await?;
        row.map(Order::try_from).transpose()
    }
    /// Writes the mutable part of `order` if its stored status is still `expected`.
    pub async fn update_order(&self, order: &Order, expected: OrderStatus) -> anyhow::Result<bool> {
        let details = serde_json::to_string(&order.details)?;
        let updated = sqlx::query(
            "update orders set status = ?1, payment_method = ?2, details = ?3, invoice_id = ?4 \
             where id = ?5 and status = ?6")
            .bind(order.status.as_ref())
            .bind(order.payment_method.as_ref())
            .bind(details)
            .bind(&order.invoice_id)
            .bind(order.id)
            .bind(expected.as_ref())
            .execute(&self.0).await?
            .rows_affected();
        Ok(updated > 0)
    }
    /// Newest first.
    pub async fn orders_by_status(&self, status: OrderStatus, limit: i64) -> anyhow::Result<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "select {ORDER_COLUMNS} from orders where status = ?1 order by created_at desc, id desc limit ?2"))
            .bind(status.as_ref())
            .bind(limit)
            .fetch_all(&self.0).await?;
        rows.into_iter().map(Order::try_from).collect()
    }
    pub async fn statistics(&self) -> anyhow::Result<Statistics> {
        let users = self.count_users().await?;
        let completed: Vec<String> = sqlx::query_scalar("select amount_rub from orders where status = ?1")
            .bind(OrderStatus::Completed.as_ref())
            .fetch_all(&self.0).await?;
        let mut revenue = Decimal::ZERO;
        for amount in &completed {
            revenue += Decimal::from_str(amount)?;
        }
        let awaiting_review = sqlx::query_scalar("select count(*) from orders where status = ?1")
            .bind(OrderStatus::WaitingConfirmation.as_ref())
            .fetch_one(&self.0).await?;
        Ok(Statistics {
            users,
            completed_orders: completed.len() as i64,
            revenue,
            awaiting_review,
        })
    }

    pub(super) async fn save_session(&self, session: &SavedSession) -> anyhow::Result<()> {
        sqlx::query("insert or replace into sessions (chat_id, state, updated_at) values (?1, ?2, ?3)")
            .bind(session.chat_id)
            .bind(&session.state)
            .bind(session.updated_at)
            .execute(&self.0).await?;
        Ok(())
    }
    pub(super) async fn drop_session(&self, chat_id: i64) -> anyhow::Result<()> {
        sqlx::query("delete from sessions where chat_id = ?1")
            .bind(chat_id)
            .execute(&self.0).await?;
        Ok(())
    }
    pub(super) async fn load_sessions(&self, since: i64) -> anyhow::Result<Vec<SavedSession>> {
        let res = sqlx::query_as::<_, (i64, Vec<u8>, i64)>(
            "select chat_id, state, updated_at from sessions where updated_at >= ?1 order by chat_id")
            .bind(since)
            .fetch_all(&self.0).await?
            .into_iter().map(|(chat_id, state, updated_at)| SavedSession { chat_id, state, updated_at })
            .collect();
        Ok(res)
    }
    pub(super) async fn purge_sessions(&self, before: i64) -> anyhow::Result<u64> {
        let purged = sqlx::query("delete from sessions where updated_at < ?1")
            .bind(before)
            .execute(&self.0).await?
            .rows_affected();
        Ok(purged)
    }
}
