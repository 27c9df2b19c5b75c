//! Subscription store
//!
//! A subscription row is created only once Stripe confirms payment and is never
//! deleted: cancellation flips `status` so billing history survives. The store
//! does not enforce uniqueness of active (phone, zip) pairs; the SMS intake
//! checks before starting a checkout.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

/// Subscription status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Cancelled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(SubscriptionStatus::Active),
            "cancelled" => Ok(SubscriptionStatus::Cancelled),
            other => Err(format!("unknown subscription status: {}", other)),
        }
    }
}

/// A paid freeze-alert subscription for one (phone, zip) pair
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Subscription {
    pub id: Uuid,
    /// E.164 phone number
    pub phone: String,
    pub zip_code: String,
    /// IANA time zone identifier
    pub timezone: String,
    pub status: SubscriptionStatus,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    /// Billing period end (unix seconds)
    pub current_period_end: Option<i64>,
    pub created_at: OffsetDateTime,
}

/// Input for a newly confirmed subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSubscription {
    pub phone: String,
    pub zip_code: String,
    pub timezone: String,
    pub stripe_customer_id: String,
    pub stripe_subscription_id: String,
    pub current_period_end: i64,
}

/// The (phone, zip) projection the dispatcher needs
#[derive(Debug, Clone, PartialEq, Eq, Hash, FromRow)]
pub struct Recipient {
    pub phone: String,
    pub zip_code: String,
}

/// Result of applying a Stripe cancellation
#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    /// No row carries this Stripe subscription id
    NotFound,
    /// Rows exist but none was active
    AlreadyCancelled,
    /// Number of rows moved from active to cancelled
    Cancelled { count: usize },
}

/// Persistence for subscriptions
///
/// Every mutation is a single-row insert or update; callers rely on per-operation
/// atomicity only.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Insert a new `active` subscription
    async fn create_active(&self, new: NewSubscription) -> StoreResult<Subscription>;

    /// Whether an `active` subscription exists for this phone and zip
    async fn active_exists(&self, phone: &str, zip_code: &str) -> StoreResult<bool>;

    /// All rows carrying this Stripe subscription id (redelivered checkouts can create several)
    async fn find_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> StoreResult<Vec<Subscription>>;

    /// Set the status of one row, returning whether the row exists
    async fn set_status(&self, id: Uuid, status: SubscriptionStatus) -> StoreResult<bool>;

    /// Distinct (phone, zip) pairs of active subscriptions in any of the given time zones
    async fn active_recipients_in_timezones(
        &self,
        timezones: &[String],
    ) -> StoreResult<Vec<Recipient>>;

    /// Apply the `active → cancelled` transition for a Stripe subscription id
    async fn cancel_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> StoreResult<CancelOutcome> {
        let rows = self
            .find_by_stripe_subscription_id(stripe_subscription_id)
            .await?;
        if rows.is_empty() {
            return Ok(CancelOutcome::NotFound);
        }

        let mut count = 0;
        for row in rows
            .iter()
            .filter(|r| r.status == SubscriptionStatus::Active)
        {
            if self.set_status(row.id, SubscriptionStatus::Cancelled).await? {
                count += 1;
            }
        }

        if count == 0 {
            Ok(CancelOutcome::AlreadyCancelled)
        } else {
            Ok(CancelOutcome::Cancelled { count })
        }
    }
}

/// Database row for `subscriptions`
#[derive(Debug, FromRow)]
struct SubscriptionRow {
    id: Uuid,
    phone: String,
    zip_code: String,
    timezone: String,
    status: String,
    stripe_customer_id: Option<String>,
    stripe_subscription_id: Option<String>,
    current_period_end: Option<i64>,
    created_at: OffsetDateTime,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = StoreError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status = row.status.parse().map_err(|reason| StoreError::CorruptRow {
            id: row.id.to_string(),
            reason,
        })?;
        Ok(Subscription {
            id: row.id,
            phone: row.phone,
            zip_code: row.zip_code,
            timezone: row.timezone,
            status,
            stripe_customer_id: row.stripe_customer_id,
            stripe_subscription_id: row.stripe_subscription_id,
            current_period_end: row.current_period_end,
            created_at: row.created_at,
        })
    }
}

/// Postgres-backed subscription store
#[derive(Clone)]
pub struct PgSubscriptionStore {
    pool: PgPool,
}

impl PgSubscriptionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for PgSubscriptionStore {
    async fn create_active(&self, new: NewSubscription) -> StoreResult<Subscription> {
        let row: SubscriptionRow = sqlx::query_as(
            r#"
            INSERT INTO subscriptions (
                id, phone, zip_code, timezone, status,
                stripe_customer_id, stripe_subscription_id, current_period_end
            )
            VALUES ($1, $2, $3, $4, 'active', $5, $6, $7)
            RETURNING id, phone, zip_code, timezone, status,
                      stripe_customer_id, stripe_subscription_id, current_period_end, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.phone)
        .bind(&new.zip_code)
        .bind(&new.timezone)
        .bind(&new.stripe_customer_id)
        .bind(&new.stripe_subscription_id)
        .bind(new.current_period_end)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    async fn active_exists(&self, phone: &str, zip_code: &str) -> StoreResult<bool> {
        let exists: Option<(i32,)> = sqlx::query_as(
            r#"
            SELECT 1 FROM subscriptions
            WHERE phone = $1 AND zip_code = $2 AND status = 'active'
            LIMIT 1
            "#,
        )
        .bind(phone)
        .bind(zip_code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(exists.is_some())
    }

    async fn find_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> StoreResult<Vec<Subscription>> {
        let rows: Vec<SubscriptionRow> = sqlx::query_as(
            r#"
            SELECT id, phone, zip_code, timezone, status,
                   stripe_customer_id, stripe_subscription_id, current_period_end, created_at
            FROM subscriptions
            WHERE stripe_subscription_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(stripe_subscription_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Subscription::try_from).collect()
    }

    async fn set_status(&self, id: Uuid, status: SubscriptionStatus) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE subscriptions SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn active_recipients_in_timezones(
        &self,
        timezones: &[String],
    ) -> StoreResult<Vec<Recipient>> {
        if timezones.is_empty() {
            return Ok(Vec::new());
        }

        let recipients: Vec<Recipient> = sqlx::query_as(
            r#"
            SELECT DISTINCT phone, zip_code
            FROM subscriptions
            WHERE timezone = ANY($1)
              AND status = 'active'
            "#,
        )
        .bind(timezones)
        .fetch_all(&self.pool)
        .await?;

        Ok(recipients)
    }
}

/// In-memory subscription store for tests and local runs
#[derive(Default)]
pub struct MemorySubscriptionStore {
    rows: RwLock<Vec<Subscription>>,
    unavailable: AtomicBool,
}

impl MemorySubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail with `StoreError::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Snapshot of all rows, in insertion order
    pub async fn all(&self) -> Vec<Subscription> {
        self.rows.read().await.clone()
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionStore for MemorySubscriptionStore {
    async fn create_active(&self, new: NewSubscription) -> StoreResult<Subscription> {
        self.check_available()?;
        let subscription = Subscription {
            id: Uuid::new_v4(),
            phone: new.phone,
            zip_code: new.zip_code,
            timezone: new.timezone,
            status: SubscriptionStatus::Active,
            stripe_customer_id: Some(new.stripe_customer_id),
            stripe_subscription_id: Some(new.stripe_subscription_id),
            current_period_end: Some(new.current_period_end),
            created_at: OffsetDateTime::now_utc(),
        };
        self.rows.write().await.push(subscription.clone());
        Ok(subscription)
    }

    async fn active_exists(&self, phone: &str, zip_code: &str) -> StoreResult<bool> {
        self.check_available()?;
        Ok(self.rows.read().await.iter().any(|s| {
            s.phone == phone && s.zip_code == zip_code && s.status == SubscriptionStatus::Active
        }))
    }

    async fn find_by_stripe_subscription_id(
        &self,
        stripe_subscription_id: &str,
    ) -> StoreResult<Vec<Subscription>> {
        self.check_available()?;
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|s| s.stripe_subscription_id.as_deref() == Some(stripe_subscription_id))
            .cloned()
            .collect())
    }

    async fn set_status(&self, id: Uuid, status: SubscriptionStatus) -> StoreResult<bool> {
        self.check_available()?;
        let mut rows = self.rows.write().await;
        match rows.iter_mut().find(|s| s.id == id) {
            Some(row) => {
                row.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn active_recipients_in_timezones(
        &self,
        timezones: &[String],
    ) -> StoreResult<Vec<Recipient>> {
        self.check_available()?;
        let rows = self.rows.read().await;
        let mut seen = HashSet::new();
        Ok(rows
            .iter()
            .filter(|s| s.status == SubscriptionStatus::Active && timezones.contains(&s.timezone))
            .map(|s| Recipient {
                phone: s.phone.clone(),
                zip_code: s.zip_code.clone(),
            })
            .filter(|r| seen.insert(r.clone()))
            .collect())
    }
}
