//! PostgreSQL implementation of LedgerStore.
//!
//! Every transition runs in one transaction, and updates take a row lock on
//! the subscription (`SELECT ... FOR UPDATE`) so concurrent events for the
//! same provider subscription id apply serially.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::billing::{
    Entitlement, EntitlementStatus, GrantSource, NewPayment, NewSubscription, Payment,
    PaymentStatus, ProductKind, Subscription, SubscriptionStatus, SubscriptionUpdate,
};
use crate::domain::foundation::{
    DomainError, EntitlementId, PaymentId, ProductId, SubscriptionId, UserId,
};
use crate::ports::{LedgerStore, MutationOutcome, UpdateOutcome};

/// PostgreSQL implementation of the LedgerStore port.
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubscriptionRow {
    id: Uuid,
    user_id: i64,
    product_id: i64,
    provider: String,
    provider_subscription_id: String,
    provider_customer_id: Option<String>,
    status: String,
    current_period_start: Option<DateTime<Utc>>,
    current_period_end: Option<DateTime<Utc>>,
    cancel_at_period_end: bool,
    canceled_at: Option<DateTime<Utc>>,
    trial_start: Option<DateTime<Utc>>,
    trial_end: Option<DateTime<Utc>>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SubscriptionRow> for Subscription {
    type Error = DomainError;

    fn try_from(row: SubscriptionRow) -> Result<Self, Self::Error> {
        let status = SubscriptionStatus::from_wire(&row.status).ok_or_else(|| {
            DomainError::database(format!("invalid subscription status: {}", row.status))
        })?;

        Ok(Subscription {
            id: SubscriptionId::from_uuid(row.id),
            user_id: UserId::new(row.user_id),
            product_id: ProductId::new(row.product_id),
            provider: row.provider,
            provider_subscription_id: row.provider_subscription_id,
            provider_customer_id: row.provider_customer_id,
            status,
            current_period_start: row.current_period_start,
            current_period_end: row.current_period_end,
            cancel_at_period_end: row.cancel_at_period_end,
            canceled_at: row.canceled_at,
            trial_start: row.trial_start,
            trial_end: row.trial_end,
            metadata: row.metadata,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct EntitlementRow {
    id: Uuid,
    user_id: i64,
    product_id: i64,
    subscription_id: Option<Uuid>,
    granted_by: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<EntitlementRow> for Entitlement {
    type Error = DomainError;

    fn try_from(row: EntitlementRow) -> Result<Self, Self::Error> {
        let status = match row.status.as_str() {
            "active" => EntitlementStatus::Active,
            "revoked" => EntitlementStatus::Revoked,
            other => {
                return Err(DomainError::database(format!(
                    "invalid entitlement status: {}",
                    other
                )))
            }
        };
        let granted_by = match row.granted_by.as_str() {
            "subscription" => GrantSource::Subscription,
            "one_time" => GrantSource::OneTime,
            "manual" => GrantSource::Manual,
            other => {
                return Err(DomainError::database(format!(
                    "invalid grant source: {}",
                    other
                )))
            }
        };

        Ok(Entitlement {
            id: EntitlementId::from_uuid(row.id),
            user_id: UserId::new(row.user_id),
            product_id: ProductId::new(row.product_id),
            subscription_id: row.subscription_id.map(SubscriptionId::from_uuid),
            granted_by,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PaymentRow {
    id: Uuid,
    user_id: i64,
    amount: i64,
    currency: String,
    provider: String,
    provider_payment_id: Option<String>,
    status: String,
    product_kind: String,
    product_id: i64,
    subscription_id: Option<Uuid>,
    metadata: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl TryFrom<PaymentRow> for Payment {
    type Error = DomainError;

    fn try_from(row: PaymentRow) -> Result<Self, Self::Error> {
        let status = match row.status.as_str() {
            "completed" => PaymentStatus::Completed,
            "failed" => PaymentStatus::Failed,
            "refunded" => PaymentStatus::Refunded,
            other => {
                return Err(DomainError::database(format!(
                    "invalid payment status: {}",
                    other
                )))
            }
        };
        let product_kind = match row.product_kind.as_str() {
            "subscription" => ProductKind::Subscription,
            "digital_product" => ProductKind::DigitalProduct,
            "bundle" => ProductKind::Bundle,
            other => {
                return Err(DomainError::database(format!(
                    "invalid product kind: {}",
                    other
                )))
            }
        };

        Ok(Payment {
            id: PaymentId::from_uuid(row.id),
            user_id: UserId::new(row.user_id),
            amount: row.amount,
            currency: row.currency,
            provider: row.provider,
            provider_payment_id: row.provider_payment_id,
            status,
            product_kind,
            product_id: ProductId::new(row.product_id),
            subscription_id: row.subscription_id.map(SubscriptionId::from_uuid),
            metadata: row.metadata,
            created_at: row.created_at,
        })
    }
}

fn db_err(e: sqlx::Error) -> DomainError {
    DomainError::database(format!("database error: {}", e))
}

/// Upserts the entitlement to active inside the caller's transaction.
async fn activate_entitlement(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    product_id: ProductId,
    subscription_id: Option<SubscriptionId>,
    granted_by: GrantSource,
) -> Result<(), DomainError> {
    sqlx::query(
        r#"
        INSERT INTO entitlements (id, user_id, product_id, subscription_id, granted_by, status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, 'active', now(), now())
        ON CONFLICT (user_id, product_id) DO UPDATE SET
            status = 'active',
            subscription_id = EXCLUDED.subscription_id,
            granted_by = EXCLUDED.granted_by,
            updated_at = now()
        "#,
    )
    .bind(EntitlementId::new().as_uuid())
    .bind(user_id.as_i64())
    .bind(product_id.as_i64())
    .bind(subscription_id.map(|id| *id.as_uuid()))
    .bind(granted_by.as_str())
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(())
}

/// Revokes the entitlement; returns true when it was active.
async fn revoke_entitlement(
    tx: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    product_id: ProductId,
) -> Result<bool, DomainError> {
    let result = sqlx::query(
        r#"
        UPDATE entitlements
        SET status = 'revoked', updated_at = now()
        WHERE user_id = $1 AND product_id = $2 AND status = 'active'
        "#,
    )
    .bind(user_id.as_i64())
    .bind(product_id.as_i64())
    .execute(&mut **tx)
    .await
    .map_err(db_err)?;
    Ok(result.rows_affected() > 0)
}

async fn insert_payment(
    tx: &mut Transaction<'_, Postgres>,
    payment: &NewPayment,
) -> Result<Payment, DomainError> {
    let row: PaymentRow = sqlx::query_as(
        r#"
        INSERT INTO payments (
            id, user_id, amount, currency, provider, provider_payment_id,
            status, product_kind, product_id, subscription_id, metadata, created_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, now())
        RETURNING *
        "#,
    )
    .bind(PaymentId::new().as_uuid())
    .bind(payment.user_id.as_i64())
    .bind(payment.amount)
    .bind(&payment.currency)
    .bind(&payment.provider)
    .bind(&payment.provider_payment_id)
    .bind(payment.status.as_str())
    .bind(payment.product_kind.as_str())
    .bind(payment.product_id.as_i64())
    .bind(payment.subscription_id.map(|id| *id.as_uuid()))
    .bind(&payment.metadata)
    .fetch_one(&mut **tx)
    .await
    .map_err(db_err)?;

    row.try_into()
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn upsert_subscription(
        &self,
        subscription: NewSubscription,
    ) -> Result<Subscription, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row: SubscriptionRow = sqlx::query_as(
            r#"
            INSERT INTO subscriptions (
                id, user_id, product_id, provider, provider_subscription_id,
                provider_customer_id, status, current_period_start, current_period_end,
                cancel_at_period_end, trial_start, trial_end, metadata, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, now(), now())
            ON CONFLICT (provider_subscription_id) DO UPDATE SET
                status = EXCLUDED.status,
                provider_customer_id = EXCLUDED.provider_customer_id,
                current_period_start = EXCLUDED.current_period_start,
                current_period_end = EXCLUDED.current_period_end,
                cancel_at_period_end = EXCLUDED.cancel_at_period_end,
                trial_start = EXCLUDED.trial_start,
                trial_end = EXCLUDED.trial_end,
                updated_at = now()
            RETURNING *
            "#,
        )
        .bind(SubscriptionId::new().as_uuid())
        .bind(subscription.user_id.as_i64())
        .bind(subscription.product_id.as_i64())
        .bind(&subscription.provider)
        .bind(&subscription.provider_subscription_id)
        .bind(&subscription.provider_customer_id)
        .bind(subscription.status.as_str())
        .bind(subscription.current_period_start)
        .bind(subscription.current_period_end)
        .bind(subscription.cancel_at_period_end)
        .bind(subscription.trial_start)
        .bind(subscription.trial_end)
        .bind(&subscription.metadata)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        let stored: Subscription = row.try_into()?;

        if stored.status.grants_access() {
            activate_entitlement(
                &mut tx,
                stored.user_id,
                stored.product_id,
                Some(stored.id),
                GrantSource::Subscription,
            )
            .await?;
        } else if stored.status.revokes_access() {
            revoke_entitlement(&mut tx, stored.user_id, stored.product_id).await?;
        }

        tx.commit().await.map_err(db_err)?;
        Ok(stored)
    }

    async fn apply_subscription_update(
        &self,
        update: SubscriptionUpdate,
    ) -> Result<UpdateOutcome, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row: Option<SubscriptionRow> = sqlx::query_as(
            "SELECT * FROM subscriptions WHERE provider_subscription_id = $1 FOR UPDATE",
        )
        .bind(&update.provider_subscription_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(UpdateOutcome::NotFound);
        };
        let stored: Subscription = row.try_into()?;

        if stored.is_stale_update(update.current_period_start)
            || (stored.is_terminal() && update.status.grants_access())
        {
            return Ok(UpdateOutcome::Stale);
        }

        // Absent period fields mean "unchanged"; invoice-driven updates carry
        // no period information.
        let row: SubscriptionRow = sqlx::query_as(
            r#"
            UPDATE subscriptions SET
                status = $2,
                current_period_start = COALESCE($3, current_period_start),
                current_period_end = COALESCE($4, current_period_end),
                cancel_at_period_end = $5,
                canceled_at = COALESCE($6, canceled_at),
                updated_at = now()
            WHERE provider_subscription_id = $1
            RETURNING *
            "#,
        )
        .bind(&update.provider_subscription_id)
        .bind(update.status.as_str())
        .bind(update.current_period_start)
        .bind(update.current_period_end)
        .bind(update.cancel_at_period_end)
        .bind(update.canceled_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        let updated: Subscription = row.try_into()?;

        let entitlement_revoked = if updated.status.revokes_access() {
            revoke_entitlement(&mut tx, updated.user_id, updated.product_id).await?
        } else {
            if updated.status.grants_access() {
                activate_entitlement(
                    &mut tx,
                    updated.user_id,
                    updated.product_id,
                    Some(updated.id),
                    GrantSource::Subscription,
                )
                .await?;
            }
            false
        };

        tx.commit().await.map_err(db_err)?;
        Ok(UpdateOutcome::Applied {
            subscription: updated,
            entitlement_revoked,
        })
    }

    async fn mark_subscription_deleted(
        &self,
        provider_subscription_id: &str,
        canceled_at: DateTime<Utc>,
    ) -> Result<MutationOutcome, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let row: Option<(i64, i64)> = sqlx::query_as(
            r#"
            UPDATE subscriptions
            SET status = 'canceled', canceled_at = $2, updated_at = now()
            WHERE provider_subscription_id = $1
            RETURNING user_id, product_id
            "#,
        )
        .bind(provider_subscription_id)
        .bind(canceled_at)
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some((user_id, product_id)) = row else {
            return Ok(MutationOutcome::NotFound);
        };

        revoke_entitlement(&mut tx, UserId::new(user_id), ProductId::new(product_id)).await?;

        tx.commit().await.map_err(db_err)?;
        Ok(MutationOutcome::Applied)
    }

    async fn grant_one_time_purchase(
        &self,
        user_id: UserId,
        product_id: ProductId,
        payment: NewPayment,
    ) -> Result<Payment, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        activate_entitlement(&mut tx, user_id, product_id, None, GrantSource::OneTime).await?;
        let stored = insert_payment(&mut tx, &payment).await?;

        tx.commit().await.map_err(db_err)?;
        Ok(stored)
    }

    async fn record_payment(&self, payment: NewPayment) -> Result<Payment, DomainError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;
        let stored = insert_payment(&mut tx, &payment).await?;
        tx.commit().await.map_err(db_err)?;
        Ok(stored)
    }

    async fn mark_payment_refunded(
        &self,
        provider_payment_id: &str,
    ) -> Result<MutationOutcome, DomainError> {
        let result = sqlx::query(
            "UPDATE payments SET status = 'refunded' WHERE provider_payment_id = $1",
        )
        .bind(provider_payment_id)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(if result.rows_affected() > 0 {
            MutationOutcome::Applied
        } else {
            MutationOutcome::NotFound
        })
    }

    async fn find_subscription(
        &self,
        provider_subscription_id: &str,
    ) -> Result<Option<Subscription>, DomainError> {
        let row: Option<SubscriptionRow> =
            sqlx::query_as("SELECT * FROM subscriptions WHERE provider_subscription_id = $1")
                .bind(provider_subscription_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        row.map(TryInto::try_into).transpose()
    }

    async fn find_entitlement(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<Entitlement>, DomainError> {
        let row: Option<EntitlementRow> =
            sqlx::query_as("SELECT * FROM entitlements WHERE user_id = $1 AND product_id = $2")
                .bind(user_id.as_i64())
                .bind(product_id.as_i64())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_err)?;

        row.map(TryInto::try_into).transpose()
    }
}
