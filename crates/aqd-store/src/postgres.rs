use anyhow::Result;
use aqd_core::{
    Account, AccountStore, Contract, ContractFilter, ContractStatus, ContractStore, DomainEvent,
    DomainEventKind, EventEnvelope, EventStore, Notification, NotificationKind, NotificationStore,
    PaymentProof, PlanPayment, ProofStore, ReviewDecision, ReviewStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

const CONTRACT_COLUMNS: &str = "id, provider_id, client_id, service_ref, title, amount, currency, status, created_at, updated_at";
const PROOF_COLUMNS: &str = "id, contract_id, submitted_by, file_ref, amount, method, status, reviewer_id, review_note, submitted_at, reviewed_at";
const ACCOUNT_COLUMNS: &str = "id, user_id, plan_id, trial_start, created_at";
const PAYMENT_COLUMNS: &str = "id, account_id, plan_id, method, amount, period_start, period_end, recorded_by, recorded_at";
const NOTIFICATION_COLUMNS: &str = "id, user_id, kind, payload, is_read, created_at, read_at";

/// Postgres adapter for every storage port. Expects the tables described in
/// `schema.sql` next to this crate's manifest.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn parse_column<T>(row: &PgRow, column: &str) -> Result<T>
where
    T: std::str::FromStr<Err = String>,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(anyhow::Error::msg)
}

fn contract_from_row(row: &PgRow) -> Result<Contract> {
    Ok(Contract {
        id: row.try_get("id")?,
        provider_id: row.try_get("provider_id")?,
        client_id: row.try_get("client_id")?,
        service_ref: row.try_get("service_ref")?,
        title: row.try_get("title")?,
        amount: row.try_get("amount")?,
        currency: row.try_get("currency")?,
        status: parse_column(row, "status")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn proof_from_row(row: &PgRow) -> Result<PaymentProof> {
    Ok(PaymentProof {
        id: row.try_get("id")?,
        contract_id: row.try_get("contract_id")?,
        submitted_by: row.try_get("submitted_by")?,
        file_ref: row.try_get("file_ref")?,
        amount: row.try_get("amount")?,
        method: row.try_get("method")?,
        status: parse_column(row, "status")?,
        reviewer_id: row.try_get("reviewer_id")?,
        review_note: row.try_get("review_note")?,
        submitted_at: row.try_get("submitted_at")?,
        reviewed_at: row.try_get("reviewed_at")?,
    })
}

fn account_from_row(row: &PgRow) -> Result<Account> {
    Ok(Account {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        plan_id: row.try_get("plan_id")?,
        trial_start: row.try_get("trial_start")?,
        created_at: row.try_get("created_at")?,
    })
}

fn payment_from_row(row: &PgRow) -> Result<PlanPayment> {
    Ok(PlanPayment {
        id: row.try_get("id")?,
        account_id: row.try_get("account_id")?,
        plan_id: row.try_get("plan_id")?,
        method: row.try_get("method")?,
        amount: row.try_get("amount")?,
        period_start: row.try_get("period_start")?,
        period_end: row.try_get("period_end")?,
        recorded_by: row.try_get("recorded_by")?,
        recorded_at: row.try_get("recorded_at")?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification> {
    Ok(Notification {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        kind: parse_column::<NotificationKind>(row, "kind")?,
        payload: row.try_get("payload")?,
        read: row.try_get("is_read")?,
        created_at: row.try_get("created_at")?,
        read_at: row.try_get("read_at")?,
    })
}

fn envelope_from_row(row: &PgRow) -> Result<EventEnvelope> {
    let event = DomainEvent {
        id: row.try_get("id")?,
        aggregate_id: row.try_get("stream_id")?,
        kind: parse_column::<DomainEventKind>(row, "kind")?,
        occurred_at: row.try_get("occurred_at")?,
        payload: row.try_get("payload")?,
    };

    Ok(EventEnvelope {
        sequence: row.try_get("sequence")?,
        stream_id: row.try_get("stream_id")?,
        event,
        stored_at: row.try_get("stored_at")?,
    })
}

#[async_trait]
impl EventStore for PgStore {
    async fn append(&self, stream_id: Uuid, event: DomainEvent) -> Result<EventEnvelope> {
        let row = sqlx::query(
            r#"
            INSERT INTO domain_events (id, stream_id, kind, occurred_at, payload, stored_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING sequence, id, stream_id, kind, occurred_at, payload, stored_at
            "#,
        )
        .bind(event.id)
        .bind(stream_id)
        .bind(event.kind.as_str())
        .bind(event.occurred_at)
        .bind(&event.payload)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;

        envelope_from_row(&row)
    }

    async fn stream(&self, stream_id: Uuid) -> Result<Vec<EventEnvelope>> {
        let rows = sqlx::query(
            r#"
            SELECT sequence, id, stream_id, kind, occurred_at, payload, stored_at
            FROM domain_events
            WHERE stream_id = $1
            ORDER BY sequence ASC
            "#,
        )
        .bind(stream_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(envelope_from_row).collect()
    }
}

#[async_trait]
impl ContractStore for PgStore {
    async fn insert_contract(&self, contract: &Contract) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO contracts (
                id, provider_id, client_id, service_ref, title, amount, currency, status, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(contract.id)
        .bind(contract.provider_id)
        .bind(contract.client_id)
        .bind(&contract.service_ref)
        .bind(&contract.title)
        .bind(contract.amount)
        .bind(&contract.currency)
        .bind(contract.status.as_str())
        .bind(contract.created_at)
        .bind(contract.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_contract(&self, id: Uuid) -> Result<Option<Contract>> {
        let row = sqlx::query(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM contracts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(contract_from_row).transpose()
    }

    async fn list_contracts(&self, filter: &ContractFilter) -> Result<Vec<Contract>> {
        let limit = filter.limit.unwrap_or(50).clamp(1, 200);
        let rows = sqlx::query(&format!(
            r#"
            SELECT {CONTRACT_COLUMNS}
            FROM contracts
            WHERE ($1::text IS NULL OR status = $1)
              AND ($2::uuid IS NULL OR provider_id = $2)
              AND ($3::uuid IS NULL OR provider_id = $3 OR client_id = $3)
            ORDER BY created_at DESC
            LIMIT $4
            "#
        ))
        .bind(filter.status.map(|status| status.as_str()))
        .bind(filter.provider_id)
        .bind(filter.party_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(contract_from_row).collect()
    }

    async fn commit_transition(
        &self,
        id: Uuid,
        expected: ContractStatus,
        next: ContractStatus,
        at: DateTime<Utc>,
        event: DomainEvent,
    ) -> Result<Option<Contract>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(&format!(
            r#"
            UPDATE contracts
            SET status = $3, updated_at = $4
            WHERE id = $1 AND status = $2
            RETURNING {CONTRACT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(at)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(None);
        };
        let contract = contract_from_row(&row)?;

        sqlx::query(
            r#"
            INSERT INTO domain_events (id, stream_id, kind, occurred_at, payload, stored_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(event.id)
        .bind(id)
        .bind(event.kind.as_str())
        .bind(event.occurred_at)
        .bind(&event.payload)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(contract))
    }
}

#[async_trait]
impl ProofStore for PgStore {
    async fn insert_proof(&self, proof: &PaymentProof) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payment_proofs (
                id, contract_id, submitted_by, file_ref, amount, method, status,
                reviewer_id, review_note, submitted_at, reviewed_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(proof.id)
        .bind(proof.contract_id)
        .bind(proof.submitted_by)
        .bind(&proof.file_ref)
        .bind(proof.amount)
        .bind(&proof.method)
        .bind(proof.status.as_str())
        .bind(proof.reviewer_id)
        .bind(proof.review_note.as_deref())
        .bind(proof.submitted_at)
        .bind(proof.reviewed_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_proof(&self, id: Uuid) -> Result<Option<PaymentProof>> {
        let row = sqlx::query(&format!(
            "SELECT {PROOF_COLUMNS} FROM payment_proofs WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(proof_from_row).transpose()
    }

    async fn proofs_for_contract(&self, contract_id: Uuid) -> Result<Vec<PaymentProof>> {
        let rows = sqlx::query(&format!(
            "SELECT {PROOF_COLUMNS} FROM payment_proofs WHERE contract_id = $1 ORDER BY submitted_at ASC"
        ))
        .bind(contract_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(proof_from_row).collect()
    }

    async fn proofs_with_status(&self, status: ReviewStatus) -> Result<Vec<PaymentProof>> {
        let rows = sqlx::query(&format!(
            "SELECT {PROOF_COLUMNS} FROM payment_proofs WHERE status = $1 ORDER BY submitted_at ASC, id ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(proof_from_row).collect()
    }

    async fn record_review(
        &self,
        id: Uuid,
        decision: ReviewDecision,
        reviewer_id: Uuid,
        note: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<PaymentProof>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE payment_proofs
            SET status = $2, reviewer_id = $3, review_note = $4, reviewed_at = $5
            WHERE id = $1 AND status = 'PENDING'
            RETURNING {PROOF_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(decision.status().as_str())
        .bind(reviewer_id)
        .bind(note)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(proof_from_row).transpose()
    }
}

#[async_trait]
impl AccountStore for PgStore {
    async fn insert_account_if_absent(&self, candidate: &Account) -> Result<Account> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, user_id, plan_id, trial_start, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(candidate.id)
        .bind(candidate.user_id)
        .bind(&candidate.plan_id)
        .bind(candidate.trial_start)
        .bind(candidate.created_at)
        .execute(&self.pool)
        .await?;

        self.account_for_user(candidate.user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("account for user {} vanished after upsert", candidate.user_id))
    }

    async fn get_account(&self, id: Uuid) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn account_for_user(&self, user_id: Uuid) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE user_id = $1"
        ))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn extend_subscription(
        &self,
        mut payment: PlanPayment,
        length: Duration,
    ) -> Result<PlanPayment> {
        let mut tx = self.pool.begin().await?;

        // Serializes concurrent extensions of the same account.
        let locked = sqlx::query("SELECT id FROM accounts WHERE id = $1 FOR UPDATE")
            .bind(payment.account_id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            anyhow::bail!("account {} does not exist", payment.account_id);
        }

        let latest_end = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(period_end) FROM plan_payments WHERE account_id = $1",
        )
        .bind(payment.account_id)
        .fetch_one(&mut *tx)
        .await?;
        if let Some(end) = latest_end {
            payment.period_start = payment.period_start.max(end);
        }
        payment.period_end = payment
            .period_start
            .checked_add_signed(length)
            .ok_or_else(|| anyhow::anyhow!("subscription period is out of range"))?;

        sqlx::query(
            r#"
            INSERT INTO plan_payments (
                id, account_id, plan_id, method, amount, period_start, period_end, recorded_by, recorded_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(payment.id)
        .bind(payment.account_id)
        .bind(&payment.plan_id)
        .bind(&payment.method)
        .bind(payment.amount)
        .bind(payment.period_start)
        .bind(payment.period_end)
        .bind(payment.recorded_by)
        .bind(payment.recorded_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(payment)
    }

    async fn payments_for_account(&self, account_id: Uuid) -> Result<Vec<PlanPayment>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM plan_payments WHERE account_id = $1 ORDER BY period_start ASC"
        ))
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(payment_from_row).collect()
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn insert_notification(&self, notification: &Notification) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO notifications (id, user_id, kind, payload, is_read, created_at, read_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(notification.kind.as_str())
        .bind(&notification.payload)
        .bind(notification.read)
        .bind(notification.created_at)
        .bind(notification.read_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>> {
        let row = sqlx::query(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(notification_from_row).transpose()
    }

    async fn count_unread(&self, user_id: Uuid) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn notifications_for_user(&self, user_id: Uuid, limit: i64) -> Result<Vec<Notification>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS}
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#
        ))
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(notification_from_row).collect()
    }

    async fn mark_read(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Notification>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE notifications
            SET is_read = TRUE, read_at = COALESCE(read_at, $2)
            WHERE id = $1
            RETURNING {NOTIFICATION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(at)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(notification_from_row).transpose()
    }

    async fn mark_all_read(&self, user_id: Uuid, at: DateTime<Utc>) -> Result<u64> {
        let updated = sqlx::query(
            "UPDATE notifications SET is_read = TRUE, read_at = $2 WHERE user_id = $1 AND is_read = FALSE",
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(updated.rows_affected())
    }
}
