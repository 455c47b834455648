use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::events::DomainEvent;
use crate::models::{
    Account, Contract, ContractFilter, ContractStatus, Notification, PaymentProof, PlanPayment,
    ReviewDecision, ReviewStatus,
};

#[derive(Debug, Clone)]
pub struct EventEnvelope {
    pub sequence: i64,
    pub stream_id: Uuid,
    pub event: DomainEvent,
    pub stored_at: DateTime<Utc>,
}

#[async_trait]
pub trait EventStore: Send + Sync {
    async fn append(&self, stream_id: Uuid, event: DomainEvent) -> anyhow::Result<EventEnvelope>;
    async fn stream(&self, stream_id: Uuid) -> anyhow::Result<Vec<EventEnvelope>>;
}

#[async_trait]
pub trait ContractStore: Send + Sync {
    async fn insert_contract(&self, contract: &Contract) -> anyhow::Result<()>;
    async fn get_contract(&self, id: Uuid) -> anyhow::Result<Option<Contract>>;
    /// Newest first.
    async fn list_contracts(&self, filter: &ContractFilter) -> anyhow::Result<Vec<Contract>>;
    /// Writes `next` and appends `event` to the contract's stream as one
    /// unit, only while the stored status still equals `expected`. Returns the
    /// updated contract, or `None` when the precondition failed, in which case
    /// nothing is written.
    async fn commit_transition(
        &self,
        id: Uuid,
        expected: ContractStatus,
        next: ContractStatus,
        at: DateTime<Utc>,
        event: DomainEvent,
    ) -> anyhow::Result<Option<Contract>>;
}

#[async_trait]
pub trait ProofStore: Send + Sync {
    async fn insert_proof(&self, proof: &PaymentProof) -> anyhow::Result<()>;
    async fn get_proof(&self, id: Uuid) -> anyhow::Result<Option<PaymentProof>>;
    async fn proofs_for_contract(&self, contract_id: Uuid) -> anyhow::Result<Vec<PaymentProof>>;
    /// Oldest submission first.
    async fn proofs_with_status(&self, status: ReviewStatus) -> anyhow::Result<Vec<PaymentProof>>;
    /// Records a decision only while the proof is still pending. Returns the
    /// reviewed proof, or `None` when it was no longer pending.
    async fn record_review(
        &self,
        id: Uuid,
        decision: ReviewDecision,
        reviewer_id: Uuid,
        note: Option<&str>,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<PaymentProof>>;
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Inserts `candidate` unless an account already exists for its user.
    /// Always returns the account that is stored after the call.
    async fn insert_account_if_absent(&self, candidate: &Account) -> anyhow::Result<Account>;
    async fn get_account(&self, id: Uuid) -> anyhow::Result<Option<Account>>;
    async fn account_for_user(&self, user_id: Uuid) -> anyhow::Result<Option<Account>>;
    /// Stores `payment` directly after the account's latest paid period.
    /// `payment.period_start` is the earliest allowed start; the stored period
    /// starts at the later of that and the latest `period_end`, and lasts
    /// `length`. Concurrent calls for one account never overlap.
    async fn extend_subscription(
        &self,
        payment: PlanPayment,
        length: Duration,
    ) -> anyhow::Result<PlanPayment>;
    /// Ordered by period start.
    async fn payments_for_account(&self, account_id: Uuid) -> anyhow::Result<Vec<PlanPayment>>;
}

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert_notification(&self, notification: &Notification) -> anyhow::Result<()>;
    async fn get_notification(&self, id: Uuid) -> anyhow::Result<Option<Notification>>;
    async fn count_unread(&self, user_id: Uuid) -> anyhow::Result<i64>;
    /// Newest first.
    async fn notifications_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<Notification>>;
    /// Sets the read flag if it is not already set. Returns the stored row.
    async fn mark_read(&self, id: Uuid, at: DateTime<Utc>) -> anyhow::Result<Option<Notification>>;
    async fn mark_all_read(&self, user_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<u64>;
}
