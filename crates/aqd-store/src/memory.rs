use std::collections::HashMap;

use aqd_core::{
    Account, AccountStore, Contract, ContractFilter, ContractStatus, ContractStore, DomainEvent,
    EventEnvelope, EventStore, Notification, NotificationStore, PaymentProof, PlanPayment,
    ProofStore, ReviewDecision, ReviewStatus,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Process-local store used by tests and local development. Rows live in
/// insertion order so ties on timestamps keep a stable order.
#[derive(Default)]
pub struct InMemoryStore {
    streams: RwLock<HashMap<Uuid, Vec<EventEnvelope>>>,
    sequence: RwLock<i64>,
    contracts: RwLock<Vec<Contract>>,
    proofs: RwLock<Vec<PaymentProof>>,
    accounts: RwLock<Vec<Account>>,
    payments: RwLock<Vec<PlanPayment>>,
    notifications: RwLock<Vec<Notification>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn account_count(&self) -> usize {
        self.accounts.read().await.len()
    }
}

impl InMemoryStore {
    async fn push_event(&self, stream_id: Uuid, event: DomainEvent) -> EventEnvelope {
        let mut sequence_guard = self.sequence.write().await;
        *sequence_guard += 1;

        let envelope = EventEnvelope {
            sequence: *sequence_guard,
            stream_id,
            event,
            stored_at: Utc::now(),
        };

        let mut streams = self.streams.write().await;
        streams.entry(stream_id).or_default().push(envelope.clone());
        envelope
    }
}

#[async_trait]
impl EventStore for InMemoryStore {
    async fn append(&self, stream_id: Uuid, event: DomainEvent) -> anyhow::Result<EventEnvelope> {
        Ok(self.push_event(stream_id, event).await)
    }

    async fn stream(&self, stream_id: Uuid) -> anyhow::Result<Vec<EventEnvelope>> {
        let streams = self.streams.read().await;
        Ok(streams.get(&stream_id).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ContractStore for InMemoryStore {
    async fn insert_contract(&self, contract: &Contract) -> anyhow::Result<()> {
        let mut contracts = self.contracts.write().await;
        if contracts.iter().any(|existing| existing.id == contract.id) {
            anyhow::bail!("contract {} already exists", contract.id);
        }
        contracts.push(contract.clone());
        Ok(())
    }

    async fn get_contract(&self, id: Uuid) -> anyhow::Result<Option<Contract>> {
        let contracts = self.contracts.read().await;
        Ok(contracts.iter().find(|contract| contract.id == id).cloned())
    }

    async fn list_contracts(&self, filter: &ContractFilter) -> anyhow::Result<Vec<Contract>> {
        let contracts = self.contracts.read().await;
        let mut matched: Vec<Contract> = contracts
            .iter()
            .rev()
            .filter(|contract| filter.status.is_none_or(|status| contract.status == status))
            .filter(|contract| {
                filter
                    .provider_id
                    .is_none_or(|provider| contract.provider_id == provider)
            })
            .filter(|contract| filter.party_id.is_none_or(|party| contract.is_party(party)))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = filter.limit {
            matched.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        }
        Ok(matched)
    }

    async fn commit_transition(
        &self,
        id: Uuid,
        expected: ContractStatus,
        next: ContractStatus,
        at: DateTime<Utc>,
        event: DomainEvent,
    ) -> anyhow::Result<Option<Contract>> {
        // The contracts lock is held across the append so no reader sees the
        // new status without its event.
        let mut contracts = self.contracts.write().await;
        let Some(contract) = contracts.iter_mut().find(|contract| contract.id == id) else {
            return Ok(None);
        };
        if contract.status != expected {
            return Ok(None);
        }
        self.push_event(id, event).await;
        contract.status = next;
        contract.updated_at = at;
        Ok(Some(contract.clone()))
    }
}

#[async_trait]
impl ProofStore for InMemoryStore {
    async fn insert_proof(&self, proof: &PaymentProof) -> anyhow::Result<()> {
        let mut proofs = self.proofs.write().await;
        if proofs.iter().any(|existing| existing.id == proof.id) {
            anyhow::bail!("payment proof {} already exists", proof.id);
        }
        proofs.push(proof.clone());
        Ok(())
    }

    async fn get_proof(&self, id: Uuid) -> anyhow::Result<Option<PaymentProof>> {
        let proofs = self.proofs.read().await;
        Ok(proofs.iter().find(|proof| proof.id == id).cloned())
    }

    async fn proofs_for_contract(&self, contract_id: Uuid) -> anyhow::Result<Vec<PaymentProof>> {
        let proofs = self.proofs.read().await;
        let mut matched: Vec<PaymentProof> = proofs
            .iter()
            .filter(|proof| proof.contract_id == contract_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        Ok(matched)
    }

    async fn proofs_with_status(&self, status: ReviewStatus) -> anyhow::Result<Vec<PaymentProof>> {
        let proofs = self.proofs.read().await;
        let mut matched: Vec<PaymentProof> = proofs
            .iter()
            .filter(|proof| proof.status == status)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.submitted_at.cmp(&b.submitted_at));
        Ok(matched)
    }

    async fn record_review(
        &self,
        id: Uuid,
        decision: ReviewDecision,
        reviewer_id: Uuid,
        note: Option<&str>,
        at: DateTime<Utc>,
    ) -> anyhow::Result<Option<PaymentProof>> {
        let mut proofs = self.proofs.write().await;
        let Some(proof) = proofs.iter_mut().find(|proof| proof.id == id) else {
            return Ok(None);
        };
        if proof.status != ReviewStatus::Pending {
            return Ok(None);
        }
        proof.status = decision.status();
        proof.reviewer_id = Some(reviewer_id);
        proof.review_note = note.map(str::to_string);
        proof.reviewed_at = Some(at);
        Ok(Some(proof.clone()))
    }
}

#[async_trait]
impl AccountStore for InMemoryStore {
    async fn insert_account_if_absent(&self, candidate: &Account) -> anyhow::Result<Account> {
        let mut accounts = self.accounts.write().await;
        if let Some(existing) = accounts
            .iter()
            .find(|account| account.user_id == candidate.user_id)
        {
            return Ok(existing.clone());
        }
        accounts.push(candidate.clone());
        Ok(candidate.clone())
    }

    async fn get_account(&self, id: Uuid) -> anyhow::Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts.iter().find(|account| account.id == id).cloned())
    }

    async fn account_for_user(&self, user_id: Uuid) -> anyhow::Result<Option<Account>> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .iter()
            .find(|account| account.user_id == user_id)
            .cloned())
    }

    async fn extend_subscription(
        &self,
        mut payment: PlanPayment,
        length: Duration,
    ) -> anyhow::Result<PlanPayment> {
        let mut payments = self.payments.write().await;
        let latest_end = payments
            .iter()
            .filter(|existing| existing.account_id == payment.account_id)
            .map(|existing| existing.period_end)
            .max();
        if let Some(end) = latest_end {
            payment.period_start = payment.period_start.max(end);
        }
        payment.period_end = payment
            .period_start
            .checked_add_signed(length)
            .ok_or_else(|| anyhow::anyhow!("subscription period is out of range"))?;

        payments.push(payment.clone());
        Ok(payment)
    }

    async fn payments_for_account(&self, account_id: Uuid) -> anyhow::Result<Vec<PlanPayment>> {
        let payments = self.payments.read().await;
        let mut matched: Vec<PlanPayment> = payments
            .iter()
            .filter(|payment| payment.account_id == account_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.period_start.cmp(&b.period_start));
        Ok(matched)
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn insert_notification(&self, notification: &Notification) -> anyhow::Result<()> {
        self.notifications.write().await.push(notification.clone());
        Ok(())
    }

    async fn get_notification(&self, id: Uuid) -> anyhow::Result<Option<Notification>> {
        let notifications = self.notifications.read().await;
        Ok(notifications.iter().find(|item| item.id == id).cloned())
    }

    async fn count_unread(&self, user_id: Uuid) -> anyhow::Result<i64> {
        let notifications = self.notifications.read().await;
        let count = notifications
            .iter()
            .filter(|item| item.user_id == user_id && !item.read)
            .count();
        Ok(i64::try_from(count)?)
    }

    async fn notifications_for_user(
        &self,
        user_id: Uuid,
        limit: i64,
    ) -> anyhow::Result<Vec<Notification>> {
        let notifications = self.notifications.read().await;
        let mut matched: Vec<Notification> = notifications
            .iter()
            .rev()
            .filter(|item| item.user_id == user_id)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matched.truncate(usize::try_from(limit.max(0)).unwrap_or(usize::MAX));
        Ok(matched)
    }

    async fn mark_read(&self, id: Uuid, at: DateTime<Utc>) -> anyhow::Result<Option<Notification>> {
        let mut notifications = self.notifications.write().await;
        let Some(item) = notifications.iter_mut().find(|item| item.id == id) else {
            return Ok(None);
        };
        if !item.read {
            item.read = true;
            item.read_at = Some(at);
        }
        Ok(Some(item.clone()))
    }

    async fn mark_all_read(&self, user_id: Uuid, at: DateTime<Utc>) -> anyhow::Result<u64> {
        let mut notifications = self.notifications.write().await;
        let mut changed = 0;
        for item in notifications
            .iter_mut()
            .filter(|item| item.user_id == user_id && !item.read)
        {
            item.read = true;
            item.read_at = Some(at);
            changed += 1;
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn contract(status: ContractStatus) -> Contract {
        let now = Utc::now();
        Contract {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            service_ref: "SRV-7".to_string(),
            title: "تصميم هوية".to_string(),
            amount: Decimal::new(500, 0),
            currency: "SAR".to_string(),
            status,
            created_at: now,
            updated_at: now,
        }
    }

    fn transitioned(id: Uuid) -> DomainEvent {
        DomainEvent::new(
            id,
            aqd_core::DomainEventKind::ContractTransitioned,
            serde_json::Value::Null,
        )
    }

    #[tokio::test]
    async fn transition_commit_rejects_stale_expectation() {
        let store = InMemoryStore::new();
        let contract = contract(ContractStatus::Draft);
        store.insert_contract(&contract).await.unwrap();

        let updated = store
            .commit_transition(
                contract.id,
                ContractStatus::Draft,
                ContractStatus::PendingReview,
                Utc::now(),
                transitioned(contract.id),
            )
            .await
            .unwrap();
        assert_eq!(updated.unwrap().status, ContractStatus::PendingReview);

        let stale = store
            .commit_transition(
                contract.id,
                ContractStatus::Draft,
                ContractStatus::Cancelled,
                Utc::now(),
                transitioned(contract.id),
            )
            .await
            .unwrap();
        assert!(stale.is_none());

        // Only the committed transition reached the stream.
        assert_eq!(store.stream(contract.id).await.unwrap().len(), 1);
        let stored = store.get_contract(contract.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ContractStatus::PendingReview);
    }

    #[tokio::test]
    async fn subscription_periods_chain_back_to_back() {
        let store = InMemoryStore::new();
        let account_id = Uuid::new_v4();
        let now = Utc::now();
        let payment = || PlanPayment {
            id: Uuid::new_v4(),
            account_id,
            plan_id: "basic".to_string(),
            method: "cash".to_string(),
            amount: Decimal::new(99, 0),
            period_start: now,
            period_end: now,
            recorded_by: Uuid::new_v4(),
            recorded_at: now,
        };

        let first = store
            .extend_subscription(payment(), Duration::days(30))
            .await
            .unwrap();
        let second = store
            .extend_subscription(payment(), Duration::days(30))
            .await
            .unwrap();

        assert_eq!(first.period_start, now);
        assert_eq!(second.period_start, first.period_end);
        assert_eq!(second.period_end, now + Duration::days(60));
        assert!(
            store
                .extend_subscription(payment(), Duration::MAX)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn account_insert_is_keyed_by_user() {
        let store = InMemoryStore::new();
        let user_id = Uuid::new_v4();
        let first = Account {
            id: Uuid::new_v4(),
            user_id,
            plan_id: "basic".to_string(),
            trial_start: Utc::now(),
            created_at: Utc::now(),
        };
        let second = Account {
            id: Uuid::new_v4(),
            ..first.clone()
        };

        let stored_first = store.insert_account_if_absent(&first).await.unwrap();
        let stored_second = store.insert_account_if_absent(&second).await.unwrap();

        assert_eq!(stored_first.id, first.id);
        assert_eq!(stored_second.id, first.id);
        assert_eq!(store.account_count().await, 1);
    }

    #[tokio::test]
    async fn event_sequence_is_global_and_streams_are_separate() {
        let store = InMemoryStore::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let kind = aqd_core::DomainEventKind::ContractCreated;

        store
            .append(a, DomainEvent::new(a, kind, serde_json::Value::Null))
            .await
            .unwrap();
        let second = store
            .append(b, DomainEvent::new(b, kind, serde_json::Value::Null))
            .await
            .unwrap();

        assert_eq!(second.sequence, 2);
        assert_eq!(store.stream(a).await.unwrap().len(), 1);
        assert!(store.stream(Uuid::new_v4()).await.unwrap().is_empty());
    }
}
