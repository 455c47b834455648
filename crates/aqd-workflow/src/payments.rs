use std::sync::Arc;

use aqd_core::{
    Actor, Catalog, ContractStatus, ContractStore, DomainEvent, DomainEventKind, EventStore,
    NewPaymentProof, NotificationKind, PaymentProof, ProofStore, Result, ReviewDecision,
    ReviewStatus, ServiceError,
};
use aqd_notify::NotificationService;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::validate::{ensure_no_missing, positive_amount, required_text};

/// Intake and review queue for client-submitted payment proofs.
#[derive(Clone)]
pub struct PaymentReviewService {
    contracts: Arc<dyn ContractStore>,
    proofs: Arc<dyn ProofStore>,
    events: Arc<dyn EventStore>,
    notifications: NotificationService,
    catalog: Arc<Catalog>,
}

impl PaymentReviewService {
    pub fn new(
        contracts: Arc<dyn ContractStore>,
        proofs: Arc<dyn ProofStore>,
        events: Arc<dyn EventStore>,
        notifications: NotificationService,
        catalog: Arc<Catalog>,
    ) -> Self {
        Self {
            contracts,
            proofs,
            events,
            notifications,
            catalog,
        }
    }

    pub async fn submit_proof(
        &self,
        contract_id: Uuid,
        input: NewPaymentProof,
        actor: &Actor,
    ) -> Result<PaymentProof> {
        let mut missing = Vec::new();
        let file_ref = required_text(input.file_ref.as_deref(), "file_ref", &mut missing);
        let method = required_text(input.method.as_deref(), "method", &mut missing);
        if input.amount.is_none() {
            missing.push("amount".to_string());
        }
        ensure_no_missing(&missing)?;

        let method = method.to_ascii_lowercase();
        if !self.catalog.accepts_payment_method(&method) {
            return Err(ServiceError::validation(format!(
                "unsupported payment method {method}"
            )));
        }
        let amount = positive_amount(input.amount.unwrap_or_default(), "amount")?;

        let contract = self
            .contracts
            .get_contract(contract_id)
            .await?
            .ok_or_else(|| ServiceError::not_found("contract", contract_id))?;

        if !actor.is_admin() && actor.user_id != contract.client_id {
            return Err(ServiceError::unauthorized(
                "only the contract's client may submit payment proofs",
            ));
        }
        if !matches!(
            contract.status,
            ContractStatus::Draft | ContractStatus::PendingReview
        ) {
            return Err(ServiceError::validation(format!(
                "contract is {}; proofs are accepted only before activation",
                contract.status
            )));
        }

        let proof = PaymentProof {
            id: Uuid::new_v4(),
            contract_id,
            submitted_by: actor.user_id,
            file_ref,
            amount,
            method,
            status: ReviewStatus::Pending,
            reviewer_id: None,
            review_note: None,
            submitted_at: Utc::now(),
            reviewed_at: None,
        };
        self.proofs.insert_proof(&proof).await?;
        self.events
            .append(
                contract_id,
                DomainEvent::new(
                    contract_id,
                    DomainEventKind::ProofSubmitted,
                    json!({ "proof_id": proof.id, "submitted_by": actor.user_id }),
                ),
            )
            .await?;

        info!(proof_id = %proof.id, contract_id = %contract_id, "payment proof submitted");

        if let Err(err) = self
            .notifications
            .notify(
                contract.provider_id,
                NotificationKind::ProofSubmitted,
                json!({
                    "contract_id": contract_id,
                    "proof_id": proof.id,
                    "message": format!("تم رفع إثبات دفع جديد للعقد \"{}\"", contract.title),
                }),
            )
            .await
        {
            warn!(proof_id = %proof.id, "failed to enqueue submission notification: {err}");
        }

        Ok(proof)
    }

    /// Proofs awaiting review, oldest submission first.
    pub async fn list_pending_proofs(&self) -> Result<Vec<PaymentProof>> {
        Ok(self.proofs.proofs_with_status(ReviewStatus::Pending).await?)
    }

    /// Records the single review a proof may receive.
    pub async fn review_proof(
        &self,
        id: Uuid,
        decision: ReviewDecision,
        reviewer: &Actor,
        note: Option<&str>,
    ) -> Result<PaymentProof> {
        if !reviewer.is_admin() {
            return Err(ServiceError::unauthorized(
                "only administrators may review payment proofs",
            ));
        }

        let existing = self
            .proofs
            .get_proof(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("payment proof", id))?;
        if existing.status != ReviewStatus::Pending {
            return Err(ServiceError::AlreadyReviewed(id));
        }

        let note = note.map(str::trim).filter(|text| !text.is_empty());
        let Some(reviewed) = self
            .proofs
            .record_review(id, decision, reviewer.user_id, note, Utc::now())
            .await?
        else {
            return Err(ServiceError::AlreadyReviewed(id));
        };

        let kind = match decision {
            ReviewDecision::Approved => DomainEventKind::ProofApproved,
            ReviewDecision::Rejected => DomainEventKind::ProofRejected,
        };
        self.events
            .append(
                reviewed.contract_id,
                DomainEvent::new(
                    reviewed.contract_id,
                    kind,
                    json!({
                        "proof_id": id,
                        "reviewer_id": reviewer.user_id,
                        "note": reviewed.review_note,
                    }),
                ),
            )
            .await?;

        info!(
            proof_id = %id,
            contract_id = %reviewed.contract_id,
            decision = reviewed.status.as_str(),
            reviewer_id = %reviewer.user_id,
            "payment proof reviewed"
        );

        let message = match decision {
            ReviewDecision::Approved => "تم قبول إثبات الدفع",
            ReviewDecision::Rejected => "تم رفض إثبات الدفع",
        };
        if let Err(err) = self
            .notifications
            .notify(
                reviewed.submitted_by,
                NotificationKind::PaymentReviewed,
                json!({
                    "contract_id": reviewed.contract_id,
                    "proof_id": id,
                    "decision": reviewed.status,
                    "note": reviewed.review_note,
                    "message": message,
                }),
            )
            .await
        {
            warn!(proof_id = %id, "failed to enqueue review notification: {err}");
        }

        Ok(reviewed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aqd_core::{Contract, Role};
    use aqd_store::InMemoryStore;
    use rust_decimal::Decimal;

    struct Fixture {
        store: Arc<InMemoryStore>,
        service: PaymentReviewService,
        admin: Actor,
        client: Actor,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let service = PaymentReviewService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            NotificationService::new(store.clone()),
            Arc::new(Catalog::default()),
        );
        Fixture {
            store,
            service,
            admin: Actor::new(Uuid::new_v4(), Role::Admin),
            client: Actor::new(Uuid::new_v4(), Role::Client),
        }
    }

    async fn seed_contract(fx: &Fixture, status: ContractStatus) -> Contract {
        let now = Utc::now();
        let contract = Contract {
            id: Uuid::new_v4(),
            provider_id: Uuid::new_v4(),
            client_id: fx.client.user_id,
            service_ref: "SRV-9".to_string(),
            title: "استشارة".to_string(),
            amount: Decimal::new(750, 0),
            currency: "SAR".to_string(),
            status,
            created_at: now,
            updated_at: now,
        };
        fx.store.insert_contract(&contract).await.unwrap();
        contract
    }

    fn proof_input() -> NewPaymentProof {
        NewPaymentProof {
            file_ref: Some("receipts/2024/transfer-001.pdf".to_string()),
            amount: Some(Decimal::new(750, 0)),
            method: Some("Bank_Transfer".to_string()),
        }
    }

    #[tokio::test]
    async fn submission_validates_method_and_owner() {
        let fx = fixture();
        let contract = seed_contract(&fx, ContractStatus::Draft).await;

        let mut bad_method = proof_input();
        bad_method.method = Some("bitcoin".to_string());
        let err = fx
            .service
            .submit_proof(contract.id, bad_method, &fx.client)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));

        let stranger = Actor::new(Uuid::new_v4(), Role::Client);
        let err = fx
            .service
            .submit_proof(contract.id, proof_input(), &stranger)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Authorization(_)));

        let proof = fx
            .service
            .submit_proof(contract.id, proof_input(), &fx.client)
            .await
            .unwrap();
        assert_eq!(proof.method, "bank_transfer");
        assert_eq!(proof.status, ReviewStatus::Pending);
    }

    #[tokio::test]
    async fn submission_rejected_after_activation() {
        let fx = fixture();
        let contract = seed_contract(&fx, ContractStatus::Active).await;
        let err = fx
            .service
            .submit_proof(contract.id, proof_input(), &fx.client)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[tokio::test]
    async fn pending_queue_is_fifo() {
        let fx = fixture();
        let contract = seed_contract(&fx, ContractStatus::PendingReview).await;
        let mut submitted = Vec::new();
        for _ in 0..3 {
            let proof = fx
                .service
                .submit_proof(contract.id, proof_input(), &fx.client)
                .await
                .unwrap();
            submitted.push(proof.id);
        }
        fx.service
            .review_proof(submitted[1], ReviewDecision::Rejected, &fx.admin, None)
            .await
            .unwrap();

        let pending: Vec<Uuid> = fx
            .service
            .list_pending_proofs()
            .await
            .unwrap()
            .iter()
            .map(|proof| proof.id)
            .collect();
        assert_eq!(pending, vec![submitted[0], submitted[2]]);
    }

    #[tokio::test]
    async fn second_review_never_changes_decision() {
        let fx = fixture();
        let contract = seed_contract(&fx, ContractStatus::PendingReview).await;
        let proof = fx
            .service
            .submit_proof(contract.id, proof_input(), &fx.client)
            .await
            .unwrap();

        let approved = fx
            .service
            .review_proof(proof.id, ReviewDecision::Approved, &fx.admin, Some(" تم التحقق "))
            .await
            .unwrap();
        assert_eq!(approved.status, ReviewStatus::Approved);
        assert_eq!(approved.reviewer_id, Some(fx.admin.user_id));
        assert_eq!(approved.review_note.as_deref(), Some("تم التحقق"));

        let err = fx
            .service
            .review_proof(proof.id, ReviewDecision::Rejected, &fx.admin, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AlreadyReviewed(id) if id == proof.id));

        let stored = fx.store.get_proof(proof.id).await.unwrap().unwrap();
        assert_eq!(stored.status, ReviewStatus::Approved);
        assert_eq!(stored.reviewed_at, approved.reviewed_at);
    }

    #[tokio::test]
    async fn only_admins_review() {
        let fx = fixture();
        let contract = seed_contract(&fx, ContractStatus::PendingReview).await;
        let proof = fx
            .service
            .submit_proof(contract.id, proof_input(), &fx.client)
            .await
            .unwrap();

        let err = fx
            .service
            .review_proof(proof.id, ReviewDecision::Approved, &fx.client, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Authorization(_)));

        let missing = fx
            .service
            .review_proof(Uuid::new_v4(), ReviewDecision::Approved, &fx.admin, None)
            .await
            .unwrap_err();
        assert!(matches!(missing, ServiceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn review_notifies_submitter() {
        let fx = fixture();
        let contract = seed_contract(&fx, ContractStatus::PendingReview).await;
        let proof = fx
            .service
            .submit_proof(contract.id, proof_input(), &fx.client)
            .await
            .unwrap();
        fx.service
            .review_proof(proof.id, ReviewDecision::Rejected, &fx.admin, Some("المبلغ غير مطابق"))
            .await
            .unwrap();

        let inbox = NotificationService::new(fx.store.clone())
            .list_notifications(fx.client.user_id, None)
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::PaymentReviewed);
        assert_eq!(inbox[0].payload["decision"], "REJECTED");
    }

    #[tokio::test]
    async fn provider_hears_about_every_submission() {
        let fx = fixture();
        let contract = seed_contract(&fx, ContractStatus::Draft).await;
        let notifications = NotificationService::new(fx.store.clone());

        fx.service
            .submit_proof(contract.id, proof_input(), &fx.admin)
            .await
            .unwrap();
        fx.service
            .submit_proof(contract.id, proof_input(), &fx.client)
            .await
            .unwrap();

        assert_eq!(notifications.get_unread_count(contract.provider_id).await, 2);
        assert_eq!(notifications.get_unread_count(fx.client.user_id).await, 0);
    }
}
