use std::sync::Arc;

use aqd_core::{
    Actor, Contract, ContractDetails, ContractFilter, ContractStatus, ContractStore, DomainEvent,
    DomainEventKind, EventStore, NewContract, NotificationKind, ProofStore, ProofSummary, Result,
    ReviewStatus, Role, ServiceError, TransitionRecord, rule_for,
};
use aqd_notify::NotificationService;
use chrono::Utc;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::validate::{ensure_no_missing, normalize_currency, positive_amount, required_text};

pub const DEFAULT_LIST_LIMIT: i64 = 50;
pub const MAX_LIST_LIMIT: i64 = 200;

/// Creates contracts and moves them along the transition graph.
#[derive(Clone)]
pub struct ContractWorkflowService {
    contracts: Arc<dyn ContractStore>,
    proofs: Arc<dyn ProofStore>,
    events: Arc<dyn EventStore>,
    notifications: NotificationService,
}

impl ContractWorkflowService {
    pub fn new(
        contracts: Arc<dyn ContractStore>,
        proofs: Arc<dyn ProofStore>,
        events: Arc<dyn EventStore>,
        notifications: NotificationService,
    ) -> Self {
        Self {
            contracts,
            proofs,
            events,
            notifications,
        }
    }

    pub async fn create_contract(&self, input: NewContract, actor: &Actor) -> Result<Contract> {
        let mut missing = Vec::new();
        if input.provider_id.is_none() {
            missing.push("provider_id".to_string());
        }
        if input.client_id.is_none() {
            missing.push("client_id".to_string());
        }
        let service_ref = required_text(input.service_ref.as_deref(), "service_ref", &mut missing);
        let title = required_text(input.title.as_deref(), "title", &mut missing);
        if input.amount.is_none() {
            missing.push("amount".to_string());
        }
        let currency = required_text(input.currency.as_deref(), "currency", &mut missing);
        ensure_no_missing(&missing)?;

        let (Some(provider_id), Some(client_id), Some(amount)) =
            (input.provider_id, input.client_id, input.amount)
        else {
            return Err(ServiceError::validation("missing required fields"));
        };
        if provider_id == client_id {
            return Err(ServiceError::validation(
                "provider and client must be different parties",
            ));
        }
        let amount = positive_amount(amount, "amount")?;
        let currency = normalize_currency(&currency)?;

        match actor.role {
            Role::Admin => {}
            Role::Affiliate if actor.user_id == provider_id => {}
            Role::Affiliate => {
                return Err(ServiceError::unauthorized(
                    "affiliates may only create contracts they provide",
                ));
            }
            Role::Client => {
                return Err(ServiceError::unauthorized("clients cannot create contracts"));
            }
        }

        let now = Utc::now();
        let contract = Contract {
            id: Uuid::new_v4(),
            provider_id,
            client_id,
            service_ref,
            title,
            amount,
            currency,
            status: ContractStatus::Draft,
            created_at: now,
            updated_at: now,
        };

        self.contracts.insert_contract(&contract).await?;
        self.events
            .append(
                contract.id,
                DomainEvent::new(
                    contract.id,
                    DomainEventKind::ContractCreated,
                    json!({
                        "created_by": actor.user_id,
                        "provider_id": provider_id,
                        "client_id": client_id,
                    }),
                ),
            )
            .await?;

        info!(contract_id = %contract.id, actor_id = %actor.user_id, "contract created");
        Ok(contract)
    }

    pub async fn get_contract_by_id(&self, id: Uuid) -> Result<ContractDetails> {
        let contract = self.load(id).await?;
        let proofs = self
            .proofs
            .proofs_for_contract(id)
            .await?
            .iter()
            .map(ProofSummary::from)
            .collect();

        Ok(ContractDetails { contract, proofs })
    }

    /// Dashboard listing scoped to what the actor may see.
    pub async fn list_contracts(
        &self,
        mut filter: ContractFilter,
        actor: &Actor,
    ) -> Result<Vec<Contract>> {
        match actor.role {
            Role::Admin => {}
            Role::Affiliate => filter.provider_id = Some(actor.user_id),
            Role::Client => filter.party_id = Some(actor.user_id),
        }
        filter.limit = Some(
            filter
                .limit
                .unwrap_or(DEFAULT_LIST_LIMIT)
                .clamp(1, MAX_LIST_LIMIT),
        );
        Ok(self.contracts.list_contracts(&filter).await?)
    }

    pub async fn transition(
        &self,
        id: Uuid,
        target: ContractStatus,
        actor: &Actor,
    ) -> Result<Contract> {
        let contract = self.load(id).await?;
        let from = contract.status;

        let Some(rule) = rule_for(from, target) else {
            let reason = if from.is_terminal() {
                format!("contract is already {from}")
            } else {
                "no such edge in the transition graph".to_string()
            };
            return Err(ServiceError::InvalidTransition {
                from,
                to: target,
                reason,
            });
        };

        if !rule.permits(actor.role) {
            return Err(ServiceError::unauthorized(format!(
                "role {} may not move a contract from {from} to {target}",
                actor.role
            )));
        }
        if actor.role == Role::Affiliate && contract.provider_id != actor.user_id {
            return Err(ServiceError::unauthorized(
                "affiliates may only act on contracts they provide",
            ));
        }

        if rule.requires_approved_proof {
            let approved = self
                .proofs
                .proofs_for_contract(id)
                .await?
                .iter()
                .any(|proof| proof.status == ReviewStatus::Approved);
            if !approved {
                return Err(ServiceError::InvalidTransition {
                    from,
                    to: target,
                    reason: "payment proof has not been approved".to_string(),
                });
            }
        }

        let now = Utc::now();
        let record = TransitionRecord {
            from,
            to: target,
            actor_id: actor.user_id,
            actor_role: actor.role,
            at: now,
        };
        let payload = serde_json::to_value(&record).map_err(anyhow::Error::from)?;
        let event = DomainEvent::new(id, DomainEventKind::ContractTransitioned, payload);

        let Some(updated) = self
            .contracts
            .commit_transition(id, from, target, now, event)
            .await?
        else {
            return Err(ServiceError::InvalidTransition {
                from,
                to: target,
                reason: "contract status changed concurrently".to_string(),
            });
        };

        info!(
            contract_id = %id,
            from = from.as_str(),
            to = target.as_str(),
            actor_id = %actor.user_id,
            "contract transitioned"
        );

        let recipient = updated.counter_party(actor.user_id);
        let message = format!(
            "تم تغيير حالة العقد \"{}\" من {} إلى {}",
            updated.title,
            from.label_ar(),
            target.label_ar()
        );
        if let Err(err) = self
            .notifications
            .notify(
                recipient,
                NotificationKind::ContractStatusChanged,
                json!({
                    "contract_id": id,
                    "from": from,
                    "to": target,
                    "actor_id": actor.user_id,
                    "message": message,
                }),
            )
            .await
        {
            warn!(contract_id = %id, recipient = %recipient, "failed to enqueue transition notification: {err}");
        }

        Ok(updated)
    }

    /// Recorded transitions in the order they were committed.
    pub async fn history(&self, id: Uuid) -> Result<Vec<TransitionRecord>> {
        self.load(id).await?;

        let mut records = Vec::new();
        for envelope in self.events.stream(id).await? {
            if envelope.event.kind != DomainEventKind::ContractTransitioned {
                continue;
            }
            let record: TransitionRecord = serde_json::from_value(envelope.event.payload)
                .map_err(anyhow::Error::from)?;
            records.push(record);
        }
        Ok(records)
    }

    async fn load(&self, id: Uuid) -> Result<Contract> {
        self.contracts
            .get_contract(id)
            .await?
            .ok_or_else(|| ServiceError::not_found("contract", id))
    }
}
