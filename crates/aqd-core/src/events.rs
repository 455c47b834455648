use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{ContractStatus, Role};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DomainEventKind {
    ContractCreated,
    ContractTransitioned,
    ProofSubmitted,
    ProofApproved,
    ProofRejected,
}

impl DomainEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainEventKind::ContractCreated => "CONTRACT_CREATED",
            DomainEventKind::ContractTransitioned => "CONTRACT_TRANSITIONED",
            DomainEventKind::ProofSubmitted => "PROOF_SUBMITTED",
            DomainEventKind::ProofApproved => "PROOF_APPROVED",
            DomainEventKind::ProofRejected => "PROOF_REJECTED",
        }
    }
}

impl FromStr for DomainEventKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "CONTRACT_CREATED" => Ok(DomainEventKind::ContractCreated),
            "CONTRACT_TRANSITIONED" => Ok(DomainEventKind::ContractTransitioned),
            "PROOF_SUBMITTED" => Ok(DomainEventKind::ProofSubmitted),
            "PROOF_APPROVED" => Ok(DomainEventKind::ProofApproved),
            "PROOF_REJECTED" => Ok(DomainEventKind::ProofRejected),
            other => Err(format!("unknown domain event kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub aggregate_id: Uuid,
    pub kind: DomainEventKind,
    pub occurred_at: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl DomainEvent {
    pub fn new(aggregate_id: Uuid, kind: DomainEventKind, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            aggregate_id,
            kind,
            occurred_at: Utc::now(),
            payload,
        }
    }
}

/// Payload of a `ContractTransitioned` event.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransitionRecord {
    pub from: ContractStatus,
    pub to: ContractStatus,
    pub actor_id: Uuid,
    pub actor_role: Role,
    pub at: DateTime<Utc>,
}
