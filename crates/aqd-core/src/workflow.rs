//! The fixed contract transition graph.
//!
//! Every allowed `(from, to)` edge names the roles that may take it and
//! whether it is gated on an approved payment proof. Completed and Cancelled
//! have no outgoing edges.

use crate::models::{ContractStatus, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    pub from: ContractStatus,
    pub to: ContractStatus,
    pub roles: &'static [Role],
    pub requires_approved_proof: bool,
}

impl TransitionRule {
    pub fn permits(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }
}

const ADMIN_ONLY: &[Role] = &[Role::Admin];
const ADMIN_OR_AFFILIATE: &[Role] = &[Role::Admin, Role::Affiliate];

pub const TRANSITIONS: &[TransitionRule] = &[
    TransitionRule {
        from: ContractStatus::Draft,
        to: ContractStatus::PendingReview,
        roles: ADMIN_OR_AFFILIATE,
        requires_approved_proof: false,
    },
    TransitionRule {
        from: ContractStatus::PendingReview,
        to: ContractStatus::Active,
        roles: ADMIN_ONLY,
        requires_approved_proof: true,
    },
    TransitionRule {
        from: ContractStatus::PendingReview,
        to: ContractStatus::Cancelled,
        roles: ADMIN_ONLY,
        requires_approved_proof: false,
    },
    TransitionRule {
        from: ContractStatus::Active,
        to: ContractStatus::Completed,
        roles: ADMIN_OR_AFFILIATE,
        requires_approved_proof: false,
    },
    TransitionRule {
        from: ContractStatus::Draft,
        to: ContractStatus::Cancelled,
        roles: ADMIN_OR_AFFILIATE,
        requires_approved_proof: false,
    },
    TransitionRule {
        from: ContractStatus::Active,
        to: ContractStatus::Cancelled,
        roles: ADMIN_ONLY,
        requires_approved_proof: false,
    },
];

pub fn rule_for(from: ContractStatus, to: ContractStatus) -> Option<&'static TransitionRule> {
    TRANSITIONS
        .iter()
        .find(|rule| rule.from == from && rule.to == to)
}

pub fn next_statuses(from: ContractStatus) -> Vec<ContractStatus> {
    TRANSITIONS
        .iter()
        .filter(|rule| rule.from == from)
        .map(|rule| rule.to)
        .collect()
}

/// True when `statuses` starts at Draft and every consecutive pair is an edge.
pub fn is_valid_path(statuses: &[ContractStatus]) -> bool {
    match statuses.first() {
        Some(ContractStatus::Draft) => statuses
            .windows(2)
            .all(|pair| rule_for(pair[0], pair[1]).is_some()),
        _ => false,
    }
}
