pub mod catalog;
pub mod error;
pub mod events;
pub mod models;
pub mod storage;
pub mod workflow;

pub use catalog::{Catalog, Plan};
pub use error::{Result, ServiceError};
pub use events::{DomainEvent, DomainEventKind, TransitionRecord};
pub use models::{
    Account, Actor, Contract, ContractDetails, ContractFilter, ContractStatus, NewContract,
    NewPaymentProof, NewPlanPayment, Notification, NotificationKind, PaymentProof, PlanPayment,
    ProofSummary, ReviewDecision, ReviewStatus, Role, SubscriptionStatus,
};
pub use storage::{
    AccountStore, ContractStore, EventEnvelope, EventStore, NotificationStore, ProofStore,
};
pub use workflow::{TRANSITIONS, TransitionRule, is_valid_path, next_statuses, rule_for};
