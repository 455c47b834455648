use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Affiliate,
    Client,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Affiliate => "affiliate",
            Role::Client => "client",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "affiliate" => Ok(Role::Affiliate),
            "client" => Ok(Role::Client),
            other => Err(format!(
                "unknown role '{other}': must be admin, affiliate, or client"
            )),
        }
    }
}

/// The authenticated user performing an operation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    Draft,
    PendingReview,
    Active,
    Completed,
    Cancelled,
}

impl ContractStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "DRAFT",
            ContractStatus::PendingReview => "PENDING_REVIEW",
            ContractStatus::Active => "ACTIVE",
            ContractStatus::Completed => "COMPLETED",
            ContractStatus::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ContractStatus::Completed | ContractStatus::Cancelled)
    }

    /// Arabic label shown in notification messages.
    pub fn label_ar(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "مسودة",
            ContractStatus::PendingReview => "قيد المراجعة",
            ContractStatus::Active => "نشط",
            ContractStatus::Completed => "مكتمل",
            ContractStatus::Cancelled => "ملغي",
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Ok(ContractStatus::Draft),
            "PENDING_REVIEW" => Ok(ContractStatus::PendingReview),
            "ACTIVE" => Ok(ContractStatus::Active),
            "COMPLETED" => Ok(ContractStatus::Completed),
            "CANCELLED" => Ok(ContractStatus::Cancelled),
            other => Err(format!(
                "unknown contract status '{other}': must be DRAFT, PENDING_REVIEW, ACTIVE, COMPLETED, or CANCELLED"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Contract {
    pub id: Uuid,
    pub provider_id: Uuid,
    pub client_id: Uuid,
    pub service_ref: String,
    pub title: String,
    pub amount: Decimal,
    pub currency: String,
    pub status: ContractStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Contract {
    pub fn is_party(&self, user_id: Uuid) -> bool {
        self.provider_id == user_id || self.client_id == user_id
    }

    /// The party that should hear about an action taken by `actor_id`.
    pub fn counter_party(&self, actor_id: Uuid) -> Uuid {
        if actor_id == self.client_id {
            self.provider_id
        } else {
            self.client_id
        }
    }
}

/// Input for contract creation. Every field is optional on the wire so that
/// missing values surface as validation errors rather than decode failures.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewContract {
    pub provider_id: Option<Uuid>,
    pub client_id: Option<Uuid>,
    pub service_ref: Option<String>,
    pub title: Option<String>,
    pub amount: Option<Decimal>,
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContractFilter {
    pub status: Option<ContractStatus>,
    pub provider_id: Option<Uuid>,
    /// Matches contracts where the user is either party.
    pub party_id: Option<Uuid>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractDetails {
    #[serde(flatten)]
    pub contract: Contract,
    pub proofs: Vec<ProofSummary>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "PENDING",
            ReviewStatus::Approved => "APPROVED",
            ReviewStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Ok(ReviewStatus::Pending),
            "APPROVED" => Ok(ReviewStatus::Approved),
            "REJECTED" => Ok(ReviewStatus::Rejected),
            other => Err(format!(
                "unknown review status '{other}': must be PENDING, APPROVED, or REJECTED"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    Approved,
    Rejected,
}

impl ReviewDecision {
    pub fn status(&self) -> ReviewStatus {
        match self {
            ReviewDecision::Approved => ReviewStatus::Approved,
            ReviewDecision::Rejected => ReviewStatus::Rejected,
        }
    }
}

impl FromStr for ReviewDecision {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "APPROVED" | "APPROVE" => Ok(ReviewDecision::Approved),
            "REJECTED" | "REJECT" => Ok(ReviewDecision::Rejected),
            other => Err(format!(
                "unknown review decision '{other}': must be APPROVED or REJECTED"
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentProof {
    pub id: Uuid,
    pub contract_id: Uuid,
    pub submitted_by: Uuid,
    pub file_ref: String,
    pub amount: Decimal,
    pub method: String,
    pub status: ReviewStatus,
    pub reviewer_id: Option<Uuid>,
    pub review_note: Option<String>,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

/// Input for a payment proof submission; see [`NewContract`] for why the
/// fields are optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPaymentProof {
    pub file_ref: Option<String>,
    pub amount: Option<Decimal>,
    pub method: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProofSummary {
    pub id: Uuid,
    pub status: ReviewStatus,
    pub amount: Decimal,
    pub method: String,
    pub submitted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl From<&PaymentProof> for ProofSummary {
    fn from(proof: &PaymentProof) -> Self {
        Self {
            id: proof.id,
            status: proof.status,
            amount: proof.amount,
            method: proof.method.clone(),
            submitted_at: proof.submitted_at,
            reviewed_at: proof.reviewed_at,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SubscriptionStatus {
    Trialing,
    Active,
    Expired,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub user_id: Uuid,
    pub plan_id: String,
    pub trial_start: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanPayment {
    pub id: Uuid,
    pub account_id: Uuid,
    pub plan_id: String,
    pub method: String,
    pub amount: Decimal,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub recorded_by: Uuid,
    pub recorded_at: DateTime<Utc>,
}

impl PlanPayment {
    pub fn covers(&self, at: DateTime<Utc>) -> bool {
        self.period_start <= at && at < self.period_end
    }
}

/// Input for recording a subscription payment. `amount` falls back to the
/// plan price when omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewPlanPayment {
    pub plan_id: Option<String>,
    pub method: Option<String>,
    pub amount: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationKind {
    ContractStatusChanged,
    PaymentReviewed,
    ProofSubmitted,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::ContractStatusChanged => "CONTRACT_STATUS_CHANGED",
            NotificationKind::PaymentReviewed => "PAYMENT_REVIEWED",
            NotificationKind::ProofSubmitted => "PROOF_SUBMITTED",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "CONTRACT_STATUS_CHANGED" => Ok(NotificationKind::ContractStatusChanged),
            "PAYMENT_REVIEWED" => Ok(NotificationKind::PaymentReviewed),
            "PROOF_SUBMITTED" => Ok(NotificationKind::ProofSubmitted),
            other => Err(format!("unknown notification kind '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub kind: NotificationKind,
    pub payload: serde_json::Value,
    pub read: bool,
    pub created_at: DateTime<Utc>,
    pub read_at: Option<DateTime<Utc>>,
}
