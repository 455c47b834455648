pub mod config;
pub mod contracts;
pub mod db;

pub use config::ServiceConfig;
pub use contracts::{
    ApiEnvelope, ApiErrorBody, ApiErrorDetail, ContractListQuery, EnsureAccountRequest,
    MarkAllReadResponse, NotificationListQuery, ReviewProofRequest, TransitionRequest,
    UnreadCountQuery, UnreadCountResponse,
};
pub use db::connect_database;
