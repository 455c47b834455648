pub mod contracts;
pub mod payments;
mod validate;

pub use contracts::ContractWorkflowService;
pub use payments::PaymentReviewService;
