//! Payment aggregate and service.

mod aggregate;
mod events;
mod service;
mod status;

pub use aggregate::Payment;
pub use events::{
    PaymentCreatedData, PaymentEvent, PaymentFailedData, PaymentProcessingData,
    PaymentRefundedData, PaymentSucceededData,
};
pub use service::{CreatePayment, PaymentService};
pub use status::PaymentStatus;

use thiserror::Error;

use crate::error::DomainError;

/// Errors that can occur during payment operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaymentError {
    #[error("Payment already created")]
    AlreadyCreated,

    #[error("Payment not created")]
    NotCreated,

    #[error("Payment amount must be positive")]
    NonPositiveAmount,

    #[error("Transaction id must not be empty")]
    EmptyTransactionId,

    /// The requested status lies behind, or beside, the current one.
    #[error("Invalid payment transition: {from} -> {to}")]
    InvalidTransition {
        from: PaymentStatus,
        to: PaymentStatus,
    },
}

impl From<PaymentError> for DomainError {
    fn from(e: PaymentError) -> Self {
        match e {
            PaymentError::NonPositiveAmount | PaymentError::EmptyTransactionId => {
                DomainError::Validation(e.to_string())
            }
            PaymentError::AlreadyCreated
            | PaymentError::NotCreated
            | PaymentError::InvalidTransition { .. } => {
                DomainError::invalid_state("Payment", e.to_string())
            }
        }
    }
}
