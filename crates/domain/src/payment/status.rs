//! Payment status machine.

use serde::{Deserialize, Serialize};

/// The status of a payment. Moves forward only:
///
/// ```text
/// Pending ──► Processing ──┬──► Succeeded ──► Refunded
///    │                     └──► Failed
///    └──► Succeeded | Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Succeeded,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// True if moving from `self` to `next` is a forward step.
    ///
    /// Staying in the same status is not a transition; callers treat it as a
    /// no-op.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending | Processing, Succeeded)
                | (Pending | Processing, Failed)
                | (Succeeded, Refunded)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Failed | PaymentStatus::Refunded)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "Pending",
            PaymentStatus::Processing => "Processing",
            PaymentStatus::Succeeded => "Succeeded",
            PaymentStatus::Failed => "Failed",
            PaymentStatus::Refunded => "Refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
