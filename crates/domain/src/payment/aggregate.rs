//! Payment aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};
use store::Version;

use crate::aggregate::Aggregate;
use crate::money::Money;

use super::events::{
    PaymentCreatedData, PaymentFailedData, PaymentProcessingData, PaymentRefundedData,
    PaymentSucceededData,
};
use super::{PaymentError, PaymentEvent, PaymentStatus};

/// Payment aggregate root.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Payment {
    id: Option<AggregateId>,

    #[serde(skip)]
    version: Version,

    order_id: Option<AggregateId>,
    amount: Option<Money>,
    status: PaymentStatus,

    /// Provider reference, set once on success.
    transaction_id: Option<String>,

    /// Provider error, set once on failure.
    error_message: Option<String>,

    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Aggregate for Payment {
    type Event = PaymentEvent;
    type Error = PaymentError;

    fn aggregate_type() -> &'static str {
        "Payment"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            PaymentEvent::PaymentCreated(data) => {
                self.id = Some(data.payment_id);
                self.order_id = Some(data.order_id);
                self.amount = Some(data.amount);
                self.status = PaymentStatus::Pending;
                self.created_at = Some(data.created_at);
                self.updated_at = Some(data.created_at);
            }
            PaymentEvent::PaymentProcessing(data) => {
                self.status = PaymentStatus::Processing;
                self.updated_at = Some(data.started_at);
            }
            PaymentEvent::PaymentSucceeded(data) => {
                self.status = PaymentStatus::Succeeded;
                self.transaction_id = Some(data.transaction_id);
                self.updated_at = Some(data.succeeded_at);
            }
            PaymentEvent::PaymentFailed(data) => {
                self.status = PaymentStatus::Failed;
                self.error_message = Some(data.error_message);
                self.updated_at = Some(data.failed_at);
            }
            PaymentEvent::PaymentRefunded(data) => {
                self.status = PaymentStatus::Refunded;
                self.updated_at = Some(data.refunded_at);
            }
        }
    }
}

// Query methods
impl Payment {
    pub fn order_id(&self) -> Option<AggregateId> {
        self.order_id
    }

    pub fn amount(&self) -> Option<Money> {
        self.amount
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    pub fn transaction_id(&self) -> Option<&str> {
        self.transaction_id.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Checks a move to `to`. Returns None when the payment is already there.
    fn transition(
        &self,
        to: PaymentStatus,
    ) -> Result<Option<(AggregateId, AggregateId)>, PaymentError> {
        let (Some(payment_id), Some(order_id)) = (self.id, self.order_id) else {
            return Err(PaymentError::NotCreated);
        };
        if self.status == to {
            return Ok(None);
        }
        if !self.status.can_transition_to(to) {
            return Err(PaymentError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        Ok(Some((payment_id, order_id)))
    }
}

// Command methods (return events)
impl Payment {
    pub fn create(
        &self,
        payment_id: AggregateId,
        order_id: AggregateId,
        amount: Money,
    ) -> Result<Vec<PaymentEvent>, PaymentError> {
        if self.id.is_some() {
            return Err(PaymentError::AlreadyCreated);
        }
        if !amount.is_positive() {
            return Err(PaymentError::NonPositiveAmount);
        }

        Ok(vec![PaymentEvent::PaymentCreated(PaymentCreatedData {
            payment_id,
            order_id,
            amount,
            created_at: Utc::now(),
        })])
    }

    pub fn start_processing(&self) -> Result<Vec<PaymentEvent>, PaymentError> {
        let Some((payment_id, order_id)) = self.transition(PaymentStatus::Processing)? else {
            return Ok(vec![]);
        };

        Ok(vec![PaymentEvent::PaymentProcessing(PaymentProcessingData {
            payment_id,
            order_id,
            started_at: Utc::now(),
        })])
    }

    /// Marks the payment successful. Repeating it keeps the first
    /// transaction id.
    pub fn succeed(
        &self,
        transaction_id: impl Into<String>,
    ) -> Result<Vec<PaymentEvent>, PaymentError> {
        let transaction_id = transaction_id.into();
        if transaction_id.trim().is_empty() {
            return Err(PaymentError::EmptyTransactionId);
        }
        let Some((payment_id, order_id)) = self.transition(PaymentStatus::Succeeded)? else {
            return Ok(vec![]);
        };

        Ok(vec![PaymentEvent::PaymentSucceeded(PaymentSucceededData {
            payment_id,
            order_id,
            transaction_id,
            succeeded_at: Utc::now(),
        })])
    }

    /// Marks the payment failed. Repeating it keeps the first error.
    pub fn fail(
        &self,
        error_message: impl Into<String>,
    ) -> Result<Vec<PaymentEvent>, PaymentError> {
        let Some((payment_id, order_id)) = self.transition(PaymentStatus::Failed)? else {
            return Ok(vec![]);
        };

        Ok(vec![PaymentEvent::PaymentFailed(PaymentFailedData {
            payment_id,
            order_id,
            error_message: error_message.into(),
            failed_at: Utc::now(),
        })])
    }

    pub fn refund(&self) -> Result<Vec<PaymentEvent>, PaymentError> {
        let Some((payment_id, order_id)) = self.transition(PaymentStatus::Refunded)? else {
            return Ok(vec![]);
        };

        Ok(vec![PaymentEvent::PaymentRefunded(PaymentRefundedData {
            payment_id,
            order_id,
            refunded_at: Utc::now(),
        })])
    }
}
