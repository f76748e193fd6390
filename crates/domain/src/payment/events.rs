//! Payment domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;
use crate::money::Money;

/// Events that can occur on a payment aggregate. Each carries the order it
/// pays for, so the order's cache entry can be evicted too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PaymentEvent {
    PaymentCreated(PaymentCreatedData),
    PaymentProcessing(PaymentProcessingData),
    PaymentSucceeded(PaymentSucceededData),
    PaymentFailed(PaymentFailedData),
    PaymentRefunded(PaymentRefundedData),
}

impl DomainEvent for PaymentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentEvent::PaymentCreated(_) => "PaymentCreated",
            PaymentEvent::PaymentProcessing(_) => "PaymentProcessing",
            PaymentEvent::PaymentSucceeded(_) => "PaymentSucceeded",
            PaymentEvent::PaymentFailed(_) => "PaymentFailed",
            PaymentEvent::PaymentRefunded(_) => "PaymentRefunded",
        }
    }
}

impl PaymentEvent {
    pub const TYPES: [&'static str; 5] = [
        "PaymentCreated",
        "PaymentProcessing",
        "PaymentSucceeded",
        "PaymentFailed",
        "PaymentRefunded",
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentCreatedData {
    pub payment_id: AggregateId,
    pub order_id: AggregateId,
    pub amount: Money,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentProcessingData {
    pub payment_id: AggregateId,
    pub order_id: AggregateId,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentSucceededData {
    pub payment_id: AggregateId,
    pub order_id: AggregateId,
    pub transaction_id: String,
    pub succeeded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentFailedData {
    pub payment_id: AggregateId,
    pub order_id: AggregateId,
    pub error_message: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRefundedData {
    pub payment_id: AggregateId,
    pub order_id: AggregateId,
    pub refunded_at: DateTime<Utc>,
}
