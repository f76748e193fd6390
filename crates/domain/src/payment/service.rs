//! Payment service.

use common::AggregateId;
use store::Store;

use crate::aggregate::Aggregate;
use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;
use crate::order::{Order, OrderError};
use crate::unit_of_work::UnitOfWork;

use super::Payment;

/// Command to open a payment for an order's total.
#[derive(Debug, Clone)]
pub struct CreatePayment {
    pub payment_id: AggregateId,
    pub order_id: AggregateId,
}

impl CreatePayment {
    pub fn for_order(order_id: AggregateId) -> Self {
        Self {
            payment_id: AggregateId::new(),
            order_id,
        }
    }
}

/// Service for managing payments.
///
/// A successful payment and the order it settles are committed together.
pub struct PaymentService<S: Store> {
    handler: CommandHandler<S, Payment>,
    orders: CommandHandler<S, Order>,
}

impl<S: Store + Clone> PaymentService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store.clone()),
            orders: CommandHandler::new(store),
        }
    }

    /// Opens a payment for a pending order, charging the order total.
    #[tracing::instrument(skip(self))]
    pub async fn create_payment(
        &self,
        cmd: CreatePayment,
    ) -> Result<CommandResult<Payment>, DomainError> {
        let CreatePayment {
            payment_id,
            order_id,
        } = cmd;

        let order = self.orders.load_required(order_id).await?;
        if !order.status().can_pay() {
            return Err(OrderError::InvalidStateTransition {
                current: order.status(),
                action: "pay",
            }
            .into());
        }
        let amount = order.total().ok_or(OrderError::NotCreated)?;

        self.handler
            .execute(payment_id, |payment| payment.create(payment_id, order_id, amount))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn start_processing(
        &self,
        payment_id: AggregateId,
    ) -> Result<CommandResult<Payment>, DomainError> {
        let payment = self.handler.load_required(payment_id).await?;
        self.handler
            .execute_on(payment, |payment| payment.start_processing())
            .await
    }

    /// Records a successful charge and marks the order paid in the same
    /// commit. Repeating it is a no-op.
    #[tracing::instrument(skip(self, transaction_id))]
    pub async fn succeed(
        &self,
        payment_id: AggregateId,
        transaction_id: impl Into<String>,
    ) -> Result<CommandResult<Payment>, DomainError> {
        let mut payment = self.handler.load_required(payment_id).await?;
        let order_id = payment
            .order_id()
            .ok_or_else(|| DomainError::not_found(Payment::aggregate_type(), payment_id))?;
        let mut order = self.orders.load_required(order_id).await?;

        let events = payment.succeed(transaction_id)?;
        let order_events = order.mark_paid(payment_id)?;

        let mut uow = UnitOfWork::new(self.handler.store());
        uow.stage(&mut payment, events.clone())?;
        uow.stage(&mut order, order_events)?;
        uow.save_changes().await?;

        Ok(CommandResult {
            new_version: payment.version(),
            aggregate: payment,
            events,
        })
    }

    #[tracing::instrument(skip(self, error_message))]
    pub async fn fail(
        &self,
        payment_id: AggregateId,
        error_message: impl Into<String>,
    ) -> Result<CommandResult<Payment>, DomainError> {
        let error_message = error_message.into();
        let payment = self.handler.load_required(payment_id).await?;
        let result = self
            .handler
            .execute_on(payment, |payment| payment.fail(error_message))
            .await?;
        if !result.events.is_empty() {
            tracing::warn!(%payment_id, "payment failed");
        }
        Ok(result)
    }

    #[tracing::instrument(skip(self))]
    pub async fn refund(
        &self,
        payment_id: AggregateId,
    ) -> Result<CommandResult<Payment>, DomainError> {
        let payment = self.handler.load_required(payment_id).await?;
        self.handler
            .execute_on(payment, |payment| payment.refund())
            .await
    }

    pub async fn get_payment(
        &self,
        payment_id: AggregateId,
    ) -> Result<Option<Payment>, DomainError> {
        self.handler.load_existing(payment_id).await
    }
}
