//! Domain layer for the catalog backend.
//!
//! This crate provides:
//! - the Aggregate and DomainEvent traits for state-stored entities
//! - UnitOfWork, which commits aggregate writes and their outbox events atomically
//! - CommandHandler for single-aggregate commands
//! - the Category hierarchy with its validation and reconciliation
//! - Cart, Order and Payment aggregates with their services
//! - Money and Discount value objects

pub mod aggregate;
pub mod cart;
pub mod category;
pub mod command;
pub mod error;
pub mod money;
pub mod order;
pub mod payment;
pub mod unit_of_work;

pub use aggregate::{Aggregate, DomainEvent};
pub use cart::{Cart, CartError, CartEvent, CartItem, CartService, NewCartItem};
pub use category::{
    CATEGORY_SLUG_SCOPE, Category, CategoryError, CategoryEvent, CategoryReader, CategoryService,
    HierarchyReconciler, MAX_HIERARCHY_DEPTH, ReconcileReport, StoreCategoryReader,
};
pub use command::{CommandHandler, CommandResult};
pub use error::{ConflictKind, DomainError};
pub use money::{Currency, Discount, Money, MoneyError};
pub use order::{Order, OrderError, OrderEvent, OrderItem, OrderService, OrderStatus};
pub use payment::{Payment, PaymentError, PaymentEvent, PaymentService, PaymentStatus};
pub use unit_of_work::UnitOfWork;
