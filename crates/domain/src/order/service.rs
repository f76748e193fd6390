//! Order service providing a simplified API for order operations.

use common::{AggregateId, UserId};
use store::{RecordQuery, Store};

use crate::aggregate::Aggregate;
use crate::cart::Cart;
use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;
use crate::unit_of_work::UnitOfWork;

use super::{CancelOrder, Order, OrderError, OrderItem, PlaceOrder, ShipOrder};

/// Service for managing orders.
///
/// Placement touches two aggregates: the new order and the cart it empties.
/// Both are committed together, so a failed checkout leaves the cart intact.
pub struct OrderService<S: Store> {
    handler: CommandHandler<S, Order>,
    carts: CommandHandler<S, Cart>,
}

impl<S: Store + Clone> OrderService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store.clone()),
            carts: CommandHandler::new(store),
        }
    }

    pub fn handler(&self) -> &CommandHandler<S, Order> {
        &self.handler
    }

    /// Places an order from a cart and clears the cart in the same commit.
    #[tracing::instrument(skip(self), fields(order_id = %cmd.order_id, cart_id = %cmd.cart_id))]
    pub async fn place_order(&self, cmd: PlaceOrder) -> Result<CommandResult<Order>, DomainError> {
        let PlaceOrder {
            order_id,
            cart_id,
            discount,
        } = cmd;

        let mut cart = self.carts.load_required(cart_id).await?;
        let user_id = cart
            .user_id()
            .ok_or(OrderError::AnonymousCart { cart_id })?;
        let items: Vec<OrderItem> = cart.items().iter().map(OrderItem::from).collect();

        let mut order = self.handler.load(order_id).await?;
        let events = order.place(order_id, user_id, cart_id, items, discount)?;
        let cart_events = cart.clear()?;

        let mut uow = UnitOfWork::new(self.handler.store());
        uow.stage(&mut order, events.clone())?;
        uow.stage(&mut cart, cart_events)?;
        uow.save_changes().await?;

        tracing::info!(%user_id, total = ?order.total(), "order placed");

        Ok(CommandResult {
            new_version: order.version(),
            aggregate: order,
            events,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn ship(&self, cmd: ShipOrder) -> Result<CommandResult<Order>, DomainError> {
        let order = self.handler.load_required(cmd.order_id).await?;
        self.handler
            .execute_on(order, |order| order.ship(cmd.tracking_number))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn deliver(&self, order_id: AggregateId) -> Result<CommandResult<Order>, DomainError> {
        let order = self.handler.load_required(order_id).await?;
        self.handler.execute_on(order, |order| order.deliver()).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, cmd: CancelOrder) -> Result<CommandResult<Order>, DomainError> {
        let order = self.handler.load_required(cmd.order_id).await?;
        self.handler
            .execute_on(order, |order| order.cancel(cmd.reason))
            .await
    }

    pub async fn get_order(&self, order_id: AggregateId) -> Result<Option<Order>, DomainError> {
        self.handler.load_existing(order_id).await
    }

    /// Orders placed by a user, oldest first.
    pub async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, DomainError> {
        let query = RecordQuery::for_type(Order::aggregate_type())
            .field_eq("user_id", serde_json::to_value(user_id)?)
            .order_by("placed_at");

        self.handler
            .store()
            .query(query)
            .await?
            .into_iter()
            .map(|record| Order::from_record(record).map_err(DomainError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::{AddCartItem, AssignCart, CartService, CreateCart, NewCartItem};
    use crate::money::{Currency, Discount, Money};
    use crate::order::OrderStatus;
    use common::ProductId;
    use store::InMemoryStore;

    async fn filled_cart(store: &InMemoryStore, user: Option<UserId>) -> AggregateId {
        let carts = CartService::new(store.clone());
        let cart_id = carts
            .create_cart(CreateCart::anonymous())
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();
        carts
            .add_item(AddCartItem::new(
                cart_id,
                NewCartItem {
                    product_id: ProductId::new(),
                    variant_id: None,
                    product_name: "Lamp".to_string(),
                    sku: "LMP-1".to_string(),
                    slug: "lamp".to_string(),
                    variant_name: None,
                    unit_price: Money::new(4000, Currency::Eur).unwrap(),
                    quantity: 2,
                },
            ))
            .await
            .unwrap();
        if let Some(user) = user {
            carts
                .assign_user(AssignCart::new(cart_id, user))
                .await
                .unwrap();
        }
        cart_id
    }

    #[tokio::test]
    async fn placing_clears_the_cart_atomically() {
        let store = InMemoryStore::new();
        let user = UserId::new();
        let cart_id = filled_cart(&store, Some(user)).await;
        let service = OrderService::new(store.clone());

        let result = service
            .place_order(
                PlaceOrder::from_cart(cart_id).with_discount(Discount::percentage(25).unwrap()),
            )
            .await
            .unwrap();

        let order = result.aggregate;
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.items().len(), 1);
        assert_eq!(order.total(), Some(Money::new(6000, Currency::Eur).unwrap()));

        let cart = CartService::new(store.clone())
            .get_cart(cart_id)
            .await
            .unwrap()
            .unwrap();
        assert!(cart.is_empty());

        let types: Vec<String> = store
            .outbox_entries()
            .await
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(&types[types.len() - 2..], ["OrderPlaced", "CartCleared"]);

        assert_eq!(service.orders_for_user(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn anonymous_cart_cannot_check_out() {
        let store = InMemoryStore::new();
        let cart_id = filled_cart(&store, None).await;
        let service = OrderService::new(store.clone());

        let err = service
            .place_order(PlaceOrder::from_cart(cart_id))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let cart = CartService::new(store).get_cart(cart_id).await.unwrap().unwrap();
        assert!(!cart.is_empty());
    }

    #[tokio::test]
    async fn empty_cart_is_rejected() {
        let store = InMemoryStore::new();
        let carts = CartService::new(store.clone());
        let cart_id = carts
            .create_cart(CreateCart::for_user(UserId::new()))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();

        let err = OrderService::new(store)
            .place_order(PlaceOrder::from_cart(cart_id))
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn ship_requires_payment() {
        let store = InMemoryStore::new();
        let cart_id = filled_cart(&store, Some(UserId::new())).await;
        let service = OrderService::new(store);
        let order_id = service
            .place_order(PlaceOrder::from_cart(cart_id))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();

        let err = service
            .ship(ShipOrder::new(order_id, None))
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let cancelled = service
            .cancel(CancelOrder::new(order_id, "duplicate"))
            .await
            .unwrap();
        assert_eq!(cancelled.aggregate.status(), OrderStatus::Cancelled);
    }
}
