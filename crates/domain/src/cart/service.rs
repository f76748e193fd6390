//! Cart service providing a simplified API for cart operations.

use common::{AggregateId, UserId};
use store::{RecordQuery, Store};

use crate::aggregate::Aggregate;
use crate::command::{CommandHandler, CommandResult};
use crate::error::DomainError;

use super::{AddCartItem, AssignCart, Cart, CreateCart, RemoveCartItem, UpdateCartItemQuantity};

/// Service for managing shopping carts.
pub struct CartService<S: Store> {
    handler: CommandHandler<S, Cart>,
}

impl<S: Store> CartService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store),
        }
    }

    pub fn handler(&self) -> &CommandHandler<S, Cart> {
        &self.handler
    }

    #[tracing::instrument(skip(self))]
    pub async fn create_cart(&self, cmd: CreateCart) -> Result<CommandResult<Cart>, DomainError> {
        let CreateCart { cart_id, user_id } = cmd;
        self.handler
            .execute(cart_id, |cart| cart.create(cart_id, user_id))
            .await
    }

    /// Adds a line, merging into an existing line for the same product and
    /// variant.
    #[tracing::instrument(skip(self), fields(cart_id = %cmd.cart_id, product_id = %cmd.item.product_id))]
    pub async fn add_item(&self, cmd: AddCartItem) -> Result<CommandResult<Cart>, DomainError> {
        let cart = self.handler.load_required(cmd.cart_id).await?;
        self.handler
            .execute_on(cart, |cart| cart.add_item(cmd.item))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        cmd: UpdateCartItemQuantity,
    ) -> Result<CommandResult<Cart>, DomainError> {
        let cart = self.handler.load_required(cmd.cart_id).await?;
        self.handler
            .execute_on(cart, |cart| {
                cart.update_quantity(cmd.product_id, cmd.variant_id, cmd.quantity)
            })
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, cmd: RemoveCartItem) -> Result<CommandResult<Cart>, DomainError> {
        let cart = self.handler.load_required(cmd.cart_id).await?;
        self.handler
            .execute_on(cart, |cart| cart.remove_item(cmd.product_id, cmd.variant_id))
            .await
    }

    /// Hands an anonymous cart to a signed-in user.
    #[tracing::instrument(skip(self))]
    pub async fn assign_user(&self, cmd: AssignCart) -> Result<CommandResult<Cart>, DomainError> {
        let cart = self.handler.load_required(cmd.cart_id).await?;
        self.handler
            .execute_on(cart, |cart| cart.assign_user(cmd.user_id))
            .await
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, cart_id: AggregateId) -> Result<CommandResult<Cart>, DomainError> {
        let cart = self.handler.load_required(cart_id).await?;
        self.handler.execute_on(cart, |cart| cart.clear()).await
    }

    pub async fn get_cart(&self, cart_id: AggregateId) -> Result<Option<Cart>, DomainError> {
        self.handler.load_existing(cart_id).await
    }

    /// Carts owned by a user, least recently updated first.
    pub async fn carts_for_user(&self, user_id: UserId) -> Result<Vec<Cart>, DomainError> {
        let query = RecordQuery::for_type(Cart::aggregate_type())
            .field_eq("user_id", serde_json::to_value(user_id)?)
            .order_by("updated_at");

        self.handler
            .store()
            .query(query)
            .await?
            .into_iter()
            .map(|record| Cart::from_record(record).map_err(DomainError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::{Currency, Money};
    use crate::cart::NewCartItem;
    use common::ProductId;
    use store::InMemoryStore;

    fn item(product_id: ProductId, quantity: u32) -> NewCartItem {
        NewCartItem {
            product_id,
            variant_id: None,
            product_name: "Mug".to_string(),
            sku: "MUG-1".to_string(),
            slug: "mug".to_string(),
            variant_name: None,
            unit_price: Money::new(899, Currency::Usd).unwrap(),
            quantity,
        }
    }

    #[tokio::test]
    async fn add_to_missing_cart_is_not_found() {
        let service = CartService::new(InMemoryStore::new());
        let err = service
            .add_item(AddCartItem::new(AggregateId::new(), item(ProductId::new(), 1)))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn cart_lifecycle() {
        let store = InMemoryStore::new();
        let service = CartService::new(store.clone());
        let cart_id = service
            .create_cart(CreateCart::anonymous())
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();

        let product = ProductId::new();
        service
            .add_item(AddCartItem::new(cart_id, item(product, 1)))
            .await
            .unwrap();
        let result = service
            .add_item(AddCartItem::new(cart_id, item(product, 2)))
            .await
            .unwrap();
        assert_eq!(result.aggregate.items().len(), 1);
        assert_eq!(result.aggregate.total_quantity(), 3);

        let owner = UserId::new();
        service
            .assign_user(AssignCart::new(cart_id, owner))
            .await
            .unwrap();
        let carts = service.carts_for_user(owner).await.unwrap();
        assert_eq!(carts.len(), 1);
        assert_eq!(carts[0].id(), Some(cart_id));

        let result = service.clear(cart_id).await.unwrap();
        assert!(result.aggregate.is_empty());
        assert_eq!(result.new_version.as_i64(), 5);
        assert_eq!(store.outbox_entries().await.len(), 5);
    }

    #[tokio::test]
    async fn foreign_cart_cannot_be_taken_over() {
        let service = CartService::new(InMemoryStore::new());
        let cart_id = service
            .create_cart(CreateCart::for_user(UserId::new()))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();

        let err = service
            .assign_user(AssignCart::new(cart_id, UserId::new()))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }
}
