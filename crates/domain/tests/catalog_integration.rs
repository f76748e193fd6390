//! Integration tests for the domain layer.
//!
//! These tests drive the services against the in-memory store and check the
//! hierarchy rules, optimistic concurrency, outbox contents and the
//! cart/order/payment flow end to end.

use common::{AggregateId, ProductId, UserId};
use domain::category::{ChangeParent, ChangeStatus, CreateCategory, UpdateSlug};
use domain::cart::{AddCartItem, AssignCart, CreateCart, UpdateCartItemQuantity};
use domain::order::{CancelOrder, PlaceOrder, ShipOrder};
use domain::payment::CreatePayment;
use domain::{
    Aggregate, CartService, Category, CategoryService, CommandHandler, ConflictKind, Currency,
    Discount, DomainError, HierarchyReconciler, Money, NewCartItem, OrderService, OrderStatus,
    PaymentService, PaymentStatus, UnitOfWork,
};
use store::{InMemoryStore, Store, StoreExt};

fn category_service(store: &InMemoryStore) -> CategoryService<InMemoryStore> {
    CategoryService::new(store.clone())
}

async fn create(
    service: &CategoryService<InMemoryStore>,
    name: &str,
    slug: &str,
    parent: Option<AggregateId>,
) -> Category {
    let mut cmd = CreateCategory::new(name, slug);
    if let Some(parent_id) = parent {
        cmd = cmd.with_parent(parent_id);
    }
    service.create_category(cmd).await.unwrap().aggregate
}

async fn reload(service: &CategoryService<InMemoryStore>, category: &Category) -> Category {
    service
        .get_category(category.id().unwrap())
        .await
        .unwrap()
        .unwrap()
}

mod hierarchy {
    use super::*;

    #[tokio::test]
    async fn electronics_and_phones() {
        let store = InMemoryStore::new();
        let service = category_service(&store);

        let electronics = create(&service, "Electronics", "electronics", None).await;
        assert_eq!(electronics.level(), 0);
        assert_eq!(electronics.path(), "/electronics");

        let phones = create(&service, "Phones", "phones", electronics.id()).await;
        assert_eq!(phones.level(), 1);
        assert_eq!(phones.path(), "/electronics/phones");
        assert_eq!(phones.parent_id(), electronics.id());

        let children = service.children(electronics.id()).await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(children[0].slug(), "phones");

        let by_slug = service.get_by_slug("phones").await.unwrap().unwrap();
        assert_eq!(by_slug.id(), phones.id());
    }

    #[tokio::test]
    async fn cycle_is_rejected_and_leaves_category_unchanged() {
        let store = InMemoryStore::new();
        let service = category_service(&store);
        let a = create(&service, "A", "a", None).await;
        let b = create(&service, "B", "b", a.id()).await;
        let a = reload(&service, &a).await;
        let entries_before = store.outbox_entries().await.len();

        let err = service
            .change_parent(ChangeParent::new(a.id().unwrap(), b.id()))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Conflict(ConflictKind::CircularReference { .. })
        ));

        let a_after = reload(&service, &a).await;
        assert_eq!(a_after.parent_id(), None);
        assert_eq!(a_after.path(), "/a");
        assert_eq!(a_after.version(), a.version());
        assert_eq!(store.outbox_entries().await.len(), entries_before);
    }

    #[tokio::test]
    async fn self_parenting_is_rejected() {
        let store = InMemoryStore::new();
        let service = category_service(&store);
        let a = create(&service, "A", "a", None).await;

        let err = service
            .change_parent(ChangeParent::new(a.id().unwrap(), a.id()))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn reparent_rewrites_descendants() {
        let store = InMemoryStore::new();
        let service = category_service(&store);
        let home = create(&service, "Home", "home", None).await;
        let electronics = create(&service, "Electronics", "electronics", None).await;
        let phones = create(&service, "Phones", "phones", electronics.id()).await;
        let android = create(&service, "Android", "android", phones.id()).await;

        service
            .change_parent(ChangeParent::new(electronics.id().unwrap(), home.id()))
            .await
            .unwrap();

        let phones = reload(&service, &phones).await;
        let android = reload(&service, &android).await;
        assert_eq!((phones.level(), phones.path()), (2, "/home/electronics/phones"));
        assert_eq!(
            (android.level(), android.path()),
            (3, "/home/electronics/phones/android")
        );

        let types: Vec<String> = store
            .outbox_entries()
            .await
            .into_iter()
            .map(|e| e.event_type)
            .collect();
        assert_eq!(
            &types[types.len() - 3..],
            ["CategoryMoved", "CategoryPathChanged", "CategoryPathChanged"]
        );

        let moved_back = service
            .change_parent(ChangeParent::to_root(electronics.id().unwrap()))
            .await
            .unwrap()
            .aggregate;
        assert_eq!((moved_back.level(), moved_back.path()), (0, "/electronics"));
        let android = reload(&service, &android).await;
        assert_eq!(android.path(), "/electronics/phones/android");
    }

    #[tokio::test]
    async fn slug_change_rewrites_subtree_and_frees_old_slug() {
        let store = InMemoryStore::new();
        let service = category_service(&store);
        let tech = create(&service, "Tech", "tech", None).await;
        let phones = create(&service, "Phones", "phones", tech.id()).await;

        service
            .update_slug(UpdateSlug::new(tech.id().unwrap(), "technology"))
            .await
            .unwrap();

        assert_eq!(reload(&service, &phones).await.path(), "/technology/phones");
        assert!(service.get_by_slug("tech").await.unwrap().is_none());

        // The released slug can be used again.
        create(&service, "Tech Deals", "tech", None).await;
        let err = service
            .create_category(CreateCategory::new("Dup", "technology"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DomainError::Conflict(ConflictKind::SlugTaken { .. })
        ));
    }

    #[tokio::test]
    async fn deactivation_does_not_cascade() {
        let store = InMemoryStore::new();
        let service = category_service(&store);
        let parent = create(&service, "Parent", "parent", None).await;
        let child = create(&service, "Child", "child", parent.id()).await;

        service
            .change_status(ChangeStatus::new(parent.id().unwrap(), false))
            .await
            .unwrap();

        assert!(!reload(&service, &parent).await.is_active());
        assert!(reload(&service, &child).await.is_active());
    }

    #[tokio::test]
    async fn change_status_is_idempotent() {
        let store = InMemoryStore::new();
        let service = category_service(&store);
        let category = create(&service, "Shoes", "shoes", None).await;
        let id = category.id().unwrap();

        let first = service
            .change_status(ChangeStatus::new(id, false))
            .await
            .unwrap();
        let entries = store.outbox_entries().await.len();
        let second = service
            .change_status(ChangeStatus::new(id, false))
            .await
            .unwrap();

        assert!(second.events.is_empty());
        assert_eq!(second.new_version, first.new_version);
        assert_eq!(store.outbox_entries().await.len(), entries);
    }

    #[tokio::test]
    async fn reconciler_repairs_drift() {
        let store = InMemoryStore::new();
        let service = category_service(&store);
        let a = create(&service, "A", "a", None).await;
        let b = create(&service, "B", "b", a.id()).await;

        // Rewrite `b` as if an older writer left a stale level/path behind.
        let record = store.load(b.id().unwrap()).await.unwrap().unwrap();
        let mut state = record.state.clone();
        state["level"] = serde_json::json!(7);
        state["path"] = serde_json::json!("/stale/b");
        store
            .commit_write(
                store::AggregateWrite {
                    record: store::AggregateRecord::new(
                        record.aggregate_id,
                        "Category",
                        record.version.next(),
                        state,
                    ),
                    expected_version: record.version,
                },
                vec![],
            )
            .await
            .unwrap();

        let report = HierarchyReconciler::new(store.clone())
            .reconcile()
            .await
            .unwrap();
        assert_eq!(report.repaired, 1);

        let b = reload(&service, &b).await;
        assert_eq!((b.level(), b.path()), (1, "/a/b"));
    }
}

mod concurrency {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use store::{
        AggregateRecord, ChangeSet, EntryId, OutboxEntry, OutboxStats, OutboxStatus, RecordQuery,
        RecordStream,
    };
    use tokio::sync::Barrier;

    /// Holds the first two commits until both have arrived, so two commands
    /// finish their reads before either one writes. Later commits pass
    /// straight through.
    #[derive(Clone)]
    struct GatedStore {
        inner: InMemoryStore,
        gate: Arc<Barrier>,
        held: Arc<AtomicUsize>,
    }

    impl GatedStore {
        fn new(inner: InMemoryStore) -> Self {
            Self {
                inner,
                gate: Arc::new(Barrier::new(2)),
                held: Arc::new(AtomicUsize::new(2)),
            }
        }
    }

    #[async_trait]
    impl Store for GatedStore {
        async fn commit(&self, changes: ChangeSet) -> store::Result<()> {
            let hold = self
                .held
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if hold {
                self.gate.wait().await;
            }
            self.inner.commit(changes).await
        }

        async fn load(&self, aggregate_id: AggregateId) -> store::Result<Option<AggregateRecord>> {
            self.inner.load(aggregate_id).await
        }

        async fn query(&self, query: RecordQuery) -> store::Result<Vec<AggregateRecord>> {
            self.inner.query(query).await
        }

        async fn stream_records(&self, aggregate_type: &str) -> store::Result<RecordStream> {
            self.inner.stream_records(aggregate_type).await
        }

        async fn unique_key_owner(
            &self,
            scope: &str,
            value: &str,
        ) -> store::Result<Option<AggregateId>> {
            self.inner.unique_key_owner(scope, value).await
        }

        async fn claim_pending(
            &self,
            limit: usize,
            visibility_timeout: Duration,
        ) -> store::Result<Vec<OutboxEntry>> {
            self.inner.claim_pending(limit, visibility_timeout).await
        }

        async fn mark_dispatched(&self, id: EntryId) -> store::Result<()> {
            self.inner.mark_dispatched(id).await
        }

        async fn record_failure(
            &self,
            id: EntryId,
            error: &str,
            retry_at: DateTime<Utc>,
            max_attempts: u32,
        ) -> store::Result<OutboxStatus> {
            self.inner
                .record_failure(id, error, retry_at, max_attempts)
                .await
        }

        async fn release(&self, id: EntryId) -> store::Result<()> {
            self.inner.release(id).await
        }

        async fn outbox_entry(&self, id: EntryId) -> store::Result<Option<OutboxEntry>> {
            self.inner.outbox_entry(id).await
        }

        async fn failed_entries(&self, limit: usize) -> store::Result<Vec<OutboxEntry>> {
            self.inner.failed_entries(limit).await
        }

        async fn retry_failed(&self, id: EntryId) -> store::Result<bool> {
            self.inner.retry_failed(id).await
        }

        async fn outbox_stats(&self) -> store::Result<OutboxStats> {
            self.inner.outbox_stats().await
        }
    }

    fn is_concurrency_conflict(err: &DomainError) -> bool {
        matches!(err, DomainError::Conflict(ConflictKind::Concurrency { .. }))
    }

    #[tokio::test]
    async fn crossing_moves_cannot_form_a_cycle() {
        let store = InMemoryStore::new();
        let plain = category_service(&store);
        let a = create(&plain, "A", "a", None).await;
        let b = create(&plain, "B", "b", None).await;
        let (a_id, b_id) = (a.id().unwrap(), b.id().unwrap());

        let gated = CategoryService::new(GatedStore::new(store.clone()));
        let (a_under_b, b_under_a) = tokio::join!(
            gated.change_parent(ChangeParent::new(a_id, Some(b_id))),
            gated.change_parent(ChangeParent::new(b_id, Some(a_id))),
        );

        match (&a_under_b, &b_under_a) {
            (Ok(_), Err(err)) | (Err(err), Ok(_)) => assert!(is_concurrency_conflict(err)),
            _ => panic!("expected exactly one of the two moves to win"),
        }

        let a = reload(&plain, &a).await;
        let b = reload(&plain, &b).await;
        if a_under_b.is_ok() {
            assert_eq!((a.parent_id(), a.path()), (Some(b_id), "/b/a"));
            assert_eq!((b.parent_id(), b.path()), (None, "/b"));
        } else {
            assert_eq!((b.parent_id(), b.path()), (Some(a_id), "/a/b"));
            assert_eq!((a.parent_id(), a.path()), (None, "/a"));
        }
    }

    #[tokio::test]
    async fn child_created_during_a_parent_move_follows_the_parent() {
        let store = InMemoryStore::new();
        let plain = category_service(&store);
        let shop = create(&plain, "Shop", "shop", None).await;
        let toys = create(&plain, "Toys", "toys", None).await;
        let (shop_id, toys_id) = (shop.id().unwrap(), toys.id().unwrap());

        let gated = CategoryService::new(GatedStore::new(store.clone()));
        let (moved, created) = tokio::join!(
            gated.change_parent(ChangeParent::new(toys_id, Some(shop_id))),
            gated.create_category(CreateCategory::new("Lego", "lego").with_parent(toys_id)),
        );

        // The creation retries past a parent that moved first; a move that
        // loses to the creation is rejected.
        let lego = created.expect("creation under a moving parent").aggregate;
        if let Err(ref err) = moved {
            assert!(is_concurrency_conflict(err));
        }

        let toys = reload(&plain, &toys).await;
        let lego = reload(&plain, &lego).await;
        assert_eq!(lego.path(), format!("{}/lego", toys.path()));
        assert_eq!(lego.level(), toys.level() + 1);
        let expected_toys_path = if moved.is_ok() { "/shop/toys" } else { "/toys" };
        assert_eq!(toys.path(), expected_toys_path);
    }

    #[tokio::test]
    async fn concurrent_siblings_are_both_created() {
        let store = InMemoryStore::new();
        let plain = category_service(&store);
        let toys = create(&plain, "Toys", "toys", None).await;
        let toys_id = toys.id().unwrap();

        let gated = CategoryService::new(GatedStore::new(store.clone()));
        let (lego, dolls) = tokio::join!(
            gated.create_category(CreateCategory::new("Lego", "lego").with_parent(toys_id)),
            gated.create_category(CreateCategory::new("Dolls", "dolls").with_parent(toys_id)),
        );

        assert_eq!(lego.unwrap().aggregate.path(), "/toys/lego");
        assert_eq!(dolls.unwrap().aggregate.path(), "/toys/dolls");
        assert_eq!(plain.children(Some(toys_id)).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn concurrent_updates_have_exactly_one_winner() {
        let store = InMemoryStore::new();
        let service = category_service(&store);
        let category = create(&service, "Toys", "toys", None).await;
        let id = category.id().unwrap();

        let handler: CommandHandler<InMemoryStore, Category> = CommandHandler::new(store.clone());
        let mut first = handler.load_required(id).await.unwrap();
        let mut second = handler.load_required(id).await.unwrap();

        let mut uow = UnitOfWork::new(&store);
        let events = first.change_status(false).unwrap();
        uow.stage(&mut first, events).unwrap();
        uow.save_changes().await.unwrap();

        let mut uow = UnitOfWork::new(&store);
        let events = second.rename("Games").unwrap();
        uow.stage(&mut second, events).unwrap();
        let err = uow.save_changes().await.unwrap_err();

        assert!(matches!(
            err,
            DomainError::Conflict(ConflictKind::Concurrency { .. })
        ));
        let stored = reload(&service, &category).await;
        assert!(!stored.is_active());
        assert_eq!(stored.name(), "Toys");
    }

    #[tokio::test]
    async fn loser_leaves_no_outbox_entries() {
        let store = InMemoryStore::new();
        let service = category_service(&store);
        let category = create(&service, "Books", "books", None).await;
        let id = category.id().unwrap();

        let handler: CommandHandler<InMemoryStore, Category> = CommandHandler::new(store.clone());
        let mut stale = handler.load_required(id).await.unwrap();
        service
            .change_status(ChangeStatus::new(id, false))
            .await
            .unwrap();
        let entries = store.outbox_entries().await.len();

        let mut uow = UnitOfWork::new(&store);
        let events = stale.rename("Novels").unwrap();
        uow.stage(&mut stale, events).unwrap();
        assert!(uow.save_changes().await.is_err());
        assert_eq!(store.outbox_entries().await.len(), entries);
    }
}

mod outbox {
    use super::*;

    #[tokio::test]
    async fn entries_are_committed_with_the_aggregate() {
        let store = InMemoryStore::new();
        let service = category_service(&store);
        let category = create(&service, "Garden", "garden", None).await;

        let entries = store.outbox_entries().await;
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert_eq!(entry.aggregate_id, category.id().unwrap());
        assert_eq!(entry.aggregate_type, "Category");
        assert_eq!(entry.event_type, "CategoryCreated");
        assert_eq!(entry.payload["type"], "CategoryCreated");
        assert_eq!(entry.payload["data"]["slug"], "garden");
        assert_eq!(entry.metadata["aggregate_version"], serde_json::json!(1));

        let stats = store.outbox_stats().await.unwrap();
        assert_eq!(stats.pending, 1);
    }
}

mod checkout {
    use super::*;

    fn shirt(product_id: ProductId, quantity: u32) -> NewCartItem {
        NewCartItem {
            product_id,
            variant_id: None,
            product_name: "Shirt".to_string(),
            sku: "SH-1".to_string(),
            slug: "shirt".to_string(),
            variant_name: None,
            unit_price: Money::new(2000, Currency::Usd).unwrap(),
            quantity,
        }
    }

    #[tokio::test]
    async fn cart_to_paid_order() {
        let store = InMemoryStore::new();
        let carts = CartService::new(store.clone());
        let orders = OrderService::new(store.clone());
        let payments = PaymentService::new(store.clone());

        let cart_id = carts
            .create_cart(CreateCart::anonymous())
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();
        let product = ProductId::new();
        carts
            .add_item(AddCartItem::new(cart_id, shirt(product, 1)))
            .await
            .unwrap();
        carts
            .add_item(AddCartItem::new(cart_id, shirt(product, 2)))
            .await
            .unwrap();
        carts
            .update_quantity(UpdateCartItemQuantity::new(cart_id, product, None, 4))
            .await
            .unwrap();
        let user = UserId::new();
        carts
            .assign_user(AssignCart::new(cart_id, user))
            .await
            .unwrap();

        let order = orders
            .place_order(
                PlaceOrder::from_cart(cart_id)
                    .with_discount(Discount::fixed(Money::new(1000, Currency::Usd).unwrap())),
            )
            .await
            .unwrap()
            .aggregate;
        assert_eq!(order.items()[0].quantity, 4);
        assert_eq!(order.subtotal(), Some(Money::new(8000, Currency::Usd).unwrap()));
        assert_eq!(order.total(), Some(Money::new(7000, Currency::Usd).unwrap()));
        let order_id = order.id().unwrap();

        let payment_id = payments
            .create_payment(CreatePayment::for_order(order_id))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();
        payments.succeed(payment_id, "txn-1").await.unwrap();

        orders
            .ship(ShipOrder::new(order_id, Some("1Z999".to_string())))
            .await
            .unwrap();
        let delivered = orders.deliver(order_id).await.unwrap().aggregate;
        assert_eq!(delivered.status(), OrderStatus::Delivered);
    }

    #[tokio::test]
    async fn order_items_are_snapshots() {
        let store = InMemoryStore::new();
        let carts = CartService::new(store.clone());
        let user = UserId::new();
        let cart_id = carts
            .create_cart(CreateCart::for_user(user))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();
        let product = ProductId::new();
        carts
            .add_item(AddCartItem::new(cart_id, shirt(product, 1)))
            .await
            .unwrap();

        let orders = OrderService::new(store.clone());
        let order_id = orders
            .place_order(PlaceOrder::from_cart(cart_id))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();

        // The same product re-added later at a new name and price.
        let mut repriced = shirt(product, 1);
        repriced.product_name = "Shirt (new season)".to_string();
        repriced.unit_price = Money::new(2500, Currency::Usd).unwrap();
        carts
            .add_item(AddCartItem::new(cart_id, repriced))
            .await
            .unwrap();

        let order = orders.get_order(order_id).await.unwrap().unwrap();
        assert_eq!(order.items()[0].product_name, "Shirt");
        assert_eq!(
            order.items()[0].unit_price,
            Money::new(2000, Currency::Usd).unwrap()
        );
    }

    #[tokio::test]
    async fn payment_transitions_are_idempotent() {
        let store = InMemoryStore::new();
        let carts = CartService::new(store.clone());
        let cart_id = carts
            .create_cart(CreateCart::for_user(UserId::new()))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();
        carts
            .add_item(AddCartItem::new(cart_id, shirt(ProductId::new(), 1)))
            .await
            .unwrap();
        let order_id = OrderService::new(store.clone())
            .place_order(PlaceOrder::from_cart(cart_id))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();

        let payments = PaymentService::new(store.clone());
        let payment_id = payments
            .create_payment(CreatePayment::for_order(order_id))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();
        payments.fail(payment_id, "insufficient funds").await.unwrap();
        let again = payments.fail(payment_id, "network error").await.unwrap();

        assert!(again.events.is_empty());
        assert_eq!(again.aggregate.status(), PaymentStatus::Failed);
        assert_eq!(again.aggregate.error_message(), Some("insufficient funds"));
        assert!(payments.refund(payment_id).await.is_err());
    }

    #[tokio::test]
    async fn cancelled_order_cannot_be_paid() {
        let store = InMemoryStore::new();
        let carts = CartService::new(store.clone());
        let cart_id = carts
            .create_cart(CreateCart::for_user(UserId::new()))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();
        carts
            .add_item(AddCartItem::new(cart_id, shirt(ProductId::new(), 1)))
            .await
            .unwrap();
        let orders = OrderService::new(store.clone());
        let order_id = orders
            .place_order(PlaceOrder::from_cart(cart_id))
            .await
            .unwrap()
            .aggregate
            .id()
            .unwrap();
        orders
            .cancel(CancelOrder::new(order_id, "customer request"))
            .await
            .unwrap();

        let err = PaymentService::new(store)
            .create_payment(CreatePayment::for_order(order_id))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(
            orders.get_order(order_id).await.unwrap().unwrap().status(),
            OrderStatus::Cancelled
        );
    }
}
