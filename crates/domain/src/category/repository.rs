//! Read access to categories.

use async_trait::async_trait;
use common::AggregateId;
use store::{RecordQuery, Store};

use crate::aggregate::Aggregate;
use crate::error::DomainError;

use super::{CATEGORY_SLUG_SCOPE, Category};

/// Read-only queries over categories. Implementations never mutate.
#[async_trait]
pub trait CategoryReader: Send + Sync {
    async fn get(&self, id: AggregateId) -> Result<Option<Category>, DomainError>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>, DomainError>;

    /// Direct children of `parent_id`, or the roots when None. Ordered by slug.
    async fn children_of(
        &self,
        parent_id: Option<AggregateId>,
    ) -> Result<Vec<Category>, DomainError>;

    /// Every category below `id`, ordered by path.
    async fn descendants_of(&self, id: AggregateId) -> Result<Vec<Category>, DomainError>;

    /// Every category, ordered by path.
    async fn all(&self) -> Result<Vec<Category>, DomainError>;
}

/// [`CategoryReader`] over any [`Store`].
#[derive(Debug, Clone)]
pub struct StoreCategoryReader<S> {
    store: S,
}

impl<S: Store> StoreCategoryReader<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    async fn find(&self, query: RecordQuery) -> Result<Vec<Category>, DomainError> {
        self.store
            .query(query)
            .await?
            .into_iter()
            .map(|record| Category::from_record(record).map_err(DomainError::from))
            .collect()
    }

    fn categories() -> RecordQuery {
        RecordQuery::for_type(Category::aggregate_type())
    }
}

#[async_trait]
impl<S: Store> CategoryReader for StoreCategoryReader<S> {
    async fn get(&self, id: AggregateId) -> Result<Option<Category>, DomainError> {
        match self.store.load(id).await? {
            Some(record) if record.aggregate_type == Category::aggregate_type() => {
                Ok(Some(Category::from_record(record)?))
            }
            _ => Ok(None),
        }
    }

    /// Resolves the slug through its unique key, which is claimed in the same
    /// commit as the category write.
    async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>, DomainError> {
        match self.store.unique_key_owner(CATEGORY_SLUG_SCOPE, slug).await? {
            Some(owner) => self.get(owner).await,
            None => Ok(None),
        }
    }

    async fn children_of(
        &self,
        parent_id: Option<AggregateId>,
    ) -> Result<Vec<Category>, DomainError> {
        let parent = serde_json::to_value(parent_id)?;
        self.find(Self::categories().field_eq("parent_id", parent).order_by("slug"))
            .await
    }

    /// Uses the materialized path, so the result is only as good as the
    /// stored paths. Writers keep them in step with parent links.
    async fn descendants_of(&self, id: AggregateId) -> Result<Vec<Category>, DomainError> {
        let Some(category) = self.get(id).await? else {
            return Err(DomainError::not_found("Category", id));
        };
        self.find(
            Self::categories()
                .field_starts_with("path", format!("{}/", category.path()))
                .order_by("path"),
        )
        .await
    }

    async fn all(&self) -> Result<Vec<Category>, DomainError> {
        self.find(Self::categories().order_by("path")).await
    }
}
