//! Category service: the write and read API for the category hierarchy.

use common::AggregateId;
use store::Store;

use crate::aggregate::Aggregate;
use crate::command::{CommandHandler, CommandResult};
use crate::error::{ConflictKind, DomainError};
use crate::unit_of_work::UnitOfWork;

use super::aggregate::validate_name;
use super::hierarchy::{self, CheckedParent, ensure_acyclic};
use super::{
    CATEGORY_SLUG_SCOPE, Category, CategoryEvent, CategoryReader, ChangeParent, ChangeStatus,
    CreateCategory, RenameCategory, StoreCategoryReader, UpdateDetails, UpdateSlug,
    validate_slug,
};

/// Attempts at creating a category whose parent keeps changing underneath.
const CREATE_ATTEMPTS: usize = 3;

/// Service for managing categories.
///
/// Placement changes (reparenting, slug changes) rewrite the level and path of
/// every descendant in the same unit of work as the change itself, raising one
/// `CategoryPathChanged` per rewritten descendant.
pub struct CategoryService<S: Store> {
    handler: CommandHandler<S, Category>,
    reader: StoreCategoryReader<S>,
}

impl<S: Store + Clone> CategoryService<S> {
    pub fn new(store: S) -> Self {
        Self {
            handler: CommandHandler::new(store.clone()),
            reader: StoreCategoryReader::new(store),
        }
    }

    pub fn reader(&self) -> &StoreCategoryReader<S> {
        &self.reader
    }

    /// Creates a category as a root or under an existing parent.
    ///
    /// The parent's version is advanced in the same commit, so a concurrent
    /// move of the parent and the creation cannot both succeed. If the parent
    /// changes first, the creation is retried against its new placement.
    #[tracing::instrument(skip(self), fields(category_id = %cmd.category_id, slug = %cmd.slug))]
    pub async fn create_category(
        &self,
        cmd: CreateCategory,
    ) -> Result<CommandResult<Category>, DomainError> {
        let mut attempt = 1;
        let result = loop {
            match self.try_create(&cmd).await {
                Err(DomainError::Conflict(ConflictKind::Concurrency { aggregate_id, .. }))
                    if Some(aggregate_id) == cmd.parent_id && attempt < CREATE_ATTEMPTS =>
                {
                    tracing::debug!(
                        attempt,
                        %aggregate_id,
                        "parent changed during create, retrying"
                    );
                    attempt += 1;
                }
                other => break other,
            }
        };
        tracked("create", result)
    }

    /// Moves a category under a new parent, or to the root.
    ///
    /// Rejects self-parenting and moves under a descendant with a
    /// circular-reference conflict; the category is left unchanged.
    #[tracing::instrument(skip(self), fields(category_id = %cmd.category_id))]
    pub async fn change_parent(
        &self,
        cmd: ChangeParent,
    ) -> Result<CommandResult<Category>, DomainError> {
        tracked("change_parent", self.try_change_parent(cmd).await)
    }

    /// Changes a category's slug, rewriting its own path and its subtree.
    #[tracing::instrument(skip(self), fields(category_id = %cmd.category_id, slug = %cmd.slug))]
    pub async fn update_slug(
        &self,
        cmd: UpdateSlug,
    ) -> Result<CommandResult<Category>, DomainError> {
        tracked("update_slug", self.try_update_slug(cmd).await)
    }

    /// Activates or deactivates a category. Children keep their own status.
    #[tracing::instrument(skip(self), fields(category_id = %cmd.category_id))]
    pub async fn change_status(
        &self,
        cmd: ChangeStatus,
    ) -> Result<CommandResult<Category>, DomainError> {
        let result = match self.handler.load_required(cmd.category_id).await {
            Ok(category) => {
                self.handler
                    .execute_on(category, |c| c.change_status(cmd.is_active))
                    .await
            }
            Err(e) => Err(e),
        };
        tracked("change_status", result)
    }

    #[tracing::instrument(skip(self), fields(category_id = %cmd.category_id))]
    pub async fn rename(
        &self,
        cmd: RenameCategory,
    ) -> Result<CommandResult<Category>, DomainError> {
        let result = match self.handler.load_required(cmd.category_id).await {
            Ok(category) => {
                self.handler
                    .execute_on(category, |c| c.rename(&cmd.name))
                    .await
            }
            Err(e) => Err(e),
        };
        tracked("rename", result)
    }

    #[tracing::instrument(skip(self), fields(category_id = %cmd.category_id))]
    pub async fn update_details(
        &self,
        cmd: UpdateDetails,
    ) -> Result<CommandResult<Category>, DomainError> {
        let UpdateDetails {
            category_id,
            name,
            description,
        } = cmd;
        let result = match self.handler.load_required(category_id).await {
            Ok(category) => {
                self.handler
                    .execute_on(category, |c| c.update_details(&name, description))
                    .await
            }
            Err(e) => Err(e),
        };
        tracked("update_details", result)
    }

    /// Loads a category by ID.
    ///
    /// Returns None if the category doesn't exist.
    #[tracing::instrument(skip(self))]
    pub async fn get_category(&self, id: AggregateId) -> Result<Option<Category>, DomainError> {
        self.reader.get(id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_by_slug(&self, slug: &str) -> Result<Option<Category>, DomainError> {
        self.reader.get_by_slug(slug).await
    }

    /// Direct children of a category, or the roots when `parent_id` is None.
    #[tracing::instrument(skip(self))]
    pub async fn children(
        &self,
        parent_id: Option<AggregateId>,
    ) -> Result<Vec<Category>, DomainError> {
        if let Some(parent_id) = parent_id
            && self.reader.get(parent_id).await?.is_none()
        {
            return Err(DomainError::not_found("Category", parent_id));
        }
        self.reader.children_of(parent_id).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn descendants(&self, id: AggregateId) -> Result<Vec<Category>, DomainError> {
        self.reader.descendants_of(id).await
    }

    async fn try_create(
        &self,
        cmd: &CreateCategory,
    ) -> Result<CommandResult<Category>, DomainError> {
        validate_name(&cmd.name)?;
        validate_slug(&cmd.slug)?;

        let parent = match cmd.parent_id {
            Some(parent_id) => Some(
                self.reader
                    .get(parent_id)
                    .await?
                    .ok_or_else(|| DomainError::not_found("Category", parent_id))?,
            ),
            None => None,
        };
        self.ensure_slug_free(&cmd.slug, cmd.category_id).await?;

        let mut category = self.handler.load(cmd.category_id).await?;
        let events = category.create(
            cmd.category_id,
            &cmd.name,
            &cmd.slug,
            cmd.description.clone(),
            parent.as_ref(),
        )?;

        let mut uow = UnitOfWork::new(self.handler.store());
        if let Some(ref parent) = parent {
            uow.touch(parent);
        }
        uow.stage(&mut category, events.clone())?;
        uow.claim_key(CATEGORY_SLUG_SCOPE, &cmd.slug, cmd.category_id);
        uow.save_changes().await?;

        tracing::info!(path = %category.path(), level = category.level(), "category created");
        Ok(CommandResult {
            new_version: category.version(),
            aggregate: category,
            events,
        })
    }

    async fn try_change_parent(
        &self,
        cmd: ChangeParent,
    ) -> Result<CommandResult<Category>, DomainError> {
        if cmd.new_parent_id == Some(cmd.category_id) {
            return Err(DomainError::Conflict(ConflictKind::CircularReference {
                category_id: cmd.category_id,
                parent_id: cmd.category_id,
            }));
        }

        let category = self.handler.load_required(cmd.category_id).await?;
        let checked = match cmd.new_parent_id {
            Some(parent_id) => Some(ensure_acyclic(&self.reader, cmd.category_id, parent_id).await?),
            None => None,
        };

        let events = category.change_parent(checked.as_ref().map(|c| &c.parent))?;
        let lineage = checked.map(CheckedParent::into_lineage).unwrap_or_default();
        self.commit_placement_change(category, events, None, &lineage)
            .await
    }

    async fn try_update_slug(
        &self,
        cmd: UpdateSlug,
    ) -> Result<CommandResult<Category>, DomainError> {
        validate_slug(&cmd.slug)?;
        let category = self.handler.load_required(cmd.category_id).await?;
        if category.slug() == cmd.slug {
            return Ok(unchanged(category));
        }
        self.ensure_slug_free(&cmd.slug, cmd.category_id).await?;

        let parent = self.parent_of(&category).await?;
        let old_slug = category.slug().to_string();
        let events = category.update_slug(&cmd.slug, parent.as_ref())?;
        let lineage: Vec<_> = parent.into_iter().collect();
        self.commit_placement_change(category, events, Some((old_slug, cmd.slug)), &lineage)
            .await
    }

    async fn ensure_slug_free(&self, slug: &str, owner: AggregateId) -> Result<(), DomainError> {
        match self.reader.get_by_slug(slug).await? {
            Some(existing) if existing.id() != Some(owner) => {
                Err(DomainError::Conflict(ConflictKind::SlugTaken {
                    slug: slug.to_string(),
                }))
            }
            _ => Ok(()),
        }
    }

    async fn parent_of(&self, category: &Category) -> Result<Option<Category>, DomainError> {
        let Some(parent_id) = category.parent_id() else {
            return Ok(None);
        };
        match self.reader.get(parent_id).await? {
            Some(parent) => Ok(Some(parent)),
            None => Err(DomainError::Conflict(ConflictKind::CorruptHierarchy {
                category_id: category.id().unwrap_or(parent_id),
            })),
        }
    }

    /// Commits a change to a category's placement together with the rewrite
    /// of its subtree and, for slug changes, the slug key swap.
    ///
    /// The placement was computed from `lineage`; the commit fails with a
    /// concurrency conflict if any of those categories changed meanwhile.
    async fn commit_placement_change(
        &self,
        mut category: Category,
        events: Vec<CategoryEvent>,
        slug_change: Option<(String, String)>,
        lineage: &[Category],
    ) -> Result<CommandResult<Category>, DomainError> {
        if events.is_empty() {
            return Ok(unchanged(category));
        }
        let category_id = category
            .id()
            .ok_or_else(|| DomainError::invalid_state("Category", "not created"))?;
        let descendants = hierarchy::collect_subtree(&self.reader, category_id).await?;

        let mut uow = UnitOfWork::new(self.handler.store());
        for ancestor in lineage {
            uow.depend_on(ancestor);
        }
        uow.stage(&mut category, events.clone())?;
        if let Some((old_slug, new_slug)) = slug_change {
            uow.release_key(CATEGORY_SLUG_SCOPE, &old_slug, category_id);
            uow.claim_key(CATEGORY_SLUG_SCOPE, &new_slug, category_id);
        }
        let rewritten = hierarchy::stage_subtree(&mut uow, &category, descendants)?;
        uow.save_changes().await?;

        tracing::info!(
            path = %category.path(),
            level = category.level(),
            descendants = rewritten,
            "category placement changed"
        );
        Ok(CommandResult {
            new_version: category.version(),
            aggregate: category,
            events,
        })
    }
}

fn unchanged(category: Category) -> CommandResult<Category> {
    CommandResult {
        new_version: category.version(),
        aggregate: category,
        events: vec![],
    }
}

/// Counts a command outcome and passes the result through.
fn tracked<T>(command: &'static str, result: Result<T, DomainError>) -> Result<T, DomainError> {
    let outcome = match &result {
        Ok(_) => "ok",
        Err(DomainError::Validation(_)) => "invalid",
        Err(DomainError::NotFound { .. }) => "not_found",
        Err(DomainError::Conflict(_)) => "conflict",
        Err(_) => "error",
    };
    metrics::counter!("category_commands_total", "command" => command, "outcome" => outcome)
        .increment(1);
    if let Err(ref e) = result {
        tracing::debug!(command, error = %e, "category command rejected");
    }
    result
}
