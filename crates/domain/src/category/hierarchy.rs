//! Tree rules for categories: placement, cycle detection and subtree walks.

use std::collections::{HashMap, HashSet, VecDeque};

use common::AggregateId;
use store::Store;

use crate::aggregate::Aggregate;
use crate::error::{ConflictKind, DomainError};
use crate::unit_of_work::UnitOfWork;

use super::{Category, CategoryReader};

/// Upper bound on ancestor hops and subtree depth. A walk that goes further
/// is treated as a corrupt hierarchy.
pub const MAX_HIERARCHY_DEPTH: usize = 64;

/// Materialized position of a category in the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub level: u32,
    pub path: String,
}

impl Placement {
    pub fn root(slug: &str) -> Self {
        Self {
            level: 0,
            path: format!("/{slug}"),
        }
    }

    pub fn under(parent: &Category, slug: &str) -> Self {
        Self {
            level: parent.level() + 1,
            path: format!("{}/{slug}", parent.path()),
        }
    }

    pub fn resolve(parent: Option<&Category>, slug: &str) -> Self {
        match parent {
            Some(parent) => Self::under(parent, slug),
            None => Self::root(slug),
        }
    }
}

/// A proposed parent that passed the cycle check, with the ancestors read on
/// the way up.
///
/// The check only holds while none of these categories moves, so the commit
/// that uses it must depend on all of them.
#[derive(Debug, Clone)]
pub struct CheckedParent {
    pub parent: Category,
    /// Nearest first.
    pub ancestors: Vec<Category>,
}

impl CheckedParent {
    /// The parent followed by its ancestors.
    pub fn into_lineage(self) -> Vec<Category> {
        let mut lineage = Vec::with_capacity(self.ancestors.len() + 1);
        lineage.push(self.parent);
        lineage.extend(self.ancestors);
        lineage
    }
}

/// Rejects placing `category_id` under `new_parent_id` if that would close a
/// cycle.
///
/// Walks up from the proposed parent through stored `parent_id` links. Meeting
/// `category_id` is a circular reference; meeting any node twice, or walking
/// more than [`MAX_HIERARCHY_DEPTH`] hops, means the stored tree is already
/// corrupt. A missing proposed parent is `NotFound`; a dangling link further
/// up ends the walk.
pub async fn ensure_acyclic<R: CategoryReader + ?Sized>(
    reader: &R,
    category_id: AggregateId,
    new_parent_id: AggregateId,
) -> Result<CheckedParent, DomainError> {
    let circular = || {
        DomainError::Conflict(ConflictKind::CircularReference {
            category_id,
            parent_id: new_parent_id,
        })
    };
    if new_parent_id == category_id {
        return Err(circular());
    }

    let parent = reader
        .get(new_parent_id)
        .await?
        .ok_or_else(|| DomainError::not_found("Category", new_parent_id))?;

    let mut ancestors = Vec::new();
    let mut visited = HashSet::from([new_parent_id]);
    let mut current = parent.parent_id();
    while let Some(ancestor_id) = current {
        if ancestor_id == category_id {
            return Err(circular());
        }
        if !visited.insert(ancestor_id) || visited.len() > MAX_HIERARCHY_DEPTH {
            tracing::warn!(%category_id, %ancestor_id, "corrupt category hierarchy");
            return Err(DomainError::Conflict(ConflictKind::CorruptHierarchy {
                category_id: ancestor_id,
            }));
        }
        current = match reader.get(ancestor_id).await? {
            Some(ancestor) => {
                let next = ancestor.parent_id();
                ancestors.push(ancestor);
                next
            }
            None => None,
        };
    }

    Ok(CheckedParent { parent, ancestors })
}

/// Collects every descendant of `root_id` through `parent_id` links,
/// parents before children.
///
/// A node reached twice, or a subtree deeper than [`MAX_HIERARCHY_DEPTH`],
/// fails with `CorruptHierarchy`.
pub async fn collect_subtree<R: CategoryReader + ?Sized>(
    reader: &R,
    root_id: AggregateId,
) -> Result<Vec<Category>, DomainError> {
    let mut descendants = Vec::new();
    let mut visited = HashSet::from([root_id]);
    let mut queue = VecDeque::from([(root_id, 0usize)]);

    while let Some((parent_id, depth)) = queue.pop_front() {
        if depth >= MAX_HIERARCHY_DEPTH {
            return Err(DomainError::Conflict(ConflictKind::CorruptHierarchy {
                category_id: parent_id,
            }));
        }
        for child in reader.children_of(Some(parent_id)).await? {
            let Some(child_id) = child.id() else { continue };
            if !visited.insert(child_id) {
                return Err(DomainError::Conflict(ConflictKind::CorruptHierarchy {
                    category_id: child_id,
                }));
            }
            queue.push_back((child_id, depth + 1));
            descendants.push(child);
        }
    }

    Ok(descendants)
}

/// Recomputes level/path of `descendants` below an already updated `root` and
/// stages every category whose placement changed.
///
/// `descendants` must be ordered parents before children, as returned by
/// [`collect_subtree`]. Returns the number of categories rewritten.
pub fn stage_subtree<S: Store + ?Sized>(
    uow: &mut UnitOfWork<'_, S>,
    root: &Category,
    descendants: Vec<Category>,
) -> Result<usize, DomainError> {
    let mut placed: HashMap<AggregateId, Category> = HashMap::with_capacity(descendants.len() + 1);
    if let Some(root_id) = root.id() {
        placed.insert(root_id, root.clone());
    }

    let mut rewritten = 0;
    for mut category in descendants {
        let Some(category_id) = category.id() else { continue };
        let parent = category.parent_id().and_then(|id| placed.get(&id));
        let events = category.rebase(parent)?;
        if !events.is_empty() {
            uow.stage(&mut category, events)?;
            rewritten += 1;
        }
        placed.insert(category_id, category);
    }

    Ok(rewritten)
}
