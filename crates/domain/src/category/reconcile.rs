//! Repair of stored level/path drift.

use std::collections::{HashMap, HashSet, VecDeque};

use common::AggregateId;
use serde::Serialize;
use store::Store;

use crate::aggregate::Aggregate;
use crate::error::DomainError;
use crate::unit_of_work::UnitOfWork;

use super::hierarchy::{self, MAX_HIERARCHY_DEPTH};
use super::{Category, CategoryReader, StoreCategoryReader};

/// What a reconciliation pass found and fixed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Categories examined.
    pub scanned: usize,

    /// Categories whose level/path were rewritten.
    pub repaired: usize,

    /// Categories not reachable from any root: their parent is missing, they
    /// sit in a parent cycle, or they lie deeper than the depth cap. Left
    /// untouched.
    pub detached: Vec<AggregateId>,
}

/// Recomputes every category's level and path from its parent links and
/// rewrites the ones that drifted.
///
/// Writes go through the regular unit of work, so each repair raises a
/// `CategoryPathChanged` event and is version-checked. A concurrent writer
/// makes the whole pass fail with a conflict; running it again is safe.
pub struct HierarchyReconciler<S: Store> {
    store: S,
    reader: StoreCategoryReader<S>,
}

impl<S: Store + Clone> HierarchyReconciler<S> {
    pub fn new(store: S) -> Self {
        Self {
            reader: StoreCategoryReader::new(store.clone()),
            store,
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<ReconcileReport, DomainError> {
        let categories = self.reader.all().await?;
        let scanned = categories.len();

        let mut children: HashMap<AggregateId, Vec<AggregateId>> = HashMap::new();
        let mut roots = Vec::new();
        let mut by_id: HashMap<AggregateId, Category> = HashMap::with_capacity(scanned);
        for category in categories {
            let Some(id) = category.id() else { continue };
            match category.parent_id() {
                Some(parent_id) => children.entry(parent_id).or_default().push(id),
                None => roots.push(id),
            }
            by_id.insert(id, category);
        }

        let mut uow = UnitOfWork::new(&self.store);
        let mut reached = HashSet::with_capacity(scanned);
        let mut repaired = 0;

        for root_id in roots {
            let Some(mut root) = by_id.get(&root_id).cloned() else { continue };
            reached.insert(root_id);

            let events = root.rebase(None)?;
            if !events.is_empty() {
                uow.stage(&mut root, events)?;
                repaired += 1;
            }

            let mut descendants = Vec::new();
            let mut queue = VecDeque::from([(root_id, 0usize)]);
            while let Some((parent_id, depth)) = queue.pop_front() {
                if depth >= MAX_HIERARCHY_DEPTH {
                    continue;
                }
                for child_id in children.get(&parent_id).into_iter().flatten() {
                    if reached.insert(*child_id)
                        && let Some(child) = by_id.get(child_id)
                    {
                        descendants.push(child.clone());
                        queue.push_back((*child_id, depth + 1));
                    }
                }
            }

            repaired += hierarchy::stage_subtree(&mut uow, &root, descendants)?;
        }

        let mut detached: Vec<AggregateId> = by_id
            .keys()
            .filter(|id| !reached.contains(id))
            .copied()
            .collect();
        detached.sort();

        uow.save_changes().await?;

        if !detached.is_empty() {
            tracing::warn!(count = detached.len(), "categories detached from the hierarchy");
        }
        tracing::info!(scanned, repaired, "category hierarchy reconciled");

        Ok(ReconcileReport {
            scanned,
            repaired,
            detached,
        })
    }
}
