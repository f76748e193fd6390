//! Category aggregate implementation.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};
use store::Version;

use crate::aggregate::Aggregate;

use super::events::{
    CategoryCreatedData, CategoryDetailsUpdatedData, CategoryMovedData, CategoryPathChangedData,
    CategoryRenamedData, CategorySlugChangedData, CategoryStatusChangedData,
};
use super::hierarchy::Placement;
use super::{CategoryError, CategoryEvent};

/// Category aggregate root.
///
/// Owns the materialized `level` and `path`: they are only ever written by
/// applying this aggregate's own events, and always computed from the
/// parent's placement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Category {
    id: Option<AggregateId>,

    #[serde(skip)]
    version: Version,

    name: String,
    slug: String,
    description: Option<String>,
    parent_id: Option<AggregateId>,

    /// Number of ancestors; 0 for a root.
    level: u32,

    /// Ancestor slugs then the own slug, e.g. `/electronics/phones`.
    path: String,

    is_active: bool,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl Aggregate for Category {
    type Event = CategoryEvent;
    type Error = CategoryError;

    fn aggregate_type() -> &'static str {
        "Category"
    }

    fn id(&self) -> Option<AggregateId> {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn apply(&mut self, event: Self::Event) {
        match event {
            CategoryEvent::CategoryCreated(data) => {
                self.id = Some(data.category_id);
                self.name = data.name;
                self.slug = data.slug;
                self.description = data.description;
                self.parent_id = data.parent_id;
                self.level = data.level;
                self.path = data.path;
                self.is_active = true;
                self.created_at = Some(data.created_at);
                self.updated_at = Some(data.created_at);
            }
            CategoryEvent::CategoryRenamed(data) => {
                self.name = data.new_name;
                self.updated_at = Some(data.renamed_at);
            }
            CategoryEvent::CategorySlugChanged(data) => {
                self.slug = data.new_slug;
                self.path = data.new_path;
                self.updated_at = Some(data.changed_at);
            }
            CategoryEvent::CategoryMoved(data) => {
                self.parent_id = data.new_parent_id;
                self.level = data.level;
                self.path = data.new_path;
                self.updated_at = Some(data.moved_at);
            }
            CategoryEvent::CategoryPathChanged(data) => {
                self.level = data.level;
                self.path = data.new_path;
                self.updated_at = Some(data.changed_at);
            }
            CategoryEvent::CategoryStatusChanged(data) => {
                self.is_active = data.is_active;
                self.updated_at = Some(data.changed_at);
            }
            CategoryEvent::CategoryDetailsUpdated(data) => {
                self.name = data.name;
                self.description = data.description;
                self.updated_at = Some(data.updated_at);
            }
        }
    }
}

// Query methods
impl Category {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn parent_id(&self) -> Option<AggregateId> {
        self.parent_id
    }

    pub fn level(&self) -> u32 {
        self.level
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// The placement this category currently has stored.
    pub fn placement(&self) -> Placement {
        Placement {
            level: self.level,
            path: self.path.clone(),
        }
    }

    /// True if `other`'s stored path lies strictly below this category's.
    pub fn is_ancestor_of(&self, other: &Category) -> bool {
        other
            .path
            .strip_prefix(self.path.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    fn require_id(&self) -> Result<AggregateId, CategoryError> {
        self.id.ok_or(CategoryError::NotCreated)
    }
}

// Command methods (return events)
impl Category {
    /// Creates a category as a root or under `parent`.
    pub fn create(
        &self,
        category_id: AggregateId,
        name: &str,
        slug: &str,
        description: Option<String>,
        parent: Option<&Category>,
    ) -> Result<Vec<CategoryEvent>, CategoryError> {
        if self.id.is_some() {
            return Err(CategoryError::AlreadyCreated);
        }
        let name = validate_name(name)?;
        validate_slug(slug)?;

        let placement = Placement::resolve(parent, slug);
        Ok(vec![CategoryEvent::CategoryCreated(CategoryCreatedData {
            category_id,
            name,
            slug: slug.to_string(),
            description: normalize_description(description),
            parent_id: parent.and_then(Category::id),
            level: placement.level,
            path: placement.path,
            created_at: Utc::now(),
        })])
    }

    /// Moves the category under `new_parent`, or to the root when None.
    ///
    /// Only checks what the two categories themselves reveal (self-parenting
    /// and a parent whose stored path lies below this one). The full ancestor
    /// walk is [`ensure_acyclic`](super::hierarchy::ensure_acyclic).
    pub fn change_parent(
        &self,
        new_parent: Option<&Category>,
    ) -> Result<Vec<CategoryEvent>, CategoryError> {
        let category_id = self.require_id()?;

        if let Some(parent) = new_parent {
            let parent_id = parent.require_id()?;
            if parent_id == category_id || self.is_ancestor_of(parent) {
                return Err(CategoryError::CircularReference {
                    category_id,
                    parent_id,
                });
            }
        }

        let new_parent_id = new_parent.and_then(Category::id);
        if new_parent_id == self.parent_id {
            return self.rebase(new_parent);
        }

        let placement = Placement::resolve(new_parent, &self.slug);
        Ok(vec![CategoryEvent::CategoryMoved(CategoryMovedData {
            category_id,
            slug: self.slug.clone(),
            old_parent_id: self.parent_id,
            new_parent_id,
            old_path: self.path.clone(),
            new_path: placement.path,
            level: placement.level,
            moved_at: Utc::now(),
        })])
    }

    /// Recomputes level and path from the current parent's placement.
    ///
    /// Used for descendants of a moved or re-slugged category and to repair
    /// drift. Raises nothing when the stored placement is already right.
    pub fn rebase(&self, parent: Option<&Category>) -> Result<Vec<CategoryEvent>, CategoryError> {
        let category_id = self.require_id()?;
        let placement = Placement::resolve(parent, &self.slug);
        if placement == self.placement() {
            return Ok(vec![]);
        }

        Ok(vec![CategoryEvent::CategoryPathChanged(
            CategoryPathChangedData {
                category_id,
                slug: self.slug.clone(),
                old_path: self.path.clone(),
                new_path: placement.path,
                level: placement.level,
                changed_at: Utc::now(),
            },
        )])
    }

    /// Activates or deactivates the category. Descendants are not touched.
    ///
    /// Setting the status it already has raises no event.
    pub fn change_status(&self, is_active: bool) -> Result<Vec<CategoryEvent>, CategoryError> {
        let category_id = self.require_id()?;
        if self.is_active == is_active {
            return Ok(vec![]);
        }

        Ok(vec![CategoryEvent::CategoryStatusChanged(
            CategoryStatusChangedData {
                category_id,
                slug: self.slug.clone(),
                is_active,
                changed_at: Utc::now(),
            },
        )])
    }

    pub fn rename(&self, name: &str) -> Result<Vec<CategoryEvent>, CategoryError> {
        let category_id = self.require_id()?;
        let name = validate_name(name)?;
        if name == self.name {
            return Ok(vec![]);
        }

        Ok(vec![CategoryEvent::CategoryRenamed(CategoryRenamedData {
            category_id,
            slug: self.slug.clone(),
            old_name: self.name.clone(),
            new_name: name,
            renamed_at: Utc::now(),
        })])
    }

    /// Changes the slug, rewriting the own path under `parent`.
    ///
    /// Uniqueness against other categories is enforced by the caller and,
    /// race-free, by the slug key claimed in the same commit.
    pub fn update_slug(
        &self,
        slug: &str,
        parent: Option<&Category>,
    ) -> Result<Vec<CategoryEvent>, CategoryError> {
        let category_id = self.require_id()?;
        validate_slug(slug)?;
        if slug == self.slug {
            return Ok(vec![]);
        }

        let placement = Placement::resolve(parent, slug);
        Ok(vec![CategoryEvent::CategorySlugChanged(
            CategorySlugChangedData {
                category_id,
                old_slug: self.slug.clone(),
                new_slug: slug.to_string(),
                old_path: self.path.clone(),
                new_path: placement.path,
                changed_at: Utc::now(),
            },
        )])
    }

    pub fn update_details(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Vec<CategoryEvent>, CategoryError> {
        let category_id = self.require_id()?;
        let name = validate_name(name)?;
        let description = normalize_description(description);
        if name == self.name && description == self.description {
            return Ok(vec![]);
        }

        Ok(vec![CategoryEvent::CategoryDetailsUpdated(
            CategoryDetailsUpdatedData {
                category_id,
                slug: self.slug.clone(),
                name,
                description,
                updated_at: Utc::now(),
            },
        )])
    }
}

pub(crate) fn validate_name(name: &str) -> Result<String, CategoryError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CategoryError::EmptyName);
    }
    Ok(name.to_string())
}

/// Checks a slug against `^[a-z0-9-]+$`.
pub fn validate_slug(slug: &str) -> Result<(), CategoryError> {
    if slug.is_empty() {
        return Err(CategoryError::EmptySlug);
    }
    if !slug
        .bytes()
        .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'-')
    {
        return Err(CategoryError::InvalidSlug(slug.to_string()));
    }
    Ok(())
}

fn normalize_description(description: Option<String>) -> Option<String> {
    description
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(name: &str, slug: &str, parent: Option<&Category>) -> Category {
        let mut category = Category::default();
        let events = category
            .create(AggregateId::new(), name, slug, None, parent)
            .unwrap();
        category.apply_events(events);
        category
    }

    #[test]
    fn root_has_level_zero_and_own_path() {
        let electronics = created("Electronics", "electronics", None);

        assert_eq!(electronics.level(), 0);
        assert_eq!(electronics.path(), "/electronics");
        assert!(electronics.is_active());
        assert!(electronics.is_root());
    }

    #[test]
    fn child_extends_parent_placement() {
        let electronics = created("Electronics", "electronics", None);
        let phones = created("Phones", "phones", Some(&electronics));

        assert_eq!(phones.level(), electronics.level() + 1);
        assert_eq!(phones.path(), "/electronics/phones");
        assert_eq!(phones.parent_id(), electronics.id());
    }

    #[test]
    fn create_rejects_bad_input() {
        let category = Category::default();
        let id = AggregateId::new();

        assert_eq!(
            category.create(id, "  ", "ok", None, None),
            Err(CategoryError::EmptyName)
        );
        assert_eq!(
            category.create(id, "Name", "", None, None),
            Err(CategoryError::EmptySlug)
        );
        for bad in ["Phones", "mobile phones", "tv_audio", "ümlaut", "a/b"] {
            assert_eq!(
                category.create(id, "Name", bad, None, None),
                Err(CategoryError::InvalidSlug(bad.to_string()))
            );
        }
    }

    #[test]
    fn create_twice_rejected() {
        let category = created("Books", "books", None);
        assert_eq!(
            category.create(AggregateId::new(), "Books", "books", None, None),
            Err(CategoryError::AlreadyCreated)
        );
    }

    #[test]
    fn reparent_to_root() {
        let electronics = created("Electronics", "electronics", None);
        let mut phones = created("Phones", "phones", Some(&electronics));

        let events = phones.change_parent(None).unwrap();
        phones.apply_events(events);

        assert_eq!(phones.level(), 0);
        assert_eq!(phones.path(), "/phones");
        assert_eq!(phones.parent_id(), None);
    }

    #[test]
    fn self_parenting_rejected() {
        let category = created("Books", "books", None);
        let id = category.id().unwrap();

        assert_eq!(
            category.change_parent(Some(&category)),
            Err(CategoryError::CircularReference {
                category_id: id,
                parent_id: id,
            })
        );
    }

    #[test]
    fn parenting_under_stored_descendant_rejected() {
        let a = created("A", "a", None);
        let b = created("B", "b", Some(&a));

        let err = a.change_parent(Some(&b)).unwrap_err();
        assert!(matches!(err, CategoryError::CircularReference { .. }));
    }

    #[test]
    fn same_parent_is_a_no_op() {
        let electronics = created("Electronics", "electronics", None);
        let phones = created("Phones", "phones", Some(&electronics));

        assert!(phones.change_parent(Some(&electronics)).unwrap().is_empty());
    }

    #[test]
    fn rebase_only_reports_real_changes() {
        let mut electronics = created("Electronics", "electronics", None);
        let phones = created("Phones", "phones", Some(&electronics));
        assert!(phones.rebase(Some(&electronics)).unwrap().is_empty());

        let events = electronics.update_slug("devices", None).unwrap();
        electronics.apply_events(events);

        let events = phones.rebase(Some(&electronics)).unwrap();
        match events.as_slice() {
            [CategoryEvent::CategoryPathChanged(data)] => {
                assert_eq!(data.old_path, "/electronics/phones");
                assert_eq!(data.new_path, "/devices/phones");
                assert_eq!(data.level, 1);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[test]
    fn change_status_is_idempotent() {
        let mut category = created("Books", "books", None);

        let events = category.change_status(false).unwrap();
        assert_eq!(events.len(), 1);
        category.apply_events(events);
        assert!(!category.is_active());

        assert!(category.change_status(false).unwrap().is_empty());
        assert!(!category.is_active());
    }

    #[test]
    fn update_slug_rewrites_path() {
        let electronics = created("Electronics", "electronics", None);
        let mut phones = created("Phones", "phones", Some(&electronics));

        let events = phones.update_slug("mobiles", Some(&electronics)).unwrap();
        phones.apply_events(events);

        assert_eq!(phones.slug(), "mobiles");
        assert_eq!(phones.path(), "/electronics/mobiles");
        assert_eq!(phones.level(), 1);
    }

    #[test]
    fn rename_and_details() {
        let mut category = created("Books", "books", None);
        assert!(category.rename("Books").unwrap().is_empty());

        let events = category.rename("Printed Books").unwrap();
        category.apply_events(events);
        assert_eq!(category.name(), "Printed Books");

        let events = category
            .update_details("Books", Some("  Paper and ink ".to_string()))
            .unwrap();
        category.apply_events(events);
        assert_eq!(category.name(), "Books");
        assert_eq!(category.description(), Some("Paper and ink"));
        assert!(
            category
                .update_details("Books", Some("Paper and ink".to_string()))
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn commands_on_uncreated_category_fail() {
        let category = Category::default();
        assert_eq!(category.change_status(false), Err(CategoryError::NotCreated));
        assert_eq!(category.rename("x"), Err(CategoryError::NotCreated));
    }

    #[test]
    fn ancestor_check_uses_segment_boundaries() {
        let phone = created("Phone", "phone", None);
        let phones = created("Phones", "phones", None);
        let case = created("Case", "case", Some(&phone));

        assert!(phone.is_ancestor_of(&case));
        assert!(!phone.is_ancestor_of(&phones));
        assert!(!phone.is_ancestor_of(&phone));
    }

    #[test]
    fn state_round_trips_through_record_form() {
        let category = created("Books", "books", None);
        let json = serde_json::to_value(&category).unwrap();

        assert_eq!(json["slug"], "books");
        assert_eq!(json["path"], "/books");
        assert!(json["parent_id"].is_null());

        let restored: Category = serde_json::from_value(json).unwrap();
        assert_eq!(restored, category);
    }
}
