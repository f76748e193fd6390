//! Category domain events.

use chrono::{DateTime, Utc};
use common::AggregateId;
use serde::{Deserialize, Serialize};

use crate::aggregate::DomainEvent;

/// Events that can occur on a category aggregate.
///
/// Every variant carries the category id and its slug (after the change), so
/// cache invalidation never needs to load the category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum CategoryEvent {
    /// Category was created, as a root or under an existing parent.
    CategoryCreated(CategoryCreatedData),

    /// Category display name changed.
    CategoryRenamed(CategoryRenamedData),

    /// Category slug changed, which rewrites its own path.
    CategorySlugChanged(CategorySlugChangedData),

    /// Category was moved under a different parent (or to the root).
    CategoryMoved(CategoryMovedData),

    /// Level/path of a category were recomputed because an ancestor moved or
    /// was re-slugged, or because stored data had drifted.
    CategoryPathChanged(CategoryPathChangedData),

    /// Category was activated or deactivated.
    CategoryStatusChanged(CategoryStatusChangedData),

    /// Name and description were updated together.
    CategoryDetailsUpdated(CategoryDetailsUpdatedData),
}

impl DomainEvent for CategoryEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CategoryEvent::CategoryCreated(_) => "CategoryCreated",
            CategoryEvent::CategoryRenamed(_) => "CategoryRenamed",
            CategoryEvent::CategorySlugChanged(_) => "CategorySlugChanged",
            CategoryEvent::CategoryMoved(_) => "CategoryMoved",
            CategoryEvent::CategoryPathChanged(_) => "CategoryPathChanged",
            CategoryEvent::CategoryStatusChanged(_) => "CategoryStatusChanged",
            CategoryEvent::CategoryDetailsUpdated(_) => "CategoryDetailsUpdated",
        }
    }
}

impl CategoryEvent {
    /// Every event type a category can raise.
    pub const TYPES: [&'static str; 7] = [
        "CategoryCreated",
        "CategoryRenamed",
        "CategorySlugChanged",
        "CategoryMoved",
        "CategoryPathChanged",
        "CategoryStatusChanged",
        "CategoryDetailsUpdated",
    ];

    /// The category this event belongs to.
    pub fn category_id(&self) -> AggregateId {
        match self {
            CategoryEvent::CategoryCreated(d) => d.category_id,
            CategoryEvent::CategoryRenamed(d) => d.category_id,
            CategoryEvent::CategorySlugChanged(d) => d.category_id,
            CategoryEvent::CategoryMoved(d) => d.category_id,
            CategoryEvent::CategoryPathChanged(d) => d.category_id,
            CategoryEvent::CategoryStatusChanged(d) => d.category_id,
            CategoryEvent::CategoryDetailsUpdated(d) => d.category_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryCreatedData {
    pub category_id: AggregateId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub parent_id: Option<AggregateId>,
    pub level: u32,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRenamedData {
    pub category_id: AggregateId,
    pub slug: String,
    pub old_name: String,
    pub new_name: String,
    pub renamed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySlugChangedData {
    pub category_id: AggregateId,
    pub old_slug: String,
    /// Carried as `slug` so every category event exposes the current slug
    /// under the same field name.
    #[serde(rename = "slug")]
    pub new_slug: String,
    pub old_path: String,
    pub new_path: String,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMovedData {
    pub category_id: AggregateId,
    pub slug: String,
    pub old_parent_id: Option<AggregateId>,
    pub new_parent_id: Option<AggregateId>,
    pub old_path: String,
    pub new_path: String,
    pub level: u32,
    pub moved_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryPathChangedData {
    pub category_id: AggregateId,
    pub slug: String,
    pub old_path: String,
    pub new_path: String,
    pub level: u32,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryStatusChangedData {
    pub category_id: AggregateId,
    pub slug: String,
    pub is_active: bool,
    pub changed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDetailsUpdatedData {
    pub category_id: AggregateId,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_is_tagged_with_event_type() {
        let id = AggregateId::new();
        let event = CategoryEvent::CategoryStatusChanged(CategoryStatusChangedData {
            category_id: id,
            slug: "phones".to_string(),
            is_active: false,
            changed_at: Utc::now(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "CategoryStatusChanged");
        assert_eq!(json["data"]["slug"], "phones");
        assert_eq!(json["data"]["category_id"], serde_json::json!(id));
        assert_eq!(event.category_id(), id);
    }

    #[test]
    fn slug_change_exposes_new_slug_as_slug() {
        let event = CategoryEvent::CategorySlugChanged(CategorySlugChangedData {
            category_id: AggregateId::new(),
            old_slug: "mobiles".to_string(),
            new_slug: "phones".to_string(),
            old_path: "/mobiles".to_string(),
            new_path: "/phones".to_string(),
            changed_at: Utc::now(),
        });

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["data"]["slug"], "phones");
        assert_eq!(json["data"]["old_slug"], "mobiles");
    }

    #[test]
    fn every_variant_is_listed() {
        let event = CategoryEvent::CategoryPathChanged(CategoryPathChangedData {
            category_id: AggregateId::new(),
            slug: "a".to_string(),
            old_path: "/x/a".to_string(),
            new_path: "/a".to_string(),
            level: 0,
            changed_at: Utc::now(),
        });
        assert!(CategoryEvent::TYPES.contains(&event.event_type()));
    }
}
