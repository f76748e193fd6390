//! Category commands.

use common::AggregateId;

/// Command to create a category.
#[derive(Debug, Clone)]
pub struct CreateCategory {
    pub category_id: AggregateId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    /// None creates a root category.
    pub parent_id: Option<AggregateId>,
}

impl CreateCategory {
    /// Creates a root category command with a generated id.
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            category_id: AggregateId::new(),
            name: name.into(),
            slug: slug.into(),
            description: None,
            parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: AggregateId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_id(mut self, category_id: AggregateId) -> Self {
        self.category_id = category_id;
        self
    }
}

/// Command to move a category under another parent, or to the root.
#[derive(Debug, Clone)]
pub struct ChangeParent {
    pub category_id: AggregateId,
    pub new_parent_id: Option<AggregateId>,
}

impl ChangeParent {
    pub fn new(category_id: AggregateId, new_parent_id: Option<AggregateId>) -> Self {
        Self {
            category_id,
            new_parent_id,
        }
    }

    pub fn to_root(category_id: AggregateId) -> Self {
        Self::new(category_id, None)
    }
}

/// Command to activate or deactivate a category.
#[derive(Debug, Clone)]
pub struct ChangeStatus {
    pub category_id: AggregateId,
    pub is_active: bool,
}

impl ChangeStatus {
    pub fn new(category_id: AggregateId, is_active: bool) -> Self {
        Self {
            category_id,
            is_active,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenameCategory {
    pub category_id: AggregateId,
    pub name: String,
}

impl RenameCategory {
    pub fn new(category_id: AggregateId, name: impl Into<String>) -> Self {
        Self {
            category_id,
            name: name.into(),
        }
    }
}

/// Command to change a category's slug. Rewrites the paths of the whole
/// subtree.
#[derive(Debug, Clone)]
pub struct UpdateSlug {
    pub category_id: AggregateId,
    pub slug: String,
}

impl UpdateSlug {
    pub fn new(category_id: AggregateId, slug: impl Into<String>) -> Self {
        Self {
            category_id,
            slug: slug.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpdateDetails {
    pub category_id: AggregateId,
    pub name: String,
    pub description: Option<String>,
}

impl UpdateDetails {
    pub fn new(
        category_id: AggregateId,
        name: impl Into<String>,
        description: Option<String>,
    ) -> Self {
        Self {
            category_id,
            name: name.into(),
            description,
        }
    }
}
