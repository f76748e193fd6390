use crate::AggregateRecord;

/// Builder for record lookups.
///
/// Filters apply to top-level fields of the stored JSON state. All filters
/// are combined with AND.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    /// Filter by aggregate type.
    pub aggregate_type: Option<String>,

    /// Fields that must equal the given JSON value (a missing field equals null).
    pub field_equals: Vec<(String, serde_json::Value)>,

    /// A string field that must start with the given prefix.
    pub field_prefix: Option<(String, String)>,

    /// Sort by this string field, ascending. Defaults to aggregate id.
    pub order_by: Option<String>,

    /// Maximum number of records to return.
    pub limit: Option<usize>,

    /// Number of records to skip.
    pub offset: Option<usize>,
}

impl RecordQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a query for all records of an aggregate type.
    pub fn for_type(aggregate_type: impl Into<String>) -> Self {
        Self {
            aggregate_type: Some(aggregate_type.into()),
            ..Default::default()
        }
    }

    pub fn field_eq(mut self, field: impl Into<String>, value: serde_json::Value) -> Self {
        self.field_equals.push((field.into(), value));
        self
    }

    pub fn field_starts_with(mut self, field: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.field_prefix = Some((field.into(), prefix.into()));
        self
    }

    pub fn order_by(mut self, field: impl Into<String>) -> Self {
        self.order_by = Some(field.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Evaluates the filters (not ordering or paging) against a record.
    pub fn matches(&self, record: &AggregateRecord) -> bool {
        if let Some(ref aggregate_type) = self.aggregate_type
            && &record.aggregate_type != aggregate_type
        {
            return false;
        }
        if self
            .field_equals
            .iter()
            .any(|(field, value)| record.field(field) != value)
        {
            return false;
        }
        if let Some((ref field, ref prefix)) = self.field_prefix {
            return record
                .field(field)
                .as_str()
                .is_some_and(|s| s.starts_with(prefix.as_str()));
        }
        true
    }

    /// Applies ordering, offset and limit to an already filtered set.
    pub fn arrange(&self, mut records: Vec<AggregateRecord>) -> Vec<AggregateRecord> {
        match self.order_by {
            Some(ref field) => records.sort_by(|a, b| {
                let left = a.field(field).as_str().unwrap_or_default();
                let right = b.field(field).as_str().unwrap_or_default();
                left.cmp(right).then(a.aggregate_id.cmp(&b.aggregate_id))
            }),
            None => records.sort_by_key(|r| r.aggregate_id),
        }

        let offset = self.offset.unwrap_or(0);
        let records = records.into_iter().skip(offset);
        match self.limit {
            Some(limit) => records.take(limit).collect(),
            None => records.collect(),
        }
    }
}

/// Escapes `%`, `_` and `\` so a value can be used as a literal LIKE prefix.
pub(crate) fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AggregateId, Version};

    fn record(slug: &str, path: &str, parent: Option<&str>) -> AggregateRecord {
        AggregateRecord::new(
            AggregateId::new(),
            "Category",
            Version::first(),
            serde_json::json!({"slug": slug, "path": path, "parent_id": parent}),
        )
    }

    #[test]
    fn equality_filter_treats_missing_as_null() {
        let root = record("electronics", "/electronics", None);
        let query = RecordQuery::for_type("Category").field_eq("parent_id", serde_json::Value::Null);
        assert!(query.matches(&root));

        let query = RecordQuery::for_type("Category").field_eq("missing", serde_json::Value::Null);
        assert!(query.matches(&root));
    }

    #[test]
    fn type_and_prefix_filters() {
        let phones = record("phones", "/electronics/phones", Some("x"));
        let query = RecordQuery::for_type("Category").field_starts_with("path", "/electronics/");
        assert!(query.matches(&phones));

        let query = RecordQuery::for_type("Cart").field_starts_with("path", "/electronics/");
        assert!(!query.matches(&phones));

        let query = RecordQuery::for_type("Category").field_starts_with("path", "/books/");
        assert!(!query.matches(&phones));
    }

    #[test]
    fn arrange_orders_and_pages() {
        let records = vec![
            record("c", "/c", None),
            record("a", "/a", None),
            record("b", "/b", None),
        ];
        let query = RecordQuery::new().order_by("slug").offset(1).limit(1);
        let arranged = query.arrange(records);
        assert_eq!(arranged.len(), 1);
        assert_eq!(arranged[0].field("slug"), &serde_json::json!("b"));
    }

    #[test]
    fn like_escaping() {
        assert_eq!(escape_like("/a_b%c\\"), "/a\\_b\\%c\\\\");
    }
}
