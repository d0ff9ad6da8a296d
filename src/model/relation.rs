use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToMany,
}

impl RelationKind {
    /// One-to-one and one-to-many both hold a scalar foreign key on the source row.
    pub fn is_foreign_key(self) -> bool {
        matches!(self, RelationKind::OneToOne | RelationKind::OneToMany)
    }
}

/// One relation from a column of a runtime-declared table to another table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationDescriptor {
    #[serde(rename = "type")]
    pub kind: RelationKind,
    /// Foreign key column, or the field name the many-to-many list is attached under
    pub from_column: String,
    pub to_table: String,
    /// Advisory only, never enforced here
    #[serde(default)]
    pub on_delete: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot_table: Option<String>,
}

impl RelationDescriptor {
    pub fn new(kind: RelationKind, from_column: &str, to_table: &str) -> Self {
        Self {
            kind,
            from_column: from_column.to_string(),
            to_table: to_table.to_string(),
            on_delete: String::new(),
            pivot_table: None,
        }
    }

    pub fn with_pivot(mut self, pivot_table: &str) -> Self {
        self.pivot_table = Some(pivot_table.to_string());
        self
    }

    /// Name of the join table backing a many-to-many relation.
    ///
    /// An explicit `pivotTable` wins verbatim. Otherwise the name is
    /// `<source_table>_<from_column>_<to_table>` lower-cased. The table is
    /// expected to hold exactly the two columns `left_id` and `right_id`.
    pub fn pivot_name(&self, source_table: &str) -> String {
        match self.pivot_table.as_deref() {
            Some(explicit) if !explicit.is_empty() => explicit.to_string(),
            _ => format!("{}_{}_{}", source_table, self.from_column, self.to_table).to_lowercase(),
        }
    }
}

/// Parse a stored relation declaration document.
///
/// An absent document (`None` or JSON `null`) means the page declares no relations.
pub fn parse_relations(document: Option<&serde_json::Value>) -> EngineResult<Vec<RelationDescriptor>> {
    match document {
        None | Some(serde_json::Value::Null) => Ok(Vec::new()),
        Some(json) => serde_json::from_value(json.clone()).map_err(EngineError::from),
    }
}

/// Parse relation declarations from raw JSON text.
pub fn parse_relations_str(text: &str) -> EngineResult<Vec<RelationDescriptor>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_relation_document() {
        let relations = parse_relations_str(
            r#"[
                {"type": "one-to-one", "fromColumn": "owner", "toTable": "users", "onDelete": "SET NULL"},
                {"type": "many-to-many", "fromColumn": "tags", "toTable": "tags", "onDelete": "CASCADE", "pivotTable": "page_tags"}
            ]"#,
        )
        .unwrap();

        assert_eq!(relations.len(), 2);
        assert_eq!(relations[0].kind, RelationKind::OneToOne);
        assert_eq!(relations[0].from_column, "owner");
        assert_eq!(relations[0].pivot_table, None);
        assert_eq!(relations[1].kind, RelationKind::ManyToMany);
        assert_eq!(relations[1].pivot_table.as_deref(), Some("page_tags"));
    }

    #[test]
    fn test_on_delete_is_optional() {
        let relations =
            parse_relations(Some(&json!([{"type": "one-to-many", "fromColumn": "a", "toTable": "b"}])))
                .unwrap();
        assert_eq!(relations[0].on_delete, "");
    }

    #[test]
    fn test_missing_document_means_no_relations() {
        assert!(parse_relations(None).unwrap().is_empty());
        assert!(parse_relations(Some(&json!(null))).unwrap().is_empty());
        assert!(parse_relations_str("  ").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_document_is_rejected() {
        let err = parse_relations_str(r#"[{"type": "many-to-few", "fromColumn": "a", "toTable": "b"}]"#)
            .unwrap_err();
        assert!(matches!(err, EngineError::MalformedRelationSchema(_)));

        let err = parse_relations(Some(&json!({"relations": []}))).unwrap_err();
        assert!(matches!(err, EngineError::MalformedRelationSchema(_)));
    }

    #[test]
    fn test_pivot_name_by_convention() {
        let rel = RelationDescriptor::new(RelationKind::ManyToMany, "tags", "tags");
        assert_eq!(rel.pivot_name("pages"), "pages_tags_tags");

        let rel = RelationDescriptor::new(RelationKind::ManyToMany, "Authors", "People");
        assert_eq!(rel.pivot_name("Books"), "books_authors_people");
    }

    #[test]
    fn test_explicit_pivot_name_is_verbatim() {
        let rel = RelationDescriptor::new(RelationKind::ManyToMany, "tags", "tags").with_pivot("Page_Tags");
        assert_eq!(rel.pivot_name("pages"), "Page_Tags");
    }
}
