use crate::error::{EngineError, EngineResult};
use crate::logic::materialize::Materializer;
use crate::logic::mutate::DynamicWriter;
use crate::model::{Fields, RawRow, RelationDescriptor, RelationKind, Value};
use crate::sql::{Statement, ID_COLUMN};
use crate::store::traits::Executor;
use serde::Serialize;
use std::collections::BTreeMap;

/// Many-to-many column to the right ids it should link to.
pub type LinkFields = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Resolved {
    Item(RawRow),
    List(Vec<RawRow>),
}

/// A write payload split into plain columns and many-to-many links.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPayload {
    pub fields: Fields,
    pub links: LinkFields,
}

impl EntityPayload {
    /// Separate many-to-many columns from a JSON payload.
    ///
    /// Link columns accept an array whose elements are id strings or objects
    /// carrying an `id`. A link column holding anything other than an array
    /// is dropped with a warning, as are array elements of any other shape.
    pub fn from_json(
        relations: &[RelationDescriptor],
        mut payload: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let mut links = LinkFields::new();

        for relation in relations
            .iter()
            .filter(|r| r.kind == RelationKind::ManyToMany)
        {
            let Some(value) = payload.remove(&relation.from_column) else {
                continue;
            };
            let items = match value {
                serde_json::Value::Null => continue,
                serde_json::Value::Array(items) => items,
                other => {
                    log::warn!(
                        "ignoring many-to-many column '{}': expected an array, got {}",
                        relation.from_column,
                        other
                    );
                    continue;
                }
            };

            let ids = items
                .into_iter()
                .filter_map(|item| match item {
                    serde_json::Value::String(id) => Some(id),
                    serde_json::Value::Object(mut obj) => {
                        obj.remove("id").and_then(|id| Value::from(id).as_key())
                    }
                    other => {
                        log::warn!(
                            "ignoring many-to-many value {} in '{}'",
                            other,
                            relation.from_column
                        );
                        None
                    }
                })
                .collect();
            links.insert(relation.from_column.clone(), ids);
        }

        Self {
            fields: payload
                .into_iter()
                .map(|(column, value)| (column, Value::from(value)))
                .collect(),
            links,
        }
    }
}

/// Read one row by id, or every row when `row_id` is `None`, with relations materialized.
pub async fn resolve_entity<E: Executor + ?Sized>(
    executor: &E,
    table: &str,
    relations: &[RelationDescriptor],
    row_id: Option<&str>,
) -> EngineResult<Resolved> {
    match row_id {
        Some(id) => {
            let row = fetch_row(executor, table, id).await?;
            let mut rows = Materializer::materialize(executor, table, relations, vec![row]).await;
            Ok(Resolved::Item(rows.remove(0)))
        }
        None => {
            let rows = fetch_rows(executor, table).await?;
            let rows = Materializer::materialize(executor, table, relations, rows).await;
            Ok(Resolved::List(rows))
        }
    }
}

/// Read a single row, scanning it in the table's ordinal column order.
pub async fn fetch_row<E: Executor + ?Sized>(
    executor: &E,
    table: &str,
    id: &str,
) -> EngineResult<RawRow> {
    let columns = executor
        .table_columns(table)
        .await
        .map_err(|err| EngineError::resolution(table, err))?;
    if columns.is_empty() {
        return Err(EngineError::resolution(
            table,
            EngineError::UnknownTable(table.to_string()),
        ));
    }

    let names: Vec<String> = columns.into_iter().map(|c| c.name).collect();
    let row = executor
        .fetch_all(&Statement::select_by_id(table, &names, id))
        .await
        .map_err(|err| EngineError::resolution(table, err))?
        .into_iter()
        .next()
        .ok_or_else(|| not_found(table, id))?;

    let values = names
        .iter()
        .map(|name| row.get(name).cloned().unwrap_or(Value::Null))
        .collect();
    Ok(RawRow::from_positional(&names, values))
}

/// Read every row of a table.
pub async fn fetch_rows<E: Executor + ?Sized>(executor: &E, table: &str) -> EngineResult<Vec<RawRow>> {
    executor
        .fetch_all(&Statement::select_all(table))
        .await
        .map_err(|err| EngineError::resolution(table, err))
}

/// Insert a row and link its many-to-many columns, returning the new id.
///
/// Statements run one after another on `executor`; wrap it in a transaction
/// if a failed link write must also undo the row.
pub async fn write_entity<E: Executor + ?Sized>(
    executor: &E,
    table: &str,
    relations: &[RelationDescriptor],
    fields: &Fields,
    links: &LinkFields,
) -> EngineResult<String> {
    let new_id = DynamicWriter::insert(executor, table, fields).await?;

    for relation in relations
        .iter()
        .filter(|r| r.kind == RelationKind::ManyToMany)
    {
        let Some(right_ids) = links.get(&relation.from_column) else {
            continue;
        };
        if right_ids.is_empty() {
            continue;
        }
        DynamicWriter::insert_pivot_edges(executor, &relation.pivot_name(table), &new_id, right_ids)
            .await?;
    }

    Ok(new_id)
}

/// Update a row, then rewrite the edge set of every many-to-many column present in `links`.
///
/// Fails with `RowNotFound` before touching any pivot when the row does not
/// exist. Returns the number of rows the scalar update touched.
pub async fn update_entity<E: Executor + ?Sized>(
    executor: &E,
    table: &str,
    relations: &[RelationDescriptor],
    id: &str,
    fields: &Fields,
    links: &LinkFields,
) -> EngineResult<u64> {
    if fields.is_empty() {
        ensure_row_exists(executor, table, id).await?;
    }
    let updated = DynamicWriter::update(executor, table, id, fields).await?;
    if updated == 0 && !fields.is_empty() {
        return Err(not_found(table, id));
    }

    for relation in relations
        .iter()
        .filter(|r| r.kind == RelationKind::ManyToMany)
    {
        if let Some(right_ids) = links.get(&relation.from_column) {
            DynamicWriter::replace_pivot_edges(executor, &relation.pivot_name(table), id, right_ids)
                .await?;
        }
    }

    Ok(updated)
}

async fn ensure_row_exists<E: Executor + ?Sized>(
    executor: &E,
    table: &str,
    id: &str,
) -> EngineResult<()> {
    let rows = executor
        .fetch_all(&Statement::select_by_id(table, &[ID_COLUMN.to_string()], id))
        .await?;
    if rows.is_empty() {
        return Err(not_found(table, id));
    }
    Ok(())
}

fn not_found(table: &str, id: &str) -> EngineError {
    EngineError::RowNotFound {
        table: table.to_string(),
        id: id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::{Operation, PIVOT_LEFT, PIVOT_RIGHT};
    use crate::store::MemoryStore;
    use serde_json::json;

    fn relations() -> Vec<RelationDescriptor> {
        vec![
            RelationDescriptor::new(RelationKind::OneToMany, "category", "categories"),
            RelationDescriptor::new(RelationKind::ManyToMany, "tags", "tags"),
        ]
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_table(
            "pages",
            &[("id", "integer"), ("name", "text"), ("category", "integer")],
        );
        store.create_table("categories", &[("id", "integer"), ("title", "text")]);
        store.create_table("tags", &[("id", "text"), ("label", "text")]);
        store.create_pivot("pages_tags_tags");

        store.seed(
            "categories",
            [("id", Value::Int(5)), ("title", Value::from("news"))]
                .into_iter()
                .collect(),
        );
        for (id, label) in [("t1", "red"), ("t2", "blue")] {
            store.seed(
                "tags",
                [("id", Value::from(id)), ("label", Value::from(label))]
                    .into_iter()
                    .collect(),
            );
        }
        store
    }

    fn payload(json: serde_json::Value) -> EntityPayload {
        let serde_json::Value::Object(map) = json else {
            panic!("payload must be an object");
        };
        EntityPayload::from_json(&relations(), map)
    }

    #[test]
    fn test_payload_split() {
        let p = payload(json!({
            "name": "x",
            "category": 5,
            "tags": ["t1", {"id": "t2", "label": "blue"}, 7, {"label": "no id"}]
        }));

        assert_eq!(p.fields.get("name"), Some(&Value::from("x")));
        assert_eq!(p.fields.get("category"), Some(&Value::Int(5)));
        assert!(!p.fields.contains_key("tags"));
        assert_eq!(p.links.get("tags"), Some(&vec!["t1".to_string(), "t2".to_string()]));
    }

    #[test]
    fn test_payload_bad_link_shape_is_dropped() {
        let p = payload(json!({"name": "x", "tags": "t1"}));
        assert!(p.links.is_empty());
        assert!(!p.fields.contains_key("tags"));

        let p = payload(json!({"name": "x", "tags": null}));
        assert!(p.links.is_empty());
    }

    #[tokio::test]
    async fn test_write_then_resolve_round_trip() {
        let store = store();
        let p = payload(json!({"name": "x", "category": 5, "tags": ["t2", "t1"]}));

        let id = write_entity(&store, "pages", &relations(), &p.fields, &p.links)
            .await
            .unwrap();

        let Resolved::Item(row) = resolve_entity(&store, "pages", &relations(), Some(&id))
            .await
            .unwrap()
        else {
            panic!("expected a single item");
        };

        assert_eq!(row.get("name"), Some(&Value::from("x")));
        let Some(Value::Object(category)) = row.get("category") else {
            panic!("category should be materialized");
        };
        assert_eq!(category.get("title"), Some(&Value::from("news")));

        let Some(Value::List(tags)) = row.get("tags") else {
            panic!("tags should be a list");
        };
        let labels: Vec<_> = tags
            .iter()
            .map(|t| match t {
                Value::Object(o) => o.get("label").cloned(),
                _ => None,
            })
            .collect();
        assert_eq!(labels, vec![Some(Value::from("blue")), Some(Value::from("red"))]);
    }

    #[tokio::test]
    async fn test_single_item_reads_every_introspected_column() {
        let store = store();
        store.seed("pages", [("id", Value::Int(1))].into_iter().collect());

        let row = fetch_row(&store, "pages", "1").await.unwrap();
        assert_eq!(row.len(), 3);
        assert_eq!(row.get("name"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn test_listing_resolves_all_rows() {
        let store = store();
        for name in ["a", "b", "c"] {
            write_entity(
                &store,
                "pages",
                &relations(),
                &[("name".to_string(), Value::from(name))].into_iter().collect(),
                &LinkFields::new(),
            )
            .await
            .unwrap();
        }
        store.clear_log();

        let Resolved::List(rows) = resolve_entity(&store, "pages", &relations(), None).await.unwrap()
        else {
            panic!("expected a list");
        };
        assert_eq!(rows.len(), 3);
        for row in &rows {
            assert_eq!(row.get("tags"), Some(&Value::List(Vec::new())));
        }
        // listing read + pivot read; no category or tag ids to load
        assert_eq!(store.operations().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_item_and_missing_table() {
        let store = store();
        let err = resolve_entity(&store, "pages", &relations(), Some("99"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RowNotFound { .. }));

        let err = resolve_entity(&store, "nope", &relations(), None).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::RelationResolution { ref table, .. } if table == "nope"
        ));

        let err = resolve_entity(&store, "nope", &relations(), Some("1")).await.unwrap_err();
        assert!(matches!(err, EngineError::RelationResolution { .. }));
    }

    #[tokio::test]
    async fn test_update_rewrites_present_links_only() {
        let store = store();
        let relations = vec![
            RelationDescriptor::new(RelationKind::ManyToMany, "tags", "tags"),
            RelationDescriptor::new(RelationKind::ManyToMany, "topics", "tags").with_pivot("page_topics"),
        ];
        store.create_pivot("page_topics");

        let mut links = LinkFields::new();
        links.insert("tags".to_string(), vec!["t1".to_string()]);
        links.insert("topics".to_string(), vec!["t2".to_string()]);
        let id = write_entity(
            &store,
            "pages",
            &relations,
            &[("name".to_string(), Value::from("x"))].into_iter().collect(),
            &links,
        )
        .await
        .unwrap();

        let mut links = LinkFields::new();
        links.insert("tags".to_string(), vec!["t2".to_string(), "t1".to_string()]);
        let updated = update_entity(
            &store,
            "pages",
            &relations,
            &id,
            &[("name".to_string(), Value::from("y"))].into_iter().collect(),
            &links,
        )
        .await
        .unwrap();
        assert_eq!(updated, 1);

        let rights = |pivot: &str| -> Vec<String> {
            store
                .rows(pivot)
                .iter()
                .filter_map(|r| r.get(PIVOT_RIGHT).and_then(Value::as_key))
                .collect()
        };
        assert_eq!(rights("pages_tags_tags"), vec!["t2".to_string(), "t1".to_string()]);
        assert_eq!(rights("page_topics"), vec!["t2".to_string()]);
        assert!(store
            .rows("pages_tags_tags")
            .iter()
            .all(|r| r.get(PIVOT_LEFT).and_then(Value::as_key) == Some(id.clone())));
    }

    #[tokio::test]
    async fn test_update_of_missing_row_leaves_pivots_alone() {
        let store = store();
        let mut links = LinkFields::new();
        links.insert("tags".to_string(), vec!["t1".to_string()]);

        let err = update_entity(&store, "pages", &relations(), "404", &Fields::new(), &links)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RowNotFound { ref id, .. } if id == "404"));

        let err = update_entity(
            &store,
            "pages",
            &relations(),
            "404",
            &[("name".to_string(), Value::from("y"))].into_iter().collect(),
            &links,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::RowNotFound { .. }));

        assert!(store.rows("pages_tags_tags").is_empty());
        assert_eq!(
            store.count_operations(|op| matches!(op, Operation::InsertEdge { .. } | Operation::DeleteEdges { .. })),
            0
        );
    }

    #[tokio::test]
    async fn test_links_only_update_of_existing_row() {
        let store = store();
        store.seed("pages", [("id", Value::Int(1))].into_iter().collect());
        let mut links = LinkFields::new();
        links.insert("tags".to_string(), vec!["t2".to_string()]);

        let updated = update_entity(&store, "pages", &relations(), "1", &Fields::new(), &links)
            .await
            .unwrap();
        assert_eq!(updated, 0);
        assert_eq!(store.rows("pages_tags_tags").len(), 1);
    }

    #[tokio::test]
    async fn test_empty_write_fails_before_any_query() {
        let store = store();
        let err = write_entity(&store, "pages", &relations(), &Fields::new(), &LinkFields::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyPayload { .. }));
        assert!(store.operations().is_empty());
        assert_eq!(
            store.count_operations(|op| matches!(op, Operation::Insert { .. })),
            0
        );
    }
}
