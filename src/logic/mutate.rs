use crate::error::{EngineError, EngineResult};
use crate::model::{Fields, Value};
use crate::sql::{ColumnInfo, Statement, PIVOT_LEFT, PIVOT_RIGHT};
use crate::store::traits::Executor;

/// Writes against tables known only by name, with values given as a column map.
pub struct DynamicWriter;

impl DynamicWriter {
    /// Insert one row and return its new id.
    ///
    /// An empty `fields` map is rejected before anything is sent to storage.
    pub async fn insert<E: Executor + ?Sized>(
        executor: &E,
        table: &str,
        fields: &Fields,
    ) -> EngineResult<String> {
        if fields.is_empty() {
            return Err(EngineError::EmptyPayload {
                table: table.to_string(),
            });
        }

        let typed = typed_fields(executor, table, fields).await?;
        let rows = executor.fetch_all(&Statement::insert(table, typed)).await?;

        rows.first()
            .and_then(|row| row.id_key())
            .ok_or_else(|| EngineError::Query(format!("insert into '{}' returned no id", table)))
    }

    /// Update the row with `id`, returning how many rows changed.
    ///
    /// Nothing to change is not an error: an empty map returns `Ok(0)` without a query.
    pub async fn update<E: Executor + ?Sized>(
        executor: &E,
        table: &str,
        id: &str,
        fields: &Fields,
    ) -> EngineResult<u64> {
        if fields.is_empty() {
            return Ok(0);
        }

        let typed = typed_fields(executor, table, fields).await?;
        executor.execute(&Statement::update(table, id, typed)).await
    }

    /// Insert one `(left_id, right_id)` edge per right id, in order.
    ///
    /// Not transactional. If an edge fails after others were written, the
    /// written edges stay and the failure comes back as `PartialPivotWrite`.
    pub async fn insert_pivot_edges<E: Executor + ?Sized>(
        executor: &E,
        pivot: &str,
        left_id: &str,
        right_ids: &[String],
    ) -> EngineResult<usize> {
        if right_ids.is_empty() {
            return Ok(0);
        }

        let columns = executor.table_columns(pivot).await?;
        if columns.is_empty() {
            return Err(EngineError::UnknownTable(pivot.to_string()));
        }
        let left = pivot_column(&columns, PIVOT_LEFT);
        let right = pivot_column(&columns, PIVOT_RIGHT);

        for (inserted, right_id) in right_ids.iter().enumerate() {
            let statement = Statement::insert_edge(pivot, &left, &right, left_id, right_id);
            if let Err(err) = executor.execute(&statement).await {
                if inserted == 0 {
                    return Err(err);
                }
                return Err(EngineError::PartialPivotWrite {
                    pivot: pivot.to_string(),
                    inserted,
                    source: Box::new(err),
                });
            }
        }

        Ok(right_ids.len())
    }

    /// Delete every edge of `left_id` from a pivot.
    pub async fn clear_pivot_edges<E: Executor + ?Sized>(
        executor: &E,
        pivot: &str,
        left_id: &str,
    ) -> EngineResult<u64> {
        executor
            .execute(&Statement::delete_edges(pivot, left_id))
            .await
    }

    /// Clear then rewrite the full edge set of `left_id`.
    pub async fn replace_pivot_edges<E: Executor + ?Sized>(
        executor: &E,
        pivot: &str,
        left_id: &str,
        right_ids: &[String],
    ) -> EngineResult<usize> {
        Self::clear_pivot_edges(executor, pivot, left_id).await?;
        Self::insert_pivot_edges(executor, pivot, left_id, right_ids).await
    }
}

/// Pair each payload column with its introspected type.
async fn typed_fields<E: Executor + ?Sized>(
    executor: &E,
    table: &str,
    fields: &Fields,
) -> EngineResult<Vec<(ColumnInfo, Value)>> {
    let columns = executor.table_columns(table).await?;
    if columns.is_empty() {
        return Err(EngineError::UnknownTable(table.to_string()));
    }

    fields
        .iter()
        .map(|(name, value)| {
            columns
                .iter()
                .find(|c| &c.name == name)
                .map(|column| (column.clone(), value.clone()))
                .ok_or_else(|| EngineError::UnknownColumn {
                    table: table.to_string(),
                    column: name.clone(),
                })
        })
        .collect()
}

fn pivot_column(columns: &[ColumnInfo], name: &str) -> ColumnInfo {
    columns
        .iter()
        .find(|c| c.name == name)
        .cloned()
        .unwrap_or_else(|| ColumnInfo::new(name, ""))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RawRow;
    use crate::sql::Operation;
    use crate::store::MemoryStore;

    fn fields(pairs: &[(&str, Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        store.create_table("widgets", &[("id", "uuid"), ("name", "text"), ("size", "integer")]);
        store.create_pivot("widgets_parts_parts");
        store
    }

    fn edges(store: &MemoryStore, pivot: &str) -> Vec<(String, String)> {
        store
            .rows(pivot)
            .iter()
            .map(|row: &RawRow| {
                (
                    row.get(PIVOT_LEFT).and_then(Value::as_key).unwrap_or_default(),
                    row.get(PIVOT_RIGHT).and_then(Value::as_key).unwrap_or_default(),
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn test_empty_insert_issues_no_sql() {
        let store = store();
        let err = DynamicWriter::insert(&store, "widgets", &Fields::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EmptyPayload { table } if table == "widgets"));
        assert!(store.operations().is_empty());
    }

    #[tokio::test]
    async fn test_insert_returns_new_id() {
        let store = store();
        let id = DynamicWriter::insert(&store, "widgets", &fields(&[("name", "x".into())]))
            .await
            .unwrap();

        let rows = store.rows("widgets");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id_key(), Some(id));
        assert_eq!(rows[0].get("name"), Some(&Value::from("x")));
    }

    #[tokio::test]
    async fn test_unknown_column_is_rejected_before_writing() {
        let store = store();
        let err = DynamicWriter::insert(&store, "widgets", &fields(&[("colour", "red".into())]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownColumn { column, .. } if column == "colour"));
        assert_eq!(
            store.count_operations(|op| matches!(op, Operation::Insert { .. })),
            0
        );
    }

    #[tokio::test]
    async fn test_insert_into_unknown_table() {
        let store = store();
        let err = DynamicWriter::insert(&store, "gadgets", &fields(&[("name", "x".into())]))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownTable(_)));
    }

    #[tokio::test]
    async fn test_empty_update_is_a_no_op() {
        let store = store();
        let changed = DynamicWriter::update(&store, "widgets", "1", &Fields::new())
            .await
            .unwrap();
        assert_eq!(changed, 0);
        assert!(store.operations().is_empty());
    }

    #[tokio::test]
    async fn test_update_changes_only_target_row() {
        let store = store();
        let a = DynamicWriter::insert(&store, "widgets", &fields(&[("name", "a".into())]))
            .await
            .unwrap();
        DynamicWriter::insert(&store, "widgets", &fields(&[("name", "b".into())]))
            .await
            .unwrap();

        let changed = DynamicWriter::update(
            &store,
            "widgets",
            &a,
            &fields(&[("name", "a2".into()), ("size", Value::Int(4))]),
        )
        .await
        .unwrap();
        assert_eq!(changed, 1);

        let rows = store.rows("widgets");
        assert_eq!(rows[0].get("name"), Some(&Value::from("a2")));
        assert_eq!(rows[0].get("size"), Some(&Value::Int(4)));
        assert_eq!(rows[1].get("name"), Some(&Value::from("b")));
    }

    #[tokio::test]
    async fn test_pivot_replace_is_idempotent() {
        let store = store();
        let rights = vec!["p1".to_string(), "p2".to_string()];

        for _ in 0..2 {
            DynamicWriter::clear_pivot_edges(&store, "widgets_parts_parts", "w1")
                .await
                .unwrap();
            DynamicWriter::insert_pivot_edges(&store, "widgets_parts_parts", "w1", &rights)
                .await
                .unwrap();
        }

        assert_eq!(
            edges(&store, "widgets_parts_parts"),
            vec![
                ("w1".to_string(), "p1".to_string()),
                ("w1".to_string(), "p2".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_clear_only_touches_one_left_id() {
        let store = store();
        DynamicWriter::insert_pivot_edges(&store, "widgets_parts_parts", "w1", &["p1".to_string()])
            .await
            .unwrap();
        DynamicWriter::insert_pivot_edges(&store, "widgets_parts_parts", "w2", &["p1".to_string()])
            .await
            .unwrap();

        let removed = DynamicWriter::clear_pivot_edges(&store, "widgets_parts_parts", "w1")
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            edges(&store, "widgets_parts_parts"),
            vec![("w2".to_string(), "p1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_partial_pivot_write_keeps_written_edges() {
        let store = store();
        let rights = ["a", "b", "a", "c"].map(String::from);

        let err = DynamicWriter::insert_pivot_edges(&store, "widgets_parts_parts", "w1", &rights)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::PartialPivotWrite { inserted: 2, .. }));
        assert_eq!(edges(&store, "widgets_parts_parts").len(), 2);
    }

    #[tokio::test]
    async fn test_first_edge_failure_is_returned_verbatim() {
        let store = store();
        DynamicWriter::insert_pivot_edges(&store, "widgets_parts_parts", "w1", &["a".to_string()])
            .await
            .unwrap();

        let err = DynamicWriter::insert_pivot_edges(&store, "widgets_parts_parts", "w1", &["a".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Query(_)));
    }

    #[tokio::test]
    async fn test_no_right_ids_no_sql() {
        let store = store();
        let n = DynamicWriter::insert_pivot_edges(&store, "widgets_parts_parts", "w1", &[])
            .await
            .unwrap();
        assert_eq!(n, 0);
        assert!(store.operations().is_empty());
    }
}
