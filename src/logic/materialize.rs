use crate::logic::loader::{BatchLoader, Demand};
use crate::logic::pivot::PivotEdgeSet;
use crate::model::{RawRow, RelationDescriptor, RelationKind, Value};
use crate::store::traits::Executor;
use itertools::Itertools;
use std::collections::HashMap;

pub struct Materializer;

impl Materializer {
    /// Replace foreign keys and pivot id lists in `rows` with the related rows they point to.
    ///
    /// Runs in two passes. The first collects every demanded id across all
    /// rows and relations (pivots are read once per pivot table). The second
    /// loads them with a single [`BatchLoader`] call and folds them back in.
    ///
    /// Foreign keys whose target cannot be loaded keep their raw value.
    /// Many-to-many columns always end up as a list, holding the related row
    /// or the raw right id when that row is missing.
    pub async fn materialize<E: Executor + ?Sized>(
        executor: &E,
        table: &str,
        relations: &[RelationDescriptor],
        mut rows: Vec<RawRow>,
    ) -> Vec<RawRow> {
        if rows.is_empty() || relations.is_empty() {
            return rows;
        }

        let mut demand = Demand::new();

        for relation in relations.iter().filter(|r| r.kind.is_foreign_key()) {
            for row in &rows {
                if let Some(id) = foreign_key(row, relation) {
                    demand.add(&relation.to_table, id);
                }
            }
        }

        let row_ids = rows.iter().filter_map(RawRow::id_key).unique().collect_vec();
        let mut pivots: HashMap<String, PivotEdgeSet> = HashMap::new();

        for relation in relations
            .iter()
            .filter(|r| r.kind == RelationKind::ManyToMany)
        {
            let pivot = relation.pivot_name(table);
            if !pivots.contains_key(&pivot) {
                let edges = PivotEdgeSet::load(executor, &pivot, &row_ids).await;
                pivots.insert(pivot.clone(), edges);
            }
            for right in pivots[&pivot].right_ids() {
                demand.add(&relation.to_table, right.as_str());
            }
        }

        let cache = BatchLoader::load(executor, &demand).await;

        for row in &mut rows {
            let row_id = row.id_key();

            for relation in relations {
                if relation.kind.is_foreign_key() {
                    let Some(id) = foreign_key(row, relation) else {
                        continue;
                    };
                    if let Some(related) = cache.get(&relation.to_table, &id) {
                        row.insert(relation.from_column.as_str(), Value::Object(related.clone()));
                    }
                    continue;
                }

                let rights: &[String] = match (&row_id, pivots.get(&relation.pivot_name(table))) {
                    (Some(id), Some(edges)) => edges.rights(id),
                    _ => &[],
                };
                let list = rights
                    .iter()
                    .map(|right| match cache.get(&relation.to_table, right) {
                        Some(related) => Value::Object(related.clone()),
                        None => Value::Text(right.clone()),
                    })
                    .collect();
                row.insert(relation.from_column.as_str(), Value::List(list));
            }
        }

        rows
    }
}

fn foreign_key(row: &RawRow, relation: &RelationDescriptor) -> Option<String> {
    row.get(&relation.from_column).and_then(Value::as_key)
}
