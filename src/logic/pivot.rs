use crate::model::Value;
use crate::sql::{Statement, PIVOT_LEFT, PIVOT_RIGHT};
use crate::store::traits::Executor;
use std::collections::HashMap;

/// Edges of one pivot table: left id to right ids in the order the pivot query returned them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PivotEdgeSet {
    edges: HashMap<String, Vec<String>>,
}

impl PivotEdgeSet {
    pub fn push(&mut self, left: String, right: String) {
        self.edges.entry(left).or_default().push(right);
    }

    pub fn rights(&self, left: &str) -> &[String] {
        self.edges.get(left).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every right id across all left ids.
    pub fn right_ids(&self) -> impl Iterator<Item = &String> {
        self.edges.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Load the edges of `pivot` whose left id is one of `left_ids`, in one query.
    ///
    /// A pivot that cannot be read (typically one that was never created)
    /// is logged and treated as having no edges.
    pub async fn load<E: Executor + ?Sized>(executor: &E, pivot: &str, left_ids: &[String]) -> Self {
        let mut set = Self::default();
        if left_ids.is_empty() {
            return set;
        }

        let rows = match executor.fetch_all(&Statement::select_pivot(pivot, left_ids)).await {
            Ok(rows) => rows,
            Err(err) => {
                log::warn!("skipping pivot '{}': {}", pivot, err);
                return set;
            }
        };

        for row in rows {
            let left = row.get(PIVOT_LEFT).and_then(Value::as_key);
            let right = row.get(PIVOT_RIGHT).and_then(Value::as_key);
            if let (Some(left), Some(right)) = (left, right) {
                set.push(left, right);
            }
        }

        set
    }
}
