use crate::model::RawRow;
use crate::sql::Statement;
use crate::store::traits::Executor;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Ids wanted from each target table during one resolution pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Demand {
    tables: BTreeMap<String, BTreeSet<String>>,
}

impl Demand {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, table: &str, id: impl Into<String>) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .insert(id.into());
    }

    /// Tables with at least one id requested.
    pub fn tables(&self) -> impl Iterator<Item = (&String, &BTreeSet<String>)> {
        self.tables.iter().filter(|(_, ids)| !ids.is_empty())
    }

    pub fn ids(&self, table: &str) -> Option<&BTreeSet<String>> {
        self.tables.get(table)
    }

    pub fn is_empty(&self) -> bool {
        self.tables().next().is_none()
    }
}

/// Related rows loaded during one pass, keyed `<table>:<id>`.
#[derive(Debug, Clone, Default)]
pub struct RelatedObjectCache {
    objects: HashMap<String, RawRow>,
}

impl RelatedObjectCache {
    fn key(table: &str, id: &str) -> String {
        format!("{}:{}", table, id)
    }

    pub fn get(&self, table: &str, id: &str) -> Option<&RawRow> {
        self.objects.get(&Self::key(table, id))
    }

    pub fn insert(&mut self, table: &str, id: &str, row: RawRow) {
        self.objects.insert(Self::key(table, id), row);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

pub struct BatchLoader;

impl BatchLoader {
    /// Load every demanded row with one query per target table.
    ///
    /// Rows are keyed by their own `id` column, not by request order. A table
    /// whose query fails is skipped with a warning and its ids stay unresolved.
    pub async fn load<E: Executor + ?Sized>(executor: &E, demand: &Demand) -> RelatedObjectCache {
        let mut cache = RelatedObjectCache::default();

        for (table, ids) in demand.tables() {
            let ids: Vec<String> = ids.iter().cloned().collect();
            let rows = match executor.fetch_all(&Statement::select_by_ids(table, &ids)).await {
                Ok(rows) => rows,
                Err(err) => {
                    log::warn!("skipping related table '{}': {}", table, err);
                    continue;
                }
            };

            for row in rows {
                if let Some(id) = row.id_key() {
                    cache.insert(table, &id, row);
                }
            }
        }

        cache
    }
}
