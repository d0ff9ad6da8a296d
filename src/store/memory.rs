use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};
use crate::model::{generate_id, RawRow, Value};
use crate::sql::{bound_ids, ColumnInfo, Operation, Statement, ID_COLUMN, PIVOT_LEFT, PIVOT_RIGHT};
use crate::store::traits::{Executor, TransactionControl, Transactional};

#[derive(Debug, Clone, Default)]
struct MemoryTable {
    columns: Vec<ColumnInfo>,
    rows: Vec<RawRow>,
    /// Column groups whose combined values must be unique
    unique: Vec<Vec<String>>,
}

impl MemoryTable {
    fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c.name == column)
    }

    fn next_id(&self) -> Value {
        let integer_ids = self
            .columns
            .iter()
            .find(|c| c.name == ID_COLUMN)
            .map(|c| c.data_type.contains("int") || c.data_type.contains("serial"))
            .unwrap_or(false);

        if integer_ids {
            let max = self
                .rows
                .iter()
                .filter_map(|row| match row.get(ID_COLUMN) {
                    Some(Value::Int(i)) => Some(*i),
                    _ => None,
                })
                .max()
                .unwrap_or(0);
            Value::Int(max + 1)
        } else {
            Value::Text(generate_id())
        }
    }

    fn check_unique(&self, table: &str, candidate: &RawRow) -> EngineResult<()> {
        for group in &self.unique {
            let key = |row: &RawRow| {
                group
                    .iter()
                    .map(|column| row.get(column).and_then(Value::as_key))
                    .collect::<Vec<_>>()
            };
            let wanted = key(candidate);
            if self.rows.iter().any(|row| key(row) == wanted) {
                return Err(EngineError::Query(format!(
                    "duplicate key value violates unique constraint on {}({})",
                    table,
                    group.join(", ")
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, MemoryTable>,
    log: Vec<Operation>,
}

/// In-process backend that interprets statements by their [`Operation`].
///
/// Every statement it receives is recorded, including failed ones, so
/// callers can count exactly what was issued.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a table with `(name, type)` columns.
    pub fn create_table(&self, table: &str, columns: &[(&str, &str)]) {
        let mut state = self.state.lock();
        state.tables.insert(
            table.to_string(),
            MemoryTable {
                columns: columns
                    .iter()
                    .map(|(name, data_type)| ColumnInfo::new(name, data_type))
                    .collect(),
                ..Default::default()
            },
        );
    }

    /// Declare a two-column `left_id`/`right_id` pivot with a unique edge constraint.
    pub fn create_pivot(&self, pivot: &str) {
        self.create_table(pivot, &[(PIVOT_LEFT, "text"), (PIVOT_RIGHT, "text")]);
        self.add_unique(pivot, &[PIVOT_LEFT, PIVOT_RIGHT]);
    }

    pub fn add_unique(&self, table: &str, columns: &[&str]) {
        let mut state = self.state.lock();
        if let Some(t) = state.tables.get_mut(table) {
            t.unique.push(columns.iter().map(|c| c.to_string()).collect());
        }
    }

    /// Seed a row directly, bypassing the statement log.
    pub fn seed(&self, table: &str, row: RawRow) {
        let mut state = self.state.lock();
        if let Some(t) = state.tables.get_mut(table) {
            t.rows.push(row);
        }
    }

    pub fn drop_table(&self, table: &str) {
        self.state.lock().tables.remove(table);
    }

    /// Current rows of a table, in insertion order.
    pub fn rows(&self, table: &str) -> Vec<RawRow> {
        self.state
            .lock()
            .tables
            .get(table)
            .map(|t| t.rows.clone())
            .unwrap_or_default()
    }

    /// Every operation received since creation or the last `clear_log`.
    pub fn operations(&self) -> Vec<Operation> {
        self.state.lock().log.clone()
    }

    pub fn count_operations(&self, predicate: impl Fn(&Operation) -> bool) -> usize {
        self.state.lock().log.iter().filter(|op| predicate(op)).count()
    }

    pub fn clear_log(&self) {
        self.state.lock().log.clear();
    }

    fn run(&self, statement: &Statement) -> EngineResult<(Vec<RawRow>, u64)> {
        let mut state = self.state.lock();
        state.log.push(statement.operation().clone());

        let params = statement.params();
        let operation = statement.operation();
        let table_name = operation.table();

        if let Operation::Columns { .. } = operation {
            let rows = state
                .tables
                .get(table_name)
                .map(|t| {
                    t.columns
                        .iter()
                        .map(|c| {
                            [
                                ("column_name", Value::from(c.name.as_str())),
                                ("data_type", Value::from(c.data_type.as_str())),
                            ]
                            .into_iter()
                            .collect::<RawRow>()
                        })
                        .collect()
                })
                .unwrap_or_default();
            return Ok((rows, 0));
        }

        let table = state
            .tables
            .get_mut(table_name)
            .ok_or_else(|| EngineError::UnknownTable(table_name.to_string()))?;

        match operation {
            Operation::Columns { .. } => unreachable!("handled above"),
            Operation::SelectAll { .. } => Ok((table.rows.clone(), 0)),
            Operation::SelectById { columns, .. } => {
                let id = key_param(params, 0, ID_COLUMN);
                for column in columns {
                    if !table.has_column(column) {
                        return Err(unknown_column(table_name, column));
                    }
                }
                let rows = table
                    .rows
                    .iter()
                    .filter(|row| row.id_key() == id)
                    .map(|row| project(row, columns))
                    .collect();
                Ok((rows, 0))
            }
            Operation::SelectByIds { .. } => {
                let ids = key_set(params, ID_COLUMN);
                let rows = table
                    .rows
                    .iter()
                    .filter(|row| row.id_key().is_some_and(|id| ids.contains(&id)))
                    .cloned()
                    .collect();
                Ok((rows, 0))
            }
            Operation::SelectPivot { .. } => {
                let left_ids = key_set(params, PIVOT_LEFT);
                let columns = [PIVOT_LEFT.to_string(), PIVOT_RIGHT.to_string()];
                let rows = table
                    .rows
                    .iter()
                    .filter(|row| {
                        row.get(PIVOT_LEFT)
                            .and_then(Value::as_key)
                            .is_some_and(|left| left_ids.contains(&left))
                    })
                    .map(|row| project(row, &columns))
                    .collect();
                Ok((rows, 0))
            }
            Operation::Insert { columns, .. } => {
                let mut row = RawRow::new();
                for (column, value) in columns.iter().zip(params) {
                    if !table.has_column(column) {
                        return Err(unknown_column(table_name, column));
                    }
                    row.insert(column.as_str(), value.clone());
                }
                if row.get(ID_COLUMN).map_or(true, Value::is_null) {
                    row.insert(ID_COLUMN, table.next_id());
                }
                table.check_unique(table_name, &row)?;

                let mut returned = RawRow::new();
                returned.insert(ID_COLUMN, row.get(ID_COLUMN).cloned().unwrap_or(Value::Null));
                table.rows.push(row);
                Ok((vec![returned], 1))
            }
            Operation::Update { columns, .. } => {
                for column in columns {
                    if !table.has_column(column) {
                        return Err(unknown_column(table_name, column));
                    }
                }
                let id = key_param(params, columns.len(), ID_COLUMN);
                let mut affected = 0;
                for row in table.rows.iter_mut().filter(|row| row.id_key() == id) {
                    for (column, value) in columns.iter().zip(params) {
                        row.insert(column.as_str(), value.clone());
                    }
                    affected += 1;
                }
                Ok((Vec::new(), affected))
            }
            Operation::InsertEdge { .. } => {
                let row: RawRow = [
                    (PIVOT_LEFT, params.first().cloned().unwrap_or(Value::Null)),
                    (PIVOT_RIGHT, params.get(1).cloned().unwrap_or(Value::Null)),
                ]
                .into_iter()
                .collect();
                table.check_unique(table_name, &row)?;
                table.rows.push(row);
                Ok((Vec::new(), 1))
            }
            Operation::DeleteEdges { .. } => {
                let left = key_param(params, 0, PIVOT_LEFT);
                let before = table.rows.len();
                table
                    .rows
                    .retain(|row| row.get(PIVOT_LEFT).and_then(Value::as_key) != left);
                Ok((Vec::new(), (before - table.rows.len()) as u64))
            }
        }
    }

    fn snapshot(&self) -> HashMap<String, MemoryTable> {
        self.state.lock().tables.clone()
    }

    fn restore(&self, tables: HashMap<String, MemoryTable>) {
        self.state.lock().tables = tables;
    }
}

fn key_param(params: &[Value], index: usize, column: &str) -> Option<String> {
    params
        .get(index)
        .and_then(|param| bound_ids(param, column).into_iter().next())
}

fn key_set(params: &[Value], column: &str) -> HashSet<String> {
    params
        .first()
        .map(|param| bound_ids(param, column).into_iter().collect())
        .unwrap_or_default()
}

fn project(row: &RawRow, columns: &[String]) -> RawRow {
    if columns.is_empty() {
        return row.clone();
    }
    columns
        .iter()
        .map(|column| (column.clone(), row.get(column).cloned().unwrap_or(Value::Null)))
        .collect()
}

fn unknown_column(table: &str, column: &str) -> EngineError {
    EngineError::UnknownColumn {
        table: table.to_string(),
        column: column.to_string(),
    }
}

#[async_trait::async_trait]
impl Executor for MemoryStore {
    async fn fetch_all(&self, statement: &Statement) -> EngineResult<Vec<RawRow>> {
        self.run(statement).map(|(rows, _)| rows)
    }

    async fn execute(&self, statement: &Statement) -> EngineResult<u64> {
        self.run(statement).map(|(_, affected)| affected)
    }
}

/// Snapshot-based transaction: writes apply immediately and `rollback`
/// restores the tables as they were at `begin`. Not isolated from other callers.
#[derive(Debug)]
pub struct MemoryTransaction {
    store: MemoryStore,
    snapshot: HashMap<String, MemoryTable>,
}

#[async_trait::async_trait]
impl Executor for MemoryTransaction {
    async fn fetch_all(&self, statement: &Statement) -> EngineResult<Vec<RawRow>> {
        self.store.fetch_all(statement).await
    }

    async fn execute(&self, statement: &Statement) -> EngineResult<u64> {
        self.store.execute(statement).await
    }
}

#[async_trait::async_trait]
impl TransactionControl for MemoryTransaction {
    async fn commit(self) -> EngineResult<()> {
        Ok(())
    }

    async fn rollback(self) -> EngineResult<()> {
        self.store.restore(self.snapshot);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Transactional for MemoryStore {
    type Transaction = MemoryTransaction;

    async fn begin(&self) -> EngineResult<MemoryTransaction> {
        Ok(MemoryTransaction {
            store: self.clone(),
            snapshot: self.snapshot(),
        })
    }
}
