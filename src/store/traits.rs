use crate::error::EngineResult;
use crate::model::RawRow;
use crate::sql::{ColumnInfo, Statement};

/// Runs rendered statements against a row-oriented store.
///
/// This is the engine's only way to reach storage, so every query it issues
/// has gone through the statement constructors in [`crate::sql`].
#[async_trait::async_trait]
pub trait Executor: Send + Sync {
    /// Run a statement and return every row it produces.
    async fn fetch_all(&self, statement: &Statement) -> EngineResult<Vec<RawRow>>;

    /// Run a statement for its side effect and return the affected row count.
    async fn execute(&self, statement: &Statement) -> EngineResult<u64>;

    /// List a table's columns in ordinal position. Unknown tables yield an empty list.
    async fn table_columns(&self, table: &str) -> EngineResult<Vec<ColumnInfo>> {
        let rows = self.fetch_all(&Statement::columns(table)).await?;
        Ok(rows.iter().filter_map(ColumnInfo::from_catalog_row).collect())
    }
}

/// Ends a transaction started by [`Transactional::begin`].
#[async_trait::async_trait]
pub trait TransactionControl: Send + Sized {
    async fn commit(self) -> EngineResult<()>;
    async fn rollback(self) -> EngineResult<()>;
}

/// A store that lets callers group several statements atomically.
///
/// The engine never opens transactions itself; callers that need a multi-step
/// write to be atomic begin one here and pass it in as the executor.
#[async_trait::async_trait]
pub trait Transactional: Executor {
    type Transaction: Executor + TransactionControl;

    async fn begin(&self) -> EngineResult<Self::Transaction>;
}

/// Everything the HTTP layer needs from a backend.
pub trait Store: Transactional + 'static {}
impl<T: Transactional + 'static> Store for T {}
