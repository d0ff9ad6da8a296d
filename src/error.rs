use thiserror::Error;

/// Errors surfaced by the relation engine and its storage backends.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The stored relation JSON could not be parsed.
    #[error("malformed relation schema: {0}")]
    MalformedRelationSchema(String),

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("unknown column '{column}' on table '{table}'")]
    UnknownColumn { table: String, column: String },

    /// Insert was called with no fields. Raised before any statement is issued.
    #[error("nothing to insert into '{table}'")]
    EmptyPayload { table: String },

    /// Some pivot edges were written before one failed. The written edges are kept.
    #[error("pivot '{pivot}' partially written ({inserted} edges kept): {source}")]
    PartialPivotWrite {
        pivot: String,
        inserted: usize,
        #[source]
        source: Box<EngineError>,
    },

    /// A read against the resolved table itself failed.
    #[error("failed to resolve rows of '{table}': {source}")]
    RelationResolution {
        table: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error("row '{id}' not found in '{table}'")]
    RowNotFound { table: String, id: String },

    /// Any other storage failure, carrying the driver message.
    #[error("query failed: {0}")]
    Query(String),
}

impl EngineError {
    pub fn resolution(table: &str, source: EngineError) -> Self {
        Self::RelationResolution {
            table: table.to_string(),
            source: Box::new(source),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedRelationSchema(err.to_string())
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
