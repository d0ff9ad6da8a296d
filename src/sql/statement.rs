use crate::model::{RawRow, Value};
use crate::sql::Ident;
use itertools::Itertools;

pub const ID_COLUMN: &str = "id";
pub const PIVOT_LEFT: &str = "left_id";
pub const PIVOT_RIGHT: &str = "right_id";

const COLUMNS_QUERY: &str = "SELECT a.attname::text AS column_name, \
    pg_catalog.format_type(a.atttypid, a.atttypmod) AS data_type \
    FROM pg_catalog.pg_attribute a \
    JOIN pg_catalog.pg_class c ON c.oid = a.attrelid \
    WHERE c.relname::text = $1 AND pg_catalog.pg_table_is_visible(c.oid) \
    AND a.attnum > 0 AND NOT a.attisdropped \
    ORDER BY a.attnum";

/// A column as reported by catalog introspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Catalog type name, e.g. `uuid` or `character varying(255)`
    pub data_type: String,
}

impl ColumnInfo {
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
        }
    }

    /// Read one row returned by a `Columns` statement.
    pub fn from_catalog_row(row: &RawRow) -> Option<Self> {
        let name = row.get("column_name").and_then(Value::as_str)?;
        let data_type = row
            .get("data_type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        Some(Self::new(name, data_type))
    }

    // Type names come from the catalog, but are still restricted to the
    // characters format_type can produce before being spliced into a CAST.
    fn cast_type(&self) -> Option<&str> {
        let allowed = |c: char| c.is_ascii_alphanumeric() || " _()[],.\"".contains(c);
        if !self.data_type.is_empty() && self.data_type.chars().all(allowed) {
            Some(&self.data_type)
        } else {
            None
        }
    }

    fn placeholder(&self, position: usize) -> String {
        match self.cast_type() {
            Some(data_type) => format!("CAST(${} AS {})", position, data_type),
            None => format!("${}", position),
        }
    }
}

/// What a statement does, independent of its SQL rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    /// List a table's columns in ordinal position
    Columns { table: String },
    SelectAll { table: String },
    SelectById { table: String, columns: Vec<String> },
    SelectByIds { table: String },
    SelectPivot { pivot: String },
    /// Insert returning the new `id`
    Insert { table: String, columns: Vec<String> },
    Update { table: String, columns: Vec<String> },
    InsertEdge { pivot: String },
    DeleteEdges { pivot: String },
}

impl Operation {
    /// The table or pivot the statement targets.
    pub fn table(&self) -> &str {
        match self {
            Operation::Columns { table }
            | Operation::SelectAll { table }
            | Operation::SelectById { table, .. }
            | Operation::SelectByIds { table }
            | Operation::Insert { table, .. }
            | Operation::Update { table, .. } => table,
            Operation::SelectPivot { pivot }
            | Operation::InsertEdge { pivot }
            | Operation::DeleteEdges { pivot } => pivot,
        }
    }
}

/// A fully rendered, parameterized statement.
///
/// Statements can only be built through the constructors below, which quote
/// every table and column name and bind every value.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    operation: Operation,
    sql: String,
    params: Vec<Value>,
}

impl Statement {
    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Catalog lookup of a table's columns. The table name is bound, not quoted.
    pub fn columns(table: &str) -> Self {
        Self {
            operation: Operation::Columns {
                table: table.to_string(),
            },
            sql: COLUMNS_QUERY.to_string(),
            params: vec![Value::from(table)],
        }
    }

    pub fn select_all(table: &str) -> Self {
        Self {
            operation: Operation::SelectAll {
                table: table.to_string(),
            },
            sql: format!("SELECT * FROM {}", Ident::new(table)),
            params: Vec::new(),
        }
    }

    /// Select one row by id, listing columns explicitly so they come back in the given order.
    pub fn select_by_id(table: &str, columns: &[String], id: &str) -> Self {
        let projection = if columns.is_empty() {
            "*".to_string()
        } else {
            columns.iter().map(|c| Ident::new(c)).join(", ")
        };

        Self {
            operation: Operation::SelectById {
                table: table.to_string(),
                columns: columns.to_vec(),
            },
            sql: format!(
                "SELECT {} FROM {} WHERE {}",
                projection,
                Ident::new(table),
                id_match(table, ID_COLUMN, 1)
            ),
            params: vec![id_records(ID_COLUMN, [id])],
        }
    }

    /// Select every row whose id is in `ids`. The whole list is one bound parameter.
    pub fn select_by_ids(table: &str, ids: &[String]) -> Self {
        Self {
            operation: Operation::SelectByIds {
                table: table.to_string(),
            },
            sql: format!(
                "SELECT * FROM {} WHERE {}",
                Ident::new(table),
                id_match(table, ID_COLUMN, 1)
            ),
            params: vec![id_records(ID_COLUMN, ids.iter().map(String::as_str))],
        }
    }

    pub fn select_pivot(pivot: &str, left_ids: &[String]) -> Self {
        Self {
            operation: Operation::SelectPivot {
                pivot: pivot.to_string(),
            },
            sql: format!(
                "SELECT {}, {} FROM {} WHERE {}",
                Ident::new(PIVOT_LEFT),
                Ident::new(PIVOT_RIGHT),
                Ident::new(pivot),
                id_match(pivot, PIVOT_LEFT, 1)
            ),
            params: vec![id_records(PIVOT_LEFT, left_ids.iter().map(String::as_str))],
        }
    }

    pub fn insert(table: &str, fields: Vec<(ColumnInfo, Value)>) -> Self {
        let columns = fields.iter().map(|(column, _)| column.name.clone()).collect_vec();
        let values = fields
            .iter()
            .enumerate()
            .map(|(i, (column, _))| column.placeholder(i + 1))
            .join(", ");

        Self {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
                Ident::new(table),
                columns.iter().map(|c| Ident::new(c)).join(", "),
                values,
                Ident::new(ID_COLUMN)
            ),
            operation: Operation::Insert {
                table: table.to_string(),
                columns,
            },
            params: fields.into_iter().map(|(_, value)| value).collect(),
        }
    }

    pub fn update(table: &str, id: &str, fields: Vec<(ColumnInfo, Value)>) -> Self {
        let columns = fields.iter().map(|(column, _)| column.name.clone()).collect_vec();
        let sets = fields
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = {}", Ident::new(&column.name), column.placeholder(i + 1)))
            .join(", ");

        let mut params = fields.into_iter().map(|(_, value)| value).collect_vec();
        params.push(id_records(ID_COLUMN, [id]));

        Self {
            sql: format!(
                "UPDATE {} SET {} WHERE {}",
                Ident::new(table),
                sets,
                id_match(table, ID_COLUMN, params.len())
            ),
            operation: Operation::Update {
                table: table.to_string(),
                columns,
            },
            params,
        }
    }

    pub fn insert_edge(
        pivot: &str,
        left: &ColumnInfo,
        right: &ColumnInfo,
        left_id: &str,
        right_id: &str,
    ) -> Self {
        Self {
            operation: Operation::InsertEdge {
                pivot: pivot.to_string(),
            },
            sql: format!(
                "INSERT INTO {} ({}, {}) VALUES ({}, {})",
                Ident::new(pivot),
                Ident::new(PIVOT_LEFT),
                Ident::new(PIVOT_RIGHT),
                left.placeholder(1),
                right.placeholder(2)
            ),
            params: vec![Value::from(left_id), Value::from(right_id)],
        }
    }

    pub fn delete_edges(pivot: &str, left_id: &str) -> Self {
        Self {
            operation: Operation::DeleteEdges {
                pivot: pivot.to_string(),
            },
            sql: format!(
                "DELETE FROM {} WHERE {}",
                Ident::new(pivot),
                id_match(pivot, PIVOT_LEFT, 1)
            ),
            params: vec![id_records(PIVOT_LEFT, [left_id])],
        }
    }
}

/// Match `column` against the ids bound at `position`.
///
/// The parameter is a jsonb array of `{column: id}` records. Postgres coerces
/// each record through the table's own row type, so the column is compared
/// bare against values of its own type (index-usable, whatever that type is)
/// and any number of ids travels as a single parameter.
fn id_match(table: &str, column: &str, position: usize) -> String {
    let column = Ident::new(column);
    format!(
        "{} = ANY(ARRAY(SELECT k.{} FROM jsonb_populate_recordset(NULL::{}, ${}) AS k))",
        column,
        column,
        Ident::new(table),
        position
    )
}

/// Bind value read by [`id_match`].
fn id_records<'a>(column: &str, ids: impl IntoIterator<Item = &'a str>) -> Value {
    let records = ids
        .into_iter()
        .map(|id| {
            let mut record = serde_json::Map::new();
            record.insert(column.to_string(), serde_json::Value::from(id));
            serde_json::Value::Object(record)
        })
        .collect();
    Value::Json(serde_json::Value::Array(records))
}

/// Ids carried by a parameter built for [`id_match`].
pub fn bound_ids(param: &Value, column: &str) -> Vec<String> {
    match param {
        Value::Json(serde_json::Value::Array(records)) => records
            .iter()
            .filter_map(|record| record.get(column))
            .filter_map(|id| Value::from(id.clone()).as_key())
            .collect(),
        _ => Vec::new(),
    }
}
