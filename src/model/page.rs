use crate::error::{EngineError, EngineResult};
use crate::model::{parse_relations, RawRow, RelationDescriptor, Value};
use serde::Serialize;

/// Table holding page definitions.
pub const PAGES_TABLE: &str = "pages";

/// A page: a runtime-declared table plus its deployed relation and UI schemas.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub name: String,
    pub table_name: String,
    pub deploy: bool,
    #[serde(skip)]
    pub relations: Vec<RelationDescriptor>,
    pub schema_ui: serde_json::Value,
    pub menus: Vec<PageMenu>,
    /// Deployed function definitions, passed through as stored
    pub functions: serde_json::Value,
    /// Deployed condition definitions, passed through as stored
    pub conditions: serde_json::Value,
}

/// One navigation entry of a page's deployed menu schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMenu {
    pub name: serde_json::Value,
    pub order: serde_json::Value,
    /// Always a string, whatever the stored type
    pub ref_id: String,
}

impl PageMenu {
    fn from_json(entry: &serde_json::Value) -> Self {
        let field = |key: &str| entry.get(key).cloned().unwrap_or(serde_json::Value::Null);
        let ref_id = match entry.get("refId") {
            None | Some(serde_json::Value::Null) => String::new(),
            Some(serde_json::Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        };

        Self {
            name: field("name"),
            order: field("order"),
            ref_id,
        }
    }
}

impl Page {
    /// Whether the page has a live table that items can be read from.
    pub fn is_deployed(&self) -> bool {
        self.deploy && !self.table_name.is_empty()
    }

    /// Build a page from its row in the `pages` table.
    pub fn from_row(row: &RawRow) -> EngineResult<Self> {
        let id = row.id_key().ok_or_else(|| EngineError::UnknownColumn {
            table: PAGES_TABLE.to_string(),
            column: "id".to_string(),
        })?;

        let relations_json = row
            .get("schema_relations_deployed")
            .map(Value::to_json)
            .map(decode_embedded_json)
            .transpose()?;

        let schema_ui = match row.get("schema_ui_deployed").map(Value::to_json) {
            None | Some(serde_json::Value::Null) => serde_json::Value::Array(Vec::new()),
            Some(json) => decode_embedded_json(json)?,
        };

        let menus = match json_column(row, "schema_menu_ui_deployed") {
            serde_json::Value::Array(entries) => entries.iter().map(PageMenu::from_json).collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            id,
            name: text_column(row, "name"),
            table_name: text_column(row, "table_name"),
            deploy: row.get("deploy").and_then(Value::as_bool).unwrap_or(false),
            relations: parse_relations(relations_json.as_ref())?,
            schema_ui,
            menus,
            functions: json_column(row, "schema_functions_deployed"),
            conditions: json_column(row, "schema_conditions_deployed"),
        })
    }
}

fn text_column(row: &RawRow, column: &str) -> String {
    row.get(column)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

// Display schemas are optional: unreadable content is dropped, not fatal
fn json_column(row: &RawRow, column: &str) -> serde_json::Value {
    let Some(json) = row.get(column).map(Value::to_json) else {
        return serde_json::Value::Null;
    };
    decode_embedded_json(json).unwrap_or_else(|err| {
        log::warn!("ignoring unreadable '{}' on page: {}", column, err);
        serde_json::Value::Null
    })
}

// json columns sometimes hold the document as a JSON string
fn decode_embedded_json(json: serde_json::Value) -> EngineResult<serde_json::Value> {
    match json {
        serde_json::Value::String(text) if text.trim().is_empty() => Ok(serde_json::Value::Null),
        serde_json::Value::String(text) => Ok(serde_json::from_str(&text)?),
        other => Ok(other),
    }
}
