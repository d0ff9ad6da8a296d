use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    Json as RequestJson,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::EngineError;
use crate::logic::{
    fetch_row, resolve_entity, update_entity, write_entity, EntityPayload, Resolved,
};
use crate::model::{Page, PageMenu, RawRow, RelationDescriptor, PAGES_TABLE};
use crate::store::traits::{Store, TransactionControl};

pub type AppState<S> = Arc<S>;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Simple health check endpoint
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

/// A page with every row of its table, relations materialized
#[derive(Debug, Serialize)]
pub struct PageDataResponse {
    pub id: String,
    pub name: String,
    pub schema: serde_json::Value,
    pub menus: Vec<PageMenu>,
    pub functions: serde_json::Value,
    pub conditions: serde_json::Value,
    pub relations: Vec<RelationDescriptor>,
    pub data: Vec<RawRow>,
}

/// A page with one materialized item
#[derive(Debug, Serialize)]
pub struct PageItemResponse {
    pub id: String,
    pub name: String,
    pub schema: serde_json::Value,
    pub menus: Vec<PageMenu>,
    pub functions: serde_json::Value,
    pub conditions: serde_json::Value,
    pub relations: Vec<RelationDescriptor>,
    pub item: RawRow,
}

#[derive(Debug, Serialize)]
pub struct WriteResponse {
    pub message: String,
    pub id: String,
}

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(ErrorResponse::new(message)))
}

/// Map engine errors to HTTP statuses
pub fn engine_error(err: EngineError) -> ApiError {
    let status = match &err {
        EngineError::RowNotFound { .. } | EngineError::UnknownTable(_) => StatusCode::NOT_FOUND,
        EngineError::EmptyPayload { .. }
        | EngineError::MalformedRelationSchema(_)
        | EngineError::UnknownColumn { .. } => StatusCode::BAD_REQUEST,
        EngineError::PartialPivotWrite { .. }
        | EngineError::RelationResolution { .. }
        | EngineError::Query(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    api_error(status, &err.to_string())
}

async fn load_page<S: Store>(store: &S, page_id: &str) -> Result<Page, ApiError> {
    let row = fetch_row(store, PAGES_TABLE, page_id)
        .await
        .map_err(|err| match err {
            EngineError::RowNotFound { .. } => api_error(StatusCode::NOT_FOUND, "Page not found"),
            other => engine_error(other),
        })?;

    Page::from_row(&row).map_err(engine_error)
}

fn payload_object(
    body: serde_json::Value,
) -> Result<serde_json::Map<String, serde_json::Value>, ApiError> {
    match body {
        serde_json::Value::Object(map) => Ok(map),
        _ => Err(api_error(
            StatusCode::BAD_REQUEST,
            "Request body must be a JSON object",
        )),
    }
}

pub async fn list_page<S: Store>(
    State(store): State<AppState<S>>,
    Path(page_id): Path<String>,
) -> Result<Json<PageDataResponse>, ApiError> {
    let page = load_page(store.as_ref(), &page_id).await?;

    let data = if page.is_deployed() {
        match resolve_entity(store.as_ref(), &page.table_name, &page.relations, None).await {
            Ok(Resolved::List(rows)) => rows,
            Ok(Resolved::Item(row)) => vec![row],
            Err(err) => return Err(engine_error(err)),
        }
    } else {
        Vec::new()
    };

    Ok(Json(PageDataResponse {
        id: page.id,
        name: page.name,
        schema: page.schema_ui,
        menus: page.menus,
        functions: page.functions,
        conditions: page.conditions,
        relations: page.relations,
        data,
    }))
}

pub async fn get_page_item<S: Store>(
    State(store): State<AppState<S>>,
    Path((page_id, item_id)): Path<(String, String)>,
) -> Result<Json<PageItemResponse>, ApiError> {
    let page = load_page(store.as_ref(), &page_id).await?;
    if !page.is_deployed() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "This page has no deployed table",
        ));
    }

    let resolved = resolve_entity(
        store.as_ref(),
        &page.table_name,
        &page.relations,
        Some(&item_id),
    )
    .await;

    let item = match resolved {
        Ok(Resolved::Item(row)) => row,
        Ok(Resolved::List(_)) => {
            return Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Expected a single item",
            ))
        }
        Err(EngineError::RowNotFound { .. }) => {
            return Err(api_error(StatusCode::NOT_FOUND, "Item not found"))
        }
        Err(err) => return Err(engine_error(err)),
    };

    Ok(Json(PageItemResponse {
        id: page.id,
        name: page.name,
        schema: page.schema_ui,
        menus: page.menus,
        functions: page.functions,
        conditions: page.conditions,
        relations: page.relations,
        item,
    }))
}

pub async fn create_page_item<S: Store>(
    State(store): State<AppState<S>>,
    Path(page_id): Path<String>,
    RequestJson(body): RequestJson<serde_json::Value>,
) -> Result<(StatusCode, Json<WriteResponse>), ApiError> {
    let page = load_page(store.as_ref(), &page_id).await?;
    if page.table_name.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Page has no table name"));
    }

    let payload = EntityPayload::from_json(&page.relations, payload_object(body)?);

    // Row and links are written together or not at all
    let tx = store.begin().await.map_err(engine_error)?;
    let written = write_entity(
        &tx,
        &page.table_name,
        &page.relations,
        &payload.fields,
        &payload.links,
    )
    .await;

    let new_id = match written {
        Ok(id) => id,
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                log::warn!("rollback failed: {}", rollback_err);
            }
            return Err(engine_error(err));
        }
    };
    tx.commit().await.map_err(engine_error)?;

    log::info!("created item {} in '{}'", new_id, page.table_name);

    Ok((
        StatusCode::CREATED,
        Json(WriteResponse {
            message: "Created".to_string(),
            id: new_id,
        }),
    ))
}

pub async fn update_page_item<S: Store>(
    State(store): State<AppState<S>>,
    Path((page_id, item_id)): Path<(String, String)>,
    RequestJson(body): RequestJson<serde_json::Value>,
) -> Result<Json<WriteResponse>, ApiError> {
    let page = load_page(store.as_ref(), &page_id).await?;
    if page.table_name.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Page has no table name"));
    }

    let payload = EntityPayload::from_json(&page.relations, payload_object(body)?);

    let tx = store.begin().await.map_err(engine_error)?;
    let result = update_entity(
        &tx,
        &page.table_name,
        &page.relations,
        &item_id,
        &payload.fields,
        &payload.links,
    )
    .await;

    match result {
        Ok(_) => {
            tx.commit().await.map_err(engine_error)?;
            Ok(Json(WriteResponse {
                message: "Updated".to_string(),
                id: item_id,
            }))
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                log::warn!("rollback failed: {}", rollback_err);
            }
            match err {
                EngineError::RowNotFound { .. } => {
                    Err(api_error(StatusCode::NOT_FOUND, "Item not found"))
                }
                other => Err(engine_error(other)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_statuses() {
        let (status, _) = engine_error(EngineError::EmptyPayload {
            table: "t".to_string(),
        });
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = engine_error(EngineError::UnknownTable("t".to_string()));
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, body) = engine_error(EngineError::Query("boom".to_string()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.0.error, "query failed: boom");
    }
}
