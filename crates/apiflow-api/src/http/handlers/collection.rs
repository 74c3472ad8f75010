//! Collections, folders, endpoints and the ordered item tree.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde::Deserialize;

use apiflow_core::repository::CollectionRepository;
use apiflow_core::request;
use apiflow_infra::sqlite::Owned;
use apiflow_types::collection::{Collection, CollectionItem, Endpoint, Folder};
use apiflow_types::id::{CollectionId, CollectionItemId, EndpointId, FolderId, WorkspaceId};
use apiflow_types::overlay::MovePosition;

use super::{found, required_name};
use crate::http::error::AppError;
use crate::http::extractors::auth::Authenticated;
use crate::http::extractors::query::ItemListQuery;
use crate::http::response::{ApiResult, ok};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct NameBody {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct FolderBody {
    pub name: String,
    pub parent_id: Option<FolderId>,
}

#[derive(Debug, Deserialize)]
pub struct EndpointBody {
    pub name: Option<String>,
    pub method: Option<String>,
    pub url: Option<String>,
    pub folder_id: Option<FolderId>,
    /// Makes the endpoint a delta of another; empty method and URL are then
    /// inherited from the parent.
    pub delta_parent_id: Option<EndpointId>,
}

#[derive(Debug, Deserialize)]
pub struct MoveBody<T> {
    pub target_id: T,
    pub position: MovePosition,
}

/// The folder must exist and sit in `collection_id`.
async fn folder_in(state: &AppState, collection_id: &CollectionId, folder_id: &FolderId) -> Result<Folder, AppError> {
    let folder = found(state.collections.get_folder(folder_id).await?, format!("folder {folder_id}"))?;
    if folder.collection_id != *collection_id {
        return Err(AppError::Validation(format!(
            "folder {folder_id} belongs to another collection"
        )));
    }
    Ok(folder)
}

fn normalize_method(method: &str) -> Result<String, AppError> {
    request::normalize_method(method).map_err(|e| AppError::Validation(e.message))
}

/// GET /api/v1/workspaces/{id}/collections
pub async fn list_collections(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<WorkspaceId>,
) -> ApiResult<Vec<Collection>> {
    let start = Instant::now();
    auth.require(&state, Owned::Workspace(id)).await?;
    Ok(ok(state.collections.list_collections(&id).await?, start))
}

/// POST /api/v1/workspaces/{id}/collections
pub async fn create_collection(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<WorkspaceId>,
    Json(body): Json<NameBody>,
) -> ApiResult<Collection> {
    let start = Instant::now();
    auth.require(&state, Owned::Workspace(id)).await?;
    let collection = Collection {
        id: CollectionId::new(),
        workspace_id: id,
        name: required_name(&body.name, "collection")?,
        created_at: Utc::now(),
    };
    Ok(ok(state.collections.create_collection(&collection).await?, start))
}

/// PUT /api/v1/collections/{id}
pub async fn update_collection(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<CollectionId>,
    Json(body): Json<NameBody>,
) -> ApiResult<Collection> {
    let start = Instant::now();
    auth.require(&state, Owned::Collection(id)).await?;
    let mut collection = found(state.collections.get_collection(&id).await?, format!("collection {id}"))?;
    collection.name = required_name(&body.name, "collection")?;
    Ok(ok(state.collections.update_collection(&collection).await?, start))
}

/// DELETE /api/v1/collections/{id}
pub async fn delete_collection(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<CollectionId>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require(&state, Owned::Collection(id)).await?;
    state.collections.delete_collection(&id).await?;
    Ok(ok(serde_json::json!({ "deleted": true, "id": id }), start))
}

/// GET /api/v1/collections/{id}/items?parent_id=
pub async fn list_items(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<CollectionId>,
    Query(query): Query<ItemListQuery>,
) -> ApiResult<Vec<CollectionItem>> {
    let start = Instant::now();
    auth.require(&state, Owned::Collection(id)).await?;
    if let Some(parent) = &query.parent_id {
        folder_in(&state, &id, parent).await?;
    }
    Ok(ok(state.collections.list_items(&id, query.parent_id).await?, start))
}

/// POST /api/v1/items/{id}/move
pub async fn move_item(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<CollectionItemId>,
    Json(body): Json<MoveBody<CollectionItemId>>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    let workspace_id = auth.require(&state, Owned::CollectionItem(id)).await?;
    let target_ws = state.ownership.workspace_of(Owned::CollectionItem(body.target_id)).await?;
    if target_ws != workspace_id {
        return Err(AppError::Validation("move target belongs to another workspace".into()));
    }
    state.collections.move_item(&id, &body.target_id, body.position).await?;
    Ok(ok(serde_json::json!({ "moved": true, "id": id }), start))
}

/// POST /api/v1/collections/{id}/folders
pub async fn create_folder(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<CollectionId>,
    Json(body): Json<FolderBody>,
) -> ApiResult<Folder> {
    let start = Instant::now();
    auth.require(&state, Owned::Collection(id)).await?;
    if let Some(parent) = &body.parent_id {
        folder_in(&state, &id, parent).await?;
    }
    let folder = Folder {
        id: FolderId::new(),
        collection_id: id,
        parent_id: body.parent_id,
        name: required_name(&body.name, "folder")?,
    };
    Ok(ok(state.collections.create_folder(&folder).await?, start))
}

/// PUT /api/v1/folders/{id}
pub async fn update_folder(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<FolderId>,
    Json(body): Json<NameBody>,
) -> ApiResult<Folder> {
    let start = Instant::now();
    auth.require(&state, Owned::Folder(id)).await?;
    let mut folder = found(state.collections.get_folder(&id).await?, format!("folder {id}"))?;
    folder.name = required_name(&body.name, "folder")?;
    Ok(ok(state.collections.update_folder(&folder).await?, start))
}

/// DELETE /api/v1/folders/{id}
pub async fn delete_folder(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<FolderId>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require(&state, Owned::Folder(id)).await?;
    state.collections.delete_folder(&id).await?;
    Ok(ok(serde_json::json!({ "deleted": true, "id": id }), start))
}

/// GET /api/v1/collections/{id}/endpoints
pub async fn list_endpoints(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<CollectionId>,
) -> ApiResult<Vec<Endpoint>> {
    let start = Instant::now();
    auth.require(&state, Owned::Collection(id)).await?;
    Ok(ok(state.collections.list_endpoints(&id).await?, start))
}

/// POST /api/v1/collections/{id}/endpoints
pub async fn create_endpoint(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<CollectionId>,
    Json(body): Json<EndpointBody>,
) -> ApiResult<Endpoint> {
    let start = Instant::now();
    let workspace_id = auth.require(&state, Owned::Collection(id)).await?;
    if let Some(folder) = &body.folder_id {
        folder_in(&state, &id, folder).await?;
    }
    if let Some(parent) = body.delta_parent_id {
        if state.ownership.workspace_of(Owned::Endpoint(parent)).await? != workspace_id {
            return Err(AppError::Validation("delta parent belongs to another workspace".into()));
        }
    }
    let method = body.method.as_deref().map(normalize_method).transpose()?.unwrap_or_default();
    let url = body.url.unwrap_or_default();
    if body.delta_parent_id.is_none() && method.is_empty() {
        return Err(AppError::Validation("endpoint method cannot be empty".into()));
    }
    let endpoint = Endpoint {
        id: EndpointId::new(),
        collection_id: id,
        folder_id: body.folder_id,
        name: required_name(body.name.as_deref().unwrap_or_default(), "endpoint")?,
        method,
        url,
        delta_parent_id: body.delta_parent_id,
        created_at: Utc::now(),
    };
    let endpoint = state.collections.create_endpoint(&endpoint).await?;
    let href = format!("/api/v1/endpoints/{}", endpoint.id);
    let Json(resp) = ok(endpoint, start);
    Ok(Json(resp.with_link("self", &href).with_link("examples", &format!("{href}/examples"))))
}

/// GET /api/v1/endpoints/{id}
pub async fn get_endpoint(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<EndpointId>,
) -> ApiResult<Endpoint> {
    let start = Instant::now();
    auth.require(&state, Owned::Endpoint(id)).await?;
    Ok(ok(found(state.collections.get_endpoint(&id).await?, format!("endpoint {id}"))?, start))
}

/// PUT /api/v1/endpoints/{id}
pub async fn update_endpoint(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<EndpointId>,
    Json(body): Json<EndpointBody>,
) -> ApiResult<Endpoint> {
    let start = Instant::now();
    auth.require(&state, Owned::Endpoint(id)).await?;
    let mut endpoint = found(state.collections.get_endpoint(&id).await?, format!("endpoint {id}"))?;
    if let Some(name) = body.name {
        endpoint.name = required_name(&name, "endpoint")?;
    }
    if let Some(method) = body.method {
        endpoint.method = normalize_method(&method)?;
    }
    if let Some(url) = body.url {
        endpoint.url = url;
    }
    if endpoint.delta_parent_id.is_none() && endpoint.method.is_empty() {
        return Err(AppError::Validation("endpoint method cannot be empty".into()));
    }
    Ok(ok(state.collections.update_endpoint(&endpoint).await?, start))
}

/// DELETE /api/v1/endpoints/{id}
pub async fn delete_endpoint(
    State(state): State<AppState>,
    auth: Authenticated,
    Path(id): Path<EndpointId>,
) -> ApiResult<serde_json::Value> {
    let start = Instant::now();
    auth.require(&state, Owned::Endpoint(id)).await?;
    state.collections.delete_endpoint(&id).await?;
    Ok(ok(serde_json::json!({ "deleted": true, "id": id }), start))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn methods_are_upper_cased_http_tokens() {
        assert_eq!(normalize_method(" post ").unwrap(), "POST");
        assert_eq!(normalize_method("").unwrap(), "");
        let err = normalize_method("GET;RM -RF ~").unwrap_err();
        assert!(matches!(err, AppError::Validation(ref msg) if msg.contains("invalid HTTP method")), "{err}");
    }

    #[test]
    fn move_body_reads_wire_positions() {
        let body: MoveBody<CollectionItemId> = serde_json::from_value(serde_json::json!({
            "target_id": CollectionItemId::new(),
            "position": "before",
        }))
        .unwrap();
        assert_eq!(body.position, MovePosition::Before);
    }
}
