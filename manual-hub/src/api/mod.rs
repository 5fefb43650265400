//! HTTP API layer exposing workspace, category, document and version
//! endpoints. Handlers resolve the caller, check the required role, act, and
//! publish an event; block and version writes go through the mutation
//! service, never the store primitives.

use axum::{
    extract::{FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use manual_hub_core::access::{self, Scope};
use manual_hub_core::auth::TokenVerifier;
use manual_hub_core::error::HubError;
use manual_hub_core::events::{Event, EventBus};
use manual_hub_core::mutation::{DocumentMutationService, DocumentWithBlocks};
use manual_hub_core::storage::{
    Block, BlockInput, BlockType, Document, DocumentStatus, FileMeta, HubStore, Role, Visibility,
    Workspace, WorkspaceStatus,
};
use manual_hub_core::versioning::VersionMeta;

/// Authentication context extracted from request headers.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user_id: String,
}

impl FromRequestParts<AppState> for AuthContext {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        if let Some(auth) = headers.get("Authorization").and_then(|v| v.to_str().ok()) {
            if let Some(token) = auth.strip_prefix("Bearer ") {
                if let Some(claims) = state.verifier.verify(token).await {
                    return Ok(Self {
                        user_id: claims.sub,
                    });
                }
            }
        }
        if let Some(user_id) = headers.get("X-User-Id").and_then(|v| v.to_str().ok()) {
            return Ok(Self {
                user_id: user_id.to_string(),
            });
        }
        Err(StatusCode::UNAUTHORIZED)
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<RwLock<HubStore>>,
    pub mutations: DocumentMutationService,
    pub events: EventBus,
    pub verifier: Arc<dyn TokenVerifier>,
}

#[derive(Deserialize)]
struct WorkspaceRequest {
    name: String,
}

#[derive(Serialize)]
struct WorkspaceResponse {
    id: Uuid,
    name: String,
    owner: String,
    status: WorkspaceStatus,
    created_at: DateTime<Utc>,
}

impl From<&Workspace> for WorkspaceResponse {
    fn from(w: &Workspace) -> Self {
        Self {
            id: w.id,
            name: w.name.clone(),
            owner: w.owner.clone(),
            status: w.status,
            created_at: w.created_at,
        }
    }
}

#[derive(Deserialize)]
struct MemberRequest {
    user: String,
    role: String,
}

#[derive(Deserialize)]
struct CategoryRequest {
    name: String,
    #[serde(default)]
    position: Option<i64>,
}

#[derive(Serialize)]
struct CategoryResponse {
    id: Uuid,
    workspace_id: Uuid,
    name: String,
    position: i64,
}

#[derive(Deserialize)]
struct DocumentCreateRequest {
    title: String,
    #[serde(default)]
    status: Option<DocumentStatus>,
    #[serde(default)]
    visibility: Option<Visibility>,
}

#[derive(Deserialize)]
struct SaveBlocksRequest {
    blocks: Vec<BlockInput>,
    #[serde(default)]
    create_version: bool,
}

#[derive(Serialize)]
struct BlockResponse {
    id: Uuid,
    block_type: BlockType,
    content: String,
    metadata: Option<FileMeta>,
    sort_order: u32,
}

impl From<&Block> for BlockResponse {
    fn from(b: &Block) -> Self {
        Self {
            id: b.id,
            block_type: b.block_type,
            content: b.content.clone(),
            metadata: b.metadata.clone(),
            sort_order: b.sort_order,
        }
    }
}

#[derive(Serialize)]
struct DocumentSummary {
    id: Uuid,
    category_id: Uuid,
    title: String,
    status: DocumentStatus,
    visibility: Visibility,
    updated_at: DateTime<Utc>,
}

impl From<&Document> for DocumentSummary {
    fn from(d: &Document) -> Self {
        Self {
            id: d.id,
            category_id: d.category_id,
            title: d.title.clone(),
            status: d.status,
            visibility: d.visibility,
            updated_at: d.updated_at,
        }
    }
}

#[derive(Serialize)]
struct DocumentResponse {
    id: Uuid,
    category_id: Uuid,
    title: String,
    status: DocumentStatus,
    visibility: Visibility,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    blocks: Vec<BlockResponse>,
}

impl From<DocumentWithBlocks> for DocumentResponse {
    fn from(d: DocumentWithBlocks) -> Self {
        Self {
            id: d.document.id,
            category_id: d.document.category_id,
            title: d.document.title,
            status: d.document.status,
            visibility: d.document.visibility,
            created_at: d.document.created_at,
            updated_at: d.document.updated_at,
            blocks: d.blocks.iter().map(BlockResponse::from).collect(),
        }
    }
}

#[derive(Serialize)]
struct RestoreResponse {
    message: String,
}

pub fn router(
    store: Arc<RwLock<HubStore>>,
    events: EventBus,
    verifier: Arc<dyn TokenVerifier>,
) -> Router {
    let app_state = AppState {
        mutations: DocumentMutationService::new(store.clone(), events.clone()),
        store,
        events,
        verifier,
    };
    Router::new()
        .route("/workspaces", post(create_workspace).get(list_workspaces))
        .route("/workspaces/{id}", get(get_workspace))
        .route("/workspaces/{id}/members", put(upsert_member))
        .route("/workspaces/{id}/members/{user}", delete(remove_member))
        .route(
            "/workspaces/{id}/categories",
            post(create_category).get(list_categories),
        )
        .route("/categories/{id}", delete(delete_category))
        .route(
            "/categories/{id}/documents",
            post(create_document).get(list_documents),
        )
        .route("/documents/{id}", get(get_document).delete(delete_document))
        .route("/documents/{id}/blocks", put(save_blocks))
        .route("/documents/{id}/versions", get(list_versions))
        .route(
            "/documents/{id}/restore/{version_id}",
            post(restore_version),
        )
        .with_state(app_state)
}

fn error_status(err: HubError) -> StatusCode {
    match &err {
        HubError::Forbidden => StatusCode::FORBIDDEN,
        HubError::NotFound(_) => StatusCode::NOT_FOUND,
        HubError::Validation(_) => StatusCode::BAD_REQUEST,
        HubError::Conflict(_) => StatusCode::CONFLICT,
        HubError::Internal(detail) => {
            tracing::warn!(%detail, "request failed with internal error");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// 403 unless the user's resolved role meets `required`; 404 for a missing
/// scope.
fn require(store: &HubStore, user: &str, scope: Scope, required: Role) -> Result<(), StatusCode> {
    match access::has_access(store, user, scope, required) {
        Ok(true) => Ok(()),
        Ok(false) => Err(StatusCode::FORBIDDEN),
        Err(err) => Err(error_status(err)),
    }
}

async fn create_workspace(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<WorkspaceRequest>,
) -> Result<Json<WorkspaceResponse>, StatusCode> {
    let mut store = state.store.write().await;
    let id = store
        .create_workspace(req.name, auth.user_id)
        .map_err(error_status)?;
    let resp = store
        .workspace(id)
        .map(WorkspaceResponse::from)
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    drop(store);
    state.events.send(Event::WorkspaceCreated { id });
    Ok(Json(resp))
}

async fn list_workspaces(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Json<Vec<WorkspaceResponse>> {
    let store = state.store.read().await;
    Json(
        store
            .workspaces_for(&auth.user_id)
            .into_iter()
            .map(WorkspaceResponse::from)
            .collect(),
    )
}

async fn get_workspace(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkspaceResponse>, StatusCode> {
    let store = state.store.read().await;
    require(&store, &auth.user_id, Scope::Workspace(id), Role::Viewer)?;
    store
        .workspace(id)
        .map(|w| Json(WorkspaceResponse::from(w)))
        .ok_or(StatusCode::NOT_FOUND)
}

async fn upsert_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<MemberRequest>,
) -> StatusCode {
    let Some(role) = Role::parse(&req.role) else {
        return StatusCode::BAD_REQUEST;
    };
    let mut store = state.store.write().await;
    if let Err(status) = require(&store, &auth.user_id, Scope::Workspace(id), Role::Admin) {
        return status;
    }
    match store.set_member(id, req.user.clone(), role) {
        Ok(()) => {
            drop(store);
            state.events.send(Event::MemberInvited {
                workspace: id,
                user: req.user,
            });
            StatusCode::NO_CONTENT
        }
        Err(err) => error_status(err),
    }
}

async fn remove_member(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((id, user)): Path<(Uuid, String)>,
) -> StatusCode {
    let mut store = state.store.write().await;
    if let Err(status) = require(&store, &auth.user_id, Scope::Workspace(id), Role::Admin) {
        return status;
    }
    match store.remove_member(id, &user) {
        Ok(()) => {
            drop(store);
            state.events.send(Event::MemberRemoved {
                workspace: id,
                user,
            });
            StatusCode::NO_CONTENT
        }
        Err(err) => error_status(err),
    }
}

async fn create_category(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<CategoryRequest>,
) -> Result<Json<CategoryResponse>, StatusCode> {
    let mut store = state.store.write().await;
    require(&store, &auth.user_id, Scope::Workspace(id), Role::Editor)?;
    let category_id = store
        .create_category(id, req.name, req.position)
        .map_err(error_status)?;
    let resp = store
        .category(category_id)
        .map(|c| CategoryResponse {
            id: c.id,
            workspace_id: c.workspace_id,
            name: c.name.clone(),
            position: c.position,
        })
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    drop(store);
    state.events.send(Event::CategoryCreated { id: category_id });
    Ok(Json(resp))
}

async fn list_categories(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<CategoryResponse>>, StatusCode> {
    let store = state.store.read().await;
    require(&store, &auth.user_id, Scope::Workspace(id), Role::Viewer)?;
    Ok(Json(
        store
            .categories_in(id)
            .into_iter()
            .map(|c| CategoryResponse {
                id: c.id,
                workspace_id: c.workspace_id,
                name: c.name.clone(),
                position: c.position,
            })
            .collect(),
    ))
}

async fn delete_category(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> StatusCode {
    let mut store = state.store.write().await;
    if let Err(status) = require(&store, &auth.user_id, Scope::Category(id), Role::Editor) {
        return status;
    }
    match store.delete_category(id) {
        Ok(()) => {
            drop(store);
            state.events.send(Event::CategoryDeleted { id });
            StatusCode::NO_CONTENT
        }
        Err(err) => error_status(err),
    }
}

async fn create_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<DocumentCreateRequest>,
) -> Result<Json<DocumentSummary>, StatusCode> {
    let mut store = state.store.write().await;
    require(&store, &auth.user_id, Scope::Category(id), Role::Writer)?;
    let document_id = store
        .create_document(
            id,
            req.title,
            req.status.unwrap_or(DocumentStatus::Draft),
            req.visibility.unwrap_or(Visibility::Workspace),
        )
        .map_err(error_status)?;
    let resp = store
        .document(document_id)
        .map(DocumentSummary::from)
        .ok_or(StatusCode::INTERNAL_SERVER_ERROR)?;
    drop(store);
    state.events.send(Event::DocumentCreated { id: document_id });
    Ok(Json(resp))
}

async fn list_documents(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<DocumentSummary>>, StatusCode> {
    let store = state.store.read().await;
    require(&store, &auth.user_id, Scope::Category(id), Role::Viewer)?;
    Ok(Json(
        store
            .documents_in(id)
            .into_iter()
            .map(DocumentSummary::from)
            .collect(),
    ))
}

async fn get_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentResponse>, StatusCode> {
    match state.mutations.document_with_blocks(&auth.user_id, id).await {
        Ok(doc) => Ok(Json(DocumentResponse::from(doc))),
        Err(err) => Err(error_status(err)),
    }
}

async fn delete_document(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> StatusCode {
    let mut store = state.store.write().await;
    if let Err(status) = require(&store, &auth.user_id, Scope::Document(id), Role::Editor) {
        return status;
    }
    match store.delete_document(id) {
        Ok(()) => {
            drop(store);
            state.events.send(Event::DocumentDeleted { id });
            StatusCode::NO_CONTENT
        }
        Err(err) => error_status(err),
    }
}

async fn save_blocks(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(req): Json<SaveBlocksRequest>,
) -> Result<Json<DocumentResponse>, StatusCode> {
    match state
        .mutations
        .save_blocks(&auth.user_id, id, req.blocks, req.create_version)
        .await
    {
        Ok(saved) => Ok(Json(DocumentResponse::from(saved))),
        Err(err) => Err(error_status(err)),
    }
}

async fn list_versions(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<VersionMeta>>, StatusCode> {
    match state.mutations.list_versions(&auth.user_id, id).await {
        Ok(versions) => Ok(Json(versions)),
        Err(err) => Err(error_status(err)),
    }
}

async fn restore_version(
    State(state): State<AppState>,
    auth: AuthContext,
    Path((id, version_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<RestoreResponse>, StatusCode> {
    match state
        .mutations
        .restore_version(&auth.user_id, id, version_id)
        .await
    {
        Ok(number) => Ok(Json(RestoreResponse {
            message: format!("restored version {number}"),
        })),
        Err(err) => Err(error_status(err)),
    }
}
