//! HTTP routes over a [`CatalogClient`]

use axum::{
    extract::{Multipart, Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{debug, error};

use crate::data::{CoreError, DeleteCounts, DocumentView, NodeId, SourceDocument};
use crate::services::CatalogClient;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub client: CatalogClient,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdResponse {
    pub id: NodeId,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AstResponse {
    pub ast: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DeleteResponse {
    pub nodes_deleted: usize,
    pub relationships_deleted: usize,
}

impl From<DeleteCounts> for DeleteResponse {
    fn from(counts: DeleteCounts) -> Self {
        Self {
            nodes_deleted: counts.nodes_deleted,
            relationships_deleted: counts.edges_deleted,
        }
    }
}

/// Catalog error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub CoreError);

impl From<CoreError> for ApiError {
    fn from(error: CoreError) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::Io { .. } => StatusCode::BAD_REQUEST,
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::Store(_) | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

/// Builds the API router. `cors_origin` is the single origin allowed to call it.
pub fn router(state: AppState, cors_origin: &str) -> Result<Router, CoreError> {
    let origin = cors_origin
        .parse::<HeaderValue>()
        .map_err(|e| CoreError::Internal(format!("Invalid CORS origin {}: {}", cors_origin, e)))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    Ok(Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/query/import", post(import_query))
        .route("/api/v1/queries/import", post(import_queries))
        .route("/api/v1/queries", get(list_queries).delete(delete_queries))
        .route("/api/v1/query/:id", get(get_query).delete(delete_query))
        .route("/api/v1/query/:id/parse", put(parse_query))
        .route("/api/v1/queries/parse", put(parse_queries))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http()))
}

async fn health_check() -> &'static str {
    "OK"
}

fn multipart_error(e: impl std::fmt::Display) -> ApiError {
    ApiError(CoreError::io(format!("invalid multipart upload: {}", e), None))
}

/// Collects `(file name, text)` for every multipart field called `field_name`
async fn read_uploads(multipart: &mut Multipart, field_name: &str) -> Result<Vec<(String, String)>, ApiError> {
    let mut uploads = Vec::new();
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(field_name) {
            continue;
        }
        let name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}-{}.sql", field_name, uploads.len()));
        let text = field.text().await.map_err(multipart_error)?;
        debug!(name = %name, bytes = text.len(), "Received upload");
        uploads.push((name, text));
    }
    Ok(uploads)
}

async fn import_query(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IdResponse>, ApiError> {
    let (name, text) = read_uploads(&mut multipart, "file")
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError(CoreError::io("missing multipart field 'file'", None)))?;
    let id = state.client.load(name, text).await?;
    Ok(Json(IdResponse { id }))
}

async fn import_queries(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<Vec<IdResponse>>, ApiError> {
    let uploads = read_uploads(&mut multipart, "files").await?;
    let ids = state.client.load_many(uploads).await?;
    Ok(Json(ids.into_iter().map(|id| IdResponse { id }).collect()))
}

async fn list_queries(State(state): State<AppState>) -> Result<Json<Vec<SourceDocument>>, ApiError> {
    Ok(Json(state.client.list().await?))
}

async fn get_query(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
) -> Result<Json<DocumentView>, ApiError> {
    Ok(Json(state.client.get(id).await?))
}

async fn parse_query(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
) -> Result<impl IntoResponse, ApiError> {
    let tree = state.client.regenerate(id).await?;
    Ok(([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], tree))
}

async fn parse_queries(State(state): State<AppState>) -> Result<Json<Vec<AstResponse>>, ApiError> {
    let trees = state.client.regenerate_all().await?;
    Ok(Json(trees.into_iter().map(|ast| AstResponse { ast }).collect()))
}

async fn delete_query(
    State(state): State<AppState>,
    Path(id): Path<NodeId>,
) -> Result<Json<DeleteResponse>, ApiError> {
    Ok(Json(state.client.delete_one(id).await?.into()))
}

async fn delete_queries(State(state): State<AppState>) -> Result<Json<DeleteResponse>, ApiError> {
    Ok(Json(state.client.delete_all().await?.into()))
}
