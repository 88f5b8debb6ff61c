//! HTTP front end exposing a [`RepositoryApi`] backend.
//!
//! The gem and specification routes match the addresses produced by
//! [`LayoutResolver::for_server`], so URIs handed out by the repository can be
//! fetched directly from this server.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures_util::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use url::Url;

use crate::{
    config::Config,
    error::{AppError, AppResult, StorageError},
    identity::{PackageIdentity, SPEC_EXTENSION},
    index::{SourceIndex, SpecQuery},
    record::{PackageRecord, Specification},
    repository::{AddRequest, Repository, RepositoryApi},
    uri::LayoutResolver,
};

/// Backend shared by every request handler.
pub type SharedRepository = Arc<dyn RepositoryApi>;

/// Body of `GET /`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub service: String,
    pub version: String,
    pub uri: Url,
    pub gems_uri: Url,
    pub specifications_uri: Url,
}

/// Body of `POST /api/v1/gems/{name}/{version}/yank`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YankResponse {
    pub uri: Option<Url>,
}

/// Body of `DELETE /api/v1/gems/{name}/{version}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeleteResponse {
    pub deleted: bool,
}

pub fn router(repository: SharedRepository) -> Router {
    Router::new()
        .route("/", get(info_handler))
        .route("/health", get(health_handler))
        .route("/api/v1/specs", get(source_index_handler))
        .route("/api/v1/search", get(search_handler))
        .route(
            "/api/v1/gems/{name}/{version}",
            post(add_handler).get(record_handler).delete(delete_handler),
        )
        .route("/api/v1/gems/{name}/{version}/yank", post(yank_handler))
        .route("/gems/{file}", get(gem_file_handler))
        .route("/specifications/{file}", get(specification_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(repository)
}

/// Serve `repository` on an already bound listener until the server stops.
pub async fn serve(listener: TcpListener, repository: SharedRepository) -> std::io::Result<()> {
    axum::serve(listener, router(repository)).await
}

/// Run the server over the local repository described by `config`.
pub async fn run_server(config: &Config) -> Result<()> {
    let public_url = config.server_url()?;
    let repository = Repository::local(&config.storage)
        .await?
        .resolver(Arc::new(LayoutResolver::for_server(&public_url)?))
        .max_gem_size(config.max_gem_size_bytes())
        .build()
        .await?;
    info!(data_dir = %config.storage.data_dir.display(), "Using data directory");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        error!(addr = %addr, error = %e, "Failed to bind to address");
        anyhow::anyhow!("Failed to bind to {addr}: {e}")
    })?;

    info!(addr = %addr, url = %public_url, "Server listening");
    serve(listener, Arc::new(repository)).await.map_err(|e| {
        error!(error = %e, "Server error");
        anyhow::anyhow!("Server error: {e}")
    })?;

    Ok(())
}

async fn info_handler(State(repository): State<SharedRepository>) -> Json<RepositoryInfo> {
    Json(RepositoryInfo {
        service: "gemhouse".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uri: repository.uri(),
        gems_uri: repository.gems_uri(),
        specifications_uri: repository.specifications_uri(),
    })
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn source_index_handler(
    State(repository): State<SharedRepository>,
) -> AppResult<Json<SourceIndex>> {
    Ok(Json(repository.source_index().await?))
}

async fn search_handler(
    State(repository): State<SharedRepository>,
    Query(query): Query<SpecQuery>,
) -> AppResult<Json<Vec<Specification>>> {
    Ok(Json(repository.search_for(&query).await?))
}

async fn add_handler(
    State(repository): State<SharedRepository>,
    Path((name, version)): Path<(String, String)>,
    body: Body,
) -> AppResult<(StatusCode, Json<PackageRecord>)> {
    let identity = PackageIdentity::new(name, version)?;
    let stream = body
        .into_data_stream()
        .map_err(|e| StorageError::Body(e.to_string()))
        .boxed();
    let record = repository.add(AddRequest::new(identity, stream)).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn record_handler(
    State(repository): State<SharedRepository>,
    Path((name, version)): Path<(String, String)>,
) -> AppResult<Json<PackageRecord>> {
    let identity = PackageIdentity::new(name, version)?;
    repository
        .record(&identity)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("gem {identity} not found")))
}

async fn yank_handler(
    State(repository): State<SharedRepository>,
    Path((name, version)): Path<(String, String)>,
) -> AppResult<Json<YankResponse>> {
    let identity = PackageIdentity::new(name, version)?;
    let uri = repository.yank(&identity).await?;
    Ok(Json(YankResponse { uri }))
}

async fn delete_handler(
    State(repository): State<SharedRepository>,
    Path((name, version)): Path<(String, String)>,
) -> AppResult<Json<DeleteResponse>> {
    let identity = PackageIdentity::new(name, version)?;
    let deleted = repository.delete(&identity).await?;
    Ok(Json(DeleteResponse { deleted }))
}

async fn gem_file_handler(
    State(repository): State<SharedRepository>,
    Path(file): Path<String>,
) -> AppResult<Response> {
    let not_found = || AppError::NotFound(format!("gem file {file} not found"));
    let identity = PackageIdentity::from_gem_file_name(&file).map_err(|_| not_found())?;
    let stream = repository.open(&identity).await?.ok_or_else(not_found)?;

    Ok((
        [(header::CONTENT_TYPE, "application/octet-stream")],
        Body::from_stream(stream),
    )
        .into_response())
}

async fn specification_handler(
    State(repository): State<SharedRepository>,
    Path(file): Path<String>,
) -> AppResult<Json<Specification>> {
    let not_found = || AppError::NotFound(format!("specification {file} not found"));
    let identity = PackageIdentity::from_file_name(&file, SPEC_EXTENSION).map_err(|_| not_found())?;
    repository
        .record(&identity)
        .await?
        .filter(PackageRecord::is_available)
        .map(|record| Json(record.specification()))
        .ok_or_else(not_found)
}
