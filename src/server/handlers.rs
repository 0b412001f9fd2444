//! HTTP request handlers.

use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::multipart::MultipartRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ApiError;
use crate::app::{App, FetchRequest, FileDocument, RemoteSource};
use crate::file_store::FileEntry;

type ApiResult<T> = std::result::Result<T, ApiError>;

/// Allowance on top of the file size limit for JSON escaping and multipart framing.
const BODY_OVERHEAD: u64 = 64 * 1024;

/// Create the router exposing the App's operations.
pub fn router(app: Arc<App>) -> Router {
    let body_limit = app
        .policy()
        .max_file_size()
        .saturating_mul(2)
        .saturating_add(BODY_OVERHEAD);
    let body_limit = usize::try_from(body_limit).unwrap_or(usize::MAX);

    Router::new()
        .route("/", get(index))
        .route("/api/files", get(list_files).post(create_file))
        .route(
            "/api/files/{*path}",
            get(read_file).put(save_file).delete(delete_file),
        )
        .route("/api/rename", post(rename_file))
        .route("/api/upload", post(upload_file))
        .route("/api/fetch", post(fetch_remote))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(app)
}

// =============================================================================
// Request / Response Bodies
// =============================================================================

#[derive(Debug, Serialize)]
struct FileList {
    files: Vec<FileEntry>,
}

/// Confirmation for operations that return no data.
#[derive(Debug, Serialize)]
struct Done {
    path: String,
    message: String,
}

impl Done {
    fn new(path: impl Into<String>, message: impl Into<String>) -> Json<Self> {
        Json(Self {
            path: path.into(),
            message: message.into(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct CreateFileBody {
    path: String,
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct SaveFileBody {
    content: String,
}

#[derive(Debug, Deserialize)]
struct RenameBody {
    from: String,
    to: String,
}

#[derive(Debug, Default, Deserialize)]
struct UploadQuery {
    #[serde(default)]
    overwrite: bool,
}

/// Either `{repository, path, branch?}` or `{url}`, plus `target?` and `refresh?`.
#[derive(Debug, Deserialize)]
struct FetchBody {
    repository: Option<String>,
    path: Option<String>,
    branch: Option<String>,
    url: Option<String>,
    target: Option<String>,
    #[serde(default)]
    refresh: bool,
}

impl TryFrom<FetchBody> for FetchRequest {
    type Error = ApiError;

    fn try_from(body: FetchBody) -> ApiResult<Self> {
        let source = match (body.url, body.repository, body.path) {
            (Some(url), None, None) => RemoteSource::Url(url),
            (None, Some(repository), Some(path)) => RemoteSource::Reference {
                repository,
                path,
                branch: body.branch,
            },
            (Some(_), _, _) => {
                return Err(ApiError::invalid_input(
                    "give either url or repository and path, not both",
                ))
            }
            _ => {
                return Err(ApiError::invalid_input(
                    "fetch needs either url or both repository and path",
                ))
            }
        };

        let mut request = FetchRequest::new(source).with_refresh(body.refresh);
        request.target = body.target.filter(|t| !t.trim().is_empty());
        Ok(request)
    }
}

fn created_status(created: bool) -> StatusCode {
    if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Serve the configured index page.
async fn index(State(app): State<Arc<App>>) -> ApiResult<Html<String>> {
    let path = app
        .config()
        .config()
        .server
        .index_file
        .clone()
        .ok_or_else(|| ApiError::not_found("no index page is configured"))?;

    match tokio::fs::read_to_string(&path).await {
        Ok(page) => Ok(Html(page)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ApiError::not_found(format!(
            "index page not found: {}",
            path.display()
        ))),
        Err(e) => Err(ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "storage_error",
            format!("failed to read index page {}: {}", path.display(), e),
        )),
    }
}

async fn list_files(State(app): State<Arc<App>>) -> ApiResult<Json<FileList>> {
    let files = app.list_files().await?;
    Ok(Json(FileList { files }))
}

async fn create_file(
    State(app): State<Arc<App>>,
    body: Result<Json<CreateFileBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    app.create_file(&body.path, &body.content).await?;
    Ok((StatusCode::CREATED, Done::new(body.path, "File created.")))
}

async fn read_file(
    State(app): State<Arc<App>>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<Json<FileDocument>> {
    let Path(path) = path?;
    debug!(%path, "reading file");
    Ok(Json(app.read_file(&path).await?))
}

async fn save_file(
    State(app): State<Arc<App>>,
    path: Result<Path<String>, PathRejection>,
    body: Result<Json<SaveFileBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(path) = path?;
    let Json(body) = body?;
    app.save_file(&path, &body.content).await?;
    Ok(Done::new(path, "File saved."))
}

async fn delete_file(
    State(app): State<Arc<App>>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(path) = path?;
    app.delete_file(&path).await?;
    Ok(Done::new(path, "File deleted."))
}

async fn rename_file(
    State(app): State<Arc<App>>,
    body: Result<Json<RenameBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    app.rename_file(&body.from, &body.to).await?;
    Ok(Done::new(body.to, format!("File renamed from {}.", body.from)))
}

/// Store the first multipart field that carries a file name.
async fn upload_file(
    State(app): State<Arc<App>>,
    query: Result<Query<UploadQuery>, QueryRejection>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let mut multipart = multipart?;

    while let Some(field) = multipart.next_field().await? {
        let Some(file_name) = field.file_name().map(str::to_string) else {
            continue;
        };
        let data = field.bytes().await?;
        let outcome = app.upload_file(&file_name, data, query.overwrite).await?;
        return Ok((created_status(outcome.created), Json(outcome)));
    }

    Err(ApiError::invalid_input("no file found in upload"))
}

async fn fetch_remote(
    State(app): State<Arc<App>>,
    body: Result<Json<FetchBody>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(body) = body?;
    let request = FetchRequest::try_from(body)?;
    let outcome = app.fetch_remote(&request).await?;
    Ok((created_status(outcome.created), Json(outcome)))
}
