//! HTTP handlers for listing, upload, download, move, delete and zip.

use axum::Error as AxumError;
use axum::body::Body as AxumBody;
use axum::extract::{Extension, Json, Path as AxumPath, Query};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Json as JsonResponse, Response};
use futures_util::stream::StreamExt;
use http_body_util::BodyExt;
use httpdate::fmt_http_date;
use serde::Deserialize;
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::archive;
use crate::config::ZIP_PIPE_BUFFER;
use crate::error::ApiError;
use crate::storage::{SavedFile, Storage, StorageError, sanitize, strip_traversal};
use crate::tree::TreeNode;

#[derive(Deserialize)]
pub(crate) struct OptionalPathQuery {
    path: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct RequiredPathQuery {
    path: String,
}

#[derive(Deserialize)]
pub(crate) struct DirCreateBody {
    path: String,
}

#[derive(Deserialize)]
pub(crate) struct MoveBody {
    from: String,
    to: String,
}

/// Returns the nested tree of the directory at `?path=` (root by default).
pub async fn list_tree(
    Query(query): Query<OptionalPathQuery>,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<JsonResponse<Vec<TreeNode>>, ApiError> {
    let clean = sanitize(query.path.as_deref().unwrap_or(""));
    let nodes = storage.list_tree(&clean).await?;
    info!(path = clean, count = nodes.len(), "list tree");
    Ok(JsonResponse(nodes))
}

/// Receives an upload body into the staging area, then commits it to
/// `?path=` with a rename. The size cap is checked against the declared
/// Content-Length before any byte is read, and enforced again while
/// streaming in case the declaration lied.
pub async fn upload_file(
    Query(RequiredPathQuery { path }): Query<RequiredPathQuery>,
    headers: HeaderMap,
    Extension(storage): Extension<Arc<Storage>>,
    body: AxumBody,
) -> Result<Response, ApiError> {
    let clean = sanitize(&path);
    if clean.is_empty() {
        return Err(ApiError::BadRequest("invalid path".into()));
    }
    let limit = storage.max_upload_size();
    let declared = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok());
    if let Some(declared) = declared
        && limit > 0
        && declared > limit
    {
        return Err(StorageError::TooLarge {
            size: declared,
            limit,
        }
        .into());
    }

    let staging_dir = storage.staging_dir();
    fs::create_dir_all(&staging_dir)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    let staged = staging_dir.join(format!("{}.part", Uuid::new_v4()));
    let mut file = File::create(&staged)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;

    let write_result: Result<u64, ApiError> = async {
        let mut total: u64 = 0;
        let mut data_stream = BodyExt::into_data_stream(body);
        while let Some(chunk) = data_stream.next().await {
            let chunk = chunk.map_err(|err: AxumError| ApiError::Internal(err.to_string()))?;
            if chunk.is_empty() {
                continue;
            }
            total += chunk.len() as u64;
            if limit > 0 && total > limit {
                return Err(StorageError::TooLarge { size: total, limit }.into());
            }
            file.write_all(&chunk)
                .await
                .map_err(|err| ApiError::Internal(err.to_string()))?;
        }
        file.flush()
            .await
            .map_err(|err| ApiError::Internal(err.to_string()))?;
        Ok(total)
    }
    .await;
    drop(file);

    let total = match write_result {
        Ok(value) => value,
        Err(err) => {
            let _ = fs::remove_file(&staged).await;
            return Err(err);
        }
    };

    let saved: SavedFile = match storage.save_upload(&clean, &staged, total).await {
        Ok(value) => value,
        Err(err) => {
            let _ = fs::remove_file(&staged).await;
            return Err(err.into());
        }
    };

    info!(path = clean, size = total, "upload complete");
    Ok((StatusCode::CREATED, JsonResponse(saved)).into_response())
}

/// Serves a stored file at `/uploads/{path}`.
///
/// Only traversal segments are stripped here; segment characters stay as
/// the lister reported them, so every listed download URL resolves to the
/// file it was built from.
pub async fn download_file(
    AxumPath(path): AxumPath<String>,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<Response, ApiError> {
    let clean = strip_traversal(&path);
    if clean.is_empty() {
        return Err(ApiError::BadRequest("invalid path".into()));
    }
    let target = storage.resolve_checked(&clean, false).await?;
    let metadata = fs::metadata(&target).await.map_err(StorageError::from)?;
    if metadata.is_dir() {
        return Err(ApiError::BadRequest("path is not a file".into()));
    }

    let mime = mime_guess::from_path(&clean).first_or_octet_stream();
    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(mime.essence_str())
            .map_err(|_| ApiError::Internal("invalid mime type".into()))?,
    );
    response_headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&metadata.len().to_string())
            .map_err(|_| ApiError::Internal("invalid response header".into()))?,
    );
    if let Ok(modified) = metadata.modified() {
        let value = fmt_http_date(modified);
        response_headers.insert(
            header::LAST_MODIFIED,
            HeaderValue::from_str(&value)
                .map_err(|_| ApiError::Internal("invalid response header".into()))?,
        );
    }

    let file = File::open(&target)
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?;
    info!(path = clean, size = metadata.len(), "download file");
    let stream = ReaderStream::new(file);
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(stream),
    )
        .into_response())
}

/// Deletes a file, or a directory with all of its contents.
pub async fn delete_entry(
    Query(RequiredPathQuery { path }): Query<RequiredPathQuery>,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<StatusCode, ApiError> {
    let clean = sanitize(&path);
    if clean.is_empty() {
        return Err(ApiError::BadRequest("invalid path".into()));
    }
    storage.delete_path(&clean).await?;
    info!(path = clean, "delete entry");
    Ok(StatusCode::NO_CONTENT)
}

/// Creates a directory including missing parents. Idempotent.
pub async fn create_directory(
    Extension(storage): Extension<Arc<Storage>>,
    payload: Json<DirCreateBody>,
) -> Result<StatusCode, ApiError> {
    let clean = sanitize(&payload.0.path);
    if clean.is_empty() {
        return Err(ApiError::BadRequest("invalid path".into()));
    }
    storage.create_dir(&clean).await?;
    info!(path = clean, "create directory");
    Ok(StatusCode::CREATED)
}

/// Moves an entry, creating destination parents as needed.
pub async fn move_entry(
    Extension(storage): Extension<Arc<Storage>>,
    payload: Json<MoveBody>,
) -> Result<StatusCode, ApiError> {
    let from = sanitize(&payload.0.from);
    let to = sanitize(&payload.0.to);
    if from.is_empty() || to.is_empty() {
        return Err(ApiError::BadRequest("invalid path".into()));
    }
    storage.move_path(&from, &to).await?;
    info!(from, to, "move entry");
    Ok(StatusCode::NO_CONTENT)
}

/// Streams a zip archive of the directory at `?path=` (root by default).
///
/// The archive writer runs in its own task feeding a bounded pipe; a slow
/// receiver backpressures the writer through it. A failure after streaming
/// has begun truncates the response, which the client must treat as an
/// invalid archive.
pub async fn zip_directory(
    Query(query): Query<OptionalPathQuery>,
    Extension(storage): Extension<Arc<Storage>>,
) -> Result<Response, ApiError> {
    let clean = sanitize(query.path.as_deref().unwrap_or(""));
    let target = storage.resolve_archive_dir(&clean).await?;

    let stem = clean
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty())
        .unwrap_or("archive");
    let filename = format!("{stem}.zip");

    let (writer, reader) = tokio::io::duplex(ZIP_PIPE_BUFFER);
    tokio::spawn(async move {
        if let Err(err) = archive::stream_zip(&target, writer).await {
            warn!(dir = ?target, error = ?err, "zip stream aborted");
        }
    });

    let mut response_headers = HeaderMap::new();
    response_headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/zip"),
    );
    response_headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_str(&format!("attachment; filename=\"{filename}\""))
            .map_err(|_| ApiError::Internal("invalid response header".into()))?,
    );

    info!(path = clean, "zip download");
    let stream = ReaderStream::new(reader);
    Ok((
        StatusCode::OK,
        response_headers,
        AxumBody::from_stream(stream),
    )
        .into_response())
}
