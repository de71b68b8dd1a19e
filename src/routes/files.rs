use axum::{
    extract::{Multipart, Path, State},
    response::Json,
    routing::{delete, get, post},
    Router,
};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::FileError,
    models::{
        CountResponse, FileRecord, GroupShareRequest, MessageResponse, ShareRequest, ShareResponse,
        SummaryResponse, UploadResponse, UploadedFile,
    },
    AppState,
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_files))
        .route("/upload", post(upload_files))
        .route("/trash", get(list_trash))
        .route("/empty-trash", delete(empty_trash))
        .route("/all", delete(trash_all_files))
        .route("/restore/{id}", post(restore_file))
        .route("/permanent/{id}", delete(permanently_delete_file))
        .route("/shared/group/{group_id}", get(list_group_files))
        .route("/{id}", get(get_file).delete(trash_file))
        .route("/{id}/share", post(share_file))
        .route("/{id}/groups", post(share_file_with_group))
        .route("/{id}/summary", get(get_file_summary))
}

/// Multipart body read from the upload request
#[derive(Default)]
struct UploadForm {
    files: Vec<UploadedFile>,
    subject_id: Option<String>,
    topic_id: Option<String>,
}

fn detect_mime_type(filename: &str, declared: Option<&str>) -> String {
    match declared {
        Some(mime) if !mime.is_empty() && mime != "application/octet-stream" => mime.to_string(),
        _ => mime_guess::from_path(filename).first_or_octet_stream().to_string(),
    }
}

/// Strip directory components a client may send in the part's filename
fn sanitize_filename(filename: &str) -> String {
    let name = filename.rsplit(['/', '\\']).next().unwrap_or(filename).trim();
    if name.is_empty() || name == "." || name == ".." {
        "upload".to_string()
    } else {
        name.to_string()
    }
}

async fn spool_field(mut field: axum::extract::multipart::Field<'_>, temp_dir: &FsPath) -> Result<UploadedFile, FileError> {
    let original_name = sanitize_filename(field.file_name().unwrap_or("upload"));
    let mime_type = detect_mime_type(&original_name, field.content_type());
    let temp_path: PathBuf = temp_dir.join(format!("{}-{}", Uuid::new_v4(), original_name));

    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .map_err(|e| FileError::UploadFailed(format!("could not create temp file: {}", e)))?;

    let mut size: i64 = 0;
    let spooled = async {
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| FileError::InvalidInput(format!("invalid multipart body: {}", e)))?
        {
            size += chunk.len() as i64;
            file.write_all(&chunk)
                .await
                .map_err(|e| FileError::UploadFailed(format!("could not write temp file: {}", e)))?;
        }
        file.flush()
            .await
            .map_err(|e| FileError::UploadFailed(format!("could not write temp file: {}", e)))
    }
    .await;

    if let Err(e) = spooled {
        if let Err(remove_err) = tokio::fs::remove_file(&temp_path).await {
            warn!("Failed to remove partial upload {}: {}", temp_path.display(), remove_err);
        }
        return Err(e);
    }

    debug!("Spooled upload {} ({} bytes, {})", original_name, size, mime_type);
    Ok(UploadedFile {
        original_name,
        mime_type,
        size,
        temp_path,
    })
}

async fn read_upload_form(mut multipart: Multipart, temp_dir: &FsPath) -> Result<UploadForm, FileError> {
    tokio::fs::create_dir_all(temp_dir)
        .await
        .map_err(|e| FileError::UploadFailed(format!("could not prepare temp directory: {}", e)))?;

    let mut form = UploadForm::default();
    let result: Result<(), FileError> = async {
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| FileError::InvalidInput(format!("invalid multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "files" | "file" => form.files.push(spool_field(field, temp_dir).await?),
                "subject_id" => {
                    form.subject_id = Some(field.text().await.map_err(|e| FileError::InvalidInput(e.to_string()))?)
                }
                "topic_id" => {
                    form.topic_id = Some(field.text().await.map_err(|e| FileError::InvalidInput(e.to_string()))?)
                }
                other => debug!("Ignoring multipart field '{}'", other),
            }
        }
        Ok(())
    }
    .await;

    if let Err(e) = result {
        for file in &form.files {
            if let Err(remove_err) = tokio::fs::remove_file(&file.temp_path).await {
                warn!("Failed to remove temp file {}: {}", file.temp_path.display(), remove_err);
            }
        }
        return Err(e);
    }

    Ok(form)
}

#[utoipa::path(
    post,
    path = "/api/files/upload",
    tag = "files",
    security(("bearer_auth" = [])),
    request_body(content_type = "multipart/form-data", description = "`files` parts plus optional `subject_id` and `topic_id`"),
    responses(
        (status = 200, description = "Files uploaded", body = UploadResponse),
        (status = 400, description = "No files, or invalid subject/topic ids"),
        (status = 401, description = "Missing or expired provider credential"),
        (status = 404, description = "Subject or topic not found"),
        (status = 500, description = "Upload failed")
    )
)]
async fn upload_files(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, FileError> {
    let form = read_upload_form(multipart, state.files.temp_dir()).await?;

    let outcome = state
        .files
        .upload(
            form.files,
            auth_user.owner(),
            form.subject_id.as_deref(),
            form.topic_id.as_deref(),
        )
        .await?;

    Ok(Json(UploadResponse {
        message: format!("{} file(s) uploaded successfully", outcome.files.len()),
        files: outcome.files,
        suggested_subject: outcome.suggested_subject,
        suggested_topic: outcome.suggested_topic,
    }))
}

#[utoipa::path(
    get,
    path = "/api/files",
    tag = "files",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Active files of the caller, newest first", body = Vec<FileRecord>),
        (status = 401, description = "Unauthorized")
    )
)]
async fn list_files(State(state): State<Arc<AppState>>, auth_user: AuthUser) -> Result<Json<Vec<FileRecord>>, FileError> {
    Ok(Json(state.files.list(auth_user.owner()).await?))
}

#[utoipa::path(
    get,
    path = "/api/files/trash",
    tag = "files",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Trashed files of the caller", body = Vec<FileRecord>),
        (status = 401, description = "Unauthorized")
    )
)]
async fn list_trash(State(state): State<Arc<AppState>>, auth_user: AuthUser) -> Result<Json<Vec<FileRecord>>, FileError> {
    Ok(Json(state.files.list_trash(auth_user.owner()).await?))
}

#[utoipa::path(
    get,
    path = "/api/files/{id}",
    tag = "files",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "File id")),
    responses(
        (status = 200, description = "File record", body = FileRecord),
        (status = 400, description = "Invalid id"),
        (status = 404, description = "File not found")
    )
)]
async fn get_file(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<FileRecord>, FileError> {
    Ok(Json(state.files.get(&id, auth_user.owner()).await?))
}

#[utoipa::path(
    delete,
    path = "/api/files/{id}",
    tag = "files",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "File id")),
    responses(
        (status = 200, description = "File moved to trash", body = FileRecord),
        (status = 400, description = "Invalid id"),
        (status = 404, description = "File not found")
    )
)]
async fn trash_file(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<FileRecord>, FileError> {
    Ok(Json(state.files.trash(&id, auth_user.owner()).await?))
}

#[utoipa::path(
    post,
    path = "/api/files/restore/{id}",
    tag = "files",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "File id")),
    responses(
        (status = 200, description = "File restored from trash", body = FileRecord),
        (status = 400, description = "Invalid id"),
        (status = 404, description = "File not found")
    )
)]
async fn restore_file(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<FileRecord>, FileError> {
    Ok(Json(state.files.restore(&id, auth_user.owner()).await?))
}

#[utoipa::path(
    delete,
    path = "/api/files/permanent/{id}",
    tag = "files",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "File id")),
    responses(
        (status = 200, description = "File permanently deleted", body = MessageResponse),
        (status = 400, description = "Invalid id"),
        (status = 401, description = "Missing provider credential"),
        (status = 404, description = "File not found")
    )
)]
async fn permanently_delete_file(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, FileError> {
    state.files.permanent_delete(&id, auth_user.owner()).await?;
    Ok(Json(MessageResponse::new("File permanently deleted")))
}

#[utoipa::path(
    delete,
    path = "/api/files/empty-trash",
    tag = "files",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Trash emptied", body = CountResponse),
        (status = 401, description = "Unauthorized")
    )
)]
async fn empty_trash(State(state): State<Arc<AppState>>, auth_user: AuthUser) -> Result<Json<CountResponse>, FileError> {
    let count = state.files.empty_trash(auth_user.owner()).await?;
    Ok(Json(CountResponse {
        message: format!("Removed {} file(s) from trash", count),
        count,
    }))
}

#[utoipa::path(
    delete,
    path = "/api/files/all",
    tag = "files",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "All active files moved to trash", body = CountResponse),
        (status = 401, description = "Unauthorized")
    )
)]
async fn trash_all_files(State(state): State<Arc<AppState>>, auth_user: AuthUser) -> Result<Json<CountResponse>, FileError> {
    let count = state.files.trash_all(auth_user.owner()).await?;
    Ok(Json(CountResponse {
        message: format!("Moved {} file(s) to trash", count),
        count,
    }))
}

#[utoipa::path(
    post,
    path = "/api/files/{id}/share",
    tag = "files",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "File id")),
    request_body = ShareRequest,
    responses(
        (status = 200, description = "Share result per target", body = ShareResponse),
        (status = 400, description = "Invalid id or empty target list"),
        (status = 404, description = "File not found")
    )
)]
async fn share_file(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<ShareRequest>,
) -> Result<Json<ShareResponse>, FileError> {
    if request.targets.is_empty() {
        return Err(FileError::InvalidInput("At least one share target is required".to_string()));
    }

    let outcome = state.files.share(&id, &request.targets, auth_user.owner()).await?;
    Ok(Json(ShareResponse {
        message: format!("File shared with {} recipient(s)", outcome.shared),
        outcome,
    }))
}

#[utoipa::path(
    post,
    path = "/api/files/{id}/groups",
    tag = "files",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "File id")),
    request_body = GroupShareRequest,
    responses(
        (status = 200, description = "File shared with the group", body = FileRecord),
        (status = 400, description = "Invalid id or group"),
        (status = 404, description = "File not found")
    )
)]
async fn share_file_with_group(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<GroupShareRequest>,
) -> Result<Json<FileRecord>, FileError> {
    Ok(Json(
        state
            .files
            .share_with_group(&id, &request.group_id, auth_user.owner())
            .await?,
    ))
}

#[utoipa::path(
    get,
    path = "/api/files/shared/group/{group_id}",
    tag = "files",
    security(("bearer_auth" = [])),
    params(("group_id" = String, Path, description = "Group id")),
    responses(
        (status = 200, description = "Active files shared with the group", body = Vec<FileRecord>),
        (status = 401, description = "Unauthorized")
    )
)]
async fn list_group_files(
    State(state): State<Arc<AppState>>,
    _auth_user: AuthUser,
    Path(group_id): Path<String>,
) -> Result<Json<Vec<FileRecord>>, FileError> {
    Ok(Json(state.files.list_shared_with_group(&group_id).await?))
}

#[utoipa::path(
    get,
    path = "/api/files/{id}/summary",
    tag = "files",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "File id")),
    responses(
        (status = 200, description = "Summary of the file", body = SummaryResponse),
        (status = 401, description = "Missing provider credential"),
        (status = 404, description = "File not found"),
        (status = 500, description = "Download or summarization failed")
    )
)]
async fn get_file_summary(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<SummaryResponse>, FileError> {
    let summary = state.files.get_summary(&id, auth_user.owner()).await?;
    Ok(Json(SummaryResponse { summary }))
}
