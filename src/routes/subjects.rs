use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tracing::info;

use crate::{
    auth::AuthUser,
    error::FileError,
    models::{CreateSubject, CreateTopic, NewSubject, Subject, Topic},
    services::file_lifecycle::parse_id,
    AppState,
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_subjects).post(create_subject))
        .route("/{id}", get(get_subject))
        .route("/{id}/topics", post(create_topic))
}

fn required(value: &str, field: &str) -> Result<String, FileError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(FileError::InvalidInput(format!("{} is required", field)));
    }
    Ok(value.to_string())
}

async fn owned_subject(state: &AppState, id: &str, auth_user: &AuthUser) -> Result<Subject, FileError> {
    let id = parse_id(id)?;
    state
        .store
        .get_subject(id)
        .await?
        .filter(|subject| subject.owner() == auth_user.owner())
        .ok_or(FileError::NotFound("Subject"))
}

#[utoipa::path(
    get,
    path = "/api/subjects",
    tag = "subjects",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Subjects of the caller with their topics", body = Vec<Subject>),
        (status = 401, description = "Unauthorized")
    )
)]
async fn list_subjects(State(state): State<Arc<AppState>>, auth_user: AuthUser) -> Result<Json<Vec<Subject>>, FileError> {
    Ok(Json(state.store.list_subjects(auth_user.owner()).await?))
}

#[utoipa::path(
    post,
    path = "/api/subjects",
    tag = "subjects",
    security(("bearer_auth" = [])),
    request_body = CreateSubject,
    responses(
        (status = 200, description = "Subject created", body = Subject),
        (status = 400, description = "Missing name or code")
    )
)]
async fn create_subject(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Json(request): Json<CreateSubject>,
) -> Result<Json<Subject>, FileError> {
    let subject = state
        .store
        .create_subject(NewSubject {
            name: required(&request.name, "name")?,
            code: required(&request.code, "code")?,
            owner: auth_user.owner(),
        })
        .await?;

    info!("Subject {} created by {}", subject.id, auth_user.owner());
    Ok(Json(subject))
}

#[utoipa::path(
    get,
    path = "/api/subjects/{id}",
    tag = "subjects",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Subject id")),
    responses(
        (status = 200, description = "Subject with its topics", body = Subject),
        (status = 404, description = "Subject not found")
    )
)]
async fn get_subject(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Subject>, FileError> {
    Ok(Json(owned_subject(&state, &id, &auth_user).await?))
}

#[utoipa::path(
    post,
    path = "/api/subjects/{id}/topics",
    tag = "subjects",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Subject id")),
    request_body = CreateTopic,
    responses(
        (status = 200, description = "Topic created", body = Topic),
        (status = 400, description = "Missing name"),
        (status = 404, description = "Subject not found")
    )
)]
async fn create_topic(
    State(state): State<Arc<AppState>>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<CreateTopic>,
) -> Result<Json<Topic>, FileError> {
    let subject = owned_subject(&state, &id, &auth_user).await?;
    let name = required(&request.name, "name")?;

    let topic = state
        .store
        .create_topic(subject.id, &name, request.description.as_deref())
        .await?;
    Ok(Json(topic))
}
