pub mod auth;
pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod oauth;
pub mod routes;
pub mod services;
pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_helpers;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};

use config::Config;
use db::DocumentStore;
use oauth::OAuthRegistry;
use services::file_lifecycle::FileLifecycleManager;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    pub files: Arc<FileLifecycleManager>,
    /// Absent when Google OAuth is not configured
    pub oauth: Option<Arc<OAuthRegistry>>,
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        routes::health::health_check,
        routes::auth::me,
        routes::auth::google_login,
        routes::auth::google_callback,
        routes::files::upload_files,
        routes::files::list_files,
        routes::files::list_trash,
        routes::files::get_file,
        routes::files::trash_file,
        routes::files::restore_file,
        routes::files::permanently_delete_file,
        routes::files::empty_trash,
        routes::files::trash_all_files,
        routes::files::share_file,
        routes::files::share_file_with_group,
        routes::files::list_group_files,
        routes::files::get_file_summary,
        routes::subjects::list_subjects,
        routes::subjects::create_subject,
        routes::subjects::get_subject,
        routes::subjects::create_topic,
    ),
    components(schemas(
        models::FileRecord,
        models::PrincipalKind,
        models::PrincipalResponse,
        models::Subject,
        models::Topic,
        models::CreateSubject,
        models::CreateTopic,
        models::ShareRequest,
        models::GroupShareRequest,
        models::ShareOutcome,
        models::MessageResponse,
        models::ErrorResponse,
        models::UploadResponse,
        models::ShareResponse,
        models::SummaryResponse,
        models::CountResponse,
    )),
    modifiers(&SecurityAddon),
    tags(
        (name = "files", description = "File lifecycle: upload, trash, sharing and summaries"),
        (name = "subjects", description = "Subjects and topics that organise files"),
        (name = "auth", description = "Google sign-in for users and teachers"),
        (name = "health", description = "Liveness"),
    ),
    info(title = "Pingnotes API", description = "Study notes stored in each student's Google Drive")
)]
pub struct ApiDoc;
