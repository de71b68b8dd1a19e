use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{Json, Redirect},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::{
    auth::{create_jwt, AuthUser},
    models::{PrincipalKind, PrincipalProfile, PrincipalResponse},
    oauth::GoogleOAuthClient,
    AppState,
};

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/me", get(me))
        .route("/google/{kind}", get(google_login))
        .route("/google/{kind}/callback", get(google_callback))
}

fn sign_in_flow(state: &AppState, kind: &str) -> Result<(PrincipalKind, Arc<GoogleOAuthClient>), StatusCode> {
    let kind: PrincipalKind = kind.parse().map_err(|_| StatusCode::BAD_REQUEST)?;

    let registry = state.oauth.as_ref().ok_or_else(|| {
        tracing::warn!("Google sign-in requested but OAuth is not configured");
        StatusCode::BAD_REQUEST
    })?;
    let client = registry.flow(kind).ok_or_else(|| {
        tracing::warn!("No Google sign-in flow registered for {}", kind);
        StatusCode::BAD_REQUEST
    })?;

    Ok((kind, client.clone()))
}

#[utoipa::path(
    get,
    path = "/api/auth/me",
    tag = "auth",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Current principal", body = PrincipalResponse),
        (status = 401, description = "Unauthorized - invalid or missing token")
    )
)]
async fn me(auth_user: AuthUser) -> Json<PrincipalResponse> {
    Json(auth_user.principal.into())
}

#[derive(Deserialize)]
struct GoogleCallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[utoipa::path(
    get,
    path = "/api/auth/google/{kind}",
    tag = "auth",
    params(("kind" = String, Path, description = "`user` or `teacher`")),
    responses(
        (status = 303, description = "Redirect to Google consent screen"),
        (status = 400, description = "Unknown kind or Google sign-in not configured")
    )
)]
async fn google_login(State(state): State<Arc<AppState>>, Path(kind): Path<String>) -> Result<Redirect, StatusCode> {
    let (_, client) = sign_in_flow(&state, &kind)?;
    let (auth_url, _csrf_token) = client.get_authorization_url();
    Ok(Redirect::to(auth_url.as_str()))
}

#[utoipa::path(
    get,
    path = "/api/auth/google/{kind}/callback",
    tag = "auth",
    params(("kind" = String, Path, description = "`user` or `teacher`")),
    responses(
        (status = 303, description = "Redirect to the frontend with a session token"),
        (status = 400, description = "Missing or invalid parameters"),
        (status = 401, description = "Google sign-in failed"),
        (status = 500, description = "Internal server error")
    )
)]
async fn google_callback(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(params): Query<GoogleCallbackQuery>,
) -> Result<Redirect, StatusCode> {
    if let Some(error) = params.error {
        tracing::error!("Google callback error: {}", error);
        return Err(StatusCode::UNAUTHORIZED);
    }
    let code = params.code.ok_or(StatusCode::BAD_REQUEST)?;
    let (kind, client) = sign_in_flow(&state, &kind)?;

    let tokens = client
        .exchange_code(&code, params.state.as_deref())
        .await
        .map_err(|e| {
            tracing::error!("Failed to exchange code: {}", e);
            StatusCode::UNAUTHORIZED
        })?;

    let user_info = client.get_user_info(&tokens.access_token).await.map_err(|e| {
        tracing::error!("Failed to get user info: {}", e);
        StatusCode::UNAUTHORIZED
    })?;

    let email = user_info.email.clone().ok_or_else(|| {
        tracing::warn!("Google account {} did not share an email address", user_info.sub);
        StatusCode::BAD_REQUEST
    })?;
    let name = user_info
        .name
        .clone()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| email.split('@').next().unwrap_or(&email).to_string());

    let profile = PrincipalProfile {
        name,
        email,
        google_id: user_info.sub,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    };

    let principal = state.store.upsert_principal(kind, &profile).await.map_err(|e| {
        tracing::error!("Failed to store {} {}: {}", kind, profile.email, e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let token = create_jwt(&principal, &state.config.jwt_secret, state.config.jwt_expiry_hours).map_err(|e| {
        tracing::error!("Failed to create JWT token: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let redirect_url = format!(
        "{}/auth/callback?token={}",
        state.config.frontend_url.trim_end_matches('/'),
        urlencoding::encode(&token)
    );
    tracing::info!("Google sign-in successful for {} {}", kind, principal.email);

    Ok(Redirect::to(&redirect_url))
}
