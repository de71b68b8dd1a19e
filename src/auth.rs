//! Bearer-token authentication for API routes.

use anyhow::Result;
use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    models::{ErrorResponse, Owner, Principal, PrincipalKind},
    AppState,
};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub kind: PrincipalKind,
    pub exp: usize,
}

pub fn create_jwt(principal: &Principal, secret: &str, expiry_hours: i64) -> Result<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::hours(expiry_hours))
        .ok_or_else(|| anyhow::anyhow!("JWT expiry out of range"))?
        .timestamp();

    let claims = Claims {
        sub: principal.id,
        kind: principal.kind,
        exp: expiration as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;

    Ok(token)
}

pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;

    Ok(token_data.claims)
}

/// The signed-in principal, loaded fresh from the store on every request
pub struct AuthUser {
    pub principal: Principal,
}

impl AuthUser {
    pub fn owner(&self) -> Owner {
        self.principal.owner()
    }
}

fn unauthorized(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            message: message.to_string(),
            error: "unauthorized".to_string(),
        }),
    )
        .into_response()
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or_else(|| unauthorized("Missing bearer token"))?;

        let claims = verify_jwt(token, &state.config.jwt_secret).map_err(|e| {
            tracing::debug!("Rejected bearer token: {}", e);
            unauthorized("Invalid or expired token")
        })?;

        let principal = state
            .store
            .get_principal(Owner::new(claims.kind, claims.sub))
            .await
            .map_err(|e| {
                tracing::error!("Failed to load principal for token: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            })?
            .ok_or_else(|| unauthorized("Unknown principal"))?;

        Ok(AuthUser { principal })
    }
}
