//! Admin authentication endpoints.

use axum::{extract::State, Json};

use crate::error::{AppError, Result};
use crate::models::{AuthResponse, LoginRequest, SetupRequest};
use crate::AppState;

const TOKEN_HOURS: u64 = 24;
const REMEMBER_ME_TOKEN_HOURS: u64 = 24 * 30;

pub async fn auth_status(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let status = state.auth.auth_status().await?;
    Ok(Json(serde_json::to_value(status)?))
}

/// First-time password setup. Refused once an admin password exists.
pub async fn setup(
    State(state): State<AppState>,
    Json(request): Json<SetupRequest>,
) -> Result<Json<AuthResponse>> {
    if !state.auth.is_first_time_setup().await? {
        return Err(AppError::conflict("Setup has already been completed"));
    }
    state.auth.set_admin_password(&request.password).await?;
    let token = state.auth.generate_token(TOKEN_HOURS)?;
    Ok(Json(AuthResponse {
        success: true,
        token: Some(token),
        message: "Admin password set".to_string(),
        expires_hours: Some(TOKEN_HOURS),
    }))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>> {
    if state.auth.is_first_time_setup().await? {
        return Err(AppError::conflict("Setup required before login"));
    }
    if !state.auth.verify_password(&request.password).await? {
        return Err(AppError::Unauthorized);
    }

    let expires_hours = if request.remember_me {
        REMEMBER_ME_TOKEN_HOURS
    } else {
        TOKEN_HOURS
    };
    let token = state.auth.generate_token(expires_hours)?;
    Ok(Json(AuthResponse {
        success: true,
        token: Some(token),
        message: "Login successful".to_string(),
        expires_hours: Some(expires_hours),
    }))
}
