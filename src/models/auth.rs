//! Admin authentication records and request payloads.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single admin credential row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdminAuthRecord {
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub login_attempts: i64,
    pub locked_until: Option<DateTime<Utc>>,
}

/// JWT claims for admin bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub admin: bool,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Deserialize)]
pub struct SetupRequest {
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub success: bool,
    pub token: Option<String>,
    pub message: String,
    pub expires_hours: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct AuthStatus {
    pub setup_required: bool,
    pub locked: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub login_attempts: i64,
}
