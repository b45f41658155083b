//! Admin authentication: single password, bearer tokens, lockout.
//!
//! Exactly one credential row exists at a time. Five failed logins lock the
//! account for fifteen minutes. Tokens are HS256 JWTs signed with a secret
//! persisted next to the database.

use anyhow::{Context, Result as AnyResult};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use sqlx::SqlitePool;
use std::path::Path;

use crate::error::{AppError, Result};
use crate::models::{AdminAuthRecord, AuthStatus, Claims};

const MAX_LOGIN_ATTEMPTS: i64 = 5;
const LOCKOUT_MINUTES: i64 = 15;
const MIN_PASSWORD_LENGTH: usize = 8;

pub struct AuthService {
    pool: SqlitePool,
    jwt_secret: String,
}

impl AuthService {
    pub fn new(pool: SqlitePool, data_dir: &Path) -> AnyResult<Self> {
        let jwt_secret = load_or_create_secret(data_dir)?;
        Ok(Self { pool, jwt_secret })
    }

    #[cfg(test)]
    pub fn with_secret(pool: SqlitePool, jwt_secret: String) -> Self {
        Self { pool, jwt_secret }
    }

    /// True until an admin password has been set.
    pub async fn is_first_time_setup(&self) -> Result<bool> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM admin_auth")
            .fetch_one(&self.pool)
            .await?;
        Ok(count == 0)
    }

    /// Set (or replace) the admin password. Only one record survives.
    pub async fn set_admin_password(&self, password: &str) -> Result<()> {
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(AppError::invalid_input(
                "Password must be at least 8 characters long",
            ));
        }
        let password_hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)?;

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM admin_auth").execute(&mut *tx).await?;
        sqlx::query("INSERT INTO admin_auth (password_hash, created_at) VALUES (?, ?)")
            .bind(&password_hash)
            .bind(Utc::now())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("Admin password set");
        Ok(())
    }

    async fn current_record(&self) -> Result<Option<AdminAuthRecord>> {
        let record = sqlx::query_as::<_, AdminAuthRecord>(
            r#"
            SELECT password_hash, created_at, last_login, login_attempts, locked_until
            FROM admin_auth
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    /// Verify the admin password, tracking failed attempts and lockout.
    pub async fn verify_password(&self, password: &str) -> Result<bool> {
        let Some(record) = self.current_record().await? else {
            return Ok(false);
        };

        if let Some(locked_until) = record.locked_until {
            let now = Utc::now();
            if now < locked_until {
                let minutes_remaining = ((locked_until - now).num_seconds() + 59) / 60;
                return Err(AppError::Locked { minutes_remaining });
            }
        }

        if bcrypt::verify(password, &record.password_hash)? {
            sqlx::query(
                "UPDATE admin_auth SET login_attempts = 0, last_login = ?, locked_until = NULL",
            )
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
            return Ok(true);
        }

        let attempts = record.login_attempts + 1;
        let locked_until = if attempts >= MAX_LOGIN_ATTEMPTS {
            Some(Utc::now() + ChronoDuration::minutes(LOCKOUT_MINUTES))
        } else {
            None
        };
        sqlx::query("UPDATE admin_auth SET login_attempts = ?, locked_until = ?")
            .bind(attempts)
            .bind(locked_until)
            .execute(&self.pool)
            .await?;

        if locked_until.is_some() {
            tracing::warn!(attempts, "Admin account locked after repeated failures");
            return Err(AppError::Locked {
                minutes_remaining: LOCKOUT_MINUTES,
            });
        }
        Ok(false)
    }

    pub fn generate_token(&self, expires_hours: u64) -> Result<String> {
        let now = Utc::now();
        let claims = Claims {
            admin: true,
            iat: now.timestamp(),
            exp: (now + ChronoDuration::hours(expires_hours as i64)).timestamp(),
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn verify_token(&self, token: &str) -> bool {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_bytes()),
            &Validation::default(),
        )
        .map(|data| data.claims.admin)
        .unwrap_or(false)
    }

    pub async fn auth_status(&self) -> Result<AuthStatus> {
        let Some(record) = self.current_record().await? else {
            return Ok(AuthStatus {
                setup_required: true,
                locked: false,
                last_login: None,
                created_at: None,
                login_attempts: 0,
            });
        };
        let locked = record
            .locked_until
            .map(|until| Utc::now() < until)
            .unwrap_or(false);
        Ok(AuthStatus {
            setup_required: false,
            locked,
            last_login: record.last_login,
            created_at: Some(record.created_at),
            login_attempts: record.login_attempts,
        })
    }
}

/// The JWT signing secret lives in a file next to the database so tokens
/// survive restarts.
fn load_or_create_secret(data_dir: &Path) -> AnyResult<String> {
    let secret_file = data_dir.join(".secret_key");
    if secret_file.exists() {
        return Ok(std::fs::read_to_string(&secret_file)
            .context("Failed to read JWT secret")?
            .trim()
            .to_string());
    }

    std::fs::create_dir_all(data_dir).context("Failed to create data directory")?;
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    let secret: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    std::fs::write(&secret_file, &secret).context("Failed to persist JWT secret")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = std::fs::set_permissions(&secret_file, std::fs::Permissions::from_mode(0o600));
    }
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{create_test_pool, run_migrations};

    async fn test_service() -> AuthService {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        AuthService::with_secret(pool, "test-secret".to_string())
    }

    #[tokio::test]
    async fn setup_then_login_round_trip() {
        let auth = test_service().await;
        assert!(auth.is_first_time_setup().await.unwrap());

        auth.set_admin_password("correct horse").await.unwrap();
        assert!(!auth.is_first_time_setup().await.unwrap());

        assert!(auth.verify_password("correct horse").await.unwrap());
        assert!(!auth.verify_password("wrong horse").await.unwrap());
    }

    #[tokio::test]
    async fn short_passwords_are_rejected() {
        let auth = test_service().await;
        assert!(auth.set_admin_password("short").await.is_err());
    }

    #[tokio::test]
    async fn five_failures_lock_the_account() {
        let auth = test_service().await;
        auth.set_admin_password("correct horse").await.unwrap();

        for _ in 0..4 {
            assert!(!auth.verify_password("wrong").await.unwrap());
        }
        // Fifth failure trips the lock.
        let err = auth.verify_password("wrong").await.unwrap_err();
        assert!(matches!(err, AppError::Locked { .. }));

        // Even the correct password is refused while locked.
        let err = auth.verify_password("correct horse").await.unwrap_err();
        assert!(matches!(err, AppError::Locked { .. }));

        let status = auth.auth_status().await.unwrap();
        assert!(status.locked);
    }

    #[tokio::test]
    async fn successful_login_resets_attempts() {
        let auth = test_service().await;
        auth.set_admin_password("correct horse").await.unwrap();

        assert!(!auth.verify_password("wrong").await.unwrap());
        assert!(auth.verify_password("correct horse").await.unwrap());

        let status = auth.auth_status().await.unwrap();
        assert_eq!(status.login_attempts, 0);
        assert!(status.last_login.is_some());
    }

    #[tokio::test]
    async fn tokens_verify_and_reject_garbage() {
        let auth = test_service().await;
        let token = auth.generate_token(24).unwrap();
        assert!(auth.verify_token(&token));
        assert!(!auth.verify_token("not-a-token"));
    }
}
