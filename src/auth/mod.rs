//! JWT verification.
//!
//! This crate never mints tokens — it only validates the bearer JWT an
//! upstream identity provider (Supabase) already issued, and extracts the
//! caller's user id and workspace for the permission gate and tool context.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::ExposeSecret;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::AppError;
use crate::http::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub workspace_id: Option<Uuid>,
    #[allow(dead_code)]
    pub exp: usize,
}

/// Verifies an HS256 JWT against the configured `SUPABASE_JWT_SECRET`.
/// Returns the decoded claims on success.
pub fn verify_jwt(token: &str, secret: &secrecy::SecretString) -> Result<Claims, AppError> {
    let key = DecodingKey::from_secret(secret.expose_secret().as_bytes());
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    // Supabase-issued tokens carry an `aud` claim; this crate only consumes
    // verification and does not need to assert a specific audience.
    validation.validate_aud = false;

    decode::<Claims>(token, &key, &validation)
        .map(|data| data.claims)
        .map_err(|_| AppError::AuthRequired)
}

/// Authenticated caller, extracted from the `Authorization: Bearer ...`
/// header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub workspace_id: Option<Uuid>,
    pub token: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::AuthRequired)?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or(AppError::AuthRequired)?
            .to_string();

        let claims = verify_jwt(&token, &state.config.auth.jwt_secret)?;

        Ok(AuthUser {
            user_id: claims.sub,
            workspace_id: claims.workspace_id,
            token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};

    fn sign(claims: &Claims, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn verifies_valid_token() {
        let secret = secrecy::SecretString::from("test-secret".to_string());
        let claims = Claims {
            sub: "user-1".to_string(),
            workspace_id: Some(Uuid::new_v4()),
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        let token = sign(&claims, "test-secret");
        let decoded = verify_jwt(&token, &secret).unwrap();
        assert_eq!(decoded.sub, "user-1");
    }

    #[test]
    fn rejects_wrong_secret() {
        let claims = Claims {
            sub: "user-1".to_string(),
            workspace_id: None,
            exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        };
        let token = sign(&claims, "right-secret");
        let wrong = secrecy::SecretString::from("wrong-secret".to_string());
        assert!(verify_jwt(&token, &wrong).is_err());
    }

    #[test]
    fn rejects_expired_token() {
        let secret = secrecy::SecretString::from("test-secret".to_string());
        let claims = Claims {
            sub: "user-1".to_string(),
            workspace_id: None,
            exp: (chrono::Utc::now().timestamp() - 3600) as usize,
        };
        let token = sign(&claims, "test-secret");
        assert!(verify_jwt(&token, &secret).is_err());
    }
}
