use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{error::AppError, state::AppState};

/// Header carrying the anonymous cart session of a guest.
pub const SESSION_HEADER: &str = "x-session-id";

#[derive(Debug, Deserialize, Serialize)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    /// Present when the user operates a vendor account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<String>,
    pub exp: usize,
}

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: String,
    pub vendor_id: Option<Uuid>,
}

impl AuthUser {
    pub fn customer(user_id: Uuid) -> Self {
        Self {
            user_id,
            role: "user".into(),
            vendor_id: None,
        }
    }
}

/// The authenticated user acting through their vendor account.
#[derive(Debug, Clone)]
pub struct VendorUser {
    pub user: AuthUser,
    pub vendor_id: Uuid,
}

/// Who owns the cart of the current request.
#[derive(Debug, Clone)]
pub enum Identity {
    User(AuthUser),
    Guest(String),
}

pub fn ensure_role(user: &AuthUser, role: &str) -> Result<(), AppError> {
    if user.role != role {
        return Err(AppError::Forbidden);
    }
    Ok(())
}

pub fn ensure_admin(user: &AuthUser) -> Result<(), AppError> {
    ensure_role(user, "admin")
}

/// Sign a bearer token for `user`, valid for `ttl`.
pub fn issue_token(secret: &str, user: &AuthUser, ttl: Duration) -> Result<String, AppError> {
    let expiration = Utc::now()
        .checked_add_signed(ttl)
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user.user_id.to_string(),
        role: user.role.clone(),
        vendor_id: user.vendor_id.map(|id| id.to_string()),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

fn bearer_token(headers: &HeaderMap) -> Result<Option<&str>, AppError> {
    let Some(auth_header) = headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let auth_str = auth_header
        .to_str()
        .map_err(|_| AppError::Unauthorized("Invalid Authorization header".into()))?;
    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Unauthorized("Invalid Authorization scheme".into()))?;
    Ok(Some(token.trim()))
}

fn decode_user(token: &str, secret: &str) -> Result<AuthUser, AppError> {
    let decoded = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|_| AppError::Unauthorized("Invalid or expired token".into()))?;

    let user_id = Uuid::parse_str(&decoded.claims.sub)
        .map_err(|_| AppError::Unauthorized("Invalid user id in token".into()))?;
    let vendor_id = decoded
        .claims
        .vendor_id
        .as_deref()
        .map(Uuid::parse_str)
        .transpose()
        .map_err(|_| AppError::Unauthorized("Invalid vendor id in token".into()))?;

    Ok(AuthUser {
        user_id,
        role: decoded.claims.role,
        vendor_id,
    })
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?
            .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".into()))?;
        decode_user(token, &state.jwt_secret)
    }
}

impl FromRequestParts<AppState> for VendorUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        let vendor_id = user.vendor_id.ok_or(AppError::Forbidden)?;
        Ok(VendorUser { user, vendor_id })
    }
}

impl FromRequestParts<AppState> for Identity {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(token) = bearer_token(&parts.headers)? {
            return decode_user(token, &state.jwt_secret).map(Identity::User);
        }

        let session = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty() && value.len() <= 128)
            .ok_or_else(|| {
                AppError::Unauthorized(format!(
                    "Provide a bearer token or an {SESSION_HEADER} header"
                ))
            })?;

        Ok(Identity::Guest(session.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trips_vendor_claim() {
        let user = AuthUser {
            user_id: Uuid::new_v4(),
            role: "vendor".into(),
            vendor_id: Some(Uuid::new_v4()),
        };
        let token = issue_token("secret", &user, Duration::hours(1)).expect("token");
        let decoded = decode_user(&token, "secret").expect("decoded");
        assert_eq!(decoded.user_id, user.user_id);
        assert_eq!(decoded.vendor_id, user.vendor_id);
        assert_eq!(decoded.role, "vendor");
    }

    #[test]
    fn wrong_secret_is_unauthorized() {
        let token = issue_token(
            "secret",
            &AuthUser::customer(Uuid::new_v4()),
            Duration::hours(1),
        )
        .expect("token");
        assert!(matches!(
            decode_user(&token, "other"),
            Err(AppError::Unauthorized(_))
        ));
    }

    #[test]
    fn non_bearer_scheme_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, "Basic abc".parse().expect("header"));
        assert!(bearer_token(&headers).is_err());
        assert!(bearer_token(&HeaderMap::new()).expect("no header").is_none());
    }
}
