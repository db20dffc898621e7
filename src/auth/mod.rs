/*!
 * # Authentication
 *
 * Bearer-token authentication for the storefront API. Tokens are issued by
 * an external identity service; this module only validates them (HS256,
 * issuer, audience, expiry) and turns the claims into request extractors:
 *
 * - [`AuthUser`] for any signed-in customer
 * - [`AdminUser`] for routes that require the `admin` role
 */

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{header, request::Parts, HeaderMap},
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use crate::{config::AppConfig, errors::ServiceError, services::orders::Actor};

/// Role that unlocks admin routes
pub const ADMIN_ROLE: &str = "admin";

/// Claim structure for JWT tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user ID)
    #[serde(default)]
    pub roles: Vec<String>,
    pub iss: String,
    pub aud: String,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub roles: Vec<String>,
}

impl AuthUser {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }

    /// The caller as seen by the order services.
    pub fn actor(&self) -> Actor {
        if self.is_admin() {
            Actor::admin(self.user_id)
        } else {
            Actor::customer(self.user_id)
        }
    }
}

/// An [`AuthUser`] holding the admin role.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub issuer: String,
    pub audience: String,
}

impl AuthConfig {
    pub fn new(jwt_secret: String, issuer: String, audience: String) -> Self {
        Self {
            jwt_secret,
            issuer,
            audience,
        }
    }
}

impl From<&AppConfig> for AuthConfig {
    fn from(config: &AppConfig) -> Self {
        Self::new(
            config.jwt_secret.clone(),
            config.jwt_issuer.clone(),
            config.jwt_audience.clone(),
        )
    }
}

/// Authentication errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Missing token")]
    MissingToken,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Insufficient permissions")]
    InsufficientPermissions,
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken => {
                ServiceError::Unauthorized("No authentication token provided".to_string())
            }
            AuthError::InvalidToken => {
                ServiceError::Unauthorized("Invalid authentication token".to_string())
            }
            AuthError::TokenExpired => ServiceError::Unauthorized("Token has expired".to_string()),
            AuthError::InsufficientPermissions => {
                ServiceError::Forbidden("Admin role required".to_string())
            }
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        ServiceError::from(self).into_response()
    }
}

/// Validates bearer tokens against the configured key, issuer and audience.
pub struct AuthService {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AuthService {
    pub fn new(config: AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[config.issuer.as_str()]);
        validation.set_audience(&[config.audience.as_str()]);
        Self {
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
        }
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                _ => {
                    debug!(error = %e, "Rejected bearer token");
                    AuthError::InvalidToken
                }
            })
    }

    pub fn authenticate(&self, headers: &HeaderMap) -> Result<AuthUser, AuthError> {
        let token = bearer_token(headers).ok_or(AuthError::MissingToken)?;
        let claims = self.validate_token(token)?;
        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| AuthError::InvalidToken)?;
        Ok(AuthUser {
            user_id,
            roles: claims.roles,
        })
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }
        let auth = Arc::<AuthService>::from_ref(state);
        let user = auth.authenticate(&parts.headers)?;
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    Arc<AuthService>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_admin() {
            return Err(AuthError::InsufficientPermissions);
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "unit-test-secret-unit-test-secret-unit-test-secret-unit-test-secret";

    fn service() -> AuthService {
        AuthService::new(AuthConfig::new(
            SECRET.to_string(),
            "perfume-auth".to_string(),
            "perfume-store".to_string(),
        ))
    }

    fn token(sub: &str, roles: &[&str], aud: &str, exp_offset: i64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            iss: "perfume-auth".to_string(),
            aud: aud.to_string(),
            exp: Utc::now().timestamp() + exp_offset,
            iat: Some(Utc::now().timestamp()),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn valid_token_yields_user_and_roles() {
        let id = Uuid::new_v4();
        let bearer = format!("Bearer {}", token(&id.to_string(), &["admin"], "perfume-store", 600));
        let user = service().authenticate(&headers(&bearer)).unwrap();
        assert_eq!(user.user_id, id);
        assert!(user.is_admin());
        assert!(user.actor().is_admin);
    }

    #[test]
    fn missing_and_malformed_headers_are_rejected() {
        let svc = service();
        assert_eq!(
            svc.authenticate(&HeaderMap::new()).unwrap_err(),
            AuthError::MissingToken
        );
        assert_eq!(
            svc.authenticate(&headers("Basic abc")).unwrap_err(),
            AuthError::MissingToken
        );
        assert_eq!(
            svc.authenticate(&headers("Bearer not-a-jwt")).unwrap_err(),
            AuthError::InvalidToken
        );
    }

    #[test]
    fn wrong_audience_expired_and_non_uuid_subjects_fail() {
        let svc = service();
        let id = Uuid::new_v4().to_string();
        let wrong_aud = format!("Bearer {}", token(&id, &[], "someone-else", 600));
        assert_eq!(
            svc.authenticate(&headers(&wrong_aud)).unwrap_err(),
            AuthError::InvalidToken
        );

        let expired = format!("Bearer {}", token(&id, &[], "perfume-store", -3600));
        assert_eq!(
            svc.authenticate(&headers(&expired)).unwrap_err(),
            AuthError::TokenExpired
        );

        let not_uuid = format!("Bearer {}", token("user-42", &[], "perfume-store", 600));
        assert_eq!(
            svc.authenticate(&headers(&not_uuid)).unwrap_err(),
            AuthError::InvalidToken
        );
    }

    #[test]
    fn auth_errors_map_to_401_and_403() {
        assert_eq!(
            ServiceError::from(AuthError::MissingToken).status_code(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::from(AuthError::InsufficientPermissions).status_code(),
            StatusCode::FORBIDDEN
        );
    }
}
