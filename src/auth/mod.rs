/*!
 * # Authentication
 *
 * Bearer-token verification for the storefront API. Tokens are issued by the
 * account service and signed with a shared HS256 secret; this module only
 * verifies them and exposes the caller as [`AuthUser`].
 */

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::config::AppConfig;
use crate::errors::ServiceError;

pub const ADMIN_ROLE: &str = "admin";

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,           // Subject (user ID)
    pub email: Option<String>, // User's email
    #[serde(default)]
    pub roles: Vec<String>, // User's roles
    pub iat: i64,              // Issued at time
    pub exp: i64,              // Expiration time
    pub iss: String,           // Issuer
    pub aud: String,           // Audience
}

/// Authenticated user data extracted from the JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub email: Option<String>,
    pub roles: Vec<String>,
}

impl AuthUser {
    /// Check if the user has a specific role
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Check if the user is an admin
    pub fn is_admin(&self) -> bool {
        self.has_role(ADMIN_ROLE)
    }
}

/// Reads the caller stored by [`auth_middleware`].
#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| ServiceError::Unauthorized("Missing authentication".to_string()))
    }
}

/// Verifies bearer tokens against the configured secret, issuer and audience.
#[derive(Clone)]
pub struct JwtVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str, issuer: &str, audience: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[issuer]);
        validation.set_audience(&[audience]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::new(&cfg.jwt_secret, &cfg.auth_issuer, &cfg.auth_audience)
    }

    /// Validate a JWT token and extract the caller
    pub fn verify(&self, token: &str) -> Result<AuthUser, ServiceError> {
        let claims = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ServiceError::Unauthorized("Token has expired".to_string())
                }
                _ => ServiceError::Unauthorized("Invalid token".to_string()),
            })?
            .claims;

        let user_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::Unauthorized("Invalid token subject".to_string()))?;

        Ok(AuthUser {
            user_id,
            email: claims.email,
            roles: claims.roles,
        })
    }
}

fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authentication middleware that validates the bearer token and stores the
/// caller in request extensions.
pub async fn auth_middleware(
    State(verifier): State<Arc<JwtVerifier>>,
    mut request: Request,
    next: Next,
) -> Response {
    let user = match bearer_token(&request) {
        Some(token) => verifier.verify(token),
        None => Err(ServiceError::Unauthorized(
            "Missing authentication".to_string(),
        )),
    };

    match user {
        Ok(user) => {
            debug!(user_id = %user.user_id, "authenticated request");
            request.extensions_mut().insert(user);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Rejects callers without the admin role. Must run after [`auth_middleware`].
pub async fn admin_middleware(request: Request, next: Next) -> Response {
    match request.extensions().get::<AuthUser>() {
        Some(user) if user.is_admin() => next.run(request).await,
        Some(_) => ServiceError::Forbidden("Admin role required".to_string()).into_response(),
        None => ServiceError::Unauthorized("Missing authentication".to_string()).into_response(),
    }
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self, verifier: Arc<JwtVerifier>) -> Self;
    fn with_admin(self, verifier: Arc<JwtVerifier>) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self, verifier: Arc<JwtVerifier>) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            verifier,
            auth_middleware,
        ))
    }

    fn with_admin(self, verifier: Arc<JwtVerifier>) -> Self {
        self.layer(axum::middleware::from_fn(admin_middleware))
            .with_auth(verifier)
    }
}
