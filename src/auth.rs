use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use std::{collections::HashMap, sync::Arc};

use crate::{
    error::AppError,
    models::Role,
    repository::{RepositoryState, parse_object_id},
};

/// Header carrying the caller's stored user id on protected routes.
pub const USER_ID_HEADER: &str = "x-user-id";

/// AuthUser
///
/// The resolved identity of a request. Handlers and gates read the id and role
/// from here; email and username are attached for convenience.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: String,
    pub role: Role,
    pub email: String,
    pub username: String,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// IdentityResolver
///
/// Turns an incoming request into an `AuthUser`. The header-trusting resolver
/// below is the only implementation today; a token-based one can be swapped in
/// through `AppState` without touching any handler.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Fails with `AppError::Unauthorized` when no identity can be established.
    async fn resolve(&self, parts: &Parts) -> Result<AuthUser, AppError>;
}

/// IdentityState
///
/// The concrete type used to share the identity resolver across the application state.
pub type IdentityState = Arc<dyn IdentityResolver>;

/// HeaderIdentityResolver
///
/// Trusts the `X-User-Id` header as-is: the value only has to be a well-formed
/// id belonging to a stored user. No signature or expiry is checked.
pub struct HeaderIdentityResolver {
    repo: RepositoryState,
}

impl HeaderIdentityResolver {
    pub fn new(repo: RepositoryState) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl IdentityResolver for HeaderIdentityResolver {
    async fn resolve(&self, parts: &Parts) -> Result<AuthUser, AppError> {
        let header = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized("Unauthorized (missing X-User-Id)".into()))?;

        let id = header
            .to_str()
            .ok()
            .filter(|id| parse_object_id(id).is_some())
            .ok_or_else(|| AppError::Unauthorized("Unauthorized".into()))?;

        let user = match self.repo.find_user(id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                return Err(AppError::Unauthorized(
                    "Unauthorized (user not found)".into(),
                ));
            }
            Err(e) => {
                tracing::warn!("identity lookup failed: {}", e);
                return Err(AppError::Unauthorized("Unauthorized".into()));
            }
        };

        Ok(AuthUser {
            id: user.id,
            role: user.role,
            email: user.email,
            username: user.username,
        })
    }
}

/// AuthUser Extractor Implementation
///
/// Delegates to the `IdentityResolver` held in state and caches the result in
/// the request extensions, so gate middleware and the handler resolve the
/// caller only once per request.
///
/// Rejection: `AppError::Unauthorized` (401) on any failure.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    IdentityState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(user.clone());
        }

        let resolver = IdentityState::from_ref(state);
        let user = resolver.resolve(parts).await?;
        parts.extensions.insert(user.clone());
        Ok(user)
    }
}

// --- Authorization gate ---

/// Passes only for admins.
pub fn require_admin(user: &AuthUser) -> Result<(), AppError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}

/// Passes for admins, or when the caller's id equals the path parameter
/// named `param`.
pub fn self_or_admin(
    user: &AuthUser,
    params: &HashMap<String, String>,
    param: &str,
) -> Result<(), AppError> {
    if user.is_admin() || params.get(param).is_some_and(|target| *target == user.id) {
        Ok(())
    } else {
        Err(AppError::Forbidden)
    }
}
