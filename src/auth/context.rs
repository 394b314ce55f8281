use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use uuid::Uuid;

use crate::error::ApiError;

pub const X_USER_ID: &str = "x-user-id";
pub const X_COMPANY_ID: &str = "x-company-id";
pub const X_USER_ROLE: &str = "x-user-role";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRole {
    /// Regular company member.
    Member,
    /// Elevated role; may administer any tender.
    Admin,
}

impl ActorRole {
    fn from_header(value: Option<&str>) -> Self {
        match value {
            Some("admin") => Self::Admin,
            _ => Self::Member,
        }
    }
}

/// Verified actor identity supplied by the upstream gateway.
#[derive(Debug, Clone)]
pub struct ActorContext {
    pub user_id: Uuid,
    pub company_id: Uuid,
    pub role: ActorRole,
}

impl ActorContext {
    pub fn is_admin(&self) -> bool {
        self.role == ActorRole::Admin
    }

    pub fn from_headers(headers: &HeaderMap) -> Result<Self, ApiError> {
        let user_id = header_uuid(headers, X_USER_ID)?;
        let company_id = header_uuid(headers, X_COMPANY_ID)?;
        let role = ActorRole::from_header(
            headers.get(X_USER_ROLE).and_then(|v| v.to_str().ok()),
        );

        Ok(Self {
            user_id,
            company_id,
            role,
        })
    }
}

fn header_uuid(headers: &HeaderMap, name: &str) -> Result<Uuid, ApiError> {
    let value = headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::unauthorized(format!("Missing {name} header")))?;
    Uuid::parse_str(value).map_err(|_| ApiError::unauthorized(format!("Invalid {name} header")))
}

#[async_trait]
impl<S> FromRequestParts<S> for ActorContext
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers)
    }
}
