use crate::error::AppError;
use crate::models::{MemberRole, UserProfile};
use crate::state::AppState;
use crate::users;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

/// Authentication happens upstream; the member id reaches us in this header.
pub const MEMBER_HEADER: &str = "x-member-id";

/// Who is making the request, loaded fresh for every request.
#[derive(Debug, Clone)]
pub struct Session {
    pub uid: String,
    pub profile: Option<UserProfile>,
    pub admin: bool,
}

impl Session {
    pub fn role(&self) -> MemberRole {
        if self.admin {
            return MemberRole::Admin;
        }
        match self.profile.as_ref().map(|p| p.role) {
            Some(MemberRole::Performer) => MemberRole::Performer,
            _ => MemberRole::Member,
        }
    }

    pub fn require_admin(&self) -> Result<(), AppError> {
        if self.admin {
            Ok(())
        } else {
            Err(AppError::Forbidden("admins only".to_string()))
        }
    }

    pub fn display_name(&self) -> Option<String> {
        self.profile.as_ref().and_then(|p| p.display_name.clone())
    }
}

impl FromRequestParts<AppState> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let uid = parts
            .headers
            .get(MEMBER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or(AppError::Unauthorized)?
            .to_string();

        let profile = users::get_profile(&state.store, &uid).await?;
        let admin = users::is_admin(&state.store, &uid).await?;
        Ok(Session { uid, profile, admin })
    }
}
