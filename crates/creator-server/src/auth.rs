//! Caller identity
//!
//! The upstream auth layer terminates sessions and forwards the verified user
//! id in `x-creator-user` (and the contact address in `x-creator-email` when it
//! has one). The first request from a user creates their profile row.

use axum::{extract::FromRequestParts, http::StatusCode, http::request::Parts};

use creator_core::UserId;
use creator_core::account::provision_user;

use crate::error::{ApiError, api_error, creator_error};
use crate::state::AppState;

pub const USER_HEADER: &str = "x-creator-user";
pub const EMAIL_HEADER: &str = "x-creator-email";

/// Authenticated caller, with a provisioned account row
#[derive(Clone, Debug)]
pub struct Caller(pub UserId);

fn header<'a>(parts: &'a Parts, name: &str) -> Option<&'a str> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user = header(parts, USER_HEADER)
            .map(UserId::from_string)
            .ok_or_else(|| api_error(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", "Sign in required"))?;

        let email = header(parts, EMAIL_HEADER).filter(|email| email.contains('@'));
        provision_user(state.accounts.as_ref(), &user, email).map_err(creator_error)?;

        Ok(Self(user))
    }
}
