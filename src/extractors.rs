use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use axum::response::{IntoResponse, Response};
use rusqlite::params;

use crate::flash::{self, Flash};
use crate::state::AppState;

/// The currently authenticated user, resolved from the session cookie.
/// This is the single login gate: every protected handler takes it as an
/// argument instead of re-checking the session by hand.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    pub image_url: String,
    pub csrf_token: String,
    /// The opaque cookie token, kept so logout can delete the session row.
    pub session_token: String,
}

/// Rejection for `CurrentUser`: flash "Access unauthorized." and bounce to
/// the home page, mirroring how every gated page fails for anonymous
/// visitors.
pub struct AuthRedirect;

impl IntoResponse for AuthRedirect {
    fn into_response(self) -> Response {
        flash::redirect_with("/", Flash::Unauthorized)
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AuthRedirect;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token =
            session_token(parts, &state.config.auth.cookie_name).ok_or(AuthRedirect)?;

        let conn = state.db.get().map_err(|_| AuthRedirect)?;
        conn.query_row(
            "SELECT u.id, u.username, u.image_url, s.csrf_token, s.token FROM sessions s \
             JOIN users u ON u.id = s.user_id \
             WHERE s.token = ?1 AND s.expires_at > datetime('now')",
            params![token],
            |row| {
                Ok(CurrentUser {
                    id: row.get(0)?,
                    username: row.get(1)?,
                    image_url: row.get(2)?,
                    csrf_token: row.get(3)?,
                    session_token: row.get(4)?,
                })
            },
        )
        .map_err(|_| AuthRedirect)
    }
}

/// Optional variant for routes that serve both anonymous and logged-in
/// visitors (the homepage). Never rejects.
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(_) => Ok(MaybeUser(None)),
        }
    }
}

fn session_token<'a>(parts: &'a Parts, cookie_name: &str) -> Option<&'a str> {
    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|s| s.split(';'))
        .map(|s| s.trim())
        .find_map(|cookie| {
            let mut split = cookie.splitn(2, '=');
            let key = split.next()?.trim();
            let val = split.next()?.trim();
            if key == cookie_name {
                Some(val)
            } else {
                None
            }
        })
}
