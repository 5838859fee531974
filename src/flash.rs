//! One-shot notices carried across a redirect in a short-lived cookie.
//!
//! The cookie holds a fixed code, never free text, so no value escaping is
//! needed. The next rendered page consumes the code and clears the cookie.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use std::convert::Infallible;

pub const FLASH_COOKIE: &str = "warbler_flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flash {
    /// A gated route was hit without a valid session.
    Unauthorized,
    /// Successful login.
    Welcome,
}

impl Flash {
    fn code(self) -> &'static str {
        match self {
            Flash::Unauthorized => "unauthorized",
            Flash::Welcome => "welcome",
        }
    }

    fn from_code(code: &str) -> Option<Self> {
        match code {
            "unauthorized" => Some(Flash::Unauthorized),
            "welcome" => Some(Flash::Welcome),
            _ => None,
        }
    }

    pub fn level(self) -> &'static str {
        match self {
            Flash::Unauthorized => "danger",
            Flash::Welcome => "success",
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Flash::Unauthorized => "Access unauthorized.",
            Flash::Welcome => "Welcome back!",
        }
    }
}

fn set_cookie(flash: Flash) -> String {
    format!(
        "{}={}; SameSite=Strict; Path=/; Max-Age=60",
        FLASH_COOKIE,
        flash.code()
    )
}

pub fn clear_header() -> (HeaderName, HeaderValue) {
    (
        header::SET_COOKIE,
        HeaderValue::from_static("warbler_flash=; SameSite=Strict; Path=/; Max-Age=0"),
    )
}

/// 303 redirect that plants a flash cookie for the next page render.
pub fn redirect_with(to: &str, flash: Flash) -> Response {
    (
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, to.to_string()),
            (header::SET_COOKIE, set_cookie(flash)),
        ],
    )
        .into_response()
}

/// Extractor for a pending flash, if any. Never rejects.
pub struct IncomingFlash(pub Option<Flash>);

impl<S> FromRequestParts<S> for IncomingFlash
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let flash = parts
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
                if key == FLASH_COOKIE {
                    Flash::from_code(val)
                } else {
                    None
                }
            });

        Ok(IncomingFlash(flash))
    }
}
