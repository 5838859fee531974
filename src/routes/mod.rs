pub mod assets;
pub mod auth;
pub mod home;
pub mod messages;
pub mod users;

use askama::Template;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;

use crate::extractors::CurrentUser;
use crate::flash::{self, Flash};
use crate::routes::home::Html;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(home::index))
        .route("/assets/{*path}", get(assets::serve))
        .merge(auth::router())
        .merge(users::router())
        .merge(messages::router())
}

/// Data the base template needs on every page: the nav bar's view of the
/// current user and a pending flash notice, if any.
pub struct PageCtx {
    pub user: Option<NavUser>,
    pub flash: Option<FlashView>,
}

pub struct NavUser {
    pub id: String,
    pub username: String,
    pub image_url: String,
    pub csrf_token: String,
}

pub struct FlashView {
    pub level: &'static str,
    pub message: &'static str,
}

impl PageCtx {
    pub fn new(user: Option<&CurrentUser>, flash: Option<Flash>) -> Self {
        PageCtx {
            user: user.map(|u| NavUser {
                id: u.id.clone(),
                username: u.username.clone(),
                image_url: u.image_url.clone(),
                csrf_token: u.csrf_token.clone(),
            }),
            flash: flash.map(|f| FlashView {
                level: f.level(),
                message: f.message(),
            }),
        }
    }

    pub fn anon(flash: Option<Flash>) -> Self {
        Self::new(None, flash)
    }
}

/// Render a page, clearing the flash cookie when a notice was consumed.
pub fn page<T: Template>(template: T, consumed_flash: bool) -> Response {
    let mut response = Html(template).into_response();
    if consumed_flash {
        let (name, value) = flash::clear_header();
        response.headers_mut().append(name, value);
    }
    response
}
