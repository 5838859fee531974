use askama::Template;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::db::messages::{self, MessageView};
use crate::error::AppResult;
use crate::extractors::MaybeUser;
use crate::flash::IncomingFlash;
use crate::routes::{page, PageCtx};
use crate::state::AppState;

/// How many messages the homepage feed shows.
const FEED_LIMIT: u32 = 100;

#[derive(Template)]
#[template(path = "pages/landing.html")]
pub struct LandingTemplate {
    pub ctx: PageCtx,
}

#[derive(Template)]
#[template(path = "pages/feed.html")]
pub struct FeedTemplate {
    pub ctx: PageCtx,
    pub messages: Vec<MessageView>,
    pub viewer_id: String,
    pub csrf_token: String,
    pub come_from: String,
}

/// Wrapper to render askama templates as axum responses
pub struct Html<T: Template>(pub T);

impl<T: Template> IntoResponse for Html<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(body) => (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/html; charset=utf-8")],
                body,
            )
                .into_response(),
            Err(e) => {
                tracing::error!("Template render error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Template error").into_response()
            }
        }
    }
}

/// GET / — feed for the logged-in user, landing page for everyone else.
/// The anonymous branch never touches the message store.
pub async fn index(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    let consumed = flash.is_some();

    match maybe_user.0 {
        Some(user) => {
            let feed = messages::feed(&state.db, &user.id, FEED_LIMIT)?;
            Ok(page(
                FeedTemplate {
                    ctx: PageCtx::new(Some(&user), flash),
                    messages: feed,
                    viewer_id: user.id.clone(),
                    csrf_token: user.csrf_token.clone(),
                    come_from: "/".to_string(),
                },
                consumed,
            ))
        }
        None => Ok(page(
            LandingTemplate {
                ctx: PageCtx::anon(flash),
            },
            consumed,
        )),
    }
}
