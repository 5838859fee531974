use askama::Template;
use axum::extract::{Path, State};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;

use crate::db::messages::{self, MessageView, MAX_MESSAGE_LEN};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::flash::{self, Flash, IncomingFlash};
use crate::routes::{page, PageCtx};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/messages/new", get(new_message_page).post(create_message))
        .route("/messages/{id}", get(show_message))
        .route("/messages/{id}/delete", post(delete_message))
        .route("/messages/{id}/like", post(toggle_like))
}

// -- Templates --

#[derive(Template)]
#[template(path = "pages/message_new.html")]
pub struct NewMessageTemplate {
    pub ctx: PageCtx,
    pub error: Option<String>,
    pub text: String,
}

#[derive(Template)]
#[template(path = "pages/message.html")]
pub struct MessageTemplate {
    pub ctx: PageCtx,
    pub message: MessageView,
    pub viewer_id: String,
    pub csrf_token: String,
    pub come_from: String,
}

// -- Forms --

#[derive(Deserialize)]
pub struct MessageForm {
    pub text: String,
}

#[derive(Deserialize)]
pub struct LikeForm {
    #[serde(default)]
    pub csrf_token: String,
    #[serde(default)]
    pub come_from: String,
}

fn validate_text(text: &str) -> Result<&str, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("Message text is required.".to_string());
    }
    if trimmed.chars().count() > MAX_MESSAGE_LEN {
        return Err(format!("Messages are limited to {} characters.", MAX_MESSAGE_LEN));
    }
    Ok(trimmed)
}

/// Like forms post back the page they came from. Only relative in-app paths
/// are honored; anything else falls back to the homepage.
fn sanitize_come_from(path: &str) -> &str {
    if path.starts_with('/') && !path.starts_with("//") && !path.contains('\\') {
        path
    } else {
        "/"
    }
}

// -- Handlers --

/// GET /messages/new
pub async fn new_message_page(
    user: CurrentUser,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    let consumed = flash.is_some();
    Ok(page(
        NewMessageTemplate {
            ctx: PageCtx::new(Some(&user), flash),
            error: None,
            text: String::new(),
        },
        consumed,
    ))
}

/// POST /messages/new — validate, create, redirect to the author's profile.
pub async fn create_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<MessageForm>,
) -> AppResult<Response> {
    let text = match validate_text(&form.text) {
        Ok(text) => text,
        Err(error) => {
            return Ok(page(
                NewMessageTemplate {
                    ctx: PageCtx::new(Some(&user), None),
                    error: Some(error),
                    text: form.text.clone(),
                },
                false,
            ));
        }
    };

    messages::create(&state.db, &user.id, text)?;
    Ok(Redirect::to(&format!("/users/{}", user.id)).into_response())
}

/// GET /messages/{id}
pub async fn show_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    let message = messages::find_view(&state.db, &id, &user.id)?.ok_or(AppError::NotFound)?;
    let consumed = flash.is_some();
    let come_from = format!("/messages/{}", message.id);
    Ok(page(
        MessageTemplate {
            ctx: PageCtx::new(Some(&user), flash),
            message,
            viewer_id: user.id.clone(),
            csrf_token: user.csrf_token.clone(),
            come_from,
        },
        consumed,
    ))
}

/// POST /messages/{id}/delete — only the author may delete their message.
pub async fn delete_message(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let message = messages::find(&state.db, &id)?.ok_or(AppError::NotFound)?;
    if message.user_id != user.id {
        tracing::warn!(user = %user.username, message_id = %id, "refused foreign message delete");
        return Ok(flash::redirect_with("/", Flash::Unauthorized));
    }

    messages::delete(&state.db, &id)?;
    Ok(Redirect::to(&format!("/users/{}", user.id)).into_response())
}

/// POST /messages/{id}/like — toggle, guarded by the session CSRF token,
/// then bounce back to the page the form was on.
pub async fn toggle_like(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    Form(form): Form<LikeForm>,
) -> AppResult<Response> {
    if form.csrf_token != user.csrf_token {
        return Ok(flash::redirect_with("/", Flash::Unauthorized));
    }

    messages::toggle_like(&state.db, &user.id, &id)?.ok_or(AppError::NotFound)?;

    Ok(Redirect::to(sanitize_come_from(&form.come_from)).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn come_from_accepts_relative_paths() {
        assert_eq!(sanitize_come_from("/"), "/");
        assert_eq!(sanitize_come_from("/users/abc/likes"), "/users/abc/likes");
    }

    #[test]
    fn come_from_rejects_external_targets() {
        assert_eq!(sanitize_come_from("https://evil.example"), "/");
        assert_eq!(sanitize_come_from("//evil.example"), "/");
        assert_eq!(sanitize_come_from(""), "/");
        assert_eq!(sanitize_come_from("/\\evil.example"), "/");
    }

    #[test]
    fn text_validation_bounds() {
        assert!(validate_text("hello").is_ok());
        assert!(validate_text("   ").is_err());
        assert!(validate_text(&"x".repeat(MAX_MESSAGE_LEN)).is_ok());
        assert!(validate_text(&"x".repeat(MAX_MESSAGE_LEN + 1)).is_err());
    }

    #[test]
    fn text_validation_trims() {
        assert_eq!(validate_text("  hi  ").unwrap(), "hi");
        // Length is checked after trimming
        let padded = format!("  {}  ", "x".repeat(MAX_MESSAGE_LEN));
        assert!(validate_text(&padded).is_ok());
    }
}
