use askama::Template;
use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;

use crate::db::messages::{self, MessageView};
use crate::db::models::User;
use crate::db::users::{self, ProfileUpdate, UpdateOutcome, UserStats};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::flash::IncomingFlash;
use crate::routes::auth::validate_identity;
use crate::routes::{page, PageCtx};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/profile", get(profile_page).post(edit_profile))
        .route("/users/delete", post(delete_account))
        .route("/users/{id}", get(show_user))
        .route("/users/{id}/following", get(show_following))
        .route("/users/{id}/followers", get(show_followers))
        .route("/users/{id}/likes", get(show_likes))
        .route("/users/follow/{id}", post(start_following))
        .route("/users/stop-following/{id}", post(stop_following))
}

// -- Templates --

#[derive(Template)]
#[template(path = "pages/users.html")]
pub struct UsersTemplate {
    pub ctx: PageCtx,
    pub users: Vec<User>,
    pub q: String,
}

#[derive(Template)]
#[template(path = "pages/user.html")]
pub struct UserTemplate {
    pub ctx: PageCtx,
    pub user: User,
    pub stats: UserStats,
    pub messages: Vec<MessageView>,
    pub viewer_id: String,
    pub is_self: bool,
    pub is_following: bool,
    pub csrf_token: String,
    pub come_from: String,
}

#[derive(Template)]
#[template(path = "pages/following.html")]
pub struct FollowingTemplate {
    pub ctx: PageCtx,
    pub user: User,
    pub users: Vec<User>,
}

#[derive(Template)]
#[template(path = "pages/followers.html")]
pub struct FollowersTemplate {
    pub ctx: PageCtx,
    pub user: User,
    pub users: Vec<User>,
}

#[derive(Template)]
#[template(path = "pages/likes.html")]
pub struct LikesTemplate {
    pub ctx: PageCtx,
    pub user: User,
    pub messages: Vec<MessageView>,
    pub viewer_id: String,
    pub csrf_token: String,
    pub come_from: String,
}

#[derive(Template)]
#[template(path = "pages/profile_edit.html")]
pub struct ProfileEditTemplate {
    pub ctx: PageCtx,
    pub errors: Vec<String>,
    pub username: String,
    pub email: String,
    pub image_url: String,
    pub header_image_url: String,
    pub bio: String,
}

// -- Forms / queries --

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Deserialize)]
pub struct ProfileForm {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub header_image_url: String,
    #[serde(default)]
    pub bio: String,
    pub password: String,
}

// -- Handlers --

/// GET /users — list all users, or filter by username substring via ?q=.
pub async fn list_users(
    State(state): State<AppState>,
    user: CurrentUser,
    Query(query): Query<SearchQuery>,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    let listed = users::search(&state.db, query.q.as_deref())?;
    let consumed = flash.is_some();
    Ok(page(
        UsersTemplate {
            ctx: PageCtx::new(Some(&user), flash),
            users: listed,
            q: query.q.unwrap_or_default(),
        },
        consumed,
    ))
}

/// GET /users/{id} — profile with the user's messages and counts.
pub async fn show_user(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    let shown = users::find(&state.db, &id)?.ok_or(AppError::NotFound)?;
    let stats = users::stats(&state.db, &shown.id)?;
    let shown_messages = messages::for_user(&state.db, &shown.id, &user.id)?;
    let is_self = shown.id == user.id;
    let is_following = users::is_following(&state.db, &user.id, &shown.id)?;

    let consumed = flash.is_some();
    let come_from = format!("/users/{}", shown.id);
    Ok(page(
        UserTemplate {
            ctx: PageCtx::new(Some(&user), flash),
            user: shown,
            stats,
            messages: shown_messages,
            viewer_id: user.id.clone(),
            is_self,
            is_following,
            csrf_token: user.csrf_token.clone(),
            come_from,
        },
        consumed,
    ))
}

/// GET /users/{id}/following
pub async fn show_following(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    let shown = users::find(&state.db, &id)?.ok_or(AppError::NotFound)?;
    let listed = users::following(&state.db, &shown.id)?;
    let consumed = flash.is_some();
    Ok(page(
        FollowingTemplate {
            ctx: PageCtx::new(Some(&user), flash),
            user: shown,
            users: listed,
        },
        consumed,
    ))
}

/// GET /users/{id}/followers
pub async fn show_followers(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    let shown = users::find(&state.db, &id)?.ok_or(AppError::NotFound)?;
    let listed = users::followers(&state.db, &shown.id)?;
    let consumed = flash.is_some();
    Ok(page(
        FollowersTemplate {
            ctx: PageCtx::new(Some(&user), flash),
            user: shown,
            users: listed,
        },
        consumed,
    ))
}

/// GET /users/{id}/likes — messages this user has liked.
pub async fn show_likes(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    let shown = users::find(&state.db, &id)?.ok_or(AppError::NotFound)?;
    let liked = messages::liked_by(&state.db, &shown.id, &user.id)?;
    let consumed = flash.is_some();
    let come_from = format!("/users/{}/likes", shown.id);
    Ok(page(
        LikesTemplate {
            ctx: PageCtx::new(Some(&user), flash),
            user: shown,
            messages: liked,
            viewer_id: user.id.clone(),
            csrf_token: user.csrf_token.clone(),
            come_from,
        },
        consumed,
    ))
}

/// POST /users/follow/{id} — add a follow edge (idempotent), then show the
/// current user's following list.
pub async fn start_following(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let target = users::find(&state.db, &id)?.ok_or(AppError::NotFound)?;
    users::follow(&state.db, &user.id, &target.id)?;
    Ok(Redirect::to(&format!("/users/{}/following", user.id)).into_response())
}

/// POST /users/stop-following/{id}
pub async fn stop_following(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Response> {
    let target = users::find(&state.db, &id)?.ok_or(AppError::NotFound)?;
    users::unfollow(&state.db, &user.id, &target.id)?;
    Ok(Redirect::to(&format!("/users/{}/following", user.id)).into_response())
}

/// GET /users/profile — edit form prefilled with the current values.
pub async fn profile_page(
    State(state): State<AppState>,
    user: CurrentUser,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    let full = users::find(&state.db, &user.id)?.ok_or(AppError::NotFound)?;
    let consumed = flash.is_some();
    Ok(page(
        ProfileEditTemplate {
            ctx: PageCtx::new(Some(&user), flash),
            errors: Vec::new(),
            username: full.username,
            email: full.email,
            image_url: full.image_url,
            header_image_url: full.header_image_url,
            bio: full.bio.unwrap_or_default(),
        },
        consumed,
    ))
}

/// POST /users/profile — apply the edit after re-verifying the password.
pub async fn edit_profile(
    State(state): State<AppState>,
    user: CurrentUser,
    Form(form): Form<ProfileForm>,
) -> AppResult<Response> {
    let rerender = |errors: Vec<String>| {
        page(
            ProfileEditTemplate {
                ctx: PageCtx::new(Some(&user), None),
                errors,
                username: form.username.clone(),
                email: form.email.clone(),
                image_url: form.image_url.clone(),
                header_image_url: form.header_image_url.clone(),
                bio: form.bio.clone(),
            },
            false,
        )
    };

    // Reauthenticate against the *current* username before trusting the edit
    if users::authenticate(&state.db, &user.username, &form.password)?.is_none() {
        return Ok(rerender(vec!["Invalid password.".to_string()]));
    }

    let errors = validate_identity(&form.username, &form.email);
    if !errors.is_empty() {
        return Ok(rerender(errors));
    }

    let outcome = users::update_profile(
        &state.db,
        &user.id,
        &ProfileUpdate {
            username: form.username.trim().to_string(),
            email: form.email.trim().to_string(),
            image_url: Some(form.image_url.clone()),
            header_image_url: Some(form.header_image_url.clone()),
            bio: Some(form.bio.clone()),
        },
    )?;

    match outcome {
        UpdateOutcome::Updated => Ok(Redirect::to(&format!("/users/{}", user.id)).into_response()),
        UpdateOutcome::Taken => Ok(rerender(vec![
            "Username or e-mail already taken.".to_string()
        ])),
    }
}

/// POST /users/delete — delete the account; messages, follow edges, likes
/// and sessions all cascade away with it.
pub async fn delete_account(
    State(state): State<AppState>,
    user: CurrentUser,
) -> AppResult<Response> {
    users::delete(&state.db, &user.id)?;
    tracing::info!(username = %user.username, "account deleted");

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/signup".to_string()),
            (
                header::SET_COOKIE,
                format!(
                    "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
                    state.config.auth.cookie_name
                ),
            ),
        ],
    )
        .into_response())
}
