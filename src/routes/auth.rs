use askama::Template;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::{Form, Router};
use serde::Deserialize;

use crate::auth::session;
use crate::db::users::{self, CreateOutcome, NewUser};
use crate::error::{AppError, AppResult};
use crate::extractors::MaybeUser;
use crate::flash::{self, Flash, IncomingFlash};
use crate::routes::{page, PageCtx};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", get(signup_page).post(signup))
        .route("/login", get(login_page).post(login))
        .route("/logout", post(logout))
}

// -- Templates --

#[derive(Template)]
#[template(path = "pages/signup.html")]
pub struct SignupTemplate {
    pub ctx: PageCtx,
    pub errors: Vec<String>,
    pub username: String,
    pub email: String,
    pub image_url: String,
}

#[derive(Template)]
#[template(path = "pages/login.html")]
pub struct LoginTemplate {
    pub ctx: PageCtx,
    pub error: Option<String>,
    pub username: String,
}

// -- Forms --

#[derive(Deserialize)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub image_url: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct CsrfForm {
    #[serde(default)]
    pub csrf_token: String,
}

// -- Cookie helpers --

fn session_cookie(cookie_name: &str, token: &str, max_age_hours: u64) -> String {
    let max_age_secs = max_age_hours * 3600;
    format!(
        "{}={}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}",
        cookie_name, token, max_age_secs
    )
}

fn clear_session_cookie(cookie_name: &str) -> String {
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0",
        cookie_name
    )
}

/// Field validation shared by signup and profile edit.
pub fn validate_identity(username: &str, email: &str) -> Vec<String> {
    let mut errors = Vec::new();
    let username = username.trim();
    if username.is_empty() || username.chars().count() > 30 {
        errors.push("Username must be 1-30 characters.".to_string());
    }
    if !email.contains('@') {
        errors.push("Enter a valid e-mail address.".to_string());
    }
    errors
}

fn validate_signup(form: &SignupForm) -> Vec<String> {
    let mut errors = validate_identity(&form.username, &form.email);
    if form.password.chars().count() < 6 {
        errors.push("Password must be at least 6 characters.".to_string());
    }
    errors
}

// -- Handlers --

/// GET /signup — render the form, or bounce already-authenticated users to
/// their own profile.
pub async fn signup_page(
    maybe_user: MaybeUser,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    if let Some(user) = maybe_user.0 {
        return Ok(Redirect::to(&format!("/users/{}", user.id)).into_response());
    }

    let consumed = flash.is_some();
    Ok(page(
        SignupTemplate {
            ctx: PageCtx::anon(flash),
            errors: Vec::new(),
            username: String::new(),
            email: String::new(),
            image_url: String::new(),
        },
        consumed,
    ))
}

/// POST /signup — create the account, log it in, redirect home. Uniqueness
/// violations and field errors re-render the form; nothing is created.
pub async fn signup(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Form(form): Form<SignupForm>,
) -> AppResult<Response> {
    if let Some(user) = maybe_user.0 {
        return Ok(Redirect::to(&format!("/users/{}", user.id)).into_response());
    }

    let rerender = |errors: Vec<String>| {
        page(
            SignupTemplate {
                ctx: PageCtx::anon(None),
                errors,
                username: form.username.clone(),
                email: form.email.clone(),
                image_url: form.image_url.clone(),
            },
            false,
        )
    };

    let errors = validate_signup(&form);
    if !errors.is_empty() {
        return Ok(rerender(errors));
    }

    let outcome = users::create(
        &state.db,
        &NewUser {
            username: form.username.trim(),
            email: form.email.trim(),
            password: &form.password,
            image_url: Some(form.image_url.as_str()),
        },
    )?;

    let user = match outcome {
        CreateOutcome::Created(user) => user,
        CreateOutcome::Taken => {
            return Ok(rerender(vec!["Username or e-mail already taken.".to_string()]));
        }
    };

    let new_session =
        session::create_session(&state.db, &user.id, state.config.auth.session_hours)?;

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/".to_string()),
            (
                header::SET_COOKIE,
                session_cookie(
                    &state.config.auth.cookie_name,
                    &new_session.token,
                    state.config.auth.session_hours,
                ),
            ),
        ],
    )
        .into_response())
}

/// GET /login
pub async fn login_page(
    maybe_user: MaybeUser,
    IncomingFlash(flash): IncomingFlash,
) -> AppResult<Response> {
    if let Some(user) = maybe_user.0 {
        return Ok(Redirect::to(&format!("/users/{}", user.id)).into_response());
    }

    let consumed = flash.is_some();
    Ok(page(
        LoginTemplate {
            ctx: PageCtx::anon(flash),
            error: None,
            username: String::new(),
        },
        consumed,
    ))
}

/// POST /login — authenticate and establish a session; bad credentials
/// re-render the form without any state change.
pub async fn login(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    if let Some(user) = maybe_user.0 {
        return Ok(Redirect::to(&format!("/users/{}", user.id)).into_response());
    }

    let Some(user) = users::authenticate(&state.db, form.username.trim(), &form.password)? else {
        return Ok(page(
            LoginTemplate {
                ctx: PageCtx::anon(None),
                error: Some("Invalid credentials.".to_string()),
                username: form.username.clone(),
            },
            false,
        ));
    };

    let new_session =
        session::create_session(&state.db, &user.id, state.config.auth.session_hours)?;
    tracing::info!(username = %user.username, "user logged in");

    let mut response = flash::redirect_with("/", Flash::Welcome);
    response.headers_mut().append(
        header::SET_COOKIE,
        session_cookie(
            &state.config.auth.cookie_name,
            &new_session.token,
            state.config.auth.session_hours,
        )
        .parse()
        .map_err(|_| AppError::Internal("invalid session cookie value".into()))?,
    );
    Ok(response)
}

/// POST /logout — requires a live session and a matching CSRF token; any
/// forged or anonymous attempt is a hard 401, never a silent ignore.
pub async fn logout(
    State(state): State<AppState>,
    maybe_user: MaybeUser,
    Form(form): Form<CsrfForm>,
) -> AppResult<Response> {
    let Some(user) = maybe_user.0 else {
        return Err(AppError::Unauthorized);
    };
    if form.csrf_token != user.csrf_token {
        return Err(AppError::Unauthorized);
    }

    session::delete_session(&state.db, &user.session_token)?;

    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::LOCATION, "/".to_string()),
            (
                header::SET_COOKIE,
                clear_session_cookie(&state.config.auth.cookie_name),
            ),
        ],
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form(username: &str, email: &str, password: &str) -> SignupForm {
        SignupForm {
            username: username.to_string(),
            email: email.to_string(),
            password: password.to_string(),
            image_url: String::new(),
        }
    }

    #[test]
    fn valid_signup_passes_validation() {
        assert!(validate_signup(&form("alice", "alice@example.com", "password6")).is_empty());
    }

    #[test]
    fn short_password_rejected() {
        let errors = validate_signup(&form("alice", "alice@example.com", "short"));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("Password"));
    }

    #[test]
    fn empty_username_and_bad_email_rejected() {
        let errors = validate_signup(&form("  ", "not-an-email", "password6"));
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn overlong_username_rejected() {
        let long = "x".repeat(31);
        let errors = validate_signup(&form(&long, "a@b.com", "password6"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn session_cookie_format() {
        let cookie = session_cookie("warbler_session", "tok", 2);
        assert_eq!(
            cookie,
            "warbler_session=tok; HttpOnly; SameSite=Strict; Path=/; Max-Age=7200"
        );
        assert!(clear_session_cookie("warbler_session").contains("Max-Age=0"));
    }
}
