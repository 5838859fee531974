//! User store: credentials, profiles, and the follow graph.

use rusqlite::{params, OptionalExtension};

use crate::auth::password;
use crate::db::models::User;
use crate::error::{AppError, AppResult};
use crate::state::DbPool;

pub const DEFAULT_IMAGE_URL: &str = "/assets/img/default-pic.svg";
pub const DEFAULT_HEADER_IMAGE_URL: &str = "/assets/img/default-header.svg";

const USER_COLUMNS: &str =
    "id, username, email, password_hash, image_url, header_image_url, bio, location, created_at";

pub struct NewUser<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
    pub image_url: Option<&'a str>,
}

pub enum CreateOutcome {
    Created(User),
    /// Username or email collided with an existing account.
    Taken,
}

#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub username: String,
    pub email: String,
    pub image_url: Option<String>,
    pub header_image_url: Option<String>,
    pub bio: Option<String>,
}

pub enum UpdateOutcome {
    Updated,
    Taken,
}

#[derive(Debug, Clone, Copy)]
pub struct UserStats {
    pub messages: i64,
    pub following: i64,
    pub followers: i64,
    pub likes: i64,
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        image_url: row.get(4)?,
        header_image_url: row.get(5)?,
        bio: row.get(6)?,
        location: row.get(7)?,
        created_at: row.get(8)?,
    })
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// Create a user with a freshly hashed password.
pub fn create(pool: &DbPool, new: &NewUser<'_>) -> AppResult<CreateOutcome> {
    let conn = pool.get()?;

    let hashed = password::hash(new.password)
        .map_err(|e| AppError::Internal(format!("bcrypt failure: {}", e)))?;
    let id = uuid::Uuid::now_v7().to_string();
    let image_url = match new.image_url {
        Some(url) if !url.trim().is_empty() => url,
        _ => DEFAULT_IMAGE_URL,
    };

    let result = conn.execute(
        "INSERT INTO users (id, username, email, password_hash, image_url) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, new.username, new.email, hashed, image_url],
    );

    match result {
        Ok(_) => {
            let user = conn.query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![id],
                row_to_user,
            )?;
            Ok(CreateOutcome::Created(user))
        }
        Err(e) if is_unique_violation(&e) => Ok(CreateOutcome::Taken),
        Err(e) => Err(e.into()),
    }
}

/// Look up by username and verify the password. Returns None on any mismatch.
pub fn authenticate(pool: &DbPool, username: &str, plaintext: &str) -> AppResult<Option<User>> {
    let conn = pool.get()?;

    let user: Option<User> = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
            params![username],
            row_to_user,
        )
        .optional()?;

    Ok(user.filter(|u| password::verify(plaintext, &u.password_hash)))
}

pub fn find(pool: &DbPool, id: &str) -> AppResult<Option<User>> {
    let conn = pool.get()?;
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
            params![id],
            row_to_user,
        )
        .optional()?)
}

/// All users, or those whose username contains the search term.
pub fn search(pool: &DbPool, term: Option<&str>) -> AppResult<Vec<User>> {
    let conn = pool.get()?;

    let mut users = Vec::new();
    match term.filter(|t| !t.trim().is_empty()) {
        Some(term) => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users WHERE username LIKE ?1 ORDER BY username",
                USER_COLUMNS
            ))?;
            let rows = stmt.query_map(params![format!("%{}%", term.trim())], row_to_user)?;
            for row in rows {
                users.push(row?);
            }
        }
        None => {
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM users ORDER BY username",
                USER_COLUMNS
            ))?;
            let rows = stmt.query_map([], row_to_user)?;
            for row in rows {
                users.push(row?);
            }
        }
    }
    Ok(users)
}

/// Apply a profile edit. Blank image/header fields keep the previous values.
pub fn update_profile(pool: &DbPool, id: &str, update: &ProfileUpdate) -> AppResult<UpdateOutcome> {
    let conn = pool.get()?;

    let result = conn.execute(
        "UPDATE users SET \
             username = ?1, \
             email = ?2, \
             image_url = COALESCE(?3, image_url), \
             header_image_url = COALESCE(?4, header_image_url), \
             bio = ?5 \
         WHERE id = ?6",
        params![
            update.username,
            update.email,
            update.image_url.as_deref().filter(|s| !s.trim().is_empty()),
            update
                .header_image_url
                .as_deref()
                .filter(|s| !s.trim().is_empty()),
            update.bio.as_deref().filter(|s| !s.trim().is_empty()),
            id
        ],
    );

    match result {
        Ok(_) => Ok(UpdateOutcome::Updated),
        Err(e) if is_unique_violation(&e) => Ok(UpdateOutcome::Taken),
        Err(e) => Err(e.into()),
    }
}

/// Delete an account. Messages, follow edges, likes and sessions cascade.
pub fn delete(pool: &DbPool, id: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    Ok(())
}

// -- Follow graph --

/// Add a follow edge. Idempotent: the composite primary key absorbs repeats.
pub fn follow(pool: &DbPool, follower_id: &str, followee_id: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute(
        "INSERT OR IGNORE INTO follows (follower_id, followee_id) VALUES (?1, ?2)",
        params![follower_id, followee_id],
    )?;
    Ok(())
}

/// Remove a follow edge. No-op when the edge does not exist.
pub fn unfollow(pool: &DbPool, follower_id: &str, followee_id: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute(
        "DELETE FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
        params![follower_id, followee_id],
    )?;
    Ok(())
}

pub fn is_following(pool: &DbPool, follower_id: &str, followee_id: &str) -> AppResult<bool> {
    let conn = pool.get()?;
    Ok(conn.query_row(
        "SELECT COUNT(*) > 0 FROM follows WHERE follower_id = ?1 AND followee_id = ?2",
        params![follower_id, followee_id],
        |row| row.get(0),
    )?)
}

pub fn following(pool: &DbPool, user_id: &str) -> AppResult<Vec<User>> {
    follow_edges(pool, user_id, "f.follower_id", "u.id = f.followee_id")
}

pub fn followers(pool: &DbPool, user_id: &str) -> AppResult<Vec<User>> {
    follow_edges(pool, user_id, "f.followee_id", "u.id = f.follower_id")
}

fn follow_edges(
    pool: &DbPool,
    user_id: &str,
    anchor: &str,
    join: &str,
) -> AppResult<Vec<User>> {
    let conn = pool.get()?;
    let sql = format!(
        "SELECT {cols} FROM follows f JOIN users u ON {join} \
         WHERE {anchor} = ?1 ORDER BY u.username",
        cols = USER_COLUMNS
            .split(", ")
            .map(|c| format!("u.{}", c))
            .collect::<Vec<_>>()
            .join(", "),
        join = join,
        anchor = anchor,
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id], row_to_user)?;

    let mut users = Vec::new();
    for row in rows {
        users.push(row?);
    }
    Ok(users)
}

/// Counts shown on the profile header.
pub fn stats(pool: &DbPool, user_id: &str) -> AppResult<UserStats> {
    let conn = pool.get()?;
    Ok(conn.query_row(
        "SELECT \
             (SELECT COUNT(*) FROM messages WHERE user_id = ?1), \
             (SELECT COUNT(*) FROM follows WHERE follower_id = ?1), \
             (SELECT COUNT(*) FROM follows WHERE followee_id = ?1), \
             (SELECT COUNT(*) FROM likes WHERE user_id = ?1)",
        params![user_id],
        |row| {
            Ok(UserStats {
                messages: row.get(0)?,
                following: row.get(1)?,
                followers: row.get(2)?,
                likes: row.get(3)?,
            })
        },
    )?)
}
