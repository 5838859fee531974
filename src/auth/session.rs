use rand::Rng;
use rusqlite::params;

use crate::state::DbPool;

/// Token pair returned on session creation. The session token rides in the
/// cookie; the CSRF token is embedded in state-changing forms.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub token: String,
    pub csrf_token: String,
}

/// Create a new session for a user.
pub fn create_session(
    pool: &DbPool,
    user_id: &str,
    hours: u64,
) -> Result<NewSession, rusqlite::Error> {
    let conn = pool.get().map_err(pool_error)?;

    let token = generate_token();
    let csrf_token = generate_token();
    let id = uuid::Uuid::now_v7().to_string();
    // Same text format SQLite's datetime('now') produces, so the expiry
    // check can compare lexically.
    let expires_at = (chrono::Utc::now() + chrono::Duration::hours(hours as i64))
        .format("%Y-%m-%d %H:%M:%S")
        .to_string();

    conn.execute(
        "INSERT INTO sessions (id, user_id, token, csrf_token, expires_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, user_id, token, csrf_token, expires_at],
    )?;

    Ok(NewSession { token, csrf_token })
}

/// Delete a session by token.
pub fn delete_session(pool: &DbPool, token: &str) -> Result<(), rusqlite::Error> {
    let conn = pool.get().map_err(pool_error)?;
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

fn pool_error(e: r2d2::Error) -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
        Some(e.to_string()),
    )
}

/// Generate a cryptographically random 32-byte hex token.
fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    let bytes: [u8; 32] = rng.gen();
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;

    #[test]
    fn create_session_stores_future_expiry() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        conn.execute(
            "INSERT INTO users (id, username, email, password_hash) \
             VALUES ('u1', 'alice', 'alice@example.com', 'x')",
            [],
        )
        .unwrap();
        drop(conn);

        let session = create_session(&pool, "u1", 24).unwrap();
        assert_ne!(session.token, session.csrf_token);

        let conn = pool.get().unwrap();
        let live: bool = conn
            .query_row(
                "SELECT expires_at > datetime('now') FROM sessions WHERE token = ?1",
                params![session.token],
                |row| row.get(0),
            )
            .unwrap();
        assert!(live);
        drop(conn);

        delete_session(&pool, &session.token).unwrap();
        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn generate_token_is_64_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn generate_token_is_unique() {
        let t1 = generate_token();
        let t2 = generate_token();
        assert_ne!(t1, t2);
    }
}
