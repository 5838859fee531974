//! Message store: posts, the liked-message relation, and feed aggregation.

use rusqlite::{params, OptionalExtension};

use crate::db::models::Message;
use crate::error::AppResult;
use crate::state::DbPool;

pub const MAX_MESSAGE_LEN: usize = 140;

/// Feed/profile projection of a message: author fields joined in, plus
/// whether the viewing user has liked it.
#[derive(Debug, Clone)]
pub struct MessageView {
    pub id: String,
    pub user_id: String,
    pub username: String,
    pub user_image_url: String,
    pub text: String,
    pub created_at: String,
    pub liked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeToggle {
    Added,
    Removed,
    /// The viewer authored the message; their own posts never enter the
    /// liked set, and the attempt is silently ignored.
    SelfIgnored,
}

const VIEW_SELECT: &str = "SELECT m.id, m.user_id, u.username, u.image_url, m.text, m.created_at, \
     EXISTS(SELECT 1 FROM likes l WHERE l.user_id = ?1 AND l.message_id = m.id) \
     FROM messages m JOIN users u ON u.id = m.user_id";

fn row_to_view(row: &rusqlite::Row<'_>) -> rusqlite::Result<MessageView> {
    Ok(MessageView {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        user_image_url: row.get(3)?,
        text: row.get(4)?,
        created_at: row.get(5)?,
        liked: row.get(6)?,
    })
}

pub fn create(pool: &DbPool, user_id: &str, text: &str) -> AppResult<Message> {
    let conn = pool.get()?;
    let id = uuid::Uuid::now_v7().to_string();
    conn.execute(
        "INSERT INTO messages (id, user_id, text) VALUES (?1, ?2, ?3)",
        params![id, user_id, text],
    )?;
    Ok(conn.query_row(
        "SELECT id, user_id, text, created_at FROM messages WHERE id = ?1",
        params![id],
        |row| {
            Ok(Message {
                id: row.get(0)?,
                user_id: row.get(1)?,
                text: row.get(2)?,
                created_at: row.get(3)?,
            })
        },
    )?)
}

pub fn find(pool: &DbPool, id: &str) -> AppResult<Option<Message>> {
    let conn = pool.get()?;
    Ok(conn
        .query_row(
            "SELECT id, user_id, text, created_at FROM messages WHERE id = ?1",
            params![id],
            |row| {
                Ok(Message {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    text: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )
        .optional()?)
}

pub fn find_view(pool: &DbPool, id: &str, viewer_id: &str) -> AppResult<Option<MessageView>> {
    let conn = pool.get()?;
    Ok(conn
        .query_row(
            &format!("{} WHERE m.id = ?2", VIEW_SELECT),
            params![viewer_id, id],
            row_to_view,
        )
        .optional()?)
}

pub fn delete(pool: &DbPool, id: &str) -> AppResult<()> {
    let conn = pool.get()?;
    conn.execute("DELETE FROM messages WHERE id = ?1", params![id])?;
    Ok(())
}

/// A user's own messages, newest first.
pub fn for_user(pool: &DbPool, user_id: &str, viewer_id: &str) -> AppResult<Vec<MessageView>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "{} WHERE m.user_id = ?2 ORDER BY m.created_at DESC, m.id DESC",
        VIEW_SELECT
    ))?;
    let rows = stmt.query_map(params![viewer_id, user_id], row_to_view)?;

    let mut views = Vec::new();
    for row in rows {
        views.push(row?);
    }
    Ok(views)
}

/// Homepage feed: the viewer's own messages plus their followees', newest
/// first. Timestamps tie-break on id descending (uuid v7 ids are
/// time-ordered), so the order is deterministic.
pub fn feed(pool: &DbPool, viewer_id: &str, limit: u32) -> AppResult<Vec<MessageView>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "{} WHERE m.user_id = ?1 \
            OR m.user_id IN (SELECT followee_id FROM follows WHERE follower_id = ?1) \
         ORDER BY m.created_at DESC, m.id DESC LIMIT ?2",
        VIEW_SELECT
    ))?;
    let rows = stmt.query_map(params![viewer_id, limit], row_to_view)?;

    let mut views = Vec::new();
    for row in rows {
        views.push(row?);
    }
    Ok(views)
}

/// Messages a user has liked, most recently liked first.
pub fn liked_by(pool: &DbPool, user_id: &str, viewer_id: &str) -> AppResult<Vec<MessageView>> {
    let conn = pool.get()?;
    let mut stmt = conn.prepare(&format!(
        "{} JOIN likes k ON k.message_id = m.id \
         WHERE k.user_id = ?2 ORDER BY k.created_at DESC, m.id DESC",
        VIEW_SELECT
    ))?;
    let rows = stmt.query_map(params![viewer_id, user_id], row_to_view)?;

    let mut views = Vec::new();
    for row in rows {
        views.push(row?);
    }
    Ok(views)
}

/// Toggle a like. Returns None when the message does not exist.
pub fn toggle_like(
    pool: &DbPool,
    viewer_id: &str,
    message_id: &str,
) -> AppResult<Option<LikeToggle>> {
    let conn = pool.get()?;

    let author: Option<String> = conn
        .query_row(
            "SELECT user_id FROM messages WHERE id = ?1",
            params![message_id],
            |row| row.get(0),
        )
        .optional()?;

    let Some(author) = author else {
        return Ok(None);
    };

    let removed = conn.execute(
        "DELETE FROM likes WHERE user_id = ?1 AND message_id = ?2",
        params![viewer_id, message_id],
    )?;
    if removed > 0 {
        return Ok(Some(LikeToggle::Removed));
    }

    if author == viewer_id {
        return Ok(Some(LikeToggle::SelfIgnored));
    }

    conn.execute(
        "INSERT INTO likes (user_id, message_id) VALUES (?1, ?2)",
        params![viewer_id, message_id],
    )?;
    Ok(Some(LikeToggle::Added))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::db::users::{self, CreateOutcome, NewUser};

    fn signup(pool: &DbPool, username: &str) -> String {
        let email = format!("{}@example.com", username);
        match users::create(
            pool,
            &NewUser {
                username,
                email: &email,
                password: "password6",
                image_url: None,
            },
        )
        .unwrap()
        {
            CreateOutcome::Created(user) => user.id,
            CreateOutcome::Taken => panic!("duplicate {}", username),
        }
    }

    fn backdate(pool: &DbPool, message_id: &str, stamp: &str) {
        let conn = pool.get().unwrap();
        conn.execute(
            "UPDATE messages SET created_at = ?1 WHERE id = ?2",
            params![stamp, message_id],
        )
        .unwrap();
    }

    #[test]
    fn create_and_find_round_trip() {
        let pool = test_pool();
        let alice = signup(&pool, "alice");

        let msg = create(&pool, &alice, "first post").unwrap();
        let found = find(&pool, &msg.id).unwrap().unwrap();
        assert_eq!(found.text, "first post");
        assert_eq!(found.user_id, alice);

        assert!(find(&pool, "missing").unwrap().is_none());
    }

    #[test]
    fn toggle_like_pair_returns_to_original_state() {
        let pool = test_pool();
        let alice = signup(&pool, "alice");
        let bob = signup(&pool, "bob");
        let msg = create(&pool, &bob, "bob's post").unwrap();

        assert_eq!(
            toggle_like(&pool, &alice, &msg.id).unwrap(),
            Some(LikeToggle::Added)
        );
        let view = find_view(&pool, &msg.id, &alice).unwrap().unwrap();
        assert!(view.liked);

        assert_eq!(
            toggle_like(&pool, &alice, &msg.id).unwrap(),
            Some(LikeToggle::Removed)
        );
        let view = find_view(&pool, &msg.id, &alice).unwrap().unwrap();
        assert!(!view.liked);
    }

    #[test]
    fn self_like_is_ignored_regardless_of_prior_state() {
        let pool = test_pool();
        let alice = signup(&pool, "alice");
        let msg = create(&pool, &alice, "my own post").unwrap();

        assert_eq!(
            toggle_like(&pool, &alice, &msg.id).unwrap(),
            Some(LikeToggle::SelfIgnored)
        );
        assert_eq!(
            toggle_like(&pool, &alice, &msg.id).unwrap(),
            Some(LikeToggle::SelfIgnored)
        );
        assert!(liked_by(&pool, &alice, &alice).unwrap().is_empty());
    }

    #[test]
    fn toggle_like_on_missing_message_returns_none() {
        let pool = test_pool();
        let alice = signup(&pool, "alice");
        assert_eq!(toggle_like(&pool, &alice, "missing").unwrap(), None);
    }

    #[test]
    fn feed_contains_only_self_and_followees_newest_first() {
        let pool = test_pool();
        let alice = signup(&pool, "alice");
        let bob = signup(&pool, "bob");
        let carol = signup(&pool, "carol");

        users::follow(&pool, &alice, &bob).unwrap();

        let m1 = create(&pool, &bob, "m1").unwrap();
        backdate(&pool, &m1.id, "2026-01-01 00:00:01");
        let m2 = create(&pool, &bob, "m2").unwrap();
        backdate(&pool, &m2.id, "2026-01-01 00:00:02");
        let mine = create(&pool, &alice, "mine").unwrap();
        backdate(&pool, &mine.id, "2026-01-01 00:00:03");
        // Unrelated user's message must not appear
        create(&pool, &carol, "noise").unwrap();

        let feed = feed(&pool, &alice, 100).unwrap();
        let texts: Vec<&str> = feed.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["mine", "m2", "m1"]);
    }

    #[test]
    fn feed_breaks_timestamp_ties_by_id_descending() {
        let pool = test_pool();
        let alice = signup(&pool, "alice");

        // Same timestamp, ids chosen so lexical order is known
        let conn = pool.get().unwrap();
        for id in ["m-a", "m-b"] {
            conn.execute(
                "INSERT INTO messages (id, user_id, text, created_at) \
                 VALUES (?1, ?2, ?1, '2026-01-01 00:00:00')",
                params![id, alice],
            )
            .unwrap();
        }
        drop(conn);

        let feed = feed(&pool, &alice, 100).unwrap();
        assert_eq!(feed[0].id, "m-b");
        assert_eq!(feed[1].id, "m-a");
    }

    #[test]
    fn feed_respects_limit() {
        let pool = test_pool();
        let alice = signup(&pool, "alice");
        for i in 0..5 {
            create(&pool, &alice, &format!("post {}", i)).unwrap();
        }
        assert_eq!(feed(&pool, &alice, 3).unwrap().len(), 3);
    }

    #[test]
    fn deleting_message_removes_it_from_liked_sets() {
        let pool = test_pool();
        let alice = signup(&pool, "alice");
        let bob = signup(&pool, "bob");
        let msg = create(&pool, &bob, "soon gone").unwrap();

        toggle_like(&pool, &alice, &msg.id).unwrap();
        assert_eq!(liked_by(&pool, &alice, &alice).unwrap().len(), 1);

        delete(&pool, &msg.id).unwrap();
        assert!(liked_by(&pool, &alice, &alice).unwrap().is_empty());
    }

    #[test]
    fn for_user_lists_own_messages_newest_first() {
        let pool = test_pool();
        let alice = signup(&pool, "alice");
        let bob = signup(&pool, "bob");
        let old = create(&pool, &alice, "old").unwrap();
        backdate(&pool, &old.id, "2026-01-01 00:00:00");
        create(&pool, &alice, "new").unwrap();
        create(&pool, &bob, "not alice's").unwrap();

        let msgs = for_user(&pool, &alice, &alice).unwrap();
        let texts: Vec<&str> = msgs.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["new", "old"]);
    }
}
