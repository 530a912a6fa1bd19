/*
 * SPDX-FileCopyrightText: 2026 Rookery Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::{Context, Result};
use rand::{rngs::OsRng, RngCore};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

#[derive(Clone)]
pub struct SocialDb {
    path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    Unlisted,
    Private,
    Direct,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Visibility::Public => "public",
            Visibility::Unlisted => "unlisted",
            Visibility::Private => "private",
            Visibility::Direct => "direct",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "public" => Some(Visibility::Public),
            "unlisted" => Some(Visibility::Unlisted),
            "private" => Some(Visibility::Private),
            "direct" => Some(Visibility::Direct),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct AccountRow {
    pub iri: String,
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub summary: Option<String>,
    pub protected: bool,
    pub inbox_url: Option<String>,
    pub shared_inbox_url: Option<String>,
    pub public_key_pem: Option<String>,
    pub followers_count: i64,
}

/// Profile fields written on every (re)resolution of an actor. Counters and
/// the local handle are never touched by a profile upsert.
#[derive(Debug, Clone, Default)]
pub struct AccountProfile {
    pub iri: String,
    pub handle: Option<String>,
    pub display_name: Option<String>,
    pub summary: Option<String>,
    pub protected: bool,
    pub inbox_url: Option<String>,
    pub shared_inbox_url: Option<String>,
    pub public_key_pem: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PostRow {
    pub iri: String,
    pub account_iri: String,
    pub visibility: Visibility,
    pub content: Option<String>,
    pub in_reply_to_iri: Option<String>,
    pub sharing_iri: Option<String>,
    pub shares_count: i64,
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub iri: String,
    pub account_iri: String,
    pub visibility: Visibility,
    pub content: Option<String>,
    pub in_reply_to_iri: Option<String>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PostAttachment {
    pub url: String,
    pub media_type: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FollowRow {
    pub iri: String,
    pub follower_iri: String,
    pub following_iri: String,
    pub approved_at_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy)]
pub struct FollowOutcome {
    pub inserted: bool,
    pub approved: bool,
}

impl SocialDb {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let path = db_path.as_ref().to_path_buf();
        let conn = Connection::open(&path).with_context(|| format!("open db: {}", path.display()))?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA foreign_keys=ON;

            CREATE TABLE IF NOT EXISTS accounts (
              iri TEXT PRIMARY KEY,
              handle TEXT NULL,
              display_name TEXT NULL,
              summary TEXT NULL,
              protected INTEGER NOT NULL DEFAULT 0,
              inbox_url TEXT NULL,
              shared_inbox_url TEXT NULL,
              public_key_pem TEXT NULL,
              followers_count INTEGER NOT NULL DEFAULT 0,
              created_at_ms INTEGER NOT NULL,
              updated_at_ms INTEGER NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_accounts_handle
              ON accounts(handle) WHERE handle IS NOT NULL;

            CREATE TABLE IF NOT EXISTS posts (
              iri TEXT PRIMARY KEY,
              account_iri TEXT NOT NULL REFERENCES accounts(iri) ON DELETE CASCADE,
              visibility TEXT NOT NULL,
              content TEXT NULL,
              in_reply_to_iri TEXT NULL,
              sharing_iri TEXT NULL,
              shares_count INTEGER NOT NULL DEFAULT 0,
              created_at_ms INTEGER NOT NULL,
              updated_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_posts_account ON posts(account_iri);
            CREATE INDEX IF NOT EXISTS idx_posts_sharing ON posts(sharing_iri) WHERE sharing_iri IS NOT NULL;

            CREATE TABLE IF NOT EXISTS post_mentions (
              post_iri TEXT NOT NULL REFERENCES posts(iri) ON DELETE CASCADE,
              account_iri TEXT NOT NULL,
              PRIMARY KEY(post_iri, account_iri)
            );

            CREATE TABLE IF NOT EXISTS post_attachments (
              post_iri TEXT NOT NULL REFERENCES posts(iri) ON DELETE CASCADE,
              url TEXT NOT NULL,
              media_type TEXT NULL,
              description TEXT NULL,
              PRIMARY KEY(post_iri, url)
            );

            CREATE TABLE IF NOT EXISTS follows (
              iri TEXT PRIMARY KEY,
              follower_iri TEXT NOT NULL REFERENCES accounts(iri) ON DELETE CASCADE,
              following_iri TEXT NOT NULL REFERENCES accounts(iri) ON DELETE CASCADE,
              approved_at_ms INTEGER NULL,
              created_at_ms INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_follows_following ON follows(following_iri);
            CREATE INDEX IF NOT EXISTS idx_follows_follower ON follows(follower_iri);

            CREATE TABLE IF NOT EXISTS likes (
              post_iri TEXT NOT NULL REFERENCES posts(iri) ON DELETE CASCADE,
              account_iri TEXT NOT NULL REFERENCES accounts(iri) ON DELETE CASCADE,
              created_at_ms INTEGER NOT NULL,
              PRIMARY KEY(post_iri, account_iri)
            );
            "#,
        )?;
        Ok(Self { path })
    }

    fn conn(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(conn)
    }

    pub fn health_check(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    // ---- accounts -------------------------------------------------------

    pub fn upsert_account(&self, p: &AccountProfile) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO accounts(iri, handle, display_name, summary, protected,
                                 inbox_url, shared_inbox_url, public_key_pem,
                                 followers_count, created_at_ms, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9, ?9)
            ON CONFLICT(iri) DO UPDATE SET
              handle=COALESCE(excluded.handle, accounts.handle),
              display_name=excluded.display_name,
              summary=excluded.summary,
              protected=excluded.protected,
              inbox_url=COALESCE(excluded.inbox_url, accounts.inbox_url),
              shared_inbox_url=excluded.shared_inbox_url,
              public_key_pem=COALESCE(excluded.public_key_pem, accounts.public_key_pem),
              updated_at_ms=excluded.updated_at_ms
            "#,
            params![
                p.iri,
                p.handle,
                p.display_name,
                p.summary,
                if p.protected { 1 } else { 0 },
                p.inbox_url,
                p.shared_inbox_url,
                p.public_key_pem,
                now_ms(),
            ],
        )?;
        Ok(())
    }

    pub fn get_account(&self, iri: &str) -> Result<Option<AccountRow>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT iri, handle, display_name, summary, protected, inbox_url, shared_inbox_url, public_key_pem, followers_count
             FROM accounts WHERE iri=?1",
            params![iri],
            account_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn get_local_account_by_handle(&self, handle: &str) -> Result<Option<AccountRow>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT iri, handle, display_name, summary, protected, inbox_url, shared_inbox_url, public_key_pem, followers_count
             FROM accounts WHERE handle=?1",
            params![handle],
            account_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Removes an account and everything it authored (posts cascade, and with
    /// them mentions, attachments and likes). Counters on surviving rows are
    /// recomputed in the same transaction so I1/I2 hold at commit.
    pub fn delete_account(&self, iri: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let followed: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT DISTINCT following_iri FROM follows WHERE follower_iri=?1 AND following_iri<>?1",
            )?;
            let rows = stmt.query_map(params![iri], |r| r.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        let shared: Vec<String> = {
            let mut stmt = tx.prepare(
                "SELECT DISTINCT sharing_iri FROM posts WHERE account_iri=?1 AND sharing_iri IS NOT NULL",
            )?;
            let rows = stmt.query_map(params![iri], |r| r.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        let removed = tx.execute("DELETE FROM accounts WHERE iri=?1", params![iri])?;
        if removed == 0 {
            return Ok(false);
        }
        for target in &followed {
            recompute_followers_count(&tx, target)?;
        }
        for original in &shared {
            recompute_shares_count(&tx, original)?;
        }
        tx.commit()?;
        Ok(true)
    }

    // ---- posts ----------------------------------------------------------

    pub fn upsert_post(&self, p: &NewPost) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO posts(iri, account_iri, visibility, content, in_reply_to_iri,
                              sharing_iri, shares_count, created_at_ms, updated_at_ms)
            VALUES (?1, ?2, ?3, ?4, ?5, NULL, 0, ?6, ?6)
            ON CONFLICT(iri) DO UPDATE SET
              visibility=excluded.visibility,
              content=excluded.content,
              in_reply_to_iri=excluded.in_reply_to_iri,
              updated_at_ms=excluded.updated_at_ms
            "#,
            params![
                p.iri,
                p.account_iri,
                p.visibility.as_str(),
                p.content,
                p.in_reply_to_iri,
                now_ms(),
            ],
        )?;
        Ok(())
    }

    pub fn get_post(&self, iri: &str) -> Result<Option<PostRow>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT iri, account_iri, visibility, content, in_reply_to_iri, sharing_iri, shares_count
             FROM posts WHERE iri=?1",
            params![iri],
            post_from_row,
        )
        .optional()
        .map_err(Into::into)
    }

    /// Deletes one post by IRI. Unrelated rows stay; if the post was itself a
    /// reshare the original's counter is fixed up in the same transaction.
    pub fn delete_post(&self, iri: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let sharing: Option<Option<String>> = tx
            .query_row("SELECT sharing_iri FROM posts WHERE iri=?1", params![iri], |r| r.get(0))
            .optional()?;
        let removed = tx.execute("DELETE FROM posts WHERE iri=?1", params![iri])?;
        if removed > 0 {
            if let Some(Some(original)) = sharing {
                recompute_shares_count(&tx, &original)?;
            }
        }
        tx.commit()?;
        Ok(removed > 0)
    }

    pub fn replace_post_mentions(&self, post_iri: &str, account_iris: &[String]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM post_mentions WHERE post_iri=?1", params![post_iri])?;
        for account in account_iris {
            tx.execute(
                "INSERT OR IGNORE INTO post_mentions(post_iri, account_iri) VALUES (?1, ?2)",
                params![post_iri, account],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn post_mentions(&self, post_iri: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT account_iri FROM post_mentions WHERE post_iri=?1")?;
        let rows = stmt
            .query_map(params![post_iri], |r| r.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn replace_post_attachments(&self, post_iri: &str, attachments: &[PostAttachment]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM post_attachments WHERE post_iri=?1", params![post_iri])?;
        for a in attachments {
            tx.execute(
                "INSERT OR IGNORE INTO post_attachments(post_iri, url, media_type, description) VALUES (?1, ?2, ?3, ?4)",
                params![post_iri, a.url, a.media_type, a.description],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn post_attachments(&self, post_iri: &str) -> Result<Vec<PostAttachment>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT url, media_type, description FROM post_attachments WHERE post_iri=?1",
        )?;
        let rows = stmt
            .query_map(params![post_iri], |r| {
                Ok(PostAttachment {
                    url: r.get(0)?,
                    media_type: r.get(1)?,
                    description: r.get(2)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    // ---- follows --------------------------------------------------------

    /// Records an inbound Follow keyed by its activity IRI. Duplicate delivery
    /// is a no-op; the follower counter is written only when a row actually
    /// lands, inside the same transaction.
    pub fn record_follow(
        &self,
        iri: &str,
        follower_iri: &str,
        following_iri: &str,
        approve: bool,
    ) -> Result<FollowOutcome> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now_ms();
        let approved_at: Option<i64> = if approve { Some(now) } else { None };
        let inserted = tx.execute(
            "INSERT OR IGNORE INTO follows(iri, follower_iri, following_iri, approved_at_ms, created_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![iri, follower_iri, following_iri, approved_at, now],
        )? > 0;
        if inserted && approve {
            recompute_followers_count(&tx, following_iri)?;
        }
        tx.commit()?;
        Ok(FollowOutcome { inserted, approved: approve })
    }

    /// Flips a pending edge to approved, matched by the Follow activity IRI
    /// and the following-side account. Recomputes the follower counter for
    /// the approved edge in the same transaction.
    pub fn approve_follow(&self, iri: &str, following_iri: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let changed = tx.execute(
            "UPDATE follows SET approved_at_ms=?3 WHERE iri=?1 AND following_iri=?2 AND approved_at_ms IS NULL",
            params![iri, following_iri, now_ms()],
        )?;
        if changed > 0 {
            recompute_followers_count(&tx, following_iri)?;
        }
        tx.commit()?;
        Ok(changed > 0)
    }

    /// Removes an edge in response to Reject, matched by the Follow activity
    /// IRI and the following-side account.
    pub fn reject_follow(&self, iri: &str, following_iri: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM follows WHERE iri=?1 AND following_iri=?2",
            params![iri, following_iri],
        )?;
        if removed > 0 {
            recompute_followers_count(&tx, following_iri)?;
        }
        tx.commit()?;
        Ok(removed > 0)
    }

    /// Removes an edge in response to Undo(Follow), matched by the Follow
    /// activity IRI and the undoing actor. A zero-row delete skips the
    /// counter write entirely (racing or out-of-order Undo).
    pub fn undo_follow(&self, iri: &str, follower_iri: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let following: Option<String> = tx
            .query_row(
                "SELECT following_iri FROM follows WHERE iri=?1 AND follower_iri=?2",
                params![iri, follower_iri],
                |r| r.get(0),
            )
            .optional()?;
        let Some(following) = following else {
            return Ok(false);
        };
        tx.execute(
            "DELETE FROM follows WHERE iri=?1 AND follower_iri=?2",
            params![iri, follower_iri],
        )?;
        recompute_followers_count(&tx, &following)?;
        tx.commit()?;
        Ok(true)
    }

    pub fn get_follow(&self, iri: &str) -> Result<Option<FollowRow>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT iri, follower_iri, following_iri, approved_at_ms FROM follows WHERE iri=?1",
            params![iri],
            |r| {
                Ok(FollowRow {
                    iri: r.get(0)?,
                    follower_iri: r.get(1)?,
                    following_iri: r.get(2)?,
                    approved_at_ms: r.get(3)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }

    pub fn is_approved_follower(&self, follower_iri: &str, following_iri: &str) -> Result<bool> {
        let conn = self.conn()?;
        let v: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM follows WHERE follower_iri=?1 AND following_iri=?2 AND approved_at_ms IS NOT NULL LIMIT 1",
                params![follower_iri, following_iri],
                |r| r.get(0),
            )
            .optional()?;
        Ok(v.is_some())
    }

    // ---- likes ----------------------------------------------------------

    pub fn insert_like(&self, post_iri: &str, account_iri: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR IGNORE INTO likes(post_iri, account_iri, created_at_ms) VALUES (?1, ?2, ?3)",
            params![post_iri, account_iri, now_ms()],
        )?;
        Ok(())
    }

    pub fn delete_like(&self, post_iri: &str, account_iri: &str) -> Result<bool> {
        let conn = self.conn()?;
        let removed = conn.execute(
            "DELETE FROM likes WHERE post_iri=?1 AND account_iri=?2",
            params![post_iri, account_iri],
        )?;
        Ok(removed > 0)
    }

    pub fn count_likes(&self, post_iri: &str) -> Result<i64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM likes WHERE post_iri=?1",
            params![post_iri],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    // ---- shares ---------------------------------------------------------

    /// Inserts a reshare row (the Announce's IRI is the row IRI, used as the
    /// correlation key for a later Undo) and refreshes the original's share
    /// counter from live rows, both in one transaction.
    pub fn insert_share(
        &self,
        share_iri: &str,
        sharer_iri: &str,
        original_iri: &str,
        visibility: Visibility,
    ) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let now = now_ms();
        let inserted = tx.execute(
            r#"
            INSERT OR IGNORE INTO posts(iri, account_iri, visibility, content, in_reply_to_iri,
                                        sharing_iri, shares_count, created_at_ms, updated_at_ms)
            VALUES (?1, ?2, ?3, NULL, NULL, ?4, 0, ?5, ?5)
            "#,
            params![share_iri, sharer_iri, visibility.as_str(), original_iri, now],
        )? > 0;
        if inserted {
            recompute_shares_count(&tx, original_iri)?;
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Removes the reshare row(s) one account holds for an original and
    /// decrements the denormalized counter by the rows actually deleted,
    /// clamped at zero, atomically.
    pub fn undo_share(&self, sharer_iri: &str, original_iri: &str) -> Result<u64> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let removed = tx.execute(
            "DELETE FROM posts WHERE account_iri=?1 AND sharing_iri=?2",
            params![sharer_iri, original_iri],
        )? as u64;
        if removed > 0 {
            tx.execute(
                "UPDATE posts SET shares_count=MAX(0, shares_count - ?2) WHERE iri=?1",
                params![original_iri, removed as i64],
            )?;
        }
        tx.commit()?;
        Ok(removed)
    }

    /// Undo correlated by the Announce activity IRI alone (some peers send
    /// `Undo { object: "<announce iri>" }`). Same atomic delete + clamped
    /// decrement as [`Self::undo_share`].
    pub fn undo_share_by_iri(&self, share_iri: &str, sharer_iri: &str) -> Result<bool> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let original: Option<String> = tx
            .query_row(
                "SELECT sharing_iri FROM posts WHERE iri=?1 AND account_iri=?2 AND sharing_iri IS NOT NULL",
                params![share_iri, sharer_iri],
                |r| r.get(0),
            )
            .optional()?;
        let Some(original) = original else {
            return Ok(false);
        };
        tx.execute("DELETE FROM posts WHERE iri=?1", params![share_iri])?;
        tx.execute(
            "UPDATE posts SET shares_count=MAX(0, shares_count - 1) WHERE iri=?1",
            params![original],
        )?;
        tx.commit()?;
        Ok(true)
    }

    pub fn count_shares(&self, original_iri: &str) -> Result<i64> {
        let conn = self.conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM posts WHERE sharing_iri=?1",
            params![original_iri],
            |r| r.get(0),
        )?;
        Ok(n)
    }

    pub fn new_activity_id(&self, base_actor: &str) -> String {
        let mut b = [0u8; 16];
        OsRng.fill_bytes(&mut b);
        let suffix: String = b.iter().map(|v| format!("{v:02x}")).collect();
        format!("{base_actor}/activities/{suffix}")
    }
}

fn recompute_followers_count(conn: &Connection, account_iri: &str) -> Result<()> {
    conn.execute(
        "UPDATE accounts SET followers_count=(SELECT COUNT(*) FROM follows WHERE following_iri=?1 AND approved_at_ms IS NOT NULL)
         WHERE iri=?1",
        params![account_iri],
    )?;
    Ok(())
}

fn recompute_shares_count(conn: &Connection, post_iri: &str) -> Result<()> {
    conn.execute(
        "UPDATE posts SET shares_count=(SELECT COUNT(*) FROM posts AS shares WHERE shares.sharing_iri=?1)
         WHERE iri=?1",
        params![post_iri],
    )?;
    Ok(())
}

fn account_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<AccountRow> {
    let protected: i64 = r.get(4)?;
    Ok(AccountRow {
        iri: r.get(0)?,
        handle: r.get(1)?,
        display_name: r.get(2)?,
        summary: r.get(3)?,
        protected: protected != 0,
        inbox_url: r.get(5)?,
        shared_inbox_url: r.get(6)?,
        public_key_pem: r.get(7)?,
        followers_count: r.get(8)?,
    })
}

fn post_from_row(r: &rusqlite::Row<'_>) -> rusqlite::Result<PostRow> {
    let visibility: String = r.get(2)?;
    Ok(PostRow {
        iri: r.get(0)?,
        account_iri: r.get(1)?,
        visibility: Visibility::parse(&visibility).unwrap_or(Visibility::Direct),
        content: r.get(3)?,
        in_reply_to_iri: r.get(4)?,
        sharing_iri: r.get(5)?,
        shares_count: r.get(6)?,
    })
}

pub(crate) fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> (tempfile::TempDir, SocialDb) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = SocialDb::open(dir.path().join("social.db")).expect("open db");
        (dir, db)
    }

    fn seed_account(db: &SocialDb, iri: &str, handle: Option<&str>, protected: bool) {
        db.upsert_account(&AccountProfile {
            iri: iri.to_string(),
            handle: handle.map(str::to_string),
            protected,
            ..Default::default()
        })
        .expect("upsert account");
    }

    fn seed_post(db: &SocialDb, iri: &str, account: &str, visibility: Visibility) {
        db.upsert_post(&NewPost {
            iri: iri.to_string(),
            account_iri: account.to_string(),
            visibility,
            content: Some("hello".to_string()),
            in_reply_to_iri: None,
        })
        .expect("upsert post");
    }

    #[test]
    fn follow_insert_is_idempotent_and_counts_once() {
        let (_dir, db) = test_db();
        seed_account(&db, "https://local.test/users/l", Some("l"), false);
        seed_account(&db, "https://remote.test/users/r", None, false);

        for _ in 0..2 {
            let out = db
                .record_follow("https://remote.test/f1", "https://remote.test/users/r", "https://local.test/users/l", true)
                .unwrap();
            assert!(out.approved);
        }
        let acct = db.get_account("https://local.test/users/l").unwrap().unwrap();
        assert_eq!(acct.followers_count, 1);
        let follow = db.get_follow("https://remote.test/f1").unwrap().unwrap();
        assert!(follow.approved_at_ms.is_some());
    }

    #[test]
    fn pending_follow_does_not_count() {
        let (_dir, db) = test_db();
        seed_account(&db, "https://local.test/users/l", Some("l"), true);
        seed_account(&db, "https://remote.test/users/r", None, false);

        let out = db
            .record_follow("https://remote.test/f1", "https://remote.test/users/r", "https://local.test/users/l", false)
            .unwrap();
        assert!(out.inserted && !out.approved);
        let acct = db.get_account("https://local.test/users/l").unwrap().unwrap();
        assert_eq!(acct.followers_count, 0);

        assert!(db.approve_follow("https://remote.test/f1", "https://local.test/users/l").unwrap());
        let acct = db.get_account("https://local.test/users/l").unwrap().unwrap();
        assert_eq!(acct.followers_count, 1);
        // Second approval of the same edge changes nothing.
        assert!(!db.approve_follow("https://remote.test/f1", "https://local.test/users/l").unwrap());
    }

    #[test]
    fn undo_before_follow_is_a_noop() {
        let (_dir, db) = test_db();
        seed_account(&db, "https://local.test/users/l", Some("l"), false);
        seed_account(&db, "https://remote.test/users/r", None, false);

        assert!(!db.undo_follow("https://remote.test/f1", "https://remote.test/users/r").unwrap());
        let acct = db.get_account("https://local.test/users/l").unwrap().unwrap();
        assert_eq!(acct.followers_count, 0);
    }

    #[test]
    fn undo_follow_removes_and_recomputes() {
        let (_dir, db) = test_db();
        seed_account(&db, "https://local.test/users/l", Some("l"), false);
        seed_account(&db, "https://remote.test/users/r", None, false);
        db.record_follow("https://remote.test/f1", "https://remote.test/users/r", "https://local.test/users/l", true)
            .unwrap();

        assert!(db.undo_follow("https://remote.test/f1", "https://remote.test/users/r").unwrap());
        let acct = db.get_account("https://local.test/users/l").unwrap().unwrap();
        assert_eq!(acct.followers_count, 0);
        // The edge is gone; a second Undo must not touch the counter.
        assert!(!db.undo_follow("https://remote.test/f1", "https://remote.test/users/r").unwrap());
    }

    #[test]
    fn reject_drops_pending_edge() {
        let (_dir, db) = test_db();
        seed_account(&db, "https://local.test/users/l", Some("l"), true);
        seed_account(&db, "https://remote.test/users/r", None, false);
        db.record_follow("https://remote.test/f1", "https://remote.test/users/r", "https://local.test/users/l", false)
            .unwrap();

        assert!(db.reject_follow("https://remote.test/f1", "https://local.test/users/l").unwrap());
        assert!(db.get_follow("https://remote.test/f1").unwrap().is_none());
        assert!(!db.reject_follow("https://remote.test/f1", "https://local.test/users/l").unwrap());
    }

    #[test]
    fn like_pair_is_idempotent() {
        let (_dir, db) = test_db();
        seed_account(&db, "https://local.test/users/l", Some("l"), false);
        seed_account(&db, "https://remote.test/users/r", None, false);
        seed_post(&db, "https://local.test/users/l/posts/1", "https://local.test/users/l", Visibility::Public);

        db.insert_like("https://local.test/users/l/posts/1", "https://remote.test/users/r").unwrap();
        db.insert_like("https://local.test/users/l/posts/1", "https://remote.test/users/r").unwrap();
        assert_eq!(db.count_likes("https://local.test/users/l/posts/1").unwrap(), 1);

        assert!(db.delete_like("https://local.test/users/l/posts/1", "https://remote.test/users/r").unwrap());
        assert!(!db.delete_like("https://local.test/users/l/posts/1", "https://remote.test/users/r").unwrap());
    }

    #[test]
    fn share_counter_tracks_live_rows_and_clamps() {
        let (_dir, db) = test_db();
        seed_account(&db, "https://local.test/users/l", Some("l"), false);
        seed_account(&db, "https://remote.test/users/s", None, false);
        seed_post(&db, "https://local.test/users/l/posts/1", "https://local.test/users/l", Visibility::Public);

        assert!(db
            .insert_share("https://remote.test/a1", "https://remote.test/users/s", "https://local.test/users/l/posts/1", Visibility::Public)
            .unwrap());
        // Duplicate Announce delivery: same IRI, no double count.
        assert!(!db
            .insert_share("https://remote.test/a1", "https://remote.test/users/s", "https://local.test/users/l/posts/1", Visibility::Public)
            .unwrap());
        let post = db.get_post("https://local.test/users/l/posts/1").unwrap().unwrap();
        assert_eq!(post.shares_count, 1);
        assert_eq!(db.count_shares("https://local.test/users/l/posts/1").unwrap(), 1);

        assert_eq!(db.undo_share("https://remote.test/users/s", "https://local.test/users/l/posts/1").unwrap(), 1);
        let post = db.get_post("https://local.test/users/l/posts/1").unwrap().unwrap();
        assert_eq!(post.shares_count, 0);
        // Undo with nothing left: zero rows, counter untouched (no negatives).
        assert_eq!(db.undo_share("https://remote.test/users/s", "https://local.test/users/l/posts/1").unwrap(), 0);
        let post = db.get_post("https://local.test/users/l/posts/1").unwrap().unwrap();
        assert_eq!(post.shares_count, 0);
    }

    #[test]
    fn account_delete_cascades_and_fixes_counters() {
        let (_dir, db) = test_db();
        seed_account(&db, "https://local.test/users/l", Some("l"), false);
        seed_account(&db, "https://remote.test/users/r", None, false);
        seed_post(&db, "https://local.test/users/l/posts/1", "https://local.test/users/l", Visibility::Public);
        db.record_follow("https://remote.test/f1", "https://remote.test/users/r", "https://local.test/users/l", true)
            .unwrap();
        db.insert_share("https://remote.test/a1", "https://remote.test/users/r", "https://local.test/users/l/posts/1", Visibility::Public)
            .unwrap();
        db.insert_like("https://local.test/users/l/posts/1", "https://remote.test/users/r").unwrap();

        assert!(db.delete_account("https://remote.test/users/r").unwrap());
        assert!(db.get_account("https://remote.test/users/r").unwrap().is_none());
        // Authored share row cascaded; the original's counter follows.
        assert!(db.get_post("https://remote.test/a1").unwrap().is_none());
        let post = db.get_post("https://local.test/users/l/posts/1").unwrap().unwrap();
        assert_eq!(post.shares_count, 0);
        let acct = db.get_account("https://local.test/users/l").unwrap().unwrap();
        assert_eq!(acct.followers_count, 0);
        assert_eq!(db.count_likes("https://local.test/users/l/posts/1").unwrap(), 0);

        assert!(!db.delete_account("https://remote.test/users/r").unwrap());
    }

    #[test]
    fn remote_refresh_keeps_handle_and_counter() {
        let (_dir, db) = test_db();
        seed_account(&db, "https://local.test/users/l", Some("l"), false);
        seed_account(&db, "https://remote.test/users/r", None, false);
        db.record_follow("https://remote.test/f1", "https://remote.test/users/r", "https://local.test/users/l", true)
            .unwrap();

        db.upsert_account(&AccountProfile {
            iri: "https://local.test/users/l".to_string(),
            display_name: Some("Ell".to_string()),
            ..Default::default()
        })
        .unwrap();
        let acct = db.get_account("https://local.test/users/l").unwrap().unwrap();
        assert_eq!(acct.handle.as_deref(), Some("l"));
        assert_eq!(acct.display_name.as_deref(), Some("Ell"));
        assert_eq!(acct.followers_count, 1);
    }

    #[test]
    fn delete_post_fixes_original_counter_for_shares() {
        let (_dir, db) = test_db();
        seed_account(&db, "https://local.test/users/l", Some("l"), false);
        seed_account(&db, "https://remote.test/users/s", None, false);
        seed_post(&db, "https://local.test/users/l/posts/1", "https://local.test/users/l", Visibility::Public);
        db.insert_share("https://remote.test/a1", "https://remote.test/users/s", "https://local.test/users/l/posts/1", Visibility::Public)
            .unwrap();

        assert!(db.delete_post("https://remote.test/a1").unwrap());
        let post = db.get_post("https://local.test/users/l/posts/1").unwrap().unwrap();
        assert_eq!(post.shares_count, 0);
        assert!(!db.delete_post("https://remote.test/a1").unwrap());
    }
}
