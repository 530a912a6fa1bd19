/*
 * SPDX-FileCopyrightText: 2026 Rookery Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Read-side mirror of the write-side visibility rules: given a local post
//! and the verified signer of the inbound request, decide whether the post is
//! disclosable at all. Callers answer "not found" for `None` — never
//! "forbidden" — so existence is not confirmed to unauthorized parties.

use crate::context::FederationContext;
use crate::social_db::{PostRow, SocialDb, Visibility};
use anyhow::Result;

/// Returns the post when it exists and is disclosable to `requester_iri`
/// (the verified signer, or `None` for an unauthenticated request).
pub fn exposed_post(
    db: &SocialDb,
    post_iri: &str,
    requester_iri: Option<&str>,
) -> Result<Option<PostRow>> {
    let Some(post) = db.get_post(post_iri)? else {
        return Ok(None);
    };
    match post.visibility {
        Visibility::Public | Visibility::Unlisted => Ok(Some(post)),
        Visibility::Private => {
            let Some(requester) = requester_iri else {
                return Ok(None);
            };
            if db.is_approved_follower(requester, &post.account_iri)? {
                Ok(Some(post))
            } else {
                Ok(None)
            }
        }
        Visibility::Direct => {
            let Some(requester) = requester_iri else {
                return Ok(None);
            };
            if db.post_mentions(&post.iri)?.iter().any(|m| m == requester) {
                Ok(Some(post))
            } else {
                Ok(None)
            }
        }
    }
}

/// Same decision keyed off the inbound request: the requester identity is the
/// owner of the key that signed it, as established by the context.
pub fn exposed_post_for_request(
    db: &SocialDb,
    ctx: &dyn FederationContext,
    post_iri: &str,
) -> Result<Option<PostRow>> {
    let requester = ctx.signed_key_owner();
    exposed_post(db, post_iri, requester.as_deref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::social_db::{AccountProfile, NewPost};

    const OWNER: &str = "https://local.test/users/l";
    const FOLLOWER: &str = "https://remote.test/users/follower";
    const MENTIONED: &str = "https://remote.test/users/mentioned";
    const STRANGER: &str = "https://remote.test/users/stranger";

    fn fixture() -> (tempfile::TempDir, SocialDb) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = SocialDb::open(dir.path().join("social.db")).expect("open db");
        for (iri, handle) in [(OWNER, Some("l")), (FOLLOWER, None), (MENTIONED, None), (STRANGER, None)] {
            db.upsert_account(&AccountProfile {
                iri: iri.to_string(),
                handle: handle.map(str::to_string),
                ..Default::default()
            })
            .unwrap();
        }
        db.record_follow("https://remote.test/f1", FOLLOWER, OWNER, true).unwrap();
        (dir, db)
    }

    fn post(db: &SocialDb, iri: &str, visibility: Visibility) {
        db.upsert_post(&NewPost {
            iri: iri.to_string(),
            account_iri: OWNER.to_string(),
            visibility,
            content: Some("hi".to_string()),
            in_reply_to_iri: None,
        })
        .unwrap();
    }

    #[test]
    fn public_and_unlisted_are_always_disclosable() {
        let (_dir, db) = fixture();
        post(&db, "p1", Visibility::Public);
        post(&db, "p2", Visibility::Unlisted);
        assert!(exposed_post(&db, "p1", None).unwrap().is_some());
        assert!(exposed_post(&db, "p2", Some(STRANGER)).unwrap().is_some());
    }

    #[test]
    fn private_needs_an_approved_follow() {
        let (_dir, db) = fixture();
        post(&db, "p1", Visibility::Private);
        assert!(exposed_post(&db, "p1", Some(FOLLOWER)).unwrap().is_some());
        assert!(exposed_post(&db, "p1", Some(STRANGER)).unwrap().is_none());
        assert!(exposed_post(&db, "p1", None).unwrap().is_none());
    }

    #[test]
    fn direct_is_mentions_only_regardless_of_follow_state() {
        let (_dir, db) = fixture();
        post(&db, "p1", Visibility::Direct);
        db.replace_post_mentions("p1", &[MENTIONED.to_string()]).unwrap();
        assert!(exposed_post(&db, "p1", Some(MENTIONED)).unwrap().is_some());
        // An approved follower is still not in the audience of a direct post.
        assert!(exposed_post(&db, "p1", Some(FOLLOWER)).unwrap().is_none());
        assert!(exposed_post(&db, "p1", Some(STRANGER)).unwrap().is_none());
    }

    #[test]
    fn missing_post_and_undisclosable_post_are_indistinguishable() {
        let (_dir, db) = fixture();
        post(&db, "p1", Visibility::Private);
        assert!(exposed_post(&db, "absent", Some(FOLLOWER)).unwrap().is_none());
        assert!(exposed_post(&db, "p1", Some(STRANGER)).unwrap().is_none());
    }
}
