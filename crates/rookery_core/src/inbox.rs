/*
 * SPDX-FileCopyrightText: 2026 Rookery Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

//! Inbox reconciliation: maps each verified inbound activity onto idempotent
//! mutations of local state. Semantic anomalies (unresolvable references,
//! unsupported shapes, ownership mismatches) are absorbed with a debug log;
//! only storage failures propagate.

use crate::context::{FederationContext, LocalRef};
use crate::resolve::{resolve_actor, resolve_post};
use crate::social_db::{AccountRow, PostRow, SocialDb, Visibility};
use anyhow::Result;
use rookery_protocol::{iri_of, is_public_address, ref_list, RemoteActor, RemoteObject};
use serde_json::Value;
use tracing::{debug, warn};

/// Closed union over {activity kind × nested object kind}. Every inbound
/// payload classifies into exactly one arm; `Unsupported` is the explicit
/// default-drop arm so new kinds fail loudly in review, not silently at
/// runtime.
#[derive(Debug)]
pub enum InboxActivity {
    Follow { id: String, actor: String, object: String },
    Accept { actor: String, follow_iri: String },
    Reject { actor: String, follow_iri: String },
    Create { actor: String, object: Value },
    Update { actor: String, object: Value },
    Delete { actor: String, object_id: String },
    Like { actor: String, object_id: String },
    Announce { id: String, actor: String, object_id: String, to: Vec<String>, cc: Vec<String> },
    Undo { actor: String, target: UndoTarget },
    Unsupported { kind: String },
}

#[derive(Debug)]
pub enum UndoTarget {
    Follow { iri: String },
    Like { object_id: String },
    Announce { object_id: String },
    /// Bare activity IRI with no embedded object; matched against the
    /// IRI-correlated rows (follows, shares).
    ByIri { iri: String },
    Other { kind: String },
}

/// Structural classification. `None` means a gate failed before any state
/// could be touched: no usable actor reference, or a nested object without a
/// resolvable identifier.
pub fn classify(activity: &Value) -> Option<InboxActivity> {
    let kind = activity.get("type").and_then(|v| v.as_str()).unwrap_or("");
    let actor = iri_of(activity.get("actor").unwrap_or(&Value::Null))?.to_string();
    let object = activity.get("object").unwrap_or(&Value::Null);

    Some(match kind {
        "Follow" => InboxActivity::Follow {
            id: nonempty(activity.get("id"))?,
            actor,
            object: iri_of(object)?.to_string(),
        },
        "Accept" => InboxActivity::Accept { actor, follow_iri: follow_ref(object)? },
        "Reject" => InboxActivity::Reject { actor, follow_iri: follow_ref(object)? },
        "Create" => InboxActivity::Create { actor, object: object.clone() },
        "Update" => InboxActivity::Update { actor, object: object.clone() },
        "Delete" => InboxActivity::Delete { actor, object_id: iri_of(object)?.to_string() },
        "Like" => InboxActivity::Like { actor, object_id: iri_of(object)?.to_string() },
        "Announce" => InboxActivity::Announce {
            id: nonempty(activity.get("id"))?,
            actor,
            object_id: iri_of(object)?.to_string(),
            to: owned_refs(activity.get("to")),
            cc: owned_refs(activity.get("cc")),
        },
        "Undo" => InboxActivity::Undo { actor, target: undo_target(object)? },
        other => InboxActivity::Unsupported { kind: other.to_string() },
    })
}

fn nonempty(v: Option<&Value>) -> Option<String> {
    v.and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn owned_refs(v: Option<&Value>) -> Vec<String> {
    v.map(|v| ref_list(v).into_iter().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Accept/Reject correlate on the wrapped Follow's IRI; peers send either the
/// bare IRI or the embedded activity.
fn follow_ref(object: &Value) -> Option<String> {
    match object {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Object(_) => {
            if object.get("type").and_then(|v| v.as_str()) != Some("Follow") {
                return None;
            }
            nonempty(object.get("id"))
        }
        _ => None,
    }
}

fn undo_target(object: &Value) -> Option<UndoTarget> {
    match object {
        Value::String(s) if !s.trim().is_empty() => Some(UndoTarget::ByIri { iri: s.clone() }),
        Value::Object(_) => {
            let kind = object.get("type").and_then(|v| v.as_str()).unwrap_or("");
            match kind {
                "Follow" => Some(UndoTarget::Follow { iri: nonempty(object.get("id"))? }),
                "Like" => Some(UndoTarget::Like {
                    object_id: iri_of(object.get("object").unwrap_or(&Value::Null))?.to_string(),
                }),
                "Announce" => Some(UndoTarget::Announce {
                    object_id: iri_of(object.get("object").unwrap_or(&Value::Null))?.to_string(),
                }),
                other => Some(UndoTarget::Other { kind: other.to_string() }),
            }
        }
        _ => None,
    }
}

/// Single entry point: reconcile one verified activity. Returns nothing on
/// success; there is no reply payload (protocol replies such as Accept are
/// explicit outbound sends, not an error channel).
pub async fn process_activity(
    db: &SocialDb,
    ctx: &dyn FederationContext,
    activity: &Value,
) -> Result<()> {
    let Some(parsed) = classify(activity) else {
        debug!(
            kind = activity.get("type").and_then(|v| v.as_str()).unwrap_or("?"),
            "dropping structurally unusable activity"
        );
        return Ok(());
    };

    match parsed {
        InboxActivity::Follow { id, actor, object } => {
            handle_follow(db, ctx, activity, &id, &actor, &object).await
        }
        InboxActivity::Accept { actor, follow_iri } => {
            // Reply to a follow we initiated: the accepting actor is the
            // following side of the edge.
            if db.approve_follow(&follow_iri, &actor)? {
                debug!(%follow_iri, "follow approved");
            }
            Ok(())
        }
        InboxActivity::Reject { actor, follow_iri } => {
            db.reject_follow(&follow_iri, &actor)?;
            Ok(())
        }
        InboxActivity::Create { actor, object } => {
            handle_create_or_update(db, ctx, &actor, object).await
        }
        InboxActivity::Update { actor, object } => {
            if let Some(refreshed) = actor_document(&actor, &object) {
                crate::resolve::refresh_account_from(db, &refreshed)?;
                return Ok(());
            }
            handle_create_or_update(db, ctx, &actor, object).await
        }
        InboxActivity::Delete { actor, object_id } => handle_delete(db, &actor, &object_id),
        InboxActivity::Like { actor, object_id } => handle_like(db, ctx, &actor, &object_id).await,
        InboxActivity::Announce { id, actor, object_id, to, cc } => {
            handle_announce(db, ctx, &id, &actor, &object_id, &to, &cc).await
        }
        InboxActivity::Undo { actor, target } => handle_undo(db, ctx, &actor, target).await,
        InboxActivity::Unsupported { kind } => {
            debug!(%kind, "unsupported activity kind");
            Ok(())
        }
    }
}

async fn handle_follow(
    db: &SocialDb,
    ctx: &dyn FederationContext,
    activity: &Value,
    follow_id: &str,
    actor_iri: &str,
    object_iri: &str,
) -> Result<()> {
    // Only follows of accounts with a local owner are accepted.
    let Some(LocalRef::Account { handle }) = ctx.parse_local_uri(object_iri) else {
        debug!(object = %object_iri, "follow targets no local account");
        return Ok(());
    };
    let Some(target) = db.get_local_account_by_handle(&handle)? else {
        debug!(%handle, "follow targets unknown handle");
        return Ok(());
    };
    let Some(follower) = resolve_actor(db, ctx, actor_iri).await? else {
        return Ok(());
    };

    let approve = !target.protected;
    db.record_follow(follow_id, &follower.iri, &target.iri, approve)?;
    if approve {
        send_accept(db, ctx, activity, &target, &follower).await;
    }
    Ok(())
}

/// Synchronous Accept reply for an auto-approved follow. Local state is
/// already consistent at this point; a failed send only means the peer will
/// re-deliver its Follow and get another Accept.
async fn send_accept(
    db: &SocialDb,
    ctx: &dyn FederationContext,
    follow_activity: &Value,
    target: &AccountRow,
    follower: &AccountRow,
) {
    let Some(inbox) = follower.inbox_url.as_deref().or(follower.shared_inbox_url.as_deref()) else {
        debug!(follower = %follower.iri, "follower advertises no inbox, skipping accept");
        return;
    };
    let accept = serde_json::json!({
        "@context": "https://www.w3.org/ns/activitystreams",
        "id": db.new_activity_id(&target.iri),
        "type": "Accept",
        "actor": target.iri,
        "object": follow_activity,
        "to": [follower.iri],
    });
    if let Err(e) = ctx.deliver(&accept, inbox).await {
        warn!(follower = %follower.iri, "accept delivery failed: {e:#}");
    }
}

async fn handle_create_or_update(
    db: &SocialDb,
    ctx: &dyn FederationContext,
    actor_iri: &str,
    object: Value,
) -> Result<()> {
    let object = if let Some(iri) = object.as_str() {
        match ctx.fetch_object(iri).await? {
            Some(o) => o,
            None => {
                debug!(%iri, "created object did not resolve");
                return Ok(());
            }
        }
    } else if object.is_object() {
        match serde_json::from_value::<RemoteObject>(object) {
            Ok(o) if !o.id.trim().is_empty() => o,
            _ => {
                debug!("embedded object lacks a usable identifier");
                return Ok(());
            }
        }
    } else {
        return Ok(());
    };
    // Ownership gate: only the attributed author may create or update.
    if object.attributed_to_iri() != Some(actor_iri) {
        debug!(object = %object.id, actor = %actor_iri, "object not attributed to activity actor");
        return Ok(());
    }
    // Attribution in the payload is peer-controlled; for an already stored
    // object the row's owner is authoritative.
    if let Some(existing) = db.get_post(&object.id)? {
        if existing.account_iri != actor_iri {
            debug!(object = %object.id, actor = %actor_iri, "stored post belongs to another account");
            return Ok(());
        }
    }
    resolve_post(db, ctx, &object).await?;
    Ok(())
}

/// An Update whose object is the actor's own document (profile refresh).
fn actor_document(actor_iri: &str, object: &Value) -> Option<RemoteActor> {
    let doc = serde_json::from_value::<RemoteActor>(object.clone()).ok()?;
    if doc.id == actor_iri && RemoteActor::is_actor_kind(&doc.kind) {
        Some(doc)
    } else {
        None
    }
}

fn handle_delete(db: &SocialDb, actor_iri: &str, object_id: &str) -> Result<()> {
    if object_id == actor_iri {
        // Actor deleting itself: cascades to its authored content.
        if db.delete_account(actor_iri)? {
            debug!(actor = %actor_iri, "account deleted");
        }
        return Ok(());
    }
    let Some(post) = db.get_post(object_id)? else {
        return Ok(());
    };
    if post.account_iri != actor_iri {
        debug!(post = %object_id, actor = %actor_iri, "delete from non-owner dropped");
        return Ok(());
    }
    db.delete_post(object_id)?;
    Ok(())
}

async fn handle_like(
    db: &SocialDb,
    ctx: &dyn FederationContext,
    actor_iri: &str,
    object_id: &str,
) -> Result<()> {
    // Likes apply to locally known posts only, by parsed local identifier.
    let Some(post) = local_post(db, ctx, object_id)? else {
        debug!(object = %object_id, "like targets no local post");
        return Ok(());
    };
    let Some(account) = resolve_actor(db, ctx, actor_iri).await? else {
        return Ok(());
    };
    db.insert_like(&post.iri, &account.iri)?;
    Ok(())
}

fn local_post(db: &SocialDb, ctx: &dyn FederationContext, object_id: &str) -> Result<Option<PostRow>> {
    match ctx.parse_local_uri(object_id) {
        Some(LocalRef::Post { iri }) => db.get_post(&iri),
        _ => Ok(None),
    }
}

async fn handle_announce(
    db: &SocialDb,
    ctx: &dyn FederationContext,
    announce_id: &str,
    actor_iri: &str,
    object_id: &str,
    to: &[String],
    cc: &[String],
) -> Result<()> {
    let Some(sharer) = resolve_actor(db, ctx, actor_iri).await? else {
        return Ok(());
    };
    let Some(original) = resolve_announced(db, ctx, object_id).await? else {
        debug!(object = %object_id, "announced object did not resolve to a post");
        return Ok(());
    };
    let visibility = announce_visibility(to, cc, original.visibility);
    db.insert_share(announce_id, &sharer.iri, &original.iri, visibility)?;
    Ok(())
}

/// The announced object may be one of our posts, an already known remote
/// post, or something we have to dereference and upsert first.
async fn resolve_announced(
    db: &SocialDb,
    ctx: &dyn FederationContext,
    object_id: &str,
) -> Result<Option<PostRow>> {
    if let Some(post) = local_post(db, ctx, object_id)? {
        return Ok(Some(post));
    }
    if let Some(post) = db.get_post(object_id)? {
        return Ok(Some(post));
    }
    let Some(object) = ctx.fetch_object(object_id).await? else {
        return Ok(None);
    };
    resolve_post(db, ctx, &object).await
}

fn announce_visibility(to: &[String], cc: &[String], fallback: Visibility) -> Visibility {
    if to.iter().any(|r| is_public_address(r)) {
        return Visibility::Public;
    }
    if cc.iter().any(|r| is_public_address(r)) {
        return Visibility::Unlisted;
    }
    fallback
}

async fn handle_undo(
    db: &SocialDb,
    ctx: &dyn FederationContext,
    actor_iri: &str,
    target: UndoTarget,
) -> Result<()> {
    match target {
        UndoTarget::Follow { iri } => {
            // Zero rows removed (out-of-order or racing Undo) skips the
            // counter write inside undo_follow.
            db.undo_follow(&iri, actor_iri)?;
            Ok(())
        }
        UndoTarget::Like { object_id } => {
            let Some(post) = local_post(db, ctx, &object_id)? else {
                return Ok(());
            };
            db.delete_like(&post.iri, actor_iri)?;
            Ok(())
        }
        UndoTarget::Announce { object_id } => {
            let Some(sharer) = resolve_actor(db, ctx, actor_iri).await? else {
                return Ok(());
            };
            let Some(original) = resolve_announced(db, ctx, &object_id).await? else {
                debug!(object = %object_id, "undone announce target did not resolve");
                return Ok(());
            };
            db.undo_share(&sharer.iri, &original.iri)?;
            Ok(())
        }
        UndoTarget::ByIri { iri } => {
            // A bare IRI can only name the IRI-correlated rows: a Follow
            // activity or an Announce share row.
            if db.undo_follow(&iri, actor_iri)? {
                return Ok(());
            }
            db.undo_share_by_iri(&iri, actor_iri)?;
            Ok(())
        }
        UndoTarget::Other { kind } => {
            debug!(%kind, "unsupported undo target");
            Ok(())
        }
    }
}
