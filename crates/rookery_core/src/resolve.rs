/*
 * SPDX-FileCopyrightText: 2026 Rookery Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::context::{FederationContext, LocalRef};
use crate::social_db::{AccountProfile, AccountRow, NewPost, PostAttachment, PostRow, SocialDb, Visibility};
use anyhow::Result;
use rookery_protocol::{is_public_address, RemoteActor, RemoteObject};
use tracing::debug;

/// Writes the profile fields of a fetched (or pushed) actor document over the
/// stored account row, creating it on first sight.
pub fn refresh_account_from(db: &SocialDb, actor: &RemoteActor) -> Result<()> {
    db.upsert_account(&AccountProfile {
        iri: actor.id.clone(),
        handle: None,
        display_name: actor.name.clone().or_else(|| actor.preferred_username.clone()),
        summary: actor.summary.clone(),
        protected: actor.manually_approves_followers,
        inbox_url: actor.inbox.clone(),
        shared_inbox_url: actor
            .endpoints
            .as_ref()
            .and_then(|e| e.shared_inbox.clone()),
        public_key_pem: actor.public_key.as_ref().and_then(|k| k.public_key_pem.clone()),
    })
}

/// Fetch-or-create-or-update for an actor reference. `Ok(None)` means the
/// reference did not resolve and the caller must abandon the activity without
/// mutating state. Profile fields are last-write-wins; counters and the local
/// handle survive refreshes.
pub async fn resolve_actor(
    db: &SocialDb,
    ctx: &dyn FederationContext,
    actor_iri: &str,
) -> Result<Option<AccountRow>> {
    let actor_iri = actor_iri.trim();
    if actor_iri.is_empty() {
        return Ok(None);
    }

    // Our own actors are never fetched over the network.
    if let Some(LocalRef::Account { handle }) = ctx.parse_local_uri(actor_iri) {
        return db.get_local_account_by_handle(&handle);
    }

    let Some(actor) = ctx.fetch_actor(actor_iri).await? else {
        debug!(iri = %actor_iri, "actor did not resolve");
        return Ok(None);
    };

    refresh_account_from(db, &actor)?;
    db.get_account(&actor.id)
}

/// Upserts a post from a dereferenced object document. The author resolves
/// first (a post row never lands without its account); the reply target is a
/// local lookup only and stays null when the ancestor is unknown.
pub async fn resolve_post(
    db: &SocialDb,
    ctx: &dyn FederationContext,
    object: &RemoteObject,
) -> Result<Option<PostRow>> {
    if !RemoteObject::is_post_kind(&object.kind) {
        debug!(iri = %object.id, kind = %object.kind, "unsupported post kind");
        return Ok(None);
    }
    let Some(author_iri) = object.attributed_to_iri() else {
        debug!(iri = %object.id, "object carries no attribution");
        return Ok(None);
    };
    let Some(author) = resolve_actor(db, ctx, author_iri).await? else {
        return Ok(None);
    };

    let in_reply_to_iri = match object.in_reply_to_iri() {
        Some(parent) => db.get_post(parent)?.map(|p| p.iri),
        None => None,
    };

    db.upsert_post(&NewPost {
        iri: object.id.clone(),
        account_iri: author.iri.clone(),
        visibility: derive_visibility(object),
        content: object.content.clone(),
        in_reply_to_iri,
    })?;

    let mut mentioned = Vec::new();
    for mention in object.mention_iris() {
        if let Some(account) = resolve_actor(db, ctx, mention).await? {
            mentioned.push(account.iri);
        }
    }
    db.replace_post_mentions(&object.id, &mentioned)?;

    let attachments: Vec<PostAttachment> = object
        .attachments()
        .into_iter()
        .filter_map(|a| {
            a.url.map(|url| PostAttachment {
                url,
                media_type: a.media_type,
                description: a.name,
            })
        })
        .collect();
    db.replace_post_attachments(&object.id, &attachments)?;

    db.get_post(&object.id)
}

/// Visibility from addressing: public marker in `to` is public, in `cc`
/// unlisted; a followers collection in `to` is followers-only; anything
/// else is direct.
pub fn derive_visibility(object: &RemoteObject) -> Visibility {
    if object.to_refs().iter().any(|r| is_public_address(r)) {
        return Visibility::Public;
    }
    if object.cc_refs().iter().any(|r| is_public_address(r)) {
        return Visibility::Unlisted;
    }
    if object.to_refs().iter().any(|r| r.trim_end_matches('/').ends_with("/followers")) {
        return Visibility::Private;
    }
    Visibility::Direct
}
