/*
 * SPDX-FileCopyrightText: 2026 Rookery Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use crate::context::{FederationContext, LocalRef};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use rookery_protocol::{RemoteActor, RemoteObject};
use serde_json::Value;
use tracing::debug;

const ACTIVITY_ACCEPT: &str =
    "application/activity+json, application/ld+json; profile=\"https://www.w3.org/ns/activitystreams\"";
const ACTIVITY_CONTENT_TYPE: &str = "application/activity+json";

/// Production `FederationContext`: dereferences over HTTP and classifies IRIs
/// against the configured public base URL. One instance serves one inbound
/// request; the verified signer is fixed at construction.
#[derive(Clone)]
pub struct RemoteContext {
    http: reqwest::Client,
    public_base_url: String,
    signer: Option<String>,
}

impl RemoteContext {
    pub fn new(http: reqwest::Client, public_base_url: &str) -> Self {
        Self {
            http,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            signer: None,
        }
    }

    pub fn with_signer(mut self, signer: Option<String>) -> Self {
        self.signer = signer.filter(|s| !s.trim().is_empty());
        self
    }

    async fn get_json(&self, iri: &str) -> Result<Option<Value>> {
        let resp = self
            .http
            .get(iri)
            .header(ACCEPT, ACTIVITY_ACCEPT)
            .send()
            .await
            .with_context(|| format!("fetch: {iri}"))?;
        if !resp.status().is_success() {
            debug!(%iri, status = %resp.status(), "dereference not ok");
            return Ok(None);
        }
        let bytes = resp.bytes().await?;
        match serde_json::from_slice(&bytes) {
            Ok(v) => Ok(Some(v)),
            Err(_) => {
                debug!(%iri, "dereference yielded non-json payload");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl FederationContext for RemoteContext {
    async fn fetch_actor(&self, iri: &str) -> Result<Option<RemoteActor>> {
        let Some(v) = self.get_json(iri).await? else {
            return Ok(None);
        };
        let Ok(actor) = serde_json::from_value::<RemoteActor>(v) else {
            debug!(%iri, "actor document missing usable identifier");
            return Ok(None);
        };
        if actor.id.trim().is_empty() || !RemoteActor::is_actor_kind(&actor.kind) {
            debug!(%iri, kind = %actor.kind, "not an actor document");
            return Ok(None);
        }
        Ok(Some(actor))
    }

    async fn fetch_object(&self, iri: &str) -> Result<Option<RemoteObject>> {
        let Some(v) = self.get_json(iri).await? else {
            return Ok(None);
        };
        let Ok(object) = serde_json::from_value::<RemoteObject>(v) else {
            debug!(%iri, "object document missing usable identifier");
            return Ok(None);
        };
        if object.id.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(object))
    }

    fn parse_local_uri(&self, iri: &str) -> Option<LocalRef> {
        let rest = iri.strip_prefix(&self.public_base_url)?;
        let rest = rest.strip_prefix("/users/")?;
        if rest.contains("..") || rest.contains('\\') {
            return None;
        }
        match rest.split_once('/') {
            None if !rest.is_empty() => Some(LocalRef::Account { handle: rest.to_string() }),
            Some((handle, tail)) => {
                let id = tail.strip_prefix("posts/")?;
                if handle.is_empty() || id.is_empty() || id.contains('/') {
                    return None;
                }
                Some(LocalRef::Post { iri: iri.to_string() })
            }
            _ => None,
        }
    }

    fn signed_key_owner(&self) -> Option<String> {
        self.signer.clone()
    }

    async fn deliver(&self, activity: &Value, inbox_url: &str) -> Result<()> {
        self.http
            .post(inbox_url)
            .header(CONTENT_TYPE, ACTIVITY_CONTENT_TYPE)
            .json(activity)
            .send()
            .await
            .with_context(|| format!("deliver to {inbox_url}"))?
            .error_for_status()
            .with_context(|| format!("delivery not ok: {inbox_url}"))?;
        Ok(())
    }
}
