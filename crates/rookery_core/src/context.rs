/*
 * SPDX-FileCopyrightText: 2026 Rookery Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use anyhow::Result;
use async_trait::async_trait;
use rookery_protocol::{RemoteActor, RemoteObject};
use serde_json::Value;

/// A dereferenced IRI that falls under this server's own base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalRef {
    Account { handle: String },
    Post { iri: String },
}

/// Collaborators the reconciliation engine needs from the surrounding
/// federation layer: dereferencing, local-route classification, the verified
/// signer of the current request, and an outbound send primitive.
///
/// Fetches fail closed: any non-success or unparseable outcome is `Ok(None)`
/// and the caller abandons the activity. `Err` is reserved for infrastructure
/// failures worth surfacing.
#[async_trait]
pub trait FederationContext: Send + Sync {
    async fn fetch_actor(&self, iri: &str) -> Result<Option<RemoteActor>>;

    async fn fetch_object(&self, iri: &str) -> Result<Option<RemoteObject>>;

    fn parse_local_uri(&self, iri: &str) -> Option<LocalRef>;

    /// Verified signer of the inbound request being processed, if any.
    fn signed_key_owner(&self) -> Option<String>;

    /// Sends a reply activity (e.g. Accept) to a remote inbox.
    async fn deliver(&self, activity: &Value, inbox_url: &str) -> Result<()>;
}
