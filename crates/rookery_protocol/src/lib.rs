/*
 * SPDX-FileCopyrightText: 2026 Rookery Project
 * SPDX-License-Identifier: AGPL-3.0-only
 */

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Addressing markers peers use for "public" (long form, compact form, bare).
pub const PUBLIC_ADDRESSES: [&str; 3] = [
    "https://www.w3.org/ns/activitystreams#Public",
    "as:Public",
    "Public",
];

/// A dereferenced remote actor document, reduced to the fields the
/// reconciliation engine persists or routes on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteActor {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "preferredUsername", default)]
    pub preferred_username: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub inbox: Option<String>,
    #[serde(default)]
    pub endpoints: Option<ActorEndpoints>,
    #[serde(rename = "publicKey", default)]
    pub public_key: Option<ActorKey>,
    #[serde(rename = "manuallyApprovesFollowers", default)]
    pub manually_approves_followers: bool,
    #[serde(default)]
    pub followers: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorEndpoints {
    #[serde(rename = "sharedInbox", default)]
    pub shared_inbox: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActorKey {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "publicKeyPem", default)]
    pub public_key_pem: Option<String>,
}

impl RemoteActor {
    pub fn is_actor_kind(kind: &str) -> bool {
        matches!(kind, "Person" | "Service" | "Application" | "Group" | "Organization")
    }
}

/// A dereferenced remote object document (Note, Article, ...).
///
/// Peers are wildly inconsistent about single-vs-array and string-vs-embedded
/// shapes, so the polymorphic fields stay as raw JSON behind accessors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteObject {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(rename = "attributedTo", default)]
    pub attributed_to: Value,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(rename = "inReplyTo", default)]
    pub in_reply_to: Value,
    #[serde(default)]
    pub to: Value,
    #[serde(default)]
    pub cc: Value,
    #[serde(default)]
    pub tag: Value,
    #[serde(default)]
    pub attachment: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteAttachment {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(rename = "mediaType", default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl RemoteObject {
    pub fn is_post_kind(kind: &str) -> bool {
        matches!(kind, "Note" | "Article")
    }

    pub fn attributed_to_iri(&self) -> Option<&str> {
        iri_of(&self.attributed_to)
    }

    pub fn in_reply_to_iri(&self) -> Option<&str> {
        iri_of(&self.in_reply_to)
    }

    pub fn to_refs(&self) -> Vec<&str> {
        ref_list(&self.to)
    }

    pub fn cc_refs(&self) -> Vec<&str> {
        ref_list(&self.cc)
    }

    /// `href`s of Mention tags.
    pub fn mention_iris(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for tag in as_slice(&self.tag) {
            let is_mention = tag.get("type").and_then(|v| v.as_str()) == Some("Mention");
            if !is_mention {
                continue;
            }
            if let Some(href) = tag.get("href").and_then(|v| v.as_str()) {
                if !href.trim().is_empty() {
                    out.push(href);
                }
            }
        }
        out
    }

    pub fn attachments(&self) -> Vec<RemoteAttachment> {
        as_slice(&self.attachment)
            .iter()
            .filter_map(|item| serde_json::from_value::<RemoteAttachment>((*item).clone()).ok())
            .filter(|a| a.url.as_deref().map(|u| !u.trim().is_empty()).unwrap_or(false))
            .collect()
    }
}

/// Extracts the IRI out of a reference that may be a bare string, an embedded
/// object with an `id`, or an array of either (first usable entry wins).
pub fn iri_of(v: &Value) -> Option<&str> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.as_str()),
        Value::Object(_) => v.get("id").and_then(|id| id.as_str()).filter(|s| !s.trim().is_empty()),
        Value::Array(arr) => arr.iter().find_map(iri_of),
        _ => None,
    }
}

pub fn is_public_address(addr: &str) -> bool {
    PUBLIC_ADDRESSES.contains(&addr)
}

/// Flattens a string / object / array addressing field into its IRIs.
pub fn ref_list(v: &Value) -> Vec<&str> {
    match v {
        Value::String(s) if !s.trim().is_empty() => vec![s.as_str()],
        Value::Array(arr) => arr.iter().filter_map(iri_of).collect(),
        Value::Object(_) => iri_of(v).into_iter().collect(),
        _ => Vec::new(),
    }
}

fn as_slice(v: &Value) -> Vec<&Value> {
    match v {
        Value::Array(arr) => arr.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn actor_endpoints_and_defaults_deserialize() {
        let actor: RemoteActor = serde_json::from_value(json!({
            "id": "https://remote.example/users/ada",
            "type": "Person",
            "inbox": "https://remote.example/users/ada/inbox",
            "endpoints": { "sharedInbox": "https://remote.example/inbox" }
        }))
        .unwrap();
        assert_eq!(
            actor.endpoints.and_then(|e| e.shared_inbox).as_deref(),
            Some("https://remote.example/inbox")
        );
        assert!(!actor.manually_approves_followers);
    }

    #[test]
    fn object_accessors_tolerate_mixed_shapes() {
        let obj: RemoteObject = serde_json::from_value(json!({
            "id": "https://remote.example/notes/1",
            "type": "Note",
            "attributedTo": { "id": "https://remote.example/users/ada" },
            "to": "https://www.w3.org/ns/activitystreams#Public",
            "cc": ["https://remote.example/users/ada/followers"],
            "tag": { "type": "Mention", "href": "https://local.example/users/bob" },
            "attachment": [
                { "url": "https://remote.example/media/1.png", "mediaType": "image/png" },
                { "name": "no url, skipped" }
            ]
        }))
        .unwrap();
        assert_eq!(obj.attributed_to_iri(), Some("https://remote.example/users/ada"));
        assert_eq!(obj.to_refs(), vec!["https://www.w3.org/ns/activitystreams#Public"]);
        assert!(is_public_address(obj.to_refs()[0]));
        assert_eq!(obj.mention_iris(), vec!["https://local.example/users/bob"]);
        assert_eq!(obj.attachments().len(), 1);
        assert_eq!(obj.in_reply_to_iri(), None);
    }
}
