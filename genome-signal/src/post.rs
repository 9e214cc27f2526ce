//! Acquired posts.

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

pub(crate) const UNKNOWN: &str = "unknown";

fn unknown() -> String {
    UNKNOWN.to_string()
}

/// A post as supplied by content acquisition.
///
/// Missing, null or wrong-typed identifiers deserialize to `"unknown"` so
/// downstream trackers always have a key to index by; other fields fall back
/// to empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    #[serde(default = "unknown", deserialize_with = "id_or_unknown")]
    pub post_id: String,

    #[serde(default = "unknown", deserialize_with = "id_or_unknown")]
    pub agent_id: String,

    #[serde(default, deserialize_with = "text_or_empty")]
    pub content: String,

    /// ISO-8601, compared lexically
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub agent_name: Option<String>,

    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, deserialize_with = "optional_count", skip_serializing_if = "Option::is_none")]
    pub upvotes: Option<i64>,

    #[serde(default, deserialize_with = "optional_count", skip_serializing_if = "Option::is_none")]
    pub comments_count: Option<i64>,

    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub submolt: Option<String>,
}

fn scalar_text(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn id_or_unknown<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(scalar_text(Value::deserialize(deserializer)?).unwrap_or_else(unknown))
}

fn text_or_empty<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(scalar_text(Value::deserialize(deserializer)?).unwrap_or_default())
}

fn optional_text<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(scalar_text(Value::deserialize(deserializer)?))
}

fn optional_count<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<i64>, D::Error> {
    Ok(match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Parse a JSON array of posts, normalized.
///
/// Entries that are not objects are skipped with a warning; only a document
/// that is not an array at all is an error.
pub fn parse_batch(raw: &str) -> Result<Vec<Post>> {
    let items: Vec<Value> = serde_json::from_str(raw).context("Expected a JSON array of posts")?;

    Ok(items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| match serde_json::from_value::<Post>(item) {
            Ok(post) => Some(post.normalized()),
            Err(e) => {
                warn!(index, error = %e, "Skipping unreadable post");
                None
            }
        })
        .collect())
}

impl Post {
    pub fn new(
        post_id: impl Into<String>,
        agent_id: impl Into<String>,
        content: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            post_id: post_id.into(),
            agent_id: agent_id.into(),
            content: content.into(),
            timestamp: Some(timestamp.into()),
            agent_name: None,
            url: None,
            upvotes: None,
            comments_count: None,
            submolt: None,
        }
    }

    /// Replace blank identifiers with the `"unknown"` placeholder.
    pub fn normalized(mut self) -> Self {
        if self.post_id.trim().is_empty() {
            self.post_id = unknown();
        }
        if self.agent_id.trim().is_empty() {
            self.agent_id = unknown();
        }
        self
    }

    /// Sort key for processing order; posts without a timestamp go first.
    pub fn sort_key(&self) -> (&str, &str) {
        (self.timestamp.as_deref().unwrap_or(""), self.post_id.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_get_placeholders() {
        let post: Post = serde_json::from_str(r#"{"content": "hello"}"#).unwrap();
        assert_eq!(post.post_id, "unknown");
        assert_eq!(post.agent_id, "unknown");
        assert!(post.timestamp.is_none());
    }

    #[test]
    fn test_null_and_wrong_typed_fields() {
        let post: Post = serde_json::from_str(
            r#"{"post_id": null, "agent_id": 42, "content": ["x"], "timestamp": null, "upvotes": "7"}"#,
        )
        .unwrap();
        assert_eq!(post.post_id, "unknown");
        assert_eq!(post.agent_id, "42");
        assert_eq!(post.content, "");
        assert!(post.timestamp.is_none());
        assert_eq!(post.upvotes, Some(7));
    }

    #[test]
    fn test_parse_batch_keeps_good_posts() {
        let raw = r#"[
            {"post_id": "ok", "agent_id": "a1", "content": "fine"},
            {"post_id": null, "content": "x"},
            17,
            {"post_id": "", "agent_id": "a2", "content": null}
        ]"#;
        let posts = parse_batch(raw).unwrap();
        let ids: Vec<&str> = posts.iter().map(|p| p.post_id.as_str()).collect();
        assert_eq!(ids, vec!["ok", "unknown", "unknown"]);
        assert_eq!(posts[0].content, "fine");
        assert_eq!(posts[2].agent_id, "a2");
    }

    #[test]
    fn test_parse_batch_rejects_non_array() {
        assert!(parse_batch(r#"{"post_id": "ok"}"#).is_err());
    }

    #[test]
    fn test_normalized_blank_ids() {
        let post = Post::new("  ", "", "x", "2026-01-28T14:21:03Z").normalized();
        assert_eq!(post.post_id, "unknown");
        assert_eq!(post.agent_id, "unknown");
    }

    #[test]
    fn test_engagement_metadata() {
        let post: Post = serde_json::from_str(
            r#"{"post_id": "molt_001", "agent_id": "agent_alpha", "content": "hi",
                "upvotes": 12, "submolt": "consciousness"}"#,
        )
        .unwrap();
        assert_eq!(post.upvotes, Some(12));
        assert_eq!(post.submolt.as_deref(), Some("consciousness"));
    }
}
