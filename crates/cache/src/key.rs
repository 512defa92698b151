//! Mapping from domain keys to file cache keys

use std::fmt;

/// Turns a domain key into the string a [`FileCache`](crate::FileCache) stores
///
/// The string is what gets hashed into the on-disk filename and recorded in
/// the manifest, so it must be stable across runs.
pub trait KeyStrategy: Send + Sync + 'static {
    /// Domain key accepted by the cache
    type Key: ?Sized;

    /// Stable string form of `key`
    fn cache_key(key: &Self::Key) -> String;
}

/// Remote URLs used verbatim (audio files, images)
#[derive(Debug, Clone, Copy, Default)]
pub struct UrlKey;

impl KeyStrategy for UrlKey {
    type Key = str;

    fn cache_key(key: &str) -> String {
        key.to_string()
    }
}

/// Identifies one saved draft
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DraftKey {
    /// Draft type, e.g. `comment` or `post`
    pub kind: String,

    /// Thread, post or project the draft belongs to
    pub context_id: Option<String>,

    pub draft_id: String,
}

impl DraftKey {
    pub fn new(kind: impl Into<String>, draft_id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            context_id: None,
            draft_id: draft_id.into(),
        }
    }

    /// Scope the draft to a context such as a post or thread
    pub fn with_context(mut self, context_id: impl Into<String>) -> Self {
        self.context_id = Some(context_id.into());
        self
    }
}

impl fmt::Display for DraftKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "draft:{}:{}:{}",
            self.kind,
            self.context_id.as_deref().unwrap_or(""),
            self.draft_id
        )
    }
}

/// Keys drafts as `draft:<kind>:<context>:<id>`
#[derive(Debug, Clone, Copy, Default)]
pub struct DraftKeys;

impl KeyStrategy for DraftKeys {
    type Key = DraftKey;

    fn cache_key(key: &DraftKey) -> String {
        key.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_key_is_verbatim() {
        assert_eq!(UrlKey::cache_key("https://cdn.example/a.mp3"), "https://cdn.example/a.mp3");
    }

    #[test]
    fn test_draft_key_format() {
        let key = DraftKey::new("comment", "42").with_context("post-7");
        assert_eq!(DraftKeys::cache_key(&key), "draft:comment:post-7:42");

        let bare = DraftKey::new("post", "9");
        assert_eq!(DraftKeys::cache_key(&bare), "draft:post::9");
    }
}
