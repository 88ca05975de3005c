use serde::{Deserialize, Serialize};
use smol_str::{SmolStr, format_smolstr};

/// A citation source. Position in the source list (1-based) is the number
/// that `[n]` markers refer to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Source {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub link: String,
}

impl Source {
    pub fn new(link: impl Into<String>) -> Self {
        Self {
            title: None,
            link: link.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// One rendered unit of a block, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Token {
    /// A top-level code block, highlighted separately so the UI can tell
    /// a still-streaming block from a finished one.
    Code {
        language: Option<SmolStr>,
        /// Highlighted inner HTML (no `<pre>` wrapper).
        highlighted_html: String,
        /// Code body without the fences.
        code: String,
        /// Raw source of the block, fences included.
        raw_source: String,
        is_closed: bool,
    },
    /// Any other top-level node, fully rendered.
    Text { html: String },
}

impl Token {
    pub fn is_code(&self) -> bool {
        matches!(self, Token::Code { .. })
    }

    /// Rendered HTML of a text token, or the highlighted HTML of a code token.
    pub fn html(&self) -> &str {
        match self {
            Token::Code {
                highlighted_html, ..
            } => highlighted_html,
            Token::Text { html } => html,
        }
    }
}

/// A rendered block with a stable id for keyed UI updates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockToken {
    /// `b-{index}-{content hash prefix}`; unchanged content keeps its id.
    pub id: SmolStr,
    pub content: String,
    pub tokens: Vec<Token>,
}

/// Content hash used for cache keys and block ids.
pub fn hash_source(text: &str) -> blake3::Hash {
    blake3::hash(text.as_bytes())
}

/// Hash of the citation source list. Titles are included since they end up
/// in the rendered anchors.
pub fn hash_sources(sources: &[Source]) -> blake3::Hash {
    let mut hasher = blake3::Hasher::new();
    for source in sources {
        hasher.update(source.link.as_bytes());
        hasher.update(&[0x1f]);
        if let Some(title) = &source.title {
            hasher.update(title.as_bytes());
        }
        hasher.update(&[0x1e]);
    }
    hasher.finalize()
}

/// Generate a block id from its position and content hash.
pub fn make_block_id(index: usize, content_hash: &blake3::Hash) -> SmolStr {
    let hex = content_hash.to_hex();
    format_smolstr!("b-{}-{}", index, &hex.as_str()[..16])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_source() {
        let h1 = hash_source("hello world");
        let h2 = hash_source("hello world");
        let h3 = hash_source("hello world!");

        assert_eq!(h1, h2);
        assert_ne!(h1, h3);
    }

    #[test]
    fn test_make_block_id() {
        let hash = hash_source("hello");
        let id = make_block_id(3, &hash);
        assert!(id.starts_with("b-3-"));
        assert_eq!(id.len(), "b-3-".len() + 16);
        assert_eq!(id, make_block_id(3, &hash_source("hello")));
        assert_ne!(id, make_block_id(4, &hash));
    }

    #[test]
    fn source_hash_tracks_titles() {
        let plain = [Source::new("https://example.com")];
        let titled = [Source::new("https://example.com").with_title("Example")];
        assert_ne!(hash_sources(&plain), hash_sources(&titled));
        assert_eq!(hash_sources(&plain), hash_sources(&plain.clone()));
    }

    #[test]
    fn token_serializes_with_type_tag() {
        let token = Token::Text {
            html: "<p>hi</p>".into(),
        };
        let json = serde_json::to_value(&token).unwrap();
        assert_eq!(json["type"], "text");
        assert_eq!(json["html"], "<p>hi</p>");
    }
}
