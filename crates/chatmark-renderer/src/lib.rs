//! Chatmark renderer
//!
//! Turns chat markdown, possibly still streaming, into sanitized HTML tokens.
//! A message is split into blocks, each block is normalized and rendered
//! once, and the result is memoized in a [`BlockCache`] keyed by position,
//! content and citation sources.
//!
//! Rendering covers CommonMark plus GFM, TeX math (`$…$`, `$$…$$`, `\(…\)`,
//! `\[…\]`), `[n]` citation markers, and a narrow allow-list of raw
//! `<video>`/`<audio>` HTML. Everything else in raw HTML is escaped.

pub mod blocks;
pub mod cache;
pub mod citation;
#[cfg(feature = "syntax-highlighting")]
pub mod code_pretty;
pub mod config;
#[cfg(feature = "syntax-css")]
pub mod css;
pub mod engine;
pub mod error;
pub mod extension;
pub mod fence;
pub mod highlight;
pub mod href;
pub mod math;
pub mod media;
pub mod normalize;
pub mod style;
pub mod types;

mod base_html;

#[cfg(not(all(target_family = "wasm", target_os = "unknown")))]
pub(crate) use regex as re;
#[cfg(all(target_family = "wasm", target_os = "unknown"))]
pub(crate) use regex_lite as re;

pub use blocks::{BlockSplitter, ParagraphSplitter};
pub use cache::BlockCache;
pub use config::RendererConfig;
pub use engine::{RenderContext, RenderEngine, RenderOptions};
pub use error::{HighlightError, RenderError};
pub use extension::{GrammarExtension, MathExtensionSet, PreparedSource};
pub use fence::is_fence_closed;
pub use highlight::{PlainHighlighter, SyntaxHighlighter};
pub use href::sanitize_href;
pub use math::{LatexTypesetter, MathTypesetter};
pub use media::sanitize_media_html;
pub use normalize::{MarkdownNormalizer, StreamingNormalizer};
pub use types::{BlockToken, Source, Token};
