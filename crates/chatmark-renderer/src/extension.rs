//! Math grammar extensions.
//!
//! pulldown-cmark has no extension hooks and would eat the backslashes in
//! `\(` and `\[`, so math is recognised before parsing. Each recognised span
//! is swapped for an opaque placeholder (`U+E000 index U+E001`) that survives
//! markdown parsing as plain text; the HTML writer then renders placeholders
//! in text through the owning extension, and puts the original source back
//! anywhere else (code, attributes, raw HTML).

use std::borrow::Cow;
use std::ops::Range;
use std::sync::LazyLock;

use pulldown_cmark::{Event, Options, Parser, Tag};
use pulldown_cmark_escape::{FmtWriter, escape_html_body_text};

use crate::math::MathTypesetter;
use crate::re::Regex;

const OPEN: char = '\u{E000}';
const CLOSE: char = '\u{E001}';

static BLOCK_DOLLAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\$\$(.+?)\$\$").unwrap());
static BLOCK_BRACKET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\\\[(.+?)\\\]").unwrap());
static INLINE_DOLLAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\$([^$]+?)\$").unwrap());
static INLINE_PAREN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\\\((.+?)\\\)").unwrap());

/// Scope an extension is tried at. Block extensions win over inline ones
/// starting at the same position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExtensionLevel {
    Block,
    Inline,
}

/// A recognised math span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionToken {
    /// Index of the extension that produced it within its set.
    pub extension: usize,
    /// Trimmed expression between the delimiters.
    pub expr: String,
    pub display_mode: bool,
    /// Source text, delimiters included.
    pub raw: String,
}

/// Result of a successful [`GrammarExtension::tokenize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtensionMatch {
    /// Bytes consumed from the start of the input.
    pub len: usize,
    pub expr: String,
}

pub trait GrammarExtension: Send + Sync {
    fn name(&self) -> &'static str;

    fn level(&self) -> ExtensionLevel;

    /// Earliest byte offset in `src` where this extension may match, so the
    /// scanner knows how much plain text precedes it.
    fn start(&self, src: &str) -> Option<usize>;

    /// Match at the very beginning of `src`.
    fn tokenize(&self, src: &str) -> Option<ExtensionMatch>;

    fn render(&self, token: &ExtensionToken, typesetter: &dyn MathTypesetter) -> String;
}

fn capture_trimmed(re: &Regex, src: &str) -> Option<ExtensionMatch> {
    let caps = re.captures(src)?;
    let whole = caps.get(0)?;
    let expr = caps.get(1)?.as_str().trim();
    if expr.is_empty() {
        return None;
    }
    Some(ExtensionMatch {
        len: whole.end(),
        expr: expr.to_string(),
    })
}

fn wrap_math(typeset: String, display_mode: bool) -> String {
    let class = if display_mode {
        "math math-display"
    } else {
        "math math-inline"
    };
    format!(r#"<span class="{class}">{typeset}</span>"#)
}

/// `$$…$$` and `\[…\]`, rendered in display mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockMath;

impl GrammarExtension for BlockMath {
    fn name(&self) -> &'static str {
        "block_math"
    }

    fn level(&self) -> ExtensionLevel {
        ExtensionLevel::Block
    }

    fn start(&self, src: &str) -> Option<usize> {
        [src.find("$$"), src.find("\\[")].into_iter().flatten().min()
    }

    fn tokenize(&self, src: &str) -> Option<ExtensionMatch> {
        capture_trimmed(&BLOCK_DOLLAR_RE, src).or_else(|| capture_trimmed(&BLOCK_BRACKET_RE, src))
    }

    fn render(&self, token: &ExtensionToken, typesetter: &dyn MathTypesetter) -> String {
        wrap_math(typesetter.typeset(&token.expr, true), true)
    }
}

/// `$…$` and `\(…\)`, rendered inline. Never crosses a blank line.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineMath;

impl GrammarExtension for InlineMath {
    fn name(&self) -> &'static str {
        "inline_math"
    }

    fn level(&self) -> ExtensionLevel {
        ExtensionLevel::Inline
    }

    fn start(&self, src: &str) -> Option<usize> {
        [src.find('$'), src.find("\\(")].into_iter().flatten().min()
    }

    fn tokenize(&self, src: &str) -> Option<ExtensionMatch> {
        let found = capture_trimmed(&INLINE_DOLLAR_RE, src)
            .or_else(|| capture_trimmed(&INLINE_PAREN_RE, src))?;
        let blank_line = src[..found.len]
            .split('\n')
            .skip(1)
            .any(|line| line.trim().is_empty());
        (!blank_line).then_some(found)
    }

    fn render(&self, token: &ExtensionToken, typesetter: &dyn MathTypesetter) -> String {
        wrap_math(typesetter.typeset(&token.expr, false), false)
    }
}

/// The registered math extensions, in priority order.
pub struct MathExtensionSet {
    extensions: Vec<Box<dyn GrammarExtension>>,
}

impl Default for MathExtensionSet {
    fn default() -> Self {
        Self::new(vec![Box::new(BlockMath), Box::new(InlineMath)])
    }
}

impl std::fmt::Debug for MathExtensionSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl MathExtensionSet {
    pub fn new(mut extensions: Vec<Box<dyn GrammarExtension>>) -> Self {
        extensions.sort_by_key(|e| e.level());
        Self { extensions }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.extensions.iter().map(|e| e.name())
    }

    /// Render a token through the extension that produced it.
    pub fn render(&self, token: &ExtensionToken, typesetter: &dyn MathTypesetter) -> String {
        match self.extensions.get(token.extension) {
            Some(extension) => extension.render(token, typesetter),
            None => {
                let mut out = String::with_capacity(token.raw.len());
                // Writing into a String cannot fail.
                let _ = escape_html_body_text(FmtWriter(&mut out), &token.raw);
                out
            }
        }
    }

    /// Swap every math span outside code for a placeholder.
    #[tracing::instrument(level = "trace", skip_all, fields(len = src.len()))]
    pub fn prepare(&self, src: &str) -> PreparedSource {
        let src = scrub_sentinels(src);
        let protected = code_ranges(&src);
        let mut text = String::with_capacity(src.len());
        let mut tokens = Vec::new();
        let mut copied = 0;
        let mut pos = 0;

        'scan: while pos < src.len() {
            let Some(at) = self
                .extensions
                .iter()
                .filter_map(|e| e.start(&src[pos..]))
                .min()
                .map(|offset| pos + offset)
            else {
                break;
            };
            if let Some(range) = protected.iter().find(|r| r.contains(&at)) {
                pos = range.end;
                continue;
            }
            if is_escaped(&src, at) {
                pos = at + 1;
                continue;
            }
            for (index, extension) in self.extensions.iter().enumerate() {
                let Some(found) = extension.tokenize(&src[at..]) else {
                    continue;
                };
                let end = at + found.len;
                if protected.iter().any(|r| r.start < end && at < r.end) {
                    continue;
                }
                text.push_str(&src[copied..at]);
                push_placeholder(&mut text, tokens.len());
                tokens.push(ExtensionToken {
                    extension: index,
                    expr: found.expr,
                    display_mode: extension.level() == ExtensionLevel::Block,
                    raw: src[at..end].to_string(),
                });
                copied = end;
                pos = end;
                continue 'scan;
            }
            pos = at + 1;
        }

        text.push_str(&src[copied..]);
        PreparedSource { text, tokens }
    }
}

fn push_placeholder(out: &mut String, index: usize) {
    out.push(OPEN);
    out.push_str(&index.to_string());
    out.push(CLOSE);
}

/// Replace stray placeholder delimiters in author text.
fn scrub_sentinels(src: &str) -> Cow<'_, str> {
    if src.contains([OPEN, CLOSE]) {
        Cow::Owned(src.replace([OPEN, CLOSE], "\u{FFFD}"))
    } else {
        Cow::Borrowed(src)
    }
}

fn is_escaped(src: &str, at: usize) -> bool {
    let backslashes = src.as_bytes()[..at]
        .iter()
        .rev()
        .take_while(|b| **b == b'\\')
        .count();
    backslashes % 2 == 1
}

/// Byte ranges of code blocks and code spans.
fn code_ranges(src: &str) -> Vec<Range<usize>> {
    let mut ranges: Vec<Range<usize>> = Parser::new_ext(src, Options::empty())
        .into_offset_iter()
        .filter_map(|(event, range)| match event {
            Event::Start(Tag::CodeBlock(_)) | Event::Code(_) => Some(range),
            _ => None,
        })
        .collect();
    ranges.sort_by_key(|r| r.start);
    ranges
}

/// Source text with math spans replaced by placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedSource {
    text: String,
    tokens: Vec<ExtensionToken>,
}

/// A piece of text that may hold placeholders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Text(&'a str),
    Math(&'a ExtensionToken),
}

impl PreparedSource {
    /// Source as-is, for when math is disabled.
    pub fn plain(src: &str) -> Self {
        Self {
            text: src.to_string(),
            tokens: Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn tokens(&self) -> &[ExtensionToken] {
        &self.tokens
    }

    fn parse_placeholder<'t>(&self, rest: &'t str) -> Option<(&ExtensionToken, usize)> {
        let body = rest.strip_prefix(OPEN)?;
        let close = body.find(CLOSE)?;
        let index: usize = body[..close].parse().ok()?;
        let token = self.tokens.get(index)?;
        Some((token, OPEN.len_utf8() + close + CLOSE.len_utf8()))
    }

    /// Split `text` into plain runs and math tokens.
    pub fn segments<'a>(&'a self, text: &'a str) -> impl Iterator<Item = Segment<'a>> + 'a {
        let mut rest = text;
        std::iter::from_fn(move || {
            if rest.is_empty() {
                return None;
            }
            if let Some((token, len)) = self.parse_placeholder(rest) {
                rest = &rest[len..];
                return Some(Segment::Math(token));
            }
            // skip a leading sentinel that is not a placeholder
            let skip = if rest.starts_with(OPEN) { OPEN.len_utf8() } else { 0 };
            let end = rest[skip..].find(OPEN).map_or(rest.len(), |i| i + skip);
            let (head, tail) = rest.split_at(end);
            rest = tail;
            Some(Segment::Text(head))
        })
    }

    /// Put original source back in place of every placeholder.
    pub fn restore<'t>(&self, text: &'t str) -> Cow<'t, str> {
        if self.tokens.is_empty() || !text.contains(OPEN) {
            return Cow::Borrowed(text);
        }
        let mut out = String::with_capacity(text.len());
        for segment in self.segments(text) {
            match segment {
                Segment::Text(t) => out.push_str(t),
                Segment::Math(token) => out.push_str(&token.raw),
            }
        }
        Cow::Owned(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exprs(prepared: &PreparedSource) -> Vec<(&str, bool)> {
        prepared
            .tokens()
            .iter()
            .map(|t| (t.expr.as_str(), t.display_mode))
            .collect()
    }

    #[test]
    fn block_delimiters_are_display_mode() {
        let set = MathExtensionSet::default();
        let prepared = set.prepare("before $$ x^2 $$ and \\[\n\\frac{a}{b}\n\\] after");
        assert_eq!(exprs(&prepared), vec![("x^2", true), ("\\frac{a}{b}", true)]);
        assert_eq!(prepared.text(), "before \u{E000}0\u{E001} and \u{E000}1\u{E001} after");
    }

    #[test]
    fn inline_delimiters() {
        let set = MathExtensionSet::default();
        let prepared = set.prepare("let $a+b$ and \\( c \\) be");
        assert_eq!(exprs(&prepared), vec![("a+b", false), ("c", false)]);
    }

    #[test]
    fn closing_is_non_greedy() {
        let set = MathExtensionSet::default();
        let prepared = set.prepare("$$a$$ text $$b$$");
        assert_eq!(exprs(&prepared), vec![("a", true), ("b", true)]);
    }

    #[test]
    fn inline_math_stops_at_blank_line() {
        let set = MathExtensionSet::default();
        let prepared = set.prepare("costs $5\n\nand $");
        assert!(prepared.tokens().is_empty());
        assert_eq!(prepared.text(), "costs $5\n\nand $");
    }

    #[test]
    fn skips_code_and_escapes() {
        let set = MathExtensionSet::default();
        let src = "`$a$` and \\$b$ and\n\n```\n$$c$$\n```\n";
        let prepared = set.prepare(src);
        assert!(prepared.tokens().is_empty(), "{:?}", prepared.tokens());
        assert_eq!(prepared.text(), src);
    }

    #[test]
    fn unclosed_delimiters_stay_text() {
        let set = MathExtensionSet::default();
        let prepared = set.prepare("streaming $$x^");
        assert!(prepared.tokens().is_empty());
    }

    #[test]
    fn segments_and_restore() {
        let set = MathExtensionSet::default();
        let prepared = set.prepare("a $x$ b \\(y\\)");
        let text = prepared.text().to_string();
        let segments: Vec<_> = prepared.segments(&text).collect();
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0], Segment::Text("a "));
        assert!(matches!(segments[1], Segment::Math(t) if t.expr == "x"));
        assert_eq!(prepared.restore(&text), "a $x$ b \\(y\\)");
    }

    #[test]
    fn author_sentinels_are_scrubbed() {
        let set = MathExtensionSet::default();
        let prepared = set.prepare("\u{E000}0\u{E001} $x$");
        assert_eq!(prepared.tokens().len(), 1);
        assert!(prepared.text().starts_with("\u{FFFD}0\u{FFFD} "));
    }

    #[test]
    fn unknown_extension_renders_escaped_source() {
        let set = MathExtensionSet::default();
        let token = ExtensionToken {
            extension: 7,
            expr: "<x>".into(),
            display_mode: false,
            raw: "$<x>$".into(),
        };
        assert_eq!(set.render(&token, &crate::math::LatexTypesetter), "$&lt;x&gt;$");
    }

    #[test]
    fn renders_through_owning_extension() {
        struct Echo;
        impl MathTypesetter for Echo {
            fn typeset(&self, expr: &str, display_mode: bool) -> String {
                format!("{expr}:{display_mode}")
            }
        }
        let set = MathExtensionSet::default();
        let prepared = set.prepare("$$x$$ $y$");
        let html: Vec<_> = prepared
            .tokens()
            .iter()
            .map(|t| set.render(t, &Echo))
            .collect();
        assert_eq!(
            html,
            vec![
                r#"<span class="math math-display">x:true</span>"#,
                r#"<span class="math math-inline">y:false</span>"#,
            ]
        );
    }
}
