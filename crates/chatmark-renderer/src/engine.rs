//! Markdown to [`Token`]s for one block.

use std::collections::HashMap;
use std::sync::Arc;

use bitflags::bitflags;
use chatmark_common::perf;
use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, utils::TextMergeStream};
use pulldown_cmark_escape::FmtWriter;
use smol_str::SmolStr;

use crate::base_html::HtmlWriter;
use crate::blocks::{BlockSplitter, ParagraphSplitter};
use crate::error::RenderError;
use crate::extension::{MathExtensionSet, PreparedSource};
use crate::fence::is_fence_closed;
use crate::highlight::{SyntaxHighlighter, highlight_with_fallback};
use crate::math::{LatexTypesetter, MathTypesetter};
use crate::normalize::{MarkdownNormalizer, StreamingNormalizer};
use crate::types::{Source, Token};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct RenderOptions: u32 {
        /// Tables, strikethrough, task lists, footnotes and alerts.
        const GFM = 1 << 0;
        /// A single newline is a line break.
        const BREAKS = 1 << 1;
        const MATH = 1 << 2;
        const CITATIONS = 1 << 3;
        /// Sanitized `<video>`/`<audio>` from raw HTML; otherwise all raw HTML is escaped.
        const MEDIA_EMBEDS = 1 << 4;
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::all()
    }
}

impl RenderOptions {
    pub(crate) fn parser_options(self) -> Options {
        let mut options = Options::empty();
        if self.contains(Self::GFM) {
            options.insert(Options::ENABLE_TABLES);
            options.insert(Options::ENABLE_STRIKETHROUGH);
            options.insert(Options::ENABLE_TASKLISTS);
            options.insert(Options::ENABLE_FOOTNOTES);
            options.insert(Options::ENABLE_GFM);
        }
        options
    }
}

#[cfg(feature = "syntax-highlighting")]
fn default_highlighter() -> Arc<dyn SyntaxHighlighter> {
    Arc::new(crate::code_pretty::SyntectHighlighter)
}

#[cfg(not(feature = "syntax-highlighting"))]
fn default_highlighter() -> Arc<dyn SyntaxHighlighter> {
    Arc::new(crate::highlight::PlainHighlighter)
}

/// Options plus the collaborators a render needs. Cheap to clone.
#[derive(Clone)]
pub struct RenderContext {
    pub options: RenderOptions,
    pub typesetter: Arc<dyn MathTypesetter>,
    pub highlighter: Arc<dyn SyntaxHighlighter>,
    pub normalizer: Arc<dyn MarkdownNormalizer>,
    pub splitter: Arc<dyn BlockSplitter>,
    pub extensions: Arc<MathExtensionSet>,
}

impl Default for RenderContext {
    fn default() -> Self {
        Self {
            options: RenderOptions::default(),
            typesetter: Arc::new(LatexTypesetter),
            highlighter: default_highlighter(),
            normalizer: Arc::new(StreamingNormalizer),
            splitter: Arc::new(ParagraphSplitter),
            extensions: Arc::new(MathExtensionSet::default()),
        }
    }
}

impl std::fmt::Debug for RenderContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderContext")
            .field("options", &self.options)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

impl RenderContext {
    pub fn new(options: RenderOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    pub fn with_typesetter(mut self, typesetter: impl MathTypesetter + 'static) -> Self {
        self.typesetter = Arc::new(typesetter);
        self
    }

    pub fn with_highlighter(mut self, highlighter: impl SyntaxHighlighter + 'static) -> Self {
        self.highlighter = Arc::new(highlighter);
        self
    }

    pub fn with_normalizer(mut self, normalizer: impl MarkdownNormalizer + 'static) -> Self {
        self.normalizer = Arc::new(normalizer);
        self
    }

    pub fn with_splitter(mut self, splitter: impl BlockSplitter + 'static) -> Self {
        self.splitter = Arc::new(splitter);
        self
    }

    pub fn with_extensions(mut self, extensions: MathExtensionSet) -> Self {
        self.extensions = Arc::new(extensions);
        self
    }
}

/// State shared by every node of one render call.
pub(crate) struct Scope<'r> {
    pub(crate) options: RenderOptions,
    pub(crate) ctx: &'r RenderContext,
    pub(crate) sources: &'r [Source],
    pub(crate) prepared: &'r PreparedSource,
    /// Footnote name to display number, in order of first appearance.
    pub(crate) footnotes: HashMap<String, usize>,
}

/// A top-level markdown node.
enum Node<'a> {
    Code {
        language: Option<SmolStr>,
        code: String,
        raw: &'a str,
    },
    Markup(Vec<Event<'a>>),
}

/// Renders markdown for one citation source list.
#[derive(Debug, Clone, Copy)]
pub struct RenderEngine<'a> {
    ctx: &'a RenderContext,
    sources: &'a [Source],
}

impl<'a> RenderEngine<'a> {
    pub fn new(ctx: &'a RenderContext, sources: &'a [Source]) -> Self {
        Self { ctx, sources }
    }

    /// Recognise math ahead of parsing, if enabled.
    pub fn prepare(&self, markdown: &str) -> PreparedSource {
        if self.ctx.options.contains(RenderOptions::MATH) {
            self.ctx.extensions.prepare(markdown)
        } else {
            PreparedSource::plain(markdown)
        }
    }

    /// Render synchronously; output order is source order.
    #[tracing::instrument(level = "debug", skip_all, fields(len = markdown.len()))]
    pub fn render(&self, markdown: &str) -> Result<Vec<Token>, RenderError> {
        let _timer = perf::TimingGuard::new("render block");
        let prepared = perf::measure("prepare math", || self.prepare(markdown));
        let (nodes, footnotes) = self.lex(&prepared);
        let scope = self.scope(&prepared, footnotes);
        nodes
            .into_iter()
            .map(|node| self.render_node(node, &scope))
            .collect()
    }

    /// Render with one future per top-level node, awaited together.
    /// Produces the same tokens as [`RenderEngine::render`].
    #[tracing::instrument(level = "debug", skip_all, fields(len = markdown.len()))]
    pub async fn render_async(&self, markdown: &str) -> Result<Vec<Token>, RenderError> {
        let _timer = perf::TimingGuard::new("render block async");
        let prepared = perf::measure("prepare math", || self.prepare(markdown));
        let (nodes, footnotes) = self.lex(&prepared);
        let scope = self.scope(&prepared, footnotes);
        let scope = &scope;
        let pending = nodes
            .into_iter()
            .map(|node| async move { self.render_node(node, scope) });
        n0_future::join_all(pending).await.into_iter().collect()
    }

    fn scope<'s>(
        &'s self,
        prepared: &'s PreparedSource,
        footnotes: HashMap<String, usize>,
    ) -> Scope<'s> {
        Scope {
            options: self.ctx.options,
            ctx: self.ctx,
            sources: self.sources,
            prepared,
            footnotes,
        }
    }

    /// Split the parse into top-level nodes.
    fn lex<'p>(&self, prepared: &'p PreparedSource) -> (Vec<Node<'p>>, HashMap<String, usize>) {
        let text = prepared.text();
        let parser = Parser::new_ext(text, self.ctx.options.parser_options()).into_offset_iter();

        let mut nodes = Vec::new();
        let mut footnotes: HashMap<String, usize> = HashMap::new();
        let mut current: Option<Node<'p>> = None;
        let mut depth = 0usize;

        for (event, range) in parser {
            if let Event::FootnoteReference(name) | Event::Start(Tag::FootnoteDefinition(name)) =
                &event
            {
                let next = footnotes.len() + 1;
                footnotes.entry(name.to_string()).or_insert(next);
            }

            if depth == 0 {
                match event {
                    Event::Start(Tag::CodeBlock(kind)) => {
                        let language = match kind {
                            CodeBlockKind::Fenced(info) => {
                                info.split_whitespace().next().map(SmolStr::new)
                            }
                            CodeBlockKind::Indented => None,
                        };
                        current = Some(Node::Code {
                            language,
                            code: String::new(),
                            raw: &text[range],
                        });
                        depth = 1;
                    }
                    Event::Start(tag) => {
                        current = Some(Node::Markup(vec![Event::Start(tag)]));
                        depth = 1;
                    }
                    other => nodes.push(Node::Markup(vec![other])),
                }
                continue;
            }

            match &event {
                Event::Start(_) => depth += 1,
                Event::End(_) => depth -= 1,
                _ => {}
            }
            match current.as_mut() {
                Some(Node::Code { code, .. }) => {
                    if let Event::Text(body) = &event {
                        code.push_str(body);
                    }
                }
                Some(Node::Markup(events)) => events.push(event),
                None => {}
            }
            if depth == 0 {
                nodes.extend(current.take());
            }
        }
        nodes.extend(current.take());
        (nodes, footnotes)
    }

    fn render_node(&self, node: Node<'_>, scope: &Scope<'_>) -> Result<Token, RenderError> {
        match node {
            Node::Code {
                language,
                code,
                raw,
            } => {
                let code = scope.prepared.restore(&code).into_owned();
                let raw_source = scope.prepared.restore(raw).into_owned();
                let highlighted_html = highlight_with_fallback(
                    self.ctx.highlighter.as_ref(),
                    &code,
                    language.as_deref(),
                )?;
                Ok(Token::Code {
                    is_closed: is_fence_closed(&raw_source),
                    language,
                    highlighted_html,
                    code,
                    raw_source,
                })
            }
            Node::Markup(events) => {
                let mut html = String::new();
                HtmlWriter::new(
                    TextMergeStream::new(events.into_iter()),
                    FmtWriter(&mut html),
                    scope,
                )
                .run()?;
                Ok(Token::Text { html })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::highlight::PlainHighlighter;

    fn ctx() -> RenderContext {
        RenderContext::default().with_highlighter(PlainHighlighter)
    }

    fn render(markdown: &str, sources: &[Source]) -> Vec<Token> {
        let ctx = ctx();
        RenderEngine::new(&ctx, sources).render(markdown).unwrap()
    }

    fn html(markdown: &str) -> String {
        render(markdown, &[])
            .iter()
            .map(|t| t.html().to_string())
            .collect()
    }

    #[test]
    fn splits_code_from_markup() {
        let tokens = render("intro\n\n```rust\nfn main() {}\n```\n\noutro", &[]);
        assert_eq!(tokens.len(), 3);
        assert!(!tokens[0].is_code());
        let Token::Code {
            language,
            code,
            raw_source,
            is_closed,
            ..
        } = &tokens[1]
        else {
            panic!("expected code token");
        };
        assert_eq!(language.as_deref(), Some("rust"));
        assert_eq!(code, "fn main() {}\n");
        assert!(raw_source.starts_with("```rust\n"));
        assert!(is_closed);
        assert_eq!(tokens[2].html(), "<p>outro</p>\n");
    }

    #[test]
    fn unclosed_fence_is_reported() {
        let tokens = render("```python\nprint(1)", &[]);
        assert!(matches!(
            &tokens[..],
            [Token::Code { is_closed: false, code, .. }] if code.trim_end() == "print(1)"
        ));
    }

    #[test]
    fn soft_breaks_become_line_breaks() {
        assert_eq!(html("one\ntwo"), "<p>one<br />\ntwo</p>\n");
        let ctx = RenderContext::new(RenderOptions::all() - RenderOptions::BREAKS);
        let tokens = RenderEngine::new(&ctx, &[]).render("one\ntwo").unwrap();
        assert_eq!(tokens[0].html(), "<p>one\ntwo</p>\n");
    }

    #[test]
    fn unsafe_links_become_text() {
        assert_eq!(
            html("[click](javascript:alert(1))"),
            "<p><span>click</span></p>\n"
        );
        assert_eq!(
            html("[docs](https://docs.rs \"Docs\")"),
            "<p><a href=\"https://docs.rs\" title=\"Docs\">docs</a></p>\n"
        );
        assert_eq!(
            html("<me@example.com>"),
            "<p><a href=\"mailto:me@example.com\">me@example.com</a></p>\n"
        );
    }

    #[test]
    fn images_by_extension() {
        assert_eq!(
            html("![a clip](clip.mp4)"),
            "<p><video controls><source src=\"clip.mp4\"></video></p>\n"
        );
        assert_eq!(
            html("![](song.mp3)"),
            "<p><audio controls><source src=\"song.mp3\"></audio></p>\n"
        );
        assert_eq!(
            html("![a <cat>](cat.png \"Cat\")"),
            "<p><img src=\"cat.png\" alt=\"a &lt;cat&gt;\" title=\"Cat\" /></p>\n"
        );
        assert_eq!(
            html("![x](javascript:alert(1))"),
            "<p><span>x</span></p>\n"
        );
    }

    #[test]
    fn raw_html_is_sanitized_or_escaped() {
        assert_eq!(
            html("<script>alert(1)</script>"),
            "&lt;script&gt;alert(1)&lt;/script&gt;\n"
        );
        let out = html("<video src=\"javascript:alert(1)\"><source src=\"evil.mp4\"></video>");
        assert_eq!(out, "<p><video><source src=\"evil.mp4\"></video></p>\n");
    }

    #[test]
    fn math_renders_and_code_keeps_source() {
        let out = html("area $\\pi r^2$ and `$x$`");
        assert!(out.contains("<span class=\"math math-inline\"><math"));
        assert!(out.contains("<code>$x$</code>"));
        let tokens = render("```\n$$x$$\n```", &[]);
        assert!(matches!(&tokens[0], Token::Code { code, .. } if code == "$$x$$\n"));
    }

    #[test]
    fn math_inside_link_target_is_restored() {
        let out = html("[a $b$ c](https://x.test/$1$)");
        assert!(out.contains("href=\"https://x.test/$1$\""));
    }

    #[test]
    fn citations_in_text_but_not_in_code() {
        let sources = [Source::new("https://example.com")];
        let tokens = render("see [1] and `[1]`", &sources);
        let out = tokens[0].html();
        assert_eq!(out.matches("<sup class=\"citation\">").count(), 1);
        assert!(out.contains("<code>[1]</code>"));
    }

    #[test]
    fn footnotes_number_across_nodes() {
        let out = html("a[^x] b[^y]\n\n[^y]: why\n\n[^x]: ex");
        assert!(out.contains("<a href=\"#x\">1</a>"));
        assert!(out.contains("<a href=\"#y\">2</a>"));
        assert!(out.contains("id=\"y\"><sup class=\"footnote-definition-label\">2</sup>"));
    }

    #[test]
    fn nested_code_is_highlighted_in_place() {
        let out = html("- item\n\n  ```rust\n  let x = 1;\n  ```");
        assert!(out.contains("<pre><code class=\"language-rust\">let x = 1;\n</code></pre>"));
    }

    #[tokio::test]
    async fn async_matches_sync() {
        let ctx = ctx();
        let sources = [Source::new("https://example.com")];
        let engine = RenderEngine::new(&ctx, &sources);
        let markdown = "# Title\n\nSee [1]. $$x^2$$\n\n```js\nlet a;\n```\n\n> quote\n\n| a | b |\n|---|---|\n| 1 | 2 |";
        let sync = engine.render(markdown).unwrap();
        let async_ = engine.render_async(markdown).await.unwrap();
        assert_eq!(sync, async_);
        assert_eq!(sync.len(), 5);
    }
}
