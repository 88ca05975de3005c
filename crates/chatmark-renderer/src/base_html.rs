//! Event-driven HTML writer for non-code nodes.
//!
//! Every link target and image source goes through [`sanitize_href`], raw
//! HTML goes through [`sanitize_media_html`], text goes through the math
//! placeholders and citation rewriting before escaping.

use std::iter::Peekable;

use pulldown_cmark::{
    Alignment, BlockQuoteKind, CodeBlockKind, CowStr, Event, Event::*, LinkType, Tag, TagEnd,
};
use pulldown_cmark_escape::{StrWrite, escape_href, escape_html, escape_html_body_text};

use crate::citation::write_cited_text;
use crate::engine::{RenderOptions, Scope};
use crate::error::RenderError;
use crate::extension::Segment;
use crate::highlight::highlight_with_fallback;
use crate::href::sanitize_href;
use crate::media::{closes_media_tag, opens_media_tag, sanitize_media_html};

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "ogv", "mov", "m4v"];
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "ogg", "m4a", "aac", "flac", "oga", "opus"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MediaKind {
    Video,
    Audio,
    Image,
}

/// Classify an image target by the extension of its path.
fn media_kind(src: &str) -> MediaKind {
    let path = src.split(['?', '#']).next().unwrap_or(src);
    let extension = path
        .rsplit_once('.')
        .filter(|(_, ext)| !ext.contains('/'))
        .map(|(_, ext)| ext.to_ascii_lowercase());
    match extension.as_deref() {
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext) => MediaKind::Video,
        Some(ext) if AUDIO_EXTENSIONS.contains(&ext) => MediaKind::Audio,
        _ => MediaKind::Image,
    }
}

enum TableState {
    Head,
    Body,
}

pub(crate) struct HtmlWriter<'a, 's, I, W>
where
    I: Iterator<Item = Event<'a>>,
{
    /// Iterator supplying events.
    iter: Peekable<I>,

    /// Writer to write to.
    writer: W,

    scope: &'s Scope<'s>,

    /// Whether or not the last write wrote a newline.
    end_newline: bool,

    /// Inside a metadata block, text is not written.
    in_non_writing_block: bool,

    /// Depth of open anchors; citations are not nested inside links.
    link_depth: usize,

    table_state: TableState,
    table_alignments: Vec<Alignment>,
    table_cell_index: usize,

    /// Raw HTML block collected until its end tag.
    html_block: Option<String>,

    /// Language and body of a code block nested in another node.
    code_block: Option<(Option<String>, String)>,
}

impl<'a, 's, I, W> HtmlWriter<'a, 's, I, W>
where
    I: Iterator<Item = Event<'a>>,
    W: StrWrite,
    RenderError: From<W::Error>,
{
    pub(crate) fn new(iter: I, writer: W, scope: &'s Scope<'s>) -> Self {
        Self {
            iter: iter.peekable(),
            writer,
            scope,
            end_newline: true,
            in_non_writing_block: false,
            link_depth: 0,
            table_state: TableState::Head,
            table_alignments: vec![],
            table_cell_index: 0,
            html_block: None,
            code_block: None,
        }
    }

    /// Writes a new line.
    #[inline]
    fn write_newline(&mut self) -> Result<(), RenderError> {
        self.end_newline = true;
        self.writer.write_str("\n")?;
        Ok(())
    }

    /// Writes a buffer, and tracks whether or not a newline was written.
    #[inline]
    fn write(&mut self, s: &str) -> Result<(), RenderError> {
        self.writer.write_str(s)?;

        if !s.is_empty() {
            self.end_newline = s.ends_with('\n');
        }
        Ok(())
    }

    /// Starts a block-level tag on a fresh line.
    fn write_block_open(&mut self, tag: &str) -> Result<(), RenderError> {
        if !self.end_newline {
            self.write_newline()?;
        }
        self.write(tag)
    }

    fn enabled(&self, flag: RenderOptions) -> bool {
        self.scope.options.contains(flag)
    }

    pub(crate) fn run(mut self) -> Result<(), RenderError> {
        while let Some(event) = self.iter.next() {
            match event {
                Start(tag) => self.start_tag(tag)?,
                End(tag) => self.end_tag(tag)?,
                Text(text) => {
                    if let Some((_, body)) = self.code_block.as_mut() {
                        body.push_str(&self.scope.prepared.restore(&text));
                    } else if !self.in_non_writing_block {
                        self.write_text(&text)?;
                    }
                }
                Code(text) => {
                    self.write("<code>")?;
                    escape_html_body_text(&mut self.writer, &self.scope.prepared.restore(&text))?;
                    self.write("</code>")?;
                }
                // Parser math is never enabled; keep the source visible.
                InlineMath(text) => {
                    self.write("$")?;
                    escape_html_body_text(&mut self.writer, &text)?;
                    self.write("$")?;
                }
                DisplayMath(text) => {
                    self.write("$$")?;
                    escape_html_body_text(&mut self.writer, &text)?;
                    self.write("$$")?;
                }
                Html(html) => match self.html_block.as_mut() {
                    Some(block) => block.push_str(&html),
                    None => self.write_raw_html(&html)?,
                },
                InlineHtml(html) => self.inline_html(html)?,
                SoftBreak => {
                    if self.enabled(RenderOptions::BREAKS) {
                        self.write("<br />\n")?;
                    } else {
                        self.write_newline()?;
                    }
                }
                HardBreak => {
                    self.write("<br />\n")?;
                }
                Rule => {
                    self.write_block_open("<hr />\n")?;
                }
                FootnoteReference(name) => {
                    self.write("<sup class=\"footnote-reference\"><a href=\"#")?;
                    escape_html(&mut self.writer, &name)?;
                    self.write("\">")?;
                    let number = self.footnote_number(&name);
                    write!(&mut self.writer, "{}", number)?;
                    self.write("</a></sup>")?;
                }
                TaskListMarker(true) => {
                    self.write("<input disabled=\"\" type=\"checkbox\" checked=\"\"/>\n")?;
                }
                TaskListMarker(false) => {
                    self.write("<input disabled=\"\" type=\"checkbox\"/>\n")?;
                }
            }
        }
        Ok(())
    }

    fn footnote_number(&self, name: &str) -> usize {
        self.scope.footnotes.get(name).copied().unwrap_or(0)
    }

    /// Escape text, rendering math placeholders and citation markers.
    fn write_text(&mut self, text: &str) -> Result<(), RenderError> {
        let scope = self.scope;
        let cite = self.enabled(RenderOptions::CITATIONS) && self.link_depth == 0;
        for segment in scope.prepared.segments(text) {
            match segment {
                Segment::Text(plain) if cite => {
                    write_cited_text(&mut self.writer, plain, scope.sources)?;
                }
                Segment::Text(plain) => escape_html_body_text(&mut self.writer, plain)?,
                Segment::Math(token) => {
                    let html = scope
                        .ctx
                        .extensions
                        .render(token, scope.ctx.typesetter.as_ref());
                    self.writer.write_str(&html)?;
                }
            }
        }
        if !text.is_empty() {
            self.end_newline = text.ends_with('\n');
        }
        Ok(())
    }

    fn write_raw_html(&mut self, raw: &str) -> Result<(), RenderError> {
        let raw = self.scope.prepared.restore(raw);
        if self.enabled(RenderOptions::MEDIA_EMBEDS) {
            let html = sanitize_media_html(&raw);
            self.write(&html)
        } else {
            escape_html_body_text(&mut self.writer, &raw)?;
            self.end_newline = raw.ends_with('\n');
            Ok(())
        }
    }

    /// Inline raw HTML arrives one tag per event; a media element is
    /// gathered up to its closing tag and judged as a whole.
    fn inline_html(&mut self, html: CowStr<'a>) -> Result<(), RenderError> {
        if !self.enabled(RenderOptions::MEDIA_EMBEDS)
            || !opens_media_tag(&html)
            || html.trim_end().ends_with("/>")
        {
            return self.write_raw_html(&html);
        }
        let mut raw = html.into_string();
        while matches!(self.iter.peek(), Some(InlineHtml(_) | Text(_) | SoftBreak)) {
            match self.iter.next() {
                Some(InlineHtml(next)) => {
                    raw.push_str(&next);
                    if closes_media_tag(&next) {
                        break;
                    }
                }
                Some(Text(text)) => raw.push_str(&text),
                Some(SoftBreak) => raw.push('\n'),
                _ => break,
            }
        }
        self.write_raw_html(&raw)
    }

    /// Writes the start of an HTML tag.
    fn start_tag(&mut self, tag: Tag<'a>) -> Result<(), RenderError> {
        match tag {
            Tag::HtmlBlock => {
                self.html_block = Some(String::new());
                Ok(())
            }
            Tag::Paragraph => self.write_block_open("<p>"),
            Tag::Heading { level, .. } => {
                if !self.end_newline {
                    self.write_newline()?;
                }
                write!(&mut self.writer, "<{}>", level)?;
                Ok(())
            }
            Tag::Table(alignments) => {
                self.table_alignments = alignments;
                self.write_block_open("<table>")
            }
            Tag::TableHead => {
                self.table_state = TableState::Head;
                self.table_cell_index = 0;
                self.write("<thead><tr>")
            }
            Tag::TableRow => {
                self.table_cell_index = 0;
                self.write("<tr>")
            }
            Tag::TableCell => {
                match self.table_state {
                    TableState::Head => self.write("<th")?,
                    TableState::Body => self.write("<td")?,
                }
                match self.table_alignments.get(self.table_cell_index) {
                    Some(&Alignment::Left) => self.write(" style=\"text-align: left\">"),
                    Some(&Alignment::Center) => self.write(" style=\"text-align: center\">"),
                    Some(&Alignment::Right) => self.write(" style=\"text-align: right\">"),
                    _ => self.write(">"),
                }
            }
            Tag::BlockQuote(kind) => {
                let class_str = match kind {
                    None => "",
                    Some(BlockQuoteKind::Note) => " class=\"markdown-alert-note\"",
                    Some(BlockQuoteKind::Tip) => " class=\"markdown-alert-tip\"",
                    Some(BlockQuoteKind::Important) => " class=\"markdown-alert-important\"",
                    Some(BlockQuoteKind::Warning) => " class=\"markdown-alert-warning\"",
                    Some(BlockQuoteKind::Caution) => " class=\"markdown-alert-caution\"",
                };
                self.write_block_open(&format!("<blockquote{}>\n", class_str))
            }
            Tag::CodeBlock(info) => {
                let lang = match info {
                    CodeBlockKind::Fenced(info) => info
                        .split_whitespace()
                        .next()
                        .map(str::to_string),
                    CodeBlockKind::Indented => None,
                };
                self.code_block = Some((lang, String::new()));
                Ok(())
            }
            Tag::List(Some(1)) => self.write_block_open("<ol>\n"),
            Tag::List(Some(start)) => {
                self.write_block_open("<ol start=\"")?;
                write!(&mut self.writer, "{}", start)?;
                self.write("\">\n")
            }
            Tag::List(None) => self.write_block_open("<ul>\n"),
            Tag::Item => self.write_block_open("<li>"),
            Tag::Emphasis => self.write("<em>"),
            Tag::Strong => self.write("<strong>"),
            Tag::Strikethrough => self.write("<del>"),
            Tag::Superscript => self.write("<sup>"),
            Tag::Subscript => self.write("<sub>"),
            Tag::Link {
                link_type,
                dest_url,
                title,
                id: _,
            } => self.start_link(link_type, &dest_url, &title),
            Tag::Image {
                link_type: _,
                dest_url,
                title,
                id: _,
            } => self.image(&dest_url, &title),
            Tag::FootnoteDefinition(name) => {
                self.write_block_open("<div class=\"footnote-definition\" id=\"")?;
                escape_html(&mut self.writer, &name)?;
                self.write("\"><sup class=\"footnote-definition-label\">")?;
                let number = self.footnote_number(&name);
                write!(&mut self.writer, "{}", number)?;
                self.write("</sup>")
            }
            Tag::MetadataBlock(_) => {
                self.in_non_writing_block = true;
                Ok(())
            }
            Tag::DefinitionList => self.write_block_open("<dl>\n"),
            Tag::DefinitionListTitle => self.write_block_open("<dt>"),
            Tag::DefinitionListDefinition => self.write_block_open("<dd>"),
        }
    }

    fn start_link(
        &mut self,
        link_type: LinkType,
        dest_url: &str,
        title: &str,
    ) -> Result<(), RenderError> {
        let dest = self.scope.prepared.restore(dest_url);
        let dest = match link_type {
            LinkType::Email => format!("mailto:{dest}"),
            _ => dest.into_owned(),
        };
        let Some(href) = sanitize_href(&dest) else {
            self.write("<span>")?;
            self.raw_text()?;
            return self.write("</span>");
        };
        self.write("<a href=\"")?;
        escape_href(&mut self.writer, href)?;
        if !title.is_empty() {
            self.write("\" title=\"")?;
            escape_html(&mut self.writer, &self.scope.prepared.restore(title))?;
        }
        self.link_depth += 1;
        self.write("\">")
    }

    fn image(&mut self, dest_url: &str, title: &str) -> Result<(), RenderError> {
        let dest = self.scope.prepared.restore(dest_url);
        let Some(src) = sanitize_href(&dest) else {
            self.write("<span>")?;
            self.raw_text()?;
            return self.write("</span>");
        };
        let tag = match media_kind(src) {
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Image => {
                self.write("<img src=\"")?;
                escape_href(&mut self.writer, src)?;
                self.write("\" alt=\"")?;
                self.raw_text()?;
                if !title.is_empty() {
                    self.write("\" title=\"")?;
                    escape_html(&mut self.writer, &self.scope.prepared.restore(title))?;
                }
                return self.write("\" />");
            }
        };
        self.skip_to_end();
        write!(&mut self.writer, "<{} controls><source src=\"", tag)?;
        escape_href(&mut self.writer, src)?;
        write!(&mut self.writer, "\"></{}>", tag)?;
        self.end_newline = false;
        Ok(())
    }

    fn end_tag(&mut self, tag: TagEnd) -> Result<(), RenderError> {
        match tag {
            TagEnd::HtmlBlock => {
                if let Some(block) = self.html_block.take() {
                    self.write_raw_html(block.trim_end())?;
                    self.write_newline()?;
                }
            }
            TagEnd::Paragraph => {
                self.write("</p>\n")?;
            }
            TagEnd::Heading(level) => {
                write!(&mut self.writer, "</{}>", level)?;
                self.write("\n")?;
            }
            TagEnd::Table => {
                self.write("</tbody></table>\n")?;
            }
            TagEnd::TableHead => {
                self.write("</tr></thead><tbody>\n")?;
                self.table_state = TableState::Body;
            }
            TagEnd::TableRow => {
                self.write("</tr>\n")?;
            }
            TagEnd::TableCell => {
                match self.table_state {
                    TableState::Head => self.write("</th>")?,
                    TableState::Body => self.write("</td>")?,
                }
                self.table_cell_index += 1;
            }
            TagEnd::BlockQuote(_) => {
                self.write("</blockquote>\n")?;
            }
            TagEnd::CodeBlock => {
                if let Some((lang, body)) = self.code_block.take() {
                    self.write_code_block(lang.as_deref(), &body)?;
                }
            }
            TagEnd::List(true) => {
                self.write("</ol>\n")?;
            }
            TagEnd::List(false) => {
                self.write("</ul>\n")?;
            }
            TagEnd::Item => {
                self.write("</li>\n")?;
            }
            TagEnd::Emphasis => {
                self.write("</em>")?;
            }
            TagEnd::Strong => {
                self.write("</strong>")?;
            }
            TagEnd::Strikethrough => {
                self.write("</del>")?;
            }
            TagEnd::Superscript => {
                self.write("</sup>")?;
            }
            TagEnd::Subscript => {
                self.write("</sub>")?;
            }
            TagEnd::Link => {
                self.link_depth = self.link_depth.saturating_sub(1);
                self.write("</a>")?;
            }
            TagEnd::Image => (), // consumed in start
            TagEnd::FootnoteDefinition => {
                self.write("</div>\n")?;
            }
            TagEnd::MetadataBlock(_) => {
                self.in_non_writing_block = false;
            }
            TagEnd::DefinitionList => {
                self.write("</dl>\n")?;
            }
            TagEnd::DefinitionListTitle => {
                self.write("</dt>\n")?;
            }
            TagEnd::DefinitionListDefinition => {
                self.write("</dd>\n")?;
            }
        }
        Ok(())
    }

    /// A code block nested inside another node (a list item, a quote).
    fn write_code_block(&mut self, lang: Option<&str>, body: &str) -> Result<(), RenderError> {
        let highlighted = highlight_with_fallback(self.scope.ctx.highlighter.as_ref(), body, lang)?;
        self.write_block_open("<pre><code")?;
        if let Some(lang) = lang {
            self.write(" class=\"language-")?;
            escape_html(&mut self.writer, lang)?;
            self.write("\"")?;
        }
        self.write(">")?;
        self.write(&highlighted)?;
        self.write("</code></pre>\n")
    }

    /// Discard events up to the end tag that matches an already consumed start.
    fn skip_to_end(&mut self) {
        let mut nest = 0usize;
        for event in self.iter.by_ref() {
            match event {
                Start(_) => nest += 1,
                End(_) if nest == 0 => break,
                End(_) => nest -= 1,
                _ => {}
            }
        }
    }

    // run raw text, consuming end tag
    fn raw_text(&mut self) -> Result<(), RenderError> {
        let mut nest = 0;
        while let Some(event) = self.iter.next() {
            match event {
                Start(_) => nest += 1,
                End(_) => {
                    if nest == 0 {
                        break;
                    }
                    nest -= 1;
                }
                Html(_) => {}
                InlineHtml(text) | Code(text) | Text(text) => {
                    // Escaped for attribute context, so not escape_html_body_text.
                    escape_html(&mut self.writer, &self.scope.prepared.restore(&text))?;
                    self.end_newline = text.ends_with('\n');
                }
                InlineMath(text) => {
                    self.write("$")?;
                    escape_html(&mut self.writer, &text)?;
                    self.write("$")?;
                }
                DisplayMath(text) => {
                    self.write("$$")?;
                    escape_html(&mut self.writer, &text)?;
                    self.write("$$")?;
                }
                SoftBreak | HardBreak | Rule => {
                    self.write(" ")?;
                }
                FootnoteReference(name) => {
                    let number = self.footnote_number(&name);
                    write!(&mut self.writer, "[{}]", number)?;
                }
                TaskListMarker(true) => self.write("[x]")?,
                TaskListMarker(false) => self.write("[ ]")?,
            }
        }
        Ok(())
    }
}
