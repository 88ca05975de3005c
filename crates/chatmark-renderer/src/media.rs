//! Allow-list sanitizer for raw `<video>` and `<audio>` HTML.
//!
//! Raw HTML from a message only reaches the output through here. The input is
//! read with a small tag tokenizer that understands exactly one shape:
//! a media element whose body holds `<source>` children. Anything else, and
//! anything ambiguous, is escaped and shown as text.

use std::fmt::Write as _;
use std::sync::LazyLock;

use pulldown_cmark_escape::{FmtWriter, escape_href, escape_html};

use crate::href::sanitize_href;
use crate::re::Regex;
use crate::style::filter_style;

const MEDIA_TAGS: &[&str] = &["video", "audio"];

const ALLOWED_ATTRIBUTES: &[&str] = &[
    "controls",
    "autoplay",
    "loop",
    "muted",
    "preload",
    "poster",
    "width",
    "height",
    "class",
    "id",
    "style",
    "playsinline",
];

static SOURCE_TYPE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(video|audio)/[\w+-]+$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
struct RawAttribute<'a> {
    name: &'a str,
    value: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct OpenTag<'a> {
    name: &'a str,
    attributes: Vec<RawAttribute<'a>>,
    self_closing: bool,
    /// Byte offset just past the closing `>`.
    end: usize,
}

/// Allow-listed media element, alive only while one raw HTML token is sanitized.
#[derive(Debug, Clone, PartialEq, Eq)]
struct MediaTag {
    name: &'static str,
    /// Name and already-escaped value.
    attributes: Vec<(String, Option<String>)>,
    sources: Vec<MediaSource>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct MediaSource {
    src: String,
    mime: Option<String>,
}

/// Sanitize a raw HTML fragment.
///
/// A `<video>`/`<audio>` element is re-emitted with allow-listed attributes
/// and its sanitized `<source>` children, always with an explicit closing
/// tag. Any other input is HTML-escaped verbatim.
pub fn sanitize_media_html(raw: &str) -> String {
    if let Some(media) = parse_media(raw.trim()) {
        let mut out = String::with_capacity(raw.len());
        if media.write_html(&mut out).is_ok() {
            return out;
        }
    }
    tracing::debug!(len = raw.len(), "escaping unrecognized raw html");
    let mut out = String::with_capacity(raw.len() + 16);
    // Writing into a String cannot fail.
    let _ = escape_html(FmtWriter(&mut out), raw);
    out
}

/// Whether a raw fragment opens a media element. Used to decide where an
/// inline HTML run starts.
pub(crate) fn opens_media_tag(raw: &str) -> bool {
    parse_open_tag(raw.trim_start())
        .is_some_and(|tag| media_tag_name(tag.name).is_some())
}

/// Whether a raw fragment is a `</video>` or `</audio>` closing tag.
pub(crate) fn closes_media_tag(raw: &str) -> bool {
    raw.trim()
        .strip_prefix("</")
        .and_then(|rest| rest.strip_suffix('>'))
        .and_then(|name| media_tag_name(name.trim_end()))
        .is_some()
}

fn media_tag_name(name: &str) -> Option<&'static str> {
    MEDIA_TAGS
        .iter()
        .copied()
        .find(|tag| tag.eq_ignore_ascii_case(name))
}

fn parse_media(src: &str) -> Option<MediaTag> {
    let open = parse_open_tag(src)?;
    let name = media_tag_name(open.name)?;
    let rest = &src[open.end..];

    let inner = if open.self_closing {
        if !rest.trim().is_empty() {
            return None;
        }
        ""
    } else if let Some(inner) = strip_closing_tag(rest, name) {
        inner
    } else if rest.trim().is_empty() {
        // void form, `<video controls>` on its own
        ""
    } else {
        return None;
    };

    if contains_media_markup(inner) {
        return None;
    }

    Some(MediaTag {
        name,
        attributes: filter_attributes(&open.attributes),
        sources: extract_sources(inner),
    })
}

impl MediaTag {
    fn write_html(&self, out: &mut String) -> std::fmt::Result {
        write!(out, "<{}", self.name)?;
        for (name, value) in &self.attributes {
            match value {
                Some(value) => write!(out, " {name}=\"{value}\"")?,
                None => write!(out, " {name}")?,
            }
        }
        out.push('>');
        for source in &self.sources {
            out.push_str("<source src=\"");
            escape_href(FmtWriter(&mut *out), &source.src)?;
            out.push('"');
            if let Some(mime) = &source.mime {
                out.push_str(" type=\"");
                escape_html(FmtWriter(&mut *out), mime)?;
                out.push('"');
            }
            out.push('>');
        }
        write!(out, "</{}>", self.name)
    }
}

fn filter_attributes(raw: &[RawAttribute<'_>]) -> Vec<(String, Option<String>)> {
    let mut kept: Vec<(String, Option<String>)> = Vec::new();
    for attribute in raw {
        let name = attribute.name.to_ascii_lowercase();
        if !ALLOWED_ATTRIBUTES.contains(&name.as_str()) {
            tracing::debug!(attribute = %name, "dropped media attribute");
            continue;
        }
        if kept.iter().any(|(seen, _)| *seen == name) {
            continue;
        }
        let value = match (name.as_str(), attribute.value) {
            ("poster", Some(value)) => match sanitize_href(value) {
                Some(href) => Some(escape_to_string(href, true)),
                None => continue,
            },
            ("poster", None) => continue,
            ("style", Some(value)) => match filter_style(value) {
                Some(style) => Some(escape_to_string(&style, false)),
                None => continue,
            },
            ("style", None) => continue,
            (_, Some(value)) => Some(escape_to_string(value, false)),
            (_, None) => None,
        };
        kept.push((name, value));
    }
    kept
}

fn escape_to_string(value: &str, href: bool) -> String {
    let mut out = String::with_capacity(value.len());
    // Writing into a String cannot fail.
    let _ = if href {
        escape_href(FmtWriter(&mut out), value)
    } else {
        escape_html(FmtWriter(&mut out), value)
    };
    out
}

fn extract_sources(inner: &str) -> Vec<MediaSource> {
    let bytes = inner.as_bytes();
    let mut sources = Vec::new();
    let mut pos = 0;
    while let Some(offset) = inner[pos..].find('<') {
        let at = pos + offset;
        let is_source = bytes
            .get(at + 1..at + 7)
            .is_some_and(|name| name.eq_ignore_ascii_case(b"source"))
            && bytes
                .get(at + 7)
                .is_none_or(|b| b.is_ascii_whitespace() || *b == b'/' || *b == b'>');
        if !is_source {
            pos = at + 1;
            continue;
        }
        let Some(tag) = parse_open_tag(&inner[at..]) else {
            pos = at + 1;
            continue;
        };
        pos = at + tag.end;
        if let Some(source) = build_source(&tag.attributes) {
            sources.push(source);
        }
    }
    sources
}

fn build_source(attributes: &[RawAttribute<'_>]) -> Option<MediaSource> {
    let find = |wanted: &str| {
        attributes
            .iter()
            .find(|attribute| attribute.name.eq_ignore_ascii_case(wanted))
            .and_then(|attribute| attribute.value)
    };
    let src = find("src").and_then(sanitize_href)?;
    let mime = find("type")
        .map(str::trim)
        .filter(|mime| SOURCE_TYPE_RE.is_match(mime))
        .map(str::to_string);
    Some(MediaSource {
        src: src.to_string(),
        mime,
    })
}

fn contains_media_markup(inner: &str) -> bool {
    let lowered = inner.to_ascii_lowercase();
    MEDIA_TAGS.iter().any(|tag| {
        lowered.contains(&format!("<{tag}")) || lowered.contains(&format!("</{tag}"))
    })
}

/// Split off a trailing `</name>` and return what precedes it.
fn strip_closing_tag<'a>(rest: &'a str, name: &str) -> Option<&'a str> {
    let trimmed = rest.trim_end();
    let body = trimmed.strip_suffix('>')?;
    let start = body.rfind("</")?;
    let closing = body[start + 2..].trim_end();
    closing
        .eq_ignore_ascii_case(name)
        .then(|| &rest[..start])
}

fn is_html_space(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0c')
}

fn is_name_byte(b: u8) -> bool {
    !is_html_space(b) && !matches!(b, b'/' | b'>' | b'=' | b'"' | b'\'' | b'<' | b'`')
}

/// Tokenize an opening tag at the start of `src`.
///
/// Grammar: `<name (attr | attr=value | attr="value" | attr='value')* /?>`.
/// Stray quotes, unterminated values and a missing `>` all yield `None`.
fn parse_open_tag(src: &str) -> Option<OpenTag<'_>> {
    let bytes = src.as_bytes();
    if bytes.first() != Some(&b'<') {
        return None;
    }
    let mut pos = 1;
    while pos < bytes.len() && bytes[pos].is_ascii_alphanumeric() {
        pos += 1;
    }
    if pos == 1 || !bytes[1].is_ascii_alphabetic() {
        return None;
    }
    let name = &src[1..pos];
    let mut attributes = Vec::new();

    loop {
        while pos < bytes.len() && is_html_space(bytes[pos]) {
            pos += 1;
        }
        match bytes.get(pos)? {
            b'>' => {
                return Some(OpenTag {
                    name,
                    attributes,
                    self_closing: false,
                    end: pos + 1,
                });
            }
            b'/' => {
                if bytes.get(pos + 1) == Some(&b'>') {
                    return Some(OpenTag {
                        name,
                        attributes,
                        self_closing: true,
                        end: pos + 2,
                    });
                }
                pos += 1;
                continue;
            }
            _ => {}
        }

        let name_start = pos;
        while pos < bytes.len() && is_name_byte(bytes[pos]) {
            pos += 1;
        }
        if pos == name_start {
            return None;
        }
        let attribute_name = &src[name_start..pos];

        let mut lookahead = pos;
        while lookahead < bytes.len() && is_html_space(bytes[lookahead]) {
            lookahead += 1;
        }
        if bytes.get(lookahead) != Some(&b'=') {
            attributes.push(RawAttribute {
                name: attribute_name,
                value: None,
            });
            continue;
        }
        pos = lookahead + 1;
        while pos < bytes.len() && is_html_space(bytes[pos]) {
            pos += 1;
        }
        let value = match bytes.get(pos)? {
            quote @ (b'"' | b'\'') => {
                let start = pos + 1;
                let len = src[start..].find(*quote as char)?;
                pos = start + len + 1;
                &src[start..start + len]
            }
            _ => {
                let start = pos;
                while pos < bytes.len() && !is_html_space(bytes[pos]) && bytes[pos] != b'>' {
                    if matches!(bytes[pos], b'"' | b'\'' | b'<' | b'=' | b'`') {
                        return None;
                    }
                    pos += 1;
                }
                if pos == start {
                    return None;
                }
                &src[start..pos]
            }
        };
        attributes.push(RawAttribute {
            name: attribute_name,
            value: Some(value),
        });
    }
}
