//! Citation markers: `[n]` (or `[n, m, ...]`) pointing into an ordered source list.

use std::borrow::Cow;
use std::sync::LazyLock;

use pulldown_cmark_escape::{FmtWriter, StrWrite, escape_href, escape_html, escape_html_body_text};

use crate::href::sanitize_href;
use crate::re::{Captures, Regex};
use crate::types::Source;

/// Inline style applied to every citation anchor.
pub const CITATION_STYLE: &str = "text-decoration: none; font-size: 0.8em; padding: 0 0.1em;";

static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([0-9]+(?:\s*,\s*[0-9]+)*)\]").unwrap());

struct Resolved<'s> {
    number: usize,
    link: &'s str,
    title: &'s str,
}

/// Resolve every index of one marker, or none of them.
fn resolve<'s>(indices: &str, sources: &'s [Source]) -> Option<Vec<Resolved<'s>>> {
    indices
        .split(',')
        .map(|index| {
            let number: usize = index.trim().parse().ok()?;
            let source = sources.get(number.checked_sub(1)?)?;
            let link = sanitize_href(&source.link)?;
            Some(Resolved {
                number,
                link,
                title: source.title.as_deref().unwrap_or(link),
            })
        })
        .collect()
}

/// Attribute text with brackets turned into entities, so rendered output
/// never contains something the marker pattern would match again.
fn write_attr<W: StrWrite>(w: &mut W, value: &str, href: bool) -> Result<(), W::Error> {
    let mut rest = value;
    while let Some(at) = rest.find(['[', ']']) {
        let (head, tail) = rest.split_at(at);
        if href {
            escape_href(&mut *w, head)?;
        } else {
            escape_html(&mut *w, head)?;
        }
        match (tail.as_bytes()[0], href) {
            (b'[', true) => w.write_str("%5B")?,
            (b'[', false) => w.write_str("&#91;")?,
            (_, true) => w.write_str("%5D")?,
            (_, false) => w.write_str("&#93;")?,
        }
        rest = &tail[1..];
    }
    if href {
        escape_href(&mut *w, rest)
    } else {
        escape_html(&mut *w, rest)
    }
}

fn write_citation<W: StrWrite>(w: &mut W, resolved: &[Resolved<'_>]) -> Result<(), W::Error> {
    w.write_str("<sup class=\"citation\">")?;
    for (i, citation) in resolved.iter().enumerate() {
        if i > 0 {
            w.write_str(",")?;
        }
        w.write_str("<a href=\"")?;
        write_attr(w, citation.link, true)?;
        w.write_str("\" target=\"_blank\" rel=\"noreferrer\" style=\"")?;
        w.write_str(CITATION_STYLE)?;
        w.write_str("\" title=\"")?;
        write_attr(w, citation.title, false)?;
        write!(w, "\">{}</a>", citation.number)?;
    }
    w.write_str("</sup>")
}

/// Rewrite citation markers in already-rendered HTML.
///
/// A marker is replaced only when every index in it resolves to a source
/// with a safe link; otherwise it is left exactly as written. Input without
/// any resolvable marker is returned borrowed.
pub fn rewrite<'a>(html: &'a str, sources: &[Source]) -> Cow<'a, str> {
    if sources.is_empty() {
        return Cow::Borrowed(html);
    }
    let mut changed = false;
    let out = CITATION_RE.replace_all(html, |caps: &Captures<'_>| {
        let Some(resolved) = resolve(&caps[1], sources) else {
            return caps[0].to_string();
        };
        let mut buf = String::new();
        // Writing into a String cannot fail.
        let _ = write_citation(&mut FmtWriter(&mut buf), &resolved);
        changed = true;
        buf
    });
    if changed { out } else { Cow::Borrowed(html) }
}

/// Escape a run of body text, turning resolvable markers into citation links.
pub(crate) fn write_cited_text<W: StrWrite>(
    w: &mut W,
    text: &str,
    sources: &[Source],
) -> Result<(), W::Error> {
    if sources.is_empty() {
        return escape_html_body_text(&mut *w, text);
    }
    let mut last = 0;
    for caps in CITATION_RE.captures_iter(text) {
        let Some(marker) = caps.get(0) else {
            continue;
        };
        let Some(resolved) = resolve(&caps[1], sources) else {
            continue;
        };
        escape_html_body_text(&mut *w, &text[last..marker.start()])?;
        write_citation(w, &resolved)?;
        last = marker.end();
    }
    escape_html_body_text(&mut *w, &text[last..])
}
