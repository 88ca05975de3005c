//! Repair of dangling inline markup in a partially streamed message.

use std::borrow::Cow;

use crate::fence::{Fence, closes_fence, fence_run};

/// Makes partial markdown safe to render. Pure text to text.
pub trait MarkdownNormalizer: Send + Sync {
    fn normalize<'a>(&self, text: &'a str) -> Cow<'a, str>;
}

/// Closes `**`, `__`, `~~` and inline code left open at the end of the
/// text. Code spans, math and indented code are skipped while scanning, and
/// an unclosed fenced code block is left alone so its open state stays
/// visible downstream.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamingNormalizer;

const MARKERS: &[&str] = &["**", "__", "~~"];

/// Opening and closing math delimiters, longest opener first.
const MATH_DELIMITERS: &[(&str, &str)] = &[("$$", "$$"), ("$", "$"), ("\\[", "\\]"), ("\\(", "\\)")];

/// Openers whose body may run onto later lines.
const DISPLAY_OPENERS: &[&str] = &["$$", "\\["];

#[derive(Default)]
struct InlineState {
    /// Backtick run length of an open code span.
    code_run: Option<usize>,
    /// Closer of display math still open from an earlier line.
    display_math: Option<&'static str>,
    /// Open emphasis markers, innermost last.
    open: Vec<&'static str>,
}

impl InlineState {
    fn reset(&mut self) {
        self.code_run = None;
        self.display_math = None;
        self.open.clear();
    }

    fn toggle(&mut self, marker: &'static str) {
        match self.open.iter().rposition(|m| *m == marker) {
            Some(at) => {
                self.open.remove(at);
            }
            None => self.open.push(marker),
        }
    }

    fn scan_line(&mut self, line: &str) {
        let bytes = line.as_bytes();
        let mut i = 0;
        if let Some(closer) = self.display_math {
            match line.find(closer) {
                Some(at) => {
                    self.display_math = None;
                    i = at + closer.len();
                }
                None => return,
            }
        }
        while i < bytes.len() {
            if bytes[i] == b'`' {
                let run = bytes[i..].iter().take_while(|b| **b == b'`').count();
                match self.code_run {
                    Some(open) if open == run => self.code_run = None,
                    Some(_) => {}
                    None => self.code_run = Some(run),
                }
                i += run;
                continue;
            }
            if self.code_run.is_some() {
                i += 1;
                continue;
            }
            if let Some((open, close)) = MATH_DELIMITERS
                .iter()
                .find(|(open, _)| bytes[i..].starts_with(open.as_bytes()))
            {
                // the opener is ASCII, so this is a char boundary
                let body = &line[i + open.len()..];
                match body.find(close) {
                    Some(at) => {
                        i += open.len() + at + close.len();
                        continue;
                    }
                    None if DISPLAY_OPENERS.contains(open) => {
                        self.display_math = Some(close);
                        return;
                    }
                    None => {}
                }
            }
            if bytes[i] == b'\\' {
                i += 2;
                continue;
            }
            match MARKERS.iter().find(|m| bytes[i..].starts_with(m.as_bytes())) {
                Some(marker) => {
                    self.toggle(*marker);
                    i += marker.len();
                }
                None => i += 1,
            }
        }
    }

    fn closers(&self) -> String {
        let mut closers = "`".repeat(self.code_run.unwrap_or(0));
        for marker in self.open.iter().rev() {
            closers.push_str(marker);
        }
        closers
    }
}

/// Leading indentation in columns, tabs to the next multiple of four.
fn indent_width(line: &str) -> usize {
    let mut width = 0;
    for b in line.bytes() {
        match b {
            b' ' => width += 1,
            b'\t' => width += 4 - width % 4,
            _ => break,
        }
    }
    width
}

impl MarkdownNormalizer for StreamingNormalizer {
    fn normalize<'a>(&self, text: &'a str) -> Cow<'a, str> {
        let mut fence: Option<Fence> = None;
        let mut state = InlineState::default();
        let mut in_paragraph = false;

        for line in text.split('\n') {
            if let Some(open) = fence {
                if closes_fence(line, open) {
                    fence = None;
                }
                continue;
            }
            if let Some(open) = fence_run(line) {
                fence = Some(open);
                state.reset();
                in_paragraph = false;
                continue;
            }
            if line.trim().is_empty() {
                state.reset();
                in_paragraph = false;
                continue;
            }
            // indented code cannot interrupt a paragraph
            if !in_paragraph && indent_width(line) >= 4 {
                continue;
            }
            in_paragraph = true;
            state.scan_line(line);
        }

        let closers = state.closers();
        if fence.is_some() || closers.is_empty() {
            return Cow::Borrowed(text);
        }

        let body = text.trim_end();
        let mut out = String::with_capacity(text.len() + closers.len());
        out.push_str(body);
        out.push_str(&closers);
        out.push_str(&text[body.len()..]);
        Cow::Owned(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize(text: &str) -> Cow<'_, str> {
        StreamingNormalizer.normalize(text)
    }

    #[test]
    fn closes_dangling_markers() {
        assert_eq!(normalize("**bold"), "**bold**");
        assert_eq!(normalize("some `code"), "some `code`");
        assert_eq!(normalize("~~strike and __under "), "~~strike and __under__~~ ");
    }

    #[test]
    fn balanced_text_is_borrowed() {
        assert!(matches!(normalize("a **b** c ~~d~~"), Cow::Borrowed(_)));
        assert!(matches!(normalize("`**not bold`"), Cow::Borrowed(_)));
        assert!(matches!(normalize("\\*\\* escaped"), Cow::Borrowed(_)));
        assert!(matches!(normalize("* list item"), Cow::Borrowed(_)));
    }

    #[test]
    fn leaves_open_fences_alone() {
        assert!(matches!(normalize("```rust\nfn main() { **"), Cow::Borrowed(_)));
    }

    #[test]
    fn closed_fences_are_skipped() {
        assert_eq!(normalize("```\n**\n```\n**tail"), "```\n**\n```\n**tail**");
    }

    #[test]
    fn indented_code_is_untouched() {
        assert!(matches!(normalize("    x = 2 ** 8"), Cow::Borrowed(_)));
        assert!(matches!(normalize("intro\n\n\tlet a = `b;"), Cow::Borrowed(_)));
        assert!(matches!(normalize("    a ** b\n\n    c ~~ d"), Cow::Borrowed(_)));
    }

    #[test]
    fn indented_paragraph_continuation_is_scanned() {
        assert_eq!(normalize("**lead\n    still bold"), "**lead\n    still bold**");
    }

    #[test]
    fn code_spans_match_by_run_length() {
        assert!(matches!(normalize("use ``a ** b`` here"), Cow::Borrowed(_)));
        assert!(matches!(normalize("``a ` ~~ b``"), Cow::Borrowed(_)));
        assert_eq!(normalize("open ``code ** b"), "open ``code ** b``");
    }

    #[test]
    fn math_is_skipped() {
        assert!(matches!(normalize("value $a__b$ done"), Cow::Borrowed(_)));
        assert!(matches!(normalize("$$x**2$$ and \\(a__b\\)"), Cow::Borrowed(_)));
        assert!(matches!(normalize("$$\na ** b\n$$"), Cow::Borrowed(_)));
        assert!(matches!(normalize("\\[\n~~x\n\\] done"), Cow::Borrowed(_)));
    }

    #[test]
    fn lone_dollar_is_plain_text() {
        assert_eq!(normalize("costs $5 and **more"), "costs $5 and **more**");
        assert!(matches!(normalize("\\$a__b$"), Cow::Owned(_)));
    }

    #[test]
    fn paragraphs_reset_state() {
        assert!(matches!(normalize("**a\n\nb"), Cow::Borrowed(_)));
    }
}
