//! Syntax highlighter seam and the fallback policy around it.

use pulldown_cmark_escape::{FmtWriter, escape_html_body_text};

use crate::error::{HighlightError, RenderError};

/// Language-aware code to HTML. Output is the inner HTML of a `<code>`
/// element.
pub trait SyntaxHighlighter: Send + Sync {
    /// Whether `language` (a fence info token such as `rust` or `py`) is known.
    fn has_language(&self, language: &str) -> bool;

    /// Highlight `code`. `None` asks the highlighter to detect the language.
    fn highlight(&self, code: &str, language: Option<&str>) -> Result<String, HighlightError>;
}

/// Escapes code without highlighting it.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainHighlighter;

impl SyntaxHighlighter for PlainHighlighter {
    fn has_language(&self, _language: &str) -> bool {
        false
    }

    fn highlight(&self, code: &str, _language: Option<&str>) -> Result<String, HighlightError> {
        let mut out = String::with_capacity(code.len());
        escape_html_body_text(FmtWriter(&mut out), code)
            .map_err(|e| HighlightError::Failed("plain".into(), Box::new(e)))?;
        Ok(out)
    }
}

/// Highlight with the declared language when the highlighter knows it,
/// falling back to auto-detection if that fails. Only a failure of the
/// auto-detect pass is returned.
pub fn highlight_with_fallback(
    highlighter: &dyn SyntaxHighlighter,
    code: &str,
    language: Option<&str>,
) -> Result<String, RenderError> {
    if let Some(lang) = language.filter(|lang| highlighter.has_language(lang)) {
        match highlighter.highlight(code, Some(lang)) {
            Ok(html) => return Ok(html),
            Err(error) => {
                tracing::warn!(language = lang, %error, "highlighting failed, retrying with auto-detection");
            }
        }
    }
    highlighter
        .highlight(code, None)
        .map_err(|source| RenderError::Highlight {
            language: language.map(str::to_string),
            source,
        })
}
