//! Class-based syntax highlighting with syntect.

use std::sync::LazyLock;

use syntect::html::{ClassStyle, ClassedHTMLGenerator};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::LinesWithEndings;

use crate::error::HighlightError;
use crate::highlight::SyntaxHighlighter;

/// Prefix of every highlighting class, e.g. `hl-keyword`.
pub const CSS_PREFIX: &str = "hl-";

static SYNTAX_SET: LazyLock<SyntaxSet> = LazyLock::new(SyntaxSet::load_defaults_newlines);

/// Highlighter over syntect's bundled syntaxes, emitting `hl-` prefixed
/// class spans to pair with [`crate::css::generate_syntax_css`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntectHighlighter;

impl SyntectHighlighter {
    fn syntax_for(&self, language: &str) -> Option<&'static SyntaxReference> {
        SYNTAX_SET.find_syntax_by_token(language)
    }
}

impl SyntaxHighlighter for SyntectHighlighter {
    fn has_language(&self, language: &str) -> bool {
        self.syntax_for(language).is_some()
    }

    fn highlight(&self, code: &str, language: Option<&str>) -> Result<String, HighlightError> {
        let syntax = match language {
            Some(lang) => self
                .syntax_for(lang)
                .ok_or_else(|| HighlightError::UnknownLanguage(lang.to_string()))?,
            None => SYNTAX_SET
                .find_syntax_by_first_line(code)
                .unwrap_or_else(|| SYNTAX_SET.find_syntax_plain_text()),
        };

        let mut generator = ClassedHTMLGenerator::new_with_class_style(
            syntax,
            &SYNTAX_SET,
            ClassStyle::SpacedPrefixed { prefix: CSS_PREFIX },
        );
        for line in LinesWithEndings::from(code) {
            generator
                .parse_html_for_line_which_includes_newline(line)
                .map_err(|e| HighlightError::Failed(syntax.name.clone(), Box::new(e)))?;
        }
        Ok(generator.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knows_common_languages() {
        let h = SyntectHighlighter;
        assert!(h.has_language("rust"));
        assert!(h.has_language("rs"));
        assert!(h.has_language("python"));
        assert!(!h.has_language("not-a-language"));
    }

    #[test]
    fn emits_prefixed_classes() {
        let html = SyntectHighlighter
            .highlight("fn main() {}\n", Some("rust"))
            .unwrap();
        assert!(html.contains("class=\"hl-"));
        assert!(html.contains("main"));
    }

    #[test]
    fn detection_falls_back_to_plain_text() {
        let html = SyntectHighlighter.highlight("<b> & stuff", None).unwrap();
        assert!(html.contains("&lt;b&gt;"));
        assert!(!html.contains("<b>"));
    }

    #[test]
    fn unknown_language_is_an_error() {
        assert!(matches!(
            SyntectHighlighter.highlight("x", Some("not-a-language")),
            Err(HighlightError::UnknownLanguage(_))
        ));
    }
}
