//! LaTeX math rendering via pulldown-latex → MathML

use pulldown_cmark_escape::{FmtWriter, escape_html};
use pulldown_latex::{Parser, Storage, config::DisplayMode, config::RenderConfig, mathml::push_mathml};

/// Turns a math expression into HTML. Must never fail: malformed input
/// produces a best-effort rendering instead.
pub trait MathTypesetter: Send + Sync {
    fn typeset(&self, expr: &str, display_mode: bool) -> String;
}

/// Result of attempting to render LaTeX math
pub enum MathResult {
    /// Successfully rendered MathML
    Success(String),
    /// Rendering failed - contains fallback HTML with source and error message
    Error { html: String, message: String },
}

/// Default typesetter, MathML through pulldown-latex.
#[derive(Debug, Clone, Copy, Default)]
pub struct LatexTypesetter;

impl MathTypesetter for LatexTypesetter {
    fn typeset(&self, expr: &str, display_mode: bool) -> String {
        match render_math(expr, display_mode) {
            MathResult::Success(mathml) => mathml,
            MathResult::Error { html, message } => {
                tracing::debug!(%message, "math fell back to source");
                html
            }
        }
    }
}

/// Render LaTeX math to MathML
///
/// # Arguments
/// * `latex` - The LaTeX source string (without delimiters like $ or $$)
/// * `display_mode` - If true, render as display math (block); if false, inline
pub fn render_math(latex: &str, display_mode: bool) -> MathResult {
    let storage = Storage::new();
    let parser = Parser::new(latex, &storage);
    let config = RenderConfig {
        display_mode: if display_mode {
            DisplayMode::Block
        } else {
            DisplayMode::Inline
        },
        ..Default::default()
    };

    let events: Vec<_> = parser.collect();
    let errors: Vec<String> = events
        .iter()
        .filter_map(|e| e.as_ref().err().map(|err| err.to_string()))
        .collect();

    if !errors.is_empty() {
        let message = errors.join("; ");
        return MathResult::Error {
            html: format_error_html(latex, &message, display_mode),
            message,
        };
    }

    let mut mathml = String::new();
    match push_mathml(&mut mathml, events.into_iter(), config) {
        Ok(()) => MathResult::Success(mathml),
        Err(e) => MathResult::Error {
            html: format_error_html(latex, &e.to_string(), display_mode),
            message: e.to_string(),
        },
    }
}

fn format_error_html(latex: &str, error: &str, display_mode: bool) -> String {
    let mode_class = if display_mode {
        "math-display"
    } else {
        "math-inline"
    };
    let mut escaped_latex = String::new();
    let mut escaped_error = String::new();
    // These won't fail writing to String
    let _ = escape_html(FmtWriter(&mut escaped_latex), latex);
    let _ = escape_html(FmtWriter(&mut escaped_error), error);
    format!(
        r#"<span class="math-error {mode_class}" title="{escaped_error}"><code>{escaped_latex}</code></span>"#
    )
}
