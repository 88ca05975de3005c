use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HighlightError {
    #[error("no syntax registered for language {0}")]
    #[diagnostic(code(chatmark::highlight::unknown_language))]
    UnknownLanguage(String),

    #[error("highlighting failed: {0}")]
    #[diagnostic(code(chatmark::highlight::failed))]
    Failed(String, #[source] Box<dyn std::error::Error + Send + Sync>),
}

/// Errors that abort rendering of a block.
#[derive(Debug, Error, Diagnostic)]
pub enum RenderError {
    #[error("failed to highlight {} code block", language.as_deref().unwrap_or("plain"))]
    #[diagnostic(
        code(chatmark::render::highlight),
        help("the block failed with both its declared language and auto-detection")
    )]
    Highlight {
        language: Option<String>,
        #[source]
        source: HighlightError,
    },

    #[error("failed to write html")]
    #[diagnostic(code(chatmark::render::fmt))]
    Fmt(#[from] std::fmt::Error),
}
