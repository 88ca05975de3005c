//! Inline `style` attribute filtering for media embeds.

const ALLOWED_PROPERTIES: &[&str] = &["width", "height", "max-width", "max-height", "aspect-ratio"];

/// Substrings that drop a declaration outright. Escapes and comments are
/// included because they can spell the others indirectly.
const FORBIDDEN_VALUE_PARTS: &[&str] = &["expression", "url(", "\\", "/*"];

/// Keep only sizing declarations from an inline style.
///
/// Returns `None` when nothing survives. The result is not HTML-escaped.
pub fn filter_style(style: &str) -> Option<String> {
    let kept: Vec<String> = style
        .split(';')
        .filter_map(|declaration| {
            let (property, value) = declaration.split_once(':')?;
            let property = property.trim().to_ascii_lowercase();
            let value = value.trim();
            if value.is_empty() || !ALLOWED_PROPERTIES.contains(&property.as_str()) {
                return None;
            }
            let lowered = value.to_ascii_lowercase();
            if FORBIDDEN_VALUE_PARTS
                .iter()
                .any(|part| lowered.contains(part))
            {
                tracing::debug!(%property, %value, "dropped style declaration");
                return None;
            }
            Some(format!("{property}: {value}"))
        })
        .collect();

    if kept.is_empty() {
        None
    } else {
        Some(kept.join("; "))
    }
}
