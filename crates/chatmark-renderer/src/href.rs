//! URL gatekeeping for every attribute that carries a link.

/// Scheme prefixes that never reach an emitted attribute.
const BLOCKED_PREFIXES: &[&str] = &["javascript:", "vbscript:", "data:text/html"];

/// Validate and clean a link target before it is written into `href`, `src`
/// or `poster`.
///
/// Returns the trimmed input with a single trailing `>` removed (left over
/// from autolink capture), or `None` when the input is empty or uses a
/// blocked scheme. The scheme check ignores case and any embedded ASCII
/// whitespace or control characters, which browsers also ignore.
pub fn sanitize_href(href: &str) -> Option<&str> {
    let trimmed = href.trim();
    if trimmed.is_empty() {
        return None;
    }

    let probe: String = trimmed
        .chars()
        .filter(|c| !c.is_ascii_whitespace() && !c.is_ascii_control())
        .take(16)
        .collect::<String>()
        .to_ascii_lowercase();
    if BLOCKED_PREFIXES.iter().any(|prefix| probe.starts_with(prefix)) {
        tracing::debug!(href = %trimmed, "rejected unsafe href");
        return None;
    }

    let cleaned = trimmed.strip_suffix('>').unwrap_or(trimmed);
    if cleaned.is_empty() {
        return None;
    }
    Some(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_ordinary_links_trimmed() {
        assert_eq!(
            sanitize_href("  https://example.com/a?b=c  "),
            Some("https://example.com/a?b=c")
        );
        assert_eq!(sanitize_href("./clip.mp4"), Some("./clip.mp4"));
        assert_eq!(sanitize_href("mailto:me@example.com"), Some("mailto:me@example.com"));
    }

    #[test]
    fn rejects_empty() {
        assert_eq!(sanitize_href(""), None);
        assert_eq!(sanitize_href("   "), None);
        assert_eq!(sanitize_href(">"), None);
    }

    #[test]
    fn rejects_script_schemes_in_any_case() {
        assert_eq!(sanitize_href("javascript:alert(1)"), None);
        assert_eq!(sanitize_href("  JaVaScRiPt:alert(1)"), None);
        assert_eq!(sanitize_href("java\tscript:alert(1)"), None);
        assert_eq!(sanitize_href("vbscript:msgbox"), None);
        assert_eq!(sanitize_href("DATA:text/html;base64,PHNjcmlwdD4="), None);
    }

    #[test]
    fn allows_other_data_urls() {
        assert_eq!(
            sanitize_href("data:image/png;base64,AAAA"),
            Some("data:image/png;base64,AAAA")
        );
    }

    #[test]
    fn strips_one_trailing_angle_bracket() {
        assert_eq!(sanitize_href("https://example.com>"), Some("https://example.com"));
        assert_eq!(sanitize_href("https://example.com>>"), Some("https://example.com>"));
    }
}
