use miette::IntoDiagnostic;
use syntect::highlighting::{Theme, ThemeSet};
use syntect::html::{ClassStyle, css_for_theme_with_class_style};

fn load_theme(themes: &ThemeSet, name: &str) -> miette::Result<Theme> {
    themes
        .themes
        .get(name)
        .cloned()
        .ok_or_else(|| miette::miette!("unknown syntax theme {}", name))
}

fn class_style() -> ClassStyle {
    ClassStyle::SpacedPrefixed {
        prefix: crate::code_pretty::CSS_PREFIX,
    }
}

/// Stylesheet for the `hl-` highlighting classes: `light` by default,
/// `dark` under `prefers-color-scheme: dark`.
pub fn generate_syntax_css(light: &str, dark: &str) -> miette::Result<String> {
    let themes = ThemeSet::load_defaults();
    let light_theme = load_theme(&themes, light)?;
    let dark_theme = load_theme(&themes, dark)?;

    let light_css = css_for_theme_with_class_style(&light_theme, class_style()).into_diagnostic()?;
    let dark_css = css_for_theme_with_class_style(&dark_theme, class_style()).into_diagnostic()?;

    let mut result = String::new();
    result.push_str("/* Syntax highlighting - Light Mode (default) */\n");
    result.push_str(&light_css);
    result.push_str("\n\n/* Syntax highlighting - Dark Mode */\n");
    result.push_str("@media (prefers-color-scheme: dark) {\n");
    result.push_str(&dark_css);
    result.push_str("}\n");

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_DARK_CODE_THEME, DEFAULT_LIGHT_CODE_THEME};

    #[test]
    fn default_themes_render() {
        let css = generate_syntax_css(DEFAULT_LIGHT_CODE_THEME, DEFAULT_DARK_CODE_THEME).unwrap();
        assert!(css.contains(".hl-"));
        assert!(css.contains("@media (prefers-color-scheme: dark)"));
    }

    #[test]
    fn unknown_theme_is_reported() {
        let err = generate_syntax_css("nope", DEFAULT_DARK_CODE_THEME).unwrap_err();
        assert!(err.to_string().contains("nope"));
    }
}
