use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::engine::RenderOptions;

pub const DEFAULT_LIGHT_CODE_THEME: &str = "InspiredGitHub";
pub const DEFAULT_DARK_CODE_THEME: &str = "base16-ocean.dark";

/// Renderer settings as stored in a config file.
///
/// Every field is optional in the file; missing ones take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererConfig {
    /// Maximum number of rendered blocks kept per cache.
    pub cache_capacity: u64,
    /// Evict cached blocks this long after insertion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_secs: Option<u64>,
    pub gfm: bool,
    pub soft_breaks: bool,
    pub math: bool,
    pub citations: bool,
    pub media_embeds: bool,
    pub light_code_theme: String,
    pub dark_code_theme: String,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 1024,
            cache_ttl_secs: None,
            gfm: true,
            soft_breaks: true,
            math: true,
            citations: true,
            media_embeds: true,
            light_code_theme: DEFAULT_LIGHT_CODE_THEME.to_string(),
            dark_code_theme: DEFAULT_DARK_CODE_THEME.to_string(),
        }
    }
}

impl RendererConfig {
    pub fn render_options(&self) -> RenderOptions {
        let mut options = RenderOptions::empty();
        options.set(RenderOptions::GFM, self.gfm);
        options.set(RenderOptions::BREAKS, self.soft_breaks);
        options.set(RenderOptions::MATH, self.math);
        options.set(RenderOptions::CITATIONS, self.citations);
        options.set(RenderOptions::MEDIA_EMBEDS, self.media_embeds);
        options
    }

    pub fn cache_ttl(&self) -> Option<Duration> {
        self.cache_ttl_secs.map(Duration::from_secs)
    }

    /// Stylesheet for highlighted code using the configured themes.
    #[cfg(feature = "syntax-css")]
    pub fn syntax_css(&self) -> miette::Result<String> {
        crate::css::generate_syntax_css(&self.light_code_theme, &self.dark_code_theme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatmark_common::config::{FileStore, Loader, Saver};

    #[test]
    fn defaults_enable_everything() {
        let config = RendererConfig::default();
        assert_eq!(config.render_options(), RenderOptions::all());
        assert_eq!(config.cache_ttl(), None);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: RendererConfig =
            serde_json::from_str(r#"{ "soft_breaks": false, "cache_ttl_secs": 60 }"#).unwrap();
        assert_eq!(config.cache_capacity, 1024);
        assert_eq!(config.cache_ttl(), Some(Duration::from_secs(60)));
        assert_eq!(
            config.render_options(),
            RenderOptions::all() - RenderOptions::BREAKS
        );
    }

    #[test]
    fn round_trips_through_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("renderer.toml"));
        let config = RendererConfig {
            math: false,
            cache_capacity: 8,
            ..Default::default()
        };
        store.save(&config).unwrap();
        let loaded: RendererConfig = store.load().unwrap();
        assert_eq!(loaded, config);
    }
}
