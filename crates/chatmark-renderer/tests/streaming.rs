// End-to-end rendering of messages as they stream in, through the block cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use chatmark_renderer::{
    BlockCache, HighlightError, MathTypesetter, PlainHighlighter, RenderContext, Source,
    SyntaxHighlighter, Token,
};

#[derive(Clone, Default)]
struct CountingTypesetter(Arc<AtomicUsize>);

impl MathTypesetter for CountingTypesetter {
    fn typeset(&self, expr: &str, _display_mode: bool) -> String {
        self.0.fetch_add(1, Ordering::SeqCst);
        format!("<m>{expr}</m>")
    }
}

#[derive(Clone, Default)]
struct CountingHighlighter(Arc<AtomicUsize>);

impl SyntaxHighlighter for CountingHighlighter {
    fn has_language(&self, _language: &str) -> bool {
        true
    }

    fn highlight(&self, code: &str, _language: Option<&str>) -> Result<String, HighlightError> {
        self.0.fetch_add(1, Ordering::SeqCst);
        PlainHighlighter.highlight(code, None)
    }
}

fn plain_cache() -> BlockCache {
    BlockCache::new(
        RenderContext::default().with_highlighter(PlainHighlighter),
        256,
        None,
    )
}

fn all_html(blocks: &[Arc<chatmark_renderer::BlockToken>]) -> String {
    blocks
        .iter()
        .flat_map(|block| block.tokens.iter())
        .map(|token| token.html().to_string())
        .collect()
}

#[test]
fn citation_and_display_math() {
    let cache = plain_cache();
    let sources = [Source::new("https://example.com")];
    let blocks = cache
        .render_message("See [1]. $$x^2$$", &sources)
        .unwrap();
    let html = all_html(&blocks);
    assert!(html.contains("<a href=\"https://example.com\""));
    assert!(html.contains(">1</a></sup>"));
    assert!(html.contains("<span class=\"math math-display\">"));
    assert!(!html.contains("$$"));
}

#[test]
fn unresolved_citation_stays_literal() {
    let cache = plain_cache();
    let blocks = cache
        .render_message("See [2].", &[Source::new("https://example.com")])
        .unwrap();
    assert_eq!(all_html(&blocks), "<p>See [2].</p>\n");
}

#[test]
fn embedded_video_is_sanitized() {
    let cache = plain_cache();
    let blocks = cache
        .render_message(
            "<video controls onerror=\"alert(1)\"><source src=\"a.mp4\" type=\"video/mp4\"></video>",
            &[],
        )
        .unwrap();
    let html = all_html(&blocks);
    assert!(html.contains("<video controls><source src=\"a.mp4\" type=\"video/mp4\"></video>"));
    assert!(!html.contains("onerror"));
}

#[test]
fn script_is_shown_as_text() {
    let cache = plain_cache();
    let html = all_html(&cache.render_message("<script>alert(1)</script>", &[]).unwrap());
    assert!(!html.contains("<script>"));
    assert!(html.contains("&lt;script&gt;"));
}

#[test]
fn fence_closes_as_stream_continues() {
    let cache = plain_cache();
    let partial = cache.render_message("```py\nprint(1)", &[]).unwrap();
    let [Token::Code { is_closed, .. }] = &partial[0].tokens[..] else {
        panic!("expected a single code token");
    };
    assert!(!is_closed);

    let finished = cache
        .render_message("```py\nprint(1)\n```", &[])
        .unwrap();
    let [Token::Code { is_closed, code, .. }] = &finished[0].tokens[..] else {
        panic!("expected a single code token");
    };
    assert!(is_closed);
    assert_eq!(code, "print(1)\n");
    assert_ne!(partial[0].id, finished[0].id);
}

#[test]
fn earlier_blocks_keep_their_ids() {
    let cache = plain_cache();
    let first = cache.render_message("Intro text.\n\nSecond par", &[]).unwrap();
    let later = cache
        .render_message("Intro text.\n\nSecond paragraph.\n\nThird", &[])
        .unwrap();
    assert_eq!(later.len(), 3);
    assert!(Arc::ptr_eq(&first[0], &later[0]));
    assert_ne!(first[1].id, later[1].id);
}

#[test]
fn cache_hits_skip_typesetting_and_highlighting() {
    let typeset = CountingTypesetter::default();
    let highlight = CountingHighlighter::default();
    let ctx = RenderContext::default()
        .with_typesetter(typeset.clone())
        .with_highlighter(highlight.clone());
    let cache = BlockCache::new(ctx, 64, None);

    let message = "Energy $E = mc^2$\n\n```rust\nfn main() {}\n```";
    cache.render_message(message, &[]).unwrap();
    assert_eq!(typeset.0.load(Ordering::SeqCst), 1);
    assert_eq!(highlight.0.load(Ordering::SeqCst), 1);

    cache.render_message(message, &[]).unwrap();
    cache
        .render_message(&format!("{message}\n\nand more"), &[])
        .unwrap();
    assert_eq!(typeset.0.load(Ordering::SeqCst), 1);
    assert_eq!(highlight.0.load(Ordering::SeqCst), 1);
    assert_eq!(cache.entry_count(), 3);
}

#[test]
fn block_cache_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<BlockCache>();
}

#[tokio::test]
async fn async_rendering_matches_sync() {
    let sources = [
        Source::new("https://example.com").with_title("Example"),
        Source::new("https://docs.rs"),
    ];
    let message = "# Notes\n\nSee [1, 2] and \\(a+b\\).\n\n```toml\nkey = 1\n```\n\n- one\n- two $y$\n\n<audio controls><source src=\"a.ogg\"></audio>";
    let sync = plain_cache().render_message(message, &sources).unwrap();
    let async_ = plain_cache()
        .render_message_async(message, &sources)
        .await
        .unwrap();
    assert_eq!(sync.len(), 5);
    assert_eq!(
        sync.iter().map(|b| b.as_ref()).collect::<Vec<_>>(),
        async_.iter().map(|b| b.as_ref()).collect::<Vec<_>>()
    );
}
