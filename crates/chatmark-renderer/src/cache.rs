//! Content-addressed memoization of rendered blocks.

use std::sync::Arc;
use std::time::Duration;

use chatmark_common::cache;

use crate::config::RendererConfig;
use crate::engine::{RenderContext, RenderEngine};
use crate::error::RenderError;
use crate::types::{BlockToken, Source, Token, hash_source, hash_sources, make_block_id};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct BlockKey {
    index: usize,
    content: blake3::Hash,
    sources: blake3::Hash,
}

/// Bounded cache of rendered blocks, owned by one conversation.
///
/// Entries are keyed by block position, content hash and a hash of the
/// citation sources, so a hit is always safe to reuse as-is. Two racing
/// renders of the same key store equal values.
#[derive(Clone)]
pub struct BlockCache {
    ctx: RenderContext,
    cache: cache::Cache<BlockKey, Arc<BlockToken>>,
}

impl std::fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCache")
            .field("ctx", &self.ctx)
            .field("entries", &self.entry_count())
            .finish()
    }
}

impl BlockCache {
    pub fn new(ctx: RenderContext, max_capacity: u64, ttl: Option<Duration>) -> Self {
        Self {
            ctx,
            cache: cache::new_cache(max_capacity, ttl),
        }
    }

    pub fn from_config(config: &RendererConfig) -> Self {
        Self::new(
            RenderContext::new(config.render_options()),
            config.cache_capacity,
            config.cache_ttl(),
        )
    }

    pub fn context(&self) -> &RenderContext {
        &self.ctx
    }

    pub fn entry_count(&self) -> usize {
        cache::len(&self.cache)
    }

    pub fn clear(&self) {
        cache::clear(&self.cache);
    }

    fn lookup(&self, key: &BlockKey) -> Option<Arc<BlockToken>> {
        let hit = cache::get(&self.cache, key);
        if hit.is_some() {
            metrics::counter!("chatmark_block_cache_hits_total").increment(1);
            tracing::trace!(index = key.index, "block cache hit");
        } else {
            metrics::counter!("chatmark_block_cache_misses_total").increment(1);
            tracing::debug!(index = key.index, "block cache miss");
        }
        hit
    }

    fn store(&self, key: BlockKey, content: &str, tokens: Vec<Token>) -> Arc<BlockToken> {
        let block = Arc::new(BlockToken {
            id: make_block_id(key.index, &key.content),
            content: content.to_string(),
            tokens,
        });
        cache::insert(&self.cache, key, block.clone());
        block
    }

    fn key(index: usize, content: &str, sources: blake3::Hash) -> BlockKey {
        BlockKey {
            index,
            content: hash_source(content),
            sources,
        }
    }

    /// Rendered block for `content` at `index`, rendering on a miss.
    pub fn get_or_render(
        &self,
        index: usize,
        content: &str,
        sources: &[Source],
    ) -> Result<Arc<BlockToken>, RenderError> {
        self.get_or_render_keyed(Self::key(index, content, hash_sources(sources)), content, sources)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(index = key.index))]
    fn get_or_render_keyed(
        &self,
        key: BlockKey,
        content: &str,
        sources: &[Source],
    ) -> Result<Arc<BlockToken>, RenderError> {
        if let Some(hit) = self.lookup(&key) {
            return Ok(hit);
        }
        let normalized = self.ctx.normalizer.normalize(content);
        let tokens = RenderEngine::new(&self.ctx, sources).render(&normalized)?;
        Ok(self.store(key, content, tokens))
    }

    /// Async form of [`BlockCache::get_or_render`].
    pub async fn get_or_render_async(
        &self,
        index: usize,
        content: &str,
        sources: &[Source],
    ) -> Result<Arc<BlockToken>, RenderError> {
        self.get_or_render_keyed_async(Self::key(index, content, hash_sources(sources)), content, sources)
            .await
    }

    #[tracing::instrument(level = "debug", skip_all, fields(index = key.index))]
    async fn get_or_render_keyed_async(
        &self,
        key: BlockKey,
        content: &str,
        sources: &[Source],
    ) -> Result<Arc<BlockToken>, RenderError> {
        if let Some(hit) = self.lookup(&key) {
            return Ok(hit);
        }
        let normalized = self.ctx.normalizer.normalize(content);
        let tokens = RenderEngine::new(&self.ctx, sources)
            .render_async(&normalized)
            .await?;
        Ok(self.store(key, content, tokens))
    }

    /// Render every block in order; the block's position is its index.
    pub fn get_or_render_all(
        &self,
        blocks: &[&str],
        sources: &[Source],
    ) -> Result<Vec<Arc<BlockToken>>, RenderError> {
        let source_hash = hash_sources(sources);
        blocks
            .iter()
            .enumerate()
            .map(|(index, content)| {
                self.get_or_render_keyed(Self::key(index, content, source_hash), content, sources)
            })
            .collect()
    }

    /// Async form of [`BlockCache::get_or_render_all`]; blocks render
    /// concurrently and come back in input order.
    pub async fn get_or_render_all_async(
        &self,
        blocks: &[&str],
        sources: &[Source],
    ) -> Result<Vec<Arc<BlockToken>>, RenderError> {
        let source_hash = hash_sources(sources);
        let pending = blocks.iter().enumerate().map(|(index, content)| {
            self.get_or_render_keyed_async(Self::key(index, content, source_hash), content, sources)
        });
        n0_future::join_all(pending).await.into_iter().collect()
    }

    /// Split a whole message into blocks and render them.
    #[tracing::instrument(level = "debug", skip_all, fields(len = text.len()))]
    pub fn render_message(
        &self,
        text: &str,
        sources: &[Source],
    ) -> Result<Vec<Arc<BlockToken>>, RenderError> {
        let blocks = self.ctx.splitter.split(text);
        self.get_or_render_all(&blocks, sources)
    }

    /// Async form of [`BlockCache::render_message`].
    #[tracing::instrument(level = "debug", skip_all, fields(len = text.len()))]
    pub async fn render_message_async(
        &self,
        text: &str,
        sources: &[Source],
    ) -> Result<Vec<Arc<BlockToken>>, RenderError> {
        let blocks = self.ctx.splitter.split(text);
        self.get_or_render_all_async(&blocks, sources).await
    }
}
