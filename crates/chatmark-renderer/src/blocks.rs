//! Splitting a message into cacheable blocks.

use crate::fence::{Fence, closes_fence, fence_run};

/// Splits message text into ordered blocks. Pure text to list of text.
pub trait BlockSplitter: Send + Sync {
    fn split<'a>(&self, text: &'a str) -> Vec<&'a str>;
}

/// Splits on blank lines, except inside fenced code and display math
/// (`$$` or `\[` regions), which are kept whole even across blank lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParagraphSplitter;

impl BlockSplitter for ParagraphSplitter {
    fn split<'a>(&self, text: &'a str) -> Vec<&'a str> {
        let mut blocks = Vec::new();
        let mut start: Option<usize> = None;
        let mut end = 0;
        let mut offset = 0;
        let mut fence: Option<Fence> = None;
        let mut dollar_math = false;
        let mut bracket_math = false;

        for line in text.split_inclusive('\n') {
            let line_start = offset;
            offset += line.len();
            let content = line.trim_end_matches(['\n', '\r']);
            let in_region = fence.is_some() || dollar_math || bracket_math;

            if !in_region && content.trim().is_empty() {
                if let Some(s) = start.take() {
                    blocks.push(&text[s..end]);
                }
                continue;
            }
            start.get_or_insert(line_start);
            end = line_start + content.len();

            if let Some(open) = fence {
                if closes_fence(content, open) {
                    fence = None;
                }
                continue;
            }
            if dollar_math || bracket_math {
                // only the delimiter that opened the region closes it
            } else if let Some(open) = fence_run(content) {
                fence = Some(open);
                continue;
            }
            if content.matches("$$").count() % 2 == 1 {
                dollar_math = !dollar_math;
            }
            if bracket_math {
                bracket_math = !content.contains("\\]");
            } else if let Some(at) = content.find("\\[") {
                bracket_math = !content[at..].contains("\\]");
            }
        }

        if let Some(s) = start {
            blocks.push(&text[s..end]);
        }
        blocks
    }
}
