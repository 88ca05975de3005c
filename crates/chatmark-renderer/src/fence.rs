//! Fenced code block closure detection for streamed input.

/// An opening fence: which character and how many of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Fence {
    pub(crate) marker: u8,
    pub(crate) len: usize,
}

/// Leading fence run of a line indented by at most three spaces.
pub(crate) fn fence_run(line: &str) -> Option<Fence> {
    let indent = line.bytes().take_while(|b| *b == b' ').count();
    if indent > 3 {
        return None;
    }
    let rest = &line.as_bytes()[indent..];
    let marker = *rest.first()?;
    if marker != b'`' && marker != b'~' {
        return None;
    }
    let len = rest.iter().take_while(|b| **b == marker).count();
    (len >= 3).then_some(Fence { marker, len })
}

/// Whether the raw text of a code block has a closing fence.
///
/// Text that does not open with a fence (an indented block) has nothing to
/// close and counts as closed. A fenced block is closed when its last
/// non-blank line, after the opening line, is a run of the opening
/// character at least as long as the opening run, followed only by
/// whitespace. A longer closing run also counts as closed, so four
/// backticks close a block opened with three.
pub fn is_fence_closed(raw: &str) -> bool {
    let text = raw.trim_end_matches(|c: char| c.is_whitespace() || c == '\0');
    let mut lines = text.split('\n');
    let Some(opening) = lines.next().and_then(fence_run) else {
        return true;
    };
    lines
        .next_back()
        .is_some_and(|last| closes_fence(last, opening))
}

/// Whether `line` is a closing fence for `opening`.
pub(crate) fn closes_fence(line: &str, opening: Fence) -> bool {
    let line = line.trim_end_matches([' ', '\t', '\r']);
    fence_run(line).is_some_and(|closing| {
        closing.marker == opening.marker
            && closing.len >= opening.len
            && line.trim_start_matches(' ').len() == closing.len
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_fence_is_not_closed() {
        assert!(!is_fence_closed("```js\ncode"));
        assert!(!is_fence_closed("```js\n"));
        assert!(!is_fence_closed("```"));
        assert!(!is_fence_closed("~~~\nlet x = 1;\n"));
    }

    #[test]
    fn matching_fence_closes() {
        assert!(is_fence_closed("```js\ncode\n```"));
        assert!(is_fence_closed("```js\ncode\n```  \n\0"));
        assert!(is_fence_closed("~~~\ncode\n~~~"));
        assert!(is_fence_closed("```\n```"));
        assert!(is_fence_closed("```\ncode\r\n```\r\n"));
    }

    #[test]
    fn fence_length_must_be_reached() {
        assert!(!is_fence_closed("````md\n```js\nx\n```"));
        assert!(is_fence_closed("````md\n```js\nx\n```\n````"));
    }

    #[test]
    fn longer_closing_run_closes() {
        assert!(is_fence_closed("```\nx\n````"));
        assert!(is_fence_closed("```\nx\n`````"));
        assert!(is_fence_closed("~~~\nx\n~~~~~~"));
    }

    #[test]
    fn other_marker_or_info_does_not_close() {
        assert!(!is_fence_closed("```\ncode\n~~~"));
        assert!(!is_fence_closed("```\ncode\n```rust"));
        assert!(!is_fence_closed("```\ncode\n    ```"));
    }

    #[test]
    fn indented_code_counts_as_closed() {
        assert!(is_fence_closed("    let x = 1;\n"));
        assert!(is_fence_closed(""));
    }
}
