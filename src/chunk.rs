//! Boundary-aware windowed text chunker.
//!
//! Splits normalized document text into overlapping segments of roughly
//! `target_size` characters. A window that would end mid-text is cut at
//! the last newline inside it, falling back to the last space, falling
//! back to a hard cut. Consecutive windows overlap by `overlap`
//! characters; a guard forces forward progress when the overlap is
//! misconfigured (`overlap >= target_size`), so the walk always
//! terminates.
//!
//! A window whose only break candidates sit close to its start yields a
//! short chunk; content is never truncated away, only re-windowed.

/// Split text into trimmed, non-empty chunks of roughly `target_size`
/// characters with `overlap` characters of overlap between neighbors.
///
/// Empty input yields an empty vec. Input shorter than `target_size`
/// yields exactly one chunk (the whole trimmed text, if non-empty).
pub fn chunk_text(text: &str, target_size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let total = chars.len();
    let mut chunks = Vec::new();

    if total == 0 || target_size == 0 {
        return chunks;
    }

    let mut start = 0usize;
    while start < total {
        let window_end = (start + target_size).min(total);

        // Only adjust when the window ends mid-text; the final window
        // always runs to the end.
        let cut = if window_end < total {
            let window = &chars[start..window_end];
            window
                .iter()
                .rposition(|&c| c == '\n')
                .or_else(|| window.iter().rposition(|&c| c == ' '))
                .map(|pos| start + pos + 1)
                .unwrap_or(window_end)
        } else {
            window_end
        };

        let piece: String = chars[start..cut].iter().collect();
        let trimmed = piece.trim();
        if !trimmed.is_empty() {
            chunks.push(trimmed.to_string());
        }

        if cut >= total {
            break;
        }

        // Rewind by the overlap; if that would stall or reverse the walk
        // (overlap >= effective window), restart at the cut instead.
        let mut next = cut.saturating_sub(overlap);
        if next <= start {
            next = cut;
        }
        start = next;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_chunks() {
        assert!(chunk_text("", 100, 20).is_empty());
    }

    #[test]
    fn whitespace_only_input_yields_no_chunks() {
        assert!(chunk_text("   \n\n  ", 100, 20).is_empty());
    }

    #[test]
    fn short_text_single_chunk() {
        let chunks = chunk_text("Hello, world!", 100, 20);
        assert_eq!(chunks, vec!["Hello, world!".to_string()]);
    }

    #[test]
    fn prefers_newline_boundary() {
        // Window of 20 chars; the last newline inside it wins over spaces.
        let text = "first line\nsecond line continues well past the window";
        let chunks = chunk_text(text, 20, 0);
        assert_eq!(chunks[0], "first line");
    }

    #[test]
    fn falls_back_to_space_boundary() {
        let text = "alpha beta gamma delta epsilon zeta eta theta";
        let chunks = chunk_text(text, 12, 0);
        // No newline in the first window, so it cuts after a space.
        assert!(chunks[0].chars().count() <= 12);
        assert!(!chunks[0].ends_with(' '));
        assert!(text.starts_with(&chunks[0]));
    }

    #[test]
    fn hard_cut_without_any_boundary() {
        let text = "a".repeat(25);
        let chunks = chunk_text(&text, 10, 0);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 10);
        assert_eq!(chunks[1].len(), 10);
        assert_eq!(chunks[2].len(), 5);
    }

    #[test]
    fn overlap_repeats_tail_of_previous_window() {
        let text = "x".repeat(30);
        let chunks = chunk_text(&text, 10, 3);
        // Windows: [0,10), [7,17), [14,24), [21,30).
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().take(3).all(|c| c.len() == 10));
        assert_eq!(chunks[3].len(), 9);
    }

    #[test]
    fn misconfigured_overlap_still_terminates() {
        // overlap >= target_size would stall without the guard.
        let text = "b".repeat(95);
        let chunks = chunk_text(&text, 10, 10);
        // Forced restart at each cut: ceil(95/10) windows, no stall.
        assert_eq!(chunks.len(), 10);
        let rebuilt: String = chunks.concat();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn overlap_larger_than_target_terminates() {
        let text = "c".repeat(50);
        let chunks = chunk_text(&text, 10, 50);
        assert_eq!(chunks.len(), 5);
    }

    #[test]
    fn coverage_without_gaps_when_no_overlap() {
        let text = "The quick brown fox jumps over the lazy dog. \
                    Pack my box with five dozen liquor jugs.";
        let chunks = chunk_text(text, 16, 0);
        // With zero overlap the trimmed chunks re-join into the original
        // modulo the boundary whitespace that trimming removed.
        let rebuilt = chunks.join(" ");
        let normalized: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(rebuilt, normalized);
    }

    #[test]
    fn early_boundary_yields_short_chunk_without_losing_text() {
        // Newline right after the window start: the first chunk is short,
        // but the walk resumes at the cut and loses nothing.
        let text = format!("ab\n{}", "z".repeat(30));
        let chunks = chunk_text(&text, 10, 0);
        assert_eq!(chunks[0], "ab");
        let rebuilt: String = chunks[1..].concat();
        assert_eq!(rebuilt, "z".repeat(30));
    }

    #[test]
    fn multibyte_text_does_not_panic() {
        let text = "héllo wörld ünïcode tëxt ".repeat(8);
        let chunks = chunk_text(&text, 12, 4);
        assert!(!chunks.is_empty());
        for c in &chunks {
            assert!(!c.trim().is_empty());
        }
    }

    #[test]
    fn deterministic() {
        let text = "Alpha\nBeta\nGamma\nDelta\n".repeat(10);
        let a = chunk_text(&text, 30, 10);
        let b = chunk_text(&text, 30, 10);
        assert_eq!(a, b);
    }
}
