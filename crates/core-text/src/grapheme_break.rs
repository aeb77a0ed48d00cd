//! Incremental grapheme cluster break detection for the print engine.
//!
//! The print engine sees codepoints one at a time and cannot re-segment the
//! whole screen on every keystroke, so it needs a test of the shape "does
//! appending `next` to the cluster already accumulated in `prev` start a new
//! cluster, or extend it?" `unicode_segmentation`'s grapheme iterator already
//! answers that: feed it `prev` followed by `next` and see whether it still
//! reports a single cluster.

use unicode_segmentation::UnicodeSegmentation;

/// `true` if appending `next` after `prev` would start a new grapheme
/// cluster (a "break"); `false` if `next` extends the cluster in `prev`.
///
/// `prev` is the text already accumulated for the current cell (its base
/// codepoint plus any grapheme continuations); an empty `prev` is always a
/// break, since there is nothing to extend.
pub fn is_break(prev: &str, next: char) -> bool {
    if prev.is_empty() {
        return true;
    }
    let mut combined = String::with_capacity(prev.len() + next.len_utf8());
    combined.push_str(prev);
    combined.push(next);
    combined.graphemes(true).count() > 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_prev_is_always_a_break() {
        assert!(is_break("", 'a'));
    }

    #[test]
    fn ascii_after_ascii_breaks() {
        assert!(is_break("a", 'b'));
    }

    #[test]
    fn combining_mark_does_not_break() {
        assert!(!is_break("e", '\u{0301}'));
    }

    #[test]
    fn zwj_sequence_does_not_break() {
        assert!(!is_break("👨", '\u{200D}'));
        assert!(!is_break("👨\u{200D}", '👩'));
    }

    #[test]
    fn vs16_does_not_break() {
        assert!(!is_break("⚙", '\u{FE0F}'));
    }

    #[test]
    fn regional_indicator_pair_does_not_break() {
        assert!(!is_break("🇺", '🇸'));
    }

    #[test]
    fn third_regional_indicator_breaks_the_flag_pair() {
        assert!(is_break("🇺🇸", '🇷'));
    }
}
