//! The subset of VT modes the print/cursor engine consults directly.
//!
//! The full CSI/DEC-private-mode state machine lives upstream, in whatever
//! parses escape sequences into calls against this crate; this struct is
//! just the handful of booleans that change how `Terminal::print` and its
//! cursor-motion siblings behave. Callers flip these through
//! [`Terminal::set_mode`](crate::Terminal::set_mode) as they decode `CSI ? Pn h/l`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// DECAWM (7): wrap to the next line instead of overwriting the last column.
    Wraparound,
    /// DECBKM-adjacent reverse-wrap: backspace/cursor-left crosses to the
    /// previous line at the left margin.
    ReverseWrap,
    /// Extended reverse-wrap: additionally permits wrapping from the very
    /// top-left corner. This core terminates at `(0, 0)` instead of
    /// continuing the loop into the bottom-right corner; see DESIGN.md.
    ReverseWrapExtended,
    /// DECOM (6): cursor addressing is relative to the scrolling region.
    Origin,
    /// IRM (4): insert mode — not exercised by `print` itself (insertion of
    /// blank cells ahead of the cursor is a caller-level shift), but tracked
    /// so callers can query it.
    Insert,
    /// LNM (20): linefeed also performs a carriage return.
    Linefeed,
    /// Mode 2027: grapheme clustering is cursor-engine's responsibility
    /// instead of being pre-split into separate cells by the caller.
    GraphemeCluster,
    /// DECLRMM: enables `set_left_and_right_margin`; without it, that call
    /// is a no-op.
    EnableLeftAndRightMargin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modes {
    pub wraparound: bool,
    pub reverse_wrap: bool,
    pub reverse_wrap_extended: bool,
    pub origin: bool,
    pub insert: bool,
    pub linefeed: bool,
    pub grapheme_cluster: bool,
    pub enable_left_and_right_margin: bool,
}

impl Default for Modes {
    fn default() -> Self {
        Self {
            wraparound: true,
            reverse_wrap: false,
            reverse_wrap_extended: false,
            origin: false,
            insert: false,
            linefeed: false,
            grapheme_cluster: false,
            enable_left_and_right_margin: false,
        }
    }
}

impl Modes {
    pub fn set(&mut self, mode: Mode, value: bool) {
        match mode {
            Mode::Wraparound => self.wraparound = value,
            Mode::ReverseWrap => self.reverse_wrap = value,
            Mode::ReverseWrapExtended => self.reverse_wrap_extended = value,
            Mode::Origin => self.origin = value,
            Mode::Insert => self.insert = value,
            Mode::Linefeed => self.linefeed = value,
            Mode::GraphemeCluster => self.grapheme_cluster = value,
            Mode::EnableLeftAndRightMargin => self.enable_left_and_right_margin = value,
        }
    }

    pub fn get(&self, mode: Mode) -> bool {
        match mode {
            Mode::Wraparound => self.wraparound,
            Mode::ReverseWrap => self.reverse_wrap,
            Mode::ReverseWrapExtended => self.reverse_wrap_extended,
            Mode::Origin => self.origin,
            Mode::Insert => self.insert,
            Mode::Linefeed => self.linefeed,
            Mode::GraphemeCluster => self.grapheme_cluster,
            Mode::EnableLeftAndRightMargin => self.enable_left_and_right_margin,
        }
    }
}

/// OSC-set status line selector. Printing into a non-`Main` display is a
/// documented no-op for the grid (the status line itself is out of scope
/// for this core).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusDisplay {
    #[default]
    Main,
    StatusLine,
}
