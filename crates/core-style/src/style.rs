//! Cell styling: colors, text attributes, underline shape.

use bitflags::bitflags;

/// A terminal color: unset, an indexed palette entry, or direct RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Color {
    #[default]
    None,
    Palette(u8),
    Rgb(u8, u8, u8),
}

bitflags! {
    /// Boolean text attributes. Stored as a bitset so `Style` stays cheap to
    /// hash and compare for the style-dedup table.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StyleFlags: u16 {
        const BOLD          = 1 << 0;
        const ITALIC        = 1 << 1;
        const FAINT         = 1 << 2;
        const BLINK         = 1 << 3;
        const INVERSE       = 1 << 4;
        const INVISIBLE     = 1 << 5;
        const STRIKETHROUGH = 1 << 6;
    }
}

/// Underline rendering shape, independent of whether underline is set at all
/// (`Underline::None` is itself a valid, distinct value from "no flags").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Underline {
    #[default]
    None,
    Single,
    Double,
    Curly,
    Dotted,
    Dashed,
}

/// A fully-resolved cell style. `Style::default()` is the implicit "default
/// style" that always maps to `Id(0)` and is never stored in the dedup set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Style {
    pub fg: Color,
    pub bg: Color,
    pub underline_color: Color,
    pub flags: StyleFlags,
    pub underline: Underline,
}

impl Style {
    pub fn is_default(&self) -> bool {
        *self == Style::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_style_is_empty() {
        let s = Style::default();
        assert!(s.is_default());
        assert_eq!(s.fg, Color::None);
        assert!(s.flags.is_empty());
        assert_eq!(s.underline, Underline::None);
    }

    #[test]
    fn styles_with_same_fields_are_equal() {
        let a = Style {
            fg: Color::Palette(1),
            flags: StyleFlags::BOLD | StyleFlags::ITALIC,
            ..Default::default()
        };
        let b = Style {
            fg: Color::Palette(1),
            flags: StyleFlags::ITALIC | StyleFlags::BOLD,
            ..Default::default()
        };
        assert_eq!(a, b);
    }
}
