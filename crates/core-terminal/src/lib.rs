//! The print/cursor/scroll engine: interprets decoded
//! codepoints and VT control events against a [`core_screen::Screen`].
//!
//! The PTY/raw-mode backend responsibility this crate historically carried
//! is an explicit external collaborator of the terminal screen core (see
//! DESIGN.md); this crate's surface is now the VT operation engine only.

mod modes;
mod terminal;

pub use modes::{Mode, Modes, StatusDisplay};
pub use terminal::Terminal;
