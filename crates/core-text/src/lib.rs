//! Text-shaping helpers for the print engine: grapheme cluster segmentation,
//! incremental break detection and display width.

pub mod grapheme_break;
pub mod width;

pub use grapheme_break::is_break;
pub use width::{VS15, VS16, codepoint_width, egc_width, is_extended_pictographic};
