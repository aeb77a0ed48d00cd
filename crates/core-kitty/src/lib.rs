//! The Kitty graphics protocol subsystem: APC command
//! parsing, chunked image transmission, reference-counted image storage
//! with a byte-budget eviction policy, and the Unicode virtual-placement
//! scanner.
//!
//! The surrounding VT parser owns base64 decoding and framing (`ESC _ G ...
//! ESC \`); everything here operates on already-decoded payload bytes.

pub mod command;
pub mod image;
pub mod response;
pub mod storage;
pub mod unicode_placement;

pub use command::{Command, CommandParser};
pub use response::Response;
pub use storage::ImageStorage;
