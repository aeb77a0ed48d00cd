//! Top-level facade: re-exports the public surface of every subsystem
//! crate and wires the Kitty graphics subsystem to the print/cursor engine
//! so a caller has one fallible entry point, [`TerminalModel::execute`].
//!
//! Everything else in the core — `print`, cursor motion, scrolling, mode
//! toggles — is infallible and reached directly through [`Terminal`].

pub use core_kitty::command::{
    Command, CommandError, CommandParser, Compression, DeleteSpec, DeleteVariant, Format, Medium,
    Payload, Quiet,
};
pub use core_kitty::image::{Decompressor, Image, ImagePngDecoder, LoadError, LoadingImage, PngDecoder, ZlibDecompressor};
pub use core_kitty::response::{ErrorKind, Response};
pub use core_kitty::storage::{ImageStorage, Location, Placement, PlacementKey, Rect, Stats, StorageError};
pub use core_kitty::unicode_placement::{self, VirtualPlacement};
pub use core_offset::{OSlice, OffsetBuf, O};
pub use core_page::{Capacity, Cell, GraphemeKey, GraphemeStore, Page, PageBuffer, Row, RowFlags, Wide};
pub use core_pagelist::{Direction, PageId, PageList, Pin, PinHandle, Point, RowIter, Traversal};
pub use core_screen::{Cursor, PageCapacity, Screen, ScrollingRegion, Tabstops};
pub use core_style::{AddError, AddOutcome, Color, Id as StyleId, RefCountedSet, Style, StyleFlags, StyleSet, Underline};
pub use core_terminal::{Mode, Modes, StatusDisplay, Terminal};

mod engine;

pub use engine::TerminalModel;
