//! Wires the print/cursor engine to the Kitty graphics subsystem: the one
//! fallible entry point the core exposes — every other operation is
//! infallible.

use core_kitty::command::{Command, DeleteSpec, Payload, Quiet};
use core_kitty::image::{Decompressor, Image, ImagePngDecoder, LoadError, LoadingImage, PngDecoder, ZlibDecompressor};
use core_kitty::response::{ErrorKind, Response};
use core_kitty::storage::{ImageStorage, Location, Placement, StorageError};
use core_kitty::unicode_placement;
use core_pagelist::{Direction, Pin};
use core_terminal::Terminal;
use tracing::debug;

/// The print engine plus the Kitty graphics store, sharing one
/// `dirty`-bearing world the renderer observes. Owns the single in-flight
/// chunked transmission slot.
pub struct TerminalModel {
    terminal: Terminal,
    images: ImageStorage,
    loading: Option<LoadingImage>,
    /// Size of one cell in pixels, used to size placements that don't pin
    /// an explicit `cols`/`rows`. Set by the caller (the renderer knows the
    /// font metrics; this core only needs the numbers).
    cell_px: (u32, u32),
    decompressor: Box<dyn Decompressor>,
    png_decoder: Box<dyn PngDecoder>,
    next_transmit_time: u64,
}

impl TerminalModel {
    pub fn new(terminal: Terminal, total_limit: u64, cell_px: (u32, u32)) -> Self {
        Self {
            terminal,
            images: ImageStorage::new(total_limit),
            loading: None,
            cell_px,
            decompressor: Box::new(ZlibDecompressor),
            png_decoder: Box::new(ImagePngDecoder),
            next_transmit_time: 1,
        }
    }

    pub fn terminal(&self) -> &Terminal {
        &self.terminal
    }

    pub fn terminal_mut(&mut self) -> &mut Terminal {
        &mut self.terminal
    }

    pub fn images(&self) -> &ImageStorage {
        &self.images
    }

    pub fn images_mut(&mut self) -> &mut ImageStorage {
        &mut self.images
    }

    pub fn set_cell_px(&mut self, cell_px: (u32, u32)) {
        self.cell_px = cell_px;
    }

    /// Virtual placements currently visible in the active area. Read-only;
    /// callers combine this with [`ImageStorage::placements`] keyed
    /// `Location::Virtual` to resolve which image each one draws.
    pub fn virtual_placements(&self) -> Vec<unicode_placement::VirtualPlacement> {
        let screen = self.terminal.screen();
        let top = screen
            .pages()
            .pin(core_pagelist::Point::Active { x: 0, y: 0 })
            .expect("active area always resolvable");
        unicode_placement::scan(screen.pages(), top, Direction::Forward, None)
    }

    fn cursor_pin(&self) -> Pin {
        self.terminal.screen().cursor().pin()
    }

    /// A continuation chunk is recognized by the absence of any metadata a
    /// client only sends on the first chunk of a transmission; this is a
    /// heuristic (real clients do not repeat `s`/`v`/`i` on later chunks),
    /// documented as a design decision in DESIGN.md.
    fn looks_like_continuation(&self, p: &Payload) -> bool {
        self.loading.is_some() && p.image_id == 0 && p.width == 0 && p.height == 0
    }

    fn begin_or_continue(&mut self, payload: &Payload) -> Result<bool, LoadError> {
        if self.looks_like_continuation(payload) {
            if let Some(loading) = self.loading.as_mut() {
                loading.add_data(payload)?;
            }
        } else {
            // A second init while one is pending aborts and replaces it —
            // no cancellation semantics beyond "last one wins".
            // `next_implicit_id()` is only consumed by `init` when
            // `payload.image_id == 0`, so calling it unconditionally here
            // would waste an id on every explicit-id transmission; peek
            // first and only draw one when it'll actually be used.
            let next_id = if payload.image_id == 0 {
                self.images.next_implicit_id()
            } else {
                0
            };
            self.loading = Some(LoadingImage::init(next_id, payload)?);
        }
        Ok(self.loading.as_ref().is_some_and(LoadingImage::is_complete_pending))
    }

    fn complete_loading(&mut self) -> Result<Image, LoadError> {
        let loading = self.loading.take().expect("completion only called when pending");
        let transmit_time = self.next_transmit_time;
        self.next_transmit_time += 1;
        loading.complete(transmit_time, self.decompressor.as_ref(), self.png_decoder.as_ref())
    }

    fn make_placement(payload: &Payload) -> Placement {
        Placement {
            location: Location::Virtual, // replaced with Pinned below when display is requested
            source_x: payload.x,
            source_y: payload.y,
            source_w: payload.w,
            source_h: payload.h,
            cols: payload.cols,
            rows: payload.rows,
            x_offset: payload.x_offset,
            y_offset: payload.y_offset,
            z: payload.z,
        }
    }

    fn display(&mut self, image_id: u32, payload: &Payload) {
        let pin = self.cursor_pin();
        let handle = self.terminal.screen_mut().pages_mut().track_pin(pin);
        let mut placement = Self::make_placement(payload);
        placement.location = Location::Pinned(handle);
        self.images.add_placement(image_id, payload.placement_id, placement);
    }

    fn respond(quiet: Quiet, is_err: bool, response: Response) -> Option<Response> {
        match quiet {
            Quiet::No => Some(response),
            Quiet::Ok => is_err.then_some(response),
            Quiet::Failures => None,
        }
    }

    fn load_error_response(payload: &Payload, err: LoadError) -> Response {
        let kind = match err {
            LoadError::InvalidData
            | LoadError::DimensionsRequired
            | LoadError::DimensionsTooLarge
            | LoadError::UnsupportedFormat
            | LoadError::UnsupportedMedium
            | LoadError::UnsupportedDepth
            | LoadError::DecompressionFailed
            | LoadError::FilePathTooLong => ErrorKind::Einval,
            LoadError::TemporaryFileNotInTempDir => ErrorKind::Enoent,
            LoadError::InternalError => ErrorKind::Ebadf,
        };
        Response::error(payload.image_id, payload.image_number, payload.placement_id, kind, err.to_string())
    }

    /// Apply a decoded Kitty command. The only fallible top-level entry
    /// point in the core: every other mutation is infallible. Returns
    /// `None` when quiet suppression (`q=`) means no response is sent.
    pub fn execute(&mut self, command: Command) -> Option<Response> {
        match command {
            Command::Query(payload) => self.execute_query(payload),
            Command::Transmit(payload) => self.execute_transmit(payload, false),
            Command::TransmitAndDisplay(payload) => self.execute_transmit(payload, true),
            Command::Display(payload) => self.execute_display(payload),
            Command::Delete(spec) => self.execute_delete(spec),
            Command::TransmitAnimationFrame(payload) => {
                // Animation frames are accepted but execution is a no-op.
                Self::respond(payload.quiet, false, Response::ok(payload.image_id, payload.image_number, payload.placement_id))
            }
            Command::ControlAnimation(payload) | Command::ComposeAnimation(payload) => {
                Self::respond(payload.quiet, false, Response::ok(payload.image_id, payload.image_number, payload.placement_id))
            }
        }
    }

    fn execute_query(&mut self, payload: Payload) -> Option<Response> {
        // A query validates that this client's parameters describe an image
        // the terminal could transmit, without retaining any state. The id
        // fed to `init` only matters for the discarded `Image::id`, so a
        // constant placeholder is fine when the client didn't supply one.
        let result = LoadingImage::init(1, &payload).and_then(|loading| {
            loading.complete(0, self.decompressor.as_ref(), self.png_decoder.as_ref())
        });
        match result {
            Ok(_) => Self::respond(
                payload.quiet,
                false,
                Response::ok(payload.image_id, payload.image_number, payload.placement_id),
            ),
            Err(err) => Self::respond(payload.quiet, true, Self::load_error_response(&payload, err)),
        }
    }

    fn execute_transmit(&mut self, payload: Payload, display: bool) -> Option<Response> {
        let quiet = payload.quiet;
        match self.begin_or_continue(&payload) {
            Ok(false) => None, // more chunks expected; nothing to report yet
            Ok(true) => match self.complete_loading() {
                Ok(image) => {
                    let id = image.id;
                    let number = image.number;
                    match self.images.add_image(image) {
                        Ok(()) => {
                            if display {
                                self.display(id, &payload);
                            }
                            debug!(target: "core_model.kitty", image_id = id, "image_transmitted");
                            Self::respond(quiet, false, Response::ok(id, number, payload.placement_id))
                        }
                        Err(StorageError::OutOfMemory) => Self::respond(
                            quiet,
                            true,
                            Response::error(id, number, payload.placement_id, ErrorKind::Enomem, "image storage is out of memory"),
                        ),
                    }
                }
                Err(err) => Self::respond(quiet, true, Self::load_error_response(&payload, err)),
            },
            Err(err) => {
                self.loading = None;
                Self::respond(quiet, true, Self::load_error_response(&payload, err))
            }
        }
    }

    fn execute_display(&mut self, payload: Payload) -> Option<Response> {
        if self.images.image(payload.image_id).is_none() {
            return Self::respond(
                payload.quiet,
                true,
                Response::error(payload.image_id, payload.image_number, payload.placement_id, ErrorKind::Enoent, "no such image"),
            );
        }
        self.display(payload.image_id, &payload);
        Self::respond(
            payload.quiet,
            false,
            Response::ok(payload.image_id, payload.image_number, payload.placement_id),
        )
    }

    fn execute_delete(&mut self, spec: DeleteSpec) -> Option<Response> {
        let cursor = self.cursor_pin();
        self.images.delete(
            spec.variant,
            spec.delete_images,
            self.terminal.screen_mut().pages_mut(),
            cursor,
            self.cell_px,
        );
        // Delete never responds over the wire (kitty sends no ack for `a=d`).
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_kitty::command::CommandParser;
    use core_screen::PageCapacity;

    fn model() -> TerminalModel {
        let terminal = Terminal::new(10, 20, PageCapacity::default(), 1000);
        TerminalModel::new(terminal, 1_000_000, (10, 20))
    }

    #[test]
    fn transmit_and_query_round_trip() {
        let mut m = model();
        let cmd = CommandParser::parse(b"i=31,s=1,v=1,a=t,t=d,f=24;AAAA").unwrap();
        let resp = m.execute(cmd).unwrap();
        assert!(matches!(resp.payload, core_kitty::response::Payload::Ok));
        assert_eq!(resp.image_id, 31);
        assert!(m.images().image(31).is_some());
    }

    #[test]
    fn query_does_not_store_image() {
        let mut m = model();
        let cmd = CommandParser::parse(b"i=31,s=1,v=1,a=q,t=d,f=24;AAAA").unwrap();
        let resp = m.execute(cmd).unwrap();
        assert!(matches!(resp.payload, core_kitty::response::Payload::Ok));
        assert_eq!(resp.image_id, 31);
        assert!(m.images().image(31).is_none());
    }

    #[test]
    fn quiet_failures_suppresses_every_response() {
        let mut m = model();
        let cmd = CommandParser::parse(b"i=1,s=0,v=0,a=t,t=d,f=24,q=2;").unwrap();
        assert!(m.execute(cmd).is_none());
    }

    #[test]
    fn quiet_ok_suppresses_success_but_not_failure() {
        let mut m = model();
        let ok_cmd = CommandParser::parse(b"i=1,s=1,v=1,a=t,t=d,f=24,q=1;AAA").unwrap();
        assert!(m.execute(ok_cmd).is_none());

        let err_cmd = CommandParser::parse(b"i=2,s=0,v=0,a=t,t=d,f=24,q=1;").unwrap();
        let resp = m.execute(err_cmd).unwrap();
        assert!(matches!(resp.payload, core_kitty::response::Payload::Error { .. }));
    }

    #[test]
    fn transmit_and_display_creates_a_placement_at_the_cursor() {
        let mut m = model();
        let cmd = CommandParser::parse(b"i=7,s=1,v=1,a=T,t=d,f=24;AAAA").unwrap();
        m.execute(cmd).unwrap();
        assert_eq!(m.images().placements().count(), 1);
    }

    #[test]
    fn delete_all_clears_placements() {
        let mut m = model();
        let cmd = CommandParser::parse(b"i=7,s=1,v=1,a=T,t=d,f=24;AAAA").unwrap();
        m.execute(cmd).unwrap();
        let del = CommandParser::parse(b"a=d,d=A").unwrap();
        assert!(m.execute(del).is_none());
        assert_eq!(m.images().placements().count(), 0);
        assert!(m.images().image(7).is_none());
    }
}
