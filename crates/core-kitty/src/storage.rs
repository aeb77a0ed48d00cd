//! Image storage: the image and placement tables, the
//! placement deletion algebra, and byte-budget eviction.

use crate::command::DeleteVariant;
use crate::image::Image;
use core_pagelist::{PageList, Pin, PinHandle, Point, Traversal};
use std::collections::HashMap;
use tracing::debug;

/// Default `total_limit`: 320 MB. A limit of `0` disables the protocol
/// entirely (every `add_image` call fails with [`StorageError::OutOfMemory`]).
pub const DEFAULT_TOTAL_LIMIT: u64 = 320 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("image storage is out of memory")]
    OutOfMemory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlacementKey {
    Internal(u32),
    External(u32),
}

/// Where a placement is anchored: a tracked grid position, or `Virtual`
/// (positioned purely by the Unicode placeholder scan).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Pinned(PinHandle),
    Virtual,
}

#[derive(Debug, Clone, Copy)]
pub struct Placement {
    pub location: Location,
    pub source_x: u32,
    pub source_y: u32,
    pub source_w: u32,
    pub source_h: u32,
    /// Display size in grid cells; `0` means "derive from image/source size".
    pub cols: u32,
    pub rows: u32,
    pub x_offset: u32,
    pub y_offset: u32,
    pub z: i32,
}

/// The resolved on-grid rectangle of a non-virtual placement.
#[derive(Debug, Clone, Copy)]
pub struct Rect {
    pub top: Pin,
    pub bottom: Pin,
    pub left_x: u16,
    pub right_x: u16,
    pub rows: u32,
}

pub struct ImageStorage {
    pub dirty: bool,
    next_image_id: u32,
    next_internal_placement_id: u32,
    images: HashMap<u32, Image>,
    placements: HashMap<(u32, PlacementKey), Placement>,
    total_bytes: u64,
    total_limit: u64,
}

impl ImageStorage {
    pub fn new(total_limit: u64) -> Self {
        ImageStorage {
            dirty: false,
            // Implicit image ids start at 2^31 - 1 and climb; collision with
            // a user-supplied id in the upper half is a known unresolved
            // edge case (see DESIGN.md).
            next_image_id: 2u32.pow(31) - 1,
            next_internal_placement_id: 1,
            images: HashMap::new(),
            placements: HashMap::new(),
            total_bytes: 0,
            total_limit,
        }
    }

    pub fn next_implicit_id(&mut self) -> u32 {
        let id = self.next_image_id;
        self.next_image_id = self.next_image_id.wrapping_add(1);
        id
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn total_limit(&self) -> u64 {
        self.total_limit
    }

    pub fn image(&self, id: u32) -> Option<&Image> {
        self.images.get(&id)
    }

    pub fn images(&self) -> impl Iterator<Item = &Image> {
        self.images.values()
    }

    pub fn placements(&self) -> impl Iterator<Item = (&(u32, PlacementKey), &Placement)> {
        self.placements.iter()
    }

    /// Runtime stats for diagnostics/introspection; not part of any wire
    /// protocol, just a convenience the facade exposes.
    pub fn stats(&self) -> Stats {
        Stats {
            image_count: self.images.len(),
            placement_count: self.placements.len(),
            total_bytes: self.total_bytes,
            total_limit: self.total_limit,
        }
    }

    pub fn add_image(&mut self, img: Image) -> Result<(), StorageError> {
        let size = img.data.len() as u64;
        if size > self.total_limit {
            return Err(StorageError::OutOfMemory);
        }
        let existing = self.images.get(&img.id).map(|i| i.data.len() as u64).unwrap_or(0);
        let projected = self.total_bytes - existing + size;
        if projected > self.total_limit {
            let required = projected - self.total_limit;
            self.evict(required);
            let after = self.total_bytes - existing + size;
            if after > self.total_limit {
                return Err(StorageError::OutOfMemory);
            }
        }
        self.total_bytes = self.total_bytes - existing + size;
        self.images.insert(img.id, img);
        self.dirty = true;
        Ok(())
    }

    pub fn add_placement(&mut self, image_id: u32, placement_id: u32, p: Placement) {
        let key = if placement_id == 0 {
            let id = self.next_internal_placement_id;
            self.next_internal_placement_id = self.next_internal_placement_id.wrapping_add(1);
            if self.next_internal_placement_id == 0 {
                self.next_internal_placement_id = 1;
            }
            PlacementKey::Internal(id)
        } else {
            PlacementKey::External(placement_id)
        };
        self.placements.insert((image_id, key), p);
        self.dirty = true;
    }

    fn untrack(&self, pagelist: &mut PageList, placement: &Placement) {
        if let Location::Pinned(handle) = placement.location {
            pagelist.untrack_pin(handle);
        }
    }

    /// Drop every placement for `image_id` whose key matches `only`, if
    /// given; otherwise all placements for the image. Returns whether the
    /// image now has zero placements.
    fn drop_placements_for_image(
        &mut self,
        pagelist: &mut PageList,
        image_id: u32,
        only: Option<PlacementKey>,
    ) -> bool {
        let doomed: Vec<(u32, PlacementKey)> = self
            .placements
            .keys()
            .filter(|(id, key)| *id == image_id && only.map(|o| o == *key).unwrap_or(true))
            .copied()
            .collect();
        for key in &doomed {
            if let Some(p) = self.placements.remove(key) {
                self.untrack(pagelist, &p);
            }
        }
        !self.placements.keys().any(|(id, _)| *id == image_id)
    }

    fn maybe_drop_image(&mut self, image_id: u32, delete_images: bool) {
        if delete_images {
            if let Some(img) = self.images.remove(&image_id) {
                self.total_bytes -= img.data.len() as u64;
            }
        }
    }

    /// Resolve a placement's on-grid rectangle. `cell_px` is `(width,
    /// height)` of one cell in pixels, used as a fallback only when the
    /// placement doesn't pin an explicit `cols`/`rows` size (in which case
    /// the owning image's pixel dimensions are needed too).
    pub fn rect_for(
        &self,
        image_id: u32,
        placement: &Placement,
        pagelist: &PageList,
        cell_px: (u32, u32),
    ) -> Option<Rect> {
        let Location::Pinned(handle) = placement.location else {
            return None;
        };
        let top = pagelist.get_pin(handle);

        let (grid_cols, grid_rows) = if placement.cols > 0 && placement.rows > 0 {
            (placement.cols, placement.rows)
        } else {
            let img = self.images.get(&image_id)?;
            let src_w = if placement.source_w > 0 {
                placement.source_w
            } else {
                img.width
            };
            let src_h = if placement.source_h > 0 {
                placement.source_h
            } else {
                img.height
            };
            let (cw, ch) = (cell_px.0.max(1), cell_px.1.max(1));
            (src_w.div_ceil(cw), src_h.div_ceil(ch))
        };

        let right_x = top
            .x
            .saturating_add((grid_cols.saturating_sub(1)) as u16)
            .min(pagelist.cols().saturating_sub(1));
        let bottom = match pagelist.pin_down_overflow(top, grid_rows.saturating_sub(1)) {
            Traversal::Offset(p) => p,
            Traversal::Overflow { end, .. } => end,
        };
        Some(Rect {
            top,
            bottom,
            left_x: top.x,
            right_x,
            rows: grid_rows,
        })
    }

    /// Whether `candidate` falls within `rect`, walking forward from `top`
    /// at most `rect.rows` steps (pins have no numeric ordering across
    /// pages, so containment is decided by a bounded linear walk).
    fn rect_contains(pagelist: &PageList, rect: &Rect, candidate: Pin) -> bool {
        if candidate.x < rect.left_x || candidate.x > rect.right_x {
            return false;
        }
        let mut cur = rect.top;
        for _ in 0..rect.rows {
            if cur.same_row(&candidate) {
                return true;
            }
            if cur == rect.bottom {
                break;
            }
            match pagelist.pin_down_overflow(cur, 1) {
                Traversal::Offset(p) => cur = p,
                Traversal::Overflow { .. } => break,
            }
        }
        cur.same_row(&candidate)
    }

    /// Apply a delete command. `cursor` and `cell_px` are supplied by the
    /// caller (the facade) since this crate doesn't own cursor state.
    pub fn delete(
        &mut self,
        variant: DeleteVariant,
        delete_images: bool,
        pagelist: &mut PageList,
        cursor: Pin,
        cell_px: (u32, u32),
    ) {
        self.dirty = true;
        match variant {
            DeleteVariant::All => {
                let doomed: Vec<(u32, PlacementKey)> = self
                    .placements
                    .iter()
                    .filter(|(_, p)| !matches!(p.location, Location::Virtual))
                    .map(|(k, _)| *k)
                    .collect();
                self.remove_keys(pagelist, delete_images, doomed);
            }
            DeleteVariant::Id {
                image_id,
                placement_id,
            } => {
                let only = if placement_id != 0 {
                    Some(PlacementKey::External(placement_id))
                } else {
                    None
                };
                let unused = self.drop_placements_for_image(pagelist, image_id, only);
                if unused {
                    self.maybe_drop_image(image_id, delete_images);
                }
            }
            DeleteVariant::Newest {
                image_number,
                placement_id,
            } => {
                let newest = self
                    .images
                    .values()
                    .filter(|i| i.number == image_number)
                    .max_by_key(|i| (i.transmit_time, i.id));
                if let Some(image_id) = newest.map(|i| i.id) {
                    let only = if placement_id != 0 {
                        Some(PlacementKey::External(placement_id))
                    } else {
                        None
                    };
                    let unused = self.drop_placements_for_image(pagelist, image_id, only);
                    if unused {
                        self.maybe_drop_image(image_id, delete_images);
                    }
                }
            }
            DeleteVariant::IntersectCursor => {
                self.delete_where(pagelist, delete_images, cell_px, |_z| true, cursor, None)
            }
            DeleteVariant::IntersectCell { x, y } => {
                let point = pagelist.pin(Point::Active {
                    x: (x.saturating_sub(1)) as u16,
                    y: y.saturating_sub(1),
                });
                if let Some(p) = point {
                    self.delete_where(pagelist, delete_images, cell_px, |_z| true, p, None)
                }
            }
            DeleteVariant::IntersectCellZ { x, y, z } => {
                let point = pagelist.pin(Point::Active {
                    x: (x.saturating_sub(1)) as u16,
                    y: y.saturating_sub(1),
                });
                if let Some(p) = point {
                    self.delete_where(pagelist, delete_images, cell_px, move |pz| pz == z, p, None)
                }
            }
            DeleteVariant::Column { x } => {
                self.delete_where_column_or_row(pagelist, delete_images, cell_px, Some(x), None)
            }
            DeleteVariant::Row { y } => {
                self.delete_where_column_or_row(pagelist, delete_images, cell_px, None, Some(y))
            }
            DeleteVariant::Z { z } => {
                let doomed: Vec<(u32, PlacementKey)> = self
                    .placements
                    .iter()
                    .filter(|(_, p)| p.z == z && !matches!(p.location, Location::Virtual))
                    .map(|(k, _)| *k)
                    .collect();
                self.remove_keys(pagelist, delete_images, doomed);
            }
            DeleteVariant::AnimationFrames => {}
        }
    }

    fn remove_keys(
        &mut self,
        pagelist: &mut PageList,
        delete_images: bool,
        keys: Vec<(u32, PlacementKey)>,
    ) {
        let mut touched = std::collections::HashSet::new();
        for key in &keys {
            touched.insert(key.0);
            if let Some(p) = self.placements.remove(key) {
                self.untrack(pagelist, &p);
            }
        }
        for id in touched {
            let unused = !self.placements.keys().any(|(pid, _)| *pid == id);
            if unused {
                self.maybe_drop_image(id, delete_images);
            }
        }
    }

    fn delete_where(
        &mut self,
        pagelist: &mut PageList,
        delete_images: bool,
        cell_px: (u32, u32),
        z_pred: impl Fn(i32) -> bool,
        target: Pin,
        _unused: Option<()>,
    ) {
        let mut doomed = Vec::new();
        for (key, p) in self.placements.iter() {
            if matches!(p.location, Location::Virtual) {
                continue;
            }
            if !z_pred(p.z) {
                continue;
            }
            if let Some(rect) = self.rect_for(key.0, p, pagelist, cell_px) {
                if Self::rect_contains(pagelist, &rect, target) {
                    doomed.push(*key);
                }
            }
        }
        self.remove_keys(pagelist, delete_images, doomed);
    }

    fn delete_where_column_or_row(
        &mut self,
        pagelist: &mut PageList,
        delete_images: bool,
        cell_px: (u32, u32),
        column: Option<u32>,
        row: Option<u32>,
    ) {
        let mut doomed = Vec::new();
        for (key, p) in self.placements.iter() {
            if matches!(p.location, Location::Virtual) {
                continue;
            }
            let Some(rect) = self.rect_for(key.0, p, pagelist, cell_px) else {
                continue;
            };
            let hit = if let Some(x) = column {
                let x = x.saturating_sub(1) as u16;
                x >= rect.left_x && x <= rect.right_x
            } else if let Some(y) = row {
                if let Some(target) = pagelist.pin(Point::Active {
                    x: rect.left_x,
                    y: y.saturating_sub(1),
                }) {
                    Self::rect_contains(pagelist, &rect, target)
                } else {
                    false
                }
            } else {
                false
            };
            if hit {
                doomed.push(*key);
            }
        }
        self.remove_keys(pagelist, delete_images, doomed);
    }

    /// Reclaim at least `required` bytes, preferring unused images over
    /// used ones and, within each group, the oldest transmissions first.
    pub fn evict(&mut self, required: u64) {
        let mut candidates: Vec<(u32, u64, bool)> = self
            .images
            .values()
            .map(|img| {
                let used = self
                    .placements
                    .keys()
                    .any(|(id, _)| *id == img.id);
                (img.id, img.transmit_time, used)
            })
            .collect();
        candidates.sort_by(|a, b| a.2.cmp(&b.2).then(a.1.cmp(&b.1)).then(a.0.cmp(&b.0)));

        let mut reclaimed = 0u64;
        for (id, _, _) in candidates {
            if reclaimed >= required {
                break;
            }
            if let Some(img) = self.images.remove(&id) {
                reclaimed += img.data.len() as u64;
                self.total_bytes -= img.data.len() as u64;
                let doomed: Vec<(u32, PlacementKey)> = self
                    .placements
                    .keys()
                    .filter(|(pid, _)| *pid == id)
                    .copied()
                    .collect();
                for key in doomed {
                    self.placements.remove(&key);
                }
                debug!(target: "core_kitty", image_id = id, reclaimed, "evicted image");
            }
        }
        self.dirty = true;
    }
}

impl Default for ImageStorage {
    fn default() -> Self {
        Self::new(DEFAULT_TOTAL_LIMIT)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Stats {
    pub image_count: usize,
    pub placement_count: usize,
    pub total_bytes: u64,
    pub total_limit: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Format;
    use core_page::Capacity;

    fn fresh_pagelist() -> PageList {
        PageList::new(100, 100, Capacity::default(), 1000)
    }

    fn image(id: u32, bytes: usize, number: u32, transmit_time: u64) -> Image {
        Image {
            id,
            number,
            width: 1,
            height: 1,
            format: Format::Rgb,
            compression: crate::command::Compression::None,
            data: vec![0u8; bytes],
            transmit_time,
            implicit_id: false,
        }
    }

    #[test]
    fn add_image_tracks_total_bytes() {
        let mut storage = ImageStorage::new(1000);
        storage.add_image(image(1, 100, 0, 1)).unwrap();
        assert_eq!(storage.total_bytes(), 100);
        assert!(storage.dirty);
    }

    #[test]
    fn add_image_over_limit_with_nothing_to_evict_fails() {
        let mut storage = ImageStorage::new(100);
        let err = storage.add_image(image(1, 200, 0, 1)).unwrap_err();
        assert_eq!(err, StorageError::OutOfMemory);
    }

    #[test]
    fn eviction_prefers_unused_then_oldest() {
        // Scenario 6: total_limit=1000, A=700 (used, old), B=400 (unused).
        // B's insertion must evict A (the only candidate once B exists),
        // leaving images = {B}, total = 400.
        let mut storage = ImageStorage::new(1000);
        let mut pagelist = fresh_pagelist();
        storage.add_image(image(1, 700, 0, 1)).unwrap();
        let pin = pagelist.pin(Point::Active { x: 0, y: 0 }).unwrap();
        let handle = pagelist.track_pin(pin);
        storage.add_placement(
            1,
            0,
            Placement {
                location: Location::Pinned(handle),
                source_x: 0,
                source_y: 0,
                source_w: 0,
                source_h: 0,
                cols: 1,
                rows: 1,
                x_offset: 0,
                y_offset: 0,
                z: 0,
            },
        );

        storage.add_image(image(2, 400, 0, 2)).unwrap();

        assert_eq!(storage.total_bytes(), 400);
        assert!(storage.image(1).is_none());
        assert!(storage.image(2).is_some());
    }

    #[test]
    fn delete_intersecting_cursor_drops_only_that_placement() {
        // Scenario 5: placements 1 at (0,0), 2 at (25,25); cursor at (12,12)
        // only intersects placement 1 (which spans rows/cols 0..50 in a
        // 100x100 px grid at 1px-per-cell == 50x50 cells, clamped to the
        // 100x100 grid; placement 2 starts at (25,25)).
        let mut storage = ImageStorage::new(u64::MAX);
        let mut pagelist = PageList::new(100, 100, Capacity::default(), 1000);
        storage.add_image(image(1, 50 * 50 * 3, 0, 1)).unwrap();

        let pin1 = pagelist.pin(Point::Active { x: 0, y: 0 }).unwrap();
        let handle1 = pagelist.track_pin(pin1);
        storage.add_placement(
            1,
            1,
            Placement {
                location: Location::Pinned(handle1),
                source_x: 0,
                source_y: 0,
                source_w: 0,
                source_h: 0,
                cols: 50,
                rows: 50,
                x_offset: 0,
                y_offset: 0,
                z: 0,
            },
        );

        let pin2 = pagelist.pin(Point::Active { x: 25, y: 25 }).unwrap();
        let handle2 = pagelist.track_pin(pin2);
        storage.add_placement(
            1,
            2,
            Placement {
                location: Location::Pinned(handle2),
                source_x: 0,
                source_y: 0,
                source_w: 0,
                source_h: 0,
                cols: 50,
                rows: 50,
                x_offset: 0,
                y_offset: 0,
                z: 0,
            },
        );

        let cursor = pagelist.pin(Point::Active { x: 12, y: 12 }).unwrap();
        storage.delete(
            DeleteVariant::IntersectCursor,
            false,
            &mut pagelist,
            cursor,
            (1, 1),
        );

        assert!(!storage
            .placements
            .contains_key(&(1, PlacementKey::External(1))));
        assert!(storage
            .placements
            .contains_key(&(1, PlacementKey::External(2))));
        assert!(storage.image(1).is_some());
        assert!(storage.dirty);
    }

    #[test]
    fn delete_all_spares_virtual_placements() {
        let mut storage = ImageStorage::new(u64::MAX);
        let mut pagelist = fresh_pagelist();
        storage.add_image(image(1, 16, 0, 1)).unwrap();

        let pin = pagelist.pin(Point::Active { x: 0, y: 0 }).unwrap();
        let handle = pagelist.track_pin(pin);
        storage.add_placement(
            1,
            1,
            Placement {
                location: Location::Pinned(handle),
                source_x: 0,
                source_y: 0,
                source_w: 0,
                source_h: 0,
                cols: 1,
                rows: 1,
                x_offset: 0,
                y_offset: 0,
                z: 0,
            },
        );
        storage.add_placement(
            1,
            2,
            Placement {
                location: Location::Virtual,
                source_x: 0,
                source_y: 0,
                source_w: 0,
                source_h: 0,
                cols: 1,
                rows: 1,
                x_offset: 0,
                y_offset: 0,
                z: 0,
            },
        );

        let cursor = pagelist.pin(Point::Active { x: 0, y: 0 }).unwrap();
        storage.delete(DeleteVariant::All, false, &mut pagelist, cursor, (1, 1));

        assert!(!storage
            .placements
            .contains_key(&(1, PlacementKey::External(1))));
        assert!(storage
            .placements
            .contains_key(&(1, PlacementKey::External(2))));
    }
}
