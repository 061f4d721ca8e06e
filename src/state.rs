use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::address::Address;
use crate::curve::GridCoordinate;
use crate::models::domain::Role;

pub const BYTES_PER_PIXEL: usize = 4;

/// Widest raster the binary will allocate: 16384² pixels is 1 GiB of RGBA.
pub const MAX_RASTER_SIDE: u32 = 1 << 14;

/// Spacing of the background grid lines, in pixels.
pub const GRID_SPACING: u32 = 64;

pub type Rgba = [u8; 4];

pub mod palette {
    use super::Rgba;
    use crate::models::domain::Role;

    pub const BACKGROUND: Rgba = [0, 0, 0, 255];
    pub const GRID: Rgba = [47, 79, 79, 255];
    pub const ORIGINATOR: Rgba = [0, 128, 0, 255];
    pub const RESPONDER: Rgba = [255, 0, 0, 255];

    pub fn for_role(role: Role) -> Rgba {
        match role {
            Role::Originator => ORIGINATOR,
            Role::Responder => RESPONDER,
        }
    }
}

/// Counters read together with the raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub width: u32,
    pub height: u32,
    pub total_events: u64,
    pub dropped_events: u64,
    pub last_address: Option<Address>,
    pub last_event_at: Option<DateTime<Utc>>,
}

/// Owned copy of the raster and its counters, taken in one critical section.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub pixels: Vec<u8>,
    pub stats: Stats,
}

impl Snapshot {
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        pixel_at(&self.pixels, self.stats.width, x, y)
    }
}

struct Raster {
    pixels: Vec<u8>,
    stats: Stats,
}

/// Square RGBA raster plus running counters behind a single lock.
///
/// The aggregator is the only writer. Readers go through [`snapshot`],
/// [`stats`] or [`with_pixels`], all of which observe pixels and counters
/// from the same critical section.
///
/// [`snapshot`]: VisualizationState::snapshot
/// [`stats`]: VisualizationState::stats
/// [`with_pixels`]: VisualizationState::with_pixels
pub struct VisualizationState {
    raster: Mutex<Raster>,
}

impl VisualizationState {
    pub fn new(side: u32) -> Self {
        let width = side as usize;
        let mut pixels = Vec::with_capacity(width * width * BYTES_PER_PIXEL);
        for y in 0..side {
            for x in 0..side {
                let colour = if x % GRID_SPACING == 0 || y % GRID_SPACING == 0 {
                    palette::GRID
                } else {
                    palette::BACKGROUND
                };
                pixels.extend_from_slice(&colour);
            }
        }

        Self {
            raster: Mutex::new(Raster {
                pixels,
                stats: Stats {
                    width: side,
                    height: side,
                    total_events: 0,
                    dropped_events: 0,
                    last_address: None,
                    last_event_at: None,
                },
            }),
        }
    }

    /// Paints one event. Coordinates outside the raster are counted as
    /// dropped rather than written.
    pub fn record(&self, coord: GridCoordinate, role: Role, address: Address) {
        let now = Utc::now();
        let mut raster = self.raster.lock();
        let width = raster.stats.width;
        let Some(offset) = offset_of(width, coord.x, coord.y) else {
            raster.stats.dropped_events += 1;
            return;
        };
        raster.pixels[offset..offset + BYTES_PER_PIXEL].copy_from_slice(&palette::for_role(role));
        raster.stats.total_events += 1;
        raster.stats.last_address = Some(address);
        raster.stats.last_event_at = Some(now);
    }

    /// Counts an event that could not be placed on the grid.
    pub fn record_drop(&self) {
        self.raster.lock().stats.dropped_events += 1;
    }

    pub fn stats(&self) -> Stats {
        self.raster.lock().stats
    }

    pub fn snapshot(&self) -> Snapshot {
        let raster = self.raster.lock();
        Snapshot {
            pixels: raster.pixels.clone(),
            stats: raster.stats,
        }
    }

    /// Lends the raster to `f` without copying it. The lock is held for the
    /// duration of the call, so keep `f` short (one texture upload).
    pub fn with_pixels<R>(&self, f: impl FnOnce(&[u8], &Stats) -> R) -> R {
        let raster = self.raster.lock();
        f(&raster.pixels, &raster.stats)
    }
}

fn offset_of(width: u32, x: u32, y: u32) -> Option<usize> {
    if x >= width || y >= width {
        return None;
    }
    Some((y as usize * width as usize + x as usize) * BYTES_PER_PIXEL)
}

fn pixel_at(pixels: &[u8], width: u32, x: u32, y: u32) -> Option<Rgba> {
    let offset = offset_of(width, x, y)?;
    let mut colour = [0u8; BYTES_PER_PIXEL];
    colour.copy_from_slice(pixels.get(offset..offset + BYTES_PER_PIXEL)?);
    Some(colour)
}
