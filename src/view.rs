//! Map viewport.

use crate::records::Coordinates;

/// Recife city centre.
pub const DEFAULT_CENTER: Coordinates = Coordinates::new(-8.0476, -34.8770);
pub const DEFAULT_ZOOM: u8 = 13;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    center: Coordinates,
    zoom: u8,
}

impl Viewport {
    pub fn new(center: Coordinates, zoom: u8) -> Self {
        Self { center, zoom }
    }

    pub fn center(&self) -> Coordinates {
        self.center
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    /// Move the centre to `coords`, keeping the zoom. Returns false when the
    /// viewport was already there.
    pub fn recenter(&mut self, coords: Coordinates) -> bool {
        if self.center == coords {
            return false;
        }
        self.center = coords;
        true
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(DEFAULT_CENTER, DEFAULT_ZOOM)
    }
}
