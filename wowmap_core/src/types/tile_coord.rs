//! `(x, y)` minimap tile coordinates within a map (§3). The WDT grid uses
//! `0..=63` on each axis; the viewer additionally needs signed coordinates to
//! address tiles relative to an arbitrary origin, so `x`/`y` are plain `i32`
//! and range checks live at the producer (the WDT parser), not here.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct TileCoord {
	pub x: i32,
	pub y: i32,
}

impl TileCoord {
	pub fn new(x: i32, y: i32) -> Self {
		Self { x, y }
	}

	/// Whether this coordinate falls inside the 64x64 WDT grid.
	#[must_use]
	pub fn in_wdt_grid(self) -> bool {
		(0..64).contains(&self.x) && (0..64).contains(&self.y)
	}
}

impl fmt::Debug for TileCoord {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "({}, {})", self.x, self.y)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn grid_bounds() {
		assert!(TileCoord::new(0, 0).in_wdt_grid());
		assert!(TileCoord::new(63, 63).in_wdt_grid());
		assert!(!TileCoord::new(64, 0).in_wdt_grid());
		assert!(!TileCoord::new(-1, 0).in_wdt_grid());
	}

	#[test]
	fn ordering_is_lexicographic_x_then_y() {
		assert!(TileCoord::new(1, 5) < TileCoord::new(2, 0));
		assert!(TileCoord::new(1, 0) < TileCoord::new(1, 1));
	}
}
