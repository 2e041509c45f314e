//! Dispatch grid sizing.
//!
//! The execution grid is rounded up to a whole number of tiles; the kernel
//! body discards invocations that land outside the image.

/// Integer division rounding towards positive infinity.
#[inline]
pub fn ceil_div(a: u32, b: u32) -> u32 {
    debug_assert!(b > 0, "ceil_div by zero");
    if a % b != 0 { a / b + 1 } else { a / b }
}

/// Global and local extents of one 2D kernel launch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DispatchGrid {
    /// Global extent in invocations, a multiple of `local` on each axis.
    pub global: [u32; 2],
    /// Work-group (tile) extent.
    pub local: [u32; 2],
}

impl DispatchGrid {
    /// Compute the smallest tile-aligned grid covering `width` x `height`.
    pub fn cover(width: u32, height: u32, tile: [u32; 2]) -> Self {
        let [tw, th] = tile;
        Self {
            global: [ceil_div(width, tw) * tw, ceil_div(height, th) * th],
            local: tile,
        }
    }

    /// Number of work-groups to launch on each axis.
    #[inline]
    pub fn workgroups(&self) -> [u32; 2] {
        [self.global[0] / self.local[0], self.global[1] / self.local[1]]
    }

    /// Total invocation count, including the padding beyond the image.
    pub fn invocations(&self) -> u64 {
        self.global[0] as u64 * self.global[1] as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ceil_div() {
        assert_eq!(ceil_div(0, 8), 0);
        assert_eq!(ceil_div(1, 8), 1);
        assert_eq!(ceil_div(8, 8), 1);
        assert_eq!(ceil_div(9, 8), 2);
        assert_eq!(ceil_div(512, 32), 16);
    }

    #[test]
    fn test_cover_minimal_excess() {
        let tiles = [[1, 1], [8, 32], [32, 32], [16, 16], [1, 256], [7, 3]];
        for tile in tiles {
            for w in (1..=130).chain([511, 512, 513, 1920]) {
                for h in [1, 2, 31, 32, 33, 64, 100, 720, 1080] {
                    let grid = DispatchGrid::cover(w, h, tile);
                    let [gx, gy] = grid.global;
                    assert!(gx >= w && gy >= h, "{:?} does not cover {}x{}", grid, w, h);
                    assert_eq!(gx % tile[0], 0);
                    assert_eq!(gy % tile[1], 0);
                    assert!(gx - w < tile[0], "x excess too large for {:?}", grid);
                    assert!(gy - h < tile[1], "y excess too large for {:?}", grid);
                }
            }
        }
    }

    #[test]
    fn test_workgroups() {
        let grid = DispatchGrid::cover(100, 70, [8, 32]);
        assert_eq!(grid.global, [104, 96]);
        assert_eq!(grid.workgroups(), [13, 3]);
        assert_eq!(grid.invocations(), 104 * 96);
    }
}
