//! Chunk coordinates: fixed-size spatial partitions of a map.

use crate::geom::{Rect, Vec2};
use crate::types::MapId;

/// A chunk coordinate on a map, `floor(position / chunk_size)` per axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ChunkCoord {
    pub x: i32,
    pub y: i32,
}

impl ChunkCoord {
    /// Creates a chunk coordinate.
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Computes the chunk coordinate containing `position`.
    ///
    /// `chunk_size` must be positive and finite; callers validate at the
    /// index boundary.
    #[must_use]
    pub fn at(position: Vec2, chunk_size: f32) -> Self {
        Self {
            x: (position.x / chunk_size).floor() as i32,
            y: (position.y / chunk_size).floor() as i32,
        }
    }

    /// All chunk coordinates whose chunks overlap `rect`, in row-major
    /// order. The range is inclusive on both ends: a rect touching a
    /// chunk's edge includes that chunk.
    pub fn covering(rect: &Rect, chunk_size: f32) -> impl Iterator<Item = Self> {
        let lo = Self::at(rect.min, chunk_size);
        let hi = Self::at(rect.max, chunk_size);
        (lo.y..=hi.y).flat_map(move |y| (lo.x..=hi.x).map(move |x| Self { x, y }))
    }
}

/// A chunk's identity: the map it belongs to plus its coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ChunkKey {
    pub map: MapId,
    pub coord: ChunkCoord,
}

impl ChunkKey {
    /// Creates a chunk key.
    #[must_use]
    pub const fn new(map: MapId, coord: ChunkCoord) -> Self {
        Self { map, coord }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coord_at_origin() {
        assert_eq!(ChunkCoord::at(Vec2::new(0.0, 0.0), 16.0), ChunkCoord::new(0, 0));
        assert_eq!(ChunkCoord::at(Vec2::new(15.9, 15.9), 16.0), ChunkCoord::new(0, 0));
        assert_eq!(ChunkCoord::at(Vec2::new(16.0, 0.0), 16.0), ChunkCoord::new(1, 0));
        assert_eq!(ChunkCoord::at(Vec2::new(0.0, 16.0), 16.0), ChunkCoord::new(0, 1));
    }

    #[test]
    fn coord_at_negative_floors_down() {
        assert_eq!(ChunkCoord::at(Vec2::new(-0.1, 0.0), 16.0), ChunkCoord::new(-1, 0));
        assert_eq!(ChunkCoord::at(Vec2::new(-16.0, -16.0), 16.0), ChunkCoord::new(-1, -1));
        assert_eq!(ChunkCoord::at(Vec2::new(-16.1, 0.0), 16.0), ChunkCoord::new(-2, 0));
    }

    #[test]
    fn covering_single_chunk() {
        let rect = Rect::new(Vec2::new(1.0, 1.0), Vec2::new(2.0, 2.0));
        let coords: Vec<_> = ChunkCoord::covering(&rect, 16.0).collect();
        assert_eq!(coords, vec![ChunkCoord::new(0, 0)]);
    }

    #[test]
    fn covering_spans_boundaries() {
        let rect = Rect::new(Vec2::new(-1.0, -1.0), Vec2::new(17.0, 1.0));
        let coords: Vec<_> = ChunkCoord::covering(&rect, 16.0).collect();
        assert_eq!(
            coords,
            vec![
                ChunkCoord::new(-1, -1),
                ChunkCoord::new(0, -1),
                ChunkCoord::new(1, -1),
                ChunkCoord::new(-1, 0),
                ChunkCoord::new(0, 0),
                ChunkCoord::new(1, 0),
            ]
        );
    }

    #[test]
    fn covering_is_finite() {
        let rect = Rect::around(Vec2::new(0.0, 0.0), 64.0);
        let count = ChunkCoord::covering(&rect, 16.0).count();
        // 128x128 units over 16-unit chunks, inclusive range: 9x9.
        assert_eq!(count, 81);
    }

    #[test]
    fn key_orders_by_map_then_coord() {
        let a = ChunkKey::new(MapId::new(1), ChunkCoord::new(5, 5));
        let b = ChunkKey::new(MapId::new(2), ChunkCoord::new(0, 0));
        assert!(a < b);
    }
}
