use crate::{Error, Result};
use std::fmt;

/// Highest zoom level whose rows and columns fit in a `u32`.
pub const MAX_ZOOM: u8 = 31;

/// Converts a row between northern-origin (XYZ) and southern-origin (TMS) numbering.
///
/// The mapping `2^zoom - 1 - row` is its own inverse. Callers pass values already
/// validated by [`TileCoord::new`]: `row` in `[0, 2^zoom)` and `zoom` at most [`MAX_ZOOM`].
pub(crate) const fn flip_row(row: u32, zoom: u8) -> u32 {
    (1u32 << zoom as u32) - 1 - row
}

/// Tile address as seen by tile consumers, row 0 at the northern edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    zoom: u8,
    column: u32,
    row: u32,
}

impl TileCoord {
    pub fn new(zoom: u8, column: u32, row: u32) -> Result<Self> {
        let invalid = || Error::InvalidCoordinate {
            zoom: zoom.into(),
            column: column.into(),
            row: row.into(),
        };

        if zoom > MAX_ZOOM {
            return Err(invalid());
        }

        let size = 1u64 << zoom;

        if u64::from(column) >= size || u64::from(row) >= size {
            return Err(invalid());
        }

        Ok(Self { zoom, column, row })
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn column(&self) -> u32 {
        self.column
    }

    pub fn row(&self) -> u32 {
        self.row
    }

    /// Key under which this tile is persisted.
    pub fn to_stored(&self) -> StoredTileKey {
        StoredTileKey {
            zoom_level: self.zoom.into(),
            tile_column: self.column.into(),
            tile_row: flip_row(self.row, self.zoom).into(),
        }
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.column, self.row)
    }
}

/// Tile address as persisted in the `tiles` table, row 0 at the southern edge.
///
/// Values are kept as SQLite integers so that keys read from foreign files can be
/// validated before they become a [`TileCoord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StoredTileKey {
    pub zoom_level: i64,
    pub tile_column: i64,
    pub tile_row: i64,
}

impl TryFrom<StoredTileKey> for TileCoord {
    type Error = Error;

    fn try_from(key: StoredTileKey) -> Result<Self> {
        let invalid = || Error::InvalidCoordinate {
            zoom: key.zoom_level,
            column: key.tile_column,
            row: key.tile_row,
        };

        let zoom = u8::try_from(key.zoom_level).map_err(|_| invalid())?;
        let column = u32::try_from(key.tile_column).map_err(|_| invalid())?;
        let tile_row = u32::try_from(key.tile_row).map_err(|_| invalid())?;

        // validates the stored row before flipping it
        let tms = TileCoord::new(zoom, column, tile_row).map_err(|_| invalid())?;

        Ok(TileCoord {
            row: flip_row(tms.row, zoom),
            ..tms
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0, 0, 0)]
    #[case(1, 0, 1)]
    #[case(1, 1, 0)]
    #[case(3, 5, 2)]
    #[case(31, 0, (1 << 31) - 1)]
    fn flips_rows(#[case] zoom: u8, #[case] row: u32, #[case] expected: u32) {
        assert_eq!(flip_row(row, zoom), expected);
    }

    #[test]
    fn flip_is_an_involution() {
        for zoom in 0..=8u8 {
            for row in 0..(1u32 << zoom) {
                assert_eq!(flip_row(flip_row(row, zoom), zoom), row);
            }
        }
    }

    #[rstest]
    #[case(0, 1, 0)]
    #[case(0, 0, 1)]
    #[case(2, 4, 0)]
    #[case(32, 0, 0)]
    fn rejects_coordinates_outside_pyramid(#[case] zoom: u8, #[case] column: u32, #[case] row: u32) {
        let err = TileCoord::new(zoom, column, row).expect_err("outside pyramid");
        assert!(matches!(err, Error::InvalidCoordinate { .. }));
    }

    #[test]
    fn stored_key_uses_southern_origin() {
        let coord = TileCoord::new(3, 2, 5).expect("valid coordinate");
        let key = coord.to_stored();

        assert_eq!(
            key,
            StoredTileKey {
                zoom_level: 3,
                tile_column: 2,
                tile_row: 2,
            }
        );
        assert_eq!(TileCoord::try_from(key).expect("valid key"), coord);
    }

    #[rstest]
    #[case(-1, 0, 0)]
    #[case(2, 0, 4)]
    #[case(2, -3, 0)]
    #[case(40, 0, 0)]
    fn rejects_stored_keys_outside_pyramid(
        #[case] zoom_level: i64,
        #[case] tile_column: i64,
        #[case] tile_row: i64,
    ) {
        let key = StoredTileKey {
            zoom_level,
            tile_column,
            tile_row,
        };

        let err = TileCoord::try_from(key).expect_err("outside pyramid");
        match err {
            Error::InvalidCoordinate { zoom, column, row } => {
                assert_eq!((zoom, column, row), (zoom_level, tile_column, tile_row));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn displays_as_path() {
        let coord = TileCoord::new(14, 8803, 5376).expect("valid coordinate");
        assert_eq!(coord.to_string(), "14/8803/5376");
    }
}
