//! Tile storage in a single MBTiles (SQLite) file.
//!
//! Tiles are addressed by [`TileCoord`] with row 0 at the northern edge and are
//! persisted in the MBTiles `tiles` table with row 0 at the southern edge.
//! [`Tileset`] offers the storage operations; [`adapter`] wraps them in the
//! read-only provider and read-write cache roles a tile server consumes.

pub mod adapter;
mod coord;
mod error;
mod format;
pub mod schema;
mod store;

pub use adapter::{Cache, Provider, TileCache, TileProvider, TileResponse};
pub use coord::{StoredTileKey, TileCoord, MAX_ZOOM};
pub use error::{Error, Result};
pub use format::TileFormat;
pub use schema::{Bounds, Metadata, TilesetOptions, TilesetStatus, TilesetType};
pub use store::{Tile, TileList, Tileset};
