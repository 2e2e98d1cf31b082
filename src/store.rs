use crate::{
    schema::{self, Metadata, TilesetOptions, TilesetStatus},
    Error, Result, StoredTileKey, TileCoord, TileFormat,
};
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OpenFlags, OptionalExtension};
use std::{
    collections::VecDeque,
    path::{Path, PathBuf},
};

/// Number of keys fetched per query while listing tiles.
const LIST_PAGE_SIZE: usize = 1024;

/// A stored tile payload together with the tileset's declared format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    pub format: TileFormat,
    pub data: Vec<u8>,
}

impl Tile {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

#[derive(Clone, Copy)]
enum Access {
    Read,
    Write,
}

/// Handle to a single MBTiles file.
///
/// The handle only remembers the path. Every operation opens its own connection
/// and closes it before returning, so each call is one SQLite transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tileset {
    path: PathBuf,
}

impl Tileset {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Initialises a new tileset file at `path`; see [`schema::create`].
    pub fn create(path: impl Into<PathBuf>, options: &TilesetOptions) -> Result<Self> {
        let tileset = Self::new(path);

        schema::create(&tileset.path, options)?;

        Ok(tileset)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn probe(&self) -> Result<TilesetStatus> {
        schema::probe(&self.path)
    }

    pub fn exists(&self) -> Result<bool> {
        schema::exists(&self.path)
    }

    pub fn metadata(&self) -> Result<Option<Metadata>> {
        schema::read_metadata(&self.path)
    }

    fn connect(&self, access: Access) -> Result<Connection> {
        let present = self
            .path
            .try_exists()
            .map_err(|e| Error::storage(&self.path, "open tileset", e))?;

        if !present {
            return Err(Error::NotFound(self.path.clone()));
        }

        let flags = match access {
            Access::Read => OpenFlags::SQLITE_OPEN_READ_ONLY,
            Access::Write => OpenFlags::SQLITE_OPEN_READ_WRITE,
        } | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        Connection::open_with_flags(&self.path, flags)
            .map_err(|e| Error::storage(&self.path, "open tileset", e))
    }

    // a missing table or a foreign file means the schema was never set up
    fn classify(&self, operation: &'static str, e: rusqlite::Error) -> Error {
        match e.sqlite_error_code() {
            Some(ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt | ErrorCode::Unknown) => {
                log::debug!("{operation} failed on {:?}: {e}", self.path);

                Error::InvalidTileset(self.path.clone())
            }
            _ => Error::storage(&self.path, operation, e),
        }
    }

    /// Lazily enumerates every stored tile in northern-origin coordinates.
    ///
    /// Keys are read page by page over one read-only connection held by the
    /// iterator. No order is promised to callers.
    pub fn list_tiles(&self) -> Result<TileList> {
        let conn = self.connect(Access::Read)?;

        Ok(TileList {
            tileset: self.clone(),
            conn,
            pending: VecDeque::new(),
            after: None,
            exhausted: false,
        })
    }

    /// Returns the tile at `coord`, or `None` when nothing is stored there.
    pub fn get_tile(&self, coord: TileCoord) -> Result<Option<Tile>> {
        log::trace!("get tile {coord} from {:?}", self.path);

        let conn = self.connect(Access::Read)?;

        let declared = conn
            .query_row(
                "SELECT value FROM metadata WHERE name = 'format'",
                [],
                |row| Ok(schema::text_value(row.get_ref(0)?)),
            )
            .optional()
            .map_err(|e| self.classify("read tileset format", e))?
            .flatten()
            .filter(|format| !format.is_empty());

        let key = coord.to_stored();

        let data = conn
            .query_row(
                "SELECT tile_data FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
                params![key.zoom_level, key.tile_column, key.tile_row],
                |row| row.get::<_, Option<Vec<u8>>>(0),
            )
            .optional()
            .map_err(|e| self.classify("read tile", e))?
            .flatten();

        let Some(data) = data else {
            return Ok(None);
        };

        let Some(declared) = declared else {
            return Err(Error::InvalidMetadata {
                key: "format",
                value: String::new(),
            });
        };

        Ok(Some(Tile {
            format: declared.parse()?,
            data,
        }))
    }

    /// Stores `data` at `coord`, replacing any previous payload.
    pub fn put_tile(&self, coord: TileCoord, data: &[u8]) -> Result<()> {
        log::trace!("put tile {coord} ({} bytes) into {:?}", data.len(), self.path);

        let conn = self.connect(Access::Write)?;

        let key = coord.to_stored();

        conn.execute(
            "REPLACE INTO tiles (zoom_level, tile_column, tile_row, tile_data) VALUES (?1, ?2, ?3, ?4)",
            params![key.zoom_level, key.tile_column, key.tile_row, data],
        )
        .map_err(|e| self.classify("write tile", e))?;

        Ok(())
    }

    /// Removes the tile at `coord`; absent tiles are not an error.
    pub fn delete_tile(&self, coord: TileCoord) -> Result<()> {
        log::trace!("delete tile {coord} from {:?}", self.path);

        let conn = self.connect(Access::Write)?;

        let key = coord.to_stored();

        conn.execute(
            "DELETE FROM tiles WHERE zoom_level = ?1 AND tile_column = ?2 AND tile_row = ?3",
            params![key.zoom_level, key.tile_column, key.tile_row],
        )
        .map_err(|e| self.classify("delete tile", e))?;

        Ok(())
    }
}

/// Iterator over the coordinates stored in a tileset, see [`Tileset::list_tiles`].
pub struct TileList {
    tileset: Tileset,
    conn: Connection,
    pending: VecDeque<StoredTileKey>,
    after: Option<StoredTileKey>,
    exhausted: bool,
}

impl TileList {
    fn fetch_page(&mut self) -> Result<()> {
        let select = "SELECT zoom_level, tile_column, tile_row FROM tiles";
        let order = "ORDER BY zoom_level, tile_column, tile_row LIMIT ?";

        let map_key = |row: &rusqlite::Row<'_>| -> rusqlite::Result<StoredTileKey> {
            Ok(StoredTileKey {
                zoom_level: row.get(0)?,
                tile_column: row.get(1)?,
                tile_row: row.get(2)?,
            })
        };

        let (filter, mut values) = match self.after {
            None => ("", Vec::with_capacity(1)),
            Some(last) => (
                "WHERE (zoom_level, tile_column, tile_row) > (?, ?, ?)",
                vec![last.zoom_level, last.tile_column, last.tile_row],
            ),
        };

        values.push(LIST_PAGE_SIZE as i64);

        let page = self
            .conn
            .prepare_cached(&format!("{select} {filter} {order}"))
            .and_then(|mut stmt| {
                let keys = stmt
                    .query_map(params_from_iter(values), map_key)?
                    .collect::<Result<Vec<_>, _>>();
                keys
            })
            .map_err(|e| self.tileset.classify("list tiles", e))?;

        log::trace!("listed {} tile keys from {:?}", page.len(), self.tileset.path);

        self.exhausted = page.len() < LIST_PAGE_SIZE;
        self.after = page.last().copied().or(self.after);
        self.pending.extend(page);

        Ok(())
    }
}

impl Iterator for TileList {
    type Item = Result<TileCoord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pending.is_empty() && !self.exhausted {
            if let Err(e) = self.fetch_page() {
                self.exhausted = true;

                return Some(Err(e));
            }
        }

        self.pending.pop_front().map(TileCoord::try_from)
    }
}
